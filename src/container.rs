//! Virtual container tree over a package directory.
//!
//! Nodes live in a flat arena; a node's parent is an index, the root has none.
//! Each node caches parsed objects and raw bytes by file name and only touches
//! the disk on `flush`, `add_raw` conflicts, `clean` and lazy loads.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::dom::Element;
use crate::error::Error;

pub type Digest32 = [u8; 32];

pub fn sha256(bytes: &[u8]) -> Digest32 {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId(usize);

#[derive(Clone, Debug)]
enum Entry {
    Obj(Element),
    Raw(Vec<u8>),
}

impl Entry {
    fn bytes(&self) -> std::borrow::Cow<'_, [u8]> {
        match self {
            Entry::Obj(e) => e.to_xml_bytes().into(),
            Entry::Raw(b) => b.as_slice().into(),
        }
    }
}

#[derive(Clone, Debug)]
struct Node {
    name: String,
    parent: Option<ContainerId>,
    path: PathBuf,
    children: BTreeMap<String, ContainerId>,
    entries: BTreeMap<String, Entry>,
    /// Hash of the serialized form of objects loaded from disk. An unchanged
    /// object is not rewritten, so the original bytes survive a flush.
    loaded: HashMap<String, Digest32>,
    removed: bool,
}

impl Node {
    fn new(name: String, parent: Option<ContainerId>, path: PathBuf) -> Self {
        Self {
            name,
            parent,
            path,
            children: BTreeMap::new(),
            entries: BTreeMap::new(),
            loaded: HashMap::new(),
            removed: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ContainerTree {
    nodes: Vec<Node>,
}

impl ContainerTree {
    pub const ROOT: ContainerId = ContainerId(0);

    /// Opens `root` as the package root, creating the directory if needed.
    /// The parent directory must already exist.
    pub fn create(root: &Path) -> Result<Self, Error> {
        let parent = root
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        if !parent.is_dir() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("parent directory does not exist: {}", parent.display()),
            )));
        }
        if root.exists() && !root.is_dir() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("container root is not a directory: {}", root.display()),
            )));
        }
        fs::create_dir_all(root)?;
        let root = fs::canonicalize(root)?;
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        log::debug!("Container root at {}", root.display());
        Ok(Self {
            nodes: vec![Node::new(name, None, root)],
        })
    }

    fn node(&self, id: ContainerId) -> Result<&Node, Error> {
        match self.nodes.get(id.0) {
            Some(node) if !node.removed => Ok(node),
            Some(node) => Err(Error::State(format!(
                "container '{}' has been cleaned",
                node.name
            ))),
            None => Err(Error::State(format!("unknown container #{}", id.0))),
        }
    }

    fn node_mut(&mut self, id: ContainerId) -> Result<&mut Node, Error> {
        self.node(id)?;
        Ok(&mut self.nodes[id.0])
    }

    pub fn name(&self, id: ContainerId) -> Result<&str, Error> {
        Ok(&self.node(id)?.name)
    }

    pub fn parent(&self, id: ContainerId) -> Result<Option<ContainerId>, Error> {
        Ok(self.node(id)?.parent)
    }

    /// Absolute path of the backing directory.
    pub fn sys_path(&self, id: ContainerId) -> Result<&Path, Error> {
        Ok(&self.node(id)?.path)
    }

    /// Location inside the package: `/` for the root, `/Doc_0/Pages` below it.
    pub fn abs_loc(&self, id: ContainerId) -> Result<String, Error> {
        let mut parts = Vec::new();
        let mut cur = self.node(id)?;
        while let Some(parent) = cur.parent {
            parts.push(cur.name.as_str());
            cur = self.node(parent)?;
        }
        parts.reverse();
        Ok(format!("/{}", parts.join("/")))
    }

    /// Existing sub-container, either already cached or present on disk.
    pub fn get_container(
        &mut self,
        parent: ContainerId,
        name: &str,
    ) -> Result<Option<ContainerId>, Error> {
        let node = self.node(parent)?;
        if let Some(id) = node.children.get(name) {
            return Ok(Some(*id));
        }
        let path = node.path.join(name);
        if !path.is_dir() {
            return Ok(None);
        }
        Ok(Some(self.attach(parent, name, path)))
    }

    pub fn obtain_container(&mut self, parent: ContainerId, name: &str) -> Result<ContainerId, Error> {
        self.obtain_container_with(parent, name, |_, _| Ok(()))
    }

    /// Like [`obtain_container`](Self::obtain_container); `init` runs only when
    /// the container did not exist yet, e.g. to seed default files.
    pub fn obtain_container_with<F>(
        &mut self,
        parent: ContainerId,
        name: &str,
        init: F,
    ) -> Result<ContainerId, Error>
    where
        F: FnOnce(&mut ContainerTree, ContainerId) -> Result<(), Error>,
    {
        if let Some(id) = self.get_container(parent, name)? {
            return Ok(id);
        }
        let path = self.node(parent)?.path.join(name);
        fs::create_dir_all(&path)?;
        let id = self.attach(parent, name, path);
        log::debug!("Created container {}", self.abs_loc(id)?);
        init(self, id)?;
        Ok(id)
    }

    fn attach(&mut self, parent: ContainerId, name: &str, path: PathBuf) -> ContainerId {
        let id = ContainerId(self.nodes.len());
        self.nodes.push(Node::new(name.to_string(), Some(parent), path));
        self.nodes[parent.0].children.insert(name.to_string(), id);
        id
    }

    pub fn children(&self, id: ContainerId) -> Result<Vec<(&str, ContainerId)>, Error> {
        Ok(self
            .node(id)?
            .children
            .iter()
            .map(|(name, id)| (name.as_str(), *id))
            .collect())
    }

    /// Stores a structured object, replacing any prior entry of either kind.
    pub fn put_obj(&mut self, id: ContainerId, name: &str, obj: Element) -> Result<(), Error> {
        let node = self.node_mut(id)?;
        node.loaded.remove(name);
        node.entries.insert(name.to_string(), Entry::Obj(obj));
        Ok(())
    }

    /// Cached object, loading and parsing it from disk on first access.
    pub fn get_obj(&mut self, id: ContainerId, name: &str) -> Result<Option<&mut Element>, Error> {
        let node = self.node_mut(id)?;
        if !node.entries.contains_key(name) {
            let path = node.path.join(name);
            if !path.is_file() {
                return Ok(None);
            }
            let obj = Element::parse_bytes(&fs::read(&path)?)?;
            node.loaded
                .insert(name.to_string(), sha256(&obj.to_xml_bytes()));
            node.entries.insert(name.to_string(), Entry::Obj(obj));
        }
        match node.entries.get_mut(name) {
            Some(Entry::Obj(obj)) => Ok(Some(obj)),
            Some(Entry::Raw(_)) => Err(Error::State(format!(
                "'{name}' holds raw bytes, not an object"
            ))),
            None => Ok(None),
        }
    }

    /// Adds raw bytes under `name` and returns the name they were stored as.
    ///
    /// Identical content already present under `name` makes this a no-op.
    /// Different content is moved aside to a timestamp-prefixed name first, so
    /// nothing previously written is lost.
    pub fn add_raw(&mut self, id: ContainerId, name: &str, bytes: &[u8]) -> Result<String, Error> {
        let new_hash = sha256(bytes);
        let node = self.node(id)?;
        let disk_path = node.path.join(name);
        let existing = match node.entries.get(name) {
            Some(entry) => Some(sha256(&entry.bytes())),
            None if disk_path.is_file() => Some(sha256(&fs::read(&disk_path)?)),
            None => None,
        };

        match existing {
            Some(hash) if hash == new_hash => {
                log::debug!("Skipping identical raw file {name}");
                return Ok(name.to_string());
            }
            Some(_) => {
                let alt = self.alternate_name(id, name)?;
                log::warn!("Raw file {name} differs from existing content; keeping old copy as {alt}");
                let node = self.node_mut(id)?;
                if disk_path.is_file() {
                    fs::rename(&disk_path, node.path.join(&alt))?;
                }
                if let Some(entry) = node.entries.remove(name) {
                    node.entries.insert(alt.clone(), entry);
                }
                if let Some(hash) = node.loaded.remove(name) {
                    node.loaded.insert(alt, hash);
                }
            }
            None => {}
        }

        let node = self.node_mut(id)?;
        node.entries
            .insert(name.to_string(), Entry::Raw(bytes.to_vec()));
        Ok(name.to_string())
    }

    /// Copies an existing file into the container under its own file name.
    pub fn put_file(&mut self, id: ContainerId, file: &Path) -> Result<String, Error> {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::Configuration(format!("not a file path: {}", file.display())))?;
        let bytes = fs::read(file).map_err(|e| {
            Error::Io(io::Error::new(e.kind(), format!("{}: {}", e, file.display())))
        })?;
        self.add_raw(id, &name, &bytes)
    }

    fn alternate_name(&self, id: ContainerId, name: &str) -> Result<String, Error> {
        let node = self.node(id)?;
        let prefix = chrono::Local::now().format("%Y%m%d%H%M%S_").to_string();
        let taken = |candidate: &str| {
            node.entries.contains_key(candidate) || node.path.join(candidate).exists()
        };
        let mut candidate = format!("{prefix}{name}");
        let mut n = 1;
        while taken(&candidate) {
            candidate = format!("{prefix}{n}_{name}");
            n += 1;
        }
        Ok(candidate)
    }

    /// Raw bytes of an entry: cached bytes, serialized object, or disk content.
    pub fn get_raw(&self, id: ContainerId, name: &str) -> Result<Option<Vec<u8>>, Error> {
        let node = self.node(id)?;
        if let Some(entry) = node.entries.get(name) {
            return Ok(Some(entry.bytes().into_owned()));
        }
        let path = node.path.join(name);
        if path.is_file() {
            return Ok(Some(fs::read(path)?));
        }
        Ok(None)
    }

    pub fn exists(&self, id: ContainerId, name: &str) -> Result<bool, Error> {
        let node = self.node(id)?;
        Ok(node.entries.contains_key(name) || node.path.join(name).exists())
    }

    /// Names of cached entries, sorted.
    pub fn entry_names(&self, id: ContainerId) -> Result<Vec<&str>, Error> {
        Ok(self.node(id)?.entries.keys().map(String::as_str).collect())
    }

    /// Drops an entry from the cache and from disk.
    pub fn remove_entry(&mut self, id: ContainerId, name: &str) -> Result<bool, Error> {
        let node = self.node_mut(id)?;
        let cached = node.entries.remove(name).is_some();
        node.loaded.remove(name);
        let path = node.path.join(name);
        let on_disk = path.is_file();
        if on_disk {
            fs::remove_file(path)?;
        }
        Ok(cached || on_disk)
    }

    /// Writes every cached entry, depth first in name order. Files whose bytes
    /// are already on disk are left alone, so repeated flushes are byte-stable.
    pub fn flush(&self) -> Result<(), Error> {
        self.flush_node(Self::ROOT)
    }

    fn flush_node(&self, id: ContainerId) -> Result<(), Error> {
        let node = self.node(id)?;
        fs::create_dir_all(&node.path)?;
        for (name, entry) in &node.entries {
            let bytes = entry.bytes();
            if let Some(src) = node.loaded.get(name)
                && *src == sha256(&bytes)
            {
                continue;
            }
            write_if_changed(&node.path.join(name), &bytes)?;
        }
        for child in node.children.values() {
            self.flush_node(*child)?;
        }
        Ok(())
    }

    /// Deletes the backing directory and detaches the node (and its subtree).
    pub fn clean(&mut self, id: ContainerId) -> Result<(), Error> {
        let node = self.node(id)?;
        let path = node.path.clone();
        let parent = node.parent;
        let name = node.name.clone();
        if path.exists() {
            fs::remove_dir_all(&path)?;
        }
        if let Some(parent) = parent {
            self.nodes[parent.0].children.remove(&name);
        }
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            let node = &mut self.nodes[cur.0];
            node.removed = true;
            node.entries.clear();
            node.loaded.clear();
            stack.extend(node.children.values().copied());
        }
        log::debug!("Cleaned container {}", path.display());
        Ok(())
    }

    /// Flushes, then releases all caches.
    pub fn dispose(self) -> Result<(), Error> {
        self.flush()
    }

    /// Writes the directory tree under the root as a zip archive. The archive
    /// is assembled next to `out` and renamed into place when complete.
    pub fn pack_zip(&self, out: &Path) -> Result<(), Error> {
        let root = &self.node(Self::ROOT)?.path;
        let mut files = Vec::new();
        collect_files(root, root, &mut files)?;
        files.sort();

        let tmp = temp_sibling(out)?;
        {
            let mut zip = zip::ZipWriter::new(tmp.as_file());
            // Fixed timestamps keep repeated packs byte-identical.
            let options = || {
                zip::write::SimpleFileOptions::default()
                    .compression_method(zip::CompressionMethod::Deflated)
                    .last_modified_time(zip::DateTime::default())
            };
            for rel in &files {
                let bytes = fs::read(root.join(rel))?;
                zip.start_file(rel.as_str(), options())?;
                zip.write_all(&bytes)?;
            }
            zip.finish()?;
        }
        tmp.persist(out).map_err(|e| e.error)?;
        log::info!("Packed {} files into {}", files.len(), out.display());
        Ok(())
    }
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<String>) -> Result<(), Error> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(root, &path, out)?;
        } else if let Ok(rel) = path.strip_prefix(root) {
            let rel = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            out.push(rel);
        }
    }
    Ok(())
}

/// Uniquely named temp file next to `path`; concurrent writers of the same
/// target never share one.
fn temp_sibling(path: &Path) -> Result<tempfile::NamedTempFile, Error> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(tempfile::Builder::new()
        .prefix(&format!(".{name}."))
        .suffix(".tmp")
        .tempfile_in(dir)?)
}

/// Atomic replace: the new bytes go to a sibling temp file that is renamed
/// over the target, so readers never see a half-written file.
fn write_if_changed(path: &Path, bytes: &[u8]) -> Result<(), Error> {
    if path.is_file() && fs::read(path)? == bytes {
        return Ok(());
    }
    let mut tmp = temp_sibling(path)?;
    tmp.write_all(bytes)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
