//! Read-only view of a written package, from a directory or a zip archive.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::dom::Element;
use crate::error::Error;
use crate::ofd::{PageRef, ROOT_MANIFEST};
use crate::res::ResKind;

enum Source {
    Dir(PathBuf),
    Zip(zip::ZipArchive<fs::File>),
}

impl Source {
    fn read(&mut self, name: &str) -> Result<Vec<u8>, Error> {
        let missing = || Error::InvalidPackage(format!("missing {name}"));
        match self {
            Source::Dir(root) => {
                let path = root.join(name);
                if !path.is_file() {
                    return Err(missing());
                }
                Ok(fs::read(path)?)
            }
            Source::Zip(zip) => {
                let mut entry = zip.by_name(name).map_err(|_| missing())?;
                let mut bytes = Vec::new();
                entry.read_to_end(&mut bytes)?;
                Ok(bytes)
            }
        }
    }

    fn read_text(&mut self, name: &str) -> Result<String, Error> {
        let bytes = self.read(name)?;
        String::from_utf8(bytes)
            .map(|s| s.trim_start_matches('\u{feff}').to_string())
            .map_err(|_| Error::InvalidPackage(format!("{name} is not valid UTF-8")))
    }
}

/// First child element with local name `name`, whatever its namespace prefix.
fn child<'a>(node: roxmltree::Node<'a, 'a>, name: &str) -> Option<roxmltree::Node<'a, 'a>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

fn child_text(node: roxmltree::Node, name: &str) -> Option<String> {
    child(node, name)
        .and_then(|n| n.text())
        .map(|t| t.trim().to_string())
}

/// Resolves a location relative to `base`; a leading `/` means package root.
fn resolve(base: &str, loc: &str) -> String {
    let loc = loc.trim();
    if let Some(abs) = loc.strip_prefix('/') {
        return abs.to_string();
    }
    let mut parts: Vec<&str> = base.split('/').filter(|p| !p.is_empty()).collect();
    for part in loc.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }
    parts.join("/")
}

/// A resource as listed in a resource manifest.
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceInfo {
    pub id: u32,
    pub kind: ResKind,
    /// Package path of the backing file for raw resources.
    pub file: Option<String>,
}

pub struct PackageReader {
    source: Source,
    doc_root: String,
    doc_dir: String,
    max_unit_id: u32,
    physical_box: Option<[f64; 4]>,
    pages: Vec<PageRef>,
    resources: Vec<ResourceInfo>,
}

impl PackageReader {
    /// Opens a package directory, or a zip archive when `path` is a file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let source = if path.is_dir() {
            Source::Dir(path.to_path_buf())
        } else {
            let file = fs::File::open(path).map_err(|e| {
                Error::Io(io::Error::new(e.kind(), format!("{}: {}", e, path.display())))
            })?;
            let zip = zip::ZipArchive::new(file)
                .map_err(|_| Error::InvalidPackage("file is not a ZIP archive".into()))?;
            Source::Zip(zip)
        };
        let mut reader = Self {
            source,
            doc_root: String::new(),
            doc_dir: String::new(),
            max_unit_id: 0,
            physical_box: None,
            pages: Vec::new(),
            resources: Vec::new(),
        };
        reader.load()?;
        log::debug!(
            "Opened package {}: {} pages, {} resources",
            path.display(),
            reader.pages.len(),
            reader.resources.len()
        );
        Ok(reader)
    }

    fn load(&mut self) -> Result<(), Error> {
        let root_xml = self.source.read_text(ROOT_MANIFEST)?;
        let root_doc = roxmltree::Document::parse(&root_xml)?;
        self.doc_root = child(root_doc.root_element(), "DocBody")
            .and_then(|body| child_text(body, "DocRoot"))
            .map(|loc| resolve("", &loc))
            .ok_or_else(|| Error::InvalidPackage("OFD.xml has no DocRoot".into()))?;
        self.doc_dir = self
            .doc_root
            .rsplit_once('/')
            .map(|(dir, _)| dir.to_string())
            .unwrap_or_default();

        let doc_xml = self.source.read_text(&self.doc_root.clone())?;
        let doc = roxmltree::Document::parse(&doc_xml)?;
        let root = doc.root_element();
        let common = child(root, "CommonData")
            .ok_or_else(|| Error::InvalidPackage("document manifest has no CommonData".into()))?;
        self.max_unit_id = child_text(common, "MaxUnitID")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        self.physical_box = child(common, "PageArea")
            .and_then(|area| child_text(area, "PhysicalBox"))
            .and_then(|text| {
                let v: Vec<f64> = text
                    .split_whitespace()
                    .filter_map(|n| n.parse().ok())
                    .collect();
                v.try_into().ok()
            });

        let mut res_locs = Vec::new();
        for tag in ["PublicRes", "DocumentRes"] {
            for node in common.children().filter(|n| n.tag_name().name() == tag) {
                if let Some(loc) = node.text() {
                    res_locs.push(resolve(&self.doc_dir, loc));
                }
            }
        }

        if let Some(pages) = child(root, "Pages") {
            for page in pages.children().filter(|n| n.tag_name().name() == "Page") {
                let id = page
                    .attribute("ID")
                    .and_then(|v| v.parse().ok())
                    .ok_or_else(|| Error::InvalidPackage("page entry without a valid ID".into()))?;
                let base_loc = page.attribute("BaseLoc").unwrap_or_default().to_string();
                self.pages.push(PageRef { id, base_loc });
            }
        }

        for loc in res_locs {
            self.load_resources(&loc)?;
        }
        Ok(())
    }

    fn load_resources(&mut self, loc: &str) -> Result<(), Error> {
        let xml = self.source.read_text(loc)?;
        let doc = roxmltree::Document::parse(&xml)?;
        let menu = doc.root_element();
        let manifest_dir = loc.rsplit_once('/').map(|(d, _)| d).unwrap_or("");
        let base = resolve(manifest_dir, menu.attribute("BaseLoc").unwrap_or(""));
        for group in menu.children().filter(|n| n.is_element()) {
            let Some(kind) = ResKind::from_group(group.tag_name().name()) else {
                continue;
            };
            for entry in group.children().filter(|n| n.is_element()) {
                let id = entry
                    .attribute("ID")
                    .and_then(|v| v.trim().parse().ok())
                    .ok_or_else(|| {
                        Error::InvalidPackage(format!(
                            "{} entry in {loc} has no valid ID",
                            entry.tag_name().name()
                        ))
                    })?;
                let file = ["MediaFile", "FontFile", "ICCFile"]
                    .iter()
                    .find_map(|tag| child_text(entry, tag))
                    .map(|f| resolve(&base, &f));
                self.resources.push(ResourceInfo { id, kind, file });
            }
        }
        Ok(())
    }

    /// Package path of the document manifest, e.g. `Doc_0/Document.xml`.
    pub fn doc_root(&self) -> &str {
        &self.doc_root
    }

    pub fn max_unit_id(&self) -> u32 {
        self.max_unit_id
    }

    pub fn physical_box(&self) -> Option<[f64; 4]> {
        self.physical_box
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn pages(&self) -> &[PageRef] {
        &self.pages
    }

    pub fn resources(&self) -> &[ResourceInfo] {
        &self.resources
    }

    pub fn resource_ids(&self) -> Vec<u32> {
        self.resources.iter().map(|r| r.id).collect()
    }

    /// Parsed content of the page at `index` in page-tree order.
    pub fn page_content(&mut self, index: usize) -> Result<Element, Error> {
        let page = self
            .pages
            .get(index)
            .ok_or_else(|| Error::State(format!("no page with index {index}")))?;
        let path = resolve(&self.doc_dir, &page.base_loc);
        Element::parse_bytes(&self.source.read(&path)?)
    }

    /// Bytes of a raw resource.
    pub fn resource_bytes(&mut self, id: u32) -> Result<Vec<u8>, Error> {
        let file = self
            .resources
            .iter()
            .find(|r| r.id == id)
            .and_then(|r| r.file.clone())
            .ok_or_else(|| Error::State(format!("no raw resource with id {id}")))?;
        self.source.read(&file)
    }
}
