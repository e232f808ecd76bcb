//! Resource registry for one document.
//!
//! Fonts and colour spaces are listed in `PublicRes.xml`; images, drawing
//! parameters and composite graphic units in `DocumentRes.xml`. Raw payloads
//! are stored under `Res/` as `<id>.<ext>`.

use std::collections::HashMap;

use crate::container::{ContainerId, ContainerTree, Digest32, sha256};
use crate::dom::Element;
use crate::error::Error;
use crate::ids::IdAllocator;
use crate::model::FontSpec;
use crate::ofd::{DOCUMENT_RES, PUBLIC_RES, RES_DIR};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResKind {
    Font,
    ColorSpace,
    Image,
    DrawParam,
    VectorGraphic,
}

impl ResKind {
    const ALL: [ResKind; 5] = [
        ResKind::Font,
        ResKind::ColorSpace,
        ResKind::Image,
        ResKind::DrawParam,
        ResKind::VectorGraphic,
    ];

    /// Fonts and colour spaces are shared across documents.
    pub fn is_public(self) -> bool {
        matches!(self, ResKind::Font | ResKind::ColorSpace)
    }

    /// Manifest group and entry element names.
    fn tags(self) -> (&'static str, &'static str) {
        match self {
            ResKind::Font => ("Fonts", "Font"),
            ResKind::ColorSpace => ("ColorSpaces", "ColorSpace"),
            ResKind::Image => ("MultiMedias", "MultiMedia"),
            ResKind::DrawParam => ("DrawParams", "DrawParam"),
            ResKind::VectorGraphic => ("CompositeGraphicUnits", "CompositeGraphicUnit"),
        }
    }

    /// Child element naming the backing file of a raw payload.
    fn file_tag(self) -> &'static str {
        match self {
            ResKind::Font => "FontFile",
            ResKind::ColorSpace => "ICCFile",
            _ => "MediaFile",
        }
    }

    pub(crate) fn from_group(name: &str) -> Option<ResKind> {
        Self::ALL.into_iter().find(|k| k.tags().0 == name)
    }
}

/// What gets registered.
#[derive(Clone, Debug)]
pub enum ResPayload {
    /// Bytes stored as a file; `descriptor` is the manifest entry that will
    /// receive the id and a file reference.
    Raw {
        bytes: Vec<u8>,
        ext: String,
        descriptor: Element,
    },
    /// Manifest-only entry, fingerprinted over its markup without `ID`.
    Structural(Element),
}

#[derive(Clone, Debug)]
pub struct ResEntry {
    pub id: u32,
    pub kind: ResKind,
    pub fingerprint: Digest32,
    pub element: Element,
}

#[derive(Debug)]
pub struct ResManager {
    root: ContainerId,
    doc_dir: ContainerId,
    entries: Vec<ResEntry>,
    by_fingerprint: HashMap<(ResKind, Digest32), u32>,
    /// Raw files not yet handed to the container tree.
    pending: Vec<(String, Vec<u8>)>,
}

fn structural_fingerprint(element: &Element) -> Digest32 {
    let mut normalized = element.clone();
    normalized.remove_attr("ID");
    sha256(&normalized.to_fragment_bytes())
}

impl ResManager {
    pub fn new(root: ContainerId, doc_dir: ContainerId) -> Self {
        Self {
            root,
            doc_dir,
            entries: Vec::new(),
            by_fingerprint: HashMap::new(),
            pending: Vec::new(),
        }
    }

    /// Rebuilds the registry from the manifests already present in `doc_dir`.
    pub fn load(
        tree: &mut ContainerTree,
        root: ContainerId,
        doc_dir: ContainerId,
    ) -> Result<Self, Error> {
        let mut manager = Self::new(root, doc_dir);
        let res_dir = tree.get_container(doc_dir, RES_DIR)?;
        for manifest in [PUBLIC_RES, DOCUMENT_RES] {
            let Some(menu) = tree.get_obj(doc_dir, manifest)?.cloned() else {
                continue;
            };
            for group in menu.elements() {
                let Some(kind) = ResKind::from_group(group.name()) else {
                    log::debug!("Ignoring unknown resource group {}", group.name());
                    continue;
                };
                for entry in group.elements() {
                    let Some(id) = entry.attr("ID").and_then(|v| v.trim().parse::<u32>().ok())
                    else {
                        return Err(Error::InvalidPackage(format!(
                            "{} entry in {manifest} has no valid ID",
                            entry.name()
                        )));
                    };
                    let file_bytes = match (entry.child(kind.file_tag()), res_dir) {
                        (Some(file), Some(dir)) => tree.get_raw(dir, file.text().trim())?,
                        _ => None,
                    };
                    let fingerprint = match &file_bytes {
                        Some(bytes) => sha256(bytes),
                        None => structural_fingerprint(entry),
                    };
                    manager.by_fingerprint.insert((kind, fingerprint), id);
                    manager.entries.push(ResEntry {
                        id,
                        kind,
                        fingerprint,
                        element: entry.clone(),
                    });
                }
            }
        }
        log::debug!("Reloaded {} resources", manager.entries.len());
        Ok(manager)
    }

    pub fn root(&self) -> ContainerId {
        self.root
    }

    pub fn doc_dir(&self) -> ContainerId {
        self.doc_dir
    }

    /// The `Res` directory below the document directory, created on demand.
    pub fn res_dir(&self, tree: &mut ContainerTree) -> Result<ContainerId, Error> {
        tree.obtain_container(self.doc_dir, RES_DIR)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resource ids in registration order.
    pub fn ids(&self) -> Vec<u32> {
        self.entries.iter().map(|e| e.id).collect()
    }

    pub fn entries(&self) -> &[ResEntry] {
        &self.entries
    }

    pub fn get(&self, id: u32) -> Option<&ResEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Registers a resource, returning the id of an identical existing entry
    /// of the same kind if there is one.
    pub fn register(&mut self, ids: &mut IdAllocator, kind: ResKind, payload: ResPayload) -> u32 {
        let fingerprint = match &payload {
            ResPayload::Raw { bytes, .. } => sha256(bytes),
            ResPayload::Structural(element) => structural_fingerprint(element),
        };
        if let Some(id) = self.by_fingerprint.get(&(kind, fingerprint)) {
            log::trace!("Reusing {kind:?} resource {id}");
            return *id;
        }

        let id = ids.next_id();
        let element = match payload {
            ResPayload::Raw {
                bytes,
                ext,
                mut descriptor,
            } => {
                let file = format!("{id}.{ext}");
                descriptor.set_attr("ID", id);
                descriptor.remove_children(kind.file_tag());
                descriptor.push(Element::text_node(kind.file_tag(), file.as_str()));
                self.pending.push((file, bytes));
                descriptor
            }
            ResPayload::Structural(mut element) => {
                element.set_attr("ID", id);
                element
            }
        };
        log::debug!("Registered {kind:?} resource {id}");
        self.by_fingerprint.insert((kind, fingerprint), id);
        self.entries.push(ResEntry {
            id,
            kind,
            fingerprint,
            element,
        });
        id
    }

    /// Embeds an encoded image. Only formats recognisable from their magic
    /// bytes are accepted.
    pub fn add_image(&mut self, ids: &mut IdAllocator, bytes: &[u8]) -> Result<u32, Error> {
        let format = image::guess_format(bytes)
            .map_err(|e| Error::render_with("unrecognised image data", e.into()))?;
        let ext = format.extensions_str().first().copied().unwrap_or("bin");
        let format_name = match format {
            image::ImageFormat::Jpeg => "JPEG".to_string(),
            image::ImageFormat::Tiff => "TIFF".to_string(),
            _ => ext.to_ascii_uppercase(),
        };
        let descriptor = Element::new("MultiMedia")
            .with_attr("Type", "Image")
            .with_attr("Format", format_name);
        Ok(self.register(
            ids,
            ResKind::Image,
            ResPayload::Raw {
                bytes: bytes.to_vec(),
                ext: ext.to_string(),
                descriptor,
            },
        ))
    }

    /// Declares a font, embedding `file` when given.
    pub fn add_font(&mut self, ids: &mut IdAllocator, font: &FontSpec, file: Option<&[u8]>) -> u32 {
        let mut descriptor = Element::new("Font").with_attr("FontName", font.name.as_str());
        if let Some(family) = &font.family {
            descriptor.set_attr("FamilyName", family.as_str());
            match family.to_ascii_lowercase().as_str() {
                "serif" => {
                    descriptor.set_attr("Serif", "true");
                }
                "bold" => {
                    descriptor.set_attr("Bold", "true");
                }
                "italic" => {
                    descriptor.set_attr("Italic", "true");
                }
                "fixedwidth" => {
                    descriptor.set_attr("FixedWidth", "true");
                }
                _ => {}
            }
        }
        let payload = match file {
            Some(bytes) => ResPayload::Raw {
                ext: if bytes.starts_with(b"OTTO") { "otf" } else { "ttf" }.to_string(),
                bytes: bytes.to_vec(),
                descriptor,
            },
            None => ResPayload::Structural(descriptor),
        };
        self.register(ids, ResKind::Font, payload)
    }

    pub fn add_draw_param(&mut self, ids: &mut IdAllocator, param: Element) -> u32 {
        self.register(ids, ResKind::DrawParam, ResPayload::Structural(param))
    }

    /// Last font whose name or family matches `name`, ignoring case.
    pub fn find_font(&self, name: &str) -> Option<u32> {
        let name = name.to_lowercase();
        self.entries
            .iter()
            .filter(|e| e.kind == ResKind::Font)
            .filter(|e| {
                ["FontName", "FamilyName"]
                    .iter()
                    .any(|attr| e.element.attr(attr).is_some_and(|v| v.to_lowercase() == name))
            })
            .map(|e| e.id)
            .last()
    }

    /// Location of `PublicRes.xml` relative to the document directory, if any
    /// public resource exists.
    pub fn public_res_loc(&self) -> Option<&'static str> {
        self.entries
            .iter()
            .any(|e| e.kind.is_public())
            .then_some(PUBLIC_RES)
    }

    pub fn document_res_loc(&self) -> Option<&'static str> {
        self.entries
            .iter()
            .any(|e| !e.kind.is_public())
            .then_some(DOCUMENT_RES)
    }

    fn manifest(&self, public: bool) -> Element {
        let mut menu = Element::new("Res").with_attr("BaseLoc", RES_DIR);
        for kind in ResKind::ALL.into_iter().filter(|k| k.is_public() == public) {
            let (group_tag, _) = kind.tags();
            let mut group = Element::new(group_tag);
            for entry in self.entries.iter().filter(|e| e.kind == kind) {
                group.push(entry.element.clone());
            }
            if !group.is_empty() {
                menu.push(group);
            }
        }
        menu
    }

    /// Hands the manifests and pending raw files to the container tree.
    pub fn flush(&mut self, tree: &mut ContainerTree) -> Result<(), Error> {
        if self.public_res_loc().is_some() {
            tree.put_obj(self.doc_dir, PUBLIC_RES, self.manifest(true))?;
        }
        if self.document_res_loc().is_some() {
            tree.put_obj(self.doc_dir, DOCUMENT_RES, self.manifest(false))?;
        }
        if !self.pending.is_empty() {
            let res_dir = self.res_dir(tree)?;
            // An entry leaves the queue only once the tree holds it.
            while let Some((name, bytes)) = self.pending.first() {
                tree.add_raw(res_dir, name, bytes)?;
                self.pending.remove(0);
            }
        }
        Ok(())
    }
}
