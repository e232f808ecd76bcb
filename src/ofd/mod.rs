//! OFD package vocabulary: page objects plus the root and document manifests.

mod objects;

pub use objects::{
    Dash, ImageObject, Layer, PageBlock, PageContent, PageObject, PathCmd, PathData, PathObject,
    StBox, TextCode, TextObject,
};

use crate::dom::{Element, fmt_nums};
use crate::model::PageLayout;

pub const ROOT_MANIFEST: &str = "OFD.xml";
pub const DOC_DIR: &str = "Doc_0";
pub const DOC_MANIFEST: &str = "Document.xml";
pub const PUBLIC_RES: &str = "PublicRes.xml";
pub const DOCUMENT_RES: &str = "DocumentRes.xml";
pub const RES_DIR: &str = "Res";
pub const PAGES_DIR: &str = "Pages";
pub const PAGE_CONTENT: &str = "Content.xml";

/// Directory name of the page at `index` (zero based) below `Pages/`.
pub fn page_dir(index: usize) -> String {
    format!("Page_{index}")
}

/// Metadata recorded in `OFD.xml`.
#[derive(Clone, Debug, PartialEq)]
pub struct DocInfo {
    pub doc_id: String,
    pub creation_date: String,
    pub creator: String,
}

/// `OFD.xml`: a single DocBody pointing at the document manifest.
pub fn root_manifest(info: &DocInfo) -> Element {
    let doc_info = Element::new("DocInfo")
        .with_child(Element::text_node("DocID", info.doc_id.clone()))
        .with_child(Element::text_node("CreationDate", info.creation_date.clone()))
        .with_child(Element::text_node("Creator", info.creator.clone()));
    let body = Element::new("DocBody")
        .with_child(doc_info)
        .with_child(Element::text_node(
            "DocRoot",
            format!("{DOC_DIR}/{DOC_MANIFEST}"),
        ));
    Element::new("OFD")
        .with_attr("Version", "1.1")
        .with_attr("DocType", "OFD")
        .with_child(body)
}

/// Page tree entry: page object id plus content location relative to the
/// document directory.
#[derive(Clone, Debug, PartialEq)]
pub struct PageRef {
    pub id: u32,
    pub base_loc: String,
}

impl PageRef {
    pub fn for_index(id: u32, index: usize) -> Self {
        Self {
            id,
            base_loc: format!("{PAGES_DIR}/{}/{PAGE_CONTENT}", page_dir(index)),
        }
    }
}

/// `Document.xml`: CommonData followed by the page tree.
pub fn document_manifest(
    max_unit_id: u32,
    layout: &PageLayout,
    public_res: Option<&str>,
    document_res: Option<&str>,
    pages: &[PageRef],
) -> Element {
    let mut common = Element::new("CommonData")
        .with_child(Element::text_node("MaxUnitID", max_unit_id.to_string()))
        .with_child(
            Element::new("PageArea")
                .with_child(Element::text_node("PhysicalBox", fmt_nums(&layout.physical_box()))),
        );
    if let Some(loc) = public_res {
        common.push(Element::text_node("PublicRes", loc));
    }
    if let Some(loc) = document_res {
        common.push(Element::text_node("DocumentRes", loc));
    }

    let mut tree = Element::new("Pages");
    for page in pages {
        tree.push(
            Element::new("Page")
                .with_attr("ID", page.id)
                .with_attr("BaseLoc", page.base_loc.as_str()),
        );
    }
    Element::new("Document").with_child(common).with_child(tree)
}
