pub mod container;
mod document;
pub mod dom;
mod error;
mod ids;
pub mod layout;
pub mod measure;
pub mod model;
pub mod ofd;
pub mod reader;
pub mod render;
pub mod res;

pub use container::{ContainerId, ContainerTree};
pub use document::{DocState, Document, DocumentOptions, PackageFormat};
pub use error::{BoxError, Error};
pub use ids::IdAllocator;
pub use layout::{Placement, Segment, SegmentationEngine};
pub use model::{
    BorderEdge, Borders, BoxModel, Canvas, Cell, CellValue, Div, Drawer, Edges, FontSpec,
    LayoutElement, PageHandler, PageLayout, Paragraph, Rgb, Style, Styled, TextAlign, VirtualPage,
    ZOrder,
};
pub use reader::PackageReader;
pub use render::{DrawContext, Render, RenderContext};
pub use res::{ResKind, ResManager, ResPayload};
