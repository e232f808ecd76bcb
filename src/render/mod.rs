//! Conversion of placed layout elements into page objects.

mod canvas;
mod div;
mod draw;
mod paragraph;

pub use div::render_box;
pub use draw::DrawContext;

use crate::error::Error;
use crate::ids::IdAllocator;
use crate::layout::{Placement, Segment};
use crate::measure::TextMeasure;
use crate::model::{LayoutElement, ZOrder};
use crate::ofd::{Layer, PageContent};
use crate::res::ResManager;

/// Document state a renderer may draw on: fresh ids, resource registration
/// and text measurement.
pub struct RenderContext<'a> {
    pub ids: &'a mut IdAllocator,
    pub res: &'a mut ResManager,
    pub measure: &'a dyn TextMeasure,
}

impl<'a> RenderContext<'a> {
    pub fn new(
        ids: &'a mut IdAllocator,
        res: &'a mut ResManager,
        measure: &'a dyn TextMeasure,
    ) -> Self {
        Self { ids, res, measure }
    }
}

/// One implementation per element kind. Rendering appends objects to `layer`
/// and never changes the element itself.
pub trait Render {
    fn render(&self, layer: &mut Layer, at: &Placement, cx: &mut RenderContext<'_>)
    -> Result<(), Error>;
}

impl Render for LayoutElement {
    fn render(
        &self,
        layer: &mut Layer,
        at: &Placement,
        cx: &mut RenderContext<'_>,
    ) -> Result<(), Error> {
        match self {
            LayoutElement::Div(e) => e.render(layer, at, cx),
            LayoutElement::Canvas(e) => e.render(layer, at, cx),
            LayoutElement::Cell(e) => e.render(layer, at, cx),
            LayoutElement::Paragraph(e) => e.render(layer, at, cx),
            LayoutElement::PageBreak => Ok(()),
        }
    }
}

/// Renders one page. Elements are grouped into one layer per z-order, back to
/// front; layers that end up empty are left out.
pub fn render_segment(
    segment: &Segment,
    elements: &[LayoutElement],
    cx: &mut RenderContext<'_>,
) -> Result<PageContent, Error> {
    render_layers(&[(segment, elements)], cx)
}

/// Like [`render_segment`] for a page fed from several element lists, e.g.
/// body content plus a header. Within a layer, lists are drawn in order.
pub fn render_layers(
    parts: &[(&Segment, &[LayoutElement])],
    cx: &mut RenderContext<'_>,
) -> Result<PageContent, Error> {
    let mut content = PageContent::default();
    for z in [ZOrder::Background, ZOrder::Body, ZOrder::Foreground] {
        let mut layer = Layer::new(0, z);
        for (segment, elements) in parts {
            for at in segment.placements() {
                let element = elements.get(at.index).ok_or_else(|| {
                    Error::State(format!("placement refers to missing element #{}", at.index))
                })?;
                if element.style().is_some_and(|s| s.z_order == z) {
                    element.render(&mut layer, at, cx)?;
                }
            }
        }
        if !layer.is_empty() {
            layer.id = cx.ids.next_id();
            content.layers.push(layer);
        }
    }
    Ok(content)
}
