use crate::error::Error;
use crate::ids::IdAllocator;
use crate::layout::Placement;
use crate::model::{BorderEdge, Div, Style};
use crate::ofd::{Dash, Layer, PageObject, PathData, PathObject, StBox};

use super::{Render, RenderContext};

/// Border widths closer than this count as equal; a width below it is no
/// border at all.
const WIDTH_TOLERANCE: f64 = 1e-5;

impl Render for Div {
    fn render(
        &self,
        layer: &mut Layer,
        at: &Placement,
        cx: &mut RenderContext<'_>,
    ) -> Result<(), Error> {
        render_box(&self.style, at, layer, cx.ids)
    }
}

fn edge_path(
    ids: &mut IdAllocator,
    edge: &BorderEdge,
    boundary: StBox,
    data: PathData,
    opacity: Option<f64>,
) -> Result<PathObject, Error> {
    let mut obj = PathObject::new(ids.next_id(), boundary, data);
    obj.line_width = Some(edge.width);
    obj.stroke_color = Some(edge.color.unwrap_or([0, 0, 0]));
    obj.dash = edge.dash.as_deref().map(Dash::from_layout).transpose()?;
    obj.set_opacity(opacity);
    Ok(obj)
}

/// Background and border paths of an element's box. Emits nothing when the
/// box has neither.
pub fn render_box(
    style: &Style,
    at: &Placement,
    layer: &mut Layer,
    ids: &mut IdAllocator,
) -> Result<(), Error> {
    let b = &style.boxed;
    let bw = b.border.widths();
    if style.background.is_none() && b.border.is_none() {
        return Ok(());
    }
    if [bw.top, bw.right, bw.bottom, bw.left]
        .iter()
        .any(|w| !w.is_finite() || *w < 0.0)
    {
        return Err(Error::render(format!("invalid border widths {bw:?}")));
    }

    let (w, h) = (at.content_width, at.content_height);
    let p = &b.padding;
    let x0 = at.x + b.margin.left;
    let y0 = at.y + b.margin.top;

    if let Some(color) = style.background
        && p.top + h + p.bottom > WIDTH_TOLERANCE
        && p.left + w + p.right > WIDTH_TOLERANCE
    {
        let bg = StBox::new(
            x0 + bw.left,
            y0 + bw.top,
            p.left + w + p.right,
            p.top + h + p.bottom,
        );
        let mut obj = PathObject::new(ids.next_id(), bg, PathData::rect(0.0, 0.0, bg.w, bg.h));
        obj.stroke = false;
        obj.fill = true;
        obj.fill_color = Some(color);
        obj.set_opacity(style.opacity);
        layer.add(PageObject::Path(obj));
    }

    if b.border.is_none() {
        return Ok(());
    }

    let uniform = [bw.right, bw.bottom, bw.left]
        .iter()
        .all(|v| (v - bw.top).abs() < WIDTH_TOLERANCE);
    if uniform {
        // One rectangle along the centre line of the border band.
        let lw = bw.top;
        let outer = StBox::new(
            x0,
            y0,
            lw + p.left + w + p.right + lw,
            lw + p.top + h + p.bottom + lw,
        );
        let data = PathData::rect(lw / 2.0, lw / 2.0, outer.w - lw, outer.h - lw);
        let obj = edge_path(ids, &b.border.top, outer, data, style.opacity)?;
        layer.add(PageObject::Path(obj));
        return Ok(());
    }

    let outer_w = bw.left + p.left + w + p.right + bw.right;
    let outer_h = bw.top + p.top + h + p.bottom + bw.bottom;
    let horizontal = |y: f64, t: f64| {
        (
            StBox::new(x0, y, outer_w, t),
            PathData::new().move_to(0.0, t / 2.0).line_to(outer_w, t / 2.0),
        )
    };
    let vertical = |x: f64, t: f64| {
        (
            StBox::new(x, y0, t, outer_h),
            PathData::new().move_to(t / 2.0, 0.0).line_to(t / 2.0, outer_h),
        )
    };
    let edges = [
        (&b.border.top, horizontal(y0, bw.top)),
        (
            &b.border.right,
            vertical(x0 + bw.left + p.left + w + p.right, bw.right),
        ),
        (
            &b.border.bottom,
            horizontal(y0 + bw.top + p.top + h + p.bottom, bw.bottom),
        ),
        (&b.border.left, vertical(x0, bw.left)),
    ];
    for (edge, (boundary, data)) in edges {
        if edge.width > WIDTH_TOLERANCE {
            let obj = edge_path(ids, edge, boundary, data, style.opacity)?;
            layer.add(PageObject::Path(obj));
        }
    }
    Ok(())
}
