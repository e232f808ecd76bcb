use std::cell::OnceCell;

use crate::error::Error;
use crate::layout::{Placement, content_origin, wrap_lines};
use crate::model::{Canvas, Cell, CellValue, Style, TextAlign};
use crate::ofd::{Layer, PageBlock, PageObject, StBox};

use super::draw::DrawContext;
use super::{Render, RenderContext, render_box};

fn content_box(style: &Style, at: &Placement) -> StBox {
    let (x, y) = content_origin(style, at);
    StBox::new(x, y, at.content_width, at.content_height)
}

fn alpha(style: &Style) -> Option<u8> {
    style
        .opacity
        .map(|o| (o.clamp(0.0, 1.0) * 255.0).round() as u8)
}

/// Runs `draw` against a fresh block bound to the element's persistent id.
/// The block is added to the layer only if drawing succeeds.
fn draw_block<F>(
    slot: &OnceCell<u32>,
    style: &Style,
    at: &Placement,
    layer: &mut Layer,
    cx: &mut RenderContext<'_>,
    draw: F,
) -> Result<(), Error>
where
    F: FnOnce(&mut DrawContext<'_>) -> Result<(), Error>,
{
    let id = *slot.get_or_init(|| cx.ids.next_id());
    let mut block = PageBlock::new(id);
    {
        let mut ctx = DrawContext::new(&mut block.objects, content_box(style, at), cx);
        ctx.set_alpha_byte(alpha(style));
        draw(&mut ctx)?;
    }
    layer.add(PageObject::Block(block));
    Ok(())
}

impl Render for Canvas {
    fn render(
        &self,
        layer: &mut Layer,
        at: &Placement,
        cx: &mut RenderContext<'_>,
    ) -> Result<(), Error> {
        render_box(&self.style, at, layer, cx.ids)?;
        let Some(drawer) = self.drawer() else {
            return Ok(());
        };
        draw_block(self.block_slot(), &self.style, at, layer, cx, |ctx| {
            drawer
                .draw(ctx)
                .map_err(|e| Error::render_with("canvas drawer failed", e))
        })
    }
}

impl Render for Cell {
    fn render(
        &self,
        layer: &mut Layer,
        at: &Placement,
        cx: &mut RenderContext<'_>,
    ) -> Result<(), Error> {
        render_box(&self.style, at, layer, cx.ids)?;
        match &self.value {
            CellValue::Empty => Ok(()),
            CellValue::Text(text) => {
                let lines = wrap_lines(text, &self.font, 0.0, at.content_width, cx.measure);
                draw_block(self.block_slot(), &self.style, at, layer, cx, |ctx| {
                    ctx.set_font(self.font.clone());
                    ctx.set_fill_color(self.color);
                    ctx.set_text_align(self.align);
                    let size = self.font.size;
                    let pitch = size * self.line_height;
                    let top = (ctx.height() - pitch * lines.len() as f64) / 2.0;
                    let x = match self.align {
                        TextAlign::Left => 0.0,
                        TextAlign::Center => ctx.width() / 2.0,
                        TextAlign::Right => ctx.width(),
                    };
                    for (i, line) in lines.iter().enumerate() {
                        let baseline = top + pitch * i as f64 + (pitch - size) / 2.0 + size;
                        ctx.fill_text(&line.text, x, baseline)?;
                    }
                    Ok(())
                })
            }
            CellValue::Image {
                data,
                width,
                height,
            } => draw_block(self.block_slot(), &self.style, at, layer, cx, |ctx| {
                let w = width.unwrap_or(ctx.width());
                let h = height.unwrap_or(ctx.height());
                let x = (ctx.width() - w) / 2.0;
                let y = (ctx.height() - h) / 2.0;
                ctx.draw_image(data, x, y, w, h)
            }),
        }
    }
}
