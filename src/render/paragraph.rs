use crate::error::Error;
use crate::layout::{Placement, content_origin, wrap_lines};
use crate::model::{Paragraph, TextAlign};
use crate::ofd::{Layer, PageObject, StBox, TextCode, TextObject};

use super::{Render, RenderContext, render_box};

impl Render for Paragraph {
    fn render(
        &self,
        layer: &mut Layer,
        at: &Placement,
        cx: &mut RenderContext<'_>,
    ) -> Result<(), Error> {
        render_box(&self.style, at, layer, cx.ids)?;

        let lines = wrap_lines(
            &self.text,
            &self.font,
            self.letter_spacing,
            at.content_width,
            cx.measure,
        );
        if lines.iter().all(|l| l.text.is_empty()) {
            return Ok(());
        }
        let font_id = cx.res.add_font(cx.ids, &self.font, None);
        let (x0, y0) = content_origin(&self.style, at);
        let size = self.font.size;
        let pitch = size * self.line_height;
        let alpha = self
            .style
            .opacity
            .map(|o| (o.clamp(0.0, 1.0) * 255.0).round() as u8);

        for (i, line) in lines.iter().enumerate() {
            if line.text.is_empty() {
                continue;
            }
            let x = match self.align {
                TextAlign::Left => 0.0,
                TextAlign::Center => (at.content_width - line.width) / 2.0,
                TextAlign::Right => at.content_width - line.width,
            };
            let mut delta_x: Vec<f64> = line
                .text
                .chars()
                .map(|ch| cx.measure.advance(ch, &self.font) + self.letter_spacing)
                .collect();
            delta_x.pop();
            let text = TextObject {
                id: cx.ids.next_id(),
                boundary: StBox::new(x0, y0 + pitch * i as f64, at.content_width, pitch),
                font: font_id,
                size,
                fill_color: Some(self.color),
                alpha,
                codes: vec![TextCode {
                    x,
                    y: (pitch - size) / 2.0 + size,
                    delta_x,
                    text: line.text.clone(),
                }],
            };
            layer.add(PageObject::Text(text));
        }
        Ok(())
    }
}
