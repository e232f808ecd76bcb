use crate::error::Error;
use crate::ids::IdAllocator;
use crate::measure::{TextMeasure, TextMetrics};
use crate::model::{FontSpec, Rgb, TextAlign};
use crate::ofd::{Dash, ImageObject, PageObject, PathCmd, PathData, PathObject, StBox, TextCode, TextObject};
use crate::res::ResManager;

use super::RenderContext;

/// Default stroke width: 1pt.
const DEFAULT_LINE_WIDTH: f64 = 0.353;

#[derive(Clone, Debug)]
struct CanvasState {
    fill_color: Rgb,
    stroke_color: Rgb,
    line_width: f64,
    dash: Option<Dash>,
    alpha: Option<u8>,
    font: FontSpec,
    text_align: TextAlign,
}

/// Path-building surface handed to canvas drawers.
///
/// Coordinates are millimetres relative to the top-left corner of the canvas
/// content box. Only one path is open at a time; `fill` and `stroke` turn it
/// into a single path object and consume it.
pub struct DrawContext<'a> {
    objects: &'a mut Vec<PageObject>,
    boundary: StBox,
    ids: &'a mut IdAllocator,
    res: &'a mut ResManager,
    measure: &'a dyn TextMeasure,
    state: CanvasState,
    stack: Vec<CanvasState>,
    path: PathData,
    subpath_start: Option<(f64, f64)>,
}

impl<'a> DrawContext<'a> {
    pub(crate) fn new(
        objects: &'a mut Vec<PageObject>,
        boundary: StBox,
        cx: &'a mut RenderContext<'_>,
    ) -> Self {
        Self {
            objects,
            boundary,
            ids: &mut *cx.ids,
            res: &mut *cx.res,
            measure: cx.measure,
            state: CanvasState {
                fill_color: [0, 0, 0],
                stroke_color: [0, 0, 0],
                line_width: DEFAULT_LINE_WIDTH,
                dash: None,
                alpha: None,
                font: FontSpec::default(),
                text_align: TextAlign::Left,
            },
            stack: Vec::new(),
            path: PathData::new(),
            subpath_start: None,
        }
    }

    /// Canvas content box in page coordinates.
    pub fn boundary(&self) -> StBox {
        self.boundary
    }

    pub fn width(&self) -> f64 {
        self.boundary.w
    }

    pub fn height(&self) -> f64 {
        self.boundary.h
    }

    /// Starts a new path. An unfinished previous path is dropped.
    pub fn begin_path(&mut self) {
        if !self.path.is_empty() {
            log::trace!(
                "Discarding unfinished path of {} commands",
                self.path.cmds().len()
            );
        }
        self.path = PathData::new();
        self.subpath_start = None;
    }

    pub fn move_to(&mut self, x: f64, y: f64) {
        self.path.push(PathCmd::Move(x, y));
        self.subpath_start = Some((x, y));
    }

    pub fn line_to(&mut self, x: f64, y: f64) {
        if self.subpath_start.is_none() {
            self.move_to(x, y);
            return;
        }
        self.path.push(PathCmd::Line(x, y));
    }

    pub fn quadratic_curve_to(&mut self, cpx: f64, cpy: f64, x: f64, y: f64) {
        if self.subpath_start.is_none() {
            self.move_to(cpx, cpy);
        }
        self.path.push(PathCmd::Quad(cpx, cpy, x, y));
    }

    pub fn bezier_curve_to(&mut self, cp1x: f64, cp1y: f64, cp2x: f64, cp2y: f64, x: f64, y: f64) {
        if self.subpath_start.is_none() {
            self.move_to(cp1x, cp1y);
        }
        self.path.push(PathCmd::Cubic(cp1x, cp1y, cp2x, cp2y, x, y));
    }

    /// Adds a closed four-corner subpath.
    pub fn rect(&mut self, x: f64, y: f64, w: f64, h: f64) {
        for cmd in PathData::rect(x, y, w, h).cmds() {
            self.path.push(*cmd);
        }
        self.subpath_start = Some((x, y));
    }

    pub fn close_path(&mut self) {
        if self.subpath_start.is_some() {
            self.path.push(PathCmd::Close);
        }
    }

    pub fn set_fill_color(&mut self, color: Rgb) {
        self.state.fill_color = color;
    }

    pub fn set_stroke_color(&mut self, color: Rgb) {
        self.state.stroke_color = color;
    }

    pub fn set_line_width(&mut self, width: f64) {
        if width.is_finite() && width > 0.0 {
            self.state.line_width = width;
        }
    }

    /// Sets the dash as `[offset, dash, gap, ...]`; an empty slice turns
    /// dashing off.
    pub fn set_line_dash(&mut self, dash: &[f64]) -> Result<(), Error> {
        self.state.dash = if dash.is_empty() {
            None
        } else {
            Some(Dash::from_layout(dash)?)
        };
        Ok(())
    }

    /// 0.0 (transparent) ..= 1.0 (opaque).
    pub fn set_global_alpha(&mut self, alpha: f64) {
        if alpha.is_finite() {
            self.state.alpha = Some((alpha.clamp(0.0, 1.0) * 255.0).round() as u8);
        }
    }

    pub(crate) fn set_alpha_byte(&mut self, alpha: Option<u8>) {
        self.state.alpha = alpha;
    }

    pub fn set_font(&mut self, font: FontSpec) {
        self.state.font = font;
    }

    pub fn set_text_align(&mut self, align: TextAlign) {
        self.state.text_align = align;
    }

    pub fn save(&mut self) {
        self.stack.push(self.state.clone());
    }

    pub fn restore(&mut self) {
        if let Some(state) = self.stack.pop() {
            self.state = state;
        }
    }

    fn take_path(&mut self) -> Result<Option<PathData>, Error> {
        let path = std::mem::take(&mut self.path);
        self.subpath_start = None;
        let drawable = path
            .cmds()
            .iter()
            .any(|c| !matches!(c, PathCmd::Move(..) | PathCmd::Close));
        if !drawable {
            return Ok(None);
        }
        if !path.is_finite() {
            return Err(Error::render("path has non-finite coordinates"));
        }
        Ok(Some(path))
    }

    /// Fills the current path and consumes it.
    pub fn fill(&mut self) -> Result<(), Error> {
        let Some(data) = self.take_path()? else {
            return Ok(());
        };
        let mut obj = PathObject::new(self.ids.next_id(), self.boundary, data);
        obj.stroke = false;
        obj.fill = true;
        obj.fill_color = Some(self.state.fill_color);
        obj.alpha = self.state.alpha;
        self.objects.push(PageObject::Path(obj));
        Ok(())
    }

    /// Strokes the current path and consumes it.
    pub fn stroke(&mut self) -> Result<(), Error> {
        let Some(data) = self.take_path()? else {
            return Ok(());
        };
        let mut obj = PathObject::new(self.ids.next_id(), self.boundary, data);
        obj.line_width = Some(self.state.line_width);
        obj.stroke_color = Some(self.state.stroke_color);
        obj.dash = self.state.dash.clone();
        obj.alpha = self.state.alpha;
        self.objects.push(PageObject::Path(obj));
        Ok(())
    }

    /// Fills a rectangle without touching the current path.
    pub fn fill_rect(&mut self, x: f64, y: f64, w: f64, h: f64) -> Result<(), Error> {
        let saved = std::mem::replace(&mut self.path, PathData::rect(x, y, w, h));
        let start = self.subpath_start.replace((x, y));
        let result = self.fill();
        self.path = saved;
        self.subpath_start = start;
        result
    }

    pub fn stroke_rect(&mut self, x: f64, y: f64, w: f64, h: f64) -> Result<(), Error> {
        let saved = std::mem::replace(&mut self.path, PathData::rect(x, y, w, h));
        let start = self.subpath_start.replace((x, y));
        let result = self.stroke();
        self.path = saved;
        self.subpath_start = start;
        result
    }

    pub fn measure_text(&self, text: &str) -> TextMetrics {
        self.measure.measure(text, &self.state.font)
    }

    /// Draws `text` with its baseline at `y`; `x` is interpreted according to
    /// the current text alignment.
    pub fn fill_text(&mut self, text: &str, x: f64, y: f64) -> Result<(), Error> {
        if text.is_empty() {
            return Ok(());
        }
        if !(x.is_finite() && y.is_finite()) {
            return Err(Error::render("text position is not finite"));
        }
        let font = self.state.font.clone();
        let advances: Vec<f64> = text
            .chars()
            .map(|ch| self.measure.advance(ch, &font))
            .collect();
        let width = self.measure_text(text).width;
        let x = match self.state.text_align {
            TextAlign::Left => x,
            TextAlign::Center => x - width / 2.0,
            TextAlign::Right => x - width,
        };
        let font_id = self.res.add_font(self.ids, &font, None);
        let obj = TextObject {
            id: self.ids.next_id(),
            boundary: self.boundary,
            font: font_id,
            size: font.size,
            fill_color: Some(self.state.fill_color),
            alpha: self.state.alpha,
            codes: vec![TextCode {
                x,
                y,
                delta_x: advances[..advances.len() - 1].to_vec(),
                text: text.to_string(),
            }],
        };
        self.objects.push(PageObject::Text(obj));
        Ok(())
    }

    /// Places an encoded image in the rectangle `x, y, w, h`.
    pub fn draw_image(&mut self, data: &[u8], x: f64, y: f64, w: f64, h: f64) -> Result<(), Error> {
        let boundary = StBox::new(self.boundary.x + x, self.boundary.y + y, w, h);
        if !boundary.is_finite() || w <= 0.0 || h <= 0.0 {
            return Err(Error::render(format!("invalid image box {boundary}")));
        }
        let resource = self.res.add_image(self.ids, data)?;
        self.objects.push(PageObject::Image(ImageObject {
            id: self.ids.next_id(),
            boundary,
            resource,
            alpha: self.state.alpha,
        }));
        Ok(())
    }
}

impl Drop for DrawContext<'_> {
    fn drop(&mut self) {
        if !self.path.is_empty() {
            log::trace!("Canvas closed with an unfinished path; discarded");
        }
    }
}
