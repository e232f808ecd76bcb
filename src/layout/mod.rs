//! Pagination: assigns layout elements to successive pages.

mod text;

use std::sync::Arc;

pub use text::{TextLine, wrap_lines};

use crate::error::Error;
use crate::measure::{FixedAdvance, TextMeasure};
use crate::model::{CellValue, LayoutElement, PageLayout, Style};

/// Tolerance of the fit test, so heights that sum exactly to the content
/// height are not pushed to the next page by rounding.
pub const EPS: f64 = 1e-6;

/// Where one element lands on its page. Coordinates are page millimetres of
/// the margin box's top-left corner.
#[derive(Clone, Debug, PartialEq)]
pub struct Placement {
    /// Index into the element list given to [`SegmentationEngine::process`].
    pub index: usize,
    pub x: f64,
    pub y: f64,
    /// Outer (margin box) size.
    pub width: f64,
    pub height: f64,
    /// Resolved content box size.
    pub content_width: f64,
    pub content_height: f64,
    /// False for anchored elements, which take no part in the vertical flow.
    pub flowed: bool,
}

/// The elements of exactly one physical page.
#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    placements: Vec<Placement>,
    layout: PageLayout,
    used_height: f64,
}

impl Segment {
    fn new(layout: &PageLayout) -> Self {
        Self {
            placements: Vec::new(),
            layout: layout.clone(),
            used_height: 0.0,
        }
    }

    pub fn placements(&self) -> &[Placement] {
        &self.placements
    }

    pub fn layout(&self) -> &PageLayout {
        &self.layout
    }

    /// Flowed heights plus the gaps between them.
    pub fn used_height(&self) -> f64 {
        self.used_height
    }

    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    pub fn indices(&self) -> Vec<usize> {
        self.placements.iter().map(|p| p.index).collect()
    }

    fn flowed_count(&self) -> usize {
        self.placements.iter().filter(|p| p.flowed).count()
    }
}

pub struct SegmentationEngine {
    gap: f64,
    measure: Arc<dyn TextMeasure>,
}

impl Default for SegmentationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentationEngine {
    pub fn new() -> Self {
        Self {
            gap: 0.0,
            measure: Arc::new(FixedAdvance::default()),
        }
    }

    /// Vertical space between two flowed elements of the same page.
    pub fn with_gap(mut self, gap: f64) -> Self {
        self.gap = gap;
        self
    }

    pub fn with_measure(mut self, measure: Arc<dyn TextMeasure>) -> Self {
        self.measure = measure;
        self
    }

    pub fn gap(&self) -> f64 {
        self.gap
    }

    /// Greedy first-fit over `elements` in order. An element that does not
    /// fit the remaining height closes the page; one taller than a whole page
    /// gets a page to itself. Appending elements never changes the pages
    /// already closed.
    pub fn process(
        &self,
        elements: &[LayoutElement],
        layout: &PageLayout,
    ) -> Result<Vec<Segment>, Error> {
        if !(self.gap.is_finite() && self.gap >= 0.0) {
            return Err(Error::Configuration(format!(
                "segment gap must be a non-negative length, got {}",
                self.gap
            )));
        }
        let content_height = layout.content_height();
        if !(content_height > 0.0 && layout.content_width() > 0.0) {
            return Err(Error::Configuration(format!(
                "page {}x{} mm leaves no content area",
                layout.width, layout.height
            )));
        }

        let mut segments = Vec::new();
        let mut current: Option<Segment> = None;

        for (index, element) in elements.iter().enumerate() {
            if matches!(element, LayoutElement::PageBreak) {
                if current.as_ref().is_some_and(|seg| seg.flowed_count() > 0) {
                    segments.extend(current.take());
                }
                continue;
            }
            let size = self.resolve(element, layout)?;

            if let Some((x, y)) = element.anchor() {
                let seg = current.get_or_insert_with(|| Segment::new(layout));
                seg.placements.push(size.place(index, x, y, false));
                continue;
            }

            let full = current.as_ref().is_some_and(|seg| {
                seg.flowed_count() > 0
                    && seg.used_height + self.gap + size.height > content_height + EPS
            });
            if full {
                segments.extend(current.take());
            }

            let seg = current.get_or_insert_with(|| Segment::new(layout));
            let gap = if seg.flowed_count() > 0 { self.gap } else { 0.0 };
            let y = layout.margin.top + seg.used_height + gap;
            seg.placements
                .push(size.place(index, layout.margin.left, y, true));
            seg.used_height += gap + size.height;

            if size.height > content_height + EPS {
                log::debug!(
                    "{} #{index} is {:.1} mm tall, placed alone on its page",
                    element.kind(),
                    size.height
                );
                segments.extend(current.take());
            }
        }
        segments.extend(current);
        Ok(segments)
    }

    /// One page holding `elements` at their anchors, for pages built by hand.
    pub fn place_fixed(
        &self,
        elements: &[LayoutElement],
        layout: &PageLayout,
    ) -> Result<Segment, Error> {
        if !(layout.width > 0.0 && layout.height > 0.0) {
            return Err(Error::Configuration(format!(
                "page {}x{} mm has no area",
                layout.width, layout.height
            )));
        }
        let mut seg = Segment::new(layout);
        for (index, element) in elements.iter().enumerate() {
            let Some((x, y)) = element.anchor() else {
                return Err(Error::Configuration(format!(
                    "{} #{index} has no position on a fixed page",
                    element.kind()
                )));
            };
            let size = self.resolve(element, layout)?;
            seg.placements.push(size.place(index, x, y, false));
        }
        Ok(seg)
    }

    /// Outer and content size of one element against `layout`'s content area.
    /// A page break has no size.
    pub fn resolve(&self, element: &LayoutElement, layout: &PageLayout) -> Result<Size, Error> {
        let Some(style) = element.style() else {
            return Ok(Size {
                width: 0.0,
                height: 0.0,
                content_width: 0.0,
                content_height: 0.0,
            });
        };
        let boxed = &style.boxed;
        let content_width = match boxed.width {
            Some(w) => w,
            None => (layout.content_width() - boxed.horizontal_extra()).max(0.0),
        };
        check_length(element, "width", content_width)?;

        let content_height = match boxed.height {
            Some(h) => h,
            None => self.auto_height(element, content_width)?,
        };
        check_length(element, "height", content_height)?;

        Ok(Size {
            width: content_width + boxed.horizontal_extra(),
            height: content_height + boxed.vertical_extra(),
            content_width,
            content_height,
        })
    }

    fn auto_height(&self, element: &LayoutElement, content_width: f64) -> Result<f64, Error> {
        let missing = || {
            Error::Configuration(format!(
                "{} has no height and cannot be sized from its content",
                element.kind()
            ))
        };
        match element {
            LayoutElement::Div(_) | LayoutElement::Canvas(_) => Err(missing()),
            LayoutElement::PageBreak => Ok(0.0),
            LayoutElement::Paragraph(p) => {
                let lines = wrap_lines(
                    &p.text,
                    &p.font,
                    p.letter_spacing,
                    content_width,
                    self.measure.as_ref(),
                );
                Ok(lines.len() as f64 * p.font.size * p.line_height)
            }
            LayoutElement::Cell(c) => match &c.value {
                CellValue::Text(text) => {
                    let lines = wrap_lines(text, &c.font, 0.0, content_width, self.measure.as_ref());
                    Ok(lines.len() as f64 * c.font.size * c.line_height)
                }
                CellValue::Image {
                    height: Some(h), ..
                } => Ok(*h),
                CellValue::Image { height: None, .. } | CellValue::Empty => Err(missing()),
            },
        }
    }
}

fn check_length(element: &LayoutElement, what: &str, v: f64) -> Result<(), Error> {
    if v.is_finite() && v >= 0.0 {
        Ok(())
    } else {
        Err(Error::Configuration(format!(
            "{} {what} must be a non-negative length, got {v}",
            element.kind()
        )))
    }
}

/// Resolved box of one element.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
    pub content_width: f64,
    pub content_height: f64,
}

impl Size {
    fn place(self, index: usize, x: f64, y: f64, flowed: bool) -> Placement {
        Placement {
            index,
            x,
            y,
            width: self.width,
            height: self.height,
            content_width: self.content_width,
            content_height: self.content_height,
            flowed,
        }
    }
}

/// Content box origin of a placed element, in page coordinates.
pub fn content_origin(style: &Style, at: &Placement) -> (f64, f64) {
    let b = &style.boxed;
    let widths = b.border.widths();
    (
        at.x + b.margin.left + widths.left + b.padding.left,
        at.y + b.margin.top + widths.top + b.padding.top,
    )
}
