use std::cell::OnceCell;
use std::fmt;

use crate::error::{BoxError, Error};
use crate::render::DrawContext;

/// All lengths are millimetres, origin at the top-left of the page, y down.
pub type Rgb = [u8; 3];

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Edges {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Edges {
    pub const fn new(top: f64, right: f64, bottom: f64, left: f64) -> Self {
        Self {
            top,
            right,
            bottom,
            left,
        }
    }

    pub const fn all(v: f64) -> Self {
        Self::new(v, v, v, v)
    }

    /// CSS-like shorthand: vertical, horizontal.
    pub const fn symmetric(vertical: f64, horizontal: f64) -> Self {
        Self::new(vertical, horizontal, vertical, horizontal)
    }

    pub fn horizontal(&self) -> f64 {
        self.left + self.right
    }

    pub fn vertical(&self) -> f64 {
        self.top + self.bottom
    }
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct BorderEdge {
    pub width: f64,
    /// None = black.
    pub color: Option<Rgb>,
    /// `[offset, dash, gap, dash, gap, ...]`
    pub dash: Option<Vec<f64>>,
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct Borders {
    pub top: BorderEdge,
    pub right: BorderEdge,
    pub bottom: BorderEdge,
    pub left: BorderEdge,
}

impl Borders {
    pub fn uniform(width: f64) -> Self {
        let edge = BorderEdge {
            width,
            ..Default::default()
        };
        Self {
            top: edge.clone(),
            right: edge.clone(),
            bottom: edge.clone(),
            left: edge,
        }
    }

    pub fn widths(&self) -> Edges {
        Edges::new(
            self.top.width,
            self.right.width,
            self.bottom.width,
            self.left.width,
        )
    }

    /// True when every edge is thinner than 1e-5 mm.
    pub fn is_none(&self) -> bool {
        self.edges().iter().all(|e| e.width.abs() < 1e-5)
    }

    pub fn edges(&self) -> [&BorderEdge; 4] {
        [&self.top, &self.right, &self.bottom, &self.left]
    }

    fn edges_mut(&mut self) -> [&mut BorderEdge; 4] {
        [
            &mut self.top,
            &mut self.right,
            &mut self.bottom,
            &mut self.left,
        ]
    }
}

/// Margin, border, padding and content size of one element.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct BoxModel {
    pub margin: Edges,
    pub border: Borders,
    pub padding: Edges,
    /// None = fill the available content width.
    pub width: Option<f64>,
    /// None = derived from content (text elements only).
    pub height: Option<f64>,
    /// Fixed top-left corner of the margin box on its page. Anchored elements
    /// do not take part in the vertical flow.
    pub anchor: Option<(f64, f64)>,
}

impl BoxModel {
    /// Space taken by margin, border and padding on the horizontal axis.
    pub fn horizontal_extra(&self) -> f64 {
        self.margin.horizontal() + self.border.widths().horizontal() + self.padding.horizontal()
    }

    pub fn vertical_extra(&self) -> f64 {
        self.margin.vertical() + self.border.widths().vertical() + self.padding.vertical()
    }
}

/// Stacking hint; each value becomes its own page layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ZOrder {
    Background,
    #[default]
    Body,
    Foreground,
}

impl ZOrder {
    pub fn layer_type(self) -> &'static str {
        match self {
            ZOrder::Background => "Background",
            ZOrder::Body => "Body",
            ZOrder::Foreground => "Foreground",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FontSpec {
    pub name: String,
    pub family: Option<String>,
    /// Em size in millimetres.
    pub size: f64,
}

impl Default for FontSpec {
    fn default() -> Self {
        Self {
            name: "宋体".to_string(),
            family: None,
            size: 3.0,
        }
    }
}

impl FontSpec {
    pub fn new(name: impl Into<String>, size: f64) -> Self {
        Self {
            name: name.into(),
            family: None,
            size,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct Style {
    pub boxed: BoxModel,
    pub background: Option<Rgb>,
    /// 0.0 ..= 1.0
    pub opacity: Option<f64>,
    pub z_order: ZOrder,
}

/// Builder setters shared by every element kind.
pub trait Styled: Sized {
    fn style(&self) -> &Style;
    fn style_mut(&mut self) -> &mut Style;

    fn width(mut self, width: f64) -> Self {
        self.style_mut().boxed.width = Some(width);
        self
    }

    fn height(mut self, height: f64) -> Self {
        self.style_mut().boxed.height = Some(height);
        self
    }

    fn margin(mut self, margin: Edges) -> Self {
        self.style_mut().boxed.margin = margin;
        self
    }

    fn padding(mut self, padding: Edges) -> Self {
        self.style_mut().boxed.padding = padding;
        self
    }

    fn border(mut self, width: f64) -> Self {
        for edge in self.style_mut().boxed.border.edges_mut() {
            edge.width = width;
        }
        self
    }

    fn border_widths(mut self, widths: Edges) -> Self {
        let b = &mut self.style_mut().boxed.border;
        b.top.width = widths.top;
        b.right.width = widths.right;
        b.bottom.width = widths.bottom;
        b.left.width = widths.left;
        self
    }

    fn border_color(mut self, color: Rgb) -> Self {
        for edge in self.style_mut().boxed.border.edges_mut() {
            edge.color = Some(color);
        }
        self
    }

    fn border_dash(mut self, dash: Vec<f64>) -> Self {
        for edge in self.style_mut().boxed.border.edges_mut() {
            edge.dash = Some(dash.clone());
        }
        self
    }

    fn background(mut self, color: Rgb) -> Self {
        self.style_mut().background = Some(color);
        self
    }

    fn opacity(mut self, opacity: f64) -> Self {
        self.style_mut().opacity = Some(opacity);
        self
    }

    fn z_order(mut self, z: ZOrder) -> Self {
        self.style_mut().z_order = z;
        self
    }

    fn at(mut self, x: f64, y: f64) -> Self {
        self.style_mut().boxed.anchor = Some((x, y));
        self
    }
}

macro_rules! impl_styled {
    ($($ty:ty),*) => {
        $(impl Styled for $ty {
            fn style(&self) -> &Style {
                &self.style
            }
            fn style_mut(&mut self) -> &mut Style {
                &mut self.style
            }
        })*
    };
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct Div {
    pub style: Style,
}

impl Div {
    pub fn new(width: f64, height: f64) -> Self {
        Self::default().width(width).height(height)
    }
}

/// Caller-supplied vector drawing routine bound to a [`Canvas`].
pub trait Drawer: Send {
    fn draw(&self, ctx: &mut DrawContext<'_>) -> Result<(), BoxError>;
}

impl<F> Drawer for F
where
    F: Fn(&mut DrawContext<'_>) -> Result<(), BoxError> + Send,
{
    fn draw(&self, ctx: &mut DrawContext<'_>) -> Result<(), BoxError> {
        self(ctx)
    }
}

#[derive(Default)]
pub struct Canvas {
    pub style: Style,
    drawer: Option<Box<dyn Drawer>>,
    block: OnceCell<u32>,
}

impl Canvas {
    pub fn new(width: f64, height: f64) -> Self {
        Self::default().width(width).height(height)
    }

    pub fn with_drawer<F>(mut self, drawer: F) -> Self
    where
        F: Fn(&mut DrawContext<'_>) -> Result<(), BoxError> + Send + 'static,
    {
        self.drawer = Some(Box::new(drawer));
        self
    }

    pub fn with_boxed_drawer(mut self, drawer: Box<dyn Drawer>) -> Self {
        self.drawer = Some(drawer);
        self
    }

    pub fn drawer(&self) -> Option<&dyn Drawer> {
        self.drawer.as_deref()
    }

    /// Id of the page block this canvas draws into, once it has been rendered.
    pub fn block_id(&self) -> Option<u32> {
        self.block.get().copied()
    }

    pub(crate) fn block_slot(&self) -> &OnceCell<u32> {
        &self.block
    }
}

impl fmt::Debug for Canvas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Canvas")
            .field("style", &self.style)
            .field("has_drawer", &self.drawer.is_some())
            .field("block", &self.block.get())
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    /// Encoded image bytes (PNG/JPEG); size defaults to the content box.
    Image {
        data: Vec<u8>,
        width: Option<f64>,
        height: Option<f64>,
    },
}

/// A canvas whose drawing is derived from a single value.
#[derive(Debug, Default)]
pub struct Cell {
    pub style: Style,
    pub value: CellValue,
    pub font: FontSpec,
    pub color: Rgb,
    pub align: TextAlign,
    pub line_height: f64,
    block: OnceCell<u32>,
}

impl Cell {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            line_height: 1.2,
            ..Default::default()
        }
        .width(width)
        .height(height)
    }

    pub fn auto() -> Self {
        Self {
            line_height: 1.2,
            ..Default::default()
        }
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.value = CellValue::Text(text.into());
        self
    }

    pub fn image(mut self, data: Vec<u8>, width: Option<f64>, height: Option<f64>) -> Self {
        self.value = CellValue::Image {
            data,
            width,
            height,
        };
        self
    }

    pub fn font(mut self, font: FontSpec) -> Self {
        self.font = font;
        self
    }

    pub fn color(mut self, color: Rgb) -> Self {
        self.color = color;
        self
    }

    pub fn align(mut self, align: TextAlign) -> Self {
        self.align = align;
        self
    }

    pub fn block_id(&self) -> Option<u32> {
        self.block.get().copied()
    }

    pub(crate) fn block_slot(&self) -> &OnceCell<u32> {
        &self.block
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Paragraph {
    pub style: Style,
    pub text: String,
    pub font: FontSpec,
    pub color: Rgb,
    pub align: TextAlign,
    /// Line pitch as a multiple of the font size.
    pub line_height: f64,
    pub letter_spacing: f64,
}

impl Default for Paragraph {
    fn default() -> Self {
        Self {
            style: Style::default(),
            text: String::new(),
            font: FontSpec::default(),
            color: [0, 0, 0],
            align: TextAlign::Left,
            line_height: 1.2,
            letter_spacing: 0.0,
        }
    }
}

impl Paragraph {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn font(mut self, font: FontSpec) -> Self {
        self.font = font;
        self
    }

    pub fn font_size(mut self, size: f64) -> Self {
        self.font.size = size;
        self
    }

    pub fn color(mut self, color: Rgb) -> Self {
        self.color = color;
        self
    }

    pub fn align(mut self, align: TextAlign) -> Self {
        self.align = align;
        self
    }

    pub fn line_height(mut self, line_height: f64) -> Self {
        self.line_height = line_height;
        self
    }

    pub fn letter_spacing(mut self, spacing: f64) -> Self {
        self.letter_spacing = spacing;
        self
    }
}

impl_styled!(Div, Canvas, Cell, Paragraph);

#[derive(Debug)]
pub enum LayoutElement {
    Div(Div),
    Canvas(Canvas),
    Cell(Cell),
    Paragraph(Paragraph),
    /// Ends the current page. Ignored while the page has no flowed content.
    PageBreak,
}

impl LayoutElement {
    /// Box style; `None` for a page break, which has no box.
    pub fn style(&self) -> Option<&Style> {
        match self {
            LayoutElement::Div(e) => Some(&e.style),
            LayoutElement::Canvas(e) => Some(&e.style),
            LayoutElement::Cell(e) => Some(&e.style),
            LayoutElement::Paragraph(e) => Some(&e.style),
            LayoutElement::PageBreak => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LayoutElement::Div(_) => "Div",
            LayoutElement::Canvas(_) => "Canvas",
            LayoutElement::Cell(_) => "Cell",
            LayoutElement::Paragraph(_) => "Paragraph",
            LayoutElement::PageBreak => "PageBreak",
        }
    }

    pub fn anchor(&self) -> Option<(f64, f64)> {
        self.style().and_then(|s| s.boxed.anchor)
    }
}

impl From<Div> for LayoutElement {
    fn from(value: Div) -> Self {
        LayoutElement::Div(value)
    }
}

impl From<Canvas> for LayoutElement {
    fn from(value: Canvas) -> Self {
        LayoutElement::Canvas(value)
    }
}

impl From<Cell> for LayoutElement {
    fn from(value: Cell) -> Self {
        LayoutElement::Cell(value)
    }
}

impl From<Paragraph> for LayoutElement {
    fn from(value: Paragraph) -> Self {
        LayoutElement::Paragraph(value)
    }
}

/// A page assembled by hand: every element is positioned with
/// [`Styled::at`] and nothing is paginated.
#[derive(Debug)]
pub struct VirtualPage {
    pub layout: PageLayout,
    elements: Vec<LayoutElement>,
}

impl VirtualPage {
    pub fn new(layout: PageLayout) -> Self {
        Self {
            layout,
            elements: Vec::new(),
        }
    }

    /// Adds an anchored element. Unanchored elements and page breaks are
    /// rejected.
    pub fn add(&mut self, element: impl Into<LayoutElement>) -> Result<&mut Self, Error> {
        let element = element.into();
        if matches!(element, LayoutElement::PageBreak) {
            return Err(Error::Configuration(
                "a virtual page cannot contain a page break".into(),
            ));
        }
        if element.anchor().is_none() {
            return Err(Error::Configuration(format!(
                "{} on a virtual page needs a position",
                element.kind()
            )));
        }
        self.elements.push(element);
        Ok(self)
    }

    pub fn with(mut self, element: impl Into<LayoutElement>) -> Result<Self, Error> {
        self.add(element)?;
        Ok(self)
    }

    pub fn elements(&self) -> &[LayoutElement] {
        &self.elements
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Runs once per page before it is rendered, with the page's index in the
/// document and an empty [`VirtualPage`] of the page's size. Elements added
/// to it are drawn on that page, e.g. headers, footers and page numbers.
pub trait PageHandler: Send {
    fn handle(&mut self, index: usize, page: &mut VirtualPage) -> Result<(), BoxError>;
}

impl<F> PageHandler for F
where
    F: FnMut(usize, &mut VirtualPage) -> Result<(), BoxError> + Send,
{
    fn handle(&mut self, index: usize, page: &mut VirtualPage) -> Result<(), BoxError> {
        self(index, page)
    }
}

/// Physical page size and the margins around the content area.
#[derive(Clone, Debug, PartialEq)]
pub struct PageLayout {
    pub width: f64,
    pub height: f64,
    pub margin: Edges,
}

const DEFAULT_MARGIN: Edges = Edges::symmetric(25.4, 31.7);

impl Default for PageLayout {
    fn default() -> Self {
        Self::a4()
    }
}

impl PageLayout {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            margin: DEFAULT_MARGIN,
        }
    }

    pub fn a0() -> Self {
        Self::new(841.0, 1189.0)
    }
    pub fn a1() -> Self {
        Self::new(594.0, 841.0)
    }
    pub fn a2() -> Self {
        Self::new(420.0, 594.0)
    }
    pub fn a3() -> Self {
        Self::new(297.0, 420.0)
    }
    pub fn a4() -> Self {
        Self::new(210.0, 297.0)
    }
    pub fn a5() -> Self {
        Self::new(148.0, 210.0)
    }
    pub fn a6() -> Self {
        Self::new(105.0, 148.0)
    }
    pub fn a7() -> Self {
        Self::new(74.0, 105.0)
    }
    pub fn a8() -> Self {
        Self::new(52.0, 74.0)
    }
    pub fn a9() -> Self {
        Self::new(37.0, 52.0)
    }
    pub fn a10() -> Self {
        Self::new(26.0, 37.0)
    }

    pub fn with_margin(mut self, margin: Edges) -> Self {
        self.margin = margin;
        self
    }

    pub fn content_width(&self) -> f64 {
        self.width - self.margin.horizontal()
    }

    pub fn content_height(&self) -> f64 {
        self.height - self.margin.vertical()
    }

    /// `[x, y, w, h]` of the physical page.
    pub fn physical_box(&self) -> [f64; 4] {
        [0.0, 0.0, self.width, self.height]
    }
}
