use crate::dom::{Element, fmt_num, fmt_nums};
use crate::error::Error;
use crate::model::{Rgb, ZOrder};

/// `x y w h` rectangle in page millimetres.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct StBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl StBox {
    pub const fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    pub fn is_finite(&self) -> bool {
        [self.x, self.y, self.w, self.h].iter().all(|v| v.is_finite())
    }
}

impl std::fmt::Display for StBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&fmt_nums(&[self.x, self.y, self.w, self.h]))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PathCmd {
    Move(f64, f64),
    Line(f64, f64),
    Quad(f64, f64, f64, f64),
    Cubic(f64, f64, f64, f64, f64, f64),
    Close,
}

/// Path outline in the abbreviated `M x y L x y ... C` syntax.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct PathData {
    cmds: Vec<PathCmd>,
}

impl PathData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn move_to(mut self, x: f64, y: f64) -> Self {
        self.cmds.push(PathCmd::Move(x, y));
        self
    }

    pub fn line_to(mut self, x: f64, y: f64) -> Self {
        self.cmds.push(PathCmd::Line(x, y));
        self
    }

    pub fn close(mut self) -> Self {
        self.cmds.push(PathCmd::Close);
        self
    }

    /// Closed four-corner rectangle.
    pub fn rect(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self::new()
            .move_to(x, y)
            .line_to(x + w, y)
            .line_to(x + w, y + h)
            .line_to(x, y + h)
            .close()
    }

    pub fn push(&mut self, cmd: PathCmd) {
        self.cmds.push(cmd);
    }

    pub fn cmds(&self) -> &[PathCmd] {
        &self.cmds
    }

    pub fn is_empty(&self) -> bool {
        self.cmds.is_empty()
    }

    pub fn is_finite(&self) -> bool {
        self.cmds.iter().all(|cmd| {
            let vals: &[f64] = match cmd {
                PathCmd::Move(x, y) | PathCmd::Line(x, y) => &[*x, *y],
                PathCmd::Quad(a, b, c, d) => &[*a, *b, *c, *d],
                PathCmd::Cubic(a, b, c, d, e, f) => &[*a, *b, *c, *d, *e, *f],
                PathCmd::Close => &[],
            };
            vals.iter().all(|v| v.is_finite())
        })
    }

    pub fn to_abbreviated(&self) -> String {
        self.cmds
            .iter()
            .map(|cmd| match *cmd {
                PathCmd::Move(x, y) => format!("M {}", fmt_nums(&[x, y])),
                PathCmd::Line(x, y) => format!("L {}", fmt_nums(&[x, y])),
                PathCmd::Quad(x1, y1, x, y) => format!("Q {}", fmt_nums(&[x1, y1, x, y])),
                PathCmd::Cubic(x1, y1, x2, y2, x, y) => {
                    format!("B {}", fmt_nums(&[x1, y1, x2, y2, x, y]))
                }
                PathCmd::Close => "C".to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Stroke dash in the target's native form.
#[derive(Clone, Debug, PartialEq)]
pub struct Dash {
    pub offset: f64,
    pub pattern: Vec<f64>,
}

impl Dash {
    /// Converts a layout dash array `[offset, dash, gap, ...]`.
    pub fn from_layout(values: &[f64]) -> Result<Self, Error> {
        let Some((offset, pattern)) = values.split_first() else {
            return Err(Error::render("dash array is empty"));
        };
        if pattern.is_empty() {
            return Err(Error::render("dash array needs at least one dash length"));
        }
        if !offset.is_finite() || pattern.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(Error::render(format!("invalid dash array {values:?}")));
        }
        Ok(Self {
            offset: *offset,
            pattern: pattern.to_vec(),
        })
    }
}

fn color_element(name: &str, rgb: Rgb) -> Element {
    Element::new(name).with_attr("Value", format!("{} {} {}", rgb[0], rgb[1], rgb[2]))
}

fn alpha_from_opacity(opacity: f64) -> u8 {
    (opacity.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[derive(Clone, Debug, PartialEq)]
pub struct PathObject {
    pub id: u32,
    pub boundary: StBox,
    pub data: PathData,
    pub stroke: bool,
    pub fill: bool,
    pub line_width: Option<f64>,
    pub stroke_color: Option<Rgb>,
    pub fill_color: Option<Rgb>,
    pub dash: Option<Dash>,
    pub alpha: Option<u8>,
}

impl PathObject {
    pub fn new(id: u32, boundary: StBox, data: PathData) -> Self {
        Self {
            id,
            boundary,
            data,
            stroke: true,
            fill: false,
            line_width: None,
            stroke_color: None,
            fill_color: None,
            dash: None,
            alpha: None,
        }
    }

    pub fn set_opacity(&mut self, opacity: Option<f64>) {
        self.alpha = opacity.map(alpha_from_opacity);
    }

    pub fn to_element(&self) -> Element {
        let mut el = Element::new("PathObject")
            .with_attr("ID", self.id)
            .with_attr("Boundary", self.boundary);
        if let Some(w) = self.line_width {
            el.set_attr("LineWidth", fmt_num(w));
        }
        if let Some(dash) = &self.dash {
            el.set_attr("DashOffset", fmt_num(dash.offset));
            el.set_attr("DashPattern", fmt_nums(&dash.pattern));
        }
        if let Some(alpha) = self.alpha {
            el.set_attr("Alpha", alpha);
        }
        // Stroke defaults to true and Fill to false in the format.
        if !self.stroke {
            el.set_attr("Stroke", "false");
        }
        if self.fill {
            el.set_attr("Fill", "true");
        }
        if let Some(c) = self.fill_color {
            el.push(color_element("FillColor", c));
        }
        if let Some(c) = self.stroke_color {
            el.push(color_element("StrokeColor", c));
        }
        el.push(Element::text_node("AbbreviatedData", self.data.to_abbreviated()));
        el
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextCode {
    pub x: f64,
    pub y: f64,
    pub delta_x: Vec<f64>,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextObject {
    pub id: u32,
    pub boundary: StBox,
    /// Font resource id.
    pub font: u32,
    pub size: f64,
    pub fill_color: Option<Rgb>,
    pub alpha: Option<u8>,
    pub codes: Vec<TextCode>,
}

impl TextObject {
    pub fn to_element(&self) -> Element {
        let mut el = Element::new("TextObject")
            .with_attr("ID", self.id)
            .with_attr("Boundary", self.boundary)
            .with_attr("Font", self.font)
            .with_attr("Size", fmt_num(self.size));
        if let Some(alpha) = self.alpha {
            el.set_attr("Alpha", alpha);
        }
        if let Some(c) = self.fill_color {
            el.push(color_element("FillColor", c));
        }
        for code in &self.codes {
            let mut tc = Element::new("TextCode")
                .with_attr("X", fmt_num(code.x))
                .with_attr("Y", fmt_num(code.y));
            if !code.delta_x.is_empty() {
                tc.set_attr("DeltaX", fmt_nums(&code.delta_x));
            }
            tc.set_text(code.text.clone());
            el.push(tc);
        }
        el
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImageObject {
    pub id: u32,
    pub boundary: StBox,
    /// MultiMedia resource id.
    pub resource: u32,
    pub alpha: Option<u8>,
}

impl ImageObject {
    pub fn to_element(&self) -> Element {
        let mut el = Element::new("ImageObject")
            .with_attr("ID", self.id)
            .with_attr("Boundary", self.boundary)
            .with_attr(
                "CTM",
                fmt_nums(&[self.boundary.w, 0.0, 0.0, self.boundary.h, 0.0, 0.0]),
            )
            .with_attr("ResourceID", self.resource);
        if let Some(alpha) = self.alpha {
            el.set_attr("Alpha", alpha);
        }
        el
    }
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct PageBlock {
    pub id: u32,
    pub objects: Vec<PageObject>,
}

impl PageBlock {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            objects: Vec::new(),
        }
    }

    pub fn to_element(&self) -> Element {
        let mut el = Element::new("PageBlock").with_attr("ID", self.id);
        for obj in &self.objects {
            el.push(obj.to_element());
        }
        el
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PageObject {
    Path(PathObject),
    Text(TextObject),
    Image(ImageObject),
    Block(PageBlock),
}

impl PageObject {
    pub fn id(&self) -> u32 {
        match self {
            PageObject::Path(o) => o.id,
            PageObject::Text(o) => o.id,
            PageObject::Image(o) => o.id,
            PageObject::Block(o) => o.id,
        }
    }

    pub fn to_element(&self) -> Element {
        match self {
            PageObject::Path(o) => o.to_element(),
            PageObject::Text(o) => o.to_element(),
            PageObject::Image(o) => o.to_element(),
            PageObject::Block(o) => o.to_element(),
        }
    }

    pub fn as_path(&self) -> Option<&PathObject> {
        match self {
            PageObject::Path(p) => Some(p),
            _ => None,
        }
    }

    /// Ids of this object and everything nested in it, in document order.
    pub fn collect_ids(&self, out: &mut Vec<u32>) {
        out.push(self.id());
        if let PageObject::Block(block) = self {
            for obj in &block.objects {
                obj.collect_ids(out);
            }
        }
    }
}

/// Page-local container of draw objects sharing one z-order.
#[derive(Clone, Debug, PartialEq)]
pub struct Layer {
    pub id: u32,
    pub z_order: ZOrder,
    objects: Vec<PageObject>,
}

impl Layer {
    pub fn new(id: u32, z_order: ZOrder) -> Self {
        Self {
            id,
            z_order,
            objects: Vec::new(),
        }
    }

    pub fn add(&mut self, obj: PageObject) {
        self.objects.push(obj);
    }

    pub fn objects(&self) -> &[PageObject] {
        &self.objects
    }

    pub fn objects_mut(&mut self) -> &mut Vec<PageObject> {
        &mut self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &PathObject> {
        self.objects.iter().filter_map(PageObject::as_path)
    }

    pub fn to_element(&self) -> Element {
        let mut el = Element::new("Layer").with_attr("ID", self.id);
        if self.z_order != ZOrder::Body {
            el.set_attr("Type", self.z_order.layer_type());
        }
        for obj in &self.objects {
            el.push(obj.to_element());
        }
        el
    }
}

/// Content of one page: its layers, back to front.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct PageContent {
    /// Page-specific physical box; `None` uses the document's page area.
    pub area: Option<[f64; 4]>,
    pub layers: Vec<Layer>,
}

impl PageContent {
    pub fn object_count(&self) -> usize {
        self.layers.iter().map(Layer::len).sum()
    }

    pub fn to_element(&self) -> Element {
        let mut page = Element::new("Page");
        if let Some(area) = self.area {
            page.push(
                Element::new("Area").with_child(Element::text_node("PhysicalBox", fmt_nums(&area))),
            );
        }
        if !self.layers.is_empty() {
            let mut content = Element::new("Content");
            for layer in &self.layers {
                content.push(layer.to_element());
            }
            page.push(content);
        }
        page
    }
}
