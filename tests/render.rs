mod common;

use std::error::Error as _;

use ofd_layout::measure::FixedAdvance;
use ofd_layout::ofd::{Layer, PageObject, PathObject};
use ofd_layout::render::{render_layers, render_segment};
use ofd_layout::{
    Canvas, Cell, Div, Edges, Error, IdAllocator, LayoutElement, PageLayout, Paragraph, Placement,
    Render, RenderContext, ResKind, ResManager, SegmentationEngine, Styled, TextAlign, ZOrder,
};

fn page() -> PageLayout {
    PageLayout::new(210.0, 297.0).with_margin(Edges::all(10.0))
}

fn place(element: &LayoutElement) -> Placement {
    let segments = SegmentationEngine::new()
        .process(std::slice::from_ref(element), &page())
        .unwrap();
    segments[0].placements()[0].clone()
}

struct Harness {
    ids: IdAllocator,
    res: ResManager,
    measure: FixedAdvance,
}

impl Harness {
    fn new() -> Self {
        common::init_logging();
        let (ids, res) = common::detached_res();
        Self {
            ids,
            res,
            measure: FixedAdvance::default(),
        }
    }

    fn render(&mut self, element: &LayoutElement) -> Result<Layer, Error> {
        let at = place(element);
        let mut layer = Layer::new(0, ZOrder::Body);
        let mut cx = RenderContext::new(&mut self.ids, &mut self.res, &self.measure);
        element.render(&mut layer, &at, &mut cx)?;
        Ok(layer)
    }
}

fn paths(layer: &Layer) -> Vec<&PathObject> {
    layer.paths().collect()
}

fn block(layer: &Layer) -> &ofd_layout::ofd::PageBlock {
    layer
        .objects()
        .iter()
        .find_map(|o| match o {
            PageObject::Block(b) => Some(b),
            _ => None,
        })
        .expect("layer has a page block")
}

#[test]
fn plain_div_draws_nothing() {
    let mut h = Harness::new();
    let layer = h.render(&Div::new(80.0, 100.0).into()).unwrap();
    assert!(layer.is_empty());
    assert_eq!(h.ids.max_unit_id(), 0);
}

#[test]
fn equal_borders_are_one_centred_rectangle() {
    let mut h = Harness::new();
    let div: LayoutElement = Div::new(80.0, 100.0).border(1.0).at(20.0, 20.0).into();
    let layer = h.render(&div).unwrap();
    let paths = paths(&layer);
    assert_eq!(paths.len(), 1);
    let el = paths[0].to_element();
    assert_eq!(el.attr("Boundary"), Some("20 20 82 102"));
    assert_eq!(el.attr("LineWidth"), Some("1"));
    assert_eq!(el.attr("Fill"), None);
    assert_eq!(
        el.child("AbbreviatedData").unwrap().text(),
        "M 0.5 0.5 L 81.5 0.5 L 81.5 101.5 L 0.5 101.5 C"
    );
    assert_eq!(
        el.child("StrokeColor").and_then(|c| c.attr("Value")),
        Some("0 0 0")
    );
}

#[test]
fn near_equal_borders_still_count_as_equal() {
    let mut h = Harness::new();
    let div: LayoutElement = Div::new(10.0, 10.0)
        .border_widths(Edges::new(1.0, 1.000001, 1.0, 0.999999))
        .into();
    assert_eq!(paths(&h.render(&div).unwrap()).len(), 1);
}

#[test]
fn unequal_borders_are_drawn_per_edge() {
    let mut h = Harness::new();
    let div: LayoutElement = Div::new(80.0, 100.0)
        .border_widths(Edges::new(2.0, 1.0, 2.0, 1.0))
        .padding(Edges::all(3.0))
        .at(0.0, 0.0)
        .into();
    let layer = h.render(&div).unwrap();
    let boxes: Vec<String> = paths(&layer)
        .iter()
        .map(|p| p.boundary.to_string())
        .collect();
    // Outer box: 1 + 3 + 80 + 3 + 1 wide, 2 + 3 + 100 + 3 + 2 high.
    assert_eq!(
        boxes,
        ["0 0 88 2", "87 0 1 110", "0 108 88 2", "0 0 1 110"]
    );
    let top = paths(&layer)[0].to_element();
    assert_eq!(top.child("AbbreviatedData").unwrap().text(), "M 0 1 L 88 1");
    let right = paths(&layer)[1].to_element();
    let left = paths(&layer)[3].to_element();
    assert_eq!(right.attr("LineWidth"), left.attr("LineWidth"));
    assert_eq!(
        right.child("AbbreviatedData").unwrap().text(),
        left.child("AbbreviatedData").unwrap().text()
    );
}

#[test]
fn zero_width_edges_are_skipped() {
    let mut h = Harness::new();
    let div: LayoutElement = Div::new(50.0, 20.0)
        .border_widths(Edges::new(1.0, 0.0, 1.0, 0.0))
        .into();
    let layer = h.render(&div).unwrap();
    assert_eq!(layer.len(), 2);
}

#[test]
fn hairline_edges_below_tolerance_are_skipped() {
    let mut h = Harness::new();
    let div: LayoutElement = Div::new(50.0, 20.0)
        .border_widths(Edges::new(1.0, 1e-7, 1.0, 1e-7))
        .into();
    assert_eq!(h.render(&div).unwrap().len(), 2);

    let div: LayoutElement = Div::new(50.0, 20.0)
        .border_widths(Edges::all(1e-7))
        .into();
    assert!(h.render(&div).unwrap().is_empty());
}

#[test]
fn flat_box_gets_no_background() {
    let mut h = Harness::new();
    let div: LayoutElement = Div::new(50.0, 0.0).background([1, 2, 3]).into();
    assert!(h.render(&div).unwrap().is_empty());

    let div: LayoutElement = Div::new(50.0, 0.0)
        .padding(Edges::new(1.0, 0.0, 1.0, 0.0))
        .background([1, 2, 3])
        .into();
    assert_eq!(h.render(&div).unwrap().len(), 1);
}

#[test]
fn background_is_filled_inside_the_border() {
    let mut h = Harness::new();
    let div: LayoutElement = Div::new(40.0, 30.0)
        .border(2.0)
        .padding(Edges::all(1.0))
        .background([255, 0, 0])
        .at(10.0, 10.0)
        .into();
    let layer = h.render(&div).unwrap();
    let bg = paths(&layer)[0].to_element();
    assert_eq!(bg.attr("Boundary"), Some("12 12 42 32"));
    assert_eq!(bg.attr("Stroke"), Some("false"));
    assert_eq!(bg.attr("Fill"), Some("true"));
    assert_eq!(
        bg.child("FillColor").and_then(|c| c.attr("Value")),
        Some("255 0 0")
    );
    assert!(bg.child("StrokeColor").is_none());
    assert_eq!(layer.len(), 2);
}

#[test]
fn dash_and_opacity_are_carried_to_the_path() {
    let mut h = Harness::new();
    let div: LayoutElement = Div::new(40.0, 30.0)
        .border(0.5)
        .border_color([10, 20, 30])
        .border_dash(vec![1.0, 2.0, 0.5])
        .opacity(0.5)
        .into();
    let el = paths(&h.render(&div).unwrap())[0].to_element();
    assert_eq!(el.attr("DashOffset"), Some("1"));
    assert_eq!(el.attr("DashPattern"), Some("2 0.5"));
    assert_eq!(el.attr("Alpha"), Some("128"));
    assert_eq!(
        el.child("StrokeColor").and_then(|c| c.attr("Value")),
        Some("10 20 30")
    );
}

#[test]
fn malformed_dash_is_a_render_error() {
    let mut h = Harness::new();
    for dash in [vec![], vec![1.0], vec![0.0, -1.0]] {
        let div: LayoutElement = Div::new(40.0, 30.0).border(0.5).border_dash(dash).into();
        assert!(matches!(h.render(&div), Err(Error::Render { .. })));
    }
}

#[test]
fn canvas_keeps_its_block_id_across_renders() {
    let mut h = Harness::new();
    let canvas: LayoutElement = Canvas::new(50.0, 40.0)
        .with_drawer(|ctx| {
            ctx.rect(0.0, 0.0, 10.0, 10.0);
            ctx.fill()?;
            ctx.stroke_rect(5.0, 5.0, 10.0, 10.0)?;
            Ok(())
        })
        .into();
    let first = h.render(&canvas).unwrap();
    let second = h.render(&canvas).unwrap();
    let (a, b) = (block(&first), block(&second));
    assert_eq!(a.id, b.id);
    assert_eq!(a.objects.len(), 2);
    assert_ne!(a.objects[0].id(), b.objects[0].id());
    let LayoutElement::Canvas(c) = &canvas else {
        unreachable!()
    };
    assert_eq!(c.block_id(), Some(a.id));
}

#[test]
fn canvas_paths_are_relative_to_the_content_box() {
    let mut h = Harness::new();
    let canvas: LayoutElement = Canvas::new(50.0, 40.0)
        .border(1.0)
        .padding(Edges::all(2.0))
        .at(30.0, 40.0)
        .with_drawer(|ctx| {
            assert_eq!((ctx.width(), ctx.height()), (50.0, 40.0));
            ctx.set_stroke_color([0, 0, 255]);
            ctx.set_line_width(0.8);
            ctx.set_line_dash(&[0.0, 3.0, 1.5])?;
            ctx.move_to(0.0, 0.0);
            ctx.bezier_curve_to(10.0, 0.0, 20.0, 10.0, 30.0, 10.0);
            ctx.stroke()?;
            Ok(())
        })
        .into();
    let layer = h.render(&canvas).unwrap();
    assert_eq!(layer.len(), 2);
    let PageObject::Path(path) = &block(&layer).objects[0] else {
        panic!("expected a path");
    };
    let el = path.to_element();
    assert_eq!(el.attr("Boundary"), Some("33 43 50 40"));
    assert_eq!(el.attr("LineWidth"), Some("0.8"));
    assert_eq!(el.attr("DashPattern"), Some("3 1.5"));
    assert_eq!(
        el.child("AbbreviatedData").unwrap().text(),
        "M 0 0 B 10 0 20 10 30 10"
    );
}

#[test]
fn each_fill_or_stroke_is_one_object() {
    let mut h = Harness::new();
    let canvas: LayoutElement = Canvas::new(50.0, 40.0)
        .with_drawer(|ctx| {
            ctx.move_to(0.0, 0.0);
            ctx.line_to(10.0, 10.0);
            ctx.stroke()?;
            // Consumed by the stroke above.
            ctx.fill()?;
            ctx.begin_path();
            ctx.move_to(1.0, 1.0);
            ctx.fill()?;
            ctx.save();
            ctx.set_global_alpha(0.25);
            ctx.fill_rect(0.0, 0.0, 1.0, 1.0)?;
            ctx.restore();
            ctx.fill_rect(0.0, 0.0, 1.0, 1.0)?;
            Ok(())
        })
        .into();
    let layer = h.render(&canvas).unwrap();
    let objects = &block(&layer).objects;
    assert_eq!(objects.len(), 3);
    let alphas: Vec<Option<u8>> = objects
        .iter()
        .map(|o| o.as_path().unwrap().alpha)
        .collect();
    assert_eq!(alphas, [None, Some(64), None]);
}

#[test]
fn non_finite_path_fails_the_canvas() {
    let mut h = Harness::new();
    let canvas: LayoutElement = Canvas::new(50.0, 40.0)
        .with_drawer(|ctx| {
            ctx.move_to(0.0, 0.0);
            ctx.line_to(f64::NAN, 1.0);
            ctx.stroke()?;
            Ok(())
        })
        .into();
    assert!(matches!(h.render(&canvas), Err(Error::Render { .. })));
}

#[test]
fn drawer_failure_keeps_the_cause_and_adds_no_block() {
    let mut h = Harness::new();
    let canvas: LayoutElement = Canvas::new(50.0, 40.0)
        .border(1.0)
        .with_drawer(|ctx| {
            ctx.fill_rect(0.0, 0.0, 5.0, 5.0)?;
            Err("out of ink".into())
        })
        .into();
    let at = place(&canvas);
    let mut layer = Layer::new(0, ZOrder::Body);
    let mut cx = RenderContext::new(&mut h.ids, &mut h.res, &h.measure);
    let err = canvas.render(&mut layer, &at, &mut cx).unwrap_err();
    assert!(matches!(err, Error::Render { .. }));
    assert_eq!(err.source().unwrap().to_string(), "out of ink");
    assert!(err.to_string().contains("out of ink"));
    assert!(layer
        .objects()
        .iter()
        .all(|o| !matches!(o, PageObject::Block(_))));
}

#[test]
fn canvas_without_drawer_draws_only_its_box() {
    let mut h = Harness::new();
    let canvas: LayoutElement = Canvas::new(50.0, 40.0).border(1.0).into();
    let layer = h.render(&canvas).unwrap();
    assert_eq!(layer.len(), 1);
    assert!(layer.objects()[0].as_path().is_some());
}

#[test]
fn paragraph_emits_one_text_object_per_line() {
    let mut h = Harness::new();
    // Narrow characters advance 2 mm at size 4; 24 mm holds twelve of them.
    let para: LayoutElement = Paragraph::new("hello there world")
        .font_size(4.0)
        .width(24.0)
        .at(10.0, 10.0)
        .into();
    let layer = h.render(&para).unwrap();
    let texts: Vec<_> = layer
        .objects()
        .iter()
        .map(|o| match o {
            PageObject::Text(t) => t.to_element(),
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert_eq!(texts.len(), 2);
    let lines: Vec<String> = texts
        .iter()
        .map(|t| t.child("TextCode").unwrap().text())
        .collect();
    assert_eq!(lines, ["hello there", "world"].map(String::from));

    let font = h.res.find_font("宋体").unwrap();
    assert_eq!(h.res.get(font).unwrap().kind, ResKind::Font);
    assert_eq!(texts[0].attr("Font"), Some(font.to_string().as_str()));
    assert_eq!(texts[0].attr("Size"), Some("4"));
    // Line pitch 4.8; baseline sits 0.4 + 4 below the top of the line box.
    assert_eq!(texts[1].attr("Boundary"), Some("10 14.8 24 4.8"));
    let code = texts[1].child("TextCode").unwrap();
    assert_eq!(code.attr("Y"), Some("4.4"));
    assert_eq!(code.attr("DeltaX"), Some("2 2 2 2"));
}

#[test]
fn paragraph_alignment_moves_the_line_start() {
    let mut h = Harness::new();
    let para: LayoutElement = Paragraph::new("abcd")
        .font_size(2.0)
        .width(10.0)
        .align(TextAlign::Right)
        .into();
    let layer = h.render(&para).unwrap();
    let PageObject::Text(text) = &layer.objects()[0] else {
        panic!("expected text");
    };
    assert_eq!(text.codes[0].x, 6.0);
}

#[test]
fn empty_paragraph_registers_no_font() {
    let mut h = Harness::new();
    let para: LayoutElement = Paragraph::new("").height(5.0).into();
    let layer = h.render(&para).unwrap();
    assert!(layer.is_empty());
    assert!(h.res.is_empty());
}

#[test]
fn cell_text_is_centred_in_its_box() {
    let mut h = Harness::new();
    let cell: LayoutElement = Cell::new(60.0, 15.0)
        .text("ab")
        .align(TextAlign::Center)
        .at(0.0, 0.0)
        .into();
    let layer = h.render(&cell).unwrap();
    let PageObject::Text(text) = &block(&layer).objects[0] else {
        panic!("expected text");
    };
    // Two narrow glyphs at size 3 are 3 mm wide; one 3.6 mm line box.
    assert!((text.codes[0].x - 28.5).abs() < 1e-9);
    assert!((text.codes[0].y - 9.0).abs() < 1e-9);
    assert_eq!(text.codes[0].delta_x, [1.5]);
}

#[test]
fn cell_image_is_embedded_once() {
    let mut h = Harness::new();
    let cell: LayoutElement = Cell::new(30.0, 20.0)
        .image(common::PNG_1X1.to_vec(), Some(10.0), Some(10.0))
        .at(0.0, 0.0)
        .into();
    let first = h.render(&cell).unwrap();
    let second = h.render(&cell).unwrap();
    let image = |layer: &Layer| match &block(layer).objects[0] {
        PageObject::Image(img) => img.clone(),
        other => panic!("unexpected {other:?}"),
    };
    let (a, b) = (image(&first), image(&second));
    assert_eq!(a.resource, b.resource);
    assert_eq!(a.boundary.to_string(), "10 5 10 10");
    assert_eq!(a.to_element().attr("CTM"), Some("10 0 0 10 0 0"));
    assert_eq!(h.res.len(), 1);
}

#[test]
fn segment_gets_one_layer_per_z_order() {
    common::init_logging();
    let elements: Vec<LayoutElement> = vec![
        Div::new(20.0, 20.0).border(1.0).into(),
        Div::new(20.0, 20.0)
            .background([0, 0, 0])
            .z_order(ZOrder::Foreground)
            .into(),
        Div::new(20.0, 20.0)
            .background([9, 9, 9])
            .z_order(ZOrder::Background)
            .at(0.0, 0.0)
            .into(),
        Div::new(20.0, 20.0).into(),
    ];
    let segments = SegmentationEngine::new()
        .process(&elements, &page())
        .unwrap();
    let (mut ids, mut res) = common::detached_res();
    let measure = FixedAdvance::default();
    let mut cx = RenderContext::new(&mut ids, &mut res, &measure);
    let content = render_segment(&segments[0], &elements, &mut cx).unwrap();

    let zs: Vec<ZOrder> = content.layers.iter().map(|l| l.z_order).collect();
    assert_eq!(zs, [ZOrder::Background, ZOrder::Body, ZOrder::Foreground]);
    assert_eq!(content.object_count(), 3);
    for layer in &content.layers {
        assert!(layer.objects().iter().all(|o| o.id() < layer.id));
    }
    let xml = String::from_utf8(content.to_element().to_xml_bytes()).unwrap();
    assert!(xml.contains("Type=\"Background\""));
    assert!(xml.contains("Type=\"Foreground\""));
}

#[test]
fn layered_lists_share_one_layer_per_z_order() {
    let body: Vec<LayoutElement> = vec![Div::new(20.0, 20.0).border(1.0).into()];
    let overlay: Vec<LayoutElement> = vec![
        Div::new(20.0, 5.0).border(1.0).at(10.0, 280.0).into(),
        Div::new(20.0, 5.0)
            .background([0, 0, 0])
            .z_order(ZOrder::Foreground)
            .at(0.0, 0.0)
            .into(),
    ];
    let engine = SegmentationEngine::new();
    let body_seg = engine.process(&body, &page()).unwrap().remove(0);
    let overlay_seg = engine.place_fixed(&overlay, &page()).unwrap();

    let (mut ids, mut res) = common::detached_res();
    let measure = FixedAdvance::default();
    let mut cx = RenderContext::new(&mut ids, &mut res, &measure);
    let content = render_layers(&[(&body_seg, &body), (&overlay_seg, &overlay)], &mut cx).unwrap();

    let zs: Vec<ZOrder> = content.layers.iter().map(|l| l.z_order).collect();
    assert_eq!(zs, [ZOrder::Body, ZOrder::Foreground]);
    let body_layer = paths(&content.layers[0]);
    assert_eq!(body_layer.len(), 2);
    assert!(body_layer[0].id < body_layer[1].id);
    assert_eq!(body_layer[1].to_element().attr("Boundary"), Some("10 280 22 7"));
    assert!(content.area.is_none());
}
