mod common;

use std::fs;
use std::io;
use std::sync::{Arc, Mutex};

use ofd_layout::{
    Canvas, Cell, DocState, Div, Document, DocumentOptions, Edges, Error, LayoutElement,
    PackageFormat, PackageReader, PageLayout, Paragraph, ResKind, Styled, VirtualPage,
};

/// 257 mm of content height.
fn layout() -> PageLayout {
    PageLayout::new(210.0, 297.0).with_margin(Edges::all(20.0))
}

fn dir_options() -> DocumentOptions {
    DocumentOptions::default()
        .page_layout(layout())
        .format(PackageFormat::Directory)
}

fn zip_options() -> DocumentOptions {
    DocumentOptions::default().page_layout(layout())
}

fn bordered(height: f64) -> Div {
    Div::new(80.0, height).border(0.5)
}

#[test]
fn empty_document_has_manifests_only() {
    let dir = common::scratch();
    let out = dir.path().join("empty");
    let mut doc = Document::with_options(&out, dir_options()).unwrap();
    assert_eq!(doc.page_count(), 0);
    doc.close().unwrap();
    assert_eq!(doc.state(), DocState::Closed);

    let files = common::snapshot(&out);
    assert_eq!(
        files.keys().collect::<Vec<_>>(),
        ["Doc_0/Document.xml", "OFD.xml"]
    );
    let root = String::from_utf8(files["OFD.xml"].clone()).unwrap();
    assert!(root.contains("<ofd:DocRoot>Doc_0/Document.xml</ofd:DocRoot>"));
    assert!(root.contains("<ofd:Creator>ofd-layout"));

    let reader = PackageReader::open(&out).unwrap();
    assert_eq!(reader.page_count(), 0);
    assert_eq!(reader.physical_box(), Some([0.0, 0.0, 210.0, 297.0]));
    assert!(reader.resources().is_empty());
}

#[test]
fn second_close_is_a_no_op() {
    let dir = common::scratch();
    let out = dir.path().join("twice");
    let mut doc = Document::with_options(&out, dir_options()).unwrap();
    doc.add(bordered(10.0)).unwrap();
    doc.close().unwrap();
    let before = common::snapshot(&out);
    doc.close().unwrap();
    assert_eq!(common::snapshot(&out), before);
}

#[test]
fn add_after_close_is_rejected() {
    let dir = common::scratch();
    let mut doc = Document::with_options(dir.path().join("closed"), dir_options()).unwrap();
    doc.close().unwrap();
    let result = doc.add(bordered(10.0));
    assert!(matches!(result, Err(Error::State(_))));
}

#[test]
fn missing_output_directory_is_an_io_error() {
    let dir = common::scratch();
    let result = Document::create(dir.path().join("nope").join("out.ofd"));
    match result {
        Err(Error::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::NotFound),
        Err(other) => panic!("expected NotFound, got {other:?}"),
        Ok(_) => panic!("expected an error"),
    }
}

#[test]
fn finished_pages_are_rendered_while_adding() {
    let dir = common::scratch();
    let out = dir.path().join("eager");
    let mut doc = Document::with_options(&out, dir_options()).unwrap();
    doc.add(bordered(100.0)).unwrap();
    doc.add(bordered(100.0)).unwrap();
    assert_eq!(doc.page_count(), 1);
    assert!(!out.join("Doc_0/Pages").exists());

    doc.add(bordered(100.0)).unwrap();
    assert_eq!(doc.page_count(), 2);
    assert!(out.join("Doc_0/Pages/Page_0").is_dir());
    assert!(!out.join("Doc_0/Pages/Page_1").exists());

    doc.close().unwrap();
    assert!(out.join("Doc_0/Pages/Page_1/Content.xml").is_file());
}

#[test]
fn invalid_element_leaves_the_document_usable() {
    let dir = common::scratch();
    let mut doc = Document::with_options(dir.path().join("bad"), dir_options()).unwrap();
    doc.add(bordered(50.0)).unwrap();
    let result = doc.add(Div::default().width(10.0));
    assert!(matches!(result, Err(Error::Configuration(_))));
    assert_eq!(doc.state(), DocState::Open);
    doc.add(bordered(50.0)).unwrap();
    doc.close().unwrap();
}

#[test]
fn directory_package_round_trip() {
    let dir = common::scratch();
    let out = dir.path().join("pkg");
    let mut doc = Document::with_options(&out, dir_options()).unwrap();
    for _ in 0..3 {
        doc.add(bordered(100.0)).unwrap();
    }
    doc.close().unwrap();

    let mut reader = PackageReader::open(&out).unwrap();
    assert_eq!(reader.doc_root(), "Doc_0/Document.xml");
    assert_eq!(reader.page_count(), 2);
    assert_eq!(reader.max_unit_id(), doc.max_unit_id());
    let locs: Vec<&str> = reader.pages().iter().map(|p| p.base_loc.as_str()).collect();
    assert_eq!(
        locs,
        ["Pages/Page_0/Content.xml", "Pages/Page_1/Content.xml"]
    );

    let first = reader.page_content(0).unwrap();
    let layers: Vec<_> = first.child("Content").unwrap().children("Layer").collect();
    assert_eq!(layers.len(), 1);
    assert_eq!(layers[0].children("PathObject").count(), 2);
    let second = reader.page_content(1).unwrap();
    let layer = second.child("Content").unwrap().child("Layer").unwrap();
    assert_eq!(layer.children("PathObject").count(), 1);

    // Page ids are unique and below MaxUnitID.
    let ids: Vec<u32> = reader.pages().iter().map(|p| p.id).collect();
    assert_ne!(ids[0], ids[1]);
    assert!(ids.iter().all(|id| *id <= reader.max_unit_id()));
}

#[test]
fn zip_package_round_trip() {
    let dir = common::scratch();
    let out = dir.path().join("out.ofd");
    let mut doc = Document::with_options(&out, zip_options()).unwrap();
    doc.add(Paragraph::new("Hello 世界").font_size(5.0)).unwrap();
    doc.add(
        Cell::new(20.0, 20.0).image(common::PNG_1X1.to_vec(), None, None),
    )
    .unwrap();
    doc.add(
        Cell::new(20.0, 20.0).image(common::PNG_1X1.to_vec(), None, None),
    )
    .unwrap();
    doc.close().unwrap();

    // Only the archive is left next to it; the scratch tree is gone.
    let siblings: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(siblings, ["out.ofd"]);

    let names = common::zip_names(&out);
    assert!(names.contains(&"OFD.xml".to_string()));
    assert!(names.contains(&"Doc_0/Document.xml".to_string()));
    assert!(names.contains(&"Doc_0/PublicRes.xml".to_string()));
    assert!(names.contains(&"Doc_0/DocumentRes.xml".to_string()));
    assert!(names.contains(&"Doc_0/Pages/Page_0/Content.xml".to_string()));

    let mut reader = PackageReader::open(&out).unwrap();
    assert_eq!(reader.page_count(), 1);
    let kinds: Vec<ResKind> = reader.resources().iter().map(|r| r.kind).collect();
    assert_eq!(kinds, [ResKind::Font, ResKind::Image]);
    let image = reader.resources()[1].clone();
    assert_eq!(image.file.as_deref(), Some(format!("Doc_0/Res/{}.png", image.id).as_str()));
    assert_eq!(reader.resource_bytes(image.id).unwrap(), common::PNG_1X1);
    assert_eq!(
        reader.resource_ids(),
        doc.res_manager().ids()
    );
}

#[test]
fn reopened_directory_appends_pages() {
    let dir = common::scratch();
    let out = dir.path().join("pkg");
    let (max_before, image_id) = {
        let mut doc = Document::with_options(&out, dir_options()).unwrap();
        doc.add(bordered(200.0)).unwrap();
        doc.add(Cell::new(20.0, 20.0).image(common::PNG_1X1.to_vec(), None, None))
            .unwrap();
        doc.add(bordered(200.0)).unwrap();
        doc.close().unwrap();
        let image = doc
            .res_manager()
            .entries()
            .iter()
            .find(|e| e.kind == ResKind::Image)
            .map(|e| e.id)
            .unwrap();
        (doc.max_unit_id(), image)
    };
    let page_0 = fs::read(out.join("Doc_0/Pages/Page_0/Content.xml")).unwrap();

    let mut doc = Document::open(&out, dir_options()).unwrap();
    assert_eq!(doc.page_count(), 2);
    assert_eq!(doc.max_unit_id(), max_before);
    doc.add(Cell::new(20.0, 20.0).image(common::PNG_1X1.to_vec(), None, None))
        .unwrap();
    doc.close().unwrap();
    assert_eq!(doc.res_manager().len(), 1);
    assert!(doc.max_unit_id() > max_before);

    let mut reader = PackageReader::open(&out).unwrap();
    assert_eq!(reader.page_count(), 3);
    assert_eq!(reader.pages()[2].base_loc, "Pages/Page_2/Content.xml");
    assert!(reader.pages()[2].id > max_before);
    assert_eq!(reader.resource_ids(), [image_id]);
    assert_eq!(
        fs::read(out.join("Doc_0/Pages/Page_0/Content.xml")).unwrap(),
        page_0
    );
    let added = reader.page_content(2).unwrap();
    let xml = String::from_utf8(added.to_xml_bytes()).unwrap();
    assert!(xml.contains(&format!("ResourceID=\"{image_id}\"")));
}

#[test]
fn reopened_zip_is_rewritten_in_place() {
    let dir = common::scratch();
    let out = dir.path().join("doc.ofd");
    {
        let mut doc = Document::with_options(&out, zip_options()).unwrap();
        doc.add(bordered(10.0)).unwrap();
        doc.close().unwrap();
    }
    let mut doc = Document::open(&out, zip_options()).unwrap();
    doc.add(bordered(250.0)).unwrap();
    doc.close().unwrap();

    let reader = PackageReader::open(&out).unwrap();
    assert_eq!(reader.page_count(), 2);
    assert!(common::zip_names(&out).contains(&"Doc_0/Pages/Page_1/Content.xml".to_string()));
}

#[test]
fn opening_a_non_zip_file_fails() {
    let dir = common::scratch();
    let path = dir.path().join("fake.ofd");
    fs::write(&path, b"plain text").unwrap();
    assert!(matches!(
        Document::open(&path, zip_options()),
        Err(Error::InvalidPackage(_))
    ));
    assert!(matches!(
        PackageReader::open(&path),
        Err(Error::InvalidPackage(_))
    ));
}

#[test]
fn new_document_replaces_an_existing_package() {
    let dir = common::scratch();
    let out = dir.path().join("pkg");
    {
        let mut doc = Document::with_options(&out, dir_options()).unwrap();
        for _ in 0..3 {
            doc.add(bordered(100.0)).unwrap();
        }
        doc.add(Cell::new(20.0, 20.0).image(common::PNG_1X1.to_vec(), None, None))
            .unwrap();
        doc.close().unwrap();
    }
    assert!(out.join("Doc_0/Pages/Page_1").is_dir());

    let mut doc = Document::with_options(&out, dir_options()).unwrap();
    doc.add(bordered(10.0)).unwrap();
    doc.close().unwrap();

    let files = common::snapshot(&out);
    assert_eq!(
        files.keys().collect::<Vec<_>>(),
        ["Doc_0/Document.xml", "Doc_0/Pages/Page_0/Content.xml", "OFD.xml"]
    );
    let manifest = String::from_utf8(files["Doc_0/Document.xml"].clone()).unwrap();
    assert!(manifest.contains("Pages/Page_0/Content.xml"));
    assert!(!manifest.contains("Page_1"));
    let reader = PackageReader::open(&out).unwrap();
    assert_eq!(reader.page_count(), 1);
    assert!(reader.resources().is_empty());
}

#[test]
fn page_break_starts_a_new_page() {
    let dir = common::scratch();
    let out = dir.path().join("breaks");
    let mut doc = Document::with_options(&out, dir_options()).unwrap();
    doc.add(LayoutElement::PageBreak).unwrap();
    assert_eq!(doc.page_count(), 0);
    doc.add(bordered(10.0)).unwrap();
    doc.add(LayoutElement::PageBreak).unwrap();
    doc.add(LayoutElement::PageBreak).unwrap();
    doc.add(bordered(10.0)).unwrap();
    assert_eq!(doc.page_count(), 2);
    assert!(out.join("Doc_0/Pages/Page_0/Content.xml").is_file());
    doc.close().unwrap();

    let reader = PackageReader::open(&out).unwrap();
    assert_eq!(reader.page_count(), 2);
}

#[test]
fn added_page_follows_the_flowed_content() {
    let dir = common::scratch();
    let out = dir.path().join("vpage");
    let mut doc = Document::with_options(&out, dir_options()).unwrap();
    doc.add(bordered(10.0)).unwrap();
    let page = VirtualPage::new(PageLayout::a5())
        .with(bordered(30.0).at(10.0, 10.0))
        .unwrap()
        .with(bordered(30.0).at(10.0, 150.0))
        .unwrap();
    doc.add_page(page).unwrap();
    assert_eq!(doc.page_count(), 2);
    doc.add(bordered(10.0)).unwrap();
    doc.close().unwrap();

    let mut reader = PackageReader::open(&out).unwrap();
    assert_eq!(reader.page_count(), 3);
    let first = reader.page_content(0).unwrap();
    assert!(first.child("Area").is_none());

    let added = reader.page_content(1).unwrap();
    let area = added.child("Area").unwrap().child("PhysicalBox").unwrap();
    assert_eq!(area.text(), "0 0 148 210");
    let layer = added.child("Content").unwrap().child("Layer").unwrap();
    assert_eq!(layer.children("PathObject").count(), 2);

    let last = reader.page_content(2).unwrap();
    let layer = last.child("Content").unwrap().child("Layer").unwrap();
    assert_eq!(layer.children("PathObject").count(), 1);
}

#[test]
fn virtual_page_takes_only_positioned_elements() {
    let mut page = VirtualPage::new(layout());
    assert!(matches!(page.add(bordered(10.0)), Err(Error::Configuration(_))));
    assert!(matches!(
        page.add(LayoutElement::PageBreak),
        Err(Error::Configuration(_))
    ));
    assert!(page.is_empty());
    page.add(bordered(10.0).at(0.0, 0.0)).unwrap();
    assert_eq!(page.elements().len(), 1);
}

#[test]
fn page_hook_draws_on_every_page() {
    let dir = common::scratch();
    let out = dir.path().join("hook");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut doc = Document::with_options(&out, dir_options()).unwrap();
    let log = Arc::clone(&seen);
    doc.on_page(move |index, page| {
        log.lock().unwrap().push(index);
        let footer = Paragraph::new(format!("page {}", index + 1))
            .font_size(4.0)
            .width(50.0)
            .at(20.0, page.layout.height - 15.0);
        page.add(footer)?;
        Ok(())
    });
    for _ in 0..3 {
        doc.add(bordered(100.0)).unwrap();
    }
    doc.add_page(VirtualPage::new(PageLayout::a5())).unwrap();
    doc.close().unwrap();
    assert_eq!(*seen.lock().unwrap(), [0, 1, 2]);

    let mut reader = PackageReader::open(&out).unwrap();
    assert_eq!(reader.page_count(), 3);
    for n in 0..3 {
        let page = reader.page_content(n).unwrap();
        let xml = String::from_utf8(page.to_xml_bytes()).unwrap();
        assert!(xml.contains(&format!("page {}", n + 1)));
        let layer = page.child("Content").unwrap().child("Layer").unwrap();
        assert_eq!(layer.children("TextObject").count(), 1);
    }
}

#[test]
fn failing_page_hook_is_a_render_error() {
    let dir = common::scratch();
    let mut doc = Document::with_options(dir.path().join("hook"), dir_options()).unwrap();
    doc.on_page(|_, _| Err("no footer".into()));
    doc.add(bordered(10.0)).unwrap();
    assert!(matches!(doc.close(), Err(Error::Render { .. })));
    assert_eq!(doc.state(), DocState::Closing);
}

#[test]
fn failed_close_can_be_retried() {
    let dir = common::scratch();
    let out = dir.path().join("retry");
    let mut doc = Document::with_options(&out, dir_options()).unwrap();
    doc.add(Canvas::new(50.0, 50.0).with_drawer(|_| Err("no paint".into())))
        .unwrap();

    let err = doc.close().unwrap_err();
    assert!(matches!(err, Error::Render { .. }));
    assert_eq!(doc.state(), DocState::Closing);
    assert!(matches!(doc.add(bordered(10.0)), Err(Error::State(_))));
    assert!(doc.close().is_err());
    assert_eq!(doc.state(), DocState::Closing);
    assert!(!out.join("Doc_0/Document.xml").exists());
}

#[test]
fn page_break_failure_surfaces_from_add() {
    let dir = common::scratch();
    let mut doc = Document::with_options(dir.path().join("fail"), dir_options()).unwrap();
    doc.add(Canvas::new(50.0, 200.0).with_drawer(|_| Err("broken".into())))
        .unwrap();
    let err = doc.add(bordered(100.0)).unwrap_err();
    assert!(err.to_string().contains("broken"));
    assert_eq!(doc.state(), DocState::Open);
}

#[cfg(feature = "async")]
#[tokio::test]
async fn async_close_writes_the_same_files() {
    let dir = common::scratch();
    let sync_out = dir.path().join("sync");
    let async_out = dir.path().join("async");
    for (out, run_async) in [(&sync_out, false), (&async_out, true)] {
        let mut doc = Document::with_options(out, dir_options()).unwrap();
        for _ in 0..3 {
            doc.add(bordered(100.0)).unwrap();
        }
        if run_async {
            doc.close_async().await.unwrap();
        } else {
            doc.close().unwrap();
        }
        assert_eq!(doc.state(), DocState::Closed);
    }
    let a = common::snapshot(&sync_out);
    let b = common::snapshot(&async_out);
    assert_eq!(a.keys().collect::<Vec<_>>(), b.keys().collect::<Vec<_>>());
    assert_eq!(a["Doc_0/Pages/Page_1/Content.xml"], b["Doc_0/Pages/Page_1/Content.xml"]);
}

#[cfg(feature = "async")]
#[tokio::test]
async fn dropped_async_close_can_be_finished_with_close() {
    let dir = common::scratch();
    let out = dir.path().join("dropped");
    let mut doc = Document::with_options(&out, dir_options()).unwrap();
    for _ in 0..200 {
        doc.add(bordered(100.0)).unwrap();
    }
    match tokio::time::timeout(std::time::Duration::ZERO, doc.close_async()).await {
        Err(_) => assert_eq!(doc.state(), DocState::Closing),
        Ok(result) => result.unwrap(),
    }
    doc.close().unwrap();
    assert_eq!(doc.state(), DocState::Closed);

    let reader = PackageReader::open(&out).unwrap();
    assert_eq!(reader.page_count(), 100);
    assert!(out.join("Doc_0/Pages/Page_99/Content.xml").is_file());
}
