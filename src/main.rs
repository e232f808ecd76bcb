use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use ofd_layout::{
    Canvas, Cell, Div, Document, DocumentOptions, Edges, Error, FontSpec, LayoutElement,
    PackageFormat, PackageReader, PageLayout, Paragraph, Styled, TextAlign, VirtualPage, ZOrder,
};

#[derive(Parser)]
#[command(version, about = "Lay out box-model elements into OFD packages")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a sample document exercising every element kind
    Demo {
        output: PathBuf,
        /// Number of bordered blocks to append
        #[arg(long, default_value_t = 12)]
        blocks: usize,
        /// Vertical gap between elements, in millimetres
        #[arg(long, default_value_t = 4.0)]
        gap: f64,
        /// Write an unpacked directory instead of a zip archive
        #[arg(long)]
        dir: bool,
    },
    /// Print the page tree and resources of a package
    Inspect { package: PathBuf },
}

fn demo(output: PathBuf, blocks: usize, gap: f64, dir: bool) -> Result<(), Error> {
    let options = DocumentOptions::default()
        .page_layout(PageLayout::a4())
        .gap(gap)
        .format(if dir {
            PackageFormat::Directory
        } else {
            PackageFormat::Zip
        });
    let mut doc = Document::with_options(&output, options)?;
    doc.on_page(|index, page| {
        let footer = Paragraph::new(format!("- {} -", index + 1))
            .font_size(3.5)
            .align(TextAlign::Center)
            .width(page.layout.content_width())
            .at(page.layout.margin.left, page.layout.height - 15.0);
        page.add(footer)?;
        Ok(())
    });

    doc.add(
        Paragraph::new("ofd-layout demo")
            .font_size(8.0)
            .align(TextAlign::Center)
            .padding(Edges::symmetric(2.0, 0.0)),
    )?;
    doc.add(
        Div::new(40.0, 40.0)
            .background([230, 230, 250])
            .z_order(ZOrder::Background)
            .at(150.0, 10.0),
    )?;
    for i in 0..blocks {
        let div = Div::new(120.0, 20.0)
            .padding(Edges::all(2.0))
            .border(0.5)
            .border_color([40, 40, 160]);
        let div = if i % 3 == 1 {
            div.border_widths(Edges::new(1.0, 0.0, 1.0, 0.0))
                .border_dash(vec![0.0, 2.0, 1.0])
        } else {
            div
        };
        doc.add(div)?;
        let text = format!(
            "Block {} of {blocks}: 段落文本 wraps across the content width when it grows long enough.",
            i + 1
        );
        doc.add(Paragraph::new(text).font_size(4.0))?;
    }
    doc.add(LayoutElement::PageBreak)?;
    doc.add(
        Canvas::new(80.0, 50.0)
            .border(0.3)
            .with_drawer(|ctx| {
                ctx.set_fill_color([200, 60, 60]);
                ctx.fill_rect(5.0, 5.0, 30.0, 20.0)?;
                ctx.begin_path();
                ctx.move_to(40.0, 40.0);
                ctx.quadratic_curve_to(55.0, 5.0, 75.0, 40.0);
                ctx.set_line_width(0.8);
                ctx.set_line_dash(&[0.0, 3.0, 1.5])?;
                ctx.stroke()?;
                ctx.set_font(FontSpec::new("宋体", 5.0));
                ctx.fill_text("canvas", 5.0, 40.0)?;
                Ok(())
            }),
    )?;
    doc.add(
        Cell::new(60.0, 15.0)
            .text("centred cell")
            .align(TextAlign::Center)
            .border(0.2),
    )?;
    let cover = VirtualPage::new(PageLayout::a5()).with(
        Paragraph::new("Appendix")
            .font_size(10.0)
            .width(100.0)
            .at(24.0, 90.0),
    )?;
    doc.add_page(cover)?;
    doc.close()?;
    println!("Wrote {} ({} pages)", output.display(), doc.page_count());
    Ok(())
}

fn inspect(package: PathBuf) -> Result<(), Error> {
    let mut reader = PackageReader::open(&package)?;
    println!("Document root: {}", reader.doc_root());
    println!("MaxUnitID:     {}", reader.max_unit_id());
    if let Some([_, _, w, h]) = reader.physical_box() {
        println!("Page size:     {w} x {h} mm");
    }
    println!("Pages:         {}", reader.page_count());
    for index in 0..reader.page_count() {
        let page = reader.pages()[index].clone();
        let content = reader.page_content(index)?;
        let layers = content
            .child("Content")
            .map(|c| c.children("Layer").count())
            .unwrap_or(0);
        println!("  #{index} id={} {} ({layers} layers)", page.id, page.base_loc);
    }
    println!("Resources:     {}", reader.resources().len());
    for res in reader.resources() {
        println!(
            "  id={} {:?} {}",
            res.id,
            res.kind,
            res.file.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let result = match args.command {
        Command::Demo {
            output,
            blocks,
            gap,
            dir,
        } => demo(output, blocks, gap, dir),
        Command::Inspect { package } => inspect(package),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
