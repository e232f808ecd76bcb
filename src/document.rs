//! Document orchestration: add elements, paginate, render, persist.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tempfile::TempDir;

use crate::container::{ContainerId, ContainerTree};
use crate::error::{BoxError, Error};
use crate::ids::IdAllocator;
use crate::layout::{Segment, SegmentationEngine};
use crate::measure::{FixedAdvance, TextMeasure};
use crate::model::{LayoutElement, PageHandler, PageLayout, VirtualPage};
use crate::ofd::{self, DocInfo, PageRef};
use crate::render::{RenderContext, render_layers};
use crate::res::ResManager;

/// How the finished package is stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PackageFormat {
    /// A single zip archive at the output path.
    #[default]
    Zip,
    /// The unpacked directory tree at the output path.
    Directory,
}

#[derive(Clone)]
pub struct DocumentOptions {
    pub page_layout: PageLayout,
    pub format: PackageFormat,
    /// Vertical space between consecutive elements on a page.
    pub gap: f64,
    pub creator: String,
    pub measure: Arc<dyn TextMeasure>,
}

impl Default for DocumentOptions {
    fn default() -> Self {
        Self {
            page_layout: PageLayout::default(),
            format: PackageFormat::default(),
            gap: 0.0,
            creator: concat!("ofd-layout ", env!("CARGO_PKG_VERSION")).to_string(),
            measure: Arc::new(FixedAdvance::default()),
        }
    }
}

impl fmt::Debug for DocumentOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentOptions")
            .field("page_layout", &self.page_layout)
            .field("format", &self.format)
            .field("gap", &self.gap)
            .field("creator", &self.creator)
            .finish_non_exhaustive()
    }
}

impl DocumentOptions {
    pub fn page_layout(mut self, layout: PageLayout) -> Self {
        self.page_layout = layout;
        self
    }

    pub fn format(mut self, format: PackageFormat) -> Self {
        self.format = format;
        self
    }

    pub fn gap(mut self, gap: f64) -> Self {
        self.gap = gap;
        self
    }

    pub fn creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = creator.into();
        self
    }

    pub fn measure(mut self, measure: Arc<dyn TextMeasure>) -> Self {
        self.measure = measure;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocState {
    Open,
    /// `close` started but has not completed; calling it again retries.
    Closing,
    Closed,
}

/// An OFD document being written.
///
/// Elements are paginated as they arrive; every page except the last is
/// final as soon as a later element starts a new page, and is rendered right
/// away. `close` renders the rest and writes the package.
pub struct Document {
    out: PathBuf,
    format: PackageFormat,
    state: DocState,
    layout: PageLayout,
    engine: SegmentationEngine,
    measure: Arc<dyn TextMeasure>,
    ids: IdAllocator,
    tree: ContainerTree,
    /// Scratch package root while assembling a zip.
    work: Option<TempDir>,
    doc_dir: ContainerId,
    doc_manifest: String,
    res: ResManager,
    elements: Vec<LayoutElement>,
    /// Page tree, including pages of a reopened package.
    pages: Vec<PageRef>,
    /// Segments of `elements` already rendered.
    rendered: usize,
    segment_count: usize,
    next_page_dir: usize,
    creator: String,
    on_page: Option<Box<dyn PageHandler>>,
}

fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
}

fn require_parent(path: &Path) -> Result<(), Error> {
    let parent = parent_dir(path);
    if parent.is_dir() {
        Ok(())
    } else {
        Err(Error::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("output directory does not exist: {}", parent.display()),
        )))
    }
}

fn scratch_dir(near: &Path) -> Result<TempDir, Error> {
    Ok(tempfile::Builder::new()
        .prefix(".ofd-layout-")
        .tempdir_in(parent_dir(near))?)
}

impl Document {
    /// New document with default options, written as a zip to `out`.
    pub fn create(out: impl AsRef<Path>) -> Result<Self, Error> {
        Self::with_options(out, DocumentOptions::default())
    }

    pub fn with_options(out: impl AsRef<Path>, options: DocumentOptions) -> Result<Self, Error> {
        let out = out.as_ref().to_path_buf();
        require_parent(&out)?;
        let (mut tree, work) = match options.format {
            PackageFormat::Zip => {
                let work = scratch_dir(&out)?;
                (ContainerTree::create(work.path())?, Some(work))
            }
            PackageFormat::Directory => (ContainerTree::create(&out)?, None),
        };
        // A new document replaces whatever package was at `out`; appending is
        // what `open` is for.
        if let Some(stale) = tree.get_container(ContainerTree::ROOT, ofd::DOC_DIR)? {
            log::warn!("Replacing existing document in {}", out.display());
            tree.clean(stale)?;
        }
        let doc_dir = tree.obtain_container(ContainerTree::ROOT, ofd::DOC_DIR)?;
        let mut doc = Self::assemble(out, options, tree, work, doc_dir);

        let info = DocInfo {
            doc_id: uuid::Uuid::new_v4().simple().to_string(),
            creation_date: chrono::Local::now().format("%Y-%m-%d").to_string(),
            creator: doc.creator.clone(),
        };
        doc.tree
            .put_obj(ContainerTree::ROOT, ofd::ROOT_MANIFEST, ofd::root_manifest(&info))?;
        log::info!("Created document {} ({:?})", doc.out.display(), doc.format);
        Ok(doc)
    }

    /// Reopens an existing package to append pages. Ids continue after the
    /// package's `MaxUnitID` and existing resources are reused.
    pub fn open(path: impl AsRef<Path>, options: DocumentOptions) -> Result<Self, Error> {
        let out = path.as_ref().to_path_buf();
        let (mut tree, work) = match options.format {
            PackageFormat::Zip => {
                let file = fs::File::open(&out).map_err(|e| {
                    Error::Io(io::Error::new(e.kind(), format!("{}: {}", e, out.display())))
                })?;
                let mut archive = zip::ZipArchive::new(file)
                    .map_err(|_| Error::InvalidPackage("file is not a ZIP archive".into()))?;
                let work = scratch_dir(&out)?;
                archive.extract(work.path())?;
                (ContainerTree::create(work.path())?, Some(work))
            }
            PackageFormat::Directory => {
                if !out.is_dir() {
                    return Err(Error::Io(io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("package directory does not exist: {}", out.display()),
                    )));
                }
                (ContainerTree::create(&out)?, None)
            }
        };

        let doc_root = tree
            .get_obj(ContainerTree::ROOT, ofd::ROOT_MANIFEST)?
            .and_then(|root| root.child("DocBody")?.child("DocRoot").map(|e| e.text()))
            .ok_or_else(|| Error::InvalidPackage("OFD.xml has no DocRoot".into()))?;
        let Some((dir, manifest)) = doc_root.trim().trim_start_matches('/').split_once('/') else {
            return Err(Error::InvalidPackage(format!("unsupported DocRoot '{doc_root}'")));
        };
        let doc_dir = tree
            .get_container(ContainerTree::ROOT, dir)?
            .ok_or_else(|| Error::InvalidPackage(format!("missing document directory {dir}")))?;
        let document = tree
            .get_obj(doc_dir, manifest)?
            .cloned()
            .ok_or_else(|| Error::InvalidPackage(format!("missing {doc_root}")))?;

        let max_unit_id = document
            .child("CommonData")
            .and_then(|c| c.child("MaxUnitID"))
            .and_then(|e| e.text().trim().parse::<u32>().ok())
            .unwrap_or(0);
        let mut pages = Vec::new();
        if let Some(tree_el) = document.child("Pages") {
            for page in tree_el.children("Page") {
                let id = page.attr("ID").and_then(|v| v.parse().ok()).ok_or_else(|| {
                    Error::InvalidPackage("page entry without a valid ID".into())
                })?;
                let base_loc = page.attr("BaseLoc").unwrap_or_default().to_string();
                pages.push(PageRef { id, base_loc });
            }
        }

        let manifest = manifest.to_string();
        let mut doc = Self::assemble(out, options, tree, work, doc_dir);
        doc.ids = IdAllocator::starting_after(max_unit_id);
        doc.doc_manifest = manifest;
        doc.res = ResManager::load(&mut doc.tree, ContainerTree::ROOT, doc_dir)?;
        doc.next_page_dir = pages.len();
        doc.pages = pages;
        log::info!(
            "Reopened {} with {} pages, {} resources, MaxUnitID {max_unit_id}",
            doc.out.display(),
            doc.pages.len(),
            doc.res.len()
        );
        Ok(doc)
    }

    fn assemble(
        out: PathBuf,
        options: DocumentOptions,
        tree: ContainerTree,
        work: Option<TempDir>,
        doc_dir: ContainerId,
    ) -> Self {
        let engine = SegmentationEngine::new()
            .with_gap(options.gap)
            .with_measure(options.measure.clone());
        Self {
            out,
            format: options.format,
            state: DocState::Open,
            layout: options.page_layout,
            engine,
            measure: options.measure,
            ids: IdAllocator::new(),
            tree,
            work,
            doc_dir,
            doc_manifest: ofd::DOC_MANIFEST.to_string(),
            res: ResManager::new(ContainerTree::ROOT, doc_dir),
            elements: Vec::new(),
            pages: Vec::new(),
            rendered: 0,
            segment_count: 0,
            next_page_dir: 0,
            creator: options.creator,
            on_page: None,
        }
    }

    fn ensure_open(&self) -> Result<(), Error> {
        match self.state {
            DocState::Open => Ok(()),
            DocState::Closing | DocState::Closed => Err(Error::State(format!(
                "cannot add content to a document that is {:?}",
                self.state
            ))),
        }
    }

    /// Installs the hook run before each page is rendered. Pages rendered
    /// before the call are not revisited.
    pub fn on_page<F>(&mut self, handler: F) -> &mut Self
    where
        F: FnMut(usize, &mut VirtualPage) -> Result<(), BoxError> + Send + 'static,
    {
        self.on_page = Some(Box::new(handler));
        self
    }

    pub fn on_page_boxed(&mut self, handler: Box<dyn PageHandler>) -> &mut Self {
        self.on_page = Some(handler);
        self
    }

    /// Queues `element`, re-paginates and renders every page that became
    /// final. A failed pagination leaves the document as it was.
    pub fn add(&mut self, element: impl Into<LayoutElement>) -> Result<(), Error> {
        self.ensure_open()?;
        self.elements.push(element.into());
        let segments = match self.engine.process(&self.elements, &self.layout) {
            Ok(segments) => segments,
            Err(e) => {
                self.elements.pop();
                return Err(e);
            }
        };
        self.segment_count = segments.len();
        let finalized = segments.len().saturating_sub(1);
        self.render_pages(&segments[..finalized])
    }

    /// Appends a page laid out by hand. The flowed content added so far is
    /// closed off first, so the page lands after it.
    pub fn add_page(&mut self, page: VirtualPage) -> Result<(), Error> {
        self.ensure_open()?;
        let segment = self.engine.place_fixed(page.elements(), &page.layout)?;

        self.elements.push(LayoutElement::PageBreak);
        let segments = match self.engine.process(&self.elements, &self.layout) {
            Ok(segments) => segments,
            Err(e) => {
                self.elements.pop();
                return Err(e);
            }
        };
        self.segment_count = segments.len();
        self.render_pages(&segments)?;
        self.render_page(&segment, Some(page.elements()))
    }

    fn render_pages(&mut self, segments: &[Segment]) -> Result<(), Error> {
        for segment in segments.iter().skip(self.rendered) {
            self.render_page(segment, None)?;
            self.rendered += 1;
        }
        Ok(())
    }

    /// Renders one page from `fixed`, or from the flowed elements when
    /// `None`, together with whatever the page hook adds.
    fn render_page(
        &mut self,
        segment: &Segment,
        fixed: Option<&[LayoutElement]>,
    ) -> Result<(), Error> {
        let mut extra = VirtualPage::new(segment.layout().clone());
        if let Some(handler) = self.on_page.as_mut() {
            handler
                .handle(self.pages.len(), &mut extra)
                .map_err(|e| Error::render_with("page handler failed", e))?;
        }
        let extra_segment = self.engine.place_fixed(extra.elements(), &extra.layout)?;

        let elements = fixed.unwrap_or(self.elements.as_slice());
        let mut cx = RenderContext::new(&mut self.ids, &mut self.res, self.measure.as_ref());
        let mut content = render_layers(
            &[(segment, elements), (&extra_segment, extra.elements())],
            &mut cx,
        )?;
        if *segment.layout() != self.layout {
            content.area = Some(segment.layout().physical_box());
        }
        let page_id = self.ids.next_id();

        let pages_dir = self.tree.obtain_container(self.doc_dir, ofd::PAGES_DIR)?;
        while self
            .tree
            .get_container(pages_dir, &ofd::page_dir(self.next_page_dir))?
            .is_some()
        {
            self.next_page_dir += 1;
        }
        let index = self.next_page_dir;
        let page_dir = self.tree.obtain_container(pages_dir, &ofd::page_dir(index))?;
        self.tree
            .put_obj(page_dir, ofd::PAGE_CONTENT, content.to_element())?;
        self.next_page_dir += 1;
        log::debug!(
            "Rendered page {index} (id {page_id}): {} elements, {} objects",
            segment.len(),
            content.object_count()
        );
        self.pages.push(PageRef::for_index(page_id, index));
        Ok(())
    }

    /// Renders the remaining pages and hands the manifests and resources to
    /// the container tree. Nothing is written to disk yet.
    fn prepare(&mut self) -> Result<(), Error> {
        let segments = self.engine.process(&self.elements, &self.layout)?;
        self.segment_count = segments.len();
        self.render_pages(&segments)?;

        let manifest = ofd::document_manifest(
            self.ids.max_unit_id(),
            &self.layout,
            self.res.public_res_loc(),
            self.res.document_res_loc(),
            &self.pages,
        );
        let name = self.doc_manifest.clone();
        self.tree.put_obj(self.doc_dir, &name, manifest)?;
        self.res.flush(&mut self.tree)
    }

    /// Flushes the container tree and, for zip output, packs it.
    fn persist(tree: &ContainerTree, out: &Path, format: PackageFormat) -> Result<(), Error> {
        tree.flush()?;
        if format == PackageFormat::Zip {
            tree.pack_zip(out)?;
        }
        Ok(())
    }

    fn release_scratch(&mut self) -> Result<(), Error> {
        if let Some(work) = self.work.take() {
            work.close()?;
        }
        Ok(())
    }

    /// Finishes the package. Closing a closed document does nothing; after
    /// a failed close the document stays `Closing` and `close` may be retried.
    pub fn close(&mut self) -> Result<(), Error> {
        if self.state == DocState::Closed {
            log::debug!("Document {} already closed", self.out.display());
            return Ok(());
        }
        self.state = DocState::Closing;
        let t0 = Instant::now();

        self.prepare()?;
        let t_render = t0.elapsed();

        Self::persist(&self.tree, &self.out, self.format)?;
        self.release_scratch()?;
        let t_total = t0.elapsed();

        self.state = DocState::Closed;
        log::info!(
            "Timing: render={:.1}ms, write={:.1}ms, total={:.1}ms ({} pages, {} resources)",
            t_render.as_secs_f64() * 1000.0,
            (t_total - t_render).as_secs_f64() * 1000.0,
            t_total.as_secs_f64() * 1000.0,
            self.pages.len(),
            self.res.len(),
        );
        Ok(())
    }

    /// Like [`close`](Self::close) with the flush and pack running on tokio's
    /// blocking pool. The files written are the same.
    #[cfg(feature = "async")]
    pub async fn close_async(&mut self) -> Result<(), Error> {
        if self.state == DocState::Closed {
            return Ok(());
        }
        self.state = DocState::Closing;
        self.prepare()?;

        // The blocking task writes from a snapshot; `self.tree` stays intact
        // if this future is dropped, so `close` can still be retried.
        let snapshot = self.tree.clone();
        let out = self.out.clone();
        let format = self.format;
        tokio::task::spawn_blocking(move || Self::persist(&snapshot, &out, format))
            .await
            .map_err(|e| Error::Io(io::Error::other(e)))??;
        self.release_scratch()?;
        self.state = DocState::Closed;
        log::info!("Closed {} ({} pages)", self.out.display(), self.pages.len());
        Ok(())
    }

    pub fn state(&self) -> DocState {
        self.state
    }

    pub fn page_layout(&self) -> &PageLayout {
        &self.layout
    }

    /// Pages of the document so far, including the still-open last page.
    pub fn page_count(&self) -> usize {
        self.pages.len() - self.rendered + self.segment_count
    }

    pub fn res_manager(&self) -> &ResManager {
        &self.res
    }

    pub fn max_unit_id(&self) -> u32 {
        self.ids.max_unit_id()
    }

    pub fn output_path(&self) -> &Path {
        &self.out
    }
}

impl Drop for Document {
    fn drop(&mut self) {
        if self.state != DocState::Closed {
            log::warn!(
                "Document {} dropped without close; package is incomplete",
                self.out.display()
            );
        }
    }
}
