use crate::container::{GraphOptions, PptxContainer};
use crate::discover::is_pdf;
use crate::identity::{remap, PartNamer};
use crate::import::ImportSession;
use crate::merge_config::MergeConfig;
use crate::package::Package;
use crate::pdf::{import_page, RenderedPages};
use crate::slide::import_slide;
use crate::theme::{isolate_chain, ThemeChain};
use crate::{Error, FailureKind, PartName, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Where a [`Merger`] is in its run.
///
/// `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeState {
    Idle,
    Initializing,
    /// Importing the source at this index of the input list.
    ImportingSource(usize),
    Finalizing,
    Done,
    Failed(FailureKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceStatus {
    Pending,
    Merged,
    Failed { kind: FailureKind, reason: String },
    /// The run ended before this source was reached.
    NotProcessed,
}

#[derive(Debug, Clone)]
pub struct SourceReport {
    pub path: PathBuf,
    pub status: SourceStatus,
    pub slides_merged: usize,
}

impl SourceReport {
    pub fn is_merged(&self) -> bool {
        self.status == SourceStatus::Merged
    }
}

/// Per-source outcome of a run plus the slide count of the target.
#[derive(Debug, Clone, Default)]
pub struct MergeResult {
    pub sources: Vec<SourceReport>,
    pub total_slides: usize,
}

impl MergeResult {
    fn new(inputs: &[PathBuf]) -> Self {
        Self {
            sources: inputs
                .iter()
                .map(|path| SourceReport {
                    path: path.clone(),
                    status: SourceStatus::Pending,
                    slides_merged: 0,
                })
                .collect(),
            total_slides: 0,
        }
    }

    pub fn merged(&self) -> impl Iterator<Item = &SourceReport> {
        self.sources.iter().filter(|s| s.is_merged())
    }

    pub fn failed(&self) -> impl Iterator<Item = &SourceReport> {
        self.sources
            .iter()
            .filter(|s| matches!(s.status, SourceStatus::Failed { .. }))
    }
}

/// Notification sent to the progress callback while a run is in flight.
#[derive(Debug)]
pub enum Progress<'a> {
    /// A slide was appended. `slide` counts from 1 within the source.
    SlideImported {
        source: &'a Path,
        slide: usize,
        result: &'a MergeResult,
    },
    /// A source was merged, skipped or rolled back.
    SourceFinished { source: &'a Path, result: &'a MergeResult },
}

/// What a run produced. `result` is complete even when `outcome` is an error.
#[derive(Debug)]
pub struct MergeReport {
    pub result: MergeResult,
    pub outcome: Result<()>,
}

impl MergeReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Shared flag that stops a run at the next source boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drives a merge run: validates the destination, imports each source in
/// order into one target package and saves it.
///
/// A source that cannot be opened or fails mid-import is rolled back and
/// skipped; the run goes on with the next one. Only a destination problem, an
/// empty input list, cancellation or the lack of any mergeable source fails
/// the whole run, and in those cases nothing is written.
///
/// # Example
///
/// ```no_run
/// use pptx_combine::{MergeConfig, Merger, Progress};
/// use std::path::{Path, PathBuf};
///
/// let inputs = vec![PathBuf::from("a.pptx"), PathBuf::from("b.pptx")];
/// let config = MergeConfig::default();
/// let mut merger = Merger::new(&config).with_progress(|event| {
///     if let Progress::SourceFinished { source, result } = event {
///         println!("{}: {} slides so far", source.display(), result.total_slides);
///     }
/// });
/// let report = merger.run(&inputs, Path::new("combined_presentation.pptx"));
/// assert!(report.is_success());
/// ```
pub struct Merger<'a> {
    config: &'a MergeConfig,
    progress: Option<Box<dyn FnMut(&Progress) + 'a>>,
    cancel: CancelFlag,
    state: MergeState,
    namer: PartNamer,
}

impl<'a> Merger<'a> {
    pub fn new(config: &'a MergeConfig) -> Self {
        Self {
            config,
            progress: None,
            cancel: CancelFlag::default(),
            state: MergeState::Idle,
            namer: PartNamer::new(),
        }
    }

    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&Progress) + 'a,
    {
        self.progress = Some(Box::new(callback));
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> MergeState {
        self.state
    }

    /// Merges `inputs`, in order, into `output`.
    pub fn run(&mut self, inputs: &[PathBuf], output: &Path) -> MergeReport {
        let mut result = MergeResult::new(inputs);
        let outcome = self.execute(inputs, output, &mut result);
        match &outcome {
            Ok(()) => self.transition(MergeState::Done),
            Err(e) => {
                error!(error = %e, "merge failed");
                self.transition(MergeState::Failed(e.kind()));
            }
        }
        MergeReport { result, outcome }
    }

    fn execute(&mut self, inputs: &[PathBuf], output: &Path, result: &mut MergeResult) -> Result<()> {
        self.transition(MergeState::Initializing);
        if inputs.is_empty() {
            return Err(Error::NoInputFiles);
        }
        validate_destination(output)?;

        let mut target = match &self.config.template {
            Some(path) => {
                let mut template = PptxContainer::open(path)?;
                Some(Package::from_shell(&mut template)?)
            }
            None => None,
        };

        for (index, path) in inputs.iter().enumerate() {
            if self.cancel.is_cancelled() {
                for report in &mut result.sources[index..] {
                    report.status = SourceStatus::NotProcessed;
                }
                return Err(Error::Cancelled);
            }

            self.transition(MergeState::ImportingSource(index));
            info!(source = %path.display(), "merging source");
            match self.import_source(index, path, &mut target, result) {
                Ok(slides) => {
                    info!(source = %path.display(), slides, "merged source");
                    let report = &mut result.sources[index];
                    report.status = SourceStatus::Merged;
                    report.slides_merged = slides;
                }
                Err(e) => {
                    warn!(source = %path.display(), error = %e, "skipped source");
                    let report = &mut result.sources[index];
                    report.status = SourceStatus::Failed {
                        kind: e.kind(),
                        reason: e.to_string(),
                    };
                    report.slides_merged = 0;
                }
            }
            result.total_slides = target.as_ref().map_or(0, Package::slide_count);
            self.emit(Progress::SourceFinished { source: path, result });
        }

        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let target = match target {
            Some(target) if result.merged().next().is_some() => target,
            _ => return Err(Error::NoUsableSource),
        };

        self.transition(MergeState::Finalizing);
        target.save(output)?;
        result.total_slides = target.slide_count();
        Ok(())
    }

    /// Opens one source and imports it completely, or leaves the target as it was.
    ///
    /// When the source also supplied the target's shell, a failure drops the
    /// shell too and the next source that opens provides a new one.
    fn import_source(
        &mut self,
        index: usize,
        path: &Path,
        target: &mut Option<Package>,
        result: &mut MergeResult,
    ) -> Result<usize> {
        let mut source = if is_pdf(path) {
            Source::Pdf(RenderedPages::render(
                path,
                &self.config.pdf_renderer,
                self.config.pdf_resolution,
            )?)
        } else {
            Source::Package(PptxContainer::open(path)?)
        };

        let created = target.is_none();
        let package = match target.take() {
            Some(package) => package,
            None => match &mut source {
                Source::Package(container) => Package::from_shell(container)?,
                Source::Pdf(_) => Package::blank()?,
            },
        };
        let package = target.insert(package);

        let checkpoint = package.checkpoint();
        let outcome = match source {
            Source::Package(container) => self.import_slides(index, path, container, package, result),
            Source::Pdf(pages) => self.import_pages(index, path, &pages, package, result),
        };
        match outcome {
            Ok(slides) => Ok(slides),
            Err(e) if created => {
                debug!(source = %path.display(), "dropping shell of failed source");
                *target = None;
                Err(e)
            }
            Err(e) => {
                package.rollback(checkpoint);
                Err(e)
            }
        }
    }

    fn import_slides(
        &mut self,
        index: usize,
        path: &Path,
        mut source: PptxContainer,
        target: &mut Package,
        result: &mut MergeResult,
    ) -> Result<usize> {
        let options = GraphOptions {
            include_notes: self.config.include_notes,
            follow_notes_master: target.notes_master().is_none(),
        };
        let graph = source.graph(&options)?;
        let chain = ThemeChain::plan(&graph);
        let map = remap(&graph, &chain, target, &mut self.namer);
        let slides: Vec<PartName> = graph.slides.iter().map(|(slide, _)| slide.clone()).collect();

        let mut session = ImportSession::new(source, graph, map, self.config.parallel);
        isolate_chain(&mut session, &chain, target)?;

        for (n, slide) in slides.iter().enumerate() {
            import_slide(&mut session, slide, target)?;
            result.sources[index].slides_merged = n + 1;
            result.total_slides = target.slide_count();
            self.emit(Progress::SlideImported {
                source: path,
                slide: n + 1,
                result,
            });
        }
        Ok(slides.len())
    }

    /// Appends one picture slide per rendered PDF page.
    fn import_pages(
        &mut self,
        index: usize,
        path: &Path,
        pages: &RenderedPages,
        target: &mut Package,
        result: &mut MergeResult,
    ) -> Result<usize> {
        for (n, page) in pages.pages().iter().enumerate() {
            import_page(target, &mut self.namer, page, n + 1)?;
            result.sources[index].slides_merged = n + 1;
            result.total_slides = target.slide_count();
            self.emit(Progress::SlideImported {
                source: path,
                slide: n + 1,
                result,
            });
        }
        Ok(pages.len())
    }

    fn emit(&mut self, event: Progress) {
        if let Some(callback) = self.progress.as_mut() {
            callback(&event);
        }
    }

    fn transition(&mut self, state: MergeState) {
        debug!(from = ?self.state, to = ?state, "merge state");
        self.state = state;
    }
}

/// An opened input.
enum Source {
    Package(PptxContainer),
    Pdf(RenderedPages),
}

/// Merges `inputs` into `output` with the given configuration.
pub fn merge(inputs: &[PathBuf], output: &Path, config: &MergeConfig) -> MergeReport {
    Merger::new(config).run(inputs, output)
}

/// The output's directory must exist and the output itself must not be one.
fn validate_destination(output: &Path) -> Result<()> {
    if output.is_dir() {
        return Err(Error::InvalidDestination(output.to_path_buf()));
    }
    let parent = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if !parent.is_dir() {
        return Err(Error::InvalidDestination(parent.to_path_buf()));
    }
    Ok(())
}
