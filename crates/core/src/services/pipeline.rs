use std::path::{Path, PathBuf};

use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::filter::FilterConfig;
use crate::model::{ImageContext, Report};
use crate::report::{write_report, ReportError, ReportSink};
use crate::services::aggregate::aggregate;
use crate::services::dispatch::{ComparatorRegistry, DispatchError};
use crate::services::sources::{ExtractError, ImageExtractor, ImageResolver, ResolveError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("Failed to create scratch directory in {path}: {source}")]
    Scratch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Report(#[from] ReportError),
}

/// Options for one comparison run.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Passed through to every comparator.
    pub silent: bool,
    /// `None` disables filtering.
    pub filters: Option<FilterConfig>,
    pub sink: ReportSink,
    /// Extract into this directory and keep the extracted images afterwards.
    /// When unset, images go to the system temp dir and are removed.
    pub preserve: Option<PathBuf>,
    /// Run comparators on separate threads.
    pub concurrent: bool,
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub report: Report,
    /// Extraction directories of both images, when preservation was requested.
    pub preserved: Option<(PathBuf, PathBuf)>,
}

/// Resolve, extract, compare, aggregate, emit.
pub struct Pipeline<'a> {
    pub resolver: &'a dyn ImageResolver,
    pub extractor: &'a dyn ImageExtractor,
    pub registry: &'a ComparatorRegistry,
    pub options: &'a PipelineOptions,
}

impl<'a> Pipeline<'a> {
    pub fn run(&self, first: &str, second: &str) -> Result<RunOutcome, PipelineError> {
        let first_id = self.resolve(first)?;
        let second_id = self.resolve(second)?;
        info!(first = %first_id, second = %second_id, "resolved images");

        let base = self.options.preserve.clone().unwrap_or_else(std::env::temp_dir);
        // Both guards remove their directory on drop, so every early return
        // below cleans up whatever was already extracted.
        let first_dir = ScratchDir::create(&base)?;
        let second_dir = ScratchDir::create(&base)?;

        let report = self.compare(&first_id, &first_dir, &second_id, &second_dir)?;

        let preserved = if self.options.preserve.is_some() {
            let kept = (first_dir.keep(), second_dir.keep());
            info!(first = %kept.0.display(), second = %kept.1.display(), "preserved extracted images");
            Some(kept)
        } else {
            debug!("removing temporary directories");
            first_dir.release();
            second_dir.release();
            None
        };

        Ok(RunOutcome { report, preserved })
    }

    fn resolve(&self, identifier: &str) -> Result<String, PipelineError> {
        self.resolver.resolve(identifier).map_err(|err| {
            error!(severity = "critical", image = %identifier, error = %err, "can't resolve image");
            PipelineError::from(err)
        })
    }

    fn compare(
        &self,
        first_id: &str,
        first_dir: &ScratchDir,
        second_id: &str,
        second_dir: &ScratchDir,
    ) -> Result<Report, PipelineError> {
        let first_meta = self.extractor.extract(first_id, first_dir.path())?;
        let second_meta = self.extractor.extract(second_id, second_dir.path())?;
        let first = ImageContext::new(first_id, first_meta, first_dir.path());
        let second = ImageContext::new(second_id, second_meta, second_dir.path());

        let results = if self.options.concurrent {
            self.registry.dispatch_concurrent(&first, &second, self.options.silent)?
        } else {
            self.registry.dispatch(&first, &second, self.options.silent)?
        };

        let report = aggregate(results, self.options.filters.as_ref());
        write_report(&report, &self.options.sink)?;
        Ok(report)
    }
}

/// Scratch directory for one extracted image, removed on drop unless kept.
struct ScratchDir {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl ScratchDir {
    fn create(base: &Path) -> Result<Self, PipelineError> {
        let dir = tempfile::Builder::new()
            .prefix("containerdiff-")
            .tempdir_in(base)
            .map_err(|source| PipelineError::Scratch { path: base.to_path_buf(), source })?;
        let path = dir.path().to_path_buf();
        debug!(path = %path.display(), "created scratch directory");
        Ok(Self { dir: Some(dir), path })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn keep(mut self) -> PathBuf {
        self.dir.take().map(TempDir::keep).unwrap_or_else(|| self.path.clone())
    }

    fn release(self) {
        drop(self);
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            if let Err(err) = dir.close() {
                warn!(path = %self.path.display(), error = %err, "failed to remove scratch directory");
            }
        }
    }
}
