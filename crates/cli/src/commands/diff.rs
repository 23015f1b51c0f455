use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use containerdiff_core::filter::FilterConfig;
use containerdiff_core::report::ReportSink;
use containerdiff_core::services::dispatch::default_comparator_registry;
use containerdiff_core::services::pipeline::{Pipeline, PipelineOptions};
use containerdiff_core::services::sources::{
    DirectoryStore, DockerCli, ImageExtractor, ImageResolver,
};

use crate::prepare_preserve_dir;

/// Arguments of `containerdiff diff`.
///
/// `filter` and `preserve` distinguish "flag absent" (`None`) from "flag given
/// without a value" (`Some(None)`).
#[derive(Debug, Clone, Default)]
pub struct DiffArgs {
    pub first: String,
    pub second: String,
    pub silent: bool,
    pub filter: Option<Option<PathBuf>>,
    pub output: Option<PathBuf>,
    pub preserve: Option<Option<PathBuf>>,
    pub store: Option<PathBuf>,
    pub docker: Option<PathBuf>,
    pub only: Vec<String>,
    pub parallel: bool,
}

impl DiffArgs {
    pub fn new(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self { first: first.into(), second: second.into(), ..Default::default() }
    }
}

/// Build pipeline options from command line arguments.
pub fn pipeline_options(args: &DiffArgs) -> Result<PipelineOptions> {
    let filters = match &args.filter {
        None => None,
        Some(None) => Some(FilterConfig::builtin()),
        Some(Some(path)) => Some(FilterConfig::load(path)?),
    };

    let preserve = match &args.preserve {
        None => None,
        Some(None) => Some(std::env::temp_dir()),
        Some(Some(dir)) => Some(prepare_preserve_dir(dir)?),
    };

    let sink = args.output.clone().map(ReportSink::File).unwrap_or_default();

    Ok(PipelineOptions { silent: args.silent, filters, sink, preserve, concurrent: args.parallel })
}

/// Compare two images and write the report.
pub fn diff_command(args: &DiffArgs) -> Result<()> {
    let options = pipeline_options(args)?;

    let mut registry = default_comparator_registry();
    if !args.only.is_empty() {
        registry.retain_only(&args.only)?;
    }

    let store;
    let docker;
    let (resolver, extractor): (&dyn ImageResolver, &dyn ImageExtractor) = match &args.store {
        Some(dir) => {
            store = DirectoryStore::new(dir);
            (&store, &store)
        }
        None => {
            docker = args.docker.clone().map(DockerCli::new).unwrap_or_default();
            (&docker, &docker)
        }
    };

    let pipeline = Pipeline { resolver, extractor, registry: &registry, options: &options };
    let outcome = pipeline
        .run(&args.first, &args.second)
        .with_context(|| format!("Failed to compare {} and {}", args.first, args.second))?;

    if let Some((first, second)) = outcome.preserved {
        info!(first = %first.display(), second = %second.display(), "kept extracted images");
        eprintln!("Extracted images kept in:");
        eprintln!("  {}: {}", args.first, first.display());
        eprintln!("  {}: {}", args.second, second.display());
    }

    Ok(())
}
