//! Core data model shared by comparators, the aggregator and the pipeline.
//!
//! Structured values are plain `serde_json::Value`s: a tagged sum over
//! scalars, sequences and mappings. Comparators produce them, the filter
//! engine prunes them and the report sink serializes them unchanged.

use std::path::{Path, PathBuf};

pub use serde_json::{Map, Value};

/// Result of one comparator invocation: result key -> structured value.
pub type ComparatorResult = Map<String, Value>;

/// Final merged mapping of comparator results for one run.
pub type Report = Map<String, Value>;

/// One image prepared for comparison.
///
/// Built by the pipeline after extraction and handed to every comparator by
/// shared reference; nothing downstream can mutate it.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageContext {
    /// Canonical image identifier (digest) as returned by the resolver.
    pub id: String,
    /// Metadata produced by the extractor (config, history, ...).
    pub metadata: Value,
    /// Root of the extracted filesystem.
    pub root: PathBuf,
}

impl ImageContext {
    pub fn new(id: impl Into<String>, metadata: Value, root: impl Into<PathBuf>) -> Self {
        Self { id: id.into(), metadata, root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Shortened identifier for log lines (`sha256:` prefix dropped, 12 hex chars).
    pub fn short_id(&self) -> &str {
        let id = self.id.strip_prefix("sha256:").unwrap_or(&self.id);
        id.get(..12).unwrap_or(id)
    }
}

/// A comparator result tagged with the comparator that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedResult {
    pub comparator: String,
    pub result: ComparatorResult,
}

impl NamedResult {
    pub fn new(comparator: impl Into<String>, result: ComparatorResult) -> Self {
        Self { comparator: comparator.into(), result }
    }
}
