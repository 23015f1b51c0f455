//! Where images come from.
//!
//! The pipeline only needs two operations: turn a user-supplied identifier
//! into a canonical digest, and materialize that image's filesystem into a
//! directory while returning its metadata. Both are traits so the pipeline can
//! be driven by the docker CLI, a directory store, or test fakes.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::model::Value;

pub mod docker;
pub mod store;

pub use docker::DockerCli;
pub use store::DirectoryStore;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Can't find image {0}")]
    NotFound(String),
    #[error("Failed to resolve image {identifier}: {reason}")]
    Failed { identifier: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to extract image {id}: {reason}")]
    Failed { id: String, reason: String },
}

impl ExtractError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ExtractError::Io { path: path.into(), source }
    }

    pub fn failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        ExtractError::Failed { id: id.into(), reason: reason.into() }
    }
}

/// Turns an image name, tag or short id into a canonical identifier.
pub trait ImageResolver: Send + Sync {
    fn resolve(&self, identifier: &str) -> Result<String, ResolveError>;
}

/// Materializes an image's filesystem into `dest` and returns its metadata.
///
/// `dest` exists and is empty when this is called.
pub trait ImageExtractor: Send + Sync {
    fn extract(&self, id: &str, dest: &Path) -> Result<Value, ExtractError>;
}
