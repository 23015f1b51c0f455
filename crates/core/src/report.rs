//! Writing the final report.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use thiserror::Error;
use tracing::info;

use crate::model::Report;

/// Where the report goes at the end of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ReportSink {
    #[default]
    Stdout,
    File(PathBuf),
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Failed to write report to {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write report to stdout: {0}")]
    Stdout(#[source] std::io::Error),
}

/// Compact JSON encoding of the report.
pub fn render_report(report: &Report) -> Result<String, ReportError> {
    Ok(serde_json::to_string(report)?)
}

pub fn write_report(report: &Report, sink: &ReportSink) -> Result<(), ReportError> {
    let body = render_report(report)?;
    match sink {
        ReportSink::Stdout => {
            let mut out = std::io::stdout().lock();
            writeln!(out, "{body}").and_then(|_| out.flush()).map_err(ReportError::Stdout)
        }
        ReportSink::File(path) => {
            info!(path = %path.display(), "writing report");
            fs::write(path, body).map_err(|source| ReportError::File { path: path.clone(), source })
        }
    }
}
