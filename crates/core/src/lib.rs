//! containerdiff-core
//!
//! Core library for comparing two container images.
//!
//! A comparison runs a set of independent comparators over two extracted
//! images, merges their outputs into one report and optionally prunes that
//! report with declarative include/exclude filters.
//!
//! All substantive logic lives here so it is testable and reusable from
//! multiple frontends; the CLI is a thin wrapper.

pub mod filter;
pub mod model;
pub mod report;
pub mod services;

/// Returns the library version as encoded at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
