//! Comparison services: the comparator contract and registry, the built-in
//! comparators, result aggregation, image sources and the pipeline tying
//! them together.

pub mod aggregate;
pub mod comparators;
pub mod dispatch;
pub mod pipeline;
pub mod sources;
