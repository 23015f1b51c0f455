pub mod comparators;
pub mod diff;

pub use comparators::*;
pub use diff::*;
