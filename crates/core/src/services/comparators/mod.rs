pub mod files;
pub mod history;
pub mod metadata;

pub use files::FilesComparator;
pub use history::HistoryComparator;
pub use metadata::MetadataComparator;
