//! File and repository analysis

pub mod cache;
pub mod engine;
pub mod related;

pub use cache::{FileStatus, ResultCache};
pub use engine::{AnalysisEngine, NoProgress, ProgressSink, ScanProgress};
pub use related::{find_related_files, MAX_RELATED_FILES, RELATED_FILE_READ_CHARS};
