pub mod config;
pub mod history;
pub mod job;

pub use config::DaemonConfig;
pub use history::{HistoryEntry, Metadata, Summary};
pub use job::{AnalyzeRequest, JobRecord, JobStatus, ResolvedTarget, SourceKind};
