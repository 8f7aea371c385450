/// Error types for the IngestSleuth core.
///
/// Only programming errors (pulling from an empty scheduler) are surfaced
/// to the consumer as hard failures. Content-tree failures are recovered
/// locally by the scheduler and merely logged; they still carry structured
/// errors so the tree implementations can report what went wrong.
use crate::model::NodeId;
use std::path::PathBuf;
use thiserror::Error;

/// Misuse of a scheduler's pull interface.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// `next()` was called while nothing was pending. Callers must check
    /// `has_next()` first.
    #[error("no pending task, check has_next() first")]
    NoPendingTask,
}

/// Failures reported by a [`ContentTree`](crate::tree::ContentTree).
#[derive(Error, Debug)]
pub enum TreeError {
    /// The id does not name a node in this tree.
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// The node exists but its children (or its file count) could not be read.
    #[error("node {id} ({name}) could not be read")]
    Unreadable { id: NodeId, name: String },

    /// The file-count query for a filesystem failed.
    #[error("file count query failed for filesystem {fs}: {reason}")]
    CountFailed { fs: NodeId, reason: String },
}

/// Failures while loading a JSON image manifest.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("failed to read manifest '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid manifest JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// The top-level manifest entry must describe an image.
    #[error("manifest root must be an image, found {0}")]
    NotAnImage(String),

    #[error("manifest node at '{path}' has an empty name")]
    EmptyName { path: String },

    /// A `file_system` node must name its filesystem type.
    #[error("filesystem at '{path}' has no fs_type")]
    MissingFsType { path: String },
}

/// Failures while loading or validating a [`SchedulerConfig`](crate::config::SchedulerConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("priority rule {index} has an empty prefix")]
    EmptyPrefix { index: usize },

    #[error("workers must be at least 1")]
    NoWorkers,
}

/// Failures while importing a directory from disk as an image.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("'{0}' is not a directory")]
    NotADirectory(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures while writing a delivery report.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
