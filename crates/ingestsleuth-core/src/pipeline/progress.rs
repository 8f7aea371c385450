/// Ingest progress reporting: lightweight messages sent from the dispatcher
/// and the workers to whoever drives the run.
use crate::model::NodeId;
use std::time::Duration;

#[derive(Debug)]
pub enum IngestProgress {
    /// Periodic update with running totals.
    Update {
        images_dispatched: u64,
        files_dispatched: u64,
        /// Approximate file-ingest completion, 0 to 100.
        percent_done: f32,
        current_file: String,
    },
    /// A module returned an error for one task. The run continues.
    ModuleFailed {
        module: String,
        node: NodeId,
        name: String,
        message: String,
    },
    /// Both schedulers ran dry and every dispatched task finished.
    Complete {
        duration: Duration,
        images_dispatched: u64,
        files_dispatched: u64,
        failure_count: u64,
    },
    /// The run was cancelled. Pending work was dropped.
    Cancelled,
}
