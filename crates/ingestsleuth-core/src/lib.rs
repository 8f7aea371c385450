/// IngestSleuth Core: ingest scheduling for forensic disk images.
///
/// This crate decides in which order the contents of disk images are handed
/// to analysis modules. It has no UI dependencies and is reused by the CLI.
///
/// # Modules
///
/// - [`model`]: Nodes, module sets, scheduling contexts, and tasks.
/// - [`tree`]: Read-only content tree access, the in-memory arena tree,
///   manifest loading, and on-disk directory import.
/// - [`scheduler`]: Image and file schedulers behind the `IngestScheduler` facade.
/// - [`pipeline`]: Background dispatcher and worker pool consuming the schedulers.
/// - [`report`]: CSV delivery reports.
/// - [`config`]: Scheduler and pipeline configuration.
/// - [`error`]: Error types.
pub mod config;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod scheduler;
pub mod tree;
