//! IngestSleuth: priority-ordered ingest scheduling for forensic images.
//!
//! Thin binary entry point. All logic lives in the `ingestsleuth-core`
//! and `ingestsleuth-cli` crates.

use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let args = ingestsleuth_cli::parse_args();

    // Initialise structured logging. RUST_LOG wins over --verbose.
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("IngestSleuth starting");

    let summary = ingestsleuth_cli::run(&args)?;
    tracing::info!(
        "Done: {} images, {} files dispatched, {} module failures",
        summary.images_dispatched,
        summary.files_dispatched,
        summary.failure_count
    );
    Ok(())
}
