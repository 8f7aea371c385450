/// IngestSleuth CLI: command-line frontend.
///
/// Loads one or more images (JSON manifests or on-disk directories),
/// schedules them with the selected modules, runs the ingest pipeline to
/// completion, and optionally writes a CSV delivery report. Business logic
/// lives in `ingestsleuth-core`.
pub mod modules;

use anyhow::{bail, Context};
use clap::Parser;
use ingestsleuth_core::config::SchedulerConfig;
use ingestsleuth_core::model::{FsType, NodeId};
use ingestsleuth_core::pipeline::progress::IngestProgress;
use ingestsleuth_core::pipeline::start_ingest;
use ingestsleuth_core::report::write_csv_file;
use ingestsleuth_core::scheduler::IngestScheduler;
use ingestsleuth_core::tree::{import_directory, load_manifest, ContentTree, MemoryTree};
use modules::{BuiltinModules, FileCategory};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Priority-ordered ingest of forensic image content trees
#[derive(Parser, Debug, Clone)]
#[command(
    name = "ingestsleuth",
    version,
    about = "Priority-ordered ingest of forensic image content trees",
    after_help = "EXAMPLES:\n    \
        ingestsleuth ./mounted-evidence --fs-type ntfs\n    \
        ingestsleuth --manifest laptop.json usb.json --process-unallocated\n    \
        ingestsleuth ./evidence --modules file-types --csv deliveries.csv -w 8"
)]
pub struct Args {
    /// Directories to import as images, or manifest files with --manifest
    #[arg(value_name = "SOURCE", required = true)]
    pub sources: Vec<PathBuf>,

    /// Treat SOURCE arguments as JSON image manifests
    #[arg(short, long)]
    pub manifest: bool,

    /// Filesystem type given to imported directories
    #[arg(long, default_value = "ntfs", value_parser = parse_fs_type, value_name = "TYPE")]
    pub fs_type: FsType,

    /// File modules to run (comma-separated)
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "file-types,name-index",
        value_name = "NAMES"
    )]
    pub modules: Vec<String>,

    /// Image modules to run (comma-separated, empty for none)
    #[arg(long, value_delimiter = ',', default_value = "image-summary", value_name = "NAMES")]
    pub image_modules: Vec<String>,

    /// Also ingest unallocated space and other virtual content
    #[arg(long)]
    pub process_unallocated: bool,

    /// JSON scheduler configuration file
    #[arg(short, long, env = "INGESTSLEUTH_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Write a CSV report of every dispatched task
    #[arg(long, value_name = "FILE")]
    pub csv: Option<PathBuf>,

    /// Number of pipeline worker threads (overrides the config file)
    #[arg(short = 'w', long, value_name = "NUM")]
    pub workers: Option<usize>,

    /// Debug-level logging (RUST_LOG takes precedence)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

fn parse_fs_type(s: &str) -> Result<FsType, String> {
    FsType::from_name(s).ok_or_else(|| format!("unknown filesystem type '{s}'"))
}

/// Parse the process arguments.
pub fn parse_args() -> Args {
    Args::parse()
}

/// What a run did, for the caller to report.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub images: Vec<NodeId>,
    pub images_dispatched: u64,
    pub files_dispatched: u64,
    pub failure_count: u64,
    pub cancelled: bool,
    pub file_types: Vec<(FileCategory, u64)>,
    pub indexed_names: usize,
}

/// Load every source into one tree. Returns the tree and the image ids in
/// argument order.
pub fn load_sources(args: &Args) -> anyhow::Result<(MemoryTree, Vec<NodeId>)> {
    let mut tree = MemoryTree::new();
    let mut images = Vec::with_capacity(args.sources.len());
    for source in &args.sources {
        let image = if args.manifest {
            load_manifest(&mut tree, source)
                .with_context(|| format!("loading manifest {}", source.display()))?
        } else {
            import_directory(&mut tree, source, args.fs_type)
                .with_context(|| format!("importing directory {}", source.display()))?
        };
        images.push(image);
    }
    Ok((tree, images))
}

fn load_config(args: &Args) -> anyhow::Result<SchedulerConfig> {
    let mut config = match &args.config {
        Some(path) => SchedulerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SchedulerConfig::default(),
    };
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    config.record_deliveries = args.csv.is_some();
    config.validate()?;
    Ok(config)
}

/// Run one ingest from start to finish.
pub fn run(args: &Args) -> anyhow::Result<RunSummary> {
    let config = load_config(args)?;
    let (tree, images) = load_sources(args)?;
    info!("Loaded {} images ({} nodes)", images.len(), tree.len());

    let tree: Arc<dyn ContentTree> = Arc::new(tree);
    let builtins = BuiltinModules::new(Arc::clone(&tree));
    let modules = builtins.select(&args.modules, &args.image_modules)?;
    if modules.is_empty() {
        bail!("no modules selected, nothing to ingest");
    }

    let scheduler = Arc::new(IngestScheduler::new(tree, &config));
    for &image in &images {
        scheduler.schedule_image(image, &modules, args.process_unallocated);
    }
    debug!("{}", scheduler.file_scheduler());
    debug!("{}", scheduler.image_scheduler());

    let handle = start_ingest(Arc::clone(&scheduler), &config)?;
    let mut summary = RunSummary {
        images: images.clone(),
        ..RunSummary::default()
    };
    for msg in handle.progress_rx.iter() {
        match msg {
            IngestProgress::Update {
                files_dispatched,
                percent_done,
                current_file,
                ..
            } => info!("{percent_done:.1}% ({files_dispatched} files) {current_file}"),
            IngestProgress::ModuleFailed { module, name, .. } => {
                debug!("Module {module} failed on {name}")
            }
            IngestProgress::Complete {
                images_dispatched,
                files_dispatched,
                failure_count,
                ..
            } => {
                summary.images_dispatched = images_dispatched;
                summary.files_dispatched = files_dispatched;
                summary.failure_count = failure_count;
                break;
            }
            IngestProgress::Cancelled => {
                warn!("Ingest was cancelled");
                summary.cancelled = true;
                break;
            }
        }
    }
    let records = handle.join()?;

    if let Some(path) = &args.csv {
        write_csv_file(path, &records)
            .with_context(|| format!("writing delivery report {}", path.display()))?;
        info!("Wrote {} delivery records to {}", records.len(), path.display());
    }

    summary.file_types = builtins.file_types.counts();
    summary.indexed_names = builtins.name_index.len();
    for (category, count) in &summary.file_types {
        info!("{:<12} {count}", category.label());
    }
    Ok(summary)
}
