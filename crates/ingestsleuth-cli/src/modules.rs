/// Built-in analysis modules for the CLI.
///
/// These are small, thread-safe demonstrations of the module interfaces:
/// every module may be called concurrently from several pipeline workers.
///
/// - `file-types`: tallies files per broad category, by extension.
/// - `name-index`: collects lowercased file names per image.
/// - `image-summary`: logs each image it is handed.
use anyhow::{bail, Context};
use compact_str::CompactString;
use ingestsleuth_core::model::{
    FileModule, ImageModule, ImageTask, Module, ModuleSet, NodeId, ProcessTask,
};
use ingestsleuth_core::scheduler::{IngestModules, IngestScheduler};
use ingestsleuth_core::tree::ContentTree;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::info;

pub const FILE_TYPES: &str = "file-types";
pub const NAME_INDEX: &str = "name-index";
pub const IMAGE_SUMMARY: &str = "image-summary";

/// Coarse file categories tallied by the `file-types` module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FileCategory {
    Documents,
    Images,
    Media,
    Archives,
    Executables,
    System,
    Other,
}

impl FileCategory {
    pub fn label(self) -> &'static str {
        match self {
            Self::Documents => "Documents",
            Self::Images => "Images",
            Self::Media => "Media",
            Self::Archives => "Archives",
            Self::Executables => "Executables",
            Self::System => "System",
            Self::Other => "Other",
        }
    }
}

/// Category of a file extension, case-insensitive.
pub fn categorise_extension(ext: &str) -> FileCategory {
    match ext.to_ascii_lowercase().as_str() {
        "doc" | "docx" | "pdf" | "txt" | "rtf" | "odt" | "xls" | "xlsx" | "eml" | "msg"
        | "pst" => FileCategory::Documents,
        "jpg" | "jpeg" | "png" | "gif" | "bmp" | "tif" | "tiff" | "heic" | "raw" => {
            FileCategory::Images
        }
        "mp4" | "mov" | "avi" | "mkv" | "mp3" | "wav" | "m4a" => FileCategory::Media,
        "zip" | "rar" | "7z" | "tar" | "gz" | "cab" | "iso" => FileCategory::Archives,
        "exe" | "dll" | "sys" | "msi" | "so" | "scr" => FileCategory::Executables,
        "evtx" | "etl" | "pf" | "lnk" | "reg" | "dat" | "log" | "ini" => FileCategory::System,
        _ => FileCategory::Other,
    }
}

/// Category of a file name. Names without an extension are `Other`.
pub fn categorise_name(name: &str) -> FileCategory {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => categorise_extension(ext),
        _ => FileCategory::Other,
    }
}

// ── file-types ───────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FileTypesModule {
    counts: Mutex<HashMap<FileCategory, u64>>,
}

impl FileTypesModule {
    /// Per-category counts, largest first, ties by category order.
    pub fn counts(&self) -> Vec<(FileCategory, u64)> {
        let mut counts: Vec<(FileCategory, u64)> =
            self.counts.lock().iter().map(|(&c, &n)| (c, n)).collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        counts
    }
}

impl Module for FileTypesModule {
    fn name(&self) -> &str {
        FILE_TYPES
    }
}

impl FileModule for FileTypesModule {
    fn process(&self, task: &ProcessTask, _: &IngestScheduler) -> anyhow::Result<()> {
        if task.file.is_dir() {
            return Ok(());
        }
        let category = categorise_name(&task.file.name);
        *self.counts.lock().entry(category).or_insert(0) += 1;
        Ok(())
    }
}

// ── name-index ───────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct NameIndexModule {
    names: Mutex<BTreeMap<NodeId, BTreeSet<CompactString>>>,
}

impl NameIndexModule {
    /// Distinct lowercased names seen for `image`, sorted.
    pub fn names(&self, image: NodeId) -> Vec<CompactString> {
        self.names
            .lock()
            .get(&image)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Distinct names across all images.
    pub fn len(&self) -> usize {
        self.names.lock().values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Module for NameIndexModule {
    fn name(&self) -> &str {
        NAME_INDEX
    }
}

impl FileModule for NameIndexModule {
    fn process(&self, task: &ProcessTask, _: &IngestScheduler) -> anyhow::Result<()> {
        let name = task.file.name.to_lowercase();
        self.names
            .lock()
            .entry(task.image())
            .or_default()
            .insert(CompactString::from(name));
        Ok(())
    }
}

// ── image-summary ────────────────────────────────────────────────────────────

pub struct ImageSummaryModule {
    tree: Arc<dyn ContentTree>,
    seen: Mutex<Vec<NodeId>>,
}

impl ImageSummaryModule {
    pub fn new(tree: Arc<dyn ContentTree>) -> Self {
        Self {
            tree,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen(&self) -> Vec<NodeId> {
        self.seen.lock().clone()
    }
}

impl Module for ImageSummaryModule {
    fn name(&self) -> &str {
        IMAGE_SUMMARY
    }
}

impl ImageModule for ImageSummaryModule {
    fn process(&self, task: &ImageTask) -> anyhow::Result<()> {
        let image = self
            .tree
            .node(task.image)
            .with_context(|| format!("reading image {}", task.image))?;
        let top_level = self.tree.children(task.image).map(|c| c.len()).unwrap_or(0);
        info!(
            "Image {} '{}': {top_level} top-level entries, modules {:?}",
            image.id, image.name, task.modules
        );
        self.seen.lock().push(task.image);
        Ok(())
    }
}

// ── Selection ────────────────────────────────────────────────────────────────

/// Every built-in module, with typed handles kept for reading results back.
pub struct BuiltinModules {
    pub file_types: Arc<FileTypesModule>,
    pub name_index: Arc<NameIndexModule>,
    pub image_summary: Arc<ImageSummaryModule>,
}

impl BuiltinModules {
    pub fn new(tree: Arc<dyn ContentTree>) -> Self {
        Self {
            file_types: Arc::new(FileTypesModule::default()),
            name_index: Arc::new(NameIndexModule::default()),
            image_summary: Arc::new(ImageSummaryModule::new(tree)),
        }
    }

    /// Build the module sets for a scheduling request from module names.
    /// Empty names are ignored.
    pub fn select(&self, file: &[String], image: &[String]) -> anyhow::Result<IngestModules> {
        let mut file_set: ModuleSet<dyn FileModule> = ModuleSet::new();
        for name in file.iter().filter(|n| !n.is_empty()) {
            let module: Arc<dyn FileModule> = match name.as_str() {
                FILE_TYPES => self.file_types.clone(),
                NAME_INDEX => self.name_index.clone(),
                other => bail!("unknown file module '{other}' (available: {FILE_TYPES}, {NAME_INDEX})"),
            };
            file_set.insert(module);
        }

        let mut image_set: ModuleSet<dyn ImageModule> = ModuleSet::new();
        for name in image.iter().filter(|n| !n.is_empty()) {
            let module: Arc<dyn ImageModule> = match name.as_str() {
                IMAGE_SUMMARY => self.image_summary.clone(),
                other => bail!("unknown image module '{other}' (available: {IMAGE_SUMMARY})"),
            };
            image_set.insert(module);
        }

        Ok(IngestModules {
            image: image_set,
            file: file_set,
        })
    }
}
