/// Ingest scheduling: decides what the analysis pipeline processes next.
///
/// Two schedulers behind one facade:
/// - **Image scheduler:** FIFO of whole-image tasks for image modules.
/// - **File scheduler:** priority-ordered, depth-first traversal of each
///   image's content tree for file modules.
///
/// [`IngestScheduler`] is an ordinary owned object. Build it once and pass
/// an `Arc` to whoever schedules or consumes work.
pub mod eligibility;
pub mod file;
pub mod image;
pub mod priority;

pub use eligibility::EligibilityFilter;
pub use file::{FileScheduler, QueueStats};
pub use image::ImageScheduler;
pub use priority::{Priority, PriorityRule, PriorityRules};

use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::model::{
    FileContext, FileModule, ImageContext, ImageModule, ImageTask, ModuleSet, Node, NodeId,
    ProcessTask, ScheduleContext,
};
use crate::tree::ContentTree;
use std::sync::Arc;
use tracing::info;

/// Modules selected for one scheduling request.
#[derive(Clone, Debug, Default)]
pub struct IngestModules {
    pub image: ModuleSet<dyn ImageModule>,
    pub file: ModuleSet<dyn FileModule>,
}

impl IngestModules {
    pub fn is_empty(&self) -> bool {
        self.image.is_empty() && self.file.is_empty()
    }
}

/// The image and file schedulers as one unit, sharing a content tree.
pub struct IngestScheduler {
    tree: Arc<dyn ContentTree>,
    images: ImageScheduler,
    files: FileScheduler,
}

impl IngestScheduler {
    pub fn new(tree: Arc<dyn ContentTree>, config: &SchedulerConfig) -> Self {
        let files = FileScheduler::new(
            Arc::clone(&tree),
            config.priority_rules.clone(),
            EligibilityFilter::new(config.reserved_meta_addr_limit),
        );
        Self {
            tree,
            images: ImageScheduler::new(),
            files,
        }
    }

    pub fn tree(&self) -> &Arc<dyn ContentTree> {
        &self.tree
    }

    pub fn image_scheduler(&self) -> &ImageScheduler {
        &self.images
    }

    pub fn file_scheduler(&self) -> &FileScheduler {
        &self.files
    }

    /// Schedule `image` with both module sets. Returns the file context so
    /// callers can schedule derived files against it.
    pub fn schedule_image(
        &self,
        image: NodeId,
        modules: &IngestModules,
        process_unallocated: bool,
    ) -> Arc<FileContext> {
        info!(
            "Scheduling image {image}: image modules {:?}, file modules {:?}, unallocated: {process_unallocated}",
            modules.image, modules.file
        );
        let image_context: ImageContext =
            ScheduleContext::new(image, modules.image.clone(), process_unallocated);
        self.images.schedule(&image_context);

        let file_context = Arc::new(ScheduleContext::new(
            image,
            modules.file.clone(),
            process_unallocated,
        ));
        self.files.schedule_image(Arc::clone(&file_context));
        file_context
    }

    /// Schedule a file derived from content processed under `origin`.
    pub fn schedule_derived_file(&self, file: Node, origin: &Arc<FileContext>) {
        self.files.schedule_file(file, origin);
    }

    pub fn next_file_task(&self) -> Result<ProcessTask, SchedulerError> {
        self.files.next()
    }

    pub fn has_more_files(&self) -> bool {
        self.files.has_next()
    }

    pub fn next_image_task(&self) -> Result<ImageTask, SchedulerError> {
        self.images.next()
    }

    pub fn has_more_images(&self) -> bool {
        self.images.has_next()
    }

    /// Approximate file-ingest completion percentage.
    pub fn progress(&self) -> f32 {
        self.files.percentage_done()
    }

    /// Drop all pending work in both schedulers.
    pub fn cancel_all(&self) {
        info!("Cancelling all scheduled ingest work");
        self.images.drain_all();
        self.files.drain_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FsType, Module};
    use crate::tree::MemoryTree;

    struct Named(&'static str);

    impl Module for Named {
        fn name(&self) -> &str {
            self.0
        }
    }

    impl FileModule for Named {
        fn process(&self, _: &ProcessTask, _: &IngestScheduler) -> anyhow::Result<()> {
            Ok(())
        }
    }

    impl ImageModule for Named {
        fn process(&self, _: &ImageTask) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn modules(image: &[&'static str], file: &[&'static str]) -> IngestModules {
        IngestModules {
            image: image
                .iter()
                .map(|&n| Arc::new(Named(n)) as Arc<dyn ImageModule>)
                .collect(),
            file: file
                .iter()
                .map(|&n| Arc::new(Named(n)) as Arc<dyn FileModule>)
                .collect(),
        }
    }

    fn setup() -> (IngestScheduler, NodeId) {
        let mut tree = MemoryTree::new();
        let img = tree.add_image("disk.img");
        let root = tree.add_filesystem_with_root(img, "fs0", FsType::Ntfs);
        let users = tree.add_dir(root, "Users");
        tree.add_file(users, "a.txt");
        let scheduler = IngestScheduler::new(Arc::new(tree), &SchedulerConfig::default());
        (scheduler, img)
    }

    #[test]
    fn test_empty_modules_leave_queues_untouched() {
        let (s, img) = setup();
        s.schedule_image(img, &IngestModules::default(), false);
        assert!(!s.has_more_images());
        assert!(!s.has_more_files());
    }

    #[test]
    fn test_repeated_schedule_merges_image_modules() {
        let (s, img) = setup();
        s.schedule_image(img, &modules(&["summary"], &["hash"]), false);
        s.schedule_image(img, &modules(&["timeline"], &["hash"]), false);
        assert_eq!(s.image_scheduler().count(), 1);
        let task = s.next_image_task().unwrap();
        assert_eq!(
            task.modules.names().collect::<Vec<_>>(),
            ["summary", "timeline"]
        );
        assert!(!s.has_more_images());
    }

    #[test]
    fn test_file_side_only() {
        let (s, img) = setup();
        s.schedule_image(img, &modules(&[], &["hash"]), false);
        assert!(!s.has_more_images());
        assert!(s.has_more_files());
        assert_eq!(s.next_file_task().unwrap().file.name, "a.txt");
    }

    #[test]
    fn test_cancel_all() {
        let (s, img) = setup();
        s.schedule_image(img, &modules(&["summary"], &["hash"]), false);
        s.cancel_all();
        assert!(!s.has_more_images());
        assert!(!s.has_more_files());
        assert_eq!(s.progress(), 0.0);
    }
}
