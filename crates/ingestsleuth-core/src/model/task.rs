/// Scheduling requests and the units of work derived from them.
use super::module::{FileModule, ImageModule, Module, ModuleSet, ModuleSetKey};
use super::node::{Node, NodeId};
use std::fmt;
use std::sync::Arc;

/// Immutable bundle shared by every task derived from one scheduling request.
pub struct ScheduleContext<M: ?Sized> {
    /// Image the request targets.
    pub image: NodeId,
    pub modules: ModuleSet<M>,
    /// When `false`, virtual content (unallocated space) is skipped.
    pub process_unallocated: bool,
}

impl<M: ?Sized + Module> ScheduleContext<M> {
    pub fn new(image: NodeId, modules: ModuleSet<M>, process_unallocated: bool) -> Self {
        Self {
            image,
            modules,
            process_unallocated,
        }
    }
}

impl<M: ?Sized> fmt::Debug for ScheduleContext<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduleContext")
            .field("image", &self.image)
            .field("modules", &self.modules)
            .field("process_unallocated", &self.process_unallocated)
            .finish()
    }
}

/// Context for file-level ingest.
pub type FileContext = ScheduleContext<dyn FileModule>;

/// Context for image-level ingest.
pub type ImageContext = ScheduleContext<dyn ImageModule>;

/// Dedup key of a [`ProcessTask`]: the node plus the membership of the
/// module set it is scheduled with.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskKey {
    pub node: NodeId,
    pub modules: ModuleSetKey,
}

/// One file (or directory) to run through the file modules of its context.
#[derive(Clone)]
pub struct ProcessTask {
    pub file: Node,
    pub context: Arc<FileContext>,
}

impl ProcessTask {
    pub fn new(file: Node, context: Arc<FileContext>) -> Self {
        Self { file, context }
    }

    /// Task for `child` under the same context as `self`.
    pub fn child(&self, child: Node) -> Self {
        Self {
            file: child,
            context: Arc::clone(&self.context),
        }
    }

    pub fn key(&self) -> TaskKey {
        TaskKey {
            node: self.file.id,
            modules: self.context.modules.key(),
        }
    }

    /// Image the originating request targeted.
    #[inline]
    pub fn image(&self) -> NodeId {
        self.context.image
    }
}

impl PartialEq for ProcessTask {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for ProcessTask {}

impl fmt::Debug for ProcessTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProcessTask{{file={}: {}}}", self.file.id, self.file.name)
    }
}

/// A whole-image unit of work. Owned by the image scheduler while pending,
/// handed to the caller by `next()`.
#[derive(Clone, Debug)]
pub struct ImageTask {
    pub image: NodeId,
    pub modules: ModuleSet<dyn ImageModule>,
}

impl ImageTask {
    pub fn from_context(context: &ImageContext) -> Self {
        Self {
            image: context.image,
            modules: context.modules.clone(),
        }
    }
}
