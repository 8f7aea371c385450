/// Data model shared by the content tree, the schedulers, and the pipeline.
pub mod module;
pub mod node;
pub mod task;

pub use module::{FileModule, ImageModule, Module, ModuleSet, ModuleSetKey};
pub use node::{FsType, Node, NodeId, NodeKind};
pub use task::{FileContext, ImageContext, ImageTask, ProcessTask, ScheduleContext, TaskKey};
