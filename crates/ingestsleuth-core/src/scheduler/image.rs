/// Image-level scheduler: a FIFO of whole-image tasks.
///
/// Scheduling an image that is already pending merges the module sets
/// instead of queueing a second task. Once `next()` hands a task out it is
/// no longer tracked here.
use crate::error::SchedulerError;
use crate::model::{ImageContext, ImageTask, NodeId};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use tracing::debug;

#[derive(Default)]
pub struct ImageScheduler {
    tasks: Mutex<VecDeque<ImageTask>>,
}

impl ImageScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue (or merge) an image task. No-op for an empty module set.
    pub fn schedule(&self, context: &ImageContext) {
        if context.modules.is_empty() {
            return;
        }
        let mut tasks = self.tasks.lock();
        match tasks.iter_mut().find(|t| t.image == context.image) {
            Some(existing) => {
                existing.modules.merge(&context.modules);
                debug!(
                    "Merged modules into pending image task {}: {:?}",
                    context.image, existing.modules
                );
            }
            None => tasks.push_back(ImageTask::from_context(context)),
        }
    }

    /// Oldest pending image task. Fails when nothing is pending.
    pub fn next(&self) -> Result<ImageTask, SchedulerError> {
        self.tasks
            .lock()
            .pop_front()
            .ok_or(SchedulerError::NoPendingTask)
    }

    pub fn has_next(&self) -> bool {
        !self.tasks.lock().is_empty()
    }

    /// Images with a pending task, oldest first.
    pub fn scheduled_images(&self) -> Vec<NodeId> {
        self.tasks.lock().iter().map(|t| t.image).collect()
    }

    pub fn count(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn drain_all(&self) {
        self.tasks.lock().clear();
    }
}

impl fmt::Display for ImageScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tasks = self.tasks.lock();
        write!(f, "ImageQueue, size: {}", tasks.len())?;
        for task in tasks.iter() {
            write!(f, " {}:{:?}", task.image, task.modules)?;
        }
        Ok(())
    }
}
