/// File-level scheduler: priority-ordered, depth-first, lazily expanded
/// traversal of each scheduled image's content tree.
///
/// # Queues
///
/// - **Root set**: root-level entries of every scheduled image, ordered by
///   priority tier (highest first), then by node id (newest first).
/// - **Directory stack**: directories waiting to be expanded. LIFO, which
///   makes the traversal depth-first.
/// - **File queue**: filtered tasks ready for delivery. `next()` takes from
///   the tail, so siblings of the most recently expanded directory go
///   first; derived files are inserted at the head.
///
/// Only the frontier of the current path is ever held in memory: a
/// directory's children are listed when the directory is popped, never
/// before. A task key (node id plus module-set membership) occupies at most
/// one slot across all three queues at any time.
///
/// All operations run under a single mutex, so producers (callers and
/// modules scheduling derived files) and the consumer never observe a torn
/// queue state. Content-tree calls are made while holding it.
use super::eligibility::EligibilityFilter;
use super::priority::{Priority, PriorityRules};
use crate::error::SchedulerError;
use crate::model::{FileContext, Node, NodeId, ProcessTask, TaskKey};
use crate::tree::{self, ContentTree};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Root-set ordering: priority descending, then node id descending. The
/// module-set key only separates otherwise equal entries.
#[derive(Clone, Debug, PartialEq, Eq)]
struct RootKey {
    priority: Priority,
    task: TaskKey,
}

impl Ord for RootKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then(other.task.node.cmp(&self.task.node))
            .then(self.task.modules.cmp(&other.task.modules))
    }
}

impl PartialOrd for RootKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Snapshot of the queue lengths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub roots: usize,
    pub dirs: usize,
    pub files: usize,
}

#[derive(Default)]
struct FileQueues {
    roots: BTreeMap<RootKey, ProcessTask>,
    dirs: Vec<ProcessTask>,
    files: VecDeque<ProcessTask>,
    /// Keys of every task currently in any of the three queues.
    queued: HashSet<TaskKey>,
    /// Best-effort estimate of files to deliver for the scheduled images.
    files_enqueued_est: u64,
    files_dequeued: u64,
}

impl FileQueues {
    fn reset_counters(&mut self) {
        self.files_dequeued = 0;
        self.files_enqueued_est = 0;
    }

    fn images(&self) -> BTreeSet<NodeId> {
        self.roots
            .values()
            .chain(self.dirs.iter())
            .chain(self.files.iter())
            .map(|t| t.image())
            .collect()
    }

    fn has_pending_traversal(&self) -> bool {
        !(self.roots.is_empty() && self.dirs.is_empty())
    }

    /// Drop every queued task of `image`, whatever its module set.
    fn remove_image(&mut self, image: NodeId) {
        let queued = &mut self.queued;
        let mut removed = 0usize;
        let mut keep = |t: &ProcessTask| {
            if t.image() == image {
                queued.remove(&t.key());
                removed += 1;
                false
            } else {
                true
            }
        };
        self.roots.retain(|_, t| keep(t));
        self.dirs.retain(|t| keep(t));
        self.files.retain(|t| keep(t));
        if removed > 0 {
            debug!("Removed {removed} previously queued tasks of image {image}");
        }
    }

    /// One traversal step. Does nothing while the file queue is non-empty.
    fn refill(&mut self, tree: &dyn ContentTree, filter: &EligibilityFilter) {
        if !self.files.is_empty() {
            return;
        }

        if self.dirs.is_empty() {
            if let Some((_, root_task)) = self.roots.pop_first() {
                self.dirs.push(root_task);
            }
        }

        let Some(parent_task) = self.dirs.pop() else {
            return;
        };

        let process_unallocated = parent_task.context.process_unallocated;
        let children = match tree.children(parent_task.file.id) {
            Ok(children) => children,
            Err(err) => {
                warn!(
                    "Could not get children of {} {} to update file queues: {err}",
                    parent_task.file.id, parent_task.file.name
                );
                Vec::new()
            }
        };

        if filter.should_enqueue(&parent_task.file, process_unallocated, tree) {
            self.files.push_back(parent_task.clone());
        } else {
            self.queued.remove(&parent_task.key());
        }

        for child in children {
            let child_task = parent_task.child(child);
            let key = child_task.key();
            if child_task.file.is_dir() {
                if self.queued.insert(key) {
                    self.dirs.push(child_task);
                }
            } else if filter.should_enqueue(&child_task.file, process_unallocated, tree)
                && self.queued.insert(key)
            {
                self.files.push_back(child_task);
            }
        }
    }

    /// Refill until the file queue has work or every queue is exhausted.
    fn refill_until_ready(&mut self, tree: &dyn ContentTree, filter: &EligibilityFilter) {
        while self.files.is_empty() && self.has_pending_traversal() {
            self.refill(tree, filter);
        }
    }
}

/// Scheduler for per-file ingest. See the module docs for the queue model.
pub struct FileScheduler {
    tree: Arc<dyn ContentTree>,
    rules: PriorityRules,
    filter: EligibilityFilter,
    queues: Mutex<FileQueues>,
}

impl FileScheduler {
    pub fn new(tree: Arc<dyn ContentTree>, rules: PriorityRules, filter: EligibilityFilter) -> Self {
        Self {
            tree,
            rules,
            filter,
            queues: Mutex::new(FileQueues::default()),
        }
    }

    /// Schedule an image for file ingest, superseding any earlier schedule
    /// of the same image. No-op for an empty module set.
    pub fn schedule_image(&self, context: Arc<FileContext>) {
        if context.modules.is_empty() {
            return;
        }
        let tree = self.tree.as_ref();
        let image = context.image;
        let mut q = self.queues.lock();

        if q.images().contains(&image) {
            // Same image enqueued twice. Not exact when files of another
            // image have been dequeued in the meantime.
            q.files_dequeued = 0;
        }
        q.remove_image(image);

        let mut added = 0usize;
        for entry in tree::root_entries(tree, image) {
            let task = ProcessTask::new(entry, Arc::clone(&context));
            if !self
                .filter
                .should_enqueue(&task.file, context.process_unallocated, tree)
            {
                continue;
            }
            let key = task.key();
            if !q.queued.insert(key.clone()) {
                continue;
            }
            let priority = self.rules.classify(&task.file);
            q.roots.insert(
                RootKey {
                    priority,
                    task: key,
                },
                task,
            );
            added += 1;
        }
        debug!("Scheduled image {image}: {added} root tasks");

        let images: Vec<NodeId> = q.images().into_iter().collect();
        q.files_enqueued_est = tree::count_files_in_images(tree, &images);
        info!("Total files to queue up: {}", q.files_enqueued_est);

        q.refill_until_ready(tree, &self.filter);
    }

    /// Schedule a single file (typically derived from an already analysed
    /// file) at the head of the file queue, with the modules of the context
    /// that produced its origin. No-op for an empty module set.
    pub fn schedule_file(&self, file: Node, origin: &Arc<FileContext>) {
        if origin.modules.is_empty() {
            return;
        }
        let task = ProcessTask::new(file, Arc::clone(origin));
        if !self
            .filter
            .should_enqueue(&task.file, origin.process_unallocated, self.tree.as_ref())
        {
            return;
        }
        let mut q = self.queues.lock();
        if !q.queued.insert(task.key()) {
            debug!("Skipping duplicate schedule of {:?}", task);
            return;
        }
        q.files.push_front(task);
        q.files_enqueued_est += 1;
    }

    /// `true` while a task is ready. Resets the progress counters once
    /// everything has been delivered.
    pub fn has_next(&self) -> bool {
        let mut q = self.queues.lock();
        let has_next = !q.files.is_empty();
        if !has_next {
            q.reset_counters();
        }
        has_next
    }

    /// Take the next task. Fails when nothing is pending; check
    /// [`has_next`](Self::has_next) first.
    pub fn next(&self) -> Result<ProcessTask, SchedulerError> {
        let mut q = self.queues.lock();
        let Some(task) = q.files.pop_back() else {
            q.reset_counters();
            return Err(SchedulerError::NoPendingTask);
        };
        q.queued.remove(&task.key());

        q.refill_until_ready(self.tree.as_ref(), &self.filter);

        q.files_dequeued += 1;
        Ok(task)
    }

    /// Approximate completion percentage of the current pass. Only meant
    /// for progress display; 0 when nothing is estimated.
    pub fn percentage_done(&self) -> f32 {
        let q = self.queues.lock();
        if q.files_enqueued_est == 0 {
            return 0.0;
        }
        (100.0 * q.files_dequeued as f32) / q.files_enqueued_est as f32
    }

    pub fn files_enqueued_estimate(&self) -> u64 {
        self.queues.lock().files_enqueued_est
    }

    /// Files dequeued since the last counter reset.
    pub fn files_dequeued(&self) -> u64 {
        self.queues.lock().files_dequeued
    }

    /// Images with at least one task in any queue, in id order.
    pub fn scheduled_images(&self) -> Vec<NodeId> {
        self.queues.lock().images().into_iter().collect()
    }

    /// `true` if any queued task would run the module called `name`.
    pub fn has_module_enqueued(&self, name: &str) -> bool {
        let q = self.queues.lock();
        q.roots
            .values()
            .chain(q.dirs.iter())
            .chain(q.files.iter())
            .any(|t| t.context.modules.contains(name))
    }

    /// Clear every queue immediately.
    pub fn drain_all(&self) {
        let mut q = self.queues.lock();
        q.roots.clear();
        q.dirs.clear();
        q.files.clear();
        q.queued.clear();
    }

    pub fn stats(&self) -> QueueStats {
        let q = self.queues.lock();
        QueueStats {
            roots: q.roots.len(),
            dirs: q.dirs.len(),
            files: q.files.len(),
        }
    }
}

impl fmt::Display for FileScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let q = self.queues.lock();
        write!(f, "RootDirs(sorted), size: {}", q.roots.len())?;
        for task in q.roots.values() {
            write!(f, " {task:?}")?;
        }
        write!(f, "\nCurDirs(stack), size: {}", q.dirs.len())?;
        for task in &q.dirs {
            write!(f, " {task:?}")?;
        }
        write!(f, "\nCurFiles, size: {}", q.files.len())?;
        for task in &q.files {
            write!(f, " {task:?}")?;
        }
        Ok(())
    }
}
