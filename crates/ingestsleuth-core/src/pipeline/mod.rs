/// Ingest pipeline: the consumer side of the schedulers.
///
/// A single dispatcher thread pulls tasks from an [`IngestScheduler`] (image
/// tasks first, then file tasks) and hands them to a fixed pool of worker
/// threads over a bounded channel. Workers run every module of the task's
/// module set; file modules get the scheduler back so they can schedule
/// derived files.
///
/// The run ends when both schedulers are empty and no dispatched task is
/// still being processed. Derived files are always scheduled before the
/// worker reports the task done, so the dispatcher never stops early.
pub mod progress;

use crate::config::SchedulerConfig;
use crate::model::{ImageTask, NodeId, ProcessTask};
use crate::report::DeliveryRecord;
use crate::scheduler::IngestScheduler;
use anyhow::{anyhow, Context};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use progress::IngestProgress;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Maximum number of progress messages that may queue up in the channel.
///
/// `Update` and `ModuleFailed` are dropped when the channel is full. The
/// final `Complete` / `Cancelled` message waits for room, or is discarded
/// once [`IngestHandle::join`] has dropped the receiver.
pub const PROGRESS_CHANNEL_CAPACITY: usize = 4_096;

/// How long the dispatcher waits for a worker when nothing is schedulable.
const IDLE_POLL: Duration = Duration::from_millis(20);

enum Work {
    Image(ImageTask),
    File(ProcessTask),
}

/// Handle to a running ingest. Allows cancellation and receiving progress.
pub struct IngestHandle {
    /// Receiver for progress updates from the dispatcher and workers.
    pub progress_rx: Receiver<IngestProgress>,
    scheduler: Arc<IngestScheduler>,
    cancel_flag: Arc<AtomicBool>,
    thread: thread::JoinHandle<Vec<DeliveryRecord>>,
}

impl IngestHandle {
    /// Stop dispatching and drop all pending work. Tasks already being
    /// processed run to completion.
    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::Relaxed);
        self.scheduler.cancel_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::Relaxed)
    }

    /// Wait for the run to finish. Returns the delivery records, empty
    /// unless `record_deliveries` was set.
    ///
    /// Progress messages not yet received are discarded.
    pub fn join(self) -> anyhow::Result<Vec<DeliveryRecord>> {
        let Self {
            progress_rx,
            thread,
            ..
        } = self;
        // A full channel would otherwise block the final message forever.
        drop(progress_rx);
        thread
            .join()
            .map_err(|_| anyhow!("ingest dispatcher thread panicked"))
    }
}

/// Start consuming `scheduler` on background threads.
pub fn start_ingest(
    scheduler: Arc<IngestScheduler>,
    config: &SchedulerConfig,
) -> anyhow::Result<IngestHandle> {
    let (progress_tx, progress_rx) =
        crossbeam_channel::bounded::<IngestProgress>(PROGRESS_CHANNEL_CAPACITY);
    let workers = config.workers.max(1);
    let (work_tx, work_rx) = crossbeam_channel::bounded::<Work>(workers * 2);
    let (done_tx, done_rx) = crossbeam_channel::unbounded::<()>();
    let cancel_flag = Arc::new(AtomicBool::new(false));
    let failures = Arc::new(AtomicU64::new(0));

    let mut worker_threads = Vec::with_capacity(workers);
    for i in 0..workers {
        let worker = Worker {
            scheduler: Arc::clone(&scheduler),
            work_rx: work_rx.clone(),
            done_tx: done_tx.clone(),
            progress_tx: progress_tx.clone(),
            cancel_flag: Arc::clone(&cancel_flag),
            failures: Arc::clone(&failures),
        };
        let handle = thread::Builder::new()
            .name(format!("ingestsleuth-worker-{i}"))
            .spawn(move || worker.run())
            .context("failed to spawn ingest worker thread")?;
        worker_threads.push(handle);
    }
    // Only the workers hold these now, so the dispatcher sees them go away.
    drop(work_rx);
    drop(done_tx);

    let dispatcher = Dispatcher {
        scheduler: Arc::clone(&scheduler),
        work_tx,
        done_rx,
        progress_tx,
        cancel_flag: Arc::clone(&cancel_flag),
        failures,
        progress_interval: config.progress_interval.max(1),
        record_deliveries: config.record_deliveries,
        workers: worker_threads,
    };
    let thread = thread::Builder::new()
        .name("ingestsleuth-dispatcher".into())
        .spawn(move || dispatcher.run())
        .context("failed to spawn ingest dispatcher thread")?;

    info!("Ingest started with {workers} workers");
    Ok(IngestHandle {
        progress_rx,
        scheduler,
        cancel_flag,
        thread,
    })
}

struct Dispatcher {
    scheduler: Arc<IngestScheduler>,
    work_tx: Sender<Work>,
    done_rx: Receiver<()>,
    progress_tx: Sender<IngestProgress>,
    cancel_flag: Arc<AtomicBool>,
    failures: Arc<AtomicU64>,
    progress_interval: u64,
    record_deliveries: bool,
    workers: Vec<thread::JoinHandle<()>>,
}

impl Dispatcher {
    fn run(self) -> Vec<DeliveryRecord> {
        let start = Instant::now();
        let mut records = Vec::new();
        let mut in_flight: usize = 0;
        let mut images_dispatched: u64 = 0;
        let mut files_dispatched: u64 = 0;
        let mut cancelled = false;

        loop {
            if self.cancel_flag.load(Ordering::Relaxed) {
                cancelled = true;
                break;
            }
            while self.done_rx.try_recv().is_ok() {
                in_flight -= 1;
            }

            let Some(work) = self.next_work() else {
                if in_flight == 0 {
                    break;
                }
                match self.done_rx.recv_timeout(IDLE_POLL) {
                    Ok(()) => in_flight -= 1,
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => {
                        error!("All ingest workers exited with {in_flight} tasks in flight");
                        break;
                    }
                }
                continue;
            };

            let sequence = images_dispatched + files_dispatched + 1;
            match &work {
                Work::Image(task) => {
                    images_dispatched += 1;
                    debug!("Dispatching image task {}: {:?}", task.image, task.modules);
                    if self.record_deliveries {
                        let image = self.scheduler.tree().node(task.image).ok();
                        records.push(DeliveryRecord::for_image(sequence, task, image.as_ref()));
                    }
                }
                Work::File(task) => {
                    files_dispatched += 1;
                    if self.record_deliveries {
                        records.push(DeliveryRecord::for_file(sequence, task));
                    }
                    if files_dispatched.is_multiple_of(self.progress_interval) {
                        let _ = self.progress_tx.try_send(IngestProgress::Update {
                            images_dispatched,
                            files_dispatched,
                            percent_done: self.scheduler.progress(),
                            current_file: task.file.name.to_string(),
                        });
                    }
                }
            }

            if self.work_tx.send(work).is_err() {
                error!("All ingest workers exited, stopping dispatch");
                break;
            }
            in_flight += 1;
        }

        drop(self.work_tx);
        for worker in self.workers {
            if worker.join().is_err() {
                error!("Ingest worker thread panicked");
            }
        }

        let failure_count = self.failures.load(Ordering::Relaxed);
        if cancelled {
            info!("Ingest cancelled after {images_dispatched} images and {files_dispatched} files");
            let _ = self.progress_tx.send(IngestProgress::Cancelled);
        } else {
            let duration = start.elapsed();
            info!(
                "Ingest complete in {:.2?}: {images_dispatched} images, {files_dispatched} files, {failure_count} module failures",
                duration
            );
            let _ = self.progress_tx.send(IngestProgress::Complete {
                duration,
                images_dispatched,
                files_dispatched,
                failure_count,
            });
        }
        records
    }

    fn next_work(&self) -> Option<Work> {
        if self.scheduler.has_more_images() {
            if let Ok(task) = self.scheduler.next_image_task() {
                return Some(Work::Image(task));
            }
        }
        if self.scheduler.has_more_files() {
            match self.scheduler.next_file_task() {
                Ok(task) => return Some(Work::File(task)),
                // Drained by a concurrent cancel.
                Err(err) => debug!("File queue emptied before dispatch: {err}"),
            }
        }
        None
    }
}

struct Worker {
    scheduler: Arc<IngestScheduler>,
    work_rx: Receiver<Work>,
    done_tx: Sender<()>,
    progress_tx: Sender<IngestProgress>,
    cancel_flag: Arc<AtomicBool>,
    failures: Arc<AtomicU64>,
}

impl Worker {
    fn run(self) {
        for work in self.work_rx.iter() {
            if !self.cancel_flag.load(Ordering::Relaxed) {
                match &work {
                    Work::Image(task) => self.run_image(task),
                    Work::File(task) => self.run_file(task),
                }
            }
            if self.done_tx.send(()).is_err() {
                break;
            }
        }
    }

    fn run_image(&self, task: &ImageTask) {
        for module in task.modules.iter() {
            if let Err(err) = module.process(task) {
                let name = self
                    .scheduler
                    .tree()
                    .node(task.image)
                    .map(|n| n.name.to_string())
                    .unwrap_or_default();
                self.report_failure(module.name(), task.image, name, err);
            }
        }
    }

    fn run_file(&self, task: &ProcessTask) {
        for module in task.context.modules.iter() {
            if let Err(err) = module.process(task, &self.scheduler) {
                self.report_failure(module.name(), task.file.id, task.file.name.to_string(), err);
            }
        }
    }

    fn report_failure(&self, module: &str, node: NodeId, name: String, err: anyhow::Error) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        warn!("Module {module} failed on {node} {name}: {err:#}");
        let _ = self.progress_tx.try_send(IngestProgress::ModuleFailed {
            module: module.to_string(),
            node,
            name,
            message: format!("{err:#}"),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FileModule, FsType, ImageModule, Module, ModuleSet, NodeKind};
    use crate::scheduler::IngestModules;
    use crate::tree::MemoryTree;
    use parking_lot::Mutex;

    // ── Helpers ──────────────────────────────────────────────────────────────

    /// Records every file it sees; expands `.zip` files into their derived
    /// children.
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl Module for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }
    }

    impl FileModule for Recorder {
        fn process(&self, task: &ProcessTask, scheduler: &IngestScheduler) -> anyhow::Result<()> {
            self.seen.lock().push(task.file.name.to_string());
            if task.file.name.ends_with(".zip") {
                for child in scheduler.tree().children(task.file.id)? {
                    scheduler.schedule_derived_file(child, &task.context);
                }
            }
            Ok(())
        }
    }

    struct Failing;

    impl Module for Failing {
        fn name(&self) -> &str {
            "failing"
        }
    }

    impl FileModule for Failing {
        fn process(&self, task: &ProcessTask, _: &IngestScheduler) -> anyhow::Result<()> {
            anyhow::bail!("cannot parse {}", task.file.name)
        }
    }

    #[derive(Default)]
    struct ImageCounter {
        images: Mutex<Vec<NodeId>>,
    }

    impl Module for ImageCounter {
        fn name(&self) -> &str {
            "image-counter"
        }
    }

    impl ImageModule for ImageCounter {
        fn process(&self, task: &ImageTask) -> anyhow::Result<()> {
            self.images.lock().push(task.image);
            Ok(())
        }
    }

    /// ```text
    /// disk.img / fs0 (ext) / docs / a.txt
    ///                             / bundle.zip -> inner.txt (derived)
    /// ```
    fn sample_scheduler() -> (Arc<IngestScheduler>, NodeId) {
        let mut tree = MemoryTree::new();
        let img = tree.add_image("disk.img");
        let root = tree.add_filesystem_with_root(img, "fs0", FsType::Ext);
        let docs = tree.add_dir(root, "docs");
        tree.add_file(docs, "a.txt");
        let zip = tree.add_file(docs, "bundle.zip");
        tree.add_derived_file(zip, "inner.txt");
        let scheduler = IngestScheduler::new(Arc::new(tree), &SchedulerConfig::default());
        (Arc::new(scheduler), img)
    }

    fn config(workers: usize) -> SchedulerConfig {
        SchedulerConfig {
            workers,
            progress_interval: 1,
            record_deliveries: true,
            ..SchedulerConfig::default()
        }
    }

    fn wait_for_end(handle: &IngestHandle) -> IngestProgress {
        let deadline = Instant::now() + Duration::from_secs(30);
        loop {
            assert!(Instant::now() < deadline, "ingest did not finish within 30 seconds");
            match handle.progress_rx.recv_timeout(Duration::from_millis(50)) {
                Ok(msg @ (IngestProgress::Complete { .. } | IngestProgress::Cancelled)) => {
                    return msg
                }
                Ok(_) | Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => panic!("progress channel disconnected"),
            }
        }
    }

    // ── Tests ────────────────────────────────────────────────────────────────

    #[test]
    fn test_runs_every_file_and_derived_file() {
        let (scheduler, img) = sample_scheduler();
        let recorder = Arc::new(Recorder::default());
        let modules = IngestModules {
            file: ModuleSet::from_iter([Arc::clone(&recorder) as Arc<dyn FileModule>]),
            ..IngestModules::default()
        };
        scheduler.schedule_image(img, &modules, false);

        let handle = start_ingest(Arc::clone(&scheduler), &config(4)).unwrap();
        let end = wait_for_end(&handle);
        let records = handle.join().unwrap();

        let mut seen = recorder.seen.lock().clone();
        seen.sort();
        assert_eq!(seen, ["a.txt", "bundle.zip", "docs", "inner.txt"]);
        assert!(matches!(
            end,
            IngestProgress::Complete { files_dispatched: 4, images_dispatched: 0, failure_count: 0, .. }
        ));
        assert_eq!(records.len(), 4);
        assert_eq!(
            records.iter().map(|r| r.sequence).collect::<Vec<_>>(),
            [1, 2, 3, 4]
        );
        assert!(records.iter().any(|r| r.kind == NodeKind::DerivedFile));
        assert!(!scheduler.has_more_files());
    }

    #[test]
    fn test_image_tasks_dispatched() {
        let (scheduler, img) = sample_scheduler();
        let counter = Arc::new(ImageCounter::default());
        let modules = IngestModules {
            image: ModuleSet::from_iter([Arc::clone(&counter) as Arc<dyn ImageModule>]),
            ..IngestModules::default()
        };
        scheduler.schedule_image(img, &modules, false);

        let handle = start_ingest(scheduler, &config(2)).unwrap();
        let end = wait_for_end(&handle);
        let records = handle.join().unwrap();

        assert_eq!(*counter.images.lock(), [img]);
        assert!(matches!(
            end,
            IngestProgress::Complete { images_dispatched: 1, files_dispatched: 0, .. }
        ));
        assert_eq!(records[0].name, "disk.img");
        assert_eq!(records[0].kind, NodeKind::Image);
    }

    #[test]
    fn test_module_failure_is_reported_not_fatal() {
        let (scheduler, img) = sample_scheduler();
        let modules = IngestModules {
            file: ModuleSet::from_iter([Arc::new(Failing) as Arc<dyn FileModule>]),
            ..IngestModules::default()
        };
        scheduler.schedule_image(img, &modules, false);

        let handle = start_ingest(scheduler, &config(1)).unwrap();
        let mut failed = Vec::new();
        let end = loop {
            match handle.progress_rx.recv_timeout(Duration::from_secs(30)) {
                Ok(IngestProgress::ModuleFailed { module, name, .. }) => {
                    assert_eq!(module, "failing");
                    failed.push(name);
                }
                Ok(msg @ IngestProgress::Complete { .. }) => break msg,
                Ok(_) => continue,
                Err(err) => panic!("no completion: {err}"),
            }
        };
        handle.join().unwrap();

        // The zip is never expanded, so no derived file.
        assert_eq!(failed.len(), 3);
        assert!(matches!(end, IngestProgress::Complete { failure_count: 3, .. }));
    }

    #[test]
    fn test_empty_scheduler_completes_immediately() {
        let (scheduler, _) = sample_scheduler();
        let handle = start_ingest(scheduler, &config(2)).unwrap();
        assert!(matches!(
            wait_for_end(&handle),
            IngestProgress::Complete { files_dispatched: 0, images_dispatched: 0, .. }
        ));
        assert!(handle.join().unwrap().is_empty());
    }

    #[test]
    fn test_join_without_reading_progress() {
        let mut tree = MemoryTree::new();
        let img = tree.add_image("big.img");
        let root = tree.add_filesystem_with_root(img, "fs0", FsType::Ext);
        for i in 0..5_000 {
            tree.add_file(root, &format!("f{i}.bin"));
        }
        let scheduler = Arc::new(IngestScheduler::new(
            Arc::new(tree),
            &SchedulerConfig::default(),
        ));
        let modules = IngestModules {
            file: ModuleSet::from_iter([Arc::new(Failing) as Arc<dyn FileModule>]),
            ..IngestModules::default()
        };
        scheduler.schedule_image(img, &modules, false);

        // Every file fails, so progress overflows the channel.
        let handle = start_ingest(scheduler, &config(2)).unwrap();
        let (tx, rx) = crossbeam_channel::bounded(1);
        thread::spawn(move || {
            let _ = tx.send(handle.join());
        });
        let records = rx
            .recv_timeout(Duration::from_secs(60))
            .expect("join did not return")
            .unwrap();
        assert_eq!(records.len(), 5_000);
    }

    #[test]
    fn test_cancel_drops_pending_work() {
        let (scheduler, img) = sample_scheduler();
        let recorder = Arc::new(Recorder::default());
        let modules = IngestModules {
            file: ModuleSet::from_iter([Arc::clone(&recorder) as Arc<dyn FileModule>]),
            ..IngestModules::default()
        };
        scheduler.schedule_image(img, &modules, false);

        let handle = start_ingest(Arc::clone(&scheduler), &config(1)).unwrap();
        handle.cancel();
        assert!(handle.is_cancelled());
        let end = wait_for_end(&handle);
        handle.join().unwrap();

        // Dispatch may have finished before the cancel landed.
        assert!(matches!(
            end,
            IngestProgress::Cancelled | IngestProgress::Complete { .. }
        ));
        assert!(!scheduler.has_more_files());
        assert!(!scheduler.has_more_images());
    }
}
