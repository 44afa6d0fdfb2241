//! Aggregate monitoring for a batch of install tasks.
//!
//! An [`InstallMonitor`] watches a set of install tasks and reports their
//! combined progress (the average of per-task percentages) plus a single
//! notification once every watched task has completed. Useful for bulk
//! installs where the caller wants one progress bar.
//!
//! Lock order: task handlers fire under the owning task's lock and then
//! take the monitor's lock. Monitor code therefore never calls into a
//! task while holding its own lock. Monitor handlers run under the
//! monitor lock and must not call back into the monitor or its tasks.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::task::{CompletionEvent, InstallTask, StateChange};

/// Handler for aggregate progress updates (0-100).
pub type MonitorProgressHandler = Box<dyn Fn(u8) + Send + Sync>;

/// Handler for per-task state changes, keyed by package id.
pub type MonitorStateHandler = Box<dyn Fn(&str, &StateChange) + Send + Sync>;

/// Handler for per-task completion within the batch.
pub type MonitorTaskHandler = Box<dyn Fn(&CompletionEvent) + Send + Sync>;

/// Handler fired once when the whole batch has completed.
pub type MonitorBatchHandler = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct MonitorShared {
    tasks: Vec<InstallTask>,
    // Per-task progress cache, keyed by package id. Kept here instead of
    // polling the tasks so the aggregate can be computed without taking
    // any task lock.
    progress: HashMap<String, u8>,
    completed: HashMap<String, bool>,
    batch_done: bool,
    progress_handlers: Vec<MonitorProgressHandler>,
    state_handlers: Vec<MonitorStateHandler>,
    task_handlers: Vec<MonitorTaskHandler>,
    batch_handlers: Vec<MonitorBatchHandler>,
}

impl MonitorShared {
    fn aggregate(&self) -> u8 {
        if self.progress.is_empty() {
            return 0;
        }
        let sum: u32 = self.progress.values().map(|&p| u32::from(p)).sum();
        (sum / self.progress.len() as u32) as u8
    }
}

/// Watches a batch of install tasks and aggregates their progress.
///
/// Clones share the same underlying monitor.
#[derive(Clone, Default)]
pub struct InstallMonitor {
    shared: Arc<Mutex<MonitorShared>>,
}

impl InstallMonitor {
    /// Create an empty monitor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task to the batch. Call before `start()`ing the task, like
    /// the task's own subscriptions; completed tasks are not replayed.
    pub fn add_task(&self, task: &InstallTask) {
        let id = task.remote().id().to_string();

        {
            let mut shared = self.shared.lock();
            shared.tasks.push(task.clone());
            shared.progress.insert(id.clone(), 0);
            shared.completed.insert(id.clone(), false);
            shared.batch_done = false;
        }

        let monitor = self.clone();
        let progress_id = id.clone();
        task.on_progress(Box::new(move |event| {
            monitor.task_progress(&progress_id, event.percent);
        }));

        let monitor = self.clone();
        let state_id = id.clone();
        task.on_state_change(Box::new(move |change| {
            let shared = monitor.shared.lock();
            for handler in &shared.state_handlers {
                handler(&state_id, change);
            }
        }));

        let monitor = self.clone();
        task.on_complete(Box::new(move |event| {
            monitor.task_complete(&id, event);
        }));
    }

    /// Aggregate progress across the batch: the average of each task's
    /// last reported percentage. 0 for an empty monitor.
    pub fn progress(&self) -> u8 {
        self.shared.lock().aggregate()
    }

    /// Number of watched tasks.
    pub fn task_count(&self) -> usize {
        self.shared.lock().tasks.len()
    }

    /// Number of watched tasks that have completed.
    pub fn completed_count(&self) -> usize {
        let shared = self.shared.lock();
        shared.completed.values().filter(|&&done| done).count()
    }

    /// True once every watched task has completed. True for an empty
    /// monitor.
    pub fn is_complete(&self) -> bool {
        let shared = self.shared.lock();
        shared.completed.values().all(|&done| done)
    }

    /// Cancel every watched task.
    pub fn cancel_all(&self) {
        // Clone the list out first; cancel() takes each task's lock.
        let tasks: Vec<InstallTask> = self.shared.lock().tasks.clone();
        for task in tasks {
            task.cancel();
        }
    }

    /// Subscribe to aggregate progress updates.
    pub fn on_progress(&self, handler: MonitorProgressHandler) {
        self.shared.lock().progress_handlers.push(handler);
    }

    /// Subscribe to the state changes of every watched task.
    pub fn on_state_change(&self, handler: MonitorStateHandler) {
        self.shared.lock().state_handlers.push(handler);
    }

    /// Subscribe to per-task completions within the batch.
    pub fn on_task_complete(&self, handler: MonitorTaskHandler) {
        self.shared.lock().task_handlers.push(handler);
    }

    /// Subscribe to the batch completion, fired once when the last
    /// watched task completes.
    pub fn on_all_complete(&self, handler: MonitorBatchHandler) {
        self.shared.lock().batch_handlers.push(handler);
    }

    fn task_progress(&self, id: &str, percent: u8) {
        let mut shared = self.shared.lock();
        shared.progress.insert(id.to_string(), percent);
        let aggregate = shared.aggregate();
        for handler in &shared.progress_handlers {
            handler(aggregate);
        }
    }

    fn task_complete(&self, id: &str, event: &CompletionEvent) {
        let mut shared = self.shared.lock();
        // A terminal task counts as fully progressed even when it never
        // reported 100 (cancelled or failed mid-phase).
        shared.progress.insert(id.to_string(), 100);
        shared.completed.insert(id.to_string(), true);
        debug!(package = id, outcome = ?event.outcome, "batch task complete");

        for handler in &shared.task_handlers {
            handler(event);
        }

        if !shared.batch_done && shared.completed.values().all(|&done| done) {
            shared.batch_done = true;
            for handler in &shared.batch_handlers {
                handler();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveExtractor, ExtractError, ExtractProgress};
    use crate::package::{Asset, LocalPackage, Package, RemotePackage};
    use crate::task::{InstallContext, InstallOptions, InstallState};
    use crate::transport::{
        DownloadTransport, TransferFuture, TransferProgress, TransferRequest, TransportError,
    };
    use parking_lot::RwLock;
    use semver::Version;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_util::sync::CancellationToken;

    struct PendingTransport;

    impl DownloadTransport for PendingTransport {
        fn fetch<'a>(
            &'a self,
            _request: &'a TransferRequest,
            _progress: TransferProgress,
            cancel: CancellationToken,
        ) -> TransferFuture<'a> {
            Box::pin(async move {
                cancel.cancelled().await;
                Err(TransportError::Cancelled)
            })
        }
    }

    struct NoopExtractor;

    impl ArchiveExtractor for NoopExtractor {
        fn extract(
            &self,
            _archive: &Path,
            _dest_dir: &Path,
            _progress: ExtractProgress<'_>,
            _cancel: &CancellationToken,
        ) -> Result<Vec<PathBuf>, ExtractError> {
            Ok(Vec::new())
        }
    }

    fn pending_task(id: &str) -> InstallTask {
        let temp = std::env::temp_dir().join("pakdepot-monitor-tests");
        let context = InstallContext {
            transport: Arc::new(PendingTransport),
            extractor: Arc::new(NoopExtractor),
            staging_dir: temp.join("staging"),
            default_install_dir: temp.join("install"),
            keep_archives: false,
        };
        let remote = Arc::new(
            RemotePackage::new(Package::new(id, "Demo")).with_asset(Asset::new(
                format!("{id}-1.0.0.tar.gz"),
                Version::new(1, 0, 0),
                "http://example.invalid/a.tar.gz",
            )),
        );
        let local = Arc::new(RwLock::new(LocalPackage::new(Package::new(id, "Demo"))));
        InstallTask::new(context, local, remote, InstallOptions::new())
    }

    #[test]
    fn test_empty_monitor_is_complete() {
        let monitor = InstallMonitor::new();
        assert!(monitor.is_complete());
        assert_eq!(monitor.progress(), 0);
        assert_eq!(monitor.task_count(), 0);
    }

    #[test]
    fn test_aggregate_progress_averages_tasks() {
        let monitor = InstallMonitor::new();
        let a = pending_task("pkg-a");
        let b = pending_task("pkg-b");
        monitor.add_task(&a);
        monitor.add_task(&b);

        monitor.task_progress("pkg-a", 80);
        monitor.task_progress("pkg-b", 20);
        assert_eq!(monitor.progress(), 50);
    }

    #[tokio::test]
    async fn test_cancel_all_completes_the_batch() {
        let monitor = InstallMonitor::new();
        let a = pending_task("pkg-a");
        let b = pending_task("pkg-b");
        monitor.add_task(&a);
        monitor.add_task(&b);

        let batch_fires = Arc::new(AtomicUsize::new(0));
        let fires = Arc::clone(&batch_fires);
        monitor.on_all_complete(Box::new(move || {
            fires.fetch_add(1, Ordering::SeqCst);
        }));

        a.start().unwrap();
        b.start().unwrap();
        assert_eq!(a.state(), InstallState::Downloading);
        assert!(!monitor.is_complete());

        monitor.cancel_all();
        a.wait().await;
        b.wait().await;

        assert!(monitor.is_complete());
        assert_eq!(monitor.completed_count(), 2);
        assert_eq!(monitor.progress(), 100);
        assert_eq!(batch_fires.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_state_changes_are_forwarded_with_the_package_id() {
        let monitor = InstallMonitor::new();
        let a = pending_task("pkg-a");
        monitor.add_task(&a);

        let changes = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&changes);
        monitor.on_state_change(Box::new(move |id, change| {
            recorded.lock().push((id.to_string(), change.to));
        }));

        a.start().unwrap();
        a.cancel();
        a.wait().await;

        assert_eq!(
            *changes.lock(),
            vec![
                ("pkg-a".to_string(), InstallState::Downloading),
                ("pkg-a".to_string(), InstallState::Cancelled),
            ]
        );
    }

    #[tokio::test]
    async fn test_per_task_completions_are_forwarded() {
        let monitor = InstallMonitor::new();
        let a = pending_task("pkg-a");
        monitor.add_task(&a);

        let completions = Arc::new(AtomicUsize::new(0));
        let calls = Arc::clone(&completions);
        monitor.on_task_complete(Box::new(move |event| {
            assert!(event.error.is_none());
            calls.fetch_add(1, Ordering::SeqCst);
        }));

        a.cancel();
        a.wait().await;
        assert_eq!(completions.load(Ordering::SeqCst), 1);
    }
}
