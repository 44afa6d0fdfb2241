//! The install task driver.
//!
//! [`InstallTask`] owns the download -> extract -> finalize pipeline for
//! one package installation. The download phase runs as a spawned async
//! task on the tokio runtime (the event-loop context); extraction and
//! finalization run on the blocking worker pool via `spawn_blocking`.
//!
//! All mutable shared fields (state, progress, error, completion flag,
//! subscribers) live behind one `parking_lot::Mutex`, held only for short
//! critical sections and never across phase work. State transitions and
//! their notifications happen under that lock, so observers see
//! transitions in order and never see a state without its announcement.
//!
//! Lock order is `shared` then the local package record; nothing acquires
//! them in the other direction. Event handlers run under the shared lock
//! and must not call back into the task.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use semver::Version;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::archive::{ArchiveExtractor, ExtractError};
use crate::package::{Asset, LocalPackage, PackageStatus, RemotePackage};
use crate::transport::{DownloadTransport, TransferProgress, TransferRequest};

use super::download::{map_transfer_result, transfer_percent, PhaseStep};
use super::error::InstallError;
use super::events::{
    CompletionEvent, CompletionHandler, InstallOutcome, ProgressEvent, ProgressHandler,
    StateChange, StateChangeHandler, Subscribers,
};
use super::options::InstallOptions;
use super::progress::ProgressTracker;
use super::state::InstallState;

/// Dependencies and environment an install task runs against.
///
/// Built by the [`PackageManager`](crate::manager::PackageManager) from
/// its configuration; tests inject mock adapters here.
#[derive(Clone)]
pub struct InstallContext {
    /// Transport used for the download phase.
    pub transport: Arc<dyn DownloadTransport>,
    /// Extractor used for the extract phase.
    pub extractor: Arc<dyn ArchiveExtractor>,
    /// Root directory for per-package staging directories.
    pub staging_dir: PathBuf,
    /// Install directory used when neither the options nor the local
    /// record name one.
    pub default_install_dir: PathBuf,
    /// Keep the downloaded archive in staging after a successful install.
    pub keep_archives: bool,
}

/// Everything resolved at `start()`, before the first transition.
#[derive(Debug, Clone)]
struct InstallPlan {
    asset: Asset,
    install_dir: PathBuf,
    staging_dir: PathBuf,
    archive_path: PathBuf,
    intermediate_dir: PathBuf,
}

/// Mutable fields shared between the caller, the event-loop context and
/// the worker context. Guarded by one mutex.
struct TaskShared {
    state: InstallState,
    progress: ProgressTracker,
    error: Option<InstallError>,
    started: bool,
    completed: bool,
    plan: Option<InstallPlan>,
    subscribers: Subscribers,
}

struct TaskInner {
    options: InstallOptions,
    local: Arc<RwLock<LocalPackage>>,
    remote: Arc<RemotePackage>,
    context: InstallContext,
    cancel: CancellationToken,
    shared: Mutex<TaskShared>,
    completion_tx: watch::Sender<bool>,
    completion_rx: watch::Receiver<bool>,
}

/// A stateful, asynchronously-executing package installation.
///
/// Created by the package manager; driven through
/// `None -> Downloading -> Extracting -> Finalizing -> Installed`, with
/// `Cancelled` and `Failed` reachable from any non-terminal state. The
/// task signals completion exactly once and is then eligible for
/// reclamation. Clones share the same underlying task.
#[derive(Clone)]
pub struct InstallTask {
    inner: Arc<TaskInner>,
}

impl std::fmt::Debug for InstallTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallTask").finish_non_exhaustive()
    }
}

impl InstallTask {
    /// Create a task for installing `remote` over `local`.
    ///
    /// The record references are shared with the manager, which keeps
    /// them alive for at least the task's lifetime.
    pub fn new(
        context: InstallContext,
        local: Arc<RwLock<LocalPackage>>,
        remote: Arc<RemotePackage>,
        options: InstallOptions,
    ) -> Self {
        let (completion_tx, completion_rx) = watch::channel(false);
        Self {
            inner: Arc::new(TaskInner {
                options,
                local,
                remote,
                context,
                cancel: CancellationToken::new(),
                shared: Mutex::new(TaskShared {
                    state: InstallState::None,
                    progress: ProgressTracker::new(),
                    error: None,
                    started: false,
                    completed: false,
                    plan: None,
                    subscribers: Subscribers::default(),
                }),
                completion_tx,
                completion_rx,
            }),
        }
    }

    // ---- public surface ------------------------------------------------

    /// Validate the options, resolve the asset to install, and begin the
    /// download phase. Returns without blocking; the pipeline runs on the
    /// tokio runtime this is called from.
    ///
    /// An unresolvable version/SDK selection or malformed options yield
    /// [`InstallError::Validation`] and the task stays in `None`.
    ///
    /// # Panics
    ///
    /// Calling `start()` twice, or after cancellation, is a caller bug
    /// and panics.
    pub fn start(&self) -> Result<(), InstallError> {
        let plan = {
            let mut shared = self.inner.shared.lock();
            if shared.started || shared.state != InstallState::None {
                panic!(
                    "InstallTask::start() called twice or after a terminal state (state: {})",
                    shared.state
                );
            }

            // Version selection happens before any transition; failures
            // here never leave `None`.
            let plan = self.resolve_plan()?;
            shared.started = true;
            shared.plan = Some(plan.clone());
            self.transition_locked(&mut shared, InstallState::Downloading);
            plan
        };

        {
            let mut local = self.inner.local.write();
            local.status = PackageStatus::Installing;
            local.set_install_dir(&plan.install_dir);
        }

        info!(
            package = self.inner.remote.id(),
            version = %plan.asset.version,
            install_dir = %plan.install_dir.display(),
            "starting installation"
        );

        tokio::spawn(self.clone().run(plan));
        Ok(())
    }

    /// Request cancellation.
    ///
    /// Sets the cancellation flag (aborting an in-flight transfer;
    /// blocking extract/finalize work stops at its next checkpoint),
    /// transitions to `Cancelled` and fires completion. A no-op once a
    /// terminal state has been reached.
    pub fn cancel(&self) {
        self.inner.cancel.cancel();

        let mut shared = self.inner.shared.lock();
        if shared.state.is_terminal() {
            return;
        }
        self.transition_locked(&mut shared, InstallState::Cancelled);
        if shared.started {
            let mut local = self.inner.local.write();
            local.status = PackageStatus::Failed;
        }
        info!(package = self.inner.remote.id(), "installation cancelled");
        self.set_complete_locked(&mut shared);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> InstallState {
        self.inner.shared.lock().state
    }

    /// Current progress in [0, 100]. Monotonic within a phase; resets
    /// when a phase that tracks its own progress begins.
    pub fn progress(&self) -> u8 {
        self.inner.shared.lock().progress.value()
    }

    /// The stored error; present if and only if the task failed.
    pub fn error(&self) -> Option<InstallError> {
        self.inner.shared.lock().error.clone()
    }

    /// True while the records are resolvable and the task has not failed.
    pub fn valid(&self) -> bool {
        !self.failed() && self.inner.local.read().valid() && self.inner.remote.valid()
    }

    /// True once the task terminated as `Cancelled`.
    pub fn cancelled(&self) -> bool {
        self.state() == InstallState::Cancelled
    }

    /// True once the task terminated as `Failed`.
    pub fn failed(&self) -> bool {
        self.state() == InstallState::Failed
    }

    /// True once the task terminated as `Installed`.
    pub fn success(&self) -> bool {
        self.state() == InstallState::Installed
    }

    /// True once any terminal state has been reached.
    pub fn complete(&self) -> bool {
        self.state().is_terminal()
    }

    /// The options this task was created with.
    pub fn options(&self) -> &InstallOptions {
        &self.inner.options
    }

    /// The local package record this task is installing into.
    pub fn local(&self) -> Arc<RwLock<LocalPackage>> {
        Arc::clone(&self.inner.local)
    }

    /// The remote package record this task installs from.
    pub fn remote(&self) -> Arc<RemotePackage> {
        Arc::clone(&self.inner.remote)
    }

    /// The asset chosen at `start()`, once the task has started.
    pub fn resolved_asset(&self) -> Option<Asset> {
        self.inner
            .shared
            .lock()
            .plan
            .as_ref()
            .map(|p| p.asset.clone())
    }

    /// Subscribe to state transitions. Register before `start()`.
    pub fn on_state_change(&self, handler: StateChangeHandler) {
        self.inner.shared.lock().subscribers.add_state(handler);
    }

    /// Subscribe to progress updates. Register before `start()`.
    pub fn on_progress(&self, handler: ProgressHandler) {
        self.inner.shared.lock().subscribers.add_progress(handler);
    }

    /// Subscribe to the completion event. Register before `start()`; the
    /// event is delivered at most once and is not replayed to late
    /// subscribers.
    pub fn on_complete(&self, handler: CompletionHandler) {
        self.inner.shared.lock().subscribers.add_completion(handler);
    }

    /// Wait until the task reaches a terminal state.
    pub async fn wait(&self) {
        let mut rx = self.inner.completion_rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    // ---- pipeline ------------------------------------------------------

    async fn run(self, plan: InstallPlan) {
        let success = self.pipeline(&plan).await;
        self.cleanup(&plan, success).await;
    }

    async fn pipeline(&self, plan: &InstallPlan) -> bool {
        match self.do_download(plan).await {
            PhaseStep::Advance => {}
            PhaseStep::Cancelled => return false,
            PhaseStep::Failed(err) => {
                self.fail(err);
                return false;
            }
        }

        match self.do_extract(plan).await {
            PhaseStep::Advance => {}
            PhaseStep::Cancelled => return false,
            PhaseStep::Failed(err) => {
                self.fail(err);
                return false;
            }
        }

        match self.do_finalize(plan).await {
            PhaseStep::Advance => {}
            PhaseStep::Cancelled => return false,
            PhaseStep::Failed(err) => {
                self.fail(err);
                return false;
            }
        }

        // Progress reaches 100 before the state change announces success.
        self.report_progress(InstallState::Finalizing, 100);
        {
            let mut shared = self.inner.shared.lock();
            if shared.state.is_terminal() {
                return false;
            }
            self.transition_locked(&mut shared, InstallState::Installed);
            // The record flips to installed only behind the terminal
            // check above; a cancel that raced the final move never
            // leaves the record installed.
            {
                let mut local = self.inner.local.write();
                local.set_installed(plan.asset.clone());
                local.clear_errors();
            }
            self.set_complete_locked(&mut shared);
        }

        info!(
            package = self.inner.remote.id(),
            version = %plan.asset.version,
            "package installed"
        );
        true
    }

    /// Download the asset into the staging directory.
    ///
    /// Runs on the event-loop context; byte progress arrives through the
    /// transport's progress sink.
    async fn do_download(&self, plan: &InstallPlan) -> PhaseStep {
        if self.inner.cancel.is_cancelled() {
            return PhaseStep::Cancelled;
        }

        let request = TransferRequest {
            url: plan.asset.url.clone(),
            destination: plan.archive_path.clone(),
            expected_size: plan.asset.file_size,
            checksum: plan.asset.checksum.clone(),
        };

        let task = self.clone();
        let progress: TransferProgress = Arc::new(move |received, total| {
            if let Some(percent) = transfer_percent(received, total) {
                task.report_progress(InstallState::Downloading, percent);
            }
        });

        let result = self
            .inner
            .context
            .transport
            .fetch(&request, progress, self.inner.cancel.clone())
            .await;

        let step = map_transfer_result(result);
        if step == PhaseStep::Advance && !self.advance_phase(InstallState::Extracting, true) {
            return PhaseStep::Cancelled;
        }
        step
    }

    /// Unpack the staged archive into the intermediate directory.
    ///
    /// Runs on the worker context; the extractor checks the cancellation
    /// token between entries.
    async fn do_extract(&self, plan: &InstallPlan) -> PhaseStep {
        let task = self.clone();
        let plan = plan.clone();
        let result = match tokio::task::spawn_blocking(move || {
            let progress = |percent: u8| {
                task.report_progress(InstallState::Extracting, percent);
            };
            task.inner.context.extractor.extract(
                &plan.archive_path,
                &plan.intermediate_dir,
                &progress,
                &task.inner.cancel,
            )
        })
        .await
        {
            Ok(result) => result,
            // A panicking extractor must still terminate the task.
            Err(err) => {
                return PhaseStep::Failed(InstallError::Extract(format!(
                    "extraction worker failed: {err}"
                )))
            }
        };

        match result {
            Ok(files) => {
                // Record the manifest only once the phase advance has
                // cleared the terminal check; a cancelled install keeps
                // its previous manifest.
                if !self.advance_phase(InstallState::Finalizing, false) {
                    return PhaseStep::Cancelled;
                }
                let mut local = self.inner.local.write();
                local.manifest.clear();
                for file in &files {
                    local.manifest.add_file(file);
                }
                PhaseStep::Advance
            }
            Err(ExtractError::Cancelled) => PhaseStep::Cancelled,
            Err(err) => PhaseStep::Failed(InstallError::Extract(err.to_string())),
        }
    }

    /// Move the intermediate directory's contents into the install
    /// directory. The local record is updated by the pipeline, after the
    /// transition to `Installed` has cleared the terminal check.
    async fn do_finalize(&self, plan: &InstallPlan) -> PhaseStep {
        if self.inner.cancel.is_cancelled() {
            return PhaseStep::Cancelled;
        }

        let source = plan.intermediate_dir.clone();
        let dest = plan.install_dir.clone();
        let result =
            match tokio::task::spawn_blocking(move || crate::manager::move_contents(&source, &dest))
                .await
            {
                Ok(result) => result,
                Err(err) => {
                    return PhaseStep::Failed(InstallError::Finalize(format!(
                        "finalization worker failed: {err}"
                    )))
                }
            };

        match result {
            Ok(moved) => {
                debug!(
                    package = self.inner.remote.id(),
                    moved, "finalization complete"
                );
                PhaseStep::Advance
            }
            Err(err) => PhaseStep::Failed(InstallError::Finalize(err.to_string())),
        }
    }

    // ---- state & bookkeeping -------------------------------------------

    /// Resolve the asset and directories this install will use.
    fn resolve_plan(&self) -> Result<InstallPlan, InstallError> {
        let local = self.inner.local.read();
        let remote = &self.inner.remote;
        let options = &self.inner.options;

        if !local.valid() {
            return Err(InstallError::Validation(format!(
                "local record for '{}' is malformed",
                local.id()
            )));
        }
        if !remote.valid() {
            return Err(InstallError::Validation(format!(
                "remote package '{}' has no installable assets",
                remote.id()
            )));
        }

        let asset = if let Some(pinned) = &options.version {
            let version = Version::parse(pinned).map_err(|e| {
                InstallError::Validation(format!("invalid version '{pinned}': {e}"))
            })?;
            remote.asset_version(&version).ok_or_else(|| {
                InstallError::Validation(format!(
                    "package '{}' has no asset for version {version}",
                    remote.id()
                ))
            })?
        } else if let Some(sdk) = &options.sdk_version {
            remote.latest_sdk_asset(sdk).ok_or_else(|| {
                InstallError::Validation(format!(
                    "package '{}' has no asset for SDK version {sdk}",
                    remote.id()
                ))
            })?
        } else {
            remote.latest_asset().ok_or_else(|| {
                InstallError::Validation(format!("package '{}' has no assets", remote.id()))
            })?
        };

        if !asset.valid() {
            return Err(InstallError::Validation(format!(
                "asset '{}' is missing a file name or URL",
                asset.file_name
            )));
        }

        // Precedence for the install directory: explicit option, then the
        // directory an existing local install used, then the default.
        let install_dir = options
            .install_dir
            .clone()
            .or_else(|| local.install_dir().map(PathBuf::from))
            .unwrap_or_else(|| self.inner.context.default_install_dir.clone());

        let staging_dir = self.inner.context.staging_dir.join(local.id());
        Ok(InstallPlan {
            archive_path: staging_dir.join(&asset.file_name),
            intermediate_dir: staging_dir.join("extracted"),
            asset: asset.clone(),
            install_dir,
            staging_dir,
        })
    }

    /// Enter the next forward phase, unless a terminal state was reached
    /// concurrently (cancel/failure race; benign).
    fn advance_phase(&self, to: InstallState, reset_progress: bool) -> bool {
        let mut shared = self.inner.shared.lock();
        if shared.state.is_terminal() {
            return false;
        }
        self.transition_locked(&mut shared, to);
        if reset_progress {
            shared.progress.reset();
        }
        true
    }

    /// Perform a transition and announce it, under the shared lock.
    ///
    /// # Panics
    ///
    /// An illegal edge (phase skipping, leaving a terminal state) is a
    /// driver bug and panics.
    fn transition_locked(&self, shared: &mut TaskShared, to: InstallState) {
        let from = shared.state;
        assert!(
            from.can_transition(to),
            "illegal install state transition: {from} -> {to}"
        );
        shared.state = to;
        debug!(package = self.inner.remote.id(), %from, %to, "state change");
        shared.subscribers.notify_state(&StateChange { from, to });
    }

    /// Record a phase failure, transition to `Failed` and complete.
    ///
    /// Silently dropped when a terminal state was reached concurrently
    /// (a cancel that raced the failing phase wins).
    fn fail(&self, err: InstallError) {
        let mut shared = self.inner.shared.lock();
        if shared.state.is_terminal() {
            return;
        }
        error!(package = self.inner.remote.id(), %err, "installation failed");
        shared.error = Some(err.clone());
        self.transition_locked(&mut shared, InstallState::Failed);
        {
            let mut local = self.inner.local.write();
            local.status = PackageStatus::Failed;
            local.add_error(err.to_string());
        }
        self.set_complete_locked(&mut shared);
    }

    /// Forward a progress value for `phase`, suppressing regressions and
    /// anything after completion or outside the phase it belongs to.
    fn report_progress(&self, phase: InstallState, percent: u8) {
        let shared = &mut *self.inner.shared.lock();
        if shared.completed || shared.state != phase {
            return;
        }
        if let Some(value) = shared.progress.advance(percent) {
            shared
                .subscribers
                .notify_progress(&ProgressEvent {
                    state: phase,
                    percent: value,
                });
        }
    }

    /// Fire the completion notification exactly once.
    fn set_complete_locked(&self, shared: &mut TaskShared) {
        if shared.completed {
            return;
        }
        shared.completed = true;

        let outcome = match shared.state {
            InstallState::Installed => InstallOutcome::Installed,
            InstallState::Cancelled => InstallOutcome::Cancelled,
            InstallState::Failed => InstallOutcome::Failed,
            other => unreachable!("completion from non-terminal state {other}"),
        };
        let event = CompletionEvent {
            outcome,
            state: shared.state,
            error: shared.error.clone(),
        };
        shared.subscribers.notify_completion(&event);
        let _ = self.inner.completion_tx.send(true);
    }

    /// Remove staging content. The task owns its staging and intermediate
    /// directories and clears them on every exit path; the archive is
    /// retained only on success when configured to.
    async fn cleanup(&self, plan: &InstallPlan, success: bool) {
        let keep_archive = success && self.inner.context.keep_archives;
        let staging_dir = plan.staging_dir.clone();
        let intermediate_dir = plan.intermediate_dir.clone();

        let result = tokio::task::spawn_blocking(move || {
            if keep_archive {
                fs::remove_dir_all(&intermediate_dir)
            } else {
                fs::remove_dir_all(&staging_dir)
            }
        })
        .await;

        match result {
            Ok(Err(err)) if err.kind() != io::ErrorKind::NotFound => {
                warn!(
                    package = self.inner.remote.id(),
                    %err,
                    "failed to remove staging directory"
                );
            }
            Err(err) => {
                warn!(package = self.inner.remote.id(), %err, "cleanup worker failed");
            }
            _ => {}
        }
    }
}
