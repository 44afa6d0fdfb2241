//! End-to-end install pipeline tests, driving real [`InstallTask`]s
//! against scripted transports and (where the scenario calls for it) the
//! real tar.gz extractor.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::{Mutex, RwLock};
use semver::Version;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use pakdepot::archive::{ArchiveExtractor, ExtractError, ExtractProgress, TarGzExtractor};
use pakdepot::package::{Asset, LocalPackage, Package, PackageStatus, RemotePackage};
use pakdepot::task::{
    InstallContext, InstallError, InstallOptions, InstallOutcome, InstallState, InstallTask,
};
use pakdepot::transport::{
    DownloadTransport, TransferFuture, TransferProgress, TransferRequest, TransferSummary,
    TransportError,
};

// ---- fixtures ----------------------------------------------------------

/// Build a small tar.gz in memory containing `files` as (path, contents).
fn build_archive(files: &[(&str, &[u8])]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, *contents).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Transport that writes a fixed payload and replays a byte-progress
/// script before succeeding.
struct ScriptedTransport {
    payload: Vec<u8>,
    total: u64,
    steps: Vec<u64>,
}

impl DownloadTransport for ScriptedTransport {
    fn fetch<'a>(
        &'a self,
        request: &'a TransferRequest,
        progress: TransferProgress,
        _cancel: CancellationToken,
    ) -> TransferFuture<'a> {
        Box::pin(async move {
            if let Some(parent) = request.destination.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(&request.destination, &self.payload).unwrap();
            for &received in &self.steps {
                progress(received, self.total);
            }
            Ok(TransferSummary {
                bytes_received: self.payload.len() as u64,
            })
        })
    }
}

/// Transport that reports partial progress, then blocks until cancelled,
/// then tries to sneak in one more (late) progress report.
struct CancellableTransport;

impl DownloadTransport for CancellableTransport {
    fn fetch<'a>(
        &'a self,
        _request: &'a TransferRequest,
        progress: TransferProgress,
        cancel: CancellationToken,
    ) -> TransferFuture<'a> {
        Box::pin(async move {
            progress(400, 1000);
            cancel.cancelled().await;
            progress(990, 1000);
            Err(TransportError::Cancelled)
        })
    }
}

/// Transport that fails with an HTTP status error.
struct FailingTransport;

impl DownloadTransport for FailingTransport {
    fn fetch<'a>(
        &'a self,
        request: &'a TransferRequest,
        _progress: TransferProgress,
        _cancel: CancellationToken,
    ) -> TransferFuture<'a> {
        Box::pin(async move {
            Err(TransportError::Status {
                url: request.url.clone(),
                status: 503,
            })
        })
    }
}

/// Transport that streams progress indefinitely until cancelled.
struct ChattyTransport;

impl DownloadTransport for ChattyTransport {
    fn fetch<'a>(
        &'a self,
        _request: &'a TransferRequest,
        progress: TransferProgress,
        cancel: CancellationToken,
    ) -> TransferFuture<'a> {
        Box::pin(async move {
            let mut received = 0u64;
            loop {
                if cancel.is_cancelled() {
                    return Err(TransportError::Cancelled);
                }
                received += 10;
                progress(received.min(999), 1000);
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
    }
}

/// Extractor that records whether it was ever invoked.
struct TrackingExtractor {
    invoked: Arc<AtomicBool>,
}

impl ArchiveExtractor for TrackingExtractor {
    fn extract(
        &self,
        _archive: &Path,
        _dest_dir: &Path,
        _progress: ExtractProgress<'_>,
        _cancel: &CancellationToken,
    ) -> Result<Vec<PathBuf>, ExtractError> {
        self.invoked.store(true, Ordering::SeqCst);
        Ok(Vec::new())
    }
}

/// Extractor that ignores cancellation and reports success once the
/// token fires anyway.
struct DefiantExtractor;

impl ArchiveExtractor for DefiantExtractor {
    fn extract(
        &self,
        _archive: &Path,
        _dest_dir: &Path,
        _progress: ExtractProgress<'_>,
        cancel: &CancellationToken,
    ) -> Result<Vec<PathBuf>, ExtractError> {
        while !cancel.is_cancelled() {
            std::thread::sleep(Duration::from_millis(5));
        }
        Ok(vec![PathBuf::from("bin/demo")])
    }
}

/// Extractor that panics, standing in for a buggy adapter.
struct PanickingExtractor;

impl ArchiveExtractor for PanickingExtractor {
    fn extract(
        &self,
        _archive: &Path,
        _dest_dir: &Path,
        _progress: ExtractProgress<'_>,
        _cancel: &CancellationToken,
    ) -> Result<Vec<PathBuf>, ExtractError> {
        panic!("extractor blew up");
    }
}

struct Fixture {
    _temp: TempDir,
    install_dir: PathBuf,
    staging_dir: PathBuf,
    task: InstallTask,
    local: Arc<RwLock<LocalPackage>>,
}

fn fixture(
    transport: Arc<dyn DownloadTransport>,
    extractor: Arc<dyn ArchiveExtractor>,
    asset: Asset,
    options: InstallOptions,
) -> Fixture {
    let temp = TempDir::new().unwrap();
    let install_dir = temp.path().join("install");
    let staging_dir = temp.path().join("staging");

    let context = InstallContext {
        transport,
        extractor,
        staging_dir: staging_dir.clone(),
        default_install_dir: install_dir.clone(),
        keep_archives: false,
    };
    let remote = Arc::new(RemotePackage::new(Package::new("demo", "Demo")).with_asset(asset));
    let local = Arc::new(RwLock::new(LocalPackage::new(Package::new("demo", "Demo"))));
    let task = InstallTask::new(context, Arc::clone(&local), remote, options);

    Fixture {
        _temp: temp,
        install_dir,
        staging_dir,
        task,
        local,
    }
}

fn demo_asset() -> Asset {
    Asset::new(
        "demo-1.0.0.tar.gz",
        Version::new(1, 0, 0),
        "http://example.invalid/demo-1.0.0.tar.gz",
    )
}

/// Wait (bounded) for an on-disk condition that trails task completion,
/// like staging cleanup, which runs after the completion event fires.
async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached within 2s");
}

// ---- scenarios ---------------------------------------------------------

#[tokio::test]
async fn test_happy_path_installs_package() {
    let payload = build_archive(&[
        ("bin/demo", b"#!/bin/sh\n" as &[u8]),
        ("share/readme.txt", b"hello"),
    ]);
    let total = payload.len() as u64;
    let transport = Arc::new(ScriptedTransport {
        payload,
        total,
        steps: vec![total / 4, total / 2, total],
    });

    let f = fixture(
        transport,
        Arc::new(TarGzExtractor::new()),
        demo_asset(),
        InstallOptions::new(),
    );

    let states = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&states);
    f.task
        .on_state_change(Box::new(move |change| recorded.lock().push(change.to)));

    let completions = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&completions);
    f.task.on_complete(Box::new(move |event| {
        assert_eq!(event.outcome, InstallOutcome::Installed);
        assert!(event.error.is_none());
        count.fetch_add(1, Ordering::SeqCst);
    }));

    f.task.start().unwrap();
    f.task.wait().await;

    assert!(f.task.success());
    assert_eq!(f.task.progress(), 100);
    assert!(f.task.error().is_none());
    assert_eq!(completions.load(Ordering::SeqCst), 1);
    assert_eq!(
        *states.lock(),
        vec![
            InstallState::Downloading,
            InstallState::Extracting,
            InstallState::Finalizing,
            InstallState::Installed,
        ]
    );

    // Files landed in the install directory, the local record was updated
    // and staging was cleared.
    assert_eq!(
        fs::read_to_string(f.install_dir.join("share/readme.txt")).unwrap(),
        "hello"
    );
    {
        let local = f.local.read();
        assert!(local.is_installed());
        assert_eq!(local.version(), Some(&Version::new(1, 0, 0)));
        assert_eq!(local.manifest.files().len(), 2);
        assert!(local.last_error().is_none());
    }
    let staging = f.staging_dir.join("demo");
    wait_for(move || !staging.exists()).await;
}

#[tokio::test]
async fn test_progress_is_monotonic_within_each_phase() {
    let payload = build_archive(&[("a.txt", b"a" as &[u8])]);
    let total = payload.len() as u64;
    // The script repeats and regresses; observers must only ever see
    // increasing percentages per phase.
    let transport = Arc::new(ScriptedTransport {
        payload,
        total,
        steps: vec![total / 2, total / 4, total / 2, total, total / 2],
    });

    let f = fixture(
        transport,
        Arc::new(TarGzExtractor::new()),
        demo_asset(),
        InstallOptions::new(),
    );

    let events = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&events);
    f.task
        .on_progress(Box::new(move |event| recorded.lock().push(*event)));

    f.task.start().unwrap();
    f.task.wait().await;
    assert!(f.task.success());

    let events = events.lock();
    assert!(!events.is_empty());
    for pair in events.windows(2) {
        if pair[0].state == pair[1].state {
            assert!(
                pair[0].percent < pair[1].percent,
                "non-increasing progress within {:?}: {} then {}",
                pair[0].state,
                pair[0].percent,
                pair[1].percent
            );
        }
    }
}

#[tokio::test]
async fn test_cancel_mid_download() {
    let invoked = Arc::new(AtomicBool::new(false));
    let f = fixture(
        Arc::new(CancellableTransport),
        Arc::new(TrackingExtractor {
            invoked: Arc::clone(&invoked),
        }),
        demo_asset(),
        InstallOptions::new(),
    );

    let completions = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&completions);
    f.task.on_complete(Box::new(move |event| {
        assert_eq!(event.outcome, InstallOutcome::Cancelled);
        count.fetch_add(1, Ordering::SeqCst);
    }));

    f.task.start().unwrap();
    wait_for(|| f.task.progress() == 40).await;

    f.task.cancel();
    f.task.wait().await;

    assert!(f.task.cancelled());
    assert!(f.task.error().is_none());
    assert_eq!(completions.load(Ordering::SeqCst), 1);
    assert!(!invoked.load(Ordering::SeqCst), "extractor ran after cancel");
    assert_eq!(f.local.read().status, PackageStatus::Failed);

    // The transport's late report after cancellation must not move the
    // progress value.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(f.task.progress(), 40);

    // Cancelling again after the terminal state changes nothing.
    f.task.cancel();
    assert_eq!(completions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_download_failure() {
    let f = fixture(
        Arc::new(FailingTransport),
        Arc::new(TarGzExtractor::new()),
        demo_asset(),
        InstallOptions::new(),
    );

    let completions = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&completions);
    f.task.on_complete(Box::new(move |event| {
        assert_eq!(event.outcome, InstallOutcome::Failed);
        assert!(matches!(event.error, Some(InstallError::Download(_))));
        count.fetch_add(1, Ordering::SeqCst);
    }));

    f.task.start().unwrap();
    f.task.wait().await;

    assert!(f.task.failed());
    assert!(!f.task.valid());
    let err = f.task.error().unwrap();
    assert!(matches!(err, InstallError::Download(ref reason) if reason.contains("503")));
    assert_eq!(completions.load(Ordering::SeqCst), 1);

    let local = f.local.read();
    assert_eq!(local.status, PackageStatus::Failed);
    assert!(local.last_error().unwrap().contains("503"));
}

#[tokio::test]
async fn test_unknown_version_fails_validation_without_starting() {
    let f = fixture(
        Arc::new(FailingTransport),
        Arc::new(TarGzExtractor::new()),
        demo_asset(),
        InstallOptions::new().with_version("9.9.9"),
    );

    let completions = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&completions);
    f.task
        .on_complete(Box::new(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        }));

    let err = f.task.start().unwrap_err();
    assert!(matches!(err, InstallError::Validation(_)));
    assert_eq!(f.task.state(), InstallState::None);
    assert!(!f.task.complete());
    assert_eq!(completions.load(Ordering::SeqCst), 0);
    assert_eq!(f.local.read().status, PackageStatus::NotInstalled);
}

#[tokio::test]
async fn test_sdk_version_selection_prefers_matching_build() {
    let payload = build_archive(&[("a.txt", b"a" as &[u8])]);
    let total = payload.len() as u64;
    let transport = Arc::new(ScriptedTransport {
        payload,
        total,
        steps: vec![total],
    });

    let temp = TempDir::new().unwrap();
    let context = InstallContext {
        transport,
        extractor: Arc::new(TarGzExtractor::new()),
        staging_dir: temp.path().join("staging"),
        default_install_dir: temp.path().join("install"),
        keep_archives: false,
    };
    let remote = Arc::new(
        RemotePackage::new(Package::new("demo", "Demo"))
            .with_asset(
                Asset::new("demo-1.2.0.tar.gz", Version::new(1, 2, 0), "http://x/1.2.0")
                    .with_sdk_version("0.8.0"),
            )
            .with_asset(
                Asset::new("demo-1.1.0.tar.gz", Version::new(1, 1, 0), "http://x/1.1.0")
                    .with_sdk_version("0.6.2"),
            ),
    );
    let local = Arc::new(RwLock::new(LocalPackage::new(Package::new("demo", "Demo"))));
    let task = InstallTask::new(
        context,
        local,
        remote,
        InstallOptions::new().with_sdk_version("0.6.2"),
    );

    task.start().unwrap();
    task.wait().await;

    assert!(task.success());
    assert_eq!(
        task.resolved_asset().unwrap().version,
        Version::new(1, 1, 0)
    );
}

#[tokio::test]
async fn test_corrupt_archive_fails_extraction() {
    let transport = Arc::new(ScriptedTransport {
        payload: b"definitely not a gzip stream".to_vec(),
        total: 28,
        steps: vec![28],
    });

    let f = fixture(
        transport,
        Arc::new(TarGzExtractor::new()),
        demo_asset(),
        InstallOptions::new(),
    );

    f.task.start().unwrap();
    f.task.wait().await;

    assert!(f.task.failed());
    assert!(matches!(f.task.error(), Some(InstallError::Extract(_))));
    assert_eq!(f.local.read().status, PackageStatus::Failed);
}

#[tokio::test]
async fn test_unsized_transfer_reports_no_intermediate_progress() {
    let payload = build_archive(&[("a.txt", b"a" as &[u8])]);
    // total_bytes of zero means the server advertised no length; the
    // download phase then reports no percentages at all.
    let transport = Arc::new(ScriptedTransport {
        payload,
        total: 0,
        steps: vec![512, 4096],
    });

    let f = fixture(
        transport,
        Arc::new(TarGzExtractor::new()),
        demo_asset(),
        InstallOptions::new(),
    );

    let events = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&events);
    f.task
        .on_progress(Box::new(move |event| recorded.lock().push(*event)));

    f.task.start().unwrap();
    f.task.wait().await;
    assert!(f.task.success());

    let events = events.lock();
    assert!(events
        .iter()
        .all(|e| e.state != InstallState::Downloading || e.percent == 0));
}

#[tokio::test]
async fn test_keep_archives_retains_the_downloaded_file() {
    let payload = build_archive(&[("a.txt", b"a" as &[u8])]);
    let total = payload.len() as u64;
    let transport: Arc<dyn DownloadTransport> = Arc::new(ScriptedTransport {
        payload,
        total,
        steps: vec![total],
    });

    let temp = TempDir::new().unwrap();
    let staging_dir = temp.path().join("staging");
    let context = InstallContext {
        transport,
        extractor: Arc::new(TarGzExtractor::new()),
        staging_dir: staging_dir.clone(),
        default_install_dir: temp.path().join("install"),
        keep_archives: true,
    };
    let remote = Arc::new(RemotePackage::new(Package::new("demo", "Demo")).with_asset(demo_asset()));
    let local = Arc::new(RwLock::new(LocalPackage::new(Package::new("demo", "Demo"))));
    let task = InstallTask::new(context, local, remote, InstallOptions::new());

    task.start().unwrap();
    task.wait().await;
    assert!(task.success());

    let archive = staging_dir.join("demo").join("demo-1.0.0.tar.gz");
    let intermediate = staging_dir.join("demo").join("extracted");
    wait_for(move || !intermediate.exists()).await;
    assert!(archive.is_file());
}

#[tokio::test]
async fn test_install_dir_option_overrides_default() {
    let payload = build_archive(&[("a.txt", b"custom" as &[u8])]);
    let total = payload.len() as u64;
    let transport = Arc::new(ScriptedTransport {
        payload,
        total,
        steps: vec![total],
    });

    let temp = TempDir::new().unwrap();
    let custom = temp.path().join("custom-target");
    let context = InstallContext {
        transport,
        extractor: Arc::new(TarGzExtractor::new()),
        staging_dir: temp.path().join("staging"),
        default_install_dir: temp.path().join("install"),
        keep_archives: false,
    };
    let remote =
        Arc::new(RemotePackage::new(Package::new("demo", "Demo")).with_asset(demo_asset()));
    let local = Arc::new(RwLock::new(LocalPackage::new(Package::new("demo", "Demo"))));
    let task = InstallTask::new(
        context,
        Arc::clone(&local),
        remote,
        InstallOptions::new().with_install_dir(&custom),
    );

    task.start().unwrap();
    task.wait().await;
    assert!(task.success());
    assert_eq!(fs::read_to_string(custom.join("a.txt")).unwrap(), "custom");
    assert_eq!(local.read().install_dir(), Some(custom.as_path()));
}

#[tokio::test]
async fn test_finalize_failure_is_reported() {
    let payload = build_archive(&[("a.txt", b"a" as &[u8])]);
    let total = payload.len() as u64;
    let transport: Arc<dyn DownloadTransport> = Arc::new(ScriptedTransport {
        payload,
        total,
        steps: vec![total],
    });

    let temp = TempDir::new().unwrap();
    // Point the install directory at a path that cannot be created
    // because a file occupies it.
    let blocked = temp.path().join("blocked");
    File::create(&blocked).unwrap();

    let context = InstallContext {
        transport,
        extractor: Arc::new(TarGzExtractor::new()),
        staging_dir: temp.path().join("staging"),
        default_install_dir: blocked,
        keep_archives: false,
    };
    let remote = Arc::new(RemotePackage::new(Package::new("demo", "Demo")).with_asset(demo_asset()));
    let local = Arc::new(RwLock::new(LocalPackage::new(Package::new("demo", "Demo"))));
    let task = InstallTask::new(context, local, remote, InstallOptions::new());

    task.start().unwrap();
    task.wait().await;

    assert!(task.failed());
    assert!(matches!(task.error(), Some(InstallError::Finalize(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_during_finalizing_leaves_record_uninstalled() {
    let payload = build_archive(&[("bin/demo", b"#!/bin/sh\n" as &[u8])]);
    let total = payload.len() as u64;
    let transport = Arc::new(ScriptedTransport {
        payload,
        total,
        steps: vec![total],
    });

    let f = fixture(
        transport,
        Arc::new(TarGzExtractor::new()),
        demo_asset(),
        InstallOptions::new(),
    );

    // Cancel from another thread the moment Finalizing is announced. The
    // announcement runs under the task lock, so the cancellation flag is
    // raised before the final move begins while the Cancelled transition
    // itself lands only after this handler returns.
    let canceller = f.task.clone();
    f.task.on_state_change(Box::new(move |change| {
        if change.to == InstallState::Finalizing {
            let task = canceller.clone();
            std::thread::spawn(move || task.cancel());
            std::thread::sleep(Duration::from_millis(100));
        }
    }));

    f.task.start().unwrap();
    f.task.wait().await;

    assert!(f.task.cancelled());
    assert!(f.task.error().is_none());
    let local = f.local.read();
    assert!(!local.is_installed(), "cancelled install marked installed");
    assert_eq!(local.status, PackageStatus::Failed);
    assert!(local.installed_asset.is_none());
    assert!(local.installed_at.is_none());
}

#[tokio::test]
async fn test_cancel_during_extract_discards_the_new_manifest() {
    let payload = build_archive(&[("a.txt", b"a" as &[u8])]);
    let total = payload.len() as u64;
    let transport = Arc::new(ScriptedTransport {
        payload,
        total,
        steps: vec![total],
    });

    let f = fixture(
        transport,
        Arc::new(DefiantExtractor),
        demo_asset(),
        InstallOptions::new(),
    );

    f.task.start().unwrap();
    wait_for(|| f.task.state() == InstallState::Extracting).await;
    f.task.cancel();
    f.task.wait().await;

    // The extractor claimed success after the cancel; its file list must
    // not reach the record.
    assert!(f.task.cancelled());
    let local = f.local.read();
    assert!(local.manifest.is_empty());
    assert!(!local.is_installed());
    assert_eq!(local.status, PackageStatus::Failed);
}

#[tokio::test]
async fn test_panicking_extractor_fails_the_task() {
    let payload = build_archive(&[("a.txt", b"a" as &[u8])]);
    let total = payload.len() as u64;
    let transport = Arc::new(ScriptedTransport {
        payload,
        total,
        steps: vec![total],
    });

    let f = fixture(
        transport,
        Arc::new(PanickingExtractor),
        demo_asset(),
        InstallOptions::new(),
    );

    let completions = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&completions);
    f.task.on_complete(Box::new(move |event| {
        assert_eq!(event.outcome, InstallOutcome::Failed);
        count.fetch_add(1, Ordering::SeqCst);
    }));

    f.task.start().unwrap();
    // A crashing worker must still terminate the task; this would hang
    // if the panic escaped the pipeline.
    f.task.wait().await;

    assert!(f.task.failed());
    assert!(matches!(f.task.error(), Some(InstallError::Extract(_))));
    assert_eq!(completions.load(Ordering::SeqCst), 1);
    assert_eq!(f.local.read().status, PackageStatus::Failed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_queries_while_cancelling() {
    let f = fixture(
        Arc::new(ChattyTransport),
        Arc::new(TarGzExtractor::new()),
        demo_asset(),
        InstallOptions::new(),
    );

    let completions = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&completions);
    f.task.on_complete(Box::new(move |_| {
        count.fetch_add(1, Ordering::SeqCst);
    }));

    f.task.start().unwrap();
    wait_for(|| f.task.progress() > 0).await;

    let mut readers = Vec::new();
    for _ in 0..4 {
        let task = f.task.clone();
        readers.push(std::thread::spawn(move || {
            for _ in 0..2000 {
                let percent = task.progress();
                assert!(percent <= 100);
                if task.state().is_terminal() {
                    assert!(task.complete());
                }
                let _ = task.error();
            }
        }));
    }
    let canceller = {
        let task = f.task.clone();
        std::thread::spawn(move || task.cancel())
    };

    for reader in readers {
        reader.join().unwrap();
    }
    canceller.join().unwrap();
    f.task.wait().await;

    assert!(f.task.cancelled());
    assert!(f.task.progress() <= 100);
    assert_eq!(completions.load(Ordering::SeqCst), 1);
}
