//! The package manager.
//!
//! [`PackageManager`] owns the remote catalog, the local package records,
//! and the set of active install tasks. It creates an [`InstallTask`] per
//! install request, keeps the task registered while it runs, and reclaims
//! it when the task's completion event fires.
//!
//! Lock discipline: a task's completion handler runs under that task's
//! internal lock and removes the task from the active map. Manager code
//! therefore never calls into a task while holding a map guard; tasks are
//! cloned out of the map first.

mod config;
mod finalize;
mod monitor;

pub use config::ManagerConfig;
pub use finalize::{move_contents, FinalizeError};
pub use monitor::InstallMonitor;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::archive::{ArchiveExtractor, TarGzExtractor};
use crate::package::{LocalPackage, PackageStatus, RemotePackage};
use crate::task::{InstallContext, InstallError, InstallOptions, InstallTask};
use crate::transport::{DownloadTransport, HttpTransport};

/// Errors surfaced by manager operations.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The requested package is not in the remote catalog.
    #[error("package '{0}' not found in catalog")]
    PackageNotFound(String),

    /// An install task for the package is already running.
    #[error("package '{0}' is already being installed")]
    InstallInProgress(String),

    /// The package is not installed.
    #[error("package '{0}' is not installed")]
    NotInstalled(String),

    /// The package is already at the newest catalog version.
    #[error("package '{0}' is already up to date")]
    UpToDate(String),

    /// The catalog file could not be read.
    #[error("failed to read catalog {path}: {source}")]
    CatalogRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The catalog file is not valid JSON.
    #[error("failed to parse catalog {path}: {source}")]
    CatalogParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Starting the install task failed.
    #[error(transparent)]
    Install(#[from] InstallError),

    /// Removing installed files failed.
    #[error("failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Persisting the local record file failed.
    #[error("failed to write records to {path}: {source}")]
    RecordsWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

struct ManagerInner {
    context: InstallContext,
    records_path: PathBuf,
    remote: DashMap<String, Arc<RemotePackage>>,
    local: DashMap<String, Arc<RwLock<LocalPackage>>>,
    tasks: DashMap<String, InstallTask>,
}

/// Catalog, local store and install task registry.
///
/// Cheap to clone; clones share state. All operations are non-blocking;
/// [`install`](Self::install) must be called from within a tokio runtime
/// because the task it starts spawns onto it.
#[derive(Clone)]
pub struct PackageManager {
    inner: Arc<ManagerInner>,
}

impl PackageManager {
    /// Create a manager with the HTTP transport and tar.gz extractor.
    pub fn new(config: ManagerConfig) -> Self {
        let transport: Arc<dyn DownloadTransport> =
            Arc::new(HttpTransport::with_timeout(config.timeout));
        Self::with_adapters(config, transport, Arc::new(TarGzExtractor::new()))
    }

    /// Create a manager with injected transport and extractor adapters.
    pub fn with_adapters(
        config: ManagerConfig,
        transport: Arc<dyn DownloadTransport>,
        extractor: Arc<dyn ArchiveExtractor>,
    ) -> Self {
        let manager = Self {
            inner: Arc::new(ManagerInner {
                context: InstallContext {
                    transport,
                    extractor,
                    staging_dir: config.staging_dir.clone(),
                    default_install_dir: config.install_dir.clone(),
                    keep_archives: config.keep_archives,
                },
                records_path: config.records_path.clone(),
                remote: DashMap::new(),
                local: DashMap::new(),
                tasks: DashMap::new(),
            }),
        };
        manager.load_records();
        manager
    }

    // ---- catalog -------------------------------------------------------

    /// Load remote packages from a JSON catalog file (an array of package
    /// records). Entries replace any existing record with the same id.
    pub fn load_catalog(&self, path: &Path) -> Result<usize, ManagerError> {
        let data = fs::read_to_string(path).map_err(|e| ManagerError::CatalogRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let packages: Vec<RemotePackage> =
            serde_json::from_str(&data).map_err(|e| ManagerError::CatalogParse {
                path: path.to_path_buf(),
                source: e,
            })?;

        let mut loaded = 0;
        for package in packages {
            if !package.valid() {
                warn!(package = package.id(), "skipping invalid catalog entry");
                continue;
            }
            self.add_remote(package);
            loaded += 1;
        }
        info!(path = %path.display(), loaded, "catalog loaded");
        Ok(loaded)
    }

    /// Register a remote package, replacing any previous record.
    pub fn add_remote(&self, package: RemotePackage) {
        self.inner
            .remote
            .insert(package.id().to_string(), Arc::new(package));
    }

    /// Look up a remote package by id.
    pub fn remote_package(&self, id: &str) -> Option<Arc<RemotePackage>> {
        self.inner.remote.get(id).map(|r| Arc::clone(r.value()))
    }

    /// All remote packages, in no particular order.
    pub fn remote_packages(&self) -> Vec<Arc<RemotePackage>> {
        self.inner
            .remote
            .iter()
            .map(|r| Arc::clone(r.value()))
            .collect()
    }

    // ---- local store ---------------------------------------------------

    /// Load persisted local records, if the record file exists. Records
    /// stuck in a transient status (a previous process died mid-install)
    /// are downgraded to failed.
    fn load_records(&self) {
        let path = &self.inner.records_path;
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return,
            Err(e) => {
                warn!(path = %path.display(), %e, "failed to read local records");
                return;
            }
        };
        let records: Vec<LocalPackage> = match serde_json::from_str(&data) {
            Ok(records) => records,
            Err(e) => {
                warn!(path = %path.display(), %e, "failed to parse local records");
                return;
            }
        };

        for mut record in records {
            if record.status == PackageStatus::Installing {
                record.status = PackageStatus::Failed;
                record.add_error("interrupted: process exited mid-install");
            }
            self.inner
                .local
                .insert(record.id().to_string(), Arc::new(RwLock::new(record)));
        }
        debug!(path = %path.display(), "local records loaded");
    }

    /// Persist the local records as JSON.
    ///
    /// Called by the CLI after each mutating operation; embedders that
    /// keep the manager alive can call it at their own cadence.
    pub fn save_records(&self) -> Result<(), ManagerError> {
        let records: Vec<LocalPackage> = self
            .local_packages()
            .iter()
            .map(|local| local.read().clone())
            .collect();

        let path = &self.inner.records_path;
        let write = || -> io::Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let data = serde_json::to_string_pretty(&records)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            fs::write(path, data)
        };
        write().map_err(|e| ManagerError::RecordsWrite {
            path: path.clone(),
            source: e,
        })
    }

    /// Look up the local record for a package, if one exists.
    pub fn local_package(&self, id: &str) -> Option<Arc<RwLock<LocalPackage>>> {
        self.inner.local.get(id).map(|r| Arc::clone(r.value()))
    }

    /// All local records, in no particular order.
    pub fn local_packages(&self) -> Vec<Arc<RwLock<LocalPackage>>> {
        self.inner
            .local
            .iter()
            .map(|r| Arc::clone(r.value()))
            .collect()
    }

    /// True when the package is fully installed.
    pub fn is_installed(&self, id: &str) -> bool {
        self.local_package(id)
            .is_some_and(|local| local.read().is_installed())
    }

    // ---- installation --------------------------------------------------

    /// Start installing a package.
    ///
    /// Creates (or reuses) the local record, builds an install task and
    /// starts it. The returned handle can be used to observe progress,
    /// wait for completion or cancel. The manager keeps the task
    /// registered until its completion event fires, then drops it.
    ///
    /// Fails with [`ManagerError::InstallInProgress`] while a previous
    /// install of the same package is still running.
    pub fn install(
        &self,
        id: &str,
        options: InstallOptions,
    ) -> Result<InstallTask, ManagerError> {
        self.install_with(id, options, |_| {})
    }

    /// [`install`](Self::install) with a pre-start configuration hook.
    ///
    /// `configure` runs after the task is registered but before
    /// `start()`, so subscriptions registered in it observe the task's
    /// first transition and earliest progress.
    pub fn install_with(
        &self,
        id: &str,
        options: InstallOptions,
        configure: impl FnOnce(&InstallTask),
    ) -> Result<InstallTask, ManagerError> {
        let remote = self
            .remote_package(id)
            .ok_or_else(|| ManagerError::PackageNotFound(id.to_string()))?;

        let local = self
            .inner
            .local
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(LocalPackage::new(remote.package.clone()))))
            .value()
            .clone();

        let task = InstallTask::new(self.inner.context.clone(), local, remote, options);

        // Reclamation: the completion handler runs under the task's lock,
        // so it must touch nothing of the task itself, only the map.
        let manager: Weak<ManagerInner> = Arc::downgrade(&self.inner);
        let task_id = id.to_string();
        task.on_complete(Box::new(move |event| {
            if let Some(inner) = manager.upgrade() {
                inner.tasks.remove(&task_id);
                debug!(package = %task_id, outcome = ?event.outcome, "install task reclaimed");
            }
        }));

        match self.inner.tasks.entry(id.to_string()) {
            Entry::Occupied(_) => return Err(ManagerError::InstallInProgress(id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(task.clone());
            }
        }

        configure(&task);
        if let Err(err) = task.start() {
            self.inner.tasks.remove(id);
            return Err(err.into());
        }
        Ok(task)
    }

    /// The running install task for a package, if one is active.
    pub fn active_task(&self, id: &str) -> Option<InstallTask> {
        self.inner.tasks.get(id).map(|t| t.value().clone())
    }

    /// All running install tasks.
    pub fn active_tasks(&self) -> Vec<InstallTask> {
        self.inner
            .tasks
            .iter()
            .map(|t| t.value().clone())
            .collect()
    }

    /// Cancel every running install task.
    pub fn cancel_all(&self) {
        for task in self.active_tasks() {
            task.cancel();
        }
    }

    // ---- updates -------------------------------------------------------

    /// True when the catalog carries a newer asset than the installed
    /// version of the package.
    pub fn has_update(&self, id: &str) -> bool {
        let Some(remote) = self.remote_package(id) else {
            return false;
        };
        let Some(latest) = remote.latest_asset() else {
            return false;
        };
        self.local_package(id).is_some_and(|local| {
            let local = local.read();
            local.is_installed() && local.version().is_some_and(|v| *v < latest.version)
        })
    }

    /// Ids of installed packages with an update available, sorted.
    pub fn updatable_packages(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .inner
            .local
            .iter()
            .map(|r| r.key().clone())
            .collect();
        ids.sort();
        ids.retain(|id| self.has_update(id));
        ids
    }

    /// Start updating an installed package to its latest catalog asset.
    ///
    /// The new version installs over the existing install directory;
    /// files it does not replace are left in place. Refuses when the
    /// package is not installed or already up to date.
    pub fn update(&self, id: &str) -> Result<InstallTask, ManagerError> {
        self.update_with(id, |_| {})
    }

    /// [`update`](Self::update) with a pre-start configuration hook.
    pub fn update_with(
        &self,
        id: &str,
        configure: impl FnOnce(&InstallTask),
    ) -> Result<InstallTask, ManagerError> {
        if !self.is_installed(id) {
            return Err(ManagerError::NotInstalled(id.to_string()));
        }
        if !self.has_update(id) {
            return Err(ManagerError::UpToDate(id.to_string()));
        }
        self.install_with(id, InstallOptions::new(), configure)
    }

    // ---- uninstall -----------------------------------------------------

    /// Remove an installed package: delete its manifest files from the
    /// install directory and reset the local record.
    pub fn uninstall(&self, id: &str) -> Result<(), ManagerError> {
        if self.active_task(id).is_some() {
            return Err(ManagerError::InstallInProgress(id.to_string()));
        }
        let local = self
            .local_package(id)
            .ok_or_else(|| ManagerError::NotInstalled(id.to_string()))?;

        {
            let mut local = local.write();
            if !local.is_installed() {
                return Err(ManagerError::NotInstalled(id.to_string()));
            }

            if let Some(install_dir) = local.install_dir().map(Path::to_path_buf) {
                for file in local.manifest.files() {
                    let path = install_dir.join(file);
                    match fs::remove_file(&path) {
                        Ok(()) => {}
                        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                        Err(e) => return Err(ManagerError::Remove { path, source: e }),
                    }
                }
            }

            local.status = PackageStatus::NotInstalled;
            local.installed_asset = None;
            local.installed_at = None;
            local.manifest.clear();
        }

        self.save_records()?;
        info!(package = id, "package uninstalled");
        Ok(())
    }
}
