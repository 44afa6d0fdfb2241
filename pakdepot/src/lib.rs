//! pakdepot - an asynchronous package installation engine.
//!
//! The crate is organized around one central type, the
//! [`task::InstallTask`], which drives a single package through the
//! download -> extract -> finalize pipeline with observable state, monotonic
//! progress reporting, cooperative cancellation and an exactly-once
//! completion event. The [`manager::PackageManager`] sits above it, owning
//! the remote catalog, the local package records and the set of running
//! tasks.
//!
//! Module map:
//! - [`package`]: package, asset and manifest records (plain JSON)
//! - [`transport`]: the download transport trait and its HTTP implementation
//! - [`archive`]: the extractor trait and the tar.gz implementation
//! - [`task`]: the install task state machine and pipeline driver
//! - [`manager`]: catalog, local store, task registry and batch monitoring
//!
//! # Example
//!
//! ```no_run
//! use pakdepot::manager::{ManagerConfig, PackageManager};
//! use pakdepot::task::InstallOptions;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = PackageManager::new(ManagerConfig::default());
//! manager.load_catalog(std::path::Path::new("catalog.json"))?;
//!
//! let task = manager.install("surveillancemodeplugin", InstallOptions::new())?;
//! task.wait().await;
//! assert!(task.success());
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod manager;
pub mod package;
pub mod task;
pub mod transport;
