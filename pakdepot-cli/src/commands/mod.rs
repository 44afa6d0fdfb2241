//! CLI command implementations.

pub mod info;
pub mod install;
pub mod list;
pub mod uninstall;
pub mod update;
