//! Final placement of extracted package files.
//!
//! Moves the contents of the intermediate directory into the resolved
//! install directory. Rename is tried first (fast path on the same
//! filesystem) with a recursive copy as fallback.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

/// Errors from the finalization failure domain.
#[derive(Debug, Error)]
pub enum FinalizeError {
    /// The intermediate directory could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The install directory could not be created.
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// An entry could not be moved or copied into place.
    #[error("failed to move {from} to {to}: {source}")]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Move everything inside `source_dir` into `dest_dir`.
///
/// Returns the number of top-level entries placed. `dest_dir` is created
/// if missing; existing entries with the same names are overwritten.
pub fn move_contents(source_dir: &Path, dest_dir: &Path) -> Result<usize, FinalizeError> {
    fs::create_dir_all(dest_dir).map_err(|e| FinalizeError::CreateDir {
        path: dest_dir.to_path_buf(),
        source: e,
    })?;

    let entries: Vec<_> = fs::read_dir(source_dir)
        .map_err(|e| FinalizeError::Read {
            path: source_dir.to_path_buf(),
            source: e,
        })?
        .filter_map(|e| e.ok())
        .collect();

    let mut moved = 0;
    for entry in entries {
        let source = entry.path();
        let dest = dest_dir.join(entry.file_name());

        debug!(from = %source.display(), to = %dest.display(), "placing entry");

        if dest.exists() {
            let remove = if dest.is_dir() {
                fs::remove_dir_all(&dest)
            } else {
                fs::remove_file(&dest)
            };
            remove.map_err(|e| FinalizeError::Move {
                from: source.clone(),
                to: dest.clone(),
                source: e,
            })?;
        }

        if fs::rename(&source, &dest).is_err() {
            // Crossed a filesystem boundary; fall back to copying.
            if source.is_dir() {
                copy_dir_recursive(&source, &dest)?;
            } else {
                fs::copy(&source, &dest).map_err(|e| FinalizeError::Move {
                    from: source.clone(),
                    to: dest.clone(),
                    source: e,
                })?;
            }
        }
        moved += 1;
    }

    Ok(moved)
}

/// Recursively copy a directory.
fn copy_dir_recursive(source: &Path, dest: &Path) -> Result<(), FinalizeError> {
    fs::create_dir_all(dest).map_err(|e| FinalizeError::CreateDir {
        path: dest.to_path_buf(),
        source: e,
    })?;

    let entries = fs::read_dir(source).map_err(|e| FinalizeError::Read {
        path: source.to_path_buf(),
        source: e,
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| FinalizeError::Read {
            path: source.to_path_buf(),
            source: e,
        })?;

        let source_path = entry.path();
        let dest_path = dest.join(entry.file_name());

        if source_path.is_dir() {
            copy_dir_recursive(&source_path, &dest_path)?;
        } else {
            fs::copy(&source_path, &dest_path).map_err(|e| FinalizeError::Move {
                from: source_path,
                to: dest_path,
                source: e,
            })?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_move_contents_places_files_and_dirs() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("intermediate");
        let dest = temp.path().join("install");

        fs::create_dir_all(source.join("bin")).unwrap();
        fs::write(source.join("bin/demo"), "binary").unwrap();
        fs::write(source.join("readme.txt"), "docs").unwrap();

        let moved = move_contents(&source, &dest).unwrap();

        assert_eq!(moved, 2);
        assert_eq!(fs::read_to_string(dest.join("bin/demo")).unwrap(), "binary");
        assert_eq!(fs::read_to_string(dest.join("readme.txt")).unwrap(), "docs");
    }

    #[test]
    fn test_move_contents_overwrites_previous_version() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("intermediate");
        let dest = temp.path().join("install");

        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(&dest).unwrap();
        fs::write(source.join("demo.cfg"), "v2").unwrap();
        fs::write(dest.join("demo.cfg"), "v1").unwrap();

        move_contents(&source, &dest).unwrap();
        assert_eq!(fs::read_to_string(dest.join("demo.cfg")).unwrap(), "v2");
    }

    #[test]
    fn test_move_contents_missing_source_is_an_error() {
        let temp = TempDir::new().unwrap();
        let err = move_contents(&temp.path().join("absent"), &temp.path().join("install"))
            .unwrap_err();
        assert!(matches!(err, FinalizeError::Read { .. }));
    }

    #[test]
    fn test_copy_dir_recursive_preserves_structure() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("src");
        fs::create_dir_all(source.join("a/b")).unwrap();
        fs::write(source.join("a/b/deep.txt"), "deep").unwrap();

        let dest = temp.path().join("dst");
        copy_dir_recursive(&source, &dest).unwrap();
        assert_eq!(fs::read_to_string(dest.join("a/b/deep.txt")).unwrap(), "deep");
    }
}
