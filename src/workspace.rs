//! Per-run debug artifacts directory.
//!
//! [`Workspace::reset`] must complete before any agent or engine code runs: on return the
//! directory exists and is empty. Its content is left on disk after the run for inspection.

use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};

use tracing::{debug, instrument, trace};

use crate::error::{HarnessError, Result};

/// Default workspace, relative to the current directory.
pub const DEFAULT_WORKSPACE: &str = "./debug_img";

/// The debug artifacts directory of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    path: PathBuf,
}

impl Workspace {
    /// Make `path` an existing, empty directory.
    ///
    /// Every entry of an existing directory is removed, sub-directories included. Symbolic links
    /// are removed, not followed. A missing directory is created (with its parents).
    ///
    /// # Errors
    /// [`HarnessError::Workspace`] if `path` is not a directory or if the filesystem denies a
    /// removal or the creation.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn reset(path: impl AsRef<Path>) -> Result<Workspace> {
        let path = path.as_ref();
        let to_error = |source| HarnessError::Workspace {
            path: path.to_path_buf(),
            source,
        };

        if path.as_os_str().is_empty() {
            return Err(to_error(io::Error::new(
                io::ErrorKind::InvalidInput,
                "empty workspace path",
            )));
        }

        match fs::metadata(path) {
            Ok(metadata) if metadata.is_dir() => {
                let removed = clear_dir(path).map_err(to_error)?;
                debug!(removed, "workspace cleared");
            }
            Ok(_) => return Err(to_error(io::Error::other("not a directory"))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                fs::create_dir_all(path).map_err(to_error)?;
                debug!("workspace created");
            }
            Err(e) => return Err(to_error(e)),
        }

        Ok(Workspace {
            path: path.to_path_buf(),
        })
    }

    /// Directory path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the artifact `name` inside the workspace.
    pub fn artifact_path(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Create (or truncate) the artifact `name`.
    pub fn create_artifact(&self, name: &str) -> io::Result<File> {
        File::create(self.artifact_path(name))
    }
}

/// Same as [`Workspace::reset`].
pub fn reset_workspace(path: impl AsRef<Path>) -> Result<Workspace> {
    Workspace::reset(path)
}

/// Returns the number of removed entries.
fn clear_dir(dir: &Path) -> io::Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let entry_path = entry.path();
        // file_type does not follow symlinks
        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(&entry_path)?;
        } else {
            fs::remove_file(&entry_path)?;
        }
        trace!(path = %entry_path.display(), "removed");
        removed += 1;
    }
    Ok(removed)
}
