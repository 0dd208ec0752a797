use crate::errors::ConfigError;
use std::env;
use std::path::{Path, PathBuf};

/// Makes a directory the process working directory until dropped, then
/// restores the previous one. Restoration also happens while unwinding.
///
/// The working directory is process-wide state: guards must be dropped in
/// reverse order of creation and must not be shared across threads.
#[must_use = "the previous working directory is restored when the guard is dropped"]
#[derive(Debug)]
pub struct ScopedDir {
    previous: PathBuf,
    current: PathBuf,
}

impl ScopedDir {
    pub fn enter(destination: &Path) -> Result<Self, ConfigError> {
        let previous = env::current_dir()?;
        env::set_current_dir(destination).map_err(|source| ConfigError::PathIo {
            path: destination.to_path_buf(),
            source,
        })?;
        tracing::trace!(
            "Entered '{}' (was '{}')",
            destination.display(),
            previous.display()
        );
        Ok(Self {
            previous,
            current: destination.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.current
    }

    pub fn previous(&self) -> &Path {
        &self.previous
    }
}

impl Drop for ScopedDir {
    fn drop(&mut self) {
        if let Err(e) = env::set_current_dir(&self.previous) {
            tracing::error!(
                "Failed to restore working directory '{}': {}",
                self.previous.display(),
                e
            );
        }
    }
}
