use crate::errors::{GitbossError, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use tracing::debug;

/// Exclusive lock for the ref-mutating critical section.
///
/// At most one mutating operation (rebase execution, reset, force-push,
/// rewind) may run against a repository at a time. Read-only work
/// (simulation, pattern lookup, health scoring) never takes this lock.
/// The lock file lives next to the repository's own lock files and is
/// released on every exit path via Drop.
pub struct MutationLock {
    path: PathBuf,
}

impl MutationLock {
    /// Acquire the lock, failing immediately if another mutating operation
    /// holds it
    pub fn acquire(git_dir: &std::path::Path, holder: &str) -> Result<Self> {
        let path = crate::config::state_dir(git_dir)?.join("LOCK");

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => GitbossError::validation(format!(
                    "Another mutating operation is in progress (lock held at {})",
                    path.display()
                )),
                _ => GitbossError::Io(e),
            })?;

        // Holder name is informational, for stale-lock diagnosis only
        let _ = writeln!(file, "{holder}");

        debug!("Acquired mutation lock for '{}'", holder);
        Ok(Self { path })
    }
}

impl Drop for MutationLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(
                "Failed to release mutation lock at {}: {}",
                self.path.display(),
                e
            );
        } else {
            debug!("Released mutation lock");
        }
    }
}
