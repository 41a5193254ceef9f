pub mod settings;

pub use settings::{
    GitSettings, GitbossConfig, HealthSettings, JournalSettings, PatternSettings, TieBreak,
};

use std::path::{Path, PathBuf};

/// Directory under the repository's git dir where all durable state lives
/// (config, journal, pattern store, rebase execution state).
pub const STATE_DIR: &str = "gitboss";

/// Resolve the state directory for a repository, creating it if missing.
pub fn state_dir(git_dir: &Path) -> crate::errors::Result<PathBuf> {
    let dir = git_dir.join(STATE_DIR);
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
    }
    Ok(dir)
}
