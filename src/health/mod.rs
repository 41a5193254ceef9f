use crate::config::GitbossConfig;
use crate::errors::Result;
use crate::git::GitRepository;
use crate::patterns::PatternStore;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Rebase-readiness classification for a branch
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum HealthClassification {
    SafeToRebase,
    StaleButSafe,
    DangerouslyOutdated,
}

/// Snapshot of a branch's divergence and conflict exposure against the
/// configured base. Derived on demand, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchHealth {
    pub branch: String,
    /// Commits on the branch absent from the base
    pub ahead: usize,
    /// Commits on the base absent from the branch
    pub behind: usize,
    /// Fraction of files touched since divergence with a recorded
    /// conflict history (0.0 to 1.0)
    pub conflict_density: f64,
    pub risk_score: f64,
    pub classification: HealthClassification,
}

/// Score a branch against the configured default branch.
///
/// Risk combines divergence and historical conflict density under the
/// configured weights. A branch with no pattern history scores density 0
/// and classifies on divergence alone.
pub fn score(
    repo: &GitRepository,
    store: &PatternStore,
    config: &GitbossConfig,
    branch: &str,
) -> Result<BranchHealth> {
    let base = &config.git.default_branch;
    let (ahead, behind) = repo.ahead_behind(branch, base)?;

    let conflict_density = if ahead == 0 {
        0.0
    } else {
        let branch_tip = repo.resolve_commit(branch)?;
        let base_tip = repo.resolve_commit(base)?;
        let fork_point = repo.merge_base(branch_tip, base_tip)?;

        let touched: Vec<String> = repo
            .changed_paths_since(fork_point, branch_tip)?
            .into_iter()
            .map(|c| c.path)
            .collect();
        store.conflict_density(&touched)
    };

    let settings = &config.health;
    let risk_score = settings.divergence_weight * behind as f64
        + settings.density_weight * conflict_density;

    let classification = if behind >= settings.danger_behind || risk_score >= settings.danger_risk
    {
        HealthClassification::DangerouslyOutdated
    } else if behind >= settings.stale_behind || risk_score >= settings.stale_risk {
        HealthClassification::StaleButSafe
    } else {
        HealthClassification::SafeToRebase
    };

    debug!(
        "Health of '{}': +{}/-{} vs '{}', density {:.2}, risk {:.2} -> {:?}",
        branch, ahead, behind, base, conflict_density, risk_score, classification
    );

    Ok(BranchHealth {
        branch: branch.to_string(),
        ahead,
        behind,
        conflict_density,
        risk_score,
        classification,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::{ConflictFingerprint, PatternScope, Resolution};
    use std::path::{Path, PathBuf};
    use std::process::Command;
    use tempfile::TempDir;

    fn create_test_repo() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let repo_path = temp_dir.path().to_path_buf();

        Command::new("git")
            .args(["init", "-b", "main"])
            .current_dir(&repo_path)
            .output()
            .unwrap();
        Command::new("git")
            .args(["config", "user.name", "Test"])
            .current_dir(&repo_path)
            .output()
            .unwrap();
        Command::new("git")
            .args(["config", "user.email", "test@test.com"])
            .current_dir(&repo_path)
            .output()
            .unwrap();

        std::fs::write(repo_path.join("README.md"), "# Test").unwrap();
        Command::new("git")
            .args(["add", "."])
            .current_dir(&repo_path)
            .output()
            .unwrap();
        Command::new("git")
            .args(["commit", "-m", "Initial commit"])
            .current_dir(&repo_path)
            .output()
            .unwrap();

        (temp_dir, repo_path)
    }

    fn create_commit(repo_path: &Path, message: &str, filename: &str, content: &str) {
        std::fs::write(repo_path.join(filename), content).unwrap();
        Command::new("git")
            .args(["add", filename])
            .current_dir(repo_path)
            .output()
            .unwrap();
        Command::new("git")
            .args(["commit", "-m", message])
            .current_dir(repo_path)
            .output()
            .unwrap();
    }

    fn checkout(repo_path: &Path, args: &[&str]) {
        let mut full = vec!["checkout"];
        full.extend_from_slice(args);
        Command::new("git")
            .args(&full)
            .current_dir(repo_path)
            .output()
            .unwrap();
    }

    #[test]
    fn test_fresh_branch_is_safe() {
        let (_temp_dir, repo_path) = create_test_repo();
        let repo = GitRepository::open(&repo_path).unwrap();
        let store = PatternStore::open(&repo.git_dir()).unwrap();
        let config = GitbossConfig::default();

        checkout(&repo_path, &["-b", "feature"]);
        create_commit(&repo_path, "F1", "f1.txt", "f1\n");

        let health = score(&repo, &store, &config, "feature").unwrap();
        assert_eq!(health.ahead, 1);
        assert_eq!(health.behind, 0);
        assert_eq!(health.conflict_density, 0.0);
        assert_eq!(health.classification, HealthClassification::SafeToRebase);
    }

    #[test]
    fn test_behind_count_drives_staleness() {
        let (_temp_dir, repo_path) = create_test_repo();
        let repo = GitRepository::open(&repo_path).unwrap();
        let store = PatternStore::open(&repo.git_dir()).unwrap();
        let mut config = GitbossConfig::default();
        config.health.stale_behind = 2;
        config.health.danger_behind = 4;

        checkout(&repo_path, &["-b", "feature"]);
        create_commit(&repo_path, "F1", "f1.txt", "f1\n");
        checkout(&repo_path, &["main"]);
        create_commit(&repo_path, "M1", "m1.txt", "m1\n");
        create_commit(&repo_path, "M2", "m2.txt", "m2\n");

        let health = score(&repo, &store, &config, "feature").unwrap();
        assert_eq!(health.behind, 2);
        assert_eq!(health.classification, HealthClassification::StaleButSafe);

        create_commit(&repo_path, "M3", "m3.txt", "m3\n");
        create_commit(&repo_path, "M4", "m4.txt", "m4\n");

        let health = score(&repo, &store, &config, "feature").unwrap();
        assert_eq!(health.behind, 4);
        assert_eq!(
            health.classification,
            HealthClassification::DangerouslyOutdated
        );
    }

    #[test]
    fn test_conflict_history_raises_risk() {
        let (_temp_dir, repo_path) = create_test_repo();
        let repo = GitRepository::open(&repo_path).unwrap();
        let config = GitbossConfig::default();

        checkout(&repo_path, &["-b", "feature"]);
        create_commit(&repo_path, "F1", "hot.txt", "feature\n");

        // Every touched file has conflicted before
        let mut store = PatternStore::open(&repo.git_dir()).unwrap();
        let fp = ConflictFingerprint::from_conflict("hot.txt", "a\n", "b\n");
        store
            .record_confirmation(&fp, Resolution::KeepOurs, PatternScope::FileLevel, "hot.txt")
            .unwrap();

        let health = score(&repo, &store, &config, "feature").unwrap();
        assert_eq!(health.conflict_density, 1.0);
        // density 1.0 * weight 10.0 clears the default danger threshold
        assert_eq!(
            health.classification,
            HealthClassification::DangerouslyOutdated
        );
    }
}
