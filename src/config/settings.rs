use crate::errors::{GitbossError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GitbossConfig {
    pub git: GitSettings,
    pub patterns: PatternSettings,
    pub health: HealthSettings,
    pub journal: JournalSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitSettings {
    /// Base branch used for divergence and health scoring
    pub default_branch: String,
    /// Refs whose history is considered public; rebasing commits reachable
    /// from any of these flags the plan, it does not block it
    pub protected_refs: Vec<String>,
}

/// Tie-break order for competing resolution patterns at equal confidence
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TieBreak {
    /// Most recently confirmed wins
    Recency,
    /// Lexicographic file path, fully deterministic across machines
    FilePath,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternSettings {
    /// Confidence a file-level pattern must reach before it is considered
    /// for project-level promotion
    pub promotion_threshold: u32,
    /// Distinct files the same resolution shape must appear in before
    /// promotion
    pub promotion_min_files: usize,
    /// Ordering between equal-confidence competing patterns
    pub tie_break: TieBreak,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSettings {
    /// Behind-count at which a branch is considered stale
    pub stale_behind: usize,
    /// Behind-count at which divergence alone makes a branch dangerous
    pub danger_behind: usize,
    /// Weight of historical conflict density in the risk score
    pub density_weight: f64,
    /// Weight of divergence in the risk score
    pub divergence_weight: f64,
    /// Risk score at which a branch is classified stale
    pub stale_risk: f64,
    /// Risk score at which a branch is classified dangerously outdated
    pub danger_risk: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalSettings {
    /// Ref namespace for safety branches created by the journal
    pub safety_branch_prefix: String,
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            default_branch: "main".to_string(),
            protected_refs: vec!["refs/heads/main".to_string()],
        }
    }
}

impl Default for PatternSettings {
    fn default() -> Self {
        Self {
            promotion_threshold: 3,
            promotion_min_files: 2,
            tie_break: TieBreak::Recency,
        }
    }
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            stale_behind: 20,
            danger_behind: 100,
            density_weight: 10.0,
            divergence_weight: 0.1,
            stale_risk: 2.0,
            danger_risk: 8.0,
        }
    }
}

impl Default for JournalSettings {
    fn default() -> Self {
        Self {
            safety_branch_prefix: "gitboss".to_string(),
        }
    }
}

impl GitbossConfig {
    /// Load configuration from a file, falling back to defaults when the
    /// file does not exist yet
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| GitbossError::config(format!("Failed to read config file: {e}")))?;

        let config: GitbossConfig = serde_json::from_str(&content)
            .map_err(|e| GitbossError::config(format!("Failed to parse config file: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| GitbossError::config(format!("Failed to serialize config: {e}")))?;

        fs::write(path, content)
            .map_err(|e| GitbossError::config(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.git.default_branch.is_empty() {
            return Err(GitbossError::config("Default branch must not be empty"));
        }

        if self.patterns.promotion_threshold == 0 {
            return Err(GitbossError::config(
                "Pattern promotion threshold must be at least 1",
            ));
        }

        if self.patterns.promotion_min_files < 2 {
            return Err(GitbossError::config(
                "Project-level promotion requires at least 2 distinct files",
            ));
        }

        if self.health.stale_behind >= self.health.danger_behind {
            return Err(GitbossError::config(
                "Health thresholds must satisfy stale_behind < danger_behind",
            ));
        }

        if self.health.stale_risk >= self.health.danger_risk {
            return Err(GitbossError::config(
                "Health thresholds must satisfy stale_risk < danger_risk",
            ));
        }

        if self.journal.safety_branch_prefix.is_empty()
            || self.journal.safety_branch_prefix.contains(' ')
        {
            return Err(GitbossError::config(
                "Safety branch prefix must be a valid ref component",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = GitbossConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.git.default_branch, "main");
        assert_eq!(config.patterns.tie_break, TieBreak::Recency);
    }

    #[test]
    fn test_load_missing_file_yields_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = GitbossConfig::load_from_file(&tmp.path().join("config.json")).unwrap();
        assert_eq!(config.patterns.promotion_min_files, 2);
    }

    #[test]
    fn test_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");

        let mut config = GitbossConfig::default();
        config.git.default_branch = "trunk".to_string();
        config.patterns.promotion_threshold = 5;
        config.save_to_file(&path).unwrap();

        let loaded = GitbossConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.git.default_branch, "trunk");
        assert_eq!(loaded.patterns.promotion_threshold, 5);
    }

    #[test]
    fn test_validate_rejects_bad_thresholds() {
        let mut config = GitbossConfig::default();
        config.health.stale_behind = 200;
        assert!(config.validate().is_err());

        let mut config = GitbossConfig::default();
        config.patterns.promotion_min_files = 1;
        assert!(config.validate().is_err());
    }
}
