use crate::config::{PatternSettings, TieBreak};
use crate::errors::{GitbossError, Result};
use crate::patterns::ConflictFingerprint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A previously chosen way of resolving a conflict class
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Resolution {
    KeepOurs,
    KeepTheirs,
    AppliedPatch(String),
    Custom(String),
}

impl Resolution {
    /// Whether this resolution can be replayed mechanically in-index
    pub fn is_side_selection(&self) -> bool {
        matches!(self, Resolution::KeepOurs | Resolution::KeepTheirs)
    }
}

/// How widely a pattern applies
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PatternScope {
    /// Learned for one specific file
    FileLevel,
    /// Generalized into a project-wide convention
    ProjectLevel,
}

/// A fingerprint -> resolution mapping with its confirmation history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolutionPattern {
    pub resolution: Resolution,
    /// How many times a user confirmed this exact pairing (suggestions do
    /// not count)
    pub confidence: u32,
    pub scope: PatternScope,
    /// File the pattern was first confirmed in
    pub file_path: String,
    pub created_at: DateTime<Utc>,
    pub last_confirmed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredPattern {
    fingerprint: ConflictFingerprint,
    pattern: ResolutionPattern,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    patterns: Vec<StoredPattern>,
}

/// Content-addressed memory of user-confirmed conflict resolutions.
///
/// Entries are never silently overwritten: a conflicting resolution for the
/// same fingerprint creates a competing entry, and `lookup` surfaces both,
/// ranked. Nothing is deleted automatically; `prune_below_confidence` is an
/// explicit maintenance action.
pub struct PatternStore {
    path: PathBuf,
    patterns: Vec<StoredPattern>,
}

impl PatternStore {
    /// Open the store for a repository, empty if no store file exists yet.
    /// A corrupt store fails here without affecting the journal.
    pub fn open(git_dir: &Path) -> Result<Self> {
        let path = crate::config::state_dir(git_dir)?.join("patterns.json");

        let file = if path.exists() {
            let json = std::fs::read_to_string(&path)
                .map_err(|e| GitbossError::store(format!("Failed to read pattern store: {e}")))?;
            serde_json::from_str::<StoreFile>(&json)
                .map_err(|e| GitbossError::store(format!("Failed to parse pattern store: {e}")))?
        } else {
            StoreFile::default()
        };

        debug!(
            "Opened pattern store with {} entr(ies) at {:?}",
            file.patterns.len(),
            path
        );

        Ok(Self {
            path,
            patterns: file.patterns,
        })
    }

    /// All patterns matching a fingerprint, best first: confidence
    /// descending, ProjectLevel before FileLevel on ties, then the
    /// configured tie-break. Project-level patterns match by shape, so they
    /// apply across files. A miss is not an error; it returns an empty
    /// sequence and callers fall back to manual prediction.
    pub fn lookup(
        &self,
        fingerprint: &ConflictFingerprint,
        settings: &PatternSettings,
    ) -> Vec<ResolutionPattern> {
        let mut matches: Vec<&StoredPattern> = self
            .patterns
            .iter()
            .filter(|p| {
                p.fingerprint.digest == fingerprint.digest
                    || (p.pattern.scope == PatternScope::ProjectLevel
                        && p.fingerprint.shape == fingerprint.shape)
            })
            .collect();

        matches.sort_by(|a, b| {
            b.pattern
                .confidence
                .cmp(&a.pattern.confidence)
                .then_with(|| scope_rank(a.pattern.scope).cmp(&scope_rank(b.pattern.scope)))
                .then_with(|| match settings.tie_break {
                    TieBreak::Recency => b
                        .pattern
                        .last_confirmed_at
                        .cmp(&a.pattern.last_confirmed_at),
                    TieBreak::FilePath => a.pattern.file_path.cmp(&b.pattern.file_path),
                })
        });

        matches.into_iter().map(|p| p.pattern.clone()).collect()
    }

    /// Record a user-confirmed resolution. An exact (fingerprint,
    /// resolution) match gains confidence; a disagreeing resolution becomes
    /// a competing entry alongside the existing one.
    pub fn record_confirmation(
        &mut self,
        fingerprint: &ConflictFingerprint,
        resolution: Resolution,
        scope: PatternScope,
        file_path: &str,
    ) -> Result<ResolutionPattern> {
        let now = Utc::now();

        if let Some(existing) = self.patterns.iter_mut().find(|p| {
            p.fingerprint.digest == fingerprint.digest && p.pattern.resolution == resolution
        }) {
            existing.pattern.confidence += 1;
            existing.pattern.last_confirmed_at = now;
            if scope == PatternScope::ProjectLevel {
                existing.pattern.scope = PatternScope::ProjectLevel;
            }
            let updated = existing.pattern.clone();
            self.save()?;
            debug!(
                "Confirmed pattern {} (confidence {})",
                fingerprint.short(),
                updated.confidence
            );
            return Ok(updated);
        }

        let pattern = ResolutionPattern {
            resolution,
            confidence: 1,
            scope,
            file_path: file_path.to_string(),
            created_at: now,
            last_confirmed_at: now,
        };
        self.patterns.push(StoredPattern {
            fingerprint: fingerprint.clone(),
            pattern: pattern.clone(),
        });
        self.save()?;

        debug!("New pattern {} for '{}'", fingerprint.short(), file_path);
        Ok(pattern)
    }

    /// Promote file-level patterns to project-level conventions: the same
    /// (shape, resolution) pairing confirmed at or above the configured
    /// confidence threshold across enough distinct files becomes
    /// project-wide. Each promotion decision is all-or-nothing and the pass
    /// is idempotent, so it can be cancelled and rerun safely. Returns the
    /// number of promotions made.
    pub fn generalize(&mut self, settings: &PatternSettings) -> Result<usize> {
        // A (shape, resolution) pairing is promoted at most once; pairings
        // that already have a project-level entry are settled.
        let already_promoted: std::collections::HashSet<(String, Resolution)> = self
            .patterns
            .iter()
            .filter(|p| p.pattern.scope == PatternScope::ProjectLevel)
            .map(|p| (p.fingerprint.shape.clone(), p.pattern.resolution.clone()))
            .collect();

        // (shape, resolution) -> indices of file-level members
        let mut groups: HashMap<(String, Resolution), Vec<usize>> = HashMap::new();
        for (idx, stored) in self.patterns.iter().enumerate() {
            if stored.pattern.scope == PatternScope::FileLevel {
                groups
                    .entry((
                        stored.fingerprint.shape.clone(),
                        stored.pattern.resolution.clone(),
                    ))
                    .or_default()
                    .push(idx);
            }
        }

        let mut promoted = 0;
        for ((shape, resolution), indices) in groups {
            if already_promoted.contains(&(shape.clone(), resolution.clone())) {
                continue;
            }
            let distinct_files: std::collections::HashSet<&str> = indices
                .iter()
                .map(|&i| self.patterns[i].pattern.file_path.as_str())
                .collect();
            if distinct_files.len() < settings.promotion_min_files {
                continue;
            }

            let best = indices
                .iter()
                .copied()
                .max_by_key(|&i| self.patterns[i].pattern.confidence)
                .expect("group is non-empty");

            if self.patterns[best].pattern.confidence < settings.promotion_threshold {
                continue;
            }

            self.patterns[best].pattern.scope = PatternScope::ProjectLevel;
            promoted += 1;
            info!(
                "Promoted pattern shape {} to project level",
                &shape[..12.min(shape.len())]
            );
        }

        if promoted > 0 {
            self.save()?;
        }
        Ok(promoted)
    }

    /// Explicit, user-triggered maintenance: drop entries below a
    /// confidence floor. Returns how many were removed.
    pub fn prune_below_confidence(&mut self, floor: u32) -> Result<usize> {
        let before = self.patterns.len();
        self.patterns.retain(|p| p.pattern.confidence >= floor);
        let removed = before - self.patterns.len();
        if removed > 0 {
            self.save()?;
            info!("Pruned {} pattern(s) below confidence {}", removed, floor);
        }
        Ok(removed)
    }

    /// Historical conflict density over a set of paths: the fraction of
    /// them with at least one confirmed pattern on record. Competing
    /// entries on one file count that file once, so the result stays in
    /// 0.0..=1.0. Unknown paths contribute zero, so a branch with no
    /// recorded history scores 0.0.
    pub fn conflict_density(&self, paths: &[String]) -> f64 {
        if paths.is_empty() {
            return 0.0;
        }
        let matched: std::collections::HashSet<&str> = self
            .patterns
            .iter()
            .map(|p| p.pattern.file_path.as_str())
            .filter(|file| paths.iter().any(|path| path == file))
            .collect();
        matched.len() as f64 / paths.len() as f64
    }

    /// Number of stored patterns
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    fn save(&self) -> Result<()> {
        let file = StoreFile {
            patterns: self.patterns.clone(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| GitbossError::store(format!("Failed to serialize pattern store: {e}")))?;
        std::fs::write(&self.path, json)
            .map_err(|e| GitbossError::store(format!("Failed to write pattern store: {e}")))?;
        Ok(())
    }
}

fn scope_rank(scope: PatternScope) -> u8 {
    match scope {
        PatternScope::ProjectLevel => 0,
        PatternScope::FileLevel => 1,
    }
}
