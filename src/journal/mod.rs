use crate::config::JournalSettings;
use crate::errors::{GitbossError, Result};
use crate::git::{GitRepository, MutationLock};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Kind of user-initiated mutating action
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OperationKind {
    Rebase,
    Reset,
    Checkout,
    Amend,
    ForcePush,
    Other,
}

impl OperationKind {
    /// A checkout only moves HEAD and is trivially reversible through the
    /// reflog; everything else gets a GC-proof safety branch.
    fn needs_safety_branch(self) -> bool {
        !matches!(self, OperationKind::Checkout)
    }
}

/// Lifecycle of a journal record
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OperationStatus {
    /// Recorded, engine has not confirmed success yet
    Pending,
    /// Engine confirmed the mutation
    Applied,
    /// Never happened, or undone via rewind
    RolledBack,
}

/// One entry per destructive operation, carrying enough state to restore
/// the branch it mutated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRecord {
    /// Monotonically increasing, ordering-significant
    pub id: u64,
    pub kind: OperationKind,
    pub timestamp: DateTime<Utc>,
    /// Commit the affected branch pointed to immediately before the
    /// operation
    pub preceding_ref: String,
    /// Branch pinning `preceding_ref` so it survives garbage collection
    pub safety_branch: Option<String>,
    pub affected_branch: String,
    pub status: OperationStatus,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct JournalFile {
    next_id: u64,
    records: Vec<OperationRecord>,
}

/// Append-only log of destructive operations, the "undo anything" stack.
///
/// Records are totally ordered by id. Per branch they form a stack: only
/// the newest still-applied record may be rewound in one step, and
/// `rewind_through` cascades through intermediate records newest-first.
pub struct OperationJournal {
    path: PathBuf,
    safety_branch_prefix: String,
    next_id: u64,
    records: Vec<OperationRecord>,
}

impl OperationJournal {
    /// Open the journal for a repository, creating an empty one if no
    /// journal file exists yet. A corrupt journal fails here without
    /// affecting any other store.
    pub fn open(git_dir: &Path, settings: &JournalSettings) -> Result<Self> {
        let path = crate::config::state_dir(git_dir)?.join("journal.json");

        let file = if path.exists() {
            let json = std::fs::read_to_string(&path)
                .map_err(|e| GitbossError::journal(format!("Failed to read journal: {e}")))?;
            serde_json::from_str::<JournalFile>(&json)
                .map_err(|e| GitbossError::journal(format!("Failed to parse journal: {e}")))?
        } else {
            JournalFile::default()
        };

        debug!(
            "Opened journal with {} record(s) at {:?}",
            file.records.len(),
            path
        );

        Ok(Self {
            path,
            safety_branch_prefix: settings.safety_branch_prefix.clone(),
            next_id: file.next_id,
            records: file.records,
        })
    }

    /// Record a mutating intent about to be executed: snapshot the branch
    /// tip, pin it with a safety branch, append a Pending record.
    pub fn record(
        &mut self,
        repo: &GitRepository,
        kind: OperationKind,
        branch: &str,
    ) -> Result<OperationRecord> {
        let preceding = repo.get_branch_head(branch)?;
        let id = self.next_id;

        let safety_branch = if kind.needs_safety_branch() {
            let name = format!("{}/undo/{}/{}", self.safety_branch_prefix, id, branch);
            repo.create_branch_at(&name, preceding)?;
            Some(name)
        } else {
            None
        };

        let record = OperationRecord {
            id,
            kind,
            timestamp: Utc::now(),
            preceding_ref: preceding.to_string(),
            safety_branch,
            affected_branch: branch.to_string(),
            status: OperationStatus::Pending,
        };

        self.next_id += 1;
        self.records.push(record.clone());
        self.save()?;

        info!(
            "Journal record {} ({:?}) for branch '{}' at {}",
            id, kind, branch, preceding
        );
        Ok(record)
    }

    /// Mark a record Applied after the engine confirmed success
    pub fn commit(&mut self, id: u64) -> Result<()> {
        let record = self.get_mut(id)?;
        if record.status != OperationStatus::Pending {
            return Err(GitbossError::journal(format!(
                "Record {id} is not pending (status: {:?})",
                record.status
            )));
        }
        record.status = OperationStatus::Applied;
        self.save()
    }

    /// The engine mutation failed: the record is rolled back immediately
    /// and its safety branch deleted, since the mutation never happened.
    pub fn abandon(&mut self, repo: &GitRepository, id: u64) -> Result<()> {
        let record = self.get_mut(id)?;
        if record.status != OperationStatus::Pending {
            return Err(GitbossError::journal(format!(
                "Record {id} is not pending (status: {:?})",
                record.status
            )));
        }
        record.status = OperationStatus::RolledBack;
        let safety = record.safety_branch.take();
        self.save()?;

        if let Some(name) = safety {
            let _lock = MutationLock::acquire(&repo.git_dir(), "journal abandon")?;
            repo.delete_branch(&name)?;
        }
        Ok(())
    }

    /// Restore the affected branch to its pre-operation commit using the
    /// safety branch (not the prunable reflog), then mark the record
    /// RolledBack.
    ///
    /// Fails with `StaleRewind` when a higher-id record on the same branch
    /// is still Applied; those must be rewound first.
    pub fn rewind(&mut self, repo: &GitRepository, id: u64) -> Result<OperationRecord> {
        let record = self
            .records
            .iter()
            .find(|r| r.id == id)
            .ok_or_else(|| GitbossError::journal(format!("No record with id {id}")))?
            .clone();

        if record.status != OperationStatus::Applied {
            return Err(GitbossError::journal(format!(
                "Record {id} cannot be rewound (status: {:?})",
                record.status
            )));
        }

        let blocking: Vec<u64> = self
            .records
            .iter()
            .filter(|r| {
                r.affected_branch == record.affected_branch
                    && r.id > id
                    && r.status == OperationStatus::Applied
            })
            .map(|r| r.id)
            .collect();

        if !blocking.is_empty() {
            return Err(GitbossError::StaleRewind {
                requested: id,
                blocking,
                branch: record.affected_branch,
            });
        }

        let target = git2::Oid::from_str(&record.preceding_ref)
            .map_err(|e| GitbossError::journal(format!("Corrupt preceding ref: {e}")))?;

        {
            let _lock = MutationLock::acquire(&repo.git_dir(), "journal rewind")?;
            repo.update_branch(
                &record.affected_branch,
                target,
                &format!("gitboss rewind of record {id}"),
            )?;
            if let Some(name) = &record.safety_branch {
                repo.delete_branch(name)?;
            }
        }

        let stored = self.get_mut(id)?;
        stored.status = OperationStatus::RolledBack;
        stored.safety_branch = None;
        let rolled_back = stored.clone();
        self.save()?;

        info!(
            "Rewound record {} on '{}' to {}",
            id, rolled_back.affected_branch, rolled_back.preceding_ref
        );
        Ok(rolled_back)
    }

    /// Cascading unwind: rewinds every Applied record on the target's
    /// branch with id >= `id`, newest first (browser-history semantics).
    pub fn rewind_through(&mut self, repo: &GitRepository, id: u64) -> Result<Vec<OperationRecord>> {
        let branch = self
            .records
            .iter()
            .find(|r| r.id == id)
            .ok_or_else(|| GitbossError::journal(format!("No record with id {id}")))?
            .affected_branch
            .clone();

        let mut to_rewind: Vec<u64> = self
            .records
            .iter()
            .filter(|r| {
                r.affected_branch == branch && r.id >= id && r.status == OperationStatus::Applied
            })
            .map(|r| r.id)
            .collect();
        to_rewind.sort_unstable_by(|a, b| b.cmp(a));

        let mut rolled_back = Vec::new();
        for rid in to_rewind {
            rolled_back.push(self.rewind(repo, rid)?);
        }
        Ok(rolled_back)
    }

    /// Newest still-applied record for a branch, if any
    pub fn top_applied(&self, branch: &str) -> Option<&OperationRecord> {
        self.records
            .iter()
            .filter(|r| r.affected_branch == branch && r.status == OperationStatus::Applied)
            .max_by_key(|r| r.id)
    }

    /// Look up a record by id
    pub fn get(&self, id: u64) -> Option<&OperationRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// All records, oldest first
    pub fn records(&self) -> &[OperationRecord] {
        &self.records
    }

    fn get_mut(&mut self, id: u64) -> Result<&mut OperationRecord> {
        self.records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| GitbossError::journal(format!("No record with id {id}")))
    }

    fn save(&self) -> Result<()> {
        let file = JournalFile {
            next_id: self.next_id,
            records: self.records.clone(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| GitbossError::journal(format!("Failed to serialize journal: {e}")))?;
        std::fs::write(&self.path, json)
            .map_err(|e| GitbossError::journal(format!("Failed to write journal: {e}")))?;
        debug!("Saved journal ({} records)", self.records.len());
        Ok(())
    }
}
