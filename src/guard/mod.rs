use crate::config::JournalSettings;
use crate::errors::{GitbossError, Result};
use crate::git::{GitRepository, MutationLock};
use crate::journal::{OperationJournal, OperationKind};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// A commit the force-push would make unreachable from the remote branch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscardedCommit {
    pub id: String,
    pub summary: String,
}

/// What a force-push of `branch` over `remote_tip` would destroy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForcePushReport {
    pub branch: String,
    /// Local tip that would be pushed (hex commit id)
    pub local_tip: String,
    /// Remote-tracking tip that would be overwritten
    pub remote_tip: String,
    /// Commits on the remote absent from the local ancestry, oldest first
    pub discarded_commits: Vec<DiscardedCommit>,
    /// Other refs whose tips are discarded commits or descend from one
    pub downstream_refs: Vec<String>,
}

impl ForcePushReport {
    /// A fast-forward push discards nothing
    pub fn is_fast_forward(&self) -> bool {
        self.discarded_commits.is_empty()
    }
}

/// A force-push to perform through the guard
#[derive(Debug, Clone)]
pub struct ForcePushRequest {
    pub branch: String,
    /// Remote name, e.g. "origin"
    pub remote: String,
    /// Explicit acknowledgement that discarded commits may be lost from
    /// the remote (they stay pinned locally by the safety branch)
    pub allow_discard: bool,
}

/// Result of a guarded push that went through
#[derive(Debug, Clone)]
pub struct ForcePushOutcome {
    pub report: ForcePushReport,
    /// Branch pinning the pre-push remote value
    pub safety_branch: String,
    pub journal_record: u64,
}

/// Compute what force-pushing `local_ref` over `remote_ref` would discard.
/// Read-only; resolves both refs fresh.
pub fn check(repo: &GitRepository, local_ref: &str, remote_ref: &str) -> Result<ForcePushReport> {
    let local_tip = repo.resolve_commit(local_ref)?;
    let remote_tip = repo.resolve_commit(remote_ref)?;

    // Commits reachable from the remote tip but not from ours are exactly
    // what a forced update would drop
    let discarded_oids = repo.commits_between(local_tip, remote_tip)?;
    let mut discarded_commits = Vec::with_capacity(discarded_oids.len());
    for oid in &discarded_oids {
        discarded_commits.push(DiscardedCommit {
            id: oid.to_string(),
            summary: repo.commit_summary(*oid)?,
        });
    }

    let mut downstream_refs = Vec::new();
    if !discarded_oids.is_empty() {
        let discarded_set: HashSet<git2::Oid> = discarded_oids.iter().copied().collect();
        let skip = [
            format!("refs/heads/{local_ref}"),
            format!("refs/remotes/{remote_ref}"),
        ];

        for (name, tip) in repo.list_refs()? {
            if skip.contains(&name) {
                continue;
            }
            let hangs_on_discarded = discarded_set.contains(&tip)
                || discarded_oids
                    .iter()
                    .any(|&d| repo.is_descendant_of(tip, d).unwrap_or(false));
            if hangs_on_discarded {
                downstream_refs.push(name);
            }
        }
        downstream_refs.sort();
    }

    debug!(
        "Force-push check for '{}': {} discarded commit(s), {} downstream ref(s)",
        local_ref,
        discarded_commits.len(),
        downstream_refs.len()
    );

    Ok(ForcePushReport {
        branch: local_ref.to_string(),
        local_tip: local_tip.to_string(),
        remote_tip: remote_tip.to_string(),
        discarded_commits,
        downstream_refs,
    })
}

/// Perform a guarded force-push based on a prior `check` report.
///
/// Refuses when the report shows discarded commits and the request carries
/// no explicit override, or when the remote-tracking tip moved since the
/// report was taken. Before pushing, the prior remote value is pinned with
/// a timestamped safety branch and a ForcePush journal record is written,
/// so the remote state remains restorable even after the push succeeds.
pub fn guard(
    repo: &GitRepository,
    journal: &mut OperationJournal,
    settings: &JournalSettings,
    request: &ForcePushRequest,
    report: &ForcePushReport,
) -> Result<ForcePushOutcome> {
    let remote_ref = format!("{}/{}", request.remote, request.branch);

    let live_remote = repo.resolve_commit(&remote_ref)?;
    if live_remote.to_string() != report.remote_tip {
        return Err(GitbossError::ForcePushRejected {
            branch: request.branch.clone(),
            reason: format!(
                "Remote moved since check ({} -> {}); re-run the check",
                report.remote_tip, live_remote
            ),
            discarded: report.discarded_commits.len(),
        });
    }

    if !report.is_fast_forward() && !request.allow_discard {
        return Err(GitbossError::ForcePushRejected {
            branch: request.branch.clone(),
            reason: "Push would discard remote commits without an explicit override".to_string(),
            discarded: report.discarded_commits.len(),
        });
    }

    if !report.downstream_refs.is_empty() {
        warn!(
            "Force-push of '{}' strands {} downstream ref(s): {:?}",
            request.branch,
            report.downstream_refs.len(),
            report.downstream_refs
        );
    }

    let safety_branch = format!(
        "{}/prepush/{}/{}",
        settings.safety_branch_prefix,
        request.branch,
        Utc::now().format("%Y%m%d-%H%M%S")
    );
    repo.create_branch_at(&safety_branch, live_remote)?;

    let record = journal.record(repo, OperationKind::ForcePush, &request.branch)?;

    let push = {
        let _lock = MutationLock::acquire(&repo.git_dir(), "force push")?;
        repo.push_branch(&request.remote, &request.branch, true)
    };

    match push {
        Ok(()) => {
            journal.commit(record.id)?;
            info!(
                "Force-pushed '{}' to '{}'; prior remote value pinned at '{}'",
                request.branch, request.remote, safety_branch
            );
            Ok(ForcePushOutcome {
                report: report.clone(),
                safety_branch,
                journal_record: record.id,
            })
        }
        Err(e) => {
            // Nothing left the repository; unwind the bookkeeping
            journal.abandon(repo, record.id)?;
            repo.delete_branch(&safety_branch)?;
            Err(GitbossError::engine_failure(
                format!("force push of '{}'", request.branch),
                e.to_string(),
            ))
        }
    }
}
