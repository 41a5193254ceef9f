pub mod execution;
pub mod plan;

pub use execution::{RebaseExecution, RebaseState};
pub use plan::{PlanStep, RebasePlan, SimulationRequest, StepConflict, StepPrediction};

use crate::config::GitbossConfig;
use crate::errors::Result;
use crate::git::GitRepository;
use crate::patterns::{
    ConflictContext, ConflictFingerprint, NoAdvisor, PatternStore, ResolutionAdvisor,
};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// Predict the per-commit conflict surface of a rebase without mutating
/// any repository state.
///
/// Idempotent and side-effect-free: on an unchanged repository, two calls
/// yield plans with identical steps, classifications and fingerprints
/// (plan ids differ; a plan's identity is per simulation). Only
/// garbage-collectable objects are ever written.
pub fn simulate(
    repo: &GitRepository,
    store: &PatternStore,
    config: &GitbossConfig,
    request: &SimulationRequest,
) -> Result<RebasePlan> {
    simulate_with_advisor(repo, store, &NoAdvisor, config, request)
}

/// `simulate`, additionally asking an external advisor for candidates on
/// conflicts the store has never seen. Candidates ride along on the step
/// as advisory text; they enter the store only after user confirmation.
pub fn simulate_with_advisor(
    repo: &GitRepository,
    store: &PatternStore,
    advisor: &dyn ResolutionAdvisor,
    config: &GitbossConfig,
    request: &SimulationRequest,
) -> Result<RebasePlan> {
    let branch_tip = repo.resolve_commit(&request.branch)?;
    let onto_tip = repo.resolve_commit(&request.onto)?;

    let commits = repo.commits_between(onto_tip, branch_tip)?;
    debug!(
        "Simulating rebase of '{}' onto '{}': {} commit(s)",
        request.branch,
        request.onto,
        commits.len()
    );

    let rewrites_public_history = replays_protected_commits(repo, config, &commits)?;

    let mut steps = Vec::with_capacity(commits.len());
    let mut current_tree = repo.tree_of_commit(onto_tip)?;

    for commit in commits {
        let base_tree = repo.parent_tree_of_commit(commit)?;
        let theirs_tree = repo.tree_of_commit(commit)?;

        let outcome = repo.three_way_merge(base_tree, current_tree, theirs_tree)?;
        let summary = repo.commit_summary(commit)?;

        if outcome.is_clean() {
            current_tree = outcome.merged_tree.expect("clean merge has a tree");
            steps.push(PlanStep {
                commit: commit.to_string(),
                summary,
                prediction: StepPrediction::NoConflict,
                conflicts: Vec::new(),
            });
            continue;
        }

        // Rename-normalize conflicted paths against the commit's own diff
        let renames = rename_map(repo, commit)?;

        let mut conflicts = Vec::new();
        let mut all_matched = true;
        for file_conflict in &outcome.conflicts {
            let path = renames
                .get(&file_conflict.path)
                .cloned()
                .unwrap_or_else(|| file_conflict.path.clone());
            let fingerprint = ConflictFingerprint::from_conflict(
                &path,
                file_conflict.ours.as_deref().unwrap_or(""),
                file_conflict.theirs.as_deref().unwrap_or(""),
            );

            let suggested = store.lookup(&fingerprint, &config.patterns).into_iter().next();
            let advisory = if suggested.is_none() {
                all_matched = false;
                advisor.suggest(&ConflictContext {
                    fingerprint: &fingerprint,
                    path: &path,
                    ours: file_conflict.ours.as_deref().unwrap_or(""),
                    theirs: file_conflict.theirs.as_deref().unwrap_or(""),
                })
            } else {
                None
            };

            conflicts.push(StepConflict {
                path: file_conflict.path.clone(),
                fingerprint,
                suggested,
                advisory,
            });
        }

        let prediction = if all_matched {
            let best = conflicts
                .iter()
                .filter_map(|c| c.suggested.clone())
                .max_by_key(|p| p.confidence)
                .expect("all conflicts matched a pattern");
            StepPrediction::AutoResolvable(best)
        } else {
            StepPrediction::Manual
        };

        steps.push(PlanStep {
            commit: commit.to_string(),
            summary,
            prediction,
            conflicts,
        });

        // Keep walking past the conflict for later-step prediction
        current_tree = outcome.ours_favored_tree;
    }

    Ok(RebasePlan {
        id: Uuid::new_v4(),
        branch: request.branch.clone(),
        onto: request.onto.clone(),
        branch_tip: branch_tip.to_string(),
        onto_tip: onto_tip.to_string(),
        steps,
        rewrites_public_history,
    })
}

/// Whether any replayed commit is reachable from a configured protected
/// ref. A structured warning on the plan, never an error.
fn replays_protected_commits(
    repo: &GitRepository,
    config: &GitbossConfig,
    commits: &[git2::Oid],
) -> Result<bool> {
    for protected in &config.git.protected_refs {
        let Ok(tip) = repo.resolve_commit(protected) else {
            continue;
        };
        for &commit in commits {
            if repo.is_descendant_of(tip, commit)? {
                debug!(
                    "Commit {} is reachable from protected ref '{}'",
                    commit, protected
                );
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn rename_map(repo: &GitRepository, commit: git2::Oid) -> Result<HashMap<String, String>> {
    let Some(parent) = repo.first_parent(commit)? else {
        return Ok(HashMap::new());
    };

    let mut map = HashMap::new();
    for changed in repo.changed_paths_since(parent, commit)? {
        if let Some(old) = changed.old_path {
            map.insert(changed.path, old);
        }
    }
    Ok(map)
}
