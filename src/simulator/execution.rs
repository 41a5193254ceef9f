use crate::errors::{GitbossError, Result};
use crate::git::{CherryPickOutcome, ConflictChoice, GitRepository, MutationLock, RepositoryMode};
use crate::journal::{OperationJournal, OperationKind};
use crate::patterns::Resolution;
use crate::simulator::plan::RebasePlan;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

const STATE_FILE: &str = "REBASE_STATE";

/// Rebase execution states. `Conflicted` is not terminal: a resolution
/// moves it back to `InProgress`, an abort to `Aborted`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RebaseState {
    NotStarted,
    InProgress,
    Completed,
    Conflicted,
    Aborted,
}

impl RebaseState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RebaseState::Completed | RebaseState::Aborted)
    }
}

/// Durable execution of a simulated plan.
///
/// Commits are replayed in the object database only; the branch ref moves
/// exactly once, at completion, inside the mutation lock. The execution
/// persists itself before every suspension point, so a conflict wait can
/// span process restarts: reload with `resume`, feed resolutions with
/// `resolve_current`, then `run` again.
#[derive(Debug, Serialize, Deserialize)]
pub struct RebaseExecution {
    plan: RebasePlan,
    pub state: RebaseState,
    /// Index of the step currently being applied
    pub current_step: usize,
    /// Tip of the replayed history so far (hex commit id)
    new_head: Option<String>,
    /// Journal record covering this execution
    journal_record: Option<u64>,
    /// User-supplied resolutions for the current conflicted step
    manual_choices: HashMap<String, ConflictChoice>,
}

impl RebaseExecution {
    /// Take exclusive ownership of a simulated plan for execution
    pub fn new(plan: RebasePlan) -> Self {
        Self {
            plan,
            state: RebaseState::NotStarted,
            current_step: 0,
            new_head: None,
            journal_record: None,
            manual_choices: HashMap::new(),
        }
    }

    pub fn plan(&self) -> &RebasePlan {
        &self.plan
    }

    /// Reload a suspended execution after a process restart, re-validating
    /// that the persisted plan still matches live repository state
    pub fn resume(repo: &GitRepository, git_dir: &Path) -> Result<Self> {
        if !Self::exists(git_dir) {
            return Err(GitbossError::plan_desynchronized(
                "No persisted rebase execution found",
            ));
        }

        let execution = Self::load(git_dir)?;
        execution.validate_against_live(repo)?;

        debug!(
            "Resumed rebase execution for plan {} at step {}",
            execution.plan.id, execution.current_step
        );
        Ok(execution)
    }

    /// Drive the execution forward until it completes, suspends on a
    /// conflict, or fails. Safe to call again after `resolve_current`.
    pub fn run(
        &mut self,
        repo: &GitRepository,
        journal: &mut OperationJournal,
    ) -> Result<RebaseState> {
        match self.state {
            RebaseState::NotStarted | RebaseState::InProgress => {}
            RebaseState::Conflicted => {
                return Err(GitbossError::validation(
                    "Execution is conflicted; resolve the current step or abort first",
                ));
            }
            _ => {
                return Err(GitbossError::validation(format!(
                    "Execution already finished (state: {:?})",
                    self.state
                )));
            }
        }

        self.validate_against_live(repo)?;
        let git_dir = repo.git_dir();

        if self.state == RebaseState::NotStarted {
            let record = journal.record(repo, OperationKind::Rebase, &self.plan.branch)?;
            self.journal_record = Some(record.id);
            self.new_head = Some(self.plan.onto_tip.clone());
            self.state = RebaseState::InProgress;
            self.save(&git_dir)?;
        }

        while self.current_step < self.plan.steps.len() {
            let step = &self.plan.steps[self.current_step];
            let commit = git2::Oid::from_str(&step.commit)
                .map_err(|e| GitbossError::plan_desynchronized(format!("Corrupt plan: {e}")))?;
            let onto = self.head_oid()?;

            let mut choices = self.manual_choices.clone();
            for conflict in &step.conflicts {
                if choices.contains_key(&conflict.path) {
                    continue;
                }
                // Only side selections are replayed mechanically; a
                // patch-bodied pattern stays a suggestion and suspends
                match conflict.suggested.as_ref().map(|p| &p.resolution) {
                    Some(Resolution::KeepOurs) => {
                        choices.insert(conflict.path.clone(), ConflictChoice::Ours);
                    }
                    Some(Resolution::KeepTheirs) => {
                        choices.insert(conflict.path.clone(), ConflictChoice::Theirs);
                    }
                    _ => {}
                }
            }

            match repo.apply_commit_onto(onto, commit, &choices)? {
                CherryPickOutcome::Applied { commit: new_commit } => {
                    debug!(
                        "Step {}/{} applied: {}",
                        self.current_step + 1,
                        self.plan.steps.len(),
                        new_commit
                    );
                    self.new_head = Some(new_commit.to_string());
                    self.current_step += 1;
                    self.manual_choices.clear();
                    self.save(&git_dir)?;
                }
                CherryPickOutcome::Conflicted { conflicts } => {
                    info!(
                        "Step {}/{} conflicted on {} file(s); suspending",
                        self.current_step + 1,
                        self.plan.steps.len(),
                        conflicts.len()
                    );
                    self.state = RebaseState::Conflicted;
                    self.save(&git_dir)?;
                    return Ok(RebaseState::Conflicted);
                }
            }
        }

        self.finish(repo, journal)
    }

    /// Supply resolutions for the current conflicted step
    /// (Conflicted -> InProgress)
    pub fn resolve_current(
        &mut self,
        git_dir: &Path,
        choices: HashMap<String, ConflictChoice>,
    ) -> Result<()> {
        if self.state != RebaseState::Conflicted {
            return Err(GitbossError::validation(format!(
                "No conflicted step to resolve (state: {:?})",
                self.state
            )));
        }
        self.manual_choices = choices;
        self.state = RebaseState::InProgress;
        self.save(git_dir)
    }

    /// Abort the execution. No ref has moved, so this only abandons the
    /// journal record and clears the persisted state.
    pub fn abort(&mut self, repo: &GitRepository, journal: &mut OperationJournal) -> Result<()> {
        if self.state.is_terminal() {
            return Err(GitbossError::validation(format!(
                "Execution already finished (state: {:?})",
                self.state
            )));
        }

        if let Some(id) = self.journal_record {
            journal.abandon(repo, id)?;
        }
        self.state = RebaseState::Aborted;
        Self::delete(&repo.git_dir())?;

        info!("Aborted rebase of '{}'", self.plan.branch);
        Ok(())
    }

    /// Abort, additionally requiring the originating safety branch to
    /// still exist so the pre-rebase state provably survives
    pub fn abort_safely(
        &mut self,
        repo: &GitRepository,
        journal: &mut OperationJournal,
    ) -> Result<()> {
        let id = self.journal_record.ok_or_else(|| {
            GitbossError::validation("Execution has no journal record; nothing was started")
        })?;
        let record = journal
            .get(id)
            .ok_or_else(|| GitbossError::journal(format!("No record with id {id}")))?;

        let safety = record.safety_branch.clone().ok_or_else(|| {
            GitbossError::journal(format!("Record {id} has no safety branch"))
        })?;
        if !repo.branch_exists(&safety) {
            return Err(GitbossError::journal(format!(
                "Safety branch '{safety}' no longer exists; cannot abort safely"
            )));
        }

        self.abort(repo, journal)
    }

    /// All steps applied: move the branch ref, exactly once, under the
    /// mutation lock
    fn finish(
        &mut self,
        repo: &GitRepository,
        journal: &mut OperationJournal,
    ) -> Result<RebaseState> {
        let id = self
            .journal_record
            .ok_or_else(|| GitbossError::journal("Execution lost its journal record"))?;
        let new_head = self.head_oid()?;

        let update = {
            let _lock = MutationLock::acquire(&repo.git_dir(), "rebase finish")?;
            repo.update_branch(
                &self.plan.branch,
                new_head,
                &format!("gitboss rebase onto {}", self.plan.onto),
            )
        };

        match update {
            Ok(()) => {
                journal.commit(id)?;
                self.state = RebaseState::Completed;
                Self::delete(&repo.git_dir())?;
                info!(
                    "Rebase of '{}' onto '{}' completed at {}",
                    self.plan.branch, self.plan.onto, new_head
                );
                Ok(RebaseState::Completed)
            }
            Err(e) => {
                // The mutation never happened; roll the record back
                journal.abandon(repo, id)?;
                self.state = RebaseState::Aborted;
                Self::delete(&repo.git_dir())?;
                Err(GitbossError::engine_failure(
                    format!("rebase of '{}'", self.plan.branch),
                    e.to_string(),
                ))
            }
        }
    }

    /// The persisted plan must still match live state: the branch tip is
    /// untouched until completion, and no foreign operation may be in
    /// flight in the repository.
    fn validate_against_live(&self, repo: &GitRepository) -> Result<()> {
        let mode = repo.mode();
        if mode != RepositoryMode::Normal {
            return Err(GitbossError::plan_desynchronized(format!(
                "Repository is in {mode:?} state"
            )));
        }

        let live_branch = repo.resolve_commit(&self.plan.branch)?;
        if live_branch.to_string() != self.plan.branch_tip {
            return Err(GitbossError::plan_desynchronized(format!(
                "Branch '{}' moved since simulation ({} -> {})",
                self.plan.branch, self.plan.branch_tip, live_branch
            )));
        }

        if self.state == RebaseState::NotStarted {
            let live_onto = repo.resolve_commit(&self.plan.onto)?;
            if live_onto.to_string() != self.plan.onto_tip {
                return Err(GitbossError::plan_desynchronized(format!(
                    "Target '{}' moved since simulation ({} -> {})",
                    self.plan.onto, self.plan.onto_tip, live_onto
                )));
            }
        }

        Ok(())
    }

    fn head_oid(&self) -> Result<git2::Oid> {
        let head = self
            .new_head
            .as_ref()
            .ok_or_else(|| GitbossError::journal("Execution has no replay head yet"))?;
        git2::Oid::from_str(head)
            .map_err(|e| GitbossError::plan_desynchronized(format!("Corrupt replay head: {e}")))
    }

    /// Persist the execution so a conflict wait can outlive the process
    pub fn save(&self, git_dir: &Path) -> Result<()> {
        let path = crate::config::state_dir(git_dir)?.join(STATE_FILE);
        let json = serde_json::to_string_pretty(self).map_err(|e| {
            GitbossError::config(format!("Failed to serialize rebase state: {e}"))
        })?;
        std::fs::write(&path, json)
            .map_err(|e| GitbossError::config(format!("Failed to write rebase state: {e}")))?;
        debug!("Saved rebase state to {:?}", path);
        Ok(())
    }

    /// Load persisted execution state
    pub fn load(git_dir: &Path) -> Result<Self> {
        let path = crate::config::state_dir(git_dir)?.join(STATE_FILE);
        let json = std::fs::read_to_string(&path)
            .map_err(|e| GitbossError::config(format!("Failed to read rebase state: {e}")))?;
        let execution: Self = serde_json::from_str(&json)
            .map_err(|e| GitbossError::config(format!("Failed to parse rebase state: {e}")))?;
        Ok(execution)
    }

    /// Remove persisted execution state
    pub fn delete(git_dir: &Path) -> Result<()> {
        let path = crate::config::state_dir(git_dir)?.join(STATE_FILE);
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| {
                GitbossError::config(format!("Failed to delete rebase state: {e}"))
            })?;
            debug!("Deleted rebase state file");
        }
        Ok(())
    }

    /// Check whether a persisted execution exists
    pub fn exists(git_dir: &Path) -> bool {
        git_dir
            .join(crate::config::STATE_DIR)
            .join(STATE_FILE)
            .exists()
    }
}
