use crate::patterns::{ConflictFingerprint, Resolution, ResolutionPattern};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What to simulate: replaying `branch` onto `onto`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationRequest {
    pub branch: String,
    pub onto: String,
}

/// Predicted outcome of replaying one commit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StepPrediction {
    NoConflict,
    /// Every conflict in the step matched a stored pattern; carries the
    /// highest-confidence one
    AutoResolvable(ResolutionPattern),
    /// At least one conflict has no stored pattern
    Manual,
}

/// One predicted conflict within a step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepConflict {
    pub path: String,
    pub fingerprint: ConflictFingerprint,
    /// Best-ranked stored pattern for this fingerprint, if any
    pub suggested: Option<ResolutionPattern>,
    /// Unconfirmed candidate from an external advisor. Surfaced for the
    /// user, never auto-applied, and never affects the prediction.
    pub advisory: Option<Resolution>,
}

/// One commit-application step of a plan
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanStep {
    /// Commit to replay (hex id)
    pub commit: String,
    pub summary: String,
    pub prediction: StepPrediction,
    pub conflicts: Vec<StepConflict>,
}

/// An immutable, simulated rebase: the predicted per-commit outcomes plus
/// the repository state the prediction was made against. Execution
/// re-validates the recorded tips before applying anything, since state may
/// have changed between simulation and execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebasePlan {
    pub id: Uuid,
    pub branch: String,
    pub onto: String,
    /// Tip of `branch` at simulation time
    pub branch_tip: String,
    /// Tip of `onto` at simulation time
    pub onto_tip: String,
    pub steps: Vec<PlanStep>,
    /// Set when any replayed commit is reachable from a configured
    /// protected ref; a warning, not an error
    pub rewrites_public_history: bool,
}

impl RebasePlan {
    /// Steps predicted to conflict (auto-resolvable or manual)
    pub fn conflicted_steps(&self) -> impl Iterator<Item = (usize, &PlanStep)> {
        self.steps
            .iter()
            .enumerate()
            .filter(|(_, s)| s.prediction != StepPrediction::NoConflict)
    }

    /// Whether the whole plan is predicted to apply without manual input
    pub fn fully_automatic(&self) -> bool {
        self.steps
            .iter()
            .all(|s| s.prediction != StepPrediction::Manual)
    }

    /// Whether execution can finish without suspending: every predicted
    /// conflict carries a side-selection pattern that is replayed
    /// mechanically in-index. Patch-bodied patterns still suspend for
    /// confirmation even when the step is predicted auto-resolvable.
    pub fn mechanically_executable(&self) -> bool {
        self.steps.iter().all(|s| {
            s.conflicts.iter().all(|c| {
                c.suggested
                    .as_ref()
                    .is_some_and(|p| p.resolution.is_side_selection())
            })
        })
    }
}
