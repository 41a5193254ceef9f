use crate::patterns::{ConflictFingerprint, Resolution};

/// Everything an advisor gets to see about one conflict
#[derive(Debug)]
pub struct ConflictContext<'a> {
    pub fingerprint: &'a ConflictFingerprint,
    pub path: &'a str,
    pub ours: &'a str,
    pub theirs: &'a str,
}

/// Capability interface for an external suggestion source (e.g. an AI
/// narration/generation service).
///
/// A suggestion is only ever a candidate: it enters the pattern store
/// through `PatternStore::record_confirmation` after the user confirms it,
/// exactly like a manually chosen resolution. Nothing in this crate
/// auto-applies an advisor's output, so correctness never depends on the
/// quality of the suggestions.
pub trait ResolutionAdvisor {
    /// A candidate resolution for the conflict, or `None` when the advisor
    /// has nothing useful to say
    fn suggest(&self, context: &ConflictContext<'_>) -> Option<Resolution>;
}

/// Advisor that never suggests anything; the default when no external
/// service is wired in
pub struct NoAdvisor;

impl ResolutionAdvisor for NoAdvisor {
    fn suggest(&self, _context: &ConflictContext<'_>) -> Option<Resolution> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysOurs;

    impl ResolutionAdvisor for AlwaysOurs {
        fn suggest(&self, _context: &ConflictContext<'_>) -> Option<Resolution> {
            Some(Resolution::KeepOurs)
        }
    }

    #[test]
    fn test_advisor_output_is_a_candidate_only() {
        let fingerprint = ConflictFingerprint::from_conflict("a.txt", "ours", "theirs");
        let context = ConflictContext {
            fingerprint: &fingerprint,
            path: "a.txt",
            ours: "ours",
            theirs: "theirs",
        };

        assert_eq!(AlwaysOurs.suggest(&context), Some(Resolution::KeepOurs));
        assert_eq!(NoAdvisor.suggest(&context), None);
    }
}
