pub mod advisor;
pub mod fingerprint;
pub mod store;

pub use advisor::{ConflictContext, NoAdvisor, ResolutionAdvisor};
pub use fingerprint::ConflictFingerprint;
pub use store::{PatternScope, PatternStore, Resolution, ResolutionPattern};
