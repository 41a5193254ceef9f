pub mod lock;
pub mod repository;

pub use lock::MutationLock;
pub use repository::{
    ChangedPath, CherryPickOutcome, ConflictChoice, FileConflict, GitRepository, MergeOutcome,
    RepositoryInfo, RepositoryMode,
};
