use gitboss_core::config::JournalSettings;
use gitboss_core::git::GitRepository;
use gitboss_core::journal::{OperationJournal, OperationKind, OperationStatus};
use gitboss_core::patterns::{
    ConflictFingerprint, PatternScope, PatternStore, Resolution,
};
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn create_test_repo() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let repo_path = temp_dir.path().to_path_buf();

    Command::new("git")
        .args(["init", "-b", "main"])
        .current_dir(&repo_path)
        .output()
        .unwrap();
    Command::new("git")
        .args(["config", "user.name", "Test"])
        .current_dir(&repo_path)
        .output()
        .unwrap();
    Command::new("git")
        .args(["config", "user.email", "test@test.com"])
        .current_dir(&repo_path)
        .output()
        .unwrap();

    std::fs::write(repo_path.join("README.md"), "# Test").unwrap();
    Command::new("git")
        .args(["add", "."])
        .current_dir(&repo_path)
        .output()
        .unwrap();
    Command::new("git")
        .args(["commit", "-m", "Initial commit"])
        .current_dir(&repo_path)
        .output()
        .unwrap();

    (temp_dir, repo_path)
}

fn corrupt_state_file(git_dir: &Path, name: &str) {
    let dir = git_dir.join("gitboss");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(name), "{ not json at all").unwrap();
}

#[test]
fn corrupt_pattern_store_does_not_block_the_journal() {
    let (_temp_dir, repo_path) = create_test_repo();
    let repo = GitRepository::open(&repo_path).unwrap();

    corrupt_state_file(&repo.git_dir(), "patterns.json");
    assert!(PatternStore::open(&repo.git_dir()).is_err());

    // The journal loads and takes mutations regardless
    let mut journal =
        OperationJournal::open(&repo.git_dir(), &JournalSettings::default()).unwrap();
    let before = repo.get_branch_head("main").unwrap();
    let record = journal
        .record(&repo, OperationKind::Reset, "main")
        .unwrap();
    journal.commit(record.id).unwrap();

    journal.rewind(&repo, record.id).unwrap();
    assert_eq!(repo.get_branch_head("main").unwrap(), before);
    assert_eq!(
        journal.get(record.id).unwrap().status,
        OperationStatus::RolledBack
    );
}

#[test]
fn corrupt_journal_does_not_block_the_pattern_store() {
    let (_temp_dir, repo_path) = create_test_repo();
    let repo = GitRepository::open(&repo_path).unwrap();

    corrupt_state_file(&repo.git_dir(), "journal.json");
    assert!(OperationJournal::open(&repo.git_dir(), &JournalSettings::default()).is_err());

    // The pattern store loads, records and answers lookups regardless
    let mut store = PatternStore::open(&repo.git_dir()).unwrap();
    let f = ConflictFingerprint::from_conflict("a.txt", "ours\n", "theirs\n");
    store
        .record_confirmation(&f, Resolution::KeepOurs, PatternScope::FileLevel, "a.txt")
        .unwrap();

    let results = store.lookup(&f, &gitboss_core::config::PatternSettings::default());
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].resolution, Resolution::KeepOurs);
}
