use crate::errors::{GitbossError, Result};
use git2::{Oid, Repository, RepositoryState, Signature};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Stage bits of `git2::IndexEntry::flags`; cleared when promoting a
/// conflict-stage entry back to a regular (stage 0) entry.
const INDEX_ENTRY_STAGE_MASK: u16 = 0x3000;

/// What state the repository is in, beyond a plain branch checkout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryMode {
    Normal,
    Detached,
    RebaseInProgress,
    BisectInProgress,
    /// Merge, revert, cherry-pick or mailbox application in flight
    OtherOperation,
}

/// Repository information snapshot
#[derive(Debug, Clone)]
pub struct RepositoryInfo {
    pub path: PathBuf,
    pub head_branch: Option<String>,
    pub head_commit: Option<String>,
    pub mode: RepositoryMode,
    pub is_dirty: bool,
}

/// One conflicted file from an in-memory three-way merge. Contents are the
/// full blob from each side; absent sides mean the file was deleted there.
#[derive(Debug, Clone)]
pub struct FileConflict {
    pub path: String,
    pub ancestor: Option<String>,
    pub ours: Option<String>,
    pub theirs: Option<String>,
}

/// Result of an in-memory three-way tree merge
#[derive(Debug)]
pub struct MergeOutcome {
    /// Clean merge result; `None` when conflicts were found
    pub merged_tree: Option<Oid>,
    pub conflicts: Vec<FileConflict>,
    /// Tree produced by resolving every conflict toward "ours"; lets a
    /// simulation keep walking past a conflicted step without mutating
    /// anything
    pub ours_favored_tree: Oid,
}

impl MergeOutcome {
    pub fn is_clean(&self) -> bool {
        self.merged_tree.is_some()
    }
}

/// How to settle one conflicted path in-index
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ConflictChoice {
    /// Keep our side (a missing our-side entry means the file is deleted)
    Ours,
    /// Keep their side
    Theirs,
    /// Replace the file with explicit content (manual or patch-based
    /// resolution)
    Content(String),
}

/// Result of replaying one commit onto another, entirely in the object
/// database (no working tree, no ref movement)
#[derive(Debug)]
pub enum CherryPickOutcome {
    Applied { commit: Oid },
    Conflicted { conflicts: Vec<FileConflict> },
}

/// A path modified between two commits, with rename detection applied
#[derive(Debug, Clone)]
pub struct ChangedPath {
    pub path: String,
    /// Pre-rename path when the engine's diff detected a rename
    pub old_path: Option<String>,
}

/// Wrapper around git2::Repository. All repository reads and mutations in
/// this crate go through here; callers never shell out or parse Git output.
pub struct GitRepository {
    repo: Repository,
    path: PathBuf,
}

impl GitRepository {
    /// Open a Git repository at the given path
    pub fn open(path: &Path) -> Result<Self> {
        let repo = Repository::discover(path)
            .map_err(|e| GitbossError::config(format!("Not a git repository: {e}")))?;

        let workdir = repo
            .workdir()
            .ok_or_else(|| GitbossError::config("Repository has no working directory"))?
            .to_path_buf();

        Ok(Self {
            repo,
            path: workdir,
        })
    }

    /// Get a repository state snapshot
    pub fn get_info(&self) -> Result<RepositoryInfo> {
        Ok(RepositoryInfo {
            path: self.path.clone(),
            head_branch: self.get_current_branch().ok(),
            head_commit: self.get_head_commit_hash().ok(),
            mode: self.mode(),
            is_dirty: self.is_dirty()?,
        })
    }

    /// What state the repository is in
    pub fn mode(&self) -> RepositoryMode {
        match self.repo.state() {
            RepositoryState::Rebase
            | RepositoryState::RebaseInteractive
            | RepositoryState::RebaseMerge => RepositoryMode::RebaseInProgress,
            RepositoryState::Bisect => RepositoryMode::BisectInProgress,
            RepositoryState::Clean => {
                if self.repo.head_detached().unwrap_or(false) {
                    RepositoryMode::Detached
                } else {
                    RepositoryMode::Normal
                }
            }
            _ => RepositoryMode::OtherOperation,
        }
    }

    /// Get the current branch name
    pub fn get_current_branch(&self) -> Result<String> {
        let head = self
            .repo
            .head()
            .map_err(|e| GitbossError::branch(format!("Could not get HEAD: {e}")))?;

        if let Some(name) = head.shorthand() {
            Ok(name.to_string())
        } else {
            let commit = head
                .peel_to_commit()
                .map_err(|e| GitbossError::branch(format!("Could not get HEAD commit: {e}")))?;
            Ok(format!("HEAD@{}", commit.id()))
        }
    }

    /// Get the HEAD commit hash
    pub fn get_head_commit_hash(&self) -> Result<String> {
        let head = self
            .repo
            .head()
            .map_err(|e| GitbossError::branch(format!("Could not get HEAD: {e}")))?;

        let commit = head
            .peel_to_commit()
            .map_err(|e| GitbossError::branch(format!("Could not get HEAD commit: {e}")))?;

        Ok(commit.id().to_string())
    }

    /// Check if the working directory is dirty (staged or unstaged changes)
    pub fn is_dirty(&self) -> Result<bool> {
        let statuses = self.repo.statuses(None).map_err(GitbossError::Git)?;

        for status in statuses.iter() {
            let flags = status.status();

            if flags.intersects(
                git2::Status::INDEX_MODIFIED
                    | git2::Status::INDEX_NEW
                    | git2::Status::INDEX_DELETED
                    | git2::Status::WT_MODIFIED
                    | git2::Status::WT_NEW
                    | git2::Status::WT_DELETED,
            ) {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// List all local branches
    pub fn list_branches(&self) -> Result<Vec<String>> {
        let branches = self
            .repo
            .branches(Some(git2::BranchType::Local))
            .map_err(GitbossError::Git)?;

        let mut branch_names = Vec::new();
        for branch in branches {
            let (branch, _) = branch.map_err(GitbossError::Git)?;
            if let Some(name) = branch.name().map_err(GitbossError::Git)? {
                branch_names.push(name.to_string());
            }
        }

        Ok(branch_names)
    }

    /// List every ref (branches, tags, remote-tracking) with its tip commit
    pub fn list_refs(&self) -> Result<Vec<(String, Oid)>> {
        let mut refs = Vec::new();
        for reference in self.repo.references().map_err(GitbossError::Git)? {
            let reference = reference.map_err(GitbossError::Git)?;
            let name = match reference.name() {
                Some(name) => name.to_string(),
                None => continue,
            };
            if let Ok(commit) = reference.peel_to_commit() {
                refs.push((name, commit.id()));
            }
        }
        Ok(refs)
    }

    /// Check if a local branch exists
    pub fn branch_exists(&self, name: &str) -> bool {
        self.repo.find_branch(name, git2::BranchType::Local).is_ok()
    }

    /// Get the tip commit of a branch without switching to it
    pub fn get_branch_head(&self, branch_name: &str) -> Result<Oid> {
        let branch = self
            .repo
            .find_branch(branch_name, git2::BranchType::Local)
            .map_err(|e| {
                GitbossError::branch(format!("Could not find branch '{branch_name}': {e}"))
            })?;

        let commit = branch.get().peel_to_commit().map_err(|e| {
            GitbossError::branch(format!("Could not get commit for branch '{branch_name}': {e}"))
        })?;

        Ok(commit.id())
    }

    /// Resolve a branch name, tag, remote-tracking ref or commit hash to a
    /// commit id
    pub fn resolve_commit(&self, reference: &str) -> Result<Oid> {
        if let Ok(oid) = Oid::from_str(reference) {
            if self.repo.find_commit(oid).is_ok() {
                return Ok(oid);
            }
        }

        let obj = self
            .repo
            .revparse_single(reference)
            .map_err(|e| GitbossError::branch(format!("Could not resolve '{reference}': {e}")))?;

        let commit = obj.peel_to_commit().map_err(|e| {
            GitbossError::branch(format!("'{reference}' does not point to a commit: {e}"))
        })?;

        Ok(commit.id())
    }

    /// Create a branch pointing at a specific commit. Fails if the branch
    /// already exists.
    pub fn create_branch_at(&self, name: &str, target: Oid) -> Result<()> {
        let commit = self.repo.find_commit(target).map_err(GitbossError::Git)?;

        self.repo.branch(name, &commit, false).map_err(|e| {
            GitbossError::branch(format!("Could not create branch '{name}': {e}"))
        })?;

        info!("Created branch '{}' at {}", name, target);
        Ok(())
    }

    /// Reassign an existing branch ref to a new target
    pub fn update_branch(&self, name: &str, target: Oid, reason: &str) -> Result<()> {
        let mut reference = self
            .repo
            .find_reference(&format!("refs/heads/{name}"))
            .map_err(|e| GitbossError::branch(format!("Could not find branch '{name}': {e}")))?;

        reference
            .set_target(target, reason)
            .map_err(|e| GitbossError::branch(format!("Could not update branch '{name}': {e}")))?;

        info!("Updated branch '{}' -> {} ({})", name, target, reason);
        Ok(())
    }

    /// Delete a local branch
    pub fn delete_branch(&self, name: &str) -> Result<()> {
        let mut branch = self
            .repo
            .find_branch(name, git2::BranchType::Local)
            .map_err(|e| GitbossError::branch(format!("Could not find branch '{name}': {e}")))?;

        branch
            .delete()
            .map_err(|e| GitbossError::branch(format!("Could not delete branch '{name}': {e}")))?;

        info!("Deleted branch '{}'", name);
        Ok(())
    }

    /// Switch the working tree to a branch
    pub fn checkout_branch(&self, name: &str) -> Result<()> {
        let branch = self
            .repo
            .find_branch(name, git2::BranchType::Local)
            .map_err(|e| GitbossError::branch(format!("Could not find branch '{name}': {e}")))?;

        let tree = branch.get().peel_to_tree().map_err(|e| {
            GitbossError::branch(format!("Could not get tree for branch '{name}': {e}"))
        })?;

        self.repo
            .checkout_tree(tree.as_object(), None)
            .map_err(|e| GitbossError::branch(format!("Could not checkout '{name}': {e}")))?;

        self.repo
            .set_head(&format!("refs/heads/{name}"))
            .map_err(|e| GitbossError::branch(format!("Could not update HEAD to '{name}': {e}")))?;

        info!("Switched to branch '{}'", name);
        Ok(())
    }

    /// Commits ahead/behind between a branch and a base ref
    pub fn ahead_behind(&self, branch: &str, base: &str) -> Result<(usize, usize)> {
        let local = self.resolve_commit(branch)?;
        let upstream = self.resolve_commit(base)?;

        self.repo
            .graph_ahead_behind(local, upstream)
            .map_err(GitbossError::Git)
    }

    /// Whether `commit` descends from (or equals) `ancestor`
    pub fn is_descendant_of(&self, commit: Oid, ancestor: Oid) -> Result<bool> {
        if commit == ancestor {
            return Ok(true);
        }
        self.repo
            .graph_descendant_of(commit, ancestor)
            .map_err(GitbossError::Git)
    }

    /// Merge base of two commits
    pub fn merge_base(&self, a: Oid, b: Oid) -> Result<Oid> {
        self.repo.merge_base(a, b).map_err(GitbossError::Git)
    }

    /// Commits reachable from `tip` but not from `from`, oldest first
    pub fn commits_between(&self, from: Oid, tip: Oid) -> Result<Vec<Oid>> {
        let mut revwalk = self.repo.revwalk().map_err(GitbossError::Git)?;
        revwalk.push(tip).map_err(GitbossError::Git)?;
        revwalk.hide(from).map_err(GitbossError::Git)?;

        let mut commits = Vec::new();
        for oid in revwalk {
            commits.push(oid.map_err(GitbossError::Git)?);
        }
        commits.reverse();
        Ok(commits)
    }

    /// Short summary line of a commit message
    pub fn commit_summary(&self, commit: Oid) -> Result<String> {
        let commit = self.repo.find_commit(commit).map_err(GitbossError::Git)?;
        Ok(commit.summary().unwrap_or_default().to_string())
    }

    /// Tree id of a commit
    pub fn tree_of_commit(&self, commit: Oid) -> Result<Oid> {
        let commit = self.repo.find_commit(commit).map_err(GitbossError::Git)?;
        Ok(commit.tree_id())
    }

    /// First parent of a commit; `None` for a root commit
    pub fn first_parent(&self, commit: Oid) -> Result<Option<Oid>> {
        let commit = self.repo.find_commit(commit).map_err(GitbossError::Git)?;
        if commit.parent_count() == 0 {
            Ok(None)
        } else {
            Ok(Some(commit.parent_id(0).map_err(GitbossError::Git)?))
        }
    }

    /// Tree id of a commit's first parent; `None` for a root commit
    pub fn parent_tree_of_commit(&self, commit: Oid) -> Result<Option<Oid>> {
        let commit = self.repo.find_commit(commit).map_err(GitbossError::Git)?;
        if commit.parent_count() == 0 {
            Ok(None)
        } else {
            Ok(Some(commit.parent(0).map_err(GitbossError::Git)?.tree_id()))
        }
    }

    /// Paths changed between two commits, with rename detection
    pub fn changed_paths_since(&self, base: Oid, tip: Oid) -> Result<Vec<ChangedPath>> {
        let base_tree = self
            .repo
            .find_commit(base)
            .and_then(|c| c.tree())
            .map_err(GitbossError::Git)?;
        let tip_tree = self
            .repo
            .find_commit(tip)
            .and_then(|c| c.tree())
            .map_err(GitbossError::Git)?;

        let mut diff = self
            .repo
            .diff_tree_to_tree(Some(&base_tree), Some(&tip_tree), None)
            .map_err(GitbossError::Git)?;

        let mut find_opts = git2::DiffFindOptions::new();
        find_opts.renames(true);
        diff.find_similar(Some(&mut find_opts))
            .map_err(GitbossError::Git)?;

        let mut changed = Vec::new();
        for delta in diff.deltas() {
            let Some(path) = delta
                .new_file()
                .path()
                .map(|p| p.to_string_lossy().into_owned())
            else {
                continue;
            };
            let old_path = if delta.status() == git2::Delta::Renamed {
                delta
                    .old_file()
                    .path()
                    .map(|p| p.to_string_lossy().into_owned())
            } else {
                None
            };
            changed.push(ChangedPath { path, old_path });
        }

        Ok(changed)
    }

    /// Three-way merge of trees, entirely in memory. No working-tree or
    /// ref mutation; only (garbage-collectable) objects are written.
    pub fn three_way_merge(
        &self,
        base_tree: Option<Oid>,
        ours_tree: Oid,
        theirs_tree: Oid,
    ) -> Result<MergeOutcome> {
        let base = match base_tree {
            Some(id) => self.repo.find_tree(id).map_err(GitbossError::Git)?,
            None => self.empty_tree()?,
        };
        let ours = self.repo.find_tree(ours_tree).map_err(GitbossError::Git)?;
        let theirs = self
            .repo
            .find_tree(theirs_tree)
            .map_err(GitbossError::Git)?;

        let mut index = self
            .repo
            .merge_trees(&base, &ours, &theirs, None)
            .map_err(GitbossError::Git)?;

        if !index.has_conflicts() {
            let merged = index.write_tree_to(&self.repo).map_err(GitbossError::Git)?;
            return Ok(MergeOutcome {
                merged_tree: Some(merged),
                conflicts: Vec::new(),
                ours_favored_tree: merged,
            });
        }

        let conflicts = self.collect_conflicts(&index)?;

        // Redo the merge favoring our side so callers can keep walking a
        // multi-step simulation past this conflict.
        let mut opts = git2::MergeOptions::new();
        opts.file_favor(git2::FileFavor::Ours);
        let mut favored = self
            .repo
            .merge_trees(&base, &ours, &theirs, Some(&opts))
            .map_err(GitbossError::Git)?;

        // file_favor only settles content conflicts; delete/modify pairs
        // still come back conflicted and are settled toward ours here.
        if favored.has_conflicts() {
            let leftovers = Self::owned_conflicts(&favored)?;
            for conflict in leftovers {
                self.resolve_index_conflict(&mut favored, conflict, ConflictChoice::Ours)?;
            }
        }
        let ours_favored_tree = favored
            .write_tree_to(&self.repo)
            .map_err(GitbossError::Git)?;

        Ok(MergeOutcome {
            merged_tree: None,
            conflicts,
            ours_favored_tree,
        })
    }

    /// Replay a commit onto another commit in the object database, creating
    /// a new commit object. `choices` settles conflicted paths; any
    /// conflicted path without a choice leaves the step conflicted. Never
    /// moves a ref or touches the working tree.
    pub fn apply_commit_onto(
        &self,
        onto: Oid,
        commit: Oid,
        choices: &HashMap<String, ConflictChoice>,
    ) -> Result<CherryPickOutcome> {
        debug!("Applying {} onto {}", commit, onto);

        let onto_commit = self.repo.find_commit(onto).map_err(GitbossError::Git)?;
        let source = self.repo.find_commit(commit).map_err(GitbossError::Git)?;

        let base = match self.parent_tree_of_commit(commit)? {
            Some(id) => self.repo.find_tree(id).map_err(GitbossError::Git)?,
            None => self.empty_tree()?,
        };
        let ours = onto_commit.tree().map_err(GitbossError::Git)?;
        let theirs = source.tree().map_err(GitbossError::Git)?;

        let mut index = self
            .repo
            .merge_trees(&base, &ours, &theirs, None)
            .map_err(GitbossError::Git)?;

        if index.has_conflicts() {
            let conflicts = Self::owned_conflicts(&index)?;
            let mut unresolved = Vec::new();

            for conflict in conflicts {
                let path = Self::conflict_path(&conflict);
                match choices.get(&path) {
                    Some(choice) => {
                        self.resolve_index_conflict(&mut index, conflict, choice.clone())?;
                    }
                    None => unresolved.push(conflict),
                }
            }

            if !unresolved.is_empty() {
                let mut details = Vec::new();
                for conflict in &unresolved {
                    details.push(FileConflict {
                        path: Self::conflict_path(conflict),
                        ancestor: self.entry_content(conflict.ancestor.as_ref())?,
                        ours: self.entry_content(conflict.our.as_ref())?,
                        theirs: self.entry_content(conflict.their.as_ref())?,
                    });
                }
                return Ok(CherryPickOutcome::Conflicted { conflicts: details });
            }
        }

        let tree_id = index.write_tree_to(&self.repo).map_err(GitbossError::Git)?;
        let tree = self.repo.find_tree(tree_id).map_err(GitbossError::Git)?;

        let author = source.author();
        let committer = self.signature()?;
        let message = source.message().unwrap_or_default();

        let new_commit = self
            .repo
            .commit(None, &author, &committer, message, &tree, &[&onto_commit])
            .map_err(GitbossError::Git)?;

        debug!("Applied {} -> {}", commit, new_commit);
        Ok(CherryPickOutcome::Applied { commit: new_commit })
    }

    /// Push a branch to a remote, optionally forced
    pub fn push_branch(&self, remote_name: &str, branch: &str, force: bool) -> Result<()> {
        info!(
            "Pushing branch '{}' to '{}' (force: {})",
            branch, remote_name, force
        );

        let mut remote = self.repo.find_remote(remote_name).map_err(|e| {
            GitbossError::branch(format!("No remote '{remote_name}' found: {e}"))
        })?;

        let refspec = if force {
            format!("+refs/heads/{branch}:refs/heads/{branch}")
        } else {
            format!("refs/heads/{branch}:refs/heads/{branch}")
        };

        let mut callbacks = git2::RemoteCallbacks::new();
        callbacks.credentials(|_url, username_from_url, _allowed_types| {
            if let Some(username) = username_from_url {
                git2::Cred::ssh_key_from_agent(username)
            } else {
                git2::Cred::default()
            }
        });

        let mut push_options = git2::PushOptions::new();
        push_options.remote_callbacks(callbacks);

        remote
            .push(&[&refspec], Some(&mut push_options))
            .map_err(|e| GitbossError::EngineFailure {
                operation: format!("push {branch}"),
                reason: e.to_string(),
            })?;

        info!("Push of '{}' completed", branch);
        Ok(())
    }

    /// Repository working directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Per-repository git directory (where durable state files live)
    pub fn git_dir(&self) -> PathBuf {
        self.repo.path().to_path_buf()
    }

    /// Get a signature for commits created by this crate
    pub fn signature(&self) -> Result<Signature<'static>> {
        if let Ok(config) = self.repo.config() {
            if let (Ok(name), Ok(email)) = (
                config.get_string("user.name"),
                config.get_string("user.email"),
            ) {
                return Signature::now(&name, &email).map_err(GitbossError::Git);
            }
        }

        Signature::now("GitBoss", "gitboss@example.com").map_err(GitbossError::Git)
    }

    fn empty_tree(&self) -> Result<git2::Tree<'_>> {
        let oid = self
            .repo
            .treebuilder(None)
            .and_then(|b| b.write())
            .map_err(GitbossError::Git)?;
        self.repo.find_tree(oid).map_err(GitbossError::Git)
    }

    fn entry_content(&self, entry: Option<&git2::IndexEntry>) -> Result<Option<String>> {
        match entry {
            Some(e) => {
                let blob = self.repo.find_blob(e.id).map_err(GitbossError::Git)?;
                Ok(Some(String::from_utf8_lossy(blob.content()).into_owned()))
            }
            None => Ok(None),
        }
    }

    fn collect_conflicts(&self, index: &git2::Index) -> Result<Vec<FileConflict>> {
        let mut conflicts = Vec::new();
        for conflict in index.conflicts().map_err(GitbossError::Git)? {
            let conflict = conflict.map_err(GitbossError::Git)?;
            conflicts.push(FileConflict {
                path: Self::conflict_path(&conflict),
                ancestor: self.entry_content(conflict.ancestor.as_ref())?,
                ours: self.entry_content(conflict.our.as_ref())?,
                theirs: self.entry_content(conflict.their.as_ref())?,
            });
        }
        Ok(conflicts)
    }

    fn owned_conflicts(index: &git2::Index) -> Result<Vec<git2::IndexConflict>> {
        let mut out = Vec::new();
        for conflict in index.conflicts().map_err(GitbossError::Git)? {
            out.push(conflict.map_err(GitbossError::Git)?);
        }
        Ok(out)
    }

    fn conflict_path(conflict: &git2::IndexConflict) -> String {
        conflict
            .our
            .as_ref()
            .or(conflict.their.as_ref())
            .or(conflict.ancestor.as_ref())
            .map(|e| String::from_utf8_lossy(&e.path).into_owned())
            .unwrap_or_default()
    }

    /// Settle one conflicted path. A missing entry on a chosen side means
    /// that side deleted the file, so the path is removed.
    fn resolve_index_conflict(
        &self,
        index: &mut git2::Index,
        conflict: git2::IndexConflict,
        choice: ConflictChoice,
    ) -> Result<()> {
        let template = conflict
            .our
            .as_ref()
            .or(conflict.their.as_ref())
            .or(conflict.ancestor.as_ref())
            .map(|e| (e.path.clone(), e.mode, e.flags));
        let Some((path_bytes, mode, flags)) = template else {
            return Ok(());
        };
        let path_str = String::from_utf8_lossy(&path_bytes).into_owned();

        index
            .remove_path(Path::new(&path_str))
            .map_err(GitbossError::Git)?;

        match choice {
            ConflictChoice::Ours | ConflictChoice::Theirs => {
                let chosen = if choice == ConflictChoice::Ours {
                    conflict.our
                } else {
                    conflict.their
                };
                if let Some(mut entry) = chosen {
                    entry.flags &= !INDEX_ENTRY_STAGE_MASK;
                    index.add(&entry).map_err(GitbossError::Git)?;
                }
            }
            ConflictChoice::Content(content) => {
                let blob = self
                    .repo
                    .blob(content.as_bytes())
                    .map_err(GitbossError::Git)?;
                let entry = git2::IndexEntry {
                    ctime: git2::IndexTime::new(0, 0),
                    mtime: git2::IndexTime::new(0, 0),
                    dev: 0,
                    ino: 0,
                    mode,
                    uid: 0,
                    gid: 0,
                    file_size: content.len() as u32,
                    id: blob,
                    flags: flags & !INDEX_ENTRY_STAGE_MASK,
                    flags_extended: 0,
                    path: path_bytes,
                };
                index.add(&entry).map_err(GitbossError::Git)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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

    fn create_commit(repo_path: &Path, message: &str, filename: &str, content: &str) {
        std::fs::write(repo_path.join(filename), content).unwrap();
        Command::new("git")
            .args(["add", filename])
            .current_dir(repo_path)
            .output()
            .unwrap();
        Command::new("git")
            .args(["commit", "-m", message])
            .current_dir(repo_path)
            .output()
            .unwrap();
    }

    #[test]
    fn test_repository_info() {
        let (_temp_dir, repo_path) = create_test_repo();
        let repo = GitRepository::open(&repo_path).unwrap();

        let info = repo.get_info().unwrap();
        assert!(!info.is_dirty);
        assert_eq!(info.mode, RepositoryMode::Normal);
        assert_eq!(info.head_branch, Some("main".to_string()));
        assert!(info.head_commit.is_some());
    }

    #[test]
    fn test_branch_ref_lifecycle() {
        let (_temp_dir, repo_path) = create_test_repo();
        let repo = GitRepository::open(&repo_path).unwrap();

        let head = repo.resolve_commit("main").unwrap();
        repo.create_branch_at("pinned", head).unwrap();
        assert!(repo.branch_exists("pinned"));
        assert_eq!(repo.get_branch_head("pinned").unwrap(), head);

        create_commit(&repo_path, "Second", "a.txt", "a\n");
        let new_head = repo.resolve_commit("main").unwrap();
        assert_ne!(head, new_head);

        repo.update_branch("pinned", new_head, "test move").unwrap();
        assert_eq!(repo.get_branch_head("pinned").unwrap(), new_head);

        repo.delete_branch("pinned").unwrap();
        assert!(!repo.branch_exists("pinned"));
    }

    #[test]
    fn test_ahead_behind() {
        let (_temp_dir, repo_path) = create_test_repo();
        let repo = GitRepository::open(&repo_path).unwrap();

        Command::new("git")
            .args(["checkout", "-b", "feature"])
            .current_dir(&repo_path)
            .output()
            .unwrap();
        create_commit(&repo_path, "F1", "f1.txt", "f1\n");
        create_commit(&repo_path, "F2", "f2.txt", "f2\n");

        let (ahead, behind) = repo.ahead_behind("feature", "main").unwrap();
        assert_eq!((ahead, behind), (2, 0));

        Command::new("git")
            .args(["checkout", "main"])
            .current_dir(&repo_path)
            .output()
            .unwrap();
        create_commit(&repo_path, "M1", "m1.txt", "m1\n");

        let (ahead, behind) = repo.ahead_behind("feature", "main").unwrap();
        assert_eq!((ahead, behind), (2, 1));
    }

    #[test]
    fn test_commits_between_oldest_first() {
        let (_temp_dir, repo_path) = create_test_repo();
        let repo = GitRepository::open(&repo_path).unwrap();

        let base = repo.resolve_commit("main").unwrap();
        create_commit(&repo_path, "One", "one.txt", "1\n");
        create_commit(&repo_path, "Two", "two.txt", "2\n");
        let tip = repo.resolve_commit("main").unwrap();

        let commits = repo.commits_between(base, tip).unwrap();
        assert_eq!(commits.len(), 2);
        assert_eq!(repo.commit_summary(commits[0]).unwrap(), "One");
        assert_eq!(repo.commit_summary(commits[1]).unwrap(), "Two");
    }

    #[test]
    fn test_three_way_merge_detects_conflicts() {
        let (_temp_dir, repo_path) = create_test_repo();
        let repo = GitRepository::open(&repo_path).unwrap();

        create_commit(&repo_path, "Base file", "shared.txt", "line one\n");
        let base = repo.resolve_commit("main").unwrap();

        Command::new("git")
            .args(["checkout", "-b", "side"])
            .current_dir(&repo_path)
            .output()
            .unwrap();
        create_commit(&repo_path, "Side edit", "shared.txt", "side version\n");
        let theirs = repo.resolve_commit("side").unwrap();

        Command::new("git")
            .args(["checkout", "main"])
            .current_dir(&repo_path)
            .output()
            .unwrap();
        create_commit(&repo_path, "Main edit", "shared.txt", "main version\n");
        let ours = repo.resolve_commit("main").unwrap();

        let outcome = repo
            .three_way_merge(
                Some(repo.tree_of_commit(base).unwrap()),
                repo.tree_of_commit(ours).unwrap(),
                repo.tree_of_commit(theirs).unwrap(),
            )
            .unwrap();

        assert!(!outcome.is_clean());
        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.conflicts[0].path, "shared.txt");
        assert_eq!(
            outcome.conflicts[0].ours.as_deref(),
            Some("main version\n")
        );
        assert_eq!(
            outcome.conflicts[0].theirs.as_deref(),
            Some("side version\n")
        );
    }

    #[test]
    fn test_apply_commit_onto_clean() {
        let (_temp_dir, repo_path) = create_test_repo();
        let repo = GitRepository::open(&repo_path).unwrap();

        let onto = repo.resolve_commit("main").unwrap();

        Command::new("git")
            .args(["checkout", "-b", "feature"])
            .current_dir(&repo_path)
            .output()
            .unwrap();
        create_commit(&repo_path, "Add file", "new.txt", "content\n");
        let commit = repo.resolve_commit("feature").unwrap();

        let outcome = repo
            .apply_commit_onto(onto, commit, &HashMap::new())
            .unwrap();
        match outcome {
            CherryPickOutcome::Applied { commit: new_commit } => {
                assert_ne!(new_commit, commit);
                assert_eq!(repo.commit_summary(new_commit).unwrap(), "Add file");
            }
            CherryPickOutcome::Conflicted { .. } => panic!("expected clean apply"),
        }
        // The feature branch itself is untouched
        assert_eq!(repo.get_branch_head("feature").unwrap(), commit);
    }

    #[test]
    fn test_apply_commit_onto_with_side_choice() {
        let (_temp_dir, repo_path) = create_test_repo();
        let repo = GitRepository::open(&repo_path).unwrap();

        create_commit(&repo_path, "Base", "shared.txt", "base\n");

        Command::new("git")
            .args(["checkout", "-b", "feature"])
            .current_dir(&repo_path)
            .output()
            .unwrap();
        create_commit(&repo_path, "Feature edit", "shared.txt", "feature\n");
        let feature_commit = repo.resolve_commit("feature").unwrap();

        Command::new("git")
            .args(["checkout", "main"])
            .current_dir(&repo_path)
            .output()
            .unwrap();
        create_commit(&repo_path, "Main edit", "shared.txt", "main\n");
        let onto = repo.resolve_commit("main").unwrap();

        // Without a choice the step is conflicted
        let outcome = repo
            .apply_commit_onto(onto, feature_commit, &HashMap::new())
            .unwrap();
        assert!(matches!(outcome, CherryPickOutcome::Conflicted { .. }));

        // Choosing theirs replays the feature edit
        let mut choices = HashMap::new();
        choices.insert("shared.txt".to_string(), ConflictChoice::Theirs);
        let outcome = repo
            .apply_commit_onto(onto, feature_commit, &choices)
            .unwrap();
        assert!(matches!(outcome, CherryPickOutcome::Applied { .. }));
    }
}
