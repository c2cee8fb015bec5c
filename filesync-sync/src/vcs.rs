//! Version-control seam: the [`VersionControlBackend`] capability and the
//! explicit [`WorkingTree`] handle every tree-touching operation receives.
//!
//! Production code uses the `git` CLI implementation from `filesync-remote`;
//! tests use [`crate::fakes::MemoryBackend`].

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;

use filesync_core::RepoName;

/// Failures reported by a [`VersionControlBackend`].
#[derive(Debug, Error)]
pub enum VcsError {
    #[error("ref '{reference}' does not exist in {repo}")]
    RefNotFound { repo: String, reference: String },

    #[error("{repo} is unreachable: {reason}")]
    Unreachable { repo: String, reason: String },

    #[error("`{command}` failed: {detail}")]
    Command { command: String, detail: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Handle on the target repository's working tree. Passed explicitly instead
/// of relying on the process's current directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingTree {
    root: PathBuf,
}

impl WorkingTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a tree-relative path.
    pub fn join(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative)
    }
}

/// What to materialize for one source repository.
#[derive(Debug, Clone)]
pub struct CheckoutRequest<'a> {
    pub repo: &'a RepoName,
    /// `None` checks out the remote's default branch.
    pub reference: Option<&'a str>,
    pub token: Option<&'a str>,
    /// Empty directory to populate.
    pub dest: &'a Path,
    /// Only the tip commit is needed (no log scan follows).
    pub shallow: bool,
}

/// Clone/checkout/commit/push, abstracted so the publish state machine is
/// testable without spawning processes.
pub trait VersionControlBackend: Send + Sync {
    /// Populate `request.dest` with the repository content at the pinned ref.
    fn checkout_ref(&self, request: &CheckoutRequest<'_>) -> Result<(), VcsError>;

    /// Subject lines of commits on the repository's **default branch** since
    /// `since`, restricted to `paths`. `checkout` is the directory previously
    /// populated by [`checkout_ref`](Self::checkout_ref).
    fn log_subjects(
        &self,
        repo: &RepoName,
        checkout: &Path,
        paths: &[PathBuf],
        since: DateTime<Utc>,
    ) -> Result<Vec<String>, VcsError>;

    fn current_branch(&self, tree: &WorkingTree) -> Result<String, VcsError>;

    /// Create (or reset) `branch` at `base` and check it out.
    fn create_branch_from(&self, tree: &WorkingTree, branch: &str, base: &str)
        -> Result<(), VcsError>;

    /// Fetch `origin/<branch>` and check it out tracking the remote.
    /// Returns `Ok(false)` when the remote branch does not exist.
    fn fetch_remote_branch(&self, tree: &WorkingTree, branch: &str) -> Result<bool, VcsError>;

    fn stage_all(&self, tree: &WorkingTree) -> Result<(), VcsError>;

    /// Whether the staged index differs from the last commit.
    fn diff_has_changes(&self, tree: &WorkingTree) -> Result<bool, VcsError>;

    fn commit(&self, tree: &WorkingTree, message: &str) -> Result<(), VcsError>;

    fn push(&self, tree: &WorkingTree, branch: &str) -> Result<(), VcsError>;
}
