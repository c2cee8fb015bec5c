//! In-memory fakes for the collaborator traits (testing only)
//!
//! `MemoryBackend` serves source repositories from [`FakeRemote`] fixtures and
//! models the target repository's branches as file snapshots, reading and
//! writing a real working-tree directory. `MemoryTracker` keeps pull requests
//! in a `Vec`.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};

use filesync_core::RepoName;

use crate::tracker::{IssueTrackerClient, NewPullRequest, PullRequest, TrackerError};
use crate::vcs::{CheckoutRequest, VcsError, VersionControlBackend, WorkingTree};

/// Tree content keyed by tree-relative path.
pub type Snapshot = BTreeMap<PathBuf, Vec<u8>>;

// ---------------------------------------------------------------------------
// FakeRemote
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct FakeCommit {
    at: DateTime<Utc>,
    subject: String,
    paths: Vec<PathBuf>,
}

/// A source repository fixture: file content per ref plus default-branch history.
#[derive(Debug, Clone)]
pub struct FakeRemote {
    default_branch: String,
    refs: HashMap<String, Snapshot>,
    commits: Vec<FakeCommit>,
    latency: Duration,
}

impl FakeRemote {
    pub fn new(default_branch: &str) -> Self {
        let mut refs = HashMap::new();
        refs.insert(default_branch.to_string(), Snapshot::new());
        Self {
            default_branch: default_branch.to_string(),
            refs,
            commits: Vec::new(),
            latency: Duration::ZERO,
        }
    }

    pub fn with_file(mut self, reference: &str, path: &str, content: impl AsRef<[u8]>) -> Self {
        self.refs
            .entry(reference.to_string())
            .or_default()
            .insert(PathBuf::from(path), content.as_ref().to_vec());
        self
    }

    /// A default-branch commit touching `paths`.
    pub fn with_commit(mut self, at: DateTime<Utc>, subject: &str, paths: &[&str]) -> Self {
        self.commits.push(FakeCommit {
            at,
            subject: subject.to_string(),
            paths: paths.iter().map(PathBuf::from).collect(),
        });
        self
    }

    /// Sleep this long inside every checkout of this remote.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

// ---------------------------------------------------------------------------
// MemoryBackend
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct TargetState {
    current: String,
    local: HashMap<String, Snapshot>,
    remote: HashMap<String, Snapshot>,
    staged: Option<Snapshot>,
    commits: Vec<String>,
    pushes: usize,
    checkouts: Vec<String>,
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    remotes: HashMap<RepoName, FakeRemote>,
    state: Mutex<TargetState>,
    fail_push: bool,
}

impl MemoryBackend {
    /// A target repository with an empty `current_branch` checked out.
    pub fn new(current_branch: &str) -> Self {
        let mut state = TargetState {
            current: current_branch.to_string(),
            ..Default::default()
        };
        state.local.insert(current_branch.to_string(), Snapshot::new());
        Self {
            remotes: HashMap::new(),
            state: Mutex::new(state),
            fail_push: false,
        }
    }

    pub fn with_remote(mut self, repo: RepoName, remote: FakeRemote) -> Self {
        self.remotes.insert(repo, remote);
        self
    }

    pub fn fail_push(mut self) -> Self {
        self.fail_push = true;
        self
    }

    pub fn current(&self) -> String {
        self.state.lock().unwrap().current.clone()
    }

    pub fn commit_messages(&self) -> Vec<String> {
        self.state.lock().unwrap().commits.clone()
    }

    pub fn push_count(&self) -> usize {
        self.state.lock().unwrap().pushes
    }

    /// Source repositories checked out so far, in call order.
    pub fn checkouts(&self) -> Vec<String> {
        self.state.lock().unwrap().checkouts.clone()
    }

    pub fn remote_file(&self, branch: &str, path: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().unwrap();
        state.remote.get(branch)?.get(Path::new(path)).cloned()
    }
}

fn io_err(path: &Path, source: std::io::Error) -> VcsError {
    VcsError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Files under `root`, skipping `.git`.
pub fn snapshot(root: &Path) -> Result<Snapshot, VcsError> {
    fn walk(root: &Path, dir: &Path, out: &mut Snapshot) -> Result<(), VcsError> {
        for entry in std::fs::read_dir(dir).map_err(|e| io_err(dir, e))? {
            let entry = entry.map_err(|e| io_err(dir, e))?;
            let path = entry.path();
            if path.is_dir() {
                if entry.file_name() != ".git" {
                    walk(root, &path, out)?;
                }
            } else {
                let bytes = std::fs::read(&path).map_err(|e| io_err(&path, e))?;
                let rel = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
                out.insert(rel, bytes);
            }
        }
        Ok(())
    }

    let mut out = Snapshot::new();
    if root.exists() {
        walk(root, root, &mut out)?;
    }
    Ok(out)
}

fn write_snapshot(root: &Path, files: &Snapshot) -> Result<(), VcsError> {
    for (rel, bytes) in files {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        std::fs::write(&path, bytes).map_err(|e| io_err(&path, e))?;
    }
    Ok(())
}

impl VersionControlBackend for MemoryBackend {
    fn checkout_ref(&self, request: &CheckoutRequest<'_>) -> Result<(), VcsError> {
        self.state
            .lock()
            .unwrap()
            .checkouts
            .push(request.repo.full_name());
        let remote = self
            .remotes
            .get(request.repo)
            .ok_or_else(|| VcsError::Unreachable {
                repo: request.repo.full_name(),
                reason: "repository not found".into(),
            })?;
        std::thread::sleep(remote.latency);

        let reference = request.reference.unwrap_or(&remote.default_branch);
        let files = remote
            .refs
            .get(reference)
            .ok_or_else(|| VcsError::RefNotFound {
                repo: request.repo.full_name(),
                reference: reference.to_string(),
            })?;
        write_snapshot(request.dest, files)
    }

    fn log_subjects(
        &self,
        repo: &RepoName,
        _checkout: &Path,
        paths: &[PathBuf],
        since: DateTime<Utc>,
    ) -> Result<Vec<String>, VcsError> {
        let remote = self.remotes.get(repo).ok_or_else(|| VcsError::Unreachable {
            repo: repo.full_name(),
            reason: "repository not found".into(),
        })?;
        Ok(remote
            .commits
            .iter()
            .filter(|c| c.at >= since)
            .filter(|c| {
                c.paths
                    .iter()
                    .any(|touched| paths.iter().any(|p| touched.starts_with(p)))
            })
            .map(|c| c.subject.clone())
            .collect())
    }

    fn current_branch(&self, _tree: &WorkingTree) -> Result<String, VcsError> {
        Ok(self.current())
    }

    fn create_branch_from(
        &self,
        _tree: &WorkingTree,
        branch: &str,
        base: &str,
    ) -> Result<(), VcsError> {
        let mut state = self.state.lock().unwrap();
        let head = state.local.get(base).cloned().unwrap_or_default();
        state.local.insert(branch.to_string(), head);
        state.current = branch.to_string();
        Ok(())
    }

    fn fetch_remote_branch(&self, tree: &WorkingTree, branch: &str) -> Result<bool, VcsError> {
        let mut state = self.state.lock().unwrap();
        let Some(files) = state.remote.get(branch).cloned() else {
            return Ok(false);
        };
        let old_head = state.local.get(&state.current).cloned().unwrap_or_default();
        for rel in old_head.keys().filter(|rel| !files.contains_key(*rel)) {
            let path = tree.join(rel);
            if path.exists() {
                std::fs::remove_file(&path).map_err(|e| io_err(&path, e))?;
            }
        }
        write_snapshot(tree.root(), &files)?;
        state.local.insert(branch.to_string(), files);
        state.current = branch.to_string();
        Ok(true)
    }

    fn stage_all(&self, tree: &WorkingTree) -> Result<(), VcsError> {
        let files = snapshot(tree.root())?;
        self.state.lock().unwrap().staged = Some(files);
        Ok(())
    }

    fn diff_has_changes(&self, _tree: &WorkingTree) -> Result<bool, VcsError> {
        let state = self.state.lock().unwrap();
        let head = state.local.get(&state.current);
        Ok(state.staged.as_ref() != head)
    }

    fn commit(&self, _tree: &WorkingTree, message: &str) -> Result<(), VcsError> {
        let mut state = self.state.lock().unwrap();
        let staged = state.staged.clone().unwrap_or_default();
        let current = state.current.clone();
        state.local.insert(current, staged);
        state.commits.push(message.to_string());
        Ok(())
    }

    fn push(&self, _tree: &WorkingTree, branch: &str) -> Result<(), VcsError> {
        if self.fail_push {
            return Err(VcsError::Command {
                command: format!("git push origin {branch}"),
                detail: "remote rejected".into(),
            });
        }
        let mut state = self.state.lock().unwrap();
        let head = state.local.get(branch).cloned().unwrap_or_default();
        state.remote.insert(branch.to_string(), head);
        state.pushes += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryTracker
// ---------------------------------------------------------------------------

/// A pull request held by [`MemoryTracker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPull {
    pub repo: RepoName,
    pub title: String,
    pub body: String,
    pub pull: PullRequest,
}

#[derive(Debug, Default)]
pub struct MemoryTracker {
    pulls: Mutex<Vec<RecordedPull>>,
    reviewer_requests: Mutex<Vec<(u64, Vec<String>, Vec<String>)>>,
    offline: bool,
}

impl MemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an open pull request from `head` into `base`.
    pub fn with_open_pull(self, repo: RepoName, head: &str, base: &str) -> Self {
        {
            let mut pulls = self.pulls.lock().unwrap();
            let number = pulls.len() as u64 + 1;
            pulls.push(RecordedPull {
                title: "existing".into(),
                body: String::new(),
                pull: PullRequest {
                    number,
                    url: format!("https://github.com/{repo}/pull/{number}"),
                    head: head.to_string(),
                    base: base.to_string(),
                },
                repo,
            });
        }
        self
    }

    /// Every call fails with a transport error.
    pub fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    pub fn pulls(&self) -> Vec<RecordedPull> {
        self.pulls.lock().unwrap().clone()
    }

    pub fn reviewer_requests(&self) -> Vec<(u64, Vec<String>, Vec<String>)> {
        self.reviewer_requests.lock().unwrap().clone()
    }

    fn reachable(&self) -> Result<(), TrackerError> {
        if self.offline {
            return Err(TrackerError::Transport("connection refused".into()));
        }
        Ok(())
    }
}

impl IssueTrackerClient for MemoryTracker {
    fn list_open_pulls(
        &self,
        repo: &RepoName,
        head: &str,
        base: &str,
    ) -> Result<Vec<PullRequest>, TrackerError> {
        self.reachable()?;
        let pulls = self.pulls.lock().unwrap();
        Ok(pulls
            .iter()
            .filter(|p| &p.repo == repo && p.pull.head == head && p.pull.base == base)
            .map(|p| p.pull.clone())
            .collect())
    }

    fn create_pull(
        &self,
        repo: &RepoName,
        pull: &NewPullRequest<'_>,
    ) -> Result<PullRequest, TrackerError> {
        self.reachable()?;
        let mut pulls = self.pulls.lock().unwrap();
        let number = pulls.len() as u64 + 1;
        let created = PullRequest {
            number,
            url: format!("https://github.com/{repo}/pull/{number}"),
            head: pull.head.to_string(),
            base: pull.base.to_string(),
        };
        pulls.push(RecordedPull {
            repo: repo.clone(),
            title: pull.title.to_string(),
            body: pull.body.to_string(),
            pull: created.clone(),
        });
        Ok(created)
    }

    fn request_reviewers(
        &self,
        _repo: &RepoName,
        number: u64,
        users: &[String],
        teams: &[String],
    ) -> Result<(), TrackerError> {
        self.reachable()?;
        self.reviewer_requests
            .lock()
            .unwrap()
            .push((number, users.to_vec(), teams.to_vec()));
        Ok(())
    }

    fn ping(&self) -> Result<(), TrackerError> {
        self.reachable()
    }
}
