//! Change publication: branch preparation, commit, push, pull request.
//!
//! ## State machine
//!
//! ```text
//! ChangePublisher::start ──► PreparedBranch        (work branch checked out)
//!        files are copied into the tree here
//! PreparedBranch::publish ─► stage ─► no diff ─────► NoChange
//!                                  └► commit ─► push ─► PR disabled ──► CommittedOnly
//!                                                   ├► PR open ──────► CommittedAndPrAlreadyOpen
//!                                                   └► PR created ───► CommittedAndPrCreated
//! ```
//!
//! `publish` consumes the prepared branch, so no state is revisited.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use filesync_core::RepoName;
use filesync_renderer::{PullRequestContext, Renderer};

use crate::deadline::Deadline;
use crate::error::PublishError;
use crate::tracker::{IssueTrackerClient, NewPullRequest, PullRequest};
use crate::vcs::{VersionControlBackend, WorkingTree};

/// Message of the single commit a run produces.
pub const COMMIT_MESSAGE: &str = "chore(sync): update files from source repositories";

pub const DEFAULT_WORK_BRANCH: &str = "sync/repo-files";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchConfig {
    pub work_branch: String,
    /// `None` means whichever branch is checked out when the run starts.
    pub base_branch: Option<String>,
}

impl Default for BranchConfig {
    fn default() -> Self {
        Self {
            work_branch: DEFAULT_WORK_BRANCH.to_string(),
            base_branch: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullRequestConfig {
    pub enabled: bool,
    /// Repository the pull request is opened against.
    pub target: Option<RepoName>,
    /// Literal title; replaces the rendered one.
    pub title: Option<String>,
    /// Literal intro paragraph of the body.
    pub intro: Option<String>,
    pub reviewers: Vec<String>,
    pub team_reviewers: Vec<String>,
    pub template_dir: Option<PathBuf>,
}

/// Terminal state of a run's publish stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishDecision {
    NoChange,
    CommittedOnly,
    CommittedAndPrCreated,
    CommittedAndPrAlreadyOpen,
    Failed(String),
}

impl PublishDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishDecision::NoChange => "no_change",
            PublishDecision::CommittedOnly => "committed_only",
            PublishDecision::CommittedAndPrCreated => "committed_and_pr_created",
            PublishDecision::CommittedAndPrAlreadyOpen => "committed_and_pr_already_open",
            PublishDecision::Failed(_) => "failed",
        }
    }

    pub fn committed(&self) -> bool {
        matches!(
            self,
            PublishDecision::CommittedOnly
                | PublishDecision::CommittedAndPrCreated
                | PublishDecision::CommittedAndPrAlreadyOpen
        )
    }
}

/// What [`PreparedBranch::publish`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub decision: PublishDecision,
    pub pull_request: Option<PullRequest>,
}

// ---------------------------------------------------------------------------
// ChangePublisher
// ---------------------------------------------------------------------------

pub struct ChangePublisher<'a> {
    backend: &'a dyn VersionControlBackend,
    tracker: Option<&'a dyn IssueTrackerClient>,
    tree: &'a WorkingTree,
}

impl<'a> ChangePublisher<'a> {
    pub fn new(backend: &'a dyn VersionControlBackend, tree: &'a WorkingTree) -> Self {
        Self {
            backend,
            tracker: None,
            tree,
        }
    }

    pub fn with_tracker(mut self, tracker: Option<&'a dyn IssueTrackerClient>) -> Self {
        self.tracker = tracker;
        self
    }

    /// Check out the work branch: resume the remote one if it exists,
    /// otherwise branch off the base.
    pub fn start(self, config: &BranchConfig) -> Result<PreparedBranch<'a>, PublishError> {
        let branch_err = |source| PublishError::Branch {
            branch: config.work_branch.clone(),
            source,
        };

        let base_branch = match &config.base_branch {
            Some(base) => base.clone(),
            None => self.backend.current_branch(self.tree).map_err(branch_err)?,
        };
        if base_branch == config.work_branch {
            return Err(PublishError::SameBranch(base_branch));
        }

        let resumed = self
            .backend
            .fetch_remote_branch(self.tree, &config.work_branch)
            .map_err(branch_err)?;
        if resumed {
            tracing::info!("resuming remote branch {}", config.work_branch);
        } else {
            self.backend
                .create_branch_from(self.tree, &config.work_branch, &base_branch)
                .map_err(branch_err)?;
            tracing::info!("created {} from {base_branch}", config.work_branch);
        }

        Ok(PreparedBranch {
            publisher: self,
            work_branch: config.work_branch.clone(),
            base_branch,
            resumed,
        })
    }
}

/// The work branch is checked out and ready to receive synced files.
pub struct PreparedBranch<'a> {
    publisher: ChangePublisher<'a>,
    work_branch: String,
    base_branch: String,
    resumed: bool,
}

impl PreparedBranch<'_> {
    pub fn work_branch(&self) -> &str {
        &self.work_branch
    }

    pub fn base_branch(&self) -> &str {
        &self.base_branch
    }

    /// Whether the work branch already existed on the remote.
    pub fn resumed(&self) -> bool {
        self.resumed
    }

    /// Stage, commit, push, then settle the pull request.
    pub fn publish(
        self,
        pr: &PullRequestConfig,
        mut context: PullRequestContext,
        deadline: &Deadline,
    ) -> Result<Published, PublishError> {
        let ChangePublisher {
            backend,
            tracker,
            tree,
        } = self.publisher;
        let vcs_err = |action| move |source| PublishError::Vcs { action, source };

        // Everything the PR step needs is validated before the remote moves.
        let pr_target = if pr.enabled {
            let target = pr.target.as_ref().ok_or(PublishError::MissingTarget)?;
            let tracker = tracker.ok_or(PublishError::MissingTracker)?;
            Some((target, tracker))
        } else {
            None
        };

        backend.stage_all(tree).map_err(vcs_err("stage"))?;
        if !backend.diff_has_changes(tree).map_err(vcs_err("diff"))? {
            tracing::info!("no changes to publish");
            return Ok(Published {
                decision: PublishDecision::NoChange,
                pull_request: None,
            });
        }

        let text = match pr_target {
            Some(_) => {
                if let Some(intro) = &pr.intro {
                    context.intro = intro.clone();
                }
                let renderer = Renderer::with_template_dir(pr.template_dir.as_deref())?;
                let title = match &pr.title {
                    Some(title) => title.clone(),
                    None => renderer.render_title(&context)?,
                };
                Some((title, renderer.render_body(&context)?))
            }
            None => None,
        };

        deadline.check("commit")?;
        backend.commit(tree, COMMIT_MESSAGE).map_err(vcs_err("commit"))?;
        deadline.check("push")?;
        backend
            .push(tree, &self.work_branch)
            .map_err(vcs_err("push"))?;
        tracing::info!("pushed {}", self.work_branch);

        let (Some((target, tracker)), Some((title, body))) = (pr_target, text) else {
            return Ok(Published {
                decision: PublishDecision::CommittedOnly,
                pull_request: None,
            });
        };

        let tracker_err = |action| move |source| PublishError::Tracker { action, source };
        let open = tracker
            .list_open_pulls(target, &self.work_branch, &self.base_branch)
            .map_err(tracker_err("list pull requests"))?;
        if let Some(existing) = open.into_iter().next() {
            tracing::info!("pull request already open: {}", existing.url);
            return Ok(Published {
                decision: PublishDecision::CommittedAndPrAlreadyOpen,
                pull_request: Some(existing),
            });
        }

        let created = tracker
            .create_pull(
                target,
                &NewPullRequest {
                    title: &title,
                    body: &body,
                    head: &self.work_branch,
                    base: &self.base_branch,
                },
            )
            .map_err(tracker_err("create pull request"))?;
        tracing::info!("created pull request {}", created.url);

        if !pr.reviewers.is_empty() || !pr.team_reviewers.is_empty() {
            // The PR exists at this point; a reviewer failure does not undo it.
            if let Err(err) =
                tracker.request_reviewers(target, created.number, &pr.reviewers, &pr.team_reviewers)
            {
                tracing::warn!("could not request reviewers on #{}: {err}", created.number);
            }
        }

        Ok(Published {
            decision: PublishDecision::CommittedAndPrCreated,
            pull_request: Some(created),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{MemoryBackend, MemoryTracker};
    use chrono::Utc;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn target() -> RepoName {
        RepoName::new("me", "app")
    }

    fn branches() -> BranchConfig {
        BranchConfig {
            work_branch: DEFAULT_WORK_BRANCH.into(),
            base_branch: Some("main".into()),
        }
    }

    fn pr_enabled() -> PullRequestConfig {
        PullRequestConfig {
            enabled: true,
            target: Some(target()),
            ..Default::default()
        }
    }

    fn ctx() -> PullRequestContext {
        PullRequestContext::new("me/app", DEFAULT_WORK_BRANCH, "main", Utc::now())
    }

    fn publish_once(
        backend: &MemoryBackend,
        tracker: &MemoryTracker,
        tree: &WorkingTree,
        pr: &PullRequestConfig,
    ) -> Result<Published, PublishError> {
        ChangePublisher::new(backend, tree)
            .with_tracker(Some(tracker))
            .start(&branches())?
            .publish(pr, ctx(), &Deadline::unbounded())
    }

    #[test]
    fn clean_tree_is_no_change() {
        let dir = TempDir::new().unwrap();
        let tree = WorkingTree::new(dir.path());
        let backend = MemoryBackend::new("main");
        let tracker = MemoryTracker::new();

        let published = publish_once(&backend, &tracker, &tree, &pr_enabled()).unwrap();

        assert_eq!(published.decision, PublishDecision::NoChange);
        assert!(backend.commit_messages().is_empty());
        assert!(tracker.pulls().is_empty());
    }

    #[test]
    fn change_without_pr_is_committed_only() {
        let dir = TempDir::new().unwrap();
        let tree = WorkingTree::new(dir.path());
        let backend = MemoryBackend::new("main");
        let tracker = MemoryTracker::new();

        let prepared = ChangePublisher::new(&backend, &tree).start(&branches()).unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        let published = prepared
            .publish(&PullRequestConfig::default(), ctx(), &Deadline::unbounded())
            .unwrap();

        assert_eq!(published.decision, PublishDecision::CommittedOnly);
        assert_eq!(backend.commit_messages(), vec![COMMIT_MESSAGE.to_string()]);
        assert_eq!(backend.remote_file(DEFAULT_WORK_BRANCH, "a.txt").as_deref(), Some(&b"a"[..]));
        assert!(tracker.pulls().is_empty());
    }

    #[test]
    fn change_with_pr_creates_one_and_requests_reviewers() {
        let dir = TempDir::new().unwrap();
        let tree = WorkingTree::new(dir.path());
        let backend = MemoryBackend::new("main");
        let tracker = MemoryTracker::new();
        let pr = PullRequestConfig {
            reviewers: vec!["alice".into()],
            team_reviewers: vec!["platform".into()],
            title: Some("Sync shared files".into()),
            ..pr_enabled()
        };

        let prepared = ChangePublisher::new(&backend, &tree)
            .with_tracker(Some(&tracker))
            .start(&branches())
            .unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        let published = prepared.publish(&pr, ctx(), &Deadline::unbounded()).unwrap();

        assert_eq!(published.decision, PublishDecision::CommittedAndPrCreated);
        let pulls = tracker.pulls();
        assert_eq!(pulls.len(), 1);
        assert_eq!(pulls[0].title, "Sync shared files");
        assert_eq!(pulls[0].pull.head, DEFAULT_WORK_BRANCH);
        assert_eq!(pulls[0].pull.base, "main");
        assert_eq!(
            tracker.reviewer_requests(),
            vec![(1, vec!["alice".to_string()], vec!["platform".to_string()])]
        );
    }

    #[test]
    fn open_pr_is_left_untouched() {
        let dir = TempDir::new().unwrap();
        let tree = WorkingTree::new(dir.path());
        let backend = MemoryBackend::new("main");
        let tracker = MemoryTracker::new().with_open_pull(target(), DEFAULT_WORK_BRANCH, "main");

        let prepared = ChangePublisher::new(&backend, &tree)
            .with_tracker(Some(&tracker))
            .start(&branches())
            .unwrap();
        fs::write(dir.path().join("a.txt"), "new").unwrap();
        let published = prepared
            .publish(&pr_enabled(), ctx(), &Deadline::unbounded())
            .unwrap();

        assert_eq!(published.decision, PublishDecision::CommittedAndPrAlreadyOpen);
        assert_eq!(tracker.pulls().len(), 1);
        assert_eq!(published.pull_request.map(|p| p.number), Some(1));
    }

    #[test]
    fn push_failure_is_an_error_and_opens_no_pr() {
        let dir = TempDir::new().unwrap();
        let tree = WorkingTree::new(dir.path());
        let backend = MemoryBackend::new("main").fail_push();
        let tracker = MemoryTracker::new();

        let prepared = ChangePublisher::new(&backend, &tree)
            .with_tracker(Some(&tracker))
            .start(&branches())
            .unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        let err = prepared
            .publish(&pr_enabled(), ctx(), &Deadline::unbounded())
            .unwrap_err();

        assert!(matches!(err, PublishError::Vcs { action: "push", .. }));
        assert!(tracker.pulls().is_empty());
    }

    #[test]
    fn missing_target_fails_before_committing() {
        let dir = TempDir::new().unwrap();
        let tree = WorkingTree::new(dir.path());
        let backend = MemoryBackend::new("main");
        let tracker = MemoryTracker::new();
        let pr = PullRequestConfig {
            target: None,
            ..pr_enabled()
        };

        let prepared = ChangePublisher::new(&backend, &tree)
            .with_tracker(Some(&tracker))
            .start(&branches())
            .unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        let err = prepared.publish(&pr, ctx(), &Deadline::unbounded()).unwrap_err();

        assert!(matches!(err, PublishError::MissingTarget));
        assert!(backend.commit_messages().is_empty());
    }

    #[test]
    fn expired_deadline_prevents_push() {
        let dir = TempDir::new().unwrap();
        let tree = WorkingTree::new(dir.path());
        let backend = MemoryBackend::new("main");

        let prepared = ChangePublisher::new(&backend, &tree).start(&branches()).unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        let deadline = Deadline::new(Duration::ZERO);
        std::thread::sleep(Duration::from_millis(2));
        let err = prepared
            .publish(&PullRequestConfig::default(), ctx(), &deadline)
            .unwrap_err();

        assert!(matches!(err, PublishError::Timeout(_)));
        assert_eq!(backend.push_count(), 0);
    }

    #[test]
    fn base_defaults_to_current_branch() {
        let dir = TempDir::new().unwrap();
        let tree = WorkingTree::new(dir.path());
        let backend = MemoryBackend::new("develop");

        let prepared = ChangePublisher::new(&backend, &tree)
            .start(&BranchConfig::default())
            .unwrap();

        assert_eq!(prepared.base_branch(), "develop");
        assert!(!prepared.resumed());
        assert_eq!(backend.current(), DEFAULT_WORK_BRANCH);
    }

    #[test]
    fn work_branch_equal_to_base_is_rejected() {
        let dir = TempDir::new().unwrap();
        let tree = WorkingTree::new(dir.path());
        let backend = MemoryBackend::new("main");
        let config = BranchConfig {
            work_branch: "main".into(),
            base_branch: None,
        };

        let err = ChangePublisher::new(&backend, &tree).start(&config).err();
        assert!(matches!(err, Some(PublishError::SameBranch(b)) if b == "main"));
    }

    #[test]
    fn decision_names_are_stable() {
        assert_eq!(PublishDecision::NoChange.as_str(), "no_change");
        assert_eq!(
            PublishDecision::CommittedAndPrAlreadyOpen.as_str(),
            "committed_and_pr_already_open"
        );
        assert_eq!(PublishDecision::Failed("x".into()).as_str(), "failed");
        assert!(!PublishDecision::NoChange.committed());
        assert!(PublishDecision::CommittedOnly.committed());
    }
}
