//! # filesync-sync
//!
//! Fetch, substitute, write, publish.
//!
//! [`SyncOrchestrator::run`] drives one run: it checks out every configured
//! source, copies the mapped files into the working tree through the
//! hash-gated writer, and hands the result to the [`ChangePublisher`]. Remote
//! access goes through the [`VersionControlBackend`] and
//! [`IssueTrackerClient`] traits; [`fakes`] has in-memory versions of both.

pub mod deadline;
pub mod error;
pub mod fakes;
pub mod fetch;
pub mod pipeline;
pub mod publish;
pub mod report;
pub mod substitute;
pub mod tracker;
pub mod vcs;
pub mod writer;

pub use deadline::{Deadline, Elapsed};
pub use error::{PublishError, SyncError};
pub use fetch::{ContentFetcher, CopiedFile, CopyTarget, FetchResult, SyncJob};
pub use pipeline::{SyncOptions, SyncOrchestrator};
pub use publish::{
    BranchConfig, ChangePublisher, PreparedBranch, PublishDecision, Published, PullRequestConfig,
};
pub use report::{ExitStatus, RepoOutcome, RunReport};
pub use tracker::{IssueTrackerClient, NewPullRequest, PullRequest, TrackerError};
pub use vcs::{CheckoutRequest, VcsError, VersionControlBackend, WorkingTree};
pub use writer::WriteOutcome;
