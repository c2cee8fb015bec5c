//! Code-hosting seam: listing and creating pull requests.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use filesync_core::RepoName;

/// Failures reported by an [`IssueTrackerClient`].
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Decode(String),
}

/// An open pull request as seen by the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub url: String,
    pub head: String,
    pub base: String,
}

/// Payload for [`IssueTrackerClient::create_pull`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPullRequest<'a> {
    pub title: &'a str,
    pub body: &'a str,
    pub head: &'a str,
    pub base: &'a str,
}

pub trait IssueTrackerClient: Send + Sync {
    /// Open pull requests in `repo` from `head` into `base`.
    fn list_open_pulls(
        &self,
        repo: &RepoName,
        head: &str,
        base: &str,
    ) -> Result<Vec<PullRequest>, TrackerError>;

    fn create_pull(
        &self,
        repo: &RepoName,
        pull: &NewPullRequest<'_>,
    ) -> Result<PullRequest, TrackerError>;

    fn request_reviewers(
        &self,
        repo: &RepoName,
        number: u64,
        users: &[String],
        teams: &[String],
    ) -> Result<(), TrackerError>;

    /// Cheap authenticated probe of the API.
    fn ping(&self) -> Result<(), TrackerError>;
}
