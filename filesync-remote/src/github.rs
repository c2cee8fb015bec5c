//! [`IssueTrackerClient`] over the GitHub REST API (blocking `ureq`).

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use filesync_core::RepoName;
use filesync_sync::{IssueTrackerClient, NewPullRequest, PullRequest, TrackerError};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

const USER_AGENT: &str = concat!("repo-file-sync/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct ApiRef {
    #[serde(rename = "ref")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiPull {
    number: u64,
    html_url: String,
    head: ApiRef,
    base: ApiRef,
}

impl From<ApiPull> for PullRequest {
    fn from(pull: ApiPull) -> Self {
        Self {
            number: pull.number,
            url: pull.html_url,
            head: pull.head.name,
            base: pull.base.name,
        }
    }
}

pub struct GitHubClient {
    agent: ureq::Agent,
    api_url: String,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(token: Option<String>, connect_timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(connect_timeout)
            .user_agent(USER_AGENT)
            .build();
        Self {
            agent,
            api_url: DEFAULT_API_URL.to_string(),
            token: token.filter(|t| !t.is_empty()),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        let request = self
            .agent
            .request(method, &format!("{}{path}", self.api_url))
            .set("Accept", "application/vnd.github+json")
            .set("X-GitHub-Api-Version", "2022-11-28");
        match &self.token {
            Some(token) => request.set("Authorization", &format!("Bearer {token}")),
            None => request,
        }
    }
}

fn map_err(err: ureq::Error) -> TrackerError {
    match err {
        ureq::Error::Status(status, response) => {
            let body = response.into_string().unwrap_or_default();
            TrackerError::Http {
                status,
                message: error_message(&body),
            }
        }
        ureq::Error::Transport(transport) => TrackerError::Transport(transport.to_string()),
    }
}

/// GitHub's `{"message": ...}` error text, or the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

fn decode<T: serde::de::DeserializeOwned>(response: ureq::Response) -> Result<T, TrackerError> {
    response
        .into_json::<T>()
        .map_err(|e| TrackerError::Decode(e.to_string()))
}

impl IssueTrackerClient for GitHubClient {
    fn list_open_pulls(
        &self,
        repo: &RepoName,
        head: &str,
        base: &str,
    ) -> Result<Vec<PullRequest>, TrackerError> {
        let qualified_head = format!("{}:{head}", repo.owner);
        let response = self
            .request("GET", &format!("/repos/{repo}/pulls"))
            .query("state", "open")
            .query("head", &qualified_head)
            .query("base", base)
            .call()
            .map_err(map_err)?;
        let pulls: Vec<ApiPull> = decode(response)?;
        tracing::debug!("{} open pull request(s) for {qualified_head} -> {base}", pulls.len());
        Ok(pulls.into_iter().map(PullRequest::from).collect())
    }

    fn create_pull(
        &self,
        repo: &RepoName,
        pull: &NewPullRequest<'_>,
    ) -> Result<PullRequest, TrackerError> {
        let response = self
            .request("POST", &format!("/repos/{repo}/pulls"))
            .send_json(pull)
            .map_err(map_err)?;
        let created: ApiPull = decode(response)?;
        Ok(created.into())
    }

    fn request_reviewers(
        &self,
        repo: &RepoName,
        number: u64,
        users: &[String],
        teams: &[String],
    ) -> Result<(), TrackerError> {
        self.request(
            "POST",
            &format!("/repos/{repo}/pulls/{number}/requested_reviewers"),
        )
        .send_json(json!({ "reviewers": users, "team_reviewers": teams }))
        .map_err(map_err)?;
        tracing::info!(
            "requested review on #{number} from {} user(s), {} team(s)",
            users.len(),
            teams.len()
        );
        Ok(())
    }

    fn ping(&self) -> Result<(), TrackerError> {
        self.request("GET", "/rate_limit").call().map_err(map_err)?;
        Ok(())
    }
}
