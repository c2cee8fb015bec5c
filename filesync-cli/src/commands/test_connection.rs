//! `repo-file-sync test-connection` - probe the GitHub API.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use filesync_remote::{GitHubClient, DEFAULT_API_URL};
use filesync_sync::IssueTrackerClient;

/// Arguments for `repo-file-sync test-connection`.
#[derive(Args, Debug)]
pub struct TestConnectionArgs {
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// GitHub REST API root.
    #[arg(long, default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Connection timeout in seconds.
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,
}

impl TestConnectionArgs {
    pub fn run(self) -> Result<ExitCode> {
        let authenticated = self.token.as_deref().is_some_and(|t| !t.is_empty());
        let client = GitHubClient::new(self.token, Duration::from_secs(self.timeout))
            .with_api_url(&self.api_url);

        match client.ping() {
            Ok(()) => {
                let mode = if authenticated { "authenticated" } else { "anonymous" };
                println!("{} connected to {} ({mode})", "✓".green(), self.api_url);
                Ok(ExitCode::SUCCESS)
            }
            Err(err) => {
                eprintln!("{} cannot reach {}: {err}", "✗".red(), self.api_url);
                Ok(ExitCode::from(1))
            }
        }
    }
}
