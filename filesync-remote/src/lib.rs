//! # filesync-remote
//!
//! Production collaborators for `filesync-sync`: [`GitCli`] drives the `git`
//! executable, [`GitHubClient`] talks to the GitHub REST API.

pub mod git;
pub mod github;

pub use git::{git_available, GitCli, GitIdentity, DEFAULT_GIT_BASE_URL};
pub use github::{GitHubClient, DEFAULT_API_URL};
