//! [`VersionControlBackend`] over the `git` executable.
//!
//! Source repositories are fetched into their scratch directory with
//! `init` + `fetch <ref>` + `checkout FETCH_HEAD`, which works the same for
//! branches, tags and commit SHAs. Target-tree operations run against the
//! existing checkout and its `origin` remote.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};

use filesync_core::RepoName;
use filesync_sync::{CheckoutRequest, VcsError, VersionControlBackend, WorkingTree};

pub const DEFAULT_GIT_BASE_URL: &str = "https://github.com";

/// Author recorded on sync commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitIdentity {
    pub name: String,
    pub email: String,
}

impl Default for GitIdentity {
    fn default() -> Self {
        Self {
            name: "github-actions[bot]".to_string(),
            email: "41898282+github-actions[bot]@users.noreply.github.com".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GitCli {
    program: PathBuf,
    base_url: String,
    identity: Option<GitIdentity>,
    connect_timeout: Option<Duration>,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

impl GitCli {
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("git"),
            base_url: DEFAULT_GIT_BASE_URL.to_string(),
            identity: None,
            connect_timeout: None,
        }
    }

    /// Host the `owner/name` remotes live under, e.g. `https://github.com`
    /// or a `file://` directory of bare repositories.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_identity(mut self, identity: Option<GitIdentity>) -> Self {
        self.identity = identity;
        self
    }

    /// Abort transfers that stall for this long.
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Clone URL for `repo`. A token is embedded only for `https` hosts.
    pub fn remote_url(&self, repo: &RepoName, token: Option<&str>) -> String {
        match (token, self.base_url.strip_prefix("https://")) {
            (Some(token), Some(host)) if !token.is_empty() => {
                format!("https://x-access-token:{token}@{host}/{repo}.git")
            }
            _ => format!("{}/{repo}.git", self.base_url),
        }
    }

    fn command(&self, dir: Option<&Path>) -> Command {
        let mut cmd = Command::new(&self.program);
        if let Some(dir) = dir {
            cmd.arg("-C").arg(dir);
        }
        if let Some(timeout) = self.connect_timeout {
            cmd.arg("-c").arg("http.lowSpeedLimit=1");
            cmd.arg("-c")
                .arg(format!("http.lowSpeedTime={}", timeout.as_secs().max(1)));
        }
        if let Some(identity) = &self.identity {
            cmd.arg("-c").arg(format!("user.name={}", identity.name));
            cmd.arg("-c").arg(format!("user.email={}", identity.email));
        }
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        cmd
    }

    /// Run git and return its raw output, success or not.
    fn output(&self, dir: Option<&Path>, args: &[&str], secret: Option<&str>) -> Result<Output, VcsError> {
        let shown = redact(&format!("git {}", args.join(" ")), secret);
        tracing::debug!("{shown}");
        self.command(dir)
            .args(args)
            .output()
            .map_err(|source| VcsError::Io {
                path: dir.map(Path::to_path_buf).unwrap_or_else(|| self.program.clone()),
                source,
            })
    }

    /// Run git, requiring success; returns trimmed stdout.
    fn run(&self, dir: Option<&Path>, args: &[&str], secret: Option<&str>) -> Result<String, VcsError> {
        let output = self.output(dir, args, secret)?;
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).trim().to_string());
        }
        Err(command_failed(args, &output, secret))
    }
}

fn command_failed(args: &[&str], output: &Output, secret: Option<&str>) -> VcsError {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    VcsError::Command {
        command: redact(&format!("git {}", args.join(" ")), secret),
        detail: redact(
            &format!("status {}: {} {}", output.status, stdout, stderr),
            secret,
        )
        .trim()
        .to_string(),
    }
}

fn redact(text: &str, secret: Option<&str>) -> String {
    match secret {
        Some(secret) if !secret.is_empty() => text.replace(secret, "***"),
        _ => text.to_string(),
    }
}

/// Stderr phrases git uses when the requested ref is not on the remote.
const MISSING_REF_HINTS: &[&str] = &[
    "couldn't find remote ref",
    "not our ref",
    "invalid refspec",
    "unadvertised object",
];

/// Stderr phrases for a remote that cannot be reached or read.
const UNREACHABLE_HINTS: &[&str] = &[
    "could not resolve host",
    "repository not found",
    "authentication failed",
    "unable to access",
    "could not read from remote",
    "does not appear to be a git repository",
];

fn classify_fetch(repo: &RepoName, reference: &str, err: VcsError) -> VcsError {
    let VcsError::Command { detail, .. } = &err else {
        return err;
    };
    let lower = detail.to_lowercase();
    if MISSING_REF_HINTS.iter().any(|hint| lower.contains(hint)) {
        return VcsError::RefNotFound {
            repo: repo.full_name(),
            reference: reference.to_string(),
        };
    }
    if UNREACHABLE_HINTS.iter().any(|hint| lower.contains(hint)) {
        return VcsError::Unreachable {
            repo: repo.full_name(),
            reason: detail.clone(),
        };
    }
    err
}

impl VersionControlBackend for GitCli {
    fn checkout_ref(&self, request: &CheckoutRequest<'_>) -> Result<(), VcsError> {
        let dest = request.dest;
        let url = self.remote_url(request.repo, request.token);
        let reference = request.reference.unwrap_or("HEAD");

        self.run(Some(dest), &["init", "-q"], None)?;
        self.run(Some(dest), &["remote", "add", "origin", url.as_str()], request.token)?;

        let mut fetch = vec!["fetch", "-q", "--no-tags"];
        if request.shallow {
            fetch.extend(["--depth", "1"]);
        }
        // Configured refs never reach git as options.
        fetch.extend(["--end-of-options", "origin", reference]);
        self.run(Some(dest), &fetch, request.token)
            .map_err(|e| classify_fetch(request.repo, reference, e))?;

        self.run(Some(dest), &["checkout", "-q", "--detach", "FETCH_HEAD"], None)?;
        tracing::debug!("checked out {}@{reference}", request.repo);
        Ok(())
    }

    fn log_subjects(
        &self,
        repo: &RepoName,
        checkout: &Path,
        paths: &[PathBuf],
        since: DateTime<Utc>,
    ) -> Result<Vec<String>, VcsError> {
        self.run(Some(checkout), &["fetch", "-q", "--no-tags", "origin", "HEAD"], None)
            .map_err(|e| classify_fetch(repo, "HEAD", e))?;

        let since = format!("--since={}", since.to_rfc3339_opts(SecondsFormat::Secs, true));
        let path_args: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
        let mut args = vec!["log", "FETCH_HEAD", since.as_str(), "--format=%s", "--"];
        args.extend(path_args.iter().map(String::as_str));

        let stdout = self.run(Some(checkout), &args, None)?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn current_branch(&self, tree: &WorkingTree) -> Result<String, VcsError> {
        let branch = self.run(Some(tree.root()), &["rev-parse", "--abbrev-ref", "HEAD"], None)?;
        if branch == "HEAD" {
            return Err(VcsError::Command {
                command: "git rev-parse --abbrev-ref HEAD".to_string(),
                detail: "HEAD is detached; pass the base branch explicitly".to_string(),
            });
        }
        Ok(branch)
    }

    fn create_branch_from(&self, tree: &WorkingTree, branch: &str, base: &str) -> Result<(), VcsError> {
        self.run(Some(tree.root()), &["checkout", "-q", "-B", branch, base], None)?;
        Ok(())
    }

    fn fetch_remote_branch(&self, tree: &WorkingTree, branch: &str) -> Result<bool, VcsError> {
        let refspec = format!("+refs/heads/{branch}:refs/remotes/origin/{branch}");
        let args = ["fetch", "-q", "origin", refspec.as_str()];
        let output = self.output(Some(tree.root()), &args, None)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_lowercase();
            if MISSING_REF_HINTS.iter().any(|hint| stderr.contains(hint)) {
                return Ok(false);
            }
            return Err(command_failed(&args, &output, None));
        }

        let upstream = format!("origin/{branch}");
        self.run(
            Some(tree.root()),
            &["checkout", "-q", "-B", branch, "--track", upstream.as_str()],
            None,
        )?;
        Ok(true)
    }

    fn stage_all(&self, tree: &WorkingTree) -> Result<(), VcsError> {
        self.run(Some(tree.root()), &["add", "-A"], None)?;
        Ok(())
    }

    fn diff_has_changes(&self, tree: &WorkingTree) -> Result<bool, VcsError> {
        let args = ["diff", "--cached", "--quiet"];
        let output = self.output(Some(tree.root()), &args, None)?;
        match output.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(command_failed(&args, &output, None)),
        }
    }

    fn commit(&self, tree: &WorkingTree, message: &str) -> Result<(), VcsError> {
        self.run(Some(tree.root()), &["commit", "-q", "-m", message], None)?;
        Ok(())
    }

    fn push(&self, tree: &WorkingTree, branch: &str) -> Result<(), VcsError> {
        let refspec = format!("HEAD:refs/heads/{branch}");
        self.run(Some(tree.root()), &["push", "-q", "origin", refspec.as_str()], None)?;
        Ok(())
    }
}

/// Whether a usable `git` is on `PATH`.
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
