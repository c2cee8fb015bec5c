//! `repo-file-sync sync` - fetch, substitute, commit, open a pull request.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use filesync_core::RepoName;
use filesync_remote::{GitCli, GitHubClient, GitIdentity, DEFAULT_API_URL, DEFAULT_GIT_BASE_URL};
use filesync_sync::{
    BranchConfig, IssueTrackerClient, PublishDecision, PullRequestConfig, RunReport, SyncOptions,
    SyncOrchestrator,
};

pub const DEFAULT_CONFIG: &str = ".github/repo-file-sync.yaml";

/// Arguments for `repo-file-sync sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Path to the sync configuration file.
    #[arg(long, default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Token for fetching sources and calling the GitHub API.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Output root inside the working tree.
    #[arg(long, default_value = ".")]
    pub output: PathBuf,

    /// Checkout of the repository receiving the files.
    #[arg(long, default_value = ".")]
    pub work_tree: PathBuf,

    /// Where per-run scratch checkouts live (default: user cache dir).
    #[arg(long)]
    pub scratch_dir: Option<PathBuf>,

    /// Show what would be written without writing, committing or pushing.
    #[arg(long)]
    pub dry_run: bool,

    /// Open a pull request for the work branch when there are changes.
    #[arg(long)]
    pub create_pr: bool,

    /// Nest every destination under `<owner>/<name>/`.
    #[arg(long)]
    pub preserve_structure: bool,

    /// Publish nothing if any source reported an error.
    #[arg(long)]
    pub strict: bool,

    /// Literal pull request title.
    #[arg(long)]
    pub pr_title: Option<String>,

    /// Literal intro paragraph for the pull request body.
    #[arg(long)]
    pub pr_body: Option<String>,

    /// Directory of `title.tera` / `body.md.tera` overrides.
    #[arg(long)]
    pub template_dir: Option<PathBuf>,

    /// Work branch the sync commit is pushed to.
    #[arg(long, default_value = filesync_sync::publish::DEFAULT_WORK_BRANCH)]
    pub branch_name: String,

    /// Branch the pull request targets (default: the current branch).
    #[arg(long)]
    pub base_branch: Option<String>,

    /// Comma-separated users to request review from.
    #[arg(long, value_delimiter = ',')]
    pub reviewers: Vec<String>,

    /// Comma-separated team slugs to request review from.
    #[arg(long, value_delimiter = ',')]
    pub team_reviewers: Vec<String>,

    /// Repository the pull request is opened against.
    #[arg(long, env = "GITHUB_REPOSITORY")]
    pub target_repo: Option<RepoName>,

    /// Scan upstream history this many days back for related pull requests.
    #[arg(long)]
    pub lookback_days: Option<u32>,

    /// Connection timeout in seconds for network operations.
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// Wall-clock budget for the whole run, in seconds.
    #[arg(long, default_value_t = 600)]
    pub run_timeout: u64,

    /// Concurrent source checkouts.
    #[arg(long, default_value_t = filesync_sync::pipeline::DEFAULT_JOBS)]
    pub jobs: usize,

    /// Print the run report as JSON instead of `key=value` lines.
    #[arg(long)]
    pub json: bool,

    /// Host the source repositories are cloned from.
    #[arg(long, default_value = DEFAULT_GIT_BASE_URL)]
    pub git_base_url: String,

    /// GitHub REST API root.
    #[arg(long, default_value = DEFAULT_API_URL)]
    pub api_url: String,
}

impl SyncArgs {
    pub fn run(self) -> Result<ExitCode> {
        let scratch_root = match &self.scratch_dir {
            Some(dir) => dir.clone(),
            None => dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("repo-file-sync"),
        };
        ensure_outside(&scratch_root, &self.work_tree)?;
        tracing::debug!("scratch root: {}", scratch_root.display());

        let connect_timeout = Duration::from_secs(self.timeout);
        let backend = GitCli::new()
            .with_base_url(&self.git_base_url)
            .with_identity(Some(GitIdentity::default()))
            .with_connect_timeout(Some(connect_timeout));
        let tracker = self.create_pr.then(|| {
            GitHubClient::new(self.token.clone(), connect_timeout).with_api_url(&self.api_url)
        });

        let options = self.options(scratch_root);
        let report = SyncOrchestrator::new(&backend)
            .with_tracker(tracker.as_ref().map(|t| t as &dyn IssueTrackerClient))
            .run_from_path(&self.config, &options)
            .with_context(|| format!("sync with '{}' failed", self.config.display()))?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize run report")?
            );
        } else {
            print!("{}", report.ci_output_lines());
        }
        if let Some(path) = std::env::var_os("GITHUB_OUTPUT") {
            append_github_output(Path::new(&path), &report)?;
        }
        print_summary(&report);

        Ok(ExitCode::from(report.exit_status().code()))
    }

    fn options(&self, scratch_root: PathBuf) -> SyncOptions {
        let mut options = SyncOptions::new(&self.work_tree, scratch_root);
        options.output_dir = self.output.clone();
        options.token = self.token.clone().filter(|t| !t.is_empty());
        options.dry_run = self.dry_run;
        options.strict = self.strict;
        options.preserve_structure = self.preserve_structure;
        options.lookback_days = self.lookback_days;
        options.jobs = self.jobs;
        options.run_timeout = Some(Duration::from_secs(self.run_timeout));
        options.branch = BranchConfig {
            work_branch: self.branch_name.clone(),
            base_branch: self.base_branch.clone(),
        };
        options.pull_request = PullRequestConfig {
            enabled: self.create_pr,
            target: self.target_repo.clone(),
            title: self.pr_title.clone(),
            intro: self.pr_body.clone(),
            reviewers: non_empty(&self.reviewers),
            team_reviewers: non_empty(&self.team_reviewers),
            template_dir: self.template_dir.clone(),
        };
        options
    }
}

fn non_empty(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

/// Scratch checkouts inside the working tree would be staged and committed.
fn ensure_outside(scratch_root: &Path, work_tree: &Path) -> Result<()> {
    let tree = work_tree
        .canonicalize()
        .with_context(|| format!("work tree '{}' does not exist", work_tree.display()))?;
    let absolute = if scratch_root.is_absolute() {
        scratch_root.to_path_buf()
    } else {
        std::env::current_dir()
            .context("could not determine current directory")?
            .join(scratch_root)
    };
    // The scratch root may not exist yet; resolve its closest existing ancestor.
    let mut existing = absolute.as_path();
    let mut rest = Vec::new();
    while !existing.exists() {
        let (Some(parent), Some(name)) = (existing.parent(), existing.file_name()) else {
            break;
        };
        rest.push(name.to_os_string());
        existing = parent;
    }
    let mut scratch = existing
        .canonicalize()
        .unwrap_or_else(|_| existing.to_path_buf());
    scratch.extend(rest.iter().rev());
    if scratch.starts_with(&tree) {
        bail!(
            "scratch directory '{}' must be outside the work tree '{}'",
            scratch.display(),
            tree.display()
        );
    }
    Ok(())
}

fn append_github_output(path: &Path, report: &RunReport) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open GITHUB_OUTPUT at '{}'", path.display()))?;
    file.write_all(report.ci_output_lines().as_bytes())
        .with_context(|| format!("failed to write GITHUB_OUTPUT at '{}'", path.display()))?;
    Ok(())
}

#[derive(Tabled)]
struct RepoRow {
    #[tabled(rename = "source")]
    source: String,
    #[tabled(rename = "files")]
    files: usize,
    #[tabled(rename = "bytes")]
    bytes: u64,
    #[tabled(rename = "related PRs")]
    related: usize,
    #[tabled(rename = "errors")]
    errors: usize,
}

fn print_summary(report: &RunReport) {
    let prefix = if report.dry_run { "[dry-run] " } else { "" };
    if !report.repos.is_empty() {
        let rows: Vec<RepoRow> = report
            .repos
            .iter()
            .map(|r| RepoRow {
                source: match &r.reference {
                    Some(reference) => format!("{}@{reference}", r.repo),
                    None => r.repo.full_name(),
                },
                files: r.files.len(),
                bytes: r.bytes(),
                related: r.related.len(),
                errors: r.errors.len(),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        eprintln!("{table}");
    }

    for repo in &report.repos {
        for err in &repo.errors {
            eprintln!("  {} {}: {err}", "✗".red(), repo.repo);
        }
    }

    let decision = report.decision.as_str();
    let line = match &report.decision {
        PublishDecision::Failed(reason) => format!("{prefix}✗ {decision}: {reason}").red(),
        PublishDecision::NoChange => format!("{prefix}✓ {decision}").normal(),
        _ => format!("{prefix}✓ {decision}").green(),
    };
    eprintln!("{line}");
    if let Some(url) = &report.pr_url {
        eprintln!("  {url}");
    }
}
