//! Exercises `GitCli` against local repositories served over `file://`.
//! Every test is a no-op when `git` is not installed.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{Duration, Utc};
use filesync_core::RepoName;
use filesync_remote::{git_available, GitCli, GitIdentity};
use filesync_renderer::PullRequestContext;
use filesync_sync::{
    BranchConfig, ChangePublisher, CheckoutRequest, Deadline, PublishDecision, PullRequestConfig,
    VcsError, VersionControlBackend, WorkingTree,
};
use tempfile::TempDir;

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(["-c", "user.name=fixture", "-c", "user.email=fixture@example.com"])
        .args(args)
        .output()
        .expect("spawn git");
    assert!(
        output.status.success(),
        "git {args:?}: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn init_repo(path: &Path) {
    fs::create_dir_all(path).unwrap();
    git(path, &["init", "-q"]);
    git(path, &["symbolic-ref", "HEAD", "refs/heads/main"]);
}

fn commit_file(repo: &Path, rel: &str, content: &str, subject: &str) {
    let path = repo.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
    git(repo, &["add", "-A"]);
    git(repo, &["commit", "-q", "-m", subject]);
}

/// `<root>/octo/templates.git` with two commits and a `v1` tag on the first.
fn source_host() -> (TempDir, RepoName, GitCli) {
    let host = TempDir::new().unwrap();
    let repo_dir = host.path().join("octo").join("templates.git");
    init_repo(&repo_dir);
    commit_file(&repo_dir, "a.txt", "v1 TOKEN", "Add a (#3)");
    git(&repo_dir, &["tag", "v1"]);
    commit_file(&repo_dir, "a.txt", "v2 TOKEN", "Update a (#4)");
    commit_file(&repo_dir, "other.txt", "x", "Unrelated (#5)");

    let cli = GitCli::new().with_base_url(format!("file://{}", host.path().display()));
    (host, RepoName::new("octo", "templates"), cli)
}

fn checkout(cli: &GitCli, repo: &RepoName, reference: Option<&str>, shallow: bool) -> (TempDir, Result<(), VcsError>) {
    let dest = TempDir::new().unwrap();
    let result = cli.checkout_ref(&CheckoutRequest {
        repo,
        reference,
        token: None,
        dest: dest.path(),
        shallow,
    });
    (dest, result)
}

#[test]
fn checks_out_default_branch_and_tags() {
    if !git_available() {
        return;
    }
    let (_host, repo, cli) = source_host();

    let (head, result) = checkout(&cli, &repo, None, true);
    result.unwrap();
    assert_eq!(fs::read_to_string(head.path().join("a.txt")).unwrap(), "v2 TOKEN");

    let (tag, result) = checkout(&cli, &repo, Some("v1"), true);
    result.unwrap();
    assert_eq!(fs::read_to_string(tag.path().join("a.txt")).unwrap(), "v1 TOKEN");
    assert!(!tag.path().join("other.txt").exists());
}

#[test]
fn unknown_ref_is_ref_not_found() {
    if !git_available() {
        return;
    }
    let (_host, repo, cli) = source_host();

    let (_dest, result) = checkout(&cli, &repo, Some("no-such-branch"), true);

    assert!(
        matches!(&result, Err(VcsError::RefNotFound { reference, .. }) if reference == "no-such-branch"),
        "{result:?}"
    );
}

#[test]
fn option_shaped_ref_is_never_run() {
    if !git_available() {
        return;
    }
    let (host, repo, cli) = source_host();
    let marker = host.path().join("pwned");
    let reference = format!("--upload-pack=touch {};git-upload-pack", marker.display());

    let (_dest, result) = checkout(&cli, &repo, Some(&reference), true);

    assert!(result.is_err(), "an option-shaped ref must not fetch anything");
    assert!(!marker.exists(), "ref was handed to git as an option");
}

#[test]
fn log_subjects_are_limited_to_paths() {
    if !git_available() {
        return;
    }
    let (_host, repo, cli) = source_host();
    let (dest, result) = checkout(&cli, &repo, Some("v1"), false);
    result.unwrap();

    let subjects = cli
        .log_subjects(&repo, dest.path(), &[PathBuf::from("a.txt")], Utc::now() - Duration::days(7))
        .unwrap();

    assert_eq!(subjects, vec!["Update a (#4)".to_string(), "Add a (#3)".to_string()]);
}

#[test]
fn publish_round_trip_is_idempotent() {
    if !git_available() {
        return;
    }
    let root = TempDir::new().unwrap();
    let bare = root.path().join("target.git");
    fs::create_dir_all(&bare).unwrap();
    git(&bare, &["init", "-q", "--bare"]);
    git(&bare, &["symbolic-ref", "HEAD", "refs/heads/main"]);

    let work = root.path().join("work");
    init_repo(&work);
    commit_file(&work, "README.md", "app", "initial");
    git(&work, &["remote", "add", "origin", bare.to_str().unwrap()]);
    git(&work, &["push", "-q", "origin", "main"]);

    let cli = GitCli::new().with_identity(Some(GitIdentity::default()));
    let tree = WorkingTree::new(&work);
    let branches = BranchConfig::default();
    let context = || PullRequestContext::new("me/app", "sync/repo-files", "main", Utc::now());

    let prepared = ChangePublisher::new(&cli, &tree).start(&branches).unwrap();
    assert_eq!(prepared.base_branch(), "main");
    assert!(!prepared.resumed());
    fs::write(work.join("synced.txt"), "hello world").unwrap();
    let first = prepared
        .publish(&PullRequestConfig::default(), context(), &Deadline::unbounded())
        .unwrap();
    assert_eq!(first.decision, PublishDecision::CommittedOnly);
    git(&bare, &["rev-parse", "--verify", "refs/heads/sync/repo-files"]);

    // A fresh run starts from the base branch again.
    git(&work, &["checkout", "-q", "main"]);
    let prepared = ChangePublisher::new(&cli, &tree).start(&branches).unwrap();
    assert!(prepared.resumed());
    fs::write(work.join("synced.txt"), "hello world").unwrap();
    let second = prepared
        .publish(&PullRequestConfig::default(), context(), &Deadline::unbounded())
        .unwrap();
    assert_eq!(second.decision, PublishDecision::NoChange);

    let log = git(&bare, &["log", "--format=%s", "refs/heads/sync/repo-files"]);
    assert_eq!(
        log.lines().collect::<Vec<_>>(),
        vec!["chore(sync): update files from source repositories", "initial"]
    );
}
