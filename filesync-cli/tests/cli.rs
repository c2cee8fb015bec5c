use std::fs;
use std::net::TcpListener;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

fn sync_cmd() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("repo-file-sync"));
    cmd.env_remove("GITHUB_TOKEN")
        .env_remove("GITHUB_REPOSITORY")
        .env_remove("GITHUB_OUTPUT")
        .env_remove("RUST_LOG");
    cmd
}

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(["-c", "user.name=fixture", "-c", "user.email=fixture@example.com"])
        .args(args)
        .output()
        .expect("spawn git");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
}

/// `<host>/octo/templates.git` holding `a.txt = "hello TOKEN"`.
fn source_host() -> TempDir {
    let host = TempDir::new().expect("host");
    let repo = host.path().join("octo").join("templates.git");
    fs::create_dir_all(&repo).unwrap();
    git(&repo, &["init", "-q"]);
    git(&repo, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    fs::write(repo.join("a.txt"), "hello TOKEN").unwrap();
    git(&repo, &["add", "-A"]);
    git(&repo, &["commit", "-q", "-m", "initial"]);
    host
}

fn write_config(dir: &Path, yaml: &str) -> std::path::PathBuf {
    let path = dir.join("repo-file-sync.yaml");
    fs::write(&path, yaml).unwrap();
    path
}

#[test]
fn help_lists_subcommands() {
    sync_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("sync").and(contains("check-config")).and(contains("test-connection")));
}

#[test]
fn check_config_prints_jobs() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        dir.path(),
        "envs:\n  - { name: TOKEN, value: secret-value }\nocto/templates@v1:\n  - a.txt\n  - { src: ci.yml, dest: .github/workflows/ci.yml }\n",
    );

    sync_cmd()
        .args(["check-config", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(contains("octo/templates@v1").and(contains(".github/workflows/ci.yml")));

    sync_cmd()
        .args(["check-config", "--json", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(contains("\"TOKEN\"").and(contains("secret-value").not()));
}

#[test]
fn check_config_missing_file_exits_2() {
    let dir = TempDir::new().unwrap();
    sync_cmd()
        .args(["check-config", "--config"])
        .arg(dir.path().join("absent.yaml"))
        .assert()
        .code(2)
        .stderr(contains("not found"));
}

#[test]
fn escaping_destination_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        dir.path(),
        "sources:\n  - repo: octo/templates\n    files:\n      - { src: a.txt, dest: ../outside.txt }\n",
    );
    sync_cmd()
        .args(["check-config", "--config"])
        .arg(&config)
        .assert()
        .code(2)
        .stderr(contains("outside.txt"));
}

#[test]
fn scratch_inside_work_tree_is_rejected() {
    let work = TempDir::new().unwrap();
    let config = write_config(work.path(), "octo/templates: [a.txt]\n");
    sync_cmd()
        .args(["sync", "--dry-run", "--config"])
        .arg(&config)
        .arg("--work-tree")
        .arg(work.path())
        .arg("--scratch-dir")
        .arg(work.path().join("scratch"))
        .assert()
        .code(2)
        .stderr(contains("outside the work tree"));
}

#[test]
fn output_outside_work_tree_is_rejected() {
    let work = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let meta = TempDir::new().unwrap();
    let config = write_config(meta.path(), "octo/templates: [a.txt]\n");

    sync_cmd()
        .args(["sync", "--dry-run", "--output", "../elsewhere", "--config"])
        .arg(&config)
        .arg("--work-tree")
        .arg(work.path())
        .arg("--scratch-dir")
        .arg(scratch.path())
        .assert()
        .code(2)
        .stderr(contains("invalid output directory"));
}

#[test]
fn dry_run_sync_reports_outputs_and_writes_nothing() {
    if !git_available() {
        return;
    }
    let host = source_host();
    let work = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let meta = TempDir::new().unwrap();
    let config = write_config(
        meta.path(),
        "envs:\n  - { name: TOKEN, value: world }\nocto/templates: [a.txt]\n",
    );
    let github_output = meta.path().join("github_output");

    sync_cmd()
        .env("GITHUB_OUTPUT", &github_output)
        .args(["sync", "--dry-run", "--config"])
        .arg(&config)
        .arg("--work-tree")
        .arg(work.path())
        .arg("--scratch-dir")
        .arg(scratch.path())
        .arg("--git-base-url")
        .arg(format!("file://{}", host.path().display()))
        .assert()
        .success()
        .stdout(
            contains("synced_files=octo/templates:a.txt")
                .and(contains("decision=no_change"))
                .and(contains("dry_run=true")),
        );

    assert!(!work.path().join("a.txt").exists(), "dry-run must not write");
    let outputs = fs::read_to_string(&github_output).unwrap();
    assert!(outputs.contains("synced_count=1"), "{outputs}");
}

#[test]
fn sync_writes_substituted_content_as_json_report() {
    if !git_available() {
        return;
    }
    let host = source_host();
    let work = TempDir::new().unwrap();
    git(work.path(), &["init", "-q"]);
    git(work.path(), &["symbolic-ref", "HEAD", "refs/heads/main"]);
    fs::write(work.path().join("README.md"), "app").unwrap();
    git(work.path(), &["add", "-A"]);
    git(work.path(), &["commit", "-q", "-m", "initial"]);
    let remote = TempDir::new().unwrap();
    git(remote.path(), &["init", "-q", "--bare"]);
    git(work.path(), &["remote", "add", "origin", remote.path().to_str().unwrap()]);

    let scratch = TempDir::new().unwrap();
    let meta = TempDir::new().unwrap();
    let config = write_config(
        meta.path(),
        "envs:\n  - { name: TOKEN, value: world }\nocto/templates: [a.txt]\n",
    );

    sync_cmd()
        .args(["sync", "--json", "--config"])
        .arg(&config)
        .arg("--work-tree")
        .arg(work.path())
        .arg("--scratch-dir")
        .arg(scratch.path())
        .arg("--git-base-url")
        .arg(format!("file://{}", host.path().display()))
        .assert()
        .success()
        .stdout(contains("\"decision\": \"committed_only\""));

    assert_eq!(
        fs::read_to_string(work.path().join("a.txt")).unwrap(),
        "hello world"
    );
}

#[test]
fn missing_source_is_partial_failure() {
    if !git_available() {
        return;
    }
    let host = source_host();
    let work = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let meta = TempDir::new().unwrap();
    let config = write_config(meta.path(), "octo/templates: [a.txt]\nocto/missing: [b.txt]\n");

    sync_cmd()
        .args(["sync", "--dry-run", "--config"])
        .arg(&config)
        .arg("--work-tree")
        .arg(work.path())
        .arg("--scratch-dir")
        .arg(scratch.path())
        .arg("--git-base-url")
        .arg(format!("file://{}", host.path().display()))
        .assert()
        .code(1)
        .stdout(contains("failed_count=1").and(contains("synced_count=1")));
}

#[test]
fn test_connection_fails_for_unreachable_api() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    sync_cmd()
        .args(["test-connection", "--timeout", "2", "--api-url"])
        .arg(&url)
        .assert()
        .code(1)
        .stderr(contains("cannot reach"));
}
