//! Config loading integration tests: files on disk, envs_file resolution,
//! error messages.

use std::path::PathBuf;

use assert_fs::prelude::*;
use filesync_core::{
    config::{self, ResolvedConfig},
    ConfigError, FileMapping, RepoName, SubstitutionRule,
};
use predicates::prelude::predicate;
use rstest::rstest;

fn write_config(dir: &assert_fs::TempDir, yaml: &str) -> PathBuf {
    let file = dir.child("repo-file-sync.yaml");
    file.write_str(yaml).expect("write config");
    file.path().to_path_buf()
}

fn load(yaml: &str) -> Result<ResolvedConfig, ConfigError> {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let path = write_config(&dir, yaml);
    config::load(&path)
}

// ---------------------------------------------------------------------------
// 1. Happy paths
// ---------------------------------------------------------------------------

#[test]
fn loads_simple_form_from_disk() {
    let cfg = load("o/r:\n  - a.txt\n").expect("load");
    assert_eq!(cfg.sources.len(), 1);
    assert_eq!(cfg.sources[0].repo, RepoName::new("o", "r"));
    assert_eq!(cfg.sources[0].files, vec![FileMapping::same_path("a.txt")]);
    assert!(cfg.rules.is_empty());
    assert_eq!(cfg.file_count(), 1);
}

#[test]
fn envs_file_is_resolved_relative_to_config() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    dir.child("envs.yaml")
        .write_str("- name: TOKEN\n  value: world\n")
        .expect("write envs");
    let path = write_config(
        &dir,
        "envs_file: envs.yaml\nenvs:\n  - { name: FIRST, value: one }\nsources:\n  - repo: o/r\n    files: [a.txt]\n",
    );

    let cfg = config::load(&path).expect("load");
    assert_eq!(
        cfg.rules,
        vec![
            SubstitutionRule::new("FIRST", "one"),
            SubstitutionRule::new("TOKEN", "world"),
        ],
        "inline envs come before envs_file rules"
    );
}

#[test]
fn envs_file_works_with_simple_form() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    dir.child("vars.yaml")
        .write_str("- { name: ORG, value: octo }\n")
        .expect("write envs");
    let path = write_config(&dir, "envs_file: vars.yaml\no/r: [a.txt]\n");

    let cfg = config::load(&path).expect("load");
    assert_eq!(cfg.rules, vec![SubstitutionRule::new("ORG", "octo")]);
    assert_eq!(cfg.sources.len(), 1, "setting keys are not repositories");
}

// ---------------------------------------------------------------------------
// 2. Error messages
// ---------------------------------------------------------------------------

#[test]
fn missing_config_returns_not_found() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let missing = dir.child("absent.yaml");
    missing.assert(predicate::path::missing());

    let err = config::load(missing.path()).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound { .. }), "got: {err}");
    assert!(err.to_string().contains("absent.yaml"));
}

#[test]
fn missing_envs_file_is_a_config_error() {
    let err = load("envs_file: nope.yaml\no/r: [a.txt]\n").unwrap_err();
    assert!(matches!(err, ConfigError::EnvsFileMissing { .. }), "got: {err}");
    assert!(err.to_string().contains("nope.yaml"));
}

#[test]
fn corrupt_yaml_returns_parse_error_with_path() {
    let err = load(": : corrupt : yaml : !!!\n  - broken: [unclosed").unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("repo-file-sync.yaml"));
}

#[test]
fn corrupt_envs_file_names_the_envs_file() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    dir.child("envs.yaml")
        .write_str("name: not-a-list\n")
        .expect("write envs");
    let path = write_config(&dir, "envs_file: envs.yaml\no/r: [a.txt]\n");

    let err = config::load(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("envs.yaml"), "got: {err}");
}

#[rstest]
#[case("octo: [a]\n")]
#[case("octo/: [a]\n")]
#[case("a/b/c: [a]\n")]
#[case("o/r@: [a]\n")]
fn malformed_repository_keys_are_rejected(#[case] yaml: &str) {
    let err = load(yaml).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidRepo { .. }), "got: {err}");
}

#[rstest]
#[case("/etc/passwd")]
#[case("../outside.txt")]
#[case("a/../../b")]
#[case("")]
fn destinations_outside_the_tree_are_rejected(#[case] dest: &str) {
    let yaml = format!("sources:\n  - repo: o/r\n    files:\n      - {{ src: a.txt, dest: '{dest}' }}\n");
    let err = load(&yaml).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidPath { .. }), "got: {err}");
}

#[rstest]
#[case(".git/config")]
#[case("nested/.git/HEAD")]
#[case(".git")]
fn sources_inside_git_metadata_are_rejected(#[case] src: &str) {
    let yaml = format!("o/r:\n  - {{ src: '{src}', dest: copied.txt }}\n");
    let err = load(&yaml).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidPath { .. }), "got: {err}");
    assert!(err.to_string().contains(".git"), "got: {err}");
}

#[rstest]
#[case("o/r@--upload-pack=touch /tmp/x: [a.txt]\n")]
#[case("o/r@-q: [a.txt]\n")]
fn refs_that_parse_as_git_options_are_rejected(#[case] yaml: &str) {
    let err = load(yaml).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidRef { .. }), "got: {err}");
}
