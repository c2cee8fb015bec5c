//! Domain types for a sync run.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.
//! Everything here is immutable once the configuration is resolved.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A repository identity on the code host: `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoName {
    pub owner: String,
    pub name: String,
}

impl RepoName {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// `owner/name`.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// `owner/name` as a relative path, one directory per component. Used
    /// for scratch directories and nested destinations; distinct
    /// repositories never share a directory.
    pub fn relative_dir(&self) -> PathBuf {
        Path::new(&self.owner).join(&self.name)
    }
}

impl fmt::Display for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepoName {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ConfigError::InvalidRepo {
            spec: s.to_string(),
            reason: reason.to_string(),
        };

        let Some((owner, name)) = s.split_once('/') else {
            return Err(invalid("expected 'owner/name'"));
        };
        if owner.is_empty() || name.is_empty() {
            return Err(invalid("owner and name must be non-empty"));
        }
        if name.contains('/') {
            return Err(invalid("expected exactly one '/'"));
        }
        for part in [owner, name] {
            if part == "." || part == ".." {
                return Err(invalid("'.' and '..' are not repository names"));
            }
            if part.starts_with('-') {
                return Err(invalid("owner and name must not start with '-'"));
            }
            if !part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
            {
                return Err(invalid(
                    "only ASCII letters, digits, '.', '-' and '_' are allowed",
                ));
            }
        }
        Ok(Self::new(owner, name))
    }
}

/// Reject refs git could read as something other than a ref name.
pub fn check_reference(spec: &str, reference: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidRef {
        spec: spec.to_string(),
        reference: reference.to_string(),
        reason: reason.to_string(),
    };
    if reference.is_empty() {
        return Err(invalid("ref is empty"));
    }
    if reference.starts_with('-') {
        return Err(invalid("ref must not start with '-'"));
    }
    if reference.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(invalid("ref must not contain whitespace or control characters"));
    }
    Ok(())
}

/// Split `owner/name[@ref]` into its repository and optional ref.
pub fn parse_repo_spec(spec: &str) -> Result<(RepoName, Option<String>), ConfigError> {
    match spec.split_once('@') {
        Some((repo, reference)) => {
            if reference.is_empty() {
                return Err(ConfigError::InvalidRepo {
                    spec: spec.to_string(),
                    reason: "empty ref after '@'".to_string(),
                });
            }
            check_reference(spec, reference)?;
            Ok((repo.parse()?, Some(reference.to_string())))
        }
        None => Ok((spec.parse()?, None)),
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// One copy instruction: `src` inside the source repo, `dest` inside the
/// output root of the working tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMapping {
    /// Relative to the source repository root. May be a directory.
    pub src: PathBuf,
    /// Relative to the output root; never escapes it.
    pub dest: PathBuf,
}

impl FileMapping {
    pub fn same_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            src: path.clone(),
            dest: path,
        }
    }
}

/// A remote repository configured as a provider of files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRepo {
    pub repo: RepoName,
    /// Branch, tag or sha. `None` means the remote's default branch.
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub files: Vec<FileMapping>,
}

impl SourceRepo {
    /// Label used in logs and outputs: `owner/name@ref` or `owner/name`.
    pub fn label(&self) -> String {
        match &self.reference {
            Some(r) => format!("{}@{}", self.repo, r),
            None => self.repo.full_name(),
        }
    }
}

/// A literal token and its replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubstitutionRule {
    pub name: String,
    pub value: String,
}

impl SubstitutionRule {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// An upstream pull request mentioned by a commit touching synced paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelatedPullReference {
    pub repo: RepoName,
    pub number: u64,
}

impl RelatedPullReference {
    pub fn url(&self) -> String {
        format!("https://github.com/{}/pull/{}", self.repo, self.number)
    }
}

impl fmt::Display for RelatedPullReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.repo, self.number)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_name_display_and_dir() {
        let repo = RepoName::new("octo", "templates");
        assert_eq!(repo.to_string(), "octo/templates");
        assert_eq!(repo.full_name(), "octo/templates");
        assert_eq!(repo.relative_dir(), Path::new("octo").join("templates"));
    }

    #[test]
    fn underscore_names_get_distinct_dirs() {
        let a: RepoName = "a_b/c".parse().unwrap();
        let b: RepoName = "a/b_c".parse().unwrap();
        assert_ne!(a.relative_dir(), b.relative_dir());
    }

    #[test]
    fn repo_name_rejects_bad_shapes() {
        assert!("octo".parse::<RepoName>().is_err());
        assert!("/templates".parse::<RepoName>().is_err());
        assert!("octo/".parse::<RepoName>().is_err());
        assert!("a/b/c".parse::<RepoName>().is_err());
        assert!("oc to/x".parse::<RepoName>().is_err());
        assert!("../x".parse::<RepoName>().is_err());
        assert!("o/..".parse::<RepoName>().is_err());
        assert!("-o/x".parse::<RepoName>().is_err());
        assert!("o/x;y".parse::<RepoName>().is_err());
        assert!("octo/.github".parse::<RepoName>().is_ok());
    }

    #[test]
    fn repo_spec_splits_ref() {
        let (repo, reference) = parse_repo_spec("octo/templates@v2").unwrap();
        assert_eq!(repo, RepoName::new("octo", "templates"));
        assert_eq!(reference.as_deref(), Some("v2"));

        let (_, none) = parse_repo_spec("octo/templates").unwrap();
        assert!(none.is_none());

        assert!(parse_repo_spec("octo/templates@").is_err());
    }

    #[test]
    fn refs_that_look_like_options_are_rejected() {
        let err = parse_repo_spec("octo/templates@--upload-pack=touch pwned").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRef { .. }), "got: {err}");
        assert!(parse_repo_spec("octo/templates@-v").is_err());
        assert!(parse_repo_spec("octo/templates@release/1.x").is_ok());
    }

    #[test]
    fn related_reference_renders_qualified() {
        let r = RelatedPullReference {
            repo: RepoName::new("octo", "templates"),
            number: 42,
        };
        assert_eq!(r.to_string(), "octo/templates#42");
        assert_eq!(r.url(), "https://github.com/octo/templates/pull/42");
    }

    #[test]
    fn source_label_includes_ref_when_pinned() {
        let mut source = SourceRepo {
            repo: RepoName::new("o", "r"),
            reference: None,
            files: vec![FileMapping::same_path("a.txt")],
        };
        assert_eq!(source.label(), "o/r");
        source.reference = Some("main".into());
        assert_eq!(source.label(), "o/r@main");
    }
}
