//! Sync configuration - YAML schema and resolution into [`SourceRepo`]s.
//!
//! # Canonical (rich) form
//!
//! ```yaml
//! envs_file: envs.yaml        # sibling file of [{name, value}]
//! envs:
//!   - { name: TOKEN, value: world }
//! lookback_days: 7
//! sources:
//!   - repo: octo/templates    # may carry an @ref suffix
//!     ref: main
//!     files:
//!       - .github/ISSUE_TEMPLATE/bug.md
//!       - { src: ci/rust.yml, dest: .github/workflows/ci.yml }
//! ```
//!
//! # Simple form
//!
//! ```yaml
//! octo/templates@main:
//!   - .editorconfig
//! ```
//!
//! The simple form is sugar: it is rewritten into the rich form before
//! deserialization, so there is exactly one schema to validate. A document is
//! rich iff it has a `sources` key.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;
use serde_yaml::{Mapping, Value};

use crate::error::{io_err, ConfigError};
use crate::types::{check_reference, parse_repo_spec, FileMapping, SourceRepo, SubstitutionRule};

/// Keys that configure the run rather than name a source repository.
const SETTING_KEYS: &[&str] = &["envs", "envs_file", "lookback_days"];

// ---------------------------------------------------------------------------
// On-disk schema
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    envs: Vec<RawRule>,
    envs_file: Option<PathBuf>,
    lookback_days: Option<u32>,
    sources: Vec<RawSource>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSource {
    repo: String,
    #[serde(rename = "ref")]
    reference: Option<String>,
    files: Vec<RawFile>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawFile {
    Path(String),
    Mapping { src: String, dest: Option<String> },
}

#[derive(Debug, Deserialize)]
struct RawRule {
    name: String,
    value: Value,
}

// ---------------------------------------------------------------------------
// Resolved form
// ---------------------------------------------------------------------------

/// Fully validated configuration for one run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolvedConfig {
    /// Source repositories in declaration order.
    pub sources: Vec<SourceRepo>,
    /// Inline `envs` first, then `envs_file` rules.
    pub rules: Vec<SubstitutionRule>,
    /// Related-PR lookback window; `None` disables the log scan.
    pub lookback_days: Option<u32>,
}

impl ResolvedConfig {
    pub fn file_count(&self) -> usize {
        self.sources.iter().map(|s| s.files.len()).sum()
    }
}

// ---------------------------------------------------------------------------
// Load / resolve
// ---------------------------------------------------------------------------

/// Load and resolve the configuration file at `path`.
///
/// Returns `ConfigError::NotFound` if absent and `ConfigError::Parse` (with
/// path + line context) if malformed.
pub fn load(path: &Path) -> Result<ResolvedConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    resolve(&contents, path)
}

/// Resolve raw YAML text. `origin` is the file the text came from; it anchors
/// a relative `envs_file` and labels parse errors.
pub fn resolve(raw: &str, origin: &Path) -> Result<ResolvedConfig, ConfigError> {
    let parse_err = |source| ConfigError::Parse {
        path: origin.to_path_buf(),
        source,
    };

    let document: Value = serde_yaml::from_str(raw).map_err(parse_err)?;
    let Value::Mapping(mapping) = document else {
        return Err(ConfigError::NotAMapping {
            path: origin.to_path_buf(),
        });
    };

    let canonical = if mapping.contains_key("sources") {
        mapping
    } else {
        desugar_simple_form(mapping)?
    };
    let raw_config: RawConfig =
        serde_yaml::from_value(Value::Mapping(canonical)).map_err(parse_err)?;

    let base_dir = origin.parent().unwrap_or_else(|| Path::new(""));
    let mut rules = convert_rules(raw_config.envs, 0)?;
    if let Some(envs_file) = raw_config.envs_file {
        let envs_path = base_dir.join(envs_file);
        let offset = rules.len();
        rules.extend(load_envs_file(&envs_path, offset)?);
    }

    let mut seen = HashSet::new();
    let mut sources = Vec::with_capacity(raw_config.sources.len());
    for raw_source in raw_config.sources {
        let source = convert_source(raw_source)?;
        if !seen.insert(source.repo.clone()) {
            return Err(ConfigError::DuplicateRepo {
                repo: source.repo.full_name(),
            });
        }
        sources.push(source);
    }

    Ok(ResolvedConfig {
        sources,
        rules,
        lookback_days: raw_config.lookback_days.filter(|days| *days > 0),
    })
}

/// Rewrite `{"owner/name[@ref]": [files]}` into `{sources: [{repo, files}]}`,
/// keeping setting keys where they are.
fn desugar_simple_form(mapping: Mapping) -> Result<Mapping, ConfigError> {
    let mut canonical = Mapping::new();
    let mut sources = Vec::new();

    for (key, value) in mapping {
        let Value::String(key) = key else {
            return Err(ConfigError::InvalidRepo {
                spec: format!("{key:?}"),
                reason: "repository keys must be strings".to_string(),
            });
        };
        if SETTING_KEYS.contains(&key.as_str()) {
            canonical.insert(Value::String(key), value);
            continue;
        }
        let mut entry = Mapping::new();
        entry.insert("repo".into(), Value::String(key));
        entry.insert("files".into(), value);
        sources.push(Value::Mapping(entry));
    }

    canonical.insert("sources".into(), Value::Sequence(sources));
    Ok(canonical)
}

fn convert_source(raw: RawSource) -> Result<SourceRepo, ConfigError> {
    let (repo, suffix_ref) = parse_repo_spec(&raw.repo)?;
    let reference = match (suffix_ref, raw.reference) {
        (Some(suffix), Some(field)) if suffix != field => {
            return Err(ConfigError::ConflictingRef {
                repo: repo.full_name(),
                suffix,
                field,
            });
        }
        (Some(suffix), _) => Some(suffix),
        (None, field) => field.filter(|r| !r.is_empty()),
    };
    if let Some(reference) = &reference {
        check_reference(&raw.repo, reference)?;
    }

    let full_name = repo.full_name();
    let mut files = Vec::with_capacity(raw.files.len());
    for file in raw.files {
        let (src, dest) = match file {
            RawFile::Path(path) => (path.clone(), path),
            RawFile::Mapping { src, dest } => {
                let dest = dest.unwrap_or_else(|| src.clone());
                (src, dest)
            }
        };
        files.push(FileMapping {
            src: checked_relative(&full_name, &src)?,
            dest: checked_relative(&full_name, &dest)?,
        });
    }

    Ok(SourceRepo {
        repo,
        reference,
        files,
    })
}

fn checked_relative(repo: &str, raw: &str) -> Result<PathBuf, ConfigError> {
    clean_relative(raw).map_err(|reason| ConfigError::InvalidPath {
        repo: repo.to_string(),
        path: raw.to_string(),
        reason,
    })
}

/// Lexically normalise a relative path, refusing anything that would land
/// outside its root or inside a `.git` directory.
pub fn clean_relative(raw: &str) -> Result<PathBuf, &'static str> {
    let cleaned = normalize(raw)?;
    if cleaned.as_os_str().is_empty() {
        return Err("resolves to the root itself");
    }
    Ok(cleaned)
}

/// Like [`clean_relative`], but the root itself (`.` or empty) is allowed and
/// comes back as an empty path.
pub fn clean_output_root(raw: &str) -> Result<PathBuf, &'static str> {
    if raw.trim().is_empty() {
        return Ok(PathBuf::new());
    }
    normalize(raw)
}

fn normalize(raw: &str) -> Result<PathBuf, &'static str> {
    if raw.trim().is_empty() {
        return Err("path is empty");
    }
    let mut cleaned = PathBuf::new();
    let mut depth = 0usize;
    for component in Path::new(raw).components() {
        match component {
            Component::Normal(part) => {
                if part.to_string_lossy().eq_ignore_ascii_case(".git") {
                    return Err("must not reach into a .git directory");
                }
                cleaned.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return Err("escapes its root");
                }
                cleaned.pop();
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => return Err("must be relative"),
        }
    }
    Ok(cleaned)
}

fn load_envs_file(path: &Path, offset: usize) -> Result<Vec<SubstitutionRule>, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::EnvsFileMissing {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let raw: Vec<RawRule> = serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    convert_rules(raw, offset)
}

fn convert_rules(raw: Vec<RawRule>, offset: usize) -> Result<Vec<SubstitutionRule>, ConfigError> {
    raw.into_iter()
        .enumerate()
        .map(|(i, rule)| {
            let index = offset + i;
            if rule.name.is_empty() {
                return Err(ConfigError::InvalidRule {
                    index,
                    reason: "name must not be empty".to_string(),
                });
            }
            let value = match rule.value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null => String::new(),
                other => {
                    return Err(ConfigError::InvalidRule {
                        index,
                        reason: format!("value for '{}' must be a scalar, got {other:?}", rule.name),
                    });
                }
            };
            Ok(SubstitutionRule::new(rule.name, value))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
