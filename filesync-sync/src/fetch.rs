//! Content fetching: scratch checkout, related-PR scan, copy into the tree.
//!
//! [`ContentFetcher::checkout`] (scratch dir, checkout, log scan) touches only
//! the job's own scratch directory, so checkouts may run concurrently.
//! [`ContentFetcher::copy_into`] writes into the shared working tree and must
//! be called serially, in declaration order.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;

use filesync_core::{FileMapping, RelatedPullReference, RepoName, SourceRepo, SubstitutionRule};

use crate::error::{io_err, SyncError};
use crate::substitute;
use crate::vcs::{CheckoutRequest, VersionControlBackend, WorkingTree};
use crate::writer::{atomic_write, WriteOutcome};

// ---------------------------------------------------------------------------
// Jobs and results
// ---------------------------------------------------------------------------

/// One source repository bound to its scratch directory for this run.
#[derive(Debug, Clone)]
pub struct SyncJob<'a> {
    pub source: &'a SourceRepo,
    pub scratch_dir: PathBuf,
}

impl<'a> SyncJob<'a> {
    pub fn new(source: &'a SourceRepo, scratch_root: &Path) -> Self {
        Self {
            source,
            scratch_dir: scratch_root.join(source.repo.relative_dir()),
        }
    }
}

/// A job after steps 1–3: content is in scratch (or it failed).
#[derive(Debug)]
pub struct Checkout<'a> {
    pub job: SyncJob<'a>,
    fetched: bool,
    related: Vec<RelatedPullReference>,
    errors: Vec<SyncError>,
}

impl Checkout<'_> {
    pub fn fetched(&self) -> bool {
        self.fetched
    }
}

/// One file written (or skipped) in the working tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CopiedFile {
    /// Path inside the source repository.
    pub src: PathBuf,
    /// Path inside the working tree.
    pub dest: PathBuf,
    pub bytes: u64,
    pub outcome: WriteOutcome,
    pub substitutions: usize,
}

/// Everything one source repository contributed to the run.
#[derive(Debug)]
pub struct FetchResult {
    pub repo: RepoName,
    pub reference: Option<String>,
    pub copied: Vec<CopiedFile>,
    pub related: Vec<RelatedPullReference>,
    pub errors: Vec<SyncError>,
}

/// Where and how fetched files land.
#[derive(Debug, Clone, Copy)]
pub struct CopyTarget<'a> {
    pub tree: &'a WorkingTree,
    /// Output root, relative to the tree root. Empty means the root itself.
    pub output_dir: &'a Path,
    pub rules: &'a [SubstitutionRule],
    /// Nest every destination under `<owner>/<name>/`.
    pub preserve_structure: bool,
    pub dry_run: bool,
}

impl CopyTarget<'_> {
    /// Tree-relative destination for one mapping of `repo`.
    pub fn destination(&self, repo: &RepoName, mapping: &FileMapping) -> PathBuf {
        let mut dest = self.output_dir.to_path_buf();
        if self.preserve_structure {
            dest.push(repo.relative_dir());
        }
        dest.push(&mapping.dest);
        dest
    }
}

// ---------------------------------------------------------------------------
// ContentFetcher
// ---------------------------------------------------------------------------

/// Materializes source repositories into the working tree.
pub struct ContentFetcher<'a> {
    backend: &'a dyn VersionControlBackend,
    token: Option<&'a str>,
    since: Option<DateTime<Utc>>,
}

impl<'a> ContentFetcher<'a> {
    pub fn new(backend: &'a dyn VersionControlBackend) -> Self {
        Self {
            backend,
            token: None,
            since: None,
        }
    }

    pub fn with_token(mut self, token: Option<&'a str>) -> Self {
        self.token = token;
        self
    }

    /// Enable the related-PR scan for commits at or after `since`.
    pub fn with_lookback_since(mut self, since: Option<DateTime<Utc>>) -> Self {
        self.since = since;
        self
    }

    /// Steps 1–4 for a single repository.
    pub fn fetch(&self, job: SyncJob<'_>, target: &CopyTarget<'_>) -> FetchResult {
        let checkout = self.checkout(job);
        self.copy_into(checkout, target)
    }

    /// Steps 1–3: fresh scratch dir, checkout at the pinned ref, log scan.
    pub fn checkout<'j>(&self, job: SyncJob<'j>) -> Checkout<'j> {
        let source = job.source;
        let label = source.label();
        let mut checkout = Checkout {
            job,
            fetched: false,
            related: Vec::new(),
            errors: Vec::new(),
        };

        if let Err(err) = reset_scratch(&checkout.job.scratch_dir) {
            tracing::error!("✗ {label}: cannot prepare scratch dir: {err}");
            checkout.errors.push(err);
            return checkout;
        }

        tracing::info!("fetching {label}");
        let request = CheckoutRequest {
            repo: &source.repo,
            reference: source.reference.as_deref(),
            token: self.token,
            dest: &checkout.job.scratch_dir,
            shallow: self.since.is_none(),
        };
        if let Err(source_err) = self.backend.checkout_ref(&request) {
            tracing::error!("✗ failed to fetch {label}: {source_err}");
            checkout.errors.push(SyncError::Fetch {
                repo: source.repo.full_name(),
                source: source_err,
            });
            return checkout;
        }
        checkout.fetched = true;

        if let Some(since) = self.since {
            let paths: Vec<PathBuf> = source.files.iter().map(|m| m.src.clone()).collect();
            match self
                .backend
                .log_subjects(&source.repo, &checkout.job.scratch_dir, &paths, since)
            {
                Ok(subjects) => {
                    checkout.related = extract_pull_numbers(&subjects)
                        .into_iter()
                        .map(|number| RelatedPullReference {
                            repo: source.repo.clone(),
                            number,
                        })
                        .collect();
                    tracing::debug!(
                        "{label}: {} related pull request(s) since {since}",
                        checkout.related.len()
                    );
                }
                Err(source_err) => {
                    tracing::warn!("{label}: log scan failed: {source_err}");
                    checkout.errors.push(SyncError::LogScan {
                        repo: source.repo.full_name(),
                        source: source_err,
                    });
                }
            }
        }

        checkout
    }

    /// Step 4: copy every mapping into the tree. A missing source path fails
    /// only its own mapping.
    pub fn copy_into(&self, checkout: Checkout<'_>, target: &CopyTarget<'_>) -> FetchResult {
        let Checkout {
            job,
            fetched,
            related,
            mut errors,
        } = checkout;
        let source = job.source;
        let mut copied = Vec::new();

        if fetched {
            for mapping in &source.files {
                copy_mapping(&job, mapping, target, &mut copied, &mut errors);
            }
        }

        if let Err(err) = std::fs::remove_dir_all(&job.scratch_dir) {
            tracing::debug!("could not remove {}: {err}", job.scratch_dir.display());
        }

        FetchResult {
            repo: source.repo.clone(),
            reference: source.reference.clone(),
            copied,
            related,
            errors,
        }
    }
}

fn reset_scratch(dir: &Path) -> Result<(), SyncError> {
    if dir.exists() {
        std::fs::remove_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))
}

fn copy_mapping(
    job: &SyncJob<'_>,
    mapping: &FileMapping,
    target: &CopyTarget<'_>,
    copied: &mut Vec<CopiedFile>,
    errors: &mut Vec<SyncError>,
) {
    let source = job.source;
    let copy_err = |src: &Path, reason: String| SyncError::Copy {
        repo: source.repo.full_name(),
        src: src.to_path_buf(),
        reason,
    };

    let src_abs = job.scratch_dir.join(&mapping.src);
    let dest_rel = target.destination(&source.repo, mapping);

    let meta = match std::fs::symlink_metadata(&src_abs) {
        Ok(meta) => meta,
        Err(_) => {
            let at = source.reference.as_deref().unwrap_or("the default branch");
            let err = copy_err(&mapping.src, format!("path does not exist at {at}"));
            tracing::error!("✗ {err}");
            errors.push(err);
            return;
        }
    };

    let files = if meta.is_dir() {
        let mut files = Vec::new();
        if let Err(err) = collect_files(&src_abs, &mut files) {
            let err = copy_err(&mapping.src, err.to_string());
            tracing::error!("✗ {err}");
            errors.push(err);
            return;
        }
        files
    } else {
        vec![src_abs.clone()]
    };

    for file in files {
        let rel = file.strip_prefix(&src_abs).unwrap_or(Path::new(""));
        let (src, dest) = if rel.as_os_str().is_empty() {
            (mapping.src.clone(), dest_rel.clone())
        } else {
            (mapping.src.join(rel), dest_rel.join(rel))
        };

        match copy_file(&file, &dest, target) {
            Ok((bytes, outcome, substitutions)) => {
                tracing::info!(
                    "✓ {}:{} -> {} ({bytes} bytes, {outcome:?})",
                    source.repo,
                    src.display(),
                    dest.display()
                );
                copied.push(CopiedFile {
                    src,
                    dest,
                    bytes,
                    outcome,
                    substitutions,
                });
            }
            Err(reason) => {
                let err = copy_err(&src, reason);
                tracing::error!("✗ {err}");
                errors.push(err);
            }
        }
    }
}

fn copy_file(
    file: &Path,
    dest_rel: &Path,
    target: &CopyTarget<'_>,
) -> Result<(u64, WriteOutcome, usize), String> {
    let meta = std::fs::symlink_metadata(file).map_err(|e| e.to_string())?;
    if meta.file_type().is_symlink() {
        return Err("symbolic links are not synced".to_string());
    }
    let raw = std::fs::read(file).map_err(|e| e.to_string())?;
    let substituted = substitute::apply_bytes(&raw, target.rules);
    if substituted.rules_matched > 0 {
        tracing::debug!(
            "{} substitution rule(s) applied to {}",
            substituted.rules_matched,
            dest_rel.display()
        );
    }
    let outcome = atomic_write(&target.tree.join(dest_rel), &substituted.bytes, target.dry_run)
        .map_err(|e| e.to_string())?;
    Ok((
        substituted.bytes.len() as u64,
        outcome,
        substituted.rules_matched,
    ))
}

/// Files under `dir`, recursively, sorted, skipping `.git`.
fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), SyncError> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| io_err(dir, e))? {
        entries.push(entry.map_err(|e| io_err(dir, e))?);
    }
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| io_err(&path, e))?;
        if file_type.is_dir() {
            if entry.file_name() == ".git" {
                continue;
            }
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

/// Every `#<digits>` token across `subjects`, first-seen order, no repeats.
pub fn extract_pull_numbers(subjects: &[String]) -> Vec<u64> {
    static PR_TOKEN: OnceLock<Regex> = OnceLock::new();
    let regex = PR_TOKEN.get_or_init(|| Regex::new(r"#(\d+)\b").unwrap());

    let mut numbers = Vec::new();
    for subject in subjects {
        for caps in regex.captures_iter(subject) {
            let Ok(number) = caps[1].parse::<u64>() else {
                continue;
            };
            if !numbers.contains(&number) {
                numbers.push(number);
            }
        }
    }
    numbers
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
