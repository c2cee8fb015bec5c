//! The sync orchestrator: one run from resolved config to [`RunReport`].
//!
//! ## Phases
//!
//! 1. Prepare the work branch (skipped in dry-run).
//! 2. Check out every source into scratch on a bounded worker pool.
//! 3. Copy into the working tree serially, in declaration order, so
//!    overlapping destinations resolve last-declared-wins.
//! 4. Publish once.
//!
//! Errors before phase 2 come back as `Err`. After that a fatal error is
//! recorded as [`PublishDecision::Failed`] on the returned report so the
//! per-repo outcomes are never lost.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;

use filesync_core::{config, ResolvedConfig};
use filesync_renderer::PullRequestContext;

use crate::deadline::{Deadline, Elapsed};
use crate::error::SyncError;
use crate::fetch::{Checkout, ContentFetcher, CopyTarget, SyncJob};
use crate::publish::{BranchConfig, ChangePublisher, PublishDecision, PullRequestConfig};
use crate::report::{RepoOutcome, RunReport};
use crate::tracker::IssueTrackerClient;
use crate::vcs::{VersionControlBackend, WorkingTree};

pub const DEFAULT_JOBS: usize = 4;

/// Process-level switches for one run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub work_tree: PathBuf,
    /// Output root, relative to `work_tree`. Must stay inside it.
    pub output_dir: PathBuf,
    /// Parent of the per-run scratch directory. Must be outside `work_tree`.
    pub scratch_root: PathBuf,
    pub token: Option<String>,
    pub dry_run: bool,
    pub strict: bool,
    pub preserve_structure: bool,
    /// Overrides the config file's `lookback_days`; `Some(0)` disables the scan.
    pub lookback_days: Option<u32>,
    pub jobs: usize,
    pub run_timeout: Option<Duration>,
    pub branch: BranchConfig,
    pub pull_request: PullRequestConfig,
}

impl SyncOptions {
    pub fn new(work_tree: impl Into<PathBuf>, scratch_root: impl Into<PathBuf>) -> Self {
        Self {
            work_tree: work_tree.into(),
            output_dir: PathBuf::new(),
            scratch_root: scratch_root.into(),
            token: None,
            dry_run: false,
            strict: false,
            preserve_structure: false,
            lookback_days: None,
            jobs: DEFAULT_JOBS,
            run_timeout: None,
            branch: BranchConfig::default(),
            pull_request: PullRequestConfig::default(),
        }
    }
}

pub struct SyncOrchestrator<'a> {
    backend: &'a dyn VersionControlBackend,
    tracker: Option<&'a dyn IssueTrackerClient>,
}

impl<'a> SyncOrchestrator<'a> {
    pub fn new(backend: &'a dyn VersionControlBackend) -> Self {
        Self {
            backend,
            tracker: None,
        }
    }

    pub fn with_tracker(mut self, tracker: Option<&'a dyn IssueTrackerClient>) -> Self {
        self.tracker = tracker;
        self
    }

    /// Load the config file, then [`run`](Self::run).
    pub fn run_from_path(
        &self,
        config_path: &Path,
        options: &SyncOptions,
    ) -> Result<RunReport, SyncError> {
        let config = config::load(config_path)?;
        tracing::info!(
            "loaded {}: {} source(s), {} mapping(s)",
            config_path.display(),
            config.sources.len(),
            config.file_count()
        );
        self.run(&config, options)
    }

    pub fn run(&self, config: &ResolvedConfig, options: &SyncOptions) -> Result<RunReport, SyncError> {
        let output_dir = filesync_core::config::clean_output_root(&options.output_dir.to_string_lossy())
            .map_err(|reason| SyncError::InvalidOutput {
                path: options.output_dir.clone(),
                reason,
            })?;
        let deadline = options
            .run_timeout
            .map(Deadline::new)
            .unwrap_or_else(Deadline::unbounded);
        let tree = WorkingTree::new(&options.work_tree);
        let mut report = RunReport::new(options.dry_run);

        let prepared = if options.dry_run {
            tracing::info!("[dry-run] nothing will be committed");
            None
        } else {
            Some(
                ChangePublisher::new(self.backend, &tree)
                    .with_tracker(self.tracker)
                    .start(&options.branch)?,
            )
        };

        let scratch = options
            .scratch_root
            .join(format!("run-{}", std::process::id()));
        let copy_target = CopyTarget {
            tree: &tree,
            output_dir: &output_dir,
            rules: &config.rules,
            preserve_structure: options.preserve_structure,
            dry_run: options.dry_run,
        };
        let result = self.sync_sources(config, options, &copy_target, &scratch, &deadline, &mut report);
        if let Err(err) = std::fs::remove_dir_all(&scratch) {
            tracing::debug!("could not remove {}: {err}", scratch.display());
        }
        if let Err(err) = result {
            return Ok(failed(report, err));
        }

        let failed_count = report.failed_count();
        if options.strict && failed_count > 0 {
            tracing::error!("strict mode: {failed_count} error(s), nothing published");
            report.finish(
                PublishDecision::Failed(format!("strict mode: {failed_count} source error(s)")),
                None,
            );
            return Ok(report);
        }

        let Some(prepared) = prepared else {
            report.finish(PublishDecision::NoChange, None);
            return Ok(report);
        };

        if let Err(err) = deadline.check("publish") {
            return Ok(failed(report, err.into()));
        }

        let target = options.pull_request.target.as_ref();
        let mut context = PullRequestContext::new(
            target.map(|t| t.full_name()).unwrap_or_default(),
            prepared.work_branch(),
            prepared.base_branch(),
            Utc::now(),
        );
        for (source, outcome) in config.sources.iter().zip(&report.repos) {
            let files = outcome
                .files
                .iter()
                .map(|f| (f.src.display().to_string(), f.dest.display().to_string()))
                .collect();
            // Only the target repository's own upstream pull requests are linked.
            let related: Vec<_> = outcome
                .related
                .iter()
                .filter(|r| Some(&r.repo) == target)
                .cloned()
                .collect();
            context.push_source(source, files, &related);
        }

        match prepared.publish(&options.pull_request, context, &deadline) {
            Ok(published) => {
                let pr_url = published.pull_request.map(|p| p.url);
                report.finish(published.decision, pr_url);
                Ok(report)
            }
            Err(err) => Ok(failed(report, err.into())),
        }
    }

    fn sync_sources(
        &self,
        config: &ResolvedConfig,
        options: &SyncOptions,
        target: &CopyTarget<'_>,
        scratch: &Path,
        deadline: &Deadline,
        report: &mut RunReport,
    ) -> Result<(), SyncError> {
        deadline.check("fetch")?;

        let lookback = options.lookback_days.or(config.lookback_days).filter(|d| *d > 0);
        let since = lookback.map(|days| Utc::now() - chrono::Duration::days(i64::from(days)));
        let fetcher = ContentFetcher::new(self.backend)
            .with_token(options.token.as_deref())
            .with_lookback_since(since);

        let jobs = config
            .sources
            .iter()
            .map(|source| SyncJob::new(source, scratch))
            .collect();
        let checkouts = checkout_all(&fetcher, jobs, options.jobs, deadline)?;

        for checkout in checkouts {
            deadline.check("copy")?;
            let result = fetcher.copy_into(checkout, target);
            let outcome = RepoOutcome::from(result);
            if outcome.is_clean() {
                tracing::info!("✓ {}: {} file(s)", outcome.repo, outcome.files.len());
            } else {
                tracing::warn!(
                    "✗ {}: {} file(s), {} error(s)",
                    outcome.repo,
                    outcome.files.len(),
                    outcome.errors.len()
                );
            }
            report.push(outcome);
        }
        Ok(())
    }
}

/// Steps 1–3 for every job on at most `workers` threads. Results come back
/// in job order whatever order the workers finish in. The deadline is checked
/// before each job starts; once it fires no further checkout begins.
fn checkout_all<'j>(
    fetcher: &ContentFetcher<'_>,
    jobs: Vec<SyncJob<'j>>,
    workers: usize,
    deadline: &Deadline,
) -> Result<Vec<Checkout<'j>>, Elapsed> {
    let total = jobs.len();
    let queue: Mutex<VecDeque<(usize, SyncJob<'j>)>> =
        Mutex::new(jobs.into_iter().enumerate().collect());
    let (tx, rx) = mpsc::channel::<Result<(usize, Checkout<'j>), Elapsed>>();

    std::thread::scope(|scope| {
        for _ in 0..workers.clamp(1, total.max(1)) {
            let tx = tx.clone();
            let queue = &queue;
            scope.spawn(move || loop {
                // Popping cannot leave the queue half-updated, so a poisoned
                // lock still holds every remaining job.
                let next = queue
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .pop_front();
                let Some((index, job)) = next else {
                    break;
                };
                if let Err(elapsed) = deadline.check("checkout") {
                    let _ = tx.send(Err(elapsed));
                    break;
                }
                if tx.send(Ok((index, fetcher.checkout(job)))).is_err() {
                    break;
                }
            });
        }
    });
    drop(tx);

    let mut done = Vec::with_capacity(total);
    for message in rx {
        done.push(message?);
    }
    done.sort_by_key(|(index, _)| *index);
    Ok(done.into_iter().map(|(_, checkout)| checkout).collect())
}

fn failed(mut report: RunReport, err: SyncError) -> RunReport {
    tracing::error!("✗ sync failed: {err}");
    report.finish(PublishDecision::Failed(err.to_string()), None);
    report
}
