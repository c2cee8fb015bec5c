//! Error types for filesync-sync.

use std::path::PathBuf;

use thiserror::Error;

use filesync_core::ConfigError;
use filesync_renderer::RenderError;

use crate::deadline::Elapsed;
use crate::tracker::TrackerError;
use crate::vcs::VcsError;

/// All errors that can arise from a sync run.
///
/// `Fetch` and `Copy` are per-repo / per-mapping and get accumulated into the
/// run report; everything else is fatal for the run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Malformed or missing configuration.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// The output root is absolute or escapes the working tree.
    #[error("invalid output directory '{}': {reason}", .path.display())]
    InvalidOutput { path: PathBuf, reason: &'static str },

    /// Clone/checkout of one source repository failed.
    #[error("fetch failed for {repo}: {source}")]
    Fetch {
        repo: String,
        #[source]
        source: VcsError,
    },

    /// A mapping's source path could not be copied.
    #[error("copy failed for {repo}:{}: {reason}", .src.display())]
    Copy {
        repo: String,
        src: PathBuf,
        reason: String,
    },

    /// Related-PR log scan failed; copied files are unaffected.
    #[error("log scan failed for {repo}: {source}")]
    LogScan {
        repo: String,
        #[source]
        source: VcsError,
    },

    /// Commit, push or pull-request stage failed.
    #[error("publish error: {0}")]
    Publish(#[from] PublishError),

    /// The per-run deadline passed.
    #[error(transparent)]
    Timeout(#[from] Elapsed),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures of the publish state machine.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("could not prepare work branch '{branch}': {source}")]
    Branch {
        branch: String,
        #[source]
        source: VcsError,
    },

    #[error("{action} failed: {source}")]
    Vcs {
        action: &'static str,
        #[source]
        source: VcsError,
    },

    #[error("{action} failed: {source}")]
    Tracker {
        action: &'static str,
        #[source]
        source: TrackerError,
    },

    #[error("could not render pull request text: {0}")]
    Render(#[from] RenderError),

    #[error("work branch '{0}' is the same as the base branch")]
    SameBranch(String),

    #[error("pull request creation is enabled but no target repository is configured")]
    MissingTarget,

    #[error("pull request creation is enabled but no issue tracker client was provided")]
    MissingTracker,

    #[error(transparent)]
    Timeout(#[from] Elapsed),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
