//! Template context - serializable rendering payload for pull-request text.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use filesync_core::types::{RelatedPullReference, SourceRepo};

use crate::error::RenderError;

/// Default intro paragraph of the pull-request body.
pub const DEFAULT_INTRO: &str = "Automated file sync from configured repositories";

/// Everything the title and body templates can see.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestContext {
    /// Target repository, `owner/name`.
    pub target: String,
    pub work_branch: String,
    pub base_branch: String,
    /// First paragraph of the body; replaced by `--pr-body`.
    pub intro: String,
    pub sources: Vec<SourceCtx>,
    pub related_count: usize,
    pub generated_at: String,
}

/// One source repository's contribution to the change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceCtx {
    pub repo: String,
    pub reference: Option<String>,
    pub files: Vec<FileCtx>,
    pub related: Vec<RelatedCtx>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileCtx {
    pub src: String,
    pub dest: String,
}

/// A related upstream pull request, pre-formatted as a bullet link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedCtx {
    pub label: String,
    pub url: String,
}

impl From<&RelatedPullReference> for RelatedCtx {
    fn from(r: &RelatedPullReference) -> Self {
        Self {
            label: r.to_string(),
            url: r.url(),
        }
    }
}

impl PullRequestContext {
    pub fn new(
        target: impl Into<String>,
        work_branch: impl Into<String>,
        base_branch: impl Into<String>,
        generated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            target: target.into(),
            work_branch: work_branch.into(),
            base_branch: base_branch.into(),
            intro: DEFAULT_INTRO.to_string(),
            sources: Vec::new(),
            related_count: 0,
            generated_at: generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    /// Append a source section. `files` are `(src, dest)` display strings.
    pub fn push_source(
        &mut self,
        source: &SourceRepo,
        files: Vec<(String, String)>,
        related: &[RelatedPullReference],
    ) {
        self.related_count += related.len();
        self.sources.push(SourceCtx {
            repo: source.repo.full_name(),
            reference: source.reference.clone(),
            files: files
                .into_iter()
                .map(|(src, dest)| FileCtx { src, dest })
                .collect(),
            related: related.iter().map(RelatedCtx::from).collect(),
        });
    }

    pub fn to_tera_context(&self) -> Result<tera::Context, RenderError> {
        tera::Context::from_serialize(self).map_err(RenderError::from)
    }
}
