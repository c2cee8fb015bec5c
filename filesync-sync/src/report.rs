//! Run report: per-source outcomes, the publish decision, and the two output
//! encodings (JSON and CI `key=value` lines).

use chrono::{DateTime, Utc};
use serde::Serialize;

use filesync_core::{RelatedPullReference, RepoName};

use crate::fetch::{CopiedFile, FetchResult};
use crate::publish::PublishDecision;
use crate::writer::WriteOutcome;

/// Everything one source repository contributed, errors rendered to text.
#[derive(Debug, Clone, Serialize)]
pub struct RepoOutcome {
    pub repo: RepoName,
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub files: Vec<CopiedFile>,
    pub related: Vec<RelatedPullReference>,
    pub errors: Vec<String>,
}

impl RepoOutcome {
    pub fn bytes(&self) -> u64 {
        self.files.iter().map(|f| f.bytes).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

impl From<FetchResult> for RepoOutcome {
    fn from(result: FetchResult) -> Self {
        Self {
            repo: result.repo,
            reference: result.reference,
            files: result.copied,
            related: result.related,
            errors: result.errors.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Process exit status derived from a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success = 0,
    PartialFailure = 1,
    Fatal = 2,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    pub repos: Vec<RepoOutcome>,
    pub decision: PublishDecision,
    pub pr_url: Option<String>,
}

impl RunReport {
    pub fn new(dry_run: bool) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            dry_run,
            repos: Vec::new(),
            decision: PublishDecision::NoChange,
            pr_url: None,
        }
    }

    pub fn push(&mut self, outcome: RepoOutcome) {
        self.repos.push(outcome);
    }

    pub fn finish(&mut self, decision: PublishDecision, pr_url: Option<String>) {
        self.decision = decision;
        self.pr_url = pr_url;
        self.finished_at = Some(Utc::now());
    }

    /// `owner/name:src` for every file copied, in declaration order.
    pub fn synced_files(&self) -> Vec<String> {
        self.repos
            .iter()
            .flat_map(|r| {
                r.files
                    .iter()
                    .map(move |f| format!("{}:{}", r.repo, f.src.display()))
            })
            .collect()
    }

    /// Files whose bytes actually changed on disk (or would, in dry-run).
    pub fn changed_count(&self) -> usize {
        self.repos
            .iter()
            .flat_map(|r| &r.files)
            .filter(|f| f.outcome != WriteOutcome::Unchanged)
            .count()
    }

    pub fn total_bytes(&self) -> u64 {
        self.repos.iter().map(RepoOutcome::bytes).sum()
    }

    pub fn failed_count(&self) -> usize {
        self.repos.iter().map(|r| r.errors.len()).sum()
    }

    pub fn related(&self) -> Vec<&RelatedPullReference> {
        self.repos.iter().flat_map(|r| &r.related).collect()
    }

    pub fn exit_status(&self) -> ExitStatus {
        match self.decision {
            PublishDecision::Failed(_) => ExitStatus::Fatal,
            _ if self.failed_count() > 0 => ExitStatus::PartialFailure,
            _ => ExitStatus::Success,
        }
    }

    /// CI step outputs, one `(key, value)` per line.
    pub fn ci_outputs(&self) -> Vec<(&'static str, String)> {
        let related: Vec<String> = self.related().iter().map(|r| r.to_string()).collect();
        vec![
            ("synced_files", self.synced_files().join(",")),
            ("synced_count", self.synced_files().len().to_string()),
            ("total_bytes", self.total_bytes().to_string()),
            ("failed_count", self.failed_count().to_string()),
            ("related_prs", related.join(",")),
            ("decision", self.decision.as_str().to_string()),
            ("pr_url", self.pr_url.clone().unwrap_or_default()),
            ("dry_run", self.dry_run.to_string()),
        ]
    }

    pub fn ci_output_lines(&self) -> String {
        self.ci_outputs()
            .into_iter()
            .map(|(key, value)| format!("{key}={value}\n"))
            .collect()
    }
}
