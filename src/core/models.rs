#![forbid(unsafe_code)]

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Display name used for the primary worktree.
pub const MAIN_WORKTREE_NAME: &str = "main";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PrFetchStatus {
    #[default]
    NotFetched,
    Fetching,
    Loaded,
    NoPr,
    Error,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum PrState {
    Open,
    Merged,
    Closed,
    Draft,
}

impl PrState {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "MERGED" => Self::Merged,
            "CLOSED" => Self::Closed,
            "DRAFT" => Self::Draft,
            _ => Self::Open,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Merged => "MERGED",
            Self::Closed => "CLOSED",
            Self::Draft => "DRAFT",
        }
    }

    #[must_use]
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Merged | Self::Closed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrInfo {
    pub number: u64,
    pub state: PrState,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub url: String,
    pub branch: String,
    #[serde(default)]
    pub base_branch: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub author_name: String,
    #[serde(default)]
    pub author_is_bot: bool,
    #[serde(default)]
    pub is_draft: bool,
    #[serde(default)]
    pub ci_status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IssueInfo {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub url: String,
    #[serde(default)]
    pub author: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Conclusion {
    Success,
    Failure,
    Skipped,
    Cancelled,
    Pending,
    #[default]
    #[serde(rename = "")]
    Unknown,
}

impl Conclusion {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "success" | "pass" | "neutral" => Self::Success,
            "failure" | "fail" | "failed" | "error" | "timed_out" | "action_required" => {
                Self::Failure
            }
            "skipped" | "skipping" => Self::Skipped,
            "cancelled" | "canceled" | "cancel" => Self::Cancelled,
            "pending" | "queued" | "in_progress" | "running" | "waiting" => Self::Pending,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failure => "FAILED",
            Self::Skipped => "SKIPPED",
            Self::Cancelled => "CANCELLED",
            Self::Pending | Self::Unknown => "PENDING",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CiCheck {
    pub name: String,
    pub conclusion: Conclusion,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub started_at: String,
    #[serde(default)]
    pub completed_at: String,
}

/// Aggregate conclusion: failure, then pending, then success, then skipped.
#[must_use]
pub fn aggregate_ci(checks: &[CiCheck]) -> Conclusion {
    let has = |c: Conclusion| checks.iter().any(|k| k.conclusion == c);
    if has(Conclusion::Failure) {
        Conclusion::Failure
    } else if has(Conclusion::Pending) || has(Conclusion::Unknown) {
        Conclusion::Pending
    } else if has(Conclusion::Success) {
        Conclusion::Success
    } else {
        Conclusion::Skipped
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorktreeInfo {
    pub path: String,
    pub branch: String,
    pub is_main: bool,
    staged: u32,
    modified: u32,
    untracked: u32,
    #[serde(default)]
    pub ahead: u32,
    #[serde(default)]
    pub behind: u32,
    #[serde(default)]
    pub has_upstream: bool,
    #[serde(default)]
    pub upstream_branch: String,
    #[serde(default)]
    pub last_active_ts: i64,
    #[serde(default)]
    pub last_switched_ts: i64,
    #[serde(default)]
    pub last_active: String,
    #[serde(default)]
    pub pr: Option<PrInfo>,
    #[serde(skip)]
    pub pr_fetch_status: PrFetchStatus,
    #[serde(skip)]
    pub pr_fetch_error: String,
}

impl WorktreeInfo {
    #[must_use]
    pub fn new(path: impl Into<String>, branch: impl Into<String>, is_main: bool) -> Self {
        Self {
            path: path.into(),
            branch: branch.into(),
            is_main,
            ..Self::default()
        }
    }

    pub fn set_status_counts(&mut self, staged: u32, modified: u32, untracked: u32) {
        self.staged = staged;
        self.modified = modified;
        self.untracked = untracked;
    }

    #[must_use]
    pub fn staged(&self) -> u32 {
        self.staged
    }

    #[must_use]
    pub fn modified(&self) -> u32 {
        self.modified
    }

    #[must_use]
    pub fn untracked(&self) -> u32 {
        self.untracked
    }

    #[must_use]
    pub fn dirty(&self) -> bool {
        self.staged + self.modified + self.untracked > 0
    }

    /// Basename of the path, or `main` for the primary worktree.
    #[must_use]
    pub fn display_name(&self) -> String {
        if self.is_main {
            return MAIN_WORKTREE_NAME.to_owned();
        }
        self.basename()
    }

    #[must_use]
    pub fn basename(&self) -> String {
        Path::new(&self.path)
            .file_name()
            .map_or_else(|| self.path.clone(), |n| n.to_string_lossy().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusFile {
    pub filename: String,
    pub status: String,
    pub is_untracked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitLogEntry {
    pub sha: String,
    pub author_initials: String,
    pub message: String,
    pub is_unpushed: bool,
    pub is_unmerged: bool,
}

impl CommitLogEntry {
    #[must_use]
    pub fn short_sha(&self) -> &str {
        self.sha.get(..7).unwrap_or(&self.sha)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitMeta {
    pub sha: String,
    pub author: String,
    pub email: String,
    pub date: String,
    pub subject: String,
    pub body: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorktreeNote {
    pub note: String,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForgeHost {
    GitHub,
    GitLab,
    None,
}
