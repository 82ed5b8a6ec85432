#![forbid(unsafe_code)]

use std::path::Path;
use std::sync::Arc;

use time::OffsetDateTime;
use time::macros::format_description;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::core::git::{CancelToken, GitPort};
use crate::core::models::WorktreeInfo;
use crate::core::status_tree::status_counts;
use crate::error::LazywtError;

pub const DEFAULT_SCAN_CONCURRENCY: usize = 8;

/// Lists worktrees and fills status counters, divergence and activity.
#[derive(Debug, Clone)]
pub struct WorktreeScanner {
    git: Arc<dyn GitPort>,
    concurrency: usize,
}

impl WorktreeScanner {
    #[must_use]
    pub fn new(git: Arc<dyn GitPort>, concurrency: usize) -> Self {
        Self { git, concurrency }
    }

    pub async fn scan(&self, cancel: &CancelToken) -> Result<Vec<WorktreeInfo>, LazywtError> {
        let git = Arc::clone(&self.git);
        let list_cancel = cancel.clone();
        let worktrees = tokio::task::spawn_blocking(move || git.list_worktrees(&list_cancel))
            .await
            .map_err(|e| LazywtError::Other(format!("scan task join error: {e}")))??;

        let sem = Arc::new(Semaphore::new(self.concurrency.max(1)));
        let mut handles = Vec::with_capacity(worktrees.len());
        for wt in worktrees {
            let permit = Arc::clone(&sem).acquire_owned().await.map_err(|_| {
                LazywtError::Other("failed to acquire scan semaphore".to_owned())
            })?;
            let git = Arc::clone(&self.git);
            let cancel = cancel.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                enrich_blocking(git.as_ref(), wt, &cancel)
            }));
        }

        let mut out = Vec::with_capacity(handles.len());
        for h in handles {
            match h.await {
                Ok(wt) => out.push(wt),
                Err(e) => return Err(LazywtError::Other(format!("scan task join error: {e}"))),
            }
        }
        cancel.check()?;
        debug!(count = out.len(), "worktree scan finished");
        Ok(out)
    }
}

fn enrich_blocking(git: &dyn GitPort, mut wt: WorktreeInfo, cancel: &CancelToken) -> WorktreeInfo {
    let path = Path::new(&wt.path).to_path_buf();
    if let Ok(files) = git.status_porcelain_v2(&path, cancel) {
        let (staged, modified, untracked) = status_counts(&files);
        wt.set_status_counts(staged, modified, untracked);
    }
    if let Ok(up) = git.divergence(&path, cancel) {
        wt.ahead = up.divergence.ahead;
        wt.behind = up.divergence.behind;
        wt.has_upstream = up.upstream.is_some();
        wt.upstream_branch = up.upstream.unwrap_or_default();
    }
    if let Ok(ts) = git.last_commit_ts(&path, cancel) {
        wt.last_active_ts = ts;
        wt.last_active = format_relative(ts, OffsetDateTime::now_utc().unix_timestamp());
    }
    wt
}

/// Short relative age: `just now`, `5 minutes ago`, ..., then a date.
#[must_use]
pub fn format_relative(ts: i64, now: i64) -> String {
    if ts <= 0 {
        return String::new();
    }
    let age = (now - ts).max(0);
    let plural = |n: i64, unit: &str| {
        if n == 1 {
            format!("1 {unit} ago")
        } else {
            format!("{n} {unit}s ago")
        }
    };
    match age {
        0..60 => "just now".to_owned(),
        60..3_600 => plural(age / 60, "minute"),
        3_600..86_400 => plural(age / 3_600, "hour"),
        86_400..2_592_000 => plural(age / 86_400, "day"),
        _ => OffsetDateTime::from_unix_timestamp(ts)
            .ok()
            .and_then(|d| d.format(format_description!("[year]-[month]-[day]")).ok())
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::core::git::Git;
    use crate::core::git::testing::RecordingRunner;

    #[test]
    fn relative_ages() {
        assert_eq!(format_relative(100, 130), "just now");
        assert_eq!(format_relative(0, 130), "");
        assert_eq!(format_relative(1_000, 1_000 + 60), "1 minute ago");
        assert_eq!(format_relative(1_000, 1_000 + 7_300), "2 hours ago");
        assert_eq!(format_relative(1_000, 1_000 + 3 * 86_400), "3 days ago");
        assert_eq!(format_relative(1_700_000_000, 1_800_000_000), "2023-11-14");
    }

    #[tokio::test]
    async fn scan_enriches_each_worktree() {
        let runner = Arc::new(RecordingRunner::default());
        runner.reply(
            "git worktree list",
            "worktree /repo\nHEAD a\nbranch refs/heads/main\n\nworktree /w/f\nHEAD b\nbranch refs/heads/f\n",
        );
        runner.reply("git status", "1 .M N... 1 1 1 a b x.rs\n? new.txt\n");
        runner.reply("git rev-parse --abbrev-ref", "origin/f\n");
        runner.reply("git rev-list --left-right", "2\t1\n");
        runner.reply("git log -1", "1700000000\n");
        let git: Arc<dyn GitPort> = Arc::new(Git::with_runner(PathBuf::from("/repo"), runner));
        let scanner = WorktreeScanner::new(git, 2);
        let wts = scanner.scan(&CancelToken::new()).await.unwrap();
        assert_eq!(wts.len(), 2);
        let f = &wts[1];
        assert_eq!((f.modified(), f.untracked()), (1, 1));
        assert!(f.dirty());
        assert_eq!((f.ahead, f.behind), (2, 1));
        assert!(f.has_upstream);
        assert_eq!(f.upstream_branch, "origin/f");
        assert_eq!(f.last_active_ts, 1_700_000_000);
    }
}
