#![forbid(unsafe_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tracing::debug;

use crate::core::git::{CancelToken, GitPort};
use crate::core::models::{CiCheck, PrFetchStatus, PrInfo, WorktreeInfo};
use crate::error::LazywtError;

pub const DETAILS_TTL: Duration = Duration::from_secs(5);
pub const CI_TTL: Duration = Duration::from_secs(60);
pub const LOG_LIMIT: usize = 50;

#[derive(Debug, Clone)]
pub struct DetailsEntry {
    pub status_raw: String,
    pub log_raw: String,
    pub unpushed: HashSet<String>,
    pub unmerged: HashSet<String>,
    pub fetched_at: Instant,
}

impl DetailsEntry {
    #[must_use]
    pub fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.fetched_at) < DETAILS_TTL
    }
}

#[derive(Debug, Clone)]
struct CiEntry {
    checks: Vec<CiCheck>,
    fetched_at: Instant,
}

#[derive(Debug, Default)]
struct Caches {
    details: HashMap<String, DetailsEntry>,
    ci: HashMap<String, CiEntry>,
}

/// Details and CI caches behind one reader-writer lock, shared with tasks.
#[derive(Debug, Clone, Default)]
pub struct SharedCaches(Arc<RwLock<Caches>>);

impl SharedCaches {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry for `path` only while younger than the details TTL.
    #[must_use]
    pub fn details(&self, path: &str, now: Instant) -> Option<DetailsEntry> {
        let guard = self.0.read().unwrap_or_else(PoisonError::into_inner);
        guard.details.get(path).filter(|e| e.is_fresh(now)).cloned()
    }

    pub fn put_details(&self, path: &str, entry: DetailsEntry) {
        let mut guard = self.0.write().unwrap_or_else(PoisonError::into_inner);
        guard.details.insert(path.to_owned(), entry);
    }

    pub fn invalidate_details(&self, path: &str) {
        let mut guard = self.0.write().unwrap_or_else(PoisonError::into_inner);
        if guard.details.remove(path).is_some() {
            debug!(path, "details cache invalidated");
        }
    }

    pub fn clear_details(&self) {
        let mut guard = self.0.write().unwrap_or_else(PoisonError::into_inner);
        guard.details.clear();
    }

    #[must_use]
    pub fn ci_fresh(&self, branch: &str, now: Instant) -> Option<Vec<CiCheck>> {
        let guard = self.0.read().unwrap_or_else(PoisonError::into_inner);
        guard
            .ci
            .get(branch)
            .filter(|e| now.saturating_duration_since(e.fetched_at) < CI_TTL)
            .map(|e| e.checks.clone())
    }

    /// Last known checks regardless of age, for display.
    #[must_use]
    pub fn ci_any(&self, branch: &str) -> Option<Vec<CiCheck>> {
        let guard = self.0.read().unwrap_or_else(PoisonError::into_inner);
        guard.ci.get(branch).map(|e| e.checks.clone())
    }

    pub fn put_ci(&self, branch: &str, checks: Vec<CiCheck>, now: Instant) {
        let mut guard = self.0.write().unwrap_or_else(PoisonError::into_inner);
        guard.ci.insert(
            branch.to_owned(),
            CiEntry {
                checks,
                fetched_at: now,
            },
        );
    }
}

enum DetailRead {
    Status(Result<String, LazywtError>),
    Log(Result<String, LazywtError>),
    Unpushed(Result<HashSet<String>, LazywtError>),
    Unmerged(Result<HashSet<String>, LazywtError>),
}

/// Returns the fresh cached entry or runs the four reads concurrently.
pub async fn get_cached_details(
    caches: &SharedCaches,
    git: &Arc<dyn GitPort>,
    path: &Path,
    main_branch: &str,
    cancel: &CancelToken,
) -> Result<DetailsEntry, LazywtError> {
    let key = path.to_string_lossy().to_string();
    if let Some(entry) = caches.details(&key, Instant::now()) {
        debug!(path = %key, "details cache hit");
        return Ok(entry);
    }
    debug!(path = %key, "details cache miss");

    let mut reads = JoinSet::new();
    {
        let (git, path, cancel) = (Arc::clone(git), path.to_path_buf(), cancel.clone());
        reads.spawn_blocking(move || DetailRead::Status(git.status_raw(&path, &cancel)));
    }
    {
        let (git, path, cancel) = (Arc::clone(git), path.to_path_buf(), cancel.clone());
        reads.spawn_blocking(move || DetailRead::Log(git.log_raw(&path, LOG_LIMIT, &cancel)));
    }
    {
        let (git, path, cancel) = (Arc::clone(git), path.to_path_buf(), cancel.clone());
        reads.spawn_blocking(move || DetailRead::Unpushed(git.rev_list_unpushed(&path, &cancel)));
    }
    {
        let (git, path, cancel) = (Arc::clone(git), path.to_path_buf(), cancel.clone());
        let main = main_branch.to_owned();
        reads.spawn_blocking(move || {
            DetailRead::Unmerged(git.rev_list_unmerged(&path, &main, &cancel))
        });
    }

    let mut status = Err(LazywtError::Other("details status read missing".to_owned()));
    let (mut log, mut unpushed, mut unmerged) = (None, None, None);
    while let Some(joined) = reads.join_next().await {
        match joined.map_err(|e| LazywtError::Other(format!("details worker failed: {e}")))? {
            DetailRead::Status(r) => status = r,
            DetailRead::Log(r) => log = r.ok(),
            DetailRead::Unpushed(r) => unpushed = r.ok(),
            DetailRead::Unmerged(r) => unmerged = r.ok(),
        }
    }
    cancel.check()?;

    let status_raw = status?;
    // Log and rev-list failures (empty repo, missing main) degrade to empty.
    let entry = DetailsEntry {
        status_raw,
        log_raw: log.unwrap_or_default(),
        unpushed: unpushed.unwrap_or_default(),
        unmerged: unmerged.unwrap_or_default(),
        fetched_at: Instant::now(),
    };
    caches.put_details(&key, entry.clone());
    Ok(entry)
}

/// Marks a PR fetch as in flight; false when one is already running.
pub fn begin_pr_fetch(wt: &mut WorktreeInfo) -> bool {
    if wt.pr_fetch_status == PrFetchStatus::Fetching {
        return false;
    }
    wt.pr_fetch_status = PrFetchStatus::Fetching;
    wt.pr_fetch_error.clear();
    true
}

pub fn finish_pr_fetch(wt: &mut WorktreeInfo, result: Result<Option<PrInfo>, String>) {
    match result {
        Ok(Some(pr)) => {
            wt.pr = Some(pr);
            wt.pr_fetch_status = PrFetchStatus::Loaded;
            wt.pr_fetch_error.clear();
        }
        Ok(None) => {
            wt.pr = None;
            wt.pr_fetch_status = PrFetchStatus::NoPr;
            wt.pr_fetch_error.clear();
        }
        Err(msg) => {
            wt.pr_fetch_status = PrFetchStatus::Error;
            wt.pr_fetch_error = msg;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use super::*;
    use crate::core::git::Git;
    use crate::core::git::testing::RecordingRunner;
    use crate::core::models::Conclusion;

    fn entry(at: Instant) -> DetailsEntry {
        DetailsEntry {
            status_raw: String::new(),
            log_raw: String::new(),
            unpushed: HashSet::new(),
            unmerged: HashSet::new(),
            fetched_at: at,
        }
    }

    #[test]
    fn details_respect_ttl_and_invalidation() {
        let caches = SharedCaches::new();
        let t0 = Instant::now();
        caches.put_details("/w/a", entry(t0));
        assert!(caches.details("/w/a", t0 + Duration::from_secs(4)).is_some());
        assert!(caches.details("/w/a", t0 + DETAILS_TTL).is_none());
        caches.invalidate_details("/w/a");
        assert!(caches.details("/w/a", t0).is_none());
    }

    #[test]
    fn ci_stale_entries_remain_displayable() {
        let caches = SharedCaches::new();
        let t0 = Instant::now();
        let checks = vec![CiCheck {
            name: "build".to_owned(),
            conclusion: Conclusion::Success,
            ..CiCheck::default()
        }];
        caches.put_ci("feat", checks, t0);
        assert!(caches.ci_fresh("feat", t0 + Duration::from_secs(59)).is_some());
        assert!(caches.ci_fresh("feat", t0 + CI_TTL).is_none());
        assert_eq!(caches.ci_any("feat").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn miss_runs_four_reads_then_hits() {
        let runner = Arc::new(RecordingRunner::default());
        runner.reply("git status", "? new.txt\n");
        runner.reply("git log", "abc\tJane Doe\tinit");
        runner.reply("git rev-list -100 HEAD --not", "abc\n");
        let git: Arc<dyn GitPort> = Arc::new(Git::with_runner(PathBuf::from("/repo"), runner.clone()));
        let caches = SharedCaches::new();
        let cancel = CancelToken::new();

        let e = get_cached_details(&caches, &git, Path::new("/w/a"), "main", &cancel)
            .await
            .unwrap();
        assert_eq!(e.status_raw, "? new.txt\n");
        assert!(e.unpushed.contains("abc"));
        assert_eq!(runner.argv().len(), 4);

        get_cached_details(&caches, &git, Path::new("/w/a"), "main", &cancel)
            .await
            .unwrap();
        assert_eq!(runner.argv().len(), 4);
    }

    #[tokio::test]
    async fn cancelled_fetch_is_not_cached() {
        let runner = Arc::new(RecordingRunner::default());
        let git: Arc<dyn GitPort> = Arc::new(Git::with_runner(PathBuf::from("/repo"), runner.clone()));
        let caches = SharedCaches::new();
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = get_cached_details(&caches, &git, Path::new("/w/a"), "main", &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(runner.argv().is_empty());
        assert!(caches.details("/w/a", Instant::now()).is_none());
    }

    #[test]
    fn pr_fetch_is_not_duplicated() {
        let mut wt = WorktreeInfo::new("/w/a", "a", false);
        assert!(begin_pr_fetch(&mut wt));
        assert!(!begin_pr_fetch(&mut wt));
        finish_pr_fetch(&mut wt, Err("boom".to_owned()));
        assert_eq!(wt.pr_fetch_status, PrFetchStatus::Error);
        assert!(begin_pr_fetch(&mut wt));
        finish_pr_fetch(&mut wt, Ok(None));
        assert_eq!(wt.pr_fetch_status, PrFetchStatus::NoPr);
    }
}
