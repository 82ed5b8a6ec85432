#![forbid(unsafe_code)]

//! `.git` watcher with a trailing debounce, plus the refresh timers.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::core::git::CancelToken;
use crate::tui::model::Msg;

pub const DEBOUNCE: Duration = Duration::from_secs(1);
pub const CI_REFRESH_INTERVAL: Duration = Duration::from_secs(30);
const POLL: Duration = Duration::from_millis(200);

/// Accumulates events until the trailing debounce elapses.
#[derive(Debug, Clone, Copy, Default)]
struct Pending {
    last_event_at: Option<Instant>,
    worktrees_changed: bool,
}

impl Pending {
    fn push(&mut self, worktrees_changed: bool, now: Instant) {
        self.last_event_at = Some(now);
        self.worktrees_changed |= worktrees_changed;
    }

    /// `Some(worktrees_changed)` once quiet for the debounce window.
    fn take_if_due(&mut self, now: Instant) -> Option<bool> {
        let last = self.last_event_at?;
        if now.saturating_duration_since(last) < DEBOUNCE {
            return None;
        }
        let changed = self.worktrees_changed;
        *self = Self::default();
        Some(changed)
    }
}

fn is_relevant(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
    ) && event.paths.iter().any(|p| !is_noise(p))
}

/// Object writes and lock files carry no state of their own.
fn is_noise(path: &Path) -> bool {
    path.components().any(|c| c.as_os_str() == "objects")
        || path.extension().is_some_and(|e| e == "lock")
}

/// A worktree was added or removed when `.git/worktrees/<name>` itself changes.
fn touches_worktree_list(event: &Event, git_dir: &Path) -> bool {
    let admin = git_dir.join("worktrees");
    matches!(event.kind, EventKind::Create(_) | EventKind::Remove(_))
        && event
            .paths
            .iter()
            .any(|p| p.parent() == Some(admin.as_path()))
}

/// `<main>/.git` when it is a directory.
#[must_use]
pub fn git_dir_of(main_path: &Path) -> Option<PathBuf> {
    let dir = main_path.join(".git");
    dir.is_dir().then_some(dir)
}

/// Starts the watcher thread; it stops once `cancel` fires.
pub fn spawn_git_watcher(
    git_dir: PathBuf,
    tx: UnboundedSender<Msg>,
    cancel: CancelToken,
) -> notify::Result<thread::JoinHandle<()>> {
    let (event_tx, event_rx) = mpsc::channel::<notify::Result<Event>>();
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = event_tx.send(res);
        },
        notify::Config::default(),
    )?;
    watcher.watch(&git_dir, RecursiveMode::NonRecursive)?;
    for sub in ["refs", "worktrees"] {
        let path = git_dir.join(sub);
        if path.is_dir() {
            watcher.watch(&path, RecursiveMode::Recursive)?;
        }
    }
    debug!(dir = %git_dir.display(), "watching git dir");

    Ok(thread::spawn(move || {
        // Dropping the watcher ends the callbacks.
        let _watcher = watcher;
        let mut pending = Pending::default();
        while !cancel.is_cancelled() {
            match event_rx.recv_timeout(POLL) {
                Ok(Ok(event)) if is_relevant(&event) => {
                    pending.push(touches_worktree_list(&event, &git_dir), Instant::now());
                }
                Ok(Ok(_)) | Err(mpsc::RecvTimeoutError::Timeout) => {}
                Ok(Err(e)) => warn!(error = %e, "watch error"),
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
            if let Some(worktrees_changed) = pending.take_if_due(Instant::now()) {
                debug!(worktrees_changed, "git dir changed");
                if tx.send(Msg::GitDirChanged { worktrees_changed }).is_err() {
                    break;
                }
            }
        }
    }))
}

/// Sends `make()` every `period` until cancelled; the first tick is skipped.
pub fn spawn_ticker(
    period: Duration,
    tx: UnboundedSender<Msg>,
    cancel: CancelToken,
    make: fn() -> Msg,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval.tick().await;
        loop {
            interval.tick().await;
            if cancel.is_cancelled() || tx.send(make()).is_err() {
                break;
            }
        }
    })
}

/// Auto-refresh period: `refresh_interval` seconds, at least one.
#[must_use]
pub fn refresh_period(seconds: u64) -> Duration {
    Duration::from_secs(seconds.max(1))
}
