#![forbid(unsafe_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
use tokio::runtime::{Builder, Handle, RuntimeFlavor};
use tokio::sync::Notify;
use tracing::debug;

use crate::core::forge;
use crate::core::models::{
    CiCheck, CommitLogEntry, CommitMeta, ForgeHost, IssueInfo, PrInfo, StatusFile, WorktreeInfo,
};
use crate::core::status_tree::parse_status_v2;
use crate::error::LazywtError;

/// Cooperative cancellation flag shared between the event loop and a task.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<CancelState>);

#[derive(Debug, Default)]
struct CancelState {
    flag: AtomicBool,
    wake: Notify,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.flag.store(true, Ordering::SeqCst);
        self.0.wake.notify_waiters();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.flag.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), LazywtError> {
        if self.is_cancelled() {
            Err(LazywtError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        loop {
            let woken = self.0.wake.notified();
            if self.is_cancelled() {
                return;
            }
            woken.await;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub stdin: Option<String>,
    /// Kill the child and fail with `Timeout` once this elapses.
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    #[must_use]
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_owned(),
            args: args.iter().map(|a| (*a).to_owned()).collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_args(program: &str, args: Vec<String>) -> Self {
        Self {
            program: program.to_owned(),
            args,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn in_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    #[must_use]
    pub fn with_stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    #[must_use]
    pub fn with_env(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env.extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    #[must_use]
    pub fn display(&self) -> String {
        format!("{} {}", self.program, self.args.join(" "))
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Stdout on success, `SubprocessFailed` otherwise.
    pub fn into_stdout(self, spec: &CommandSpec) -> Result<String, LazywtError> {
        if self.success() {
            Ok(self.stdout)
        } else {
            Err(LazywtError::SubprocessFailed {
                program: spec.program.clone(),
                args: spec.args.join(" "),
                code: self.code,
                stderr: self.stderr.trim().to_owned(),
            })
        }
    }
}

/// Process spawning seam; tests swap in a recording runner.
pub trait CommandRunner: Send + Sync + fmt::Debug {
    fn run(&self, spec: &CommandSpec, cancel: &CancelToken) -> Result<CommandOutput, LazywtError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec, cancel: &CancelToken) -> Result<CommandOutput, LazywtError> {
        cancel.check()?;
        block_on(run_child(spec, cancel))?
    }
}

/// Drives `fut` to completion from synchronous code, reusing the ambient
/// runtime when there is one.
pub(crate) fn block_on<F: Future>(fut: F) -> Result<F::Output, LazywtError> {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            Ok(tokio::task::block_in_place(|| handle.block_on(fut)))
        }
        Ok(handle) => Ok(handle.block_on(fut)),
        Err(_) => Builder::new_current_thread()
            .enable_all()
            .build()
            .map(|rt| rt.block_on(fut))
            .map_err(|e| LazywtError::Other(format!("failed to start runtime: {e}"))),
    }
}

async fn run_child(spec: &CommandSpec, cancel: &CancelToken) -> Result<CommandOutput, LazywtError> {
    let mut command = tokio::process::Command::new(&spec.program);
    command
        .args(&spec.args)
        .envs(&spec.env)
        .stdin(if spec.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &spec.cwd {
        command.current_dir(dir);
    }
    debug!(cmd = %spec.display(), cwd = ?spec.cwd, "spawning");

    let mut child = command.spawn().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => LazywtError::GitUnavailable {
            tool: spec.program.clone(),
        },
        _ => LazywtError::Other(format!("failed to run {}: {e}", spec.program)),
    })?;

    if let (Some(input), Some(mut stdin)) = (spec.stdin.clone(), child.stdin.take()) {
        tokio::spawn(async move {
            let _ = stdin.write_all(input.as_bytes()).await;
        });
    }
    let stdout_task = child.stdout.take().map(|mut out| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = out.read_to_end(&mut buf).await;
            buf
        })
    });
    let stderr_task = child.stderr.take().map(|mut err| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = err.read_to_end(&mut buf).await;
            buf
        })
    });

    let waited = tokio::select! {
        waited = wait_with_limit(&mut child, spec.timeout) => waited,
        () = cancel.cancelled() => Err(LazywtError::Cancelled),
    };
    let status = match waited {
        Ok(status) => status,
        Err(e) => {
            let _ = child.kill().await;
            return Err(e);
        }
    };

    let stdout = collect(stdout_task).await;
    let stderr = collect(stderr_task).await;
    debug!(cmd = %spec.display(), code = ?status.code(), "finished");
    Ok(CommandOutput {
        code: status.code(),
        stdout: String::from_utf8_lossy(&stdout).to_string(),
        stderr: String::from_utf8_lossy(&stderr).to_string(),
    })
}

async fn wait_with_limit(
    child: &mut tokio::process::Child,
    limit: Option<Duration>,
) -> Result<std::process::ExitStatus, LazywtError> {
    let Some(limit) = limit else {
        return child.wait().await.map_err(wait_failed);
    };
    match tokio::time::timeout(limit, child.wait()).await {
        Ok(res) => res.map_err(wait_failed),
        Err(_) => Err(LazywtError::Timeout {
            what: "command".to_owned(),
            secs: limit.as_secs(),
        }),
    }
}

fn wait_failed(e: std::io::Error) -> LazywtError {
    LazywtError::Other(format!("failed to wait for child: {e}"))
}

async fn collect(task: Option<tokio::task::JoinHandle<Vec<u8>>>) -> Vec<u8> {
    match task {
        Some(task) => task.await.unwrap_or_default(),
        None => Vec::new(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Divergence {
    pub ahead: u32,
    pub behind: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpstreamInfo {
    pub divergence: Divergence,
    /// `origin/feature` style name; `None` when no upstream is configured.
    pub upstream: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMethod {
    #[default]
    Rebase,
    Merge,
}

impl MergeMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rebase => "rebase",
            Self::Merge => "merge",
        }
    }
}

/// Typed view of every git/forge subprocess the application issues.
pub trait GitPort: Send + Sync + fmt::Debug {
    fn repo_root(&self) -> &Path;
    fn list_worktrees(&self, cancel: &CancelToken) -> Result<Vec<WorktreeInfo>, LazywtError>;
    fn status_raw(&self, cwd: &Path, cancel: &CancelToken) -> Result<String, LazywtError>;
    fn status_porcelain_v2(
        &self,
        cwd: &Path,
        cancel: &CancelToken,
    ) -> Result<Vec<StatusFile>, LazywtError> {
        Ok(parse_status_v2(&self.status_raw(cwd, cancel)?))
    }
    fn log_raw(&self, cwd: &Path, limit: usize, cancel: &CancelToken)
    -> Result<String, LazywtError>;
    fn rev_list_unpushed(
        &self,
        cwd: &Path,
        cancel: &CancelToken,
    ) -> Result<HashSet<String>, LazywtError>;
    fn rev_list_unmerged(
        &self,
        cwd: &Path,
        main_branch: &str,
        cancel: &CancelToken,
    ) -> Result<HashSet<String>, LazywtError>;
    fn divergence(&self, cwd: &Path, cancel: &CancelToken) -> Result<UpstreamInfo, LazywtError>;
    fn main_branch(&self, cancel: &CancelToken) -> Result<String, LazywtError>;
    fn last_commit_ts(&self, cwd: &Path, cancel: &CancelToken) -> Result<i64, LazywtError>;
    fn list_branches(&self, cancel: &CancelToken) -> Result<Vec<String>, LazywtError>;
    fn remote_url(&self, cancel: &CancelToken) -> Result<String, LazywtError>;
    fn forge_host(&self, cancel: &CancelToken) -> ForgeHost {
        self.remote_url(cancel)
            .map_or(ForgeHost::None, |u| forge::detect_host(&u))
    }

    fn fetch_prs(
        &self,
        host: ForgeHost,
        cancel: &CancelToken,
    ) -> Result<HashMap<String, PrInfo>, LazywtError>;
    fn fetch_open_prs(
        &self,
        host: ForgeHost,
        cancel: &CancelToken,
    ) -> Result<Vec<PrInfo>, LazywtError>;
    fn fetch_issues(
        &self,
        host: ForgeHost,
        cancel: &CancelToken,
    ) -> Result<Vec<IssueInfo>, LazywtError>;
    fn fetch_pr_by_path(
        &self,
        host: ForgeHost,
        worktree_path: &Path,
        cancel: &CancelToken,
    ) -> Result<Option<PrInfo>, LazywtError>;
    fn fetch_ci_checks(
        &self,
        host: ForgeHost,
        branch: &str,
        cwd: &Path,
        cancel: &CancelToken,
    ) -> Result<Vec<CiCheck>, LazywtError>;
    fn update_pr_branch(
        &self,
        cwd: &Path,
        rebase: bool,
        cancel: &CancelToken,
    ) -> Result<(), LazywtError>;

    fn push(
        &self,
        cwd: &Path,
        remote: &str,
        branch: &str,
        set_upstream: bool,
        cancel: &CancelToken,
    ) -> Result<String, LazywtError>;
    fn pull(
        &self,
        cwd: &Path,
        remote: &str,
        branch: &str,
        rebase: bool,
        cancel: &CancelToken,
    ) -> Result<String, LazywtError>;
    fn fetch_all(&self, cancel: &CancelToken) -> Result<(), LazywtError>;
    fn cherry_pick(&self, cwd: &Path, sha: &str, cancel: &CancelToken)
    -> Result<(), LazywtError>;
    fn delete_worktree(
        &self,
        path: &Path,
        force: bool,
        cancel: &CancelToken,
    ) -> Result<(), LazywtError>;
    fn delete_branch(&self, branch: &str, cancel: &CancelToken) -> Result<(), LazywtError>;
    fn rename_worktree(
        &self,
        old: &Path,
        new: &Path,
        cancel: &CancelToken,
    ) -> Result<(), LazywtError>;
    fn rename_branch(
        &self,
        cwd: &Path,
        old: &str,
        new: &str,
        cancel: &CancelToken,
    ) -> Result<(), LazywtError>;
    fn absorb(
        &self,
        worktree_path: &Path,
        main_path: &Path,
        branch: &str,
        main_branch: &str,
        method: MergeMethod,
        cancel: &CancelToken,
    ) -> Result<(), LazywtError>;
    fn create_worktree(
        &self,
        path: &Path,
        branch: &str,
        base: Option<&str>,
        new_branch: bool,
        cancel: &CancelToken,
    ) -> Result<(), LazywtError>;
    fn create_worktree_from_pr(
        &self,
        host: ForgeHost,
        pr_number: u64,
        branch: &str,
        path: &Path,
        cancel: &CancelToken,
    ) -> Result<(), LazywtError>;
    fn checkout_pr_branch(
        &self,
        cwd: &Path,
        branch: &str,
        cancel: &CancelToken,
    ) -> Result<(), LazywtError>;

    fn diff(&self, cwd: &Path, cancel: &CancelToken) -> Result<String, LazywtError>;
    fn stash_push(&self, cwd: &Path, cancel: &CancelToken) -> Result<(), LazywtError>;
    fn stash_pop(&self, cwd: &Path, cancel: &CancelToken) -> Result<(), LazywtError>;
    fn commit_show(
        &self,
        cwd: &Path,
        sha: &str,
        cancel: &CancelToken,
    ) -> Result<(CommitMeta, String), LazywtError>;
    fn stage(
        &self,
        cwd: &Path,
        path: &str,
        unstage: bool,
        cancel: &CancelToken,
    ) -> Result<(), LazywtError>;
    fn commit(
        &self,
        cwd: &Path,
        message: &str,
        all: bool,
        cancel: &CancelToken,
    ) -> Result<(), LazywtError>;
    fn discard(
        &self,
        cwd: &Path,
        path: &str,
        untracked: bool,
        cancel: &CancelToken,
    ) -> Result<(), LazywtError>;
}

#[derive(Debug, Clone)]
pub struct Git {
    repo_root: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl Git {
    pub fn from_cwd() -> Result<Self, LazywtError> {
        let cwd = std::env::current_dir()
            .map_err(|e| LazywtError::Other(format!("failed to get cwd: {e}")))?;
        Self::from_dir(&cwd)
    }

    pub fn from_dir(dir: &Path) -> Result<Self, LazywtError> {
        let repo_root = find_repo_root(dir).ok_or(LazywtError::NotInGitRepo)?;
        Ok(Self::new(repo_root))
    }

    #[must_use]
    pub fn new(repo_root: PathBuf) -> Self {
        Self {
            repo_root,
            runner: Arc::new(SystemRunner),
        }
    }

    #[must_use]
    pub fn with_runner(repo_root: PathBuf, runner: Arc<dyn CommandRunner>) -> Self {
        Self { repo_root, runner }
    }

    pub fn run(&self, args: &[&str], cancel: &CancelToken) -> Result<String, LazywtError> {
        self.run_in_dir(&self.repo_root, args, cancel)
    }

    pub fn run_in_dir(
        &self,
        dir: &Path,
        args: &[&str],
        cancel: &CancelToken,
    ) -> Result<String, LazywtError> {
        self.exec(&CommandSpec::new("git", args).in_dir(dir), cancel)
    }

    fn tool_in_dir(
        &self,
        program: &str,
        dir: &Path,
        args: &[&str],
        cancel: &CancelToken,
    ) -> Result<String, LazywtError> {
        self.exec(&CommandSpec::new(program, args).in_dir(dir), cancel)
    }

    fn exec(&self, spec: &CommandSpec, cancel: &CancelToken) -> Result<String, LazywtError> {
        self.runner.run(spec, cancel)?.into_stdout(spec)
    }

    fn main_worktree_path(&self, cancel: &CancelToken) -> PathBuf {
        self.run(&["rev-parse", "--path-format=absolute", "--git-common-dir"], cancel)
            .ok()
            .and_then(|s| {
                Path::new(s.trim())
                    .parent()
                    .map(Path::to_path_buf)
            })
            .unwrap_or_else(|| self.repo_root.clone())
    }
}

impl GitPort for Git {
    fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    fn list_worktrees(&self, cancel: &CancelToken) -> Result<Vec<WorktreeInfo>, LazywtError> {
        let out = self.run(&["worktree", "list", "--porcelain"], cancel)?;
        let entries = parse_worktree_porcelain(&out);
        if entries.is_empty() && !out.trim().is_empty() {
            return Err(LazywtError::ProtocolParse(
                "git worktree list --porcelain".to_owned(),
            ));
        }
        let mut worktrees = Vec::with_capacity(entries.len());
        for (i, entry) in entries.into_iter().enumerate() {
            if entry.bare {
                continue;
            }
            let mut branch = entry.branch;
            if branch.is_empty() {
                branch = if entry.detached {
                    format!("(detached {})", entry.head.get(..7).unwrap_or(&entry.head))
                } else {
                    "(unknown)".to_owned()
                };
            }
            // The first porcelain record is always the main worktree.
            worktrees.push(WorktreeInfo::new(entry.path, branch, i == 0));
        }
        Ok(worktrees)
    }

    fn status_raw(&self, cwd: &Path, cancel: &CancelToken) -> Result<String, LazywtError> {
        self.run_in_dir(cwd, &["status", "--porcelain=v2"], cancel)
    }

    fn log_raw(
        &self,
        cwd: &Path,
        limit: usize,
        cancel: &CancelToken,
    ) -> Result<String, LazywtError> {
        self.run_in_dir(
            cwd,
            &["log", &format!("-{limit}"), "--pretty=format:%H%x09%an%x09%s"],
            cancel,
        )
    }

    fn rev_list_unpushed(
        &self,
        cwd: &Path,
        cancel: &CancelToken,
    ) -> Result<HashSet<String>, LazywtError> {
        let out = self.run_in_dir(
            cwd,
            &["rev-list", "-100", "HEAD", "--not", "--remotes"],
            cancel,
        )?;
        Ok(parse_rev_list(&out))
    }

    fn rev_list_unmerged(
        &self,
        cwd: &Path,
        main_branch: &str,
        cancel: &CancelToken,
    ) -> Result<HashSet<String>, LazywtError> {
        if main_branch.is_empty() {
            return Ok(HashSet::new());
        }
        let out = self.run_in_dir(
            cwd,
            &["rev-list", "-100", "HEAD", &format!("^{main_branch}")],
            cancel,
        )?;
        Ok(parse_rev_list(&out))
    }

    fn divergence(&self, cwd: &Path, cancel: &CancelToken) -> Result<UpstreamInfo, LazywtError> {
        let Ok(upstream) = self.run_in_dir(
            cwd,
            &["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{upstream}"],
            cancel,
        ) else {
            cancel.check()?;
            return Ok(UpstreamInfo::default());
        };
        let counts = self.run_in_dir(
            cwd,
            &["rev-list", "--left-right", "--count", "HEAD...@{upstream}"],
            cancel,
        )?;
        Ok(UpstreamInfo {
            divergence: parse_divergence(&counts)?,
            upstream: Some(upstream.trim().to_owned()).filter(|s| !s.is_empty()),
        })
    }

    fn main_branch(&self, cancel: &CancelToken) -> Result<String, LazywtError> {
        if let Ok(out) = self.run(
            &["symbolic-ref", "--short", "refs/remotes/origin/HEAD"],
            cancel,
        ) {
            let name = out.trim();
            if let Some(b) = name.strip_prefix("origin/") {
                return Ok(b.to_owned());
            }
        }
        cancel.check()?;
        let branches = self.list_branches(cancel)?;
        for candidate in ["main", "master", "trunk", "develop"] {
            if branches.iter().any(|b| b == candidate) {
                return Ok(candidate.to_owned());
            }
        }
        Ok("main".to_owned())
    }

    fn last_commit_ts(&self, cwd: &Path, cancel: &CancelToken) -> Result<i64, LazywtError> {
        let out = self.run_in_dir(cwd, &["log", "-1", "--format=%ct"], cancel)?;
        Ok(out.trim().parse::<i64>().unwrap_or(0))
    }

    fn list_branches(&self, cancel: &CancelToken) -> Result<Vec<String>, LazywtError> {
        let out = self.run(
            &["for-each-ref", "--format=%(refname:short)", "refs/heads"],
            cancel,
        )?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_owned)
            .collect())
    }

    fn remote_url(&self, cancel: &CancelToken) -> Result<String, LazywtError> {
        Ok(self.run(&["remote", "get-url", "origin"], cancel)?.trim().to_owned())
    }

    fn fetch_prs(
        &self,
        host: ForgeHost,
        cancel: &CancelToken,
    ) -> Result<HashMap<String, PrInfo>, LazywtError> {
        let prs = match host {
            ForgeHost::GitHub => forge::parse_gh_prs(&self.tool_in_dir(
                "gh",
                &self.repo_root,
                &[
                    "pr",
                    "list",
                    "--state",
                    "all",
                    "--limit",
                    "100",
                    "--json",
                    forge::GH_PR_FIELDS,
                ],
                cancel,
            )?)?,
            ForgeHost::GitLab => forge::parse_glab_mrs(&self.tool_in_dir(
                "glab",
                &self.repo_root,
                &[
                    "api",
                    "projects/:fullpath/merge_requests?state=all&per_page=100",
                ],
                cancel,
            )?)?,
            ForgeHost::None => Vec::new(),
        };
        Ok(forge::index_by_branch(prs))
    }

    fn fetch_open_prs(
        &self,
        host: ForgeHost,
        cancel: &CancelToken,
    ) -> Result<Vec<PrInfo>, LazywtError> {
        match host {
            ForgeHost::GitHub => forge::parse_gh_prs(&self.tool_in_dir(
                "gh",
                &self.repo_root,
                &[
                    "pr",
                    "list",
                    "--state",
                    "open",
                    "--limit",
                    "100",
                    "--json",
                    forge::GH_PR_FIELDS,
                ],
                cancel,
            )?),
            ForgeHost::GitLab => Ok(forge::parse_glab_mrs(&self.tool_in_dir(
                "glab",
                &self.repo_root,
                &[
                    "api",
                    "projects/:fullpath/merge_requests?state=opened&per_page=100",
                ],
                cancel,
            )?)?
            .into_iter()
            .filter(|pr| pr.state == crate::core::models::PrState::Open)
            .collect()),
            ForgeHost::None => Err(LazywtError::Precondition(
                "No GitHub or GitLab remote found".to_owned(),
            )),
        }
    }

    fn fetch_issues(
        &self,
        host: ForgeHost,
        cancel: &CancelToken,
    ) -> Result<Vec<IssueInfo>, LazywtError> {
        match host {
            ForgeHost::GitHub => forge::parse_gh_issues(&self.tool_in_dir(
                "gh",
                &self.repo_root,
                &[
                    "issue",
                    "list",
                    "--state",
                    "open",
                    "--limit",
                    "100",
                    "--json",
                    "number,title,body,url,author",
                ],
                cancel,
            )?),
            ForgeHost::GitLab => forge::parse_glab_issues(&self.tool_in_dir(
                "glab",
                &self.repo_root,
                &["api", "projects/:fullpath/issues?state=opened&per_page=100"],
                cancel,
            )?),
            ForgeHost::None => Err(LazywtError::Precondition(
                "No GitHub or GitLab remote found".to_owned(),
            )),
        }
    }

    fn fetch_pr_by_path(
        &self,
        host: ForgeHost,
        worktree_path: &Path,
        cancel: &CancelToken,
    ) -> Result<Option<PrInfo>, LazywtError> {
        match host {
            ForgeHost::GitHub => {
                match self.tool_in_dir(
                    "gh",
                    worktree_path,
                    &["pr", "view", "--json", forge::GH_PR_FIELDS],
                    cancel,
                ) {
                    Ok(out) => forge::parse_gh_pr(&out).map(Some),
                    Err(LazywtError::SubprocessFailed { stderr, .. })
                        if stderr.contains("no pull requests found") =>
                    {
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            }
            ForgeHost::GitLab => {
                let out = self.tool_in_dir(
                    "glab",
                    worktree_path,
                    &["mr", "view", "--output", "json"],
                    cancel,
                );
                match out {
                    Ok(out) => Ok(forge::parse_glab_mrs(&format!("[{out}]"))?.into_iter().next()),
                    Err(LazywtError::SubprocessFailed { .. }) => Ok(None),
                    Err(e) => Err(e),
                }
            }
            ForgeHost::None => Ok(None),
        }
    }

    fn fetch_ci_checks(
        &self,
        host: ForgeHost,
        branch: &str,
        cwd: &Path,
        cancel: &CancelToken,
    ) -> Result<Vec<CiCheck>, LazywtError> {
        match host {
            ForgeHost::GitHub => {
                let out = self.runner.run(
                    &CommandSpec::new(
                        "gh",
                        &[
                            "pr",
                            "checks",
                            branch,
                            "--json",
                            "name,state,bucket,link,startedAt,completedAt",
                        ],
                    )
                    .in_dir(cwd),
                    cancel,
                )?;
                // `gh pr checks` exits 8 while checks are pending.
                if out.success() || out.code == Some(8) {
                    if out.stdout.trim_start().starts_with('[') {
                        return forge::parse_gh_checks_json(&out.stdout);
                    }
                    return Ok(forge::parse_gh_checks_table(&out.stdout));
                }
                if out.stderr.contains("no checks reported") {
                    return Ok(Vec::new());
                }
                Err(LazywtError::SubprocessFailed {
                    program: "gh".to_owned(),
                    args: format!("pr checks {branch}"),
                    code: out.code,
                    stderr: out.stderr.trim().to_owned(),
                })
            }
            ForgeHost::GitLab => forge::parse_glab_ci(&self.tool_in_dir(
                "glab",
                cwd,
                &["ci", "get", "--branch", branch, "--output", "json"],
                cancel,
            )?),
            ForgeHost::None => Ok(Vec::new()),
        }
    }

    fn update_pr_branch(
        &self,
        cwd: &Path,
        rebase: bool,
        cancel: &CancelToken,
    ) -> Result<(), LazywtError> {
        let mut args = vec!["pr", "update-branch"];
        if rebase {
            args.push("--rebase");
        }
        self.tool_in_dir("gh", cwd, &args, cancel)?;
        Ok(())
    }

    fn push(
        &self,
        cwd: &Path,
        remote: &str,
        branch: &str,
        set_upstream: bool,
        cancel: &CancelToken,
    ) -> Result<String, LazywtError> {
        let refspec = format!("HEAD:{branch}");
        let mut args = vec!["push"];
        if set_upstream {
            args.push("-u");
        }
        args.extend([remote, refspec.as_str()]);
        self.run_in_dir(cwd, &args, cancel)
    }

    fn pull(
        &self,
        cwd: &Path,
        remote: &str,
        branch: &str,
        rebase: bool,
        cancel: &CancelToken,
    ) -> Result<String, LazywtError> {
        let mut args = vec!["pull"];
        if rebase {
            args.push("--rebase");
        }
        args.extend([remote, branch]);
        self.run_in_dir(cwd, &args, cancel)
    }

    fn fetch_all(&self, cancel: &CancelToken) -> Result<(), LazywtError> {
        self.run(&["fetch", "--all", "--prune"], cancel)?;
        Ok(())
    }

    fn cherry_pick(
        &self,
        cwd: &Path,
        sha: &str,
        cancel: &CancelToken,
    ) -> Result<(), LazywtError> {
        match self.run_in_dir(cwd, &["cherry-pick", sha], cancel) {
            Ok(_) => Ok(()),
            Err(e @ LazywtError::SubprocessFailed { .. }) => {
                // Leave the target clean when the pick conflicts.
                let _ = self.run_in_dir(cwd, &["cherry-pick", "--abort"], cancel);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    fn delete_worktree(
        &self,
        path: &Path,
        force: bool,
        cancel: &CancelToken,
    ) -> Result<(), LazywtError> {
        let path = path.to_string_lossy();
        let mut args = vec!["worktree", "remove"];
        if force {
            args.push("--force");
        }
        args.push(&path);
        self.run(&args, cancel)?;
        let _ = self.run(&["worktree", "prune"], cancel);
        Ok(())
    }

    fn delete_branch(&self, branch: &str, cancel: &CancelToken) -> Result<(), LazywtError> {
        self.run(&["branch", "-D", branch], cancel)?;
        Ok(())
    }

    fn rename_worktree(
        &self,
        old: &Path,
        new: &Path,
        cancel: &CancelToken,
    ) -> Result<(), LazywtError> {
        self.run(
            &[
                "worktree",
                "move",
                &old.to_string_lossy(),
                &new.to_string_lossy(),
            ],
            cancel,
        )?;
        Ok(())
    }

    fn rename_branch(
        &self,
        cwd: &Path,
        old: &str,
        new: &str,
        cancel: &CancelToken,
    ) -> Result<(), LazywtError> {
        self.run_in_dir(cwd, &["branch", "-m", old, new], cancel)?;
        Ok(())
    }

    fn absorb(
        &self,
        worktree_path: &Path,
        main_path: &Path,
        branch: &str,
        main_branch: &str,
        method: MergeMethod,
        cancel: &CancelToken,
    ) -> Result<(), LazywtError> {
        match method {
            MergeMethod::Rebase => {
                if let Err(e) = self.run_in_dir(worktree_path, &["rebase", main_branch], cancel) {
                    let _ = self.run_in_dir(worktree_path, &["rebase", "--abort"], cancel);
                    return Err(e);
                }
                self.run_in_dir(main_path, &["merge", "--ff-only", branch], cancel)?;
            }
            MergeMethod::Merge => {
                if let Err(e) =
                    self.run_in_dir(main_path, &["merge", "--no-edit", branch], cancel)
                {
                    let _ = self.run_in_dir(main_path, &["merge", "--abort"], cancel);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn create_worktree(
        &self,
        path: &Path,
        branch: &str,
        base: Option<&str>,
        new_branch: bool,
        cancel: &CancelToken,
    ) -> Result<(), LazywtError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LazywtError::IoPath {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let path = path.to_string_lossy();
        let mut args = vec!["worktree", "add"];
        if new_branch {
            args.extend(["-b", branch, &path]);
            if let Some(base) = base {
                args.push(base);
            }
        } else {
            args.extend([path.as_ref(), branch]);
        }
        self.run(&args, cancel)?;
        Ok(())
    }

    fn create_worktree_from_pr(
        &self,
        host: ForgeHost,
        pr_number: u64,
        branch: &str,
        path: &Path,
        cancel: &CancelToken,
    ) -> Result<(), LazywtError> {
        let refspec = match host {
            ForgeHost::GitLab => format!("merge-requests/{pr_number}/head:{branch}"),
            _ => format!("pull/{pr_number}/head:{branch}"),
        };
        self.run(&["fetch", "origin", &refspec], cancel)?;
        self.create_worktree(path, branch, None, false, cancel)
    }

    fn checkout_pr_branch(
        &self,
        cwd: &Path,
        branch: &str,
        cancel: &CancelToken,
    ) -> Result<(), LazywtError> {
        let _ = self.run_in_dir(cwd, &["fetch", "origin", branch], cancel);
        cancel.check()?;
        self.run_in_dir(cwd, &["checkout", branch], cancel)
            .map_err(|e| LazywtError::Other(format!("failed to checkout branch: {e}")))?;
        Ok(())
    }

    fn diff(&self, cwd: &Path, cancel: &CancelToken) -> Result<String, LazywtError> {
        self.run_in_dir(cwd, &["diff", "HEAD"], cancel)
    }

    fn stash_push(&self, cwd: &Path, cancel: &CancelToken) -> Result<(), LazywtError> {
        self.run_in_dir(
            cwd,
            &["stash", "push", "--include-untracked", "-m", "lazywt: move changes"],
            cancel,
        )?;
        Ok(())
    }

    fn stash_pop(&self, cwd: &Path, cancel: &CancelToken) -> Result<(), LazywtError> {
        self.run_in_dir(cwd, &["stash", "pop"], cancel)?;
        Ok(())
    }

    fn commit_show(
        &self,
        cwd: &Path,
        sha: &str,
        cancel: &CancelToken,
    ) -> Result<(CommitMeta, String), LazywtError> {
        let meta = self.run_in_dir(
            cwd,
            &["show", "-s", "--format=%H%x1f%an%x1f%ae%x1f%ad%x1f%s%x1f%b", sha],
            cancel,
        )?;
        let patch = self.run_in_dir(cwd, &["show", "--stat", "--patch", "--format=", sha], cancel)?;
        Ok((parse_commit_meta(&meta)?, patch))
    }

    fn stage(
        &self,
        cwd: &Path,
        path: &str,
        unstage: bool,
        cancel: &CancelToken,
    ) -> Result<(), LazywtError> {
        if unstage {
            self.run_in_dir(cwd, &["restore", "--staged", "--", path], cancel)?;
        } else {
            self.run_in_dir(cwd, &["add", "--", path], cancel)?;
        }
        Ok(())
    }

    fn commit(
        &self,
        cwd: &Path,
        message: &str,
        all: bool,
        cancel: &CancelToken,
    ) -> Result<(), LazywtError> {
        let mut args = vec!["commit"];
        if all {
            args.push("-a");
        }
        args.extend(["-m", message]);
        self.run_in_dir(cwd, &args, cancel)?;
        Ok(())
    }

    fn discard(
        &self,
        cwd: &Path,
        path: &str,
        untracked: bool,
        cancel: &CancelToken,
    ) -> Result<(), LazywtError> {
        if untracked {
            self.run_in_dir(cwd, &["clean", "-fd", "--", path], cancel)?;
        } else {
            self.run_in_dir(
                cwd,
                &["restore", "--staged", "--worktree", "--source=HEAD", "--", path],
                cancel,
            )?;
        }
        Ok(())
    }
}

impl Git {
    /// Path of the main worktree (parent of the common git dir).
    #[must_use]
    pub fn main_path(&self) -> PathBuf {
        self.main_worktree_path(&CancelToken::new())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PorcelainEntry {
    pub path: String,
    pub branch: String,
    pub head: String,
    pub bare: bool,
    pub detached: bool,
}

#[must_use]
pub fn parse_worktree_porcelain(out: &str) -> Vec<PorcelainEntry> {
    let mut entries = Vec::new();
    let mut cur: Option<PorcelainEntry> = None;
    for line in out.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            if let Some(e) = cur.take() {
                entries.push(e);
            }
            continue;
        }
        if let Some(path) = line.strip_prefix("worktree ") {
            if let Some(e) = cur.take() {
                entries.push(e);
            }
            cur = Some(PorcelainEntry {
                path: path.to_owned(),
                ..PorcelainEntry::default()
            });
            continue;
        }
        let Some(e) = cur.as_mut() else {
            continue;
        };
        if let Some(head) = line.strip_prefix("HEAD ") {
            head.clone_into(&mut e.head);
        } else if let Some(branch) = line.strip_prefix("branch ") {
            branch
                .strip_prefix("refs/heads/")
                .unwrap_or(branch)
                .clone_into(&mut e.branch);
        } else if line == "bare" {
            e.bare = true;
        } else if line == "detached" {
            e.detached = true;
        }
    }
    if let Some(e) = cur.take() {
        entries.push(e);
    }
    entries
}

#[must_use]
pub fn parse_rev_list(out: &str) -> HashSet<String> {
    out.lines()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Parses `rev-list --left-right --count` output: `<ahead>\t<behind>`.
pub fn parse_divergence(out: &str) -> Result<Divergence, LazywtError> {
    let mut parts = out.split_whitespace();
    let (Some(a), Some(b)) = (parts.next(), parts.next()) else {
        return Err(LazywtError::ProtocolParse(format!(
            "rev-list --count: {out:?}"
        )));
    };
    let parse = |s: &str| {
        s.parse::<u32>()
            .map_err(|_| LazywtError::ProtocolParse(format!("rev-list --count: {out:?}")))
    };
    Ok(Divergence {
        ahead: parse(a)?,
        behind: parse(b)?,
    })
}

/// Parses `%H%x09%an%x09%s` log lines and flags unpushed/unmerged commits.
#[must_use]
pub fn parse_log(
    raw: &str,
    unpushed: &HashSet<String>,
    unmerged: &HashSet<String>,
) -> Vec<CommitLogEntry> {
    raw.lines()
        .filter_map(|line| {
            let mut parts = line.splitn(3, '\t');
            let sha = parts.next()?.trim();
            if sha.is_empty() {
                return None;
            }
            let author = parts.next().unwrap_or_default();
            let message = parts.next().unwrap_or_default();
            Some(CommitLogEntry {
                sha: sha.to_owned(),
                author_initials: author_initials(author),
                message: message.to_owned(),
                is_unpushed: unpushed.contains(sha),
                is_unmerged: unmerged.contains(sha),
            })
        })
        .collect()
}

#[must_use]
pub fn author_initials(name: &str) -> String {
    let words: Vec<&str> = name.split_whitespace().collect();
    let initials: String = match words.as_slice() {
        [] => String::new(),
        [single] => single.chars().take(2).collect(),
        [first, .., last] => first
            .chars()
            .take(1)
            .chain(last.chars().take(1))
            .collect(),
    };
    initials.to_uppercase()
}

fn parse_commit_meta(raw: &str) -> Result<CommitMeta, LazywtError> {
    let fields: Vec<&str> = raw.splitn(6, '\x1f').collect();
    if fields.len() < 5 {
        return Err(LazywtError::ProtocolParse("git show metadata".to_owned()));
    }
    let body = fields
        .get(5)
        .map(|b| b.trim_end().lines().map(str::to_owned).collect())
        .unwrap_or_default();
    Ok(CommitMeta {
        sha: fields[0].trim().to_owned(),
        author: fields[1].to_owned(),
        email: fields[2].to_owned(),
        date: fields[3].to_owned(),
        subject: fields[4].to_owned(),
        body,
    })
}

fn find_repo_root(start: &Path) -> Option<PathBuf> {
    let mut cur = Some(start);
    while let Some(dir) = cur {
        let candidate = dir.join(".git");
        if candidate.is_dir() || candidate.is_file() {
            return Some(dir.to_path_buf());
        }
        cur = dir.parent();
    }
    None
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Records every invocation and replies from a queue keyed by argv prefix.
    #[derive(Debug, Default)]
    pub struct RecordingRunner {
        pub calls: Mutex<Vec<CommandSpec>>,
        pub replies: Mutex<Vec<(String, CommandOutput)>>,
    }

    impl RecordingRunner {
        pub fn reply(&self, prefix: &str, stdout: &str) {
            self.reply_with(prefix, Some(0), stdout, "");
        }

        pub fn reply_with(&self, prefix: &str, code: Option<i32>, stdout: &str, stderr: &str) {
            self.replies.lock().unwrap().push((
                prefix.to_owned(),
                CommandOutput {
                    code,
                    stdout: stdout.to_owned(),
                    stderr: stderr.to_owned(),
                },
            ));
        }

        pub fn argv(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(CommandSpec::display)
                .collect()
        }
    }

    impl CommandRunner for RecordingRunner {
        fn run(
            &self,
            spec: &CommandSpec,
            cancel: &CancelToken,
        ) -> Result<CommandOutput, LazywtError> {
            cancel.check()?;
            self.calls.lock().unwrap().push(spec.clone());
            let line = spec.display();
            let replies = self.replies.lock().unwrap();
            let reply = replies
                .iter()
                .find(|(prefix, _)| line.starts_with(prefix.as_str()))
                .map(|(_, out)| out.clone());
            Ok(reply.unwrap_or(CommandOutput {
                code: Some(0),
                ..CommandOutput::default()
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingRunner;
    use super::*;

    #[test]
    fn parses_worktree_porcelain_records() {
        let out = "worktree /repo\nHEAD abc123\nbranch refs/heads/main\n\nworktree /wt/feature\nHEAD def456\nbranch refs/heads/feature/x\n\nworktree /wt/detached\nHEAD 0123456789\ndetached\n";
        let entries = parse_worktree_porcelain(out);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].branch, "main");
        assert_eq!(entries[1].branch, "feature/x");
        assert_eq!(entries[1].path, "/wt/feature");
        assert!(entries[2].detached);
    }

    #[test]
    fn list_worktrees_marks_first_entry_main() {
        let runner = Arc::new(RecordingRunner::default());
        runner.reply(
            "git worktree list",
            "worktree /repo\nHEAD abc\nbranch refs/heads/main\n\nworktree /wt/a\nHEAD 0123456789\ndetached\n",
        );
        let git = Git::with_runner(PathBuf::from("/repo"), runner);
        let wts = git.list_worktrees(&CancelToken::new()).unwrap();
        assert!(wts[0].is_main);
        assert!(!wts[1].is_main);
        assert_eq!(wts[1].branch, "(detached 0123456)");
    }

    #[test]
    fn parses_log_and_flags_commits() {
        let raw = "aaaa\tJane Doe\tfix: thing\nbbbb\tbob\tfeat: other\tstuff\n";
        let unpushed: HashSet<String> = ["aaaa".to_owned()].into();
        let unmerged: HashSet<String> = ["aaaa".to_owned(), "bbbb".to_owned()].into();
        let entries = parse_log(raw, &unpushed, &unmerged);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].author_initials, "JD");
        assert!(entries[0].is_unpushed);
        assert_eq!(entries[1].author_initials, "BO");
        assert_eq!(entries[1].message, "feat: other\tstuff");
        assert!(!entries[1].is_unpushed && entries[1].is_unmerged);
    }

    #[test]
    fn divergence_rejects_garbage() {
        assert_eq!(
            parse_divergence("3\t1\n").unwrap(),
            Divergence {
                ahead: 3,
                behind: 1
            }
        );
        assert!(matches!(
            parse_divergence("nope"),
            Err(LazywtError::ProtocolParse(_))
        ));
    }

    #[test]
    fn push_uses_explicit_refspec_and_upstream_flag() {
        let runner = Arc::new(RecordingRunner::default());
        let git = Git::with_runner(PathBuf::from("/repo"), runner.clone());
        let cancel = CancelToken::new();
        git.push(Path::new("/wt/feature"), "origin", "feature", false, &cancel)
            .unwrap();
        git.push(Path::new("/wt/feature"), "origin", "feature", true, &cancel)
            .unwrap();
        git.pull(Path::new("/wt/feature"), "origin", "feature", true, &cancel)
            .unwrap();
        assert_eq!(
            runner.argv(),
            vec![
                "git push origin HEAD:feature",
                "git push -u origin HEAD:feature",
                "git pull --rebase origin feature",
            ]
        );
    }

    #[test]
    fn nonzero_exit_becomes_subprocess_failed() {
        let runner = Arc::new(RecordingRunner::default());
        runner.reply_with("git status", Some(128), "", "fatal: not a git repository\n");
        let git = Git::with_runner(PathBuf::from("/repo"), runner);
        let err = git
            .status_raw(Path::new("/repo"), &CancelToken::new())
            .unwrap_err();
        match err {
            LazywtError::SubprocessFailed { code, stderr, .. } => {
                assert_eq!(code, Some(128));
                assert_eq!(stderr, "fatal: not a git repository");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn cancelled_token_short_circuits() {
        let runner = Arc::new(RecordingRunner::default());
        let git = Git::with_runner(PathBuf::from("/repo"), runner.clone());
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(git.fetch_all(&cancel).unwrap_err().is_cancelled());
        assert!(runner.argv().is_empty());
    }

    #[test]
    fn commit_meta_splits_unit_separators() {
        let meta =
            parse_commit_meta("abc\x1fJane\x1fjane@x.io\x1fMon\x1fsubject\x1fline one\nline two\n")
                .unwrap();
        assert_eq!(meta.subject, "subject");
        assert_eq!(meta.body, vec!["line one", "line two"]);
    }

    fn sh_available() -> bool {
        std::process::Command::new("sh")
            .args(["-c", "true"])
            .status()
            .is_ok()
    }

    #[test]
    fn system_runner_feeds_stdin_and_captures_output() {
        if !sh_available() {
            eprintln!("skipping: sh not found");
            return;
        }
        let spec = CommandSpec::new("sh", &["-c", "cat; echo err >&2; exit 3"]).with_stdin("piped\n");
        let out = SystemRunner.run(&spec, &CancelToken::new()).unwrap();
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout, "piped\n");
        assert_eq!(out.stderr.trim(), "err");
    }

    #[test]
    fn system_runner_kills_child_on_timeout() {
        if !sh_available() {
            eprintln!("skipping: sh not found");
            return;
        }
        let spec =
            CommandSpec::new("sh", &["-c", "sleep 5"]).with_timeout(Duration::from_millis(150));
        let started = std::time::Instant::now();
        let err = SystemRunner.run(&spec, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, LazywtError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn system_runner_stops_when_cancelled() {
        if !sh_available() {
            eprintln!("skipping: sh not found");
            return;
        }
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(150));
            trigger.cancel();
        });
        let started = std::time::Instant::now();
        let err = SystemRunner
            .run(&CommandSpec::new("sh", &["-c", "sleep 5"]), &cancel)
            .unwrap_err();
        canceller.join().unwrap();
        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn missing_program_is_reported_as_unavailable() {
        let err = SystemRunner
            .run(&CommandSpec::new("lazywt-no-such-tool", &[]), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, LazywtError::GitUnavailable { tool } if tool == "lazywt-no-such-tool"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn system_runner_works_from_async_context() {
        if !sh_available() {
            eprintln!("skipping: sh not found");
            return;
        }
        let out = SystemRunner
            .run(&CommandSpec::new("sh", &["-c", "echo hi"]), &CancelToken::new())
            .unwrap();
        assert_eq!(out.stdout.trim(), "hi");
    }

    #[tokio::test]
    async fn cancelled_wakes_waiters() {
        let cancel = CancelToken::new();
        let waiter = tokio::spawn({
            let cancel = cancel.clone();
            async move { cancel.cancelled().await }
        });
        tokio::task::yield_now().await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
