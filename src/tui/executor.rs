#![forbid(unsafe_code)]

//! Turns [`Cmd`] values into background work.
//!
//! Every spawned task reports back with exactly one [`Msg`] on the channel.
//! Persistence commands are cheap and run inline on the caller's thread.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Instant;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::core::cache::{SharedCaches, get_cached_details};
use crate::core::git::{CancelToken, CommandRunner, CommandSpec, GitPort, MergeMethod};
use crate::core::models::ForgeHost;
use crate::core::naming::worktree_path_for;
use crate::core::persistence::PersistenceStore;
use crate::core::scan::{DEFAULT_SCAN_CONCURRENCY, WorktreeScanner};
use crate::core::scripts::{
    SCRIPT_TIMEOUT, ScriptSubject, branch_from_script_output, run_commands, run_script,
    subject_env,
};
use crate::core::trust::{TrustDecision, TrustStore, decide};
use crate::error::{LazywtError, TaskError};
use crate::mux::terminal_tab::{self, Terminal};
use crate::mux::tmux::Tmux;
use crate::mux::zellij::Zellij;
use crate::mux::{Multiplexer, prepare_session, tab_script};
use crate::tui::model::{Cmd, Msg, NamingFor, SessionKind};
use crate::tui::ops::{CreateRequest, GitJob, JobOutput, NoteSeed, PendingCommands, split_upstream};

/// Shared handles every task needs.
#[derive(Debug, Clone)]
pub struct Executor {
    cfg: Arc<Config>,
    worktree_root: PathBuf,
    repo_key: String,
    main_path: PathBuf,
    host: ForgeHost,
    runner: Arc<dyn CommandRunner>,
    git: Arc<dyn GitPort>,
    caches: SharedCaches,
    store: PersistenceStore,
    trust: Arc<Mutex<TrustStore>>,
    main_branch: Arc<OnceLock<String>>,
    tx: UnboundedSender<Msg>,
    cancel: CancelToken,
}

/// Everything [`Executor::new`] needs from startup.
#[derive(Debug)]
pub struct ExecutorParts {
    pub cfg: Config,
    pub worktree_root: PathBuf,
    pub repo_key: String,
    pub main_path: PathBuf,
    pub host: ForgeHost,
    pub runner: Arc<dyn CommandRunner>,
    pub git: Arc<dyn GitPort>,
    pub caches: SharedCaches,
    pub store: PersistenceStore,
    pub trust: TrustStore,
}

/// Message plus remediation hint, for failures reported as plain text.
fn err_text(e: &LazywtError) -> String {
    TaskError::from(e).to_string()
}

impl Executor {
    #[must_use]
    pub fn new(parts: ExecutorParts, tx: UnboundedSender<Msg>, cancel: CancelToken) -> Self {
        Self {
            cfg: Arc::new(parts.cfg),
            worktree_root: parts.worktree_root,
            repo_key: parts.repo_key,
            main_path: parts.main_path,
            host: parts.host,
            runner: parts.runner,
            git: parts.git,
            caches: parts.caches,
            store: parts.store,
            trust: Arc::new(Mutex::new(parts.trust)),
            main_branch: Arc::new(OnceLock::new()),
            tx,
            cancel,
        }
    }

    /// Cancels every task started by this executor.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    fn send(&self, msg: Msg) {
        // The loop is gone only while shutting down.
        if self.tx.send(msg).is_err() {
            debug!("message dropped after shutdown");
        }
    }

    /// Main branch as resolved by the first `LoadMainBranch`.
    fn main_branch(&self) -> String {
        self.main_branch
            .get()
            .cloned()
            .unwrap_or_else(|| "main".to_owned())
    }

    fn blocking<F>(&self, work: F)
    where
        F: FnOnce(&Self) -> Msg + Send + 'static,
    {
        let this = self.clone();
        tokio::task::spawn_blocking(move || {
            let msg = work(&this);
            this.send(msg);
        });
    }

    /// Starts `cmd`. Foreground and clipboard commands belong to the terminal
    /// owner and are handed back unchanged.
    pub fn execute(&self, cmd: Cmd) -> Option<Cmd> {
        match cmd {
            Cmd::LoadWorktrees => {
                let this = self.clone();
                tokio::spawn(async move {
                    let scanner =
                        WorktreeScanner::new(Arc::clone(&this.git), DEFAULT_SCAN_CONCURRENCY);
                    let result = scanner.scan(&this.cancel).await.map_err(|e| err_text(&e));
                    this.send(Msg::WorktreesLoaded(result));
                });
            }
            Cmd::LoadMainBranch => self.blocking(|this| {
                let branch = this
                    .git
                    .main_branch(&this.cancel)
                    .unwrap_or_else(|_| "main".to_owned());
                let _ = this.main_branch.set(branch.clone());
                Msg::MainBranchLoaded(branch)
            }),
            Cmd::FetchDetails { path, force } => {
                if force {
                    self.caches.invalidate_details(&path);
                }
                let this = self.clone();
                tokio::spawn(async move {
                    let result = get_cached_details(
                        &this.caches,
                        &this.git,
                        Path::new(&path),
                        &this.main_branch(),
                        &this.cancel,
                    )
                    .await
                    .map_err(|e| err_text(&e));
                    this.send(Msg::DetailsLoaded { path, result });
                });
            }
            Cmd::FetchPrs => self.blocking(|this| {
                Msg::PrsLoaded(
                    this.git
                        .fetch_prs(this.host, &this.cancel)
                        .map_err(|e| err_text(&e)),
                )
            }),
            Cmd::FetchPrForPath { path } => self.blocking(move |this| {
                let result = this
                    .git
                    .fetch_pr_by_path(this.host, Path::new(&path), &this.cancel)
                    .map_err(|e| err_text(&e));
                Msg::PrForPathLoaded { path, result }
            }),
            Cmd::FetchCi {
                branch,
                path,
                force,
            } => {
                if !force && let Some(checks) = self.caches.ci_fresh(&branch, Instant::now()) {
                    self.send(Msg::CiLoaded {
                        branch,
                        result: Ok(checks),
                    });
                    return None;
                }
                self.blocking(move |this| {
                    let result = this
                        .git
                        .fetch_ci_checks(this.host, &branch, Path::new(&path), &this.cancel)
                        .inspect(|checks| this.caches.put_ci(&branch, checks.clone(), Instant::now()))
                        .map_err(|e| err_text(&e));
                    Msg::CiLoaded { branch, result }
                });
            }
            Cmd::FetchOpenPrs => self.blocking(|this| {
                Msg::OpenPrsLoaded(
                    this.git
                        .fetch_open_prs(this.host, &this.cancel)
                        .map_err(|e| err_text(&e)),
                )
            }),
            Cmd::FetchIssues => self.blocking(|this| {
                Msg::IssuesLoaded(
                    this.git
                        .fetch_issues(this.host, &this.cancel)
                        .map_err(|e| err_text(&e)),
                )
            }),
            Cmd::ListBranches => self.blocking(|this| {
                Msg::BranchesLoaded(
                    this.git
                        .list_branches(&this.cancel)
                        .map_err(|e| err_text(&e)),
                )
            }),
            Cmd::Git(job) => self.blocking(move |this| {
                info!(job = job.name(), "running job");
                let result = this.run_job(&job).map_err(|e| {
                    if !e.is_cancelled() {
                        warn!(job = job.name(), error = %e, "job failed");
                    }
                    TaskError::from(&e)
                });
                Msg::JobDone { job, result }
            }),
            Cmd::BranchNameScript { naming, cwd } => self.blocking(move |this| {
                let result = this.branch_name(&naming, Path::new(&cwd));
                Msg::BranchNameGenerated { naming, result }
            }),
            Cmd::CustomMenuScript { command, cwd } => self.blocking(move |this| {
                let result = run_script(
                    this.runner.as_ref(),
                    &command,
                    Path::new(&cwd),
                    "",
                    &Default::default(),
                    &this.cancel,
                    SCRIPT_TIMEOUT,
                )
                .map(|out| branch_from_script_output(&out, this.cfg.max_name_length))
                .map_err(|e| err_text(&e));
                Msg::BranchNameGenerated {
                    naming: NamingFor::Custom,
                    result,
                }
            }),
            Cmd::NoteScript { path, seed } => self.blocking(move |this| {
                let result = this.note(&path, &seed);
                Msg::NoteGenerated { path, result }
            }),
            Cmd::RunCommands { pending, force } => self.run_commands(pending, force),
            Cmd::TrustAndRun(pending) => {
                if let Some(file) = &pending.trust_path {
                    let mut store = self.trust.lock().unwrap_or_else(PoisonError::into_inner);
                    if let Err(e) = store.trust(file) {
                        warn!(error = %e, file = %file.display(), "failed to record trust");
                    }
                }
                self.run_commands(pending, true);
            }
            Cmd::NewTab {
                command,
                cwd,
                title,
                env,
            } => self.blocking(move |this| this.launch_tab(&command, &cwd, &title, &env)),
            Cmd::SessionTab {
                kind,
                session,
                path,
                title,
                env,
            } => self.blocking(move |this| {
                let mux: Box<dyn Multiplexer> = match kind {
                    SessionKind::Tmux => Box::new(Tmux),
                    SessionKind::Zellij => Box::new(Zellij),
                };
                match prepare_session(mux.as_ref(), &this.cfg.session_prefix, &session, &path, &env) {
                    Ok((name, script)) => {
                        let command = tab_script(mux.as_ref(), &name, &script);
                        this.launch_tab(&command, &path, &title, &env)
                    }
                    Err(e) => Msg::TabLaunched(Err(format!("{} setup failed: {e}", mux.name()))),
                }
            }),
            Cmd::OpenUrl(url) => {
                let this = self.clone();
                tokio::task::spawn_blocking(move || {
                    let program = if cfg!(target_os = "macos") { "open" } else { "xdg-open" };
                    let spec = CommandSpec::new(program, &[url.as_str()]);
                    if let Err(e) = this
                        .runner
                        .run(&spec, &this.cancel)
                        .and_then(|out| out.into_stdout(&spec))
                    {
                        this.send(Msg::Error(format!("Failed to open {url}: {e}")));
                    }
                });
            }
            Cmd::SaveNotes(mut notes) => {
                if let Err(e) = notes.save() {
                    warn!(error = %e, "failed to save notes");
                }
            }
            Cmd::SaveAccess(access) => {
                if let Err(e) = self.store.save_access(&access) {
                    warn!(error = %e, "failed to save access history");
                }
            }
            Cmd::SaveCache(worktrees) => {
                if let Err(e) = self.store.save_cache(&worktrees) {
                    warn!(error = %e, "failed to save worktree cache");
                }
            }
            Cmd::SaveLastSelected(path) => {
                if let Err(e) = self.store.save_last_selected(&path) {
                    warn!(error = %e, "failed to save last selection");
                }
            }
            Cmd::RecordPaletteUse(id) => {
                let now = time::OffsetDateTime::now_utc().unix_timestamp();
                if let Err(e) = self.store.record_palette_use(&id, now) {
                    warn!(error = %e, "failed to save palette history");
                }
            }
            Cmd::PushHistory(command) => {
                if let Err(e) = self.store.push_command_history(&command) {
                    warn!(error = %e, "failed to save command history");
                }
            }
            cmd @ (Cmd::Foreground(_) | Cmd::Copy(_)) => return Some(cmd),
        }
        None
    }

    fn run_commands(&self, pending: PendingCommands, force: bool) {
        if !force && let Some(file) = &pending.trust_path {
            let status = self
                .trust
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .check(file);
            match decide(self.cfg.trust_mode, status) {
                TrustDecision::Run => {}
                TrustDecision::Prompt => {
                    self.send(Msg::TrustPrompt(pending));
                    return;
                }
                TrustDecision::Deny => {
                    info!(label = %pending.label, file = %file.display(), "commands denied by trust mode");
                    self.send(Msg::CommandsSkipped(pending.label));
                    return;
                }
            }
        }
        self.blocking(move |this| {
            let PendingCommands {
                label,
                commands,
                cwd,
                env,
                after,
                ..
            } = pending;
            debug!(%label, count = commands.len(), "running commands");
            let result = run_commands(this.runner.as_ref(), &commands, &cwd, &env, &this.cancel)
                .map_err(|e| err_text(&e));
            Msg::CommandsDone {
                label,
                result,
                after,
            }
        });
    }

    fn branch_name(&self, naming: &NamingFor, cwd: &Path) -> Result<Option<String>, String> {
        let (stdin, env) = match naming {
            NamingFor::Pr(pr) => (
                format!("{}\n\n{}", pr.title, pr.body),
                subject_env(ScriptSubject::Pr, Some(pr.number), &pr.title, &pr.url),
            ),
            NamingFor::Issue(issue) => (
                format!("{}\n\n{}", issue.title, issue.body),
                subject_env(ScriptSubject::Issue, Some(issue.number), &issue.title, &issue.url),
            ),
            NamingFor::Changes { .. } => (
                self.git.diff(cwd, &self.cancel).map_err(|e| err_text(&e))?,
                subject_env(ScriptSubject::Diff, None, "", ""),
            ),
            NamingFor::Custom => (String::new(), Default::default()),
        };
        let out = run_script(
            self.runner.as_ref(),
            &self.cfg.branch_name_script,
            cwd,
            &stdin,
            &env,
            &self.cancel,
            SCRIPT_TIMEOUT,
        )
        .map_err(|e| err_text(&e))?;
        Ok(branch_from_script_output(&out, self.cfg.max_name_length))
    }

    fn note(&self, path: &str, seed: &NoteSeed) -> Result<Option<String>, String> {
        let mut env = subject_env(seed.subject, seed.number, &seed.title, &seed.url);
        env.insert("WORKTREE_PATH".to_owned(), path.to_owned());
        let stdin = format!("{}\n\n{}", seed.title, seed.body);
        let out = run_script(
            self.runner.as_ref(),
            &self.cfg.worktree_note_script,
            Path::new(path),
            &stdin,
            &env,
            &self.cancel,
            SCRIPT_TIMEOUT,
        )
        .map_err(|e| err_text(&e))?;
        Ok(Some(out).filter(|s| !s.trim().is_empty()))
    }

    fn rebase(&self) -> bool {
        self.cfg.merge_method == MergeMethod::Rebase
    }

    /// Upstream remote and branch of `cwd`, required for pull.
    fn upstream_of(&self, cwd: &Path) -> Result<(String, String), LazywtError> {
        let up = self.git.divergence(cwd, &self.cancel)?;
        up.upstream
            .as_deref()
            .and_then(split_upstream)
            .ok_or_else(|| LazywtError::Precondition("branch has no upstream".to_owned()))
    }

    fn run_job(&self, job: &GitJob) -> Result<JobOutput, LazywtError> {
        let git = self.git.as_ref();
        let cancel = &self.cancel;
        match job {
            GitJob::Push {
                path,
                remote,
                branch,
                set_upstream,
            } => git
                .push(Path::new(path), remote, branch, *set_upstream, cancel)
                .map(JobOutput::Text),
            GitJob::Sync {
                path,
                remote,
                branch,
                set_upstream,
            } => {
                let cwd = Path::new(path);
                let pulled = git.pull(cwd, remote, branch, self.rebase(), cancel)?;
                let pushed = git.push(cwd, remote, branch, *set_upstream, cancel)?;
                Ok(JobOutput::Text(join_output(&pulled, &pushed)))
            }
            GitJob::UpdateFromBase { path } => {
                let cwd = Path::new(path);
                git.update_pr_branch(cwd, self.rebase(), cancel)?;
                let (remote, branch) = self.upstream_of(cwd)?;
                git.pull(cwd, &remote, &branch, self.rebase(), cancel)
                    .map(JobOutput::Text)
            }
            GitJob::Absorb { path, branch } => {
                let cwd = Path::new(path);
                git.absorb(
                    cwd,
                    &self.main_path,
                    branch,
                    &self.main_branch(),
                    self.cfg.merge_method,
                    cancel,
                )?;
                git.delete_worktree(cwd, false, cancel)?;
                if let Err(e) = git.delete_branch(branch, cancel) {
                    warn!(%branch, error = %e, "absorbed branch not deleted");
                }
                Ok(JobOutput::Done)
            }
            GitJob::Delete { path, force, .. } => {
                git.delete_worktree(Path::new(path), *force, cancel)?;
                Ok(JobOutput::Done)
            }
            GitJob::DeleteBranch { branch } => {
                git.delete_branch(branch, cancel)?;
                Ok(JobOutput::Done)
            }
            GitJob::Prune { targets } => {
                let mut failures = Vec::new();
                for (path, branch) in targets {
                    cancel.check()?;
                    if let Err(e) = git.delete_worktree(Path::new(path), false, cancel) {
                        failures.push(format!("{path}: {e}"));
                        continue;
                    }
                    if !branch.is_empty()
                        && let Err(e) = git.delete_branch(branch, cancel)
                    {
                        warn!(%branch, error = %e, "pruned branch not deleted");
                    }
                }
                Ok(JobOutput::Pruned(failures))
            }
            GitJob::CherryPick { sha, target } => {
                git.cherry_pick(Path::new(target), sha, cancel)?;
                Ok(JobOutput::Done)
            }
            GitJob::Create(req) => self.create(req),
            GitJob::CreateFromPr { pr, branch } => {
                let path = self.new_worktree_path(branch)?;
                if git.list_branches(cancel)?.iter().any(|b| b == branch) {
                    // Fetching onto an existing local branch would fail; attach it instead.
                    git.create_worktree(&path, branch, None, false, cancel)?;
                    git.checkout_pr_branch(&path, branch, cancel)?;
                } else {
                    git.create_worktree_from_pr(self.host, pr.number, branch, &path, cancel)?;
                }
                Ok(JobOutput::Created(path.to_string_lossy().to_string()))
            }
            GitJob::Rename {
                path,
                new_path,
                old_branch,
                new_branch,
            } => {
                if path != new_path {
                    git.rename_worktree(Path::new(path), Path::new(new_path), cancel)?;
                }
                if let Some(new_branch) = new_branch {
                    git.rename_branch(Path::new(new_path), old_branch, new_branch, cancel)?;
                }
                Ok(JobOutput::Done)
            }
            GitJob::Stage {
                path,
                files,
                unstage,
            } => {
                for file in files {
                    git.stage(Path::new(path), file, *unstage, cancel)?;
                }
                Ok(JobOutput::Done)
            }
            GitJob::Commit { path, message, all } => {
                git.commit(Path::new(path), message, *all, cancel)?;
                Ok(JobOutput::Done)
            }
            GitJob::Discard {
                path,
                file,
                untracked,
            } => {
                git.discard(Path::new(path), file, *untracked, cancel)?;
                Ok(JobOutput::Done)
            }
            GitJob::FetchAll => {
                git.fetch_all(cancel)?;
                Ok(JobOutput::Done)
            }
            GitJob::CommitShow { path, sha } => {
                let (meta, diff) = git.commit_show(Path::new(path), sha, cancel)?;
                Ok(JobOutput::Commit(Box::new(meta), diff))
            }
        }
    }

    fn launch_tab(&self, command: &str, cwd: &str, title: &str, env: &BTreeMap<String, String>) -> Msg {
        let Some(terminal) = Terminal::detect_from_env() else {
            return Msg::TabLaunched(Err(
                "no supported terminal found (kitty, WezTerm or iTerm)".to_owned(),
            ));
        };
        let result = terminal_tab::launch(
            self.runner.as_ref(),
            terminal,
            command,
            Path::new(cwd),
            title,
            env,
            &self.cancel,
        )
        .map(|title| terminal_tab::info_message(terminal, &title))
        .map_err(|e| err_text(&e));
        Msg::TabLaunched(result)
    }

    fn new_worktree_path(&self, branch: &str) -> Result<PathBuf, LazywtError> {
        let path = worktree_path_for(&self.worktree_root, &self.repo_key, branch);
        if path.exists() {
            return Err(LazywtError::Precondition(format!(
                "path already exists: {}",
                path.display()
            )));
        }
        Ok(path)
    }

    /// New branch worktree; uncommitted changes travel through the stash.
    fn create(&self, req: &CreateRequest) -> Result<JobOutput, LazywtError> {
        let git = self.git.as_ref();
        let cancel = &self.cancel;
        let path = self.new_worktree_path(&req.branch)?;
        let base = req.base.clone().unwrap_or_else(|| self.main_branch());
        let source = req
            .source_path
            .as_deref()
            .filter(|_| req.include_changes)
            .map(Path::new);

        if let Some(src) = source {
            git.stash_push(src, cancel)?;
        }
        if let Err(e) = git.create_worktree(&path, &req.branch, Some(&base), true, cancel) {
            if let Some(src) = source
                && let Err(pop) = git.stash_pop(src, cancel)
            {
                warn!(error = %pop, "failed to restore stashed changes");
            }
            return Err(e);
        }
        if source.is_some() {
            git.stash_pop(&path, cancel)?;
        }
        info!(branch = %req.branch, path = %path.display(), "worktree created");
        Ok(JobOutput::Created(path.to_string_lossy().to_string()))
    }
}

fn join_output(first: &str, second: &str) -> String {
    [first.trim(), second.trim()]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use tokio::sync::mpsc;

    use super::*;
    use crate::core::git::Git;
    use crate::core::git::testing::RecordingRunner;
    use crate::core::models::PrInfo;
    use crate::core::trust::TrustMode;

    fn executor(
        runner: Arc<RecordingRunner>,
        cfg: Config,
        dir: &Path,
    ) -> (Executor, mpsc::UnboundedReceiver<Msg>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let git = Git::with_runner(dir.to_path_buf(), runner.clone());
        let parts = ExecutorParts {
            cfg,
            worktree_root: dir.join("worktrees"),
            repo_key: "acme/tool".to_owned(),
            main_path: dir.to_path_buf(),
            host: ForgeHost::GitHub,
            runner,
            git: Arc::new(git),
            caches: SharedCaches::new(),
            store: PersistenceStore::new(&dir.join("worktrees"), "acme/tool"),
            trust: TrustStore::load(dir.join("trusted.json")),
        };
        (Executor::new(parts, tx, CancelToken::new()), rx)
    }

    fn pending(trust_path: Option<PathBuf>, dir: &Path) -> PendingCommands {
        PendingCommands {
            label: "Init commands".to_owned(),
            commands: vec!["make setup".to_owned()],
            cwd: dir.to_path_buf(),
            env: BTreeMap::new(),
            trust_path,
            after: None,
        }
    }

    #[tokio::test]
    async fn sync_pulls_then_pushes() {
        let td = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::default());
        runner.reply("git pull", "Already up to date.\n");
        let (exec, mut rx) = executor(runner.clone(), Config::default(), td.path());
        exec.execute(Cmd::Git(GitJob::Sync {
            path: "/w/a".to_owned(),
            remote: "origin".to_owned(),
            branch: "a".to_owned(),
            set_upstream: false,
        }));
        let Some(Msg::JobDone { result, .. }) = rx.recv().await else {
            panic!("expected JobDone");
        };
        assert!(matches!(result, Ok(JobOutput::Text(t)) if t == "Already up to date."));
        let argv = runner.argv();
        assert_eq!(argv[0], "git pull --rebase origin a");
        assert_eq!(argv[1], "git push origin HEAD:a");
    }

    #[tokio::test]
    async fn sync_without_upstream_sets_it_on_push() {
        let td = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::default());
        let (exec, mut rx) = executor(runner.clone(), Config::default(), td.path());
        exec.execute(Cmd::Git(GitJob::Sync {
            path: "/w/feature".to_owned(),
            remote: "origin".to_owned(),
            branch: "feature".to_owned(),
            set_upstream: true,
        }));
        assert!(matches!(rx.recv().await, Some(Msg::JobDone { result: Ok(_), .. })));
        assert_eq!(
            runner.argv(),
            vec![
                "git pull --rebase origin feature",
                "git push -u origin HEAD:feature"
            ]
        );
    }

    #[tokio::test]
    async fn untrusted_repo_file_prompts() {
        let td = tempfile::tempdir().unwrap();
        let file = td.path().join(".wt.yaml");
        std::fs::write(&file, "init_commands: [make]\n").unwrap();
        let runner = Arc::new(RecordingRunner::default());
        let (exec, mut rx) = executor(runner.clone(), Config::default(), td.path());
        exec.execute(Cmd::RunCommands {
            pending: pending(Some(file), td.path()),
            force: false,
        });
        assert!(matches!(rx.recv().await, Some(Msg::TrustPrompt(_))));
        assert!(runner.argv().is_empty());
    }

    #[tokio::test]
    async fn never_mode_skips_repo_commands() {
        let td = tempfile::tempdir().unwrap();
        let file = td.path().join(".wt.yaml");
        std::fs::write(&file, "init_commands: [make]\n").unwrap();
        let cfg = Config {
            trust_mode: TrustMode::Never,
            ..Config::default()
        };
        let runner = Arc::new(RecordingRunner::default());
        let (exec, mut rx) = executor(runner, cfg, td.path());
        exec.execute(Cmd::RunCommands {
            pending: pending(Some(file), td.path()),
            force: false,
        });
        assert!(matches!(rx.recv().await, Some(Msg::CommandsSkipped(l)) if l == "Init commands"));
    }

    #[tokio::test]
    async fn trusted_commands_run_in_bash() {
        let td = tempfile::tempdir().unwrap();
        let file = td.path().join(".wt.yaml");
        std::fs::write(&file, "init_commands: [make]\n").unwrap();
        let runner = Arc::new(RecordingRunner::default());
        let (exec, mut rx) = executor(runner.clone(), Config::default(), td.path());
        exec.execute(Cmd::TrustAndRun(pending(Some(file.clone()), td.path())));
        assert!(matches!(
            rx.recv().await,
            Some(Msg::CommandsDone { result: Ok(()), .. })
        ));
        assert_eq!(runner.argv(), vec!["bash -lc make setup".to_owned()]);
        let store = TrustStore::load(td.path().join("trusted.json"));
        assert_eq!(store.check(&file), crate::core::trust::TrustStatus::Trusted);
    }

    #[tokio::test]
    async fn pr_branch_already_local_is_attached() {
        let td = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::default());
        runner.reply("git for-each-ref", "main\nfeat\n");
        let (exec, mut rx) = executor(runner.clone(), Config::default(), td.path());
        let pr: PrInfo = serde_json::from_value(serde_json::json!({
            "number": 7,
            "state": "OPEN",
            "title": "Feat",
            "url": "https://github.com/acme/tool/pull/7",
            "branch": "feat",
        }))
        .unwrap();
        exec.execute(Cmd::Git(GitJob::CreateFromPr {
            pr: Box::new(pr),
            branch: "feat".to_owned(),
        }));
        let Some(Msg::JobDone { result, .. }) = rx.recv().await else {
            panic!("expected JobDone");
        };
        assert!(matches!(result, Ok(JobOutput::Created(_))));
        let argv = runner.argv();
        assert!(argv.iter().any(|a| a.starts_with("git worktree add ") && a.ends_with(" feat")));
        assert!(argv.iter().all(|a| !a.contains("pull/7/head")));
        assert!(argv.iter().any(|a| a == "git checkout feat"));
    }

    #[tokio::test]
    async fn create_refuses_existing_path() {
        let td = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(td.path().join("worktrees/acme/tool/feat")).unwrap();
        let runner = Arc::new(RecordingRunner::default());
        let (exec, mut rx) = executor(runner, Config::default(), td.path());
        exec.execute(Cmd::Git(GitJob::Create(CreateRequest {
            branch: "feat".to_owned(),
            base: None,
            source_path: None,
            include_changes: false,
            note: None,
        })));
        let Some(Msg::JobDone { result: Err(e), .. }) = rx.recv().await else {
            panic!("expected a failed job");
        };
        assert!(e.message.contains("already exists"));
        assert!(!e.cancelled);
    }

    #[test]
    fn terminal_commands_are_handed_back() {
        let td = tempfile::tempdir().unwrap();
        let rt = tokio::runtime::Runtime::new().unwrap();
        let _guard = rt.enter();
        let (exec, _rx) = executor(Arc::new(RecordingRunner::default()), Config::default(), td.path());
        assert!(matches!(
            exec.execute(Cmd::Copy("x".to_owned())),
            Some(Cmd::Copy(_))
        ));
        assert!(exec.execute(Cmd::SaveLastSelected("/w/a".to_owned())).is_none());
    }
}
