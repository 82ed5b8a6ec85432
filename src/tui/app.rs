#![forbid(unsafe_code)]

//! Startup wiring and the event loop.

use std::collections::VecDeque;
use std::io::{self, BufRead as _, Write as _};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Duration;

use crossterm::clipboard::CopyToClipboard;
use crossterm::event::{self, Event, KeyEventKind};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::{Config, load_repo_config};
use crate::core::cache::SharedCaches;
use crate::core::git::{CancelToken, CommandRunner, CommandSpec, Git, GitPort, SystemRunner};
use crate::core::naming::repo_key;
use crate::core::notes::NotesStore;
use crate::core::persistence::PersistenceStore;
use crate::core::trust::{TrustStore, default_db_path};
use crate::mux::tmux::Tmux;
use crate::mux::zellij::Zellij;
use crate::mux::{
    Multiplexer, SESSION_FILE_ENV, prepare_session, read_session_file, session_file_path,
};
use crate::tui::TerminalGuard;
use crate::tui::executor::{Executor, ExecutorParts};
use crate::tui::model::{Cmd, Foreground, Model, ModelInit, Msg, SessionKind};
use crate::tui::watcher::{
    CI_REFRESH_INTERVAL, git_dir_of, refresh_period, spawn_git_watcher, spawn_ticker,
};

const POLL: Duration = Duration::from_millis(50);
const SPINNER_INTERVAL: Duration = Duration::from_millis(120);

/// Reads everything the first frame needs from the repository and disk.
fn prepare(cfg: Config, cancel: &CancelToken) -> anyhow::Result<(ModelInit, ExecutorParts)> {
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
    let git = Git::from_cwd()?;
    let main_path = git
        .list_worktrees(cancel)?
        .into_iter()
        .find(|w| w.is_main)
        .map_or_else(|| git.repo_root().to_path_buf(), |w| PathBuf::from(w.path));
    let remote = git.remote_url(cancel).ok();
    let key = repo_key(remote.as_deref(), &main_path);
    let host = if cfg.disable_pr {
        crate::core::models::ForgeHost::None
    } else {
        git.forge_host(cancel)
    };
    let worktree_root = cfg.worktree_dir_path()?;
    let store = PersistenceStore::new(&worktree_root, &key);

    let mut notes = NotesStore::new(&key, &worktree_root, cfg.notes_path()?);
    notes.load();
    let repo_config = load_repo_config(&main_path).unwrap_or_else(|e| {
        warn!(error = %e, "ignoring unreadable repository config");
        None
    });
    info!(repo = %key, main = %main_path.display(), ?host, "repository resolved");

    let caches = SharedCaches::new();
    let main_str = main_path.to_string_lossy().to_string();
    let init = ModelInit {
        cfg: cfg.clone(),
        repo_key: key.clone(),
        main_path: main_str,
        host,
        access: store.load_access(),
        cached: store.load_cache(),
        last_selected: store.load_last_selected(),
        palette_history: store.load_palette_history(),
        command_history: store.load_command_history(),
        notes,
        repo_config,
        caches: caches.clone(),
    };
    let parts = ExecutorParts {
        cfg,
        worktree_root,
        repo_key: key,
        main_path,
        host,
        runner,
        git: Arc::new(git),
        caches,
        store,
        trust: TrustStore::load(default_db_path()),
    };
    Ok((init, parts))
}

/// Runs the TUI; returns the worktree chosen with Enter, if any.
pub async fn run(cfg: Config) -> anyhow::Result<Option<String>> {
    let cancel = CancelToken::new();
    let startup_cancel = cancel.clone();
    let (init, parts) =
        tokio::task::spawn_blocking(move || prepare(cfg, &startup_cancel)).await??;
    let git_dir = git_dir_of(&parts.main_path);
    let runner = Arc::clone(&parts.runner);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let exec = Executor::new(parts, tx.clone(), cancel.clone());
    let mut model = Model::new(init);

    if let Some(dir) = git_dir
        && let Err(e) = spawn_git_watcher(dir, tx.clone(), cancel.clone())
    {
        warn!(error = %e, "git watcher unavailable");
    }
    spawn_ticker(SPINNER_INTERVAL, tx.clone(), cancel.clone(), || Msg::SpinnerTick);
    if model.cfg.auto_refresh {
        let period = refresh_period(model.cfg.refresh_interval);
        spawn_ticker(period, tx.clone(), cancel.clone(), || Msg::AutoRefreshTick);
    }
    if model.cfg.ci_auto_refresh {
        spawn_ticker(CI_REFRESH_INTERVAL, tx.clone(), cancel.clone(), || Msg::CiRefreshTick);
    }

    let mut guard = TerminalGuard::enter()?;
    let fg = ForegroundCtx {
        runner,
        session_prefix: model.cfg.session_prefix.clone(),
    };
    let first = model.init();
    dispatch(&mut model, &exec, &fg, &mut guard, first)?;

    loop {
        guard.draw(&mut model)?;
        if model.should_quit {
            break;
        }

        if event::poll(POLL)? {
            let msg = match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => Some(Msg::Key(key)),
                Event::Mouse(ev) => Some(Msg::Mouse(ev)),
                Event::Resize(w, h) => Some(Msg::Resize(w, h)),
                _ => None,
            };
            if let Some(msg) = msg {
                let cmds = model.update(msg);
                dispatch(&mut model, &exec, &fg, &mut guard, cmds)?;
            }
        }
        while let Ok(msg) = rx.try_recv() {
            let cmds = model.update(msg);
            dispatch(&mut model, &exec, &fg, &mut guard, cmds)?;
        }
    }

    exec.shutdown();
    info!("exiting");
    Ok(model.selected_on_exit.take())
}

/// Hands commands to the executor and runs the terminal-bound ones here.
fn dispatch(
    model: &mut Model,
    exec: &Executor,
    fg: &ForegroundCtx,
    guard: &mut TerminalGuard,
    cmds: Vec<Cmd>,
) -> anyhow::Result<()> {
    let mut queue: VecDeque<Cmd> = cmds.into();
    while let Some(cmd) = queue.pop_front() {
        match exec.execute(cmd) {
            None => {}
            Some(Cmd::Foreground(job)) => {
                let result = fg.run(guard, job)?;
                queue.extend(model.update(Msg::ForegroundDone(result)));
            }
            Some(Cmd::Copy(text)) => {
                if let Err(e) = crossterm::execute!(
                    io::stdout(),
                    CopyToClipboard::to_clipboard_from(text.as_bytes())
                ) {
                    warn!(error = %e, "clipboard write failed");
                    queue.extend(model.update(Msg::Error(format!("Copy failed: {e}"))));
                }
            }
            Some(other) => debug!(?other, "command not handled"),
        }
    }
    Ok(())
}

/// Runs programs that need the real terminal.
#[derive(Debug)]
struct ForegroundCtx {
    runner: Arc<dyn CommandRunner>,
    session_prefix: String,
}

impl ForegroundCtx {
    fn run(
        &self,
        guard: &mut TerminalGuard,
        job: Foreground,
    ) -> anyhow::Result<Result<Option<String>, String>> {
        match job {
            Foreground::Shell {
                cwd,
                command,
                env,
                pause,
            } => {
                let mut cmd = Command::new("bash");
                cmd.arg("-c").arg(&command).current_dir(&cwd).envs(&env);
                guard.suspended(|| {
                    let status = run_inherited(&mut cmd);
                    if pause {
                        wait_for_enter();
                    }
                    status
                })
            }
            Foreground::Session {
                kind,
                session,
                path,
                env,
            } => {
                let mux: Box<dyn Multiplexer> = match kind {
                    SessionKind::Tmux => Box::new(Tmux),
                    SessionKind::Zellij => Box::new(Zellij),
                };
                let (name, script) =
                    match prepare_session(mux.as_ref(), &self.session_prefix, &session, &path, &env) {
                        Ok(prepared) => prepared,
                        Err(e) => return Ok(Err(format!("{} setup failed: {e}", mux.name()))),
                    };
                let file = session_file_path();
                let mut script_env = env;
                script_env.insert(
                    SESSION_FILE_ENV.to_owned(),
                    file.to_string_lossy().to_string(),
                );
                debug!(mux = mux.name(), session = %name, attach = session.attach, "starting session");

                let spec = CommandSpec::new("bash", &["-lc", &script])
                    .in_dir(Path::new(&path))
                    .with_env(&script_env);
                let built = self
                    .runner
                    .run(&spec, &CancelToken::new())
                    .and_then(|out| out.into_stdout(&spec));
                let created = read_session_file(&file, &name);
                let _ = std::fs::remove_file(&file);
                if let Err(e) = built {
                    return Ok(Err(format!("{} session failed: {e}", mux.name())));
                }

                let inside = mux.is_inside();
                let result = if session.attach {
                    let mut cmd = std_command(&mux.attach_command(&created, inside));
                    guard.suspended(|| run_inherited(&mut cmd))?
                } else {
                    Ok(Some(mux.info_message(&created, inside)))
                };
                Ok(result)
            }
        }
    }
}

fn std_command(spec: &CommandSpec) -> Command {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args).envs(&spec.env);
    if let Some(dir) = &spec.cwd {
        cmd.current_dir(dir);
    }
    cmd
}

fn run_inherited(cmd: &mut Command) -> Result<Option<String>, String> {
    let status = cmd
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .map_err(|e| format!("failed to start command: {e}"))?;
    if status.success() {
        Ok(None)
    } else {
        Err(format!(
            "Command failed (exit code: {})",
            status.code().unwrap_or(1)
        ))
    }
}

fn wait_for_enter() {
    print!("\nPress Enter to return to lazywt...");
    let _ = io::stdout().flush();
    let mut line = String::new();
    let _ = io::stdin().lock().read_line(&mut line);
}
