#![forbid(unsafe_code)]

pub mod terminal_tab;
pub mod tmux;
pub mod zellij;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::config::{SessionCommand, SessionWindow};
use crate::core::git::CommandSpec;
use crate::core::naming::shell_quote;

static VAR_REF: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*)\}?").expect("variable pattern")
});

/// A session window with its variables expanded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedWindow {
    pub name: String,
    pub cwd: String,
    pub command: String,
}

/// Session builder shared by tmux and zellij.
pub trait Multiplexer {
    fn name(&self) -> &'static str;

    fn sanitize(&self, name: &str) -> String;

    /// Shell script that creates the session and writes its final name to
    /// `$LW_SESSION_FILE` when that variable is set. It never attaches.
    fn build_script(
        &self,
        session: &str,
        cfg: &SessionCommand,
        windows: &[ResolvedWindow],
        env: &BTreeMap<String, String>,
    ) -> anyhow::Result<String>;

    /// Attaches to, or switches the current client to, `session`.
    fn attach_command(&self, session: &str, inside: bool) -> CommandSpec;

    fn info_message(&self, session: &str, inside: bool) -> String;

    /// True when this process already runs inside the multiplexer.
    fn is_inside(&self) -> bool;
}

pub const SESSION_FILE_ENV: &str = "LW_SESSION_FILE";

/// Expands `$VAR`/`${VAR}` from `env` first, then the process environment.
#[must_use]
pub fn expand_with_env(input: &str, env: &BTreeMap<String, String>) -> String {
    VAR_REF
        .replace_all(input, |caps: &regex::Captures<'_>| {
            env.get(&caps[1])
                .cloned()
                .or_else(|| std::env::var(&caps[1]).ok())
                .unwrap_or_default()
        })
        .to_string()
}

/// Expands names, commands and cwds; an empty list becomes one shell window.
#[must_use]
pub fn resolve_windows(
    windows: &[SessionWindow],
    env: &BTreeMap<String, String>,
    default_cwd: &str,
) -> Vec<ResolvedWindow> {
    if windows.is_empty() {
        return vec![ResolvedWindow {
            name: "shell".to_owned(),
            cwd: default_cwd.to_owned(),
            command: String::new(),
        }];
    }
    windows
        .iter()
        .enumerate()
        .map(|(i, w)| {
            let name = expand_with_env(w.name.trim(), env);
            let cwd = expand_with_env(w.cwd.trim(), env);
            let cwd = if cwd.is_empty() {
                default_cwd.to_owned()
            } else if Path::new(&cwd).is_absolute() {
                cwd
            } else {
                Path::new(default_cwd).join(cwd).to_string_lossy().to_string()
            };
            ResolvedWindow {
                name: if name.is_empty() {
                    format!("window-{}", i + 1)
                } else {
                    name
                },
                cwd,
                command: expand_with_env(w.command.trim(), env),
            }
        })
        .collect()
}

/// Configured session name or `<prefix><basename>`, before sanitizing.
#[must_use]
pub fn session_name(
    configured: &str,
    prefix: &str,
    worktree_path: &str,
    env: &BTreeMap<String, String>,
) -> String {
    let expanded = expand_with_env(configured, env);
    let expanded = expanded.trim();
    if !expanded.is_empty() {
        return expanded.to_owned();
    }
    let base = Path::new(worktree_path)
        .file_name()
        .map_or_else(|| worktree_path.to_owned(), |n| n.to_string_lossy().to_string());
    format!("{prefix}{base}")
}

/// Sanitized session name and the script that creates it.
pub fn prepare_session(
    mux: &dyn Multiplexer,
    prefix: &str,
    cfg: &SessionCommand,
    path: &str,
    env: &BTreeMap<String, String>,
) -> anyhow::Result<(String, String)> {
    let name = mux.sanitize(&session_name(&cfg.session_name, prefix, path, env));
    let windows = resolve_windows(&cfg.windows, env, path);
    let script = mux.build_script(&name, cfg, &windows, env)?;
    Ok((name, script))
}

/// Creation script followed by an attach, run from a fresh terminal tab as an
/// outside client. Attaches to `$session`, the name the script settled on.
#[must_use]
pub fn tab_script(mux: &dyn Multiplexer, name: &str, script: &str) -> String {
    let attach = mux.attach_command(name, false);
    let mut line = attach.program.clone();
    for arg in &attach.args {
        line.push(' ');
        if arg == name {
            line.push_str("\"$session\"");
        } else {
            line.push_str(&shell_quote(arg));
        }
    }
    format!("unset TMUX TMUX_PANE\n{script}{line}\n")
}

/// Session name written by the script, or `fallback` when unreadable or empty.
#[must_use]
pub fn read_session_file(path: &Path, fallback: &str) -> String {
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| fallback.to_owned())
}

/// Fresh path under the temp dir for the session-name handoff.
#[must_use]
pub fn session_file_path() -> PathBuf {
    std::env::temp_dir().join(format!("lazyworktree-session-{}", uuid::Uuid::new_v4()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("WORKTREE_NAME".to_owned(), "feat".to_owned()),
            ("WORKTREE_PATH".to_owned(), "/w/feat".to_owned()),
        ])
    }

    #[test]
    fn session_name_defaults_to_prefix_and_basename() {
        assert_eq!(session_name("", "wt-", "/w/feat", &env()), "wt-feat");
        assert_eq!(
            session_name("dev-$WORKTREE_NAME", "wt-", "/w/feat", &env()),
            "dev-feat"
        );
    }

    #[test]
    fn windows_resolve_cwd_and_names() {
        let windows = vec![
            SessionWindow {
                name: "editor".to_owned(),
                command: "nvim ${WORKTREE_PATH}".to_owned(),
                cwd: String::new(),
            },
            SessionWindow {
                name: String::new(),
                command: String::new(),
                cwd: "src".to_owned(),
            },
        ];
        let resolved = resolve_windows(&windows, &env(), "/w/feat");
        assert_eq!(resolved[0].command, "nvim /w/feat");
        assert_eq!(resolved[0].cwd, "/w/feat");
        assert_eq!(resolved[1].name, "window-2");
        assert_eq!(resolved[1].cwd, "/w/feat/src");
        assert_eq!(resolve_windows(&[], &env(), "/x")[0].name, "shell");
    }

    #[test]
    fn session_file_falls_back() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("s");
        assert_eq!(read_session_file(&path, "wt-a"), "wt-a");
        std::fs::write(&path, "wt-a-1\n").unwrap();
        assert_eq!(read_session_file(&path, "wt-a"), "wt-a-1");
    }

    #[test]
    fn tab_script_attaches_as_outside_client() {
        let script = tab_script(&tmux::Tmux, "wt-feat", "session=wt-feat\n");
        assert_eq!(
            script,
            "unset TMUX TMUX_PANE\nsession=wt-feat\ntmux attach-session -t \"$session\"\n"
        );
    }
}
