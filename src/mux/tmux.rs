#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::config::{OnExists, SessionCommand};
use crate::core::git::CommandSpec;
use crate::core::naming::{sanitize_tmux_session_name, shell_quote};
use crate::mux::{Multiplexer, ResolvedWindow, SESSION_FILE_ENV};

#[derive(Debug, Clone, Copy, Default)]
pub struct Tmux;

impl Multiplexer for Tmux {
    fn name(&self) -> &'static str {
        "tmux"
    }

    fn sanitize(&self, name: &str) -> String {
        sanitize_tmux_session_name(name)
    }

    fn build_script(
        &self,
        session: &str,
        cfg: &SessionCommand,
        windows: &[ResolvedWindow],
        env: &BTreeMap<String, String>,
    ) -> anyhow::Result<String> {
        Ok(build_script(session, cfg, windows, env))
    }

    fn attach_command(&self, session: &str, inside: bool) -> CommandSpec {
        let verb = if inside {
            "switch-client"
        } else {
            "attach-session"
        };
        CommandSpec::new("tmux", &[verb, "-t", session])
    }

    fn info_message(&self, session: &str, inside: bool) -> String {
        info_message(session, inside)
    }

    fn is_inside(&self) -> bool {
        std::env::var_os("TMUX").is_some_and(|v| !v.is_empty())
    }
}

#[must_use]
pub fn info_message(session: &str, inside: bool) -> String {
    let quoted = shell_quote(session);
    if inside {
        format!("tmux session ready.\n\nSwitch with:\n\n  tmux switch-client -t {quoted}")
    } else {
        format!("tmux session ready.\n\nAttach with:\n\n  tmux attach-session -t {quoted}")
    }
}

fn env_flags(env: &BTreeMap<String, String>) -> String {
    env.iter().fold(String::new(), |mut acc, (k, v)| {
        let _ = write!(acc, " -e {}", shell_quote(&format!("{k}={v}")));
        acc
    })
}

/// Creates (or reuses) the session with one tmux window per entry.
#[must_use]
pub fn build_script(
    session: &str,
    cfg: &SessionCommand,
    windows: &[ResolvedWindow],
    env: &BTreeMap<String, String>,
) -> String {
    let mut s = String::from("set -e\n");
    let _ = writeln!(s, "session={}", shell_quote(session));
    match cfg.on_exists {
        OnExists::Kill => s.push_str(
            "if tmux has-session -t \"=$session\" 2>/dev/null; then\n  tmux kill-session -t \"=$session\"\nfi\n",
        ),
        OnExists::New => s.push_str(
            "base=\"$session\"\nn=1\nwhile tmux has-session -t \"=$session\" 2>/dev/null; do\n  session=\"${base}-${n}\"\n  n=$((n + 1))\ndone\n",
        ),
        OnExists::Switch | OnExists::Attach => {}
    }

    let flags = env_flags(env);
    s.push_str("if ! tmux has-session -t \"=$session\" 2>/dev/null; then\n");
    for (i, w) in windows.iter().enumerate() {
        let head = if i == 0 {
            "tmux new-session -d -P -F '#{window_id}' -s \"$session\"".to_owned()
        } else {
            "tmux new-window -P -F '#{window_id}' -t \"$session\"".to_owned()
        };
        let _ = writeln!(
            s,
            "  win=$({head} -n {} -c {}{flags})",
            shell_quote(&w.name),
            shell_quote(&w.cwd)
        );
        if i == 0 {
            s.push_str("  first=\"$win\"\n");
        }
        if !w.command.is_empty() {
            let _ = writeln!(
                s,
                "  tmux send-keys -t \"$win\" {} C-m",
                shell_quote(&w.command)
            );
        }
    }
    if !windows.is_empty() {
        s.push_str("  tmux select-window -t \"$first\"\n");
    }
    s.push_str("fi\n");
    let _ = writeln!(
        s,
        "if [ -n \"${{{SESSION_FILE_ENV}:-}}\" ]; then printf '%s' \"$session\" > \"${SESSION_FILE_ENV}\"; fi"
    );
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn windows() -> Vec<ResolvedWindow> {
        vec![
            ResolvedWindow {
                name: "editor".to_owned(),
                cwd: "/w/feat".to_owned(),
                command: "nvim .".to_owned(),
            },
            ResolvedWindow {
                name: "shell".to_owned(),
                cwd: "/w/feat".to_owned(),
                command: String::new(),
            },
        ]
    }

    #[test]
    fn script_creates_windows_and_records_session() {
        let env = BTreeMap::from([("WORKTREE_NAME".to_owned(), "feat".to_owned())]);
        let cfg = SessionCommand {
            attach: false,
            ..SessionCommand::default()
        };
        let script = build_script("wt-feat", &cfg, &windows(), &env);
        assert!(script.contains("session=wt-feat\n"));
        assert!(script.contains("new-session -d -P -F '#{window_id}' -s \"$session\" -n editor -c /w/feat -e WORKTREE_NAME=feat"));
        assert!(script.contains("send-keys -t \"$win\" 'nvim .' C-m"));
        assert_eq!(script.matches("send-keys").count(), 1);
        assert!(script.contains("new-window"));
        assert!(script.contains("> \"$LW_SESSION_FILE\""));
        assert!(!script.contains("attach-session"));
    }

    #[test]
    fn on_exists_new_picks_a_free_name() {
        let cfg = SessionCommand {
            on_exists: OnExists::New,
            ..SessionCommand::default()
        };
        let script = build_script("wt-a", &cfg, &windows(), &BTreeMap::new());
        assert!(script.contains("session=\"${base}-${n}\""));
        assert!(!script.contains("switch-client"));
    }

    #[test]
    fn attach_switches_when_inside() {
        assert_eq!(
            Tmux.attach_command("wt-a", true).display(),
            "tmux switch-client -t wt-a"
        );
        assert_eq!(
            Tmux.attach_command("wt-a", false).display(),
            "tmux attach-session -t wt-a"
        );
    }

    #[test]
    fn info_message_depends_on_client() {
        assert!(info_message("wt-a", false).ends_with("tmux attach-session -t wt-a"));
        assert!(info_message("wt a", true).ends_with("tmux switch-client -t 'wt a'"));
    }
}
