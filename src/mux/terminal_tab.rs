#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use tracing::{debug, warn};

use crate::core::git::{CancelToken, CommandRunner, CommandSpec};
use crate::core::naming::shell_quote;
use crate::error::LazywtError;

const ITERM_SCRIPT: &str = r#"on run argv
set cmd to item 1 of argv
set tabTitle to item 2 of argv
tell application "iTerm"
	activate
	if (count of windows) = 0 then
		set targetWindow to (create window with default profile)
	else
		set targetWindow to current window
		tell targetWindow to create tab with default profile
	end if
	tell current session of targetWindow
		write text cmd
		if tabTitle is not "" then
			set name to tabTitle
		end if
	end tell
end tell
end run"#;

/// Host terminal with a tab-control protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Kitty,
    WezTerm,
    ITerm,
}

impl Terminal {
    /// First terminal whose marker variables are set.
    pub fn detect(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let set = |k: &str| lookup(k).is_some_and(|v| !v.is_empty());
        if set("KITTY_WINDOW_ID") {
            Some(Self::Kitty)
        } else if set("WEZTERM_PANE") || set("WEZTERM_UNIX_SOCKET") {
            Some(Self::WezTerm)
        } else if set("ITERM_SESSION_ID") || lookup("TERM_PROGRAM").as_deref() == Some("iTerm.app")
        {
            Some(Self::ITerm)
        } else {
            None
        }
    }

    #[must_use]
    pub fn detect_from_env() -> Option<Self> {
        Self::detect(|k| std::env::var(k).ok())
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Kitty => "Kitty",
            Self::WezTerm => "WezTerm",
            Self::ITerm => "iTerm",
        }
    }

    #[must_use]
    pub fn launch_spec(
        self,
        cmd: &str,
        cwd: &Path,
        title: &str,
        env: &BTreeMap<String, String>,
    ) -> CommandSpec {
        let cwd = cwd.to_string_lossy().to_string();
        let args: Vec<String> = match self {
            Self::Kitty => {
                let mut args = vec![
                    "@".to_owned(),
                    "launch".to_owned(),
                    "--type=tab".to_owned(),
                    format!("--cwd={cwd}"),
                    format!("--tab-title={title}"),
                ];
                args.extend(env.iter().map(|(k, v)| format!("--env={k}={v}")));
                args.extend(["--", "bash", "-lc", cmd].map(str::to_owned));
                args
            }
            Self::WezTerm => {
                let mut args = ["cli", "spawn", "--cwd", cwd.as_str(), "--"].map(str::to_owned).to_vec();
                if !env.is_empty() {
                    args.push("env".to_owned());
                    args.extend(env.iter().map(|(k, v)| format!("{k}={v}")));
                }
                args.extend(["bash", "-lc", cmd].map(str::to_owned));
                args
            }
            Self::ITerm => vec![
                "-e".to_owned(),
                ITERM_SCRIPT.to_owned(),
                "--".to_owned(),
                shell_command(cmd, &cwd, env),
                title.to_owned(),
            ],
        };
        CommandSpec::with_args(self.program(), args)
    }

    fn program(self) -> &'static str {
        match self {
            Self::Kitty => "kitty",
            Self::WezTerm => "wezterm",
            Self::ITerm => "osascript",
        }
    }
}

/// `bash -lc 'cd <cwd> && K=V ... <cmd>'` for terminals that take one string.
#[must_use]
pub fn shell_command(cmd: &str, cwd: &str, env: &BTreeMap<String, String>) -> String {
    let mut command = String::new();
    for (k, v) in env {
        let _ = write!(command, "{k}={} ", shell_quote(v));
    }
    command.push_str(cmd);
    let script = format!("cd {} && {command}", shell_quote(cwd));
    format!("bash -lc {}", shell_quote(&script))
}

/// Opens the tab; returns the tab title.
pub fn launch(
    runner: &dyn CommandRunner,
    terminal: Terminal,
    cmd: &str,
    cwd: &Path,
    title: &str,
    env: &BTreeMap<String, String>,
    cancel: &CancelToken,
) -> Result<String, LazywtError> {
    let spec = terminal.launch_spec(cmd, cwd, title, env);
    debug!(terminal = terminal.name(), title, "launching terminal tab");
    let out = runner.run(&spec, cancel)?.into_stdout(&spec)?;

    if terminal == Terminal::WezTerm
        && !title.is_empty()
        && let Some(pane_id) = out.split_whitespace().next()
    {
        let set_title = CommandSpec::new("wezterm", &["cli", "set-tab-title", "--pane-id", pane_id, title]);
        // The tab already exists; a failed title update is not an error.
        if let Err(e) = runner
            .run(&set_title, cancel)
            .and_then(|o| o.into_stdout(&set_title))
        {
            warn!(error = %e, "failed to set wezterm tab title");
        }
    }
    Ok(title.to_owned())
}

#[must_use]
pub fn info_message(terminal: Terminal, title: &str) -> String {
    format!("Command launched in new {} tab: {title}", terminal.name())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::core::git::testing::RecordingRunner;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn detection_order() {
        assert_eq!(
            Terminal::detect(lookup(&[("KITTY_WINDOW_ID", "1"), ("WEZTERM_PANE", "2")])),
            Some(Terminal::Kitty)
        );
        assert_eq!(
            Terminal::detect(lookup(&[("WEZTERM_UNIX_SOCKET", "/s")])),
            Some(Terminal::WezTerm)
        );
        assert_eq!(
            Terminal::detect(lookup(&[("TERM_PROGRAM", "iTerm.app")])),
            Some(Terminal::ITerm)
        );
        assert_eq!(Terminal::detect(lookup(&[("KITTY_WINDOW_ID", "")])), None);
    }

    #[test]
    fn kitty_passes_env_flags() {
        let env = BTreeMap::from([("WORKTREE_NAME".to_owned(), "feat".to_owned())]);
        let spec = Terminal::Kitty.launch_spec("make", Path::new("/w/feat"), "feat", &env);
        assert_eq!(
            spec.display(),
            "kitty @ launch --type=tab --cwd=/w/feat --tab-title=feat --env=WORKTREE_NAME=feat -- bash -lc make"
        );
    }

    #[test]
    fn iterm_command_changes_directory() {
        let cmd = shell_command("make", "/w/my feat", &BTreeMap::new());
        assert_eq!(cmd, "bash -lc 'cd '\\''/w/my feat'\\'' && make'");
    }

    #[test]
    fn wezterm_sets_title_from_pane_id() {
        let runner = RecordingRunner::default();
        runner.reply("wezterm cli spawn", "42\n");
        let title = launch(
            &runner,
            Terminal::WezTerm,
            "make",
            Path::new("/w/a"),
            "a",
            &BTreeMap::new(),
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(title, "a");
        assert_eq!(
            runner.argv()[1],
            "wezterm cli set-tab-title --pane-id 42 a"
        );
    }
}
