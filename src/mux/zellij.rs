#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::Context as _;

use crate::config::SessionCommand;
use crate::core::git::CommandSpec;
use crate::core::naming::{sanitize_zellij_session_name, shell_quote};
use crate::mux::{Multiplexer, ResolvedWindow, SESSION_FILE_ENV};

#[derive(Debug, Clone, Copy, Default)]
pub struct Zellij;

impl Multiplexer for Zellij {
    fn name(&self) -> &'static str {
        "zellij"
    }

    fn sanitize(&self, name: &str) -> String {
        sanitize_zellij_session_name(name)
    }

    fn build_script(
        &self,
        session: &str,
        _cfg: &SessionCommand,
        windows: &[ResolvedWindow],
        _env: &BTreeMap<String, String>,
    ) -> anyhow::Result<String> {
        let layouts = write_layouts(windows)?;
        let mut script = build_script(session, &layouts);
        for path in &layouts {
            let _ = writeln!(script, "rm -f {}", shell_quote(&path.to_string_lossy()));
        }
        Ok(script)
    }

    fn attach_command(&self, session: &str, _inside: bool) -> CommandSpec {
        CommandSpec::new("zellij", &["attach", "--create", session])
    }

    fn info_message(&self, session: &str, _inside: bool) -> String {
        format!(
            "zellij session ready.\n\nAttach with:\n\n  zellij attach {}",
            shell_quote(session)
        )
    }

    fn is_inside(&self) -> bool {
        ["ZELLIJ", "ZELLIJ_SESSION_NAME"]
            .iter()
            .any(|k| std::env::var_os(k).is_some_and(|v| !v.is_empty()))
    }
}

/// Creates the session in the background and opens one tab per layout.
#[must_use]
pub fn build_script(session: &str, layouts: &[PathBuf]) -> String {
    let mut s = String::from("set -e\n");
    let _ = writeln!(s, "session={}", shell_quote(session));
    s.push_str(
        "if ! zellij list-sessions --short --no-formatting 2>/dev/null | grep -Fxq \"$session\"; then\n  zellij attach --create-background \"$session\"\nfi\n",
    );
    for path in layouts {
        let _ = writeln!(
            s,
            "ZELLIJ_SESSION_NAME=\"$session\" zellij action new-tab --layout {}",
            shell_quote(&path.to_string_lossy())
        );
    }
    let _ = writeln!(
        s,
        "if [ -n \"${{{SESSION_FILE_ENV}:-}}\" ]; then printf '%s' \"$session\" > \"${SESSION_FILE_ENV}\"; fi"
    );
    s
}

fn kdl_string(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// KDL layout for a single tab.
#[must_use]
pub fn layout_kdl(window: &ResolvedWindow) -> String {
    let mut s = String::from("layout {\n");
    let _ = writeln!(
        s,
        "    tab name={} cwd={} {{",
        kdl_string(&window.name),
        kdl_string(&window.cwd)
    );
    if window.command.is_empty() {
        s.push_str("        pane\n");
    } else {
        s.push_str("        pane command=\"bash\" {\n");
        let _ = writeln!(s, "            args \"-lc\" {}", kdl_string(&window.command));
        s.push_str("        }\n");
    }
    s.push_str("    }\n}\n");
    s
}

/// Writes one layout file per window into the temp dir.
pub fn write_layouts(windows: &[ResolvedWindow]) -> anyhow::Result<Vec<PathBuf>> {
    windows
        .iter()
        .map(|w| {
            let path = std::env::temp_dir().join(format!(
                "lazyworktree-zellij-{}.kdl",
                uuid::Uuid::new_v4()
            ));
            std::fs::write(&path, layout_kdl(w))
                .with_context(|| format!("failed to write {}", path.display()))?;
            Ok(path)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_escapes_quotes() {
        let kdl = layout_kdl(&ResolvedWindow {
            name: "run".to_owned(),
            cwd: "/w/a".to_owned(),
            command: "echo \"hi\"".to_owned(),
        });
        assert!(kdl.contains("tab name=\"run\" cwd=\"/w/a\""));
        assert!(kdl.contains(r#"args "-lc" "echo \"hi\"""#));
    }

    #[test]
    fn script_opens_tab_per_layout() {
        let script = build_script("wt-a", &[PathBuf::from("/tmp/one.kdl")]);
        assert!(script.contains("zellij attach --create-background \"$session\""));
        assert!(script.contains("new-tab --layout /tmp/one.kdl"));
    }

    #[test]
    fn attach_creates_missing_session() {
        assert_eq!(
            Zellij.attach_command("wt-a", false).display(),
            "zellij attach --create wt-a"
        );
    }
}
