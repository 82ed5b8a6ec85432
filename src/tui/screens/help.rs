#![forbid(unsafe_code)]

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;

use super::{Outcome, ScreenKind, ScreenView, centered, popup_frame};
use crate::tui::render::Ctx;
use crate::tui::text_input::TextInput;

const BINDINGS: &[(&str, &[(&str, &str)])] = &[
    (
        "Navigation",
        &[
            ("1-5", "Focus pane, press again to zoom"),
            ("Tab / ] / [", "Cycle panes"),
            ("h / l", "Move left / right between panes"),
            ("j / k", "Move down / up"),
            ("Ctrl+j / Ctrl+k", "Next / previous file diff or commit"),
            ("Ctrl+d / Ctrl+u", "Half page down / up"),
            ("G", "Go to bottom"),
            ("Enter", "Select worktree and exit, open diff, view commit, open CI link"),
            ("=", "Toggle zoom"),
            ("L", "Toggle layout"),
        ],
    ),
    (
        "Worktrees",
        &[
            ("c", "Create worktree"),
            ("D", "Delete worktree"),
            ("m", "Rename worktree"),
            ("A", "Absorb into main"),
            ("X", "Prune merged worktrees"),
            ("d", "Show diff"),
            ("P", "Push to upstream"),
            ("S", "Sync (pull + push)"),
            ("R", "Fetch all remotes"),
            ("o", "Open pull request"),
            ("s", "Cycle sort mode"),
            ("C", "Cherry-pick commit to another worktree"),
            ("i", "Edit worktree note"),
            ("T", "Taskboard"),
            ("g", "Open lazygit"),
            ("!", "Run command in worktree"),
            ("y / Y", "Copy path / branch"),
            ("r", "Refresh"),
        ],
    ),
    (
        "Git Status",
        &[
            ("s", "Stage / unstage file or directory"),
            ("c", "Commit staged changes"),
            ("C", "Commit all changes"),
            ("D", "Discard or delete file"),
            ("e", "Edit file"),
            ("Enter", "Show file diff, toggle directory"),
        ],
    ),
    (
        "Info",
        &[
            ("n / p", "Next / previous CI check"),
            ("v", "Choose CI check"),
            ("Ctrl+v", "Show CI logs"),
        ],
    ),
    (
        "Filter & Search",
        &[
            ("f", "Filter focused pane"),
            ("/", "Search focused pane"),
            ("n / N", "Next / previous match"),
            ("Alt+n / Alt+p", "Step filter through all worktrees"),
            ("Esc", "Clear pane filter"),
        ],
    ),
    (
        "General",
        &[
            ("Ctrl+p / :", "Command palette"),
            ("?", "Help"),
            ("q / Ctrl+c", "Quit"),
        ],
    ),
];

/// Scrollable key reference; `/` narrows it.
#[derive(Debug)]
pub struct HelpScreen {
    custom: Vec<(String, String)>,
    filter: TextInput,
    filtering: bool,
    scroll: usize,
    height: usize,
}

impl HelpScreen {
    /// `custom` holds (key, description) pairs of user commands.
    #[must_use]
    pub fn new(custom: Vec<(String, String)>) -> Self {
        Self {
            custom,
            filter: TextInput::default(),
            filtering: false,
            scroll: 0,
            height: 1,
        }
    }

    /// Plain rows after filtering: section headers and `key  description`.
    #[must_use]
    pub fn rows(&self) -> Vec<(Option<String>, String)> {
        let query = self.filter.as_str().trim().to_lowercase();
        let matches = |k: &str, d: &str| {
            query.is_empty() || k.to_lowercase().contains(&query) || d.to_lowercase().contains(&query)
        };
        let mut rows = Vec::new();
        let mut push_section = |title: &str, entries: Vec<(String, String)>| {
            let hits: Vec<_> = entries.into_iter().filter(|(k, d)| matches(k, d)).collect();
            if hits.is_empty() {
                return;
            }
            if !rows.is_empty() {
                rows.push((None, String::new()));
            }
            rows.push((None, title.to_owned()));
            rows.extend(hits.into_iter().map(|(k, d)| (Some(k), d)));
        };
        for (section, entries) in BINDINGS {
            let owned = entries
                .iter()
                .map(|(k, d)| ((*k).to_owned(), (*d).to_owned()))
                .collect();
            push_section(section, owned);
        }
        if !self.custom.is_empty() {
            push_section("Custom Commands", self.custom.clone());
        }
        rows
    }

    fn max_scroll(&self) -> usize {
        self.rows().len().saturating_sub(self.height)
    }

    fn scroll_by(&mut self, delta: isize) {
        self.scroll = self.scroll.saturating_add_signed(delta).min(self.max_scroll());
    }
}

impl ScreenView for HelpScreen {
    fn handle_key(&mut self, key: KeyEvent) -> Outcome {
        if self.filtering {
            match key.code {
                KeyCode::Esc => {
                    self.filtering = false;
                    self.filter.clear();
                }
                KeyCode::Enter => self.filtering = false,
                _ => {
                    self.filter.handle_key(key);
                }
            }
            self.scroll = 0;
            return Outcome::Handled;
        }
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc | KeyCode::Char('q' | '?') => Outcome::Close,
            KeyCode::Char('/') => {
                self.filtering = true;
                Outcome::Handled
            }
            KeyCode::Char('j') | KeyCode::Down => {
                self.scroll_by(1);
                Outcome::Handled
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.scroll_by(-1);
                Outcome::Handled
            }
            KeyCode::Char('d') if ctrl => {
                self.scroll_by(isize::try_from(self.height / 2).unwrap_or(1));
                Outcome::Handled
            }
            KeyCode::Char('u') if ctrl => {
                self.scroll_by(-isize::try_from(self.height / 2).unwrap_or(1));
                Outcome::Handled
            }
            KeyCode::PageDown | KeyCode::Char(' ') => {
                self.scroll_by(isize::try_from(self.height).unwrap_or(1));
                Outcome::Handled
            }
            KeyCode::PageUp => {
                self.scroll_by(-isize::try_from(self.height).unwrap_or(1));
                Outcome::Handled
            }
            KeyCode::Char('g') => {
                self.scroll = 0;
                Outcome::Handled
            }
            KeyCode::Char('G') => {
                self.scroll = self.max_scroll();
                Outcome::Handled
            }
            _ => Outcome::Handled,
        }
    }

    fn render(&mut self, f: &mut Frame<'_>, area: Rect, ctx: &Ctx<'_>) {
        let rect = centered(area, 76, area.height.saturating_sub(4).max(8));
        let inner = popup_frame(f, rect, "Help", ctx);
        self.height = usize::from(inner.height.saturating_sub(1)).max(1);
        let rows = self.rows();
        self.scroll = self.scroll.min(rows.len().saturating_sub(self.height));

        let mut lines: Vec<Line<'_>> = rows
            .into_iter()
            .skip(self.scroll)
            .take(self.height)
            .map(|(key, text)| match key {
                Some(k) => Line::from(vec![
                    Span::styled(format!("  {k:<18}"), ctx.styles.key_hint),
                    Span::styled(text, ctx.styles.text),
                ]),
                None => Line::styled(text, ctx.styles.title),
            })
            .collect();
        let footer = if self.filtering {
            format!("/{}", self.filter.as_str())
        } else if self.filter.as_str().is_empty() {
            "j/k scroll · / filter · Esc close".to_owned()
        } else {
            format!("filter: {} · / edit · Esc close", self.filter.as_str())
        };
        while lines.len() < self.height {
            lines.push(Line::default());
        }
        lines.push(Line::styled(footer, ctx.styles.muted));
        f.render_widget(Paragraph::new(lines), inner);
    }

    fn kind(&self) -> ScreenKind {
        ScreenKind::Help
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn filter_narrows_to_matching_bindings() {
        let mut help = HelpScreen::new(vec![("e".to_owned(), "Open editor here".to_owned())]);
        help.handle_key(key(KeyCode::Char('/')));
        for c in "lazygit".chars() {
            help.handle_key(key(KeyCode::Char(c)));
        }
        let rows = help.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], (None, "Worktrees".to_owned()));
        assert_eq!(rows[1].0.as_deref(), Some("g"));
    }

    #[test]
    fn custom_commands_get_their_own_section() {
        let help = HelpScreen::new(vec![("e".to_owned(), "Open editor here".to_owned())]);
        let rows = help.rows();
        assert!(rows.contains(&(None, "Custom Commands".to_owned())));
        assert!(rows.contains(&(Some("e".to_owned()), "Open editor here".to_owned())));
    }
}
