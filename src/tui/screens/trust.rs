#![forbid(unsafe_code)]

use crossterm::event::{KeyCode, KeyEvent};
use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Paragraph, Wrap};

use super::{Outcome, ScreenKind, ScreenView, centered, popup_frame};
use crate::tui::model::Msg;
use crate::tui::ops::PendingCommands;
use crate::tui::render::Ctx;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustChoice {
    /// Record the file hash and run.
    Trust,
    RunOnce,
    Cancel,
}

const CHOICES: [(TrustChoice, &str); 3] = [
    (TrustChoice::Trust, "Trust"),
    (TrustChoice::RunOnce, "Run once"),
    (TrustChoice::Cancel, "Cancel"),
];

/// Asks before running commands declared in an untrusted repo file.
#[derive(Debug)]
pub struct TrustScreen {
    pending: PendingCommands,
    focused: usize,
}

impl TrustScreen {
    #[must_use]
    pub fn new(pending: PendingCommands) -> Self {
        Self {
            pending,
            focused: 2,
        }
    }

    fn choose(&self, choice: TrustChoice) -> Outcome {
        Outcome::CloseWith(Msg::TrustChoice {
            pending: Box::new(self.pending.clone()),
            choice,
        })
    }
}

impl ScreenView for TrustScreen {
    fn handle_key(&mut self, key: KeyEvent) -> Outcome {
        match key.code {
            KeyCode::Char('t' | 'T') => self.choose(TrustChoice::Trust),
            KeyCode::Char('r' | 'R' | 'o') => self.choose(TrustChoice::RunOnce),
            KeyCode::Char('c' | 'q') | KeyCode::Esc => self.choose(TrustChoice::Cancel),
            KeyCode::Left | KeyCode::Char('h') | KeyCode::BackTab => {
                self.focused = (self.focused + CHOICES.len() - 1) % CHOICES.len();
                Outcome::Handled
            }
            KeyCode::Right | KeyCode::Char('l') | KeyCode::Tab => {
                self.focused = (self.focused + 1) % CHOICES.len();
                Outcome::Handled
            }
            KeyCode::Enter => self.choose(CHOICES[self.focused].0),
            _ => Outcome::Handled,
        }
    }

    fn render(&mut self, f: &mut Frame<'_>, area: Rect, ctx: &Ctx<'_>) {
        let cmd_rows = u16::try_from(self.pending.commands.len().min(8)).unwrap_or(8);
        let rect = centered(area, 80, cmd_rows + 9);
        let inner = popup_frame(f, rect, "Untrusted commands", ctx);

        let file = self
            .pending
            .trust_path
            .as_ref()
            .map_or_else(String::new, |p| p.display().to_string());
        let mut lines = vec![
            Line::from(vec![
                Span::styled("Repository file ", ctx.styles.text),
                Span::styled(file, ctx.styles.warn),
                Span::styled(" wants to run:", ctx.styles.text),
            ]),
            Line::default(),
        ];
        lines.extend(
            self.pending
                .commands
                .iter()
                .take(8)
                .map(|c| Line::styled(format!("  $ {c}"), ctx.styles.cyan)),
        );
        lines.push(Line::default());
        let mut buttons = Vec::new();
        for (i, (_, label)) in CHOICES.iter().enumerate() {
            let style = if i == self.focused {
                ctx.styles.selected
            } else {
                ctx.styles.muted
            };
            buttons.push(Span::styled(format!("  {label}  "), style));
            buttons.push(Span::raw("  "));
        }
        lines.push(Line::from(buttons));
        lines.push(Line::styled("t trust · r run once · Esc cancel", ctx.styles.muted));
        f.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), inner);
    }

    fn kind(&self) -> ScreenKind {
        ScreenKind::Trust
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use crossterm::event::KeyModifiers;

    use super::*;

    fn pending() -> PendingCommands {
        PendingCommands {
            label: "init".to_owned(),
            commands: vec!["make setup".to_owned()],
            cwd: PathBuf::from("/w/a"),
            env: BTreeMap::new(),
            trust_path: Some(PathBuf::from("/repo/.wt.yaml")),
            after: None,
        }
    }

    #[test]
    fn defaults_to_cancel() {
        let mut s = TrustScreen::new(pending());
        match s.handle_key(KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE)) {
            Outcome::CloseWith(Msg::TrustChoice { choice, .. }) => {
                assert_eq!(choice, TrustChoice::Cancel);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn shortcut_trusts() {
        let mut s = TrustScreen::new(pending());
        match s.handle_key(KeyEvent::new(KeyCode::Char('t'), KeyModifiers::NONE)) {
            Outcome::CloseWith(Msg::TrustChoice { choice, pending }) => {
                assert_eq!(choice, TrustChoice::Trust);
                assert_eq!(pending.commands, vec!["make setup".to_owned()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
