#![forbid(unsafe_code)]

use crossterm::event::{KeyCode, KeyEvent};
use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Paragraph, Wrap};

use super::{Outcome, ScreenKind, ScreenView, centered, popup_frame};
use crate::tui::model::Msg;
use crate::tui::render::Ctx;

/// Yes/no prompt with two focusable buttons.
#[derive(Debug)]
pub struct ConfirmScreen {
    title: String,
    message: String,
    yes_label: String,
    no_label: String,
    /// 0 = yes, 1 = no.
    focused: usize,
    on_confirm: Msg,
    on_cancel: Option<Msg>,
}

impl ConfirmScreen {
    pub fn new(title: impl Into<String>, message: impl Into<String>, on_confirm: Msg) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            yes_label: "Yes".to_owned(),
            no_label: "No".to_owned(),
            focused: 0,
            on_confirm,
            on_cancel: None,
        }
    }

    #[must_use]
    pub fn labels(mut self, yes: &str, no: &str) -> Self {
        yes.clone_into(&mut self.yes_label);
        no.clone_into(&mut self.no_label);
        self
    }

    /// Starts with the "No" button focused.
    #[must_use]
    pub fn default_no(mut self) -> Self {
        self.focused = 1;
        self
    }

    /// Sent when "No" is chosen; Esc only dismisses.
    #[must_use]
    pub fn on_cancel(mut self, msg: Msg) -> Self {
        self.on_cancel = Some(msg);
        self
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn focused_yes(&self) -> bool {
        self.focused == 0
    }

    fn cancel(&self) -> Outcome {
        match &self.on_cancel {
            Some(msg) => Outcome::CloseWith(msg.clone()),
            None => Outcome::Close,
        }
    }
}

impl ScreenView for ConfirmScreen {
    fn handle_key(&mut self, key: KeyEvent) -> Outcome {
        match key.code {
            KeyCode::Char('y' | 'Y') => Outcome::CloseWith(self.on_confirm.clone()),
            KeyCode::Char('n' | 'N') => self.cancel(),
            KeyCode::Esc | KeyCode::Char('q') => Outcome::Close,
            KeyCode::Left | KeyCode::Right | KeyCode::Tab | KeyCode::BackTab
            | KeyCode::Char('h' | 'l') => {
                self.focused = 1 - self.focused;
                Outcome::Handled
            }
            KeyCode::Enter => {
                if self.focused == 0 {
                    Outcome::CloseWith(self.on_confirm.clone())
                } else {
                    self.cancel()
                }
            }
            _ => Outcome::Handled,
        }
    }

    fn render(&mut self, f: &mut Frame<'_>, area: Rect, ctx: &Ctx<'_>) {
        let width = 60u16;
        let text_rows = u16::try_from(self.message.lines().count()).unwrap_or(1);
        let rect = centered(area, width, text_rows + 6);
        let inner = popup_frame(f, rect, &self.title, ctx);

        let button = |label: &str, focused: bool| {
            let style = if focused {
                ctx.styles.selected
            } else {
                ctx.styles.muted
            };
            Span::styled(format!("  {label}  "), style)
        };
        let mut lines: Vec<Line<'_>> = self
            .message
            .lines()
            .map(|l| Line::styled(l.to_owned(), ctx.styles.text))
            .collect();
        lines.push(Line::default());
        lines.push(Line::from(vec![
            button(&self.yes_label, self.focused == 0),
            Span::raw("   "),
            button(&self.no_label, self.focused == 1),
        ]));
        lines.push(Line::styled("y/n · ←/→ · Enter", ctx.styles.muted));
        f.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), inner);
    }

    fn kind(&self) -> ScreenKind {
        ScreenKind::Confirm
    }
}

#[cfg(test)]
mod tests {
    use crossterm::event::KeyModifiers;

    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn enter_follows_focused_button() {
        let mut s = ConfirmScreen::new("Delete", "Sure?", Msg::Quit).default_no();
        assert!(matches!(s.handle_key(key(KeyCode::Enter)), Outcome::Close));

        let mut s = ConfirmScreen::new("Delete", "Sure?", Msg::Quit);
        assert!(matches!(
            s.handle_key(key(KeyCode::Enter)),
            Outcome::CloseWith(Msg::Quit)
        ));
    }

    #[test]
    fn toggling_focus_then_yes_key() {
        let mut s = ConfirmScreen::new("t", "m", Msg::Quit);
        s.handle_key(key(KeyCode::Right));
        assert!(!s.focused_yes());
        assert!(matches!(
            s.handle_key(key(KeyCode::Char('y'))),
            Outcome::CloseWith(Msg::Quit)
        ));
    }

    #[test]
    fn no_sends_cancel_message_but_esc_only_closes() {
        let mut s = ConfirmScreen::new("t", "m", Msg::Quit).on_cancel(Msg::Info("no".to_owned()));
        assert!(matches!(
            s.handle_key(key(KeyCode::Char('n'))),
            Outcome::CloseWith(Msg::Info(_))
        ));
        assert!(matches!(s.handle_key(key(KeyCode::Esc)), Outcome::Close));
    }
}
