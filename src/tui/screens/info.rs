#![forbid(unsafe_code)]

use crossterm::event::{KeyCode, KeyEvent};
use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::text::Line;
use ratatui::widgets::{Paragraph, Wrap};

use super::{Outcome, ScreenKind, ScreenView, centered, popup_frame};
use crate::tui::render::Ctx;

/// Read-only message; any dismiss key closes it.
#[derive(Debug)]
pub struct InfoScreen {
    title: String,
    message: String,
    scroll: u16,
}

impl InfoScreen {
    pub fn new(message: impl Into<String>) -> Self {
        Self::titled("Info", message)
    }

    pub fn titled(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            scroll: 0,
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl ScreenView for InfoScreen {
    fn handle_key(&mut self, key: KeyEvent) -> Outcome {
        match key.code {
            KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q' | ' ') => Outcome::Close,
            KeyCode::Char('j') | KeyCode::Down => {
                self.scroll = self.scroll.saturating_add(1);
                Outcome::Handled
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.scroll = self.scroll.saturating_sub(1);
                Outcome::Handled
            }
            _ => Outcome::Handled,
        }
    }

    fn render(&mut self, f: &mut Frame<'_>, area: Rect, ctx: &Ctx<'_>) {
        let width = 70u16.min(area.width.saturating_sub(4));
        let wrap_width = usize::from(width.saturating_sub(2)).max(1);
        let rows: usize = self
            .message
            .lines()
            .map(|l| l.chars().count().div_ceil(wrap_width).max(1))
            .sum();
        let rows = u16::try_from(rows).unwrap_or(u16::MAX);
        let rect = centered(area, width, rows.saturating_add(4).min(area.height.saturating_sub(2)));
        let inner = popup_frame(f, rect, &self.title, ctx);

        let text_height = inner.height.saturating_sub(1);
        self.scroll = self.scroll.min(rows.saturating_sub(text_height));
        let mut lines: Vec<Line<'_>> = self
            .message
            .lines()
            .map(|l| Line::styled(l.to_owned(), ctx.styles.text))
            .collect();
        if lines.is_empty() {
            lines.push(Line::default());
        }
        let body = Rect {
            height: text_height,
            ..inner
        };
        f.render_widget(
            Paragraph::new(lines)
                .wrap(Wrap { trim: false })
                .scroll((self.scroll, 0)),
            body,
        );
        let hint = Rect {
            y: inner.y + text_height,
            height: 1,
            ..inner
        };
        f.render_widget(Paragraph::new(Line::styled("Esc close", ctx.styles.muted)), hint);
    }

    fn kind(&self) -> ScreenKind {
        ScreenKind::Info
    }
}
