#![forbid(unsafe_code)]

use crossterm::event::KeyEvent;
use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;

use super::{Outcome, ScreenKind, ScreenView, centered, popup_frame};
use crate::tui::render::{Ctx, SPINNER};

/// Non-interactive; the completion message pops it.
#[derive(Debug)]
pub struct LoadingScreen {
    message: String,
    frame: usize,
}

impl LoadingScreen {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            frame: 0,
        }
    }

    pub fn tick(&mut self) {
        self.frame = (self.frame + 1) % SPINNER.len();
    }
}

impl ScreenView for LoadingScreen {
    fn handle_key(&mut self, _key: KeyEvent) -> Outcome {
        Outcome::Handled
    }

    fn render(&mut self, f: &mut Frame<'_>, area: Rect, ctx: &Ctx<'_>) {
        let width = u16::try_from(self.message.chars().count() + 10).unwrap_or(60).clamp(24, 70);
        let rect = centered(area, width, 3);
        let inner = popup_frame(f, rect, "Working", ctx);
        f.render_widget(
            Paragraph::new(Line::from(vec![
                Span::styled(format!("{} ", SPINNER[self.frame]), ctx.styles.accent),
                Span::styled(self.message.clone(), ctx.styles.text),
            ])),
            inner,
        );
    }

    fn kind(&self) -> ScreenKind {
        ScreenKind::Loading
    }
}
