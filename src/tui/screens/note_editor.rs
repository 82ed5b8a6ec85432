#![forbid(unsafe_code)]

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::Frame;
use ratatui::layout::{Position, Rect};
use ratatui::text::Line;
use ratatui::widgets::Paragraph;

use super::{Outcome, ScreenKind, ScreenView, centered, popup_frame};
use crate::tui::model::Msg;
use crate::tui::render::Ctx;
use crate::tui::text_input::{TextArea, cursor_x_for_text};

/// Multi-line markdown editor for a worktree note.
#[derive(Debug)]
pub struct NoteEditorScreen {
    worktree_path: String,
    title: String,
    area: TextArea,
}

impl NoteEditorScreen {
    #[must_use]
    pub fn new(worktree_path: &str, name: &str, existing: &str) -> Self {
        Self {
            worktree_path: worktree_path.to_owned(),
            title: format!("Notes: {name}"),
            area: TextArea::new(existing),
        }
    }

    #[must_use]
    pub fn text(&self) -> String {
        self.area.text()
    }
}

impl ScreenView for NoteEditorScreen {
    fn handle_key(&mut self, key: KeyEvent) -> Outcome {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => Outcome::Close,
            KeyCode::Char('s') if ctrl => Outcome::CloseWith(Msg::NoteSaved {
                path: self.worktree_path.clone(),
                text: self.area.text(),
            }),
            KeyCode::Char('c') if ctrl => Outcome::Close,
            _ => {
                self.area.handle_key(key);
                Outcome::Handled
            }
        }
    }

    fn render(&mut self, f: &mut Frame<'_>, area: Rect, ctx: &Ctx<'_>) {
        let rect = centered(area, 100, area.height.saturating_sub(4).max(8));
        let inner = popup_frame(f, rect, &self.title, ctx);
        if inner.height < 2 {
            return;
        }
        let height = usize::from(inner.height - 1);
        let scroll = self.area.scroll_for(height);

        let lines: Vec<Line<'_>> = self
            .area
            .lines()
            .iter()
            .skip(scroll)
            .take(height)
            .map(|l| Line::styled(l.clone(), ctx.styles.text))
            .collect();
        let body = Rect {
            height: inner.height - 1,
            ..inner
        };
        f.render_widget(Paragraph::new(lines), body);

        let (row, col) = self.area.cursor();
        let line = self.area.lines().get(row).map_or("", String::as_str);
        let x = cursor_x_for_text(line, col).min(inner.width.saturating_sub(1));
        let y = u16::try_from(row - scroll).unwrap_or(0);
        f.set_cursor_position(Position::new(inner.x + x, inner.y + y));

        let hint = Rect {
            y: inner.y + inner.height - 1,
            height: 1,
            ..inner
        };
        f.render_widget(
            Paragraph::new(Line::styled("Ctrl+S save · Esc cancel", ctx.styles.muted)),
            hint,
        );
    }

    fn kind(&self) -> ScreenKind {
        ScreenKind::NoteEditor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ctrl_s_saves_edited_text() {
        let mut s = NoteEditorScreen::new("/w/a", "a", "hello");
        s.handle_key(KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE));
        s.handle_key(KeyEvent::new(KeyCode::Char('x'), KeyModifiers::NONE));
        match s.handle_key(KeyEvent::new(KeyCode::Char('s'), KeyModifiers::CONTROL)) {
            Outcome::CloseWith(Msg::NoteSaved { path, text }) => {
                assert_eq!(path, "/w/a");
                assert_eq!(text, "hello\nx");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn esc_discards() {
        let mut s = NoteEditorScreen::new("/w/a", "a", "");
        assert!(matches!(
            s.handle_key(KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE)),
            Outcome::Close
        ));
    }
}
