#![forbid(unsafe_code)]

use crossterm::event::{KeyCode, KeyEvent};
use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;

use super::{Outcome, ScreenKind, ScreenView, centered, popup_frame, scroll_to};
use crate::tui::model::Msg;
use crate::tui::render::Ctx;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecklistAction {
    PruneMerged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecklistItem {
    pub id: String,
    pub label: String,
    pub description: String,
    pub checked: bool,
}

/// Multi-select list; Space toggles, `a` toggles all, Enter submits.
#[derive(Debug)]
pub struct ChecklistScreen {
    title: String,
    items: Vec<ChecklistItem>,
    action: ChecklistAction,
    cursor: usize,
    offset: usize,
}

impl ChecklistScreen {
    #[must_use]
    pub fn new(title: impl Into<String>, items: Vec<ChecklistItem>, action: ChecklistAction) -> Self {
        Self {
            title: title.into(),
            items,
            action,
            cursor: 0,
            offset: 0,
        }
    }

    #[must_use]
    pub fn checked_ids(&self) -> Vec<String> {
        self.items
            .iter()
            .filter(|i| i.checked)
            .map(|i| i.id.clone())
            .collect()
    }
}

impl ScreenView for ChecklistScreen {
    fn handle_key(&mut self, key: KeyEvent) -> Outcome {
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => return Outcome::Close,
            KeyCode::Char('j') | KeyCode::Down => {
                self.cursor = (self.cursor + 1).min(self.items.len().saturating_sub(1));
            }
            KeyCode::Char('k') | KeyCode::Up => self.cursor = self.cursor.saturating_sub(1),
            KeyCode::Char(' ') => {
                if let Some(item) = self.items.get_mut(self.cursor) {
                    item.checked = !item.checked;
                }
            }
            KeyCode::Char('a') => {
                let all = self.items.iter().all(|i| i.checked);
                self.items.iter_mut().for_each(|i| i.checked = !all);
            }
            KeyCode::Enter => {
                let ids = self.checked_ids();
                if ids.is_empty() {
                    return Outcome::Close;
                }
                return Outcome::CloseWith(Msg::ChecklistSubmitted {
                    action: self.action,
                    ids,
                });
            }
            _ => {}
        }
        Outcome::Handled
    }

    fn render(&mut self, f: &mut Frame<'_>, area: Rect, ctx: &Ctx<'_>) {
        let rows = u16::try_from(self.items.len().min(14)).unwrap_or(14);
        let rect = centered(area, 84, rows + 4);
        let inner = popup_frame(f, rect, &self.title, ctx);
        let height = usize::from(inner.height.saturating_sub(1)).max(1);
        self.offset = scroll_to(self.cursor, self.offset, height);

        let width = usize::from(inner.width);
        let mut lines: Vec<Line<'_>> = Vec::new();
        for (i, item) in self.items.iter().enumerate().skip(self.offset).take(height) {
            let mark = if item.checked { "[x]" } else { "[ ]" };
            let head = format!(" {mark} {}", item.label);
            if i == self.cursor {
                let mut full = format!("{head}  {}", item.description);
                full.push_str(&" ".repeat(width.saturating_sub(full.chars().count())));
                lines.push(Line::styled(full, ctx.styles.selected));
            } else {
                lines.push(Line::from(vec![
                    Span::styled(head, ctx.styles.text),
                    Span::styled(format!("  {}", item.description), ctx.styles.muted),
                ]));
            }
        }
        while lines.len() < height {
            lines.push(Line::default());
        }
        lines.push(Line::styled(
            "Space toggle · a all · Enter confirm · Esc cancel",
            ctx.styles.muted,
        ));
        f.render_widget(Paragraph::new(lines), inner);
    }

    fn kind(&self) -> ScreenKind {
        ScreenKind::Checklist
    }
}

#[cfg(test)]
mod tests {
    use crossterm::event::KeyModifiers;

    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn item(id: &str, checked: bool) -> ChecklistItem {
        ChecklistItem {
            id: id.to_owned(),
            label: id.to_owned(),
            description: String::new(),
            checked,
        }
    }

    #[test]
    fn submits_only_checked_items() {
        let mut s = ChecklistScreen::new(
            "Prune",
            vec![item("/w/a", true), item("/w/b", true)],
            ChecklistAction::PruneMerged,
        );
        s.handle_key(key(KeyCode::Char(' ')));
        match s.handle_key(key(KeyCode::Enter)) {
            Outcome::CloseWith(Msg::ChecklistSubmitted { ids, .. }) => {
                assert_eq!(ids, vec!["/w/b".to_owned()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn toggle_all_flips_every_item() {
        let mut s = ChecklistScreen::new(
            "Prune",
            vec![item("a", true), item("b", false)],
            ChecklistAction::PruneMerged,
        );
        s.handle_key(key(KeyCode::Char('a')));
        assert_eq!(s.checked_ids().len(), 2);
        s.handle_key(key(KeyCode::Char('a')));
        assert!(s.checked_ids().is_empty());
        assert!(matches!(s.handle_key(key(KeyCode::Enter)), Outcome::Close));
    }
}
