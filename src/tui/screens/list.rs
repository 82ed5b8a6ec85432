#![forbid(unsafe_code)]

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;

use super::{Outcome, ScreenKind, ScreenView, centered, popup_frame, scroll_to};
use crate::tui::model::Msg;
use crate::tui::render::Ctx;
use crate::tui::text_input::TextInput;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListAction {
    CreateMenu,
    BaseBranch,
    PullRequest,
    Issue,
    CherryPickTarget { sha: String },
    Theme,
    CiCheck,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListItem {
    pub id: String,
    pub label: String,
    pub description: String,
}

impl ListItem {
    pub fn new(id: impl Into<String>, label: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            description: description.into(),
        }
    }

    fn matches(&self, query: &str) -> bool {
        query.is_empty()
            || self.label.to_lowercase().contains(query)
            || self.description.to_lowercase().contains(query)
    }
}

/// Filterable picker; typing narrows, arrows move, Enter selects.
#[derive(Debug)]
pub struct ListScreen {
    title: String,
    items: Vec<ListItem>,
    action: ListAction,
    filter: TextInput,
    visible: Vec<usize>,
    cursor: usize,
    offset: usize,
}

impl ListScreen {
    #[must_use]
    pub fn new(title: impl Into<String>, items: Vec<ListItem>, action: ListAction) -> Self {
        let visible = (0..items.len()).collect();
        Self {
            title: title.into(),
            items,
            action,
            filter: TextInput::default(),
            visible,
            cursor: 0,
            offset: 0,
        }
    }

    #[must_use]
    pub fn action(&self) -> &ListAction {
        &self.action
    }

    #[must_use]
    pub fn selected(&self) -> Option<&ListItem> {
        self.visible.get(self.cursor).map(|&i| &self.items[i])
    }

    /// Moves the cursor to the item with `id` when it is visible.
    pub fn select_id(&mut self, id: &str) {
        if let Some(pos) = self.visible.iter().position(|&i| self.items[i].id == id) {
            self.cursor = pos;
        }
    }

    fn refilter(&mut self) {
        let query = self.filter.as_str().trim().to_lowercase();
        self.visible = self
            .items
            .iter()
            .enumerate()
            .filter(|(_, it)| it.matches(&query))
            .map(|(i, _)| i)
            .collect();
        self.cursor = self.cursor.min(self.visible.len().saturating_sub(1));
    }

    fn step(&mut self, delta: isize) {
        if self.visible.is_empty() {
            return;
        }
        self.cursor = self
            .cursor
            .saturating_add_signed(delta)
            .min(self.visible.len() - 1);
    }
}

impl ScreenView for ListScreen {
    fn handle_key(&mut self, key: KeyEvent) -> Outcome {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => Outcome::Close,
            KeyCode::Char('c') if ctrl => Outcome::Close,
            KeyCode::Enter => match self.selected() {
                Some(item) => Outcome::CloseWith(Msg::ListSelected {
                    action: self.action.clone(),
                    id: item.id.clone(),
                }),
                None => Outcome::Handled,
            },
            KeyCode::Up => {
                self.step(-1);
                Outcome::Handled
            }
            KeyCode::Down => {
                self.step(1);
                Outcome::Handled
            }
            KeyCode::Char('k' | 'p') if ctrl => {
                self.step(-1);
                Outcome::Handled
            }
            KeyCode::Char('j' | 'n') if ctrl => {
                self.step(1);
                Outcome::Handled
            }
            KeyCode::PageUp => {
                self.step(-10);
                Outcome::Handled
            }
            KeyCode::PageDown => {
                self.step(10);
                Outcome::Handled
            }
            _ => {
                if self.filter.handle_key(key) {
                    self.refilter();
                }
                Outcome::Handled
            }
        }
    }

    fn render(&mut self, f: &mut Frame<'_>, area: Rect, ctx: &Ctx<'_>) {
        let rows = u16::try_from(self.items.len().min(14)).unwrap_or(14);
        let rect = centered(area, 80, rows + 5);
        let inner = popup_frame(f, rect, &self.title, ctx);

        let list_height = usize::from(inner.height.saturating_sub(2));
        self.offset = scroll_to(self.cursor, self.offset, list_height);

        let mut lines = vec![
            Line::from(vec![
                Span::styled("Filter: ", ctx.styles.muted),
                Span::styled(self.filter.as_str().to_owned(), ctx.styles.text),
            ]),
            Line::default(),
        ];
        if self.visible.is_empty() {
            lines.push(Line::styled("No matches", ctx.styles.muted));
        }
        let width = usize::from(inner.width);
        for (row, &idx) in self
            .visible
            .iter()
            .enumerate()
            .skip(self.offset)
            .take(list_height)
        {
            let item = &self.items[idx];
            let selected = row == self.cursor;
            let mut text = format!(" {}", item.label);
            if !item.description.is_empty() {
                text.push_str("  ");
            }
            let desc_room = width.saturating_sub(text.chars().count());
            let desc: String = item.description.chars().take(desc_room).collect();
            if selected {
                let mut full = format!("{text}{desc}");
                let pad = width.saturating_sub(full.chars().count());
                full.push_str(&" ".repeat(pad));
                lines.push(Line::styled(full, ctx.styles.selected));
            } else {
                lines.push(Line::from(vec![
                    Span::styled(text, ctx.styles.text),
                    Span::styled(desc, ctx.styles.muted),
                ]));
            }
        }
        f.render_widget(Paragraph::new(lines), inner);
    }

    fn kind(&self) -> ScreenKind {
        ScreenKind::List
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn screen() -> ListScreen {
        ListScreen::new(
            "Base branch",
            vec![
                ListItem::new("main", "main", "default branch"),
                ListItem::new("feature/a", "feature/a", ""),
                ListItem::new("feature/b", "feature/b", "wip"),
            ],
            ListAction::BaseBranch,
        )
    }

    #[test]
    fn typing_filters_and_enter_selects() {
        let mut s = screen();
        for c in "feat".chars() {
            s.handle_key(key(KeyCode::Char(c)));
        }
        s.handle_key(key(KeyCode::Down));
        match s.handle_key(key(KeyCode::Enter)) {
            Outcome::CloseWith(Msg::ListSelected { id, action }) => {
                assert_eq!(id, "feature/b");
                assert_eq!(action, ListAction::BaseBranch);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn description_matches_too() {
        let mut s = screen();
        for c in "wip".chars() {
            s.handle_key(key(KeyCode::Char(c)));
        }
        assert_eq!(s.selected().map(|i| i.id.as_str()), Some("feature/b"));
    }

    #[test]
    fn empty_filter_result_does_not_select() {
        let mut s = screen();
        for c in "zzz".chars() {
            s.handle_key(key(KeyCode::Char(c)));
        }
        assert!(matches!(s.handle_key(key(KeyCode::Enter)), Outcome::Handled));
    }
}
