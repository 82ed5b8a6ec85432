#![forbid(unsafe_code)]

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::Frame;
use ratatui::layout::{Position, Rect};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;

use super::{Outcome, ScreenKind, ScreenView, centered, popup_frame, scroll_to};
use crate::tui::model::Msg;
use crate::tui::render::Ctx;
use crate::tui::text_input::{TextInput, cursor_x_for_text};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaletteItem {
    pub id: String,
    pub label: String,
    pub description: String,
    pub shortcut: String,
}

impl PaletteItem {
    pub fn new(id: &str, label: &str, description: &str, shortcut: &str) -> Self {
        Self {
            id: id.to_owned(),
            label: label.to_owned(),
            description: description.to_owned(),
            shortcut: shortcut.to_owned(),
        }
    }

    fn matches(&self, query: &str) -> bool {
        query.is_empty()
            || self.label.to_lowercase().contains(query)
            || self.description.to_lowercase().contains(query)
            || self.id.contains(query)
    }
}

#[derive(Debug, Clone)]
enum Row {
    Header(&'static str),
    Item(usize),
}

/// Filterable action list; recently used entries are listed first.
#[derive(Debug)]
pub struct PaletteScreen {
    items: Vec<PaletteItem>,
    recent: Vec<String>,
    query: TextInput,
    rows: Vec<Row>,
    cursor: usize,
    offset: usize,
}

impl PaletteScreen {
    /// `recent` holds item ids, most recent first, already capped.
    #[must_use]
    pub fn new(items: Vec<PaletteItem>, recent: Vec<String>) -> Self {
        let mut s = Self {
            items,
            recent,
            query: TextInput::default(),
            rows: Vec::new(),
            cursor: 0,
            offset: 0,
        };
        s.rebuild();
        s
    }

    fn rebuild(&mut self) {
        let query = self.query.as_str().trim().to_lowercase();
        self.rows.clear();
        if query.is_empty() && !self.recent.is_empty() {
            let recent: Vec<usize> = self
                .recent
                .iter()
                .filter_map(|id| self.items.iter().position(|it| &it.id == id))
                .collect();
            if !recent.is_empty() {
                self.rows.push(Row::Header("Recently used"));
                self.rows.extend(recent.iter().map(|&i| Row::Item(i)));
                self.rows.push(Row::Header("All commands"));
                self.rows.extend(
                    (0..self.items.len())
                        .filter(|i| !recent.contains(i))
                        .map(Row::Item),
                );
            }
        }
        if self.rows.is_empty() {
            self.rows.extend(
                self.items
                    .iter()
                    .enumerate()
                    .filter(|(_, it)| it.matches(&query))
                    .map(|(i, _)| Row::Item(i)),
            );
        }
        self.cursor = self.first_item().unwrap_or(0);
        self.offset = 0;
    }

    fn first_item(&self) -> Option<usize> {
        self.rows.iter().position(|r| matches!(r, Row::Item(_)))
    }

    fn step(&mut self, forward: bool) {
        let mut i = self.cursor;
        loop {
            if forward {
                if i + 1 >= self.rows.len() {
                    return;
                }
                i += 1;
            } else {
                if i == 0 {
                    return;
                }
                i -= 1;
            }
            if matches!(self.rows[i], Row::Item(_)) {
                self.cursor = i;
                return;
            }
        }
    }

    #[must_use]
    pub fn selected(&self) -> Option<&PaletteItem> {
        match self.rows.get(self.cursor)? {
            Row::Item(i) => self.items.get(*i),
            Row::Header(_) => None,
        }
    }
}

impl ScreenView for PaletteScreen {
    fn handle_key(&mut self, key: KeyEvent) -> Outcome {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => return Outcome::Close,
            KeyCode::Char('c') if ctrl => return Outcome::Close,
            KeyCode::Enter => {
                return match self.selected() {
                    Some(item) => Outcome::CloseWith(Msg::PaletteSelected(item.id.clone())),
                    None => Outcome::Handled,
                };
            }
            KeyCode::Down => self.step(true),
            KeyCode::Up => self.step(false),
            KeyCode::Char('j' | 'n') if ctrl => self.step(true),
            KeyCode::Char('k' | 'p') if ctrl => self.step(false),
            _ => {
                if self.query.handle_key(key) {
                    self.rebuild();
                }
            }
        }
        Outcome::Handled
    }

    fn render(&mut self, f: &mut Frame<'_>, area: Rect, ctx: &Ctx<'_>) {
        let rect = centered(area, 80, area.height.saturating_sub(6).clamp(8, 24));
        let inner = popup_frame(f, rect, "Command Palette", ctx);
        if inner.height < 3 {
            return;
        }

        let prompt = "> ";
        let input = Rect { height: 1, ..inner };
        f.render_widget(
            Paragraph::new(Line::from(vec![
                Span::styled(prompt, ctx.styles.accent),
                Span::styled(self.query.as_str().to_owned(), ctx.styles.text),
            ])),
            input,
        );
        f.set_cursor_position(Position::new(
            input.x + 2 + cursor_x_for_text(self.query.as_str(), self.query.cursor()),
            input.y,
        ));

        let list = Rect {
            y: inner.y + 2,
            height: inner.height - 2,
            ..inner
        };
        let height = usize::from(list.height).max(1);
        self.offset = scroll_to(self.cursor, self.offset, height);
        let width = usize::from(list.width);

        let mut lines: Vec<Line<'_>> = Vec::new();
        if self.rows.is_empty() {
            lines.push(Line::styled("No matching commands", ctx.styles.muted));
        }
        for (i, row) in self.rows.iter().enumerate().skip(self.offset).take(height) {
            match row {
                Row::Header(label) => lines.push(Line::styled(*label, ctx.styles.title)),
                Row::Item(idx) => {
                    let item = &self.items[*idx];
                    let shortcut = if item.shortcut.is_empty() {
                        String::new()
                    } else {
                        format!("[{}]", item.shortcut)
                    };
                    let left = format!("  {}", item.label);
                    let desc = format!("  {}", item.description);
                    let used = left.chars().count() + desc.chars().count() + shortcut.chars().count();
                    let pad = " ".repeat(width.saturating_sub(used));
                    if i == self.cursor {
                        lines.push(Line::styled(
                            format!("{left}{desc}{pad}{shortcut}"),
                            ctx.styles.selected,
                        ));
                    } else {
                        lines.push(Line::from(vec![
                            Span::styled(left, ctx.styles.text),
                            Span::styled(desc, ctx.styles.muted),
                            Span::raw(pad),
                            Span::styled(shortcut, ctx.styles.key_hint),
                        ]));
                    }
                }
            }
        }
        f.render_widget(Paragraph::new(lines), list);
    }

    fn kind(&self) -> ScreenKind {
        ScreenKind::Palette
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn items() -> Vec<PaletteItem> {
        vec![
            PaletteItem::new("create", "Create worktree", "New worktree", "c"),
            PaletteItem::new("delete", "Delete worktree", "Remove worktree", "D"),
            PaletteItem::new("fetch", "Fetch remotes", "git fetch --all", "R"),
        ]
    }

    fn selected_on_enter(p: &mut PaletteScreen) -> String {
        match p.handle_key(key(KeyCode::Enter)) {
            Outcome::CloseWith(Msg::PaletteSelected(id)) => id,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn recent_entries_come_first() {
        let mut p = PaletteScreen::new(items(), vec!["fetch".to_owned()]);
        assert_eq!(p.selected().map(|i| i.id.as_str()), Some("fetch"));
        p.handle_key(key(KeyCode::Down));
        assert_eq!(p.selected().map(|i| i.id.as_str()), Some("create"));
        assert_eq!(selected_on_enter(&mut p), "create");
    }

    #[test]
    fn typing_filters_and_drops_sections() {
        let mut p = PaletteScreen::new(items(), vec!["fetch".to_owned()]);
        for c in "del".chars() {
            p.handle_key(key(KeyCode::Char(c)));
        }
        assert_eq!(selected_on_enter(&mut p), "delete");
    }

    #[test]
    fn unknown_recent_ids_are_skipped() {
        let p = PaletteScreen::new(items(), vec!["gone".to_owned()]);
        assert_eq!(p.selected().map(|i| i.id.as_str()), Some("create"));
    }
}
