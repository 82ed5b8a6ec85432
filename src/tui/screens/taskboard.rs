#![forbid(unsafe_code)]

use crossterm::event::{KeyCode, KeyEvent};
use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::Modifier;
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;

use super::{Outcome, ScreenKind, ScreenView, centered, popup_frame, scroll_to};
use crate::core::tasks::{EMPTY_TASKBOARD, TaskboardItem};
use crate::tui::model::Msg;
use crate::tui::render::Ctx;

/// Tasks from every worktree note, grouped by worktree.
#[derive(Debug)]
pub struct TaskboardScreen {
    items: Vec<TaskboardItem>,
    cursor: usize,
    offset: usize,
    /// Worktree used for `a` when the board is empty.
    fallback_path: String,
}

impl TaskboardScreen {
    #[must_use]
    pub fn new(items: Vec<TaskboardItem>, fallback_path: &str) -> Self {
        let mut s = Self {
            items,
            cursor: 0,
            offset: 0,
            fallback_path: fallback_path.to_owned(),
        };
        s.cursor = s.first_task().unwrap_or(0);
        s
    }

    /// Replaces the items, keeping the cursor on the same task id.
    pub fn set_items(&mut self, items: Vec<TaskboardItem>) {
        let keep = self.selected_id();
        self.items = items;
        self.cursor = keep
            .and_then(|id| {
                self.items
                    .iter()
                    .position(|it| it.task().is_some_and(|t| t.id == id))
            })
            .or_else(|| self.first_task())
            .unwrap_or(0);
    }

    #[must_use]
    pub fn items(&self) -> &[TaskboardItem] {
        &self.items
    }

    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    fn selected_id(&self) -> Option<String> {
        self.items
            .get(self.cursor)
            .and_then(TaskboardItem::task)
            .map(|t| t.id.clone())
    }

    fn first_task(&self) -> Option<usize> {
        self.items.iter().position(|it| it.task().is_some())
    }

    fn step(&mut self, forward: bool) {
        let mut i = self.cursor;
        loop {
            if forward {
                if i + 1 >= self.items.len() {
                    return;
                }
                i += 1;
            } else {
                if i == 0 {
                    return;
                }
                i -= 1;
            }
            if self.items[i].task().is_some() {
                self.cursor = i;
                return;
            }
        }
    }
}

impl ScreenView for TaskboardScreen {
    fn handle_key(&mut self, key: KeyEvent) -> Outcome {
        match key.code {
            KeyCode::Esc | KeyCode::Char('q' | 'T') => Outcome::Close,
            KeyCode::Char('j') | KeyCode::Down => {
                self.step(true);
                Outcome::Handled
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.step(false);
                Outcome::Handled
            }
            KeyCode::Char(' ') | KeyCode::Enter => {
                match self.items.get(self.cursor).and_then(TaskboardItem::task) {
                    Some(task) => Outcome::Emit(Msg::TaskToggle {
                        path: task.worktree_path.clone(),
                        line: task.line_index,
                        is_keyword: task.is_keyword,
                    }),
                    None => Outcome::Handled,
                }
            }
            KeyCode::Char('a') => {
                let path = self
                    .items
                    .get(self.cursor)
                    .map_or_else(|| self.fallback_path.clone(), |it| it.worktree_path().to_owned());
                if path.is_empty() {
                    return Outcome::Handled;
                }
                Outcome::Emit(Msg::OpenAddTask { path })
            }
            _ => Outcome::Handled,
        }
    }

    fn render(&mut self, f: &mut Frame<'_>, area: Rect, ctx: &Ctx<'_>) {
        let rect = centered(area, 90, area.height.saturating_sub(4).max(8));
        let inner = popup_frame(f, rect, "Taskboard", ctx);
        let height = usize::from(inner.height.saturating_sub(1)).max(1);
        self.offset = scroll_to(self.cursor, self.offset, height);

        let mut lines: Vec<Line<'_>> = Vec::new();
        if self.items.is_empty() {
            lines.push(Line::styled(EMPTY_TASKBOARD, ctx.styles.muted));
        }
        let width = usize::from(inner.width);
        for (i, item) in self.items.iter().enumerate().skip(self.offset).take(height) {
            match item {
                TaskboardItem::Section(s) => lines.push(Line::from(vec![
                    Span::styled(s.label.clone(), ctx.styles.title),
                    Span::styled(format!("  {} open, {} done", s.open, s.done), ctx.styles.muted),
                ])),
                TaskboardItem::Task { task, .. } => {
                    let mark = if task.checked { "[x]" } else { "[ ]" };
                    let text = format!("  {mark} {}", task.text);
                    if i == self.cursor {
                        let pad = width.saturating_sub(text.chars().count());
                        lines.push(Line::styled(format!("{text}{}", " ".repeat(pad)), ctx.styles.selected));
                    } else if task.checked {
                        lines.push(Line::styled(
                            text,
                            ctx.styles.muted.add_modifier(Modifier::CROSSED_OUT),
                        ));
                    } else {
                        lines.push(Line::styled(text, ctx.styles.text));
                    }
                }
            }
        }
        while lines.len() < height {
            lines.push(Line::default());
        }
        lines.push(Line::styled(
            "j/k move · Space toggle · a add task · Esc close",
            ctx.styles.muted,
        ));
        f.render_widget(Paragraph::new(lines), inner);
    }

    fn kind(&self) -> ScreenKind {
        ScreenKind::Taskboard
    }
}
