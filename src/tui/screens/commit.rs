#![forbid(unsafe_code)]

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::Style;
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;

use super::{Outcome, ScreenKind, ScreenView, popup_frame};
use crate::core::models::CommitMeta;
use crate::tui::model::Msg;
use crate::tui::render::Ctx;

const WHEEL_STEP: usize = 3;

/// `git show` metadata plus patch in a scrollable viewport.
#[derive(Debug)]
pub struct CommitScreen {
    meta: CommitMeta,
    diff: Vec<String>,
    worktree_path: String,
    scroll: usize,
    height: usize,
}

impl CommitScreen {
    #[must_use]
    pub fn new(meta: CommitMeta, diff: &str, worktree_path: &str) -> Self {
        Self {
            meta,
            diff: diff.lines().map(str::to_owned).collect(),
            worktree_path: worktree_path.to_owned(),
            scroll: 0,
            height: 1,
        }
    }

    #[must_use]
    pub fn scroll(&self) -> usize {
        self.scroll
    }

    fn header_len(&self) -> usize {
        // sha, author, date, blank, subject, body..., blank
        5 + self.meta.body.len() + 1
    }

    fn total(&self) -> usize {
        self.header_len() + self.diff.len()
    }

    fn scroll_by(&mut self, delta: isize) {
        let max = self.total().saturating_sub(self.height);
        self.scroll = self.scroll.saturating_add_signed(delta).min(max);
    }

    fn diff_style(line: &str, ctx: &Ctx<'_>) -> Style {
        if line.starts_with("+++") || line.starts_with("---") {
            ctx.styles.title
        } else if line.starts_with('+') {
            ctx.styles.success
        } else if line.starts_with('-') {
            ctx.styles.error
        } else if line.starts_with("@@") {
            ctx.styles.cyan
        } else if line.starts_with("diff ") {
            ctx.styles.accent
        } else {
            ctx.styles.text
        }
    }
}

impl ScreenView for CommitScreen {
    fn handle_key(&mut self, key: KeyEvent) -> Outcome {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let half = isize::try_from(self.height / 2).unwrap_or(1).max(1);
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => return Outcome::Close,
            KeyCode::Char('j') | KeyCode::Down => self.scroll_by(1),
            KeyCode::Char('k') | KeyCode::Up => self.scroll_by(-1),
            KeyCode::Char('d') if ctrl => self.scroll_by(half),
            KeyCode::Char('u') if ctrl => self.scroll_by(-half),
            KeyCode::PageDown | KeyCode::Char(' ') => self.scroll_by(half * 2),
            KeyCode::PageUp => self.scroll_by(-half * 2),
            KeyCode::Char('g') | KeyCode::Home => self.scroll = 0,
            KeyCode::Char('G') | KeyCode::End => self.scroll_by(isize::MAX),
            KeyCode::Char('d') => {
                return Outcome::Emit(Msg::ShowCommitDiff {
                    path: self.worktree_path.clone(),
                    sha: self.meta.sha.clone(),
                });
            }
            KeyCode::Char('y') => return Outcome::Emit(Msg::CopyText(self.meta.sha.clone())),
            _ => {}
        }
        Outcome::Handled
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) -> Outcome {
        let step = isize::try_from(WHEEL_STEP).unwrap_or(3);
        match mouse.kind {
            MouseEventKind::ScrollDown => self.scroll_by(step),
            MouseEventKind::ScrollUp => self.scroll_by(-step),
            _ => return Outcome::Ignored,
        }
        Outcome::Handled
    }

    fn render(&mut self, f: &mut Frame<'_>, area: Rect, ctx: &Ctx<'_>) {
        let rect = Rect {
            x: area.x + 2,
            y: area.y + 1,
            width: area.width.saturating_sub(4),
            height: area.height.saturating_sub(2),
        };
        let short: String = self.meta.sha.chars().take(12).collect();
        let inner = popup_frame(f, rect, &format!("Commit {short}"), ctx);
        self.height = usize::from(inner.height.saturating_sub(1)).max(1);
        self.scroll = self.scroll.min(self.total().saturating_sub(self.height));

        let label = |k: &str| Span::styled(format!("{k:<8}"), ctx.styles.cyan);
        let mut lines: Vec<Line<'_>> = vec![
            Line::from(vec![label("Commit"), Span::styled(self.meta.sha.clone(), ctx.styles.accent)]),
            Line::from(vec![
                label("Author"),
                Span::styled(format!("{} <{}>", self.meta.author, self.meta.email), ctx.styles.text),
            ]),
            Line::from(vec![label("Date"), Span::styled(self.meta.date.clone(), ctx.styles.text)]),
            Line::default(),
            Line::styled(format!("    {}", self.meta.subject), ctx.styles.title),
        ];
        lines.extend(
            self.meta
                .body
                .iter()
                .map(|b| Line::styled(format!("    {b}"), ctx.styles.text)),
        );
        lines.push(Line::default());
        lines.extend(
            self.diff
                .iter()
                .map(|l| Line::styled(l.clone(), Self::diff_style(l, ctx))),
        );
        let mut visible: Vec<Line<'_>> = lines
            .into_iter()
            .skip(self.scroll)
            .take(self.height)
            .collect();
        while visible.len() < self.height {
            visible.push(Line::default());
        }
        visible.push(Line::styled(
            "j/k scroll · Ctrl+d/u page · d diff in pager · y copy SHA · Esc close",
            ctx.styles.muted,
        ));
        f.render_widget(Paragraph::new(visible), inner);
    }

    fn kind(&self) -> ScreenKind {
        ScreenKind::Commit
    }
}

#[cfg(test)]
mod tests {
    use crossterm::event::KeyModifiers;

    use super::*;

    fn screen() -> CommitScreen {
        let meta = CommitMeta {
            sha: "abc123".to_owned(),
            subject: "Add feature".to_owned(),
            ..CommitMeta::default()
        };
        let diff: String = (0..100).map(|i| format!("+line {i}\n")).collect();
        CommitScreen::new(meta, &diff, "/w/a")
    }

    #[test]
    fn wheel_scrolls_and_clamps() {
        let mut s = screen();
        s.height = 10;
        let wheel = |kind| MouseEvent {
            kind,
            column: 0,
            row: 0,
            modifiers: KeyModifiers::NONE,
        };
        s.handle_mouse(wheel(MouseEventKind::ScrollDown));
        assert_eq!(s.scroll(), 3);
        s.handle_mouse(wheel(MouseEventKind::ScrollUp));
        s.handle_mouse(wheel(MouseEventKind::ScrollUp));
        assert_eq!(s.scroll(), 0);
        s.handle_key(KeyEvent::new(KeyCode::Char('G'), KeyModifiers::NONE));
        assert_eq!(s.scroll(), s.total() - 10);
    }

    #[test]
    fn d_requests_pager_diff() {
        let mut s = screen();
        match s.handle_key(KeyEvent::new(KeyCode::Char('d'), KeyModifiers::NONE)) {
            Outcome::Emit(Msg::ShowCommitDiff { sha, path }) => {
                assert_eq!(sha, "abc123");
                assert_eq!(path, "/w/a");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
