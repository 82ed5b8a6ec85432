#![forbid(unsafe_code)]

//! Click-to-focus, click-to-select and wheel scrolling over the main view.

use crossterm::event::{MouseButton, MouseEvent, MouseEventKind};

use crate::tui::layout::Pane;
use crate::tui::model::{Cmd, Model};

const WHEEL_LINES: usize = 3;

/// Routes a mouse event to the top screen or the pane under the pointer.
pub fn handle(model: &mut Model, ev: MouseEvent) -> Vec<Cmd> {
    if !model.screens.is_empty() {
        return match model.screens.handle_mouse(ev) {
            Some(msg) => model.update(msg),
            None => Vec::new(),
        };
    }
    let Some(pane) = model.dims.pane_at(ev.column, ev.row) else {
        return Vec::new();
    };
    match ev.kind {
        MouseEventKind::Down(MouseButton::Left) => click(model, pane, ev.row),
        MouseEventKind::ScrollUp => wheel(model, pane, false),
        MouseEventKind::ScrollDown => wheel(model, pane, true),
        _ => Vec::new(),
    }
}

/// Row inside the pane's content area, if the click hit one.
fn content_row(model: &Model, pane: Pane, y: u16) -> Option<usize> {
    let rect = model.dims.pane(pane)?;
    let top = rect.y + 1;
    let bottom = rect.y + rect.height.saturating_sub(1);
    (y >= top && y < bottom).then(|| usize::from(y - top))
}

fn click(model: &mut Model, pane: Pane, y: u16) -> Vec<Cmd> {
    let mut cmds = if model.focus == pane {
        Vec::new()
    } else {
        model.set_focus(pane)
    };
    let Some(row) = content_row(model, pane, y) else {
        return cmds;
    };
    match pane {
        Pane::Worktrees => {
            // Row 0 is the column header.
            let Some(row) = row.checked_sub(1) else {
                return cmds;
            };
            let index = model.view.worktree_offset + row;
            if index < model.registry.visible_len() && index != model.registry.cursor() {
                model.registry.select_index(index);
                cmds.extend(model.on_selection_changed());
            }
        }
        Pane::GitStatus => {
            let index = model.view.status_offset + row;
            if index < model.status.flat().len() {
                model.status.set_index(index);
            }
        }
        Pane::Commit => {
            let index = model.view.log_offset + row;
            if index < model.visible_log().len() {
                model.log_cursor = index;
            }
        }
        Pane::Info | Pane::Notes => {}
    }
    cmds
}

fn wheel(model: &mut Model, pane: Pane, down: bool) -> Vec<Cmd> {
    let delta: isize = if down { 1 } else { -1 };
    match pane {
        Pane::Worktrees => {
            let before = model.registry.cursor();
            model.registry.move_selection(delta);
            if model.registry.cursor() != before {
                return model.on_selection_changed();
            }
        }
        Pane::GitStatus => model.status.move_cursor(delta),
        Pane::Commit => {
            let len = model.visible_log().len();
            model.log_cursor = model
                .log_cursor
                .saturating_add_signed(delta)
                .min(len.saturating_sub(1));
        }
        Pane::Info => scroll(&mut model.view.info_scroll, down),
        Pane::Notes => scroll(&mut model.view.notes_scroll, down),
    }
    Vec::new()
}

fn scroll(offset: &mut usize, down: bool) {
    *offset = if down {
        offset.saturating_add(WHEEL_LINES)
    } else {
        offset.saturating_sub(WHEEL_LINES)
    };
}

#[cfg(test)]
mod tests {
    use crossterm::event::KeyModifiers;

    use super::*;
    use crate::tui::layout::compute;
    use crate::tui::model::tests::{four, model_with};

    fn event(kind: MouseEventKind, column: u16, row: u16) -> MouseEvent {
        MouseEvent {
            kind,
            column,
            row,
            modifiers: KeyModifiers::NONE,
        }
    }

    fn click_at(m: &mut Model, x: u16, y: u16) {
        handle(m, event(MouseEventKind::Down(MouseButton::Left), x, y));
    }

    fn laid_out() -> Model {
        let mut m = model_with(four());
        m.width = 120;
        m.height = 30;
        m.dims = compute(&m.layout_input());
        m
    }

    #[test]
    fn click_selects_worktree_row() {
        let mut m = laid_out();
        let rect = m.dims.worktrees.expect("worktrees pane");
        // Border, header, then rows: the third row is /w/beta.
        click_at(&mut m, rect.x + 2, rect.y + 4);
        assert_eq!(m.selected_path().as_deref(), Some("/w/beta"));
    }

    #[test]
    fn click_on_info_moves_focus() {
        let mut m = laid_out();
        let rect = m.dims.info.expect("info pane");
        click_at(&mut m, rect.x + 2, rect.y + 1);
        assert_eq!(m.focus, Pane::Info);
    }

    #[test]
    fn wheel_scrolls_info_by_three() {
        let mut m = laid_out();
        let rect = m.dims.info.expect("info pane");
        handle(&mut m, event(MouseEventKind::ScrollDown, rect.x + 2, rect.y + 2));
        assert_eq!(m.view.info_scroll, 3);
        handle(&mut m, event(MouseEventKind::ScrollUp, rect.x + 2, rect.y + 2));
        assert_eq!(m.view.info_scroll, 0);
    }
}
