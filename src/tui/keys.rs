#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::config::CustomCommand;
use crate::tui::layout::Pane;
use crate::tui::ops::Action;

/// Text form of a key as used in `custom_commands` (`x`, `ctrl+x`, `alt+x`).
#[must_use]
pub fn key_string(key: &KeyEvent) -> Option<String> {
    let base = match key.code {
        KeyCode::Char(c) => c.to_string(),
        KeyCode::F(n) => format!("f{n}"),
        KeyCode::Enter => "enter".to_owned(),
        KeyCode::Tab => "tab".to_owned(),
        _ => return None,
    };
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        Some(format!("ctrl+{base}"))
    } else if key.modifiers.contains(KeyModifiers::ALT) {
        Some(format!("alt+{base}"))
    } else {
        Some(base)
    }
}

/// Resolves a main-view key. Custom commands shadow built-ins.
#[must_use]
pub fn resolve(
    key: &KeyEvent,
    focus: Pane,
    custom: &BTreeMap<String, CustomCommand>,
) -> Option<Action> {
    if let Some(name) = key_string(key)
        && custom.contains_key(&name)
    {
        return Some(Action::Custom(name));
    }

    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let alt = key.modifiers.contains(KeyModifiers::ALT);
    if ctrl {
        return match key.code {
            KeyCode::Char('c') => Some(Action::Quit),
            KeyCode::Char('p') => Some(Action::Palette),
            KeyCode::Char('d') => Some(Action::HalfPageDown),
            KeyCode::Char('u') => Some(Action::HalfPageUp),
            KeyCode::Char('j') => Some(Action::NextItemDiff),
            KeyCode::Char('k') => Some(Action::PrevItemDiff),
            KeyCode::Char('v') => Some(Action::CiLogs),
            _ => None,
        };
    }
    if alt {
        return match key.code {
            KeyCode::Char('n') => Some(Action::FilterStepNext),
            KeyCode::Char('p') => Some(Action::FilterStepPrev),
            _ => None,
        };
    }

    let action = match key.code {
        KeyCode::Char('q') => Action::Quit,
        KeyCode::Char(c @ '1'..='5') => Action::FocusPane(c as u8 - b'0'),
        KeyCode::Tab | KeyCode::Char(']') => Action::NextPane,
        KeyCode::BackTab | KeyCode::Char('[') => Action::PrevPane,
        KeyCode::Char('h') | KeyCode::Left => Action::PaneLeft,
        KeyCode::Char('l') | KeyCode::Right => Action::PaneRight,
        KeyCode::Char('j') | KeyCode::Down => Action::MoveDown,
        KeyCode::Char('k') | KeyCode::Up => Action::MoveUp,
        KeyCode::PageDown => Action::HalfPageDown,
        KeyCode::PageUp => Action::HalfPageUp,
        KeyCode::Char('G') | KeyCode::End => Action::Bottom,
        KeyCode::Enter => Action::Activate,
        KeyCode::Char('=') => Action::ToggleZoom,
        KeyCode::Char('L') => Action::ToggleLayout,
        KeyCode::Char('f') => Action::Filter,
        KeyCode::Char('/') => Action::Search,
        KeyCode::Esc => Action::ClearFilter,
        KeyCode::Char(':') => Action::Palette,
        KeyCode::Char('?') => Action::Help,
        KeyCode::Char('r') => Action::Refresh,
        KeyCode::Char('R') => Action::FetchRemotes,
        KeyCode::Char('d') => Action::Diff,
        KeyCode::Char('P') => Action::Push,
        KeyCode::Char('S') => Action::Sync,
        KeyCode::Char('o') => Action::OpenPr,
        KeyCode::Char('m') => Action::Rename,
        KeyCode::Char('A') => Action::Absorb,
        KeyCode::Char('X') => Action::Prune,
        KeyCode::Char('i') => Action::Annotate,
        KeyCode::Char('T') => Action::Taskboard,
        KeyCode::Char('g') => Action::Lazygit,
        KeyCode::Char('!') => Action::RunCommand,
        KeyCode::Char('y') => Action::CopyPath,
        KeyCode::Char('Y') => Action::CopyBranch,
        KeyCode::Char('v') => Action::ChooseCiCheck,
        KeyCode::Char('N') => Action::SearchPrev,
        KeyCode::Char('n') if focus == Pane::Info => Action::NextCiCheck,
        KeyCode::Char('n') => Action::SearchNext,
        KeyCode::Char('p') if focus == Pane::Info => Action::PrevCiCheck,
        KeyCode::Char('p') => Action::FetchPrs,
        KeyCode::Char('s') if focus == Pane::GitStatus => Action::Stage,
        KeyCode::Char('s') => Action::CycleSort,
        KeyCode::Char('c') if focus == Pane::GitStatus => Action::Commit,
        KeyCode::Char('c') => Action::Create,
        KeyCode::Char('C') if focus == Pane::GitStatus => Action::CommitAll,
        KeyCode::Char('C') => Action::CherryPick,
        KeyCode::Char('D') if focus == Pane::GitStatus => Action::Discard,
        KeyCode::Char('D') => Action::Delete,
        KeyCode::Char('e') if focus == Pane::GitStatus => Action::EditFile,
        _ => return None,
    };
    Some(action)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn pane_specific_bindings() {
        let none = BTreeMap::new();
        let s = key(KeyCode::Char('s'));
        assert_eq!(resolve(&s, Pane::Worktrees, &none), Some(Action::CycleSort));
        assert_eq!(resolve(&s, Pane::GitStatus, &none), Some(Action::Stage));
        let n = key(KeyCode::Char('n'));
        assert_eq!(resolve(&n, Pane::Info, &none), Some(Action::NextCiCheck));
        assert_eq!(resolve(&n, Pane::Commit, &none), Some(Action::SearchNext));
    }

    #[test]
    fn custom_commands_shadow_builtins() {
        let custom = BTreeMap::from([(
            "s".to_owned(),
            CustomCommand {
                command: "make".to_owned(),
                ..CustomCommand::default()
            },
        )]);
        assert_eq!(
            resolve(&key(KeyCode::Char('s')), Pane::Worktrees, &custom),
            Some(Action::Custom("s".to_owned()))
        );
    }

    #[test]
    fn modifiers_are_spelled_out() {
        let k = KeyEvent::new(KeyCode::Char('n'), KeyModifiers::ALT);
        assert_eq!(key_string(&k).as_deref(), Some("alt+n"));
        assert_eq!(resolve(&k, Pane::Worktrees, &BTreeMap::new()), Some(Action::FilterStepNext));
        let k = KeyEvent::new(KeyCode::Char('p'), KeyModifiers::CONTROL);
        assert_eq!(resolve(&k, Pane::Worktrees, &BTreeMap::new()), Some(Action::Palette));
    }
}
