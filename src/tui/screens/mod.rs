#![forbid(unsafe_code)]

//! Modal screens stacked over the main view.

pub mod checklist;
pub mod commit;
pub mod confirm;
pub mod help;
pub mod info;
pub mod input;
pub mod list;
pub mod loading;
pub mod note_editor;
pub mod palette;
pub mod taskboard;
pub mod trust;

use crossterm::event::{KeyEvent, MouseEvent};
use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::text::Line;
use ratatui::widgets::{Block, BorderType, Borders, Clear};
use tracing::debug;

use crate::tui::model::Msg;
use crate::tui::render::Ctx;

pub use checklist::{ChecklistAction, ChecklistItem, ChecklistScreen};
pub use commit::CommitScreen;
pub use confirm::ConfirmScreen;
pub use help::HelpScreen;
pub use info::InfoScreen;
pub use input::{InputAction, InputScreen};
pub use list::{ListAction, ListItem, ListScreen};
pub use loading::LoadingScreen;
pub use note_editor::NoteEditorScreen;
pub use palette::{PaletteItem, PaletteScreen};
pub use taskboard::TaskboardScreen;
pub use trust::{TrustChoice, TrustScreen};

/// What a screen did with an event.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Not for this screen.
    Ignored,
    Handled,
    Close,
    /// Close, then deliver the message.
    CloseWith(Msg),
    /// Stay open and deliver the message.
    Emit(Msg),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenKind {
    Confirm,
    Input,
    List,
    Help,
    Commit,
    Taskboard,
    Trust,
    Info,
    Loading,
    Checklist,
    Palette,
    NoteEditor,
}

/// Behaviour every screen variant provides.
pub trait ScreenView {
    fn handle_key(&mut self, key: KeyEvent) -> Outcome;

    fn handle_mouse(&mut self, _mouse: MouseEvent) -> Outcome {
        Outcome::Ignored
    }

    fn render(&mut self, f: &mut Frame<'_>, area: Rect, ctx: &Ctx<'_>);

    fn kind(&self) -> ScreenKind;
}

#[derive(Debug)]
pub enum Screen {
    Confirm(ConfirmScreen),
    Input(InputScreen),
    List(ListScreen),
    Help(HelpScreen),
    Commit(CommitScreen),
    Taskboard(TaskboardScreen),
    Trust(TrustScreen),
    Info(InfoScreen),
    Loading(LoadingScreen),
    Checklist(ChecklistScreen),
    Palette(PaletteScreen),
    NoteEditor(NoteEditorScreen),
}

impl Screen {
    fn view(&mut self) -> &mut dyn ScreenView {
        match self {
            Self::Confirm(s) => s,
            Self::Input(s) => s,
            Self::List(s) => s,
            Self::Help(s) => s,
            Self::Commit(s) => s,
            Self::Taskboard(s) => s,
            Self::Trust(s) => s,
            Self::Info(s) => s,
            Self::Loading(s) => s,
            Self::Checklist(s) => s,
            Self::Palette(s) => s,
            Self::NoteEditor(s) => s,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ScreenKind {
        match self {
            Self::Confirm(_) => ScreenKind::Confirm,
            Self::Input(_) => ScreenKind::Input,
            Self::List(_) => ScreenKind::List,
            Self::Help(_) => ScreenKind::Help,
            Self::Commit(_) => ScreenKind::Commit,
            Self::Taskboard(_) => ScreenKind::Taskboard,
            Self::Trust(_) => ScreenKind::Trust,
            Self::Info(_) => ScreenKind::Info,
            Self::Loading(_) => ScreenKind::Loading,
            Self::Checklist(_) => ScreenKind::Checklist,
            Self::Palette(_) => ScreenKind::Palette,
            Self::NoteEditor(_) => ScreenKind::NoteEditor,
        }
    }

    pub fn render(&mut self, f: &mut Frame<'_>, area: Rect, ctx: &Ctx<'_>) {
        self.view().render(f, area, ctx);
    }
}

/// LIFO of modal screens; an empty stack means the main view has input.
#[derive(Debug, Default)]
pub struct ScreenStack {
    screens: Vec<Screen>,
}

impl ScreenStack {
    pub fn push(&mut self, screen: Screen) {
        debug!(kind = ?screen.kind(), depth = self.screens.len() + 1, "push screen");
        self.screens.push(screen);
    }

    pub fn pop(&mut self) -> Option<Screen> {
        let popped = self.screens.pop();
        if let Some(s) = &popped {
            debug!(kind = ?s.kind(), depth = self.screens.len(), "pop screen");
        }
        popped
    }

    pub fn clear(&mut self) {
        self.screens.clear();
    }

    /// Swaps the top screen, or pushes when the stack is empty.
    pub fn replace(&mut self, screen: Screen) {
        self.screens.pop();
        self.push(screen);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.screens.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.screens.len()
    }

    #[must_use]
    pub fn top(&self) -> Option<&Screen> {
        self.screens.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut Screen> {
        self.screens.last_mut()
    }

    #[must_use]
    pub fn top_kind(&self) -> Option<ScreenKind> {
        self.top().map(Screen::kind)
    }

    /// Removes every screen of `kind`.
    pub fn remove_kind(&mut self, kind: ScreenKind) {
        self.screens.retain(|s| s.kind() != kind);
    }

    /// Routes a key to the top screen and applies its outcome.
    pub fn handle_key(&mut self, key: KeyEvent) -> Option<Msg> {
        let outcome = self.screens.last_mut()?.view().handle_key(key);
        self.apply(outcome)
    }

    /// Only the commit screen consumes mouse events.
    pub fn handle_mouse(&mut self, mouse: MouseEvent) -> Option<Msg> {
        let outcome = self.screens.last_mut()?.view().handle_mouse(mouse);
        self.apply(outcome)
    }

    fn apply(&mut self, outcome: Outcome) -> Option<Msg> {
        match outcome {
            Outcome::Ignored | Outcome::Handled => None,
            Outcome::Close => {
                self.pop();
                None
            }
            Outcome::CloseWith(msg) => {
                self.pop();
                Some(msg)
            }
            Outcome::Emit(msg) => Some(msg),
        }
    }

    /// Renders bottom to top so the newest screen is drawn last.
    pub fn render(&mut self, f: &mut Frame<'_>, area: Rect, ctx: &Ctx<'_>) {
        for screen in &mut self.screens {
            screen.render(f, area, ctx);
        }
    }
}

/// Rect of at most `w`×`h` centered in `area`.
#[must_use]
pub fn centered(area: Rect, w: u16, h: u16) -> Rect {
    let w = w.min(area.width);
    let h = h.min(area.height);
    Rect {
        x: area.x + (area.width - w) / 2,
        y: area.y + (area.height - h) / 2,
        width: w,
        height: h,
    }
}

/// Clears `area` and draws the popup frame; returns the inner rect.
pub fn popup_frame(f: &mut Frame<'_>, area: Rect, title: &str, ctx: &Ctx<'_>) -> Rect {
    f.render_widget(Clear, area);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(ctx.styles.border_focused)
        .title(Line::styled(format!(" {title} "), ctx.styles.title));
    let inner = block.inner(area);
    f.render_widget(block, area);
    inner
}

/// Keeps `cursor` visible in a window of `height` rows starting at `offset`.
#[must_use]
pub fn scroll_to(cursor: usize, offset: usize, height: usize) -> usize {
    let height = height.max(1);
    if cursor < offset {
        cursor
    } else if cursor >= offset + height {
        cursor + 1 - height
    } else {
        offset
    }
}

#[cfg(test)]
mod tests {
    use crossterm::event::{KeyCode, KeyModifiers};

    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn push_then_pop_is_identity() {
        let mut stack = ScreenStack::default();
        stack.push(Screen::Info(InfoScreen::new("one")));
        stack.push(Screen::Info(InfoScreen::new("two")));
        assert_eq!(stack.len(), 2);
        stack.pop();
        assert_eq!(stack.len(), 1);
        stack.clear();
        assert!(stack.is_empty());
        assert!(stack.pop().is_none());
    }

    #[test]
    fn replace_swaps_top_only() {
        let mut stack = ScreenStack::default();
        stack.push(Screen::Info(InfoScreen::new("base")));
        stack.push(Screen::Loading(LoadingScreen::new("Loading")));
        stack.replace(Screen::Info(InfoScreen::new("done")));
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.top_kind(), Some(ScreenKind::Info));
    }

    #[test]
    fn esc_on_info_closes_it() {
        let mut stack = ScreenStack::default();
        stack.push(Screen::Info(InfoScreen::new("hello")));
        assert!(stack.handle_key(key(KeyCode::Esc)).is_none());
        assert!(stack.is_empty());
    }

    #[test]
    fn scroll_window_follows_cursor() {
        assert_eq!(scroll_to(0, 3, 5), 0);
        assert_eq!(scroll_to(9, 0, 5), 5);
        assert_eq!(scroll_to(4, 2, 5), 2);
    }
}
