#![forbid(unsafe_code)]

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::Frame;
use ratatui::layout::{Position, Rect};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;

use super::{Outcome, ScreenKind, ScreenView, centered, popup_frame};
use crate::tui::model::Msg;
use crate::tui::ops::NoteSeed;
use crate::tui::render::Ctx;
use crate::tui::text_input::{TextInput, cursor_x_for_text};

/// What the submitted value is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    CreateBranch {
        base: Option<String>,
        source_path: Option<String>,
        note: Option<NoteSeed>,
    },
    Rename {
        path: String,
    },
    Commit {
        path: String,
    },
    RunCommand {
        path: String,
    },
    UpstreamRef {
        path: String,
        branch: String,
        /// Pull before the `-u` push.
        sync: bool,
    },
    AddTask {
        path: String,
    },
}

pub type Validator = fn(&str) -> Result<(), String>;

#[derive(Debug, Clone)]
struct Checkbox {
    label: String,
    checked: bool,
    emit_on_toggle: bool,
}

/// Single-line prompt with an optional checkbox and validator.
#[derive(Debug)]
pub struct InputScreen {
    title: String,
    prompt: String,
    input: TextInput,
    action: InputAction,
    checkbox: Option<Checkbox>,
    validator: Option<Validator>,
    error: Option<String>,
    history: Vec<String>,
    history_pos: Option<usize>,
}

impl InputScreen {
    pub fn new(title: impl Into<String>, prompt: impl Into<String>, action: InputAction) -> Self {
        Self {
            title: title.into(),
            prompt: prompt.into(),
            input: TextInput::default(),
            action,
            checkbox: None,
            validator: None,
            error: None,
            history: Vec::new(),
            history_pos: None,
        }
    }

    #[must_use]
    pub fn value(mut self, initial: &str) -> Self {
        self.input.set(initial);
        self
    }

    /// Adds a checkbox toggled with Tab; `emit` reports toggles to the model.
    #[must_use]
    pub fn checkbox(mut self, label: &str, checked: bool, emit: bool) -> Self {
        self.checkbox = Some(Checkbox {
            label: label.to_owned(),
            checked,
            emit_on_toggle: emit,
        });
        self
    }

    #[must_use]
    pub fn validator(mut self, v: Validator) -> Self {
        self.validator = Some(v);
        self
    }

    /// Most recent first; Up/Down walk it.
    #[must_use]
    pub fn history(mut self, history: Vec<String>) -> Self {
        self.history = history;
        self
    }

    #[must_use]
    pub fn action(&self) -> &InputAction {
        &self.action
    }

    #[must_use]
    pub fn text(&self) -> &str {
        self.input.as_str()
    }

    pub fn set_text(&mut self, text: &str) {
        self.input.set(text);
        self.error = None;
    }

    fn checked(&self) -> bool {
        self.checkbox.as_ref().is_some_and(|c| c.checked)
    }

    fn submit(&mut self) -> Outcome {
        let value = self.input.as_str().trim().to_owned();
        if let Some(validate) = self.validator
            && let Err(e) = validate(&value)
        {
            self.error = Some(e);
            return Outcome::Handled;
        }
        Outcome::CloseWith(Msg::InputSubmitted {
            action: self.action.clone(),
            value,
            checked: self.checked(),
        })
    }

    fn walk_history(&mut self, older: bool) {
        if self.history.is_empty() {
            return;
        }
        let next = match (self.history_pos, older) {
            (None, true) => Some(0),
            (None, false) => None,
            (Some(i), true) => Some((i + 1).min(self.history.len() - 1)),
            (Some(0), false) => None,
            (Some(i), false) => Some(i - 1),
        };
        self.history_pos = next;
        match next {
            Some(i) => self.input.set(self.history[i].clone()),
            None => self.input.clear(),
        }
    }
}

impl ScreenView for InputScreen {
    fn handle_key(&mut self, key: KeyEvent) -> Outcome {
        match key.code {
            KeyCode::Esc => Outcome::Close,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Outcome::Close,
            KeyCode::Enter => self.submit(),
            KeyCode::Tab => {
                let Some(cb) = self.checkbox.as_mut() else {
                    return Outcome::Handled;
                };
                cb.checked = !cb.checked;
                if cb.emit_on_toggle {
                    Outcome::Emit(Msg::InputCheckboxToggled {
                        action: self.action.clone(),
                        checked: cb.checked,
                    })
                } else {
                    Outcome::Handled
                }
            }
            KeyCode::Up => {
                self.walk_history(true);
                Outcome::Handled
            }
            KeyCode::Down => {
                self.walk_history(false);
                Outcome::Handled
            }
            _ => {
                if self.input.handle_key(key) {
                    self.error = None;
                }
                Outcome::Handled
            }
        }
    }

    fn render(&mut self, f: &mut Frame<'_>, area: Rect, ctx: &Ctx<'_>) {
        let height = 6 + u16::from(self.checkbox.is_some()) + u16::from(self.error.is_some());
        let rect = centered(area, 70, height);
        let inner = popup_frame(f, rect, &self.title, ctx);

        let mut lines = vec![
            Line::styled(self.prompt.clone(), ctx.styles.muted),
            Line::from(vec![
                Span::styled("> ", ctx.styles.accent),
                Span::styled(self.input.as_str().to_owned(), ctx.styles.text),
            ]),
        ];
        if let Some(cb) = &self.checkbox {
            let mark = if cb.checked { "[x]" } else { "[ ]" };
            lines.push(Line::from(vec![
                Span::styled(format!("{mark} "), ctx.styles.accent),
                Span::styled(cb.label.clone(), ctx.styles.text),
                Span::styled("  (Tab)", ctx.styles.muted),
            ]));
        }
        if let Some(err) = &self.error {
            lines.push(Line::styled(err.clone(), ctx.styles.error));
        }
        lines.push(Line::styled("Enter submit · Esc cancel", ctx.styles.muted));
        f.render_widget(Paragraph::new(lines), inner);

        let x = inner.x + 2 + cursor_x_for_text(self.input.as_str(), self.input.cursor());
        if x < inner.x + inner.width {
            f.set_cursor_position(Position::new(x, inner.y + 1));
        }
    }

    fn kind(&self) -> ScreenKind {
        ScreenKind::Input
    }
}

/// Branch names: non-empty, no whitespace, none of git's forbidden characters.
pub fn validate_branch_name(value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err("Name cannot be empty".to_owned());
    }
    if value.chars().any(|c| c.is_whitespace() || "~^:?*[\\".contains(c))
        || value.contains("..")
        || value.starts_with('-')
        || value.ends_with('/')
        || value.ends_with(".lock")
    {
        return Err(format!("Invalid branch name: {value}"));
    }
    Ok(())
}

pub fn validate_non_empty(value: &str) -> Result<(), String> {
    if value.is_empty() {
        Err("Value cannot be empty".to_owned())
    } else {
        Ok(())
    }
}
