#![forbid(unsafe_code)]

pub mod app;
pub mod executor;
pub mod info;
pub mod keys;
pub mod layout;
pub mod markdown;
pub mod model;
pub mod mouse;
pub mod ops;
pub mod render;
pub mod screens;
pub mod text_input;
pub mod theme;
pub mod watcher;

use std::io::{self, IsTerminal as _, Write};

use crossterm::cursor::{MoveTo, RestorePosition, SavePosition};
use crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use crossterm::style::{
    Attribute, Color as TermColor, Print, ResetColor, SetAttribute, SetBackgroundColor,
    SetForegroundColor,
};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use crossterm::{execute, queue};
use ratatui::backend::CrosstermBackend;
use ratatui::style::{Color, Modifier};

use crate::error::LazywtError;
use crate::tui::markdown::{ScreenLink, osc8};
use crate::tui::model::Model;

pub type Tui = ratatui::Terminal<CrosstermBackend<io::Stdout>>;

#[must_use]
pub fn is_tty() -> bool {
    io::stdout().is_terminal()
}

fn failed(what: &'static str) -> impl Fn(io::Error) -> LazywtError {
    move |e| LazywtError::Other(format!("failed to {what}: {e}"))
}

/// Raw mode, alternate screen and mouse capture.
pub fn init_terminal() -> Result<Tui, LazywtError> {
    enable_raw_mode().map_err(failed("enable raw mode"))?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)
        .map_err(failed("enter alt screen"))?;
    ratatui::Terminal::new(CrosstermBackend::new(stdout)).map_err(failed("create terminal"))
}

pub fn restore_terminal(mut terminal: Tui) -> Result<(), LazywtError> {
    disable_raw_mode().map_err(failed("disable raw mode"))?;
    execute!(terminal.backend_mut(), DisableMouseCapture, LeaveAlternateScreen)
        .map_err(failed("leave alt screen"))?;
    terminal.show_cursor().map_err(failed("show cursor"))
}

/// Owns the terminal while the UI runs and gives it back on drop.
pub struct TerminalGuard {
    terminal: Option<Tui>,
}

impl TerminalGuard {
    pub fn enter() -> Result<Self, LazywtError> {
        Ok(Self {
            terminal: Some(init_terminal()?),
        })
    }

    /// Draws one frame, then re-emits the note links it showed as OSC 8.
    pub fn draw(&mut self, model: &mut Model) -> anyhow::Result<()> {
        let Some(terminal) = self.terminal.as_mut() else {
            anyhow::bail!("terminal unavailable");
        };
        terminal.draw(|f| render::draw(f, model))?;
        if !model.links.is_empty() {
            write_links(terminal.backend_mut(), &model.links)?;
        }
        Ok(())
    }

    /// Leaves the alternate screen for `f`, then restores it.
    pub fn suspended<T>(&mut self, f: impl FnOnce() -> T) -> anyhow::Result<T> {
        if let Some(term) = self.terminal.take() {
            restore_terminal(term)?;
        }
        let out = f();
        let mut terminal = init_terminal()?;
        terminal.clear()?;
        self.terminal = Some(terminal);
        Ok(out)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if let Some(terminal) = self.terminal.take() {
            let _ = restore_terminal(terminal);
        }
    }
}

/// Reprints each link label over its cells, wrapped in an OSC 8 hyperlink.
/// The cursor is left where the frame put it.
pub fn write_links(out: &mut impl Write, links: &[ScreenLink]) -> io::Result<()> {
    queue!(out, SavePosition)?;
    for link in links {
        queue!(out, MoveTo(link.x, link.y))?;
        if let Some(fg) = link.style.fg.and_then(term_color) {
            queue!(out, SetForegroundColor(fg))?;
        }
        if let Some(bg) = link.style.bg.and_then(term_color) {
            queue!(out, SetBackgroundColor(bg))?;
        }
        if link.style.add_modifier.contains(Modifier::UNDERLINED) {
            queue!(out, SetAttribute(Attribute::Underlined))?;
        }
        if link.style.add_modifier.contains(Modifier::BOLD) {
            queue!(out, SetAttribute(Attribute::Bold))?;
        }
        queue!(
            out,
            Print(osc8(&link.label, &link.url)),
            SetAttribute(Attribute::Reset),
            ResetColor
        )?;
    }
    queue!(out, RestorePosition)?;
    out.flush()
}

fn term_color(color: Color) -> Option<TermColor> {
    let c = match color {
        Color::Reset => return None,
        Color::Black => TermColor::Black,
        Color::Red => TermColor::DarkRed,
        Color::Green => TermColor::DarkGreen,
        Color::Yellow => TermColor::DarkYellow,
        Color::Blue => TermColor::DarkBlue,
        Color::Magenta => TermColor::DarkMagenta,
        Color::Cyan => TermColor::DarkCyan,
        Color::Gray => TermColor::Grey,
        Color::DarkGray => TermColor::DarkGrey,
        Color::LightRed => TermColor::Red,
        Color::LightGreen => TermColor::Green,
        Color::LightYellow => TermColor::Yellow,
        Color::LightBlue => TermColor::Blue,
        Color::LightMagenta => TermColor::Magenta,
        Color::LightCyan => TermColor::Cyan,
        Color::White => TermColor::White,
        Color::Rgb(r, g, b) => TermColor::Rgb { r, g, b },
        Color::Indexed(i) => TermColor::AnsiValue(i),
    };
    Some(c)
}

#[cfg(test)]
mod tests {
    use ratatui::style::Style;

    use super::*;

    #[test]
    fn links_are_written_as_osc8_at_their_cells() {
        let link = ScreenLink {
            x: 4,
            y: 2,
            label: "docs".to_owned(),
            url: "https://example.com".to_owned(),
            style: Style::default()
                .fg(Color::Rgb(1, 2, 3))
                .add_modifier(Modifier::UNDERLINED),
        };
        let mut out = Vec::new();
        write_links(&mut out, &[link]).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("\x1b[3;5H"));
        assert!(text.contains("\x1b]8;;https://example.com\x1b\\docs\x1b]8;;\x1b\\"));
        assert!(text.contains("\x1b[38;2;1;2;3m"));
        assert!(text.contains("\x1b[4m"));
        assert!(text.starts_with("\x1b7") && text.ends_with("\x1b8"));
    }

    #[test]
    fn reset_color_is_left_to_the_terminal() {
        assert_eq!(term_color(Color::Reset), None);
        assert_eq!(term_color(Color::Indexed(42)), Some(TermColor::AnsiValue(42)));
        assert_eq!(term_color(Color::LightCyan), Some(TermColor::Cyan));
    }
}
