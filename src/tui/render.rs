#![forbid(unsafe_code)]

//! Frame composition: header, optional filter line, panes, footer, screens.

use ratatui::Frame;
use ratatui::layout::{Position, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, BorderType, Borders, Paragraph};

use crate::core::status_tree::FlatKind;
use crate::tui::info;
use crate::tui::layout::{self, COLUMN_SEPARATOR, Pane, inner_size, table_columns};
use crate::tui::markdown::{self, MarkdownStyles};
use crate::tui::model::{FilterTarget, InputMode, Model};
use crate::tui::screens::scroll_to;
use crate::tui::text_input::cursor_x_for_text;
use crate::tui::theme::{IconProvider, StyleCache};

pub const SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Styles and glyphs shared by every widget in a frame.
#[derive(Debug, Clone, Copy)]
pub struct Ctx<'a> {
    pub styles: &'a StyleCache,
    pub icons: IconProvider,
}

/// Cuts `s` to `width` columns, marking the cut with an ellipsis.
#[must_use]
pub fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_owned();
    }
    if width == 0 {
        return String::new();
    }
    let mut out: String = s.chars().take(width - 1).collect();
    out.push('…');
    out
}

fn pad(s: &str, width: usize) -> String {
    let t = truncate(s, width);
    let len = t.chars().count();
    format!("{t}{}", " ".repeat(width.saturating_sub(len)))
}

/// Draws one frame and records the layout and scroll offsets for mouse hits.
pub fn draw(f: &mut Frame<'_>, model: &mut Model) {
    let area = f.area();
    model.width = area.width;
    model.height = area.height;
    model.dims = layout::compute(&model.layout_input());
    model.links.clear();

    let styles = model.styles.clone();
    let ctx = Ctx {
        styles: &styles,
        icons: model.icons,
    };

    draw_header(f, model.dims.header, model, &ctx);
    if let Some(rect) = model.dims.filter {
        draw_filter(f, rect, model, &ctx);
    }
    for pane in Pane::ALL {
        if let Some(rect) = model.dims.pane(pane) {
            draw_pane(f, rect, pane, model, &ctx);
        }
    }
    draw_footer(f, model.dims.footer, model, &ctx);
    if model.screens.top().is_some() {
        // Overlays may cover the notes pane.
        model.links.clear();
    }
    model.screens.render(f, area, &ctx);
}

fn draw_header(f: &mut Frame<'_>, area: Rect, model: &Model, ctx: &Ctx<'_>) {
    let s = ctx.styles;
    let left = format!(" Lazyworktree  {}", model.repo_key);
    let right = format!("sort: {} ", model.registry.sort_mode().label());
    let gap = usize::from(area.width).saturating_sub(left.chars().count() + right.chars().count());
    let line = Line::from(vec![
        Span::styled(left, s.header),
        Span::styled(" ".repeat(gap), s.header),
        Span::styled(right, s.header.remove_modifier(Modifier::BOLD)),
    ]);
    f.render_widget(Paragraph::new(line), area);
}

fn draw_filter(f: &mut Frame<'_>, area: Rect, model: &Model, ctx: &Ctx<'_>) {
    let Some(input) = &model.input else {
        return;
    };
    let what = match input.target {
        FilterTarget::Worktrees => "worktrees",
        FilterTarget::Status => "files",
        FilterTarget::Log => "commits",
    };
    let prompt = match input.mode {
        InputMode::Filter => format!(" Filter {what}: "),
        InputMode::Search => format!(" Search {what}: "),
    };
    let x = area.x
        + u16::try_from(prompt.chars().count()).unwrap_or(0)
        + cursor_x_for_text(input.text.as_str(), input.text.cursor());
    f.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled(prompt, ctx.styles.key_hint),
            Span::styled(input.text.as_str().to_owned(), ctx.styles.text),
        ])),
        area,
    );
    f.set_cursor_position(Position::new(x.min(area.right().saturating_sub(1)), area.y));
}

fn pane_block<'a>(pane: Pane, model: &Model, ctx: &Ctx<'_>) -> Block<'a> {
    let s = ctx.styles;
    let focused = model.focus == pane;
    let title_style = if focused { s.header } else { s.title };
    let mut title = vec![Span::styled(format!(" {} {} ", pane.number(), pane.title()), title_style)];
    let filtered = match pane {
        Pane::Worktrees => !model.filter_query(FilterTarget::Worktrees).is_empty(),
        Pane::GitStatus => !model.filter_query(FilterTarget::Status).is_empty(),
        Pane::Commit => !model.filter_query(FilterTarget::Log).is_empty(),
        Pane::Info | Pane::Notes => false,
    };
    if filtered {
        title.push(Span::raw(" "));
        title.push(Span::styled(" Filtered ", s.badge));
        title.push(Span::styled(" Esc ", s.key_hint));
    }
    if model.zoom == Some(pane) {
        title.push(Span::raw(" "));
        title.push(Span::styled(" Zoomed ", s.badge));
        title.push(Span::styled(" = ", s.key_hint));
    }
    let block = Block::default()
        .borders(Borders::ALL)
        .title(Line::from(title));
    if focused {
        block.border_type(BorderType::Rounded).border_style(s.border_focused)
    } else {
        block.border_style(s.border)
    }
}

fn draw_pane(f: &mut Frame<'_>, rect: Rect, pane: Pane, model: &mut Model, ctx: &Ctx<'_>) {
    let block = pane_block(pane, model, ctx);
    let inner = block.inner(rect);
    f.render_widget(block, rect);
    let (w, h) = inner_size(rect);
    let (width, height) = (usize::from(w), usize::from(h));
    let lines = match pane {
        Pane::Worktrees => worktree_lines(model, ctx, width, height),
        Pane::Info => {
            let all = info::lines(model, width);
            model.view.info_scroll = model.view.info_scroll.min(all.len().saturating_sub(1));
            all.into_iter().skip(model.view.info_scroll).take(height).collect()
        }
        Pane::GitStatus => status_lines(model, ctx, width, height),
        Pane::Commit => log_lines(model, ctx, width, height),
        Pane::Notes => note_lines(model, ctx, inner, width),
    };
    f.render_widget(Paragraph::new(lines), inner);
}

fn row_style(selected: bool, focused: bool, ctx: &Ctx<'_>) -> Option<Style> {
    match (selected, focused) {
        (true, true) => Some(ctx.styles.selected),
        (true, false) => Some(ctx.styles.selected_unfocused),
        _ => None,
    }
}

fn worktree_lines(model: &mut Model, ctx: &Ctx<'_>, width: usize, height: usize) -> Vec<Line<'static>> {
    let s = ctx.styles;
    let show_pr = model.forge_enabled();
    let cols = table_columns(u16::try_from(width).unwrap_or(u16::MAX), show_pr);
    let sep = " ".repeat(usize::from(COLUMN_SEPARATOR));
    let (name_w, status_w, last_w) = (
        usize::from(cols.name),
        usize::from(cols.status),
        usize::from(cols.last),
    );

    let mut header = format!(
        "{}{sep}{}{sep}{}",
        pad("Name", name_w),
        pad("Status", status_w),
        pad("Last Active", last_w)
    );
    if let Some(pr_w) = cols.pr {
        header.push_str(&format!("{sep}{}", pad("PR", usize::from(pr_w))));
    }
    let mut out = vec![Line::styled(header, s.muted.add_modifier(Modifier::BOLD))];

    let rows = height.saturating_sub(1);
    let cursor = model.registry.cursor();
    model.view.worktree_offset = scroll_to(cursor, model.view.worktree_offset, rows);
    let focused = model.focus == Pane::Worktrees;
    let max_name = model.cfg.max_name_length.max(8);

    if model.registry.visible_len() == 0 {
        let msg = if model.registry.is_empty() {
            "Loading worktrees..."
        } else {
            "No worktrees match the filter."
        };
        out.push(Line::styled(msg, s.muted));
        return out;
    }

    for (i, wt) in model
        .registry
        .visible()
        .enumerate()
        .skip(model.view.worktree_offset)
        .take(rows)
    {
        let mut name = format!("{}{}", ctx.icons.worktree(wt.is_main), truncate(&wt.display_name(), max_name));
        if model.notes.has_note(&wt.path) {
            name.push_str(ctx.icons.note());
        }
        let mut status = if wt.dirty() {
            ctx.icons.dirty().to_owned()
        } else {
            ctx.icons.clean().to_owned()
        };
        if wt.ahead > 0 {
            status.push_str(&format!(" {}{}", ctx.icons.ahead(), wt.ahead));
        }
        if wt.behind > 0 {
            status.push_str(&format!(" {}{}", ctx.icons.behind(), wt.behind));
        }
        let status_style = if wt.dirty() { s.warn } else { s.success };
        let pr = wt
            .pr
            .as_ref()
            .map(|p| (format!("#{} {}", p.number, p.state.as_str()), s.pr_state(p.state)));

        if let Some(style) = row_style(i == cursor, focused, ctx) {
            let mut text = format!(
                "{}{sep}{}{sep}{}",
                pad(&name, name_w),
                pad(&status, status_w),
                pad(&wt.last_active, last_w)
            );
            if let Some(pr_w) = cols.pr {
                let label = pr.map(|(l, _)| l).unwrap_or_default();
                text.push_str(&format!("{sep}{}", pad(&label, usize::from(pr_w))));
            }
            out.push(Line::styled(pad(&text, width), style));
            continue;
        }
        let mut spans = vec![
            Span::styled(pad(&name, name_w), if wt.is_main { s.accent } else { s.text }),
            Span::raw(sep.clone()),
            Span::styled(pad(&status, status_w), status_style),
            Span::raw(sep.clone()),
            Span::styled(pad(&wt.last_active, last_w), s.muted),
        ];
        if let Some(pr_w) = cols.pr {
            let (label, style) = pr.unwrap_or_else(|| (String::new(), s.muted));
            spans.push(Span::raw(sep.clone()));
            spans.push(Span::styled(pad(&label, usize::from(pr_w)), style));
        }
        out.push(Line::from(spans));
    }
    out
}

fn status_lines(model: &mut Model, ctx: &Ctx<'_>, width: usize, height: usize) -> Vec<Line<'static>> {
    let s = ctx.styles;
    if model.status.flat().is_empty() {
        let msg = if model.status.is_empty() {
            "Clean working tree"
        } else {
            "No files match the filter."
        };
        return vec![Line::styled(msg, s.muted)];
    }
    let cursor = model.status.index();
    model.view.status_offset = scroll_to(cursor, model.view.status_offset, height);
    let focused = model.focus == Pane::GitStatus;

    let mut out = Vec::with_capacity(height);
    for (i, entry) in model
        .status
        .flat()
        .iter()
        .enumerate()
        .skip(model.view.status_offset)
        .take(height)
    {
        let indent = "  ".repeat(entry.depth);
        let (code, icon, code_style) = match &entry.kind {
            FlatKind::Directory { collapsed } => ("  ".to_owned(), ctx.icons.directory(*collapsed), s.muted),
            FlatKind::File(file) if file.is_untracked => ("??".to_owned(), ctx.icons.file(), s.error),
            FlatKind::File(file) => {
                let code: String = file.status.chars().take(2).map(|c| if c == '.' { ' ' } else { c }).collect();
                let style = if file.status.starts_with('.') { s.warn } else { s.success };
                (code, ctx.icons.file(), style)
            }
        };
        let label = format!("{indent}{icon}{}", entry.name());
        if let Some(style) = row_style(i == cursor, focused, ctx) {
            out.push(Line::styled(pad(&format!("{code} {label}"), width), style));
        } else {
            let name_style = if entry.is_dir() { s.accent } else { s.text };
            out.push(Line::from(vec![
                Span::styled(code, code_style),
                Span::raw(" "),
                Span::styled(truncate(&label, width.saturating_sub(3)), name_style),
            ]));
        }
    }
    out
}

fn log_lines(model: &mut Model, ctx: &Ctx<'_>, width: usize, height: usize) -> Vec<Line<'static>> {
    let s = ctx.styles;
    let cursor = model.log_cursor;
    model.view.log_offset = scroll_to(cursor, model.view.log_offset, height);
    let focused = model.focus == Pane::Commit;
    let entries = model.visible_log();
    if entries.is_empty() {
        let msg = if model.log.is_empty() { "No commits" } else { "No commits match the filter." };
        return vec![Line::styled(msg, s.muted)];
    }

    let mut out = Vec::with_capacity(height);
    for (i, entry) in entries.iter().enumerate().skip(model.view.log_offset).take(height) {
        let marker = if entry.is_unpushed {
            "↑"
        } else if entry.is_unmerged {
            "★"
        } else {
            " "
        };
        let prefix = format!("{marker} {} {:<2} ", entry.short_sha(), entry.author_initials);
        let message = truncate(&entry.message, width.saturating_sub(prefix.chars().count()));
        if let Some(style) = row_style(i == cursor, focused, ctx) {
            out.push(Line::styled(pad(&format!("{prefix}{message}"), width), style));
        } else {
            out.push(Line::from(vec![
                Span::styled(format!("{marker} "), s.cyan),
                Span::styled(entry.short_sha().to_owned(), s.warn),
                Span::styled(format!(" {:<2} ", entry.author_initials), s.muted),
                Span::styled(message, s.text),
            ]));
        }
    }
    out
}

/// Note body for the pane at `inner`; its links are kept for OSC 8 output.
fn note_lines(model: &mut Model, ctx: &Ctx<'_>, inner: Rect, width: usize) -> Vec<Line<'static>> {
    let Some(note) = model.registry.selected().and_then(|w| model.notes.get(&w.path)) else {
        return Vec::new();
    };
    let rendered = markdown::render(&note.note, width, &MarkdownStyles::from_cache(ctx.styles));
    model.view.notes_scroll = model.view.notes_scroll.min(rendered.lines.len().saturating_sub(1));
    let scroll = model.view.notes_scroll;
    model.links = markdown::place_links(&rendered.links, inner, scroll);
    rendered
        .lines
        .into_iter()
        .skip(scroll)
        .take(usize::from(inner.height))
        .collect()
}

fn hints(model: &Model) -> &'static [(&'static str, &'static str)] {
    if model.input.is_some() {
        return &[("enter", "apply"), ("esc", "clear"), ("↑↓", "move"), ("alt+n/p", "step")];
    }
    match model.focus {
        Pane::Worktrees => &[
            ("c", "create"),
            ("D", "delete"),
            ("d", "diff"),
            ("P", "push"),
            ("S", "sync"),
            ("f", "filter"),
            ("/", "search"),
            (":", "palette"),
            ("?", "help"),
            ("q", "quit"),
        ],
        Pane::Info => &[
            ("n/p", "check"),
            ("enter", "open"),
            ("ctrl+v", "logs"),
            ("o", "open PR"),
            ("?", "help"),
        ],
        Pane::GitStatus => &[
            ("s", "stage"),
            ("c", "commit"),
            ("C", "commit all"),
            ("D", "discard"),
            ("e", "edit"),
            ("d", "diff"),
            ("enter", "fold"),
        ],
        Pane::Commit => &[
            ("enter", "view"),
            ("d", "diff"),
            ("C", "cherry-pick"),
            ("/", "search"),
            ("?", "help"),
        ],
        Pane::Notes => &[("i", "edit"), ("T", "taskboard"), ("?", "help")],
    }
}

fn draw_footer(f: &mut Frame<'_>, area: Rect, model: &Model, ctx: &Ctx<'_>) {
    let s = ctx.styles;
    let mut spans: Vec<Span<'static>> = Vec::new();
    if let Some(flash) = &model.flash {
        spans.push(Span::styled(format!(" {flash} "), s.badge));
    } else {
        for (key, label) in hints(model) {
            spans.push(Span::styled(format!(" {key}"), s.key_hint));
            spans.push(Span::styled(format!(" {label} "), s.muted));
        }
    }
    if let Some(busy) = &model.busy {
        let frame = SPINNER[model.spinner % SPINNER.len()];
        spans.push(Span::styled(format!("  {frame} {busy}"), s.accent));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

#[cfg(test)]
mod tests {
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;

    use super::*;
    use crate::config::LayoutMode;
    use crate::tui::model::tests::{four, model_with};

    fn screen_text(terminal: &Terminal<TestBackend>) -> String {
        let buf = terminal.backend().buffer();
        let mut out = String::new();
        for y in 0..buf.area.height {
            for x in 0..buf.area.width {
                out.push_str(buf[(x, y)].symbol());
            }
            out.push('\n');
        }
        out
    }

    #[test]
    fn truncation_marks_the_cut() {
        assert_eq!(truncate("feature-branch", 7), "featur…");
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abc", 0), "");
    }

    #[test]
    fn frame_shows_panes_and_records_layout() {
        let mut m = model_with(four());
        let mut terminal = Terminal::new(TestBackend::new(120, 30)).expect("terminal");
        terminal.draw(|f| draw(f, &mut m)).expect("draw");
        let text = screen_text(&terminal);
        assert!(text.contains("1 Worktrees"));
        assert!(text.contains("2 Info"));
        assert!(text.contains("4 Commit"));
        assert!(text.contains("gamma"));
        assert_eq!((m.width, m.height), (120, 30));
        assert!(m.dims.worktrees.is_some());
    }

    #[test]
    fn note_links_are_recorded_at_screen_cells() {
        let mut m = model_with(four());
        let path = m.selected_path().expect("selection");
        m.notes.set(&path, "see [docs](https://example.com)", 0);
        let mut terminal = Terminal::new(TestBackend::new(120, 30)).expect("terminal");
        terminal.draw(|f| draw(f, &mut m)).expect("draw");
        let notes = m.dims.notes.expect("notes pane");
        assert_eq!(m.links.len(), 1);
        let link = &m.links[0];
        assert_eq!((link.x, link.y), (notes.x + 5, notes.y + 1));
        assert_eq!(link.url, "https://example.com");
        assert_eq!(terminal.backend().buffer()[(link.x, link.y)].symbol(), "d");
    }

    #[test]
    fn tiny_terminals_draw_without_panicking() {
        for layout in [LayoutMode::Default, LayoutMode::Top] {
            for (w, h) in [(80, 12), (60, 10), (30, 8), (20, 6), (10, 3)] {
                let mut m = model_with(four());
                let path = m.selected_path().expect("selection");
                m.notes.set(&path, "see [docs](https://example.com)", 0);
                m.layout = layout;
                let mut terminal = Terminal::new(TestBackend::new(w, h)).expect("terminal");
                terminal.draw(|f| draw(f, &mut m)).expect("draw");
                assert!(m.dims.notes.is_none_or(|r| r.bottom() <= h));
            }
        }
    }

    #[test]
    fn zoom_and_filter_badges_in_title() {
        let mut m = model_with(four());
        m.registry.set_filter("al");
        m.zoom = Some(Pane::Worktrees);
        let mut terminal = Terminal::new(TestBackend::new(100, 20)).expect("terminal");
        terminal.draw(|f| draw(f, &mut m)).expect("draw");
        let text = screen_text(&terminal);
        assert!(text.contains("Filtered"));
        assert!(text.contains("Zoomed"));
        assert!(!text.contains("2 Info"));
    }
}
