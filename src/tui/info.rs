#![forbid(unsafe_code)]

//! Content of the Info pane for the selected worktree.

use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};

use crate::config::tilde_path;
use crate::core::models::{PrFetchStatus, PrState, WorktreeInfo, aggregate_ci};
use crate::core::scan::format_relative;
use crate::error::hint_for_message;
use crate::tui::layout::Pane;
use crate::tui::markdown::{self, MarkdownStyles};
use crate::tui::model::{Model, now_ts};

const KEY_WIDTH: usize = "Last Accessed:".len();

fn field(key: &str, value: Span<'static>, model: &Model) -> Line<'static> {
    Line::from(vec![
        Span::styled(
            format!("{key:<KEY_WIDTH$} "),
            model.styles.cyan.add_modifier(Modifier::BOLD),
        ),
        value,
    ])
}

/// True when `wt` is the main worktree or sits on the main worktree's branch.
fn on_main_branch(model: &Model, wt: &WorktreeInfo) -> bool {
    wt.is_main
        || model
            .registry
            .main_worktree()
            .is_some_and(|m| !m.branch.is_empty() && m.branch == wt.branch)
}

/// Lines for the Info pane, wrapped to `width` where markdown is involved.
#[must_use]
pub fn lines(model: &Model, width: usize) -> Vec<Line<'static>> {
    let Some(wt) = model.registry.selected() else {
        return vec![Line::styled("No worktree selected.", model.styles.muted)];
    };
    let s = &model.styles;
    let icons = model.icons;
    let mut out = Vec::with_capacity(32);

    out.push(field("Path:", Span::styled(tilde_path(&wt.path), s.text), model));
    out.push(field("Branch:", Span::styled(wt.branch.clone(), s.text), model));
    if wt.has_upstream && !wt.upstream_branch.is_empty() {
        out.push(field("Upstream:", Span::styled(wt.upstream_branch.clone(), s.text), model));
    } else if !wt.is_main {
        out.push(field("Upstream:", Span::styled("none", s.muted), model));
    }
    if wt.last_switched_ts > 0 {
        let rel = format_relative(wt.last_switched_ts, now_ts());
        out.push(field("Last Accessed:", Span::styled(rel, s.text), model));
    }
    if wt.ahead > 0 || wt.behind > 0 {
        let mut spans = vec![Span::styled(
            format!("{:<KEY_WIDTH$} ", "Divergence:"),
            s.cyan.add_modifier(Modifier::BOLD),
        )];
        if wt.ahead > 0 {
            spans.push(Span::styled(format!("{}{}", icons.ahead(), wt.ahead), s.cyan));
        }
        if wt.behind > 0 {
            if wt.ahead > 0 {
                spans.push(Span::raw(" "));
            }
            spans.push(Span::styled(format!("{}{}", icons.behind(), wt.behind), s.error));
        }
        out.push(Line::from(spans));
    }
    if wt.dirty() {
        let counts = format!(
            "{} staged, {} modified, {} untracked",
            wt.staged(),
            wt.modified(),
            wt.untracked()
        );
        out.push(field("Changes:", Span::styled(counts, s.warn), model));
    }

    if !model.cfg.disable_pr {
        pr_section(model, wt, &mut out);
        ci_section(model, wt, &mut out);
    }

    if model.zoom == Some(Pane::Info)
        && let Some(note) = model.notes.get(&wt.path)
    {
        out.push(Line::default());
        out.push(Line::styled("Notes:", s.accent.add_modifier(Modifier::BOLD)));
        let rendered = markdown::render(&note.note, width, &MarkdownStyles::from_cache(s));
        out.extend(rendered.lines);
    }
    out
}

fn pr_section(model: &Model, wt: &WorktreeInfo, out: &mut Vec<Line<'static>>) {
    let s = &model.styles;
    let heading = s.accent.add_modifier(Modifier::BOLD);
    if let Some(pr) = &wt.pr {
        if wt.is_main && matches!(pr.state, PrState::Merged | PrState::Closed) {
            return;
        }
        let author = match (pr.author.is_empty(), pr.author_name.is_empty()) {
            (true, _) => String::new(),
            (false, false) => format!(" by @{}", pr.author),
            (false, true) => format!(" by {}", pr.author),
        };
        let bot = if pr.author_is_bot { " [bot]" } else { "" };
        out.push(Line::default());
        out.push(Line::from(vec![
            Span::styled(format!("{}PR #{}{author}{bot} ", model.icons.pr(), pr.number), heading),
            Span::styled(format!(" {} ", pr.state.as_str()), s.pr_state(pr.state)),
        ]));
        out.push(Line::styled(format!("  {}", pr.title), s.text));
        if !pr.base_branch.is_empty() {
            out.push(Line::styled(format!("  into {}", pr.base_branch), s.muted));
        }
        out.push(Line::styled(format!("  {}", pr.url), s.cyan));
        return;
    }
    if !wt.has_upstream {
        return;
    }
    out.push(Line::default());
    out.push(Line::styled(format!("{}PR:", model.icons.pr()), heading));
    match wt.pr_fetch_status {
        PrFetchStatus::Error => {
            out.push(Line::styled("  PR Status:", s.text.add_modifier(Modifier::BOLD)));
            out.push(Line::styled("    Fetch failed", s.error));
            if let Some(hint) = hint_for_message(&wt.pr_fetch_error) {
                out.push(Line::styled(format!("    {hint}"), s.muted));
            } else if !wt.pr_fetch_error.is_empty() {
                out.push(Line::styled(format!("    {}", wt.pr_fetch_error), s.muted));
            }
        }
        PrFetchStatus::NoPr if model.prs_loaded => {
            out.push(Line::styled("  No PR for this branch", s.muted));
        }
        PrFetchStatus::Fetching => out.push(Line::styled("  Fetching PR data...", s.muted)),
        PrFetchStatus::NotFetched if !model.prs_loaded => {
            let hint = if on_main_branch(model, wt) {
                "  Main branch usually has no PR"
            } else {
                "  Press 'p' to fetch PR data"
            };
            out.push(Line::styled(hint, s.muted));
        }
        _ => {}
    }
}

fn ci_section(model: &Model, wt: &WorktreeInfo, out: &mut Vec<Line<'static>>) {
    let Some(checks) = model.caches.ci_any(&wt.branch).filter(|c| !c.is_empty()) else {
        return;
    };
    let s = &model.styles;
    let summary = aggregate_ci(&checks);
    out.push(Line::default());
    out.push(Line::from(vec![
        Span::styled("CI Checks: ", s.accent.add_modifier(Modifier::BOLD)),
        Span::styled(format!(" {} ", summary.label()), s.conclusion(summary)),
    ]));
    let selected = Style::default()
        .fg(s.theme.accent_fg)
        .bg(s.theme.accent)
        .add_modifier(Modifier::BOLD);
    for (i, check) in checks.iter().enumerate() {
        let symbol = model.icons.conclusion(check.conclusion);
        if model.focus == Pane::Info && model.ci_check_index == Some(i) {
            out.push(Line::styled(format!("  {symbol} {}", check.name), selected));
        } else {
            out.push(Line::from(vec![
                Span::raw("  "),
                Span::styled(symbol, s.conclusion(check.conclusion)),
                Span::styled(format!(" {}", check.name), s.text),
            ]));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{CiCheck, Conclusion};
    use crate::tui::markdown::line_text;
    use crate::tui::model::tests::{four, model_with};

    fn text(model: &Model) -> Vec<String> {
        lines(model, 60).iter().map(line_text).collect()
    }

    #[test]
    fn shows_path_branch_and_divergence() {
        let mut m = model_with(four());
        m.registry.select_path("/w/alpha");
        m.registry.update("/w/alpha", |w| {
            w.ahead = 2;
            w.behind = 1;
        });
        let t = text(&m);
        assert!(t[0].starts_with("Path:") && t[0].ends_with("/w/alpha"));
        assert!(t[1].ends_with("alpha"));
        assert!(t[2].starts_with("Upstream:") && t[2].ends_with("none"));
        assert!(t.iter().any(|l| l.starts_with("Divergence:") && l.contains('2') && l.contains('1')));
    }

    #[test]
    fn fetch_errors_carry_a_hint() {
        let mut m = model_with(four());
        m.registry.select_path("/w/beta");
        m.registry.update("/w/beta", |w| {
            w.has_upstream = true;
            w.pr_fetch_status = PrFetchStatus::Error;
            w.pr_fetch_error = "HTTP 401: auth required".to_owned();
        });
        let t = text(&m);
        assert!(t.iter().any(|l| l.contains("Fetch failed")));
        assert!(t.iter().any(|l| l.contains("gh auth login")));
    }

    #[test]
    fn ci_checks_listed_with_summary() {
        let mut m = model_with(four());
        m.registry.select_path("/w/gamma");
        let checks = vec![
            CiCheck {
                name: "build".to_owned(),
                conclusion: Conclusion::Success,
                ..CiCheck::default()
            },
            CiCheck {
                name: "lint".to_owned(),
                conclusion: Conclusion::Failure,
                ..CiCheck::default()
            },
        ];
        m.caches.put_ci("gamma", checks, std::time::Instant::now());
        let t = text(&m);
        assert!(t.iter().any(|l| l.starts_with("CI Checks:") && l.contains("FAILED")));
        assert!(t.iter().any(|l| l.ends_with("lint")));
    }
}
