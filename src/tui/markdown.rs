#![forbid(unsafe_code)]

//! Note rendering: a small markdown subset plus annotation keywords.

use std::sync::LazyLock;

use ratatui::layout::Rect;
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};

use crate::tui::theme::StyleCache;

const OSC8_OPEN: &str = "\x1b]8;;";
const OSC8_CLOSE: &str = "\x1b\\";

static ORDERED_ITEM: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^(\s*)(\d+)[.)]\s+(.*)$").expect("ordered list pattern"));
static KEYWORD: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\b(TODO|DONE|FIX|FIXME|HACK|WARN|WARNING|PERF|NOTE|TEST):?")
        .expect("keyword pattern")
});
static LINK: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\[([^\]]+)\]\(([^)\s]+)\)").expect("link pattern"));

/// Wraps `label` in an OSC 8 hyperlink; plain label when `url` is blank.
#[must_use]
pub fn osc8(label: &str, url: &str) -> String {
    let url = url.trim();
    if label.is_empty() || url.is_empty() {
        return label.to_owned();
    }
    format!("{OSC8_OPEN}{url}{OSC8_CLOSE}{label}{OSC8_OPEN}{OSC8_CLOSE}")
}

/// Styles the renderer needs, taken from the active theme.
#[derive(Debug, Clone, Copy)]
pub struct MarkdownStyles {
    pub text: Style,
    pub muted: Style,
    pub heading: Style,
    pub code: Style,
    pub link: Style,
    pub todo: Style,
    pub done: Style,
    pub fix: Style,
    pub note: Style,
}

impl MarkdownStyles {
    #[must_use]
    pub fn from_cache(s: &StyleCache) -> Self {
        let t = s.theme;
        Self {
            text: s.text,
            muted: s.muted,
            heading: s.title,
            code: Style::default().fg(t.cyan).bg(t.accent_dim),
            link: s.cyan.add_modifier(Modifier::UNDERLINED),
            todo: Style::default().fg(t.accent_fg).bg(t.warn_fg).add_modifier(Modifier::BOLD),
            done: Style::default()
                .fg(t.accent_fg)
                .bg(t.success_fg)
                .add_modifier(Modifier::BOLD),
            fix: Style::default().fg(t.accent_fg).bg(t.error_fg).add_modifier(Modifier::BOLD),
            note: Style::default().fg(t.accent_fg).bg(t.cyan).add_modifier(Modifier::BOLD),
        }
    }

    fn keyword(&self, word: &str) -> Style {
        match word {
            "DONE" => self.done,
            "FIX" | "FIXME" | "HACK" | "WARN" | "WARNING" => self.fix,
            "NOTE" | "PERF" | "TEST" => self.note,
            _ => self.todo,
        }
    }
}

/// A link cell range in the rendered output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSpan {
    pub row: usize,
    pub col: usize,
    pub label: String,
    pub url: String,
    pub style: Style,
}

/// A link at absolute terminal cells, ready to be re-emitted as OSC 8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenLink {
    pub x: u16,
    pub y: u16,
    pub label: String,
    pub url: String,
    pub style: Style,
}

/// Positions the links of rows `skip..` inside `area`; labels are cut at
/// the right edge and blank labels are skipped.
#[must_use]
pub fn place_links(links: &[LinkSpan], area: Rect, skip: usize) -> Vec<ScreenLink> {
    links
        .iter()
        .filter_map(|link| {
            let row = u16::try_from(link.row.checked_sub(skip)?).ok()?;
            let col = u16::try_from(link.col).ok()?;
            if row >= area.height || col >= area.width || link.label.trim().is_empty() {
                return None;
            }
            let room = usize::from(area.width - col);
            Some(ScreenLink {
                x: area.x + col,
                y: area.y + row,
                label: link.label.chars().take(room).collect(),
                url: link.url.clone(),
                style: link.style,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct Rendered {
    pub lines: Vec<Line<'static>>,
    pub links: Vec<LinkSpan>,
}

/// Renders `text` wrapped to `width` columns.
#[must_use]
pub fn render(text: &str, width: usize, styles: &MarkdownStyles) -> Rendered {
    let width = width.max(8);
    let mut out = Rendered::default();
    let mut in_fence = false;

    for raw in text.replace("\r\n", "\n").split('\n') {
        let trimmed = raw.trim_start();
        if trimmed.starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            push_wrapped(&mut out, vec![Piece::plain(raw, styles.code)], width, "");
            continue;
        }
        if is_rule(trimmed) {
            out.lines.push(Line::from(Span::styled("─".repeat(width), styles.muted)));
            continue;
        }
        if let Some((level, title)) = heading(trimmed) {
            let style = if level <= 2 {
                styles.heading.add_modifier(Modifier::UNDERLINED)
            } else {
                styles.heading
            };
            push_wrapped(&mut out, inline(title, style, styles), width, "");
            continue;
        }
        if let Some(quote) = trimmed.strip_prefix('>') {
            let mut pieces = vec![Piece::plain("│ ", styles.muted)];
            pieces.extend(inline(
                quote.trim_start(),
                styles.muted.add_modifier(Modifier::ITALIC),
                styles,
            ));
            push_wrapped(&mut out, pieces, width, "│ ");
            continue;
        }
        let indent: String = raw.chars().take_while(|c| c.is_whitespace()).collect();
        if let Some((checked, rest)) = checkbox(trimmed) {
            let mut pieces = vec![Piece::plain(&format!("{indent}• "), styles.text)];
            if checked {
                pieces.push(Piece::plain(" DONE ", styles.done));
                pieces.push(Piece::plain(" ", styles.text));
                pieces.extend(inline(rest, styles.muted.add_modifier(Modifier::CROSSED_OUT), styles));
            } else {
                pieces.push(Piece::plain(" TODO ", styles.todo));
                pieces.push(Piece::plain(" ", styles.text));
                pieces.extend(inline(rest, styles.text, styles));
            }
            push_wrapped(&mut out, pieces, width, &format!("{indent}  "));
            continue;
        }
        if let Some(rest) = bullet(trimmed) {
            let mut pieces = vec![Piece::plain(&format!("{indent}• "), styles.text)];
            pieces.extend(annotated(rest, styles));
            push_wrapped(&mut out, pieces, width, &format!("{indent}  "));
            continue;
        }
        if let Some(caps) = ORDERED_ITEM.captures(raw) {
            let marker = format!("{}{}. ", &caps[1], &caps[2]);
            let hang = " ".repeat(marker.chars().count());
            let mut pieces = vec![Piece::plain(&marker, styles.text)];
            pieces.extend(annotated(&caps[3], styles));
            push_wrapped(&mut out, pieces, width, &hang);
            continue;
        }
        push_wrapped(&mut out, annotated(raw, styles), width, "");
    }
    out
}

fn is_rule(line: &str) -> bool {
    let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    compact.len() >= 3
        && ["-", "*", "_"]
            .iter()
            .any(|m| compact.chars().all(|c| c.to_string() == *m))
}

fn heading(line: &str) -> Option<(usize, &str)> {
    let level = line.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    line[level..].strip_prefix(' ').map(|t| (level, t.trim()))
}

fn checkbox(line: &str) -> Option<(bool, &str)> {
    let rest = bullet(line)?;
    let (checked, tail) = if let Some(t) = rest.strip_prefix("[ ]") {
        (false, t)
    } else if let Some(t) = rest
        .strip_prefix("[x]")
        .or_else(|| rest.strip_prefix("[X]"))
    {
        (true, t)
    } else {
        return None;
    };
    Some((checked, tail.trim_start()))
}

fn bullet(line: &str) -> Option<&str> {
    ["- ", "* ", "+ "]
        .iter()
        .find_map(|m| line.strip_prefix(m))
}

/// Text run with a style and an optional link target.
#[derive(Debug, Clone)]
struct Piece {
    text: String,
    style: Style,
    url: Option<String>,
}

impl Piece {
    fn plain(text: &str, style: Style) -> Self {
        Self {
            text: text.to_owned(),
            style,
            url: None,
        }
    }
}

/// Inline markup plus keyword badges; text after `DONE` is struck through.
fn annotated(line: &str, styles: &MarkdownStyles) -> Vec<Piece> {
    let mut pieces = Vec::new();
    let mut last = 0;
    let mut base = styles.text;
    for m in KEYWORD.find_iter(line) {
        pieces.extend(inline(&line[last..m.start()], base, styles));
        let word = m.as_str().trim_end_matches(':');
        pieces.push(Piece::plain(&format!(" {word} "), styles.keyword(word)));
        if word == "DONE" {
            base = styles.muted.add_modifier(Modifier::CROSSED_OUT);
        }
        last = m.end();
    }
    pieces.extend(inline(&line[last..], base, styles));
    pieces
}

/// `code`, **bold** and [label](url).
fn inline(text: &str, base: Style, styles: &MarkdownStyles) -> Vec<Piece> {
    let mut pieces = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let code = rest.find('`');
        let bold = rest.find("**");
        let link = LINK.find(rest).map(|m| m.start());
        let next = [code, bold, link].into_iter().flatten().min();
        let Some(at) = next else {
            pieces.push(Piece::plain(rest, base));
            break;
        };
        if at > 0 {
            pieces.push(Piece::plain(&rest[..at], base));
        }
        let tail = &rest[at..];
        if Some(at) == link
            && let Some(caps) = LINK.captures(tail)
        {
            let whole = caps.get(0).map_or(0, |m| m.end());
            pieces.push(Piece {
                text: caps[1].to_owned(),
                style: styles.link,
                url: Some(caps[2].to_owned()),
            });
            rest = &tail[whole..];
        } else if Some(at) == code
            && let Some(end) = tail[1..].find('`')
        {
            pieces.push(Piece::plain(&tail[1..=end], styles.code));
            rest = &tail[end + 2..];
        } else if Some(at) == bold
            && let Some(end) = tail[2..].find("**")
        {
            pieces.push(Piece::plain(&tail[2..end + 2], base.add_modifier(Modifier::BOLD)));
            rest = &tail[end + 4..];
        } else {
            // Unbalanced marker: emit it literally.
            let marker_len = if Some(at) == bold { 2 } else { 1 };
            pieces.push(Piece::plain(&tail[..marker_len], base));
            rest = &tail[marker_len..];
        }
    }
    pieces
}

/// Word-wraps pieces into lines, indenting continuation lines with `hang`.
fn push_wrapped(out: &mut Rendered, pieces: Vec<Piece>, width: usize, hang: &str) {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut col = 0usize;
    let hang_len = hang.chars().count();

    let mut flush = |spans: &mut Vec<Span<'static>>, out: &mut Rendered| {
        out.lines.push(Line::from(std::mem::take(spans)));
    };

    for piece in pieces {
        let words = split_keep_spaces(&piece.text);
        for word in words {
            let len = word.chars().count();
            if col + len > width && col > hang_len && !word.trim().is_empty() {
                flush(&mut spans, out);
                spans.push(Span::raw(hang.to_owned()));
                col = hang_len;
            }
            if col == hang_len && col > 0 && word.trim().is_empty() && !out.lines.is_empty() {
                continue;
            }
            if let Some(url) = &piece.url {
                out.links.push(LinkSpan {
                    row: out.lines.len(),
                    col,
                    label: word.clone(),
                    url: url.clone(),
                    style: piece.style,
                });
            }
            spans.push(Span::styled(word, piece.style));
            col += len;
        }
    }
    flush(&mut spans, out);
}

fn split_keep_spaces(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut cur = String::new();
    for c in text.chars() {
        if c == ' ' {
            if !cur.is_empty() {
                words.push(std::mem::take(&mut cur));
            }
            words.push(" ".to_owned());
        } else {
            cur.push(c);
        }
    }
    if !cur.is_empty() {
        words.push(cur);
    }
    words
}

/// Plain text of a rendered line, for tests and search.
#[must_use]
pub fn line_text(line: &Line<'_>) -> String {
    line.spans.iter().map(|s| s.content.as_ref()).collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn styles() -> MarkdownStyles {
        MarkdownStyles::from_cache(&StyleCache::new("dracula", &BTreeMap::new()))
    }

    fn texts(r: &Rendered) -> Vec<String> {
        r.lines.iter().map(line_text).collect()
    }

    #[test]
    fn checkboxes_become_annotations() {
        let s = styles();
        let r = render("- [ ] write tests\n- [x] ship", 80, &s);
        assert_eq!(texts(&r), vec!["•  TODO  write tests", "•  DONE  ship"]);
        let done_text = r.lines[1].spans.last().unwrap();
        assert!(done_text.style.add_modifier.contains(Modifier::CROSSED_OUT));
    }

    #[test]
    fn done_keyword_strikes_remainder() {
        let s = styles();
        let r = render("DONE: migrate db", 80, &s);
        let spans = &r.lines[0].spans;
        assert_eq!(spans[0].content, " DONE ");
        assert!(spans.last().unwrap().style.add_modifier.contains(Modifier::CROSSED_OUT));

        let r = render("TODO: not struck", 80, &s);
        assert!(!r.lines[0].spans.last().unwrap().style.add_modifier.contains(Modifier::CROSSED_OUT));
    }

    #[test]
    fn links_are_recorded_with_position() {
        let s = styles();
        let r = render("see [docs](https://example.com) now", 80, &s);
        assert_eq!(texts(&r), vec!["see docs now"]);
        assert_eq!(
            r.links,
            vec![LinkSpan {
                row: 0,
                col: 4,
                label: "docs".to_owned(),
                url: "https://example.com".to_owned(),
                style: s.link,
            }]
        );
        assert_eq!(
            osc8("docs", "https://example.com"),
            "\x1b]8;;https://example.com\x1b\\docs\x1b]8;;\x1b\\"
        );
        assert_eq!(osc8("docs", " "), "docs");
    }

    #[test]
    fn links_are_placed_inside_the_pane() {
        let s = styles();
        let r = render("[a](u1)\nplain\nsee [longlabel](u2)", 80, &s);
        let area = Rect::new(10, 5, 8, 2);
        let placed = place_links(&r.links, area, 1);
        assert_eq!(placed.len(), 1);
        assert_eq!((placed[0].x, placed[0].y), (14, 6));
        assert_eq!(placed[0].label, "long");
        assert_eq!(placed[0].url, "u2");
        assert_eq!(placed[0].style, s.link);

        let all = place_links(&r.links, Rect::new(0, 0, 80, 3), 0);
        assert_eq!(all.iter().map(|l| l.url.as_str()).collect::<Vec<_>>(), vec!["u1", "u2"]);
        assert!(place_links(&r.links, Rect::new(0, 0, 80, 1), 3).is_empty());
    }

    #[test]
    fn block_elements() {
        let s = styles();
        let r = render("# Title\n> quoted\n1. first\n---\n```\n**raw**\n```", 20, &s);
        let t = texts(&r);
        assert_eq!(t[0], "Title");
        assert_eq!(t[1], "│ quoted");
        assert_eq!(t[2], "1. first");
        assert_eq!(t[3], "─".repeat(20));
        assert_eq!(t[4], "**raw**");
    }

    #[test]
    fn inline_code_and_bold() {
        let s = styles();
        let r = render("run `make` **now** or *later", 80, &s);
        assert_eq!(texts(&r), vec!["run make now or *later"]);
        assert!(r.lines[0].spans.iter().any(|sp| sp.content == "now"
            && sp.style.add_modifier.contains(Modifier::BOLD)));
    }

    #[test]
    fn wraps_with_hanging_indent() {
        let s = styles();
        let r = render("- alpha beta gamma delta", 12, &s);
        let t = texts(&r);
        assert_eq!(t[0], "• alpha beta");
        assert!(t[1].starts_with("  "));
        assert!(t.iter().all(|l| l.chars().count() <= 12));
    }
}
