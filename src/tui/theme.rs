#![forbid(unsafe_code)]

use std::collections::{BTreeMap, HashSet};

use ratatui::style::{Color, Modifier, Style};

use crate::config::{CustomThemeData, IconSet};
use crate::core::models::{Conclusion, PrState};

pub const DRACULA: &str = "dracula";
pub const DRACULA_LIGHT: &str = "dracula-light";

/// Named palette; every pane and screen draws from these slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Theme {
    pub accent: Color,
    pub accent_fg: Color,
    pub accent_dim: Color,
    pub border: Color,
    pub border_dim: Color,
    pub muted_fg: Color,
    pub text_fg: Color,
    pub success_fg: Color,
    pub warn_fg: Color,
    pub error_fg: Color,
    pub cyan: Color,
}

const fn rgb(hex: u32) -> Color {
    Color::Rgb((hex >> 16) as u8, (hex >> 8) as u8, hex as u8)
}

#[allow(clippy::too_many_arguments)]
const fn palette(
    accent: u32,
    accent_fg: u32,
    accent_dim: u32,
    border: u32,
    border_dim: u32,
    muted_fg: u32,
    text_fg: u32,
    success_fg: u32,
    warn_fg: u32,
    error_fg: u32,
    cyan: u32,
) -> Theme {
    Theme {
        accent: rgb(accent),
        accent_fg: rgb(accent_fg),
        accent_dim: rgb(accent_dim),
        border: rgb(border),
        border_dim: rgb(border_dim),
        muted_fg: rgb(muted_fg),
        text_fg: rgb(text_fg),
        success_fg: rgb(success_fg),
        warn_fg: rgb(warn_fg),
        error_fg: rgb(error_fg),
        cyan: rgb(cyan),
    }
}

const BUILTIN: &[(&str, Theme)] = &[
    (
        DRACULA,
        palette(
            0xBD93F9, 0x282A36, 0x44475A, 0x6272A4, 0x44475A, 0x6272A4, 0xF8F8F2, 0x50FA7B,
            0xF1FA8C, 0xFF5555, 0x8BE9FD,
        ),
    ),
    (
        DRACULA_LIGHT,
        palette(
            0x7C3AED, 0xFFFFFF, 0xE9E4F5, 0xA29BB8, 0xD6D1E4, 0x6C6783, 0x282A36, 0x15803D,
            0xA16207, 0xDC2626, 0x0E7490,
        ),
    ),
    (
        "narna",
        palette(
            0xF59E0B, 0x111827, 0x1F2937, 0x4B5563, 0x374151, 0x9CA3AF, 0xF3F4F6, 0x34D399,
            0xFBBF24, 0xF87171, 0x22D3EE,
        ),
    ),
    (
        "clean-light",
        palette(
            0x2563EB, 0xFFFFFF, 0xE5EDFF, 0xCBD5E1, 0xE2E8F0, 0x64748B, 0x0F172A, 0x16A34A,
            0xCA8A04, 0xDC2626, 0x0891B2,
        ),
    ),
    (
        "catppuccin-latte",
        palette(
            0x8839EF, 0xEFF1F5, 0xCCD0DA, 0x9CA0B0, 0xBCC0CC, 0x6C6F85, 0x4C4F69, 0x40A02B,
            0xDF8E1D, 0xD20F39, 0x04A5E5,
        ),
    ),
    (
        "rose-pine-dawn",
        palette(
            0x907AA9, 0xFAF4ED, 0xF2E9E1, 0x9893A5, 0xDFDAD9, 0x797593, 0x575279, 0x286983,
            0xEA9D34, 0xB4637A, 0x56949F,
        ),
    ),
    (
        "one-light",
        palette(
            0x4078F2, 0xFAFAFA, 0xE5E5E6, 0xA0A1A7, 0xDBDBDC, 0x696C77, 0x383A42, 0x50A14F,
            0xC18401, 0xE45649, 0x0184BC,
        ),
    ),
    (
        "everforest-light",
        palette(
            0x8DA101, 0xFDF6E3, 0xEFEBD4, 0xA6B0A0, 0xE0DCC7, 0x829181, 0x5C6A72, 0x8DA101,
            0xDFA000, 0xF85552, 0x35A77C,
        ),
    ),
    (
        "solarized-dark",
        palette(
            0x268BD2, 0x002B36, 0x073642, 0x586E75, 0x073642, 0x657B83, 0x93A1A1, 0x859900,
            0xB58900, 0xDC322F, 0x2AA198,
        ),
    ),
    (
        "solarized-light",
        palette(
            0x268BD2, 0xFDF6E3, 0xEEE8D5, 0x93A1A1, 0xEEE8D5, 0x839496, 0x586E75, 0x859900,
            0xB58900, 0xDC322F, 0x2AA198,
        ),
    ),
    (
        "gruvbox-dark",
        palette(
            0xFABD2F, 0x282828, 0x3C3836, 0x665C54, 0x3C3836, 0x928374, 0xEBDBB2, 0xB8BB26,
            0xFE8019, 0xFB4934, 0x8EC07C,
        ),
    ),
    (
        "gruvbox-light",
        palette(
            0xB57614, 0xFBF1C7, 0xEBDBB2, 0xBDAE93, 0xD5C4A1, 0x7C6F64, 0x3C3836, 0x79740E,
            0xAF3A03, 0x9D0006, 0x427B58,
        ),
    ),
    (
        "nord",
        palette(
            0x88C0D0, 0x2E3440, 0x3B4252, 0x4C566A, 0x3B4252, 0x7B88A1, 0xECEFF4, 0xA3BE8C,
            0xEBCB8B, 0xBF616A, 0x8FBCBB,
        ),
    ),
    (
        "monokai",
        palette(
            0xF92672, 0x272822, 0x3E3D32, 0x75715E, 0x3E3D32, 0x75715E, 0xF8F8F2, 0xA6E22E,
            0xE6DB74, 0xF92672, 0x66D9EF,
        ),
    ),
    (
        "catppuccin-mocha",
        palette(
            0xCBA6F7, 0x1E1E2E, 0x313244, 0x6C7086, 0x45475A, 0x9399B2, 0xCDD6F4, 0xA6E3A1,
            0xF9E2AF, 0xF38BA8, 0x89DCEB,
        ),
    ),
];

impl Default for Theme {
    fn default() -> Self {
        BUILTIN[0].1
    }
}

/// Built-in theme names followed by custom ones.
#[must_use]
pub fn available_themes(customs: &BTreeMap<String, CustomThemeData>) -> Vec<String> {
    BUILTIN
        .iter()
        .map(|(n, _)| (*n).to_owned())
        .chain(customs.keys().filter(|k| !is_builtin(k)).cloned())
        .collect()
}

fn is_builtin(name: &str) -> bool {
    BUILTIN.iter().any(|(n, _)| *n == name)
}

fn builtin(name: &str) -> Option<Theme> {
    BUILTIN.iter().find(|(n, _)| *n == name).map(|(_, t)| *t)
}

/// `#RRGGBB`, `#RGB` or a named ANSI colour.
#[must_use]
pub fn parse_color(raw: &str) -> Option<Color> {
    let raw = raw.trim();
    if let Some(hex) = raw.strip_prefix('#') {
        let expanded: String = match hex.len() {
            3 => hex.chars().flat_map(|c| [c, c]).collect(),
            6 => hex.to_owned(),
            _ => return None,
        };
        let value = u32::from_str_radix(&expanded, 16).ok()?;
        return Some(rgb(value));
    }
    raw.parse::<Color>().ok()
}

/// Resolves `name` through custom themes (which may chain bases) down to a
/// built-in; unknown names fall back to Dracula.
#[must_use]
pub fn resolve(name: &str, customs: &BTreeMap<String, CustomThemeData>) -> Theme {
    let mut seen = HashSet::new();
    resolve_inner(name, customs, &mut seen)
}

fn resolve_inner(
    name: &str,
    customs: &BTreeMap<String, CustomThemeData>,
    seen: &mut HashSet<String>,
) -> Theme {
    if !seen.insert(name.to_owned()) {
        return Theme::default();
    }
    if let Some(custom) = customs.get(name) {
        let base = if custom.base.trim().is_empty() {
            Theme::default()
        } else {
            resolve_inner(custom.base.trim(), customs, seen)
        };
        return apply_custom(base, custom);
    }
    builtin(name).unwrap_or_default()
}

fn apply_custom(mut theme: Theme, custom: &CustomThemeData) -> Theme {
    let slots: [(&String, &mut Color); 11] = [
        (&custom.accent, &mut theme.accent),
        (&custom.accent_fg, &mut theme.accent_fg),
        (&custom.accent_dim, &mut theme.accent_dim),
        (&custom.border, &mut theme.border),
        (&custom.border_dim, &mut theme.border_dim),
        (&custom.muted_fg, &mut theme.muted_fg),
        (&custom.text_fg, &mut theme.text_fg),
        (&custom.success_fg, &mut theme.success_fg),
        (&custom.warn_fg, &mut theme.warn_fg),
        (&custom.error_fg, &mut theme.error_fg),
        (&custom.cyan, &mut theme.cyan),
    ];
    for (raw, slot) in slots {
        if let Some(color) = parse_color(raw) {
            *slot = color;
        }
    }
    theme
}

/// Default theme name when none is configured, from `COLORFGBG`.
#[must_use]
pub fn detect_default(colorfgbg: Option<&str>) -> &'static str {
    let bg = colorfgbg
        .and_then(|v| v.rsplit(';').next())
        .and_then(|b| b.trim().parse::<u8>().ok());
    match bg {
        Some(7 | 15) => DRACULA_LIGHT,
        _ => DRACULA,
    }
}

/// Styles derived from a theme, rebuilt only when the theme changes.
#[derive(Debug, Clone)]
pub struct StyleCache {
    theme_name: String,
    pub theme: Theme,
    pub text: Style,
    pub muted: Style,
    pub accent: Style,
    pub title: Style,
    pub border: Style,
    pub border_focused: Style,
    pub selected: Style,
    pub selected_unfocused: Style,
    pub header: Style,
    pub success: Style,
    pub warn: Style,
    pub error: Style,
    pub cyan: Style,
    pub badge: Style,
    pub key_hint: Style,
}

impl StyleCache {
    #[must_use]
    pub fn new(name: &str, customs: &BTreeMap<String, CustomThemeData>) -> Self {
        Self::from_theme(name, resolve(name, customs))
    }

    fn from_theme(name: &str, t: Theme) -> Self {
        Self {
            theme_name: name.to_owned(),
            theme: t,
            text: Style::default().fg(t.text_fg),
            muted: Style::default().fg(t.muted_fg),
            accent: Style::default().fg(t.accent),
            title: Style::default().fg(t.accent).add_modifier(Modifier::BOLD),
            border: Style::default().fg(t.border_dim),
            border_focused: Style::default().fg(t.accent),
            selected: Style::default()
                .fg(t.accent_fg)
                .bg(t.accent)
                .add_modifier(Modifier::BOLD),
            selected_unfocused: Style::default().fg(t.text_fg).bg(t.accent_dim),
            header: Style::default().fg(t.accent_fg).bg(t.accent).add_modifier(Modifier::BOLD),
            success: Style::default().fg(t.success_fg),
            warn: Style::default().fg(t.warn_fg),
            error: Style::default().fg(t.error_fg),
            cyan: Style::default().fg(t.cyan),
            badge: Style::default().fg(t.accent_fg).bg(t.accent_dim),
            key_hint: Style::default().fg(t.accent).add_modifier(Modifier::BOLD),
        }
    }

    #[must_use]
    pub fn theme_name(&self) -> &str {
        &self.theme_name
    }

    /// Swaps the palette; a no-op when the name is unchanged.
    pub fn set_theme(&mut self, name: &str, customs: &BTreeMap<String, CustomThemeData>) -> bool {
        if self.theme_name == name {
            return false;
        }
        *self = Self::new(name, customs);
        true
    }

    #[must_use]
    pub fn conclusion(&self, c: Conclusion) -> Style {
        match c {
            Conclusion::Success => self.success,
            Conclusion::Failure => self.error,
            Conclusion::Pending => self.warn,
            Conclusion::Skipped | Conclusion::Cancelled | Conclusion::Unknown => self.muted,
        }
    }

    #[must_use]
    pub fn pr_state(&self, s: PrState) -> Style {
        match s {
            PrState::Open => self.success,
            PrState::Merged => self.accent,
            PrState::Closed => self.error,
            PrState::Draft => self.muted,
        }
    }
}

/// Glyphs for the configured icon set; passed through the render context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IconProvider {
    set: IconSet,
}

impl IconProvider {
    #[must_use]
    pub fn new(set: IconSet) -> Self {
        Self { set }
    }

    fn pick(self, nerd: &'static str, text: &'static str) -> &'static str {
        match self.set {
            IconSet::NerdFontV3 => nerd,
            IconSet::Text => text,
        }
    }

    #[must_use]
    pub fn worktree(self, is_main: bool) -> &'static str {
        if is_main {
            self.pick("\u{f015} ", "* ")
        } else {
            self.pick("\u{f418} ", "  ")
        }
    }

    #[must_use]
    pub fn dirty(self) -> &'static str {
        self.pick("\u{f111}", "*")
    }

    #[must_use]
    pub fn clean(self) -> &'static str {
        self.pick("\u{f00c}", "ok")
    }

    #[must_use]
    pub fn ahead(self) -> &'static str {
        self.pick("\u{f062}", "+")
    }

    #[must_use]
    pub fn behind(self) -> &'static str {
        self.pick("\u{f063}", "-")
    }

    #[must_use]
    pub fn directory(self, collapsed: bool) -> &'static str {
        if collapsed {
            self.pick("\u{f07b} ", "+ ")
        } else {
            self.pick("\u{f07c} ", "- ")
        }
    }

    #[must_use]
    pub fn file(self) -> &'static str {
        self.pick("\u{f15b} ", "")
    }

    #[must_use]
    pub fn note(self) -> &'static str {
        self.pick(" \u{f249}", " [n]")
    }

    #[must_use]
    pub fn conclusion(self, c: Conclusion) -> &'static str {
        match c {
            Conclusion::Success => self.pick("\u{f00c}", "v"),
            Conclusion::Failure => self.pick("\u{f00d}", "x"),
            Conclusion::Pending => self.pick("\u{f254}", "~"),
            Conclusion::Skipped | Conclusion::Cancelled | Conclusion::Unknown => {
                self.pick("\u{f05e}", "-")
            }
        }
    }

    #[must_use]
    pub fn pr(self) -> &'static str {
        self.pick("\u{f407} ", "#")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn custom(base: &str, accent: &str) -> CustomThemeData {
        CustomThemeData {
            base: base.to_owned(),
            accent: accent.to_owned(),
            ..CustomThemeData::default()
        }
    }

    #[test]
    fn unknown_theme_falls_back_to_dracula() {
        let t = resolve("nope", &BTreeMap::new());
        assert_eq!(t.accent, rgb(0xBD93F9));
        assert_eq!(t.text_fg, rgb(0xF8F8F2));
    }

    #[test]
    fn custom_themes_chain_through_bases() {
        let mut customs = BTreeMap::new();
        customs.insert("level1".to_owned(), custom(DRACULA, "#FF0000"));
        let mut level2 = custom("level1", "");
        level2.accent_fg = "#FFFFFF".to_owned();
        customs.insert("level2".to_owned(), level2);
        customs.insert("level3".to_owned(), custom("level2", "#00FF00"));

        let t = resolve("level3", &customs);
        assert_eq!(t.accent, rgb(0x00FF00));
        assert_eq!(t.accent_fg, rgb(0xFFFFFF));
        assert_eq!(t.text_fg, rgb(0xF8F8F2));
    }

    #[test]
    fn cyclic_bases_terminate() {
        let mut customs = BTreeMap::new();
        customs.insert("a".to_owned(), custom("b", "#111111"));
        customs.insert("b".to_owned(), custom("a", "#222222"));
        assert_eq!(resolve("a", &customs).accent, rgb(0x111111));
    }

    #[test]
    fn builtins_include_light_and_dark_defaults() {
        let names = available_themes(&BTreeMap::new());
        for n in ["dracula", "dracula-light", "nord", "catppuccin-mocha", "rose-pine-dawn"] {
            assert!(names.iter().any(|x| x == n), "{n}");
        }
        assert_eq!(detect_default(Some("0;15")), DRACULA_LIGHT);
        assert_eq!(detect_default(None), DRACULA);
    }

    #[test]
    fn parses_short_hex_and_named_colors() {
        assert_eq!(parse_color("#fff"), Some(rgb(0xFFFFFF)));
        assert_eq!(parse_color("red"), Some(Color::Red));
        assert_eq!(parse_color("#12"), None);
    }

    #[test]
    fn style_cache_rebuilds_on_change_only() {
        let mut cache = StyleCache::new(DRACULA, &BTreeMap::new());
        assert!(!cache.set_theme(DRACULA, &BTreeMap::new()));
        assert!(cache.set_theme("nord", &BTreeMap::new()));
        assert_eq!(cache.theme.accent, rgb(0x88C0D0));
    }
}
