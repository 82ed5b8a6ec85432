#![forbid(unsafe_code)]

use ratatui::layout::Rect;

use crate::config::LayoutMode;

pub const MIN_LEFT_WIDTH: u16 = 28;
pub const MIN_RIGHT_WIDTH: u16 = 40;
const HEADER_HEIGHT: u16 = 1;
const FOOTER_HEIGHT: u16 = 1;
const GAP: u16 = 1;
const PANE_FRAME: u16 = 2;
const COMMIT_CAP: u16 = 11;
const TRIM_FLOOR: u16 = 8;

/// The five panes, numbered as shown in their titles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Pane {
    Worktrees,
    Info,
    GitStatus,
    Commit,
    Notes,
}

impl Pane {
    pub const ALL: [Self; 5] = [
        Self::Worktrees,
        Self::Info,
        Self::GitStatus,
        Self::Commit,
        Self::Notes,
    ];

    #[must_use]
    pub fn number(self) -> u8 {
        match self {
            Self::Worktrees => 1,
            Self::Info => 2,
            Self::GitStatus => 3,
            Self::Commit => 4,
            Self::Notes => 5,
        }
    }

    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Self::Worktrees => "Worktrees",
            Self::Info => "Info",
            Self::GitStatus => "Git Status",
            Self::Commit => "Commit",
            Self::Notes => "Notes",
        }
    }
}

/// Everything the layout depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutInput {
    pub width: u16,
    pub height: u16,
    pub focus: Pane,
    pub zoom: Option<Pane>,
    pub showing_filter: bool,
    pub has_notes: bool,
    pub has_git_status: bool,
    pub mode: LayoutMode,
}

/// Rectangles for one frame. Hidden panes are `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LayoutDims {
    pub header: Rect,
    pub filter: Option<Rect>,
    pub body: Rect,
    pub footer: Rect,
    pub worktrees: Option<Rect>,
    pub info: Option<Rect>,
    pub git_status: Option<Rect>,
    pub commit: Option<Rect>,
    pub notes: Option<Rect>,
}

impl LayoutDims {
    #[must_use]
    pub fn pane(&self, pane: Pane) -> Option<Rect> {
        match pane {
            Pane::Worktrees => self.worktrees,
            Pane::Info => self.info,
            Pane::GitStatus => self.git_status,
            Pane::Commit => self.commit,
            Pane::Notes => self.notes,
        }
    }

    /// Visible pane under a screen position.
    #[must_use]
    pub fn pane_at(&self, x: u16, y: u16) -> Option<Pane> {
        Pane::ALL.into_iter().find(|p| {
            self.pane(*p).is_some_and(|r| {
                x >= r.x && x < r.x.saturating_add(r.width) && y >= r.y && y < r.y.saturating_add(r.height)
            })
        })
    }
}

/// Content size inside a bordered pane, at least 1x1.
#[must_use]
pub fn inner_size(rect: Rect) -> (u16, u16) {
    (
        rect.width.saturating_sub(PANE_FRAME).max(1),
        rect.height.saturating_sub(PANE_FRAME).max(1),
    )
}

fn scale(total: u16, ratio: f64) -> u16 {
    // Ratios are below 1, so the product always fits.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let v = (f64::from(total) * ratio) as u16;
    v
}

#[must_use]
pub fn compute(input: &LayoutInput) -> LayoutDims {
    let width = if input.width == 0 { 120 } else { input.width };
    let height = if input.height == 0 { 40 } else { input.height };
    let filter_h = u16::from(input.showing_filter);

    let header = Rect::new(0, 0, width, HEADER_HEIGHT);
    let filter = input
        .showing_filter
        .then(|| Rect::new(0, HEADER_HEIGHT, width, filter_h));
    let body_y = HEADER_HEIGHT + filter_h;
    let body_h = height
        .saturating_sub(HEADER_HEIGHT + FOOTER_HEIGHT + filter_h)
        .max(1);
    let body = Rect::new(0, body_y, width, body_h);
    let footer = Rect::new(0, body_y + body_h, width, FOOTER_HEIGHT);

    let mut dims = LayoutDims {
        header,
        filter,
        body,
        footer,
        ..LayoutDims::default()
    };

    if let Some(zoomed) = input.zoom {
        match zoomed {
            Pane::Worktrees => dims.worktrees = Some(body),
            Pane::Info => dims.info = Some(body),
            Pane::GitStatus => dims.git_status = Some(body),
            Pane::Commit => dims.commit = Some(body),
            Pane::Notes => dims.notes = Some(body),
        }
    } else {
        match input.mode {
            LayoutMode::Default => default_layout(input, body, &mut dims),
            LayoutMode::Top => top_layout(input, body, &mut dims),
        }
    }
    clamp(&mut dims, Rect::new(0, 0, width, height));
    dims
}

/// Cuts every rect to the screen and every pane to the body. Panes left
/// with no area are hidden.
fn clamp(dims: &mut LayoutDims, screen: Rect) {
    dims.header = dims.header.intersection(screen);
    dims.filter = dims.filter.map(|r| r.intersection(screen));
    dims.body = dims.body.intersection(screen);
    dims.footer = dims.footer.intersection(screen);
    let body = dims.body;
    for pane in [
        &mut dims.worktrees,
        &mut dims.info,
        &mut dims.git_status,
        &mut dims.commit,
        &mut dims.notes,
    ] {
        *pane = pane.map(|r| r.intersection(body)).filter(|r| !r.is_empty());
    }
}

/// Left and right column widths; when both minima bind, the left one wins.
fn split_columns(width: u16, left_ratio: f64) -> (u16, u16) {
    let mut left = scale(width.saturating_sub(GAP), left_ratio);
    let mut right = width.saturating_sub(left + GAP);
    if left < MIN_LEFT_WIDTH {
        left = MIN_LEFT_WIDTH;
        right = width.saturating_sub(left + GAP);
    }
    if right < MIN_RIGHT_WIDTH {
        right = MIN_RIGHT_WIDTH;
        left = width.saturating_sub(right + GAP).max(MIN_LEFT_WIDTH);
    }
    if left + right + GAP > width {
        right = width.saturating_sub(left + GAP);
    }
    (left, right)
}

fn default_layout(input: &LayoutInput, body: Rect, dims: &mut LayoutDims) {
    let left_ratio = match input.focus {
        Pane::Worktrees | Pane::Notes => 0.45,
        Pane::Info | Pane::GitStatus | Pane::Commit => 0.20,
    };
    let (left_w, right_w) = split_columns(body.width, left_ratio);
    let h = body.height;

    let mut notes_h = 0;
    if input.has_notes {
        let ratio = if input.focus == Pane::Notes { 0.50 } else { 0.30 };
        notes_h = scale(h.saturating_sub(GAP), ratio).max(4);
        let mut top_h = h.saturating_sub(notes_h + GAP);
        if top_h < 4 {
            top_h = 4;
            notes_h = h.saturating_sub(top_h + GAP);
        }
        dims.worktrees = Some(Rect::new(body.x, body.y, left_w, top_h));
        dims.notes = Some(Rect::new(body.x, body.y + top_h + GAP, left_w, notes_h));
    } else {
        dims.worktrees = Some(Rect::new(body.x, body.y, left_w, h));
    }

    let commit_cap = if input.has_notes { notes_h } else { COMMIT_CAP };
    let right_x = body.x + left_w + GAP;

    if input.has_git_status {
        let (top_ratio, mid_ratio) = match input.focus {
            Pane::Info => (0.50, 0.30),
            Pane::GitStatus => (0.20, 0.60),
            Pane::Commit => (0.20, 0.20),
            Pane::Worktrees | Pane::Notes => (0.30, 0.40),
        };
        let avail = h.saturating_sub(GAP * 2);
        let mut top = scale(avail, top_ratio).max(4);
        let mut mid = scale(avail, mid_ratio).max(4);
        let mut bottom = avail.saturating_sub(top + mid);
        if bottom > commit_cap {
            bottom = commit_cap;
            top = avail.saturating_sub(mid + bottom);
        } else if bottom < 4 {
            bottom = 4;
            mid = avail.saturating_sub(top + bottom);
            if mid < 4 {
                mid = 4;
                top = avail.saturating_sub(mid + bottom);
            }
        }
        dims.info = Some(Rect::new(right_x, body.y, right_w, top));
        dims.git_status = Some(Rect::new(right_x, body.y + top + GAP, right_w, mid));
        dims.commit = Some(Rect::new(
            right_x,
            body.y + top + mid + GAP * 2,
            right_w,
            bottom,
        ));
    } else {
        let top_ratio = match input.focus {
            Pane::Info => 0.60,
            Pane::Commit => 0.30,
            _ => 0.40,
        };
        let avail = h.saturating_sub(GAP);
        let mut top = scale(avail, top_ratio).max(4);
        let mut bottom = avail.saturating_sub(top);
        if bottom > commit_cap {
            bottom = commit_cap;
            top = avail.saturating_sub(bottom);
        } else if bottom < 4 {
            bottom = 4;
            top = avail.saturating_sub(bottom);
        }
        dims.info = Some(Rect::new(right_x, body.y, right_w, top));
        dims.commit = Some(Rect::new(right_x, body.y + top + GAP, right_w, bottom));
    }
}

/// Shrinks widths (last first) down to the floor until they fit.
fn trim_excess(widths: &mut [u16], gaps: u16, total: u16) {
    let sum: u16 = widths.iter().sum::<u16>() + gaps;
    let mut excess = sum.saturating_sub(total);
    for w in widths.iter_mut().rev() {
        while excess > 0 && *w > TRIM_FLOOR {
            *w -= 1;
            excess -= 1;
        }
    }
}

fn top_layout(input: &LayoutInput, body: Rect, dims: &mut LayoutDims) {
    let h = body.height;
    let w = body.width;
    let top_ratio = match input.focus {
        Pane::Worktrees | Pane::Notes => 0.45,
        Pane::Info | Pane::GitStatus | Pane::Commit => 0.20,
    };

    let (top_h, notes_h, bottom_h) = if input.has_notes {
        let ratio = if input.focus == Pane::Notes { 0.25 } else { 0.15 };
        let notes = scale(h, ratio).max(4);
        let remaining = h.saturating_sub(notes + GAP * 2);
        let mut top = scale(remaining, top_ratio).max(4);
        let mut bottom = remaining.saturating_sub(top);
        if bottom < 6 {
            bottom = 6;
            top = remaining.saturating_sub(bottom).max(4);
        }
        (top, notes, bottom)
    } else {
        let mut top = scale(h.saturating_sub(GAP), top_ratio).max(4);
        let mut bottom = h.saturating_sub(top + GAP);
        if bottom < 6 {
            bottom = 6;
            top = h.saturating_sub(bottom + GAP).max(4);
        }
        (top, 0, bottom)
    };

    dims.worktrees = Some(Rect::new(body.x, body.y, w, top_h));
    let mut bottom_y = body.y + top_h + GAP;
    if input.has_notes {
        dims.notes = Some(Rect::new(body.x, bottom_y, w, notes_h));
        bottom_y += notes_h + GAP;
    }

    if input.has_git_status {
        let (left_ratio, mid_ratio) = match input.focus {
            Pane::Info => (0.50, 0.30),
            Pane::GitStatus => (0.20, 0.60),
            Pane::Commit => (0.20, 0.20),
            Pane::Worktrees | Pane::Notes => (0.30, 0.40),
        };
        let avail = w.saturating_sub(GAP * 2);
        let mut left = scale(avail, left_ratio).max(MIN_LEFT_WIDTH);
        let mut mid = scale(avail, mid_ratio).max(MIN_RIGHT_WIDTH);
        let mut right = avail.saturating_sub(left + mid);
        if right < MIN_RIGHT_WIDTH {
            right = MIN_RIGHT_WIDTH;
            mid = avail.saturating_sub(left + right);
            if mid < MIN_RIGHT_WIDTH {
                mid = MIN_RIGHT_WIDTH;
                left = avail.saturating_sub(mid + right);
            }
        }
        left = left.max(MIN_LEFT_WIDTH);
        // Trim order is commit, then git status, then info.
        let mut widths = [left, mid, right];
        trim_excess(&mut widths, GAP * 2, w);
        let [left, mid, right] = widths;
        dims.info = Some(Rect::new(body.x, bottom_y, left, bottom_h));
        dims.git_status = Some(Rect::new(body.x + left + GAP, bottom_y, mid, bottom_h));
        dims.commit = Some(Rect::new(
            body.x + left + mid + GAP * 2,
            bottom_y,
            right,
            bottom_h,
        ));
    } else {
        let left_ratio = match input.focus {
            Pane::Info => 0.55,
            Pane::Commit => 0.35,
            _ => 0.45,
        };
        let avail = w.saturating_sub(GAP);
        let mut left = scale(avail, left_ratio).max(MIN_LEFT_WIDTH);
        let mut right = avail.saturating_sub(left);
        if right < MIN_RIGHT_WIDTH {
            right = MIN_RIGHT_WIDTH;
            left = avail.saturating_sub(right).max(MIN_LEFT_WIDTH);
        }
        let mut widths = [left, right];
        trim_excess(&mut widths, GAP, w);
        let [left, right] = widths;
        dims.info = Some(Rect::new(body.x, bottom_y, left, bottom_h));
        dims.commit = Some(Rect::new(body.x + left + GAP, bottom_y, right, bottom_h));
    }
}

/// Worktree table column widths: name, status, last active, PR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableColumns {
    pub name: u16,
    pub status: u16,
    pub last: u16,
    pub pr: Option<u16>,
}

pub const COLUMN_SEPARATOR: u16 = 3;

#[must_use]
pub fn table_columns(total: u16, show_pr: bool) -> TableColumns {
    let total = i32::from(total);
    let mut status = 10;
    let mut last = 15;
    let mut pr = if show_pr { 12 } else { 0 };
    let columns = if show_pr { 4 } else { 3 };
    let separators = (columns - 1) * i32::from(COLUMN_SEPARATOR);

    let mut name = (total - status - last - pr - separators).max(12);
    let mut excess = name + status + last + pr + separators - total;
    while excess > 0 && last > 10 {
        last -= 1;
        excess -= 1;
    }
    while show_pr && excess > 0 && pr > 8 {
        pr -= 1;
        excess -= 1;
    }
    while excess > 0 && name > 12 {
        name -= 1;
        excess -= 1;
    }
    while excess > 0 && status > 6 {
        status -= 1;
        excess -= 1;
    }
    if excess > 0 {
        name = (name - excess).max(6);
    }
    let actual = name + status + last + pr + separators;
    if actual < total {
        name += total - actual;
    }

    let to_u16 = |v: i32| u16::try_from(v.max(0)).unwrap_or(u16::MAX);
    TableColumns {
        name: to_u16(name),
        status: to_u16(status),
        last: to_u16(last),
        pr: show_pr.then(|| to_u16(pr)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(width: u16, height: u16, focus: Pane) -> LayoutInput {
        LayoutInput {
            width,
            height,
            focus,
            zoom: None,
            showing_filter: false,
            has_notes: false,
            has_git_status: true,
            mode: LayoutMode::Default,
        }
    }

    #[test]
    fn default_layout_fills_body_and_caps_commit() {
        let dims = compute(&input(120, 40, Pane::Worktrees));
        let wt = dims.worktrees.unwrap();
        let info = dims.info.unwrap();
        let commit = dims.commit.unwrap();
        assert_eq!(dims.body.height, 38);
        assert_eq!(wt.width, 53);
        assert_eq!(info.x, wt.width + 1);
        assert_eq!(wt.width + 1 + info.width, 120);
        assert!(commit.height <= 11);
        let gs = dims.git_status.unwrap();
        assert_eq!(info.height + gs.height + commit.height + 2, 38);
    }

    #[test]
    fn left_minimum_wins_when_both_bind() {
        let dims = compute(&input(60, 30, Pane::Info));
        let wt = dims.worktrees.unwrap();
        let info = dims.info.unwrap();
        assert_eq!(wt.width, MIN_LEFT_WIDTH);
        assert_eq!(info.width, 60 - 1 - MIN_LEFT_WIDTH);
    }

    #[test]
    fn zoom_gives_body_to_one_pane() {
        let mut i = input(100, 30, Pane::Commit);
        i.zoom = Some(Pane::Commit);
        i.showing_filter = true;
        let dims = compute(&i);
        assert_eq!(dims.commit, Some(dims.body));
        assert!(dims.worktrees.is_none() && dims.info.is_none());
        assert_eq!(dims.body.y, 2);
        assert_eq!(dims.body.height, 27);
    }

    #[test]
    fn clean_tree_hides_git_status() {
        let mut i = input(120, 40, Pane::Info);
        i.has_git_status = false;
        let dims = compute(&i);
        assert!(dims.git_status.is_none());
        let info = dims.info.unwrap();
        let commit = dims.commit.unwrap();
        assert_eq!(info.height + commit.height + 1, 38);
    }

    #[test]
    fn notes_split_left_column() {
        let mut i = input(120, 40, Pane::Notes);
        i.has_notes = true;
        let dims = compute(&i);
        let wt = dims.worktrees.unwrap();
        let notes = dims.notes.unwrap();
        assert_eq!(wt.height + notes.height + 1, 38);
        assert_eq!(notes.height, 18);
        assert!(dims.commit.unwrap().height <= notes.height);
    }

    #[test]
    fn top_layout_trims_commit_first() {
        let mut i = input(100, 40, Pane::Worktrees);
        i.mode = LayoutMode::Top;
        let dims = compute(&i);
        let info = dims.info.unwrap();
        let gs = dims.git_status.unwrap();
        let commit = dims.commit.unwrap();
        assert_eq!(dims.worktrees.unwrap().width, 100);
        assert!(info.width + gs.width + commit.width + 2 <= 100);
        assert_eq!(info.width, MIN_LEFT_WIDTH);
        assert_eq!(gs.width, MIN_RIGHT_WIDTH);
        assert_eq!(commit.width, 100 - 2 - MIN_LEFT_WIDTH - MIN_RIGHT_WIDTH);
    }

    #[test]
    fn small_terminals_keep_panes_inside_body() {
        let inside = |outer: Rect, r: Rect| {
            r.x >= outer.x && r.y >= outer.y && r.right() <= outer.right() && r.bottom() <= outer.bottom()
        };
        for (w, h) in [(80, 12), (60, 10), (30, 8), (20, 6), (10, 3), (1, 1)] {
            for mode in [LayoutMode::Default, LayoutMode::Top] {
                for has_notes in [false, true] {
                    for focus in Pane::ALL {
                        let mut i = input(w, h, focus);
                        i.mode = mode;
                        i.has_notes = has_notes;
                        let dims = compute(&i);
                        let screen = Rect::new(0, 0, w, h);
                        assert!(inside(screen, dims.body), "{w}x{h} {mode:?} body");
                        assert!(inside(screen, dims.header) && inside(screen, dims.footer));
                        for pane in Pane::ALL {
                            if let Some(r) = dims.pane(pane) {
                                assert!(
                                    inside(dims.body, r) && !r.is_empty(),
                                    "{w}x{h} {mode:?} notes={has_notes} {pane:?}: {r:?}"
                                );
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn pane_at_finds_rect() {
        let dims = compute(&input(120, 40, Pane::Worktrees));
        assert_eq!(dims.pane_at(2, 5), Some(Pane::Worktrees));
        let info = dims.info.unwrap();
        assert_eq!(dims.pane_at(info.x + 1, info.y + 1), Some(Pane::Info));
        assert_eq!(dims.pane_at(0, 0), None);
    }

    #[test]
    fn table_columns_shrink_in_order() {
        let wide = table_columns(80, true);
        assert_eq!((wide.status, wide.last, wide.pr), (10, 15, Some(12)));
        assert_eq!(wide.name, 80 - 10 - 15 - 12 - 9);

        let narrow = table_columns(40, true);
        assert_eq!(narrow.last, 10);
        assert_eq!(narrow.pr, Some(8));
        assert_eq!(narrow.status, 6);
        assert_eq!(narrow.name, 7);

        let no_pr = table_columns(60, false);
        assert_eq!(no_pr.pr, None);
        assert_eq!(no_pr.name, 60 - 10 - 15 - 6);
    }
}
