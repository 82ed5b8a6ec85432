#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::models::WorktreeInfo;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    Path,
    Active,
    #[default]
    #[serde(alias = "last_switched")]
    Switched,
}

impl SortMode {
    #[must_use]
    pub fn next(self) -> Self {
        match self {
            Self::Path => Self::Active,
            Self::Active => Self::Switched,
            Self::Switched => Self::Path,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Path => "Path",
            Self::Active => "Last Active",
            Self::Switched => "Last Switched",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "path" => Some(Self::Path),
            "active" => Some(Self::Active),
            "switched" | "last_switched" => Some(Self::Switched),
            _ => None,
        }
    }
}

/// Main first, then by sort mode with path as the tie-break.
fn compare(mode: SortMode, a: &WorktreeInfo, b: &WorktreeInfo) -> Ordering {
    b.is_main.cmp(&a.is_main).then_with(|| {
        let primary = match mode {
            SortMode::Path => Ordering::Equal,
            SortMode::Active => b.last_active_ts.cmp(&a.last_active_ts),
            SortMode::Switched => b.last_switched_ts.cmp(&a.last_switched_ts),
        };
        primary.then_with(|| a.path.cmp(&b.path))
    })
}

#[must_use]
pub fn matches_filter(wt: &WorktreeInfo, query: &str) -> bool {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return true;
    }
    wt.branch.to_lowercase().contains(&q)
        || wt.basename().to_lowercase().contains(&q)
        || (wt.is_main && wt.display_name().contains(&q))
}

/// In-memory worktree catalog with a filtered view and one selection cursor.
#[derive(Debug, Default)]
pub struct WorktreeRegistry {
    worktrees: Vec<WorktreeInfo>,
    filtered: Vec<usize>,
    selected: usize,
    sort_mode: SortMode,
    filter_query: String,
    access: HashMap<String, i64>,
}

impl WorktreeRegistry {
    #[must_use]
    pub fn new(sort_mode: SortMode, access: HashMap<String, i64>) -> Self {
        Self {
            sort_mode,
            access,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn sort_mode(&self) -> SortMode {
        self.sort_mode
    }

    #[must_use]
    pub fn filter_query(&self) -> &str {
        &self.filter_query
    }

    #[must_use]
    pub fn access(&self) -> &HashMap<String, i64> {
        &self.access
    }

    #[must_use]
    pub fn all(&self) -> &[WorktreeInfo] {
        &self.worktrees
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.worktrees.is_empty()
    }

    pub fn visible(&self) -> impl Iterator<Item = &WorktreeInfo> {
        self.filtered.iter().filter_map(|&i| self.worktrees.get(i))
    }

    #[must_use]
    pub fn visible_len(&self) -> usize {
        self.filtered.len()
    }

    #[must_use]
    pub fn selected_index(&self) -> usize {
        self.selected
    }

    /// Table cursor; always equal to the selected index.
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.selected
    }

    #[must_use]
    pub fn selected(&self) -> Option<&WorktreeInfo> {
        self.filtered
            .get(self.selected)
            .and_then(|&i| self.worktrees.get(i))
    }

    #[must_use]
    pub fn main_worktree(&self) -> Option<&WorktreeInfo> {
        self.worktrees.iter().find(|w| w.is_main)
    }

    #[must_use]
    pub fn find_by_path(&self, path: &str) -> Option<&WorktreeInfo> {
        self.worktrees.iter().find(|w| w.path == path)
    }

    #[must_use]
    pub fn find_by_branch(&self, branch: &str) -> Option<&WorktreeInfo> {
        self.worktrees.iter().find(|w| w.branch == branch)
    }

    /// Applies `f` to the worktree at `path`; returns false when absent.
    pub fn update<F: FnOnce(&mut WorktreeInfo)>(&mut self, path: &str, f: F) -> bool {
        match self.worktrees.iter_mut().find(|w| w.path == path) {
            Some(wt) => {
                f(wt);
                true
            }
            None => false,
        }
    }

    pub fn for_each_mut<F: FnMut(&mut WorktreeInfo)>(&mut self, f: F) {
        self.worktrees.iter_mut().for_each(f);
    }

    /// Replaces the catalog after a scan. A pending path becomes the
    /// selection and gets a fresh access stamp; otherwise row 0.
    pub fn set_worktrees(
        &mut self,
        mut worktrees: Vec<WorktreeInfo>,
        pending_select: Option<&str>,
        now: i64,
    ) {
        if let Some(path) = pending_select {
            self.access.insert(path.to_owned(), now);
        }
        for wt in &mut worktrees {
            if let Some(ts) = self.access.get(&wt.path) {
                wt.last_switched_ts = *ts;
            }
        }
        self.worktrees = worktrees;
        self.resort();
        self.refilter();
        self.selected = 0;
        if let Some(path) = pending_select {
            self.select_path(path);
        }
    }

    pub fn set_sort_mode(&mut self, mode: SortMode) {
        let keep = self.selected().map(|w| w.path.clone());
        self.sort_mode = mode;
        self.resort();
        self.refilter();
        self.restore(keep.as_deref());
    }

    pub fn cycle_sort(&mut self) -> SortMode {
        self.set_sort_mode(self.sort_mode.next());
        self.sort_mode
    }

    pub fn set_filter(&mut self, query: &str) {
        let keep = self.selected().map(|w| w.path.clone());
        query.clone_into(&mut self.filter_query);
        self.refilter();
        self.restore(keep.as_deref());
    }

    /// Single setter for cursor and selection; clamps into range.
    pub fn select_index(&mut self, index: usize) {
        self.selected = if self.filtered.is_empty() {
            0
        } else {
            index.min(self.filtered.len() - 1)
        };
    }

    pub fn move_selection(&mut self, delta: isize) {
        let target = self.selected.saturating_add_signed(delta);
        self.select_index(target);
    }

    pub fn select_path(&mut self, path: &str) -> bool {
        let pos = self
            .filtered
            .iter()
            .position(|&i| self.worktrees.get(i).is_some_and(|w| w.path == path));
        match pos {
            Some(pos) => {
                self.select_index(pos);
                true
            }
            None => false,
        }
    }

    /// Steps through the full sorted list, sets the filter to the target's
    /// name and selects it. Returns the new filter query.
    pub fn filter_step(&mut self, forward: bool) -> Option<String> {
        let mut order: Vec<usize> = (0..self.worktrees.len()).collect();
        order.sort_by(|&a, &b| compare(self.sort_mode, &self.worktrees[a], &self.worktrees[b]));
        if order.is_empty() {
            return None;
        }
        let current = self
            .selected()
            .and_then(|sel| order.iter().position(|&i| self.worktrees[i].path == sel.path));
        let target = match (current, forward) {
            (None, true) => 0,
            (None, false) => order.len() - 1,
            (Some(i), true) => (i + 1).min(order.len() - 1),
            (Some(i), false) => i.saturating_sub(1),
        };
        let wt = &self.worktrees[order[target]];
        let (name, path) = (wt.display_name(), wt.path.clone());
        self.set_filter(&name);
        self.select_path(&path);
        Some(name)
    }

    /// Records a switch to `path` so it sorts first under LastSwitched.
    pub fn record_access(&mut self, path: &str, now: i64) {
        self.access.insert(path.to_owned(), now);
        let keep = self.selected().map(|w| w.path.clone());
        self.update(path, |w| w.last_switched_ts = now);
        if self.sort_mode == SortMode::Switched {
            self.resort();
            self.refilter();
            self.restore(keep.as_deref());
        }
    }

    pub fn rename_branch(&mut self, path: &str, branch: &str) {
        self.update(path, |w| branch.clone_into(&mut w.branch));
        self.refilter();
        self.select_index(self.selected);
    }

    pub fn rename_path(&mut self, old: &str, new: &str) {
        if let Some(ts) = self.access.remove(old) {
            self.access.insert(new.to_owned(), ts);
        }
        self.update(old, |w| new.clone_into(&mut w.path));
        self.resort();
        self.refilter();
        self.select_path(new);
    }

    fn resort(&mut self) {
        let mode = self.sort_mode;
        self.worktrees.sort_by(|a, b| compare(mode, a, b));
    }

    fn refilter(&mut self) {
        let query = self.filter_query.clone();
        self.filtered = self
            .worktrees
            .iter()
            .enumerate()
            .filter(|(_, w)| matches_filter(w, &query))
            .map(|(i, _)| i)
            .collect();
        self.select_index(self.selected);
    }

    fn restore(&mut self, path: Option<&str>) {
        if path.is_some_and(|p| self.select_path(p)) {
            return;
        }
        self.select_index(self.selected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wt(path: &str, branch: &str, is_main: bool) -> WorktreeInfo {
        WorktreeInfo::new(path, branch, is_main)
    }

    fn registry(mode: SortMode) -> WorktreeRegistry {
        let mut reg = WorktreeRegistry::new(mode, HashMap::new());
        reg.set_worktrees(
            vec![
                wt("/w/gamma", "gamma", false),
                wt("/repo", "main", true),
                wt("/w/beta", "beta", false),
                wt("/w/alpha", "alpha", false),
            ],
            None,
            0,
        );
        reg
    }

    fn names(reg: &WorktreeRegistry) -> Vec<String> {
        reg.visible().map(WorktreeInfo::display_name).collect()
    }

    fn assert_bounds(reg: &WorktreeRegistry) {
        if reg.visible_len() > 0 {
            assert!(reg.selected_index() < reg.visible_len());
        }
        assert_eq!(reg.cursor(), reg.selected_index());
        assert!(reg.visible_len() <= reg.all().len());
    }

    #[test]
    fn path_sort_keeps_main_first() {
        let reg = registry(SortMode::Path);
        assert_eq!(names(&reg), vec!["main", "alpha", "beta", "gamma"]);
    }

    #[test]
    fn switched_sort_ties_fall_back_to_path() {
        let mut reg = registry(SortMode::Switched);
        assert_eq!(names(&reg), vec!["main", "alpha", "beta", "gamma"]);
        reg.record_access("/w/gamma", 100);
        assert_eq!(names(&reg), vec!["main", "gamma", "alpha", "beta"]);
    }

    #[test]
    fn filter_is_idempotent_and_keeps_bounds() {
        let mut reg = registry(SortMode::Path);
        reg.select_index(3);
        reg.set_filter("ALP");
        let first = names(&reg);
        reg.set_filter("ALP");
        assert_eq!(first, names(&reg));
        assert_eq!(first, vec!["alpha"]);
        assert_bounds(&reg);
        reg.set_filter("zzz");
        assert_eq!(reg.visible_len(), 0);
        assert!(reg.selected().is_none());
        assert_bounds(&reg);
    }

    #[test]
    fn alt_n_walks_the_full_sorted_list() {
        let mut reg = registry(SortMode::Path);
        reg.set_filter("alpha");
        assert_eq!(reg.selected().unwrap().branch, "alpha");
        let query = reg.filter_step(true).unwrap();
        assert_eq!(query, "beta");
        assert_eq!(reg.filter_query(), "beta");
        assert_eq!(reg.selected().unwrap().branch, "beta");
        assert_eq!(reg.filter_step(false).as_deref(), Some("alpha"));
    }

    #[test]
    fn pending_select_wins_after_reload() {
        let mut reg = registry(SortMode::Switched);
        let wts = reg.all().to_vec();
        reg.set_worktrees(wts, Some("/w/beta"), 500);
        assert_eq!(reg.selected().unwrap().path, "/w/beta");
        assert_eq!(reg.selected_index(), 1);
        assert_eq!(reg.access().get("/w/beta"), Some(&500));
    }

    #[test]
    fn rename_updates_in_place() {
        let mut reg = registry(SortMode::Path);
        reg.rename_branch("/w/beta", "beta-2");
        assert!(reg.find_by_branch("beta-2").is_some());
        reg.rename_path("/w/beta", "/w/delta");
        assert_eq!(reg.selected().unwrap().path, "/w/delta");
        assert_bounds(&reg);
    }

    #[test]
    fn move_selection_clamps() {
        let mut reg = registry(SortMode::Path);
        reg.move_selection(-5);
        assert_eq!(reg.selected_index(), 0);
        reg.move_selection(10);
        assert_eq!(reg.selected_index(), 3);
        assert_bounds(&reg);
    }
}
