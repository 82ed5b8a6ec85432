#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::core::models::WorktreeInfo;
use crate::core::notes::NotesStore;

static CHECKBOX_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*[-*+]\s+\[)([ xX])(\]\s*)(.*)$").expect("checkbox pattern")
});
static KEYWORD_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)(TODO|DONE)(:?\s*)(.*)$").expect("keyword pattern"));

const UNTITLED: &str = "(untitled task)";
pub const EMPTY_TASKBOARD: &str = "No tasks yet. Press a to add one.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRef {
    pub id: String,
    pub worktree_path: String,
    pub line_index: usize,
    pub checked: bool,
    pub text: String,
    pub is_keyword: bool,
}

fn parse_line(line: &str) -> Option<(bool, String, bool)> {
    if let Some(caps) = CHECKBOX_LINE.captures(line) {
        let checked = caps[2].eq_ignore_ascii_case("x");
        return Some((checked, task_text(&caps[4]), false));
    }
    let caps = KEYWORD_LINE.captures(line)?;
    Some((&caps[2] == "DONE", task_text(&caps[4]), true))
}

fn task_text(raw: &str) -> String {
    let text = raw.trim();
    if text.is_empty() {
        UNTITLED.to_owned()
    } else {
        text.to_owned()
    }
}

fn clean_path(path: &str) -> String {
    Path::new(path)
        .components()
        .collect::<PathBuf>()
        .to_string_lossy()
        .to_string()
}

/// Markdown checkboxes and `TODO`/`DONE` lines, keyed `<path>:<line>`.
#[must_use]
pub fn extract_tasks(worktree_path: &str, note: &str) -> Vec<TaskRef> {
    let normalized = note.replace("\r\n", "\n");
    let clean = clean_path(worktree_path);
    normalized
        .split('\n')
        .enumerate()
        .filter_map(|(i, line)| {
            let (checked, text, is_keyword) = parse_line(line)?;
            Some(TaskRef {
                id: format!("{clean}:{i}"),
                worktree_path: worktree_path.to_owned(),
                line_index: i,
                checked,
                text,
                is_keyword,
            })
        })
        .collect()
}

/// Flips the marker on one line and leaves every other byte alone.
#[must_use]
pub fn toggle_task(note: &str, line_index: usize, is_keyword: bool) -> Option<String> {
    let normalized = note.replace("\r\n", "\n");
    let mut lines: Vec<String> = normalized.split('\n').map(str::to_owned).collect();
    let line = lines.get(line_index)?;
    let (pattern, group) = if is_keyword {
        (&*KEYWORD_LINE, 2)
    } else {
        (&*CHECKBOX_LINE, 2)
    };
    let m = pattern.captures(line)?.get(group)?;
    let replacement = match (is_keyword, m.as_str()) {
        (true, "TODO") => "DONE",
        (true, _) => "TODO",
        (false, "x" | "X") => " ",
        (false, _) => "x",
    };
    let updated = format!("{}{}{}", &line[..m.start()], replacement, &line[m.end()..]);
    lines[line_index] = updated;
    Some(lines.join("\n"))
}

#[must_use]
pub fn append_task(note: Option<&str>, text: &str) -> String {
    match note.filter(|n| !n.trim().is_empty()) {
        Some(existing) => format!("{}\n- [ ] {text}", existing.trim_end_matches('\n')),
        None => format!("- [ ] {text}"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskboardSection {
    pub label: String,
    pub worktree_path: String,
    pub open: usize,
    pub done: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskboardItem {
    Section(TaskboardSection),
    Task { task: TaskRef, worktree_name: String },
}

impl TaskboardItem {
    #[must_use]
    pub fn task(&self) -> Option<&TaskRef> {
        match self {
            Self::Task { task, .. } => Some(task),
            Self::Section(_) => None,
        }
    }

    #[must_use]
    pub fn worktree_path(&self) -> &str {
        match self {
            Self::Section(s) => &s.worktree_path,
            Self::Task { task, .. } => &task.worktree_path,
        }
    }
}

/// Sections per worktree with tasks, ordered by name then path.
#[must_use]
pub fn build_taskboard(worktrees: &[WorktreeInfo], notes: &NotesStore) -> Vec<TaskboardItem> {
    let mut sorted: Vec<&WorktreeInfo> = worktrees
        .iter()
        .filter(|w| !w.path.trim().is_empty())
        .collect();
    sorted.sort_by(|a, b| {
        a.display_name()
            .cmp(&b.display_name())
            .then_with(|| a.path.cmp(&b.path))
    });

    let mut items = Vec::new();
    for wt in sorted {
        let Some(note) = notes.get(&wt.path) else {
            continue;
        };
        let tasks = extract_tasks(&wt.path, &note.note);
        if tasks.is_empty() {
            continue;
        }
        let done = tasks.iter().filter(|t| t.checked).count();
        let name = wt.display_name();
        items.push(TaskboardItem::Section(TaskboardSection {
            label: name.clone(),
            worktree_path: wt.path.clone(),
            open: tasks.len() - done,
            done,
            total: tasks.len(),
        }));
        items.extend(tasks.into_iter().map(|task| TaskboardItem::Task {
            task,
            worktree_name: name.clone(),
        }));
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_checkboxes_and_keywords() {
        let note = "# Plan\r\n- [ ] Write tests\n  * [X] ship it\nTODO: refactor\nDONE\n- [ ]   \n";
        let tasks = extract_tasks("/w/./feat/", note);
        assert_eq!(tasks.len(), 5);
        assert_eq!(tasks[0].id, "/w/feat:1");
        assert!(!tasks[0].checked);
        assert!(tasks[1].checked);
        assert!(tasks[2].is_keyword && !tasks[2].checked);
        assert_eq!(tasks[3].text, "(untitled task)");
        assert!(tasks[3].checked);
        assert_eq!(tasks[4].text, "(untitled task)");
    }

    #[test]
    fn toggling_checkbox_changes_only_marker() {
        let note = "- [ ] Write tests\n- [x] done already";
        assert_eq!(
            toggle_task(note, 0, false).unwrap(),
            "- [x] Write tests\n- [x] done already"
        );
        let indented = "    - [X] keep   ";
        assert_eq!(toggle_task(indented, 0, false).unwrap(), "    - [ ] keep   ");
    }

    #[test]
    fn toggling_keyword_preserves_indent_and_tail() {
        let note = "notes\n   TODO: call Bob  ";
        assert_eq!(
            toggle_task(note, 1, true).unwrap(),
            "notes\n   DONE: call Bob  "
        );
        assert_eq!(toggle_task("DONE later", 0, true).unwrap(), "TODO later");
        assert!(toggle_task("plain", 0, true).is_none());
        assert!(toggle_task("plain", 4, false).is_none());
    }

    #[test]
    fn append_adds_unchecked_item() {
        assert_eq!(append_task(None, "x"), "- [ ] x");
        assert_eq!(append_task(Some("  "), "x"), "- [ ] x");
        assert_eq!(append_task(Some("intro\n\n"), "x"), "intro\n- [ ] x");
    }

    #[test]
    fn taskboard_groups_by_worktree_name() {
        let mut notes = NotesStore::new("r", Path::new("/wts"), None);
        notes.set("/w/zeta", "- [ ] z1\n- [x] z2", 1);
        notes.set("/w/alpha", "TODO: a1", 1);
        notes.set("/w/empty", "just prose", 1);
        let wts = vec![
            WorktreeInfo::new("/w/zeta", "zeta", false),
            WorktreeInfo::new("/w/alpha", "alpha", false),
            WorktreeInfo::new("/w/empty", "empty", false),
        ];
        let items = build_taskboard(&wts, &notes);
        assert_eq!(items.len(), 5);
        match &items[0] {
            TaskboardItem::Section(s) => assert_eq!(s.label, "alpha"),
            other => panic!("expected section, got {other:?}"),
        }
        match &items[2] {
            TaskboardItem::Section(s) => {
                assert_eq!((s.open, s.done, s.total), (1, 1, 2));
            }
            other => panic!("expected section, got {other:?}"),
        }
    }
}
