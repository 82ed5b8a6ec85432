#![forbid(unsafe_code)]

use std::collections::{BTreeMap, HashSet};

use crate::core::models::StatusFile;

/// Parses `git status --porcelain=v2` output. Unknown record types are skipped.
#[must_use]
pub fn parse_status_v2(raw: &str) -> Vec<StatusFile> {
    let mut files = Vec::new();
    for line in raw.trim_end_matches('\n').lines() {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 2 {
            continue;
        }
        let (status, filename, is_untracked) = match fields[0] {
            // 1 <XY> <sub> <mH> <mI> <mW> <hH> <hI> <path>
            "1" if fields.len() >= 9 => (fields[1], fields[8], false),
            "?" => (" ?", fields[1], true),
            // 2 <XY> <sub> <mH> <mI> <mW> <hH> <hI> <X><score> <path>\t<orig>
            "2" if fields.len() >= 10 => (fields[1], fields[9], false),
            _ => continue,
        };
        files.push(StatusFile {
            filename: filename.to_owned(),
            status: status.to_owned(),
            is_untracked,
        });
    }
    files
}

/// `(staged, modified, untracked)` counters for a file set.
#[must_use]
pub fn status_counts(files: &[StatusFile]) -> (u32, u32, u32) {
    let (mut staged, mut modified, mut untracked) = (0, 0, 0);
    for file in files {
        if file.is_untracked {
            untracked += 1;
            continue;
        }
        let mut chars = file.status.chars();
        if chars.next().is_some_and(|c| c != '.' && c != ' ') {
            staged += 1;
        }
        if chars.next().is_some_and(|c| c != '.' && c != ' ') {
            modified += 1;
        }
    }
    (staged, modified, untracked)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusTreeNode {
    Directory {
        path: String,
        children: Vec<StatusTreeNode>,
    },
    File {
        file: StatusFile,
    },
}

impl StatusTreeNode {
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Directory { path, .. } => path,
            Self::File { file } => &file.filename,
        }
    }
}

#[derive(Default)]
struct DirBuilder {
    dirs: BTreeMap<String, DirBuilder>,
    files: Vec<StatusFile>,
}

impl DirBuilder {
    fn insert(&mut self, components: &[&str], file: StatusFile) {
        match components {
            [] | [_] => self.files.push(file),
            [dir, rest @ ..] => self
                .dirs
                .entry((*dir).to_owned())
                .or_default()
                .insert(rest, file),
        }
    }

    fn build(self, prefix: &str) -> Vec<StatusTreeNode> {
        let mut nodes = Vec::with_capacity(self.dirs.len() + self.files.len());
        for (name, dir) in self.dirs {
            let path = if prefix.is_empty() {
                name
            } else {
                format!("{prefix}/{name}")
            };
            let children = dir.build(&path);
            nodes.push(StatusTreeNode::Directory { path, children });
        }
        let mut files = self.files;
        files.sort_by(|a, b| a.filename.cmp(&b.filename));
        nodes.extend(files.into_iter().map(|file| StatusTreeNode::File { file }));
        nodes
    }
}

/// Groups files by directory: directories first, then files, both by name.
#[must_use]
pub fn build_tree(files: &[StatusFile]) -> Vec<StatusTreeNode> {
    let mut root = DirBuilder::default();
    for file in files {
        let components: Vec<&str> = file.filename.split('/').collect();
        root.insert(&components, file.clone());
    }
    root.build("")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlatKind {
    Directory { collapsed: bool },
    File(StatusFile),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatEntry {
    pub path: String,
    pub depth: usize,
    pub kind: FlatKind,
}

impl FlatEntry {
    #[must_use]
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    #[must_use]
    pub fn is_dir(&self) -> bool {
        matches!(self.kind, FlatKind::Directory { .. })
    }
}

/// Collapsible status tree with a flattened cursor view.
#[derive(Debug, Default)]
pub struct StatusTree {
    all: Vec<StatusFile>,
    filter: String,
    nodes: Vec<StatusTreeNode>,
    collapsed: HashSet<String>,
    flat: Vec<FlatEntry>,
    index: usize,
}

impl StatusTree {
    pub fn set_files(&mut self, files: Vec<StatusFile>) {
        self.all = files;
        self.rebuild();
    }

    pub fn set_filter(&mut self, query: &str) {
        query.trim().to_lowercase().clone_into(&mut self.filter);
        self.rebuild();
    }

    #[must_use]
    pub fn filter(&self) -> &str {
        &self.filter
    }

    #[must_use]
    pub fn all_files(&self) -> &[StatusFile] {
        &self.all
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    #[must_use]
    pub fn flat(&self) -> &[FlatEntry] {
        &self.flat
    }

    #[must_use]
    pub fn nodes(&self) -> &[StatusTreeNode] {
        &self.nodes
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn selected(&self) -> Option<&FlatEntry> {
        self.flat.get(self.index)
    }

    pub fn set_index(&mut self, index: usize) {
        self.index = index;
        self.clamp();
    }

    pub fn move_cursor(&mut self, delta: isize) {
        self.set_index(self.index.saturating_add_signed(delta));
    }

    /// Toggles the selected directory; files are left alone.
    pub fn toggle_collapse(&mut self) -> bool {
        let Some(entry) = self.selected() else {
            return false;
        };
        if !entry.is_dir() {
            return false;
        }
        let path = entry.path.clone();
        if !self.collapsed.remove(&path) {
            self.collapsed.insert(path.clone());
        }
        self.rebuild_flat();
        self.restore_selection(&path);
        true
    }

    /// Files at or below the selected entry.
    #[must_use]
    pub fn selected_files(&self) -> Vec<&StatusFile> {
        let Some(entry) = self.selected() else {
            return Vec::new();
        };
        match &entry.kind {
            FlatKind::File(f) => vec![f],
            FlatKind::Directory { .. } => {
                let prefix = format!("{}/", entry.path);
                self.all
                    .iter()
                    .filter(|f| f.filename.starts_with(&prefix))
                    .collect()
            }
        }
    }

    pub fn restore_selection(&mut self, path: &str) {
        if let Some(pos) = self.flat.iter().position(|e| e.path == path) {
            self.index = pos;
        }
        self.clamp();
    }

    fn clamp(&mut self) {
        self.index = if self.flat.is_empty() {
            0
        } else {
            self.index.min(self.flat.len() - 1)
        };
    }

    fn rebuild(&mut self) {
        let keep = self.selected().map(|e| e.path.clone());
        let visible: Vec<StatusFile> = if self.filter.is_empty() {
            self.all.clone()
        } else {
            self.all
                .iter()
                .filter(|f| f.filename.to_lowercase().contains(&self.filter))
                .cloned()
                .collect()
        };
        self.nodes = build_tree(&visible);
        self.rebuild_flat();
        match keep {
            Some(path) => self.restore_selection(&path),
            None => self.clamp(),
        }
    }

    fn rebuild_flat(&mut self) {
        let mut flat = Vec::new();
        flatten(&self.nodes, 0, &self.collapsed, &mut flat);
        self.flat = flat;
    }
}

fn flatten(
    nodes: &[StatusTreeNode],
    depth: usize,
    collapsed: &HashSet<String>,
    out: &mut Vec<FlatEntry>,
) {
    for node in nodes {
        match node {
            StatusTreeNode::Directory { path, children } => {
                let is_collapsed = collapsed.contains(path);
                out.push(FlatEntry {
                    path: path.clone(),
                    depth,
                    kind: FlatKind::Directory {
                        collapsed: is_collapsed,
                    },
                });
                if !is_collapsed {
                    flatten(children, depth + 1, collapsed, out);
                }
            }
            StatusTreeNode::File { file } => out.push(FlatEntry {
                path: file.filename.clone(),
                depth,
                kind: FlatKind::File(file.clone()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &str = "# branch.oid abc\n\
1 .M N... 100644 100644 100644 aaa bbb src/main.rs\n\
1 M. N... 100644 100644 100644 aaa bbb src/core/git.rs\n\
2 R. N... 100644 100644 100644 aaa bbb R100 docs/new.md\tdocs/old.md\n\
? notes.txt\n\
u UU N... 100644 100644 100644 100644 a b c conflict.rs\n\
1 short\n";

    fn files_in(nodes: &[StatusTreeNode], out: &mut Vec<String>) {
        for n in nodes {
            match n {
                StatusTreeNode::Directory { children, .. } => files_in(children, out),
                StatusTreeNode::File { file } => out.push(file.filename.clone()),
            }
        }
    }

    #[test]
    fn parses_v2_records() {
        let files = parse_status_v2(RAW);
        assert_eq!(files.len(), 4);
        assert_eq!(files[0].status, ".M");
        assert_eq!(files[2].filename, "docs/new.md");
        assert_eq!(files[3].status, " ?");
        assert!(files[3].is_untracked);
    }

    #[test]
    fn counts_follow_xy_columns() {
        let files = parse_status_v2(RAW);
        assert_eq!(status_counts(&files), (2, 1, 1));
    }

    #[test]
    fn tree_contains_every_file_once() {
        let files = parse_status_v2(RAW);
        let mut got = Vec::new();
        files_in(&build_tree(&files), &mut got);
        let mut want: Vec<String> = files.iter().map(|f| f.filename.clone()).collect();
        got.sort();
        want.sort();
        assert_eq!(got, want);
    }

    #[test]
    fn flat_view_lists_dirs_before_files() {
        let mut tree = StatusTree::default();
        tree.set_files(parse_status_v2(RAW));
        let paths: Vec<&str> = tree.flat().iter().map(|e| e.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "docs",
                "docs/new.md",
                "src",
                "src/core",
                "src/core/git.rs",
                "src/main.rs",
                "notes.txt"
            ]
        );
        assert_eq!(tree.flat()[4].depth, 2);
    }

    #[test]
    fn collapse_survives_filter_and_clamps_cursor() {
        let mut tree = StatusTree::default();
        tree.set_files(parse_status_v2(RAW));
        tree.set_index(2);
        assert!(tree.toggle_collapse());
        assert_eq!(tree.selected().unwrap().path, "src");
        assert_eq!(tree.flat().len(), 4);
        assert_eq!(tree.selected_files().len(), 2);

        tree.set_filter("rs");
        assert!(
            tree.flat()
                .iter()
                .any(|e| e.path == "src" && e.kind == FlatKind::Directory { collapsed: true })
        );
        tree.set_index(99);
        assert_eq!(tree.index(), tree.flat().len() - 1);

        tree.set_filter("nothing-matches");
        assert!(tree.flat().is_empty());
        assert_eq!(tree.index(), 0);
        assert!(tree.selected().is_none());
    }
}
