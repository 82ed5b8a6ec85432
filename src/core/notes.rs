#![forbid(unsafe_code)]

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::models::WorktreeNote;
use crate::core::persistence::{NOTES_FILE, read_json, write_json};

type NoteMap = BTreeMap<String, WorktreeNote>;

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
enum SharedFile {
    ByRepo(BTreeMap<String, NoteMap>),
    Flat(NoteMap),
}

/// Per-worktree markdown notes, stored per repo or in one shared file.
#[derive(Debug, Clone)]
pub struct NotesStore {
    repo_key: String,
    worktree_dir: PathBuf,
    shared_path: Option<PathBuf>,
    notes: NoteMap,
}

impl NotesStore {
    #[must_use]
    pub fn new(repo_key: &str, worktree_dir: &Path, shared_path: Option<PathBuf>) -> Self {
        Self {
            repo_key: repo_key.to_owned(),
            worktree_dir: worktree_dir.to_path_buf(),
            shared_path: shared_path.filter(|p| !p.as_os_str().is_empty()),
            notes: NoteMap::new(),
        }
    }

    /// Absolute path in per-repo mode; relative to `<worktree_dir>/<repo_key>`
    /// (basename when outside) in shared mode.
    #[must_use]
    pub fn key_for(&self, worktree_path: &str) -> String {
        if self.shared_path.is_none() {
            return worktree_path.to_owned();
        }
        let base = self.worktree_dir.join(&self.repo_key);
        let path = Path::new(worktree_path);
        match path.strip_prefix(&base) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel.to_string_lossy().to_string(),
            _ => path
                .file_name()
                .map_or_else(|| worktree_path.to_owned(), |n| n.to_string_lossy().to_string()),
        }
    }

    fn repo_file(&self) -> PathBuf {
        self.worktree_dir.join(&self.repo_key).join(NOTES_FILE)
    }

    pub fn load(&mut self) {
        self.notes = match &self.shared_path {
            None => read_json::<NoteMap>(&self.repo_file()).unwrap_or_default(),
            Some(shared) => match read_json::<SharedFile>(shared) {
                Some(SharedFile::ByRepo(mut repos)) => {
                    repos.remove(&self.repo_key).unwrap_or_default()
                }
                Some(SharedFile::Flat(flat)) => flat,
                None => NoteMap::new(),
            },
        };
        debug!(count = self.notes.len(), "notes loaded");
    }

    pub fn save(&mut self) -> anyhow::Result<()> {
        normalize(&mut self.notes);
        match self.shared_path.clone() {
            None => {
                let path = self.repo_file();
                if self.notes.is_empty() {
                    remove_if_exists(&path)
                } else {
                    write_json(&path, &self.notes)
                }
            }
            Some(shared) => {
                let mut repos = match read_json::<SharedFile>(&shared) {
                    Some(SharedFile::ByRepo(repos)) => repos,
                    _ => BTreeMap::new(),
                };
                if self.notes.is_empty() {
                    repos.remove(&self.repo_key);
                } else {
                    repos.insert(self.repo_key.clone(), self.notes.clone());
                }
                if repos.is_empty() {
                    remove_if_exists(&shared)
                } else {
                    write_json(&shared, &repos)
                }
            }
        }
    }

    #[must_use]
    pub fn get(&self, worktree_path: &str) -> Option<&WorktreeNote> {
        self.notes.get(&self.key_for(worktree_path))
    }

    #[must_use]
    pub fn has_note(&self, worktree_path: &str) -> bool {
        self.get(worktree_path).is_some_and(|n| !n.note.trim().is_empty())
    }

    /// Stores a trimmed note; empty text removes it.
    pub fn set(&mut self, worktree_path: &str, text: &str, now: i64) {
        let key = self.key_for(worktree_path);
        let text = text.trim();
        if text.is_empty() {
            self.notes.remove(&key);
        } else {
            self.notes.insert(
                key,
                WorktreeNote {
                    note: text.to_owned(),
                    updated_at: now,
                },
            );
        }
    }

    pub fn delete(&mut self, worktree_path: &str) -> bool {
        let key = self.key_for(worktree_path);
        self.notes.remove(&key).is_some()
    }

    pub fn migrate(&mut self, old_path: &str, new_path: &str) -> bool {
        let old = self.key_for(old_path);
        let Some(note) = self.notes.remove(&old) else {
            return false;
        };
        let new = self.key_for(new_path);
        self.notes.insert(new, note);
        true
    }

    /// Drops notes whose worktree no longer exists; true when anything changed.
    pub fn prune(&mut self, existing_paths: &[&str]) -> bool {
        let live: HashSet<String> = existing_paths.iter().map(|p| self.key_for(p)).collect();
        let before = self.notes.len();
        self.notes.retain(|k, _| live.contains(k));
        before != self.notes.len()
    }
}

fn normalize(notes: &mut NoteMap) {
    notes.retain(|_, n| {
        let trimmed = n.note.trim();
        if trimmed.len() != n.note.len() {
            n.note = trimmed.to_owned();
        }
        !n.note.is_empty()
    });
}

fn remove_if_exists(path: &Path) -> anyhow::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("failed to remove {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_repo_keys_are_absolute_paths() {
        let store = NotesStore::new("acme/tool", Path::new("/wts"), None);
        assert_eq!(store.key_for("/wts/acme/tool/feat"), "/wts/acme/tool/feat");
    }

    #[test]
    fn shared_keys_are_relative_or_basename() {
        let store = NotesStore::new(
            "acme/tool",
            Path::new("/wts"),
            Some(PathBuf::from("/notes.json")),
        );
        assert_eq!(store.key_for("/wts/acme/tool/feat"), "feat");
        assert_eq!(store.key_for("/wts/acme/tool/nested/x"), "nested/x");
        assert_eq!(store.key_for("/elsewhere/checkout"), "checkout");
    }

    #[test]
    fn per_repo_save_load_and_remove_when_empty() {
        let td = tempfile::tempdir().unwrap();
        let mut store = NotesStore::new("acme/tool", td.path(), None);
        store.set("/w/a", "  remember this \n", 10);
        store.save().unwrap();
        let file = td.path().join("acme/tool").join(NOTES_FILE);
        assert!(file.exists());

        let mut reloaded = NotesStore::new("acme/tool", td.path(), None);
        reloaded.load();
        assert_eq!(reloaded.get("/w/a").unwrap().note, "remember this");

        reloaded.set("/w/a", "   ", 11);
        reloaded.save().unwrap();
        assert!(!file.exists());
    }

    #[test]
    fn shared_file_keeps_other_repos() {
        let td = tempfile::tempdir().unwrap();
        let shared = td.path().join("notes.json");
        let mut a = NotesStore::new("acme/a", td.path(), Some(shared.clone()));
        a.set(&td.path().join("acme/a/x").to_string_lossy(), "note a", 1);
        a.save().unwrap();
        let mut b = NotesStore::new("acme/b", td.path(), Some(shared.clone()));
        b.set(&td.path().join("acme/b/y").to_string_lossy(), "note b", 2);
        b.save().unwrap();

        let raw: BTreeMap<String, NoteMap> =
            serde_json::from_slice(&std::fs::read(&shared).unwrap()).unwrap();
        assert_eq!(raw["acme/a"]["x"].note, "note a");
        assert_eq!(raw["acme/b"]["y"].note, "note b");

        a.delete(&td.path().join("acme/a/x").to_string_lossy());
        a.save().unwrap();
        b.delete(&td.path().join("acme/b/y").to_string_lossy());
        b.save().unwrap();
        assert!(!shared.exists());
    }

    #[test]
    fn legacy_flat_shared_file_is_accepted() {
        let td = tempfile::tempdir().unwrap();
        let shared = td.path().join("notes.json");
        std::fs::write(&shared, r#"{"feat":{"note":"old","updated_at":3}}"#).unwrap();
        let mut store = NotesStore::new("acme/a", td.path(), Some(shared));
        store.load();
        assert_eq!(store.get("/anywhere/feat").unwrap().note, "old");
    }

    #[test]
    fn prune_and_migrate() {
        let mut store = NotesStore::new("r", Path::new("/wts"), None);
        store.set("/w/a", "a", 1);
        store.set("/w/b", "b", 1);
        assert!(store.migrate("/w/a", "/w/c"));
        assert!(store.get("/w/c").is_some());
        assert!(store.prune(&["/w/c"]));
        assert!(store.get("/w/b").is_none());
        assert!(!store.prune(&["/w/c"]));
    }
}
