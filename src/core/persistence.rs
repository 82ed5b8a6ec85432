#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::models::WorktreeInfo;

pub const CACHE_FILE: &str = "worktree-cache.json";
pub const ACCESS_FILE: &str = "worktree-access.json";
pub const COMMAND_HISTORY_FILE: &str = "command-history.json";
pub const PALETTE_HISTORY_FILE: &str = "command-palette-history.json";
pub const NOTES_FILE: &str = "worktree-notes.json";
pub const LAST_SELECTED_FILE: &str = ".last-selected";

pub const MAX_COMMAND_HISTORY: usize = 100;
const MAX_PALETTE_HISTORY: usize = 100;

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    #[serde(default)]
    worktrees: Vec<WorktreeInfo>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CommandHistoryFile {
    #[serde(default)]
    commands: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaletteUsage {
    pub id: String,
    pub timestamp: i64,
    pub count: u32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PaletteHistoryFile {
    #[serde(default)]
    commands: Vec<PaletteUsage>,
}

/// Per-repository state directory: `<worktree_dir>/<repo_key>/`.
#[derive(Debug, Clone)]
pub struct PersistenceStore {
    dir: PathBuf,
}

impl PersistenceStore {
    #[must_use]
    pub fn new(worktree_dir: &Path, repo_key: &str) -> Self {
        Self {
            dir: worktree_dir.join(repo_key),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cold-start snapshot; an empty list counts as no cache.
    #[must_use]
    pub fn load_cache(&self) -> Option<Vec<WorktreeInfo>> {
        let file: CacheFile = read_json(&self.dir.join(CACHE_FILE))?;
        if file.worktrees.is_empty() {
            None
        } else {
            Some(file.worktrees)
        }
    }

    pub fn save_cache(&self, worktrees: &[WorktreeInfo]) -> anyhow::Result<()> {
        let file = CacheFile {
            worktrees: worktrees.to_vec(),
        };
        write_json(&self.dir.join(CACHE_FILE), &file)
    }

    #[must_use]
    pub fn load_access(&self) -> HashMap<String, i64> {
        read_json(&self.dir.join(ACCESS_FILE)).unwrap_or_default()
    }

    pub fn save_access(&self, access: &HashMap<String, i64>) -> anyhow::Result<()> {
        write_json(&self.dir.join(ACCESS_FILE), access)
    }

    /// Most recent first.
    #[must_use]
    pub fn load_command_history(&self) -> Vec<String> {
        read_json::<CommandHistoryFile>(&self.dir.join(COMMAND_HISTORY_FILE))
            .map(|f| f.commands)
            .unwrap_or_default()
    }

    pub fn push_command_history(&self, command: &str) -> anyhow::Result<Vec<String>> {
        let command = command.trim();
        let mut commands = self.load_command_history();
        if command.is_empty() {
            return Ok(commands);
        }
        commands.retain(|c| c != command);
        commands.insert(0, command.to_owned());
        commands.truncate(MAX_COMMAND_HISTORY);
        write_json(
            &self.dir.join(COMMAND_HISTORY_FILE),
            &CommandHistoryFile {
                commands: commands.clone(),
            },
        )?;
        Ok(commands)
    }

    #[must_use]
    pub fn load_palette_history(&self) -> Vec<PaletteUsage> {
        read_json::<PaletteHistoryFile>(&self.dir.join(PALETTE_HISTORY_FILE))
            .map(|f| f.commands)
            .unwrap_or_default()
    }

    pub fn record_palette_use(&self, id: &str, now: i64) -> anyhow::Result<Vec<PaletteUsage>> {
        let mut commands = self.load_palette_history();
        let count = commands
            .iter()
            .find(|u| u.id == id)
            .map_or(0, |u| u.count);
        commands.retain(|u| u.id != id);
        commands.insert(
            0,
            PaletteUsage {
                id: id.to_owned(),
                timestamp: now,
                count: count + 1,
            },
        );
        commands.truncate(MAX_PALETTE_HISTORY);
        write_json(
            &self.dir.join(PALETTE_HISTORY_FILE),
            &PaletteHistoryFile {
                commands: commands.clone(),
            },
        )?;
        Ok(commands)
    }

    #[must_use]
    pub fn load_last_selected(&self) -> Option<String> {
        let raw = std::fs::read_to_string(self.dir.join(LAST_SELECTED_FILE)).ok()?;
        let path = raw.trim();
        (!path.is_empty()).then(|| path.to_owned())
    }

    pub fn save_last_selected(&self, path: &str) -> anyhow::Result<()> {
        write_atomic(&self.dir.join(LAST_SELECTED_FILE), format!("{path}\n").as_bytes())
    }
}

/// Missing file or malformed JSON yields `None`; the latter is logged.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let data = std::fs::read(path).ok()?;
    match serde_json::from_slice(&data) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring malformed state file");
            None
        }
    }
}

pub(crate) fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    let data = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &data)
}

/// Writes via a sibling temp file and rename; dirs 0o750, file 0o600.
pub fn write_atomic(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        create_private_dir(parent)?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()));
    std::fs::write(&tmp, data).with_context(|| format!("failed to write {}", tmp.display()))?;
    set_mode(&tmp, 0o600)?;
    std::fs::rename(&tmp, path).with_context(|| {
        let _ = std::fs::remove_file(&tmp);
        format!("failed to rename {} -> {}", tmp.display(), path.display())
    })?;
    Ok(())
}

pub(crate) fn create_private_dir(dir: &Path) -> anyhow::Result<()> {
    if dir.as_os_str().is_empty() || dir.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create state dir {}", dir.display()))?;
    set_mode(dir, 0o750)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt as _;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .with_context(|| format!("failed to chmod {}", path.display()))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> anyhow::Result<()> {
    Ok(())
}
