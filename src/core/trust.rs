#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use tracing::info;

use crate::core::persistence::{read_json, write_json};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustMode {
    #[default]
    Tofu,
    Never,
    Always,
}

impl TrustMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "tofu" => Some(Self::Tofu),
            "never" => Some(Self::Never),
            "always" => Some(Self::Always),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustStatus {
    Trusted,
    Untrusted,
    NotFound,
}

/// What to do with a repo-declared command set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustDecision {
    Run,
    Prompt,
    Deny,
}

#[must_use]
pub fn decide(mode: TrustMode, status: TrustStatus) -> TrustDecision {
    match (mode, status) {
        (TrustMode::Always, _) | (_, TrustStatus::NotFound) => TrustDecision::Run,
        (TrustMode::Never, _) => TrustDecision::Deny,
        (TrustMode::Tofu, TrustStatus::Trusted) => TrustDecision::Run,
        (TrustMode::Tofu, TrustStatus::Untrusted) => TrustDecision::Prompt,
    }
}

#[must_use]
pub fn default_db_path() -> PathBuf {
    let data_home = std::env::var_os("XDG_DATA_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            directories::BaseDirs::new().map(|b| b.home_dir().join(".local").join("share"))
        })
        .unwrap_or_else(|| PathBuf::from(".local/share"));
    data_home.join("lazyworktree").join("trusted.json")
}

/// TOFU store: absolute file path → sha256 of its content.
#[derive(Debug, Clone)]
pub struct TrustStore {
    db_path: PathBuf,
    hashes: BTreeMap<String, String>,
}

impl TrustStore {
    /// Loads the database; a corrupt file starts empty.
    #[must_use]
    pub fn load(db_path: PathBuf) -> Self {
        let hashes = read_json(&db_path).unwrap_or_default();
        Self { db_path, hashes }
    }

    #[must_use]
    pub fn check(&self, file: &Path) -> TrustStatus {
        let resolved = absolute(file);
        let Ok(data) = std::fs::read(&resolved) else {
            return if resolved.exists() {
                TrustStatus::Untrusted
            } else {
                TrustStatus::NotFound
            };
        };
        match self.hashes.get(&resolved.to_string_lossy().to_string()) {
            Some(stored) if *stored == hash_bytes(&data) => TrustStatus::Trusted,
            _ => TrustStatus::Untrusted,
        }
    }

    pub fn trust(&mut self, file: &Path) -> anyhow::Result<()> {
        let resolved = absolute(file);
        let data = std::fs::read(&resolved)?;
        self.hashes
            .insert(resolved.to_string_lossy().to_string(), hash_bytes(&data));
        info!(file = %resolved.display(), "trusted repository commands");
        write_json(&self.db_path, &self.hashes)
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn hash_bytes(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    let mut s = String::with_capacity(64);
    for b in digest {
        let _ = write!(&mut s, "{b:02x}");
    }
    s
}
