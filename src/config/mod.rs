#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Context as _;
use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::git::MergeMethod;
use crate::core::registry::SortMode;
use crate::core::trust::TrustMode;
use crate::error::LazywtError;

pub const APP_DIR_NAME: &str = "lazyworktree";
pub const REPO_CONFIG_FILE: &str = ".wt.yaml";

static ENV_VAR: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*)\}?").expect("env var pattern")
});

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub worktree_dir: String,
    pub theme: String,
    pub icon_set: IconSet,
    pub layout: LayoutMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_mode: Option<SortMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_by_active: Option<bool>,
    pub auto_refresh: bool,
    pub refresh_interval: u64,
    pub ci_auto_refresh: bool,
    pub auto_fetch_prs: bool,
    pub disable_pr: bool,
    pub search_auto_select: bool,
    pub fuzzy_finder_input: bool,
    pub max_name_length: usize,
    pub max_untracked_diffs: usize,
    pub max_diff_chars: usize,
    pub git_pager: String,
    pub git_pager_args: Vec<String>,
    pub git_pager_interactive: bool,
    pub git_pager_command_mode: bool,
    pub pager: String,
    pub ci_script_pager: String,
    pub editor: String,
    pub merge_method: MergeMethod,
    pub trust_mode: TrustMode,
    pub branch_name_script: String,
    pub worktree_note_script: String,
    pub worktree_notes_path: String,
    pub issue_branch_name_template: String,
    pub pr_branch_name_template: String,
    pub session_prefix: String,
    pub palette_mru: bool,
    pub palette_mru_limit: usize,
    pub init_commands: Vec<String>,
    pub terminate_commands: Vec<String>,
    pub custom_commands: BTreeMap<String, CustomCommand>,
    pub custom_create_menus: Vec<CustomCreateMenu>,
    pub custom_themes: BTreeMap<String, CustomThemeData>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worktree_dir: "~/.local/share/worktrees".to_owned(),
            theme: String::new(),
            icon_set: IconSet::NerdFontV3,
            layout: LayoutMode::Default,
            sort_mode: None,
            sort_by_active: None,
            auto_refresh: true,
            refresh_interval: 30,
            ci_auto_refresh: false,
            auto_fetch_prs: false,
            disable_pr: false,
            search_auto_select: false,
            fuzzy_finder_input: false,
            max_name_length: 95,
            max_untracked_diffs: 10,
            max_diff_chars: 200_000,
            git_pager: "delta".to_owned(),
            git_pager_args: Vec::new(),
            git_pager_interactive: false,
            git_pager_command_mode: false,
            pager: String::new(),
            ci_script_pager: String::new(),
            editor: String::new(),
            merge_method: MergeMethod::Rebase,
            trust_mode: TrustMode::Tofu,
            branch_name_script: String::new(),
            worktree_note_script: String::new(),
            worktree_notes_path: String::new(),
            issue_branch_name_template: "issue-{number}-{title}".to_owned(),
            pr_branch_name_template: "pr-{number}-{title}".to_owned(),
            session_prefix: "wt-".to_owned(),
            palette_mru: true,
            palette_mru_limit: 5,
            init_commands: Vec::new(),
            terminate_commands: Vec::new(),
            custom_commands: BTreeMap::new(),
            custom_create_menus: Vec::new(),
            custom_themes: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum IconSet {
    #[default]
    #[serde(alias = "nerd-font", alias = "nerdfont")]
    NerdFontV3,
    Text,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LayoutMode {
    #[default]
    Default,
    Top,
}

impl LayoutMode {
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Self::Default => Self::Top,
            Self::Top => Self::Default,
        }
    }
}

/// A single-key action declared under `custom_commands`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CustomCommand {
    pub command: String,
    pub description: String,
    pub show_help: bool,
    pub show_output: bool,
    pub new_tab: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmux: Option<SessionCommand>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zellij: Option<SessionCommand>,
}

impl Default for CustomCommand {
    fn default() -> Self {
        Self {
            command: String::new(),
            description: String::new(),
            show_help: true,
            show_output: false,
            new_tab: false,
            tmux: None,
            zellij: None,
        }
    }
}

impl CustomCommand {
    #[must_use]
    pub fn label(&self) -> &str {
        if !self.description.is_empty() {
            &self.description
        } else if self.tmux.is_some() {
            "tmux session"
        } else if self.zellij.is_some() {
            "zellij session"
        } else {
            &self.command
        }
    }
}

/// tmux/zellij session layout for a custom command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionCommand {
    pub session_name: String,
    pub attach: bool,
    pub on_exists: OnExists,
    pub windows: Vec<SessionWindow>,
}

impl Default for SessionCommand {
    fn default() -> Self {
        Self {
            session_name: String::new(),
            attach: true,
            on_exists: OnExists::Switch,
            windows: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OnExists {
    #[default]
    Switch,
    Attach,
    Kill,
    New,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionWindow {
    pub name: String,
    pub command: String,
    pub cwd: String,
}

/// Extra entry in the create-worktree base picker; `command` prints a branch name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CustomCreateMenu {
    pub label: String,
    pub description: String,
    pub command: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CustomThemeData {
    pub base: String,
    pub accent: String,
    pub accent_fg: String,
    pub accent_dim: String,
    pub border: String,
    pub border_dim: String,
    pub muted_fg: String,
    pub text_fg: String,
    pub success_fg: String,
    pub warn_fg: String,
    pub error_fg: String,
    pub cyan: String,
}

/// Repository-local `.wt.yaml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RepoConfig {
    pub init_commands: Vec<String>,
    pub terminate_commands: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_file: PathBuf,
}

pub fn default_paths() -> anyhow::Result<ConfigPaths> {
    let unix = config_home().join(APP_DIR_NAME).join("config.yaml");
    if !cfg!(windows) || unix.exists() {
        return Ok(ConfigPaths { config_file: unix });
    }
    let proj = ProjectDirs::from("com", APP_DIR_NAME, APP_DIR_NAME)
        .context("failed to determine platform config directory")?;
    Ok(ConfigPaths {
        config_file: proj.config_dir().join("config.yaml"),
    })
}

fn config_home() -> PathBuf {
    if let Some(v) = std::env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return PathBuf::from(v);
    }
    home_dir().unwrap_or_else(|| PathBuf::from("~")).join(".config")
}

fn home_dir() -> Option<PathBuf> {
    if let Some(v) = std::env::var_os("HOME").filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(v));
    }
    BaseDirs::new().map(|b| b.home_dir().to_path_buf())
}

#[must_use]
pub fn expand_tilde(input: &str) -> String {
    if input == "~"
        && let Some(home) = home_dir()
    {
        return home.to_string_lossy().to_string();
    }
    if let Some(rest) = input.strip_prefix("~/")
        && let Some(home) = home_dir()
    {
        return home.join(rest).to_string_lossy().to_string();
    }
    input.to_owned()
}

/// Inverse of [`expand_tilde`] for display.
#[must_use]
pub fn tilde_path(input: &str) -> String {
    let Some(home) = home_dir() else {
        return input.to_owned();
    };
    let home_str = home.to_string_lossy();
    if let Some(rest) = input.strip_prefix(home_str.as_ref()) {
        if rest.is_empty() {
            return "~".to_owned();
        }
        if rest.starts_with(std::path::MAIN_SEPARATOR) {
            return format!("~{rest}");
        }
    }
    input.to_owned()
}

/// Expands `$VAR` and `${VAR}`; unknown variables are left untouched.
#[must_use]
pub fn expand_env_vars(input: &str) -> String {
    ENV_VAR
        .replace_all(input, |caps: &regex::Captures<'_>| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_owned())
        })
        .to_string()
}

pub fn expand_path(input: &str) -> anyhow::Result<PathBuf> {
    let p = PathBuf::from(expand_env_vars(&expand_tilde(input.trim())));
    if p.is_absolute() {
        return Ok(p);
    }
    let cwd = std::env::current_dir().context("failed to get current directory")?;
    Ok(cwd.join(p))
}

pub fn load() -> anyhow::Result<(Config, ConfigPaths)> {
    let paths = default_paths()?;
    let cfg = load_from_file(&paths.config_file)?;
    cfg.validate()?;
    Ok((cfg, paths))
}

pub fn load_from_file(path: &Path) -> anyhow::Result<Config> {
    if !path.exists() {
        debug!(path = %path.display(), "no config file, using defaults");
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(Config::default());
    }
    serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to parse YAML in {}", path.display()))
}

/// Reads `.wt.yaml` from the main worktree; `None` when absent.
pub fn load_repo_config(main_path: &Path) -> anyhow::Result<Option<(RepoConfig, PathBuf)>> {
    let path = main_path.join(REPO_CONFIG_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let cfg: RepoConfig = if raw.trim().is_empty() {
        RepoConfig::default()
    } else {
        serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse YAML in {}", path.display()))?
    };
    Ok(Some((cfg, path)))
}

impl Config {
    pub fn validate(&self) -> Result<(), LazywtError> {
        if self.worktree_dir.trim().is_empty() {
            return Err(LazywtError::Config(
                "worktree_dir must not be empty".to_owned(),
            ));
        }
        if self.palette_mru_limit == 0 {
            return Err(LazywtError::Config(
                "palette_mru_limit must be >= 1".to_owned(),
            ));
        }
        if self.max_name_length == 0 {
            return Err(LazywtError::Config(
                "max_name_length must be >= 1".to_owned(),
            ));
        }
        for (key, cmd) in &self.custom_commands {
            if key.is_empty() {
                return Err(LazywtError::Config(
                    "custom_commands keys must not be empty".to_owned(),
                ));
            }
            if cmd.command.trim().is_empty() && cmd.tmux.is_none() && cmd.zellij.is_none() {
                return Err(LazywtError::Config(format!(
                    "custom_commands.{key} needs a command, tmux or zellij section"
                )));
            }
        }
        Ok(())
    }

    /// `sort_mode` wins; the legacy `sort_by_active` flag only applies when it is absent.
    #[must_use]
    pub fn effective_sort_mode(&self) -> SortMode {
        match (self.sort_mode, self.sort_by_active) {
            (Some(mode), _) => mode,
            (None, Some(true)) => SortMode::Active,
            (None, _) => SortMode::Switched,
        }
    }

    pub fn worktree_dir_path(&self) -> anyhow::Result<PathBuf> {
        expand_path(&self.worktree_dir)
    }

    pub fn notes_path(&self) -> anyhow::Result<Option<PathBuf>> {
        if self.worktree_notes_path.trim().is_empty() {
            return Ok(None);
        }
        expand_path(&self.worktree_notes_path).map(Some)
    }

    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval.max(1))
    }

    /// Pager for plain text: `pager`, then `$PAGER`, then `less -R`.
    #[must_use]
    pub fn pager_command(&self) -> String {
        non_empty(&self.pager)
            .or_else(|| std::env::var("PAGER").ok().filter(|p| !p.trim().is_empty()))
            .unwrap_or_else(|| "less -R".to_owned())
    }

    #[must_use]
    pub fn ci_pager_command(&self) -> String {
        non_empty(&self.ci_script_pager).unwrap_or_else(|| self.pager_command())
    }

    /// Editor: `editor`, then `$VISUAL`, then `$EDITOR`, then `vi`.
    #[must_use]
    pub fn editor_command(&self) -> String {
        non_empty(&self.editor)
            .or_else(|| std::env::var("VISUAL").ok().filter(|e| !e.trim().is_empty()))
            .or_else(|| std::env::var("EDITOR").ok().filter(|e| !e.trim().is_empty()))
            .unwrap_or_else(|| "vi".to_owned())
    }

    /// Shell pipeline that renders a diff: `git_pager [args] | pager`.
    #[must_use]
    pub fn diff_pipeline(&self) -> String {
        let pager = self.pager_command();
        let git_pager = self.git_pager.trim();
        if git_pager.is_empty() {
            return pager;
        }
        let mut cmd = git_pager.to_owned();
        for arg in &self.git_pager_args {
            cmd.push(' ');
            cmd.push_str(&crate::core::naming::shell_quote(arg));
        }
        if self.git_pager_interactive {
            cmd
        } else {
            format!("{cmd} | {pager}")
        }
    }

    /// Applies every `key=value` pair in order.
    pub fn apply_overrides(&mut self, overrides: &[String]) -> Result<(), LazywtError> {
        for raw in overrides {
            let (key, value) = raw.split_once('=').ok_or_else(|| {
                LazywtError::InvalidConfigValue {
                    key: raw.clone(),
                    msg: "expected key=value".to_owned(),
                }
            })?;
            self.apply_override(key.trim(), value)?;
        }
        Ok(())
    }

    pub fn apply_override(&mut self, key: &str, value: &str) -> Result<(), LazywtError> {
        let invalid = |msg: String| LazywtError::InvalidConfigValue {
            key: key.to_owned(),
            msg,
        };

        // Legacy alias: `sort_by_active=true` -> `sort_mode=active`.
        let (norm, value) = if key == "sort_by_active" {
            let on = parse_bool(value).map_err(invalid)?;
            ("sort_mode", if on { "active" } else { "switched" })
        } else {
            (key, value)
        };

        let key_type = key_type(norm).ok_or_else(|| invalid("unknown config key".to_owned()))?;
        let item = match key_type {
            KeyType::Bool => serde_yaml::Value::Bool(parse_bool(value).map_err(invalid)?),
            KeyType::Int => serde_yaml::Value::Number(parse_int(value).map_err(invalid)?.into()),
            KeyType::String => serde_yaml::Value::String(value.to_owned()),
            KeyType::List => serde_yaml::Value::Sequence(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(|v| serde_yaml::Value::String(v.to_owned()))
                    .collect(),
            ),
            KeyType::Enum(allowed) => {
                let v = value.trim();
                if !allowed.contains(&v) {
                    return Err(invalid(format!("must be one of: {}", allowed.join(", "))));
                }
                serde_yaml::Value::String(v.to_owned())
            }
        };

        let mut doc =
            serde_yaml::to_value(&*self).map_err(|e| LazywtError::Config(e.to_string()))?;
        if let serde_yaml::Value::Mapping(map) = &mut doc {
            map.insert(serde_yaml::Value::String(norm.to_owned()), item);
        }
        let updated: Config = serde_yaml::from_value(doc).map_err(|e| invalid(e.to_string()))?;
        updated.validate().map_err(|e| invalid(e.to_string()))?;
        debug!(key = norm, "config override applied");
        *self = updated;
        Ok(())
    }
}

fn non_empty(s: &str) -> Option<String> {
    let t = s.trim();
    (!t.is_empty()).then(|| t.to_owned())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyType {
    Bool,
    Int,
    String,
    List,
    Enum(&'static [&'static str]),
}

fn key_type(key: &str) -> Option<KeyType> {
    Some(match key {
        "worktree_dir"
        | "theme"
        | "git_pager"
        | "pager"
        | "ci_script_pager"
        | "editor"
        | "branch_name_script"
        | "worktree_note_script"
        | "worktree_notes_path"
        | "issue_branch_name_template"
        | "pr_branch_name_template"
        | "session_prefix" => KeyType::String,

        "auto_refresh"
        | "ci_auto_refresh"
        | "auto_fetch_prs"
        | "disable_pr"
        | "search_auto_select"
        | "fuzzy_finder_input"
        | "git_pager_interactive"
        | "git_pager_command_mode"
        | "palette_mru" => KeyType::Bool,

        "refresh_interval"
        | "max_name_length"
        | "max_untracked_diffs"
        | "max_diff_chars"
        | "palette_mru_limit" => KeyType::Int,

        "git_pager_args" | "init_commands" | "terminate_commands" => KeyType::List,

        "icon_set" => KeyType::Enum(&["nerd-font-v3", "text"]),
        "layout" => KeyType::Enum(&["default", "top"]),
        "sort_mode" => KeyType::Enum(&["path", "active", "switched"]),
        "merge_method" => KeyType::Enum(&["rebase", "merge"]),
        "trust_mode" => KeyType::Enum(&["tofu", "never", "always"]),

        _ => return None,
    })
}

fn parse_bool(s: &str) -> Result<bool, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" => Ok(false),
        other => Err(format!("expected true|false, got '{other}'")),
    }
}

fn parse_int(s: &str) -> Result<u64, String> {
    s.trim()
        .parse::<u64>()
        .map_err(|e| format!("expected non-negative integer, got '{s}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.effective_sort_mode(), SortMode::Switched);
        assert_eq!(cfg.session_prefix, "wt-");
        assert_eq!(cfg.refresh_interval(), Duration::from_secs(30));
    }

    #[test]
    fn yaml_keys_deserialize() {
        let cfg: Config = serde_yaml::from_str(
            r"
worktree_dir: /tmp/wts
layout: top
icon_set: text
merge_method: merge
trust_mode: never
sort_mode: path
refresh_interval: 0
custom_commands:
  t:
    description: Tests
    command: make test
    show_output: true
  s:
    tmux:
      session_name: dev-$WORKTREE_NAME
      windows:
        - name: shell
custom_themes:
  mine:
    base: nord
    accent: '#ff0000'
",
        )
        .unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.layout, LayoutMode::Top);
        assert_eq!(cfg.icon_set, IconSet::Text);
        assert_eq!(cfg.merge_method, MergeMethod::Merge);
        assert_eq!(cfg.trust_mode, TrustMode::Never);
        assert_eq!(cfg.effective_sort_mode(), SortMode::Path);
        assert_eq!(cfg.refresh_interval(), Duration::from_secs(1));
        assert!(cfg.custom_commands["t"].show_help);
        assert_eq!(cfg.custom_commands["s"].label(), "tmux session");
        assert!(cfg.custom_commands["s"].tmux.as_ref().unwrap().attach);
        assert_eq!(cfg.custom_themes["mine"].base, "nord");
    }

    #[test]
    fn legacy_sort_flag_applies_only_without_sort_mode() {
        let legacy: Config = serde_yaml::from_str("sort_by_active: true\n").unwrap();
        assert_eq!(legacy.effective_sort_mode(), SortMode::Active);
        let both: Config =
            serde_yaml::from_str("sort_by_active: true\nsort_mode: path\n").unwrap();
        assert_eq!(both.effective_sort_mode(), SortMode::Path);
    }

    #[test]
    fn unknown_enum_value_is_rejected() {
        assert!(serde_yaml::from_str::<Config>("layout: sideways\n").is_err());
    }

    #[test]
    fn overrides_are_typed() {
        let mut cfg = Config::default();
        cfg.apply_overrides(&[
            "layout=top".to_owned(),
            "auto_refresh=false".to_owned(),
            "palette_mru_limit=9".to_owned(),
            "init_commands=make deps, make build".to_owned(),
            "sort_by_active=true".to_owned(),
        ])
        .unwrap();
        assert_eq!(cfg.layout, LayoutMode::Top);
        assert!(!cfg.auto_refresh);
        assert_eq!(cfg.palette_mru_limit, 9);
        assert_eq!(cfg.init_commands, vec!["make deps", "make build"]);
        assert_eq!(cfg.effective_sort_mode(), SortMode::Active);
    }

    #[test]
    fn bad_overrides_fail_with_invalid_value() {
        let mut cfg = Config::default();
        for raw in [
            "nope=1",
            "layout=sideways",
            "auto_refresh=maybe",
            "palette_mru_limit=0",
            "no-equals",
        ] {
            let err = cfg.apply_overrides(&[raw.to_owned()]).unwrap_err();
            assert!(
                matches!(err, LazywtError::InvalidConfigValue { .. }),
                "{raw}: {err}"
            );
        }
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn repo_config_is_optional() {
        let td = tempfile::tempdir().unwrap();
        assert!(load_repo_config(td.path()).unwrap().is_none());
        std::fs::write(
            td.path().join(REPO_CONFIG_FILE),
            "init_commands:\n  - make setup\n",
        )
        .unwrap();
        let (cfg, path) = load_repo_config(td.path()).unwrap().unwrap();
        assert_eq!(cfg.init_commands, vec!["make setup"]);
        assert!(cfg.terminate_commands.is_empty());
        assert!(path.ends_with(REPO_CONFIG_FILE));
    }

    #[test]
    fn missing_and_empty_files_yield_defaults() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("config.yaml");
        assert_eq!(load_from_file(&path).unwrap(), Config::default());
        std::fs::write(&path, "\n").unwrap();
        assert_eq!(load_from_file(&path).unwrap(), Config::default());
    }

    #[test]
    fn env_vars_expand_and_unknown_stay() {
        if let Ok(home) = std::env::var("HOME") {
            assert_eq!(expand_env_vars("$HOME/x"), format!("{home}/x"));
        }
        assert_eq!(
            expand_env_vars("${LAZYWT_SURELY_UNSET_VAR}/x"),
            "${LAZYWT_SURELY_UNSET_VAR}/x"
        );
    }
}
