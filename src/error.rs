#![forbid(unsafe_code)]

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LazywtError {
    #[error("not inside a git repository")]
    NotInGitRepo,

    #[error("{tool} is required but was not found in PATH")]
    GitUnavailable { tool: String },

    #[error("{program} {args}: {stderr}")]
    SubprocessFailed {
        program: String,
        args: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("unexpected output: {0}")]
    ProtocolParse(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Precondition(String),

    #[error("{what} timed out after {secs}s")]
    Timeout { what: String, secs: u64 },

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid config value for '{key}': {msg}")]
    InvalidConfigValue { key: String, msg: String },

    #[error("io error at {path}: {source}")]
    IoPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}

const GH_INSTALL: &str = "Install from https://cli.github.com";
const GLAB_INSTALL: &str = "Install from https://gitlab.com/gitlab-org/cli";
const GIT_INSTALL: &str = "Install git and make sure it is in PATH";
const LOGIN_HINT: &str = "Run 'gh auth login' or 'glab auth login'";

impl LazywtError {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Short remediation hint shown under failures.
    #[must_use]
    pub fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::GitUnavailable { tool } => install_hint(tool),
            Self::SubprocessFailed { stderr, .. } => hint_for_message(stderr),
            _ => None,
        }
    }
}

fn install_hint(tool: &str) -> Option<&'static str> {
    match tool {
        "gh" => Some(GH_INSTALL),
        "glab" => Some(GLAB_INSTALL),
        "git" => Some(GIT_INSTALL),
        _ => None,
    }
}

/// Maps a free-form failure message to the hint used by the info pane.
///
/// Install hints name the missing tool; a command that ran and printed
/// "not found" gets none.
#[must_use]
pub fn hint_for_message(msg: &str) -> Option<&'static str> {
    let lower = msg.to_lowercase();
    if lower.contains("auth login") || lower.contains("authenticat") || lower.contains("401") {
        return Some(LOGIN_HINT);
    }
    if let Some((tool, _)) = msg.split_once(" is required but was not found") {
        return install_hint(tool.trim());
    }
    let (before, _) = msg.split_once(": command not found")?;
    install_hint(before.rsplit(": ").next().unwrap_or(before).trim())
}

/// A failed task as the model receives it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskError {
    pub message: String,
    pub hint: Option<&'static str>,
    /// Shutdown noise; never shown.
    pub cancelled: bool,
}

impl TaskError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            hint: hint_for_message(&message),
            message,
            cancelled: false,
        }
    }
}

impl From<&LazywtError> for TaskError {
    fn from(e: &LazywtError) -> Self {
        Self {
            message: e.to_string(),
            hint: e.user_hint(),
            cancelled: e.is_cancelled(),
        }
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(hint) = self.hint {
            write!(f, "\n{hint}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failures_get_login_hint() {
        let err = LazywtError::SubprocessFailed {
            program: "gh".to_owned(),
            args: "pr list".to_owned(),
            code: Some(4),
            stderr: "HTTP 401: Bad credentials".to_owned(),
        };
        assert_eq!(
            err.user_hint(),
            Some("Run 'gh auth login' or 'glab auth login'")
        );
    }

    #[test]
    fn missing_forge_cli_gets_install_hint() {
        let err = LazywtError::GitUnavailable {
            tool: "gh".to_owned(),
        };
        assert!(err.user_hint().unwrap().contains("cli.github.com"));
        assert!(!err.is_cancelled());
    }

    #[test]
    fn missing_git_gets_git_hint_not_gh() {
        let err = LazywtError::GitUnavailable {
            tool: "git".to_owned(),
        };
        assert_eq!(err.user_hint(), Some(GIT_INSTALL));
        assert_eq!(hint_for_message(&err.to_string()), Some(GIT_INSTALL));
        assert_eq!(
            hint_for_message("glab is required but was not found in PATH"),
            Some(GLAB_INSTALL)
        );
        assert_eq!(hint_for_message("bash: line 1: gh: command not found"), Some(GH_INSTALL));
    }

    #[test]
    fn git_not_found_output_gets_no_install_hint() {
        let err = LazywtError::SubprocessFailed {
            program: "git".to_owned(),
            args: "pull origin feat".to_owned(),
            code: Some(128),
            stderr: "remote: Repository not found.".to_owned(),
        };
        assert_eq!(err.user_hint(), None);
        assert_eq!(hint_for_message("Author not found"), None);
    }

    #[test]
    fn task_error_keeps_kind_and_hint() {
        let cancelled = TaskError::from(&LazywtError::Cancelled);
        assert!(cancelled.cancelled);
        assert_eq!(cancelled.hint, None);

        let missing = TaskError::from(&LazywtError::GitUnavailable {
            tool: "gh".to_owned(),
        });
        assert!(!missing.cancelled);
        assert_eq!(
            missing.to_string(),
            "gh is required but was not found in PATH\nInstall from https://cli.github.com"
        );
        assert_eq!(TaskError::new("network down").to_string(), "network down");
    }
}
