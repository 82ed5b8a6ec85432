#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, warn};

use crate::core::git::{CancelToken, CommandRunner, CommandSpec};
use crate::core::models::WorktreeInfo;
use crate::core::naming::{repo_name, sanitize_branch_name};
use crate::error::LazywtError;

pub const SCRIPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Environment handed to custom and repo commands.
#[must_use]
pub fn worktree_env(wt: &WorktreeInfo, main_path: &str, repo_key: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("WORKTREE_BRANCH".to_owned(), wt.branch.clone()),
        ("MAIN_WORKTREE_PATH".to_owned(), main_path.to_owned()),
        ("WORKTREE_PATH".to_owned(), wt.path.clone()),
        ("WORKTREE_NAME".to_owned(), wt.display_name()),
        ("REPO_NAME".to_owned(), repo_name(repo_key).to_owned()),
    ])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptSubject {
    Pr,
    Issue,
    Diff,
}

impl ScriptSubject {
    fn as_str(self) -> &'static str {
        match self {
            Self::Pr => "pr",
            Self::Issue => "issue",
            Self::Diff => "diff",
        }
    }
}

#[must_use]
pub fn subject_env(
    subject: ScriptSubject,
    number: Option<u64>,
    title: &str,
    url: &str,
) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("LAZYWORKTREE_TYPE".to_owned(), subject.as_str().to_owned()),
        (
            "LAZYWORKTREE_NUMBER".to_owned(),
            number.map(|n| n.to_string()).unwrap_or_default(),
        ),
        ("LAZYWORKTREE_TITLE".to_owned(), title.to_owned()),
        ("LAZYWORKTREE_URL".to_owned(), url.to_owned()),
    ])
}

/// Runs `bash -c script` with a hard timeout; returns trimmed stdout.
pub fn run_script(
    runner: &dyn CommandRunner,
    script: &str,
    cwd: &Path,
    stdin: &str,
    env: &BTreeMap<String, String>,
    cancel: &CancelToken,
    timeout: Duration,
) -> Result<String, LazywtError> {
    let spec = CommandSpec::new("bash", &["-c", script])
        .in_dir(cwd)
        .with_env(env)
        .with_stdin(stdin)
        .with_timeout(timeout);

    let out = match runner.run(&spec, cancel) {
        Err(LazywtError::Timeout { secs, .. }) => {
            warn!(script, "script timed out");
            return Err(LazywtError::Timeout {
                what: "script".to_owned(),
                secs,
            });
        }
        other => other?,
    };
    if !out.success() {
        return Err(LazywtError::SubprocessFailed {
            program: "bash".to_owned(),
            args: format!("-c {script}"),
            code: out.code,
            stderr: out.stderr.trim().to_owned(),
        });
    }
    debug!(script, bytes = out.stdout.len(), "script finished");
    Ok(out.stdout.trim().to_owned())
}

/// First non-empty output line, slugified into a branch name.
#[must_use]
pub fn branch_from_script_output(output: &str, max_len: usize) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(|l| sanitize_branch_name(l, max_len))
        .filter(|b| !b.is_empty())
}

/// Runs each command through `bash -lc` in `cwd`, stopping at the first failure.
pub fn run_commands(
    runner: &dyn CommandRunner,
    commands: &[String],
    cwd: &Path,
    env: &BTreeMap<String, String>,
    cancel: &CancelToken,
) -> Result<(), LazywtError> {
    for command in commands.iter().map(|c| c.trim()).filter(|c| !c.is_empty()) {
        let spec = CommandSpec::new("bash", &["-lc", command])
            .in_dir(cwd)
            .with_env(env);
        let out = runner.run(&spec, cancel)?;
        if !out.success() {
            return Err(LazywtError::SubprocessFailed {
                program: "bash".to_owned(),
                args: command.to_owned(),
                code: out.code,
                stderr: out.stderr.trim().to_owned(),
            });
        }
    }
    Ok(())
}
