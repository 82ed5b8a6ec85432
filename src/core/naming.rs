#![forbid(unsafe_code)]

use std::fmt::Write as _;
use std::path::Path;

use regex::Regex;
use sha2::{Digest as _, Sha256};

use crate::core::models::{IssueInfo, PrInfo};

const MAX_TEMPLATE_NAME_LEN: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoId {
    pub host: String,
    pub owner: String,
    pub repo: String,
}

#[must_use]
pub fn parse_origin_url(url: &str) -> Option<RepoId> {
    // https://host/owner/repo(.git), ssh://git@host/owner/repo(.git), git@host:owner/repo(.git)
    let url = url.trim();

    if let Some(rest) = url.strip_prefix("git@") {
        let (host, path) = rest.split_once(':')?;
        return parse_host_path(host, path);
    }

    let re = Regex::new(r"^(?:(?:https?)|ssh)://(?:[^@/]+@)?([^/]+)/(.+)$").ok()?;
    let caps = re.captures(url)?;
    let host = caps.get(1)?.as_str();
    let path = caps.get(2)?.as_str();
    parse_host_path(host, path)
}

fn parse_host_path(host: &str, path: &str) -> Option<RepoId> {
    let segments: Vec<&str> = path
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    // GitLab subgroups: keep everything but the last segment as the owner.
    let (repo_raw, owner) = segments.split_last()?;
    if owner.is_empty() {
        return None;
    }
    let repo = repo_raw.strip_suffix(".git").unwrap_or(repo_raw).to_owned();
    Some(RepoId {
        host: host.to_owned(),
        owner: owner.join("/"),
        repo,
    })
}

/// `owner/repo` from the origin URL, else `local-<hash of main path>`.
#[must_use]
pub fn repo_key(origin_url: Option<&str>, main_path: &Path) -> String {
    if let Some(id) = origin_url.and_then(parse_origin_url) {
        return format!("{}/{}", id.owner, id.repo);
    }
    format!("local-{}", short_hash(&main_path.to_string_lossy()))
}

/// Last component of a repo key, used as `REPO_NAME`.
#[must_use]
pub fn repo_name(repo_key: &str) -> &str {
    repo_key.rsplit('/').next().unwrap_or(repo_key)
}

#[must_use]
pub fn sanitize_for_filesystem(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if c == '/'
            || c == '\\'
            || c.is_control()
            || matches!(c, ':' | '*' | '?' | '"' | '<' | '>' | '|')
        {
            out.push('-');
            continue;
        }
        out.push(c);
    }
    collapse_dashes(&out)
}

/// Lowercase slug safe as a git branch name; `max_len == 0` means unlimited.
#[must_use]
pub fn sanitize_branch_name(input: &str, max_len: usize) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.trim().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if matches!(c, '/' | '.' | '_') {
            out.push(c);
        } else {
            out.push('-');
        }
    }
    let mut out = collapse_dashes(&out);
    while out.contains("..") {
        out = out.replace("..", ".");
    }
    let mut out = out
        .trim_matches(|c| matches!(c, '-' | '.' | '/'))
        .to_owned();
    if max_len > 0 && out.len() > max_len {
        out.truncate(max_len);
        out = out.trim_end_matches(['-', '.', '/']).to_owned();
    }
    out
}

fn collapse_dashes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_dash = false;
    for c in s.chars() {
        if c == '-' {
            if !last_dash {
                out.push(c);
            }
            last_dash = true;
        } else {
            out.push(c);
            last_dash = false;
        }
    }
    out.trim_matches('-').to_owned()
}

/// Renders `{number}`, `{title}`, `{generated}`, `{pr_author}` in a PR branch template.
#[must_use]
pub fn pr_branch_name(pr: &PrInfo, template: &str, generated: Option<&str>) -> String {
    let title = sanitize_branch_name(&pr.title, 0);
    let generated = generated
        .map(|g| sanitize_branch_name(g, 0))
        .filter(|g| !g.is_empty())
        .unwrap_or_else(|| title.clone());
    apply_template(
        template,
        &[
            ("{number}", pr.number.to_string()),
            ("{title}", title),
            ("{generated}", generated),
            ("{pr_author}", sanitize_branch_name(&pr.author, 0)),
        ],
    )
}

#[must_use]
pub fn issue_branch_name(issue: &IssueInfo, template: &str, generated: Option<&str>) -> String {
    let title = sanitize_branch_name(&issue.title, 0);
    let generated = generated
        .map(|g| sanitize_branch_name(g, 0))
        .filter(|g| !g.is_empty())
        .unwrap_or_else(|| title.clone());
    apply_template(
        template,
        &[
            ("{number}", issue.number.to_string()),
            ("{title}", title),
            ("{generated}", generated),
        ],
    )
}

fn apply_template(template: &str, replacements: &[(&str, String)]) -> String {
    let mut name = template.to_owned();
    for (placeholder, value) in replacements {
        name = name.replace(placeholder, value);
    }
    let mut name = name.trim_end_matches('-').to_owned();
    if name.len() > MAX_TEMPLATE_NAME_LEN {
        let mut cut = MAX_TEMPLATE_NAME_LEN;
        while !name.is_char_boundary(cut) {
            cut -= 1;
        }
        name.truncate(cut);
        name = name.trim_end_matches('-').to_owned();
    }
    name
}

/// Directory for a new worktree: `<worktree_dir>/<repo_key>/<branch slug>`.
#[must_use]
pub fn worktree_path_for(worktree_dir: &Path, repo_key: &str, branch: &str) -> std::path::PathBuf {
    worktree_dir
        .join(repo_key)
        .join(sanitize_for_filesystem(branch))
}

#[must_use]
pub fn sanitize_tmux_session_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if matches!(c, ':' | '/' | '\\') { '-' } else { c })
        .collect();
    let trimmed = replaced.trim();
    if trimmed.is_empty() {
        "worktree".to_owned()
    } else {
        trimmed.to_owned()
    }
}

#[must_use]
pub fn sanitize_zellij_session_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if matches!(c, ':' | '/' | '\\') || c.is_whitespace() {
                '-'
            } else {
                c
            }
        })
        .collect();
    let collapsed = collapse_dashes(&replaced);
    if collapsed.is_empty() {
        "worktree".to_owned()
    } else {
        collapsed
    }
}

/// Single-quotes a string for POSIX shells.
#[must_use]
pub fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '='))
    {
        return s.to_owned();
    }
    format!("'{}'", s.replace('\'', "'\\''"))
}

fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut s = String::with_capacity(8);
    for b in &digest[..4] {
        let _ = write!(&mut s, "{b:02x}");
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::PrState;

    fn pr(number: u64, title: &str) -> PrInfo {
        PrInfo {
            number,
            state: PrState::Open,
            title: title.to_owned(),
            body: String::new(),
            url: String::new(),
            branch: "feature-branch".to_owned(),
            base_branch: "main".to_owned(),
            author: "Octo".to_owned(),
            author_name: String::new(),
            author_is_bot: false,
            is_draft: false,
            ci_status: String::new(),
        }
    }

    #[test]
    fn parses_origin_urls() {
        let id = parse_origin_url("https://github.com/chmouel/lazyworktree.git").unwrap();
        assert_eq!(id.owner, "chmouel");
        assert_eq!(id.repo, "lazyworktree");

        let id = parse_origin_url("ssh://git@github.com/acme/tool.git").unwrap();
        assert_eq!(id.owner, "acme");

        let id = parse_origin_url("git@gitlab.com:group/sub/app.git").unwrap();
        assert_eq!(id.owner, "group/sub");
        assert_eq!(id.repo, "app");

        assert!(parse_origin_url("not a url").is_none());
    }

    #[test]
    fn repo_key_falls_back_to_local_hash() {
        assert_eq!(
            repo_key(Some("git@github.com:acme/tool.git"), Path::new("/x")),
            "acme/tool"
        );
        let key = repo_key(None, Path::new("/home/me/repo"));
        assert!(key.starts_with("local-"));
        assert_eq!(key.len(), "local-".len() + 8);
        assert_eq!(key, repo_key(Some(""), Path::new("/home/me/repo")));
    }

    #[test]
    fn pr_template_slugifies_title() {
        let name = pr_branch_name(&pr(77, "Use PR branch"), "pr-{number}-{title}", None);
        assert_eq!(name, "pr-77-use-pr-branch");
        let path = worktree_path_for(Path::new("/wts"), "acme/repo", &name);
        assert_eq!(path, Path::new("/wts/acme/repo/pr-77-use-pr-branch"));
    }

    #[test]
    fn template_trims_trailing_dash_and_truncates() {
        let name = pr_branch_name(&pr(3, "!!!"), "pr-{number}-{title}", None);
        assert_eq!(name, "pr-3");
        let long = "word ".repeat(40);
        let name = pr_branch_name(&pr(1, &long), "{title}", None);
        assert!(name.len() <= 100);
        assert!(!name.ends_with('-'));
    }

    #[test]
    fn generated_placeholder_prefers_script_output() {
        let issue = IssueInfo {
            number: 9,
            title: "Crash on start".to_owned(),
            body: String::new(),
            url: String::new(),
            author: String::new(),
        };
        assert_eq!(
            issue_branch_name(&issue, "issue-{number}-{generated}", Some("Fix Startup")),
            "issue-9-fix-startup"
        );
        assert_eq!(
            issue_branch_name(&issue, "issue-{number}-{generated}", None),
            "issue-9-crash-on-start"
        );
    }

    #[test]
    fn session_names_are_sanitized() {
        assert_eq!(sanitize_tmux_session_name("wt-feat/x:y"), "wt-feat-x-y");
        assert_eq!(sanitize_zellij_session_name("wt-feat//x y"), "wt-feat-x-y");
        assert_eq!(sanitize_tmux_session_name("  "), "worktree");
    }

    #[test]
    fn shell_quote_wraps_when_needed() {
        assert_eq!(shell_quote("plain-name"), "plain-name");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
        assert_eq!(shell_quote(""), "''");
    }
}
