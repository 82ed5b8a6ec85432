#![forbid(unsafe_code)]

//! Decoding of `gh` / `glab` JSON and table output.

use std::collections::HashMap;

use serde::Deserialize;

use crate::core::models::{
    CiCheck, Conclusion, ForgeHost, IssueInfo, PrInfo, PrState, aggregate_ci,
};
use crate::error::LazywtError;

pub const GH_PR_FIELDS: &str =
    "number,state,title,body,url,headRefName,baseRefName,isDraft,author,statusCheckRollup";

#[must_use]
pub fn detect_host(remote_url: &str) -> ForgeHost {
    let url = remote_url.trim();
    if url.is_empty() {
        ForgeHost::None
    } else if url.to_ascii_lowercase().contains("gitlab") {
        ForgeHost::GitLab
    } else {
        ForgeHost::GitHub
    }
}

#[derive(Debug, Default, Deserialize)]
struct GhAuthor {
    #[serde(default)]
    login: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    is_bot: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GhRollupItem {
    #[serde(default)]
    conclusion: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GhPr {
    number: u64,
    #[serde(default)]
    state: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    url: String,
    #[serde(default)]
    head_ref_name: String,
    #[serde(default)]
    base_ref_name: String,
    #[serde(default)]
    is_draft: bool,
    #[serde(default)]
    author: Option<GhAuthor>,
    #[serde(default)]
    status_check_rollup: Option<Vec<GhRollupItem>>,
}

impl From<GhPr> for PrInfo {
    fn from(pr: GhPr) -> Self {
        let author = pr.author.unwrap_or_default();
        let ci_status = pr
            .status_check_rollup
            .filter(|items| !items.is_empty())
            .map(|items| {
                let checks: Vec<CiCheck> = items
                    .into_iter()
                    .map(|item| {
                        let raw = item
                            .conclusion
                            .filter(|c| !c.is_empty())
                            .or(item.state)
                            .or(item.status)
                            .unwrap_or_default();
                        CiCheck {
                            conclusion: Conclusion::parse(&raw),
                            ..CiCheck::default()
                        }
                    })
                    .collect();
                aggregate_ci(&checks).label().to_lowercase()
            })
            .unwrap_or_default();
        let mut state = PrState::parse(&pr.state);
        if pr.is_draft && state == PrState::Open {
            state = PrState::Draft;
        }
        Self {
            number: pr.number,
            state,
            title: pr.title,
            body: pr.body.unwrap_or_default(),
            url: pr.url,
            branch: pr.head_ref_name,
            base_branch: pr.base_ref_name,
            author: author.login,
            author_name: author.name,
            author_is_bot: author.is_bot,
            is_draft: pr.is_draft,
            ci_status,
        }
    }
}

pub fn parse_gh_prs(json: &str) -> Result<Vec<PrInfo>, LazywtError> {
    let prs: Vec<GhPr> = decode(json, "gh pr list")?;
    Ok(prs.into_iter().map(PrInfo::from).collect())
}

pub fn parse_gh_pr(json: &str) -> Result<PrInfo, LazywtError> {
    let pr: GhPr = decode(json, "gh pr view")?;
    Ok(pr.into())
}

#[derive(Debug, Deserialize)]
struct GhIssue {
    number: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    url: String,
    #[serde(default)]
    author: Option<GhAuthor>,
}

pub fn parse_gh_issues(json: &str) -> Result<Vec<IssueInfo>, LazywtError> {
    let issues: Vec<GhIssue> = decode(json, "gh issue list")?;
    Ok(issues
        .into_iter()
        .map(|i| IssueInfo {
            number: i.number,
            title: i.title,
            body: i.body.unwrap_or_default(),
            url: i.url,
            author: i.author.map(|a| a.login).unwrap_or_default(),
        })
        .collect())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GhCheck {
    #[serde(default)]
    name: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    bucket: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    started_at: String,
    #[serde(default)]
    completed_at: String,
}

pub fn parse_gh_checks_json(json: &str) -> Result<Vec<CiCheck>, LazywtError> {
    let checks: Vec<GhCheck> = decode(json, "gh pr checks")?;
    Ok(checks
        .into_iter()
        .map(|c| {
            let raw = if c.bucket.is_empty() { c.state } else { c.bucket };
            CiCheck {
                name: c.name,
                conclusion: Conclusion::parse(&raw),
                link: c.link,
                started_at: c.started_at,
                completed_at: c.completed_at,
            }
        })
        .collect())
}

/// Tab-separated `gh pr checks` output: `name  status  elapsed  link`.
#[must_use]
pub fn parse_gh_checks_table(out: &str) -> Vec<CiCheck> {
    out.lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
            let name = fields.first().filter(|n| !n.is_empty())?;
            let status = fields.get(1)?;
            let link = fields
                .iter()
                .rev()
                .find(|f| f.starts_with("http"))
                .copied()
                .unwrap_or_default();
            Some(CiCheck {
                name: (*name).to_owned(),
                conclusion: Conclusion::parse(status),
                link: link.to_owned(),
                ..CiCheck::default()
            })
        })
        .collect()
}

#[derive(Debug, Default, Deserialize)]
struct GlabUser {
    #[serde(default)]
    username: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    bot: bool,
}

#[derive(Debug, Deserialize)]
struct GlabMr {
    iid: u64,
    #[serde(default)]
    state: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    web_url: String,
    #[serde(default)]
    source_branch: String,
    #[serde(default)]
    target_branch: String,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    author: Option<GlabUser>,
}

fn glab_state(raw: &str) -> PrState {
    match raw {
        "opened" => PrState::Open,
        other => PrState::parse(other),
    }
}

pub fn parse_glab_mrs(json: &str) -> Result<Vec<PrInfo>, LazywtError> {
    let mrs: Vec<GlabMr> = decode(json, "glab merge_requests")?;
    Ok(mrs
        .into_iter()
        .map(|mr| {
            let author = mr.author.unwrap_or_default();
            let mut state = glab_state(&mr.state);
            if mr.draft && state == PrState::Open {
                state = PrState::Draft;
            }
            PrInfo {
                number: mr.iid,
                state,
                title: mr.title,
                body: mr.description.unwrap_or_default(),
                url: mr.web_url,
                branch: mr.source_branch,
                base_branch: mr.target_branch,
                author: author.username,
                author_name: author.name,
                author_is_bot: author.bot,
                is_draft: mr.draft,
                ci_status: String::new(),
            }
        })
        .collect())
}

#[derive(Debug, Deserialize)]
struct GlabIssue {
    iid: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    web_url: String,
    #[serde(default)]
    author: Option<GlabUser>,
}

pub fn parse_glab_issues(json: &str) -> Result<Vec<IssueInfo>, LazywtError> {
    let issues: Vec<GlabIssue> = decode(json, "glab issues")?;
    Ok(issues
        .into_iter()
        .map(|i| IssueInfo {
            number: i.iid,
            title: i.title,
            body: i.description.unwrap_or_default(),
            url: i.web_url,
            author: i.author.map(|a| a.username).unwrap_or_default(),
        })
        .collect())
}

#[derive(Debug, Deserialize)]
struct GlabJob {
    #[serde(default)]
    name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    web_url: String,
    #[serde(default)]
    started_at: Option<String>,
    #[serde(default)]
    finished_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GlabPipeline {
    Wrapped { jobs: Vec<GlabJob> },
    Bare(Vec<GlabJob>),
}

fn glab_conclusion(status: &str) -> Conclusion {
    match status {
        "success" => Conclusion::Success,
        "failed" => Conclusion::Failure,
        "skipped" => Conclusion::Skipped,
        "canceled" => Conclusion::Cancelled,
        _ => Conclusion::Pending,
    }
}

pub fn parse_glab_ci(json: &str) -> Result<Vec<CiCheck>, LazywtError> {
    let jobs = match decode::<GlabPipeline>(json, "glab ci get")? {
        GlabPipeline::Wrapped { jobs } | GlabPipeline::Bare(jobs) => jobs,
    };
    Ok(jobs
        .into_iter()
        .map(|j| CiCheck {
            name: j.name,
            conclusion: glab_conclusion(&j.status),
            link: j.web_url,
            started_at: j.started_at.unwrap_or_default(),
            completed_at: j.finished_at.unwrap_or_default(),
        })
        .collect())
}

/// Keys PRs by head branch; the first entry (newest) wins.
#[must_use]
pub fn index_by_branch(prs: Vec<PrInfo>) -> HashMap<String, PrInfo> {
    let mut map = HashMap::with_capacity(prs.len());
    for pr in prs {
        map.entry(pr.branch.clone()).or_insert(pr);
    }
    map
}

fn decode<T: serde::de::DeserializeOwned>(json: &str, what: &str) -> Result<T, LazywtError> {
    let trimmed = json.trim();
    let input = if trimmed.is_empty() { "[]" } else { trimmed };
    serde_json::from_str(input).map_err(|e| LazywtError::ProtocolParse(format!("{what}: {e}")))
}
