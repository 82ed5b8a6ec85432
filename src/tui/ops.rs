#![forbid(unsafe_code)]

//! User actions, background jobs and the preconditions that gate them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use crate::config::{Config, tilde_path};
use crate::core::models::{
    CommitMeta, Conclusion, ForgeHost, IssueInfo, PrInfo, StatusFile, WorktreeInfo,
};
use crate::core::naming::{
    issue_branch_name, pr_branch_name, sanitize_for_filesystem, shell_quote,
};
use crate::core::persistence::PaletteUsage;
use crate::core::scripts::{ScriptSubject, worktree_env};
use crate::core::status_tree::{FlatKind, status_counts};
use crate::error::TaskError;
use crate::tui::layout::Pane;
use crate::tui::model::{Cmd, Foreground, Model, Msg, NamingFor, SessionKind};
use crate::tui::screens::input::{validate_branch_name, validate_non_empty};
use crate::tui::screens::{
    ChecklistAction, ChecklistItem, ChecklistScreen, CommitScreen, ConfirmScreen, InputAction,
    InputScreen, ListAction, ListItem, ListScreen, PaletteItem, Screen,
};

/// Everything a key, the palette or a custom binding can trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Quit,
    FocusPane(u8),
    NextPane,
    PrevPane,
    PaneLeft,
    PaneRight,
    MoveDown,
    MoveUp,
    HalfPageDown,
    HalfPageUp,
    Bottom,
    Activate,
    NextItemDiff,
    PrevItemDiff,
    ToggleZoom,
    ToggleLayout,
    Create,
    Delete,
    Rename,
    Absorb,
    Prune,
    Diff,
    Push,
    Sync,
    FetchRemotes,
    OpenPr,
    CycleSort,
    CherryPick,
    Annotate,
    Taskboard,
    Lazygit,
    RunCommand,
    CopyPath,
    CopyBranch,
    Refresh,
    FetchPrs,
    Stage,
    Commit,
    CommitAll,
    Discard,
    EditFile,
    NextCiCheck,
    PrevCiCheck,
    ChooseCiCheck,
    CiLogs,
    Filter,
    Search,
    SearchNext,
    SearchPrev,
    FilterStepNext,
    FilterStepPrev,
    ClearFilter,
    Palette,
    Help,
    SelectTheme,
    Custom(String),
}

/// (id, label, description, shortcut) for every palette entry.
const PALETTE: &[(&str, &str, &str, &str)] = &[
    ("create", "Create worktree", "Create a new worktree", "c"),
    ("delete", "Delete worktree", "Remove the selected worktree", "D"),
    ("rename", "Rename worktree", "Move the worktree and rename its branch", "m"),
    ("absorb", "Absorb into main", "Merge the branch into main and remove it", "A"),
    ("prune", "Prune merged", "Remove worktrees with merged or closed PRs", "X"),
    ("diff", "Show diff", "Open the worktree diff in the pager", "d"),
    ("push", "Push", "Push the branch to its upstream", "P"),
    ("sync", "Sync", "Pull then push", "S"),
    ("fetch", "Fetch remotes", "git fetch --all --prune", "R"),
    ("open-pr", "Open pull request", "Open the PR in the browser", "o"),
    ("fetch-prs", "Fetch PR data", "Refresh pull request and CI data", "p"),
    ("refresh", "Refresh", "Reload worktrees", "r"),
    ("sort", "Cycle sort", "Path, last active, last switched", "s"),
    ("cherry-pick", "Cherry-pick", "Apply the selected commit to another worktree", "C"),
    ("annotate", "Edit note", "Edit the worktree note", "i"),
    ("taskboard", "Taskboard", "Tasks from every worktree note", "T"),
    ("lazygit", "Open lazygit", "Run lazygit in the worktree", "g"),
    ("run", "Run command", "Run a shell command in the worktree", "!"),
    ("copy-path", "Copy path", "Copy the worktree path", "y"),
    ("copy-branch", "Copy branch", "Copy the branch name", "Y"),
    ("ci-checks", "CI checks", "Choose a CI check to open", "v"),
    ("ci-logs", "CI logs", "Show logs of the selected CI check", "ctrl+v"),
    ("filter", "Filter", "Filter the focused pane", "f"),
    ("search", "Search", "Search the focused pane", "/"),
    ("layout", "Toggle layout", "Switch between default and top layouts", "L"),
    ("zoom", "Toggle zoom", "Zoom the focused pane", "="),
    ("theme", "Select theme", "Change the colour theme", ""),
    ("help", "Help", "Key bindings", "?"),
    ("quit", "Quit", "Exit", "q"),
];

impl Action {
    /// Palette id to action; `custom:<key>` addresses a custom command.
    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        if let Some(key) = id.strip_prefix("custom:") {
            return Some(Self::Custom(key.to_owned()));
        }
        Some(match id {
            "create" => Self::Create,
            "delete" => Self::Delete,
            "rename" => Self::Rename,
            "absorb" => Self::Absorb,
            "prune" => Self::Prune,
            "diff" => Self::Diff,
            "push" => Self::Push,
            "sync" => Self::Sync,
            "fetch" => Self::FetchRemotes,
            "open-pr" => Self::OpenPr,
            "fetch-prs" => Self::FetchPrs,
            "refresh" => Self::Refresh,
            "sort" => Self::CycleSort,
            "cherry-pick" => Self::CherryPick,
            "annotate" => Self::Annotate,
            "taskboard" => Self::Taskboard,
            "lazygit" => Self::Lazygit,
            "run" => Self::RunCommand,
            "copy-path" => Self::CopyPath,
            "copy-branch" => Self::CopyBranch,
            "ci-checks" => Self::ChooseCiCheck,
            "ci-logs" => Self::CiLogs,
            "filter" => Self::Filter,
            "search" => Self::Search,
            "layout" => Self::ToggleLayout,
            "zoom" => Self::ToggleZoom,
            "theme" => Self::SelectTheme,
            "help" => Self::Help,
            "quit" => Self::Quit,
            _ => return None,
        })
    }
}

/// Built-in entries followed by custom commands.
#[must_use]
pub fn palette_items(cfg: &Config) -> Vec<PaletteItem> {
    let mut items: Vec<PaletteItem> = PALETTE
        .iter()
        .map(|(id, label, desc, key)| PaletteItem::new(id, label, desc, key))
        .collect();
    for (key, cmd) in &cfg.custom_commands {
        items.push(PaletteItem {
            id: format!("custom:{key}"),
            label: cmd.label().to_owned(),
            description: cmd.command.clone(),
            shortcut: key.clone(),
        });
    }
    items
}

/// Most recently used ids, newest first, capped at `limit`.
#[must_use]
pub fn palette_recent(history: &[PaletteUsage], enabled: bool, limit: usize) -> Vec<String> {
    if !enabled {
        return Vec::new();
    }
    let mut usage: Vec<&PaletteUsage> = history.iter().collect();
    usage.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.count.cmp(&a.count)));
    usage.into_iter().take(limit).map(|u| u.id.clone()).collect()
}

/// Context handed to the note script after a create from PR or issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteSeed {
    pub subject: ScriptSubject,
    pub number: Option<u64>,
    pub title: String,
    pub url: String,
    pub body: String,
}

impl NoteSeed {
    #[must_use]
    pub fn from_pr(pr: &PrInfo) -> Self {
        Self {
            subject: ScriptSubject::Pr,
            number: Some(pr.number),
            title: pr.title.clone(),
            url: pr.url.clone(),
            body: pr.body.clone(),
        }
    }

    #[must_use]
    pub fn from_issue(issue: &IssueInfo) -> Self {
        Self {
            subject: ScriptSubject::Issue,
            number: Some(issue.number),
            title: issue.title.clone(),
            url: issue.url.clone(),
            body: issue.body.clone(),
        }
    }

    /// Text piped to scripts: title, blank line, body.
    #[must_use]
    pub fn stdin(&self) -> String {
        if self.body.trim().is_empty() {
            self.title.clone()
        } else {
            format!("{}\n\n{}", self.title, self.body)
        }
    }
}

/// Shell commands waiting for a trust decision or running after one.
#[derive(Debug, Clone)]
pub struct PendingCommands {
    pub label: String,
    pub commands: Vec<String>,
    pub cwd: PathBuf,
    pub env: BTreeMap<String, String>,
    /// Repo file that declared the commands; `None` for global config.
    pub trust_path: Option<PathBuf>,
    /// Delivered once the commands finish successfully.
    pub after: Option<Box<Msg>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    pub branch: String,
    /// Start point; `None` means the main branch.
    pub base: Option<String>,
    /// Worktree whose uncommitted changes may be carried over.
    pub source_path: Option<String>,
    pub include_changes: bool,
    pub note: Option<NoteSeed>,
}

/// Git work run off the event loop; echoed back in [`Msg::JobDone`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitJob {
    Push {
        path: String,
        remote: String,
        branch: String,
        set_upstream: bool,
    },
    Sync {
        path: String,
        remote: String,
        branch: String,
        set_upstream: bool,
    },
    UpdateFromBase {
        path: String,
    },
    Absorb {
        path: String,
        branch: String,
    },
    Delete {
        path: String,
        branch: String,
        force: bool,
    },
    DeleteBranch {
        branch: String,
    },
    Prune {
        targets: Vec<(String, String)>,
    },
    CherryPick {
        sha: String,
        target: String,
    },
    Create(CreateRequest),
    CreateFromPr {
        pr: Box<PrInfo>,
        branch: String,
    },
    Rename {
        path: String,
        new_path: String,
        old_branch: String,
        new_branch: Option<String>,
    },
    Stage {
        path: String,
        files: Vec<String>,
        unstage: bool,
    },
    Commit {
        path: String,
        message: String,
        all: bool,
    },
    Discard {
        path: String,
        file: String,
        untracked: bool,
    },
    FetchAll,
    CommitShow {
        path: String,
        sha: String,
    },
}

impl GitJob {
    /// Spinner text while the job runs; `None` for quick jobs.
    #[must_use]
    pub fn loading_label(&self) -> Option<String> {
        Some(match self {
            Self::Push { branch, .. } => format!("Pushing {branch}..."),
            Self::Sync { branch, .. } => format!("Syncing {branch}..."),
            Self::UpdateFromBase { .. } => "Updating from base...".to_owned(),
            Self::Absorb { branch, .. } => format!("Absorbing {branch}..."),
            Self::Delete { .. } => "Deleting worktree...".to_owned(),
            Self::Prune { targets } => format!("Pruning {} worktrees...", targets.len()),
            Self::CherryPick { .. } => "Cherry-picking...".to_owned(),
            Self::Create(req) => format!("Creating {}...", req.branch),
            Self::CreateFromPr { branch, .. } => format!("Creating {branch}..."),
            Self::Rename { .. } => "Renaming worktree...".to_owned(),
            Self::FetchAll => "Fetching remotes...".to_owned(),
            Self::DeleteBranch { .. }
            | Self::Stage { .. }
            | Self::Commit { .. }
            | Self::Discard { .. }
            | Self::CommitShow { .. } => return None,
        })
    }

    /// Worktree whose details the job invalidates.
    #[must_use]
    pub fn affected_path(&self) -> Option<&str> {
        match self {
            Self::Push { path, .. }
            | Self::Sync { path, .. }
            | Self::UpdateFromBase { path }
            | Self::Stage { path, .. }
            | Self::Commit { path, .. }
            | Self::Discard { path, .. } => Some(path),
            Self::CherryPick { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Operation name used in failure messages.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Push { .. } => "Push",
            Self::Sync { .. } => "Sync",
            Self::UpdateFromBase { .. } => "Update from base",
            Self::Absorb { .. } => "Absorb",
            Self::Delete { .. } => "Delete",
            Self::DeleteBranch { .. } => "Delete branch",
            Self::Prune { .. } => "Prune",
            Self::CherryPick { .. } => "Cherry-pick",
            Self::Create(_) | Self::CreateFromPr { .. } => "Create worktree",
            Self::Rename { .. } => "Rename",
            Self::Stage { .. } => "Stage",
            Self::Commit { .. } => "Commit",
            Self::Discard { .. } => "Discard",
            Self::FetchAll => "Fetch",
            Self::CommitShow { .. } => "Show commit",
        }
    }
}

#[derive(Debug, Clone)]
pub enum JobOutput {
    Done,
    Text(String),
    /// Path of a freshly created worktree.
    Created(String),
    Commit(Box<CommitMeta>, String),
    /// Per-target failures; empty when every removal succeeded.
    Pruned(Vec<String>),
}

/// Outcome of the push and sync precondition checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamPlan {
    Tracked { remote: String, branch: String },
    NeedsUpstream,
}

/// `origin/feature/x` → (`origin`, `feature/x`).
#[must_use]
pub fn split_upstream(upstream: &str) -> Option<(String, String)> {
    let (remote, branch) = upstream.trim().split_once('/')?;
    if remote.is_empty() || branch.is_empty() {
        return None;
    }
    Some((remote.to_owned(), branch.to_owned()))
}

pub fn push_plan(wt: &WorktreeInfo) -> Result<UpstreamPlan, String> {
    if wt.dirty() {
        return Err("Cannot push: worktree has uncommitted changes. Commit or stash them first.".to_owned());
    }
    upstream_plan(wt, "push")
}

fn upstream_plan(wt: &WorktreeInfo, verb: &str) -> Result<UpstreamPlan, String> {
    if wt.branch.is_empty() || wt.branch.starts_with("(detached") {
        return Err(format!("Cannot {verb}: HEAD is detached."));
    }
    if !wt.has_upstream {
        return Ok(UpstreamPlan::NeedsUpstream);
    }
    match split_upstream(&wt.upstream_branch) {
        Some((remote, branch)) if branch == wt.branch => Ok(UpstreamPlan::Tracked { remote, branch }),
        Some((_, _)) => Err(format!(
            "Cannot {verb}: upstream {} tracks a different branch than {}.",
            wt.upstream_branch, wt.branch
        )),
        None => Ok(UpstreamPlan::NeedsUpstream),
    }
}

/// Validates a `remote/branch` answer to the upstream prompt.
pub fn parse_upstream_input(input: &str, branch: &str) -> Result<(String, String), String> {
    let (remote, target) = split_upstream(input)
        .ok_or_else(|| "Upstream must look like remote/branch".to_owned())?;
    if target != branch {
        return Err(format!("Upstream branch must be {branch}"));
    }
    Ok((remote, target))
}

/// Same rules as [`push_plan`]: the upstream must track the current branch.
pub fn sync_plan(wt: &WorktreeInfo) -> Result<UpstreamPlan, String> {
    if wt.dirty() {
        return Err("Cannot sync: worktree has uncommitted changes.".to_owned());
    }
    upstream_plan(wt, "sync")
}

/// True when Sync should first offer `gh pr update-branch`.
#[must_use]
pub fn offers_update_from_base(wt: &WorktreeInfo) -> bool {
    wt.pr
        .as_ref()
        .is_some_and(|pr| !pr.base_branch.is_empty() && !pr.state.is_finished())
}

pub fn absorb_check(wt: &WorktreeInfo, main: Option<&WorktreeInfo>) -> Result<(), String> {
    if wt.is_main {
        return Err("Cannot absorb the main worktree.".to_owned());
    }
    let main = main.ok_or_else(|| "Cannot absorb: main worktree not found.".to_owned())?;
    if main.dirty() {
        return Err("Cannot absorb: main worktree has uncommitted changes.".to_owned());
    }
    if wt.dirty() {
        return Err("Cannot absorb: worktree has uncommitted changes.".to_owned());
    }
    if wt.branch == main.branch {
        return Err(format!("Cannot absorb: {} is already the main branch.", wt.branch));
    }
    Ok(())
}

/// Non-main worktrees whose PR is merged or closed, pre-checked.
#[must_use]
pub fn prune_candidates(worktrees: &[WorktreeInfo]) -> Vec<ChecklistItem> {
    worktrees
        .iter()
        .filter(|w| !w.is_main)
        .filter_map(|w| {
            let pr = w.pr.as_ref().filter(|pr| pr.state.is_finished())?;
            Some(ChecklistItem {
                id: w.path.clone(),
                label: w.display_name(),
                description: format!("#{} {} {}", pr.number, pr.state.as_str(), pr.title),
                checked: true,
            })
        })
        .collect()
}

pub const CREATE_CURRENT: &str = "current";
pub const CREATE_BRANCH: &str = "branch";
pub const CREATE_PR: &str = "pr";
pub const CREATE_ISSUE: &str = "issue";
pub const CREATE_CHANGES: &str = "changes";

/// Entries of the create menu; custom menus use `custom:<index>` ids.
#[must_use]
pub fn create_menu_items(cfg: &Config, current: &str, has_changes: bool, forge: bool) -> Vec<ListItem> {
    let mut items = vec![
        ListItem::new(CREATE_CURRENT, "From current branch", format!("Branch off {current}")),
        ListItem::new(CREATE_BRANCH, "From branch", "Pick a base branch"),
    ];
    if forge && !cfg.disable_pr {
        items.push(ListItem::new(CREATE_PR, "From pull request", "Check out an open PR"));
        items.push(ListItem::new(CREATE_ISSUE, "From issue", "Name the branch after an issue"));
    }
    if has_changes {
        items.push(ListItem::new(
            CREATE_CHANGES,
            "From current changes",
            "Move uncommitted changes to a new worktree",
        ));
    }
    for (i, menu) in cfg.custom_create_menus.iter().enumerate() {
        items.push(ListItem::new(
            format!("custom:{i}"),
            menu.label.clone(),
            menu.description.clone(),
        ));
    }
    items
}

/// `git show` / log filter: SHA prefix or case-insensitive message match.
#[must_use]
pub fn commit_matches(sha: &str, message: &str, query: &str) -> bool {
    let q = query.trim().to_lowercase();
    q.is_empty() || sha.starts_with(&q) || message.to_lowercase().contains(&q)
}

static RUN_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/runs/(\d+)(?:/jobs?/(\d+))?").expect("run link pattern"));

/// GitHub Actions `(run id, job id)` from a check link.
#[must_use]
pub fn parse_run_link(link: &str) -> Option<(String, Option<String>)> {
    let caps = RUN_LINK.captures(link)?;
    Some((caps[1].to_owned(), caps.get(2).map(|m| m.as_str().to_owned())))
}

/// Shell pipeline showing tracked changes plus a capped number of untracked
/// files, truncated to `max_diff_chars`.
#[must_use]
pub fn worktree_diff_script(cfg: &Config) -> String {
    let git_pager = cfg.git_pager.trim();
    if cfg.git_pager_command_mode && !git_pager.is_empty() {
        let mut cmd = git_pager.to_owned();
        for arg in &cfg.git_pager_args {
            cmd.push(' ');
            cmd.push_str(&shell_quote(arg));
        }
        return cmd;
    }
    format!(
        "{{ git diff HEAD; git ls-files --others --exclude-standard | head -n {n} | \
         while IFS= read -r f; do git diff --no-index -- /dev/null \"$f\"; done; }} \
         | head -c {c} | {p}",
        n = cfg.max_untracked_diffs,
        c = cfg.max_diff_chars,
        p = cfg.diff_pipeline(),
    )
}

fn has_staged(file: &StatusFile) -> bool {
    !file.is_untracked && file.status.chars().next().is_some_and(|c| c != '.' && c != ' ')
}

fn has_unstaged(file: &StatusFile) -> bool {
    file.is_untracked || file.status.chars().nth(1).is_some_and(|c| c != '.' && c != ' ')
}

/// Worktree operations. Each checks its preconditions before any git call
/// and answers with a prompt, a job or an Info message.
impl Model {
    pub(crate) fn perform_op(&mut self, action: Action) -> Vec<Cmd> {
        match action {
            Action::Create => self.open_create_menu(),
            Action::Delete => self.start_delete(),
            Action::Rename => self.start_rename(),
            Action::Absorb => self.start_absorb(),
            Action::Prune => self.start_prune(),
            Action::Diff => self.show_diff(),
            Action::Push => self.start_push(),
            Action::Sync => self.start_sync(),
            Action::FetchRemotes => self.run_job(GitJob::FetchAll),
            Action::OpenPr => self.open_pr(),
            Action::CherryPick => self.start_cherry_pick(),
            Action::Lazygit => match self.registry.selected().cloned() {
                Some(wt) => vec![self.shell_in(&wt, "lazygit".to_owned(), false)],
                None => Vec::new(),
            },
            Action::RunCommand => {
                let Some(path) = self.selected_path() else {
                    return Vec::new();
                };
                let input = InputScreen::new("Run command", "Command", InputAction::RunCommand { path })
                    .validator(validate_non_empty)
                    .history(self.command_history.clone());
                self.screens.push(Screen::Input(input));
                Vec::new()
            }
            Action::Stage => self.stage_selected(),
            Action::Commit => self.start_commit(false),
            Action::CommitAll => self.start_commit(true),
            Action::Discard => self.start_discard(),
            Action::EditFile => self.edit_selected_file(),
            Action::CiLogs => self.show_ci_logs(),
            Action::Custom(key) => self.run_custom(&key),
            other => {
                debug!(?other, "not a worktree operation");
                Vec::new()
            }
        }
    }

    /// Starts a git job, with a Loading screen for slow ones.
    pub(crate) fn run_job(&mut self, job: GitJob) -> Vec<Cmd> {
        if let Some(label) = job.loading_label() {
            self.begin_loading(label);
        }
        info!(job = job.name(), "starting job");
        vec![Cmd::Git(job)]
    }

    fn env_for(&self, wt: &WorktreeInfo) -> BTreeMap<String, String> {
        worktree_env(wt, &self.main_path, &self.repo_key)
    }

    fn shell_in(&self, wt: &WorktreeInfo, command: String, pause: bool) -> Cmd {
        Cmd::Foreground(Foreground::Shell {
            cwd: wt.path.clone(),
            command,
            env: self.env_for(wt),
            pause,
        })
    }

    /// Global commands followed by `.wt.yaml` ones; the trust path is set
    /// only when the repo file contributes commands.
    fn lifecycle_commands(&self, init: bool) -> (Vec<String>, Option<PathBuf>) {
        let mut commands = if init {
            self.cfg.init_commands.clone()
        } else {
            self.cfg.terminate_commands.clone()
        };
        let mut trust_path = None;
        if let Some((repo, path)) = &self.repo_config {
            let repo_cmds = if init {
                &repo.init_commands
            } else {
                &repo.terminate_commands
            };
            if !repo_cmds.is_empty() {
                commands.extend(repo_cmds.iter().cloned());
                trust_path = Some(path.clone());
            }
        }
        commands.retain(|c| !c.trim().is_empty());
        (commands, trust_path)
    }

    fn branch_script_enabled(&self) -> bool {
        !self.cfg.branch_name_script.trim().is_empty()
    }

    // ----- create -----

    fn open_create_menu(&mut self) -> Vec<Cmd> {
        let (current, dirty) = self.registry.selected().map_or_else(
            || (self.main_branch.clone(), false),
            |w| (w.branch.clone(), w.dirty()),
        );
        let items = create_menu_items(&self.cfg, &current, dirty, self.forge_enabled());
        self.screens
            .push(Screen::List(ListScreen::new("Create worktree", items, ListAction::CreateMenu)));
        Vec::new()
    }

    fn prompt_branch_name(
        &mut self,
        initial: &str,
        base: Option<String>,
        source_path: Option<String>,
        note: Option<NoteSeed>,
    ) {
        let title = match &base {
            Some(b) => format!("Create worktree from {b}"),
            None => format!("Create worktree from {}", self.main_branch),
        };
        let has_source = source_path.is_some();
        let mut input = InputScreen::new(
            title,
            "Branch name",
            InputAction::CreateBranch {
                base,
                source_path,
                note,
            },
        )
        .value(initial)
        .validator(validate_branch_name);
        if has_source {
            input = input.checkbox("Include uncommitted changes", true, self.branch_script_enabled());
        }
        self.screens.push(Screen::Input(input));
    }

    fn on_create_menu(&mut self, id: &str) -> Vec<Cmd> {
        let selected = self.registry.selected().cloned();
        match id {
            CREATE_CURRENT => {
                let base = selected
                    .map(|w| w.branch)
                    .filter(|b| !b.is_empty() && b != "(detached)")
                    .unwrap_or_else(|| self.main_branch.clone());
                self.prompt_branch_name("", Some(base), None, None);
                Vec::new()
            }
            CREATE_BRANCH => {
                self.begin_loading("Loading branches...");
                vec![Cmd::ListBranches]
            }
            CREATE_PR => {
                self.begin_loading("Fetching pull requests...");
                vec![Cmd::FetchOpenPrs]
            }
            CREATE_ISSUE => {
                self.begin_loading("Fetching issues...");
                vec![Cmd::FetchIssues]
            }
            CREATE_CHANGES => {
                let Some(wt) = selected else {
                    return Vec::new();
                };
                if self.branch_script_enabled() {
                    self.begin_loading("Generating branch name...");
                    return vec![Cmd::BranchNameScript {
                        naming: NamingFor::Changes {
                            source_path: wt.path.clone(),
                        },
                        cwd: wt.path,
                    }];
                }
                self.prompt_branch_name("", Some(wt.branch), Some(wt.path), None);
                Vec::new()
            }
            other => {
                let menu = other
                    .strip_prefix("custom:")
                    .and_then(|i| i.parse::<usize>().ok())
                    .and_then(|i| self.cfg.custom_create_menus.get(i))
                    .cloned();
                let Some(menu) = menu else {
                    return Vec::new();
                };
                self.begin_loading(format!("Running {}...", menu.label));
                vec![Cmd::CustomMenuScript {
                    command: menu.command,
                    cwd: self.main_path.clone(),
                }]
            }
        }
    }

    pub(crate) fn on_branches_loaded(&mut self, result: Result<Vec<String>, String>) -> Vec<Cmd> {
        self.end_loading();
        match result {
            Ok(branches) if !branches.is_empty() => {
                let items = branches
                    .into_iter()
                    .map(|b| {
                        let desc = if b == self.main_branch { "default branch" } else { "" };
                        ListItem::new(b.clone(), b, desc)
                    })
                    .collect();
                let mut list = ListScreen::new("Base branch", items, ListAction::BaseBranch);
                list.select_id(&self.main_branch);
                self.screens.push(Screen::List(list));
            }
            Ok(_) => self.show_info("No branches found."),
            Err(e) => self.show_info(format!("Failed to list branches: {e}")),
        }
        Vec::new()
    }

    pub(crate) fn on_open_prs_loaded(&mut self, result: Result<Vec<PrInfo>, String>) -> Vec<Cmd> {
        self.end_loading();
        match result {
            Ok(prs) if !prs.is_empty() => {
                let items = prs
                    .iter()
                    .map(|pr| {
                        let mut desc = pr.branch.clone();
                        if !pr.author.is_empty() {
                            desc.push_str(&format!(" by {}", pr.author));
                        }
                        if pr.is_draft {
                            desc.push_str(" (draft)");
                        }
                        ListItem::new(pr.number.to_string(), format!("#{} {}", pr.number, pr.title), desc)
                    })
                    .collect();
                self.open_prs = prs;
                self.screens.push(Screen::List(ListScreen::new(
                    "Create from pull request",
                    items,
                    ListAction::PullRequest,
                )));
            }
            Ok(_) => self.show_info("No open pull requests."),
            Err(e) => self.show_info(format!("Failed to fetch pull requests: {e}")),
        }
        Vec::new()
    }

    pub(crate) fn on_issues_loaded(&mut self, result: Result<Vec<IssueInfo>, String>) -> Vec<Cmd> {
        self.end_loading();
        match result {
            Ok(issues) if !issues.is_empty() => {
                let items = issues
                    .iter()
                    .map(|i| {
                        ListItem::new(i.number.to_string(), format!("#{} {}", i.number, i.title), i.author.clone())
                    })
                    .collect();
                self.issues = issues;
                self.screens
                    .push(Screen::List(ListScreen::new("Create from issue", items, ListAction::Issue)));
            }
            Ok(_) => self.show_info("No open issues."),
            Err(e) => self.show_info(format!("Failed to fetch issues: {e}")),
        }
        Vec::new()
    }

    fn on_pr_chosen(&mut self, id: &str) -> Vec<Cmd> {
        let Some(pr) = self.open_prs.iter().find(|p| p.number.to_string() == id).cloned() else {
            return Vec::new();
        };
        if let Some(existing) = self.registry.find_by_branch(&pr.branch) {
            let (path, name) = (existing.path.clone(), existing.display_name());
            if !self.registry.select_path(&path) {
                self.registry.set_filter("");
                self.registry.select_path(&path);
            }
            let cmds = self.on_selection_changed();
            self.show_info(format!("PR #{} is already checked out in {name}.", pr.number));
            return cmds;
        }
        if self.branch_script_enabled() {
            self.begin_loading("Generating branch name...");
            return vec![Cmd::BranchNameScript {
                naming: NamingFor::Pr(Box::new(pr)),
                cwd: self.main_path.clone(),
            }];
        }
        self.create_from_pr(pr, None)
    }

    fn create_from_pr(&mut self, pr: PrInfo, generated: Option<&str>) -> Vec<Cmd> {
        let branch = pr_branch_name(&pr, &self.cfg.pr_branch_name_template, generated);
        if branch.is_empty() {
            self.show_info(format!("Could not derive a branch name for PR #{}.", pr.number));
            return Vec::new();
        }
        if let Some(existing) = self.registry.find_by_branch(&branch) {
            let path = tilde_path(&existing.path);
            self.show_info(format!("Branch {branch} is already checked out in {path}."));
            return Vec::new();
        }
        self.run_job(GitJob::CreateFromPr {
            pr: Box::new(pr),
            branch,
        })
    }

    fn on_issue_chosen(&mut self, id: &str) -> Vec<Cmd> {
        let Some(issue) = self.issues.iter().find(|i| i.number.to_string() == id).cloned() else {
            return Vec::new();
        };
        if self.branch_script_enabled() {
            self.begin_loading("Generating branch name...");
            return vec![Cmd::BranchNameScript {
                naming: NamingFor::Issue(issue),
                cwd: self.main_path.clone(),
            }];
        }
        let name = issue_branch_name(&issue, &self.cfg.issue_branch_name_template, None);
        self.prompt_branch_name(&name, None, None, Some(NoteSeed::from_issue(&issue)));
        Vec::new()
    }

    pub(crate) fn on_branch_name(
        &mut self,
        naming: NamingFor,
        result: Result<Option<String>, String>,
    ) -> Vec<Cmd> {
        self.end_loading();
        let generated = match result {
            Ok(generated) => generated,
            Err(e) => {
                self.show_info(format!("Branch name script error: {e}"));
                return Vec::new();
            }
        };
        match naming {
            NamingFor::Pr(pr) => self.create_from_pr(*pr, generated.as_deref()),
            NamingFor::Issue(issue) => {
                let name = issue_branch_name(
                    &issue,
                    &self.cfg.issue_branch_name_template,
                    generated.as_deref(),
                );
                self.prompt_branch_name(&name, None, None, Some(NoteSeed::from_issue(&issue)));
                Vec::new()
            }
            NamingFor::Changes { source_path } => {
                let name = generated.unwrap_or_default();
                if let Some(Screen::Input(input)) = self.screens.top_mut()
                    && matches!(
                        input.action(),
                        InputAction::CreateBranch { source_path: Some(p), .. } if *p == source_path
                    )
                {
                    input.set_text(&name);
                    return Vec::new();
                }
                let base = self
                    .registry
                    .find_by_path(&source_path)
                    .map(|w| w.branch.clone());
                self.prompt_branch_name(&name, base, Some(source_path), None);
                Vec::new()
            }
            NamingFor::Custom => {
                self.prompt_branch_name(&generated.unwrap_or_default(), None, None, None);
                Vec::new()
            }
        }
    }

    pub(crate) fn on_checkbox_toggled(&mut self, action: InputAction, checked: bool) -> Vec<Cmd> {
        match action {
            InputAction::CreateBranch {
                source_path: Some(path),
                ..
            } if checked && self.branch_script_enabled() => vec![Cmd::BranchNameScript {
                naming: NamingFor::Changes {
                    source_path: path.clone(),
                },
                cwd: path,
            }],
            _ => Vec::new(),
        }
    }

    fn create_branch(
        &mut self,
        branch: String,
        base: Option<String>,
        source_path: Option<String>,
        include: bool,
        note: Option<NoteSeed>,
    ) -> Vec<Cmd> {
        if let Some(existing) = self.registry.find_by_branch(&branch) {
            let path = tilde_path(&existing.path);
            self.show_info(format!("Branch {branch} is already checked out in {path}."));
            return Vec::new();
        }
        let include_changes = include && source_path.is_some();
        self.run_job(GitJob::Create(CreateRequest {
            branch,
            base,
            source_path,
            include_changes,
            note,
        }))
    }

    /// Selection, init commands and the note script for a new worktree.
    fn after_create(&mut self, path: String, branch: &str, note: Option<NoteSeed>) -> Vec<Cmd> {
        self.pending_select = Some(path.clone());
        let mut cmds = self.reload_worktrees();
        let wt = WorktreeInfo::new(path.clone(), branch, false);
        let (commands, trust_path) = self.lifecycle_commands(true);
        if !commands.is_empty() {
            cmds.push(Cmd::RunCommands {
                pending: PendingCommands {
                    label: "Init commands".to_owned(),
                    commands,
                    cwd: PathBuf::from(&path),
                    env: self.env_for(&wt),
                    trust_path,
                    after: None,
                },
                force: false,
            });
        }
        if let Some(seed) = note
            && !self.cfg.worktree_note_script.trim().is_empty()
        {
            cmds.push(Cmd::NoteScript { path, seed });
        }
        cmds
    }

    // ----- delete, rename, absorb, prune -----

    fn start_delete(&mut self) -> Vec<Cmd> {
        let Some(wt) = self.registry.selected().cloned() else {
            return Vec::new();
        };
        if wt.is_main {
            self.show_info("Cannot delete the main worktree.");
            return Vec::new();
        }
        let mut message = format!("Delete worktree {}?\n{}", wt.display_name(), tilde_path(&wt.path));
        if wt.dirty() {
            message.push_str("\n\nIt has uncommitted changes that will be lost.");
        }
        let confirm = ConfirmScreen::new(
            "Delete worktree",
            message,
            Msg::ConfirmDelete {
                force: wt.dirty(),
                path: wt.path,
                branch: wt.branch,
            },
        )
        .default_no();
        self.screens.push(Screen::Confirm(confirm));
        Vec::new()
    }

    /// Runs terminate commands, then the delete itself.
    pub(crate) fn confirm_delete(&mut self, path: String, branch: String, force: bool) -> Vec<Cmd> {
        let (commands, trust_path) = self.lifecycle_commands(false);
        let wt = self
            .registry
            .find_by_path(&path)
            .cloned()
            .unwrap_or_else(|| WorktreeInfo::new(path.clone(), branch.clone(), false));
        let delete = GitJob::Delete {
            path: path.clone(),
            branch,
            force,
        };
        if commands.is_empty() {
            return self.run_job(delete);
        }
        self.begin_loading("Running terminate commands...");
        vec![Cmd::RunCommands {
            pending: PendingCommands {
                label: "Terminate commands".to_owned(),
                commands,
                cwd: PathBuf::from(path),
                env: self.env_for(&wt),
                trust_path,
                after: Some(Box::new(Msg::RunJob(delete))),
            },
            force: false,
        }]
    }

    fn start_rename(&mut self) -> Vec<Cmd> {
        let Some(wt) = self.registry.selected().cloned() else {
            return Vec::new();
        };
        if wt.is_main {
            self.show_info("Cannot rename the main worktree.");
            return Vec::new();
        }
        let input = InputScreen::new(
            format!("Rename {}", wt.display_name()),
            "New name",
            InputAction::Rename {
                path: wt.path.clone(),
            },
        )
        .value(&wt.basename())
        .validator(validate_branch_name);
        self.screens.push(Screen::Input(input));
        Vec::new()
    }

    fn rename(&mut self, path: String, name: &str) -> Vec<Cmd> {
        let Some(wt) = self.registry.find_by_path(&path).cloned() else {
            return Vec::new();
        };
        let slug = sanitize_for_filesystem(name);
        let new_path = Path::new(&path)
            .parent()
            .map_or_else(|| PathBuf::from(&slug), |p| p.join(&slug))
            .to_string_lossy()
            .to_string();
        let new_branch = (wt.branch == wt.basename() && wt.branch != name).then(|| name.to_owned());
        if new_path == path && new_branch.is_none() {
            return Vec::new();
        }
        if let Some(b) = &new_branch
            && self.registry.find_by_branch(b).is_some()
        {
            self.show_info(format!("Branch {b} is already checked out."));
            return Vec::new();
        }
        self.run_job(GitJob::Rename {
            path,
            new_path,
            old_branch: wt.branch,
            new_branch,
        })
    }

    fn start_absorb(&mut self) -> Vec<Cmd> {
        let Some(wt) = self.registry.selected().cloned() else {
            return Vec::new();
        };
        if let Err(e) = absorb_check(&wt, self.registry.main_worktree()) {
            self.show_info(e);
            return Vec::new();
        }
        let method = self.cfg.merge_method.as_str();
        let message = format!(
            "Integrate {} into {} ({method}) and remove the worktree?",
            wt.branch, self.main_branch
        );
        let confirm = ConfirmScreen::new(
            "Absorb worktree",
            message,
            Msg::RunJob(GitJob::Absorb {
                path: wt.path,
                branch: wt.branch,
            }),
        )
        .default_no();
        self.screens.push(Screen::Confirm(confirm));
        Vec::new()
    }

    fn start_prune(&mut self) -> Vec<Cmd> {
        if !self.forge_enabled() {
            self.show_info("Pruning merged worktrees needs PR data from GitHub or GitLab.");
            return Vec::new();
        }
        self.prune_after_prs = true;
        self.start_pr_fetch()
    }

    /// Checklist of worktrees whose PRs are merged or closed.
    pub(crate) fn open_prune(&mut self) -> Vec<Cmd> {
        let items = prune_candidates(self.registry.all());
        if items.is_empty() {
            self.show_info("No merged worktrees to prune");
            return Vec::new();
        }
        self.screens.push(Screen::Checklist(ChecklistScreen::new(
            "Prune merged worktrees",
            items,
            ChecklistAction::PruneMerged,
        )));
        Vec::new()
    }

    pub(crate) fn on_checklist_submitted(&mut self, action: ChecklistAction, ids: Vec<String>) -> Vec<Cmd> {
        match action {
            ChecklistAction::PruneMerged => {
                let targets: Vec<(String, String)> = ids
                    .iter()
                    .filter_map(|id| self.registry.find_by_path(id))
                    .filter(|w| !w.is_main)
                    .map(|w| (w.path.clone(), w.branch.clone()))
                    .collect();
                if targets.is_empty() {
                    return Vec::new();
                }
                self.run_job(GitJob::Prune { targets })
            }
        }
    }

    // ----- push, sync, cherry-pick -----

    fn start_push(&mut self) -> Vec<Cmd> {
        let Some(wt) = self.registry.selected().cloned() else {
            return Vec::new();
        };
        match push_plan(&wt) {
            Err(e) => {
                self.show_info(e);
                Vec::new()
            }
            Ok(UpstreamPlan::Tracked { remote, branch }) => self.run_job(GitJob::Push {
                path: wt.path,
                remote,
                branch,
                set_upstream: false,
            }),
            Ok(UpstreamPlan::NeedsUpstream) => {
                self.prompt_upstream(&wt, false);
                Vec::new()
            }
        }
    }

    /// Asks where an untracked branch should go; `sync` pulls before pushing.
    fn prompt_upstream(&mut self, wt: &WorktreeInfo, sync: bool) {
        let title = if sync { "Sync upstream" } else { "Set upstream" };
        let input = InputScreen::new(
            title,
            format!("{} has no upstream. Push to", wt.branch),
            InputAction::UpstreamRef {
                path: wt.path.clone(),
                branch: wt.branch.clone(),
                sync,
            },
        )
        .value(&format!("origin/{}", wt.branch))
        .validator(validate_non_empty);
        self.screens.push(Screen::Input(input));
    }

    fn start_sync(&mut self) -> Vec<Cmd> {
        let Some(wt) = self.registry.selected().cloned() else {
            return Vec::new();
        };
        let (remote, branch) = match sync_plan(&wt) {
            Ok(UpstreamPlan::Tracked { remote, branch }) => (remote, branch),
            Ok(UpstreamPlan::NeedsUpstream) => {
                self.prompt_upstream(&wt, true);
                return Vec::new();
            }
            Err(e) => {
                self.show_info(e);
                return Vec::new();
            }
        };
        let sync = GitJob::Sync {
            path: wt.path.clone(),
            remote,
            branch,
            set_upstream: false,
        };
        if offers_update_from_base(&wt)
            && let Some(pr) = &wt.pr
        {
            let message = format!(
                "PR #{} targets {}.\nUpdate {} from {} before syncing?",
                pr.number, pr.base_branch, wt.branch, pr.base_branch
            );
            let confirm = ConfirmScreen::new(
                "Sync",
                message,
                Msg::RunJob(GitJob::UpdateFromBase { path: wt.path }),
            )
            .labels("Update from base", "Sync only")
            .on_cancel(Msg::RunJob(sync));
            self.screens.push(Screen::Confirm(confirm));
            return Vec::new();
        }
        self.run_job(sync)
    }

    fn start_cherry_pick(&mut self) -> Vec<Cmd> {
        let Some(commit) = self.selected_commit().cloned() else {
            self.show_info("Select a commit in the Commit pane first.");
            return Vec::new();
        };
        let current = self.selected_path();
        let items: Vec<ListItem> = self
            .registry
            .all()
            .iter()
            .filter(|w| Some(&w.path) != current.as_ref())
            .map(|w| {
                let desc = if w.dirty() {
                    format!("{} (uncommitted changes)", w.branch)
                } else {
                    w.branch.clone()
                };
                ListItem::new(w.path.clone(), w.display_name(), desc)
            })
            .collect();
        if items.is_empty() {
            self.show_info("No other worktree to cherry-pick onto.");
            return Vec::new();
        }
        self.screens.push(Screen::List(ListScreen::new(
            format!("Cherry-pick {} onto", commit.short_sha()),
            items,
            ListAction::CherryPickTarget { sha: commit.sha },
        )));
        Vec::new()
    }

    fn cherry_pick_onto(&mut self, sha: String, target: String) -> Vec<Cmd> {
        let Some(wt) = self.registry.find_by_path(&target) else {
            return Vec::new();
        };
        if wt.dirty() {
            let name = wt.display_name();
            self.show_info(format!("Cannot cherry-pick: {name} has uncommitted changes."));
            return Vec::new();
        }
        self.run_job(GitJob::CherryPick { sha, target })
    }

    // ----- git status pane -----

    fn stage_selected(&mut self) -> Vec<Cmd> {
        let Some(path) = self.selected_path() else {
            return Vec::new();
        };
        let files = self.status.selected_files();
        if files.is_empty() {
            return Vec::new();
        }
        let unstage = files.iter().all(|f| has_staged(f) && !has_unstaged(f));
        let files = files.iter().map(|f| f.filename.clone()).collect();
        self.run_job(GitJob::Stage {
            path,
            files,
            unstage,
        })
    }

    fn start_commit(&mut self, all: bool) -> Vec<Cmd> {
        let Some(path) = self.selected_path() else {
            return Vec::new();
        };
        let (staged, modified, _) = status_counts(self.status.all_files());
        if !all && staged == 0 {
            self.show_info("Nothing staged. Stage files with s, or press C to commit all tracked changes.");
            return Vec::new();
        }
        if all && staged + modified == 0 {
            self.show_info("No tracked changes to commit.");
            return Vec::new();
        }
        let mut input = InputScreen::new(
            if all { "Commit all" } else { "Commit" },
            "Message",
            InputAction::Commit { path },
        )
        .validator(validate_non_empty);
        if all {
            input = input.checkbox("Include all tracked changes (-a)", true, false);
        }
        self.screens.push(Screen::Input(input));
        Vec::new()
    }

    fn start_discard(&mut self) -> Vec<Cmd> {
        let Some(path) = self.selected_path() else {
            return Vec::new();
        };
        let Some(FlatKind::File(file)) = self.status.selected().map(|e| e.kind.clone()) else {
            self.show_info("Select a file to discard.");
            return Vec::new();
        };
        let (title, message) = if file.is_untracked {
            ("Delete file", format!("Delete untracked file {}?", file.filename))
        } else {
            ("Discard changes", format!("Discard all changes to {}?", file.filename))
        };
        let confirm = ConfirmScreen::new(
            title,
            message,
            Msg::RunJob(GitJob::Discard {
                path,
                file: file.filename,
                untracked: file.is_untracked,
            }),
        )
        .default_no();
        self.screens.push(Screen::Confirm(confirm));
        Vec::new()
    }

    fn edit_selected_file(&mut self) -> Vec<Cmd> {
        let Some(wt) = self.registry.selected().cloned() else {
            return Vec::new();
        };
        let Some(FlatKind::File(file)) = self.status.selected().map(|e| e.kind.clone()) else {
            return Vec::new();
        };
        let command = format!("{} {}", self.cfg.editor_command(), shell_quote(&file.filename));
        vec![self.shell_in(&wt, command, false)]
    }

    // ----- viewers -----

    fn show_diff(&mut self) -> Vec<Cmd> {
        let Some(wt) = self.registry.selected().cloned() else {
            return Vec::new();
        };
        let pipeline = self.cfg.diff_pipeline();
        let command = match self.focus {
            Pane::GitStatus => {
                let Some(entry) = self.status.selected() else {
                    return Vec::new();
                };
                match &entry.kind {
                    FlatKind::File(file) if file.is_untracked => format!(
                        "git diff --no-index -- /dev/null {} | {pipeline}",
                        shell_quote(&file.filename)
                    ),
                    FlatKind::File(file) => {
                        format!("git diff HEAD -- {} | {pipeline}", shell_quote(&file.filename))
                    }
                    FlatKind::Directory { .. } => {
                        format!("git diff HEAD -- {} | {pipeline}", shell_quote(&entry.path))
                    }
                }
            }
            Pane::Commit => {
                let Some(sha) = self.selected_commit().map(|c| c.sha.clone()) else {
                    return Vec::new();
                };
                return self.commit_diff(&wt.path, &sha);
            }
            _ => worktree_diff_script(&self.cfg),
        };
        vec![self.shell_in(&wt, command, false)]
    }

    /// `git show` of one commit through the diff pager.
    pub(crate) fn commit_diff(&mut self, path: &str, sha: &str) -> Vec<Cmd> {
        let command = format!(
            "git show --stat --patch {} | {}",
            shell_quote(sha),
            self.cfg.diff_pipeline()
        );
        vec![Cmd::Foreground(Foreground::Shell {
            cwd: path.to_owned(),
            command,
            env: BTreeMap::new(),
            pause: false,
        })]
    }

    fn open_pr(&mut self) -> Vec<Cmd> {
        let Some(wt) = self.registry.selected() else {
            return Vec::new();
        };
        match &wt.pr {
            Some(pr) if !pr.url.is_empty() => vec![Cmd::OpenUrl(pr.url.clone())],
            _ if !self.forge_enabled() => {
                self.show_info("No GitHub or GitLab remote for this repository.");
                Vec::new()
            }
            _ => {
                let branch = wt.branch.clone();
                self.show_info(format!("No pull request found for {branch}."));
                Vec::new()
            }
        }
    }

    fn show_ci_logs(&mut self) -> Vec<Cmd> {
        let Some(wt) = self.registry.selected().cloned() else {
            return Vec::new();
        };
        let checks = self.current_ci_checks();
        let check = self
            .ci_check_index
            .and_then(|i| checks.get(i))
            .or_else(|| checks.iter().find(|c| c.conclusion == Conclusion::Failure))
            .or_else(|| checks.first());
        let Some(check) = check else {
            self.show_info("No CI checks for this worktree.");
            return Vec::new();
        };
        if self.host != ForgeHost::GitHub {
            self.show_info("CI logs are only available for GitHub Actions.");
            return Vec::new();
        }
        let Some((run, job)) = parse_run_link(&check.link) else {
            let name = check.name.clone();
            self.show_info(format!("No GitHub Actions run found for {name}."));
            return Vec::new();
        };
        let view = match job {
            Some(job) => format!("gh run view {run} --job {job} --log"),
            None => format!("gh run view {run} --log"),
        };
        let command = format!("{view} 2>&1 | {}", self.cfg.ci_pager_command());
        vec![self.shell_in(&wt, command, false)]
    }

    fn run_custom(&mut self, key: &str) -> Vec<Cmd> {
        let Some(cmd) = self.cfg.custom_commands.get(key).cloned() else {
            return Vec::new();
        };
        let Some(wt) = self.registry.selected().cloned() else {
            return Vec::new();
        };
        let env = self.env_for(&wt);
        let session = cmd
            .tmux
            .clone()
            .map(|s| (SessionKind::Tmux, s))
            .or_else(|| cmd.zellij.clone().map(|s| (SessionKind::Zellij, s)));
        if let Some((kind, session)) = session {
            if cmd.new_tab {
                return vec![Cmd::SessionTab {
                    kind,
                    session,
                    title: cmd.label().to_owned(),
                    path: wt.path,
                    env,
                }];
            }
            return vec![Cmd::Foreground(Foreground::Session {
                kind,
                session,
                path: wt.path,
                env,
            })];
        }
        if cmd.command.trim().is_empty() {
            return Vec::new();
        }
        if cmd.new_tab {
            return vec![Cmd::NewTab {
                title: cmd.label().to_owned(),
                command: cmd.command,
                cwd: wt.path,
                env,
            }];
        }
        let (command, pause) = if cmd.show_output {
            (format!("{} | {}", cmd.command, self.cfg.pager_command()), false)
        } else {
            (cmd.command, true)
        };
        vec![Cmd::Foreground(Foreground::Shell {
            cwd: wt.path,
            command,
            env,
            pause,
        })]
    }

    // ----- screen results -----

    pub(crate) fn on_input_submitted(&mut self, action: InputAction, value: String, checked: bool) -> Vec<Cmd> {
        match action {
            InputAction::CreateBranch {
                base,
                source_path,
                note,
            } => self.create_branch(value, base, source_path, checked, note),
            InputAction::Rename { path } => self.rename(path, &value),
            InputAction::Commit { path } => self.run_job(GitJob::Commit {
                path,
                message: value,
                all: checked,
            }),
            InputAction::RunCommand { path } => {
                self.note_command_use(&value);
                let wt = self
                    .registry
                    .find_by_path(&path)
                    .cloned()
                    .unwrap_or_else(|| WorktreeInfo::new(path, "", false));
                vec![Cmd::PushHistory(value.clone()), self.shell_in(&wt, value, true)]
            }
            InputAction::UpstreamRef { path, branch, sync } => match parse_upstream_input(&value, &branch) {
                Ok((remote, branch)) if sync => self.run_job(GitJob::Sync {
                    path,
                    remote,
                    branch,
                    set_upstream: true,
                }),
                Ok((remote, branch)) => self.run_job(GitJob::Push {
                    path,
                    remote,
                    branch,
                    set_upstream: true,
                }),
                Err(e) => {
                    self.show_info(e);
                    Vec::new()
                }
            },
            InputAction::AddTask { path } => self.add_task(&path, &value),
        }
    }

    pub(crate) fn on_list_selected(&mut self, action: ListAction, id: String) -> Vec<Cmd> {
        match action {
            ListAction::CreateMenu => self.on_create_menu(&id),
            ListAction::BaseBranch => {
                self.prompt_branch_name("", Some(id), None, None);
                Vec::new()
            }
            ListAction::PullRequest => self.on_pr_chosen(&id),
            ListAction::Issue => self.on_issue_chosen(&id),
            ListAction::CherryPickTarget { sha } => self.cherry_pick_onto(sha, id),
            ListAction::Theme => {
                self.on_theme_selected(&id);
                Vec::new()
            }
            ListAction::CiCheck => self.open_ci_check(&id),
        }
    }

    // ----- job results -----

    /// Invalidates `path` (and the selection) and rescans.
    fn refresh_after(&mut self, path: Option<&str>) -> Vec<Cmd> {
        if let Some(p) = path {
            self.caches.invalidate_details(p);
        }
        self.refresh_selected(true)
    }

    pub(crate) fn on_job_done(&mut self, job: GitJob, result: Result<JobOutput, TaskError>) -> Vec<Cmd> {
        self.end_loading();
        let output = match result {
            Ok(output) => output,
            Err(e) => return self.on_job_failed(&job, &e),
        };
        info!(job = job.name(), "job finished");
        match (job, output) {
            (GitJob::CommitShow { path, .. }, JobOutput::Commit(meta, diff)) => {
                self.screens
                    .push(Screen::Commit(CommitScreen::new(*meta, &diff, &path)));
                Vec::new()
            }
            (GitJob::Create(req), JobOutput::Created(path)) => {
                self.flash = Some(format!("Created {}", req.branch));
                self.after_create(path, &req.branch, req.note)
            }
            (GitJob::CreateFromPr { pr, branch }, JobOutput::Created(path)) => {
                self.flash = Some(format!("Created {branch} from PR #{}", pr.number));
                let seed = NoteSeed::from_pr(&pr);
                self.pending_pr = Some((path.clone(), *pr));
                self.after_create(path, &branch, Some(seed))
            }
            (GitJob::Delete { path, branch, .. }, _) => {
                let mut cmds = self.forget_worktree(&path);
                cmds.extend(self.reload_worktrees());
                if !branch.is_empty() && branch != self.main_branch && branch != "(detached)" {
                    let confirm = ConfirmScreen::new(
                        "Delete branch?",
                        format!("Worktree removed. Delete branch {branch} too?"),
                        Msg::RunJob(GitJob::DeleteBranch { branch }),
                    );
                    self.screens.push(Screen::Confirm(confirm));
                }
                cmds
            }
            (GitJob::DeleteBranch { branch }, _) => {
                self.flash = Some(format!("Deleted branch {branch}"));
                Vec::new()
            }
            (GitJob::Absorb { path, branch }, _) => {
                self.flash = Some(format!("Absorbed {branch} into {}", self.main_branch));
                let main = self.main_path.clone();
                let mut cmds = self.forget_worktree(&path);
                self.caches.invalidate_details(&main);
                cmds.extend(self.reload_worktrees());
                cmds
            }
            (GitJob::Prune { targets }, output) => {
                let failures = match output {
                    JobOutput::Pruned(failures) => failures,
                    _ => Vec::new(),
                };
                let mut cmds = Vec::new();
                for (path, _) in &targets {
                    if !failures.iter().any(|f| f.starts_with(path.as_str())) {
                        cmds.extend(self.forget_worktree(path));
                    }
                }
                cmds.extend(self.reload_worktrees());
                if failures.is_empty() {
                    self.flash = Some(format!("Pruned {} worktrees", targets.len()));
                } else {
                    self.show_info(format!(
                        "Some worktrees could not be removed:\n{}",
                        failures.join("\n")
                    ));
                }
                cmds
            }
            (
                GitJob::Rename {
                    path,
                    new_path,
                    new_branch,
                    ..
                },
                _,
            ) => {
                if new_path != path {
                    self.registry.rename_path(&path, &new_path);
                }
                if let Some(b) = &new_branch {
                    self.registry.rename_branch(&new_path, b);
                }
                let mut cmds = Vec::new();
                if self.notes.migrate(&path, &new_path) {
                    cmds.push(Cmd::SaveNotes(self.notes.clone()));
                }
                self.pending_select = Some(new_path);
                cmds.push(Cmd::SaveAccess(self.registry.access().clone()));
                cmds.extend(self.reload_worktrees());
                cmds
            }
            (GitJob::CherryPick { sha, target }, _) => {
                let short = sha.get(..7).unwrap_or(&sha);
                self.flash = Some(format!("Cherry-picked {short}"));
                self.refresh_after(Some(&target))
            }
            (GitJob::FetchAll, _) => {
                self.flash = Some("Fetched remotes".to_owned());
                self.refresh_after(None)
            }
            (job, JobOutput::Text(text)) if !text.trim().is_empty() => {
                self.flash = Some(text.lines().last().unwrap_or_default().trim().to_owned());
                self.refresh_after(job.affected_path())
            }
            (job, _) => {
                if matches!(job, GitJob::Push { .. } | GitJob::Sync { .. } | GitJob::UpdateFromBase { .. }) {
                    self.flash = Some(format!("{} done", job.name()));
                }
                self.refresh_after(job.affected_path())
            }
        }
    }

    fn on_job_failed(&mut self, job: &GitJob, error: &TaskError) -> Vec<Cmd> {
        if matches!(job, GitJob::Create(_) | GitJob::CreateFromPr { .. }) {
            self.pending_select = None;
            self.pending_pr = None;
        }
        if error.cancelled {
            debug!(job = job.name(), "job cancelled");
            return Vec::new();
        }
        if matches!(job, GitJob::CommitShow { .. }) {
            self.show_info(format!("Could not show commit: {error}"));
            return Vec::new();
        }
        self.show_info(format!("{} failed: {error}", job.name()));
        match job.affected_path() {
            Some(path) => {
                self.caches.invalidate_details(path);
                self.refresh_selected(false)
            }
            None => Vec::new(),
        }
    }

    /// Drops the note of a removed worktree.
    fn forget_worktree(&mut self, path: &str) -> Vec<Cmd> {
        self.caches.invalidate_details(path);
        if self.notes.delete(path) {
            vec![Cmd::SaveNotes(self.notes.clone())]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::PrState;

    fn wt(branch: &str) -> WorktreeInfo {
        WorktreeInfo::new(format!("/w/{branch}"), branch, false)
    }

    fn pr(state: PrState) -> PrInfo {
        PrInfo {
            number: 7,
            state,
            title: "Fix".to_owned(),
            body: String::new(),
            url: String::new(),
            branch: "feat".to_owned(),
            base_branch: "main".to_owned(),
            author: String::new(),
            author_name: String::new(),
            author_is_bot: false,
            is_draft: false,
            ci_status: String::new(),
        }
    }

    #[test]
    fn push_refuses_dirty_tree() {
        let mut w = wt("feat");
        w.set_status_counts(0, 1, 0);
        let err = push_plan(&w).unwrap_err();
        assert!(err.contains("Cannot push"));
    }

    #[test]
    fn push_needs_upstream_or_matching_branch() {
        let mut w = wt("feat");
        assert_eq!(push_plan(&w), Ok(UpstreamPlan::NeedsUpstream));
        w.has_upstream = true;
        w.upstream_branch = "origin/feat".to_owned();
        assert_eq!(
            push_plan(&w),
            Ok(UpstreamPlan::Tracked {
                remote: "origin".to_owned(),
                branch: "feat".to_owned()
            })
        );
        w.upstream_branch = "origin/other".to_owned();
        assert!(push_plan(&w).unwrap_err().contains("different branch"));
    }

    #[test]
    fn sync_rejects_upstream_of_another_branch() {
        let mut w = wt("feature");
        w.has_upstream = true;
        w.upstream_branch = "origin/other".to_owned();
        let err = sync_plan(&w).unwrap_err();
        assert!(err.contains("Cannot sync"));
        assert!(err.contains("different branch"));

        w.upstream_branch = "origin/feature".to_owned();
        assert_eq!(
            sync_plan(&w),
            Ok(UpstreamPlan::Tracked {
                remote: "origin".to_owned(),
                branch: "feature".to_owned()
            })
        );
        w.has_upstream = false;
        assert_eq!(sync_plan(&w), Ok(UpstreamPlan::NeedsUpstream));
    }

    #[test]
    fn upstream_prompt_must_name_current_branch() {
        assert_eq!(
            parse_upstream_input("origin/feat/x", "feat/x"),
            Ok(("origin".to_owned(), "feat/x".to_owned()))
        );
        assert!(parse_upstream_input("origin/main", "feat").is_err());
        assert!(parse_upstream_input("origin", "feat").is_err());
    }

    #[test]
    fn absorb_rejects_main_and_dirty_main() {
        let mut main = WorktreeInfo::new("/repo", "main", true);
        let feat = wt("feat");
        assert!(absorb_check(&main, Some(&main)).is_err());
        assert!(absorb_check(&feat, Some(&main)).is_ok());
        main.set_status_counts(1, 0, 0);
        assert!(absorb_check(&feat, Some(&main)).unwrap_err().contains("main worktree"));
    }

    #[test]
    fn prune_lists_merged_and_closed_only() {
        let mut merged = wt("a");
        merged.pr = Some(pr(PrState::Merged));
        let mut closed = wt("b");
        closed.pr = Some(pr(PrState::Closed));
        let mut open = wt("c");
        open.pr = Some(pr(PrState::Open));
        let mut main = WorktreeInfo::new("/repo", "main", true);
        main.pr = Some(pr(PrState::Merged));
        let ids: Vec<String> = prune_candidates(&[merged, closed, open, main])
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec!["/w/a".to_owned(), "/w/b".to_owned()]);
    }

    #[test]
    fn palette_recent_orders_by_time() {
        let history = vec![
            PaletteUsage {
                id: "a".to_owned(),
                timestamp: 1,
                count: 9,
            },
            PaletteUsage {
                id: "b".to_owned(),
                timestamp: 5,
                count: 1,
            },
        ];
        assert_eq!(palette_recent(&history, true, 1), vec!["b".to_owned()]);
        assert!(palette_recent(&history, false, 5).is_empty());
    }

    #[test]
    fn every_palette_entry_maps_to_an_action() {
        for (id, ..) in PALETTE {
            assert!(Action::from_id(id).is_some(), "{id}");
        }
        assert_eq!(Action::from_id("custom:x"), Some(Action::Custom("x".to_owned())));
    }

    #[test]
    fn log_filter_matches_sha_prefix_or_message() {
        assert!(commit_matches("abc123", "Fix bug", "abc"));
        assert!(commit_matches("abc123", "Fix bug", "BUG"));
        assert!(!commit_matches("abc123", "Fix bug", "123"));
    }

    mod flows {
        use super::*;
        use crate::error::LazywtError;
        use crate::tui::model::tests::{four, info_text, model_with};

        fn has_git(cmds: &[Cmd]) -> bool {
            cmds.iter().any(|c| matches!(c, Cmd::Git(_)))
        }

        #[test]
        fn push_on_dirty_worktree_only_informs() {
            let mut m = model_with(four());
            m.registry.select_path("/w/alpha");
            m.registry.update("/w/alpha", |w| w.set_status_counts(0, 1, 0));
            let cmds = m.perform(Action::Push);
            assert!(!has_git(&cmds));
            assert!(info_text(&m).is_some_and(|t| t.contains("Cannot push")));
        }

        #[test]
        fn checked_out_pr_selects_existing_worktree() {
            let mut m = model_with(four());
            let mut p = pr(PrState::Open);
            p.branch = "beta".to_owned();
            m.update(Msg::OpenPrsLoaded(Ok(vec![p])));
            let cmds = m.update(Msg::ListSelected {
                action: ListAction::PullRequest,
                id: "7".to_owned(),
            });
            assert!(!has_git(&cmds));
            assert_eq!(m.selected_path().as_deref(), Some("/w/beta"));
            assert!(info_text(&m).is_some_and(|t| t.contains("already checked out")));
        }

        #[test]
        fn new_pr_creates_worktree_from_template() {
            let mut m = model_with(four());
            m.update(Msg::OpenPrsLoaded(Ok(vec![pr(PrState::Open)])));
            let cmds = m.update(Msg::ListSelected {
                action: ListAction::PullRequest,
                id: "7".to_owned(),
            });
            match cmds.as_slice() {
                [Cmd::Git(GitJob::CreateFromPr { branch, pr })] => {
                    assert_eq!(branch, "pr-7-fix");
                    assert_eq!(pr.number, 7);
                }
                other => panic!("unexpected {other:?}"),
            }
        }

        #[test]
        fn session_command_with_new_tab_opens_a_tab() {
            let mut m = model_with(four());
            m.registry.select_path("/w/alpha");
            m.cfg.custom_commands.insert(
                "t".to_owned(),
                crate::config::CustomCommand {
                    new_tab: true,
                    tmux: Some(crate::config::SessionCommand::default()),
                    ..crate::config::CustomCommand::default()
                },
            );
            let cmds = m.perform(Action::Custom("t".to_owned()));
            assert!(matches!(
                cmds.as_slice(),
                [Cmd::SessionTab { kind: SessionKind::Tmux, path, .. }] if path == "/w/alpha"
            ));
        }

        #[test]
        fn main_worktree_cannot_be_deleted() {
            let mut m = model_with(four());
            m.registry.select_path("/w/main");
            m.perform(Action::Delete);
            assert!(info_text(&m).is_some_and(|t| t.contains("main worktree")));
        }

        #[test]
        fn delete_without_terminate_commands_runs_job() {
            let mut m = model_with(four());
            let cmds = m.update(Msg::ConfirmDelete {
                path: "/w/beta".to_owned(),
                branch: "beta".to_owned(),
                force: false,
            });
            assert!(matches!(
                cmds.as_slice(),
                [Cmd::Git(GitJob::Delete { path, force: false, .. })] if path == "/w/beta"
            ));
        }

        #[test]
        fn terminate_commands_run_before_delete() {
            let mut m = model_with(four());
            m.cfg.terminate_commands = vec!["make clean".to_owned()];
            let cmds = m.update(Msg::ConfirmDelete {
                path: "/w/beta".to_owned(),
                branch: "beta".to_owned(),
                force: true,
            });
            match cmds.as_slice() {
                [Cmd::RunCommands { pending, force: false }] => {
                    assert_eq!(pending.commands, vec!["make clean".to_owned()]);
                    assert!(pending.trust_path.is_none());
                    assert!(matches!(
                        pending.after.as_deref(),
                        Some(Msg::RunJob(GitJob::Delete { force: true, .. }))
                    ));
                }
                other => panic!("unexpected {other:?}"),
            }
        }

        #[test]
        fn successful_delete_offers_branch_removal() {
            let mut m = model_with(four());
            m.update(Msg::JobDone {
                job: GitJob::Delete {
                    path: "/w/beta".to_owned(),
                    branch: "beta".to_owned(),
                    force: false,
                },
                result: Ok(JobOutput::Done),
            });
            match m.screens.top() {
                Some(Screen::Confirm(c)) => assert!(c.message().contains("Delete branch beta")),
                other => panic!("unexpected {other:?}"),
            }
        }

        #[test]
        fn failed_job_reports_name_and_error() {
            let mut m = model_with(four());
            m.update(Msg::JobDone {
                job: GitJob::FetchAll,
                result: Err(TaskError::new("network down")),
            });
            assert!(info_text(&m).is_some_and(|t| t.contains("failed: network down")));
        }

        #[test]
        fn cancelled_job_is_silent() {
            let mut m = model_with(four());
            let cmds = m.update(Msg::JobDone {
                job: GitJob::FetchAll,
                result: Err(TaskError::from(&LazywtError::Cancelled)),
            });
            assert!(cmds.is_empty());
            assert!(info_text(&m).is_none());
        }

        #[test]
        fn failed_job_shows_install_hint() {
            let mut m = model_with(four());
            m.update(Msg::JobDone {
                job: GitJob::FetchAll,
                result: Err(TaskError::from(&LazywtError::GitUnavailable {
                    tool: "git".to_owned(),
                })),
            });
            let text = info_text(&m).unwrap_or_default();
            assert!(text.contains("Fetch failed: git is required"));
            assert!(text.contains("Install git"));
        }

        #[test]
        fn sync_with_pr_asks_about_base() {
            let mut m = model_with(four());
            m.registry.select_path("/w/alpha");
            m.registry.update("/w/alpha", |w| {
                w.has_upstream = true;
                w.upstream_branch = "origin/alpha".to_owned();
                let mut p = pr(PrState::Open);
                p.branch = "alpha".to_owned();
                w.pr = Some(p);
            });
            let cmds = m.perform(Action::Sync);
            assert!(cmds.is_empty());
            assert!(matches!(m.screens.top(), Some(Screen::Confirm(_))));
        }

        #[test]
        fn sync_without_upstream_prompts_then_pushes_with_upstream() {
            let mut m = model_with(four());
            m.registry.select_path("/w/alpha");
            assert!(m.perform(Action::Sync).is_empty());
            let action = match m.screens.top() {
                Some(Screen::Input(input)) => {
                    assert_eq!(input.text(), "origin/alpha");
                    input.action().clone()
                }
                other => panic!("unexpected {other:?}"),
            };
            assert!(matches!(action, InputAction::UpstreamRef { sync: true, .. }));

            let cmds = m.update(Msg::InputSubmitted {
                action,
                value: "origin/alpha".to_owned(),
                checked: false,
            });
            assert!(cmds.iter().any(|c| matches!(
                c,
                Cmd::Git(GitJob::Sync { remote, branch, set_upstream: true, .. })
                    if remote == "origin" && branch == "alpha"
            )));
        }

        #[test]
        fn sync_refuses_upstream_of_another_branch() {
            let mut m = model_with(four());
            m.registry.select_path("/w/alpha");
            m.registry.update("/w/alpha", |w| {
                w.has_upstream = true;
                w.upstream_branch = "origin/other".to_owned();
            });
            assert!(m.perform(Action::Sync).is_empty());
            assert!(info_text(&m).is_some_and(|t| t.contains("different branch")));
        }

        #[test]
        fn created_branch_is_refused_when_checked_out() {
            let mut m = model_with(four());
            let cmds = m.update(Msg::InputSubmitted {
                action: InputAction::CreateBranch {
                    base: None,
                    source_path: None,
                    note: None,
                },
                value: "gamma".to_owned(),
                checked: false,
            });
            assert!(!has_git(&cmds));
            assert!(info_text(&m).is_some_and(|t| t.contains("already checked out")));
        }

        #[test]
        fn include_changes_needs_a_source() {
            let mut m = model_with(four());
            let cmds = m.update(Msg::InputSubmitted {
                action: InputAction::CreateBranch {
                    base: Some("main".to_owned()),
                    source_path: None,
                    note: None,
                },
                value: "delta".to_owned(),
                checked: true,
            });
            assert!(matches!(
                cmds.as_slice(),
                [Cmd::Git(GitJob::Create(req))] if !req.include_changes && req.branch == "delta"
            ));
        }
    }

    #[test]
    fn run_links_yield_run_and_job() {
        assert_eq!(
            parse_run_link("https://github.com/a/b/actions/runs/42/job/99"),
            Some(("42".to_owned(), Some("99".to_owned())))
        );
        assert_eq!(
            parse_run_link("https://github.com/a/b/actions/runs/42"),
            Some(("42".to_owned(), None))
        );
        assert_eq!(parse_run_link("https://ci.example.com/build/1"), None);
    }

    #[test]
    fn worktree_diff_caps_untracked_files() {
        let cfg = Config {
            max_untracked_diffs: 3,
            max_diff_chars: 1000,
            ..Config::default()
        };
        let script = worktree_diff_script(&cfg);
        assert!(script.starts_with("{ git diff HEAD;"));
        assert!(script.contains("head -n 3"));
        assert!(script.contains("head -c 1000"));
    }
}
