#![forbid(unsafe_code)]

//! Application state and the message dispatcher.
//!
//! Everything mutable lives in [`Model`] and is touched only from the event
//! loop. Screens, background tasks and the watcher talk to it through [`Msg`];
//! `update` answers with [`Cmd`] values that the executor turns into work.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Instant;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent};
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::config::{Config, LayoutMode, RepoConfig, SessionCommand};
use crate::core::cache::{DetailsEntry, SharedCaches, begin_pr_fetch, finish_pr_fetch};
use crate::core::git::parse_log;
use crate::core::models::{CiCheck, CommitLogEntry, ForgeHost, IssueInfo, PrInfo, WorktreeInfo};
use crate::core::notes::NotesStore;
use crate::core::persistence::{MAX_COMMAND_HISTORY, PaletteUsage};
use crate::core::registry::WorktreeRegistry;
use crate::core::status_tree::{StatusTree, parse_status_v2, status_counts};
use crate::core::tasks::{append_task, build_taskboard, toggle_task};
use crate::error::TaskError;
use crate::tui::keys;
use crate::tui::layout::{LayoutDims, LayoutInput, Pane, inner_size};
use crate::tui::markdown::ScreenLink;
use crate::tui::mouse;
use crate::tui::ops::{
    Action, GitJob, JobOutput, NoteSeed, PendingCommands, commit_matches, palette_items,
    palette_recent,
};
use crate::tui::screens::{
    ChecklistAction, HelpScreen, InfoScreen, InputAction, InputScreen, ListAction, ListItem,
    ListScreen, LoadingScreen, NoteEditorScreen, PaletteScreen, Screen, ScreenKind, ScreenStack,
    TaskboardScreen, TrustChoice, TrustScreen,
};
use crate::tui::text_input::TextInput;
use crate::tui::theme::{IconProvider, StyleCache, available_themes};

/// Subject a generated branch name is for.
#[derive(Debug, Clone)]
pub enum NamingFor {
    Pr(Box<PrInfo>),
    Issue(IssueInfo),
    /// Moving uncommitted changes out of `source_path`.
    Changes { source_path: String },
    /// Output of a custom create menu command.
    Custom,
}

#[derive(Debug, Clone)]
pub enum Msg {
    Key(KeyEvent),
    Mouse(MouseEvent),
    Resize(u16, u16),
    SpinnerTick,
    Quit,

    WorktreesLoaded(Result<Vec<WorktreeInfo>, String>),
    MainBranchLoaded(String),
    DetailsLoaded {
        path: String,
        result: Result<DetailsEntry, String>,
    },
    PrsLoaded(Result<HashMap<String, PrInfo>, String>),
    PrForPathLoaded {
        path: String,
        result: Result<Option<PrInfo>, String>,
    },
    CiLoaded {
        branch: String,
        result: Result<Vec<CiCheck>, String>,
    },
    OpenPrsLoaded(Result<Vec<PrInfo>, String>),
    IssuesLoaded(Result<Vec<IssueInfo>, String>),
    BranchesLoaded(Result<Vec<String>, String>),
    BranchNameGenerated {
        naming: NamingFor,
        result: Result<Option<String>, String>,
    },
    NoteGenerated {
        path: String,
        result: Result<Option<String>, String>,
    },
    JobDone {
        job: GitJob,
        result: Result<JobOutput, TaskError>,
    },
    TrustPrompt(PendingCommands),
    /// Commands refused by the trust policy; the enclosing operation stops.
    CommandsSkipped(String),
    CommandsDone {
        label: String,
        result: Result<(), String>,
        after: Option<Box<Msg>>,
    },
    /// A suspended-terminal program returned; `Some` carries a message to show.
    ForegroundDone(Result<Option<String>, String>),
    TabLaunched(Result<String, String>),
    /// Debounced `.git` change; `worktrees_changed` when one was added or removed.
    GitDirChanged {
        worktrees_changed: bool,
    },
    AutoRefreshTick,
    CiRefreshTick,
    Error(String),
    Info(String),

    InputSubmitted {
        action: InputAction,
        value: String,
        checked: bool,
    },
    InputCheckboxToggled {
        action: InputAction,
        checked: bool,
    },
    ListSelected {
        action: ListAction,
        id: String,
    },
    ChecklistSubmitted {
        action: ChecklistAction,
        ids: Vec<String>,
    },
    ShowCommitDiff {
        path: String,
        sha: String,
    },
    CopyText(String),
    TaskToggle {
        path: String,
        line: usize,
        is_keyword: bool,
    },
    OpenAddTask {
        path: String,
    },
    TrustChoice {
        pending: Box<PendingCommands>,
        choice: TrustChoice,
    },
    PaletteSelected(String),
    NoteSaved {
        path: String,
        text: String,
    },
    RunJob(GitJob),
    ConfirmDelete {
        path: String,
        branch: String,
        force: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Tmux,
    Zellij,
}

/// Programs that take over the terminal until they exit.
#[derive(Debug, Clone)]
pub enum Foreground {
    /// `bash -c command`; `pause` waits for Enter before returning.
    Shell {
        cwd: String,
        command: String,
        env: BTreeMap<String, String>,
        pause: bool,
    },
    Session {
        kind: SessionKind,
        session: SessionCommand,
        path: String,
        env: BTreeMap<String, String>,
    },
}

/// Work requested by `update`, carried out by the executor.
#[derive(Debug, Clone)]
pub enum Cmd {
    LoadWorktrees,
    LoadMainBranch,
    FetchDetails {
        path: String,
        force: bool,
    },
    FetchPrs,
    FetchPrForPath {
        path: String,
    },
    FetchCi {
        branch: String,
        path: String,
        force: bool,
    },
    FetchOpenPrs,
    FetchIssues,
    ListBranches,
    Git(GitJob),
    BranchNameScript {
        naming: NamingFor,
        cwd: String,
    },
    CustomMenuScript {
        command: String,
        cwd: String,
    },
    NoteScript {
        path: String,
        seed: NoteSeed,
    },
    /// Runs through the trust gate unless `force`.
    RunCommands {
        pending: PendingCommands,
        force: bool,
    },
    TrustAndRun(PendingCommands),
    Foreground(Foreground),
    NewTab {
        command: String,
        cwd: String,
        title: String,
        env: BTreeMap<String, String>,
    },
    /// Multiplexer session opened in a new terminal tab.
    SessionTab {
        kind: SessionKind,
        session: SessionCommand,
        path: String,
        title: String,
        env: BTreeMap<String, String>,
    },
    OpenUrl(String),
    Copy(String),
    SaveNotes(NotesStore),
    SaveAccess(HashMap<String, i64>),
    SaveCache(Vec<WorktreeInfo>),
    SaveLastSelected(String),
    RecordPaletteUse(String),
    PushHistory(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Filter,
    Search,
}

/// Which list a filter or search applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterTarget {
    Worktrees,
    Status,
    Log,
}

impl FilterTarget {
    #[must_use]
    pub fn for_pane(pane: Pane) -> Self {
        match pane {
            Pane::GitStatus => Self::Status,
            Pane::Commit => Self::Log,
            Pane::Worktrees | Pane::Info | Pane::Notes => Self::Worktrees,
        }
    }
}

/// The one-line filter/search prompt above the panes.
#[derive(Debug)]
pub struct InputLine {
    pub mode: InputMode,
    pub target: FilterTarget,
    pub text: TextInput,
}

/// Scroll offsets the renderer keeps in step with the cursors.
#[derive(Debug, Clone, Copy, Default)]
pub struct ViewState {
    pub worktree_offset: usize,
    pub status_offset: usize,
    pub log_offset: usize,
    pub info_scroll: usize,
    pub notes_scroll: usize,
}

/// Everything loaded before the first frame.
#[derive(Debug)]
pub struct ModelInit {
    pub cfg: Config,
    pub repo_key: String,
    pub main_path: String,
    pub host: ForgeHost,
    pub access: HashMap<String, i64>,
    pub cached: Option<Vec<WorktreeInfo>>,
    pub last_selected: Option<String>,
    pub palette_history: Vec<PaletteUsage>,
    pub command_history: Vec<String>,
    pub notes: NotesStore,
    pub repo_config: Option<(RepoConfig, PathBuf)>,
    pub caches: SharedCaches,
}

#[derive(Debug)]
pub struct Model {
    pub cfg: Config,
    pub repo_key: String,
    pub main_path: String,
    pub host: ForgeHost,
    pub main_branch: String,
    pub registry: WorktreeRegistry,
    pub caches: SharedCaches,
    pub status: StatusTree,
    pub log: Vec<CommitLogEntry>,
    pub log_cursor: usize,
    pub log_filter: String,
    /// Worktree whose status and log are on screen.
    pub details_path: Option<String>,
    pub notes: NotesStore,
    pub screens: ScreenStack,
    pub focus: Pane,
    pub zoom: Option<Pane>,
    pub layout: LayoutMode,
    pub input: Option<InputLine>,
    pub search_query: String,
    pub ci_check_index: Option<usize>,
    /// Footer spinner text for background fetches.
    pub busy: Option<String>,
    pub spinner: usize,
    /// One-shot footer message, cleared by the next key.
    pub flash: Option<String>,
    pub styles: StyleCache,
    pub icons: IconProvider,
    pub repo_config: Option<(RepoConfig, PathBuf)>,
    pub palette_history: Vec<PaletteUsage>,
    pub command_history: Vec<String>,
    pub open_prs: Vec<PrInfo>,
    pub issues: Vec<IssueInfo>,
    pub pending_select: Option<String>,
    /// PR to attach to a worktree created from it once the reload lands.
    pub pending_pr: Option<(String, PrInfo)>,
    pub prune_after_prs: bool,
    pub prs_loaded: bool,
    loading_worktrees: bool,
    reload_queued: bool,
    initial_select: Option<String>,
    pub selected_on_exit: Option<String>,
    pub should_quit: bool,
    pub width: u16,
    pub height: u16,
    pub dims: LayoutDims,
    /// Note hyperlinks visible in the last frame.
    pub links: Vec<ScreenLink>,
    pub view: ViewState,
}

pub(crate) fn now_ts() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

impl Model {
    #[must_use]
    pub fn new(init: ModelInit) -> Self {
        let ModelInit {
            cfg,
            repo_key,
            main_path,
            host,
            access,
            cached,
            last_selected,
            palette_history,
            command_history,
            notes,
            repo_config,
            caches,
        } = init;

        let theme = if cfg.theme.is_empty() {
            crate::tui::theme::detect_default(std::env::var("COLORFGBG").ok().as_deref()).to_owned()
        } else {
            cfg.theme.clone()
        };
        let styles = StyleCache::new(&theme, &cfg.custom_themes);
        let icons = IconProvider::new(cfg.icon_set);
        let mut registry = WorktreeRegistry::new(cfg.effective_sort_mode(), access);
        if let Some(list) = cached {
            registry.set_worktrees(list, None, now_ts());
            if let Some(path) = &last_selected {
                registry.select_path(path);
            }
        }
        let input = cfg.search_auto_select.then(|| InputLine {
            mode: InputMode::Filter,
            target: FilterTarget::Worktrees,
            text: TextInput::default(),
        });

        Self {
            layout: cfg.layout,
            cfg,
            repo_key,
            main_path,
            host,
            main_branch: "main".to_owned(),
            registry,
            caches,
            status: StatusTree::default(),
            log: Vec::new(),
            log_cursor: 0,
            log_filter: String::new(),
            details_path: None,
            notes,
            screens: ScreenStack::default(),
            focus: Pane::Worktrees,
            zoom: None,
            input,
            search_query: String::new(),
            ci_check_index: None,
            busy: None,
            spinner: 0,
            flash: None,
            styles,
            icons,
            repo_config,
            palette_history,
            command_history,
            open_prs: Vec::new(),
            issues: Vec::new(),
            pending_select: None,
            pending_pr: None,
            prune_after_prs: false,
            prs_loaded: false,
            loading_worktrees: false,
            reload_queued: false,
            initial_select: last_selected,
            selected_on_exit: None,
            should_quit: false,
            width: 0,
            height: 0,
            dims: LayoutDims::default(),
            links: Vec::new(),
            view: ViewState::default(),
        }
    }

    /// Commands for the first frame: scan, main branch and, optionally, PRs.
    pub fn init(&mut self) -> Vec<Cmd> {
        let mut cmds = vec![Cmd::LoadMainBranch];
        cmds.extend(self.reload_worktrees());
        cmds.extend(self.on_selection_changed());
        if self.cfg.auto_fetch_prs {
            cmds.extend(self.start_pr_fetch());
        }
        cmds
    }

    pub fn update(&mut self, msg: Msg) -> Vec<Cmd> {
        match msg {
            Msg::Key(key) => {
                self.flash = None;
                self.handle_key(key)
            }
            Msg::Mouse(ev) => mouse::handle(self, ev),
            Msg::Resize(w, h) => {
                self.width = w;
                self.height = h;
                Vec::new()
            }
            Msg::SpinnerTick => {
                self.spinner = self.spinner.wrapping_add(1);
                if let Some(Screen::Loading(s)) = self.screens.top_mut() {
                    s.tick();
                }
                Vec::new()
            }
            Msg::Quit => self.quit(),

            Msg::WorktreesLoaded(result) => self.on_worktrees_loaded(result),
            Msg::MainBranchLoaded(branch) => {
                debug!(%branch, "main branch");
                self.main_branch = branch;
                Vec::new()
            }
            Msg::DetailsLoaded { path, result } => self.on_details_loaded(&path, result),
            Msg::PrsLoaded(result) => self.on_prs_loaded(result),
            Msg::PrForPathLoaded { path, result } => {
                self.registry.update(&path, |w| finish_pr_fetch(w, result));
                if self.selected_path().as_deref() == Some(path.as_str()) {
                    self.ci_cmd(false).into_iter().collect()
                } else {
                    Vec::new()
                }
            }
            Msg::CiLoaded { branch, result } => {
                if let Err(e) = result {
                    debug!(%branch, error = %e, "ci fetch failed");
                }
                let len = self.current_ci_checks().len();
                self.ci_check_index = self.ci_check_index.filter(|&i| i < len);
                Vec::new()
            }
            Msg::OpenPrsLoaded(result) => self.on_open_prs_loaded(result),
            Msg::IssuesLoaded(result) => self.on_issues_loaded(result),
            Msg::BranchesLoaded(result) => self.on_branches_loaded(result),
            Msg::BranchNameGenerated { naming, result } => self.on_branch_name(naming, result),
            Msg::NoteGenerated { path, result } => match result {
                Ok(Some(text)) => {
                    self.notes.set(&path, &text, now_ts());
                    self.fix_focus();
                    vec![Cmd::SaveNotes(self.notes.clone())]
                }
                Ok(None) => Vec::new(),
                Err(e) => {
                    self.show_info(format!("Worktree note script error: {e}"));
                    Vec::new()
                }
            },
            Msg::JobDone { job, result } => self.on_job_done(job, result),
            Msg::TrustPrompt(pending) => {
                self.end_loading();
                self.screens.push(Screen::Trust(TrustScreen::new(pending)));
                Vec::new()
            }
            Msg::CommandsSkipped(label) => {
                self.end_loading();
                debug!(%label, "commands skipped by trust policy");
                Vec::new()
            }
            Msg::CommandsDone {
                label,
                result,
                after,
            } => {
                self.end_loading();
                match (result, after) {
                    (Ok(()), Some(next)) => self.update(*next),
                    (Ok(()), None) => Vec::new(),
                    (Err(e), _) => {
                        self.show_info(format!("{label} failed: {e}"));
                        Vec::new()
                    }
                }
            }
            Msg::ForegroundDone(result) => {
                match result {
                    Ok(Some(message)) => self.show_info(message),
                    Ok(None) => {}
                    Err(e) => self.show_info(e),
                }
                self.refresh_selected(true)
            }
            Msg::TabLaunched(result) => {
                match result {
                    Ok(message) => self.show_info(message),
                    Err(e) => self.show_info(format!("Failed to open tab: {e}")),
                }
                Vec::new()
            }
            Msg::GitDirChanged { worktrees_changed } => {
                debug!(worktrees_changed, "git dir changed");
                let mut cmds = self.refresh_selected(true);
                if worktrees_changed {
                    cmds.extend(self.reload_worktrees());
                }
                cmds
            }
            Msg::AutoRefreshTick => {
                if self.cfg.auto_refresh && self.screens.is_empty() {
                    self.refresh_selected(true)
                } else {
                    Vec::new()
                }
            }
            Msg::CiRefreshTick => {
                if self.cfg.ci_auto_refresh && self.host == ForgeHost::GitHub {
                    self.ci_cmd(true).into_iter().collect()
                } else {
                    Vec::new()
                }
            }
            Msg::Error(e) => {
                warn!(error = %e, "task error");
                self.show_info(e);
                Vec::new()
            }
            Msg::Info(message) => {
                self.show_info(message);
                Vec::new()
            }

            Msg::InputSubmitted {
                action,
                value,
                checked,
            } => self.on_input_submitted(action, value, checked),
            Msg::InputCheckboxToggled { action, checked } => self.on_checkbox_toggled(action, checked),
            Msg::ListSelected { action, id } => self.on_list_selected(action, id),
            Msg::ChecklistSubmitted { action, ids } => self.on_checklist_submitted(action, ids),
            Msg::ShowCommitDiff { path, sha } => self.commit_diff(&path, &sha),
            Msg::CopyText(text) => self.copy(text),
            Msg::TaskToggle {
                path,
                line,
                is_keyword,
            } => self.toggle_task(&path, line, is_keyword),
            Msg::OpenAddTask { path } => {
                self.screens.push(Screen::Input(InputScreen::new(
                    "Add task",
                    "Task",
                    InputAction::AddTask { path },
                )));
                Vec::new()
            }
            Msg::TrustChoice { pending, choice } => match choice {
                TrustChoice::Trust => vec![Cmd::TrustAndRun(*pending)],
                TrustChoice::RunOnce => vec![Cmd::RunCommands {
                    pending: *pending,
                    force: true,
                }],
                TrustChoice::Cancel => {
                    debug!(label = %pending.label, "commands not trusted");
                    Vec::new()
                }
            },
            Msg::PaletteSelected(id) => {
                self.note_palette_use(&id);
                let mut cmds = vec![Cmd::RecordPaletteUse(id.clone())];
                if let Some(action) = Action::from_id(&id) {
                    cmds.extend(self.perform(action));
                }
                cmds
            }
            Msg::NoteSaved { path, text } => {
                self.notes.set(&path, &text, now_ts());
                self.fix_focus();
                vec![Cmd::SaveNotes(self.notes.clone())]
            }
            Msg::RunJob(job) => self.run_job(job),
            Msg::ConfirmDelete { path, branch, force } => self.confirm_delete(path, branch, force),
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> Vec<Cmd> {
        if !self.screens.is_empty() {
            return match self.screens.handle_key(key) {
                Some(msg) => self.update(msg),
                None => Vec::new(),
            };
        }
        if self.input.is_some() {
            return self.handle_input_key(key);
        }
        match keys::resolve(&key, self.focus, &self.cfg.custom_commands) {
            Some(action) => self.perform(action),
            None => Vec::new(),
        }
    }

    fn handle_input_key(&mut self, key: KeyEvent) -> Vec<Cmd> {
        let Some(line) = self.input.as_mut() else {
            return Vec::new();
        };
        let (mode, target) = (line.mode, line.target);
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let alt = key.modifiers.contains(KeyModifiers::ALT);
        match key.code {
            KeyCode::Esc => {
                self.input = None;
                if mode == InputMode::Search {
                    self.search_query.clear();
                }
                Vec::new()
            }
            KeyCode::Enter => {
                self.input = None;
                if mode == InputMode::Filter
                    && target == FilterTarget::Worktrees
                    && self.cfg.search_auto_select
                {
                    return self.perform(Action::Activate);
                }
                Vec::new()
            }
            KeyCode::Down => self.move_target(target, 1),
            KeyCode::Up => self.move_target(target, -1),
            KeyCode::Char('j') if ctrl => self.move_target(target, 1),
            KeyCode::Char('k') if ctrl => self.move_target(target, -1),
            KeyCode::Char('n') if alt => self.filter_step(true),
            KeyCode::Char('p') if alt => self.filter_step(false),
            _ => {
                if !line.text.handle_key(key) {
                    return Vec::new();
                }
                let text = line.text.as_str().to_owned();
                match mode {
                    InputMode::Filter => self.apply_filter(target, &text),
                    InputMode::Search => {
                        self.search_query = text;
                        self.search_jump(target, true, true)
                    }
                }
            }
        }
    }

    /// Main-view actions; worktree operations live in `ops`.
    pub fn perform(&mut self, action: Action) -> Vec<Cmd> {
        match action {
            Action::Quit => self.quit(),
            Action::FocusPane(n) => self.focus_digit(n),
            Action::NextPane => self.cycle_pane(true),
            Action::PrevPane => self.cycle_pane(false),
            Action::PaneLeft => self.move_pane_horizontal(false),
            Action::PaneRight => self.move_pane_horizontal(true),
            Action::MoveDown => self.move_focused(1),
            Action::MoveUp => self.move_focused(-1),
            Action::HalfPageDown => {
                let half = self.half_page();
                self.move_focused(half)
            }
            Action::HalfPageUp => {
                let half = self.half_page();
                self.move_focused(-half)
            }
            Action::Bottom => self.move_focused(isize::MAX / 2),
            Action::Activate => self.activate(),
            Action::NextItemDiff | Action::PrevItemDiff => {
                let delta = if action == Action::NextItemDiff { 1 } else { -1 };
                let mut cmds = self.move_focused(delta);
                cmds.extend(self.perform_op(Action::Diff));
                cmds
            }
            Action::ToggleZoom => {
                self.zoom = if self.zoom.is_some() { None } else { Some(self.focus) };
                Vec::new()
            }
            Action::ToggleLayout => {
                self.layout = self.layout.toggled();
                Vec::new()
            }
            Action::CycleSort => {
                let mode = self.registry.cycle_sort();
                self.flash = Some(format!("Sort: {}", mode.label()));
                self.on_selection_changed()
            }
            Action::Annotate => self.open_note_editor(),
            Action::Taskboard => {
                let items = build_taskboard(self.registry.all(), &self.notes);
                let fallback = self.selected_path().unwrap_or_else(|| self.main_path.clone());
                self.screens
                    .push(Screen::Taskboard(TaskboardScreen::new(items, &fallback)));
                Vec::new()
            }
            Action::CopyPath => match self.contextual_copy_text() {
                Some(text) => self.copy(text),
                None => Vec::new(),
            },
            Action::CopyBranch => match self.registry.selected().map(|w| w.branch.clone()) {
                Some(branch) if !branch.is_empty() => self.copy(branch),
                _ => Vec::new(),
            },
            Action::Refresh => {
                self.caches.clear_details();
                let mut cmds = self.refresh_selected(true);
                if self.forge_enabled() {
                    cmds.extend(self.start_pr_fetch());
                }
                cmds
            }
            Action::FetchPrs => {
                if !self.forge_enabled() {
                    self.show_info("PR data is unavailable: no GitHub or GitLab remote, or PRs are disabled.");
                    return Vec::new();
                }
                self.start_pr_fetch()
            }
            Action::NextCiCheck | Action::PrevCiCheck => {
                self.step_ci_check(action == Action::NextCiCheck);
                Vec::new()
            }
            Action::ChooseCiCheck => self.choose_ci_check(),
            Action::Filter | Action::Search => {
                let target = FilterTarget::for_pane(self.focus);
                let (mode, initial) = if action == Action::Filter {
                    (InputMode::Filter, self.filter_query(target).to_owned())
                } else {
                    (InputMode::Search, String::new())
                };
                if self.focus == Pane::Info || self.focus == Pane::Notes {
                    self.focus = Pane::Worktrees;
                }
                self.input = Some(InputLine {
                    mode,
                    target,
                    text: TextInput::new(initial),
                });
                Vec::new()
            }
            Action::SearchNext | Action::SearchPrev => {
                let target = FilterTarget::for_pane(self.focus);
                self.search_jump(target, action == Action::SearchNext, false)
            }
            Action::FilterStepNext => self.filter_step(true),
            Action::FilterStepPrev => self.filter_step(false),
            Action::ClearFilter => {
                let target = FilterTarget::for_pane(self.focus);
                if self.filter_query(target).is_empty() {
                    self.search_query.clear();
                    return Vec::new();
                }
                self.apply_filter(target, "")
            }
            Action::Palette => {
                let items = palette_items(&self.cfg);
                let recent = palette_recent(
                    &self.palette_history,
                    self.cfg.palette_mru,
                    self.cfg.palette_mru_limit,
                );
                self.screens
                    .push(Screen::Palette(PaletteScreen::new(items, recent)));
                Vec::new()
            }
            Action::Help => {
                let custom = self
                    .cfg
                    .custom_commands
                    .iter()
                    .filter(|(_, c)| c.show_help)
                    .map(|(k, c)| (k.clone(), c.label().to_owned()))
                    .collect();
                self.screens.push(Screen::Help(HelpScreen::new(custom)));
                Vec::new()
            }
            Action::SelectTheme => {
                let items = available_themes(&self.cfg.custom_themes)
                    .into_iter()
                    .map(|name| ListItem::new(name.clone(), name, ""))
                    .collect();
                let mut list = ListScreen::new("Select theme", items, ListAction::Theme);
                list.select_id(self.styles.theme_name());
                self.screens.push(Screen::List(list));
                Vec::new()
            }
            other => self.perform_op(other),
        }
    }

    fn quit(&mut self) -> Vec<Cmd> {
        self.should_quit = true;
        let mut cmds = Vec::new();
        if let Some(path) = self.selected_path() {
            cmds.push(Cmd::SaveLastSelected(path));
        }
        cmds.push(Cmd::SaveAccess(self.registry.access().clone()));
        cmds
    }

    fn activate(&mut self) -> Vec<Cmd> {
        match self.focus {
            Pane::Worktrees => {
                let Some(path) = self.selected_path() else {
                    return Vec::new();
                };
                self.registry.record_access(&path, now_ts());
                self.selected_on_exit = Some(path);
                self.quit()
            }
            Pane::Info => {
                let checks = self.current_ci_checks();
                if let Some(check) = self.ci_check_index.and_then(|i| checks.get(i))
                    && !check.link.is_empty()
                {
                    return vec![Cmd::OpenUrl(check.link.clone())];
                }
                match self.registry.selected().and_then(|w| w.pr.as_ref()) {
                    Some(pr) if !pr.url.is_empty() => vec![Cmd::OpenUrl(pr.url.clone())],
                    _ => Vec::new(),
                }
            }
            Pane::GitStatus => {
                if self.status.toggle_collapse() {
                    return Vec::new();
                }
                self.perform_op(Action::Diff)
            }
            Pane::Commit => {
                let (Some(path), Some(sha)) = (
                    self.selected_path(),
                    self.selected_commit().map(|c| c.sha.clone()),
                ) else {
                    return Vec::new();
                };
                self.run_job(GitJob::CommitShow { path, sha })
            }
            Pane::Notes => self.open_note_editor(),
        }
    }

    // ----- selection and details -----

    #[must_use]
    pub fn selected_path(&self) -> Option<String> {
        self.registry.selected().map(|w| w.path.clone())
    }

    #[must_use]
    pub fn selected_commit(&self) -> Option<&CommitLogEntry> {
        self.visible_log().get(self.log_cursor).copied()
    }

    /// Log entries passing the log filter.
    #[must_use]
    pub fn visible_log(&self) -> Vec<&CommitLogEntry> {
        self.log
            .iter()
            .filter(|e| commit_matches(&e.sha, &e.message, &self.log_filter))
            .collect()
    }

    #[must_use]
    pub fn forge_enabled(&self) -> bool {
        !self.cfg.disable_pr && self.host != ForgeHost::None
    }

    #[must_use]
    pub fn current_ci_checks(&self) -> Vec<CiCheck> {
        self.registry
            .selected()
            .and_then(|w| self.caches.ci_any(&w.branch))
            .unwrap_or_default()
    }

    /// Called whenever the selected worktree may have changed.
    pub(crate) fn on_selection_changed(&mut self) -> Vec<Cmd> {
        let Some(path) = self.selected_path() else {
            self.details_path = None;
            self.status.set_files(Vec::new());
            self.log.clear();
            self.fix_focus();
            return Vec::new();
        };
        if self.details_path.as_deref() != Some(path.as_str()) {
            self.details_path = Some(path.clone());
            self.ci_check_index = None;
            self.view.info_scroll = 0;
            self.view.notes_scroll = 0;
            self.log_cursor = 0;
            match self.caches.details(&path, Instant::now()) {
                Some(entry) => self.apply_details(&path, &entry),
                None => {
                    self.status.set_files(Vec::new());
                    self.log.clear();
                }
            }
            self.fix_focus();
        }
        let mut cmds = vec![Cmd::FetchDetails { path, force: false }];
        cmds.extend(self.ci_cmd(false));
        cmds
    }

    pub(crate) fn ci_cmd(&self, force: bool) -> Option<Cmd> {
        if !self.forge_enabled() {
            return None;
        }
        let wt = self.registry.selected()?;
        if wt.pr.is_none() || wt.branch.is_empty() {
            return None;
        }
        if !force && self.caches.ci_fresh(&wt.branch, Instant::now()).is_some() {
            return None;
        }
        Some(Cmd::FetchCi {
            branch: wt.branch.clone(),
            path: wt.path.clone(),
            force,
        })
    }

    /// Re-reads the selected worktree and rescans the list.
    pub(crate) fn refresh_selected(&mut self, rescan: bool) -> Vec<Cmd> {
        let mut cmds = Vec::new();
        if rescan {
            cmds.extend(self.reload_worktrees());
        }
        if let Some(path) = self.selected_path() {
            self.caches.invalidate_details(&path);
            cmds.push(Cmd::FetchDetails { path, force: true });
        }
        cmds
    }

    /// At most one scan in flight; a second request is queued.
    pub(crate) fn reload_worktrees(&mut self) -> Vec<Cmd> {
        if self.loading_worktrees {
            self.reload_queued = true;
            return Vec::new();
        }
        self.loading_worktrees = true;
        vec![Cmd::LoadWorktrees]
    }

    fn on_worktrees_loaded(&mut self, result: Result<Vec<WorktreeInfo>, String>) -> Vec<Cmd> {
        self.loading_worktrees = false;
        let mut list = match result {
            Ok(list) => list,
            Err(e) => {
                self.pending_select = None;
                self.reload_queued = false;
                self.show_info(format!("Failed to load worktrees: {e}"));
                return Vec::new();
            }
        };

        for wt in &mut list {
            if let Some(old) = self.registry.find_by_path(&wt.path)
                && wt.pr.is_none()
                && old.branch == wt.branch
            {
                wt.pr.clone_from(&old.pr);
                wt.pr_fetch_status = old.pr_fetch_status;
                wt.pr_fetch_error.clone_from(&old.pr_fetch_error);
            }
        }
        if let Some((path, pr)) = self.pending_pr.take()
            && let Some(wt) = list.iter_mut().find(|w| w.path == path)
        {
            finish_pr_fetch(wt, Ok(Some(pr)));
        }

        let keep = self
            .selected_path()
            .or_else(|| self.initial_select.take());
        let pending = self.pending_select.take();
        self.registry.set_worktrees(list, pending.as_deref(), now_ts());
        if pending.is_none()
            && let Some(path) = keep
        {
            self.registry.select_path(&path);
        }
        if let Some(main) = self.registry.main_worktree() {
            self.main_path.clone_from(&main.path);
        }

        let mut cmds = Vec::new();
        let paths: Vec<&str> = self.registry.all().iter().map(|w| w.path.as_str()).collect();
        if self.notes.prune(&paths) {
            cmds.push(Cmd::SaveNotes(self.notes.clone()));
        }
        cmds.push(Cmd::SaveCache(self.registry.all().to_vec()));
        if pending.is_some() {
            cmds.push(Cmd::SaveAccess(self.registry.access().clone()));
        }
        cmds.extend(self.on_selection_changed());
        if self.reload_queued {
            self.reload_queued = false;
            cmds.extend(self.reload_worktrees());
        }
        cmds
    }

    fn on_details_loaded(&mut self, path: &str, result: Result<DetailsEntry, String>) -> Vec<Cmd> {
        if self.details_path.as_deref() != Some(path) {
            return Vec::new();
        }
        match result {
            Ok(entry) => self.apply_details(path, &entry),
            Err(e) => debug!(path, error = %e, "details refresh failed"),
        }
        Vec::new()
    }

    fn apply_details(&mut self, path: &str, entry: &DetailsEntry) {
        let files = parse_status_v2(&entry.status_raw);
        let (staged, modified, untracked) = status_counts(&files);
        self.registry
            .update(path, |w| w.set_status_counts(staged, modified, untracked));
        let keep = self.status.selected().map(|e| e.path.clone());
        self.status.set_files(files);
        if let Some(k) = keep {
            self.status.restore_selection(&k);
        }
        self.log = parse_log(&entry.log_raw, &entry.unpushed, &entry.unmerged);
        let len = self.visible_log().len();
        self.log_cursor = self.log_cursor.min(len.saturating_sub(1));
        self.fix_focus();
    }

    // ----- PRs -----

    pub(crate) fn start_pr_fetch(&mut self) -> Vec<Cmd> {
        if !self.forge_enabled() {
            return Vec::new();
        }
        self.registry.for_each_mut(|w| {
            begin_pr_fetch(w);
        });
        self.busy = Some("Fetching PR data...".to_owned());
        vec![Cmd::FetchPrs]
    }

    fn on_prs_loaded(&mut self, result: Result<HashMap<String, PrInfo>, String>) -> Vec<Cmd> {
        self.busy = None;
        let prs = match result {
            Ok(prs) => prs,
            Err(e) => {
                warn!(error = %e, "pr fetch failed");
                self.registry
                    .for_each_mut(|w| finish_pr_fetch(w, Err(e.clone())));
                if std::mem::take(&mut self.prune_after_prs) {
                    self.show_info(format!("Failed to fetch PR data: {e}"));
                }
                return Vec::new();
            }
        };
        self.prs_loaded = true;

        let mut cmds = Vec::new();
        let entries: Vec<(String, String, bool)> = self
            .registry
            .all()
            .iter()
            .map(|w| (w.path.clone(), w.branch.clone(), w.is_main))
            .collect();
        for (path, branch, is_main) in entries {
            if let Some(pr) = prs.get(&branch) {
                let pr = pr.clone();
                self.registry.update(&path, |w| finish_pr_fetch(w, Ok(Some(pr))));
            } else if is_main || branch.is_empty() {
                self.registry.update(&path, |w| finish_pr_fetch(w, Ok(None)));
            } else {
                cmds.push(Cmd::FetchPrForPath { path });
            }
        }
        if std::mem::take(&mut self.prune_after_prs) {
            cmds.extend(self.open_prune());
        }
        cmds.extend(self.ci_cmd(false));
        cmds.push(Cmd::SaveCache(self.registry.all().to_vec()));
        cmds
    }

    // ----- panes -----

    #[must_use]
    pub fn pane_visible(&self, pane: Pane) -> bool {
        match pane {
            Pane::GitStatus => !self.status.is_empty(),
            Pane::Notes => self
                .registry
                .selected()
                .is_some_and(|w| self.notes.has_note(&w.path)),
            Pane::Worktrees | Pane::Info | Pane::Commit => true,
        }
    }

    /// Moves focus and zoom off panes that just disappeared.
    pub(crate) fn fix_focus(&mut self) {
        if !self.pane_visible(self.focus) {
            self.focus = Pane::Worktrees;
        }
        if self.zoom.is_some_and(|z| !self.pane_visible(z)) {
            self.zoom = None;
        }
    }

    #[must_use]
    pub fn layout_input(&self) -> LayoutInput {
        LayoutInput {
            width: self.width,
            height: self.height,
            focus: self.focus,
            zoom: self.zoom,
            showing_filter: self.input.is_some(),
            has_notes: self.pane_visible(Pane::Notes),
            has_git_status: self.pane_visible(Pane::GitStatus),
            mode: self.layout,
        }
    }

    pub(crate) fn set_focus(&mut self, pane: Pane) -> Vec<Cmd> {
        if !self.pane_visible(pane) {
            return Vec::new();
        }
        self.focus = pane;
        if self.zoom.is_some() {
            self.zoom = Some(pane);
        }
        if pane == Pane::Info {
            return self.ci_cmd(false).into_iter().collect();
        }
        Vec::new()
    }

    fn focus_digit(&mut self, n: u8) -> Vec<Cmd> {
        let Some(pane) = Pane::ALL.into_iter().find(|p| p.number() == n) else {
            return Vec::new();
        };
        if self.focus == pane {
            self.zoom = if self.zoom == Some(pane) { None } else { Some(pane) };
            return Vec::new();
        }
        self.set_focus(pane)
    }

    fn cycle_pane(&mut self, forward: bool) -> Vec<Cmd> {
        let visible: Vec<Pane> = Pane::ALL
            .into_iter()
            .filter(|p| self.pane_visible(*p))
            .collect();
        let Some(pos) = visible.iter().position(|p| *p == self.focus) else {
            return self.set_focus(Pane::Worktrees);
        };
        let next = if forward {
            (pos + 1) % visible.len()
        } else {
            (pos + visible.len() - 1) % visible.len()
        };
        self.set_focus(visible[next])
    }

    fn move_pane_horizontal(&mut self, right: bool) -> Vec<Cmd> {
        let row = [Pane::Info, Pane::GitStatus, Pane::Commit];
        let in_row = row.contains(&self.focus);
        let target = match (self.layout, right, in_row) {
            (LayoutMode::Default, true, false) => Some(Pane::Info),
            (LayoutMode::Default, false, true) => Some(Pane::Worktrees),
            (LayoutMode::Top, _, false) => right.then_some(Pane::Info),
            (LayoutMode::Top, _, true) => {
                let visible: Vec<Pane> =
                    row.into_iter().filter(|p| self.pane_visible(*p)).collect();
                let pos = visible.iter().position(|p| *p == self.focus).unwrap_or(0);
                if right {
                    visible.get(pos + 1).copied()
                } else {
                    pos.checked_sub(1).and_then(|i| visible.get(i).copied())
                }
            }
            _ => None,
        };
        match target {
            Some(p) => self.set_focus(p),
            None => Vec::new(),
        }
    }

    fn half_page(&self) -> isize {
        let rows = self
            .dims
            .pane(self.focus)
            .map_or(10, |r| inner_size(r).1 / 2)
            .max(1);
        isize::try_from(rows).unwrap_or(1)
    }

    fn move_focused(&mut self, delta: isize) -> Vec<Cmd> {
        match self.focus {
            Pane::Worktrees => self.move_target(FilterTarget::Worktrees, delta),
            Pane::GitStatus => self.move_target(FilterTarget::Status, delta),
            Pane::Commit => self.move_target(FilterTarget::Log, delta),
            Pane::Info => {
                self.view.info_scroll = self.view.info_scroll.saturating_add_signed(delta);
                Vec::new()
            }
            Pane::Notes => {
                self.view.notes_scroll = self.view.notes_scroll.saturating_add_signed(delta);
                Vec::new()
            }
        }
    }

    fn move_target(&mut self, target: FilterTarget, delta: isize) -> Vec<Cmd> {
        match target {
            FilterTarget::Worktrees => {
                let before = self.registry.selected_index();
                self.registry.move_selection(delta);
                if self.registry.selected_index() == before {
                    return Vec::new();
                }
                self.on_selection_changed()
            }
            FilterTarget::Status => {
                self.status.move_cursor(delta);
                Vec::new()
            }
            FilterTarget::Log => {
                let len = self.visible_log().len();
                self.log_cursor = self
                    .log_cursor
                    .saturating_add_signed(delta)
                    .min(len.saturating_sub(1));
                Vec::new()
            }
        }
    }

    // ----- filter and search -----

    #[must_use]
    pub fn filter_query(&self, target: FilterTarget) -> &str {
        match target {
            FilterTarget::Worktrees => self.registry.filter_query(),
            FilterTarget::Status => self.status.filter(),
            FilterTarget::Log => &self.log_filter,
        }
    }

    fn apply_filter(&mut self, target: FilterTarget, query: &str) -> Vec<Cmd> {
        match target {
            FilterTarget::Worktrees => {
                self.registry.set_filter(query);
                self.on_selection_changed()
            }
            FilterTarget::Status => {
                self.status.set_filter(query);
                Vec::new()
            }
            FilterTarget::Log => {
                query.trim().clone_into(&mut self.log_filter);
                self.log_cursor = 0;
                Vec::new()
            }
        }
    }

    fn filter_step(&mut self, forward: bool) -> Vec<Cmd> {
        let Some(name) = self.registry.filter_step(forward) else {
            return Vec::new();
        };
        if let Some(line) = self.input.as_mut()
            && line.mode == InputMode::Filter
            && line.target == FilterTarget::Worktrees
        {
            line.text.set(name);
        }
        self.on_selection_changed()
    }

    fn search_candidates(&self, target: FilterTarget) -> (Vec<String>, usize) {
        match target {
            FilterTarget::Worktrees => (
                self.registry
                    .visible()
                    .map(|w| format!("{} {}", w.display_name(), w.branch).to_lowercase())
                    .collect(),
                self.registry.selected_index(),
            ),
            FilterTarget::Status => (
                self.status.flat().iter().map(|e| e.path.to_lowercase()).collect(),
                self.status.index(),
            ),
            FilterTarget::Log => (
                self.visible_log()
                    .iter()
                    .map(|e| format!("{} {}", e.sha, e.message).to_lowercase())
                    .collect(),
                self.log_cursor,
            ),
        }
    }

    /// Jumps to the next entry containing the search query, wrapping.
    fn search_jump(&mut self, target: FilterTarget, forward: bool, include_current: bool) -> Vec<Cmd> {
        let query = self.search_query.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }
        let (texts, current) = self.search_candidates(target);
        let n = texts.len();
        if n == 0 {
            return Vec::new();
        }
        let start = usize::from(!include_current);
        let hit = (start..start + n).find_map(|step| {
            let idx = if forward {
                (current + step) % n
            } else {
                (current + n * 2 - step) % n
            };
            texts[idx].contains(&query).then_some(idx)
        });
        let Some(idx) = hit else {
            return Vec::new();
        };
        match target {
            FilterTarget::Worktrees => {
                if idx == self.registry.selected_index() {
                    return Vec::new();
                }
                self.registry.select_index(idx);
                self.on_selection_changed()
            }
            FilterTarget::Status => {
                self.status.set_index(idx);
                Vec::new()
            }
            FilterTarget::Log => {
                self.log_cursor = idx;
                Vec::new()
            }
        }
    }

    // ----- CI -----

    fn step_ci_check(&mut self, forward: bool) {
        let len = self.current_ci_checks().len();
        if len == 0 {
            self.ci_check_index = None;
            return;
        }
        self.ci_check_index = Some(match (self.ci_check_index, forward) {
            (None, true) => 0,
            (None, false) => len - 1,
            (Some(i), true) => (i + 1) % len,
            (Some(i), false) => (i + len - 1) % len,
        });
    }

    fn choose_ci_check(&mut self) -> Vec<Cmd> {
        let checks = self.current_ci_checks();
        if checks.is_empty() {
            self.show_info("No CI checks for this worktree.");
            return Vec::new();
        }
        let items = checks
            .iter()
            .enumerate()
            .map(|(i, c)| ListItem::new(i.to_string(), c.name.clone(), c.conclusion.label()))
            .collect();
        self.screens
            .push(Screen::List(ListScreen::new("CI checks", items, ListAction::CiCheck)));
        Vec::new()
    }

    // ----- notes, tasks, clipboard -----

    fn open_note_editor(&mut self) -> Vec<Cmd> {
        let Some(wt) = self.registry.selected() else {
            return Vec::new();
        };
        let existing = self
            .notes
            .get(&wt.path)
            .map(|n| n.note.clone())
            .unwrap_or_default();
        let screen = NoteEditorScreen::new(&wt.path, &wt.display_name(), &existing);
        self.screens.push(Screen::NoteEditor(screen));
        Vec::new()
    }

    fn refresh_taskboard(&mut self) {
        let items = build_taskboard(self.registry.all(), &self.notes);
        if let Some(Screen::Taskboard(board)) = self.screens.top_mut() {
            board.set_items(items);
        }
    }

    fn toggle_task(&mut self, path: &str, line: usize, is_keyword: bool) -> Vec<Cmd> {
        let Some(note) = self.notes.get(path).map(|n| n.note.clone()) else {
            return Vec::new();
        };
        let Some(updated) = toggle_task(&note, line, is_keyword) else {
            return Vec::new();
        };
        self.notes.set(path, &updated, now_ts());
        self.refresh_taskboard();
        vec![Cmd::SaveNotes(self.notes.clone())]
    }

    pub(crate) fn add_task(&mut self, path: &str, text: &str) -> Vec<Cmd> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let existing = self.notes.get(path).map(|n| n.note.clone());
        let updated = append_task(existing.as_deref(), text);
        self.notes.set(path, &updated, now_ts());
        self.refresh_taskboard();
        self.fix_focus();
        vec![Cmd::SaveNotes(self.notes.clone())]
    }

    fn contextual_copy_text(&self) -> Option<String> {
        let wt = self.registry.selected()?;
        match self.focus {
            Pane::GitStatus => {
                let entry = self.status.selected()?;
                Some(
                    std::path::Path::new(&wt.path)
                        .join(&entry.path)
                        .to_string_lossy()
                        .to_string(),
                )
            }
            Pane::Commit => self.selected_commit().map(|c| c.sha.clone()),
            _ => Some(wt.path.clone()),
        }
    }

    fn copy(&mut self, text: String) -> Vec<Cmd> {
        self.flash = Some(format!("Copied {text}"));
        vec![Cmd::Copy(text)]
    }

    // ----- histories -----

    fn note_palette_use(&mut self, id: &str) {
        let now = now_ts();
        match self.palette_history.iter_mut().find(|u| u.id == id) {
            Some(usage) => {
                usage.timestamp = now;
                usage.count += 1;
            }
            None => self.palette_history.push(PaletteUsage {
                id: id.to_owned(),
                timestamp: now,
                count: 1,
            }),
        }
    }

    pub(crate) fn note_command_use(&mut self, command: &str) {
        self.command_history.retain(|c| c != command);
        self.command_history.insert(0, command.to_owned());
        self.command_history.truncate(MAX_COMMAND_HISTORY);
    }

    // ----- modals -----

    /// Clears progress indicators and shows a message.
    pub(crate) fn show_info(&mut self, message: impl Into<String>) {
        self.end_loading();
        self.screens.push(Screen::Info(InfoScreen::new(message)));
    }

    pub(crate) fn begin_loading(&mut self, label: impl Into<String>) {
        self.screens.remove_kind(ScreenKind::Loading);
        self.screens.push(Screen::Loading(LoadingScreen::new(label)));
    }

    pub(crate) fn end_loading(&mut self) {
        self.screens.remove_kind(ScreenKind::Loading);
    }

    pub(crate) fn on_theme_selected(&mut self, name: &str) {
        if self.styles.set_theme(name, &self.cfg.custom_themes) {
            self.flash = Some(format!("Theme: {name}"));
        }
    }

    /// Opens the link of the CI check with list id `id`.
    pub(crate) fn open_ci_check(&mut self, id: &str) -> Vec<Cmd> {
        let Ok(index) = id.parse::<usize>() else {
            return Vec::new();
        };
        self.ci_check_index = Some(index);
        match self.current_ci_checks().get(index) {
            Some(check) if !check.link.is_empty() => vec![Cmd::OpenUrl(check.link.clone())],
            Some(check) => {
                self.show_info(format!("{} has no link.", check.name));
                Vec::new()
            }
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::path::Path;

    use super::*;
    use crate::core::models::PrState;
    use crate::core::registry::SortMode;

    pub(crate) fn model_with(worktrees: Vec<WorktreeInfo>) -> Model {
        let cfg = Config {
            theme: "dracula".to_owned(),
            sort_mode: Some(SortMode::Path),
            ..Config::default()
        };
        let mut m = Model::new(ModelInit {
            cfg,
            repo_key: "acme/app".to_owned(),
            main_path: "/w/main".to_owned(),
            host: ForgeHost::GitHub,
            access: HashMap::new(),
            cached: None,
            last_selected: None,
            palette_history: Vec::new(),
            command_history: Vec::new(),
            notes: NotesStore::new("acme/app", Path::new("/nonexistent"), None),
            repo_config: None,
            caches: SharedCaches::new(),
        });
        m.update(Msg::WorktreesLoaded(Ok(worktrees)));
        m
    }

    pub(crate) fn four() -> Vec<WorktreeInfo> {
        vec![
            WorktreeInfo::new("/w/main", "main", true),
            WorktreeInfo::new("/w/alpha", "alpha", false),
            WorktreeInfo::new("/w/beta", "beta", false),
            WorktreeInfo::new("/w/gamma", "gamma", false),
        ]
    }

    pub(crate) fn key(code: KeyCode) -> Msg {
        Msg::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    pub(crate) fn info_text(m: &Model) -> Option<&str> {
        match m.screens.top() {
            Some(Screen::Info(s)) => Some(s.message()),
            _ => None,
        }
    }

    #[test]
    fn reload_keeps_selection_by_path() {
        let mut m = model_with(four());
        assert!(m.registry.select_path("/w/gamma"));
        m.update(Msg::WorktreesLoaded(Ok(four())));
        assert_eq!(m.selected_path().as_deref(), Some("/w/gamma"));
    }

    #[test]
    fn pending_selection_wins_and_is_cleared() {
        let mut m = model_with(four());
        m.pending_select = Some("/w/beta".to_owned());
        let cmds = m.update(Msg::WorktreesLoaded(Ok(four())));
        assert_eq!(m.selected_path().as_deref(), Some("/w/beta"));
        assert!(m.pending_select.is_none());
        assert!(cmds.iter().any(|c| matches!(c, Cmd::SaveAccess(_))));
    }

    #[test]
    fn failed_reload_clears_pending_and_informs() {
        let mut m = model_with(four());
        m.pending_select = Some("/w/new".to_owned());
        m.update(Msg::WorktreesLoaded(Err("boom".to_owned())));
        assert!(m.pending_select.is_none());
        assert!(info_text(&m).is_some_and(|t| t.contains("boom")));
    }

    #[test]
    fn alt_n_steps_filter_through_full_list() {
        let mut m = model_with(four());
        m.update(key(KeyCode::Char('f')));
        for c in "a".chars() {
            m.update(key(KeyCode::Char(c)));
        }
        assert!(m.registry.select_path("/w/alpha"));
        m.update(Msg::Key(KeyEvent::new(KeyCode::Char('n'), KeyModifiers::ALT)));
        assert_eq!(m.registry.filter_query(), "beta");
        assert_eq!(m.selected_path().as_deref(), Some("/w/beta"));
        assert_eq!(m.input.as_ref().map(|l| l.text.as_str()), Some("beta"));
    }

    #[test]
    fn digit_focuses_then_toggles_zoom() {
        let mut m = model_with(four());
        m.update(key(KeyCode::Char('2')));
        assert_eq!(m.focus, Pane::Info);
        assert_eq!(m.zoom, None);
        m.update(key(KeyCode::Char('2')));
        assert_eq!(m.zoom, Some(Pane::Info));
        m.update(key(KeyCode::Char('4')));
        assert_eq!(m.focus, Pane::Commit);
        assert_eq!(m.zoom, Some(Pane::Commit));
        m.update(key(KeyCode::Char('4')));
        assert_eq!(m.zoom, None);
    }

    #[test]
    fn hidden_panes_cannot_be_focused() {
        let mut m = model_with(four());
        m.update(key(KeyCode::Char('3')));
        assert_eq!(m.focus, Pane::Worktrees);
        m.update(key(KeyCode::Tab));
        assert_eq!(m.focus, Pane::Info);
        m.update(key(KeyCode::Tab));
        assert_eq!(m.focus, Pane::Commit);
    }

    #[test]
    fn details_populate_status_and_counts() {
        let mut m = model_with(four());
        let path = m.selected_path().unwrap_or_default();
        let entry = DetailsEntry {
            status_raw: "1 .M N... 100644 100644 100644 a b src/lib.rs\n? new.txt\n".to_owned(),
            log_raw: String::new(),
            unpushed: Default::default(),
            unmerged: Default::default(),
            fetched_at: Instant::now(),
        };
        m.update(Msg::DetailsLoaded {
            path: path.clone(),
            result: Ok(entry),
        });
        assert_eq!(m.status.all_files().len(), 2);
        let wt = m.registry.find_by_path(&path).cloned().unwrap_or_default();
        assert_eq!((wt.modified(), wt.untracked()), (1, 1));
        assert!(m.pane_visible(Pane::GitStatus));
    }

    #[test]
    fn stale_details_are_ignored() {
        let mut m = model_with(four());
        m.update(Msg::DetailsLoaded {
            path: "/w/other".to_owned(),
            result: Ok(DetailsEntry {
                status_raw: "? x\n".to_owned(),
                log_raw: String::new(),
                unpushed: Default::default(),
                unmerged: Default::default(),
                fetched_at: Instant::now(),
            }),
        });
        assert!(m.status.is_empty());
    }

    #[test]
    fn taskboard_toggle_rewrites_note() {
        let mut m = model_with(four());
        m.notes
            .set("/w/alpha", "- [ ] Write tests\n- [x] done already", 1);
        m.update(key(KeyCode::Char('T')));
        assert_eq!(m.screens.top_kind(), Some(ScreenKind::Taskboard));
        let cmds = m.update(key(KeyCode::Char(' ')));
        assert_eq!(
            m.notes.get("/w/alpha").map(|n| n.note.as_str()),
            Some("- [x] Write tests\n- [x] done already")
        );
        assert!(cmds.iter().any(|c| matches!(c, Cmd::SaveNotes(_))));
    }

    #[test]
    fn notes_for_vanished_worktrees_are_pruned() {
        let mut m = model_with(four());
        m.notes.set("/w/gone", "old", 1);
        let cmds = m.update(Msg::WorktreesLoaded(Ok(four())));
        assert!(!m.notes.has_note("/w/gone"));
        assert!(cmds.iter().any(|c| matches!(c, Cmd::SaveNotes(_))));
    }

    #[test]
    fn prs_match_by_branch_and_fall_back_per_path() {
        let mut m = model_with(four());
        let pr = PrInfo {
            number: 3,
            state: PrState::Open,
            title: "Alpha".to_owned(),
            body: String::new(),
            url: "https://github.com/acme/app/pull/3".to_owned(),
            branch: "alpha".to_owned(),
            base_branch: "main".to_owned(),
            author: String::new(),
            author_name: String::new(),
            author_is_bot: false,
            is_draft: false,
            ci_status: String::new(),
        };
        let cmds = m.update(Msg::PrsLoaded(Ok(HashMap::from([("alpha".to_owned(), pr)]))));
        assert!(m.prs_loaded);
        assert_eq!(
            m.registry.find_by_path("/w/alpha").and_then(|w| w.pr.as_ref()).map(|p| p.number),
            Some(3)
        );
        let per_path: Vec<&str> = cmds
            .iter()
            .filter_map(|c| match c {
                Cmd::FetchPrForPath { path } => Some(path.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(per_path, vec!["/w/beta", "/w/gamma"]);
    }

    #[test]
    fn palette_selection_records_use_and_runs_action() {
        let mut m = model_with(four());
        let cmds = m.update(Msg::PaletteSelected("layout".to_owned()));
        assert_eq!(m.layout, LayoutMode::Top);
        assert!(cmds.iter().any(|c| matches!(c, Cmd::RecordPaletteUse(id) if id == "layout")));
        assert_eq!(m.palette_history.first().map(|u| u.count), Some(1));
    }

    #[test]
    fn trust_choices_map_to_commands() {
        let mut m = model_with(four());
        let pending = PendingCommands {
            label: "Init commands".to_owned(),
            commands: vec!["make".to_owned()],
            cwd: PathBuf::from("/w/alpha"),
            env: BTreeMap::new(),
            trust_path: Some(PathBuf::from("/w/main/.wt.yaml")),
            after: None,
        };
        let cmds = m.update(Msg::TrustChoice {
            pending: Box::new(pending.clone()),
            choice: TrustChoice::RunOnce,
        });
        assert!(matches!(cmds.as_slice(), [Cmd::RunCommands { force: true, .. }]));
        let cmds = m.update(Msg::TrustChoice {
            pending: Box::new(pending),
            choice: TrustChoice::Cancel,
        });
        assert!(cmds.is_empty());
    }

    #[test]
    fn enter_on_worktree_selects_and_quits() {
        let mut m = model_with(four());
        m.registry.select_path("/w/beta");
        let cmds = m.update(key(KeyCode::Enter));
        assert!(m.should_quit);
        assert_eq!(m.selected_on_exit.as_deref(), Some("/w/beta"));
        assert!(cmds.iter().any(|c| matches!(c, Cmd::SaveLastSelected(p) if p == "/w/beta")));
    }

    #[test]
    fn search_wraps_and_esc_clears_query() {
        let mut m = model_with(four());
        m.update(key(KeyCode::Char('/')));
        for c in "gam".chars() {
            m.update(key(KeyCode::Char(c)));
        }
        assert_eq!(m.selected_path().as_deref(), Some("/w/gamma"));
        m.update(key(KeyCode::Enter));
        assert!(m.input.is_none());
        assert_eq!(m.search_query, "gam");
        m.update(key(KeyCode::Char('/')));
        m.update(key(KeyCode::Esc));
        assert!(m.search_query.is_empty());
    }
}
