#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context as _;
use clap::{CommandFactory as _, Parser, Subcommand, ValueEnum};
use tracing::info;

use crate::config::{self, Config};
use crate::tui;

pub const LOG_ENV: &str = "LAZYWT_LOG";

#[derive(Debug, Parser)]
#[command(
    name = "lazywt",
    version,
    about = "Terminal UI for managing git worktrees"
)]
pub struct Cli {
    /// Directory that holds new worktrees
    #[arg(long = "worktree-dir", value_name = "DIR")]
    pub worktree_dir: Option<String>,

    /// Override a config key (repeatable)
    #[arg(short = 'C', long = "config", value_name = "KEY=VALUE")]
    pub config: Vec<String>,

    /// Write debug logs to FILE
    #[arg(long = "debug-log", value_name = "FILE")]
    pub debug_log: Option<PathBuf>,

    /// Write the selected worktree path to FILE instead of stdout
    #[arg(long = "output-selection", value_name = "FILE")]
    pub output_selection: Option<PathBuf>,

    /// Color theme
    #[arg(long = "theme", value_name = "NAME")]
    pub theme: Option<String>,

    /// Start with the worktree filter focused
    #[arg(long = "search-auto-select")]
    pub search_auto_select: bool,

    /// Pane arrangement
    #[arg(long = "layout", value_enum)]
    pub layout: Option<LayoutArg>,

    #[command(subcommand)]
    pub cmd: Option<Commands>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LayoutArg {
    Default,
    Top,
}

impl LayoutArg {
    fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Top => "top",
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print shell completions
    Completion(CompletionArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Parser)]
pub struct CompletionArgs {
    pub shell: clap_complete::Shell,
}

impl Cli {
    /// Dedicated flags first, then `--config` pairs, all through the typed key table.
    fn overrides(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(dir) = &self.worktree_dir {
            out.push(format!("worktree_dir={dir}"));
        }
        if let Some(theme) = &self.theme {
            out.push(format!("theme={theme}"));
        }
        if let Some(layout) = self.layout {
            out.push(format!("layout={}", layout.as_str()));
        }
        if self.search_auto_select {
            out.push("search_auto_select=true".to_owned());
        }
        out.extend(self.config.iter().cloned());
        out
    }
}

pub async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.cmd {
        Some(Commands::Completion(args)) => {
            let mut cmd = Cli::command();
            clap_complete::generate(args.shell, &mut cmd, "lazywt", &mut std::io::stdout());
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Version) => Ok(cmd_version()),
        None => cmd_default(cli).await,
    }
}

fn init_logging(path: Option<&Path>) -> anyhow::Result<()> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => match std::env::var_os(LOG_ENV).filter(|v| !v.is_empty()) {
            Some(p) => PathBuf::from(p),
            None => return Ok(()),
        },
    };
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(file))
        .init();
    Ok(())
}

fn load_cfg(cli: &Cli) -> anyhow::Result<Config> {
    let (mut cfg, paths) = config::load()?;
    cfg.apply_overrides(&cli.overrides())?;
    info!(config = %paths.config_file.display(), "config loaded");
    Ok(cfg)
}

async fn cmd_default(cli: Cli) -> anyhow::Result<ExitCode> {
    init_logging(cli.debug_log.as_deref())?;
    let cfg = load_cfg(&cli)?;
    if !tui::is_tty() {
        anyhow::bail!("lazywt needs an interactive terminal");
    }
    let selected = tui::app::run(cfg).await?;
    if let Some(path) = selected {
        write_selection(&path, cli.output_selection.as_deref())?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Prints the path, or writes it to `target` for shell wrappers.
fn write_selection(path: &str, target: Option<&Path>) -> anyhow::Result<()> {
    match target {
        Some(file) => std::fs::write(file, format!("{path}\n"))
            .with_context(|| format!("failed to write {}", file.display())),
        None => {
            println!("{path}");
            Ok(())
        }
    }
}

fn cmd_version() -> ExitCode {
    println!("lazywt version {}", env!("CARGO_PKG_VERSION"));
    println!("  rust: {}", rustc_version_runtime::version());
    println!(
        "  os/arch: {}/{}",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayoutMode;

    #[test]
    fn flags_become_overrides_before_config_pairs() {
        let cli = Cli::try_parse_from([
            "lazywt",
            "--worktree-dir",
            "/tmp/wt",
            "--layout",
            "top",
            "-C",
            "theme=nord",
            "--theme",
            "dracula",
            "--search-auto-select",
        ])
        .unwrap();
        assert_eq!(
            cli.overrides(),
            vec![
                "worktree_dir=/tmp/wt",
                "theme=dracula",
                "layout=top",
                "search_auto_select=true",
                "theme=nord",
            ]
        );
        let mut cfg = Config::default();
        cfg.apply_overrides(&cli.overrides()).unwrap();
        assert_eq!(cfg.layout, LayoutMode::Top);
        assert_eq!(cfg.theme, "nord");
        assert!(cfg.search_auto_select);
    }

    #[test]
    fn unknown_config_key_is_rejected() {
        let cli = Cli::try_parse_from(["lazywt", "--config", "no_such_key=1"]).unwrap();
        let mut cfg = Config::default();
        assert!(cfg.apply_overrides(&cli.overrides()).is_err());
    }

    #[test]
    fn subcommands_parse() {
        let cli = Cli::try_parse_from(["lazywt", "completion", "zsh"]).unwrap();
        assert!(matches!(cli.cmd, Some(Commands::Completion(_))));
        let cli = Cli::try_parse_from(["lazywt", "version"]).unwrap();
        assert!(matches!(cli.cmd, Some(Commands::Version)));
        assert!(Cli::try_parse_from(["lazywt", "--layout", "sideways"]).is_err());
    }

    #[test]
    fn selection_written_to_file() {
        let td = tempfile::tempdir().unwrap();
        let out = td.path().join("sel");
        write_selection("/w/feat", Some(&out)).unwrap();
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "/w/feat\n");
    }
}
