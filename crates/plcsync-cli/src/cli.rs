//! Clap derive structures for the `plcsync` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// plcsync -- keep building automation PLCs in step with the calendar
#[derive(Debug, Parser)]
#[command(
    name = "plcsync",
    version,
    about = "Mirror the holiday and event calendar into PLC registers",
    long_about = "Writes upcoming holidays and room events into the fixed register banks of\n\
        the building automation controllers, verifies them by reading them back,\n\
        and keeps them current on a daily schedule.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "PLCSYNC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "PLCSYNC_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the scheduler daemon until interrupted
    Run(RunArgs),

    /// Synchronize one target now
    Sync(TargetArg),

    /// Show sync status of one or all targets
    #[command(alias = "st")]
    Status(StatusArgs),

    /// Check that a target's controller answers
    Probe(TargetArg),

    /// Read back every register of a target
    Read(TargetArg),

    /// Show what a sync would write, without touching the controller
    Plan(PlanArgs),

    /// Zero every slot of a target
    Clear(TargetArg),

    /// List configured targets
    #[command(alias = "ls")]
    Targets,

    /// Inspect CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Command Arguments ────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct TargetArg {
    /// Target key (see `plcsync targets`)
    pub target: String,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Target key; all targets when omitted
    pub target: Option<String>,
}

#[derive(Debug, Args)]
pub struct PlanArgs {
    /// Target key (see `plcsync targets`)
    pub target: String,

    /// Plan as of this local time (`YYYY-MM-DD HH:MM`) instead of now
    #[arg(long)]
    pub at: Option<String>,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// How often to check the calendar file for changes
    #[arg(long, default_value = "10s", value_parser = humantime::parse_duration)]
    pub watch_interval: Duration,

    /// Synchronize every target once before waiting for the schedule
    #[arg(long)]
    pub sync_on_start: bool,

    /// Also write a daily log file here (overrides `log_dir`)
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration (passwords masked)
    Show,

    /// Print the config file path
    Path,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: Shell,
}
