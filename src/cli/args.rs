//! CLI argument definitions
//!
//! All Clap derive structs for `retrodrive` command-line parsing. Flags
//! given here override values from the configuration file.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use crate::config::{BackendKind, GenerationMode};
use crate::observability::LogFormat;

// ============================================================================
// Root CLI
// ============================================================================

/// Fills in retrospective forms and serves the text generation proxy.
#[derive(Parser, Debug)]
#[command(name = "retrodrive", author, version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all non-error output.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output control.
    #[arg(long, default_value = "auto", global = true, env = "RETRODRIVE_COLOR")]
    pub color: ColorChoice,

    /// Log output format.
    #[arg(long, default_value = "human", global = true, env = "RETRODRIVE_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Path to a YAML configuration file.
    #[arg(short, long, global = true, env = "RETRODRIVE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Expose Prometheus metrics on this port.
    #[arg(long, global = true, env = "RETRODRIVE_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Write JSONL lifecycle events to this file.
    #[arg(long, global = true, env = "RETRODRIVE_EVENTS_FILE")]
    pub events_file: Option<PathBuf>,
}

// ============================================================================
// Top-Level Commands
// ============================================================================

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the text generation proxy.
    Serve(ServeArgs),

    /// Drive the retrospective form through every phase.
    Run(RunArgs),

    /// Generate retrospective text once and print it.
    Generate(GenerateArgs),

    /// Query a running proxy's health endpoint.
    Health(HealthArgs),

    /// Generate shell completion scripts.
    Completions(CompletionsArgs),

    /// Display version and build information.
    Version(VersionArgs),
}

// ============================================================================
// Serve
// ============================================================================

/// Arguments for `serve`.
#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Bind address (`host:port`, `:port` or bare port).
    #[arg(long, env = "RETRODRIVE_BIND")]
    pub bind: Option<String>,

    /// Upstream backend.
    #[command(flatten)]
    pub backend: BackendArgs,

    /// Guide template file.
    #[arg(long, env = "RETRODRIVE_GUIDE")]
    pub guide: Option<PathBuf>,

    /// Upstream request timeout (e.g. `30s`).
    #[arg(long, value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,
}

/// Backend selection shared by `serve`, `run` and `generate`.
#[derive(Args, Debug, Default, Clone)]
pub struct BackendArgs {
    /// Backend to call.
    #[arg(long, env = "RETRODRIVE_BACKEND")]
    pub backend: Option<BackendKind>,

    /// Model override.
    #[arg(long, env = "RETRODRIVE_MODEL")]
    pub model: Option<String>,

    /// API base URL override.
    #[arg(long, env = "RETRODRIVE_BASE_URL")]
    pub base_url: Option<String>,
}

// ============================================================================
// Run / Generate
// ============================================================================

/// Where generated text comes from, shared by `run` and `generate`.
#[derive(Args, Debug, Default, Clone)]
pub struct SourceArgs {
    /// `proxy` asks a running proxy, `direct` calls the backend in-process.
    #[arg(long, env = "RETRODRIVE_MODE")]
    pub mode: Option<GenerationMode>,

    /// Proxy base URL.
    #[arg(long, env = "RETRODRIVE_PROXY_URL")]
    pub proxy_url: Option<String>,

    /// Guide template file.
    #[arg(long, env = "RETRODRIVE_GUIDE")]
    pub guide: Option<PathBuf>,

    /// Backend used in direct mode.
    #[command(flatten)]
    pub backend: BackendArgs,
}

/// Arguments for `run`.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// What was done today; prompted for when omitted.
    #[arg(short, long, env = "RETRODRIVE_TASK")]
    pub task: Option<String>,

    /// Phase to start from.
    #[arg(long)]
    pub start_phase: Option<String>,

    /// Period between ticks (e.g. `1s`, `250ms`).
    #[arg(long, value_parser = humantime::parse_duration)]
    pub tick_interval: Option<Duration>,

    /// Delay between a phase's exit action and the next phase.
    #[arg(long, value_parser = humantime::parse_duration)]
    pub settle_delay: Option<Duration>,

    /// Ticks a phase may run before the run stalls (`0` = never).
    #[arg(long)]
    pub max_ticks: Option<u32>,

    /// Screen render delay of the simulated form.
    #[arg(long, value_parser = humantime::parse_duration)]
    pub render_delay: Option<Duration>,

    /// Text source.
    #[command(flatten)]
    pub source: SourceArgs,
}

/// Arguments for `generate`.
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// What was done today.
    pub task: String,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,

    /// Text source.
    #[command(flatten)]
    pub source: SourceArgs,
}

// ============================================================================
// Health
// ============================================================================

/// Arguments for `health`.
#[derive(Args, Debug)]
pub struct HealthArgs {
    /// Proxy base URL.
    #[arg(long, env = "RETRODRIVE_PROXY_URL")]
    pub proxy_url: Option<String>,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

// ============================================================================
// Completions / Version
// ============================================================================

/// Arguments for shell completion generation.
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Target shell for completion script.
    pub shell: Shell,
}

/// Arguments for version display.
#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

// ============================================================================
// CLI-Local Enums
// ============================================================================

/// Color output choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorChoice {
    /// Auto-detect terminal support.
    #[default]
    Auto,
    /// Always use color.
    Always,
    /// Never use color.
    Never,
}

/// Output format for structured output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output.
    #[default]
    Human,
    /// JSON output.
    Json,
}

/// Shell type for completion generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Shell {
    /// Bash shell.
    Bash,
    /// Zsh shell.
    Zsh,
    /// Fish shell.
    Fish,
    /// `PowerShell`.
    #[value(name = "powershell")]
    PowerShell,
    /// Elvish shell.
    Elvish,
}

// ============================================================================
// Tests
// ============================================================================
