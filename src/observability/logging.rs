//! Tracing subscriber setup.
//!
//! All log output goes to stderr so `run` and `generate` can print their
//! results on stdout. `RETRODRIVE_LOG_LEVEL` takes any `EnvFilter`
//! directive and replaces the `-v` derived filter entirely.

use std::io::IsTerminal;

use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

use crate::cli::args::ColorChoice;

/// Environment variable holding an explicit filter directive.
pub const LOG_LEVEL_ENV: &str = "RETRODRIVE_LOG_LEVEL";

/// HTTP plumbing that is only interesting at `-vvv`.
const HTTP_STACK: [&str; 4] = ["hyper", "hyper_util", "reqwest", "h2"];

/// How log lines are rendered on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Compact text, colored on a terminal
    #[default]
    Human,
    /// One JSON object per line, fields flattened
    Json,
}

/// Filter used when no `RETRODRIVE_LOG_LEVEL` is set.
///
/// `-v` steps through warn, info, debug and trace for this crate. The HTTP
/// client and server internals stay at warn until trace is requested.
#[must_use]
pub fn default_directive(verbosity: u8) -> String {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => return "trace".to_string(),
    };
    std::iter::once(level.to_string())
        .chain(HTTP_STACK.iter().map(|target| format!("{target}=warn")))
        .collect::<Vec<_>>()
        .join(",")
}

fn filter(verbosity: u8) -> EnvFilter {
    EnvFilter::try_from_env(LOG_LEVEL_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)))
}

/// Whether ANSI colors should be written.
///
/// `auto` colors only a terminal and respects `NO_COLOR`.
#[must_use]
pub const fn use_ansi(choice: ColorChoice, stderr_is_terminal: bool, no_color: bool) -> bool {
    match choice {
        ColorChoice::Auto => stderr_is_terminal && !no_color,
        ColorChoice::Always => true,
        ColorChoice::Never => false,
    }
}

/// Installs the global subscriber.
///
/// A second call is ignored, which keeps tests that share a process happy.
pub fn init_logging(format: LogFormat, verbosity: u8, color: ColorChoice) {
    let filter = filter(verbosity);
    // Module paths only help once debugging starts
    let with_target = verbosity >= 2;

    let installed = match format {
        LogFormat::Human => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(use_ansi(
                color,
                std::io::stderr().is_terminal(),
                std::env::var_os("NO_COLOR").is_some(),
            ))
            .with_target(with_target)
            .with_writer(std::io::stderr)
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_env_filter(filter)
            .with_target(with_target)
            .with_writer(std::io::stderr)
            .try_init(),
    };

    if installed.is_ok() {
        tracing::debug!(?format, verbosity, "logging initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_levels_keep_http_stack_at_warn() {
        let directive = default_directive(1);
        assert!(directive.starts_with("info,"));
        assert!(directive.contains("reqwest=warn"));
        assert!(directive.contains("hyper=warn"));
        assert_eq!(default_directive(0).split(',').next(), Some("warn"));
        assert_eq!(default_directive(2).split(',').next(), Some("debug"));
    }

    #[test]
    fn trace_opens_everything() {
        assert_eq!(default_directive(3), "trace");
        assert_eq!(default_directive(u8::MAX), "trace");
    }

    #[test]
    fn default_directives_parse() {
        for v in 0..=3 {
            assert!(EnvFilter::try_new(default_directive(v)).is_ok(), "verbosity {v}");
        }
    }

    #[test]
    fn color_resolution() {
        assert!(use_ansi(ColorChoice::Auto, true, false));
        assert!(!use_ansi(ColorChoice::Auto, true, true));
        assert!(!use_ansi(ColorChoice::Auto, false, false));
        assert!(use_ansi(ColorChoice::Always, false, true));
        assert!(!use_ansi(ColorChoice::Never, true, false));
    }

    #[test]
    fn repeated_init_is_ignored() {
        init_logging(LogFormat::Json, 2, ColorChoice::Never);
        init_logging(LogFormat::Human, 0, ColorChoice::Auto);
    }
}
