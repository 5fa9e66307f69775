//! Error types for `retrodrive`
//!
//! A small error hierarchy: one enum per domain, aggregated into
//! [`RetroDriveError`], which maps each failure onto a process exit code.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

// ============================================================================
// Exit Codes
// ============================================================================

/// Exit codes for `retrodrive` CLI operations.
///
/// These codes follow Unix conventions.
pub struct ExitCode;

impl ExitCode {
    /// Successful execution
    pub const SUCCESS: i32 = 0;

    /// General error
    pub const ERROR: i32 = 1;

    /// Configuration error (invalid YAML, validation failure)
    pub const CONFIG_ERROR: i32 = 2;

    /// I/O error (file not found, permission denied)
    pub const IO_ERROR: i32 = 3;

    /// Proxy error (bind failure, proxy unreachable)
    pub const PROXY_ERROR: i32 = 4;

    /// Phase engine error (stall, invalid transition)
    pub const PHASE_ERROR: i32 = 5;

    /// Usage error (invalid arguments, missing required input)
    pub const USAGE_ERROR: i32 = 64;

    /// Interrupted by SIGINT (Ctrl+C)
    pub const INTERRUPTED: i32 = 130;

    /// Terminated by SIGTERM
    pub const TERMINATED: i32 = 143;
}

// ============================================================================
// Top-Level Error
// ============================================================================

/// Top-level error type for `retrodrive` operations.
#[derive(Debug, Error)]
pub enum RetroDriveError {
    /// Configuration loading or validation error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Generation proxy error
    #[error(transparent)]
    Proxy(#[from] ProxyError),

    /// Phase engine error
    #[error(transparent)]
    Phase(#[from] PhaseError),

    /// Invalid invocation (e.g. no task given)
    #[error("usage error: {0}")]
    Usage(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RetroDriveError {
    /// Returns the appropriate exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Json(_) => ExitCode::CONFIG_ERROR,
            Self::Proxy(_) => ExitCode::PROXY_ERROR,
            Self::Phase(_) => ExitCode::PHASE_ERROR,
            Self::Usage(_) => ExitCode::USAGE_ERROR,
            Self::Io(_) => ExitCode::IO_ERROR,
        }
    }
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// YAML parsing failed
    #[error("parse error in {path}: {message}")]
    ParseError {
        /// Path to the configuration file
        path: PathBuf,
        /// Error message from the parser
        message: String,
    },

    /// Referenced configuration file not found
    #[error("file not found: {path}")]
    MissingFile {
        /// Path to the missing file
        path: PathBuf,
    },

    /// Field has an invalid value
    #[error("invalid value for '{field}': got '{value}', expected {expected}")]
    InvalidValue {
        /// Name of the field with invalid value
        field: String,
        /// The actual value provided
        value: String,
        /// Description of what was expected
        expected: String,
    },

    /// Environment variable referenced in configuration is not set
    #[error("environment variable '{var}' not set ({message})")]
    EnvVarNotSet {
        /// Name of the environment variable
        var: String,
        /// Message supplied by the `${VAR:?message}` form
        message: String,
    },
}

// ============================================================================
// Proxy Errors
// ============================================================================

/// Errors raised by the generation proxy server and its clients.
///
/// Upstream generation failures never appear here: they are absorbed
/// into fallback text at the generator boundary.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Failed to bind the listener
    #[error("bind failed on {addr}: {message}")]
    Bind {
        /// Requested bind address
        addr: String,
        /// Underlying error message
        message: String,
    },

    /// Invalid bind address string
    #[error("invalid bind address \"{0}\"")]
    InvalidAddress(String),

    /// The proxy could not be reached (health checks only)
    #[error("proxy unreachable at {url}: {message}")]
    Unreachable {
        /// Proxy base URL
        url: String,
        /// Underlying error message
        message: String,
    },

    /// The proxy answered with an unexpected status
    #[error("proxy returned HTTP {0}")]
    Status(u16),
}

// ============================================================================
// Phase Engine Errors
// ============================================================================

/// Phase engine errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PhaseError {
    /// Phase name not present in the workflow
    #[error("unknown phase '{name}'{}", did_you_mean(.suggestion.as_deref()))]
    UnknownPhase {
        /// The requested phase name
        name: String,
        /// Closest known phase name, if any is similar enough
        suggestion: Option<String>,
    },

    /// Engine-driven transition that would revisit an earlier phase
    #[error("phase transitions are monotonic: cannot advance from '{from}' to '{to}'")]
    Backward {
        /// Current phase
        from: String,
        /// Requested target phase
        to: String,
    },

    /// A phase exceeded its tick budget without reaching its exit condition
    #[error("phase '{phase}' stalled after {ticks} ticks ({elapsed:?}) without reaching its exit condition")]
    Stalled {
        /// Phase that stalled
        phase: String,
        /// Ticks executed in that phase
        ticks: u32,
        /// Wall time spent polling
        elapsed: Duration,
    },

    /// The engine was stopped before the workflow finished
    #[error("engine stopped before completion (last phase: {phase})")]
    Stopped {
        /// Last active phase, or `<none>`
        phase: String,
    },

    /// The workflow has no phases
    #[error("workflow has no phases")]
    EmptyWorkflow,
}

fn did_you_mean(suggestion: Option<&str>) -> String {
    suggestion.map_or_else(String::new, |s| format!(" (did you mean '{s}'?)"))
}

// ============================================================================
// Page Adapter Errors
// ============================================================================

/// Errors reported by a page adapter when an action cannot be performed.
///
/// A missing element is not an error (queries return `None`); these cover
/// elements that vanished or rejected the interaction between query and action.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PageError {
    /// The element is no longer attached to the page
    #[error("element {0} is detached")]
    Detached(u64),

    /// The element exists but cannot be interacted with
    #[error("element {id} rejected {action}: {reason}")]
    Rejected {
        /// Element identifier
        id: u64,
        /// Action attempted (e.g. `"click"`)
        action: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

// ============================================================================
// Backend Errors
// ============================================================================

/// Upstream text-generation backend failures.
///
/// Only visible inside the generation layer; callers of
/// [`TextGenerator`](crate::generation::TextGenerator) never see these.
#[derive(Debug, Error)]
pub enum BackendError {
    /// No credential configured for a backend that requires one
    #[error("{backend} credential is not configured")]
    MissingCredential {
        /// Backend name
        backend: &'static str,
    },

    /// Network-level failure
    #[error("network error: {0}")]
    Network(String),

    /// Request exceeded the configured timeout
    #[error("upstream request timed out after {0:?}")]
    Timeout(Duration),

    /// Non-2xx response
    #[error("upstream returned HTTP {status}: {body}")]
    HttpStatus {
        /// HTTP status code
        status: u16,
        /// Response body (truncated)
        body: String,
    },

    /// Response body did not have the expected shape
    #[error("malformed upstream response: {0}")]
    Malformed(String),
}

impl BackendError {
    /// Returns the upstream HTTP status if this is a status error.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Short outcome label used for metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::MissingCredential { .. } => "missing_credential",
            Self::Network(_) => "network",
            Self::Timeout(_) => "timeout",
            Self::HttpStatus { .. } => "http_status",
            Self::Malformed(_) => "malformed",
        }
    }
}
