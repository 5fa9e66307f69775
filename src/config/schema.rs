//! Configuration schema.
//!
//! Every section has serde defaults, so an empty file (or no file at all)
//! yields a working configuration. Durations are written in `humantime`
//! form (`"1s"`, `"250ms"`, `"2m"`).

use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

// ============================================================================
// Root
// ============================================================================

/// Root configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Generation proxy server settings
    pub proxy: ProxyConfig,
    /// Client-side settings used by `run` and `generate`
    pub client: ClientConfig,
    /// Phase engine settings
    pub engine: EngineConfig,
    /// Simulated page settings used by `run`
    pub simulation: SimulationConfig,
    /// Answers the workflow selects on the form
    pub answers: FormAnswers,
}

// ============================================================================
// Proxy
// ============================================================================

/// Upstream text-generation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Anthropic Messages API
    #[default]
    Claude,
    /// Google Gemini `generateContent`
    Gemini,
    /// Local Ollama server
    Ollama,
}

impl BackendKind {
    /// Stable lowercase name used in logs, metrics and `/health`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Gemini => "gemini",
            Self::Ollama => "ollama",
        }
    }

    /// Environment variable holding this backend's credential, if any.
    #[must_use]
    pub const fn credential_env(self) -> Option<&'static str> {
        match self {
            Self::Claude => Some("ANTHROPIC_API_KEY"),
            Self::Gemini => Some("GEMINI_API_KEY"),
            Self::Ollama => None,
        }
    }

    /// Default model identifier.
    #[must_use]
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::Claude => "claude-sonnet-4-20250514",
            Self::Gemini => "gemini-1.5-flash-latest",
            Self::Ollama => "llama3.2",
        }
    }

    /// Default API base URL.
    #[must_use]
    pub const fn default_base_url(self) -> &'static str {
        match self {
            Self::Claude => "https://api.anthropic.com",
            Self::Gemini => "https://generativelanguage.googleapis.com",
            Self::Ollama => "http://localhost:11434",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generation proxy settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProxyConfig {
    /// Bind address (`host:port`, `:port` or bare port)
    pub bind: String,
    /// Backend to forward generation requests to
    pub backend: BackendKind,
    /// Model override (backend default when unset)
    pub model: Option<String>,
    /// Model retried once when the primary Gemini model returns 404
    pub legacy_model: Option<String>,
    /// API base URL override
    pub base_url: Option<String>,
    /// Credential override (otherwise read from the backend's env var)
    pub api_key: Option<String>,
    /// Guide template file; missing file means the built-in guide
    pub guide_path: PathBuf,
    /// Upstream request timeout
    #[serde(with = "duration_str")]
    pub timeout: Duration,
    /// Maximum accepted request body in bytes
    pub max_body_bytes: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
            backend: BackendKind::default(),
            model: None,
            legacy_model: None,
            base_url: None,
            api_key: None,
            guide_path: PathBuf::from("guide.md"),
            timeout: Duration::from_secs(60),
            max_body_bytes: 1024 * 1024,
        }
    }
}

// ============================================================================
// Client
// ============================================================================

/// How the engine obtains generated text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    /// Ask a running generation proxy over HTTP
    #[default]
    Proxy,
    /// Call the backend in-process, prompting for the credential once
    Direct,
}

/// Client-side settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Where generated text comes from
    pub mode: GenerationMode,
    /// Base URL of the generation proxy
    pub proxy_url: String,
    /// Guide file sent along with each request (proxy guide when unset)
    pub guide_path: Option<PathBuf>,
    /// Timeout for one proxy call
    #[serde(with = "duration_str")]
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            mode: GenerationMode::default(),
            proxy_url: "http://localhost:3000".to_string(),
            guide_path: None,
            timeout: Duration::from_secs(90),
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Replaces one scheduled delay with another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DelayOverride {
    /// Delay to match exactly
    #[serde(with = "duration_str")]
    pub from: Duration,
    /// Delay to use instead
    #[serde(with = "duration_str")]
    pub to: Duration,
}

/// Explicit table of delay overrides applied by the engine and the
/// simulated page to every delay they schedule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DelayOverrides(pub Vec<DelayOverride>);

impl DelayOverrides {
    /// Returns the override for `delay`, or `delay` itself.
    #[must_use]
    pub fn apply(&self, delay: Duration) -> Duration {
        self.0
            .iter()
            .find(|o| o.from == delay)
            .map_or(delay, |o| o.to)
    }

    /// Adds an override, replacing an existing entry for the same delay.
    pub fn insert(&mut self, from: Duration, to: Duration) {
        self.0.retain(|o| o.from != from);
        self.0.push(DelayOverride { from, to });
    }
}

/// Phase engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Period between ticks of the active phase
    #[serde(with = "duration_str")]
    pub tick_interval: Duration,
    /// Delay between a phase's exit action and the next phase's first tick
    #[serde(with = "duration_str")]
    pub settle_delay: Duration,
    /// Ticks a phase may run before it is declared stalled (`0` = never)
    pub max_ticks_per_phase: u32,
    /// Phase to begin with
    pub start_phase: String,
    /// Delay override table
    pub delay_overrides: DelayOverrides,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            settle_delay: Duration::from_secs(1),
            max_ticks_per_phase: 600,
            start_phase: "phase1".to_string(),
            delay_overrides: DelayOverrides::default(),
        }
    }
}

// ============================================================================
// Simulation
// ============================================================================

/// Settings for the built-in simulated retrospective form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Time a screen takes to render after a navigation click
    #[serde(with = "duration_str")]
    pub render_delay: Duration,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            render_delay: Duration::from_millis(300),
        }
    }
}

// ============================================================================
// Form answers
// ============================================================================

/// What the workflow picks on each screen of the form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FormAnswers {
    /// Keyword chips selected on the first screen
    pub keywords: Vec<String>,
    /// Score button selected on the first screen
    pub score: u8,
    /// Feeling selected on the second screen
    pub feeling: String,
    /// Satisfaction level selected on the second screen
    pub satisfaction: String,
}

impl Default for FormAnswers {
    fn default() -> Self {
        Self {
            keywords: [
                "목적중심",
                "긍정열기",
                "결과추적",
                "성과중심",
                "전략검토",
                "합리검토",
                "감정 점검",
                "최선 태도",
                "변화 의지",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            score: 9,
            feeling: "뿌듯한".to_string(),
            satisfaction: "매우 만족".to_string(),
        }
    }
}

// ============================================================================
// Duration (de)serialization
// ============================================================================

/// Serde adapter for `humantime` duration strings.
pub mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    /// Serializes a duration as a `humantime` string.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    /// Deserializes a `humantime` string such as `"1s"` or `"250ms"`.
    ///
    /// # Errors
    ///
    /// Fails on strings `humantime` cannot parse.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}
