//! Configuration loading.
//!
//! Reads a YAML document, expands environment references in the raw text,
//! deserializes it into [`AppConfig`] and validates the result.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

use super::schema::AppConfig;

// ============================================================================
// Public API
// ============================================================================

/// Non-fatal issue found while loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadWarning {
    /// Human-readable message
    pub message: String,
    /// Source location, when known
    pub location: Option<String>,
}

/// Result of a successful load.
#[derive(Debug, Clone)]
pub struct LoadResult {
    /// Parsed and validated configuration
    pub config: AppConfig,
    /// Warnings produced along the way
    pub warnings: Vec<LoadWarning>,
}

/// Loads and validates configuration files.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    warnings: Vec<LoadWarning>,
}

impl ConfigLoader {
    /// Creates a loader.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            warnings: Vec::new(),
        }
    }

    /// Loads `path`, or returns defaults when `path` is `None`.
    ///
    /// # Errors
    ///
    /// See [`load`](Self::load).
    pub fn load_optional(&mut self, path: Option<&Path>) -> Result<LoadResult, ConfigError> {
        match path {
            Some(p) => self.load(p),
            None => {
                let config = AppConfig::default();
                validate(&config)?;
                Ok(LoadResult {
                    config,
                    warnings: Vec::new(),
                })
            }
        }
    }

    /// Loads a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingFile`] if the file does not exist,
    /// [`ConfigError::EnvVarNotSet`] for an unset `${VAR:?msg}` reference,
    /// [`ConfigError::ParseError`] for invalid YAML, and
    /// [`ConfigError::InvalidValue`] when validation fails.
    pub fn load(&mut self, path: &Path) -> Result<LoadResult, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;
        self.load_str(&raw, path)
    }

    /// Loads configuration from a string, using `source` for messages.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load), minus the missing-file case.
    pub fn load_str(&mut self, raw: &str, source: &Path) -> Result<LoadResult, ConfigError> {
        self.warnings.clear();

        let mut subst = EnvSubstitution::new();
        let expanded = subst.substitute(raw, source)?;
        self.warnings.append(&mut subst.warnings);

        // An empty document is valid and means "all defaults"
        let config: AppConfig = if expanded.trim().is_empty() {
            AppConfig::default()
        } else {
            serde_yaml::from_str(&expanded).map_err(|e| ConfigError::ParseError {
                path: source.to_path_buf(),
                message: e.to_string(),
            })?
        };

        validate(&config)?;

        Ok(LoadResult {
            config,
            warnings: std::mem::take(&mut self.warnings),
        })
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Validates cross-field constraints serde cannot express.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidValue`] for the first violation found.
pub fn validate(config: &AppConfig) -> Result<(), ConfigError> {
    if config.engine.tick_interval == Duration::ZERO {
        return Err(invalid(
            "engine.tick_interval",
            "0s",
            "a positive duration",
        ));
    }
    if config.answers.keywords.is_empty() {
        return Err(invalid("answers.keywords", "[]", "at least one keyword"));
    }
    if config.answers.keywords.iter().any(|k| k.trim().is_empty()) {
        return Err(invalid(
            "answers.keywords",
            "<empty>",
            "non-empty keyword labels",
        ));
    }
    if !(1..=10).contains(&config.answers.score) {
        return Err(invalid(
            "answers.score",
            &config.answers.score.to_string(),
            "a score between 1 and 10",
        ));
    }
    if config.proxy.max_body_bytes == 0 {
        return Err(invalid("proxy.max_body_bytes", "0", "a positive size"));
    }
    if !(config.client.proxy_url.starts_with("http://")
        || config.client.proxy_url.starts_with("https://"))
    {
        return Err(invalid(
            "client.proxy_url",
            &config.client.proxy_url,
            "an http:// or https:// URL",
        ));
    }
    Ok(())
}

fn invalid(field: &str, value: &str, expected: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        expected: expected.to_string(),
    }
}

// ============================================================================
// Environment Variable Substitution
// ============================================================================

/// Pre-parse environment variable substitution.
///
/// Runs on raw YAML text BEFORE parsing to preserve type inference.
struct EnvSubstitution {
    warnings: Vec<LoadWarning>,
}

impl EnvSubstitution {
    const fn new() -> Self {
        Self {
            warnings: Vec::new(),
        }
    }

    /// Substitutes environment variables in raw YAML text.
    ///
    /// Supports:
    /// - `${VAR}` - expand to value (empty string if unset with warning)
    /// - `${VAR:-default}` - expand to default if unset
    /// - `${VAR:?message}` - fail if unset
    /// - `$$` - literal `$`
    fn substitute(&mut self, raw_yaml: &str, source_path: &Path) -> Result<String, ConfigError> {
        let mut result = String::with_capacity(raw_yaml.len());
        let mut chars = raw_yaml.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '$' {
                result.push(c);
                continue;
            }
            match chars.peek() {
                Some('$') => {
                    chars.next();
                    result.push('$');
                }
                Some('{') => {
                    chars.next();
                    let spec = parse_var_spec(&mut chars, source_path)?;
                    match std::env::var(&spec.name) {
                        Ok(value) => result.push_str(&value),
                        Err(_) => match spec.fallback {
                            VarFallback::Default(default) => result.push_str(&default),
                            VarFallback::Required(message) => {
                                return Err(ConfigError::EnvVarNotSet {
                                    var: spec.name,
                                    message,
                                });
                            }
                            VarFallback::Empty => {
                                self.warnings.push(LoadWarning {
                                    message: format!(
                                        "environment variable '{}' is not set, using empty string",
                                        spec.name
                                    ),
                                    location: Some(source_path.display().to_string()),
                                });
                            }
                        },
                    }
                }
                _ => result.push(c),
            }
        }

        Ok(result)
    }
}

/// What to do when a referenced variable is unset.
enum VarFallback {
    Empty,
    Default(String),
    Required(String),
}

/// A parsed `${...}` reference.
struct VarSpec {
    name: String,
    fallback: VarFallback,
}

/// Parses the inside of `${...}`; the opening `${` is already consumed.
fn parse_var_spec(
    chars: &mut std::iter::Peekable<std::str::Chars>,
    source_path: &Path,
) -> Result<VarSpec, ConfigError> {
    let mut name = String::new();

    while let Some(c) = chars.next() {
        match c {
            '}' => {
                return Ok(VarSpec {
                    name,
                    fallback: VarFallback::Empty,
                });
            }
            ':' if chars.peek() == Some(&'-') => {
                chars.next();
                let default = read_until_close(chars, source_path)?;
                return Ok(VarSpec {
                    name,
                    fallback: VarFallback::Default(default),
                });
            }
            ':' if chars.peek() == Some(&'?') => {
                chars.next();
                let message = read_until_close(chars, source_path)?;
                return Ok(VarSpec {
                    name,
                    fallback: VarFallback::Required(message),
                });
            }
            _ => name.push(c),
        }
    }

    Err(unclosed(source_path, &name))
}

/// Reads content until the matching `}`, handling nested braces.
fn read_until_close(
    chars: &mut std::iter::Peekable<std::str::Chars>,
    source_path: &Path,
) -> Result<String, ConfigError> {
    let mut value = String::new();
    let mut depth = 1;

    for c in chars.by_ref() {
        match c {
            '{' => {
                depth += 1;
                value.push(c);
            }
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(value);
                }
                value.push(c);
            }
            _ => value.push(c),
        }
    }

    Err(unclosed(source_path, &value))
}

fn unclosed(source_path: &Path, fragment: &str) -> ConfigError {
    ConfigError::ParseError {
        path: PathBuf::from(source_path),
        message: format!("unclosed environment variable reference near '{fragment}'"),
    }
}
