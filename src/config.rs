//! Engine configuration from environment variables

use crate::workflow::DEFAULT_FALLBACK_MESSAGE;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            other => Err(format!("unknown log format '{other}', expected json or pretty")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Text of the generic ERROR reply
    pub fallback_message: String,
    /// Upper bound for one whole turn, including automatic continuations
    pub handler_timeout: Option<Duration>,
    /// Append the collected session fields to every reply
    pub debug_context: bool,
    pub log_format: LogFormat,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fallback_message: DEFAULT_FALLBACK_MESSAGE.to_string(),
            handler_timeout: None,
            debug_context: false,
            log_format: LogFormat::default(),
        }
    }
}

/// A variable that was set but could not be used
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub variable: &'static str,
    pub message: String,
}

impl ConfigWarning {
    fn new(variable: &'static str, message: impl Into<String>) -> Self {
        Self {
            variable,
            message: message.into(),
        }
    }

    pub fn log(&self) {
        tracing::warn!(
            variable = self.variable,
            error = %self.message,
            "Ignoring invalid configuration value"
        );
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`EngineConfig::from_env`], but hands the warnings back instead
    /// of logging them, for callers that install tracing afterwards.
    pub fn from_env_with_warnings() -> (Self, Vec<ConfigWarning>) {
        Self::parse(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable values fall back to defaults
    /// with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let (config, warnings) = Self::parse(lookup);
        for warning in &warnings {
            warning.log();
        }
        config
    }

    pub fn parse(lookup: impl Fn(&str) -> Option<String>) -> (Self, Vec<ConfigWarning>) {
        let defaults = Self::default();
        let mut warnings = Vec::new();

        let fallback_message = lookup("CONVOFLOW_FALLBACK_MESSAGE")
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(defaults.fallback_message);

        let handler_timeout = lookup("CONVOFLOW_HANDLER_TIMEOUT_SECS").and_then(|raw| {
            match raw.trim().parse::<u64>() {
                Ok(0) => None,
                Ok(secs) => Some(Duration::from_secs(secs)),
                Err(e) => {
                    warnings.push(ConfigWarning::new(
                        "CONVOFLOW_HANDLER_TIMEOUT_SECS",
                        format!("'{raw}': {e}"),
                    ));
                    None
                }
            }
        });

        let debug_context = lookup("CONVOFLOW_DEBUG_CONTEXT").is_some_and(|raw| {
            matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
        });

        let log_format = lookup("CONVOFLOW_LOG_FORMAT")
            .and_then(|raw| match raw.parse::<LogFormat>() {
                Ok(format) => Some(format),
                Err(e) => {
                    warnings.push(ConfigWarning::new("CONVOFLOW_LOG_FORMAT", e));
                    None
                }
            })
            .unwrap_or(defaults.log_format);

        let config = Self {
            fallback_message,
            handler_timeout,
            debug_context,
            log_format,
        };
        (config, warnings)
    }
}
