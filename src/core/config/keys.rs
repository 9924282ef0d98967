//! Named setting keys and the validation applied when they are changed.

use std::fmt;

use crate::core::config::data::Settings;
use crate::core::request::{clamp_unit, MAX_TOKENS_LIMIT};
use crate::utils::url::parse_endpoint;

/// A key accepted by `set` / `unset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKey {
    EndpointUrl,
    ApiKey,
    Temperature,
    TopP,
    MaxTokens,
    Stream,
    SystemMessage,
}

impl SettingKey {
    pub const ALL: [SettingKey; 7] = [
        SettingKey::EndpointUrl,
        SettingKey::ApiKey,
        SettingKey::Temperature,
        SettingKey::TopP,
        SettingKey::MaxTokens,
        SettingKey::Stream,
        SettingKey::SystemMessage,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SettingKey::EndpointUrl => "endpoint-url",
            SettingKey::ApiKey => "api-key",
            SettingKey::Temperature => "temperature",
            SettingKey::TopP => "top-p",
            SettingKey::MaxTokens => "max-tokens",
            SettingKey::Stream => "stream",
            SettingKey::SystemMessage => "system-message",
        }
    }

    /// Look up a key by name. Underscores are accepted in place of dashes.
    pub fn parse(input: &str) -> Option<Self> {
        let normalized = input.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL.into_iter().find(|key| key.name() == normalized)
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors that can occur when modifying settings.
#[derive(Debug)]
pub enum SettingError {
    /// The provided setting key is not recognized.
    UnknownKey(String),
    /// The provided value could not be parsed as a boolean.
    InvalidBoolean(String),
    /// The provided value is not acceptable for `key`.
    InvalidValue {
        key: SettingKey,
        input: String,
        expected: &'static str,
    },
    /// An error occurred while persisting the settings.
    ConfigError(String),
}

impl SettingError {
    /// Print the error message to stderr with appropriate formatting.
    pub fn print(&self) {
        match self {
            SettingError::UnknownKey(key) => {
                eprintln!("❌ Unknown config key: {key}");
                eprintln!("   Available keys: {}", available_keys());
            }
            SettingError::InvalidBoolean(input) => {
                eprintln!("❌ Invalid boolean value: {input}");
                eprintln!("   Use 'on' or 'off' (also accepts true/false, yes/no)");
            }
            SettingError::InvalidValue {
                key,
                input,
                expected,
            } => {
                eprintln!("❌ Invalid value for {key}: {input}");
                eprintln!("   Expected {expected}");
            }
            SettingError::ConfigError(msg) => {
                eprintln!("❌ Failed to save configuration: {msg}");
            }
        }
    }
}

impl fmt::Display for SettingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingError::UnknownKey(key) => write!(f, "Unknown config key: {key}"),
            SettingError::InvalidBoolean(input) => write!(f, "Invalid boolean value: {input}"),
            SettingError::InvalidValue {
                key,
                input,
                expected,
            } => write!(f, "Invalid value for {key}: {input} (expected {expected})"),
            SettingError::ConfigError(msg) => write!(f, "Config error: {msg}"),
        }
    }
}

impl std::error::Error for SettingError {}

fn available_keys() -> String {
    SettingKey::ALL
        .iter()
        .map(|key| key.name())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse a boolean value from user input.
///
/// Accepts: on/off, true/false, yes/no (case-insensitive).
pub fn parse_bool(input: &str) -> Option<bool> {
    match input.trim().to_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Some(true),
        "off" | "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

pub fn format_bool(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

fn parse_unit(key: SettingKey, input: &str) -> Result<f64, SettingError> {
    match input.trim().parse::<f64>() {
        Ok(value) if !value.is_nan() => Ok(clamp_unit(value)),
        _ => Err(SettingError::InvalidValue {
            key,
            input: input.to_string(),
            expected: "a number between 0 and 1",
        }),
    }
}

fn parse_max_tokens(input: &str) -> Result<u32, SettingError> {
    let value = input
        .trim()
        .parse::<i64>()
        .map_err(|_| SettingError::InvalidValue {
            key: SettingKey::MaxTokens,
            input: input.to_string(),
            expected: "a whole number of tokens",
        })?;
    let clamped = value.clamp(0, i64::from(MAX_TOKENS_LIMIT));
    Ok(u32::try_from(clamped).unwrap_or(MAX_TOKENS_LIMIT))
}

impl Settings {
    /// Validate `value` for the named key and store it. Numeric values are
    /// clamped into range rather than rejected.
    pub fn set(&mut self, key: &str, value: &str) -> Result<SettingKey, SettingError> {
        let key = SettingKey::parse(key).ok_or_else(|| SettingError::UnknownKey(key.to_string()))?;

        match key {
            SettingKey::EndpointUrl => {
                let url = parse_endpoint(value).map_err(|_| SettingError::InvalidValue {
                    key,
                    input: value.to_string(),
                    expected: "an http(s) URL",
                })?;
                self.endpoint_url = url.to_string();
            }
            SettingKey::ApiKey => self.api_key = value.trim().to_string(),
            SettingKey::Temperature => self.temperature = parse_unit(key, value)?,
            SettingKey::TopP => self.top_p = parse_unit(key, value)?,
            SettingKey::MaxTokens => self.max_tokens = parse_max_tokens(value)?,
            SettingKey::Stream => {
                self.stream =
                    parse_bool(value).ok_or_else(|| SettingError::InvalidBoolean(value.to_string()))?;
            }
            SettingKey::SystemMessage => self.system_message = value.to_string(),
        }

        Ok(key)
    }

    /// Restore the named key to its default.
    pub fn unset(&mut self, key: &str) -> Result<SettingKey, SettingError> {
        let key = SettingKey::parse(key).ok_or_else(|| SettingError::UnknownKey(key.to_string()))?;
        let defaults = Settings::default();

        match key {
            SettingKey::EndpointUrl => self.endpoint_url = defaults.endpoint_url,
            SettingKey::ApiKey => self.api_key = defaults.api_key,
            SettingKey::Temperature => self.temperature = defaults.temperature,
            SettingKey::TopP => self.top_p = defaults.top_p,
            SettingKey::MaxTokens => self.max_tokens = defaults.max_tokens,
            SettingKey::Stream => self.stream = defaults.stream,
            SettingKey::SystemMessage => self.system_message = defaults.system_message,
        }

        Ok(key)
    }
}
