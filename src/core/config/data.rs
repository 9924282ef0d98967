use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::controller::{ChatSettings, ConnectionSettings, DEFAULT_ENDPOINT_URL};
use crate::core::request::{
    clamp_unit, GenerationParameters, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, DEFAULT_TOP_P,
    MAX_TOKENS_LIMIT,
};

/// Environment variable that takes precedence over the stored `api-key`.
pub const API_KEY_ENV: &str = "CHATSERVICE_API_KEY";

/// Persisted user settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Settings {
    pub endpoint_url: String,
    pub api_key: String,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
    pub stream: bool,
    pub system_message: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint_url: DEFAULT_ENDPOINT_URL.to_string(),
            api_key: String::new(),
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            max_tokens: DEFAULT_MAX_TOKENS,
            stream: true,
            system_message: String::new(),
        }
    }
}

impl Settings {
    /// Bring hand-edited numeric values back into range.
    pub fn clamped(mut self) -> Self {
        self.temperature = clamp_unit(self.temperature);
        self.top_p = clamp_unit(self.top_p);
        self.max_tokens = self.max_tokens.min(MAX_TOKENS_LIMIT);
        self
    }

    pub fn generation_parameters(&self) -> GenerationParameters {
        GenerationParameters {
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
            stream: self.stream,
            system_message: self.system_message.clone(),
        }
        .clamped()
    }

    /// Endpoint and credentials, with `CHATSERVICE_API_KEY` overriding the stored key.
    pub fn connection(&self) -> ConnectionSettings {
        ConnectionSettings {
            endpoint_url: self.endpoint_url.clone(),
            api_key: resolve_api_key(&self.api_key, std::env::var(API_KEY_ENV).ok()),
        }
    }

    pub fn chat_settings(&self) -> ChatSettings {
        ChatSettings {
            connection: self.connection(),
            generation: self.generation_parameters(),
        }
    }
}

pub(crate) fn resolve_api_key(stored: &str, from_env: Option<String>) -> String {
    from_env
        .filter(|key| !key.trim().is_empty())
        .unwrap_or_else(|| stored.to_string())
}

/// Get a user-friendly display string for a path
///
/// Paths under `$HOME` are shown with `~` on Unix-like systems.
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
