use serde::{Deserialize, Serialize};

use crate::api::{ChatMessage, ChatRequest, ROLE_SYSTEM, ROLE_USER};
use crate::core::error::ChatError;

pub const DEFAULT_TEMPERATURE: f64 = 0.6;
pub const DEFAULT_TOP_P: f64 = 0.9;
pub const DEFAULT_MAX_TOKENS: u32 = 64_000;
pub const MAX_TOKENS_LIMIT: u32 = 128_000;

/// Sampling settings captured by each request at send time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParameters {
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
    pub stream: bool,
    pub system_message: String,
}

impl Default for GenerationParameters {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            max_tokens: DEFAULT_MAX_TOKENS,
            stream: true,
            system_message: String::new(),
        }
    }
}

impl GenerationParameters {
    /// Clamp every numeric field into its accepted range.
    pub fn clamped(mut self) -> Self {
        self.temperature = clamp_unit(self.temperature);
        self.top_p = clamp_unit(self.top_p);
        self.max_tokens = self.max_tokens.min(MAX_TOKENS_LIMIT);
        self
    }
}

pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// Build the chat-completion payload for one prompt.
pub fn build_request(
    prompt: &str,
    system_message: &str,
    params: &GenerationParameters,
) -> Result<ChatRequest, ChatError> {
    if prompt.is_empty() {
        return Err(ChatError::empty_prompt());
    }

    Ok(ChatRequest {
        messages: vec![
            ChatMessage {
                role: ROLE_SYSTEM.to_string(),
                content: system_message.to_string(),
            },
            ChatMessage {
                role: ROLE_USER.to_string(),
                content: prompt.to_string(),
            },
        ],
        temperature: params.temperature,
        top_p: params.top_p,
        max_tokens: params.max_tokens,
        stream: params.stream,
    })
}
