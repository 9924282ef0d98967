//! Error types for chat commands and completion failures.

use std::fmt;

/// Why a completion request failed after it was accepted for sending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The configured endpoint is not an absolute http(s) URL.
    InvalidEndpoint(String),
    /// Connecting, writing the request, or reading the body failed.
    Network(String),
    /// The server answered with a non-success status.
    Api { status: u16, message: String },
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::InvalidEndpoint(endpoint) => {
                write!(f, "Invalid API endpoint: {endpoint}")
            }
            ErrorKind::Network(detail) => write!(f, "Network error: {detail}"),
            ErrorKind::Api { status, message } if message.starts_with("```") => {
                write!(f, "HTTP {status}:\n{message}")
            }
            ErrorKind::Api { status, message } => write!(f, "HTTP {status}: {message}"),
        }
    }
}

impl std::error::Error for ErrorKind {}

/// Errors returned by controller commands and request construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// The prompt was empty.
    Validation(String),
    /// A send was attempted while another one is in flight.
    Busy,
    /// The named session does not exist.
    UnknownSession(String),
    /// The settings file could not be loaded.
    Config(String),
}

impl ChatError {
    pub fn empty_prompt() -> Self {
        ChatError::Validation("Please enter a request.".to_string())
    }
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatError::Validation(msg) => write!(f, "{msg}"),
            ChatError::Busy => write!(f, "A request is already in progress"),
            ChatError::UnknownSession(name) => write!(f, "Unknown session: {name}"),
            ChatError::Config(msg) => write!(f, "Config error: {msg}"),
        }
    }
}

impl std::error::Error for ChatError {}
