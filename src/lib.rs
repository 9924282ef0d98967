//! chatservice is a streaming chat-completion client that keeps several
//! independent conversation sessions.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the stream decoder, the HTTP completion client, the
//!   send/cancel state machine and the session store, plus persisted settings.
//! - [`commands`] implements slash-command parsing and execution for the
//!   interactive loop.
//! - [`cli`] parses arguments and runs the line-oriented frontend.
//! - [`api`] defines the chat-completion payloads exchanged with the server.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod commands;
pub mod core;
pub mod utils;
