pub mod chat_stream;
pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod request;
pub mod session;
