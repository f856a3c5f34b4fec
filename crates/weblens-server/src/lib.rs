//! weblens: summarize a passage of web text and fact-check it with lookup tools.
//!
//! The binary exposes this as `POST /summarize` (see [`http`]) and as one-shot
//! CLI commands. The library surface is what the integration tests drive.

pub use weblens_core;

pub mod agent;
pub mod config;
pub mod envelope;
pub mod http;
pub mod prompt;
pub mod tools;
