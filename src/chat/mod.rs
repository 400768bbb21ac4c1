//! Interactive chat on top of the streaming client.
//!
//! This module provides the pieces of the `yaap` REPL:
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`session`]: conversation state and streamed turns
//! - [`commands`]: session command parsing
//!
//! Responses stream through [`crate::stream::StreamOrchestrator`], so
//! thinking blocks are hidden behind the animated indicator.

mod commands;
mod config;
mod session;

pub use crate::render::{PlainTextRenderer, Renderer};
pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatArgs, ChatConfig, DEFAULT_SYSTEM_PROMPT};
pub use session::{ChatSession, HistoryEntry, OfflineResponder, ResponseSource, SessionStats};
