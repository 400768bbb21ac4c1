//! Yet Another AI Program: a streaming chat client for OpenAI-compatible
//! `chat/completions` endpoints that hides `<think>` blocks behind an
//! animated indicator.

mod animation;
pub mod chat;
mod client;
mod client_logger;
mod config;
mod error;
mod observability;
mod render;
mod sse;
mod stream;
pub mod thinking;
mod tools;
pub mod types;

pub use animation::{DEFAULT_FRAMES, DEFAULT_INTERVAL, ThinkingAnimation};
pub use client::{ChunkStream, LlmClient, LlmResponse};
pub use client_logger::{ClientLogger, TracingClientLogger};
pub use config::{DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_SECS, LlmConfig};
pub use error::{Error, Result};
pub use observability::register_biometrics;
pub use render::{
    MAX_WRAP_WIDTH, MemorySink, PlainTextRenderer, Renderer, SinkEvent, StdoutSink, TerminalSink,
    format_error, format_info, terminal_width, wrap_lines,
};
pub use sse::process_sse;
pub use stream::{Interrupt, StreamFailure, StreamOrchestrator, StreamResponse};
pub use thinking::{Markers, StreamPostprocessor, extract_thinking, strip_thinking};
pub use tools::{Tool, ToolRegistry};
pub use types::*;
