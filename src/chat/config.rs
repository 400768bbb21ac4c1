//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg` and configuration
//! structures for controlling chat behavior.

use std::path::PathBuf;
use std::time::Duration;

use arrrg_derive::CommandLine;

use crate::animation::DEFAULT_INTERVAL;
use crate::error::{Error, Result};
use crate::thinking::{DEFAULT_CLOSE, DEFAULT_OPEN, Markers};

/// System prompt used when none is given.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are YAAP (Yet Another AI Program), a helpful AI \
     assistant. Be concise, friendly, and helpful in your responses.";

/// Command-line arguments for the yaap tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// YAML file with connection settings.
    #[arrrg(optional, "Read connection settings from a YAML file instead of LLM_* variables", "PATH")]
    pub config: Option<String>,

    /// Model to use for chat.
    #[arrrg(optional, "Model to use (default: LLM_MODEL)", "MODEL")]
    pub model: Option<String>,

    /// System prompt to set context for the conversation.
    #[arrrg(optional, "System prompt for the conversation", "PROMPT")]
    pub system: Option<String>,

    /// Show thinking blocks instead of hiding them.
    #[arrrg(flag, "Show thinking blocks verbatim")]
    pub show_thinking: bool,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,

    /// Verbose diagnostics on stderr.
    #[arrrg(flag, "Enable debug logging")]
    pub debug: bool,

    #[arrrg(optional, "Marker opening a thinking block (default: <think>)", "MARKER")]
    pub open_marker: Option<String>,

    #[arrrg(optional, "Marker closing a thinking block (default: </think>)", "MARKER")]
    pub close_marker: Option<String>,
}

/// Configuration for a chat session.
///
/// This struct holds the resolved configuration values after processing
/// command-line arguments with appropriate defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    /// System prompt sent first in every request.
    pub system_prompt: String,

    /// Overrides the model from the connection settings.
    pub model: Option<String>,

    /// Connection settings file; `None` reads the environment.
    pub config_path: Option<PathBuf>,

    /// Whether thinking blocks are hidden from the output.
    pub remove_thinking: bool,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,

    pub debug: bool,

    /// Marker pair delimiting thinking blocks.
    pub markers: Markers,

    /// Time between frames of the thinking indicator.
    pub animation_interval: Duration,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - System prompt: [`DEFAULT_SYSTEM_PROMPT`]
    /// - Thinking: hidden
    /// - Color: enabled
    /// - Markers: `<think>` / `</think>`
    pub fn new() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            model: None,
            config_path: None,
            remove_thinking: true,
            use_color: true,
            debug: false,
            markers: Markers::default(),
            animation_interval: DEFAULT_INTERVAL,
        }
    }

    /// Sets the system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Sets the model override.
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn with_config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    /// Sets whether thinking blocks are hidden.
    pub fn with_remove_thinking(mut self, remove: bool) -> Self {
        self.remove_thinking = remove;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Sets the thinking markers.
    pub fn with_markers(mut self, markers: Markers) -> Self {
        self.markers = markers;
        self
    }

    pub fn with_animation_interval(mut self, interval: Duration) -> Self {
        self.animation_interval = interval;
        self
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<ChatArgs> for ChatConfig {
    type Error = Error;

    /// Fails only when the marker flags form an invalid pair.
    fn try_from(args: ChatArgs) -> Result<Self> {
        let markers = match (args.open_marker, args.close_marker) {
            (None, None) => Markers::default(),
            (open, close) => Markers::new(
                open.unwrap_or_else(|| DEFAULT_OPEN.to_string()),
                close.unwrap_or_else(|| DEFAULT_CLOSE.to_string()),
            )?,
        };
        Ok(ChatConfig {
            system_prompt: args
                .system
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            model: args.model,
            config_path: args.config.map(PathBuf::from),
            remove_thinking: !args.show_thinking,
            use_color: !args.no_color,
            debug: args.debug,
            markers,
            ..ChatConfig::new()
        })
    }
}
