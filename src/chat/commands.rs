//! Command parsing for the chat application.
//!
//! Session commands may be typed bare (`help`) or with a slash (`/help`).
//! Unknown slash commands are reported; unknown bare words are ordinary
//! messages for the model.

/// A parsed chat command.
///
/// These commands control the chat session and are not sent to the API.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    /// Display help information.
    Help,

    /// Show the conversation history.
    History,

    /// Clear the conversation history.
    Clear,

    /// Display session statistics.
    Stats,

    /// Hide (`false`) or show (`true`) thinking blocks.
    Thinking(bool),

    /// Change the model.
    Model(String),

    /// Set the system prompt; `None` restores the default.
    System(Option<String>),

    /// Exit the chat application.
    Quit,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for commands.
///
/// Returns `Some(ChatCommand)` if the input is a command,
/// or `None` if it should be treated as a regular message.
///
/// # Examples
///
/// ```
/// # use yaap::chat::{ChatCommand, parse_command};
/// assert_eq!(parse_command("quit"), Some(ChatCommand::Quit));
/// assert_eq!(parse_command("/thinking off"), Some(ChatCommand::Thinking(false)));
/// assert!(parse_command("Hello there!").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();
    let (slashed, body) = match input.strip_prefix('/') {
        Some(body) => (true, body),
        None => (false, input),
    };

    let mut parts = body.splitn(2, char::is_whitespace);
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match (command.as_str(), argument) {
        ("help" | "?", None) => ChatCommand::Help,
        ("history", None) => ChatCommand::History,
        ("clear", None) => ChatCommand::Clear,
        ("stats" | "status", None) => ChatCommand::Stats,
        ("quit" | "exit", None) => ChatCommand::Quit,
        ("q", None) if slashed => ChatCommand::Quit,
        ("thinking", argument) => match argument.and_then(parse_on_off) {
            Some(show) => ChatCommand::Thinking(show),
            None if slashed || argument.is_none() => {
                ChatCommand::Invalid("thinking expects 'on' or 'off'".to_string())
            }
            None => return None,
        },
        ("model", Some(model)) if slashed => ChatCommand::Model(model.to_string()),
        ("model", None) if slashed => {
            ChatCommand::Invalid("/model requires a model name".to_string())
        }
        ("system", prompt) if slashed => ChatCommand::System(prompt.map(str::to_string)),
        _ if slashed => ChatCommand::Invalid(format!("Unknown command: /{command}")),
        _ => return None,
    };

    Some(result)
}

fn parse_on_off(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "on" | "true" | "yes" | "show" => Some(true),
        "off" | "false" | "no" | "hide" => Some(false),
        _ => None,
    }
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands (with or without a leading /):
  help                   Show this help message
  history                Show conversation history
  clear                  Clear conversation history
  stats                  Show session statistics
  thinking on|off        Show or hide thinking blocks
  exit, quit             Exit the program
  /model <name>          Change the model
  /system [prompt]       Set system prompt (no argument restores the default)

Simply type your message and press Enter to chat!
Press Ctrl-C to interrupt a response, Ctrl-D to exit."#
}
