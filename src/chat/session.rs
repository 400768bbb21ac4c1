//! Core chat session management.
//!
//! This module provides the `ChatSession` struct which manages conversation
//! state and streams responses through the thinking filter.

use std::fmt;
use std::time::{Duration, Instant};

use futures::stream;
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::debug;

use crate::animation::ThinkingAnimation;
use crate::chat::config::ChatConfig;
use crate::client::{ChunkStream, LlmClient};
use crate::error::Result;
use crate::render::{Renderer, StdoutSink, TerminalSink, wrap_lines};
use crate::stream::{Interrupt, StreamOrchestrator, StreamResponse};
use crate::thinking::StreamPostprocessor;
use crate::types::{Message, MessageRole};

const RULE: &str = "==================================================";

/// Where responses come from.
#[async_trait::async_trait]
pub trait ResponseSource: Send + Sync {
    /// Name of the model answering, for display.
    fn model(&self) -> String;

    /// Switches model.  Returns false when the source has no model to switch.
    fn set_model(&mut self, model: &str) -> bool;

    /// Starts a streamed response to `messages`.
    async fn stream(&self, messages: &[Message]) -> Result<ChunkStream>;
}

#[async_trait::async_trait]
impl ResponseSource for LlmClient {
    fn model(&self) -> String {
        LlmClient::model(self).to_string()
    }

    fn set_model(&mut self, model: &str) -> bool {
        LlmClient::set_model(self, model);
        true
    }

    async fn stream(&self, messages: &[Message]) -> Result<ChunkStream> {
        self.generate_stream(messages).await
    }
}

/// Canned replies used when no API is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct OfflineResponder;

impl OfflineResponder {
    /// Picks a reply by the character count of `input`.
    pub fn reply(input: &str) -> String {
        match input.chars().count() % 5 {
            0 => format!("I'm an AI assistant, I'm ready to help! You said: '{input}'"),
            1 => "That's interesting! I'm still learning, but I appreciate you sharing that."
                .to_string(),
            2 => format!(
                "I understand you're asking about '{input}'. As a simple AI, I'm here to assist you."
            ),
            3 => "Thank you for your message. I'm an AI assistant ready to help with your questions."
                .to_string(),
            _ => format!("I see you mentioned '{input}'. I'm here to help however I can!"),
        }
    }
}

#[async_trait::async_trait]
impl ResponseSource for OfflineResponder {
    fn model(&self) -> String {
        "offline".to_string()
    }

    fn set_model(&mut self, _: &str) -> bool {
        false
    }

    async fn stream(&self, messages: &[Message]) -> Result<ChunkStream> {
        let input = messages
            .iter()
            .rev()
            .find(|message| message.role == MessageRole::User)
            .map(|message| message.content.as_str())
            .unwrap_or("");
        let words: Vec<Result<String>> = Self::reply(input)
            .split_inclusive(' ')
            .map(|word| Ok(word.to_string()))
            .collect();
        Ok(Box::pin(stream::iter(words)))
    }
}

/// One message of the conversation, stamped with when it was added.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: OffsetDateTime,
}

impl HistoryEntry {
    fn now(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc()),
        }
    }

    /// `[n] HH:MM:SS - ROLE:` header for position `n` (1-based).
    pub fn header(&self, n: usize) -> String {
        let clock = self
            .timestamp
            .format(format_description!("[hour]:[minute]:[second]"))
            .unwrap_or_else(|_| "--:--:--".to_string());
        format!(
            "[{n}] {clock} - {}:",
            self.role.as_str().to_ascii_uppercase()
        )
    }
}

/// A chat session that manages conversation state and API interactions.
///
/// The session maintains message history and streams responses from its
/// [`ResponseSource`], hiding thinking blocks as configured.
pub struct ChatSession {
    source: Box<dyn ResponseSource>,
    offline: bool,
    config: ChatConfig,
    history: Vec<HistoryEntry>,
    started: Instant,
    request_count: u64,
    thinking_blocks: u64,
}

/// Aggregated stats for a chat session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStats {
    /// The model answering, or `offline`.
    pub model: String,
    /// The number of messages in the conversation.
    pub message_count: usize,
    /// Total number of responses requested.
    pub requests: u64,
    /// Thinking blocks hidden across all responses.
    pub thinking_blocks: u64,
    /// Time since the session started.
    pub duration: Duration,
    /// Whether thinking blocks are hidden.
    pub remove_thinking: bool,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Model: {}", self.model)?;
        writeln!(f, "Messages: {}", self.message_count)?;
        writeln!(f, "Requests: {}", self.requests)?;
        writeln!(f, "Thinking blocks hidden: {}", self.thinking_blocks)?;
        writeln!(
            f,
            "Thinking: {}",
            if self.remove_thinking { "hidden" } else { "shown" }
        )?;
        write!(f, "Duration: {}", format_duration(self.duration))
    }
}

impl ChatSession {
    /// Creates a session answering from `client`, or offline when `None`.
    pub fn new(client: Option<LlmClient>, config: ChatConfig) -> Self {
        match client {
            Some(client) => Self::with_source(Box::new(client), config),
            None => {
                let mut session = Self::with_source(Box::new(OfflineResponder), config);
                session.offline = true;
                session
            }
        }
    }

    /// Creates a session with a custom response source.
    pub fn with_source(source: Box<dyn ResponseSource>, config: ChatConfig) -> Self {
        Self {
            source,
            offline: false,
            config,
            history: Vec::new(),
            started: Instant::now(),
            request_count: 0,
            thinking_blocks: 0,
        }
    }

    /// True when answering with canned replies.
    pub fn is_offline(&self) -> bool {
        self.offline
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Sends a user message and streams the response to stdout.
    pub async fn send_streaming(
        &mut self,
        user_input: &str,
        renderer: &mut dyn Renderer,
        interrupt: Option<&Interrupt>,
    ) -> Result<StreamResponse> {
        self.send_streaming_with_sink(user_input, renderer, interrupt, StdoutSink)
            .await
    }

    /// Sends a user message and streams the response, drawing the thinking
    /// indicator on `sink`.
    ///
    /// This method:
    /// 1. Adds the user message to history
    /// 2. Streams the response through a fresh orchestrator
    /// 3. Adds the visible assistant text to history
    ///
    /// # Errors
    ///
    /// Returns the source error, or an abort error on interrupt.  History is
    /// left as it was before the call.
    pub async fn send_streaming_with_sink<S: TerminalSink + Clone>(
        &mut self,
        user_input: &str,
        renderer: &mut dyn Renderer,
        interrupt: Option<&Interrupt>,
        sink: S,
    ) -> Result<StreamResponse> {
        let previous_len = self.history.len();
        let messages = self.request_messages(user_input);
        self.history
            .push(HistoryEntry::now(MessageRole::User, user_input));
        self.request_count += 1;
        debug!(
            messages = messages.len(),
            model = %self.source.model(),
            "sending turn"
        );

        let source = match self.source.stream(&messages).await {
            Ok(source) => source,
            Err(err) => {
                self.history.truncate(previous_len);
                return Err(err);
            }
        };

        let orchestrator = StreamOrchestrator::new(
            StreamPostprocessor::new(self.config.markers.clone(), self.config.remove_thinking),
            ThinkingAnimation::new(sink)
                .with_color(self.config.use_color)
                .with_interval(self.config.animation_interval),
        );
        match orchestrator.run(source, renderer, interrupt).await {
            Ok(response) => {
                if let Some(err) = &response.animation_error {
                    renderer.print_error(&err.to_string());
                }
                self.thinking_blocks += response.thinking_blocks as u64;
                self.history
                    .push(HistoryEntry::now(MessageRole::Assistant, &response.text));
                Ok(response)
            }
            Err(failure) => {
                if let Some(err) = &failure.animation_error {
                    renderer.print_error(&err.to_string());
                }
                self.history.truncate(previous_len);
                Err(failure.error)
            }
        }
    }

    /// System prompt, history, then the new input.
    fn request_messages(&self, user_input: &str) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(Message::system(&self.config.system_prompt));
        messages.extend(
            self.history
                .iter()
                .map(|entry| Message::new(entry.role, &entry.content)),
        );
        messages.push(Message::user(user_input));
        messages
    }

    /// Clears the conversation history.
    pub fn clear(&mut self) {
        self.history.clear();
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Returns the number of messages in the conversation.
    pub fn message_count(&self) -> usize {
        self.history.len()
    }

    /// The conversation rendered for display, wrapped to `width` columns.
    ///
    /// User messages are indented by two spaces.
    pub fn history_lines(&self, width: usize) -> Vec<String> {
        if self.history.is_empty() {
            return vec!["No conversation history yet.".to_string()];
        }
        let mut lines = vec![
            RULE.to_string(),
            "CONVERSATION HISTORY".to_string(),
            RULE.to_string(),
        ];
        for (idx, entry) in self.history.iter().enumerate() {
            lines.push(String::new());
            lines.push(entry.header(idx + 1));
            let indent = match entry.role {
                MessageRole::User => "  ",
                _ => "",
            };
            lines.extend(wrap_lines(&entry.content, width, indent, indent));
        }
        lines.push(RULE.to_string());
        lines
    }

    /// Returns the current model.
    pub fn model(&self) -> String {
        self.source.model()
    }

    /// Changes the model used for responses.  Returns false when offline.
    pub fn set_model(&mut self, model: &str) -> bool {
        self.source.set_model(model)
    }

    /// Sets the system prompt; `None` restores the default.
    pub fn set_system_prompt(&mut self, prompt: Option<String>) {
        self.config.system_prompt = prompt.unwrap_or_else(|| ChatConfig::new().system_prompt);
    }

    pub fn system_prompt(&self) -> &str {
        &self.config.system_prompt
    }

    /// Sets whether thinking blocks are hidden in later responses.
    pub fn set_remove_thinking(&mut self, remove: bool) {
        self.config.remove_thinking = remove;
    }

    pub fn remove_thinking(&self) -> bool {
        self.config.remove_thinking
    }

    /// Returns the current session statistics snapshot.
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            model: self.model(),
            message_count: self.message_count(),
            requests: self.request_count,
            thinking_blocks: self.thinking_blocks,
            duration: self.started.elapsed(),
            remove_thinking: self.config.remove_thinking,
        }
    }

    /// Farewell text shown on exit.
    pub fn summary(&self) -> String {
        format!(
            "Session Summary:\nDuration: {}\nMessages exchanged: {}\nThank you for using YAAP!",
            format_duration(self.started.elapsed()),
            self.message_count()
        )
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}m {}s", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::error::Error;
    use crate::render::{MemorySink, PlainTextRenderer};

    /// Replays scripted chunk lists and records the requests it saw.
    struct Scripted {
        replies: Mutex<Vec<Vec<Result<String>>>>,
        seen: Arc<Mutex<Vec<Vec<Message>>>>,
    }

    impl Scripted {
        fn new(replies: Vec<Vec<Result<String>>>) -> (Self, Arc<Mutex<Vec<Vec<Message>>>>) {
            let seen = Arc::new(Mutex::new(Vec::new()));
            let source = Self {
                replies: Mutex::new(replies.into_iter().rev().collect()),
                seen: Arc::clone(&seen),
            };
            (source, seen)
        }
    }

    #[async_trait::async_trait]
    impl ResponseSource for Scripted {
        fn model(&self) -> String {
            "scripted".to_string()
        }

        fn set_model(&mut self, _: &str) -> bool {
            false
        }

        async fn stream(&self, messages: &[Message]) -> Result<ChunkStream> {
            self.seen.lock().unwrap().push(messages.to_vec());
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| Error::connection("no more replies", None))?;
            Ok(Box::pin(stream::iter(reply)))
        }
    }

    fn ok(parts: &[&str]) -> Vec<Result<String>> {
        parts.iter().map(|p| Ok(p.to_string())).collect()
    }

    fn config() -> ChatConfig {
        ChatConfig::new().without_color()
    }

    #[test]
    fn new_session_empty() {
        let session = ChatSession::new(None, config());
        assert!(session.is_offline());
        assert_eq!(session.message_count(), 0);
        assert_eq!(session.model(), "offline");
        assert_eq!(session.history_lines(80), ["No conversation history yet."]);
    }

    #[test]
    fn offline_reply_selection() {
        assert_eq!(
            OfflineResponder::reply("hello"),
            "I'm an AI assistant, I'm ready to help! You said: 'hello'"
        );
        assert!(OfflineResponder::reply("h").starts_with("That's interesting!"));
        assert!(OfflineResponder::reply("hi").contains("asking about 'hi'"));
        assert!(OfflineResponder::reply("hey").starts_with("Thank you"));
        assert!(OfflineResponder::reply("heya").contains("mentioned 'heya'"));
    }

    #[tokio::test(start_paused = true)]
    async fn offline_turn_is_recorded() {
        let sink = MemorySink::new();
        let mut renderer = PlainTextRenderer::with_sink(sink.clone(), false);
        let mut session = ChatSession::new(None, config());
        let response = session
            .send_streaming_with_sink("hello", &mut renderer, None, sink.clone())
            .await
            .unwrap();
        assert_eq!(
            response.text,
            "I'm an AI assistant, I'm ready to help! You said: 'hello'"
        );
        assert_eq!(sink.printed(), format!("{}\n", response.text));
        assert_eq!(session.message_count(), 2);
        assert_eq!(session.history()[0].role, MessageRole::User);
        assert_eq!(session.history()[1].content, response.text);
        assert_eq!(session.stats().requests, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn thinking_is_hidden_and_counted() {
        let (source, seen) = Scripted::new(vec![ok(&["<think>hmm", "</think>", "Four."])]);
        let sink = MemorySink::new();
        let mut renderer = PlainTextRenderer::with_sink(sink.clone(), false);
        let mut session = ChatSession::with_source(Box::new(source), config());
        let response = session
            .send_streaming_with_sink("2+2?", &mut renderer, None, sink.clone())
            .await
            .unwrap();
        assert_eq!(response.text, "Four.");
        assert_eq!(session.stats().thinking_blocks, 1);
        assert_eq!(sink.clear_count(), 1);

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].len(), 2);
        assert_eq!(seen[0][0].role, MessageRole::System);
        assert_eq!(seen[0][1], Message::user("2+2?"));
    }

    #[tokio::test(start_paused = true)]
    async fn history_is_sent_with_later_turns() {
        let (source, seen) = Scripted::new(vec![ok(&["one"]), ok(&["two"])]);
        let sink = MemorySink::new();
        let mut renderer = PlainTextRenderer::with_sink(sink.clone(), false);
        let mut session = ChatSession::with_source(Box::new(source), config());
        session
            .send_streaming_with_sink("first", &mut renderer, None, sink.clone())
            .await
            .unwrap();
        session
            .send_streaming_with_sink("second", &mut renderer, None, sink.clone())
            .await
            .unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(
            seen[1][1..],
            [
                Message::user("first"),
                Message::assistant("one"),
                Message::user("second"),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_turn_restores_history() {
        let (source, _) = Scripted::new(vec![vec![
            Ok("partial ".to_string()),
            Err(Error::streaming("dropped", None)),
        ]]);
        let sink = MemorySink::new();
        let mut renderer = PlainTextRenderer::with_sink(sink.clone(), false);
        let mut session = ChatSession::with_source(Box::new(source), config());
        let err = session
            .send_streaming_with_sink("hi", &mut renderer, None, sink.clone())
            .await
            .unwrap_err();
        assert!(err.is_streaming());
        assert_eq!(session.message_count(), 0);

        // The source is now exhausted; connection failures restore history too.
        let err = session
            .send_streaming_with_sink("again", &mut renderer, None, sink.clone())
            .await
            .unwrap_err();
        assert!(err.is_connection());
        assert_eq!(session.message_count(), 0);
        assert_eq!(session.stats().requests, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn show_thinking_passes_markup_through() {
        let (source, _) = Scripted::new(vec![ok(&["<think>x</think>y"])]);
        let sink = MemorySink::new();
        let mut renderer = PlainTextRenderer::with_sink(sink.clone(), false);
        let mut session = ChatSession::with_source(Box::new(source), config());
        session.set_remove_thinking(false);
        let response = session
            .send_streaming_with_sink("q", &mut renderer, None, sink.clone())
            .await
            .unwrap();
        assert_eq!(response.text, "<think>x</think>y");
        assert!(!session.stats().remove_thinking);
    }

    #[tokio::test(start_paused = true)]
    async fn history_lines_format() {
        let sink = MemorySink::new();
        let mut renderer = PlainTextRenderer::with_sink(sink.clone(), false);
        let mut session = ChatSession::new(None, config());
        session
            .send_streaming_with_sink("h", &mut renderer, None, sink.clone())
            .await
            .unwrap();
        let lines = session.history_lines(80);
        let text = lines.join("\n");
        assert_eq!(lines[1], "CONVERSATION HISTORY");
        assert!(lines[4].starts_with("[1] "), "{text}");
        assert!(lines[4].ends_with(" - USER:"), "{text}");
        assert_eq!(lines[5], "  h");
        assert!(lines[7].ends_with(" - ASSISTANT:"), "{text}");
        assert!(lines[8].starts_with("That's interesting!"));

        session.clear();
        assert_eq!(session.message_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn history_lines_wrap_to_width() {
        let sink = MemorySink::new();
        let mut renderer = PlainTextRenderer::with_sink(sink.clone(), false);
        let mut session = ChatSession::new(None, config());
        // 33 characters selects the "Thank you for your message" reply.
        let input = "please wrap this long user line!!";
        session
            .send_streaming_with_sink(input, &mut renderer, None, sink.clone())
            .await
            .unwrap();
        let lines = session.history_lines(20);
        assert_eq!(lines[5..7], ["  please wrap this", "  long user line!!"]);
        assert!(lines[8].ends_with(" - ASSISTANT:"));
        assert_eq!(lines[9..11], ["Thank you for your", "message. I'm an AI"]);
    }

    #[test]
    fn system_prompt_reset() {
        let mut session = ChatSession::new(None, config());
        session.set_system_prompt(Some("Be brief".to_string()));
        assert_eq!(session.system_prompt(), "Be brief");
        session.set_system_prompt(None);
        assert!(session.system_prompt().starts_with("You are YAAP"));
        assert!(!session.set_model("other"));
    }

    #[test]
    fn summary_and_stats_text() {
        let session = ChatSession::new(None, config());
        let summary = session.summary();
        assert!(summary.contains("Duration: 0m 0s"));
        assert!(summary.contains("Messages exchanged: 0"));
        let stats = session.stats().to_string();
        assert!(stats.contains("Model: offline"));
        assert!(stats.contains("Thinking: hidden"));
    }
}
