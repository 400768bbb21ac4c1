//! Terminal output for chat streaming.
//!
//! Two layers live here.  [`TerminalSink`] is the raw line-oriented terminal:
//! print in place and clear the current line.  [`Renderer`] is the chat-level
//! view built on top of a sink: response text, errors, informational messages.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use textwrap::{Options, WrapAlgorithm};

/// ANSI escape code for the soft light purple used for assistant text.
pub(crate) const ANSI_LIGHT_PURPLE: &str = "\x1b[38;5;183m";

/// ANSI escape code to reset all styling.
pub(crate) const ANSI_RESET: &str = "\x1b[0m";

/// Carriage return followed by ANSI "erase entire line".
const CLEAR_LINE: &str = "\r\x1b[2K";

/// Widest column count messages are wrapped to, however wide the terminal.
pub const MAX_WRAP_WIDTH: usize = 100;

/// Indent of continuation lines in error and info messages.
const NOTICE_INDENT: &str = "   ";

/// Width to wrap messages to: the terminal width, capped at [`MAX_WRAP_WIDTH`].
pub fn terminal_width() -> usize {
    textwrap::termwidth().min(MAX_WRAP_WIDTH)
}

/// Wraps `text` to `width` columns, indents included.
pub fn wrap_lines(
    text: &str,
    width: usize,
    initial_indent: &str,
    subsequent_indent: &str,
) -> Vec<String> {
    let options = Options::new(width.max(1))
        .initial_indent(initial_indent)
        .subsequent_indent(subsequent_indent)
        .wrap_algorithm(WrapAlgorithm::FirstFit);
    textwrap::wrap(text, options)
        .into_iter()
        .map(|line| line.into_owned())
        .collect()
}

fn notice(prefix: &str, message: &str, width: usize) -> String {
    wrap_lines(message, width.saturating_sub(4), prefix, NOTICE_INDENT).join("\n")
}

/// An error message as shown to the user, `[Error!] ` first.
pub fn format_error(message: &str, width: usize) -> String {
    notice("[Error!] ", message, width)
}

/// An informational message as shown to the user, `[Info] ` first.
pub fn format_info(message: &str, width: usize) -> String {
    notice("[Info] ", message, width)
}

///////////////////////////////////////////// Sinks /////////////////////////////////////////////

/// A terminal that accepts in-place text and line clears.
///
/// Writes must be visible in the order they are issued.  Implementations are
/// cloned into the animation task, so clones must share the same terminal.
pub trait TerminalSink: Send + 'static {
    /// Prints `text` without an implicit newline.
    fn print(&mut self, text: &str) -> io::Result<()>;

    /// Clears the current line and returns the cursor to its start.
    fn clear_line(&mut self) -> io::Result<()>;
}

/// Sink writing straight to stdout, flushing after every write.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdoutSink;

impl TerminalSink for StdoutSink {
    fn print(&mut self, text: &str) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        stdout.write_all(text.as_bytes())?;
        stdout.flush()
    }

    fn clear_line(&mut self) -> io::Result<()> {
        self.print(CLEAR_LINE)
    }
}

/// One operation recorded by a [`MemorySink`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkEvent {
    /// Text printed in place.
    Print(String),
    /// The current line was cleared.
    ClearLine,
}

#[derive(Debug, Default)]
struct MemorySinkInner {
    events: Vec<SinkEvent>,
    fail_after: Option<usize>,
}

/// In-memory sink that records every operation; clones share the record.
///
/// Useful for capturing output when stdout is not a terminal, and for tests.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    inner: Arc<Mutex<MemorySinkInner>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sink whose writes fail once `n` operations have succeeded.
    pub fn failing_after(n: usize) -> Self {
        let sink = Self::default();
        sink.lock().fail_after = Some(n);
        sink
    }

    /// A snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<SinkEvent> {
        self.lock().events.clone()
    }

    /// Number of line clears recorded.
    pub fn clear_count(&self) -> usize {
        self.lock()
            .events
            .iter()
            .filter(|event| matches!(event, SinkEvent::ClearLine))
            .count()
    }

    /// All printed text concatenated, ignoring clears.
    pub fn printed(&self) -> String {
        self.lock()
            .events
            .iter()
            .filter_map(|event| match event {
                SinkEvent::Print(text) => Some(text.as_str()),
                SinkEvent::ClearLine => None,
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemorySinkInner> {
        // A panic while holding the lock leaves the record usable.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, event: SinkEvent) -> io::Result<()> {
        let mut inner = self.lock();
        if inner.fail_after.is_some_and(|n| inner.events.len() >= n) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"));
        }
        inner.events.push(event);
        Ok(())
    }
}

impl TerminalSink for MemorySink {
    fn print(&mut self, text: &str) -> io::Result<()> {
        self.record(SinkEvent::Print(text.to_string()))
    }

    fn clear_line(&mut self) -> io::Result<()> {
        self.record(SinkEvent::ClearLine)
    }
}

/////////////////////////////////////////// Renderers ///////////////////////////////////////////

/// Trait for rendering chat output.
///
/// This abstraction allows for different rendering strategies:
/// - Plain text with ANSI styling
/// - Plain text without styling (for piping/redirecting)
/// - Capturing output in memory
pub trait Renderer: Send {
    /// Print a chunk of visible response text.
    ///
    /// This is called incrementally as text is released by the postprocessor.
    fn print_text(&mut self, text: &str);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Called when a response is complete.
    ///
    /// Used to ensure proper newlines and cleanup after streaming.
    fn finish_response(&mut self);

    /// Called when the stream is interrupted by the user.
    fn print_interrupted(&mut self) {}

    /// Called before the thinking indicator takes over the terminal line.
    ///
    /// The indicator redraws from column zero, so a renderer mid-line should
    /// move to a fresh line and drop any open styling.
    fn begin_block(&mut self) {}
}

/// Plain text renderer with optional ANSI styling.
///
/// Response text goes to the sink in light purple; errors go to stderr.
pub struct PlainTextRenderer<S: TerminalSink = StdoutSink> {
    sink: S,
    use_color: bool,
    styled: bool,
    line_start: bool,
    width: usize,
}

impl PlainTextRenderer<StdoutSink> {
    /// Creates a new PlainTextRenderer on stdout with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_sink(StdoutSink, true)
    }

    /// Creates a new PlainTextRenderer on stdout with the given color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self::with_sink(StdoutSink, use_color)
    }
}

impl<S: TerminalSink> PlainTextRenderer<S> {
    /// Creates a renderer writing to `sink`.
    pub fn with_sink(sink: S, use_color: bool) -> Self {
        Self {
            sink,
            use_color,
            styled: false,
            line_start: true,
            width: terminal_width(),
        }
    }

    /// Wraps errors and informational messages to `width` columns.
    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }

    fn write(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        // Rendering is best effort; a closed stdout surfaces through readline.
        let _ = self.sink.print(text);
        self.line_start = text.ends_with('\n');
    }

    fn reset_style(&mut self) {
        if self.styled {
            self.write(ANSI_RESET);
            self.styled = false;
        }
    }
}

impl Default for PlainTextRenderer<StdoutSink> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: TerminalSink> Renderer for PlainTextRenderer<S> {
    fn print_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if self.use_color && !self.styled {
            self.write(ANSI_LIGHT_PURPLE);
            self.styled = true;
        }
        self.write(text);
    }

    fn print_error(&mut self, error: &str) {
        self.reset_style();
        eprintln!("\n{}", format_error(error, self.width));
        self.line_start = true;
    }

    fn print_info(&mut self, info: &str) {
        self.reset_style();
        if !self.line_start {
            self.write("\n");
        }
        let info = format_info(info, self.width);
        self.write(&format!("{info}\n"));
    }

    fn finish_response(&mut self) {
        self.reset_style();
        self.write("\n");
    }

    fn print_interrupted(&mut self) {
        self.reset_style();
        self.write("\n[interrupted]\n");
    }

    fn begin_block(&mut self) {
        self.reset_style();
        if !self.line_start {
            self.write("\n");
        }
    }
}
