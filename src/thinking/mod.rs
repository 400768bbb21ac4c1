//! Thinking-block classification for streamed model output.
//!
//! Models that "think out loud" wrap their reasoning in a marker pair such as
//! `<think>...</think>`.  This module separates that reasoning from the text
//! meant for the user:
//!
//! - [`MarkerScanner`] is the pure, incremental classifier.
//! - [`StreamPostprocessor`] carries scanner state across chunks of a stream.
//! - [`strip_thinking`] and [`extract_thinking`] work on complete responses.

mod markers;
mod postprocessor;
mod scanner;

pub use markers::{DEFAULT_CLOSE, DEFAULT_OPEN, Markers};
pub use postprocessor::{ProcessedChunk, Segment, StreamPostprocessor};
pub use scanner::{MarkerScanner, Scan, Transition, TransitionEvent};

use scanner::MarkerKind;

/// Separator placed between blocks by [`extract_thinking`].
pub const THINKING_BREAK: &str = "\n--- THINKING BREAK ---\n";

/// Removes every thinking block from a complete response.
///
/// Runs of three or more newlines left behind are collapsed to two and the
/// result is trimmed.
pub fn strip_thinking(text: &str, markers: &Markers) -> String {
    let mut postprocessor = StreamPostprocessor::new(markers.clone(), true);
    let mut visible = postprocessor.process_chunk(text).visible;
    visible.push_str(&postprocessor.finalize());
    collapse_blank_lines(&visible).trim().to_string()
}

/// Returns the contents of each outermost complete thinking block.
///
/// Blocks are trimmed and joined with [`THINKING_BREAK`].  Returns `None` when
/// the text holds no complete block.
pub fn extract_thinking(text: &str, markers: &Markers) -> Option<String> {
    let scanner = MarkerScanner::new(markers.clone());
    let mut blocks = Vec::new();
    let mut depth = 0usize;
    let mut block_start = 0;
    let mut matches = scanner.matches(text);
    while let Some((start, kind)) = matches.next() {
        match kind {
            MarkerKind::Open => {
                if depth == 0 {
                    block_start = matches.position();
                }
                depth += 1;
            }
            MarkerKind::Close if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    blocks.push(text[block_start..start].trim());
                }
            }
            MarkerKind::Close => {}
        }
    }
    if blocks.is_empty() {
        None
    } else {
        Some(blocks.join(THINKING_BREAK))
    }
}

fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut newlines = 0;
    for c in text.chars() {
        if c == '\n' {
            newlines += 1;
            if newlines > 2 {
                continue;
            }
        } else {
            newlines = 0;
        }
        out.push(c);
    }
    out
}
