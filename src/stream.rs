//! Driving a raw chunk stream through the thinking filter to the terminal.

use std::fmt;
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::{Stream, StreamExt};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::animation::ThinkingAnimation;
use crate::error::{Error, Result};
use crate::observability::{
    STREAM_BYTES, STREAM_CHUNKS, STREAM_DURATION, STREAM_ERRORS, STREAM_INTERRUPTS,
    THINKING_BLOCKS,
};
use crate::render::{Renderer, TerminalSink};
use crate::thinking::{ProcessedChunk, Segment, StreamPostprocessor, Transition};

/////////////////////////////////////////// Interrupt ///////////////////////////////////////////

/// A user interrupt shared between a signal handler and the streaming loop.
///
/// Clones share the same flag.  `trigger` is safe to call from any thread,
/// including a `ctrlc` handler.
#[derive(Clone, Debug, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the interrupt and wakes every waiter.
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Lowers the interrupt; call before each turn.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Completes once the interrupt has been raised.
    pub async fn triggered(&self) {
        loop {
            let notified = self.notify.notified();
            let mut notified = pin!(notified);
            // Register before checking the flag so a trigger in between is not lost.
            notified.as_mut().enable();
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }
}

//////////////////////////////////////////// Outcomes ///////////////////////////////////////////

/// A response that streamed to completion.
#[derive(Debug)]
pub struct StreamResponse {
    /// All visible text, as rendered.
    pub text: String,
    /// Outermost thinking blocks hidden from the user.
    pub thinking_blocks: usize,
    /// A failure of the thinking indicator, if one happened.
    pub animation_error: Option<Error>,
}

/// A response that ended early because of a source error or an interrupt.
#[derive(Debug)]
pub struct StreamFailure {
    pub error: Error,
    /// Visible text rendered before the failure.
    pub partial: String,
    pub animation_error: Option<Error>,
}

impl fmt::Display for StreamFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for StreamFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<StreamFailure> for Error {
    fn from(failure: StreamFailure) -> Self {
        failure.error
    }
}

////////////////////////////////////////// Orchestrator /////////////////////////////////////////

/// Streams one response: raw chunks in, rendered text and animation out.
///
/// An orchestrator serves a single response; `run` consumes it.  Dropping the
/// `run` future part way drops the animation with it, which stops its task.
pub struct StreamOrchestrator<S: TerminalSink + Clone> {
    postprocessor: StreamPostprocessor,
    animation: ThinkingAnimation<S>,
}

enum Step {
    Chunk(Option<Result<String>>),
    Interrupted,
}

impl<S: TerminalSink + Clone> StreamOrchestrator<S> {
    pub fn new(postprocessor: StreamPostprocessor, animation: ThinkingAnimation<S>) -> Self {
        Self {
            postprocessor,
            animation,
        }
    }

    /// Consumes `source` to its end, an error, or an interrupt.
    ///
    /// Text and block transitions are applied in the exact order the source
    /// produced them.  The thinking indicator is stopped on every exit path
    /// before this returns.
    pub async fn run<St, R>(
        mut self,
        source: St,
        renderer: &mut R,
        interrupt: Option<&Interrupt>,
    ) -> std::result::Result<StreamResponse, StreamFailure>
    where
        St: Stream<Item = Result<String>>,
        R: Renderer + ?Sized,
    {
        self.postprocessor.reset();
        self.animation.cleanup().await;

        let started = Instant::now();
        let mut source = pin!(source);
        let mut text = String::new();
        let mut thinking_blocks = 0;
        loop {
            let step = match interrupt {
                Some(interrupt) => tokio::select! {
                    biased;
                    _ = interrupt.triggered() => Step::Interrupted,
                    item = source.next() => Step::Chunk(item),
                },
                None => Step::Chunk(source.next().await),
            };
            match step {
                Step::Chunk(None) => break,
                Step::Chunk(Some(Ok(chunk))) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    STREAM_CHUNKS.click();
                    STREAM_BYTES.count(chunk.len() as u64);
                    let processed = self.postprocessor.process_chunk(&chunk);
                    thinking_blocks += self.apply(&processed, renderer, &mut text).await;
                }
                Step::Chunk(Some(Err(error))) => {
                    STREAM_ERRORS.click();
                    warn!(error = %error, partial_len = text.len(), "stream failed");
                    return Err(self.fail(error, text).await);
                }
                Step::Interrupted => {
                    STREAM_INTERRUPTS.click();
                    debug!(partial_len = text.len(), "stream interrupted");
                    let failure = self
                        .fail(Error::abort("response interrupted"), text)
                        .await;
                    renderer.print_interrupted();
                    return Err(failure);
                }
            }
        }

        let tail = self.postprocessor.finalize();
        if !tail.is_empty() {
            renderer.print_text(&tail);
            text.push_str(&tail);
        }
        self.animation.cleanup().await;
        renderer.finish_response();

        let elapsed = started.elapsed();
        STREAM_DURATION.add(elapsed.as_secs_f64());
        debug!(
            visible_len = text.len(),
            thinking_blocks,
            elapsed_ms = elapsed.as_millis() as u64,
            "stream complete"
        );
        Ok(StreamResponse {
            text,
            thinking_blocks,
            animation_error: self.animation.take_error(),
        })
    }

    /// Renders one processed chunk; returns the number of blocks entered.
    async fn apply<R: Renderer + ?Sized>(
        &mut self,
        processed: &ProcessedChunk,
        renderer: &mut R,
        text: &mut String,
    ) -> usize {
        let mut entered = 0;
        for segment in processed.segments() {
            match segment {
                Segment::Text(visible) => {
                    renderer.print_text(visible);
                    text.push_str(visible);
                }
                Segment::Transition(Transition::EnterBlock) => {
                    entered += 1;
                    THINKING_BLOCKS.click();
                    renderer.begin_block();
                    self.animation.enter();
                }
                Segment::Transition(Transition::ExitBlock) => {
                    self.animation.exit().await;
                }
            }
        }
        entered
    }

    async fn fail(&mut self, error: Error, partial: String) -> StreamFailure {
        self.animation.cleanup().await;
        self.postprocessor.reset();
        StreamFailure {
            error,
            partial,
            animation_error: self.animation.take_error(),
        }
    }
}
