//! Animated "thinking" indicator.
//!
//! [`ThinkingAnimation`] cycles a short ellipsis animation on the current
//! terminal line while the model is inside a thinking block.  The animation
//! runs as a child tokio task owned by the controller: `exit` cancels it and
//! waits for it to finish before clearing the line, so no frame can land after
//! the line has been cleared.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::Error;
use crate::observability::{ANIMATION_ERRORS, ANIMATION_STARTS};
use crate::render::{ANSI_LIGHT_PURPLE, ANSI_RESET, TerminalSink};

/// Frames shown while thinking, in order.
pub const DEFAULT_FRAMES: [&str; 6] = [
    "thinking",
    "thinking.",
    "thinking..",
    "thinking...",
    "thinking..",
    "thinking.",
];

/// Time between frames.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<io::Result<()>>,
}

/// Controller for the thinking indicator: `Idle → Running → Idle`.
pub struct ThinkingAnimation<S> {
    sink: S,
    frames: Arc<[String]>,
    width: usize,
    interval: Duration,
    use_color: bool,
    frame_index: Arc<AtomicUsize>,
    running: Option<Running>,
    error: Option<Error>,
}

impl<S: TerminalSink + Clone> ThinkingAnimation<S> {
    /// Creates an idle controller drawing on `sink`.
    pub fn new(sink: S) -> Self {
        let frames: Vec<String> = DEFAULT_FRAMES.iter().map(|f| f.to_string()).collect();
        Self {
            sink,
            width: frame_width(&frames),
            frames: frames.into(),
            interval: DEFAULT_INTERVAL,
            use_color: true,
            frame_index: Arc::new(AtomicUsize::new(0)),
            running: None,
            error: None,
        }
    }

    /// Replaces the frame sequence.  An empty sequence keeps the current one.
    pub fn with_frames<I, T>(mut self, frames: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let frames: Vec<String> = frames.into_iter().map(Into::into).collect();
        if !frames.is_empty() {
            self.width = frame_width(&frames);
            self.frames = frames.into();
        }
        self
    }

    /// Sets the time between frames.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Enables or disables ANSI colour on frames.
    pub fn with_color(mut self, use_color: bool) -> Self {
        self.use_color = use_color;
        self
    }

    /// True while the background task is alive.
    ///
    /// A task that died on a write failure no longer counts as active.
    pub fn is_active(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// Index of the frame most recently drawn.
    pub fn frame_index(&self) -> usize {
        self.frame_index.load(Ordering::Relaxed)
    }

    /// Starts the animation.  Does nothing if it is already running.
    ///
    /// Frame 0 is drawn before this returns.  If that write fails the
    /// controller stays idle and the failure is kept for [`Self::take_error`].
    pub fn enter(&mut self) {
        self.reap_finished();
        if self.running.is_some() {
            return;
        }
        self.frame_index.store(0, Ordering::Relaxed);
        let first = render_frame(&self.frames[0], self.width, self.use_color);
        if let Err(err) = self.sink.print(&first) {
            self.record_error(err);
            return;
        }
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(animate(
            self.sink.clone(),
            Arc::clone(&self.frames),
            self.width,
            self.interval,
            self.use_color,
            Arc::clone(&self.frame_index),
            cancel.clone(),
        ));
        ANIMATION_STARTS.click();
        debug!("thinking animation started");
        self.running = Some(Running { cancel, handle });
    }

    /// Stops the animation and clears the line.  Does nothing when idle.
    ///
    /// Returns only after the background task has finished.
    pub async fn exit(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.cancel.cancel();
        match running.handle.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => self.record_error(err),
            Err(join) => self.record_error(io::Error::other(format!(
                "animation task ended abnormally: {join}"
            ))),
        }
        if let Err(err) = self.sink.clear_line() {
            self.record_error(err);
        }
        debug!("thinking animation stopped");
    }

    /// Idempotent stop for error paths; same as [`Self::exit`].
    pub async fn cleanup(&mut self) {
        self.exit().await;
    }

    /// Takes the first failure seen since the last call, if any.
    pub fn take_error(&mut self) -> Option<Error> {
        self.error.take()
    }

    /// Moves to idle if the task already ended on its own, keeping its error
    /// and clearing the frame it left behind.
    fn reap_finished(&mut self) {
        if !self
            .running
            .as_ref()
            .is_some_and(|running| running.handle.is_finished())
        {
            return;
        }
        let Some(mut running) = self.running.take() else {
            return;
        };
        match (&mut running.handle).now_or_never() {
            Some(Ok(Err(err))) => self.record_error(err),
            Some(Err(join)) => self.record_error(io::Error::other(format!(
                "animation task ended abnormally: {join}"
            ))),
            Some(Ok(Ok(()))) | None => {}
        }
        if let Err(err) = self.sink.clear_line() {
            self.record_error(err);
        }
    }

    fn record_error(&mut self, err: io::Error) {
        ANIMATION_ERRORS.click();
        warn!(error = %err, "thinking animation failed");
        if self.error.is_none() {
            self.error = Some(Error::io(
                format!("thinking animation failed: {err}"),
                err,
            ));
        }
    }
}

/// Dropping a running controller cancels and aborts its task without
/// waiting.  On a multi-threaded runtime a frame already being written may
/// still land, and the line is not cleared; only [`ThinkingAnimation::exit`]
/// and [`ThinkingAnimation::cleanup`] guarantee that nothing is drawn after
/// they return.
impl<S> Drop for ThinkingAnimation<S> {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.cancel.cancel();
            running.handle.abort();
        }
    }
}

async fn animate<S: TerminalSink>(
    mut sink: S,
    frames: Arc<[String]>,
    width: usize,
    interval: Duration,
    use_color: bool,
    frame_index: Arc<AtomicUsize>,
    cancel: CancellationToken,
) -> io::Result<()> {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut index = 0;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            _ = ticker.tick() => {
                index = (index + 1) % frames.len();
                frame_index.store(index, Ordering::Relaxed);
                sink.print(&render_frame(&frames[index], width, use_color))?;
            }
        }
    }
}

/// Frames are padded to a common width so a shorter frame erases a longer one.
fn render_frame(frame: &str, width: usize, use_color: bool) -> String {
    if use_color {
        format!("\r{ANSI_LIGHT_PURPLE}{frame:<width$}{ANSI_RESET}")
    } else {
        format!("\r{frame:<width$}")
    }
}

fn frame_width(frames: &[String]) -> usize {
    frames
        .iter()
        .map(|frame| frame.chars().count())
        .max()
        .unwrap_or(0)
}
