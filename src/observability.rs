use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("yaap.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("yaap.client.request_errors");
pub(crate) static CLIENT_REQUEST_RETRIES: Counter = Counter::new("yaap.client.retries");
pub(crate) static CLIENT_RETRY_BACKOFF: Moments = Moments::new("yaap.client.retry_backoff_seconds");

pub(crate) static STREAM_CHUNKS: Counter = Counter::new("yaap.stream.chunks");
pub(crate) static STREAM_BYTES: Counter = Counter::new("yaap.stream.bytes");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("yaap.stream.errors");
pub(crate) static STREAM_INTERRUPTS: Counter = Counter::new("yaap.stream.interrupts");
pub(crate) static STREAM_DURATION: Moments = Moments::new("yaap.stream.duration_seconds");

pub(crate) static THINKING_BLOCKS: Counter = Counter::new("yaap.thinking.blocks");
pub(crate) static ANIMATION_STARTS: Counter = Counter::new("yaap.animation.starts");
pub(crate) static ANIMATION_ERRORS: Counter = Counter::new("yaap.animation.errors");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_counter(&CLIENT_REQUEST_RETRIES);
    collector.register_moments(&CLIENT_RETRY_BACKOFF);

    collector.register_counter(&STREAM_CHUNKS);
    collector.register_counter(&STREAM_BYTES);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_INTERRUPTS);
    collector.register_moments(&STREAM_DURATION);

    collector.register_counter(&THINKING_BLOCKS);
    collector.register_counter(&ANIMATION_STARTS);
    collector.register_counter(&ANIMATION_ERRORS);
}
