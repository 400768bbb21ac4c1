//! Logging hook for LLM client operations.
//!
//! This module provides the [`ClientLogger`] trait that allows users to capture
//! every request and response passing through the [`LlmClient`](crate::LlmClient).

use crate::types::{ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse};

/// A trait for logging client operations.
///
/// Implement this trait to capture and record all API interactions,
/// including both non-streaming responses and individual streaming chunks.
pub trait ClientLogger: Send + Sync {
    /// Log a request just before it is first sent.
    ///
    /// Retries of the same request are not logged again.
    fn log_request(&self, request: &ChatCompletionRequest);

    /// Log a complete response from a non-streaming `generate` call.
    fn log_response(&self, response: &ChatCompletionResponse);

    /// Log an individual streaming chunk, before thinking is filtered out.
    fn log_stream_chunk(&self, chunk: &ChatCompletionChunk);
}

/// Logger that emits each interaction as a `tracing` event at TRACE level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingClientLogger;

impl ClientLogger for TracingClientLogger {
    fn log_request(&self, request: &ChatCompletionRequest) {
        tracing::trace!(
            model = %request.model,
            messages = request.messages.len(),
            stream = request.stream,
            tools = request.tools.as_ref().map_or(0, Vec::len),
            "chat completion request"
        );
    }

    fn log_response(&self, response: &ChatCompletionResponse) {
        tracing::trace!(
            id = %response.id,
            model = %response.model,
            finish_reason = response.finish_reason().unwrap_or("none"),
            content_len = response.content().len(),
            "chat completion response"
        );
    }

    fn log_stream_chunk(&self, chunk: &ChatCompletionChunk) {
        tracing::trace!(
            id = %chunk.id,
            content = chunk.content().unwrap_or(""),
            "chat completion chunk"
        );
    }
}
