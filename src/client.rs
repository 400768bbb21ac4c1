use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use futures::stream::StreamExt;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::client_logger::ClientLogger;
use crate::config::LlmConfig;
use crate::error::{Error, Result};
use crate::observability::{
    CLIENT_REQUEST_ERRORS, CLIENT_REQUEST_RETRIES, CLIENT_REQUESTS, CLIENT_RETRY_BACKOFF,
};
use crate::sse::process_sse;
use crate::thinking::{Markers, extract_thinking, strip_thinking};
use crate::tools::ToolRegistry;
use crate::types::{ChatCompletionRequest, ChatCompletionResponse, Message, Usage};

/// First retry delay; doubled on each further attempt.
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Upper bound on any single retry delay.
const MAX_BACKOFF: Duration = Duration::from_secs(8);

/// Upper bound on a server-requested `Retry-After` delay.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Raw text chunks of a streamed response, thinking markup included.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A complete, non-streamed response.
#[derive(Clone, Debug, PartialEq)]
pub struct LlmResponse {
    /// Response text; thinking blocks are removed when postprocessing is on.
    pub content: String,
    pub model: String,
    pub finish_reason: Option<String>,
    pub usage: Option<Usage>,
    /// Contents of the thinking blocks the model produced, if any.
    pub thinking: Option<String>,
}

/// Client for OpenAI-compatible chat-completions APIs.
#[derive(Clone)]
pub struct LlmClient {
    config: LlmConfig,
    endpoint: Url,
    client: ReqwestClient,
    tools: Arc<ToolRegistry>,
    logger: Option<Arc<dyn ClientLogger>>,
    postprocess: bool,
    markers: Markers,
}

impl LlmClient {
    /// Create a new client.  The configuration is validated first.
    pub fn new(config: LlmConfig) -> Result<Self> {
        config.validate()?;
        let endpoint = config.endpoint()?;
        let client = ReqwestClient::builder()
            .timeout(config.timeout_duration())
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {e}"),
                    Some(Box::new(e)),
                )
            })?;
        Ok(Self {
            config,
            endpoint,
            client,
            tools: Arc::new(ToolRegistry::new()),
            logger: None,
            postprocess: true,
            markers: Markers::default(),
        })
    }

    /// Advertise the tools of `registry` with every request.
    pub fn with_tools(mut self, registry: ToolRegistry) -> Self {
        self.tools = Arc::new(registry);
        self
    }

    /// Attach a logger that sees every request, response and chunk.
    pub fn with_logger(mut self, logger: Arc<dyn ClientLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Whether `generate` strips thinking blocks from its content.
    pub fn with_postprocessing(mut self, enabled: bool) -> Self {
        self.postprocess = enabled;
        self
    }

    pub fn with_markers(mut self, markers: Markers) -> Self {
        self.markers = markers;
        self
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn set_postprocessing(&mut self, enabled: bool) {
        self.postprocess = enabled;
    }

    /// Change the model used for later requests.
    pub fn set_model(&mut self, model: impl Into<String>) {
        self.config.model = model.into();
    }

    /// Send `messages` and wait for the whole response.
    pub async fn generate(&self, messages: &[Message]) -> Result<LlmResponse> {
        let request = self.request(messages, false);
        let response = self
            .send_with_retries(&request, "application/json")
            .await?;
        let response: ChatCompletionResponse = response.json().await.map_err(|e| {
            Error::serialization(format!("Failed to parse response: {e}"), Some(Box::new(e)))
        })?;
        if let Some(logger) = &self.logger {
            logger.log_response(&response);
        }

        let raw = response.content();
        let thinking = extract_thinking(raw, &self.markers);
        let content = if self.postprocess {
            strip_thinking(raw, &self.markers)
        } else {
            raw.to_string()
        };
        Ok(LlmResponse {
            content,
            model: response.model.clone(),
            finish_reason: response.finish_reason().map(str::to_string),
            usage: response.usage,
            thinking,
        })
    }

    /// Send `messages` and stream the response text as it arrives.
    ///
    /// Chunks are the raw `delta.content` fragments; thinking markup is left
    /// in place for the caller's postprocessor.  Establishing the connection
    /// is retried; a failure after the first byte is not.
    pub async fn generate_stream(&self, messages: &[Message]) -> Result<ChunkStream> {
        let request = self.request(messages, true);
        let response = self
            .send_with_retries(&request, "text/event-stream")
            .await?;
        let logger = self.logger.clone();
        let chunks = process_sse(response.bytes_stream()).filter_map(move |chunk| {
            let logger = logger.clone();
            async move {
                match chunk {
                    Ok(chunk) => {
                        if let Some(logger) = &logger {
                            logger.log_stream_chunk(&chunk);
                        }
                        chunk.content().map(|content| Ok(content.to_string()))
                    }
                    Err(err) => Some(Err(err)),
                }
            }
        });
        Ok(Box::pin(chunks))
    }

    fn request(&self, messages: &[Message], stream: bool) -> ChatCompletionRequest {
        ChatCompletionRequest::from_config(&self.config, messages.to_vec())
            .with_stream(stream)
            .with_tools(self.tools.to_openai_format())
    }

    /// Create and return default headers for API requests.
    fn default_headers(&self, accept: &'static str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static(accept));
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.config.api_key))
            .map_err(|_| {
                Error::configuration(
                    "API key contains characters not allowed in a header",
                    Some("api_key".to_string()),
                )
            })?;
        headers.insert(header::AUTHORIZATION, bearer);
        Ok(headers)
    }

    async fn send_with_retries(
        &self,
        request: &ChatCompletionRequest,
        accept: &'static str,
    ) -> Result<Response> {
        if let Some(logger) = &self.logger {
            logger.log_request(request);
        }
        let headers = self.default_headers(accept)?;
        let mut attempt = 0;
        loop {
            CLIENT_REQUESTS.click();
            debug!(
                endpoint = %self.endpoint,
                model = %request.model,
                stream = request.stream,
                attempt,
                "sending chat completion request"
            );
            let err = match self.send_once(request, headers.clone()).await {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };
            CLIENT_REQUEST_ERRORS.click();
            if !err.is_retryable() || attempt >= self.config.max_retries {
                return Err(err);
            }
            let delay = retry_delay(attempt, &err);
            CLIENT_REQUEST_RETRIES.click();
            CLIENT_RETRY_BACKOFF.add(delay.as_secs_f64());
            warn!(error = %err, attempt, delay_ms = delay.as_millis() as u64, "retrying request");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn send_once(
        &self,
        request: &ChatCompletionRequest,
        headers: HeaderMap,
    ) -> Result<Response> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .headers(headers)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::timeout(
                        format!("Request timed out: {e}"),
                        Some(self.config.timeout_duration().as_secs_f64()),
                    )
                } else if e.is_connect() {
                    Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
                } else {
                    Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
                }
            })?;

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }
        Ok(response)
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        let status_code = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.trim().parse::<u64>().ok());
        match response.text().await {
            Ok(body) => map_status(status_code, &body, retry_after),
            Err(e) => Error::http_client(
                format!("Failed to read error response: {e}"),
                Some(Box::new(e)),
            ),
        }
    }
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("model", &self.config.model)
            .field("tools", &self.tools.list())
            .field("postprocess", &self.postprocess)
            .finish_non_exhaustive()
    }
}

/// Map an HTTP error status and body to an [`Error`].
pub(crate) fn map_status(status_code: u16, body: &str, retry_after: Option<u64>) -> Error {
    #[derive(Deserialize)]
    struct ErrorResponse {
        error: Option<ErrorDetail>,
    }

    #[derive(Deserialize)]
    struct ErrorDetail {
        #[serde(rename = "type")]
        error_type: Option<String>,
        message: Option<String>,
        param: Option<String>,
    }

    let detail = serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .and_then(|parsed| parsed.error);
    let error_type = detail.as_ref().and_then(|e| e.error_type.clone());
    let error_param = detail.as_ref().and_then(|e| e.param.clone());
    let error_message = detail
        .and_then(|e| e.message)
        .unwrap_or_else(|| body.trim().to_string());

    match status_code {
        400 => Error::bad_request(error_message, error_param),
        401 => Error::authentication(error_message),
        403 => Error::permission(error_message),
        404 => Error::not_found(error_message),
        408 => Error::timeout(error_message, None),
        429 => Error::rate_limit(error_message, retry_after),
        500 => Error::internal_server(error_message),
        502..=504 => Error::service_unavailable(error_message, retry_after),
        _ => Error::api(status_code, error_type, error_message),
    }
}

/// Delay before retry number `attempt + 1`.  A server-provided
/// `Retry-After` wins over the exponential schedule, up to
/// [`MAX_RETRY_AFTER`].
fn retry_delay(attempt: u32, err: &Error) -> Duration {
    let hinted = match err {
        Error::RateLimit { retry_after, .. } | Error::ServiceUnavailable { retry_after, .. } => {
            retry_after.map(|secs| Duration::from_secs(secs).min(MAX_RETRY_AFTER))
        }
        _ => None,
    };
    hinted.unwrap_or_else(|| {
        INITIAL_BACKOFF
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(MAX_BACKOFF)
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use futures::StreamExt;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;
    use crate::types::ChatCompletionChunk;

    /// Serves each canned HTTP response to one connection, in order, and
    /// returns the base URL and a handle yielding the received requests.
    async fn serve(responses: Vec<String>) -> (String, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let mut requests = Vec::new();
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                requests.push(read_request(&mut socket).await);
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
            }
            requests
        });
        (format!("http://{addr}/v1"), handle)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())?
                    })
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    fn http(status: &str, content_type: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\ncontent-type: {content_type}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    fn client(base_url: &str) -> LlmClient {
        let mut config = LlmConfig::new(base_url, "test-model", "sk-test");
        config.max_retries = 2;
        LlmClient::new(config).unwrap()
    }

    const COMPLETION: &str = r#"{"id":"1","model":"test-model","created":0,"choices":[{"index":0,"message":{"role":"assistant","content":"<think>count</think>\n\n\nFour."},"finish_reason":"stop"}],"usage":{"prompt_tokens":5,"completion_tokens":7,"total_tokens":12}}"#;

    #[test]
    fn client_creation_validates_config() {
        assert!(LlmClient::new(LlmConfig::new("not a url", "m", "k")).is_err());
        let client = client("http://localhost:1234/v1");
        assert_eq!(client.model(), "test-model");
        assert_eq!(
            client.endpoint.as_str(),
            "http://localhost:1234/v1/chat/completions"
        );
        assert!(client.tools().is_empty());
    }

    #[test]
    fn status_mapping() {
        let body = r#"{"error":{"type":"invalid_request_error","message":"bad temperature","param":"temperature"}}"#;
        let err = map_status(400, body, None);
        assert!(matches!(err, Error::BadRequest { ref param, .. } if param.as_deref() == Some("temperature")));
        assert!(err.to_string().contains("bad temperature"));
        assert!(map_status(401, "", None).is_authentication());
        assert!(matches!(map_status(403, "", None), Error::Permission { .. }));
        assert!(matches!(map_status(404, "", None), Error::NotFound { .. }));
        assert!(map_status(408, "", None).is_timeout());
        assert!(matches!(
            map_status(429, "slow down", Some(7)),
            Error::RateLimit { retry_after: Some(7), .. }
        ));
        assert!(map_status(500, "", None).is_server_error());
        assert!(map_status(503, "", None).is_retryable());
        let err = map_status(418, "teapot", None);
        assert_eq!(err.status_code(), Some(418));
        assert!(err.to_string().contains("teapot"));
    }

    #[test]
    fn retry_delays() {
        let err = Error::internal_server("boom");
        assert_eq!(retry_delay(0, &err), Duration::from_millis(500));
        assert_eq!(retry_delay(1, &err), Duration::from_secs(1));
        assert_eq!(retry_delay(10, &err), MAX_BACKOFF);
        let err = Error::rate_limit("later", Some(3));
        assert_eq!(retry_delay(0, &err), Duration::from_secs(3));
        let err = Error::service_unavailable("maintenance", Some(3_600));
        assert_eq!(retry_delay(0, &err), MAX_RETRY_AFTER);
    }

    #[tokio::test]
    async fn generate_strips_thinking() {
        let (base_url, server) = serve(vec![http("200 OK", "application/json", COMPLETION)]).await;
        let response = client(&base_url)
            .generate(&[Message::user("2+2?")])
            .await
            .unwrap();
        assert_eq!(response.content, "Four.");
        assert_eq!(response.thinking.as_deref(), Some("count"));
        assert_eq!(response.finish_reason.as_deref(), Some("stop"));
        assert_eq!(response.usage, Some(Usage::new(5, 7)));

        let requests = server.await.unwrap();
        assert!(requests[0].starts_with("POST /v1/chat/completions"));
        assert!(requests[0].to_ascii_lowercase().contains("authorization: bearer sk-test"));
        assert!(requests[0].contains(r#""content":"2+2?""#));
        assert!(!requests[0].contains(r#""stream""#));
    }

    #[tokio::test]
    async fn generate_without_postprocessing_keeps_markup() {
        let (base_url, _server) = serve(vec![http("200 OK", "application/json", COMPLETION)]).await;
        let response = client(&base_url)
            .with_postprocessing(false)
            .generate(&[Message::user("2+2?")])
            .await
            .unwrap();
        assert!(response.content.starts_with("<think>count</think>"));
    }

    #[tokio::test]
    async fn retries_retryable_statuses() {
        let (base_url, server) = serve(vec![
            http("503 Service Unavailable", "text/plain", "busy"),
            http("200 OK", "application/json", COMPLETION),
        ])
        .await;
        let response = client(&base_url)
            .generate(&[Message::user("hi")])
            .await
            .unwrap();
        assert_eq!(response.content, "Four.");
        assert_eq!(server.await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn does_not_retry_client_errors() {
        let (base_url, server) = serve(vec![http(
            "401 Unauthorized",
            "application/json",
            r#"{"error":{"message":"bad key"}}"#,
        )])
        .await;
        let err = client(&base_url)
            .generate(&[Message::user("hi")])
            .await
            .unwrap_err();
        assert!(err.is_authentication());
        assert_eq!(server.await.unwrap().len(), 1);
    }

    #[derive(Default)]
    struct Recorder {
        requests: Mutex<usize>,
        chunks: Mutex<Vec<Option<String>>>,
    }

    impl ClientLogger for Recorder {
        fn log_request(&self, _: &ChatCompletionRequest) {
            *self.requests.lock().unwrap() += 1;
        }

        fn log_response(&self, _: &ChatCompletionResponse) {}

        fn log_stream_chunk(&self, chunk: &ChatCompletionChunk) {
            self.chunks
                .lock()
                .unwrap()
                .push(chunk.content().map(str::to_string));
        }
    }

    #[tokio::test]
    async fn generate_stream_yields_raw_deltas() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hello <thi\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"nk>x</think> world\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        let (base_url, server) = serve(vec![http("200 OK", "text/event-stream", body)]).await;
        let recorder = Arc::new(Recorder::default());
        let stream = client(&base_url)
            .with_logger(recorder.clone())
            .generate_stream(&[Message::user("hi")])
            .await
            .unwrap();
        let chunks: Vec<String> = stream.map(|chunk| chunk.unwrap()).collect().await;
        assert_eq!(chunks, vec!["Hello <thi", "nk>x</think> world"]);
        assert_eq!(*recorder.requests.lock().unwrap(), 1);
        assert_eq!(recorder.chunks.lock().unwrap().len(), 3);

        let requests = server.await.unwrap();
        assert!(requests[0].contains(r#""stream":true"#));
        assert!(requests[0].to_ascii_lowercase().contains("accept: text/event-stream"));
    }

    #[tokio::test]
    async fn connection_refused_is_a_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let mut config = LlmConfig::new(format!("http://{addr}/v1"), "m", "k");
        config.max_retries = 0;
        let err = LlmClient::new(config)
            .unwrap()
            .generate(&[Message::user("hi")])
            .await
            .unwrap_err();
        assert!(err.is_connection(), "{err}");
    }
}
