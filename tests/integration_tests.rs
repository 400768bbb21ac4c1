//! Integration tests against a live endpoint.
//! These tests require LLM_BASE_URL, LLM_MODEL and LLM_API_KEY to run.

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use yaap::{LlmClient, LlmConfig, Message};

    fn client() -> Option<LlmClient> {
        if std::env::var("LLM_API_KEY").is_err() {
            eprintln!("Skipping test: LLM_API_KEY not set");
            return None;
        }
        let config = LlmConfig::from_env().expect("LLM_* settings should be complete");
        Some(LlmClient::new(config).expect("Failed to create client"))
    }

    #[tokio::test]
    async fn test_simple_generate() {
        let Some(client) = client() else {
            return;
        };
        let response = client
            .generate(&[Message::user("Say 'test passed'")])
            .await;
        assert!(
            response.is_ok(),
            "Request should succeed with valid settings: {response:?}"
        );
    }

    #[tokio::test]
    async fn test_streaming_response() {
        let Some(client) = client() else {
            return;
        };
        let mut stream = client
            .generate_stream(&[Message::user("Count to 3")])
            .await
            .expect("Stream request should succeed");
        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            text.push_str(&chunk.expect("chunk should decode"));
        }
        assert!(!text.is_empty());
    }
}
