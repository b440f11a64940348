//! Venice chat completions client.
//!
//! Sends chat completion requests to the Venice API and either returns the
//! full text or streams back text fragments. One outbound call per method
//! invocation; retry policy belongs to the caller.

use std::time::Duration;

use futures::Stream;
use reqwest::Client as HttpClient;

use super::config::ProviderConfig;
use super::errors::VeniceError;
use super::streaming::decode_sse_stream;
use super::types::{ChatCompletionRequest, ChatCompletionResponse};

// ─── VeniceClient ────────────────────────────────────────────────────────────

/// Client for the Venice chat completions endpoint.
///
/// Owns authentication and endpoint configuration. Construction never
/// touches the network and does not require a key; a missing key is reported
/// by the first request, before anything is sent.
#[derive(Debug, Clone)]
pub struct VeniceClient {
    http: HttpClient,
    config: ProviderConfig,
}

impl VeniceClient {
    /// Create a client from an explicit configuration.
    pub fn new(config: ProviderConfig) -> Result<Self, VeniceError> {
        let mut builder =
            HttpClient::builder().connect_timeout(Duration::from_secs(config.connect_timeout_secs));
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        let http = builder.build().map_err(|e| VeniceError::ConfigError {
            reason: format!("failed to build HTTP client: {e}"),
        })?;

        Ok(Self { http, config })
    }

    /// Create a client from `VENICE_*` environment variables.
    pub fn from_env() -> Result<Self, VeniceError> {
        Self::new(ProviderConfig::from_env())
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Model used when a caller does not pick one.
    pub fn default_model(&self) -> &str {
        &self.config.default_model
    }

    /// `POST` target for chat completions.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    // ─── Raw exchange ────────────────────────────────────────────────────

    /// Send `request` as-is and return the live response.
    ///
    /// The body is not read on success, so a streaming response can be
    /// consumed incrementally. Non-2xx statuses become `ApiError` carrying the
    /// status code and the provider's message when the body has one.
    pub async fn create_chat_completion(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<reqwest::Response, VeniceError> {
        let api_key = self.config.api_key().ok_or(VeniceError::MissingApiKey)?;
        request.validate()?;

        let url = self.completions_url();

        tracing::info!(
            url = %url,
            model = %request.model,
            message_count = request.messages.len(),
            stream = request.stream,
            api_key = %self.config.masked_api_key(),
            "sending chat completion request"
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| self.transport_error(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = api_error_from_body(status.as_u16(), &body);
            tracing::warn!(
                status = status.as_u16(),
                error = %err,
                "chat completion request failed"
            );
            return Err(err);
        }

        Ok(response)
    }

    // ─── Chat Completion (streaming) ─────────────────────────────────────

    /// Stream the completion as text fragments.
    ///
    /// Forces `stream: true`. The returned stream is lazy and pull-based;
    /// dropping it releases the underlying connection.
    pub async fn stream_chat_completion(
        &self,
        mut request: ChatCompletionRequest,
    ) -> Result<impl Stream<Item = Result<String, VeniceError>>, VeniceError> {
        request.stream = true;
        let response = self.create_chat_completion(&request).await?;

        if response.content_length() == Some(0) {
            return Err(VeniceError::NoResponseBody);
        }

        Ok(decode_sse_stream(response.bytes_stream()))
    }

    // ─── Chat Completion (non-streaming) ─────────────────────────────────

    /// Request the whole completion and return the first choice's text.
    ///
    /// Forces `stream: false`. A structurally empty answer is `""`, not an error.
    pub async fn create_non_streaming_completion(
        &self,
        mut request: ChatCompletionRequest,
    ) -> Result<String, VeniceError> {
        request.stream = false;
        let response = self.create_chat_completion(&request).await?;

        let body = response.text().await.map_err(|e| VeniceError::InvalidResponse {
            reason: format!("failed to read response body: {e}"),
        })?;

        let parsed: ChatCompletionResponse =
            serde_json::from_str(&body).map_err(|e| VeniceError::InvalidResponse {
                reason: format!("failed to parse completion: {e}"),
            })?;

        Ok(parsed.into_text())
    }

    fn transport_error(&self, url: &str, e: reqwest::Error) -> VeniceError {
        if e.is_timeout() {
            VeniceError::Timeout {
                duration_secs: self
                    .config
                    .request_timeout_secs
                    .unwrap_or(self.config.connect_timeout_secs),
            }
        } else {
            VeniceError::ConnectionFailed {
                endpoint: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Build an `ApiError` from a non-2xx body.
///
/// Accepts `{"error": "msg"}` and `{"error": {"message": "msg"}}`; anything
/// else falls back to a generic message naming the status.
fn api_error_from_body(status: u16, body: &str) -> VeniceError {
    let details = serde_json::from_str::<serde_json::Value>(body).ok();

    let message = details
        .as_ref()
        .and_then(|v| v.get("error"))
        .and_then(|e| match e {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Object(o) => {
                o.get("message").and_then(|m| m.as_str()).map(str::to_string)
            }
            _ => None,
        })
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("Venice API request failed with status {status}"));

    VeniceError::ApiError {
        status,
        message,
        details,
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::errors::ErrorKind;
    use crate::inference::types::ChatMessage;
    use futures::StreamExt;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const HEL_LO_BODY: &str = concat!(
        "data: {\"id\":\"1\",\"object\":\"x\",\"created\":0,\"model\":\"m\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hel\"},\"finish_reason\":null}]}\n",
        "data: {\"id\":\"1\",\"object\":\"x\",\"created\":0,\"model\":\"m\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"},\"finish_reason\":null}]}\n",
        "\n",
        "data: [DONE]\n",
    );

    fn client_for(server: &MockServer, api_key: Option<&str>) -> VeniceClient {
        VeniceClient::new(ProviderConfig {
            api_key: api_key.map(str::to_string),
            base_url: format!("{}/api/v1", server.uri()),
            ..ProviderConfig::default()
        })
        .unwrap()
    }

    fn hi_request() -> ChatCompletionRequest {
        ChatCompletionRequest::new("m", vec![ChatMessage::user("hi")])
    }

    #[test]
    fn test_completions_url_trims_trailing_slash() {
        let client = VeniceClient::new(ProviderConfig {
            base_url: "https://api.venice.ai/api/v1/".into(),
            ..ProviderConfig::default()
        })
        .unwrap();
        assert_eq!(
            client.completions_url(),
            "https://api.venice.ai/api/v1/chat/completions"
        );
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_before_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let err = client.create_chat_completion(&hi_request()).await.unwrap_err();
        assert!(matches!(err, VeniceError::MissingApiKey));
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_blank_messages_rejected_before_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(&server, Some("sk-test"));
        let request = ChatCompletionRequest::new("m", vec![ChatMessage::user("   ")]);
        let err = client.create_chat_completion(&request).await.unwrap_err();
        assert_eq!(err.status_code(), Some(400));
    }

    #[tokio::test]
    async fn test_error_body_message_and_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "bad request"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Some("sk-test"));
        let err = client.create_chat_completion(&hi_request()).await.unwrap_err();
        assert_eq!(err.to_string(), "bad request");
        assert_eq!(err.status_code(), Some(400));
        assert_eq!(err.details().unwrap()["error"], "bad request");
    }

    #[tokio::test]
    async fn test_nested_error_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429)
                    .set_body_json(json!({"error": {"message": "too many requests"}})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, Some("sk-test"));
        let err = client.create_chat_completion(&hi_request()).await.unwrap_err();
        assert_eq!(err.to_string(), "too many requests");
        assert!(err.user_message().starts_with("Rate limit exceeded"));
    }

    #[tokio::test]
    async fn test_unparseable_error_body_falls_back() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
            .mount(&server)
            .await;

        let client = client_for(&server, Some("sk-test"));
        let err = client.create_chat_completion(&hi_request()).await.unwrap_err();
        assert_eq!(err.to_string(), "Venice API request failed with status 502");
        assert_eq!(err.status_code(), Some(502));
        assert!(err.details().is_none());
    }

    #[tokio::test]
    async fn test_stream_chat_completion_end_to_end() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .and(header("Content-Type", "application/json"))
            .and(body_partial_json(json!({
                "model": "m",
                "stream": true,
                "messages": [{"role": "user", "content": "hi"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(HEL_LO_BODY, "text/event-stream"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Some("sk-test"));
        let stream = client.stream_chat_completion(hi_request()).await.unwrap();
        let fragments: Vec<String> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(fragments, ["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_stream_with_empty_body_is_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = client_for(&server, Some("sk-test"));
        let err = match client.stream_chat_completion(hi_request()).await {
            Ok(_) => panic!("expected NoResponseBody"),
            Err(e) => e,
        };
        assert!(matches!(err, VeniceError::NoResponseBody));
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[tokio::test]
    async fn test_non_streaming_completion_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hail, traveller."}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Some("sk-test"));
        let mut request = hi_request();
        request.stream = true;
        let text = client.create_non_streaming_completion(request).await.unwrap();
        assert_eq!(text, "Hail, traveller.");
    }

    #[tokio::test]
    async fn test_non_streaming_completion_empty_choices_is_empty_string() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let client = client_for(&server, Some("sk-test"));
        let text = client.create_non_streaming_completion(hi_request()).await.unwrap();
        assert_eq!(text, "");
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let client = VeniceClient::new(ProviderConfig {
            api_key: Some("sk-test".into()),
            base_url: "http://127.0.0.1:1/api/v1".into(),
            connect_timeout_secs: 2,
            ..ProviderConfig::default()
        })
        .unwrap();

        let err = client.create_chat_completion(&hi_request()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(err.status_code(), Some(503));
    }

    #[test]
    fn test_api_error_from_body_variants() {
        let err = api_error_from_body(400, r#"{"error":"bad request"}"#);
        assert_eq!(err.to_string(), "bad request");

        let err = api_error_from_body(500, r#"{"error":""}"#);
        assert_eq!(err.to_string(), "Venice API request failed with status 500");

        let err = api_error_from_body(404, r#"{"detail":"missing"}"#);
        assert_eq!(err.to_string(), "Venice API request failed with status 404");
        assert_eq!(err.details().unwrap()["detail"], "missing");
    }
}
