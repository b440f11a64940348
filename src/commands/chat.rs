//! Chat request handler for the tavern UI.
//!
//! Turns a UI conversation into a streaming completion request: drops blank
//! turns and previously rendered error replies, layers the user's custom
//! system prompt on top of the built-in formatting prompt, and maps every
//! failure onto a status plus a message fit for display.

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::inference::{
    ChatCompletionRequest, ChatMessage, VeniceClient, VeniceError, VeniceParameters, WebSearchMode,
};

/// Prefix of the assistant bubble the UI renders when a request failed.
/// Such turns are never replayed to the provider.
const ERROR_REPLY_PREFIX: &str = "Sorry, I encountered an error";

const MAX_TOKENS: u32 = 4096;
const TEMPERATURE: f32 = 0.7;

/// Formatting guidance sent as the system message on every chat request.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are the Jarlsmad Tavern assistant, an AI using Markdown for clear and structured responses. \
Format your responses following these guidelines:

1. Use headers for sections:
   # For main topics
   ## For subtopics
   ### For subsections

2. For lists and steps:
   - Use bullet points for unordered lists
   - Number steps when sequence matters

3. For code:
   - Use inline `code` for short snippets
   - Use triple backticks with language for blocks:
   ```python
   def example():
       return \"like this\"
   ```

4. For emphasis:
   - Use **bold** for important points
   - Use *italics* for emphasis
   - Use > for important quotes or callouts

5. For structured data:
   | Use | Tables |
   |-----|---------|
   | When | Needed |

6. Break up long responses with:
   - Clear section headers
   - Appropriate spacing between sections
   - Bullet points for better readability
   - Short, focused paragraphs

7. For technical content:
   - Always specify language for code blocks
   - Use inline `code` for technical terms
   - Include example usage where helpful

Keep responses concise and well-structured. Use appropriate Markdown formatting to enhance \
readability and understanding.";

// ─── Request Types ──────────────────────────────────────────────────────────

/// Speaker of a UI conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationRole {
    User,
    Assistant,
}

/// One turn as the UI stores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: String,
    pub role: ConversationRole,
    pub content: String,
}

/// User-editable addition to the built-in system prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemPromptSetting {
    pub value: String,
    pub enabled: bool,
}

/// Payload of a chat request from the UI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<ConversationMessage>,
    #[serde(default)]
    pub system_prompt: Option<SystemPromptSetting>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub web_search_enabled: bool,
}

// ─── Failure ────────────────────────────────────────────────────────────────

/// A failed chat request, ready to hand back to the UI.
///
/// Serializes as `{"error": message, "details": ...}`; the status travels
/// out of band.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("{message} (status {status})")]
pub struct ChatFailure {
    #[serde(skip)]
    pub status: u16,
    #[serde(rename = "error")]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ChatFailure {
    fn no_valid_messages() -> Self {
        Self {
            status: 400,
            message: "No valid messages to send".into(),
            details: None,
        }
    }
}

impl From<VeniceError> for ChatFailure {
    fn from(e: VeniceError) -> Self {
        Self {
            status: e.status_code().unwrap_or(500),
            message: e.user_message(),
            details: e.details().cloned(),
        }
    }
}

// ─── Request Building ───────────────────────────────────────────────────────

/// Drop blank turns and rendered error replies, trimming what survives.
pub fn prepare_messages(messages: &[ConversationMessage]) -> Vec<ChatMessage> {
    messages
        .iter()
        .filter(|m| !m.content.trim().is_empty() && !m.content.starts_with(ERROR_REPLY_PREFIX))
        .map(|m| {
            let content = m.content.trim();
            match m.role {
                ConversationRole::User => ChatMessage::user(content),
                ConversationRole::Assistant => ChatMessage::assistant(content),
            }
        })
        .collect()
}

/// The built-in prompt, followed by the custom prompt when it is enabled.
pub fn compose_system_prompt(setting: Option<&SystemPromptSetting>) -> String {
    match setting {
        Some(s) if s.enabled => format!("{DEFAULT_SYSTEM_PROMPT}\n\n{}", s.value),
        _ => DEFAULT_SYSTEM_PROMPT.to_string(),
    }
}

/// Build the streaming completion request for a chat turn.
///
/// Fails with a 400 `ChatFailure` when no message survives filtering.
pub fn build_request(
    request: &ChatRequest,
    default_model: &str,
) -> Result<ChatCompletionRequest, ChatFailure> {
    let history = prepare_messages(&request.messages);
    if history.is_empty() {
        return Err(ChatFailure::no_valid_messages());
    }

    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(ChatMessage::system(compose_system_prompt(
        request.system_prompt.as_ref(),
    )));
    messages.extend(history);

    let model = request
        .model
        .as_deref()
        .filter(|m| !m.trim().is_empty())
        .unwrap_or(default_model);

    let web_search = if request.web_search_enabled {
        WebSearchMode::Auto
    } else {
        WebSearchMode::Off
    };

    Ok(ChatCompletionRequest {
        stream: true,
        max_tokens: Some(MAX_TOKENS),
        temperature: Some(TEMPERATURE),
        provider_parameters: Some(VeniceParameters {
            include_venice_system_prompt: Some(true),
            enable_web_search: Some(web_search),
            enable_web_citations: Some(request.web_search_enabled),
            ..VeniceParameters::default()
        }),
        ..ChatCompletionRequest::new(model, messages)
    })
}

// ─── Handler ────────────────────────────────────────────────────────────────

/// Run a chat request and return the assistant's reply as a fragment stream.
///
/// Errors before the first byte arrive as a `ChatFailure`; a failure while
/// reading the stream arrives as the stream's last item.
pub async fn generate_response(
    client: &VeniceClient,
    request: ChatRequest,
) -> Result<impl Stream<Item = Result<String, VeniceError>>, ChatFailure> {
    let completion = build_request(&request, client.default_model())?;

    tracing::info!(
        model = %completion.model,
        messages = completion.messages.len(),
        custom_prompt = request.system_prompt.as_ref().is_some_and(|s| s.enabled),
        web_search = request.web_search_enabled,
        "sending chat request"
    );

    let stream = client
        .stream_chat_completion(completion)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, kind = ?e.kind(), "chat request failed");
            ChatFailure::from(e)
        })?;

    Ok(stream.inspect(|item| {
        if let Err(e) = item {
            tracing::error!(error = %e, "chat stream aborted");
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{ProviderConfig, Role};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn turn(role: ConversationRole, content: &str) -> ConversationMessage {
        ConversationMessage {
            id: format!("{role:?}-{}", content.len()),
            role,
            content: content.to_string(),
        }
    }

    fn user(content: &str) -> ConversationMessage {
        turn(ConversationRole::User, content)
    }

    fn assistant(content: &str) -> ConversationMessage {
        turn(ConversationRole::Assistant, content)
    }

    fn client_for(server: &MockServer) -> VeniceClient {
        VeniceClient::new(ProviderConfig {
            api_key: Some("sk-test".into()),
            base_url: format!("{}/api/v1", server.uri()),
            ..ProviderConfig::default()
        })
        .unwrap()
    }

    async fn expect_failure(client: &VeniceClient, request: ChatRequest) -> ChatFailure {
        match generate_response(client, request).await {
            Ok(_) => panic!("expected a ChatFailure"),
            Err(f) => f,
        }
    }

    // ─── Message filtering ──────────────────────────────────────────────

    #[test]
    fn test_prepare_messages_drops_blank_and_error_replies() {
        let messages = vec![
            user("  Where is the blacksmith?  "),
            assistant("Sorry, I encountered an error. Please try again."),
            user("   "),
            assistant("Down by the fjord."),
        ];
        let prepared = prepare_messages(&messages);
        assert_eq!(
            prepared,
            vec![
                ChatMessage::user("Where is the blacksmith?"),
                ChatMessage::assistant("Down by the fjord."),
            ]
        );
    }

    #[test]
    fn test_prepare_messages_error_prefix_must_lead() {
        let messages = vec![assistant(
            "I said: Sorry, I encountered an error earlier, but all is well.",
        )];
        assert_eq!(prepare_messages(&messages).len(), 1);
    }

    // ─── System prompt ──────────────────────────────────────────────────

    #[test]
    fn test_system_prompt_default_when_absent_or_disabled() {
        assert_eq!(compose_system_prompt(None), DEFAULT_SYSTEM_PROMPT);
        let disabled = SystemPromptSetting {
            value: "Speak like a skald.".into(),
            enabled: false,
        };
        assert_eq!(compose_system_prompt(Some(&disabled)), DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn test_system_prompt_appends_enabled_custom_prompt() {
        let custom = SystemPromptSetting {
            value: "Speak like a skald.".into(),
            enabled: true,
        };
        let prompt = compose_system_prompt(Some(&custom));
        assert!(prompt.starts_with(DEFAULT_SYSTEM_PROMPT));
        assert!(prompt.ends_with("\n\nSpeak like a skald."));
    }

    // ─── Request building ───────────────────────────────────────────────

    #[test]
    fn test_build_request_shape() {
        let request = ChatRequest {
            messages: vec![user("hi")],
            web_search_enabled: true,
            ..ChatRequest::default()
        };
        let built = build_request(&request, "venice-uncensored").unwrap();

        assert_eq!(built.model, "venice-uncensored");
        assert!(built.stream);
        assert_eq!(built.max_tokens, Some(4096));
        assert_eq!(built.temperature, Some(0.7));
        assert_eq!(built.messages.len(), 2);
        assert_eq!(built.messages[0].role, Role::System);
        assert_eq!(built.messages[1], ChatMessage::user("hi"));

        let params = built.provider_parameters.unwrap();
        assert_eq!(params.include_venice_system_prompt, Some(true));
        assert_eq!(params.enable_web_search, Some(WebSearchMode::Auto));
        assert_eq!(params.enable_web_citations, Some(true));
    }

    #[test]
    fn test_build_request_web_search_off_and_model_override() {
        let request = ChatRequest {
            messages: vec![user("hi")],
            model: Some("llama-3.3-70b".into()),
            ..ChatRequest::default()
        };
        let built = build_request(&request, "venice-uncensored").unwrap();
        assert_eq!(built.model, "llama-3.3-70b");
        let params = built.provider_parameters.unwrap();
        assert_eq!(params.enable_web_search, Some(WebSearchMode::Off));
        assert_eq!(params.enable_web_citations, Some(false));
    }

    #[test]
    fn test_build_request_with_nothing_left_is_400() {
        let request = ChatRequest {
            messages: vec![user("  "), assistant("Sorry, I encountered an error.")],
            ..ChatRequest::default()
        };
        let failure = build_request(&request, "m").unwrap_err();
        assert_eq!(failure.status, 400);
        assert_eq!(failure.message, "No valid messages to send");
    }

    #[test]
    fn test_chat_request_deserializes_camel_case() {
        let request: ChatRequest = serde_json::from_value(json!({
            "messages": [{"id": "1", "role": "user", "content": "hi"}],
            "systemPrompt": {"value": "be brief", "enabled": true},
            "webSearchEnabled": true
        }))
        .unwrap();
        assert!(request.web_search_enabled);
        assert_eq!(request.model, None);
        assert_eq!(request.system_prompt.unwrap().value, "be brief");
    }

    // ─── Failure mapping ────────────────────────────────────────────────

    #[test]
    fn test_failure_serializes_as_error_and_details() {
        let failure = ChatFailure::from(VeniceError::ApiError {
            status: 400,
            message: "bad model".into(),
            details: Some(json!({"error": "bad model"})),
        });
        assert_eq!(failure.status, 400);
        assert_eq!(
            serde_json::to_value(&failure).unwrap(),
            json!({"error": "bad model", "details": {"error": "bad model"}})
        );

        let bare = ChatFailure::no_valid_messages();
        assert_eq!(
            serde_json::to_value(&bare).unwrap(),
            json!({"error": "No valid messages to send"})
        );
    }

    #[test]
    fn test_failure_mapping_by_kind() {
        let rate = ChatFailure::from(VeniceError::ApiError {
            status: 429,
            message: "slow down".into(),
            details: None,
        });
        assert_eq!(rate.status, 429);
        assert_eq!(rate.message, "Rate limit exceeded. Please try again in a moment.");

        let transport = ChatFailure::from(VeniceError::ConnectionFailed {
            endpoint: "http://x".into(),
            reason: "refused".into(),
        });
        assert_eq!(transport.status, 503);
        assert_eq!(
            transport.message,
            "Connection to Venice API failed. Please check your internet connection."
        );

        let config = ChatFailure::from(VeniceError::MissingApiKey);
        assert_eq!(config.status, 500);
        assert_eq!(config.message, "Venice API key is required");

        let protocol = ChatFailure::from(VeniceError::NoResponseBody);
        assert_eq!(protocol.status, 500);
    }

    // ─── End to end ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_generate_response_streams_fragments() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .and(body_partial_json(json!({
                "model": "venice-uncensored",
                "stream": true,
                "max_tokens": 4096,
                "venice_parameters": {
                    "include_venice_system_prompt": true,
                    "enable_web_search": "off",
                    "enable_web_citations": false
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "data: {\"choices\":[{\"delta\":{\"content\":\"Skål\"}}]}\n\n\
                 data: {\"choices\":[{\"delta\":{\"content\":\"!\"}}]}\n\n\
                 data: [DONE]\n\n",
                "text/event-stream",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let request = ChatRequest {
            messages: vec![user("A toast?")],
            ..ChatRequest::default()
        };
        let stream = generate_response(&client, request).await.unwrap();
        let fragments: Vec<String> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(fragments.concat(), "Skål!");
    }

    #[tokio::test]
    async fn test_generate_response_without_messages_makes_no_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let request = ChatRequest {
            messages: vec![user("\n\t ")],
            ..ChatRequest::default()
        };
        let failure = expect_failure(&client, request).await;
        assert_eq!(failure.status, 400);
    }

    #[tokio::test]
    async fn test_generate_response_maps_provider_401() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"error": "invalid key"})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let request = ChatRequest {
            messages: vec![user("hi")],
            ..ChatRequest::default()
        };
        let failure = expect_failure(&client, request).await;
        assert_eq!(failure.status, 401);
        assert_eq!(
            failure.message,
            "Authentication failed. Please check your Venice API key."
        );
        assert_eq!(failure.details, Some(json!({"error": "invalid key"})));
    }

    #[tokio::test]
    async fn test_generate_response_unreachable_host_is_503() {
        let client = VeniceClient::new(ProviderConfig {
            api_key: Some("sk-test".into()),
            base_url: "http://127.0.0.1:1/api/v1".into(),
            ..ProviderConfig::default()
        })
        .unwrap();
        let request = ChatRequest {
            messages: vec![user("hi")],
            ..ChatRequest::default()
        };
        let failure = expect_failure(&client, request).await;
        assert_eq!(failure.status, 503);
    }
}
