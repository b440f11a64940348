//! Shared types for the inference client.
//!
//! These mirror the Venice (OpenAI-compatible) Chat Completions API types,
//! used for both request building and response parsing.

use serde::{Deserialize, Deserializer, Serialize};

use super::errors::VeniceError;

// ─── Request Types ───────────────────────────────────────────────────────────

/// A single message in the conversation. Order within a request is the turn history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Web search behavior for `enable_web_search`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebSearchMode {
    Auto,
    Off,
    On,
}

/// Provider-specific options, sent as `venice_parameters`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VeniceParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character_slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strip_thinking_response: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_thinking: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_web_search: Option<WebSearchMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_web_citations: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_search_results_in_stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_venice_system_prompt: Option<bool>,
}

/// Request body for `POST {base_url}/chat/completions`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(
        rename = "venice_parameters",
        skip_serializing_if = "Option::is_none"
    )]
    pub provider_parameters: Option<VeniceParameters>,
}

impl ChatCompletionRequest {
    /// A request for `model` with the given history and no sampling overrides.
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            ..Self::default()
        }
    }

    /// Check that the request has at least one message and no blank content.
    pub fn validate(&self) -> Result<(), VeniceError> {
        if self.messages.is_empty() {
            return Err(VeniceError::InvalidRequest {
                reason: "at least one message is required".into(),
            });
        }
        if let Some(idx) = self.messages.iter().position(|m| m.content.trim().is_empty()) {
            return Err(VeniceError::InvalidRequest {
                reason: format!("message {idx} has blank content"),
            });
        }
        Ok(())
    }
}

// ─── Response Types ──────────────────────────────────────────────────────────

/// Raw SSE chunk from the streaming API.
///
/// Only `choices[0].delta.content` is read. Choices stay untyped JSON so a
/// bookkeeping field of an unexpected type (an `id`, `index` or
/// `finish_reason`, or any later choice) never costs the frame its text.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default, deserialize_with = "null_as_default")]
    pub choices: Vec<serde_json::Value>,
}

impl ChatCompletionChunk {
    /// The text delta of the first choice, if present and non-empty.
    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()?
            .get("delta")?
            .get("content")?
            .as_str()
            .filter(|c| !c.is_empty())
    }
}

/// Body of a non-streaming completion. Only the first choice's message is read.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub choices: Vec<serde_json::Value>,
}

impl ChatCompletionResponse {
    /// First choice's message content, or `""` when structurally absent.
    pub fn into_text(self) -> String {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.get("message")?.get("content")?.as_str().map(str::to_string))
            .unwrap_or_default()
    }
}

/// `null` deserializes like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ─── Tests ───────────────────────────────────────────────────────────────────
