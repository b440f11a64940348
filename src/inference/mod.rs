//! Inference client for the Venice chat completions API.
//!
//! This module handles all communication with the provider:
//! - Streaming and non-streaming chat completions
//! - SSE stream decoding across arbitrary read boundaries
//! - Classification of configuration, transport, provider and protocol failures
//! - Provider configuration from the environment or `jarlsmad.yaml`
//!
//! The client is agent-agnostic: personas only ever reach it as the model and
//! messages of a `ChatCompletionRequest`.

pub mod client;
pub mod config;
pub mod errors;
pub mod streaming;
pub mod types;

// Re-exports for convenience
pub use client::VeniceClient;
pub use config::{models, ProviderConfig};
pub use errors::{ErrorKind, VeniceError};
pub use streaming::{decode_sse_stream, SseDecoder};
pub use types::{ChatCompletionRequest, ChatMessage, Role, VeniceParameters, WebSearchMode};
