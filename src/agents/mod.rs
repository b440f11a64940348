//! Agent persona registry.
//!
//! A fixed set of named conversational agents for the Jarlheim world, each a
//! persona (instructions, purpose) bound to a chat model, an embedding model
//! and step/retry limits for the orchestration layer. The registry is static
//! data loaded once at startup; it has no runtime behavior beyond lookup and
//! turning a persona into a `ChatCompletionRequest`.

pub mod errors;
pub mod registry;

pub use errors::AgentError;
pub use registry::{AgentDefinition, AgentKey, AgentRegistry};
