//! LLM client module for interacting with language models.
//!
//! The engine only needs text in, text out: `generate(messages, system_prompt)`.
//! Providers differ in whether they accept a separate system role; clients
//! advertise that through [`LlmClient::supports_system_role`] and
//! [`compose_request`] folds the system text into the user turn when they don't.

mod error;
mod openrouter;

pub use error::{LlmError, LlmErrorKind, RetryPolicy};
pub use openrouter::OpenRouterClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Role in a chat conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        ChatMessage {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// Trait for LLM clients.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Whether the provider accepts a dedicated system message.
    fn supports_system_role(&self) -> bool {
        true
    }

    /// Generate a completion for `messages`.
    ///
    /// `system_prompt` is only passed to providers that support a system role;
    /// see [`compose_request`].
    async fn generate(
        &self,
        messages: &[ChatMessage],
        system_prompt: Option<&str>,
    ) -> Result<String, LlmError>;
}

/// Shape a system + user prompt pair for `client`.
///
/// Providers without a system role get one user message with the system
/// text prepended.
pub fn compose_request(
    client: &dyn LlmClient,
    system: &str,
    user: &str,
) -> (Vec<ChatMessage>, Option<String>) {
    if client.supports_system_role() {
        (vec![ChatMessage::user(user)], Some(system.to_string()))
    } else {
        (
            vec![ChatMessage::user(format!("{}\n\n{}", system, user))],
            None,
        )
    }
}
