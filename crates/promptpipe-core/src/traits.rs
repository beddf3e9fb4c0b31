use crate::{
    error::PromptPipeError,
    message::{ChatMessage, LlmToolResponse, ToolDescriptor},
};
use async_trait::async_trait;

/// Port for the LLM backend.
///
/// Any chat-completion backend with function calling implements this trait.
/// Implementations must be safe for concurrent use; one instance is shared
/// process-wide.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Plain completion without tools.
    async fn generate_with_messages(
        &self,
        messages: &[ChatMessage],
    ) -> Result<String, PromptPipeError>;

    /// Completion with tool descriptors; the model may answer with content,
    /// tool calls, or both.
    async fn generate_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDescriptor],
    ) -> Result<LlmToolResponse, PromptPipeError>;
}

/// Port for the outbound messaging transport.
///
/// Recipients are phone numbers; canonical form is E.164.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Validate a raw recipient and return its canonical form.
    fn validate_and_canonicalize_recipient(&self, raw: &str) -> Result<String, PromptPipeError>;

    /// Send a text message to a canonical recipient.
    async fn send_message(&self, to: &str, body: &str) -> Result<(), PromptPipeError>;

    /// Show a typing indicator while a turn is being processed.
    async fn send_typing(&self, _to: &str) -> Result<(), PromptPipeError> {
        Ok(())
    }
}
