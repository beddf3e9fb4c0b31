//! OpenAI-compatible chat-completion client with function calling.
//!
//! Works with OpenAI's API and any compatible endpoint.

use async_trait::async_trait;
use promptpipe_core::{
    config::LlmConfig,
    message::{ChatMessage, LlmToolResponse, ToolCall, ToolDescriptor},
    traits::LlmClient,
    PromptPipeError,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// OpenAI-compatible LLM client.
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    /// Create from config values.
    pub fn from_config(config: &LlmConfig) -> Result<Self, PromptPipeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PromptPipeError::Llm(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    async fn post_completion(
        &self,
        body: &ChatCompletionRequest<'_>,
    ) -> Result<ChatCompletionResponse, PromptPipeError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        debug!("llm: POST {url} model={}", body.model);

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await
            .map_err(|e| PromptPipeError::Llm(format!("request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(PromptPipeError::Llm(format!("llm returned {status}: {text}")));
        }

        resp.json()
            .await
            .map_err(|e| PromptPipeError::Llm(format!("failed to parse response: {e}")))
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolSpec<'a>>>,
}

#[derive(Serialize)]
struct ToolSpec<'a> {
    #[serde(rename = "type")]
    spec_type: &'static str,
    function: &'a ToolDescriptor,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Option<Vec<ChatChoice>>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ResponseToolCall>,
}

#[derive(Deserialize)]
struct ResponseToolCall {
    id: String,
    function: ResponseFunction,
}

#[derive(Deserialize)]
struct ResponseFunction {
    name: String,
    arguments: String,
}

fn first_message(resp: ChatCompletionResponse) -> Option<ResponseMessage> {
    resp.choices?.into_iter().next()?.message
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate_with_messages(
        &self,
        messages: &[ChatMessage],
    ) -> Result<String, PromptPipeError> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages,
            tools: None,
        };
        let resp = self.post_completion(&body).await?;

        first_message(resp)
            .and_then(|m| m.content)
            .ok_or_else(|| PromptPipeError::Llm("empty completion".into()))
    }

    async fn generate_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDescriptor],
    ) -> Result<LlmToolResponse, PromptPipeError> {
        let specs: Vec<ToolSpec> = tools
            .iter()
            .map(|t| ToolSpec {
                spec_type: "function",
                function: t,
            })
            .collect();
        let body = ChatCompletionRequest {
            model: &self.model,
            messages,
            tools: Some(specs),
        };
        let resp = self.post_completion(&body).await?;

        let message =
            first_message(resp).ok_or_else(|| PromptPipeError::Llm("empty completion".into()))?;

        Ok(LlmToolResponse {
            content: message.content.unwrap_or_default(),
            tool_calls: message
                .tool_calls
                .into_iter()
                .map(|c| ToolCall {
                    id: c.id,
                    name: c.function.name,
                    arguments: c.function.arguments,
                })
                .collect(),
        })
    }
}
