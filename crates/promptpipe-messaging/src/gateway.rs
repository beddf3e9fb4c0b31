//! HTTP messaging-gateway channel.
//!
//! Sends outbound texts via `POST /messages` and receives inbound ones by
//! long polling `GET /messages/inbound`.

use crate::recipient;
use async_trait::async_trait;
use promptpipe_core::{config::MessagingConfig, traits::Messenger, PromptPipeError};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// An inbound message delivered by the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    /// Sender phone number as reported by the gateway.
    pub from: String,
    pub text: String,
}

#[derive(Deserialize)]
struct InboundBatch {
    #[serde(default)]
    messages: Vec<InboundMessage>,
}

/// Messaging channel backed by an HTTP gateway.
#[derive(Debug)]
pub struct GatewayChannel {
    client: reqwest::Client,
    base_url: String,
    api_token: String,
}

impl GatewayChannel {
    pub fn from_config(config: &MessagingConfig) -> Result<Self, PromptPipeError> {
        if config.gateway_url.trim().is_empty() {
            return Err(PromptPipeError::DependencyMissing(
                "messaging gateway url is not configured".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.send_timeout_secs))
            .build()
            .map_err(|e| PromptPipeError::Messaging(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.gateway_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
        })
    }

    /// Start long polling for inbound messages.
    pub fn start(&self) -> mpsc::Receiver<InboundMessage> {
        let (tx, rx) = mpsc::channel(64);
        let client = self.client.clone();
        let base_url = self.base_url.clone();
        let api_token = self.api_token.clone();

        info!("gateway channel starting long polling...");

        tokio::spawn(async move {
            let mut backoff_secs: u64 = 1;

            loop {
                let url = format!("{base_url}/messages/inbound?timeout=30");
                let resp = match client
                    .get(&url)
                    .bearer_auth(&api_token)
                    .timeout(Duration::from_secs(35))
                    .send()
                    .await
                {
                    Ok(r) => r,
                    Err(e) => {
                        error!("gateway poll error (retry in {backoff_secs}s): {e}");
                        tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                        backoff_secs = (backoff_secs * 2).min(60);
                        continue;
                    }
                };

                if !resp.status().is_success() {
                    let status = resp.status();
                    error!("gateway poll got {status} (retry in {backoff_secs}s)");
                    tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                    backoff_secs = (backoff_secs * 2).min(60);
                    continue;
                }

                let batch: InboundBatch = match resp.json().await {
                    Ok(b) => b,
                    Err(e) => {
                        error!("gateway parse error (retry in {backoff_secs}s): {e}");
                        tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                        backoff_secs = (backoff_secs * 2).min(60);
                        continue;
                    }
                };

                backoff_secs = 1;

                for msg in batch.messages {
                    debug!(from = %msg.from, "inbound message");
                    if tx.send(msg).await.is_err() {
                        info!("inbound receiver dropped, stopping gateway polling");
                        return;
                    }
                }
            }
        });

        rx
    }
}

#[async_trait]
impl Messenger for GatewayChannel {
    fn validate_and_canonicalize_recipient(&self, raw: &str) -> Result<String, PromptPipeError> {
        recipient::validate_and_canonicalize(raw)
    }

    async fn send_message(&self, to: &str, body: &str) -> Result<(), PromptPipeError> {
        let url = format!("{}/messages", self.base_url);
        let payload = serde_json::json!({ "to": to, "body": body });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PromptPipeError::Messaging(format!("send failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(PromptPipeError::Messaging(format!(
                "gateway returned {status}: {text}"
            )));
        }

        Ok(())
    }

    async fn send_typing(&self, to: &str) -> Result<(), PromptPipeError> {
        let url = format!("{}/typing", self.base_url);
        let payload = serde_json::json!({ "to": to });

        // Best effort: a failed typing indicator should never fail the turn.
        if let Err(e) = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&payload)
            .send()
            .await
        {
            warn!("typing indicator failed: {e}");
        }
        Ok(())
    }
}
