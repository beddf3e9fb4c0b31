//! The `generate_habit_prompt` tool.

use super::{Tool, ToolInvocation, ToolOutcome};
use crate::context::FlowContext;
use crate::delivery;
use async_trait::async_trait;
use chrono::Utc;
use promptpipe_core::{message::ToolDescriptor, PromptPipeError};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

pub struct GenerateHabitPromptTool {
    ctx: Arc<FlowContext>,
}

impl GenerateHabitPromptTool {
    pub fn new(ctx: Arc<FlowContext>) -> Self {
        Self { ctx }
    }
}

#[derive(Debug, Deserialize, Default)]
struct GenerateArgs {
    #[serde(default)]
    delivery_mode: String,
}

#[async_trait]
impl Tool for GenerateHabitPromptTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "generate_habit_prompt".into(),
            description: "Generate and send the participant's next one-minute habit prompt. \
                          Use immediate to send right now; scheduled also arms the reminder \
                          and feedback follow-up."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "delivery_mode": {
                        "type": "string",
                        "enum": ["immediate", "scheduled"],
                        "description": "How to deliver the prompt"
                    }
                }
            }),
        }
    }

    async fn execute(
        &self,
        invocation: &ToolInvocation,
        args: serde_json::Value,
    ) -> Result<ToolOutcome, PromptPipeError> {
        let args: GenerateArgs = match serde_json::from_value(args) {
            Ok(a) => a,
            Err(e) => return Ok(ToolOutcome::fail(format!("bad arguments: {e}"))),
        };
        match args.delivery_mode.as_str() {
            "scheduled" => {
                // The tool loop holds the participant lock already.
                let text =
                    delivery::deliver_daily_prompt(&self.ctx, &invocation.participant_id).await?;
                Ok(ToolOutcome::ok_direct(text))
            }
            "immediate" | "" => {
                let text =
                    delivery::generate_prompt_text(&self.ctx, &invocation.participant_id).await?;
                self.ctx
                    .messenger
                    .send_message(&invocation.phone, &text)
                    .await?;
                delivery::record_delivery(&self.ctx, &invocation.participant_id, &text, &text)
                    .await?;
                delivery::begin_feedback_chain(
                    &self.ctx,
                    &invocation.participant_id,
                    Utc::now().timestamp(),
                )
                .await?;
                info!(
                    participant = %invocation.participant_id,
                    "immediate habit prompt sent"
                );
                Ok(ToolOutcome::ok_direct(text))
            }
            other => Ok(ToolOutcome::fail(format!(
                "unknown delivery_mode {other:?}, expected immediate or scheduled"
            ))),
        }
    }
}
