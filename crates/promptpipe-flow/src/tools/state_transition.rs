//! `transition_state`: the only path that changes a participant's sub-state.

use crate::context::FlowContext;
use crate::state::SubState;
use crate::tools::{Tool, ToolInvocation, ToolOutcome};
use async_trait::async_trait;
use promptpipe_core::{message::ToolDescriptor, PromptPipeError};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

pub struct TransitionStateTool {
    ctx: Arc<FlowContext>,
}

impl TransitionStateTool {
    pub fn new(ctx: Arc<FlowContext>) -> Self {
        Self { ctx }
    }
}

#[derive(Debug, Deserialize)]
struct TransitionArgs {
    target_state: String,
    #[serde(default)]
    reason: String,
}

#[async_trait]
impl Tool for TransitionStateTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "transition_state".into(),
            description: "Move the conversation to a different phase. Use when the current \
                          phase's goal is met, e.g. INTAKE to PROMPT_GENERATOR once the \
                          profile is complete and the participant is ready."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "target_state": {
                        "type": "string",
                        "enum": ["INTAKE", "PROMPT_GENERATOR", "FEEDBACK", "COORDINATOR"],
                        "description": "The phase to move to"
                    },
                    "reason": {
                        "type": "string",
                        "description": "Why the transition is happening"
                    }
                },
                "required": ["target_state"]
            }),
        }
    }

    async fn execute(
        &self,
        invocation: &ToolInvocation,
        args: serde_json::Value,
    ) -> Result<ToolOutcome, PromptPipeError> {
        let parsed: TransitionArgs = match serde_json::from_value(args) {
            Ok(p) => p,
            Err(e) => return Ok(ToolOutcome::fail(format!("invalid arguments: {e}"))),
        };

        let Some(target) = SubState::parse(&parsed.target_state) else {
            return Ok(ToolOutcome::fail(format!(
                "unknown target state {:?}",
                parsed.target_state
            )));
        };

        self.ctx
            .state
            .set_sub_state(&invocation.participant_id, target)
            .await?;

        info!(
            participant = %invocation.participant_id,
            target = target.as_str(),
            reason = %parsed.reason,
            "sub-state transition"
        );

        Ok(ToolOutcome::ok(format!(
            "transitioned to {}",
            target.as_str()
        )))
    }
}
