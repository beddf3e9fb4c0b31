//! The `initiate_intervention` tool: coached breathing or movement, sent
//! directly over the transport rather than through the returned reply.

use super::{truncate, Tool, ToolInvocation, ToolOutcome};
use crate::context::FlowContext;
use async_trait::async_trait;
use promptpipe_core::{
    message::{ChatMessage, ToolDescriptor},
    PromptPipeError,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

const INTERVENTION_SYSTEM: &str = "You guide a short, calming one-minute intervention over \
text messaging. Write a single warm message that walks the participant through the exercise \
step by step, in plain language, finishing with an invitation to reply when done. No preamble.";

pub struct InitiateInterventionTool {
    ctx: Arc<FlowContext>,
}

impl InitiateInterventionTool {
    pub fn new(ctx: Arc<FlowContext>) -> Self {
        Self { ctx }
    }
}

#[derive(Debug, Deserialize, Default)]
struct InterventionArgs {
    #[serde(default)]
    intervention_focus: String,
    #[serde(default)]
    personalization_notes: String,
}

#[async_trait]
impl Tool for InitiateInterventionTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "initiate_intervention".into(),
            description: "Start a guided one-minute breathing or movement intervention. \
                          The message is sent to the participant immediately; do not repeat \
                          it in your reply."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "intervention_focus": {
                        "type": "string",
                        "description": "What to focus on, e.g. breathing, stretching, grounding"
                    },
                    "personalization_notes": {
                        "type": "string",
                        "description": "Anything to tailor the exercise to this participant"
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
        let args: InterventionArgs = match serde_json::from_value(args) {
            Ok(a) => a,
            Err(e) => return Ok(ToolOutcome::fail(format!("bad arguments: {e}"))),
        };
        let focus = if args.intervention_focus.is_empty() {
            "breathing".to_string()
        } else {
            args.intervention_focus
        };

        let mut request = format!("Guide a one-minute {focus} exercise.");
        if !args.personalization_notes.is_empty() {
            request.push_str(&format!(
                " Personalization: {}",
                args.personalization_notes
            ));
        }
        let messages = [
            ChatMessage::system(INTERVENTION_SYSTEM),
            ChatMessage::user(request),
        ];
        let text = self.ctx.llm.generate_with_messages(&messages).await?;
        if text.trim().is_empty() {
            return Ok(ToolOutcome::fail("empty intervention text"));
        }

        self.ctx
            .messenger
            .send_message(&invocation.phone, &text)
            .await?;
        info!(
            participant = %invocation.participant_id,
            focus = %focus,
            "intervention sent"
        );
        Ok(ToolOutcome::ok_direct(format!(
            "[INTERVENTION_SENT: {}]",
            truncate(&text, 100)
        )))
    }
}
