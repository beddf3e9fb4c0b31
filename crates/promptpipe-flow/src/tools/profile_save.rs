//! `save_user_profile`: merge structured fields into the persisted profile.

use crate::context::FlowContext;
use crate::profile;
use crate::tools::{Tool, ToolInvocation, ToolOutcome};
use async_trait::async_trait;
use promptpipe_core::{message::ToolDescriptor, PromptPipeError};
use serde::Deserialize;
use std::sync::Arc;

pub struct SaveUserProfileTool {
    ctx: Arc<FlowContext>,
}

impl SaveUserProfileTool {
    pub fn new(ctx: Arc<FlowContext>) -> Self {
        Self { ctx }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SaveProfileArgs {
    habit_domain: Option<String>,
    motivational_frame: Option<String>,
    preferred_time: Option<String>,
    prompt_anchor: Option<String>,
    additional_notes: Option<String>,
    ready_for_prompts: Option<bool>,
    last_successful_prompt: Option<String>,
    // "last_blocker" is the name older prompt revisions used.
    #[serde(alias = "last_blocker")]
    last_barrier: Option<String>,
    last_tweak: Option<String>,
    habit_completed: Option<bool>,
}

#[async_trait]
impl Tool for SaveUserProfileTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "save_user_profile".into(),
            description: "Save one or more participant profile fields as they are learned. \
                          Call this whenever the participant reveals a profile detail."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "habit_domain": {
                        "type": "string",
                        "description": "The health habit area, e.g. Physical Activity, Hydration"
                    },
                    "motivational_frame": {
                        "type": "string",
                        "description": "Why the participant wants this habit"
                    },
                    "preferred_time": {
                        "type": "string",
                        "description": "When the participant prefers their daily prompt"
                    },
                    "prompt_anchor": {
                        "type": "string",
                        "description": "An existing routine to anchor the habit to, e.g. after coffee"
                    },
                    "additional_notes": {
                        "type": "string",
                        "description": "Any other relevant context"
                    },
                    "ready_for_prompts": {
                        "type": "boolean",
                        "description": "Set true once the participant says they are ready to start"
                    },
                    "last_successful_prompt": {
                        "type": "string",
                        "description": "The prompt text the participant reported completing"
                    },
                    "last_barrier": {
                        "type": "string",
                        "description": "What got in the way of the habit, from feedback"
                    },
                    "last_tweak": {
                        "type": "string",
                        "description": "A modification the participant asked for"
                    },
                    "habit_completed": {
                        "type": "boolean",
                        "description": "Set true when the participant reports completing the habit; increments their success count"
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
        let parsed: SaveProfileArgs = match serde_json::from_value(args) {
            Ok(p) => p,
            Err(e) => return Ok(ToolOutcome::fail(format!("invalid arguments: {e}"))),
        };

        let mut updated = 0u32;
        let mut p = profile::load(&self.ctx.store, &invocation.participant_id).await?;

        let mut set = |field: &mut String, value: Option<String>, count: &mut u32| {
            if let Some(v) = value {
                let v = v.trim().to_string();
                if !v.is_empty() {
                    *field = v;
                    *count += 1;
                }
            }
        };
        let explicit_success_prompt = parsed.last_successful_prompt.is_some();
        set(&mut p.habit_domain, parsed.habit_domain, &mut updated);
        set(&mut p.motivational_frame, parsed.motivational_frame, &mut updated);
        set(&mut p.preferred_time, parsed.preferred_time, &mut updated);
        set(&mut p.prompt_anchor, parsed.prompt_anchor, &mut updated);
        set(&mut p.additional_notes, parsed.additional_notes, &mut updated);
        set(
            &mut p.last_successful_prompt,
            parsed.last_successful_prompt,
            &mut updated,
        );
        set(&mut p.last_barrier, parsed.last_barrier, &mut updated);
        set(&mut p.last_tweak, parsed.last_tweak, &mut updated);
        if let Some(ready) = parsed.ready_for_prompts {
            p.ready_for_prompts = ready;
            updated += 1;
        }
        if parsed.habit_completed == Some(true) {
            // Success never outruns the delivered count.
            if p.success_count < p.total_prompts {
                p.success_count += 1;
            }
            if !explicit_success_prompt && !p.last_prompt.is_empty() {
                p.last_successful_prompt = p.last_prompt.clone();
            }
            updated += 1;
        }

        if updated == 0 {
            return Ok(ToolOutcome::fail("no profile fields provided"));
        }

        profile::save(&self.ctx.store, &invocation.participant_id, &mut p).await?;
        Ok(ToolOutcome::ok("✅ saved"))
    }
}
