//! Daily schedule management tool.

use super::{Tool, ToolInvocation, ToolOutcome};
use crate::context::FlowContext;
use crate::schedule::{self, minute_of_day, parse_timezone, ScheduleKind, ScheduleRecord};
use crate::scheduling;
use async_trait::async_trait;
use chrono::Utc;
use promptpipe_core::{ids, message::ToolDescriptor, PromptPipeError};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

pub struct SchedulerTool {
    ctx: Arc<FlowContext>,
}

impl SchedulerTool {
    pub fn new(ctx: Arc<FlowContext>) -> Self {
        Self { ctx }
    }
}

#[derive(Debug, Deserialize, Default)]
struct SchedulerArgs {
    #[serde(default)]
    action: String,
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    fixed_time: String,
    #[serde(default)]
    random_start_time: String,
    #[serde(default)]
    random_end_time: String,
    #[serde(default)]
    timezone: String,
    #[serde(default)]
    schedule_id: String,
}

impl SchedulerArgs {
    /// Resolve the schedule kind, inferring it from the time fields when the
    /// explicit `type` is absent.
    fn resolve_kind(&self) -> Result<ScheduleKind, String> {
        match self.kind.to_lowercase().as_str() {
            "fixed" => return Ok(ScheduleKind::Fixed),
            "random" => return Ok(ScheduleKind::Random),
            "" => {}
            other => return Err(format!("unknown schedule type {other:?}")),
        }
        if !self.fixed_time.is_empty() {
            return Ok(ScheduleKind::Fixed);
        }
        if !self.random_start_time.is_empty() && !self.random_end_time.is_empty() {
            return Ok(ScheduleKind::Random);
        }
        Err("cannot determine schedule type: set type, fixed_time, or a random window".into())
    }
}

#[async_trait]
impl Tool for SchedulerTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "scheduler".into(),
            description: "Create, list, or delete daily prompt schedules for this participant. \
                          Times are 24h HH:MM in the participant's IANA timezone."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "action": {
                        "type": "string",
                        "enum": ["create", "list", "delete"],
                        "description": "What to do"
                    },
                    "type": {
                        "type": "string",
                        "enum": ["fixed", "random"],
                        "description": "fixed delivers at fixed_time daily; random picks a minute in [random_start_time, random_end_time) each day"
                    },
                    "fixed_time": {"type": "string", "description": "HH:MM, for fixed schedules"},
                    "random_start_time": {"type": "string", "description": "HH:MM window start, for random schedules"},
                    "random_end_time": {"type": "string", "description": "HH:MM window end, for random schedules"},
                    "timezone": {"type": "string", "description": "IANA timezone, e.g. America/Toronto"},
                    "schedule_id": {"type": "string", "description": "Schedule to delete"}
                },
                "required": ["action"]
            }),
        }
    }

    async fn execute(
        &self,
        invocation: &ToolInvocation,
        args: serde_json::Value,
    ) -> Result<ToolOutcome, PromptPipeError> {
        let args: SchedulerArgs = match serde_json::from_value(args) {
            Ok(a) => a,
            Err(e) => return Ok(ToolOutcome::fail(format!("bad scheduler arguments: {e}"))),
        };
        match args.action.as_str() {
            "create" => self.create(invocation, args).await,
            "list" => self.list(invocation).await,
            "delete" => self.delete(invocation, &args.schedule_id).await,
            other => Ok(ToolOutcome::fail(format!(
                "unknown action {other:?}, expected create, list, or delete"
            ))),
        }
    }
}

impl SchedulerTool {
    async fn create(
        &self,
        invocation: &ToolInvocation,
        args: SchedulerArgs,
    ) -> Result<ToolOutcome, PromptPipeError> {
        let kind = match args.resolve_kind() {
            Ok(k) => k,
            Err(reason) => return Ok(ToolOutcome::fail(reason)),
        };
        if let Err(e) = parse_timezone(&args.timezone) {
            return Ok(ToolOutcome::fail(e.to_string()));
        }
        match kind {
            ScheduleKind::Fixed => {
                if let Err(e) = minute_of_day(&args.fixed_time) {
                    return Ok(ToolOutcome::fail(e.to_string()));
                }
            }
            ScheduleKind::Random => {
                let start = match minute_of_day(&args.random_start_time) {
                    Ok(m) => m,
                    Err(e) => return Ok(ToolOutcome::fail(e.to_string())),
                };
                let end = match minute_of_day(&args.random_end_time) {
                    Ok(m) => m,
                    Err(e) => return Ok(ToolOutcome::fail(e.to_string())),
                };
                if end <= start {
                    return Ok(ToolOutcome::fail("random window end must be after start"));
                }
            }
        }

        let record = ScheduleRecord {
            id: ids::schedule_id(),
            kind,
            fixed_time: args.fixed_time,
            random_start_time: args.random_start_time,
            random_end_time: args.random_end_time,
            timezone: args.timezone,
            created_at: Utc::now().timestamp(),
        };

        // Arm before persisting so a bad record never reaches the store.
        scheduling::arm_created_schedule(&self.ctx, &invocation.participant_id, &record)?;

        let mut schedules = schedule::load(&self.ctx.store, &invocation.participant_id).await?;
        schedules.push(record.clone());
        schedule::save(&self.ctx.store, &invocation.participant_id, &schedules).await?;

        info!(
            participant = %invocation.participant_id,
            schedule = %record.id,
            "schedule created"
        );
        Ok(ToolOutcome::ok_visible(format!(
            "Daily prompt schedule created: {}",
            record.describe()
        )))
    }

    async fn list(&self, invocation: &ToolInvocation) -> Result<ToolOutcome, PromptPipeError> {
        let schedules = schedule::load(&self.ctx.store, &invocation.participant_id).await?;
        if schedules.is_empty() {
            return Ok(ToolOutcome::ok("no active schedules"));
        }
        let lines: Vec<String> = schedules.iter().map(|s| s.describe()).collect();
        Ok(ToolOutcome::ok(lines.join("\n")))
    }

    async fn delete(
        &self,
        invocation: &ToolInvocation,
        schedule_id: &str,
    ) -> Result<ToolOutcome, PromptPipeError> {
        if schedule_id.is_empty() {
            return Ok(ToolOutcome::fail("schedule_id is required for delete"));
        }
        let mut schedules = schedule::load(&self.ctx.store, &invocation.participant_id).await?;
        let before = schedules.len();
        schedules.retain(|s| s.id != schedule_id);
        if schedules.len() == before {
            return Ok(ToolOutcome::fail(format!("schedule {schedule_id} not found")));
        }
        schedule::save(&self.ctx.store, &invocation.participant_id, &schedules).await?;
        scheduling::disarm_schedule(&self.ctx, schedule_id);

        info!(
            participant = %invocation.participant_id,
            schedule = schedule_id,
            "schedule deleted"
        );
        Ok(ToolOutcome::ok(format!("schedule {schedule_id} deleted")))
    }
}
