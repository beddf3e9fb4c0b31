//! The conversation coordinator: one inbound message in, one reply out.
//!
//! Holds the participant lock for the whole turn. Before routing, it clears
//! the pending daily-prompt record (suppressing the reminder) and completes
//! any open feedback chain, since an inbound reply is the feedback.

use crate::context::FlowContext;
use crate::jobs;
use crate::modules;
use crate::state::{FeedbackState, SubState};
use crate::tool_loop;
use crate::tools::{
    GenerateHabitPromptTool, InitiateInterventionTool, SaveUserProfileTool, SchedulerTool,
    ToolInvocation, ToolRegistry, TransitionStateTool,
};
use crate::{history, profile};
use promptpipe_core::{message::ChatMessage, PromptPipeError};
use std::sync::Arc;
use tracing::{debug, info};

pub struct ConversationCoordinator {
    ctx: Arc<FlowContext>,
    registry: ToolRegistry,
}

impl ConversationCoordinator {
    pub fn new(ctx: Arc<FlowContext>) -> Self {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(SaveUserProfileTool::new(ctx.clone())));
        registry.register(Arc::new(TransitionStateTool::new(ctx.clone())));
        registry.register(Arc::new(SchedulerTool::new(ctx.clone())));
        registry.register(Arc::new(GenerateHabitPromptTool::new(ctx.clone())));
        registry.register(Arc::new(InitiateInterventionTool::new(ctx.clone())));
        Self { ctx, registry }
    }

    /// Process one inbound message and return the reply that was sent.
    pub async fn process_response(
        &self,
        participant_id: &str,
        phone: &str,
        text: &str,
    ) -> Result<String, PromptPipeError> {
        let _guard = self.ctx.locks.acquire(participant_id).await;

        clear_pending_reminder(&self.ctx, participant_id).await?;
        complete_feedback_chain(&self.ctx, participant_id).await?;

        let sub_state = match self.ctx.state.sub_state(participant_id).await? {
            Some(s) => s,
            None => {
                self.ctx
                    .state
                    .set_sub_state(participant_id, SubState::Intake)
                    .await?;
                SubState::Intake
            }
        };
        let module = modules::module_for(sub_state, &self.ctx);
        debug!(
            participant = participant_id,
            state = sub_state.as_str(),
            "routing inbound message"
        );
        let _ = self.ctx.messenger.send_typing(phone).await;

        let mut entries = history::load(&self.ctx.store, participant_id).await?;
        entries.push(history::HistoryEntry::now("user", text));

        let p = profile::load(&self.ctx.store, participant_id).await?;
        let mut messages = vec![
            ChatMessage::system(module.system_prompt.clone()),
            ChatMessage::system(p.status_message()),
        ];
        if sub_state == SubState::Feedback {
            if let Some(last) = self.ctx.state.last_habit_prompt(participant_id).await? {
                messages.push(ChatMessage::system(format!("Last prompt sent: {last}")));
            }
        }
        let recent = history::llm_context(&entries, self.ctx.flow.llm_history_context_max);
        for e in recent {
            match e.role.as_str() {
                "user" => messages.push(ChatMessage::user(e.content.clone())),
                _ => messages.push(ChatMessage::assistant(e.content.clone())),
            }
        }

        let invocation = ToolInvocation {
            participant_id: participant_id.to_string(),
            phone: phone.to_string(),
            debug: tracing::enabled!(tracing::Level::DEBUG),
        };
        let tools = self.registry.subset(module.tool_names);
        let result = tool_loop::run(&self.ctx, &tools, &invocation, messages).await?;

        let reply = result
            .reply
            .unwrap_or_else(|| module.fallback.to_string());
        self.ctx.messenger.send_message(phone, &reply).await?;

        for note in result.history_notes {
            entries.push(history::HistoryEntry::now("assistant", note));
        }
        entries.push(history::HistoryEntry::now("assistant", &reply));
        history::save(
            &self.ctx.store,
            participant_id,
            entries,
            self.ctx.flow.conversation_history_max,
        )
        .await?;

        Ok(reply)
    }
}

/// The first inbound reply after a scheduled nudge suppresses the reminder.
pub(crate) async fn clear_pending_reminder(
    ctx: &FlowContext,
    participant_id: &str,
) -> Result<(), PromptPipeError> {
    let Some(pending) = ctx.state.daily_prompt_pending(participant_id).await? else {
        return Ok(());
    };
    ctx.store
        .cancel_jobs_by_dedupe_key(
            jobs::kinds::DAILY_PROMPT_REMINDER,
            &pending.reminder_dedupe_key(participant_id),
        )
        .await?;
    ctx.state.clear_daily_prompt_pending(participant_id).await?;
    info!(participant = participant_id, "reminder suppressed by reply");
    Ok(())
}

/// An inbound reply while the feedback chain is open counts as feedback;
/// cancel the remaining nudges and mark the chain completed.
pub(crate) async fn complete_feedback_chain(
    ctx: &FlowContext,
    participant_id: &str,
) -> Result<(), PromptPipeError> {
    let state = ctx.state.feedback_state(participant_id).await?;
    let open = matches!(
        state,
        FeedbackState::WaitingInitial
            | FeedbackState::WaitingFollowup
            | FeedbackState::FollowupSent
    );
    if !open {
        return Ok(());
    }
    if let Some(ts) = ctx.state.feedback_prompt_ts(participant_id).await? {
        ctx.store
            .cancel_jobs_by_dedupe_key(
                jobs::kinds::FEEDBACK_TIMEOUT,
                &jobs::fb_init_key(participant_id, ts),
            )
            .await?;
        ctx.store
            .cancel_jobs_by_dedupe_key(
                jobs::kinds::FEEDBACK_FOLLOWUP,
                &jobs::fb_follow_key(participant_id, ts),
            )
            .await?;
        ctx.store
            .cancel_jobs_by_dedupe_key(
                jobs::kinds::AUTO_FEEDBACK_ENFORCEMENT,
                &jobs::fb_enforce_key(participant_id, ts),
            )
            .await?;
    }
    ctx.state
        .set_feedback_state(participant_id, FeedbackState::Completed)
        .await?;
    Ok(())
}
