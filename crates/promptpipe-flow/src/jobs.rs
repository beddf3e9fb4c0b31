//! Durable job kinds, payloads, and handlers.
//!
//! Every handler is idempotent: it checks the relevant pending-state record
//! before acting, so a re-run after a crash or a stale-claim requeue never
//! duplicates a user-visible message.

use crate::context::FlowContext;
use crate::state::{FeedbackState, SubState};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use promptpipe_core::PromptPipeError;
use promptpipe_store::{Job, JobHandler, JobRunner};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

pub mod kinds {
    pub const STATE_TRANSITION: &str = "state_transition";
    pub const FEEDBACK_TIMEOUT: &str = "feedback_timeout";
    pub const FEEDBACK_FOLLOWUP: &str = "feedback_followup";
    pub const DAILY_PROMPT_REMINDER: &str = "daily_prompt_reminder";
    pub const AUTO_FEEDBACK_ENFORCEMENT: &str = "auto_feedback_enforcement";
}

pub fn fb_init_key(participant_id: &str, prompt_ts: i64) -> String {
    format!("fb_init:{participant_id}:{prompt_ts}")
}

pub fn fb_follow_key(participant_id: &str, prompt_ts: i64) -> String {
    format!("fb_follow:{participant_id}:{prompt_ts}")
}

pub fn fb_enforce_key(participant_id: &str, prompt_ts: i64) -> String {
    format!("fb_enforce:{participant_id}:{prompt_ts}")
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FeedbackPayload {
    pub participant_id: String,
    pub prompt_ts: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReminderPayload {
    pub participant_id: String,
    pub sent_at: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StateTransitionPayload {
    pub participant_id: String,
    pub target_state: String,
    #[serde(default)]
    pub reason: String,
}

const CHECKIN_MESSAGE: &str = "Just checking in! How did your one-minute habit go?";
const FOLLOWUP_MESSAGE: &str = "No pressure at all. If you got to your habit today, \
I'd love to hear how it went. If not, that's useful to know too.";
const REMINDER_MESSAGE: &str = "Haven't heard back from you today. Still up for it? \
Even one minute counts.";

async fn participant_phone(
    ctx: &FlowContext,
    participant_id: &str,
) -> Result<String, PromptPipeError> {
    ctx.store
        .get_participant(participant_id)
        .await?
        .map(|p| p.phone)
        .ok_or_else(|| {
            PromptPipeError::Validation(format!("unknown participant {participant_id}"))
        })
}

/// Deferred sub-state transition.
pub struct StateTransitionHandler {
    ctx: Arc<FlowContext>,
}

#[async_trait]
impl JobHandler for StateTransitionHandler {
    async fn handle(&self, job: &Job) -> Result<(), PromptPipeError> {
        let payload: StateTransitionPayload = serde_json::from_str(&job.payload)?;
        let _guard = self.ctx.locks.acquire(&payload.participant_id).await;

        let Some(target) = SubState::parse(&payload.target_state) else {
            return Err(PromptPipeError::Validation(format!(
                "bad target state {:?}",
                payload.target_state
            )));
        };
        self.ctx
            .state
            .set_sub_state(&payload.participant_id, target)
            .await?;
        info!(
            participant = %payload.participant_id,
            target = target.as_str(),
            reason = %payload.reason,
            "deferred sub-state transition"
        );
        Ok(())
    }
}

/// First feedback nudge if the participant has not replied.
pub struct FeedbackTimeoutHandler {
    ctx: Arc<FlowContext>,
}

#[async_trait]
impl JobHandler for FeedbackTimeoutHandler {
    async fn handle(&self, job: &Job) -> Result<(), PromptPipeError> {
        let payload: FeedbackPayload = serde_json::from_str(&job.payload)?;
        let _guard = self.ctx.locks.acquire(&payload.participant_id).await;

        let state = self.ctx.state.feedback_state(&payload.participant_id).await?;
        let ts = self
            .ctx
            .state
            .feedback_prompt_ts(&payload.participant_id)
            .await?;
        if state != FeedbackState::WaitingInitial || ts != Some(payload.prompt_ts) {
            debug!(
                participant = %payload.participant_id,
                state = state.as_str(),
                "feedback timeout superseded, skipping"
            );
            return Ok(());
        }

        let phone = participant_phone(&self.ctx, &payload.participant_id).await?;
        self.ctx.messenger.send_message(&phone, CHECKIN_MESSAGE).await?;
        self.ctx
            .state
            .set_feedback_state(&payload.participant_id, FeedbackState::WaitingFollowup)
            .await?;

        let delay = self.ctx.flow.feedback_followup_delay()?;
        self.ctx
            .store
            .enqueue_job(
                kinds::FEEDBACK_FOLLOWUP,
                Utc::now() + Duration::from_std(delay).unwrap_or_default(),
                &job.payload,
                Some(&fb_follow_key(&payload.participant_id, payload.prompt_ts)),
            )
            .await?;
        Ok(())
    }
}

/// Second and final feedback nudge.
pub struct FeedbackFollowupHandler {
    ctx: Arc<FlowContext>,
}

#[async_trait]
impl JobHandler for FeedbackFollowupHandler {
    async fn handle(&self, job: &Job) -> Result<(), PromptPipeError> {
        let payload: FeedbackPayload = serde_json::from_str(&job.payload)?;
        let _guard = self.ctx.locks.acquire(&payload.participant_id).await;

        let state = self.ctx.state.feedback_state(&payload.participant_id).await?;
        let ts = self
            .ctx
            .state
            .feedback_prompt_ts(&payload.participant_id)
            .await?;
        if state != FeedbackState::WaitingFollowup || ts != Some(payload.prompt_ts) {
            return Ok(());
        }

        let phone = participant_phone(&self.ctx, &payload.participant_id).await?;
        self.ctx.messenger.send_message(&phone, FOLLOWUP_MESSAGE).await?;
        self.ctx
            .state
            .set_feedback_state(&payload.participant_id, FeedbackState::FollowupSent)
            .await?;
        Ok(())
    }
}

/// "Haven't heard back" reminder after a scheduled nudge.
pub struct DailyPromptReminderHandler {
    ctx: Arc<FlowContext>,
}

#[async_trait]
impl JobHandler for DailyPromptReminderHandler {
    async fn handle(&self, job: &Job) -> Result<(), PromptPipeError> {
        let payload: ReminderPayload = serde_json::from_str(&job.payload)?;
        let _guard = self.ctx.locks.acquire(&payload.participant_id).await;

        let pending = self
            .ctx
            .state
            .daily_prompt_pending(&payload.participant_id)
            .await?;
        let Some(pending) = pending else {
            debug!(
                participant = %payload.participant_id,
                "reminder skipped, participant already replied"
            );
            return Ok(());
        };
        if pending.sent_at != payload.sent_at {
            return Ok(());
        }

        self.ctx.messenger.send_message(&pending.to, REMINDER_MESSAGE).await?;
        self.ctx
            .state
            .clear_daily_prompt_pending(&payload.participant_id)
            .await?;
        Ok(())
    }
}

/// Force the conversation back to FEEDBACK when no feedback ever arrived.
pub struct AutoFeedbackEnforcementHandler {
    ctx: Arc<FlowContext>,
}

#[async_trait]
impl JobHandler for AutoFeedbackEnforcementHandler {
    async fn handle(&self, job: &Job) -> Result<(), PromptPipeError> {
        let payload: FeedbackPayload = serde_json::from_str(&job.payload)?;
        let _guard = self.ctx.locks.acquire(&payload.participant_id).await;

        let state = self.ctx.state.feedback_state(&payload.participant_id).await?;
        let ts = self
            .ctx
            .state
            .feedback_prompt_ts(&payload.participant_id)
            .await?;
        if state == FeedbackState::Completed || ts != Some(payload.prompt_ts) {
            return Ok(());
        }

        let transition = serde_json::to_string(&StateTransitionPayload {
            participant_id: payload.participant_id.clone(),
            target_state: SubState::Feedback.as_str().to_string(),
            reason: "auto feedback enforcement".to_string(),
        })?;
        self.ctx
            .store
            .enqueue_job(
                kinds::STATE_TRANSITION,
                Utc::now(),
                &transition,
                Some(&format!(
                    "fb_enforce_t:{}:{}",
                    payload.participant_id, payload.prompt_ts
                )),
            )
            .await?;
        Ok(())
    }
}

/// Register all flow job handlers on a runner.
pub fn register_handlers(runner: &mut JobRunner, ctx: Arc<FlowContext>) {
    runner.register(
        kinds::STATE_TRANSITION,
        Arc::new(StateTransitionHandler { ctx: ctx.clone() }),
    );
    runner.register(
        kinds::FEEDBACK_TIMEOUT,
        Arc::new(FeedbackTimeoutHandler { ctx: ctx.clone() }),
    );
    runner.register(
        kinds::FEEDBACK_FOLLOWUP,
        Arc::new(FeedbackFollowupHandler { ctx: ctx.clone() }),
    );
    runner.register(
        kinds::DAILY_PROMPT_REMINDER,
        Arc::new(DailyPromptReminderHandler { ctx: ctx.clone() }),
    );
    runner.register(
        kinds::AUTO_FEEDBACK_ENFORCEMENT,
        Arc::new(AutoFeedbackEnforcementHandler { ctx }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::DailyPromptPending;
    use crate::test_support::{enroll, test_rig};

    fn job(kind: &str, payload: serde_json::Value) -> Job {
        Job {
            id: 1,
            kind: kind.into(),
            run_at: String::new(),
            payload: payload.to_string(),
            dedupe_key: None,
            status: "claimed".into(),
            attempt: 0,
            claimed_until: None,
            last_error: None,
        }
    }

    #[tokio::test]
    async fn test_feedback_timeout_sends_checkin_and_chains_followup() {
        let rig = test_rig().await;
        let pid = enroll(&rig.ctx, "+15551234567").await;
        rig.ctx
            .state
            .set_feedback_state(&pid, FeedbackState::WaitingInitial)
            .await
            .unwrap();
        rig.ctx.state.set_feedback_prompt_ts(&pid, 42).await.unwrap();

        let handler = FeedbackTimeoutHandler { ctx: rig.ctx.clone() };
        handler
            .handle(&job(
                kinds::FEEDBACK_TIMEOUT,
                serde_json::json!({"participant_id": pid, "prompt_ts": 42}),
            ))
            .await
            .unwrap();

        assert!(rig.messenger.sent_bodies()[0].contains("checking in"));
        assert_eq!(
            rig.ctx.state.feedback_state(&pid).await.unwrap(),
            FeedbackState::WaitingFollowup
        );

        // Follow-up job queued.
        let due = rig
            .ctx
            .store
            .claim_due_jobs(
                Utc::now() + Duration::days(1),
                10,
                std::time::Duration::from_secs(60),
            )
            .await
            .unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].kind, kinds::FEEDBACK_FOLLOWUP);
    }

    #[tokio::test]
    async fn test_feedback_timeout_noop_when_completed() {
        let rig = test_rig().await;
        let pid = enroll(&rig.ctx, "+15551234567").await;
        rig.ctx
            .state
            .set_feedback_state(&pid, FeedbackState::Completed)
            .await
            .unwrap();
        rig.ctx.state.set_feedback_prompt_ts(&pid, 42).await.unwrap();

        let handler = FeedbackTimeoutHandler { ctx: rig.ctx.clone() };
        handler
            .handle(&job(
                kinds::FEEDBACK_TIMEOUT,
                serde_json::json!({"participant_id": pid, "prompt_ts": 42}),
            ))
            .await
            .unwrap();

        assert_eq!(rig.messenger.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_feedback_timeout_noop_for_stale_prompt_ts() {
        let rig = test_rig().await;
        let pid = enroll(&rig.ctx, "+15551234567").await;
        rig.ctx
            .state
            .set_feedback_state(&pid, FeedbackState::WaitingInitial)
            .await
            .unwrap();
        rig.ctx.state.set_feedback_prompt_ts(&pid, 99).await.unwrap();

        let handler = FeedbackTimeoutHandler { ctx: rig.ctx.clone() };
        handler
            .handle(&job(
                kinds::FEEDBACK_TIMEOUT,
                serde_json::json!({"participant_id": pid, "prompt_ts": 42}),
            ))
            .await
            .unwrap();
        assert_eq!(rig.messenger.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_followup_sends_once_then_marks_sent() {
        let rig = test_rig().await;
        let pid = enroll(&rig.ctx, "+15551234567").await;
        rig.ctx
            .state
            .set_feedback_state(&pid, FeedbackState::WaitingFollowup)
            .await
            .unwrap();
        rig.ctx.state.set_feedback_prompt_ts(&pid, 42).await.unwrap();

        let handler = FeedbackFollowupHandler { ctx: rig.ctx.clone() };
        let j = job(
            kinds::FEEDBACK_FOLLOWUP,
            serde_json::json!({"participant_id": pid, "prompt_ts": 42}),
        );
        handler.handle(&j).await.unwrap();
        assert_eq!(rig.messenger.sent_count(), 1);
        assert_eq!(
            rig.ctx.state.feedback_state(&pid).await.unwrap(),
            FeedbackState::FollowupSent
        );

        // Re-running is a no-op.
        handler.handle(&j).await.unwrap();
        assert_eq!(rig.messenger.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_reminder_fires_when_pending() {
        let rig = test_rig().await;
        let pid = enroll(&rig.ctx, "+15551234567").await;
        rig.ctx
            .state
            .set_daily_prompt_pending(
                &pid,
                &DailyPromptPending {
                    sent_at: 42,
                    to: "+15551234567".into(),
                },
            )
            .await
            .unwrap();

        let handler = DailyPromptReminderHandler { ctx: rig.ctx.clone() };
        handler
            .handle(&job(
                kinds::DAILY_PROMPT_REMINDER,
                serde_json::json!({"participant_id": pid, "sent_at": 42}),
            ))
            .await
            .unwrap();

        let bodies = rig.messenger.sent_bodies();
        assert_eq!(bodies.len(), 1);
        assert!(bodies[0].to_lowercase().contains("haven't heard back"));
        assert!(rig.ctx.state.daily_prompt_pending(&pid).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reminder_noop_when_pending_cleared() {
        let rig = test_rig().await;
        let pid = enroll(&rig.ctx, "+15551234567").await;

        let handler = DailyPromptReminderHandler { ctx: rig.ctx.clone() };
        handler
            .handle(&job(
                kinds::DAILY_PROMPT_REMINDER,
                serde_json::json!({"participant_id": pid, "sent_at": 42}),
            ))
            .await
            .unwrap();
        assert_eq!(rig.messenger.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_reminder_noop_for_newer_pending() {
        let rig = test_rig().await;
        let pid = enroll(&rig.ctx, "+15551234567").await;
        rig.ctx
            .state
            .set_daily_prompt_pending(
                &pid,
                &DailyPromptPending {
                    sent_at: 100,
                    to: "+15551234567".into(),
                },
            )
            .await
            .unwrap();

        let handler = DailyPromptReminderHandler { ctx: rig.ctx.clone() };
        handler
            .handle(&job(
                kinds::DAILY_PROMPT_REMINDER,
                serde_json::json!({"participant_id": pid, "sent_at": 42}),
            ))
            .await
            .unwrap();
        assert_eq!(rig.messenger.sent_count(), 0);
        // Newer pending record untouched.
        assert!(rig.ctx.state.daily_prompt_pending(&pid).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_state_transition_handler() {
        let rig = test_rig().await;
        let pid = enroll(&rig.ctx, "+15551234567").await;

        let handler = StateTransitionHandler { ctx: rig.ctx.clone() };
        handler
            .handle(&job(
                kinds::STATE_TRANSITION,
                serde_json::json!({
                    "participant_id": pid,
                    "target_state": "FEEDBACK",
                    "reason": "test"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(
            rig.ctx.state.sub_state(&pid).await.unwrap(),
            Some(SubState::Feedback)
        );
    }

    #[tokio::test]
    async fn test_enforcement_enqueues_transition_when_no_feedback() {
        let rig = test_rig().await;
        let pid = enroll(&rig.ctx, "+15551234567").await;
        rig.ctx
            .state
            .set_feedback_state(&pid, FeedbackState::FollowupSent)
            .await
            .unwrap();
        rig.ctx.state.set_feedback_prompt_ts(&pid, 42).await.unwrap();

        let handler = AutoFeedbackEnforcementHandler { ctx: rig.ctx.clone() };
        handler
            .handle(&job(
                kinds::AUTO_FEEDBACK_ENFORCEMENT,
                serde_json::json!({"participant_id": pid, "prompt_ts": 42}),
            ))
            .await
            .unwrap();

        let due = rig
            .ctx
            .store
            .claim_due_jobs(Utc::now(), 10, std::time::Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].kind, kinds::STATE_TRANSITION);
    }

    #[tokio::test]
    async fn test_enforcement_noop_when_completed() {
        let rig = test_rig().await;
        let pid = enroll(&rig.ctx, "+15551234567").await;
        rig.ctx
            .state
            .set_feedback_state(&pid, FeedbackState::Completed)
            .await
            .unwrap();
        rig.ctx.state.set_feedback_prompt_ts(&pid, 42).await.unwrap();

        let handler = AutoFeedbackEnforcementHandler { ctx: rig.ctx.clone() };
        handler
            .handle(&job(
                kinds::AUTO_FEEDBACK_ENFORCEMENT,
                serde_json::json!({"participant_id": pid, "prompt_ts": 42}),
            ))
            .await
            .unwrap();

        let due = rig
            .ctx
            .store
            .claim_due_jobs(Utc::now(), 10, std::time::Duration::from_secs(60))
            .await
            .unwrap();
        assert!(due.is_empty());
    }
}
