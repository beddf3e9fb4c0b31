//! Habit prompt synthesis and scheduled delivery.
//!
//! Used by the `generate_habit_prompt` tool (immediate mode) and by the
//! scheduler's delivery timers. Scheduled delivery also arms the reminder
//! job and the feedback timeout chain.

use crate::context::FlowContext;
use crate::jobs;
use crate::state::{DailyPromptPending, FeedbackState};
use crate::{history, profile};
use chrono::{Duration, Utc};
use promptpipe_core::{message::ChatMessage, PromptPipeError};
use std::sync::Arc;
use tracing::info;

const PROMPT_SYSTEM: &str = "You write one-minute health habit nudges. Produce a single short, \
friendly message (2-3 sentences) proposing one concrete activity that takes about one minute. \
Tie it to the participant's anchor routine and motivational frame. No preamble, no sign-off.";

/// Synthesize the next habit nudge from profile and recent history.
pub async fn generate_prompt_text(
    ctx: &FlowContext,
    participant_id: &str,
) -> Result<String, PromptPipeError> {
    let p = profile::load(&ctx.store, participant_id).await?;
    let entries = history::load(&ctx.store, participant_id).await?;
    let recent = history::llm_context(&entries, ctx.flow.llm_history_context_max);

    let mut messages = vec![
        ChatMessage::system(PROMPT_SYSTEM),
        ChatMessage::system(p.status_message()),
    ];
    for e in recent {
        match e.role.as_str() {
            "user" => messages.push(ChatMessage::user(e.content.clone())),
            _ => messages.push(ChatMessage::assistant(e.content.clone())),
        }
    }
    messages.push(ChatMessage::user(
        "Generate today's one-minute habit prompt.",
    ));

    let text = ctx.llm.generate_with_messages(&messages).await?;
    if text.trim().is_empty() {
        return Err(PromptPipeError::Llm("empty habit prompt".into()));
    }
    Ok(text)
}

/// Record a delivered nudge: last-prompt state, profile counters, history.
pub async fn record_delivery(
    ctx: &FlowContext,
    participant_id: &str,
    text: &str,
    history_note: &str,
) -> Result<(), PromptPipeError> {
    ctx.state.set_last_habit_prompt(participant_id, text).await?;

    let mut p = profile::load(&ctx.store, participant_id).await?;
    p.total_prompts += 1;
    p.last_prompt = text.to_string();
    profile::save(&ctx.store, participant_id, &mut p).await?;

    let mut entries = history::load(&ctx.store, participant_id).await?;
    entries.push(history::HistoryEntry::now("assistant", history_note));
    history::save(
        &ctx.store,
        participant_id,
        entries,
        ctx.flow.conversation_history_max,
    )
    .await
}

/// Arm the feedback timeout chain for a prompt sent at `prompt_ts`.
pub async fn begin_feedback_chain(
    ctx: &FlowContext,
    participant_id: &str,
    prompt_ts: i64,
) -> Result<(), PromptPipeError> {
    ctx.state
        .set_feedback_state(participant_id, FeedbackState::WaitingInitial)
        .await?;
    ctx.state
        .set_feedback_prompt_ts(participant_id, prompt_ts)
        .await?;

    let initial = ctx.flow.feedback_initial_timeout()?;
    let payload = serde_json::to_string(&jobs::FeedbackPayload {
        participant_id: participant_id.to_string(),
        prompt_ts,
    })?;
    ctx.store
        .enqueue_job(
            jobs::kinds::FEEDBACK_TIMEOUT,
            Utc::now() + Duration::from_std(initial).unwrap_or_default(),
            &payload,
            Some(&jobs::fb_init_key(participant_id, prompt_ts)),
        )
        .await?;

    if ctx.flow.auto_feedback_enforcement_enabled {
        let threshold = ctx.flow.feedback_followup_delay()?;
        ctx.store
            .enqueue_job(
                jobs::kinds::AUTO_FEEDBACK_ENFORCEMENT,
                Utc::now()
                    + Duration::from_std(initial + threshold).unwrap_or_default(),
                &payload,
                Some(&jobs::fb_enforce_key(participant_id, prompt_ts)),
            )
            .await?;
    }
    Ok(())
}

/// Deliver a scheduled daily prompt: synthesize, send, persist pending
/// state, arm the reminder job and the feedback chain.
pub async fn deliver_scheduled_prompt(
    ctx: &Arc<FlowContext>,
    participant_id: &str,
) -> Result<(), PromptPipeError> {
    let _guard = ctx.locks.acquire(participant_id).await;
    deliver_daily_prompt(ctx, participant_id).await.map(|_| ())
}

/// Delivery body. The caller holds the participant lock.
pub async fn deliver_daily_prompt(
    ctx: &FlowContext,
    participant_id: &str,
) -> Result<String, PromptPipeError> {
    let participant = ctx
        .store
        .get_participant(participant_id)
        .await?
        .ok_or_else(|| {
            PromptPipeError::Validation(format!("unknown participant {participant_id}"))
        })?;

    let text = generate_prompt_text(ctx, participant_id).await?;
    ctx.messenger.send_message(&participant.phone, &text).await?;
    info!(participant = participant_id, "scheduled habit prompt sent");

    record_delivery(ctx, participant_id, &text, &text).await?;

    let pending = DailyPromptPending {
        sent_at: Utc::now().timestamp(),
        to: participant.phone.clone(),
    };
    ctx.state
        .set_daily_prompt_pending(participant_id, &pending)
        .await?;

    let reminder_delay = ctx.flow.daily_prompt_reminder_delay()?;
    let payload = serde_json::to_string(&jobs::ReminderPayload {
        participant_id: participant_id.to_string(),
        sent_at: pending.sent_at,
    })?;
    ctx.store
        .enqueue_job(
            jobs::kinds::DAILY_PROMPT_REMINDER,
            Utc::now() + Duration::from_std(reminder_delay).unwrap_or_default(),
            &payload,
            Some(&pending.reminder_dedupe_key(participant_id)),
        )
        .await?;

    begin_feedback_chain(ctx, participant_id, pending.sent_at).await?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{enroll, test_rig};
    use promptpipe_store::JobStatus;

    #[tokio::test]
    async fn test_deliver_sends_and_arms_reminder_and_feedback() {
        let rig = test_rig().await;
        let pid = enroll(&rig.ctx, "+15551234567").await;
        rig.llm.push_plain("After your coffee, stretch for one minute.");

        deliver_scheduled_prompt(&rig.ctx, &pid).await.unwrap();

        let bodies = rig.messenger.sent_bodies();
        assert_eq!(bodies.len(), 1);
        assert!(bodies[0].contains("one minute"));

        let pending = rig.ctx.state.daily_prompt_pending(&pid).await.unwrap().unwrap();
        assert_eq!(pending.to, "+15551234567");

        assert_eq!(
            rig.ctx.state.feedback_state(&pid).await.unwrap(),
            FeedbackState::WaitingInitial
        );
        assert_eq!(
            rig.ctx.state.last_habit_prompt(&pid).await.unwrap().as_deref(),
            Some("After your coffee, stretch for one minute.")
        );

        let p = profile::load(&rig.ctx.store, &pid).await.unwrap();
        assert_eq!(p.total_prompts, 1);

        // One reminder job and one feedback timeout job; far future, unclaimed.
        let due = rig
            .ctx
            .store
            .claim_due_jobs(
                Utc::now() + Duration::hours(12),
                10,
                std::time::Duration::from_secs(300),
            )
            .await
            .unwrap();
        let kinds: Vec<&str> = due.iter().map(|j| j.kind.as_str()).collect();
        assert!(kinds.contains(&jobs::kinds::DAILY_PROMPT_REMINDER));
        assert!(kinds.contains(&jobs::kinds::FEEDBACK_TIMEOUT));
        assert_eq!(due.len(), 2);
        for j in &due {
            assert_eq!(j.status, JobStatus::CLAIMED);
        }
    }

    #[tokio::test]
    async fn test_deliver_unknown_participant_fails() {
        let rig = test_rig().await;
        let err = deliver_scheduled_prompt(&rig.ctx, "p_missing").await;
        assert!(err.is_err());
        assert_eq!(rig.messenger.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_enforcement_job_only_when_enabled() {
        let rig = test_rig().await;
        let pid = enroll(&rig.ctx, "+15551234567").await;
        begin_feedback_chain(&rig.ctx, &pid, 1700000000).await.unwrap();

        let due = rig
            .ctx
            .store
            .claim_due_jobs(
                Utc::now() + Duration::days(2),
                10,
                std::time::Duration::from_secs(300),
            )
            .await
            .unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].kind, jobs::kinds::FEEDBACK_TIMEOUT);
    }

    #[tokio::test]
    async fn test_enforcement_job_when_enabled() {
        let mut flow = promptpipe_core::config::FlowConfig::default();
        flow.auto_feedback_enforcement_enabled = true;
        let rig = crate::test_support::test_rig_with(flow).await;
        let pid = enroll(&rig.ctx, "+15551234567").await;
        begin_feedback_chain(&rig.ctx, &pid, 1700000000).await.unwrap();

        let due = rig
            .ctx
            .store
            .claim_due_jobs(
                Utc::now() + Duration::days(2),
                10,
                std::time::Duration::from_secs(300),
            )
            .await
            .unwrap();
        let kinds: Vec<&str> = due.iter().map(|j| j.kind.as_str()).collect();
        assert!(kinds.contains(&jobs::kinds::AUTO_FEEDBACK_ENFORCEMENT));
    }
}
