//! Scripted coordinator for deployments without LLM access
//! (`COORDINATOR_CHOICE=static`).
//!
//! Walks the intake questions in a fixed order, builds the prompt from a
//! template, and acknowledges feedback with canned replies. Shares the
//! reminder-suppression and feedback-chain bookkeeping with the LLM path.

use crate::context::FlowContext;
use crate::coordinator::{clear_pending_reminder, complete_feedback_chain};
use crate::delivery;
use crate::state::{FeedbackState, FLOW_TYPE};
use crate::{history, profile};
use promptpipe_core::PromptPipeError;
use std::sync::Arc;
use tracing::info;

/// State key tracking which scripted question is outstanding.
const PENDING_FIELD_KEY: &str = "static_pending_field";

const FIELDS: &[(&str, &str)] = &[
    (
        "habit_domain",
        "Welcome! What area would you like to build a one-minute habit in? \
         For example: Physical Activity, Hydration, Sleep, or Mindfulness.",
    ),
    (
        "motivational_frame",
        "Got it. And why does this matter to you right now?",
    ),
    (
        "preferred_time",
        "When in the day would a prompt suit you best?",
    ),
    (
        "prompt_anchor",
        "Last one: what existing daily routine could we attach this to? \
         For example: after my morning coffee.",
    ),
];

const READY_QUESTION: &str =
    "That's everything I need. Ready for your first one-minute prompt? Reply yes when you are.";
const FEEDBACK_QUESTION: &str = "How did it go? Reply with a few words, whatever happened.";
const FEEDBACK_THANKS: &str =
    "Thanks for letting me know. I'll keep that in mind for the next one.";

pub struct StaticCoordinator {
    ctx: Arc<FlowContext>,
}

impl StaticCoordinator {
    pub fn new(ctx: Arc<FlowContext>) -> Self {
        Self { ctx }
    }

    pub async fn process_response(
        &self,
        participant_id: &str,
        phone: &str,
        text: &str,
    ) -> Result<String, PromptPipeError> {
        let _guard = self.ctx.locks.acquire(participant_id).await;

        clear_pending_reminder(&self.ctx, participant_id).await?;
        let feedback_was_open = matches!(
            self.ctx.state.feedback_state(participant_id).await?,
            FeedbackState::WaitingInitial
                | FeedbackState::WaitingFollowup
                | FeedbackState::FollowupSent
        );
        complete_feedback_chain(&self.ctx, participant_id).await?;

        let reply = self
            .next_reply(participant_id, text, feedback_was_open)
            .await?;
        self.ctx.messenger.send_message(phone, &reply).await?;

        let mut entries = history::load(&self.ctx.store, participant_id).await?;
        entries.push(history::HistoryEntry::now("user", text));
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

    async fn next_reply(
        &self,
        participant_id: &str,
        text: &str,
        feedback_was_open: bool,
    ) -> Result<String, PromptPipeError> {
        let mut p = profile::load(&self.ctx.store, participant_id).await?;
        let answer = text.trim();

        if feedback_was_open {
            if !answer.is_empty() {
                p.last_barrier = answer.to_string();
                profile::save(&self.ctx.store, participant_id, &mut p).await?;
            }
            return Ok(FEEDBACK_THANKS.to_string());
        }

        // Store the answer to the outstanding question, if any.
        let pending = self
            .ctx
            .store
            .get_state(participant_id, FLOW_TYPE, PENDING_FIELD_KEY)
            .await?;
        if let Some(field) = pending.as_deref() {
            if !answer.is_empty() {
                match field {
                    "habit_domain" => p.habit_domain = answer.to_string(),
                    "motivational_frame" => p.motivational_frame = answer.to_string(),
                    "preferred_time" => p.preferred_time = answer.to_string(),
                    "prompt_anchor" => p.prompt_anchor = answer.to_string(),
                    "ready" if is_affirmative(answer) => p.ready_for_prompts = true,
                    _ => {}
                }
                profile::save(&self.ctx.store, participant_id, &mut p).await?;
            }
        }

        // Ask the next missing question.
        for (field, question) in FIELDS {
            let value = match *field {
                "habit_domain" => &p.habit_domain,
                "motivational_frame" => &p.motivational_frame,
                "preferred_time" => &p.preferred_time,
                _ => &p.prompt_anchor,
            };
            if value.is_empty() {
                self.ctx
                    .store
                    .set_state(participant_id, FLOW_TYPE, PENDING_FIELD_KEY, field)
                    .await?;
                return Ok((*question).to_string());
            }
        }

        if !p.ready_for_prompts {
            self.ctx
                .store
                .set_state(participant_id, FLOW_TYPE, PENDING_FIELD_KEY, "ready")
                .await?;
            return Ok(READY_QUESTION.to_string());
        }

        // Profile complete and ready: deliver a templated prompt and open the
        // feedback chain.
        self.ctx
            .store
            .delete_state(participant_id, FLOW_TYPE, PENDING_FIELD_KEY)
            .await?;
        let prompt = format!(
            "Right {}: take one minute for {}. Remember why: {}.",
            p.prompt_anchor.to_lowercase(),
            p.habit_domain.to_lowercase(),
            p.motivational_frame
        );
        delivery::record_delivery(&self.ctx, participant_id, &prompt, &prompt).await?;
        delivery::begin_feedback_chain(
            &self.ctx,
            participant_id,
            chrono::Utc::now().timestamp(),
        )
        .await?;
        info!(participant = participant_id, "templated prompt issued");
        Ok(format!("{prompt}\n\n{FEEDBACK_QUESTION}"))
    }
}

fn is_affirmative(s: &str) -> bool {
    matches!(
        s.to_lowercase().trim_matches(|c: char| !c.is_alphanumeric()),
        "yes" | "y" | "yeah" | "yep" | "sure" | "ok" | "okay" | "ready"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{enroll, test_rig};

    #[tokio::test]
    async fn test_scripted_intake_fills_profile_in_order() {
        let rig = test_rig().await;
        let pid = enroll(&rig.ctx, "+15551234567").await;
        let coordinator = StaticCoordinator::new(rig.ctx.clone());

        let turns = [
            "Hi",
            "Physical Activity",
            "feel more energy",
            "morning 8-9am",
            "after coffee",
        ];
        let mut last = String::new();
        for t in turns {
            last = coordinator
                .process_response(&pid, "+15551234567", t)
                .await
                .unwrap();
        }
        assert_eq!(last, READY_QUESTION);

        let p = profile::load(&rig.ctx.store, &pid).await.unwrap();
        assert_eq!(p.habit_domain, "Physical Activity");
        assert_eq!(p.motivational_frame, "feel more energy");
        assert_eq!(p.preferred_time, "morning 8-9am");
        assert_eq!(p.prompt_anchor, "after coffee");
        assert!(p.is_complete());
        assert!(!p.ready_for_prompts);
    }

    #[tokio::test]
    async fn test_affirmative_reply_delivers_templated_prompt() {
        let rig = test_rig().await;
        let pid = enroll(&rig.ctx, "+15551234567").await;
        let coordinator = StaticCoordinator::new(rig.ctx.clone());

        for t in ["Hi", "Physical Activity", "feel more energy", "morning", "after coffee"] {
            coordinator.process_response(&pid, "+15551234567", t).await.unwrap();
        }
        let reply = coordinator
            .process_response(&pid, "+15551234567", "Yes!")
            .await
            .unwrap();
        assert!(reply.contains("one minute"));
        assert!(reply.contains("coffee"));

        let p = profile::load(&rig.ctx.store, &pid).await.unwrap();
        assert!(p.ready_for_prompts);
        assert_eq!(p.total_prompts, 1);
        assert_eq!(
            rig.ctx.state.feedback_state(&pid).await.unwrap(),
            FeedbackState::WaitingInitial
        );
    }

    #[tokio::test]
    async fn test_feedback_reply_closes_chain() {
        let rig = test_rig().await;
        let pid = enroll(&rig.ctx, "+15551234567").await;
        let coordinator = StaticCoordinator::new(rig.ctx.clone());

        for t in ["Hi", "Hydration", "clear head", "morning", "after coffee", "yes"] {
            coordinator.process_response(&pid, "+15551234567", t).await.unwrap();
        }
        let reply = coordinator
            .process_response(&pid, "+15551234567", "did it, felt great")
            .await
            .unwrap();
        assert_eq!(reply, FEEDBACK_THANKS);
        assert_eq!(
            rig.ctx.state.feedback_state(&pid).await.unwrap(),
            FeedbackState::Completed
        );
        let p = profile::load(&rig.ctx.store, &pid).await.unwrap();
        assert_eq!(p.last_barrier, "did it, felt great");
    }
}
