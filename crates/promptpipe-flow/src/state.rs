//! Conversation state: sub-states, feedback states, and the typed accessors
//! over the flow-state KV store.

use promptpipe_core::PromptPipeError;
use promptpipe_store::Store;
use serde::{Deserialize, Serialize};

/// Flow type under which all conversation state is stored.
pub const FLOW_TYPE: &str = "conversation";

/// Data keys within the conversation flow.
pub mod keys {
    pub const SUB_STATE: &str = "sub_state";
    pub const HISTORY: &str = "conversation_history";
    pub const PROFILE: &str = "user_profile";
    pub const LAST_HABIT_PROMPT: &str = "last_habit_prompt";
    pub const FEEDBACK_STATE: &str = "feedback_state";
    pub const DAILY_PROMPT_PENDING: &str = "daily_prompt_pending";
    pub const FEEDBACK_PROMPT_TS: &str = "feedback_prompt_ts";
    pub const SCHEDULES: &str = "schedules";
}

/// Which module owns the next inbound reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubState {
    Intake,
    PromptGenerator,
    Feedback,
    Coordinator,
}

impl SubState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intake => "INTAKE",
            Self::PromptGenerator => "PROMPT_GENERATOR",
            Self::Feedback => "FEEDBACK",
            Self::Coordinator => "COORDINATOR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INTAKE" => Some(Self::Intake),
            "PROMPT_GENERATOR" => Some(Self::PromptGenerator),
            "FEEDBACK" => Some(Self::Feedback),
            "COORDINATOR" => Some(Self::Coordinator),
            _ => None,
        }
    }
}

/// Feedback collection lifecycle after a nudge is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedbackState {
    #[default]
    Unset,
    WaitingInitial,
    WaitingFollowup,
    FollowupSent,
    Completed,
}

impl FeedbackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unset => "unset",
            Self::WaitingInitial => "waiting_initial",
            Self::WaitingFollowup => "waiting_followup",
            Self::FollowupSent => "followup_sent",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "waiting_initial" => Self::WaitingInitial,
            "waiting_followup" => Self::WaitingFollowup,
            "followup_sent" => Self::FollowupSent,
            "completed" => Self::Completed,
            _ => Self::Unset,
        }
    }
}

/// Record set when a scheduled nudge goes out; cleared on the next inbound
/// reply. Drives reminder suppression.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyPromptPending {
    /// Unix timestamp of the send, also part of the reminder dedupe key.
    pub sent_at: i64,
    pub to: String,
}

impl DailyPromptPending {
    pub fn reminder_dedupe_key(&self, participant_id: &str) -> String {
        format!("dailyprompt:{participant_id}:{}", self.sent_at)
    }
}

/// Typed accessors over the flow-state KV store.
#[derive(Clone)]
pub struct StateManager {
    store: Store,
}

impl StateManager {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Current sub-state, or `None` when never set.
    pub async fn sub_state(&self, participant_id: &str) -> Result<Option<SubState>, PromptPipeError> {
        let raw = self
            .store
            .get_state(participant_id, FLOW_TYPE, keys::SUB_STATE)
            .await?;
        Ok(raw.as_deref().and_then(SubState::parse))
    }

    pub async fn set_sub_state(
        &self,
        participant_id: &str,
        state: SubState,
    ) -> Result<(), PromptPipeError> {
        self.store
            .set_state(participant_id, FLOW_TYPE, keys::SUB_STATE, state.as_str())
            .await
    }

    pub async fn feedback_state(
        &self,
        participant_id: &str,
    ) -> Result<FeedbackState, PromptPipeError> {
        let raw = self
            .store
            .get_state(participant_id, FLOW_TYPE, keys::FEEDBACK_STATE)
            .await?;
        Ok(raw.as_deref().map(FeedbackState::parse).unwrap_or_default())
    }

    pub async fn set_feedback_state(
        &self,
        participant_id: &str,
        state: FeedbackState,
    ) -> Result<(), PromptPipeError> {
        self.store
            .set_state(participant_id, FLOW_TYPE, keys::FEEDBACK_STATE, state.as_str())
            .await
    }

    pub async fn daily_prompt_pending(
        &self,
        participant_id: &str,
    ) -> Result<Option<DailyPromptPending>, PromptPipeError> {
        let raw = self
            .store
            .get_state(participant_id, FLOW_TYPE, keys::DAILY_PROMPT_PENDING)
            .await?;
        match raw {
            Some(json) if !json.is_empty() => Ok(Some(serde_json::from_str(&json)?)),
            _ => Ok(None),
        }
    }

    pub async fn set_daily_prompt_pending(
        &self,
        participant_id: &str,
        pending: &DailyPromptPending,
    ) -> Result<(), PromptPipeError> {
        let json = serde_json::to_string(pending)?;
        self.store
            .set_state(participant_id, FLOW_TYPE, keys::DAILY_PROMPT_PENDING, &json)
            .await
    }

    pub async fn clear_daily_prompt_pending(
        &self,
        participant_id: &str,
    ) -> Result<(), PromptPipeError> {
        self.store
            .delete_state(participant_id, FLOW_TYPE, keys::DAILY_PROMPT_PENDING)
            .await?;
        Ok(())
    }

    /// Unix timestamp of the prompt the feedback chain is tracking; part of
    /// the chain's dedupe keys.
    pub async fn feedback_prompt_ts(
        &self,
        participant_id: &str,
    ) -> Result<Option<i64>, PromptPipeError> {
        let raw = self
            .store
            .get_state(participant_id, FLOW_TYPE, keys::FEEDBACK_PROMPT_TS)
            .await?;
        Ok(raw.and_then(|s| s.parse().ok()))
    }

    pub async fn set_feedback_prompt_ts(
        &self,
        participant_id: &str,
        ts: i64,
    ) -> Result<(), PromptPipeError> {
        self.store
            .set_state(
                participant_id,
                FLOW_TYPE,
                keys::FEEDBACK_PROMPT_TS,
                &ts.to_string(),
            )
            .await
    }

    pub async fn last_habit_prompt(
        &self,
        participant_id: &str,
    ) -> Result<Option<String>, PromptPipeError> {
        self.store
            .get_state(participant_id, FLOW_TYPE, keys::LAST_HABIT_PROMPT)
            .await
    }

    pub async fn set_last_habit_prompt(
        &self,
        participant_id: &str,
        prompt: &str,
    ) -> Result<(), PromptPipeError> {
        self.store
            .set_state(participant_id, FLOW_TYPE, keys::LAST_HABIT_PROMPT, prompt)
            .await
    }
}
