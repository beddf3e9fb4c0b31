//! Participant profile: the structured record built up during intake and
//! refined by feedback.

use crate::state::{keys, FLOW_TYPE};
use chrono::Utc;
use promptpipe_core::PromptPipeError;
use promptpipe_store::Store;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    #[serde(default)]
    pub habit_domain: String,
    #[serde(default)]
    pub motivational_frame: String,
    #[serde(default)]
    pub preferred_time: String,
    #[serde(default)]
    pub prompt_anchor: String,
    #[serde(default)]
    pub additional_notes: String,
    #[serde(default)]
    pub total_prompts: u64,
    #[serde(default)]
    pub success_count: u64,
    #[serde(default)]
    pub last_prompt: String,
    #[serde(default)]
    pub last_successful_prompt: String,
    #[serde(default)]
    pub last_barrier: String,
    #[serde(default)]
    pub last_tweak: String,
    #[serde(default)]
    pub ready_for_prompts: bool,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

impl UserProfile {
    /// All four core fields present.
    pub fn is_complete(&self) -> bool {
        !self.habit_domain.is_empty()
            && !self.motivational_frame.is_empty()
            && !self.preferred_time.is_empty()
            && !self.prompt_anchor.is_empty()
    }

    /// Synthetic system message describing profile completeness, injected
    /// into every module's LLM context.
    pub fn status_message(&self) -> String {
        fn mark(v: &str) -> &str {
            if v.is_empty() {
                "missing"
            } else {
                v
            }
        }
        let mut msg = format!(
            "Current profile status:\n\
             - habit_domain: {}\n\
             - motivational_frame: {}\n\
             - preferred_time: {}\n\
             - prompt_anchor: {}",
            mark(&self.habit_domain),
            mark(&self.motivational_frame),
            mark(&self.preferred_time),
            mark(&self.prompt_anchor),
        );
        if !self.additional_notes.is_empty() {
            msg.push_str(&format!("\n- notes: {}", self.additional_notes));
        }
        if self.is_complete() {
            msg.push_str("\nProfile is complete.");
            if self.ready_for_prompts {
                msg.push_str(" Participant is ready for prompts.");
            }
        } else {
            msg.push_str("\nProfile is incomplete.");
        }
        if self.total_prompts > 0 {
            msg.push_str(&format!(
                "\nPrompts so far: {} sent, {} successful.",
                self.total_prompts, self.success_count
            ));
        }
        msg
    }
}

/// Load a participant's profile (default when never written).
pub async fn load(store: &Store, participant_id: &str) -> Result<UserProfile, PromptPipeError> {
    let raw = store
        .get_state(participant_id, FLOW_TYPE, keys::PROFILE)
        .await?;
    match raw {
        Some(json) if !json.is_empty() => Ok(serde_json::from_str(&json)?),
        _ => Ok(UserProfile::default()),
    }
}

/// Persist a profile, stamping timestamps.
pub async fn save(
    store: &Store,
    participant_id: &str,
    profile: &mut UserProfile,
) -> Result<(), PromptPipeError> {
    let now = Utc::now().timestamp();
    if profile.created_at == 0 {
        profile.created_at = now;
    }
    profile.updated_at = now;
    let json = serde_json::to_string(profile)?;
    store
        .set_state(participant_id, FLOW_TYPE, keys::PROFILE, &json)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completeness_requires_all_four_fields() {
        let mut p = UserProfile {
            habit_domain: "Physical Activity".into(),
            motivational_frame: "feel more energy".into(),
            preferred_time: "morning 8-9am".into(),
            ..Default::default()
        };
        assert!(!p.is_complete());
        p.prompt_anchor = "after coffee".into();
        assert!(p.is_complete());
    }

    #[test]
    fn test_notes_do_not_affect_completeness() {
        let p = UserProfile {
            additional_notes: "prefers short walks".into(),
            ..Default::default()
        };
        assert!(!p.is_complete());
    }

    #[test]
    fn test_status_message_marks_missing_fields() {
        let p = UserProfile {
            habit_domain: "Hydration".into(),
            ..Default::default()
        };
        let msg = p.status_message();
        assert!(msg.contains("habit_domain: Hydration"));
        assert!(msg.contains("motivational_frame: missing"));
        assert!(msg.contains("incomplete"));
    }

    #[test]
    fn test_status_message_complete_and_ready() {
        let p = UserProfile {
            habit_domain: "a".into(),
            motivational_frame: "b".into(),
            preferred_time: "c".into(),
            prompt_anchor: "d".into(),
            ready_for_prompts: true,
            ..Default::default()
        };
        let msg = p.status_message();
        assert!(msg.contains("Profile is complete."));
        assert!(msg.contains("ready for prompts"));
    }
}
