//! Persisted conversation history.
//!
//! History is LLM context only; it is never replayed to the participant.
//! Trimming drops whole leading turns (a user message plus everything up to
//! the next user message) so assistant tool-summary notes stay attached to
//! the turn that produced them.

use crate::state::{keys, FLOW_TYPE};
use chrono::Utc;
use promptpipe_core::PromptPipeError;
use promptpipe_store::Store;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    /// "user", "assistant", or "tool".
    pub role: String,
    pub content: String,
    pub timestamp: i64,
}

impl HistoryEntry {
    pub fn now(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
            timestamp: Utc::now().timestamp(),
        }
    }
}

/// Load a participant's history (empty when never written).
pub async fn load(store: &Store, participant_id: &str) -> Result<Vec<HistoryEntry>, PromptPipeError> {
    let raw = store
        .get_state(participant_id, FLOW_TYPE, keys::HISTORY)
        .await?;
    match raw {
        Some(json) if !json.is_empty() => Ok(serde_json::from_str(&json)?),
        _ => Ok(Vec::new()),
    }
}

/// Persist a participant's history, trimming to `max` entries first.
pub async fn save(
    store: &Store,
    participant_id: &str,
    mut entries: Vec<HistoryEntry>,
    max: usize,
) -> Result<(), PromptPipeError> {
    trim_to(&mut entries, max);
    let json = serde_json::to_string(&entries)?;
    store
        .set_state(participant_id, FLOW_TYPE, keys::HISTORY, &json)
        .await
}

/// Trim to at most `max` entries by dropping whole leading turns.
///
/// A turn starts at a user entry and runs until the next user entry. Leading
/// non-user entries (possible after earlier trims) count as their own turn.
pub fn trim_to(entries: &mut Vec<HistoryEntry>, max: usize) {
    while entries.len() > max {
        let turn_len = turn_len(entries);
        entries.drain(..turn_len);
    }
}

fn turn_len(entries: &[HistoryEntry]) -> usize {
    if entries.is_empty() {
        return 0;
    }
    let start = if entries[0].role == "user" { 1 } else { 0 };
    entries[start..]
        .iter()
        .position(|e| e.role == "user")
        .map(|p| p + start)
        .unwrap_or(entries.len())
}

/// The most recent entries for LLM context, capped at `max` whole turns'
/// worth of entries.
pub fn llm_context(entries: &[HistoryEntry], max: usize) -> &[HistoryEntry] {
    if entries.len() <= max {
        return entries;
    }
    // Walk forward until the remainder fits, landing on a turn boundary.
    let mut start = entries.len() - max;
    while start < entries.len() && entries[start].role != "user" {
        start += 1;
    }
    &entries[start..]
}
