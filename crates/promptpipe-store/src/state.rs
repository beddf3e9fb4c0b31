//! Flow-state key/value storage.
//!
//! Everything the conversation engine persists (sub-state, history JSON,
//! profile JSON, schedule records, feedback tracking) lives here as
//! strings keyed by (participant, flow, key). Writes are last-writer-wins;
//! serialization is the caller's keyed lock, not a storage transaction.

use crate::Store;
use promptpipe_core::PromptPipeError;

impl Store {
    /// Read one state value. `None` when the key was never written.
    pub async fn get_state(
        &self,
        participant_id: &str,
        flow_type: &str,
        key: &str,
    ) -> Result<Option<String>, PromptPipeError> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT data_value FROM flow_state \
             WHERE participant_id = ? AND flow_type = ? AND data_key = ?",
        )
        .bind(participant_id)
        .bind(flow_type)
        .bind(key)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| PromptPipeError::StateLoad(format!("query failed: {e}")))?;

        Ok(row.map(|(v,)| v))
    }

    /// Write one state value (upsert).
    pub async fn set_state(
        &self,
        participant_id: &str,
        flow_type: &str,
        key: &str,
        value: &str,
    ) -> Result<(), PromptPipeError> {
        sqlx::query(
            "INSERT INTO flow_state (participant_id, flow_type, data_key, data_value) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT(participant_id, flow_type, data_key) \
             DO UPDATE SET data_value = excluded.data_value, updated_at = datetime('now')",
        )
        .bind(participant_id)
        .bind(flow_type)
        .bind(key)
        .bind(value)
        .execute(self.pool())
        .await
        .map_err(|e| PromptPipeError::StateLoad(format!("upsert failed: {e}")))?;

        Ok(())
    }

    /// Delete one state value. Returns `true` if a row was deleted.
    pub async fn delete_state(
        &self,
        participant_id: &str,
        flow_type: &str,
        key: &str,
    ) -> Result<bool, PromptPipeError> {
        let result = sqlx::query(
            "DELETE FROM flow_state \
             WHERE participant_id = ? AND flow_type = ? AND data_key = ?",
        )
        .bind(participant_id)
        .bind(flow_type)
        .bind(key)
        .execute(self.pool())
        .await
        .map_err(|e| PromptPipeError::StateLoad(format!("delete failed: {e}")))?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::test_store;

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let store = test_store().await;
        let v = store.get_state("p_1", "conversation", "sub_state").await.unwrap();
        assert!(v.is_none());
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let store = test_store().await;
        store
            .set_state("p_1", "conversation", "sub_state", "INTAKE")
            .await
            .unwrap();
        let v = store.get_state("p_1", "conversation", "sub_state").await.unwrap();
        assert_eq!(v.as_deref(), Some("INTAKE"));
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let store = test_store().await;
        store
            .set_state("p_1", "conversation", "sub_state", "INTAKE")
            .await
            .unwrap();
        store
            .set_state("p_1", "conversation", "sub_state", "FEEDBACK")
            .await
            .unwrap();
        let v = store.get_state("p_1", "conversation", "sub_state").await.unwrap();
        assert_eq!(v.as_deref(), Some("FEEDBACK"));
    }

    #[tokio::test]
    async fn test_keys_are_scoped() {
        let store = test_store().await;
        store
            .set_state("p_1", "conversation", "history", "[]")
            .await
            .unwrap();
        assert!(store.get_state("p_2", "conversation", "history").await.unwrap().is_none());
        assert!(store.get_state("p_1", "other", "history").await.unwrap().is_none());
    }
}
