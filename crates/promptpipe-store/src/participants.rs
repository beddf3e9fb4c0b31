//! Participant registry.

use crate::Store;
use promptpipe_core::{ids, PromptPipeError};

/// An enrolled participant.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Participant {
    pub id: String,
    /// Canonical E.164 phone number.
    pub phone: String,
    /// One of `active`, `paused`, `ended`.
    pub status: String,
    pub created_at: String,
}

impl Store {
    /// Create a participant for a canonical phone number.
    ///
    /// Returns the existing row if the phone is already enrolled.
    pub async fn create_participant(&self, phone: &str) -> Result<Participant, PromptPipeError> {
        if let Some(existing) = self.find_participant_by_phone(phone).await? {
            return Ok(existing);
        }

        let id = ids::participant_id();
        sqlx::query("INSERT INTO participants (id, phone, status) VALUES (?, ?, 'active')")
            .bind(&id)
            .bind(phone)
            .execute(self.pool())
            .await
            .map_err(|e| PromptPipeError::StateLoad(format!("insert participant failed: {e}")))?;

        self.get_participant(&id)
            .await?
            .ok_or_else(|| PromptPipeError::StateLoad("participant vanished after insert".into()))
    }

    pub async fn get_participant(&self, id: &str) -> Result<Option<Participant>, PromptPipeError> {
        sqlx::query_as("SELECT id, phone, status, created_at FROM participants WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(|e| PromptPipeError::StateLoad(format!("query failed: {e}")))
    }

    pub async fn find_participant_by_phone(
        &self,
        phone: &str,
    ) -> Result<Option<Participant>, PromptPipeError> {
        sqlx::query_as("SELECT id, phone, status, created_at FROM participants WHERE phone = ?")
            .bind(phone)
            .fetch_optional(self.pool())
            .await
            .map_err(|e| PromptPipeError::StateLoad(format!("query failed: {e}")))
    }

    /// All participants with `active` status, for recovery.
    pub async fn list_active_participants(&self) -> Result<Vec<Participant>, PromptPipeError> {
        sqlx::query_as(
            "SELECT id, phone, status, created_at FROM participants \
             WHERE status = 'active' ORDER BY created_at ASC",
        )
        .fetch_all(self.pool())
        .await
        .map_err(|e| PromptPipeError::StateLoad(format!("query failed: {e}")))
    }

    /// Set a participant's status. Returns `true` if a row was updated.
    pub async fn set_participant_status(
        &self,
        id: &str,
        status: &str,
    ) -> Result<bool, PromptPipeError> {
        let result = sqlx::query("UPDATE participants SET status = ? WHERE id = ?")
            .bind(status)
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(|e| PromptPipeError::StateLoad(format!("update failed: {e}")))?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::test_store;

    #[tokio::test]
    async fn test_create_participant() {
        let store = test_store().await;
        let p = store.create_participant("+15551234567").await.unwrap();
        assert!(p.id.starts_with("p_"));
        assert_eq!(p.id.len(), 2 + 32);
        assert_eq!(p.phone, "+15551234567");
        assert_eq!(p.status, "active");
    }

    #[tokio::test]
    async fn test_create_participant_is_idempotent_per_phone() {
        let store = test_store().await;
        let a = store.create_participant("+15551234567").await.unwrap();
        let b = store.create_participant("+15551234567").await.unwrap();
        assert_eq!(a.id, b.id);
    }

    #[tokio::test]
    async fn test_find_by_phone() {
        let store = test_store().await;
        assert!(store
            .find_participant_by_phone("+15550000000")
            .await
            .unwrap()
            .is_none());

        let p = store.create_participant("+15550000000").await.unwrap();
        let found = store
            .find_participant_by_phone("+15550000000")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, p.id);
    }

    #[tokio::test]
    async fn test_list_active_excludes_paused() {
        let store = test_store().await;
        let a = store.create_participant("+15551111111").await.unwrap();
        let b = store.create_participant("+15552222222").await.unwrap();

        assert!(store.set_participant_status(&b.id, "paused").await.unwrap());

        let active = store.list_active_participants().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, a.id);
    }
}
