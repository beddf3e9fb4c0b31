//! Response-handler registrations: phone -> participant routing with a TTL.

use crate::{fmt_ts, Store};
use chrono::{DateTime, Duration, Utc};
use promptpipe_core::PromptPipeError;

/// A phone-to-participant routing entry.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ResponseHandler {
    pub phone: String,
    pub participant_id: String,
    pub flow_type: String,
    pub expires_at: String,
}

impl Store {
    /// Register (or refresh) the handler binding for a phone number.
    pub async fn register_response_handler(
        &self,
        phone: &str,
        participant_id: &str,
        flow_type: &str,
        ttl: std::time::Duration,
        now: DateTime<Utc>,
    ) -> Result<(), PromptPipeError> {
        let expires_at = fmt_ts(now + Duration::from_std(ttl).unwrap_or(Duration::hours(24)));
        sqlx::query(
            "INSERT INTO response_handlers (phone, participant_id, flow_type, expires_at) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT(phone) DO UPDATE SET \
             participant_id = excluded.participant_id, \
             flow_type = excluded.flow_type, \
             expires_at = excluded.expires_at",
        )
        .bind(phone)
        .bind(participant_id)
        .bind(flow_type)
        .bind(&expires_at)
        .execute(self.pool())
        .await
        .map_err(|e| PromptPipeError::StateLoad(format!("register handler failed: {e}")))?;

        Ok(())
    }

    /// Look up the handler for a phone, purging it if expired.
    pub async fn lookup_response_handler(
        &self,
        phone: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ResponseHandler>, PromptPipeError> {
        let row: Option<ResponseHandler> = sqlx::query_as(
            "SELECT phone, participant_id, flow_type, expires_at \
             FROM response_handlers WHERE phone = ?",
        )
        .bind(phone)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| PromptPipeError::StateLoad(format!("query failed: {e}")))?;

        match row {
            Some(h) if h.expires_at <= fmt_ts(now) => {
                sqlx::query("DELETE FROM response_handlers WHERE phone = ?")
                    .bind(phone)
                    .execute(self.pool())
                    .await
                    .map_err(|e| PromptPipeError::StateLoad(format!("purge failed: {e}")))?;
                Ok(None)
            }
            other => Ok(other),
        }
    }
}
