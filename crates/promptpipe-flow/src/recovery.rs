//! Startup recovery.
//!
//! Durable jobs survive in the queue and need nothing here. What does not
//! survive a restart: response-handler bindings near expiry, the in-process
//! daily timers, and any job claims leased by the previous process.

use crate::context::FlowContext;
use crate::schedule;
use crate::scheduling;
use crate::state::FLOW_TYPE;
use chrono::Utc;
use promptpipe_core::PromptPipeError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const HANDLER_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Rebuild process-local state from the store. Returns the number of
/// participants recovered.
pub async fn run(ctx: &Arc<FlowContext>) -> Result<usize, PromptPipeError> {
    let now = Utc::now();
    let requeued = ctx.store.requeue_stale_jobs(now).await?;
    if requeued > 0 {
        info!(requeued, "stale job claims requeued");
    }

    let participants = ctx.store.list_active_participants().await?;
    for p in &participants {
        ctx.store
            .register_response_handler(&p.phone, &p.id, FLOW_TYPE, HANDLER_TTL, now)
            .await?;

        let schedules = schedule::load(&ctx.store, &p.id).await?;
        for record in &schedules {
            // One bad record must not block the rest of recovery.
            if let Err(e) = scheduling::arm_schedule(ctx, &p.id, record) {
                warn!(
                    participant = %p.id,
                    schedule = %record.id,
                    error = %e,
                    "schedule not recovered"
                );
            }
        }
    }

    info!(
        participants = participants.len(),
        timers = ctx.timers.active_count(),
        "recovery complete"
    );
    Ok(participants.len())
}
