//! Wiring between persisted schedule records and the in-process timers.
//!
//! Each schedule gets one daily prep timer. When the prep timer fires it
//! picks today's delivery minute (fixed, or drawn from the random window)
//! and arms a one-shot delivery timer. Schedules armed after today's prep
//! firing still deliver today; a freshly created schedule whose delivery
//! minute is already behind the clock delivers immediately.

use crate::context::FlowContext;
use crate::delivery;
use crate::schedule::{self, ScheduleRecord};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use promptpipe_core::PromptPipeError;
use std::sync::Arc;
use tracing::{error, info};

/// Arm the daily prep timer for a schedule, plus a one-shot for today when
/// the prep timer will not fire before today's delivery minute.
pub fn arm_schedule(
    ctx: &Arc<FlowContext>,
    participant_id: &str,
    record: &ScheduleRecord,
) -> Result<(), PromptPipeError> {
    arm(ctx, participant_id, record, false)
}

/// Arm a schedule that was just created. Like [`arm_schedule`], except a
/// delivery minute already behind the clock is delivered right away instead
/// of waiting for tomorrow.
pub fn arm_created_schedule(
    ctx: &Arc<FlowContext>,
    participant_id: &str,
    record: &ScheduleRecord,
) -> Result<(), PromptPipeError> {
    arm(ctx, participant_id, record, true)
}

fn arm(
    ctx: &Arc<FlowContext>,
    participant_id: &str,
    record: &ScheduleRecord,
    catch_up: bool,
) -> Result<(), PromptPipeError> {
    let tz = record.tz()?;
    let prep = record.prep_minute(ctx.flow.daily_prompt_prep_minutes)?;
    // Surface a bad delivery window at arm time, not inside a timer.
    let minute = record.pick_delivery_minute()?;

    let cb_ctx = ctx.clone();
    let cb_pid = participant_id.to_string();
    let cb_record = record.clone();
    let timer_id = ctx.timers.schedule_daily(
        prep,
        tz,
        Arc::new(move || {
            let ctx = cb_ctx.clone();
            let pid = cb_pid.clone();
            let record = cb_record.clone();
            Box::pin(async move {
                prep_fired(&ctx, &pid, &record);
            })
        }),
    );
    ctx.schedule_timers
        .lock()
        .unwrap()
        .insert(record.id.clone(), timer_id);

    if let Some(at) = same_day_delivery(Utc::now(), prep, minute, tz, catch_up) {
        info!(
            schedule = %record.id,
            participant = participant_id,
            at = %at,
            "same-day delivery armed"
        );
        arm_delivery_at(ctx, participant_id, at);
    }
    Ok(())
}

/// Today's delivery instant when the daily prep timer will not arm it in
/// time. `catch_up` turns a delivery minute already behind the clock into an
/// immediate delivery; otherwise it is left for tomorrow's prep firing.
fn same_day_delivery(
    now: DateTime<Utc>,
    prep: u32,
    minute: u32,
    tz: Tz,
    catch_up: bool,
) -> Option<DateTime<Utc>> {
    let at = schedule::today_at(now, minute, tz)?;
    if at > now {
        if schedule::next_occurrence(now, prep, tz) > at {
            return Some(at);
        }
        return None;
    }
    if catch_up {
        return Some(now);
    }
    None
}

/// Cancel the daily prep timer for a schedule. Returns `true` if one was
/// live.
pub fn disarm_schedule(ctx: &FlowContext, schedule_id: &str) -> bool {
    let timer_id = ctx.schedule_timers.lock().unwrap().remove(schedule_id);
    match timer_id {
        Some(id) => ctx.timers.cancel(&id),
        None => false,
    }
}

fn prep_fired(ctx: &Arc<FlowContext>, participant_id: &str, record: &ScheduleRecord) {
    let tz = match record.tz() {
        Ok(tz) => tz,
        Err(e) => {
            error!(schedule = %record.id, error = %e, "prep firing with bad timezone");
            return;
        }
    };
    let minute = match record.pick_delivery_minute() {
        Ok(m) => m,
        Err(e) => {
            error!(schedule = %record.id, error = %e, "prep firing with bad window");
            return;
        }
    };
    let at = schedule::next_occurrence(Utc::now(), minute, tz);
    info!(
        schedule = %record.id,
        participant = participant_id,
        at = %at,
        "delivery armed"
    );
    arm_delivery_at(ctx, participant_id, at);
}

fn arm_delivery_at(ctx: &Arc<FlowContext>, participant_id: &str, at: chrono::DateTime<Utc>) {
    let cb_ctx = ctx.clone();
    let cb_pid = participant_id.to_string();
    ctx.timers.schedule_at(
        at,
        Arc::new(move || {
            let ctx = cb_ctx.clone();
            let pid = cb_pid.clone();
            Box::pin(async move {
                if let Err(e) = delivery::deliver_scheduled_prompt(&ctx, &pid).await {
                    error!(participant = %pid, error = %e, "scheduled prompt delivery failed");
                }
            })
        }),
    );
}
