//! Daily prompt schedules: validation, persistence, and time math.

use crate::state::{keys, FLOW_TYPE};
use chrono::{DateTime, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use promptpipe_core::PromptPipeError;
use promptpipe_store::Store;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Minutes before the delivery minute at which the prep timer fires.
pub const DEFAULT_PREP_MINUTES: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScheduleKind {
    Fixed,
    Random,
}

/// A persisted daily schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRecord {
    pub id: String,
    pub kind: ScheduleKind,
    /// HH:MM for FIXED schedules.
    #[serde(default)]
    pub fixed_time: String,
    /// HH:MM window bounds for RANDOM schedules.
    #[serde(default)]
    pub random_start_time: String,
    #[serde(default)]
    pub random_end_time: String,
    /// IANA timezone name.
    pub timezone: String,
    pub created_at: i64,
}

impl ScheduleRecord {
    pub fn tz(&self) -> Result<Tz, PromptPipeError> {
        parse_timezone(&self.timezone)
    }

    /// Minute-of-day at which the prep timer fires daily. Wraps past
    /// midnight, so an 00:05 anchor with a 10 minute lead preps at 23:55.
    pub fn prep_minute(&self, prep_minutes: u32) -> Result<u32, PromptPipeError> {
        let anchor = match self.kind {
            ScheduleKind::Fixed => minute_of_day(&self.fixed_time)?,
            ScheduleKind::Random => minute_of_day(&self.random_start_time)?,
        };
        let lead = prep_minutes % (24 * 60);
        Ok((anchor + 24 * 60 - lead) % (24 * 60))
    }

    /// Pick today's delivery minute-of-day. RANDOM schedules draw uniformly
    /// from `[start, end)`.
    pub fn pick_delivery_minute(&self) -> Result<u32, PromptPipeError> {
        match self.kind {
            ScheduleKind::Fixed => minute_of_day(&self.fixed_time),
            ScheduleKind::Random => {
                let start = minute_of_day(&self.random_start_time)?;
                let end = minute_of_day(&self.random_end_time)?;
                if end <= start {
                    return Err(PromptPipeError::Validation(
                        "random window end must be after start".into(),
                    ));
                }
                Ok(rand::thread_rng().gen_range(start..end))
            }
        }
    }

    /// Human-readable one-line description, for `scheduler list`.
    pub fn describe(&self) -> String {
        match self.kind {
            ScheduleKind::Fixed => format!(
                "{}: daily at {} ({})",
                self.id, self.fixed_time, self.timezone
            ),
            ScheduleKind::Random => format!(
                "{}: daily at a random time between {} and {} ({})",
                self.id, self.random_start_time, self.random_end_time, self.timezone
            ),
        }
    }
}

/// Parse `HH:MM` (24 h) into minute-of-day.
pub fn minute_of_day(s: &str) -> Result<u32, PromptPipeError> {
    let t = NaiveTime::parse_from_str(s, "%H:%M")
        .map_err(|_| PromptPipeError::Validation(format!("invalid time {s:?}, expected HH:MM")))?;
    Ok(t.hour() * 60 + t.minute())
}

/// Validate an IANA timezone name.
pub fn parse_timezone(name: &str) -> Result<Tz, PromptPipeError> {
    name.parse::<Tz>()
        .map_err(|_| PromptPipeError::Validation(format!("unknown timezone {name:?}")))
}

/// The next instant (UTC) at which `minute` of the day occurs in `tz`,
/// strictly after `now`.
pub fn next_occurrence(now: DateTime<Utc>, minute: u32, tz: Tz) -> DateTime<Utc> {
    let local_now = now.with_timezone(&tz);
    let target = NaiveTime::from_hms_opt(minute / 60, minute % 60, 0).unwrap_or_default();

    let mut date = local_now.date_naive();
    if local_now.time() >= target {
        date = date.succ_opt().unwrap_or(date);
    }
    loop {
        match tz.from_local_datetime(&date.and_time(target)) {
            chrono::LocalResult::Single(dt) => return dt.with_timezone(&Utc),
            chrono::LocalResult::Ambiguous(dt, _) => return dt.with_timezone(&Utc),
            // DST gap: skip to the next day.
            chrono::LocalResult::None => {
                date = date.succ_opt().unwrap_or(date);
            }
        }
    }
}

/// Today's instant (UTC) for `minute` of the day in `tz`, even if already
/// past.
pub fn today_at(now: DateTime<Utc>, minute: u32, tz: Tz) -> Option<DateTime<Utc>> {
    let local_now = now.with_timezone(&tz);
    let target = NaiveTime::from_hms_opt(minute / 60, minute % 60, 0)?;
    match tz.from_local_datetime(&local_now.date_naive().and_time(target)) {
        chrono::LocalResult::Single(dt) | chrono::LocalResult::Ambiguous(dt, _) => {
            Some(dt.with_timezone(&Utc))
        }
        chrono::LocalResult::None => None,
    }
}

/// Load a participant's schedules.
pub async fn load(store: &Store, participant_id: &str) -> Result<Vec<ScheduleRecord>, PromptPipeError> {
    let raw = store
        .get_state(participant_id, FLOW_TYPE, keys::SCHEDULES)
        .await?;
    match raw {
        Some(json) if !json.is_empty() => Ok(serde_json::from_str(&json)?),
        _ => Ok(Vec::new()),
    }
}

/// Persist a participant's schedules.
pub async fn save(
    store: &Store,
    participant_id: &str,
    schedules: &[ScheduleRecord],
) -> Result<(), PromptPipeError> {
    let json = serde_json::to_string(schedules)?;
    store
        .set_state(participant_id, FLOW_TYPE, keys::SCHEDULES, &json)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(time: &str, tz: &str) -> ScheduleRecord {
        ScheduleRecord {
            id: "sched_0011223344556677".into(),
            kind: ScheduleKind::Fixed,
            fixed_time: time.into(),
            random_start_time: String::new(),
            random_end_time: String::new(),
            timezone: tz.into(),
            created_at: 0,
        }
    }

    fn random(start: &str, end: &str, tz: &str) -> ScheduleRecord {
        ScheduleRecord {
            id: "sched_8899aabbccddeeff".into(),
            kind: ScheduleKind::Random,
            fixed_time: String::new(),
            random_start_time: start.into(),
            random_end_time: end.into(),
            timezone: tz.into(),
            created_at: 0,
        }
    }

    #[test]
    fn test_minute_of_day_parsing() {
        assert_eq!(minute_of_day("09:30").unwrap(), 570);
        assert_eq!(minute_of_day("00:00").unwrap(), 0);
        assert_eq!(minute_of_day("23:59").unwrap(), 1439);
        assert!(minute_of_day("24:00").is_err());
        assert!(minute_of_day("9am").is_err());
        assert!(minute_of_day("").is_err());
    }

    #[test]
    fn test_timezone_validation() {
        assert!(parse_timezone("America/Toronto").is_ok());
        assert!(parse_timezone("UTC").is_ok());
        assert!(parse_timezone("Mars/Olympus").is_err());
    }

    #[test]
    fn test_fixed_prep_minute_is_ten_before() {
        let s = fixed("09:30", "America/Toronto");
        assert_eq!(s.prep_minute(DEFAULT_PREP_MINUTES).unwrap(), 9 * 60 + 20);
    }

    #[test]
    fn test_random_prep_minute_uses_window_start() {
        let s = random("08:00", "10:00", "UTC");
        assert_eq!(s.prep_minute(DEFAULT_PREP_MINUTES).unwrap(), 7 * 60 + 50);
    }

    #[test]
    fn test_prep_minute_wraps_past_midnight() {
        let s = fixed("00:05", "UTC");
        assert_eq!(s.prep_minute(DEFAULT_PREP_MINUTES).unwrap(), 23 * 60 + 55);
        let s = fixed("00:00", "UTC");
        assert_eq!(s.prep_minute(DEFAULT_PREP_MINUTES).unwrap(), 23 * 60 + 50);
    }

    #[test]
    fn test_random_delivery_minute_in_window() {
        let s = random("08:00", "10:00", "UTC");
        for _ in 0..100 {
            let m = s.pick_delivery_minute().unwrap();
            assert!((480..600).contains(&m), "minute {m} out of [480, 600)");
        }
    }

    #[test]
    fn test_random_delivery_rejects_inverted_window() {
        let s = random("10:00", "08:00", "UTC");
        assert!(s.pick_delivery_minute().is_err());
    }

    #[test]
    fn test_fixed_delivery_minute() {
        let s = fixed("09:30", "UTC");
        assert_eq!(s.pick_delivery_minute().unwrap(), 570);
    }

    #[test]
    fn test_next_occurrence_rolls_to_tomorrow() {
        let tz: Tz = "UTC".parse().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        // 09:30 already passed today.
        let next = next_occurrence(now, 570, tz);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 11, 9, 30, 0).unwrap());
        // 15:00 still ahead today.
        let next = next_occurrence(now, 900, tz);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 10, 15, 0, 0).unwrap());
    }

    #[test]
    fn test_today_at_can_be_in_the_past() {
        let tz: Tz = "UTC".parse().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let at = today_at(now, 570, tz).unwrap();
        assert_eq!(at, Utc.with_ymd_and_hms(2026, 3, 10, 9, 30, 0).unwrap());
        assert!(at < now);
    }

    #[test]
    fn test_describe() {
        let s = fixed("09:30", "America/Toronto");
        let d = s.describe();
        assert!(d.starts_with("sched_"));
        assert!(d.contains("09:30"));
        assert!(d.contains("America/Toronto"));
    }
}
