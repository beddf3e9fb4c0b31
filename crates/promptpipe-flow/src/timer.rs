//! In-process timers.
//!
//! These carry only same-day one-shots and the daily prep firings; anything
//! that must survive a restart goes through the durable job queue instead.
//! Daily timers are rebuilt from persisted schedule records at startup.

use crate::schedule;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use promptpipe_core::ids;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

pub type TimerCallback =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

#[derive(Clone, Default)]
pub struct TimerService {
    timers: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl TimerService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire `callback` once at `at` (immediately when `at` is in the past).
    pub fn schedule_at(&self, at: DateTime<Utc>, callback: TimerCallback) -> String {
        let id = ids::timer_id();
        let timers = self.timers.clone();
        let timer_id = id.clone();

        let handle = tokio::spawn(async move {
            let delay = (at - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(delay).await;
            debug!(timer_id = %timer_id, "one-shot timer fired");
            callback().await;
            timers.lock().unwrap().remove(&timer_id);
        });

        self.timers.lock().unwrap().insert(id.clone(), handle);
        id
    }

    /// Fire `callback` every day at `minute` of the day in `tz`.
    pub fn schedule_daily(&self, minute: u32, tz: Tz, callback: TimerCallback) -> String {
        let id = ids::timer_id();
        let timer_id = id.clone();

        let handle = tokio::spawn(async move {
            loop {
                let next = schedule::next_occurrence(Utc::now(), minute, tz);
                let delay = (next - Utc::now()).to_std().unwrap_or_default();
                tokio::time::sleep(delay).await;
                debug!(timer_id = %timer_id, minute, "daily timer fired");
                callback().await;
            }
        });

        self.timers.lock().unwrap().insert(id.clone(), handle);
        id
    }

    /// Cancel a timer. Returns `true` if it existed.
    pub fn cancel(&self, id: &str) -> bool {
        match self.timers.lock().unwrap().remove(id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Number of live timers.
    pub fn active_count(&self) -> usize {
        self.timers.lock().unwrap().len()
    }
}
