//! Keyed per-participant locks.
//!
//! The single-writer discipline: every inbound turn and every job handler
//! that touches a participant's state holds that participant's lock for the
//! whole operation. Turns for different participants run in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Clone, Default)]
pub struct ParticipantLocks {
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl ParticipantLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for one participant, creating it on first use.
    pub async fn acquire(&self, participant_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.locks.lock().unwrap();
            map.entry(participant_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}
