//! Shared dependencies threaded through modules, tools, and job handlers.

use crate::{
    locks::ParticipantLocks, prompts::Prompts, state::StateManager, timer::TimerService,
};
use promptpipe_core::{
    config::{FlowConfig, JobsConfig},
    traits::{LlmClient, Messenger},
};
use promptpipe_store::Store;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Process-wide collaborators for the conversation engine.
pub struct FlowContext {
    pub store: Store,
    pub state: StateManager,
    pub llm: Arc<dyn LlmClient>,
    pub messenger: Arc<dyn Messenger>,
    pub timers: TimerService,
    pub flow: FlowConfig,
    pub jobs: JobsConfig,
    pub prompts: Prompts,
    pub locks: ParticipantLocks,
    /// Live daily prep timer per schedule ID, for cancellation on delete.
    pub schedule_timers: Mutex<HashMap<String, String>>,
}

impl FlowContext {
    pub fn new(
        store: Store,
        llm: Arc<dyn LlmClient>,
        messenger: Arc<dyn Messenger>,
        timers: TimerService,
        flow: FlowConfig,
        jobs: JobsConfig,
        prompts: Prompts,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: StateManager::new(store.clone()),
            store,
            llm,
            messenger,
            timers,
            flow,
            jobs,
            prompts,
            locks: ParticipantLocks::new(),
            schedule_timers: Mutex::new(HashMap::new()),
        })
    }
}
