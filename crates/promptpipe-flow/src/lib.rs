//! The conversation engine: per-participant state machine, tool-calling
//! modules, schedules, and the durable job handlers behind them.

pub mod context;
pub mod coordinator;
pub mod delivery;
pub mod history;
pub mod jobs;
pub mod locks;
pub mod modules;
pub mod profile;
pub mod prompts;
pub mod recovery;
pub mod schedule;
pub mod scheduling;
pub mod state;
pub mod static_coordinator;
pub mod timer;
pub mod tool_loop;
pub mod tools;

#[cfg(test)]
mod test_support;

pub use context::FlowContext;
pub use coordinator::ConversationCoordinator;
pub use prompts::Prompts;
pub use state::{FeedbackState, StateManager, SubState, FLOW_TYPE};
pub use static_coordinator::StaticCoordinator;
pub use timer::TimerService;
