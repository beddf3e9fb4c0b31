//! LLM-visible tools.
//!
//! Tools are registered by name with typed descriptors; the loop looks them
//! up per call, parses arguments, and reports failures back to the LLM as
//! `❌ <reason>` tool results rather than aborting the turn.

pub mod intervention;
pub mod profile_save;
pub mod prompt_generator;
pub mod scheduler;
pub mod state_transition;

pub use intervention::InitiateInterventionTool;
pub use profile_save::SaveUserProfileTool;
pub use prompt_generator::GenerateHabitPromptTool;
pub use scheduler::SchedulerTool;
pub use state_transition::TransitionStateTool;

use async_trait::async_trait;
use promptpipe_core::{message::ToolDescriptor, PromptPipeError};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Per-turn request data threaded into every tool execution.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub participant_id: String,
    /// Canonical recipient the reply goes to.
    pub phone: String,
    pub debug: bool,
}

/// Result of a tool execution, reported back to the LLM.
#[derive(Debug, Clone, Default)]
pub struct ToolOutcome {
    pub success: bool,
    pub message: String,
    pub error: Option<String>,
    /// The tool already sent its message via the transport; do not repeat
    /// it in the returned reply.
    pub sent_directly: bool,
    /// The message should be accumulated into the user-visible reply.
    pub user_visible: bool,
}

impl ToolOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            ..Default::default()
        }
    }

    /// Success whose message is shown to the user in the final reply.
    pub fn ok_visible(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            user_visible: true,
            ..Default::default()
        }
    }

    /// Success already delivered over the transport by the tool itself.
    pub fn ok_direct(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            sent_directly: true,
            ..Default::default()
        }
    }

    /// Validation or business failure, surfaced to the LLM as `❌ <reason>`.
    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(reason.into()),
            ..Default::default()
        }
    }

    /// The string handed back to the LLM as the tool result.
    pub fn llm_result(&self) -> String {
        if self.success {
            self.message.clone()
        } else {
            format!("❌ {}", self.error.as_deref().unwrap_or("tool failed"))
        }
    }
}

/// An LLM-visible tool.
///
/// `execute` returns `Err` only for infrastructure failures that should
/// abort the turn; validation failures come back as `ToolOutcome::fail`.
#[async_trait]
pub trait Tool: Send + Sync {
    fn descriptor(&self) -> ToolDescriptor;

    async fn execute(
        &self,
        invocation: &ToolInvocation,
        args: serde_json::Value,
    ) -> Result<ToolOutcome, PromptPipeError>;
}

/// Name-keyed tool registry. Each module builds its own subset at
/// construction.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.descriptor().name, tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        let mut ds: Vec<ToolDescriptor> = self.tools.values().map(|t| t.descriptor()).collect();
        ds.sort_by(|a, b| a.name.cmp(&b.name));
        ds
    }

    /// A registry restricted to the named tools. Unknown names are skipped.
    pub fn subset(&self, names: &[&str]) -> ToolRegistry {
        let mut out = ToolRegistry::new();
        for name in names {
            if let Some(tool) = self.tools.get(*name) {
                out.tools.insert((*name).to_string(), tool.clone());
            }
        }
        out
    }

    /// Execute a tool by name, with debug tracing of arguments and outcome.
    pub async fn execute(
        &self,
        name: &str,
        invocation: &ToolInvocation,
        args: serde_json::Value,
    ) -> Result<ToolOutcome, PromptPipeError> {
        let Some(tool) = self.tools.get(name) else {
            return Ok(ToolOutcome::fail(format!("unknown tool {name:?}")));
        };

        let args_preview = truncate(&args.to_string(), 200);
        let outcome = tool
            .execute(invocation, args)
            .await
            .map_err(|e| PromptPipeError::ToolExecution(format!("{name}: {e}")))?;
        debug!(
            tool = name,
            participant = %invocation.participant_id,
            args = %args_preview,
            success = outcome.success,
            "tool executed"
        );
        Ok(outcome)
    }
}

/// Truncate to at most `max` characters, on a char boundary.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor {
                name: "echo".into(),
                description: "Echo the input".into(),
                parameters: serde_json::json!({"type": "object"}),
            }
        }

        async fn execute(
            &self,
            _invocation: &ToolInvocation,
            args: serde_json::Value,
        ) -> Result<ToolOutcome, PromptPipeError> {
            Ok(ToolOutcome::ok(args.to_string()))
        }
    }

    fn invocation() -> ToolInvocation {
        ToolInvocation {
            participant_id: "p_1".into(),
            phone: "+15551234567".into(),
            debug: false,
        }
    }

    #[tokio::test]
    async fn test_unknown_tool_is_a_failure_result() {
        let registry = ToolRegistry::new();
        let outcome = registry
            .execute("nope", &invocation(), serde_json::json!({}))
            .await
            .unwrap();
        assert!(!outcome.success);
        assert!(outcome.llm_result().starts_with("❌ "));
    }

    struct BrokenTool;

    #[async_trait]
    impl Tool for BrokenTool {
        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor {
                name: "broken".into(),
                description: "Always errors".into(),
                parameters: serde_json::json!({"type": "object"}),
            }
        }

        async fn execute(
            &self,
            _invocation: &ToolInvocation,
            _args: serde_json::Value,
        ) -> Result<ToolOutcome, PromptPipeError> {
            Err(PromptPipeError::StateLoad("store unreachable".into()))
        }
    }

    #[tokio::test]
    async fn test_hard_tool_error_is_wrapped() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(BrokenTool));
        let err = registry
            .execute("broken", &invocation(), serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, PromptPipeError::ToolExecution(_)));
        assert!(err.to_string().contains("broken"));
    }

    #[tokio::test]
    async fn test_registry_executes_registered_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let outcome = registry
            .execute("echo", &invocation(), serde_json::json!({"a": 1}))
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.message, r#"{"a":1}"#);
    }

    #[test]
    fn test_subset_filters_tools() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let subset = registry.subset(&["echo", "missing"]);
        assert!(subset.get("echo").is_some());
        assert!(subset.get("missing").is_none());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello", 3), "hel");
        assert_eq!(truncate("✅✅✅✅", 2), "✅✅");
    }

    #[test]
    fn test_failure_llm_result_is_prefixed() {
        let outcome = ToolOutcome::fail("invalid time");
        assert_eq!(outcome.llm_result(), "❌ invalid time");
    }
}
