//! In-memory fakes for the LLM and messenger ports, used across tests.

use crate::context::FlowContext;
use crate::timer::TimerService;
use async_trait::async_trait;
use promptpipe_core::{
    config::{FlowConfig, JobsConfig},
    message::{ChatMessage, LlmToolResponse, ToolCall, ToolDescriptor},
    traits::{LlmClient, Messenger},
    PromptPipeError,
};
use promptpipe_store::Store;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Scripted LLM: pops queued responses, with optional repeat behavior.
#[derive(Default)]
pub struct FakeLlm {
    tool_responses: Mutex<VecDeque<Result<LlmToolResponse, PromptPipeError>>>,
    plain_responses: Mutex<VecDeque<String>>,
    /// When the queue is empty, keep answering with this tool call.
    repeat_tool_call: Mutex<Option<(String, String)>>,
    pub tool_calls_made: AtomicUsize,
    pub plain_calls_made: AtomicUsize,
}

impl FakeLlm {
    pub fn push_content(&self, content: &str) {
        self.tool_responses.lock().unwrap().push_back(Ok(LlmToolResponse {
            content: content.to_string(),
            tool_calls: vec![],
        }));
    }

    pub fn push_tool_call(&self, name: &str, arguments: serde_json::Value) {
        let calls = self.tool_responses.lock().unwrap().len();
        self.tool_responses.lock().unwrap().push_back(Ok(LlmToolResponse {
            content: String::new(),
            tool_calls: vec![ToolCall {
                id: format!("call_{calls}"),
                name: name.to_string(),
                arguments: arguments.to_string(),
            }],
        }));
    }

    /// Queue a tool call with raw, possibly malformed, argument text.
    pub fn push_raw_tool_call(&self, name: &str, arguments: &str) {
        let calls = self.tool_responses.lock().unwrap().len();
        self.tool_responses.lock().unwrap().push_back(Ok(LlmToolResponse {
            content: String::new(),
            tool_calls: vec![ToolCall {
                id: format!("call_{calls}"),
                name: name.to_string(),
                arguments: arguments.to_string(),
            }],
        }));
    }

    /// Queue a failure for the next tool-capable call.
    pub fn push_tool_error(&self, message: &str) {
        self.tool_responses
            .lock()
            .unwrap()
            .push_back(Err(PromptPipeError::Llm(message.to_string())));
    }

    pub fn push_plain(&self, content: &str) {
        self.plain_responses
            .lock()
            .unwrap()
            .push_back(content.to_string());
    }

    /// Always answer with this tool call once the queue is drained.
    pub fn repeat_tool_call(&self, name: &str, arguments: serde_json::Value) {
        *self.repeat_tool_call.lock().unwrap() =
            Some((name.to_string(), arguments.to_string()));
    }
}

#[async_trait]
impl LlmClient for FakeLlm {
    async fn generate_with_messages(
        &self,
        _messages: &[ChatMessage],
    ) -> Result<String, PromptPipeError> {
        self.plain_calls_made.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .plain_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "Take one minute for your habit today.".to_string()))
    }

    async fn generate_with_tools(
        &self,
        _messages: &[ChatMessage],
        _tools: &[ToolDescriptor],
    ) -> Result<LlmToolResponse, PromptPipeError> {
        let n = self.tool_calls_made.fetch_add(1, Ordering::SeqCst);
        if let Some(resp) = self.tool_responses.lock().unwrap().pop_front() {
            return resp;
        }
        if let Some((name, arguments)) = self.repeat_tool_call.lock().unwrap().clone() {
            return Ok(LlmToolResponse {
                content: String::new(),
                tool_calls: vec![ToolCall {
                    id: format!("call_repeat_{n}"),
                    name,
                    arguments,
                }],
            });
        }
        Ok(LlmToolResponse {
            content: "Okay!".to_string(),
            tool_calls: vec![],
        })
    }
}

/// Recording messenger.
#[derive(Default)]
pub struct FakeMessenger {
    pub sent: Mutex<Vec<(String, String)>>,
    pub fail_sends: AtomicBool,
}

impl FakeMessenger {
    pub fn sent_bodies(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(_, b)| b.clone()).collect()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Messenger for FakeMessenger {
    fn validate_and_canonicalize_recipient(&self, raw: &str) -> Result<String, PromptPipeError> {
        if raw.starts_with('+') && raw.len() > 8 {
            Ok(raw.to_string())
        } else {
            Err(PromptPipeError::Validation("bad recipient".into()))
        }
    }

    async fn send_message(&self, to: &str, body: &str) -> Result<(), PromptPipeError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(PromptPipeError::Messaging("send failed".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), body.to_string()));
        Ok(())
    }
}

/// Everything a flow test needs, with the fakes still reachable.
pub struct TestRig {
    pub ctx: Arc<FlowContext>,
    pub llm: Arc<FakeLlm>,
    pub messenger: Arc<FakeMessenger>,
}

pub async fn test_rig() -> TestRig {
    test_rig_with(FlowConfig::default()).await
}

pub async fn test_rig_with(flow: FlowConfig) -> TestRig {
    let store = Store::new(":memory:").await.unwrap();
    let llm = Arc::new(FakeLlm::default());
    let messenger = Arc::new(FakeMessenger::default());
    let ctx = FlowContext::new(
        store,
        llm.clone(),
        messenger.clone(),
        TimerService::new(),
        flow,
        JobsConfig::default(),
        crate::prompts::Prompts::default(),
    );
    TestRig { ctx, llm, messenger }
}

pub async fn test_context() -> Arc<FlowContext> {
    test_rig().await.ctx
}

/// Enroll a participant and return its ID.
pub async fn enroll(ctx: &FlowContext, phone: &str) -> String {
    ctx.store.create_participant(phone).await.unwrap().id
}
