//! The bounded LLM tool-call loop shared by all modules.
//!
//! Each round sends the message list plus the module's tool descriptors to
//! the LLM. Tool calls are executed and reported back as `tool` role
//! messages; a compact summary note per round goes into persisted history so
//! the model does not re-call the same tool on the next user turn. The loop
//! ends when the LLM answers without tool calls, or after the configured
//! round cap.

use crate::context::FlowContext;
use crate::tools::{truncate, ToolInvocation, ToolRegistry};
use promptpipe_core::{message::ChatMessage, PromptPipeError};
use tracing::warn;

/// What a completed loop produced.
#[derive(Debug)]
pub struct ToolLoopResult {
    /// The user-visible reply, when one was produced. `None` means the
    /// caller should fall back to its module default.
    pub reply: Option<String>,
    /// Per-round tool summary notes for persisted history.
    pub history_notes: Vec<String>,
    pub rounds: usize,
}

pub async fn run(
    ctx: &FlowContext,
    registry: &ToolRegistry,
    invocation: &ToolInvocation,
    mut messages: Vec<ChatMessage>,
) -> Result<ToolLoopResult, PromptPipeError> {
    let descriptors = registry.descriptors();
    let max_rounds = ctx.flow.tool_loop_max_rounds;
    let mut visible: Vec<String> = Vec::new();
    let mut notes: Vec<String> = Vec::new();

    for round in 0..max_rounds {
        // A failure once a round has produced user-visible tool output still
        // returns the partial reply; the participant sees what did happen.
        let response = match ctx.llm.generate_with_tools(&messages, &descriptors).await {
            Ok(r) => r,
            Err(e) if !visible.is_empty() => {
                warn!(
                    participant = %invocation.participant_id,
                    round,
                    error = %e,
                    "llm call failed mid-loop, replying with tool output so far"
                );
                return Ok(ToolLoopResult {
                    reply: join_visible(visible),
                    history_notes: notes,
                    rounds: round,
                });
            }
            Err(e) => return Err(e),
        };

        if response.tool_calls.is_empty() {
            let content = response.content.trim().to_string();
            if !content.is_empty() {
                visible.push(content);
            }
            return Ok(ToolLoopResult {
                reply: join_visible(visible),
                history_notes: notes,
                rounds: round + 1,
            });
        }

        let records = response
            .tool_calls
            .iter()
            .map(|c| c.to_record())
            .collect::<Vec<_>>();
        messages.push(ChatMessage::assistant_with_tool_calls(
            response.content.clone(),
            records,
        ));

        let mut ran: Vec<String> = Vec::new();
        for call in &response.tool_calls {
            let result = match serde_json::from_str(&call.arguments) {
                Ok(args) => match registry.execute(&call.name, invocation, args).await {
                    Ok(outcome) => {
                        if outcome.user_visible && !outcome.message.is_empty() {
                            visible.push(outcome.message.clone());
                        }
                        outcome.llm_result()
                    }
                    Err(e) if !visible.is_empty() => {
                        warn!(
                            participant = %invocation.participant_id,
                            tool = %call.name,
                            error = %e,
                            "tool failed mid-loop, replying with output so far"
                        );
                        return Ok(ToolLoopResult {
                            reply: join_visible(visible),
                            history_notes: notes,
                            rounds: round + 1,
                        });
                    }
                    Err(e) => return Err(e),
                },
                Err(e) => format!("❌ invalid tool arguments: {e}"),
            };
            messages.push(ChatMessage::tool_result(call.id.clone(), result.clone()));
            ran.push(format!("{} -> {}", call.name, truncate(&result, 100)));
        }
        notes.push(format!("[tools run: {}]", ran.join("; ")));
    }

    warn!(
        participant = %invocation.participant_id,
        rounds = max_rounds,
        "tool loop exhausted without a final reply"
    );
    Ok(ToolLoopResult {
        reply: join_visible(visible),
        history_notes: notes,
        rounds: max_rounds,
    })
}

fn join_visible(parts: Vec<String>) -> Option<String> {
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}
