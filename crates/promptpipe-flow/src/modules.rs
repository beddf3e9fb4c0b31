//! Sub-state modules: each owns a system prompt, a tool subset, and a
//! fallback reply for when the tool loop produces nothing user-visible.

use crate::context::FlowContext;
use crate::state::SubState;

pub struct ModuleSpec {
    pub state: SubState,
    pub system_prompt: String,
    pub tool_names: &'static [&'static str],
    pub fallback: &'static str,
}

const INTAKE_TOOLS: &[&str] = &["save_user_profile", "transition_state"];
const PROMPT_GENERATOR_TOOLS: &[&str] = &[
    "generate_habit_prompt",
    "scheduler",
    "save_user_profile",
    "transition_state",
];
const FEEDBACK_TOOLS: &[&str] = &[
    "save_user_profile",
    "scheduler",
    "initiate_intervention",
    "transition_state",
];
const COORDINATOR_TOOLS: &[&str] = &[
    "save_user_profile",
    "scheduler",
    "generate_habit_prompt",
    "initiate_intervention",
    "transition_state",
];

pub fn module_for(state: SubState, ctx: &FlowContext) -> ModuleSpec {
    match state {
        SubState::Intake => ModuleSpec {
            state,
            system_prompt: ctx.prompts.intake.clone(),
            tool_names: INTAKE_TOOLS,
            fallback: "I'm here to help you build a one-minute habit. \
                       What would you like to work on?",
        },
        SubState::PromptGenerator => ModuleSpec {
            state,
            system_prompt: ctx.prompts.prompt_generator.clone(),
            tool_names: PROMPT_GENERATOR_TOOLS,
            fallback: "Ready when you are. Want your one-minute prompt now, \
                       or should I set up a daily time?",
        },
        SubState::Feedback => ModuleSpec {
            state,
            system_prompt: ctx.prompts.feedback.clone(),
            tool_names: FEEDBACK_TOOLS,
            fallback: "How did the last prompt go? Completed, skipped, \
                       or something in between?",
        },
        SubState::Coordinator => ModuleSpec {
            state,
            system_prompt: ctx.prompts.coordinator.clone(),
            tool_names: COORDINATOR_TOOLS,
            fallback: "I'm here to help. What would you like to do next?",
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_context;

    #[tokio::test]
    async fn test_every_state_has_a_module() {
        let ctx = test_context().await;
        for state in [
            SubState::Intake,
            SubState::PromptGenerator,
            SubState::Feedback,
            SubState::Coordinator,
        ] {
            let m = module_for(state, &ctx);
            assert_eq!(m.state, state);
            assert!(!m.system_prompt.is_empty());
            assert!(!m.tool_names.is_empty());
            assert!(!m.fallback.is_empty());
        }
    }

    #[tokio::test]
    async fn test_intake_cannot_generate_prompts() {
        let ctx = test_context().await;
        let m = module_for(SubState::Intake, &ctx);
        assert!(!m.tool_names.contains(&"generate_habit_prompt"));
        assert!(m.tool_names.contains(&"save_user_profile"));
    }
}
