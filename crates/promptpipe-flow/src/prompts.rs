//! Per-module system prompts, loaded from the prompts directory at startup.
//!
//! Missing or unreadable files fall back to the bundled defaults, so a bare
//! deployment still runs.

use tracing::info;

const BUNDLED_INTAKE: &str = include_str!("../../../prompts/intake.txt");
const BUNDLED_PROMPT_GENERATOR: &str = include_str!("../../../prompts/prompt_generator.txt");
const BUNDLED_FEEDBACK: &str = include_str!("../../../prompts/feedback.txt");
const BUNDLED_COORDINATOR: &str = include_str!("../../../prompts/coordinator.txt");

#[derive(Debug, Clone)]
pub struct Prompts {
    pub intake: String,
    pub prompt_generator: String,
    pub feedback: String,
    pub coordinator: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            intake: BUNDLED_INTAKE.to_string(),
            prompt_generator: BUNDLED_PROMPT_GENERATOR.to_string(),
            feedback: BUNDLED_FEEDBACK.to_string(),
            coordinator: BUNDLED_COORDINATOR.to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts from `{dir}/<module>.txt`, keeping bundled defaults for
    /// anything missing.
    pub fn load(dir: &str) -> Self {
        let mut prompts = Self::default();
        for (name, slot) in [
            ("intake", &mut prompts.intake),
            ("prompt_generator", &mut prompts.prompt_generator),
            ("feedback", &mut prompts.feedback),
            ("coordinator", &mut prompts.coordinator),
        ] {
            let path = format!("{dir}/{name}.txt");
            if let Ok(content) = std::fs::read_to_string(&path) {
                if !content.trim().is_empty() {
                    *slot = content;
                    info!("loaded prompt from {path}");
                }
            }
        }
        prompts
    }
}
