use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::PromptPipeError;

/// Top-level PromptPipe configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub messaging: MessagingConfig,
    #[serde(default)]
    pub flow: FlowConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
}

/// General service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Directory holding the per-module system prompt files.
    #[serde(default = "default_prompts_dir")]
    pub prompts_dir: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            log_level: default_log_level(),
            prompts_dir: default_prompts_dir(),
        }
    }
}

/// LLM backend settings (OpenAI-compatible chat completions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    /// Per-call timeout in seconds (default: 60).
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_llm_model(),
            base_url: default_llm_base_url(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

/// Messaging gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingConfig {
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,
    #[serde(default)]
    pub api_token: String,
    /// Send timeout in seconds (default: 30).
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
    /// Enroll unknown senders as new participants on first inbound message.
    #[serde(default = "default_true")]
    pub auto_enroll: bool,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            gateway_url: default_gateway_url(),
            api_token: String::new(),
            send_timeout_secs: default_send_timeout_secs(),
            auto_enroll: true,
        }
    }
}

/// Which coordinator drives conversations.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinatorChoice {
    /// LLM-driven sub-state modules (default).
    #[default]
    Llm,
    /// Scripted micro-intervention flow, no LLM required.
    Static,
}

/// Conversation flow settings.
///
/// Duration fields accept strings like `45s`, `15m`, `3h`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    #[serde(default = "default_feedback_initial_timeout")]
    pub feedback_initial_timeout: String,
    #[serde(default = "default_feedback_followup_delay")]
    pub feedback_followup_delay: String,
    /// Minutes before delivery time at which prompt generation starts.
    #[serde(default = "default_prep_minutes")]
    pub daily_prompt_prep_minutes: u32,
    #[serde(default = "default_reminder_delay")]
    pub daily_prompt_reminder_delay: String,
    #[serde(default)]
    pub auto_feedback_enforcement_enabled: bool,
    #[serde(default = "default_history_max")]
    pub conversation_history_max: usize,
    #[serde(default = "default_llm_context_max")]
    pub llm_history_context_max: usize,
    #[serde(default = "default_tool_loop_max_rounds")]
    pub tool_loop_max_rounds: usize,
    #[serde(default)]
    pub coordinator: CoordinatorChoice,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            feedback_initial_timeout: default_feedback_initial_timeout(),
            feedback_followup_delay: default_feedback_followup_delay(),
            daily_prompt_prep_minutes: default_prep_minutes(),
            daily_prompt_reminder_delay: default_reminder_delay(),
            auto_feedback_enforcement_enabled: false,
            conversation_history_max: default_history_max(),
            llm_history_context_max: default_llm_context_max(),
            tool_loop_max_rounds: default_tool_loop_max_rounds(),
            coordinator: CoordinatorChoice::Llm,
        }
    }
}

impl FlowConfig {
    pub fn feedback_initial_timeout(&self) -> Result<Duration, PromptPipeError> {
        parse_duration(&self.feedback_initial_timeout)
    }

    pub fn feedback_followup_delay(&self) -> Result<Duration, PromptPipeError> {
        parse_duration(&self.feedback_followup_delay)
    }

    pub fn daily_prompt_reminder_delay(&self) -> Result<Duration, PromptPipeError> {
        parse_duration(&self.daily_prompt_reminder_delay)
    }
}

/// Durable job queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Runner poll interval in milliseconds (default: 50).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Claim lease in seconds; claimed jobs past this return to queued.
    #[serde(default = "default_claim_lease_secs")]
    pub claim_lease_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            claim_lease_secs: default_claim_lease_secs(),
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
        }
    }
}

// --- Default value functions ---

fn default_db_path() -> String {
    "promptpipe.db".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_prompts_dir() -> String {
    "prompts".to_string()
}
fn default_llm_model() -> String {
    "gpt-4o".to_string()
}
fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    60
}
fn default_gateway_url() -> String {
    "http://localhost:8090".to_string()
}
fn default_send_timeout_secs() -> u64 {
    30
}
fn default_true() -> bool {
    true
}
fn default_feedback_initial_timeout() -> String {
    "15m".to_string()
}
fn default_feedback_followup_delay() -> String {
    "3h".to_string()
}
fn default_prep_minutes() -> u32 {
    10
}
fn default_reminder_delay() -> String {
    "5h".to_string()
}
fn default_history_max() -> usize {
    50
}
fn default_llm_context_max() -> usize {
    30
}
fn default_tool_loop_max_rounds() -> usize {
    10
}
fn default_poll_interval_ms() -> u64 {
    50
}
fn default_claim_lease_secs() -> u64 {
    300
}
fn default_batch_size() -> usize {
    10
}
fn default_max_attempts() -> u32 {
    8
}

/// Parse a duration string: an integer followed by `s`, `m`, or `h`.
pub fn parse_duration(s: &str) -> Result<Duration, PromptPipeError> {
    let s = s.trim();
    let (num, unit) = s.split_at(s.len().saturating_sub(1));
    let value: u64 = num
        .parse()
        .map_err(|_| PromptPipeError::Config(format!("invalid duration: {s:?}")))?;
    let secs = match unit {
        "s" => value,
        "m" => value * 60,
        "h" => value * 3600,
        _ => return Err(PromptPipeError::Config(format!("invalid duration: {s:?}"))),
    };
    Ok(Duration::from_secs(secs))
}

/// Load configuration from a TOML file, then apply environment overrides.
///
/// Falls back to defaults if the file does not exist.
pub fn load(path: &str) -> Result<Config, PromptPipeError> {
    let path = Path::new(path);
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PromptPipeError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| PromptPipeError::Config(format!("failed to parse config: {}", e)))?
    } else {
        tracing::info!("config file not found at {}, using defaults", path.display());
        Config::default()
    };

    apply_env_overrides(&mut config)?;
    Ok(config)
}

/// Apply the recognized environment variables on top of the file config.
fn apply_env_overrides(config: &mut Config) -> Result<(), PromptPipeError> {
    if let Ok(v) = std::env::var("FEEDBACK_INITIAL_TIMEOUT") {
        parse_duration(&v)?;
        config.flow.feedback_initial_timeout = v;
    }
    if let Ok(v) = std::env::var("FEEDBACK_FOLLOWUP_DELAY") {
        parse_duration(&v)?;
        config.flow.feedback_followup_delay = v;
    }
    if let Ok(v) = std::env::var("DAILY_PROMPT_PREP_MINUTES") {
        config.flow.daily_prompt_prep_minutes = parse_env(&v, "DAILY_PROMPT_PREP_MINUTES")?;
    }
    if let Ok(v) = std::env::var("DAILY_PROMPT_REMINDER_DELAY") {
        parse_duration(&v)?;
        config.flow.daily_prompt_reminder_delay = v;
    }
    if let Ok(v) = std::env::var("AUTO_FEEDBACK_ENFORCEMENT_ENABLED") {
        config.flow.auto_feedback_enforcement_enabled =
            matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
    }
    if let Ok(v) = std::env::var("CONVERSATION_HISTORY_MAX") {
        config.flow.conversation_history_max = parse_env(&v, "CONVERSATION_HISTORY_MAX")?;
    }
    if let Ok(v) = std::env::var("LLM_HISTORY_CONTEXT_MAX") {
        config.flow.llm_history_context_max = parse_env(&v, "LLM_HISTORY_CONTEXT_MAX")?;
    }
    if let Ok(v) = std::env::var("TOOL_LOOP_MAX_ROUNDS") {
        config.flow.tool_loop_max_rounds = parse_env(&v, "TOOL_LOOP_MAX_ROUNDS")?;
    }
    if let Ok(v) = std::env::var("COORDINATOR_CHOICE") {
        config.flow.coordinator = match v.to_ascii_lowercase().as_str() {
            "llm" => CoordinatorChoice::Llm,
            "static" => CoordinatorChoice::Static,
            other => {
                return Err(PromptPipeError::Config(format!(
                    "invalid COORDINATOR_CHOICE: {other:?}"
                )))
            }
        };
    }
    Ok(())
}

fn parse_env<T: std::str::FromStr>(value: &str, name: &str) -> Result<T, PromptPipeError> {
    value
        .parse()
        .map_err(|_| PromptPipeError::Config(format!("invalid {name}: {value:?}")))
}
