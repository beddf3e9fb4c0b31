use thiserror::Error;

/// Top-level error type for PromptPipe.
#[derive(Debug, Error)]
pub enum PromptPipeError {
    /// Failure loading or writing conversation state.
    #[error("state error: {0}")]
    StateLoad(String),

    /// Error from the LLM client (request failure, timeout, bad response).
    #[error("llm error: {0}")]
    Llm(String),

    /// A tool failed in a way that aborts the turn. Validation failures are
    /// not errors; they are reported back to the LLM as tool results.
    #[error("tool error: {0}")]
    ToolExecution(String),

    /// Error from the messaging transport.
    #[error("messaging error: {0}")]
    Messaging(String),

    /// Invalid input: bad recipient, bad schedule time, bad tool arguments.
    #[error("validation error: {0}")]
    Validation(String),

    /// A required collaborator was not wired in.
    #[error("missing dependency: {0}")]
    DependencyMissing(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
