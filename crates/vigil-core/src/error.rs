use thiserror::Error;

/// Unified error type for the entire Vigil workspace.
#[derive(Error, Debug)]
pub enum VigilError {
    // ── LLM errors ─────────────────────────────────────────────
    #[error("llm provider error: {0}")]
    LlmProvider(String),

    #[error("llm rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("provider not configured: {0}")]
    ProviderNotConfigured(String),

    #[error("no models configured")]
    NoModelsConfigured,

    // ── Tool errors ────────────────────────────────────────────
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("tool execution failed: {tool}: {reason}")]
    ToolExecution { tool: String, reason: String },

    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("tool not allowed: {0}")]
    ToolDenied(String),

    // ── Safety errors ──────────────────────────────────────────
    #[error("kill switch active: {0}")]
    Halted(String),

    // ── Approval errors ────────────────────────────────────────
    #[error("approval request #{0} not found")]
    ApprovalNotFound(i64),

    #[error("approval request #{id} is {from}, cannot move to {to}")]
    InvalidTransition { id: i64, from: String, to: String },

    // ── Storage errors ─────────────────────────────────────────
    #[error("storage error: {0}")]
    Storage(String),

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, VigilError>;
