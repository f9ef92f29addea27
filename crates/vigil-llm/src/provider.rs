use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vigil_core::{Message, Result, ToolCall, ToolSchema};

/// A request to an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// Provider-specific model name, e.g. "claude-sonnet-4-20250514".
    pub model: String,
    /// Conversation history without system messages.
    pub messages: Vec<Message>,
    /// Tool schemas the model may call. Empty means no tools.
    pub tools: Vec<ToolSchema>,
    /// System prompt (separate from messages for providers that support it).
    pub system: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Uniform result of one exchange.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Assistant text, possibly empty.
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Usage,
    pub stop_reason: StopReason,
}

impl LlmResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
    ContentFilter,
}

/// Token usage reported (or estimated) by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }

    pub fn merge(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// Trait implemented by each LLM backend (Anthropic, OpenAI, Ollama, mock).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider id, matched against a model descriptor's `provider`.
    fn name(&self) -> &str;

    /// Models this provider knows about. Informational only.
    fn models(&self) -> Vec<String>;

    /// Perform one non-streaming exchange.
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse>;

    /// Check if this provider is reachable / configured.
    async fn health_check(&self) -> Result<()>;
}
