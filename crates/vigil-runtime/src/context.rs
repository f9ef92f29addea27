use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vigil_core::{Message, MessageContent, ToolResult};

/// Mutable state of one run, owned by the caller and threaded through
/// [`crate::AgentEngine::run`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunContext {
    pub project_id: String,
    pub session_id: Uuid,
    pub agent_id: String,
    pub task_type: String,
    pub messages: Vec<Message>,
    pub total_tokens: u64,
    pub total_cost: f64,
    /// Model that produced the most recent response.
    pub model_used: Option<String>,
    /// Tools this run may invoke. Empty means none.
    pub allowed_tools: Vec<String>,
}

impl RunContext {
    pub fn new(
        project_id: impl Into<String>,
        agent_id: impl Into<String>,
        task_type: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            session_id: Uuid::new_v4(),
            agent_id: agent_id.into(),
            task_type: task_type.into(),
            messages: Vec::new(),
            total_tokens: 0,
            total_cost: 0.0,
            model_used: None,
            allowed_tools: Vec::new(),
        }
    }

    pub fn with_allowed_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn allows(&self, tool: &str) -> bool {
        self.allowed_tools.iter().any(|t| t == tool)
    }

    /// Tool results recorded in the conversation, oldest first.
    pub fn tool_results(&self) -> Vec<ToolResult> {
        self.messages
            .iter()
            .flat_map(|m| m.content.iter())
            .filter_map(|c| match c {
                MessageContent::ToolResult {
                    tool_call_id,
                    content,
                    is_error,
                } => Some(ToolResult {
                    tool_call_id: tool_call_id.clone(),
                    content: content.clone(),
                    is_error: *is_error,
                }),
                _ => None,
            })
            .collect()
    }
}
