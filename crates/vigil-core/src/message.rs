use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A message in a run's conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub session_id: Uuid,
    pub role: Role,
    pub content: Vec<MessageContent>,
    pub timestamp: DateTime<Utc>,
    /// Tool calls requested by the assistant in this message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<super::tool::ToolCall>,
}

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single content block within a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text {
        text: String,
    },
    ToolResult {
        tool_call_id: String,
        content: String,
        is_error: bool,
    },
}

impl Message {
    /// Create a simple text message.
    pub fn text(session_id: Uuid, role: Role, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            role,
            content: vec![MessageContent::Text { text: text.into() }],
            timestamp: Utc::now(),
            tool_calls: vec![],
        }
    }

    /// An assistant turn carrying tool calls and no text.
    pub fn tool_request(session_id: Uuid, calls: Vec<super::tool::ToolCall>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            role: Role::Assistant,
            content: vec![],
            timestamp: Utc::now(),
            tool_calls: calls,
        }
    }

    /// A tool-role message holding one result.
    pub fn tool_result(session_id: Uuid, result: &super::tool::ToolResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            role: Role::Tool,
            content: vec![MessageContent::ToolResult {
                tool_call_id: result.tool_call_id.clone(),
                content: result.content.clone(),
                is_error: result.is_error,
            }],
            timestamp: Utc::now(),
            tool_calls: vec![],
        }
    }

    /// Extract all text content joined together.
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c {
                MessageContent::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Estimate token count for this message.
    /// Uses a simple heuristic: ~4 chars per token for English text.
    pub fn estimate_tokens(&self) -> usize {
        let mut chars = 0usize;

        for block in &self.content {
            match block {
                MessageContent::Text { text } => chars += text.len(),
                MessageContent::ToolResult { content, .. } => chars += content.len(),
            }
        }

        for tc in &self.tool_calls {
            chars += tc.tool_name.len();
            chars += tc.arguments.to_string().len();
        }

        chars / 4
    }
}
