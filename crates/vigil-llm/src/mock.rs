//! Mock LLM provider for deterministic testing.
//!
//! Returns pre-configured responses without making any HTTP calls.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::provider::*;
use vigil_core::{Result, ToolCall, VigilError};

/// A mock LLM provider that returns queued responses in order.
///
/// # Example
/// ```
/// use vigil_llm::mock::MockProvider;
/// let provider = MockProvider::new("mock")
///     .with_error("HTTP 503: overloaded")
///     .with_response("Hello, world!");
/// ```
pub struct MockProvider {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    /// Every request received, for assertions in tests.
    requests: Arc<Mutex<Vec<LlmRequest>>>,
    name: String,
}

/// A pre-configured response from the mock provider.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub stop_reason: StopReason,
    pub usage: Usage,
    /// If set, the provider returns this error instead.
    pub error: Option<String>,
}

impl Default for MockResponse {
    fn default() -> Self {
        Self {
            text: String::new(),
            tool_calls: vec![],
            stop_reason: StopReason::EndTurn,
            usage: Usage {
                input_tokens: 100,
                output_tokens: 50,
            },
            error: None,
        }
    }
}

impl MockResponse {
    pub fn text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Default::default()
        }
    }

    pub fn tool_call(name: &str, args: serde_json::Value) -> Self {
        Self {
            tool_calls: vec![ToolCall {
                id: format!("call_{}", uuid::Uuid::new_v4()),
                tool_name: name.to_string(),
                arguments: args,
            }],
            stop_reason: StopReason::ToolUse,
            ..Default::default()
        }
    }

    pub fn error(msg: &str) -> Self {
        Self {
            error: Some(msg.to_string()),
            ..Default::default()
        }
    }

    pub fn with_usage(mut self, input_tokens: u32, output_tokens: u32) -> Self {
        self.usage = Usage {
            input_tokens,
            output_tokens,
        };
        self
    }
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(vec![])),
            name: name.into(),
        }
    }

    /// Queue a simple text response.
    pub fn with_response(self, text: &str) -> Self {
        self.push(MockResponse::text(text));
        self
    }

    /// Queue a single tool call response.
    pub fn with_tool_call(self, name: &str, args: serde_json::Value) -> Self {
        self.push(MockResponse::tool_call(name, args));
        self
    }

    /// Queue an error response.
    pub fn with_error(self, error: &str) -> Self {
        self.push(MockResponse::error(error));
        self
    }

    /// Queue a fully custom response.
    pub fn with_mock_response(self, resp: MockResponse) -> Self {
        self.push(resp);
        self
    }

    /// Queue a response on a shared provider.
    pub fn push(&self, resp: MockResponse) {
        self.responses.lock().push_back(resp);
    }

    /// Snapshot of all requests made so far.
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn next_response(&self) -> MockResponse {
        self.responses.lock().pop_front().unwrap_or_else(|| MockResponse {
            text: "(mock: no more queued responses)".to_string(),
            ..Default::default()
        })
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn models(&self) -> Vec<String> {
        vec!["mock-model".to_string()]
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        self.requests.lock().push(request.clone());
        let mock = self.next_response();

        if let Some(error) = mock.error {
            return Err(VigilError::LlmProvider(error));
        }

        Ok(LlmResponse {
            text: mock.text,
            tool_calls: mock.tool_calls,
            usage: mock.usage,
            stop_reason: mock.stop_reason,
        })
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
