use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, info};
use vigil_core::{MessageContent, Result, Role, ToolCall, VigilError};

use crate::provider::*;

const API_VERSION: &str = "2023-06-01";

/// Anthropic Messages API provider.
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: "https://api.anthropic.com/v1".into(),
        }
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }
}

/// Translate a request into the Messages API body.
pub(crate) fn build_request_body(request: &LlmRequest) -> Value {
    let mut messages = Vec::new();
    for msg in &request.messages {
        match msg.role {
            // carried in the top-level "system" field
            Role::System => continue,
            Role::User => {
                messages.push(json!({
                    "role": "user",
                    "content": msg.text_content(),
                }));
            }
            Role::Assistant if msg.tool_calls.is_empty() => {
                messages.push(json!({
                    "role": "assistant",
                    "content": msg.text_content(),
                }));
            }
            Role::Assistant => {
                let mut blocks: Vec<Value> = Vec::new();
                let text = msg.text_content();
                if !text.is_empty() {
                    blocks.push(json!({ "type": "text", "text": text }));
                }
                for tc in &msg.tool_calls {
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": tc.id,
                        "name": tc.tool_name,
                        "input": tc.arguments,
                    }));
                }
                messages.push(json!({ "role": "assistant", "content": blocks }));
            }
            Role::Tool => {
                // tool results travel as a user turn of tool_result blocks
                let blocks: Vec<Value> = msg
                    .content
                    .iter()
                    .filter_map(|block| match block {
                        MessageContent::ToolResult {
                            tool_call_id,
                            content,
                            is_error,
                        } => Some(json!({
                            "type": "tool_result",
                            "tool_use_id": tool_call_id,
                            "content": content,
                            "is_error": is_error,
                        })),
                        _ => None,
                    })
                    .collect();
                if blocks.is_empty() {
                    messages.push(json!({ "role": "user", "content": msg.text_content() }));
                } else {
                    messages.push(json!({ "role": "user", "content": blocks }));
                }
            }
        }
    }

    let mut body = json!({
        "model": &request.model,
        "max_tokens": request.max_tokens,
        "temperature": request.temperature,
        "messages": messages,
    });

    if let Some(ref system) = request.system {
        body["system"] = json!(system);
    }

    if !request.tools.is_empty() {
        let tools: Vec<Value> = request
            .tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.parameters,
                })
            })
            .collect();
        body["tools"] = json!(tools);
    }

    body
}

/// Parse a Messages API response body.
pub(crate) fn parse_response(data: &Value) -> LlmResponse {
    let blocks = data["content"].as_array().cloned().unwrap_or_default();

    let text = blocks
        .iter()
        .filter(|b| b["type"] == "text")
        .filter_map(|b| b["text"].as_str())
        .collect::<Vec<_>>()
        .join("");

    let tool_calls: Vec<ToolCall> = blocks
        .iter()
        .filter(|b| b["type"] == "tool_use")
        .map(|b| ToolCall {
            id: b["id"].as_str().unwrap_or("").to_string(),
            tool_name: b["name"].as_str().unwrap_or("").to_string(),
            arguments: b["input"].clone(),
        })
        .collect();

    let stop_reason = match data["stop_reason"].as_str() {
        Some("tool_use") => StopReason::ToolUse,
        Some("max_tokens") => StopReason::MaxTokens,
        Some("stop_sequence") => StopReason::StopSequence,
        _ => StopReason::EndTurn,
    };

    let usage = &data["usage"];
    LlmResponse {
        text,
        tool_calls,
        usage: Usage {
            input_tokens: usage["input_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: usage["output_tokens"].as_u64().unwrap_or(0) as u32,
        },
        stop_reason,
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn models(&self) -> Vec<String> {
        vec![
            "claude-3-5-haiku-20241022".into(),
            "claude-sonnet-4-20250514".into(),
            "claude-opus-4-5-20251101".into(),
        ]
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let body = build_request_body(request);
        debug!(model = %request.model, "sending Anthropic API request");

        let resp = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| VigilError::LlmProvider(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            if status.as_u16() == 429 {
                return Err(VigilError::RateLimited {
                    retry_after_secs: 30,
                });
            }
            return Err(VigilError::LlmProvider(format!("HTTP {status}: {text}")));
        }

        let data: Value = resp
            .json()
            .await
            .map_err(|e| VigilError::LlmProvider(e.to_string()))?;

        Ok(parse_response(&data))
    }

    async fn health_check(&self) -> Result<()> {
        info!(provider = "anthropic", "checking API health");
        if self.api_key.is_empty() {
            return Err(VigilError::ProviderNotConfigured(
                "anthropic API key not set".into(),
            ));
        }
        Ok(())
    }
}
