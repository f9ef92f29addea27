use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, info};
use vigil_core::{MessageContent, Result, Role, ToolCall, VigilError};

use crate::provider::*;

/// OpenAI-compatible chat completions provider (OpenAI, Azure, vLLM, etc.)
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: "https://api.openai.com/v1".into(),
        }
    }

    /// Use a custom base URL for compatible endpoints.
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }
}

pub(crate) fn build_request_body(request: &LlmRequest) -> Value {
    let mut messages = Vec::new();

    if let Some(ref system) = request.system {
        messages.push(json!({ "role": "system", "content": system }));
    }

    for msg in &request.messages {
        match msg.role {
            Role::System => {
                messages.push(json!({ "role": "system", "content": msg.text_content() }));
            }
            Role::User => {
                messages.push(json!({ "role": "user", "content": msg.text_content() }));
            }
            Role::Assistant if msg.tool_calls.is_empty() => {
                messages.push(json!({ "role": "assistant", "content": msg.text_content() }));
            }
            Role::Assistant => {
                let calls: Vec<Value> = msg
                    .tool_calls
                    .iter()
                    .map(|tc| {
                        json!({
                            "id": tc.id,
                            "type": "function",
                            "function": {
                                "name": tc.tool_name,
                                "arguments": tc.arguments.to_string(),
                            }
                        })
                    })
                    .collect();
                let text = msg.text_content();
                let content = if text.is_empty() { Value::Null } else { json!(text) };
                messages.push(json!({
                    "role": "assistant",
                    "content": content,
                    "tool_calls": calls,
                }));
            }
            Role::Tool => {
                for block in &msg.content {
                    if let MessageContent::ToolResult {
                        tool_call_id,
                        content,
                        ..
                    } = block
                    {
                        messages.push(json!({
                            "role": "tool",
                            "tool_call_id": tool_call_id,
                            "content": content,
                        }));
                    }
                }
            }
        }
    }

    let mut body = json!({
        "model": &request.model,
        "temperature": request.temperature,
        "max_tokens": request.max_tokens,
        "messages": messages,
    });

    if !request.tools.is_empty() {
        let tools: Vec<Value> = request
            .tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();
        body["tools"] = json!(tools);
    }

    body
}

pub(crate) fn parse_response(data: &Value) -> LlmResponse {
    let choice = &data["choices"][0];
    let text = choice["message"]["content"].as_str().unwrap_or("").to_string();

    let tool_calls: Vec<ToolCall> = choice["message"]["tool_calls"]
        .as_array()
        .map(|calls| {
            calls
                .iter()
                .filter_map(|c| {
                    Some(ToolCall {
                        id: c["id"].as_str()?.to_string(),
                        tool_name: c["function"]["name"].as_str()?.to_string(),
                        arguments: serde_json::from_str(
                            c["function"]["arguments"].as_str().unwrap_or("{}"),
                        )
                        .unwrap_or_default(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let stop_reason = match choice["finish_reason"].as_str().unwrap_or("") {
        "length" => StopReason::MaxTokens,
        "content_filter" => StopReason::ContentFilter,
        _ if !tool_calls.is_empty() => StopReason::ToolUse,
        _ => StopReason::EndTurn,
    };

    let usage = &data["usage"];
    LlmResponse {
        text,
        tool_calls,
        usage: Usage {
            input_tokens: usage["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: usage["completion_tokens"].as_u64().unwrap_or(0) as u32,
        },
        stop_reason,
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn models(&self) -> Vec<String> {
        vec!["gpt-4o".into(), "gpt-4o-mini".into()]
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let body = build_request_body(request);
        debug!(model = %request.model, "sending chat completions request");

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
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
        info!(provider = "openai", base_url = %self.base_url, "checking API health");
        if self.api_key.is_empty() {
            return Err(VigilError::ProviderNotConfigured(
                "openai API key not set".into(),
            ));
        }
        Ok(())
    }
}
