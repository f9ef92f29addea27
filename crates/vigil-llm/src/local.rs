use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;
use vigil_core::{Result, Role, VigilError};

use crate::provider::*;

/// Ollama provider for locally hosted models.
///
/// Tool schemas are not forwarded: local tiers answer in text only. Token
/// counts come from Ollama's eval counters when present and are otherwise
/// estimated at ~4 characters per token.
pub struct OllamaProvider {
    client: reqwest::Client,
    /// Address of the Ollama server (e.g. "http://localhost:11434")
    base_url: String,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::new("http://localhost:11434")
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn build_messages(request: &LlmRequest) -> Vec<Value> {
    let mut messages = Vec::new();
    if let Some(ref system) = request.system {
        messages.push(json!({ "role": "system", "content": system }));
    }
    for msg in &request.messages {
        let content = if msg.role == Role::Tool {
            msg.content
                .iter()
                .filter_map(|c| match c {
                    vigil_core::MessageContent::ToolResult { content, .. } => {
                        Some(content.as_str())
                    }
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n")
        } else {
            msg.text_content()
        };
        messages.push(json!({ "role": role_name(msg.role), "content": content }));
    }
    messages
}

fn estimate_tokens(text: &str) -> u32 {
    (text.len() / 4) as u32
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn models(&self) -> Vec<String> {
        vec!["llama3.2:8b".into()]
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let messages = build_messages(request);
        let prompt_chars: usize = messages
            .iter()
            .map(|m| m["content"].as_str().map(str::len).unwrap_or(0))
            .sum();

        let body = json!({
            "model": &request.model,
            "messages": messages,
            "stream": false,
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_tokens,
            }
        });

        let resp = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| VigilError::LlmProvider(format!("ollama: {e}")))?;

        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(VigilError::LlmProvider(format!("ollama error: {text}")));
        }

        let data: Value = resp
            .json()
            .await
            .map_err(|e| VigilError::LlmProvider(e.to_string()))?;

        let text = data["message"]["content"].as_str().unwrap_or("").to_string();
        let input_tokens = data["prompt_eval_count"]
            .as_u64()
            .map(|n| n as u32)
            .unwrap_or((prompt_chars / 4) as u32);
        let output_tokens = data["eval_count"]
            .as_u64()
            .map(|n| n as u32)
            .unwrap_or_else(|| estimate_tokens(&text));

        Ok(LlmResponse {
            text,
            tool_calls: vec![],
            usage: Usage {
                input_tokens,
                output_tokens,
            },
            stop_reason: StopReason::EndTurn,
        })
    }

    async fn health_check(&self) -> Result<()> {
        info!(base_url = %self.base_url, "checking Ollama health");
        let resp = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(|e| VigilError::LlmProvider(format!("ollama unreachable: {e}")))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(VigilError::LlmProvider("ollama server unhealthy".into()))
        }
    }
}
