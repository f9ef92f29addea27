use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::anthropic::AnthropicProvider;
use crate::local::OllamaProvider;
use crate::openai::OpenAiProvider;
use crate::provider::{LlmProvider, LlmRequest, LlmResponse};
use vigil_config::schema::{ModelsConfig, ServicesConfig};
use vigil_core::{Message, ModelTier, Result, Role, ToolSchema, VigilError};

/// One configured model, looked up by tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub provider: String,
    pub name: String,
    pub tier: ModelTier,
    pub cost_per_1m_input: f64,
    pub cost_per_1m_output: f64,
    pub max_context: u32,
}

/// Routes tasks to tiers and performs exchanges with the tier's provider.
///
/// `invoke` is a single attempt: no logging, no retry, no fallback. The
/// orchestration loop owns escalation via [`ModelGateway::escalate`].
#[derive(Clone)]
pub struct ModelGateway {
    models: BTreeMap<ModelTier, ModelDescriptor>,
    task_routing: HashMap<String, ModelTier>,
    default_tier: ModelTier,
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    temperature: f32,
}

impl Default for ModelGateway {
    fn default() -> Self {
        Self::new(ModelTier::Cheap)
    }
}

impl ModelGateway {
    pub fn new(default_tier: ModelTier) -> Self {
        Self {
            models: BTreeMap::new(),
            task_routing: HashMap::new(),
            default_tier,
            providers: HashMap::new(),
            temperature: 0.0,
        }
    }

    /// Configure (or replace) the descriptor for its tier.
    pub fn with_model(mut self, descriptor: ModelDescriptor) -> Self {
        self.models.insert(descriptor.tier, descriptor);
        self
    }

    pub fn with_route(mut self, task_type: impl Into<String>, tier: ModelTier) -> Self {
        self.task_routing.insert(task_type.into(), tier);
        self
    }

    /// Register a provider under its `name()`.
    pub fn with_provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Build from `[models]` and create HTTP providers for the ones that have
    /// credentials. A tier whose provider is missing still exists; invoking
    /// it fails with `ProviderNotConfigured`, which the loop may escalate past.
    pub fn from_config(models: &ModelsConfig, services: &ServicesConfig) -> Result<Self> {
        let default_tier = ModelTier::from_str(&models.default_tier)?;
        let mut gateway = Self::new(default_tier);

        for (tier, entry) in models.parsed_tiers() {
            gateway = gateway.with_model(ModelDescriptor {
                provider: entry.provider.clone(),
                name: entry.name.clone(),
                tier,
                cost_per_1m_input: entry.cost_per_1m_input,
                cost_per_1m_output: entry.cost_per_1m_output,
                max_context: entry.max_context,
            });
        }
        for (task, tier) in &models.task_routing {
            gateway = gateway.with_route(task.clone(), ModelTier::from_str(tier)?);
        }

        let wanted: Vec<String> = gateway.models.values().map(|m| m.provider.clone()).collect();
        if wanted.iter().any(|p| p == "anthropic") {
            match services.anthropic_api_key {
                Some(ref key) => {
                    gateway = gateway.with_provider(Arc::new(AnthropicProvider::new(key.clone())))
                }
                None => warn!("anthropic tier configured but no API key set"),
            }
        }
        if wanted.iter().any(|p| p == "openai") {
            match services.openai_api_key {
                Some(ref key) => {
                    let mut provider = OpenAiProvider::new(key.clone());
                    if let Some(ref url) = services.openai_base_url {
                        provider = provider.with_base_url(url.clone());
                    }
                    gateway = gateway.with_provider(Arc::new(provider));
                }
                None => warn!("openai tier configured but no API key set"),
            }
        }
        if wanted.iter().any(|p| p == "ollama") {
            let provider = match services.ollama_host {
                Some(ref host) => OllamaProvider::new(host.clone()),
                None => OllamaProvider::default(),
            };
            gateway = gateway.with_provider(Arc::new(provider));
        }

        info!(
            tiers = gateway.models.len(),
            providers = gateway.providers.len(),
            default_tier = %gateway.default_tier,
            "model gateway ready"
        );
        Ok(gateway)
    }

    /// Pick the model for a task type: explicit route, else the default
    /// tier, else the cheapest configured tier.
    pub fn select(&self, task_type: &str) -> Result<ModelDescriptor> {
        let tier = self
            .task_routing
            .get(task_type)
            .copied()
            .unwrap_or(self.default_tier);
        if let Some(model) = self.models.get(&tier) {
            return Ok(model.clone());
        }
        self.models
            .values()
            .next()
            .cloned()
            .ok_or(VigilError::NoModelsConfigured)
    }

    /// The next strictly more capable configured tier, if any.
    pub fn escalate(&self, current: &ModelDescriptor) -> Option<ModelDescriptor> {
        use std::ops::Bound::{Excluded, Unbounded};
        self.models
            .range((Excluded(current.tier), Unbounded))
            .next()
            .map(|(_, m)| m.clone())
    }

    /// One request/response exchange. System-role messages are lifted into
    /// the request's system prompt.
    pub async fn invoke(
        &self,
        model: &ModelDescriptor,
        messages: &[Message],
        tools: &[ToolSchema],
        max_tokens: u32,
    ) -> Result<LlmResponse> {
        let provider = self
            .providers
            .get(&model.provider)
            .ok_or_else(|| VigilError::ProviderNotConfigured(model.provider.clone()))?;

        let mut system_parts = Vec::new();
        let mut conversation = Vec::with_capacity(messages.len());
        for msg in messages {
            if msg.role == Role::System {
                system_parts.push(msg.text_content());
            } else {
                conversation.push(msg.clone());
            }
        }

        let request = LlmRequest {
            model: model.name.clone(),
            messages: conversation,
            tools: tools.to_vec(),
            system: (!system_parts.is_empty()).then(|| system_parts.join("\n\n")),
            max_tokens,
            temperature: self.temperature,
        };

        provider.complete(&request).await
    }

    /// Configured models, cheapest tier first.
    pub fn models(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.models.values()
    }

    pub fn default_tier(&self) -> ModelTier {
        self.default_tier
    }

    /// Health-check every registered provider; returns `(name, result)` pairs.
    pub async fn health(&self) -> Vec<(String, Result<()>)> {
        let mut out = Vec::with_capacity(self.providers.len());
        for (name, provider) in &self.providers {
            out.push((name.clone(), provider.health_check().await));
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}
