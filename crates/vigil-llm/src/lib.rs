//! # vigil-llm
//!
//! Uniform interface over language-model backends, grouped into ordered
//! cost/capability tiers. The [`ModelGateway`] selects a tier for a task,
//! names the next tier up for escalation, and performs single
//! request/response exchanges. Retry policy lives with the caller.

pub mod anthropic;
pub mod gateway;
pub mod local;
pub mod mock;
pub mod openai;
pub mod provider;

pub use gateway::{ModelDescriptor, ModelGateway};
pub use mock::MockProvider;
pub use provider::{LlmProvider, LlmRequest, LlmResponse, StopReason, Usage};
