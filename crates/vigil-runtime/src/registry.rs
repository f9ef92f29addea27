use async_trait::async_trait;
use futures::FutureExt;
use jsonschema::JSONSchema;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info};
use vigil_core::{Result, ToolCall, ToolResult, ToolSchema, VigilError};
use vigil_safety::sanitize_external;

/// A single executable action. Implementations are supplied by whoever
/// deploys the engine (posting, rendering, search, file access).
#[async_trait]
pub trait Capability: Send + Sync {
    async fn execute(&self, args: &Value) -> Result<String>;
}

/// Adapts a synchronous closure into a [`Capability`].
pub struct FnCapability<F>(pub F);

#[async_trait]
impl<F> Capability for FnCapability<F>
where
    F: Fn(&Value) -> Result<String> + Send + Sync,
{
    async fn execute(&self, args: &Value) -> Result<String> {
        (self.0)(args)
    }
}

/// A named, schema-described capability. Immutable once registered.
#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments object.
    pub parameters: Value,
    pub requires_approval: bool,
    /// Set for tools that return third-party content; their output is
    /// wrapped with this source label before the model sees it.
    pub external_source: Option<String>,
    executor: Arc<dyn Capability>,
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("requires_approval", &self.requires_approval)
            .field("external_source", &self.external_source)
            .finish_non_exhaustive()
    }
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        executor: Arc<dyn Capability>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            requires_approval: false,
            external_source: None,
            executor,
        }
    }

    /// Shorthand for a closure-backed tool.
    pub fn from_fn<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        f: F,
    ) -> Self
    where
        F: Fn(&Value) -> Result<String> + Send + Sync + 'static,
    {
        Self::new(name, description, parameters, Arc::new(FnCapability(f)))
    }

    pub fn requiring_approval(mut self, requires_approval: bool) -> Self {
        self.requires_approval = requires_approval;
        self
    }

    /// Mark the output as untrusted content from `source`.
    pub fn external(mut self, source: impl Into<String>) -> Self {
        self.external_source = Some(source.into());
        self
    }

    /// What the model sees.
    pub fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

struct Registered {
    descriptor: ToolDescriptor,
    validator: JSONSchema,
}

/// Name-keyed table of capabilities, built at startup.
#[derive(Default)]
pub struct CapabilityRegistry {
    tools: HashMap<String, Registered>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool, replacing any tool with the same name. Fails only when the
    /// parameter schema is not valid JSON Schema.
    pub fn register(&mut self, descriptor: ToolDescriptor) -> Result<()> {
        let validator = JSONSchema::compile(&descriptor.parameters).map_err(|e| {
            VigilError::InvalidArguments {
                tool: descriptor.name.clone(),
                reason: format!("invalid parameter schema: {e}"),
            }
        })?;
        let name = descriptor.name.clone();
        let replaced = self
            .tools
            .insert(
                name.clone(),
                Registered {
                    descriptor,
                    validator,
                },
            )
            .is_some();
        if replaced {
            info!(tool = %name, "tool re-registered, previous definition replaced");
        } else {
            debug!(tool = %name, "tool registered");
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name).map(|r| &r.descriptor)
    }

    /// Registered tools named in the allow-list, in allow-list order.
    /// Unknown names are skipped.
    pub fn allowed(&self, names: &[String]) -> Vec<&ToolDescriptor> {
        names.iter().filter_map(|n| self.get(n)).collect()
    }

    /// Model-facing schemas for the allow-list.
    pub fn schemas(&self, names: &[String]) -> Vec<ToolSchema> {
        self.allowed(names).into_iter().map(|t| t.schema()).collect()
    }

    /// Sorted names of every registered tool.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Validate and dispatch. Every failure (unknown tool, schema violation,
    /// executor error, executor panic) comes back as an error result, never
    /// as `Err`.
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        let Some(entry) = self.tools.get(&call.tool_name) else {
            let err = VigilError::ToolNotFound(call.tool_name.clone());
            return ToolResult::error(&call.id, format!("Error: {err}"));
        };

        let violations: Option<Vec<String>> = match entry.validator.validate(&call.arguments) {
            Ok(()) => None,
            Err(errors) => Some(
                errors
                    .map(|e| {
                        let path = e.instance_path.to_string();
                        if path.is_empty() {
                            e.to_string()
                        } else {
                            format!("{}: {}", path, e)
                        }
                    })
                    .collect(),
            ),
        };
        if let Some(violations) = violations {
            let err = VigilError::InvalidArguments {
                tool: call.tool_name.clone(),
                reason: violations.join("; "),
            };
            return ToolResult::error(&call.id, format!("Error: {err}"));
        }

        debug!(tool = %call.tool_name, "executing tool");
        let outcome = AssertUnwindSafe(entry.descriptor.executor.execute(&call.arguments))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(output)) => match &entry.descriptor.external_source {
                Some(source) => ToolResult::ok(&call.id, sanitize_external(&output, source)),
                None => ToolResult::ok(&call.id, output),
            },
            Ok(Err(e)) => {
                error!(tool = %call.tool_name, error = %e, "tool execution failed");
                let err = match e {
                    VigilError::ToolExecution { .. } => e,
                    other => VigilError::ToolExecution {
                        tool: call.tool_name.clone(),
                        reason: other.to_string(),
                    },
                };
                ToolResult::error(&call.id, format!("Error: {err}"))
            }
            Err(_) => {
                error!(tool = %call.tool_name, "tool panicked");
                let err = VigilError::ToolExecution {
                    tool: call.tool_name.clone(),
                    reason: "executor panicked".into(),
                };
                ToolResult::error(&call.id, format!("Error: {err}"))
            }
        }
    }
}
