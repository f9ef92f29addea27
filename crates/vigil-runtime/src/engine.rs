//! The orchestration loop.
//!
//! A run is admitted (kill switch, then budget), then iterates up to
//! `max_iterations` times: re-check both interlocks, pick a model, invoke it
//! (escalating one tier on failure), record spend, then either finish on a
//! plain answer or work through the requested tool calls. A tool that needs a
//! human decision is queued and the run returns immediately; the decision is
//! picked up later by [`AgentEngine::resume`].

use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use vigil_core::{Message, Result, Role, ToolCall, ToolResult, ToolSchema, VigilError};
use vigil_llm::{LlmResponse, ModelDescriptor, ModelGateway};
use vigil_safety::{
    ApprovalGate, ApprovalStatus, AuditEvent, AuditLog, BudgetController, KillSwitch, Severity,
    UsageRecord, format_preview,
};

use crate::context::RunContext;
use crate::registry::CapabilityRegistry;

/// Loop limits.
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub max_iterations: u32,
    pub max_output_tokens: u32,
    /// How much of the task text is stored with an approval request.
    pub context_summary_chars: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            max_output_tokens: 4096,
            context_summary_chars: 200,
        }
    }
}

/// Why a run was refused.
#[derive(Debug, Clone, PartialEq)]
pub enum DenyReason {
    Halted(String),
    BudgetExhausted { spent: f64, limit: f64 },
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Halted(reason) => write!(f, "kill switch active: {reason}"),
            Self::BudgetExhausted { spent, limit } => {
                write!(f, "daily budget exhausted: ${spent:.4} of ${limit:.2}")
            }
        }
    }
}

/// Result of the pre-flight interlock checks.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    Admitted,
    Denied(DenyReason),
}

/// How a run ended. `Display` renders the caller-facing string.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(String),
    AwaitingApproval {
        approval_id: i64,
        tool: String,
        preview: String,
    },
    /// `during_run` is false when the run was refused at admission.
    Denied {
        reason: DenyReason,
        during_run: bool,
    },
    ModelFailed {
        error: String,
        escalated: bool,
    },
    MaxIterations {
        limit: u32,
    },
    Failed(String),
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed(text) => f.write_str(text),
            Self::AwaitingApproval {
                approval_id,
                tool,
                preview,
            } => write!(
                f,
                "[AWAITING APPROVAL #{approval_id}] Action: {tool}\nPreview: {preview}"
            ),
            Self::Denied {
                reason: DenyReason::Halted(reason),
                during_run: false,
            } => write!(f, "[KILLED] System is shut down: {reason}"),
            Self::Denied {
                reason: DenyReason::Halted(_),
                during_run: true,
            } => f.write_str("[KILLED] System shut down during execution."),
            Self::Denied {
                reason: DenyReason::BudgetExhausted { .. },
                during_run: false,
            } => f.write_str("[BLOCKED] Daily token budget exhausted."),
            Self::Denied {
                reason: DenyReason::BudgetExhausted { .. },
                during_run: true,
            } => f.write_str("[BLOCKED] Budget exhausted during execution."),
            Self::ModelFailed {
                error,
                escalated: true,
            } => write!(f, "[ERROR] All models failed: {error}"),
            Self::ModelFailed {
                error,
                escalated: false,
            } => write!(f, "[ERROR] Model failed: {error}"),
            Self::MaxIterations { .. } => f.write_str("[MAX_ITERATIONS] Agent reached iteration limit."),
            Self::Failed(error) => write!(f, "[ERROR] {error}"),
        }
    }
}

/// What happened to an approved action on resume.
#[derive(Debug, Clone, PartialEq)]
pub enum ResumeOutcome {
    /// The action ran; the request is now `executed`.
    Executed {
        approval_id: i64,
        call: ToolCall,
        result: ToolResult,
        context_summary: String,
    },
    /// The kill switch is on. The request stays `approved`.
    Halted(String),
    /// The tool is not in the supplied allow-list. The request stays `approved`.
    NotAllowed { tool: String },
}

/// Drives runs against the shared stores.
#[derive(Clone)]
pub struct AgentEngine {
    gateway: Arc<ModelGateway>,
    registry: Arc<CapabilityRegistry>,
    budget: BudgetController,
    approvals: ApprovalGate,
    kill_switch: KillSwitch,
    audit: AuditLog,
    settings: EngineSettings,
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

impl AgentEngine {
    pub fn new(
        gateway: Arc<ModelGateway>,
        registry: Arc<CapabilityRegistry>,
        budget: BudgetController,
        approvals: ApprovalGate,
        kill_switch: KillSwitch,
        audit: AuditLog,
    ) -> Self {
        Self {
            gateway,
            registry,
            budget,
            approvals,
            kill_switch,
            audit,
            settings: EngineSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn gateway(&self) -> &ModelGateway {
        &self.gateway
    }

    /// Kill switch first, then budget. Only a storage failure is an `Err`.
    pub fn admit(&self, project_id: &str) -> Result<Admission> {
        if let Some(reason) = self.kill_switch.reason() {
            return Ok(Admission::Denied(DenyReason::Halted(reason)));
        }
        let status = self.budget.status(project_id)?;
        if !status.has_budget() {
            warn!(
                project = %project_id,
                spent = status.spent,
                limit = status.limit,
                "daily budget exhausted"
            );
            return Ok(Admission::Denied(DenyReason::BudgetExhausted {
                spent: status.spent,
                limit: status.limit,
            }));
        }
        Ok(Admission::Admitted)
    }

    fn audit(&self, event: AuditEvent) {
        if let Err(e) = self.audit.log(event) {
            warn!(error = %e, "failed to write audit entry");
        }
    }

    fn deny(&self, ctx: &RunContext, reason: DenyReason, during_run: bool) -> RunOutcome {
        let action = match (&reason, during_run) {
            (DenyReason::Halted(_), false) => "Run refused: kill switch active",
            (DenyReason::Halted(_), true) => "Run halted: kill switch activated",
            (DenyReason::BudgetExhausted { .. }, false) => "Run refused: budget exhausted",
            (DenyReason::BudgetExhausted { .. }, true) => "Run halted: budget exhausted",
        };
        self.audit(
            AuditEvent::new(&ctx.project_id, Severity::Block, "engine", action)
                .agent(&ctx.agent_id)
                .details(reason.to_string()),
        );
        RunOutcome::Denied { reason, during_run }
    }

    /// Run a task to completion, suspension, or a stop condition.
    ///
    /// The task (and the system prompt, if the conversation is empty) is
    /// appended to `ctx.messages`; spend accumulates on `ctx`.
    pub async fn run(
        &self,
        ctx: &mut RunContext,
        task: &str,
        system_prompt: Option<&str>,
    ) -> RunOutcome {
        match self.admit(&ctx.project_id) {
            Ok(Admission::Admitted) => {}
            Ok(Admission::Denied(reason)) => return self.deny(ctx, reason, false),
            Err(e) => return RunOutcome::Failed(e.to_string()),
        }

        info!(
            project = %ctx.project_id,
            agent = %ctx.agent_id,
            session = %ctx.session_id,
            task_type = %ctx.task_type,
            "run started"
        );

        if ctx.messages.is_empty()
            && let Some(prompt) = system_prompt
        {
            ctx.messages
                .push(Message::text(ctx.session_id, Role::System, prompt));
        }
        ctx.messages
            .push(Message::text(ctx.session_id, Role::User, task));

        self.iterate(ctx, task).await
    }

    async fn iterate(&self, ctx: &mut RunContext, task: &str) -> RunOutcome {
        let schemas = self.registry.schemas(&ctx.allowed_tools);

        for iteration in 1..=self.settings.max_iterations {
            debug!(iteration, session = %ctx.session_id, "loop iteration");

            if let Some(reason) = self.kill_switch.reason() {
                return self.deny(ctx, DenyReason::Halted(reason), true);
            }
            match self.budget.status(&ctx.project_id) {
                Ok(status) if !status.has_budget() => {
                    let reason = DenyReason::BudgetExhausted {
                        spent: status.spent,
                        limit: status.limit,
                    };
                    return self.deny(ctx, reason, true);
                }
                Ok(_) => {}
                Err(e) => return RunOutcome::Failed(e.to_string()),
            }

            let model = match self.gateway.select(&ctx.task_type) {
                Ok(model) => model,
                Err(e) => return RunOutcome::Failed(e.to_string()),
            };

            let (model, response) = match self.invoke_with_escalation(ctx, model, &schemas).await {
                Ok(answered) => answered,
                Err(outcome) => return outcome,
            };

            ctx.model_used = Some(model.name.clone());
            if let Err(e) = self.record_spend(ctx, &model.name, &response) {
                return RunOutcome::Failed(e.to_string());
            }

            if !response.has_tool_calls() {
                let tokens = u32::try_from(ctx.total_tokens).unwrap_or(u32::MAX);
                self.audit(
                    AuditEvent::new(&ctx.project_id, Severity::Info, "response", "Agent completed")
                        .agent(&ctx.agent_id)
                        .details(truncate(&response.text, 200))
                        .usage(tokens, ctx.total_cost, &model.name),
                );
                ctx.messages.push(Message::text(
                    ctx.session_id,
                    Role::Assistant,
                    response.text.as_str(),
                ));
                info!(
                    session = %ctx.session_id,
                    iterations = iteration,
                    tokens = ctx.total_tokens,
                    cost = ctx.total_cost,
                    "run completed"
                );
                return RunOutcome::Completed(response.text);
            }

            if !response.text.is_empty() {
                ctx.messages.push(Message::text(
                    ctx.session_id,
                    Role::Assistant,
                    response.text.as_str(),
                ));
            }

            for call in response.tool_calls {
                if let Some(outcome) = self.handle_call(ctx, task, call).await {
                    return outcome;
                }
            }
        }

        let limit = self.settings.max_iterations;
        self.audit(
            AuditEvent::new(
                &ctx.project_id,
                Severity::Warn,
                "engine",
                format!("Max iterations ({limit}) reached"),
            )
            .agent(&ctx.agent_id),
        );
        RunOutcome::MaxIterations { limit }
    }

    /// One attempt on `model`, then at most one attempt on the next tier up.
    async fn invoke_with_escalation(
        &self,
        ctx: &RunContext,
        model: ModelDescriptor,
        schemas: &[ToolSchema],
    ) -> std::result::Result<(ModelDescriptor, LlmResponse), RunOutcome> {
        let max_tokens = self.settings.max_output_tokens;
        let attempt = self
            .gateway
            .invoke(&model, &ctx.messages, schemas, max_tokens)
            .await;
        let first = match attempt {
            Ok(response) => return Ok((model, response)),
            Err(e) => e,
        };
        warn!(model = %model.name, tier = %model.tier, error = %first, "model call failed");

        let Some(next) = self.gateway.escalate(&model) else {
            self.audit(
                AuditEvent::new(&ctx.project_id, Severity::Reject, "llm", "Model failed")
                    .agent(&ctx.agent_id)
                    .details(first.to_string())
                    .usage(0, 0.0, &model.name)
                    .failed(),
            );
            return Err(RunOutcome::ModelFailed {
                error: first.to_string(),
                escalated: false,
            });
        };

        info!(from = %model.tier, to = %next.tier, model = %next.name, "escalating model tier");
        let retry = self
            .gateway
            .invoke(&next, &ctx.messages, schemas, max_tokens)
            .await;
        match retry {
            Ok(response) => Ok((next, response)),
            Err(second) => {
                self.audit(
                    AuditEvent::new(&ctx.project_id, Severity::Reject, "llm", "All models failed")
                        .agent(&ctx.agent_id)
                        .details(format!("{}: {first}; {}: {second}", model.name, next.name))
                        .usage(0, 0.0, &next.name)
                        .failed(),
                );
                Err(RunOutcome::ModelFailed {
                    error: second.to_string(),
                    escalated: true,
                })
            }
        }
    }

    fn record_spend(&self, ctx: &mut RunContext, model: &str, response: &LlmResponse) -> Result<()> {
        let usage = response.usage;
        let cost = self
            .budget
            .calculate_cost(model, usage.input_tokens, usage.output_tokens);
        ctx.total_tokens += u64::from(usage.total_tokens());
        ctx.total_cost += cost;
        self.budget.record_usage(
            &UsageRecord::new(
                &ctx.project_id,
                model,
                usage.input_tokens,
                usage.output_tokens,
                cost,
            )
            .task_type(&ctx.task_type)
            .agent(&ctx.agent_id),
        )?;
        Ok(())
    }

    /// Returns `Some` only when the call suspends or ends the run.
    async fn handle_call(
        &self,
        ctx: &mut RunContext,
        task: &str,
        call: ToolCall,
    ) -> Option<RunOutcome> {
        let name = call.tool_name.clone();

        if !ctx.allows(&name) {
            warn!(tool = %name, project = %ctx.project_id, "tool call outside allow-list");
            self.audit(
                AuditEvent::new(
                    &ctx.project_id,
                    Severity::Block,
                    "tool",
                    format!("Blocked tool: {name}"),
                )
                .agent(&ctx.agent_id),
            );
            let result = ToolResult::error(&call.id, format!("[BLOCKED] Tool '{name}' not allowed."));
            self.push_exchange(ctx, call, &result);
            return None;
        }

        let requires_approval = self
            .registry
            .get(&name)
            .is_some_and(|t| t.requires_approval);

        if requires_approval {
            let summary = truncate(task, self.settings.context_summary_chars);
            let submitted = self.approvals.submit(
                &ctx.project_id,
                &ctx.agent_id,
                &name,
                &call.arguments,
                &summary,
                ctx.total_cost,
            );
            let approval_id = match submitted {
                Ok(id) => id,
                Err(e) => return Some(RunOutcome::Failed(e.to_string())),
            };
            self.audit(
                AuditEvent::new(
                    &ctx.project_id,
                    Severity::Info,
                    "approval",
                    format!("Queued for approval: {name}"),
                )
                .agent(&ctx.agent_id)
                .details(truncate(&call.arguments.to_string(), 500)),
            );
            let preview = match self.approvals.get(approval_id) {
                Ok(request) => format_preview(&request),
                Err(e) => {
                    warn!(approval_id, error = %e, "could not load approval preview");
                    format!("{name} {}", call.arguments)
                }
            };
            return Some(RunOutcome::AwaitingApproval {
                approval_id,
                tool: name,
                preview,
            });
        }

        self.audit(
            AuditEvent::new(
                &ctx.project_id,
                Severity::Info,
                "tool",
                format!("Executing: {name}"),
            )
            .agent(&ctx.agent_id)
            .details(truncate(&call.arguments.to_string(), 500)),
        );
        let result = self.registry.execute(&call).await;
        self.push_exchange(ctx, call, &result);
        None
    }

    fn push_exchange(&self, ctx: &mut RunContext, call: ToolCall, result: &ToolResult) {
        ctx.messages
            .push(Message::tool_request(ctx.session_id, vec![call]));
        ctx.messages
            .push(Message::tool_result(ctx.session_id, result));
    }

    /// Execute an approved action, at most once.
    ///
    /// The request must be `approved`. The kill switch and `allowed` are
    /// checked before the request is claimed; the claim (approved to
    /// executed) is atomic, so a second resume of the same id fails.
    pub async fn resume(&self, approval_id: i64, allowed: &[String]) -> Result<ResumeOutcome> {
        let request = self.approvals.get(approval_id)?;
        if request.status != ApprovalStatus::Approved {
            return Err(VigilError::InvalidTransition {
                id: approval_id,
                from: request.status.to_string(),
                to: ApprovalStatus::Executed.to_string(),
            });
        }

        if let Some(reason) = self.kill_switch.reason() {
            warn!(approval_id, "resume refused: kill switch active");
            return Ok(ResumeOutcome::Halted(reason));
        }

        let tool = request.action_type.clone();
        if !allowed.iter().any(|t| *t == tool) {
            self.audit(
                AuditEvent::new(
                    &request.project_id,
                    Severity::Block,
                    "tool",
                    format!("Blocked approved #{approval_id}: {tool}"),
                )
                .agent(&request.agent_id),
            );
            return Ok(ResumeOutcome::NotAllowed { tool });
        }

        self.approvals.mark_executed(approval_id)?;

        let call = ToolCall {
            id: format!("approval-{approval_id}"),
            tool_name: tool.clone(),
            arguments: request.action_data.clone(),
        };
        let result = self.registry.execute(&call).await;

        let event = if result.is_error {
            AuditEvent::new(
                &request.project_id,
                Severity::Reject,
                "tool",
                format!("Approved #{approval_id} failed: {tool}"),
            )
            .details(truncate(&result.content, 500))
            .failed()
        } else {
            AuditEvent::new(
                &request.project_id,
                Severity::Info,
                "tool",
                format!("Executed approved #{approval_id}: {tool}"),
            )
            .details(truncate(&result.content, 500))
        };
        self.audit(event.agent(&request.agent_id));

        Ok(ResumeOutcome::Executed {
            approval_id,
            call,
            result,
            context_summary: request.context_summary,
        })
    }

    /// Resume an approved action, then carry on the conversation in `ctx`
    /// with the tool result appended.
    pub async fn resume_and_continue(
        &self,
        ctx: &mut RunContext,
        approval_id: i64,
        system_prompt: Option<&str>,
    ) -> RunOutcome {
        let allowed = ctx.allowed_tools.clone();
        let (call, result, summary) = match self.resume(approval_id, &allowed).await {
            Ok(ResumeOutcome::Executed {
                call,
                result,
                context_summary,
                ..
            }) => (call, result, context_summary),
            Ok(ResumeOutcome::Halted(reason)) => {
                return RunOutcome::Denied {
                    reason: DenyReason::Halted(reason),
                    during_run: false,
                };
            }
            Ok(ResumeOutcome::NotAllowed { tool }) => {
                return RunOutcome::Failed(format!("Tool '{tool}' not allowed"));
            }
            Err(e) => return RunOutcome::Failed(e.to_string()),
        };

        if ctx.messages.is_empty() {
            if let Some(prompt) = system_prompt {
                ctx.messages
                    .push(Message::text(ctx.session_id, Role::System, prompt));
            }
            ctx.messages
                .push(Message::text(ctx.session_id, Role::User, summary.as_str()));
        }
        self.push_exchange(ctx, call, &result);

        match self.admit(&ctx.project_id) {
            Ok(Admission::Admitted) => {}
            Ok(Admission::Denied(reason)) => return self.deny(ctx, reason, false),
            Err(e) => return RunOutcome::Failed(e.to_string()),
        }

        self.iterate(ctx, &summary).await
    }
}
