use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use vigil_config::VigilConfig;
use vigil_core::Result;
use vigil_llm::ModelGateway;
use vigil_safety::{
    AlertSink, ApprovalGate, AuditEvent, AuditLog, BudgetController, Database,
    KillSwitch, Severity, TracingAlertSink, WebhookAlertSink,
};

use crate::context::RunContext;
use crate::engine::{AgentEngine, EngineSettings, ResumeOutcome, RunOutcome};
use crate::registry::{CapabilityRegistry, ToolDescriptor};
use crate::tools::{MemoryDir, memory_tools};

/// Task type used when an approved action is carried back into a conversation.
const RESUME_TASK_TYPE: &str = "approval";

/// Upper bound on waiting for webhook alerts before a process exits.
const ALERT_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything a process needs to run agents, wired from one config.
pub struct Vigil {
    config: VigilConfig,
    engine: AgentEngine,
    budget: BudgetController,
    approvals: ApprovalGate,
    kill_switch: KillSwitch,
    audit: AuditLog,
}

impl Vigil {
    /// Open the database at `storage.db_path` and build providers from
    /// `[services]`.
    pub fn open(config: VigilConfig) -> Result<Self> {
        let gateway = ModelGateway::from_config(&config.models, &config.services)?;
        let db = Database::open(&config.storage.db_path)?;
        Self::assemble(config, db, gateway, Vec::new())
    }

    /// Wire the stores and the engine around an existing database and
    /// gateway. `extra_tools` are registered after the built-in ones and
    /// replace them on a name clash.
    pub fn assemble(
        config: VigilConfig,
        db: Database,
        gateway: ModelGateway,
        extra_tools: Vec<ToolDescriptor>,
    ) -> Result<Self> {
        let budget = BudgetController::from_config(db.clone(), &config.budget)?;
        let approvals = ApprovalGate::new(db.clone());
        let kill_switch = KillSwitch::new(&config.safety.kill_file);
        let audit = AuditLog::new(db);

        let sink: Arc<dyn AlertSink> = match &config.safety.alert_webhook {
            Some(url) => Arc::new(WebhookAlertSink::new(url)),
            None => Arc::new(TracingAlertSink),
        };
        audit.set_alert_sink(sink);

        let mut registry = CapabilityRegistry::new();
        let memory = MemoryDir::new(&config.tools.memory_dir);
        for tool in memory_tools(memory, &config.tools.approval_required)
            .into_iter()
            .chain(extra_tools)
        {
            registry.register(tool)?;
        }

        let settings = EngineSettings {
            max_iterations: config.agent.max_iterations,
            max_output_tokens: config.agent.max_output_tokens,
            context_summary_chars: config.agent.context_summary_chars,
        };
        let engine = AgentEngine::new(
            Arc::new(gateway),
            Arc::new(registry),
            budget.clone(),
            approvals.clone(),
            kill_switch.clone(),
            audit.clone(),
        )
        .with_settings(settings);

        info!(
            tools = engine.registry().len(),
            kill_file = ?kill_switch.path(),
            "vigil assembled"
        );

        Ok(Self {
            config,
            engine,
            budget,
            approvals,
            kill_switch,
            audit,
        })
    }

    /// A fresh context for `project` (or the configured default) with that
    /// project's allow-list.
    pub fn context(&self, project: Option<&str>, agent: &str, task_type: &str) -> RunContext {
        let project = project.unwrap_or(self.config.agent.default_project.as_str());
        RunContext::new(project, agent, task_type)
            .with_allowed_tools(self.config.tools.allowed_for(project))
    }

    /// Run a task with the configured system prompt.
    pub async fn run(&self, ctx: &mut RunContext, task: &str) -> RunOutcome {
        self.engine
            .run(ctx, task, self.config.agent.system_prompt.as_deref())
            .await
    }

    /// Approve a pending request and execute it once.
    pub async fn approve(&self, approval_id: i64) -> Result<ResumeOutcome> {
        self.decide(approval_id, true)?;
        self.execute_approved(approval_id).await
    }

    /// Approve a pending request, execute it, and let the agent continue
    /// from the result in a new conversation seeded with the stored context.
    pub async fn approve_and_continue(&self, approval_id: i64) -> Result<RunOutcome> {
        self.decide(approval_id, true)?;
        self.execute_approved_and_continue(approval_id).await
    }

    /// Execute a request that is already `approved`, e.g. one whose first
    /// attempt was refused by the kill switch or the allow-list.
    pub async fn execute_approved(&self, approval_id: i64) -> Result<ResumeOutcome> {
        let request = self.approvals.get(approval_id)?;
        let allowed = self.config.tools.allowed_for(&request.project_id);
        self.engine.resume(approval_id, &allowed).await
    }

    /// [`Vigil::execute_approved`], then continue the conversation.
    pub async fn execute_approved_and_continue(&self, approval_id: i64) -> Result<RunOutcome> {
        let request = self.approvals.get(approval_id)?;
        let mut ctx = self.context(
            Some(request.project_id.as_str()),
            &request.agent_id,
            RESUME_TASK_TYPE,
        );
        Ok(self
            .engine
            .resume_and_continue(
                &mut ctx,
                approval_id,
                self.config.agent.system_prompt.as_deref(),
            )
            .await)
    }

    pub fn reject(&self, approval_id: i64) -> Result<()> {
        self.decide(approval_id, false)
    }

    fn decide(&self, approval_id: i64, approve: bool) -> Result<()> {
        let verb = if approve {
            self.approvals.approve(approval_id)?;
            "Approved"
        } else {
            self.approvals.reject(approval_id)?;
            "Rejected"
        };
        let request = self.approvals.get(approval_id)?;
        let event = AuditEvent::new(
            &request.project_id,
            Severity::Info,
            "approval",
            format!("{verb} #{approval_id}: {}", request.action_type),
        )
        .agent(&request.agent_id);
        if let Err(e) = self.audit.log(event) {
            warn!(approval_id, error = %e, "failed to audit approval decision");
        }
        Ok(())
    }

    /// Wait for in-flight alerts. Short-lived callers such as the console
    /// must call this before their runtime shuts down.
    pub async fn flush_alerts(&self) {
        self.audit.flush(ALERT_FLUSH_TIMEOUT).await;
    }

    pub fn config(&self) -> &VigilConfig {
        &self.config
    }

    pub fn engine(&self) -> &AgentEngine {
        &self.engine
    }

    pub fn budget(&self) -> &BudgetController {
        &self.budget
    }

    pub fn approvals(&self) -> &ApprovalGate {
        &self.approvals
    }

    pub fn kill_switch(&self) -> &KillSwitch {
        &self.kill_switch
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }
}
