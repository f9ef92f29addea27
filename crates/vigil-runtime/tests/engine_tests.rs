#[cfg(test)]
mod tests {
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use vigil_config::{ProjectTools, VigilConfig};
    use vigil_core::{ModelTier, VigilError};
    use vigil_llm::mock::MockResponse;
    use vigil_llm::{MockProvider, ModelDescriptor, ModelGateway};
    use vigil_runtime::*;
    use vigil_safety::{
        ApprovalGate, ApprovalStatus, AuditLog, BudgetController, Database, KillSwitch,
        PriceTable, Severity,
    };

    const PROJECT: &str = "acme";

    struct Harness {
        engine: AgentEngine,
        cheap: Arc<MockProvider>,
        mid: Arc<MockProvider>,
        approvals: ApprovalGate,
        budget: BudgetController,
        kill_switch: KillSwitch,
        audit: AuditLog,
        pings: Arc<AtomicUsize>,
        publishes: Arc<AtomicUsize>,
        _tmp: TempDir,
    }

    fn descriptor(tier: ModelTier, provider: &str, name: &str) -> ModelDescriptor {
        ModelDescriptor {
            provider: provider.into(),
            name: name.into(),
            tier,
            cost_per_1m_input: 10.0,
            cost_per_1m_output: 10.0,
            max_context: 8192,
        }
    }

    fn harness(tiers: &[ModelTier], settings: EngineSettings, daily_limit: f64) -> Harness {
        let tmp = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();

        let cheap = Arc::new(MockProvider::new("mock-cheap"));
        let mid = Arc::new(MockProvider::new("mock-mid"));
        let mut gateway = ModelGateway::new(ModelTier::Cheap)
            .with_provider(cheap.clone())
            .with_provider(mid.clone());
        if tiers.contains(&ModelTier::Cheap) {
            gateway = gateway.with_model(descriptor(ModelTier::Cheap, "mock-cheap", "cheap-model"));
        }
        if tiers.contains(&ModelTier::Mid) {
            gateway = gateway.with_model(descriptor(ModelTier::Mid, "mock-mid", "mid-model"));
        }

        // 150 tokens per mock call at $10/1M = $0.0015
        let prices = PriceTable::default()
            .with_price("cheap-model", 10.0, 10.0)
            .with_price("mid-model", 10.0, 10.0);
        let budget = BudgetController::new(db.clone(), prices, daily_limit);
        let approvals = ApprovalGate::new(db.clone());
        let kill_switch = KillSwitch::new(tmp.path().join("KILL"));
        let audit = AuditLog::new(db);

        let pings = Arc::new(AtomicUsize::new(0));
        let publishes = Arc::new(AtomicUsize::new(0));
        let mut registry = CapabilityRegistry::new();

        let counter = pings.clone();
        registry
            .register(ToolDescriptor::from_fn(
                "ping",
                "Answer pong",
                json!({"type": "object"}),
                move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok("pong".into())
                },
            ))
            .unwrap();

        let counter = publishes.clone();
        registry
            .register(
                ToolDescriptor::from_fn(
                    "publish",
                    "Publish a post",
                    json!({
                        "type": "object",
                        "properties": {"title": {"type": "string"}},
                        "required": ["title"]
                    }),
                    move |args| {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(format!(
                            "published {}",
                            args["title"].as_str().unwrap_or_default()
                        ))
                    },
                )
                .requiring_approval(true),
            )
            .unwrap();

        let switch = kill_switch.clone();
        registry
            .register(ToolDescriptor::from_fn(
                "halt",
                "Stop the system",
                json!({"type": "object"}),
                move |_| {
                    switch.activate("operator pressed stop")?;
                    Ok("halting".into())
                },
            ))
            .unwrap();

        registry
            .register(ToolDescriptor::from_fn(
                "fail",
                "Always fails",
                json!({"type": "object"}),
                |_| {
                    Err(VigilError::ToolExecution {
                        tool: "fail".into(),
                        reason: "disk full".into(),
                    })
                },
            ))
            .unwrap();

        let engine = AgentEngine::new(
            Arc::new(gateway),
            Arc::new(registry),
            budget.clone(),
            approvals.clone(),
            kill_switch.clone(),
            audit.clone(),
        )
        .with_settings(settings);

        Harness {
            engine,
            cheap,
            mid,
            approvals,
            budget,
            kill_switch,
            audit,
            pings,
            publishes,
            _tmp: tmp,
        }
    }

    fn default_harness() -> Harness {
        harness(&[ModelTier::Cheap], EngineSettings::default(), 10.0)
    }

    fn ctx() -> RunContext {
        RunContext::new(PROJECT, "tester", "chat")
            .with_allowed_tools(["ping", "publish", "halt", "fail"])
    }

    fn allowed() -> Vec<String> {
        ctx().allowed_tools
    }

    fn audited(h: &Harness, severity: Severity, action: &str) -> bool {
        h.audit
            .recent(Some(PROJECT), 100)
            .unwrap()
            .iter()
            .any(|e| e.severity == severity && e.action == action)
    }

    // ── Admission ──────────────────────────────────────────────

    #[tokio::test]
    async fn test_kill_switch_denies_admission_without_model_call() {
        let h = default_harness();
        h.cheap.push(MockResponse::text("never"));
        h.kill_switch.activate("maintenance").unwrap();

        let mut ctx = ctx();
        let outcome = h.engine.run(&mut ctx, "hello", None).await;

        assert!(matches!(
            outcome,
            RunOutcome::Denied {
                reason: DenyReason::Halted(_),
                during_run: false
            }
        ));
        let text = outcome.to_string();
        assert!(text.starts_with("[KILLED] System is shut down: "));
        assert!(text.contains("maintenance"));
        assert_eq!(h.cheap.call_count(), 0);
        assert!(ctx.messages.is_empty());
        assert!(audited(&h, Severity::Block, "Run refused: kill switch active"));
    }

    #[tokio::test]
    async fn test_exhausted_budget_denies_admission() {
        let h = default_harness();
        h.budget.set_budget(PROJECT, 0.0, 10.0).unwrap();

        let mut ctx = ctx();
        let outcome = h.engine.run(&mut ctx, "hello", None).await;

        assert_eq!(outcome.to_string(), "[BLOCKED] Daily token budget exhausted.");
        assert_eq!(h.cheap.call_count(), 0);
    }

    #[tokio::test]
    async fn test_deactivated_switch_restores_admission() {
        let h = default_harness();
        h.kill_switch.activate("drill").unwrap();
        assert!(matches!(
            h.engine.admit(PROJECT).unwrap(),
            Admission::Denied(DenyReason::Halted(_))
        ));
        h.kill_switch.deactivate().unwrap();
        assert_eq!(h.engine.admit(PROJECT).unwrap(), Admission::Admitted);
    }

    // ── Completion ─────────────────────────────────────────────

    #[tokio::test]
    async fn test_plain_answer_completes_and_records_spend() {
        let h = default_harness();
        h.cheap.push(MockResponse::text("hi there"));

        let mut ctx = ctx();
        let outcome = h.engine.run(&mut ctx, "say hi", Some("be brief")).await;

        assert_eq!(outcome, RunOutcome::Completed("hi there".into()));
        assert_eq!(outcome.to_string(), "hi there");
        assert_eq!(ctx.model_used.as_deref(), Some("cheap-model"));
        assert_eq!(ctx.total_tokens, 150);
        assert!((ctx.total_cost - 0.0015).abs() < 1e-12);
        assert!((h.budget.daily_spend(PROJECT).unwrap() - 0.0015).abs() < 1e-12);

        let request = &h.cheap.requests()[0];
        assert_eq!(request.system.as_deref(), Some("be brief"));
        assert!(audited(&h, Severity::Info, "Agent completed"));
    }

    #[tokio::test]
    async fn test_only_allowed_schemas_reach_the_model() {
        let h = default_harness();
        h.cheap.push(MockResponse::text("ok"));

        let mut ctx = RunContext::new(PROJECT, "tester", "chat").with_allowed_tools(["ping"]);
        h.engine.run(&mut ctx, "hello", None).await;

        let tools: Vec<String> = h.cheap.requests()[0]
            .tools
            .iter()
            .map(|t| t.name.clone())
            .collect();
        assert_eq!(tools, vec!["ping".to_string()]);
    }

    // ── Tool handling ──────────────────────────────────────────

    #[tokio::test]
    async fn test_approval_gated_tool_never_executes() {
        let h = default_harness();
        h.cheap.push(MockResponse::tool_call(
            "publish",
            json!({"title": "launch"}),
        ));

        let mut ctx = ctx();
        let outcome = h.engine.run(&mut ctx, "announce the launch", None).await;

        let RunOutcome::AwaitingApproval {
            approval_id, tool, ..
        } = &outcome
        else {
            panic!("expected approval marker, got {outcome:?}");
        };
        assert_eq!(tool, "publish");
        assert!(
            outcome
                .to_string()
                .starts_with(&format!("[AWAITING APPROVAL #{approval_id}] Action: publish"))
        );
        assert_eq!(h.publishes.load(Ordering::SeqCst), 0);
        assert_eq!(h.cheap.call_count(), 1);

        let pending = h.approvals.get_pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, *approval_id);
        assert_eq!(pending[0].action_data, json!({"title": "launch"}));
        assert_eq!(pending[0].context_summary, "announce the launch");
        assert!(audited(&h, Severity::Info, "Queued for approval: publish"));
    }

    #[tokio::test]
    async fn test_disallowed_tool_is_blocked_and_run_continues() {
        let h = default_harness();
        h.cheap.push(MockResponse::tool_call(
            "delete_everything",
            json!({}),
        ));
        h.cheap.push(MockResponse::tool_call(
            "delete_everything",
            json!({}),
        ));
        h.cheap.push(MockResponse::text("recovered"));

        let mut ctx = ctx();
        let outcome = h.engine.run(&mut ctx, "clean up", None).await;

        assert_eq!(outcome, RunOutcome::Completed("recovered".into()));
        assert_eq!(h.cheap.call_count(), 3);
        let results = ctx.tool_results();
        assert_eq!(results.len(), 2);
        for result in results {
            assert!(result.is_error);
            assert_eq!(result.content, "[BLOCKED] Tool 'delete_everything' not allowed.");
        }
        assert!(audited(&h, Severity::Block, "Blocked tool: delete_everything"));
    }

    #[tokio::test]
    async fn test_registered_but_unlisted_tool_is_blocked() {
        let h = default_harness();
        h.cheap.push(MockResponse::tool_call(
            "publish",
            json!({"title": "sneaky"}),
        ));
        h.cheap.push(MockResponse::text("fine"));

        let mut ctx = RunContext::new(PROJECT, "tester", "chat").with_allowed_tools(["ping"]);
        let outcome = h.engine.run(&mut ctx, "post it", None).await;

        assert!(outcome.is_completed());
        assert_eq!(h.publishes.load(Ordering::SeqCst), 0);
        assert!(h.approvals.get_pending().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tool_failure_is_fed_back() {
        let h = default_harness();
        h.cheap.push(MockResponse::tool_call("fail", json!({})));
        h.cheap.push(MockResponse::text("gave up politely"));

        let mut ctx = ctx();
        let outcome = h.engine.run(&mut ctx, "try it", None).await;

        assert!(outcome.is_completed());
        let results = ctx.tool_results();
        assert!(results[0].is_error);
        assert!(results[0].content.contains("disk full"));
    }

    // ── Escalation ─────────────────────────────────────────────

    #[tokio::test]
    async fn test_failed_cheap_call_escalates_once_to_mid() {
        let h = harness(
            &[ModelTier::Cheap, ModelTier::Mid],
            EngineSettings::default(),
            10.0,
        );
        h.cheap.push(MockResponse::error("HTTP 529: overloaded"));
        h.mid.push(MockResponse::text("from mid"));

        let mut ctx = ctx();
        let outcome = h.engine.run(&mut ctx, "hello", None).await;

        assert_eq!(outcome, RunOutcome::Completed("from mid".into()));
        assert_eq!(ctx.model_used.as_deref(), Some("mid-model"));
        assert_eq!(h.cheap.call_count(), 1);
        assert_eq!(h.mid.call_count(), 1);

        let report = h.budget.daily_report(PROJECT).unwrap();
        assert_eq!(report.by_model.len(), 1);
        assert_eq!(report.by_model[0].model, "mid-model");
    }

    #[tokio::test]
    async fn test_escalated_failure_is_terminal() {
        let h = harness(
            &[ModelTier::Cheap, ModelTier::Mid],
            EngineSettings::default(),
            10.0,
        );
        h.cheap.push(MockResponse::error("cheap down"));
        h.mid.push(MockResponse::error("mid down"));

        let mut ctx = ctx();
        let outcome = h.engine.run(&mut ctx, "hello", None).await;

        assert!(matches!(outcome, RunOutcome::ModelFailed { escalated: true, .. }));
        assert!(outcome.to_string().starts_with("[ERROR] All models failed: "));
        assert_eq!(h.cheap.call_count(), 1);
        assert_eq!(h.mid.call_count(), 1);
        assert!(audited(&h, Severity::Reject, "All models failed"));
    }

    #[tokio::test]
    async fn test_failure_at_top_tier_does_not_retry() {
        let h = default_harness();
        h.cheap.push(MockResponse::error("boom"));
        h.cheap.push(MockResponse::text("should not be reached"));

        let mut ctx = ctx();
        let outcome = h.engine.run(&mut ctx, "hello", None).await;

        assert!(matches!(outcome, RunOutcome::ModelFailed { escalated: false, .. }));
        assert!(outcome.to_string().starts_with("[ERROR] Model failed: "));
        assert_eq!(h.cheap.call_count(), 1);
        assert!(ctx.model_used.is_none());
    }

    // ── Stop conditions ────────────────────────────────────────

    #[tokio::test]
    async fn test_iteration_ceiling_stops_after_exact_count() {
        let settings = EngineSettings {
            max_iterations: 3,
            ..Default::default()
        };
        let h = harness(&[ModelTier::Cheap], settings, 10.0);
        for _ in 0..5 {
            h.cheap
                .push(MockResponse::tool_call("ping", json!({})));
        }

        let mut ctx = ctx();
        let outcome = h.engine.run(&mut ctx, "loop forever", None).await;

        assert_eq!(outcome, RunOutcome::MaxIterations { limit: 3 });
        assert_eq!(outcome.to_string(), "[MAX_ITERATIONS] Agent reached iteration limit.");
        assert_eq!(h.cheap.call_count(), 3);
        assert_eq!(h.pings.load(Ordering::SeqCst), 3);
        assert!(audited(&h, Severity::Warn, "Max iterations (3) reached"));
    }

    #[tokio::test]
    async fn test_kill_switch_set_mid_run_halts_next_iteration() {
        let h = default_harness();
        h.cheap.push(MockResponse::tool_call("halt", json!({})));
        h.cheap.push(MockResponse::text("should not be reached"));

        let mut ctx = ctx();
        let outcome = h.engine.run(&mut ctx, "work", None).await;

        assert!(matches!(
            outcome,
            RunOutcome::Denied {
                reason: DenyReason::Halted(_),
                during_run: true
            }
        ));
        assert_eq!(outcome.to_string(), "[KILLED] System shut down during execution.");
        assert_eq!(h.cheap.call_count(), 1);
    }

    #[tokio::test]
    async fn test_budget_exhausted_mid_run() {
        let h = harness(&[ModelTier::Cheap], EngineSettings::default(), 0.002);
        for _ in 0..5 {
            h.cheap
                .push(MockResponse::tool_call("ping", json!({})));
        }

        let mut ctx = ctx();
        let outcome = h.engine.run(&mut ctx, "spend", None).await;

        // $0.0015 after one call, $0.0030 after two
        assert_eq!(outcome.to_string(), "[BLOCKED] Budget exhausted during execution.");
        assert_eq!(h.cheap.call_count(), 2);
        assert!(!h.budget.has_budget(PROJECT).unwrap());
    }

    // ── Resume ─────────────────────────────────────────────────

    async fn pending_publish(h: &Harness, ctx: &mut RunContext) -> i64 {
        h.cheap.push(MockResponse::tool_call(
            "publish",
            json!({"title": "hello"}),
        ));
        match h.engine.run(ctx, "publish hello", None).await {
            RunOutcome::AwaitingApproval { approval_id, .. } => approval_id,
            other => panic!("expected approval marker, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_resume_executes_exactly_once() {
        let h = default_harness();
        let id = pending_publish(&h, &mut ctx()).await;
        h.approvals.approve(id).unwrap();

        let outcome = h.engine.resume(id, &allowed()).await.unwrap();
        let ResumeOutcome::Executed { result, call, .. } = outcome else {
            panic!("expected execution");
        };
        assert_eq!(result.content, "published hello");
        assert!(!result.is_error);
        assert_eq!(call.id, format!("approval-{id}"));
        assert_eq!(h.publishes.load(Ordering::SeqCst), 1);
        assert_eq!(h.approvals.get(id).unwrap().status, ApprovalStatus::Executed);

        let again = h.engine.resume(id, &allowed()).await;
        assert!(matches!(again, Err(VigilError::InvalidTransition { .. })));
        assert_eq!(h.publishes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejected_request_never_executes() {
        let h = default_harness();
        let id = pending_publish(&h, &mut ctx()).await;
        h.approvals.reject(id).unwrap();

        assert!(h.engine.resume(id, &allowed()).await.is_err());
        assert!(h.approvals.approve(id).is_err());
        assert_eq!(h.publishes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_pending_request_cannot_be_resumed() {
        let h = default_harness();
        let id = pending_publish(&h, &mut ctx()).await;
        let err = h.engine.resume(id, &allowed()).await.unwrap_err();
        assert!(matches!(err, VigilError::InvalidTransition { ref from, .. } if from == "pending"));
    }

    #[tokio::test]
    async fn test_resume_while_halted_keeps_request_approved() {
        let h = default_harness();
        let id = pending_publish(&h, &mut ctx()).await;
        h.approvals.approve(id).unwrap();
        h.kill_switch.activate("freeze").unwrap();

        let outcome = h.engine.resume(id, &allowed()).await.unwrap();
        assert!(matches!(outcome, ResumeOutcome::Halted(_)));
        assert_eq!(h.approvals.get(id).unwrap().status, ApprovalStatus::Approved);
        assert_eq!(h.publishes.load(Ordering::SeqCst), 0);

        h.kill_switch.deactivate().unwrap();
        let outcome = h.engine.resume(id, &allowed()).await.unwrap();
        assert!(matches!(outcome, ResumeOutcome::Executed { .. }));
        assert_eq!(h.publishes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resume_rechecks_allow_list() {
        let h = default_harness();
        let id = pending_publish(&h, &mut ctx()).await;
        h.approvals.approve(id).unwrap();

        let outcome = h.engine.resume(id, &["ping".to_string()]).await.unwrap();
        assert_eq!(
            outcome,
            ResumeOutcome::NotAllowed {
                tool: "publish".into()
            }
        );
        assert_eq!(h.publishes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_resume_and_continue_feeds_result_back() {
        let h = default_harness();
        let mut ctx = ctx();
        let id = pending_publish(&h, &mut ctx).await;
        h.approvals.approve(id).unwrap();
        h.cheap
            .push(MockResponse::text("posted and done"));

        let outcome = h.engine.resume_and_continue(&mut ctx, id, None).await;

        assert_eq!(outcome, RunOutcome::Completed("posted and done".into()));
        assert_eq!(h.publishes.load(Ordering::SeqCst), 1);
        let last = ctx.tool_results().pop().unwrap();
        assert_eq!(last.tool_call_id, format!("approval-{id}"));
        assert_eq!(last.content, "published hello");
        assert_eq!(h.cheap.call_count(), 2);
    }

    // ── Assembled system ───────────────────────────────────────

    fn vigil(tmp: &TempDir, cheap: Arc<MockProvider>) -> Vigil {
        let mut config = VigilConfig::default();
        config.agent.default_project = PROJECT.into();
        config.tools.memory_dir = tmp.path().join("memory");
        config.safety.kill_file = tmp.path().join("KILL");
        config.tools.projects.insert(
            PROJECT.into(),
            ProjectTools {
                allowed_tools: vec!["read_file".into(), "write_file".into()],
            },
        );
        let gateway = ModelGateway::new(ModelTier::Cheap)
            .with_model(descriptor(ModelTier::Cheap, "mock-cheap", "cheap-model"))
            .with_provider(cheap);
        Vigil::assemble(config, Database::open_in_memory().unwrap(), gateway, vec![]).unwrap()
    }

    #[tokio::test]
    async fn test_write_file_waits_for_operator() {
        let tmp = tempfile::tempdir().unwrap();
        let cheap = Arc::new(MockProvider::new("mock-cheap"));
        let system = vigil(&tmp, cheap.clone());

        cheap.push(MockResponse::tool_call(
            "write_file",
            json!({"path": "notes/plan.md", "content": "ship it"}),
        ));
        let mut ctx = system.context(None, "writer", "chat");
        let outcome = system.run(&mut ctx, "write the plan").await;
        let RunOutcome::AwaitingApproval { approval_id, .. } = outcome else {
            panic!("expected approval marker, got {outcome:?}");
        };
        let target = tmp.path().join("memory/notes/plan.md");
        assert!(!target.exists());

        let resumed = system.approve(approval_id).await.unwrap();
        assert!(matches!(resumed, ResumeOutcome::Executed { .. }));
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "ship it");
        assert!(system.approve(approval_id).await.is_err());
    }

    #[tokio::test]
    async fn test_halted_approval_runs_after_release() {
        let tmp = tempfile::tempdir().unwrap();
        let cheap = Arc::new(MockProvider::new("mock-cheap"));
        let system = vigil(&tmp, cheap.clone());

        cheap.push(MockResponse::tool_call(
            "write_file",
            json!({"path": "later.md", "content": "after the pause"}),
        ));
        let mut ctx = system.context(None, "writer", "chat");
        let RunOutcome::AwaitingApproval { approval_id, .. } =
            system.run(&mut ctx, "write it later").await
        else {
            panic!("expected approval marker");
        };

        system.kill_switch().activate("maintenance").unwrap();
        let halted = system.approve(approval_id).await.unwrap();
        assert!(matches!(halted, ResumeOutcome::Halted(r) if r.contains("maintenance")));
        assert_eq!(
            system.approvals().get(approval_id).unwrap().status,
            ApprovalStatus::Approved
        );
        assert!(system.approve(approval_id).await.is_err());

        system.kill_switch().deactivate().unwrap();
        let ran = system.execute_approved(approval_id).await.unwrap();
        assert!(matches!(ran, ResumeOutcome::Executed { .. }));
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("memory/later.md")).unwrap(),
            "after the pause"
        );
        assert_eq!(
            system.approvals().get(approval_id).unwrap().status,
            ApprovalStatus::Executed
        );
        assert!(system.execute_approved(approval_id).await.is_err());
    }

    #[tokio::test]
    async fn test_pending_request_is_not_run_without_decision() {
        let tmp = tempfile::tempdir().unwrap();
        let cheap = Arc::new(MockProvider::new("mock-cheap"));
        let system = vigil(&tmp, cheap.clone());

        cheap.push(MockResponse::tool_call(
            "write_file",
            json!({"path": "eager.md", "content": "too soon"}),
        ));
        let mut ctx = system.context(None, "writer", "chat");
        let RunOutcome::AwaitingApproval { approval_id, .. } =
            system.run(&mut ctx, "write eagerly").await
        else {
            panic!("expected approval marker");
        };

        assert!(system.execute_approved(approval_id).await.is_err());
        assert!(!tmp.path().join("memory/eager.md").exists());
        assert_eq!(
            system.approvals().get(approval_id).unwrap().status,
            ApprovalStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_rejected_write_leaves_no_file() {
        let tmp = tempfile::tempdir().unwrap();
        let cheap = Arc::new(MockProvider::new("mock-cheap"));
        let system = vigil(&tmp, cheap.clone());

        cheap.push(MockResponse::tool_call(
            "write_file",
            json!({"path": "draft.md", "content": "nope"}),
        ));
        let mut ctx = system.context(None, "writer", "chat");
        let RunOutcome::AwaitingApproval { approval_id, .. } =
            system.run(&mut ctx, "draft it").await
        else {
            panic!("expected approval marker");
        };

        system.reject(approval_id).unwrap();
        assert!(system.approve(approval_id).await.is_err());
        assert!(!tmp.path().join("memory/draft.md").exists());
        assert_eq!(
            system.approvals().get(approval_id).unwrap().status,
            ApprovalStatus::Rejected
        );
    }

    #[tokio::test]
    async fn test_memory_read_refuses_traversal() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("secret.txt"), "hunter2").unwrap();
        let cheap = Arc::new(MockProvider::new("mock-cheap"));
        let system = vigil(&tmp, cheap.clone());

        cheap.push(MockResponse::tool_call(
            "read_file",
            json!({"path": "../secret.txt"}),
        ));
        cheap.push(MockResponse::text("could not read it"));

        let mut ctx = system.context(None, "reader", "chat");
        let outcome = system.run(&mut ctx, "read the secret").await;

        assert!(outcome.is_completed());
        let result = &ctx.tool_results()[0];
        assert!(result.is_error);
        assert!(result.content.contains("escapes the memory directory"));
        assert!(!result.content.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_unknown_project_sees_no_tools() {
        let tmp = tempfile::tempdir().unwrap();
        let cheap = Arc::new(MockProvider::new("mock-cheap"));
        let system = vigil(&tmp, cheap.clone());
        cheap.push(MockResponse::text("ok"));

        let mut ctx = system.context(Some("stranger"), "agent", "chat");
        assert!(ctx.allowed_tools.is_empty());
        system.run(&mut ctx, "hi").await;
        assert!(cheap.requests()[0].tools.is_empty());
    }
}
