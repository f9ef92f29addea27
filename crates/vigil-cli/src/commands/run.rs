use tracing::debug;
use vigil_config::VigilConfig;
use vigil_core::Result;
use vigil_llm::ModelGateway;
use vigil_runtime::{RunOutcome, Vigil};

pub(super) async fn cmd_run(
    config: VigilConfig,
    task: String,
    project: Option<String>,
    agent: String,
    task_type: String,
    json: bool,
) -> Result<()> {
    let vigil = Vigil::open(config)?;
    let mut ctx = vigil.context(project.as_deref(), &agent, &task_type);
    debug!(project = %ctx.project_id, tools = ?ctx.allowed_tools, "starting run from console");

    let outcome = vigil.run(&mut ctx, &task).await;
    vigil.flush_alerts().await;
    println!("{outcome}");

    if let RunOutcome::AwaitingApproval { approval_id, .. } = &outcome {
        println!();
        println!("Decide with: vigil approvals approve {approval_id}  |  vigil approvals reject {approval_id}");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&ctx)?);
    } else if let Some(model) = &ctx.model_used {
        eprintln!(
            "\n{} tokens · ${:.4} · {}",
            ctx.total_tokens, ctx.total_cost, model
        );
    }
    Ok(())
}

pub(super) async fn cmd_models(config: &VigilConfig, offline: bool) -> Result<()> {
    let gateway = ModelGateway::from_config(&config.models, &config.services)?;

    println!("Default tier: {}", gateway.default_tier());
    for m in gateway.models() {
        println!(
            "  {:<8} {:<10} {:<34} ${:>6.2} in  ${:>6.2} out  {:>7} ctx",
            m.tier.as_str(),
            m.provider,
            m.name,
            m.cost_per_1m_input,
            m.cost_per_1m_output,
            m.max_context
        );
    }
    if !config.models.task_routing.is_empty() {
        println!("Routes:");
        let mut routes: Vec<_> = config.models.task_routing.iter().collect();
        routes.sort();
        for (task, tier) in routes {
            println!("  {task} → {tier}");
        }
    }

    if offline {
        return Ok(());
    }
    println!("Providers:");
    let health = gateway.health().await;
    if health.is_empty() {
        println!("  none configured (set API keys under [services])");
    }
    for (name, status) in health {
        match status {
            Ok(()) => println!("  ✓ {name}"),
            Err(e) => println!("  ✗ {name}: {e}"),
        }
    }
    Ok(())
}
