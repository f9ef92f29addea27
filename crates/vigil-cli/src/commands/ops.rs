use dialoguer::{Confirm, theme::ColorfulTheme};
use vigil_config::VigilConfig;
use vigil_core::Result;
use vigil_runtime::Vigil;
use vigil_safety::{AuditEvent, Severity};

use super::{KillAction, one_line};

// ── Kill switch ────────────────────────────────────────────────

pub(super) async fn cmd_kill(config: &VigilConfig, action: KillAction) -> Result<()> {
    let vigil = Vigil::open(config.clone())?;
    let result = toggle_kill(&vigil, action);
    vigil.flush_alerts().await;
    result
}

fn toggle_kill(vigil: &Vigil, action: KillAction) -> Result<()> {
    let config = vigil.config();
    let switch = vigil.kill_switch();
    let project = &config.agent.default_project;

    match action {
        KillAction::On { reason } => {
            switch.activate(&reason)?;
            vigil.audit().log(
                AuditEvent::new(project, Severity::Critical, "kill_switch", "Kill switch activated")
                    .agent("console")
                    .details(&reason),
            )?;
            println!("🛑 Kill switch ON ({})", switch.path().display());
            println!("   Every run halts at its next check.");
        }
        KillAction::Off { yes } => {
            if !switch.is_active() {
                println!("Kill switch is already off.");
                return Ok(());
            }
            if !yes {
                let confirmed = Confirm::with_theme(&ColorfulTheme::default())
                    .with_prompt("Release the kill switch and resume operations?")
                    .default(false)
                    .interact()
                    .unwrap_or(false);
                if !confirmed {
                    println!("Kill switch left on.");
                    return Ok(());
                }
            }
            switch.deactivate()?;
            vigil.audit().log(
                AuditEvent::new(project, Severity::Warn, "kill_switch", "Kill switch deactivated")
                    .agent("console"),
            )?;
            println!("✅ Kill switch OFF. Operations resumed.");
        }
        KillAction::Status => match switch.reason() {
            Some(reason) => println!("🛑 HALTED\n{reason}"),
            None => println!("✅ Running"),
        },
    }
    Ok(())
}

// ── Budget ─────────────────────────────────────────────────────

pub(super) fn cmd_budget_show(config: &VigilConfig, project: &str, json: bool) -> Result<()> {
    let vigil = Vigil::open(config.clone())?;
    let report = vigil.budget().daily_report(project)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Budget for '{}' on {}", report.project_id, report.date);
    println!(
        "  Spent: ${:.4} / ${:.2}  (remaining ${:.4})",
        report.total_cost, report.daily_limit, report.remaining
    );
    if report.by_model.is_empty() {
        println!("  No model calls today.");
    }
    for m in &report.by_model {
        println!(
            "  {:<32} {:>5} calls  {:>9} in  {:>9} out  ${:.4}",
            m.model, m.calls, m.tokens_input, m.tokens_output, m.cost_usd
        );
    }
    Ok(())
}

pub(super) fn cmd_budget_set(
    config: &VigilConfig,
    project: &str,
    daily: f64,
    monthly: f64,
) -> Result<()> {
    let vigil = Vigil::open(config.clone())?;
    vigil.budget().set_budget(project, daily, monthly)?;
    vigil.audit().log(
        AuditEvent::new(project, Severity::Info, "budget", "Budget updated")
            .agent("console")
            .details(format!("daily ${daily:.2}, monthly ${monthly:.2}")),
    )?;
    println!("Budget for '{project}': ${daily:.2}/day, ${monthly:.2}/month");
    Ok(())
}

pub(super) fn cmd_budget_week(config: &VigilConfig, project: &str) -> Result<()> {
    let vigil = Vigil::open(config.clone())?;
    let days = vigil.budget().weekly_report(project)?;
    if days.is_empty() {
        println!("No spend recorded for '{project}' in the last 7 days.");
        return Ok(());
    }
    println!("Last 7 days for '{project}':");
    for d in &days {
        println!(
            "  {}  ${:>9.4}  {:>9} tokens  {:>5} calls",
            d.day, d.total_cost, d.total_tokens, d.calls
        );
    }
    let total: f64 = days.iter().map(|d| d.total_cost).sum();
    println!("  Total ${total:.4}");
    Ok(())
}

// ── Audit ──────────────────────────────────────────────────────

pub(super) fn cmd_audit_recent(
    config: &VigilConfig,
    project: Option<&str>,
    limit: usize,
    json: bool,
) -> Result<()> {
    let vigil = Vigil::open(config.clone())?;
    let entries = vigil.audit().recent(project, limit)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("No audit entries.");
        return Ok(());
    }
    for e in entries {
        let mark = if e.success { " " } else { "✗" };
        println!(
            "{} {} [{:<8}] {:<10} {:<10} {}",
            e.timestamp.format("%Y-%m-%d %H:%M:%S"),
            mark,
            e.severity.as_str(),
            e.project_id,
            e.category,
            one_line(&e.action, 80)
        );
    }
    Ok(())
}

pub(super) fn cmd_audit_summary(config: &VigilConfig, project: &str) -> Result<()> {
    let vigil = Vigil::open(config.clone())?;
    let summary = vigil.audit().daily_summary(project)?;
    println!("Audit summary for '{}' on {}", summary.project_id, summary.date);
    println!("  Events: {}", summary.total_events);
    println!("  Failures: {}", summary.errors);
    println!("  Cost: ${:.4}", summary.total_cost);
    for (severity, count) in &summary.by_severity {
        println!("  {severity:<8} {count}");
    }
    Ok(())
}
