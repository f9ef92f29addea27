use vigil_config::VigilConfig;
use vigil_core::{Result, VigilError};
use vigil_runtime::{ResumeOutcome, Vigil};
use vigil_safety::{ApprovalStatus, format_preview};

use super::{ApprovalAction, one_line};

pub(super) async fn cmd_approvals(config: VigilConfig, action: ApprovalAction) -> Result<()> {
    let vigil = Vigil::open(config)?;
    let result = dispatch(&vigil, action).await;
    vigil.flush_alerts().await;
    result
}

async fn dispatch(vigil: &Vigil, action: ApprovalAction) -> Result<()> {
    let gate = vigil.approvals();

    match action {
        ApprovalAction::List {
            status,
            limit,
            json,
        } => {
            let filter = match status.as_str() {
                "all" => None,
                s => Some(s.parse::<ApprovalStatus>()?),
            };
            let requests = gate.list(filter, Some(limit))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&requests)?);
                return Ok(());
            }
            if requests.is_empty() {
                println!("No {status} approval requests.");
                return Ok(());
            }
            for r in requests {
                println!(
                    "#{:<5} [{:<8}] {:<12} {:<12} {:<14} ${:.4}  {}",
                    r.id,
                    r.status.as_str(),
                    r.project_id,
                    r.agent_id,
                    r.action_type,
                    r.cost_estimate,
                    one_line(&r.context_summary, 40)
                );
            }
        }
        ApprovalAction::Show { id } => {
            println!("{}", format_preview(&gate.get(id)?));
        }
        ApprovalAction::Approve { id, continue_run } => {
            if continue_run {
                println!("{}", vigil.approve_and_continue(id).await?);
                return Ok(());
            }
            report(id, "Approved", vigil.approve(id).await?)?;
        }
        ApprovalAction::Run { id, continue_run } => {
            if continue_run {
                println!("{}", vigil.execute_approved_and_continue(id).await?);
                return Ok(());
            }
            report(id, "Ran", vigil.execute_approved(id).await?)?;
        }
        ApprovalAction::Reject { id } => {
            vigil.reject(id)?;
            println!("Rejected #{id}");
        }
    }
    Ok(())
}

fn report(id: i64, verb: &str, outcome: ResumeOutcome) -> Result<()> {
    match outcome {
        ResumeOutcome::Executed { call, result, .. } => {
            let mark = if result.is_error { "✗" } else { "✓" };
            println!("{mark} {verb} #{id}: {}", call.tool_name);
            println!("{}", result.content);
            Ok(())
        }
        ResumeOutcome::Halted(reason) => {
            println!("#{id} is approved, but the kill switch is active; not executed.");
            println!("{reason}");
            println!("Once released, run it with: vigil approvals run {id}");
            Ok(())
        }
        ResumeOutcome::NotAllowed { tool } => Err(VigilError::ToolDenied(format!(
            "#{id} is approved, but '{tool}' is not in the project's allow-list"
        ))),
    }
}
