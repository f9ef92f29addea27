use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::info;
use vigil_core::{Result, VigilError};

use crate::store::{Database, parse_timestamp, storage_err, timestamp};

/// Lifecycle of an approval request.
///
/// Legal moves: pending → approved, pending → rejected, approved → executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Executed,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Executed => "executed",
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApprovalStatus {
    type Err = VigilError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "executed" => Ok(Self::Executed),
            other => Err(VigilError::Storage(format!("unknown approval status '{other}'"))),
        }
    }
}

/// A durable request for a human decision on one action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: i64,
    pub project_id: String,
    pub agent_id: String,
    /// The capability to run once approved.
    pub action_type: String,
    /// Arguments for the capability.
    pub action_data: serde_json::Value,
    pub context_summary: String,
    pub cost_estimate: f64,
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
}

const COLUMNS: &str = "id, project_id, agent_id, action_type, action_data, context_summary, \
                       cost_estimate, status, created_at, decided_at, executed_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<(ApprovalRequest, String)> {
    let data: String = row.get(4)?;
    let status: String = row.get(7)?;
    let created: String = row.get(8)?;
    let decided: Option<String> = row.get(9)?;
    let executed: Option<String> = row.get(10)?;
    Ok((
        ApprovalRequest {
            id: row.get(0)?,
            project_id: row.get(1)?,
            agent_id: row.get(2)?,
            action_type: row.get(3)?,
            action_data: serde_json::from_str(&data).unwrap_or(serde_json::Value::String(data)),
            context_summary: row.get(5)?,
            cost_estimate: row.get(6)?,
            status: ApprovalStatus::Pending,
            created_at: parse_timestamp(&created),
            decided_at: decided.as_deref().map(parse_timestamp),
            executed_at: executed.as_deref().map(parse_timestamp),
        },
        status,
    ))
}

fn finish(raw: (ApprovalRequest, String)) -> Result<ApprovalRequest> {
    let (mut request, status) = raw;
    request.status = status.parse()?;
    Ok(request)
}

/// Durable queue of actions awaiting a human decision.
///
/// Every decision is a single conditional UPDATE, so two racing decisions on
/// the same id (threads or processes) cannot both succeed.
#[derive(Clone)]
pub struct ApprovalGate {
    db: Database,
}

impl ApprovalGate {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a pending request; returns its id.
    pub fn submit(
        &self,
        project_id: &str,
        agent_id: &str,
        action_type: &str,
        action_data: &serde_json::Value,
        context_summary: &str,
        cost_estimate: f64,
    ) -> Result<i64> {
        let conn = self.db.conn();
        conn.execute(
            "INSERT INTO approvals
             (project_id, agent_id, action_type, action_data, context_summary, cost_estimate,
              status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7)",
            params![
                project_id,
                agent_id,
                action_type,
                serde_json::to_string(action_data)?,
                context_summary,
                cost_estimate,
                timestamp(Utc::now()),
            ],
        )
        .map_err(storage_err)?;
        let id = conn.last_insert_rowid();
        info!(approval_id = id, project = %project_id, action = %action_type, "approval requested");
        Ok(id)
    }

    pub fn approve(&self, id: i64) -> Result<()> {
        self.transition(id, ApprovalStatus::Pending, ApprovalStatus::Approved)
    }

    pub fn reject(&self, id: i64) -> Result<()> {
        self.transition(id, ApprovalStatus::Pending, ApprovalStatus::Rejected)
    }

    /// approved → executed. Also the claim step of a resume: only one caller
    /// can win it for a given id.
    pub fn mark_executed(&self, id: i64) -> Result<()> {
        self.transition(id, ApprovalStatus::Approved, ApprovalStatus::Executed)
    }

    fn transition(&self, id: i64, from: ApprovalStatus, to: ApprovalStatus) -> Result<()> {
        let now = timestamp(Utc::now());
        let sql = if to == ApprovalStatus::Executed {
            "UPDATE approvals SET status = ?1, executed_at = ?2 WHERE id = ?3 AND status = ?4"
        } else {
            "UPDATE approvals SET status = ?1, decided_at = ?2 WHERE id = ?3 AND status = ?4"
        };
        let changed = self
            .db
            .conn()
            .execute(sql, params![to.as_str(), now, id, from.as_str()])
            .map_err(storage_err)?;

        if changed == 1 {
            info!(approval_id = id, from = %from, to = %to, "approval status changed");
            return Ok(());
        }

        let current = self.get(id)?;
        Err(VigilError::InvalidTransition {
            id,
            from: current.status.to_string(),
            to: to.to_string(),
        })
    }

    pub fn get(&self, id: i64) -> Result<ApprovalRequest> {
        let raw = self
            .db
            .conn()
            .query_row(
                &format!("SELECT {COLUMNS} FROM approvals WHERE id = ?1"),
                params![id],
                from_row,
            )
            .optional()
            .map_err(storage_err)?;
        match raw {
            Some(raw) => finish(raw),
            None => Err(VigilError::ApprovalNotFound(id)),
        }
    }

    /// All pending requests, oldest first.
    pub fn get_pending(&self) -> Result<Vec<ApprovalRequest>> {
        self.list(Some(ApprovalStatus::Pending), None)
    }

    /// Requests filtered by status, newest first unless listing pending.
    pub fn list(
        &self,
        status: Option<ApprovalStatus>,
        limit: Option<usize>,
    ) -> Result<Vec<ApprovalRequest>> {
        let order = if status == Some(ApprovalStatus::Pending) {
            "ASC"
        } else {
            "DESC"
        };
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let conn = self.db.conn();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM approvals
                 WHERE (?1 IS NULL OR status = ?1)
                 ORDER BY id {order} LIMIT ?2"
            ))
            .map_err(storage_err)?;
        let rows = stmt
            .query_map(params![status.map(|s| s.as_str()), limit], from_row)
            .map_err(storage_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(storage_err)?;
        rows.into_iter().map(finish).collect()
    }

    pub fn pending_count(&self) -> Result<u64> {
        let n: i64 = self
            .db
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM approvals WHERE status = 'pending'",
                [],
                |row| row.get(0),
            )
            .map_err(storage_err)?;
        Ok(n as u64)
    }
}

/// Human-readable summary of a request for the operator.
pub fn format_preview(request: &ApprovalRequest) -> String {
    let payload = serde_json::to_string_pretty(&request.action_data)
        .unwrap_or_else(|_| request.action_data.to_string());
    let mut out = format!(
        "Approval #{} [{}]\nProject: {}\nAgent: {}\nAction: {}\nCost estimate: ${:.4}\nPayload:\n{}",
        request.id,
        request.status,
        request.project_id,
        if request.agent_id.is_empty() { "-" } else { request.agent_id.as_str() },
        request.action_type,
        request.cost_estimate,
        payload,
    );
    if !request.context_summary.is_empty() {
        out.push_str("\nContext: ");
        out.push_str(&request.context_summary);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for s in [
            ApprovalStatus::Pending,
            ApprovalStatus::Approved,
            ApprovalStatus::Rejected,
            ApprovalStatus::Executed,
        ] {
            assert_eq!(s.as_str().parse::<ApprovalStatus>().unwrap(), s);
        }
        assert!("maybe".parse::<ApprovalStatus>().is_err());
    }
}
