use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rusqlite::{Row, params};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use vigil_core::{Result, VigilError};

use crate::store::{Database, day_of, parse_timestamp, storage_err, timestamp};

/// Audit severity, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Logged only.
    Info,
    /// Logged, run continues.
    Warn,
    /// Blocked but recoverable.
    Block,
    /// Needs operator intervention.
    Reject,
    /// Stop everything.
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Self::Info,
        Self::Warn,
        Self::Block,
        Self::Reject,
        Self::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Block => "block",
            Self::Reject => "reject",
            Self::Critical => "critical",
        }
    }

    /// Whether entries at this severity fire the alert sink.
    pub fn alerts(&self) -> bool {
        *self >= Self::Block
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = VigilError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|sev| sev.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| VigilError::Config(format!("unknown severity '{s}'")))
    }
}

/// An event to append. Built with [`AuditEvent::new`] and the chained setters.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub project_id: String,
    pub agent_id: String,
    pub severity: Severity,
    pub category: String,
    pub action: String,
    pub details: String,
    pub tokens: u32,
    pub cost: f64,
    pub model: String,
    pub success: bool,
}

impl AuditEvent {
    pub fn new(
        project_id: impl Into<String>,
        severity: Severity,
        category: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            agent_id: String::new(),
            severity,
            category: category.into(),
            action: action.into(),
            details: String::new(),
            tokens: 0,
            cost: 0.0,
            model: String::new(),
            success: true,
        }
    }

    pub fn agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = agent_id.into();
        self
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    pub fn usage(mut self, tokens: u32, cost: f64, model: impl Into<String>) -> Self {
        self.tokens = tokens;
        self.cost = cost;
        self.model = model.into();
        self
    }

    pub fn failed(mut self) -> Self {
        self.success = false;
        self
    }

    fn alert_text(&self) -> String {
        let mut text = format!(
            "[{}] {}: {}",
            self.severity.as_str().to_uppercase(),
            self.category,
            self.action
        );
        if !self.details.is_empty() {
            text.push('\n');
            text.push_str(&self.details);
        }
        text
    }
}

/// A stored audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub project_id: String,
    pub agent_id: String,
    pub severity: Severity,
    pub category: String,
    pub action: String,
    pub details: String,
    pub tokens_used: u32,
    pub cost_usd: f64,
    pub model: String,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailySummary {
    pub date: String,
    pub project_id: String,
    pub total_events: u64,
    pub total_cost: f64,
    pub errors: u64,
    /// Only severities with at least one entry.
    pub by_severity: BTreeMap<String, u64>,
}

// ── Alert sinks ────────────────────────────────────────────────

/// Receives the text of high-severity audit entries.
pub trait AlertSink: Send + Sync {
    fn alert(&self, message: &str) -> Result<()>;

    /// Deliveries still in flight. Drained by [`AuditLog::flush`].
    fn take_pending(&self) -> Vec<JoinHandle<()>> {
        Vec::new()
    }
}

/// Adapts a closure into an [`AlertSink`].
pub struct FnAlertSink<F>(pub F);

impl<F> AlertSink for FnAlertSink<F>
where
    F: Fn(&str) + Send + Sync,
{
    fn alert(&self, message: &str) -> Result<()> {
        (self.0)(message);
        Ok(())
    }
}

/// Emits alerts as `error!` events.
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn alert(&self, message: &str) -> Result<()> {
        error!(alert = %message, "audit alert");
        Ok(())
    }
}

/// POSTs `{"text": message}` to a webhook on the current tokio runtime.
/// Deliveries run in the background; call [`AuditLog::flush`] before the
/// runtime shuts down or they are cancelled.
pub struct WebhookAlertSink {
    client: reqwest::Client,
    url: String,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl WebhookAlertSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            pending: Mutex::new(Vec::new()),
        }
    }
}

impl AlertSink for WebhookAlertSink {
    fn alert(&self, message: &str) -> Result<()> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| anyhow::anyhow!("webhook alert needs a tokio runtime: {e}"))?;
        let request = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "text": message }));
        let url = self.url.clone();
        let task = handle.spawn(async move {
            match request.send().await {
                Ok(resp) if !resp.status().is_success() => {
                    warn!(url = %url, status = %resp.status(), "alert webhook rejected message");
                }
                Ok(_) => debug!(url = %url, "alert delivered"),
                Err(e) => warn!(url = %url, error = %e, "alert webhook failed"),
            }
        });
        let mut pending = self.pending.lock();
        pending.retain(|t| !t.is_finished());
        pending.push(task);
        Ok(())
    }

    fn take_pending(&self) -> Vec<JoinHandle<()>> {
        std::mem::take(&mut *self.pending.lock())
    }
}

// ── Audit log ──────────────────────────────────────────────────

const COLUMNS: &str = "id, timestamp, project_id, agent_id, severity, category, action, details, \
                       tokens_used, cost_usd, model, success";

fn from_row(row: &Row<'_>) -> rusqlite::Result<AuditEntry> {
    let ts: String = row.get(1)?;
    let severity: String = row.get(4)?;
    Ok(AuditEntry {
        id: row.get(0)?,
        timestamp: parse_timestamp(&ts),
        project_id: row.get(2)?,
        agent_id: row.get(3)?,
        severity: severity.parse().unwrap_or(Severity::Info),
        category: row.get(5)?,
        action: row.get(6)?,
        details: row.get(7)?,
        tokens_used: row.get(8)?,
        cost_usd: row.get(9)?,
        model: row.get(10)?,
        success: row.get::<_, i64>(11)? != 0,
    })
}

/// Append-only record of decisions. Entries at `block` and above are also
/// handed to the alert sink, once per call.
#[derive(Clone)]
pub struct AuditLog {
    db: Database,
    sink: Arc<RwLock<Option<Arc<dyn AlertSink>>>>,
}

impl AuditLog {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            sink: Arc::new(RwLock::new(None)),
        }
    }

    /// Register (or replace) the alert sink.
    pub fn set_alert_sink(&self, sink: Arc<dyn AlertSink>) {
        *self.sink.write() = Some(sink);
    }

    /// Append an entry; returns its id. The alert fires even if the insert
    /// fails, and alert failures never reach the caller.
    pub fn log(&self, event: AuditEvent) -> Result<i64> {
        let inserted = self.insert(&event);

        match event.severity {
            Severity::Info => {
                info!(project = %event.project_id, category = %event.category, "{}", event.action)
            }
            Severity::Warn | Severity::Block | Severity::Reject => warn!(
                project = %event.project_id,
                category = %event.category,
                severity = %event.severity,
                "{}",
                event.action
            ),
            Severity::Critical => {
                error!(project = %event.project_id, category = %event.category, "{}", event.action)
            }
        }

        if event.severity.alerts() {
            self.fire_alert(&event.alert_text());
        }

        inserted
    }

    fn insert(&self, event: &AuditEvent) -> Result<i64> {
        let conn = self.db.conn();
        conn.execute(
            "INSERT INTO audit_log
             (timestamp, project_id, agent_id, severity, category, action, details,
              tokens_used, cost_usd, model, success)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                timestamp(Utc::now()),
                event.project_id,
                event.agent_id,
                event.severity.as_str(),
                event.category,
                event.action,
                event.details,
                event.tokens,
                event.cost,
                event.model,
                event.success as i64,
            ],
        )
        .map_err(storage_err)?;
        Ok(conn.last_insert_rowid())
    }

    fn fire_alert(&self, text: &str) {
        let Some(sink) = self.sink.read().clone() else {
            return;
        };
        match catch_unwind(AssertUnwindSafe(|| sink.alert(text))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "alert sink failed"),
            Err(_) => warn!("alert sink panicked"),
        }
    }

    /// Wait up to `timeout` for alert deliveries still in flight. Returns
    /// false if some were still running when the time ran out.
    pub async fn flush(&self, timeout: Duration) -> bool {
        let Some(sink) = self.sink.read().clone() else {
            return true;
        };
        let pending = sink.take_pending();
        if pending.is_empty() {
            return true;
        }
        let count = pending.len();
        let waited = tokio::time::timeout(timeout, async {
            for task in pending {
                if let Err(e) = task.await {
                    warn!(error = %e, "alert delivery task failed");
                }
            }
        })
        .await;
        if waited.is_err() {
            warn!(count, ?timeout, "gave up waiting for alert deliveries");
            return false;
        }
        true
    }

    /// Most recent entries, newest first, optionally for one project.
    pub fn recent(&self, project_id: Option<&str>, limit: usize) -> Result<Vec<AuditEntry>> {
        let conn = self.db.conn();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM audit_log
                 WHERE (?1 IS NULL OR project_id = ?1)
                 ORDER BY timestamp DESC, id DESC LIMIT ?2"
            ))
            .map_err(storage_err)?;
        stmt.query_map(params![project_id, limit as i64], from_row)
            .map_err(storage_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(storage_err)
    }

    /// Today's counts for a project.
    pub fn daily_summary(&self, project_id: &str) -> Result<DailySummary> {
        let today = day_of(Utc::now());
        let conn = self.db.conn();

        let (total_events, total_cost, errors): (i64, f64, i64) = conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(cost_usd), 0),
                        COALESCE(SUM(CASE WHEN success = 0 THEN 1 ELSE 0 END), 0)
                 FROM audit_log
                 WHERE project_id = ?1 AND substr(timestamp, 1, 10) = ?2",
                params![project_id, today],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(storage_err)?;

        let mut stmt = conn
            .prepare(
                "SELECT severity, COUNT(*) FROM audit_log
                 WHERE project_id = ?1 AND substr(timestamp, 1, 10) = ?2
                 GROUP BY severity",
            )
            .map_err(storage_err)?;
        let by_severity = stmt
            .query_map(params![project_id, today], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })
            .map_err(storage_err)?
            .collect::<std::result::Result<BTreeMap<_, _>, _>>()
            .map_err(storage_err)?;

        Ok(DailySummary {
            date: today,
            project_id: project_id.to_string(),
            total_events: total_events as u64,
            total_cost,
            errors: errors as u64,
            by_severity,
        })
    }
}
