//! # vigil-safety
//!
//! The shared, process-wide stores every run consults:
//!
//! - [`BudgetController`]: per-project daily spend against a ceiling.
//! - [`ApprovalGate`]: durable queue of actions awaiting a human decision.
//! - [`KillSwitch`]: disk-backed halt flag, re-read on every check.
//! - [`AuditLog`]: append-only decision record with high-severity alerts.
//!
//! [`sanitize_external`] wraps untrusted tool output before the model sees it.
//!
//! All SQL-backed stores share one [`Database`] handle.

pub mod approval;
pub mod audit;
pub mod budget;
pub mod kill_switch;
pub mod sanitize;
pub mod store;

pub use approval::{ApprovalGate, ApprovalRequest, ApprovalStatus, format_preview};
pub use audit::{
    AlertSink, AuditEntry, AuditEvent, AuditLog, DailySummary, FnAlertSink, Severity,
    TracingAlertSink, WebhookAlertSink,
};
pub use budget::{
    BudgetController, BudgetStatus, DailyReport, DaySpend, ModelSpend, PriceTable, UsageRecord,
};
pub use kill_switch::KillSwitch;
pub use sanitize::{sanitize_external, scan_for_injection};
pub use store::Database;
