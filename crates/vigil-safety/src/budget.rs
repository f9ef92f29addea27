use chrono::{DateTime, Duration, Utc};
use rusqlite::{OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};
use vigil_config::schema::BudgetConfig;
use vigil_core::Result;

use crate::store::{Database, day_of, storage_err, timestamp};

/// Static per-model prices in USD per million tokens, `(input, output)`.
#[derive(Debug, Clone)]
pub struct PriceTable {
    prices: HashMap<String, (f64, f64)>,
    fallback: (f64, f64),
}

impl Default for PriceTable {
    fn default() -> Self {
        let mut prices = HashMap::new();
        prices.insert("llama3.2:8b".to_string(), (0.0, 0.0));
        prices.insert("claude-3-5-haiku-20241022".to_string(), (0.80, 4.00));
        prices.insert("claude-sonnet-4-20250514".to_string(), (3.00, 15.00));
        prices.insert("claude-opus-4-5-20251101".to_string(), (15.00, 75.00));
        prices.insert("gpt-4o-mini".to_string(), (0.15, 0.60));
        Self {
            prices,
            fallback: (3.00, 15.00),
        }
    }
}

impl PriceTable {
    /// Built-in prices plus `[budget.pricing]`, with the configured fallback.
    pub fn from_config(config: &BudgetConfig) -> Self {
        let mut table = Self::default();
        table.fallback = (config.fallback_price.input, config.fallback_price.output);
        for (model, p) in &config.pricing {
            table.prices.insert(model.clone(), (p.input, p.output));
        }
        table
    }

    pub fn with_price(mut self, model: impl Into<String>, input: f64, output: f64) -> Self {
        self.prices.insert(model.into(), (input, output));
        self
    }

    pub fn with_fallback(mut self, input: f64, output: f64) -> Self {
        self.fallback = (input, output);
        self
    }

    /// Price pair for a model; unknown models get the fallback.
    pub fn price(&self, model: &str) -> (f64, f64) {
        self.prices.get(model).copied().unwrap_or(self.fallback)
    }

    pub fn cost(&self, model: &str, tokens_in: u32, tokens_out: u32) -> f64 {
        let (pin, pout) = self.price(model);
        (tokens_in as f64 * pin + tokens_out as f64 * pout) / 1_000_000.0
    }
}

/// One model call's spend. Append-only once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub project_id: String,
    pub model: String,
    pub tokens_input: u32,
    pub tokens_output: u32,
    pub cost_usd: f64,
    pub task_type: String,
    pub agent_id: String,
    pub timestamp: DateTime<Utc>,
}

impl UsageRecord {
    pub fn new(
        project_id: impl Into<String>,
        model: impl Into<String>,
        tokens_input: u32,
        tokens_output: u32,
        cost_usd: f64,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            model: model.into(),
            tokens_input,
            tokens_output,
            cost_usd,
            task_type: String::new(),
            agent_id: String::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn task_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = task_type.into();
        self
    }

    pub fn agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = agent_id.into();
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Today's spend against the project's ceiling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetStatus {
    pub spent: f64,
    pub limit: f64,
}

impl BudgetStatus {
    pub fn has_budget(&self) -> bool {
        self.spent < self.limit
    }

    pub fn remaining(&self) -> f64 {
        self.limit - self.spent
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelSpend {
    pub model: String,
    pub tokens_input: u64,
    pub tokens_output: u64,
    pub cost_usd: f64,
    pub calls: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyReport {
    pub date: String,
    pub project_id: String,
    pub total_cost: f64,
    pub daily_limit: f64,
    pub remaining: f64,
    pub by_model: Vec<ModelSpend>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DaySpend {
    pub day: String,
    pub total_cost: f64,
    pub total_tokens: u64,
    pub calls: u64,
}

/// Per-project spend tracking against a daily ceiling.
///
/// Every read goes to the usage table, so a check made right after
/// `record_usage` observes it.
#[derive(Clone)]
pub struct BudgetController {
    db: Database,
    prices: PriceTable,
    default_daily_limit: f64,
    default_monthly_limit: f64,
}

impl BudgetController {
    pub fn new(db: Database, prices: PriceTable, default_daily_limit: f64) -> Self {
        Self {
            db,
            prices,
            default_daily_limit,
            default_monthly_limit: default_daily_limit * 20.0,
        }
    }

    /// Build from `[budget]`, writing configured project limits to the
    /// budgets table.
    pub fn from_config(db: Database, config: &BudgetConfig) -> Result<Self> {
        let controller = Self {
            db,
            prices: PriceTable::from_config(config),
            default_daily_limit: config.default_daily_limit_usd,
            default_monthly_limit: config.default_monthly_limit_usd,
        };
        for (project, limits) in &config.projects {
            controller.set_budget(
                project,
                limits.daily_limit_usd,
                limits
                    .monthly_limit_usd
                    .unwrap_or(controller.default_monthly_limit),
            )?;
        }
        Ok(controller)
    }

    pub fn set_budget(&self, project_id: &str, daily: f64, monthly: f64) -> Result<()> {
        self.db
            .conn()
            .execute(
                "INSERT INTO budgets (project_id, daily_limit, monthly_limit) VALUES (?1, ?2, ?3)
                 ON CONFLICT(project_id) DO UPDATE SET daily_limit = ?2, monthly_limit = ?3",
                params![project_id, daily, monthly],
            )
            .map_err(storage_err)?;
        info!(project = %project_id, daily, monthly, "budget set");
        Ok(())
    }

    pub fn daily_limit(&self, project_id: &str) -> Result<f64> {
        let limit: Option<f64> = self
            .db
            .conn()
            .query_row(
                "SELECT daily_limit FROM budgets WHERE project_id = ?1",
                params![project_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage_err)?;
        Ok(limit.unwrap_or(self.default_daily_limit))
    }

    /// Summed cost recorded for the project on the current UTC day.
    pub fn daily_spend(&self, project_id: &str) -> Result<f64> {
        let today = day_of(Utc::now());
        self.db
            .conn()
            .query_row(
                "SELECT COALESCE(SUM(cost_usd), 0) FROM token_usage
                 WHERE project_id = ?1 AND substr(timestamp, 1, 10) = ?2",
                params![project_id, today],
                |row| row.get(0),
            )
            .map_err(storage_err)
    }

    pub fn status(&self, project_id: &str) -> Result<BudgetStatus> {
        Ok(BudgetStatus {
            spent: self.daily_spend(project_id)?,
            limit: self.daily_limit(project_id)?,
        })
    }

    /// `true` while today's spend is strictly below the ceiling.
    pub fn has_budget(&self, project_id: &str) -> Result<bool> {
        let status = self.status(project_id)?;
        if !status.has_budget() {
            warn!(
                project = %project_id,
                spent = status.spent,
                limit = status.limit,
                "daily budget exhausted"
            );
        }
        Ok(status.has_budget())
    }

    pub fn calculate_cost(&self, model: &str, tokens_in: u32, tokens_out: u32) -> f64 {
        self.prices.cost(model, tokens_in, tokens_out)
    }

    pub fn prices(&self) -> &PriceTable {
        &self.prices
    }

    /// Append a usage record; returns its row id.
    pub fn record_usage(&self, record: &UsageRecord) -> Result<i64> {
        let conn = self.db.conn();
        conn.execute(
            "INSERT INTO token_usage
             (project_id, model, tokens_input, tokens_output, cost_usd, task_type, agent_id, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.project_id,
                record.model,
                record.tokens_input,
                record.tokens_output,
                record.cost_usd,
                record.task_type,
                record.agent_id,
                timestamp(record.timestamp),
            ],
        )
        .map_err(storage_err)?;
        debug!(
            project = %record.project_id,
            model = %record.model,
            cost = record.cost_usd,
            "usage recorded"
        );
        Ok(conn.last_insert_rowid())
    }

    /// Today's spend grouped by model.
    pub fn daily_report(&self, project_id: &str) -> Result<DailyReport> {
        let today = day_of(Utc::now());
        let by_model = {
            let conn = self.db.conn();
            let mut stmt = conn
                .prepare(
                    "SELECT model, SUM(tokens_input), SUM(tokens_output), SUM(cost_usd), COUNT(*)
                     FROM token_usage
                     WHERE project_id = ?1 AND substr(timestamp, 1, 10) = ?2
                     GROUP BY model ORDER BY SUM(cost_usd) DESC",
                )
                .map_err(storage_err)?;
            stmt.query_map(params![project_id, today], |row| {
                Ok(ModelSpend {
                    model: row.get(0)?,
                    tokens_input: row.get::<_, i64>(1)? as u64,
                    tokens_output: row.get::<_, i64>(2)? as u64,
                    cost_usd: row.get(3)?,
                    calls: row.get::<_, i64>(4)? as u64,
                })
            })
            .map_err(storage_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(storage_err)?
        };

        let total_cost: f64 = by_model.iter().map(|m| m.cost_usd).sum();
        let daily_limit = self.daily_limit(project_id)?;
        Ok(DailyReport {
            date: today,
            project_id: project_id.to_string(),
            total_cost,
            daily_limit,
            remaining: daily_limit - total_cost,
            by_model,
        })
    }

    /// Per-day totals for the last seven UTC days, newest first.
    pub fn weekly_report(&self, project_id: &str) -> Result<Vec<DaySpend>> {
        let since = day_of(Utc::now() - Duration::days(6));
        let conn = self.db.conn();
        let mut stmt = conn
            .prepare(
                "SELECT substr(timestamp, 1, 10) AS day, SUM(cost_usd),
                        SUM(tokens_input + tokens_output), COUNT(*)
                 FROM token_usage
                 WHERE project_id = ?1 AND substr(timestamp, 1, 10) >= ?2
                 GROUP BY day ORDER BY day DESC",
            )
            .map_err(storage_err)?;
        stmt.query_map(params![project_id, since], |row| {
            Ok(DaySpend {
                day: row.get(0)?,
                total_cost: row.get(1)?,
                total_tokens: row.get::<_, i64>(2)? as u64,
                calls: row.get::<_, i64>(3)? as u64,
            })
        })
        .map_err(storage_err)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(storage_err)
    }
}
