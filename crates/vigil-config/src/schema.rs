use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::str::FromStr;

use vigil_core::ModelTier;

/// Root configuration: maps to `vigil.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VigilConfig {
    pub agent: AgentConfig,
    pub models: ModelsConfig,
    pub budget: BudgetConfig,
    pub tools: ToolsConfig,
    pub safety: SafetyConfig,
    pub storage: StorageConfig,
    pub services: ServicesConfig,
    pub logging: LoggingConfig,
}

// ── Agent ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Iteration ceiling for a single run.
    pub max_iterations: u32,
    /// Maximum output tokens requested per model call.
    pub max_output_tokens: u32,
    /// System prompt injected at the start of every run.
    pub system_prompt: Option<String>,
    /// How many characters of the task are kept as an approval's context summary.
    pub context_summary_chars: usize,
    /// Project used when the caller does not name one.
    pub default_project: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            max_output_tokens: 4096,
            system_prompt: None,
            context_summary_chars: 200,
            default_project: "default".into(),
        }
    }
}

// ── Models ─────────────────────────────────────────────────────

/// One configured model tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    /// Provider id: `anthropic`, `openai`, `ollama` or `mock`.
    pub provider: String,
    /// Model name as the provider knows it.
    pub name: String,
    #[serde(default)]
    pub cost_per_1m_input: f64,
    #[serde(default)]
    pub cost_per_1m_output: f64,
    #[serde(default = "default_max_context")]
    pub max_context: u32,
}

fn default_max_context() -> u32 {
    200_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Tier used when a task type has no explicit route.
    pub default_tier: String,
    /// Tier name (`local`, `cheap`, `mid`, `premium`) → model.
    pub tiers: BTreeMap<String, ModelEntry>,
    /// Task type → tier name.
    pub task_routing: HashMap<String, String>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        let mut tiers = BTreeMap::new();
        tiers.insert(
            "cheap".to_string(),
            ModelEntry {
                provider: "anthropic".into(),
                name: "claude-3-5-haiku-20241022".into(),
                cost_per_1m_input: 0.80,
                cost_per_1m_output: 4.00,
                max_context: 200_000,
            },
        );
        tiers.insert(
            "mid".to_string(),
            ModelEntry {
                provider: "anthropic".into(),
                name: "claude-sonnet-4-20250514".into(),
                cost_per_1m_input: 3.00,
                cost_per_1m_output: 15.00,
                max_context: 200_000,
            },
        );
        Self {
            default_tier: "cheap".into(),
            tiers,
            task_routing: HashMap::new(),
        }
    }
}

impl ModelsConfig {
    /// Configured tiers parsed into [`ModelTier`]s. Entries with unknown
    /// tier names are skipped (validation reports them).
    pub fn parsed_tiers(&self) -> BTreeMap<ModelTier, ModelEntry> {
        self.tiers
            .iter()
            .filter_map(|(k, v)| ModelTier::from_str(k).ok().map(|t| (t, v.clone())))
            .collect()
    }
}

// ── Budget ─────────────────────────────────────────────────────

/// Price pair in USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceEntry {
    pub input: f64,
    pub output: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectBudget {
    pub daily_limit_usd: f64,
    #[serde(default)]
    pub monthly_limit_usd: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Daily ceiling for projects without a row in the budgets table.
    pub default_daily_limit_usd: f64,
    pub default_monthly_limit_usd: f64,
    /// Price applied to models missing from the price table.
    pub fallback_price: PriceEntry,
    /// Extra or overriding per-model prices.
    pub pricing: HashMap<String, PriceEntry>,
    /// Per-project limits written to the budgets table at startup.
    pub projects: HashMap<String, ProjectBudget>,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            default_daily_limit_usd: 10.0,
            default_monthly_limit_usd: 200.0,
            fallback_price: PriceEntry {
                input: 3.0,
                output: 15.0,
            },
            pricing: HashMap::new(),
            projects: HashMap::new(),
        }
    }
}

// ── Tools ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectTools {
    pub allowed_tools: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Tool names that must pass the approval gate before running.
    pub approval_required: Vec<String>,
    /// Root directory for the built-in file capabilities.
    pub memory_dir: PathBuf,
    /// Per-project allow-lists. A project with no entry sees no tools.
    pub projects: HashMap<String, ProjectTools>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            approval_required: vec!["write_file".into()],
            memory_dir: PathBuf::from("data/memory"),
            projects: HashMap::new(),
        }
    }
}

impl ToolsConfig {
    /// Allow-list for a project; empty when the project is unknown.
    pub fn allowed_for(&self, project: &str) -> Vec<String> {
        self.projects
            .get(project)
            .map(|p| p.allowed_tools.clone())
            .unwrap_or_default()
    }
}

// ── Safety ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Marker file whose existence halts every run.
    pub kill_file: PathBuf,
    /// Optional URL that receives `{"text": ...}` for high-severity audit entries.
    pub alert_webhook: Option<String>,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            kill_file: PathBuf::from("data/.KILL_SWITCH"),
            alert_webhook: None,
        }
    }
}

// ── Storage ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/vigil.db"),
        }
    }
}

// ── Services ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    /// Base URL for OpenAI-compatible endpoints.
    pub openai_base_url: Option<String>,
    pub ollama_host: Option<String>,
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// "pretty", "json" or "compact".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

// ── Validation ─────────────────────────────────────────────────

/// A non-fatal (or fatal, for `Error`) finding from [`VigilConfig::validate`].
#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.severity {
            WarningSeverity::Error => "error",
            WarningSeverity::Warning => "warning",
            WarningSeverity::Info => "info",
        };
        write!(f, "[{}] {}: {}", label, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, "\n   ↳ {}", h)?;
        }
        Ok(())
    }
}

pub const KNOWN_PROVIDERS: &[&str] = &["anthropic", "openai", "ollama", "mock"];

impl VigilConfig {
    /// Validate the config and return a list of warnings.
    /// Returns `Err` with all messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        // ── Agent ───
        if self.agent.max_iterations == 0 {
            warnings.push(ConfigWarning {
                field: "agent.max_iterations".into(),
                message: "max_iterations is 0, no run could ever call a model".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 20".into()),
            });
        } else if self.agent.max_iterations > 100 {
            warnings.push(ConfigWarning {
                field: "agent.max_iterations".into(),
                message: format!("max_iterations {} is unusually high", self.agent.max_iterations),
                severity: WarningSeverity::Warning,
                hint: Some("Long-running loops compound spend; consider <= 50".into()),
            });
        }
        if self.agent.max_output_tokens == 0 {
            warnings.push(ConfigWarning {
                field: "agent.max_output_tokens".into(),
                message: "max_output_tokens is 0, the model cannot answer".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 4096".into()),
            });
        }

        // ── Models ───
        let mut configured = Vec::new();
        for (tier, entry) in &self.models.tiers {
            let field = format!("models.tiers.{}", tier);
            match ModelTier::from_str(tier) {
                Ok(t) => configured.push(t),
                Err(_) => warnings.push(ConfigWarning {
                    field: field.clone(),
                    message: format!("unknown tier '{}'", tier),
                    severity: WarningSeverity::Error,
                    hint: Some("Valid tiers: local, cheap, mid, premium".into()),
                }),
            }
            if !KNOWN_PROVIDERS.contains(&entry.provider.as_str()) {
                warnings.push(ConfigWarning {
                    field: format!("{}.provider", field),
                    message: format!("unknown provider '{}'", entry.provider),
                    severity: WarningSeverity::Error,
                    hint: Some(format!("Valid providers: {}", KNOWN_PROVIDERS.join(", "))),
                });
            }
            if entry.name.is_empty() {
                warnings.push(ConfigWarning {
                    field: format!("{}.name", field),
                    message: "model name is empty".into(),
                    severity: WarningSeverity::Error,
                    hint: None,
                });
            }
            if entry.cost_per_1m_input < 0.0 || entry.cost_per_1m_output < 0.0 {
                warnings.push(ConfigWarning {
                    field: field.clone(),
                    message: "negative price".into(),
                    severity: WarningSeverity::Error,
                    hint: None,
                });
            }
        }
        if self.models.tiers.is_empty() {
            warnings.push(ConfigWarning {
                field: "models.tiers".into(),
                message: "no model tiers configured".into(),
                severity: WarningSeverity::Error,
                hint: Some("Add at least one [models.tiers.cheap] entry".into()),
            });
        }
        match ModelTier::from_str(&self.models.default_tier) {
            Ok(t) if !configured.contains(&t) && !configured.is_empty() => {
                warnings.push(ConfigWarning {
                    field: "models.default_tier".into(),
                    message: format!(
                        "default tier '{}' is not configured, the cheapest configured tier is used",
                        t
                    ),
                    severity: WarningSeverity::Warning,
                    hint: None,
                });
            }
            Ok(_) => {}
            Err(_) => warnings.push(ConfigWarning {
                field: "models.default_tier".into(),
                message: format!("unknown tier '{}'", self.models.default_tier),
                severity: WarningSeverity::Error,
                hint: Some("Valid tiers: local, cheap, mid, premium".into()),
            }),
        }
        for (task, tier) in &self.models.task_routing {
            if ModelTier::from_str(tier).is_err() {
                warnings.push(ConfigWarning {
                    field: format!("models.task_routing.{}", task),
                    message: format!("unknown tier '{}'", tier),
                    severity: WarningSeverity::Error,
                    hint: Some("Valid tiers: local, cheap, mid, premium".into()),
                });
            }
        }

        // ── Budget ───
        let b = &self.budget;
        if b.default_daily_limit_usd < 0.0 {
            warnings.push(ConfigWarning {
                field: "budget.default_daily_limit_usd".into(),
                message: "negative daily limit".into(),
                severity: WarningSeverity::Error,
                hint: None,
            });
        } else if b.default_daily_limit_usd == 0.0 {
            warnings.push(ConfigWarning {
                field: "budget.default_daily_limit_usd".into(),
                message: "daily limit is 0, every run will be denied admission".into(),
                severity: WarningSeverity::Warning,
                hint: None,
            });
        }
        if b.fallback_price.input < 0.0 || b.fallback_price.output < 0.0 {
            warnings.push(ConfigWarning {
                field: "budget.fallback_price".into(),
                message: "negative price".into(),
                severity: WarningSeverity::Error,
                hint: None,
            });
        }
        for (model, price) in &b.pricing {
            if price.input < 0.0 || price.output < 0.0 {
                warnings.push(ConfigWarning {
                    field: format!("budget.pricing.{}", model),
                    message: "negative price".into(),
                    severity: WarningSeverity::Error,
                    hint: None,
                });
            }
        }
        for (project, limits) in &b.projects {
            if limits.daily_limit_usd < 0.0 {
                warnings.push(ConfigWarning {
                    field: format!("budget.projects.{}.daily_limit_usd", project),
                    message: "negative daily limit".into(),
                    severity: WarningSeverity::Error,
                    hint: None,
                });
            }
        }

        // ── Tools ───
        for name in &self.tools.approval_required {
            let listed = self
                .tools
                .projects
                .values()
                .any(|p| p.allowed_tools.contains(name));
            if !listed && !self.tools.projects.is_empty() {
                warnings.push(ConfigWarning {
                    field: "tools.approval_required".into(),
                    message: format!("'{}' requires approval but no project allows it", name),
                    severity: WarningSeverity::Info,
                    hint: None,
                });
            }
        }

        // ── Logging ───
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_formats.join(", "))),
            });
        }

        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();

        if !errors.is_empty() {
            return Err(format!("Configuration errors:\n  • {}", errors.join("\n  • ")));
        }

        Ok(warnings)
    }
}
