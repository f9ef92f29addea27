use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use std::path::PathBuf;

use vigil_config::{ConfigLoader, VigilConfig};
use vigil_core::{Result, VigilError};

mod approvals;
mod ops;
mod run;

/// Vigil: safety-gated agent execution core
#[derive(Parser)]
#[command(name = "vigil", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to vigil.toml config file
    #[arg(short, long, global = true, env = "VIGIL_CONFIG")]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one task through the engine
    Run {
        /// The task text
        task: String,
        /// Project to charge and to take the allow-list from
        #[arg(short, long)]
        project: Option<String>,
        /// Agent id recorded with usage and audit entries
        #[arg(short, long, default_value = "cli")]
        agent: String,
        /// Task type used for model routing
        #[arg(short, long, default_value = "chat")]
        task_type: String,
        /// Print the run context as JSON after the outcome
        #[arg(long)]
        json: bool,
    },
    /// Review and decide queued actions
    Approvals {
        #[command(subcommand)]
        action: ApprovalAction,
    },
    /// Turn the kill switch on or off, or show its state
    Kill {
        #[command(subcommand)]
        action: KillAction,
    },
    /// Spend reports and per-project ceilings
    Budget {
        #[command(subcommand)]
        action: BudgetAction,
    },
    /// Read the audit log
    Audit {
        #[command(subcommand)]
        action: AuditAction,
    },
    /// List configured model tiers and check provider health
    Models {
        /// Skip the provider health checks
        #[arg(long)]
        offline: bool,
    },
    /// Show the effective configuration
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show version and build info
    Version,
    /// Generate shell completions for bash, zsh, or fish
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum ApprovalAction {
    /// List requests (pending by default)
    List {
        /// Filter by status: pending, approved, rejected, executed, all
        #[arg(short, long, default_value = "pending")]
        status: String,
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Show the full preview of one request
    Show { id: i64 },
    /// Approve a request and execute it
    Approve {
        id: i64,
        /// Let the agent continue the conversation with the result
        #[arg(long = "continue")]
        continue_run: bool,
    },
    /// Execute a request that is already approved
    Run {
        id: i64,
        /// Let the agent continue the conversation with the result
        #[arg(long = "continue")]
        continue_run: bool,
    },
    /// Reject a request; it will never execute
    Reject { id: i64 },
}

#[derive(Subcommand)]
enum KillAction {
    /// Halt every run at its next check
    On {
        /// Reason recorded in the marker file
        #[arg(default_value = "Manual kill via console")]
        reason: String,
    },
    /// Release the kill switch
    Off {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Show whether the system is halted
    Status,
}

#[derive(Subcommand)]
enum BudgetAction {
    /// Today's spend by model
    Show {
        #[arg(short, long)]
        project: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Set a project's daily and monthly ceilings
    Set {
        project: String,
        /// Daily ceiling in USD
        daily: f64,
        /// Monthly ceiling in USD (defaults to [budget].default_monthly_limit_usd)
        monthly: Option<f64>,
    },
    /// Per-day totals for the last seven days
    Week {
        #[arg(short, long)]
        project: Option<String>,
    },
}

#[derive(Subcommand)]
enum AuditAction {
    /// Most recent entries, newest first
    Recent {
        #[arg(short, long)]
        project: Option<String>,
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Today's counts for a project
    Summary {
        #[arg(short, long)]
        project: Option<String>,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        // Load config first so we can use it for log format
        let loader = ConfigLoader::load(self.config.as_deref())?;
        let config = loader.get();

        // Resolve log level: --verbose > --quiet > --log-level > config
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            self.log_level
                .as_deref()
                .unwrap_or(config.logging.level.as_str())
        };
        init_tracing(log_level, &config.logging.format);

        let project = |p: Option<String>| p.unwrap_or_else(|| config.agent.default_project.clone());

        match self.command {
            Commands::Run {
                task,
                project,
                agent,
                task_type,
                json,
            } => run::cmd_run(config, task, project, agent, task_type, json).await,
            Commands::Approvals { action } => approvals::cmd_approvals(config, action).await,
            Commands::Kill { action } => ops::cmd_kill(&config, action).await,
            Commands::Budget { action } => match action {
                BudgetAction::Show { project: p, json } => {
                    ops::cmd_budget_show(&config, &project(p), json)
                }
                BudgetAction::Set {
                    project: p,
                    daily,
                    monthly,
                } => ops::cmd_budget_set(
                    &config,
                    &p,
                    daily,
                    monthly.unwrap_or(config.budget.default_monthly_limit_usd),
                ),
                BudgetAction::Week { project: p } => ops::cmd_budget_week(&config, &project(p)),
            },
            Commands::Audit { action } => match action {
                AuditAction::Recent {
                    project: p,
                    limit,
                    json,
                } => ops::cmd_audit_recent(&config, p.as_deref(), limit, json),
                AuditAction::Summary { project: p } => {
                    ops::cmd_audit_summary(&config, &project(p))
                }
            },
            Commands::Models { offline } => run::cmd_models(&config, offline).await,
            Commands::Config { json } => Self::cmd_config(&config, loader.path(), json),
            Commands::Version => Self::cmd_version(),
            Commands::Completions { shell } => Self::cmd_completions(shell),
        }
    }

    fn cmd_config(config: &VigilConfig, path: &std::path::Path, json: bool) -> Result<()> {
        if json {
            println!("{}", serde_json::to_string_pretty(config)?);
        } else {
            println!("# {}", path.display());
            println!(
                "{}",
                toml::to_string_pretty(config).map_err(|e| VigilError::Config(e.to_string()))?
            );
        }
        Ok(())
    }

    fn cmd_version() -> Result<()> {
        println!("Vigil v{}", env!("CARGO_PKG_VERSION"));
        println!("   Target: {}", std::env::consts::ARCH);
        println!("   OS: {}", std::env::consts::OS);
        #[cfg(debug_assertions)]
        println!("   Profile: debug");
        #[cfg(not(debug_assertions))]
        println!("   Profile: release");
        Ok(())
    }

    fn cmd_completions(shell: Shell) -> Result<()> {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "vigil", &mut std::io::stdout());
        Ok(())
    }
}

fn init_tracing(level: &str, format: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        "json" => builder.json().with_target(true).init(),
        "compact" => builder.compact().with_target(false).init(),
        _ => builder.with_target(false).init(),
    }
}

/// Truncate to `max` characters on one line, appending "..." if cut.
pub(crate) fn one_line(s: &str, max: usize) -> String {
    let flat = s.replace('\n', " ");
    if flat.chars().count() <= max {
        flat
    } else {
        format!("{}...", flat.chars().take(max).collect::<String>())
    }
}
