use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::schema::VigilConfig;

/// Loads the Vigil configuration from disk and the environment.
pub struct ConfigLoader {
    config: VigilConfig,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > VIGIL_CONFIG env > ./vigil.toml
    /// > ~/.vigil/vigil.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("VIGIL_CONFIG") {
            return PathBuf::from(p);
        }
        let local = PathBuf::from("vigil.toml");
        if local.exists() {
            return local;
        }
        dirs::home_dir()
            .map(|h| h.join(".vigil").join("vigil.toml"))
            .unwrap_or(local)
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> vigil_core::Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            let raw = std::fs::read_to_string(&config_path)?;
            Self::parse(&raw, &config_path)?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            VigilConfig::default()
        };

        let config = Self::apply_env_overrides(config);
        Self::check(&config)?;

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Build a loader from an in-memory TOML document. Env overrides are not
    /// applied.
    pub fn from_toml(raw: &str) -> vigil_core::Result<Self> {
        let config_path = PathBuf::from("<inline>");
        let config = Self::parse(raw, &config_path)?;
        Self::check(&config)?;
        Ok(Self {
            config,
            config_path,
        })
    }

    /// Snapshot of the loaded config.
    pub fn get(&self) -> VigilConfig {
        self.config.clone()
    }

    pub fn config(&self) -> &VigilConfig {
        &self.config
    }

    /// Path the config was read from (or would have been).
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    fn parse(raw: &str, path: &Path) -> vigil_core::Result<VigilConfig> {
        toml::from_str::<VigilConfig>(raw).map_err(|e| {
            vigil_core::VigilError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    fn check(config: &VigilConfig) -> vigil_core::Result<()> {
        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
                Ok(())
            }
            Err(e) => Err(vigil_core::VigilError::Config(e)),
        }
    }

    /// Apply env var overrides (VIGIL_LOG_LEVEL, VIGIL_DAILY_BUDGET, etc.)
    pub fn apply_env_overrides(config: VigilConfig) -> VigilConfig {
        Self::apply_overrides(config, |k| std::env::var(k).ok())
    }

    /// Apply overrides from an arbitrary lookup. `apply_env_overrides` uses
    /// the process environment.
    pub fn apply_overrides<F>(mut config: VigilConfig, lookup: F) -> VigilConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("VIGIL_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Some(v) = lookup("VIGIL_DAILY_BUDGET") {
            match v.parse::<f64>() {
                Ok(budget) => config.budget.default_daily_limit_usd = budget,
                Err(_) => warn!(value = %v, "ignoring unparsable VIGIL_DAILY_BUDGET"),
            }
        }
        if let Some(v) = lookup("VIGIL_DB_PATH") {
            config.storage.db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("VIGIL_KILL_FILE") {
            config.safety.kill_file = PathBuf::from(v);
        }
        if let Some(v) = lookup("VIGIL_MAX_ITERATIONS") {
            match v.parse::<u32>() {
                Ok(n) => config.agent.max_iterations = n,
                Err(_) => warn!(value = %v, "ignoring unparsable VIGIL_MAX_ITERATIONS"),
            }
        }
        // API keys: the config file wins, env is the fallback.
        if config.services.anthropic_api_key.is_none() {
            config.services.anthropic_api_key = lookup("ANTHROPIC_API_KEY");
        }
        if config.services.openai_api_key.is_none() {
            config.services.openai_api_key = lookup("OPENAI_API_KEY");
        }
        if config.services.ollama_host.is_none() {
            config.services.ollama_host = lookup("OLLAMA_HOST");
        }
        config
    }
}
