#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;
    use vigil_config::ConfigLoader;
    use vigil_config::schema::*;
    use vigil_core::ModelTier;

    // ── Default tests ──────────────────────────────────────────

    #[test]
    fn test_vigil_config_defaults() {
        let config = VigilConfig::default();
        assert_eq!(config.agent.max_iterations, 20);
        assert_eq!(config.agent.max_output_tokens, 4096);
        assert_eq!(config.agent.context_summary_chars, 200);
        assert_eq!(config.budget.default_daily_limit_usd, 10.0);
        assert_eq!(config.budget.fallback_price, PriceEntry { input: 3.0, output: 15.0 });
        assert_eq!(config.safety.kill_file.to_str(), Some("data/.KILL_SWITCH"));
        assert_eq!(config.storage.db_path.to_str(), Some("data/vigil.db"));
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_default_models_are_cheap_and_mid() {
        let models = ModelsConfig::default();
        assert_eq!(models.default_tier, "cheap");
        let tiers = models.parsed_tiers();
        assert_eq!(tiers.len(), 2);
        assert_eq!(tiers[&ModelTier::Cheap].name, "claude-3-5-haiku-20241022");
        assert_eq!(tiers[&ModelTier::Mid].name, "claude-sonnet-4-20250514");
        assert_eq!(tiers[&ModelTier::Mid].cost_per_1m_output, 15.0);
    }

    #[test]
    fn test_defaults_validate_cleanly() {
        let warnings = VigilConfig::default().validate().unwrap();
        assert!(warnings.iter().all(|w| w.severity != WarningSeverity::Error));
    }

    #[test]
    fn test_unknown_project_has_no_tools() {
        let tools = ToolsConfig::default();
        assert!(tools.allowed_for("nobody").is_empty());
        assert_eq!(tools.approval_required, vec!["write_file".to_string()]);
    }

    // ── Parsing tests ──────────────────────────────────────────

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let loader = ConfigLoader::from_toml(
            r#"
[agent]
max_iterations = 5
"#,
        )
        .unwrap();
        let config = loader.get();
        assert_eq!(config.agent.max_iterations, 5);
        assert_eq!(config.agent.max_output_tokens, 4096);
        assert_eq!(config.models.tiers.len(), 2);
    }

    #[test]
    fn test_full_toml() {
        let loader = ConfigLoader::from_toml(
            r#"
[models]
default_tier = "local"

[models.tiers.local]
provider = "ollama"
name = "llama3.2:8b"

[models.tiers.premium]
provider = "anthropic"
name = "claude-opus-4-5-20251101"
cost_per_1m_input = 15.0
cost_per_1m_output = 75.0

[models.task_routing]
research = "premium"

[budget.pricing]
"my-model" = { input = 1.0, output = 2.0 }

[budget.projects.blog]
daily_limit_usd = 2.5

[tools]
approval_required = ["post_tweet"]

[tools.projects.blog]
allowed_tools = ["read_file", "post_tweet"]
"#,
        )
        .unwrap();
        let config = loader.config();
        let tiers = config.models.parsed_tiers();
        assert_eq!(tiers[&ModelTier::Local].max_context, 200_000);
        assert_eq!(tiers[&ModelTier::Local].cost_per_1m_input, 0.0);
        assert_eq!(tiers[&ModelTier::Premium].cost_per_1m_output, 75.0);
        assert_eq!(config.models.task_routing["research"], "premium");
        assert_eq!(config.budget.pricing["my-model"].output, 2.0);
        assert_eq!(config.budget.projects["blog"].daily_limit_usd, 2.5);
        assert!(config.budget.projects["blog"].monthly_limit_usd.is_none());
        assert_eq!(
            config.tools.allowed_for("blog"),
            vec!["read_file".to_string(), "post_tweet".to_string()]
        );
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = ConfigLoader::from_toml("[agent\nmax_iterations = ").err().unwrap();
        assert!(matches!(err, vigil_core::VigilError::Config(_)));
    }

    // ── Validation tests ───────────────────────────────────────

    #[test]
    fn test_zero_iterations_is_error() {
        let mut config = VigilConfig::default();
        config.agent.max_iterations = 0;
        let err = config.validate().unwrap_err();
        assert!(err.contains("agent.max_iterations"));
    }

    #[test]
    fn test_unknown_provider_is_error() {
        let mut config = VigilConfig::default();
        config.models.tiers.get_mut("cheap").unwrap().provider = "skynet".into();
        let err = config.validate().unwrap_err();
        assert!(err.contains("models.tiers.cheap.provider"));
    }

    #[test]
    fn test_unknown_tier_name_is_error() {
        let mut config = VigilConfig::default();
        let entry = config.models.tiers["cheap"].clone();
        config.models.tiers.insert("ultra".into(), entry);
        assert!(config.validate().unwrap_err().contains("models.tiers.ultra"));
    }

    #[test]
    fn test_negative_price_is_error() {
        let mut config = VigilConfig::default();
        config
            .budget
            .pricing
            .insert("x".into(), PriceEntry { input: -1.0, output: 1.0 });
        assert!(config.validate().unwrap_err().contains("budget.pricing.x"));
    }

    #[test]
    fn test_bad_task_route_is_error() {
        let mut config = VigilConfig::default();
        config.models.task_routing.insert("chat".into(), "huge".into());
        assert!(config.validate().unwrap_err().contains("models.task_routing.chat"));
    }

    #[test]
    fn test_unconfigured_default_tier_is_warning() {
        let mut config = VigilConfig::default();
        config.models.default_tier = "premium".into();
        let warnings = config.validate().unwrap();
        assert!(
            warnings
                .iter()
                .any(|w| w.field == "models.default_tier" && w.severity == WarningSeverity::Warning)
        );
    }

    #[test]
    fn test_no_tiers_is_error() {
        let mut config = VigilConfig::default();
        config.models.tiers.clear();
        assert!(config.validate().unwrap_err().contains("models.tiers"));
    }

    #[test]
    fn test_warning_display() {
        let w = ConfigWarning {
            field: "logging.format".into(),
            message: "unknown log format 'xml'".into(),
            severity: WarningSeverity::Warning,
            hint: Some("Valid values: pretty, json, compact".into()),
        };
        let s = w.to_string();
        assert!(s.starts_with("[warning] logging.format"));
        assert!(s.contains("↳ Valid values"));
    }

    // ── Env override tests ─────────────────────────────────────

    #[test]
    fn test_overrides_apply() {
        let mut env = HashMap::new();
        env.insert("VIGIL_DAILY_BUDGET", "2.5");
        env.insert("VIGIL_MAX_ITERATIONS", "7");
        env.insert("VIGIL_KILL_FILE", "/tmp/kill");
        env.insert("ANTHROPIC_API_KEY", "sk-env");
        let config = ConfigLoader::apply_overrides(VigilConfig::default(), |k| {
            env.get(k).map(|v| v.to_string())
        });
        assert_eq!(config.budget.default_daily_limit_usd, 2.5);
        assert_eq!(config.agent.max_iterations, 7);
        assert_eq!(config.safety.kill_file.to_str(), Some("/tmp/kill"));
        assert_eq!(config.services.anthropic_api_key.as_deref(), Some("sk-env"));
    }

    #[test]
    fn test_file_api_key_beats_env() {
        let mut config = VigilConfig::default();
        config.services.anthropic_api_key = Some("sk-file".into());
        let config = ConfigLoader::apply_overrides(config, |k| {
            (k == "ANTHROPIC_API_KEY").then(|| "sk-env".to_string())
        });
        assert_eq!(config.services.anthropic_api_key.as_deref(), Some("sk-file"));
    }

    #[test]
    fn test_unparsable_override_ignored() {
        let config = ConfigLoader::apply_overrides(VigilConfig::default(), |k| {
            (k == "VIGIL_MAX_ITERATIONS").then(|| "lots".to_string())
        });
        assert_eq!(config.agent.max_iterations, 20);
    }

    // ── Loader tests ───────────────────────────────────────────

    #[test]
    fn test_config_loader_with_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("vigil.toml");
        let mut f = std::fs::File::create(&config_path).unwrap();
        writeln!(
            f,
            r#"
[agent]
max_output_tokens = 1024
default_project = "blog"

[storage]
db_path = "/var/lib/vigil/vigil.db"
"#
        )
        .unwrap();

        let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();
        let config = loader.get();
        assert_eq!(config.agent.max_output_tokens, 1024);
        assert_eq!(config.agent.default_project, "blog");
        assert_eq!(loader.path(), config_path.as_path());
    }

    #[test]
    fn test_config_loader_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::load(Some(dir.path().join("absent.toml").as_path())).unwrap();
        assert_eq!(loader.get().models.default_tier, "cheap");
    }

    #[test]
    fn test_config_loader_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("vigil.toml");
        std::fs::write(&config_path, "[agent]\nmax_output_tokens = 0\n").unwrap();
        assert!(ConfigLoader::load(Some(config_path.as_path())).is_err());
    }

    #[test]
    fn test_explicit_path_wins() {
        let p = std::path::Path::new("/etc/vigil/custom.toml");
        assert_eq!(ConfigLoader::resolve_path(Some(p)), p.to_path_buf());
    }

    #[test]
    fn test_config_json_roundtrip() {
        let config = VigilConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: VigilConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.agent.max_iterations, config.agent.max_iterations);
        assert_eq!(back.models.tiers, config.models.tiers);
    }
}
