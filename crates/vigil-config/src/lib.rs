//! # vigil-config
//!
//! Configuration system for the Vigil runtime. Reads `vigil.toml` and applies
//! `VIGIL_*` environment overrides on top.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::VigilConfig;
pub use schema::{
    AgentConfig, BudgetConfig, ConfigWarning, LoggingConfig, ModelEntry, ModelsConfig, PriceEntry,
    ProjectBudget, ProjectTools, SafetyConfig, ServicesConfig, StorageConfig, ToolsConfig,
    WarningSeverity,
};
