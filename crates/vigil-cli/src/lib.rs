//! # vigil-cli
//!
//! Operator console for the Vigil agent execution core.
//!
//! ## Commands
//!
//! - `vigil run`: Run one task through the engine
//! - `vigil approvals`: Review and decide queued actions
//! - `vigil kill`: Turn the kill switch on or off
//! - `vigil budget`: Spend reports and per-project ceilings
//! - `vigil audit`: Recent audit entries and daily summaries
//! - `vigil models`: Configured tiers and provider health
//! - `vigil config`: Show the effective configuration

pub mod commands;

pub use commands::Cli;
