//! # vigil-core
//!
//! Core types and primitives for the Vigil agent execution core.
//! This crate defines the shared vocabulary used by every other crate in the workspace.

pub mod error;
pub mod message;
pub mod tool;
pub mod types;

pub use error::{Result, VigilError};
pub use message::{Message, MessageContent, Role};
pub use tool::{ToolCall, ToolResult, ToolSchema};
pub use types::*;
