//! # vigil-runtime
//!
//! The safety-gated orchestration loop. [`AgentEngine`] drives a bounded
//! conversation with the model gateway, checks every requested tool against
//! the run's allow-list, hands approval-gated tools to the approval queue and
//! exits, and re-checks the kill switch and budget on every iteration.
//! [`Vigil`] wires the engine and its stores from configuration.

pub mod context;
pub mod engine;
pub mod registry;
pub mod system;
pub mod tools;

pub use context::RunContext;
pub use engine::{Admission, AgentEngine, DenyReason, EngineSettings, ResumeOutcome, RunOutcome};
pub use registry::{Capability, CapabilityRegistry, FnCapability, ToolDescriptor};
pub use system::Vigil;
pub use tools::{MemoryDir, memory_tools};
