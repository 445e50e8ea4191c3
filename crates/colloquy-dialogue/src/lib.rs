//! The per-request dialogue pipeline: resolve session, commit the inbound
//! turn, assemble context, optionally invoke a tool, generate the reply,
//! and commit it — degrading gracefully when the store or the model
//! backend is unavailable.

pub mod error;
pub mod orchestrator;

pub use error::{DialogueError, Result};
pub use orchestrator::{
    DialogueOrchestrator, OrchestratorConfig, ProcessOutcome, ProcessRequest,
};
