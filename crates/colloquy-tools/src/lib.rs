//! Tool system: registry, version selection, discovery, and the hybrid
//! invocation decision.
//!
//! Tools are opaque `run(args) -> string` capabilities with a declared
//! name, description, usage line, and trigger patterns. The registry owns
//! versioned entries; the invoker decides per user utterance whether any
//! tool should run, executes it, and caches results.

pub mod builtin;
pub mod cache;
pub mod chain;
pub mod discovery;
pub mod error;
pub mod invoker;
pub mod registry;
pub mod tool;

pub use error::{Result, ToolError};
pub use invoker::{Invocation, InvokerConfig, ToolInvoker};
pub use registry::{ToolRegistry, ToolStatus};
pub use tool::{Modality, Tool, ToolDescriptor, ToolKind};
