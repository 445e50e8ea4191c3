//! Built-in tools shipped with the server so tool-shaped requests work out
//! of the box. Everything else arrives through the discovery directory.

pub mod calculator;
pub mod clock;

use std::sync::Arc;

use crate::error::Result;
use crate::registry::{ToolRegistry, ToolStatus};

/// Register every built-in tool at its current version.
pub fn register_builtins(registry: &ToolRegistry) -> Result<()> {
    registry.register(
        Arc::new(calculator::Calculator),
        calculator::VERSION,
        ToolStatus::Stable,
        false,
    )?;
    registry.register(Arc::new(clock::Clock), clock::VERSION, ToolStatus::Stable, false)?;
    Ok(())
}
