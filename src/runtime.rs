//! Runtime for executing conversations
//!
//! The turn controller drives planner and expert nodes over pluggable
//! storage, model, and tool implementations.

mod executor;
mod nodes;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::{AdvanceStream, AgentConfig, AgentError, StepUpdate, TurnController, DEFAULT_MAX_TURNS};
pub use traits::*;

use crate::db::Database;
use crate::tools::ToolRegistry;

/// Type alias for production controller with concrete implementations
pub type ProductionController = TurnController<Database, ServiceLlmClient, ToolRegistry>;
