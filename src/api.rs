//! HTTP API for the meta-prompter
//!
//! Thin layer over the turn controller and the checkpoint store.

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;
pub use types::ToolInfo;

use crate::db::Database;
use crate::runtime::ProductionController;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub controller: ProductionController,
    pub db: Database,
    pub tools: Arc<Vec<ToolInfo>>,
}

impl AppState {
    pub fn new(controller: ProductionController, db: Database, tools: Vec<ToolInfo>) -> Self {
        Self {
            controller,
            db,
            tools: Arc::new(tools),
        }
    }
}
