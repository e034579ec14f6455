//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the controller with mock implementations.

use crate::db::{Checkpoint, CheckpointRef, Database, Payload, RunStatus, Step, StoreResult};
use crate::llm::{LlmError, LlmRequest, LlmResponse, LlmService};
use crate::tools::{ToolError, ToolRegistry};
use async_trait::async_trait;
use std::sync::Arc;

/// Durable checkpoint persistence
#[async_trait]
pub trait CheckpointSaver: Send + Sync {
    async fn put_checkpoint(
        &self,
        thread_id: &str,
        timestamp: &str,
        parent_timestamp: Option<&str>,
        state: &Payload,
        metadata: &Payload,
    ) -> StoreResult<CheckpointRef>;

    /// Exact checkpoint, or the latest when `timestamp` is `None`
    async fn get_checkpoint(
        &self,
        thread_id: &str,
        timestamp: Option<&str>,
    ) -> StoreResult<Option<Checkpoint>>;
}

/// Run/step audit trail
#[async_trait]
pub trait RunLog: Send + Sync {
    async fn start_run(&self, run_id: &str, thread_id: &str) -> StoreResult<()>;

    async fn finish_run(&self, run_id: &str, status: RunStatus) -> StoreResult<()>;

    async fn record_step(&self, step: &Step) -> StoreResult<()>;
}

/// Client for making LLM requests
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    #[allow(dead_code)] // API completeness
    fn model_id(&self) -> &str;
}

/// Named tool lookup and execution
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(&self, name: &str, input: &str) -> Result<String, ToolError>;

    fn tool_names(&self) -> Vec<String>;
}

/// Combined storage trait for convenience
pub trait Storage: CheckpointSaver + RunLog {}
impl<T: CheckpointSaver + RunLog> Storage for T {}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: CheckpointSaver + ?Sized> CheckpointSaver for Arc<T> {
    async fn put_checkpoint(
        &self,
        thread_id: &str,
        timestamp: &str,
        parent_timestamp: Option<&str>,
        state: &Payload,
        metadata: &Payload,
    ) -> StoreResult<CheckpointRef> {
        (**self)
            .put_checkpoint(thread_id, timestamp, parent_timestamp, state, metadata)
            .await
    }

    async fn get_checkpoint(
        &self,
        thread_id: &str,
        timestamp: Option<&str>,
    ) -> StoreResult<Option<Checkpoint>> {
        (**self).get_checkpoint(thread_id, timestamp).await
    }
}

#[async_trait]
impl<T: RunLog + ?Sized> RunLog for Arc<T> {
    async fn start_run(&self, run_id: &str, thread_id: &str) -> StoreResult<()> {
        (**self).start_run(run_id, thread_id).await
    }

    async fn finish_run(&self, run_id: &str, status: RunStatus) -> StoreResult<()> {
        (**self).finish_run(run_id, status).await
    }

    async fn record_step(&self, step: &Step) -> StoreResult<()> {
        (**self).record_step(step).await
    }
}

#[async_trait]
impl<T: LlmClient + ?Sized> LlmClient for Arc<T> {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        (**self).complete(request).await
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

#[async_trait]
impl<T: ToolInvoker + ?Sized> ToolInvoker for Arc<T> {
    async fn invoke(&self, name: &str, input: &str) -> Result<String, ToolError> {
        (**self).invoke(name, input).await
    }

    fn tool_names(&self) -> Vec<String> {
        (**self).tool_names()
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

#[async_trait]
impl CheckpointSaver for Database {
    async fn put_checkpoint(
        &self,
        thread_id: &str,
        timestamp: &str,
        parent_timestamp: Option<&str>,
        state: &Payload,
        metadata: &Payload,
    ) -> StoreResult<CheckpointRef> {
        Database::put_checkpoint(self, thread_id, timestamp, parent_timestamp, state, metadata)
            .await
    }

    async fn get_checkpoint(
        &self,
        thread_id: &str,
        timestamp: Option<&str>,
    ) -> StoreResult<Option<Checkpoint>> {
        Database::get_checkpoint(self, thread_id, timestamp).await
    }
}

#[async_trait]
impl RunLog for Database {
    async fn start_run(&self, run_id: &str, thread_id: &str) -> StoreResult<()> {
        Database::start_run(self, run_id, thread_id).await.map(|_| ())
    }

    async fn finish_run(&self, run_id: &str, status: RunStatus) -> StoreResult<()> {
        Database::finish_run(self, run_id, status).await
    }

    async fn record_step(&self, step: &Step) -> StoreResult<()> {
        Database::record_step(self, step).await
    }
}

/// Adapter to use a configured `LlmService` as `LlmClient`
pub struct ServiceLlmClient {
    service: Arc<dyn LlmService>,
}

impl ServiceLlmClient {
    pub fn new(service: Arc<dyn LlmService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl LlmClient for ServiceLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.service.complete(request).await
    }

    fn model_id(&self) -> &str {
        self.service.model_id()
    }
}

#[async_trait]
impl ToolInvoker for ToolRegistry {
    async fn invoke(&self, name: &str, input: &str) -> Result<String, ToolError> {
        ToolRegistry::invoke(self, name, input).await
    }

    fn tool_names(&self) -> Vec<String> {
        self.names()
    }
}
