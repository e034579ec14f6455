//! Mock implementations for testing
//!
//! These mocks enable controller testing without real I/O.

use super::traits::*;
use crate::db::{Checkpoint, CheckpointRef, Payload, RunStatus, Step, StoreError, StoreResult};
use crate::llm::{LlmError, LlmRequest, LlmResponse};
use crate::tools::ToolError;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::Semaphore;

// ============================================================================
// Mock LLM Client
// ============================================================================

/// Mock LLM client that returns queued responses
pub struct MockLlmClient {
    responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    /// Returned once the queue is empty; `None` means a network error
    fallback: Option<String>,
    /// When set, each request waits for a permit
    gate: Option<Semaphore>,
    model_id: String,
    requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlmClient {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: None,
            gate: None,
            model_id: model_id.into(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer every request past the queue with `text`
    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(text.into());
        self
    }

    /// Block each request until `release` hands out a permit
    pub fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    pub fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub fn queue_response(&self, response: LlmResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    pub fn queue_text(&self, text: &str) {
        self.queue_response(LlmResponse::from_text(text));
    }

    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        self.requests.lock().unwrap().push(request.clone());
        let queued = self.responses.lock().unwrap().pop_front();
        queued.unwrap_or_else(|| match &self.fallback {
            Some(text) => Ok(LlmResponse::from_text(text.clone())),
            None => Err(LlmError::network("No mock response queued")),
        })
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// ============================================================================
// Mock Tool Invoker
// ============================================================================

/// Mock tool invoker with predefined outputs
#[derive(Default)]
pub struct MockToolInvoker {
    outputs: Vec<(String, Result<String, String>)>,
    invocations: Mutex<Vec<(String, String)>>,
}

impl MockToolInvoker {
    pub fn new() -> Self {
        Self {
            outputs: Vec::new(),
            invocations: Mutex::new(Vec::new()),
        }
    }

    pub fn with_tool(mut self, name: &str, output: Result<&str, &str>) -> Self {
        self.outputs.push((
            name.to_string(),
            output.map(str::to_string).map_err(str::to_string),
        ));
        self
    }

    pub fn recorded_invocations(&self) -> Vec<(String, String)> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolInvoker for MockToolInvoker {
    async fn invoke(&self, name: &str, input: &str) -> Result<String, ToolError> {
        let (_, output) = self
            .outputs
            .iter()
            .find(|(n, _)| n == name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        self.invocations
            .lock()
            .unwrap()
            .push((name.to_string(), input.to_string()));
        output.clone().map_err(|e| ToolError::Execution {
            tool: name.to_string(),
            source: e.into(),
        })
    }

    fn tool_names(&self) -> Vec<String> {
        self.outputs.iter().map(|(n, _)| n.clone()).collect()
    }
}

// ============================================================================
// In-Memory Storage
// ============================================================================

/// Storage backed by maps, with switchable write failures
#[derive(Default)]
pub struct InMemoryStorage {
    checkpoints: Mutex<BTreeMap<(String, String), Checkpoint>>,
    runs: Mutex<HashMap<String, RunStatus>>,
    steps: Mutex<Vec<Step>>,
    fail_puts: AtomicBool,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `put_checkpoint` fail as if the pool timed out
    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Seed a checkpoint directly
    pub fn insert(&self, checkpoint: Checkpoint) {
        self.checkpoints.lock().unwrap().insert(
            (checkpoint.thread_id.clone(), checkpoint.timestamp.clone()),
            checkpoint,
        );
    }

    /// Checkpoints of a thread, newest first
    pub fn checkpoints(&self, thread_id: &str) -> Vec<Checkpoint> {
        self.checkpoints
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.thread_id == thread_id)
            .rev()
            .cloned()
            .collect()
    }

    pub fn run_status(&self, run_id: &str) -> Option<RunStatus> {
        self.runs.lock().unwrap().get(run_id).copied()
    }

    pub fn steps(&self) -> Vec<Step> {
        self.steps.lock().unwrap().clone()
    }
}

#[async_trait]
impl CheckpointSaver for InMemoryStorage {
    async fn put_checkpoint(
        &self,
        thread_id: &str,
        timestamp: &str,
        parent_timestamp: Option<&str>,
        state: &Payload,
        metadata: &Payload,
    ) -> StoreResult<CheckpointRef> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StoreError::StorageUnavailable(sqlx::Error::PoolTimedOut));
        }
        if thread_id.is_empty() || timestamp.is_empty() {
            return Err(StoreError::InvalidQuery("empty key".to_string()));
        }
        let mut checkpoints = self.checkpoints.lock().unwrap();
        let key = (thread_id.to_string(), timestamp.to_string());
        let parent = checkpoints
            .get(&key)
            .map_or(parent_timestamp.map(str::to_string), |c| c.parent_timestamp.clone());
        checkpoints.insert(
            key,
            Checkpoint {
                thread_id: thread_id.to_string(),
                timestamp: timestamp.to_string(),
                parent_timestamp: parent,
                state: state.clone(),
                metadata: metadata.clone(),
            },
        );
        Ok(CheckpointRef {
            thread_id: thread_id.to_string(),
            timestamp: timestamp.to_string(),
        })
    }

    async fn get_checkpoint(
        &self,
        thread_id: &str,
        timestamp: Option<&str>,
    ) -> StoreResult<Option<Checkpoint>> {
        let checkpoints = self.checkpoints.lock().unwrap();
        Ok(match timestamp {
            Some(ts) => checkpoints
                .get(&(thread_id.to_string(), ts.to_string()))
                .cloned(),
            None => checkpoints
                .values()
                .filter(|c| c.thread_id == thread_id)
                .next_back()
                .cloned(),
        })
    }
}

#[async_trait]
impl RunLog for InMemoryStorage {
    async fn start_run(&self, run_id: &str, _thread_id: &str) -> StoreResult<()> {
        self.runs
            .lock()
            .unwrap()
            .entry(run_id.to_string())
            .or_insert(RunStatus::Started);
        Ok(())
    }

    async fn finish_run(&self, run_id: &str, status: RunStatus) -> StoreResult<()> {
        self.runs.lock().unwrap().insert(run_id.to_string(), status);
        Ok(())
    }

    async fn record_step(&self, step: &Step) -> StoreResult<()> {
        self.steps.lock().unwrap().push(step.clone());
        Ok(())
    }
}
