//! Turn controller executor
//!
//! Runs planner and expert steps for one thread until the transition
//! function reports `Done`, persisting a checkpoint after every step and
//! streaming each step to the caller.

use super::nodes::{run_expert, run_planner, NodeOutput};
use super::traits::{LlmClient, Storage, ToolInvoker};
use crate::db::{next_timestamp, now_timestamp, DecodeError, Payload, RunStatus, Step, StoreError};
use crate::state_machine::{apply_turn_limit, transition, ConversationState, DoneReason, Message, Phase};
use futures::Stream;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};

pub const DEFAULT_MAX_TURNS: u32 = 15;

/// Controller configuration passed in at construction
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub max_turns: u32,
    /// Planner system instructions
    pub planner_instructions: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_turns: DEFAULT_MAX_TURNS,
            planner_instructions: crate::system_prompt::load_planner_instructions(None),
        }
    }
}

/// Errors that abort an `advance` call
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
    #[error("Latest checkpoint {timestamp} of thread {thread_id} is unreadable: {source}")]
    CorruptState {
        thread_id: String,
        timestamp: String,
        #[source]
        source: DecodeError,
    },
    #[error("Failed to encode state: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl AgentError {
    /// Whether retrying the whole `advance` call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, AgentError::Storage(e) if e.is_retryable())
    }
}

/// One completed step, as streamed to the caller
#[derive(Debug, Clone, Serialize)]
pub struct StepUpdate {
    pub thread_id: String,
    pub run_id: String,
    pub timestamp: String,
    pub parent_timestamp: Option<String>,
    /// Node that produced this step: planner, expert or controller
    pub node: &'static str,
    /// Phase the conversation moves to after this step
    pub next: Phase,
    pub state: ConversationState,
}

/// Stream of step updates for one `advance` call.
///
/// Dropping it cancels the run: the in-flight step still completes and
/// persists, but no further step starts.
pub struct AdvanceStream {
    inner: ReceiverStream<Result<StepUpdate, AgentError>>,
    run_id: String,
    _cancel_on_drop: DropGuard,
}

impl AdvanceStream {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}

impl Stream for AdvanceStream {
    type Item = Result<StepUpdate, AgentError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }
}

/// Drives conversations over any storage, LLM, and tool implementations
pub struct TurnController<S, L, T>
where
    S: Storage + 'static,
    L: LlmClient + 'static,
    T: ToolInvoker + 'static,
{
    storage: Arc<S>,
    llm: Arc<L>,
    tools: Arc<T>,
    config: Arc<AgentConfig>,
    /// One lock per thread so steps of a thread never interleave
    thread_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl<S, L, T> Clone for TurnController<S, L, T>
where
    S: Storage + 'static,
    L: LlmClient + 'static,
    T: ToolInvoker + 'static,
{
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            llm: Arc::clone(&self.llm),
            tools: Arc::clone(&self.tools),
            config: Arc::clone(&self.config),
            thread_locks: Arc::clone(&self.thread_locks),
        }
    }
}

impl<S, L, T> TurnController<S, L, T>
where
    S: Storage + 'static,
    L: LlmClient + 'static,
    T: ToolInvoker + 'static,
{
    pub fn new(storage: S, llm: L, tools: T, config: AgentConfig) -> Self {
        Self {
            storage: Arc::new(storage),
            llm: Arc::new(llm),
            tools: Arc::new(tools),
            config: Arc::new(config),
            thread_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Append a user message to a thread and run steps until done.
    ///
    /// Must be called from within a tokio runtime; the steps run on a
    /// spawned task and are delivered through the returned stream.
    pub fn advance(&self, thread_id: &str, user_message: &str) -> AdvanceStream {
        let (tx, rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let run_id = uuid::Uuid::new_v4().to_string();

        let controller = self.clone();
        let task_cancel = cancel.clone();
        let thread_id = thread_id.to_string();
        let user_message = user_message.to_string();
        let task_run_id = run_id.clone();
        tokio::spawn(async move {
            controller
                .run(&thread_id, &user_message, &task_run_id, &tx, &task_cancel)
                .await;
        });

        AdvanceStream {
            inner: ReceiverStream::new(rx),
            run_id,
            _cancel_on_drop: cancel.drop_guard(),
        }
    }

    async fn thread_lock(&self, thread_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.thread_locks.lock().await;
        Arc::clone(locks.entry(thread_id.to_string()).or_default())
    }

    async fn release_thread_lock(&self, thread_id: &str) {
        let mut locks = self.thread_locks.lock().await;
        // Only the map holds it: nobody is running or waiting on this thread
        if locks
            .get(thread_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(thread_id);
        }
    }

    async fn run(
        &self,
        thread_id: &str,
        user_message: &str,
        run_id: &str,
        tx: &mpsc::Sender<Result<StepUpdate, AgentError>>,
        cancel: &CancellationToken,
    ) {
        if thread_id.is_empty() {
            let _ = tx
                .send(Err(AgentError::InvalidRequest(
                    "thread_id must not be empty".to_string(),
                )))
                .await;
            return;
        }

        let lock = self.thread_lock(thread_id).await;
        let guard = lock.lock().await;

        tracing::info!(thread_id = %thread_id, run_id = %run_id, "Starting run");
        audit(self.storage.start_run(run_id, thread_id).await, "start run");

        let run = Run {
            thread_id,
            run_id,
            tx,
            cancel,
        };
        let result = self.drive(&run, user_message).await;

        let status = match &result {
            Ok(Some(reason)) => {
                tracing::info!(thread_id = %thread_id, run_id = %run_id, reason = ?reason, "Run finished");
                RunStatus::Completed
            }
            Ok(None) => {
                tracing::info!(thread_id = %thread_id, run_id = %run_id, "Run cancelled by caller");
                RunStatus::Failed
            }
            Err(e) => {
                tracing::error!(
                    thread_id = %thread_id,
                    run_id = %run_id,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Run failed"
                );
                RunStatus::Failed
            }
        };
        audit(self.storage.finish_run(run_id, status).await, "finish run");

        if let Err(e) = result {
            let _ = tx.send(Err(e)).await;
        }

        drop(guard);
        drop(lock);
        self.release_thread_lock(thread_id).await;
    }

    /// Returns the reason the conversation ended, or `None` if the caller
    /// went away first.
    #[allow(clippy::too_many_lines)]
    async fn drive(&self, run: &Run<'_>, user_message: &str) -> Result<Option<DoneReason>, AgentError> {
        let max_turns = self.config.max_turns;
        let (mut state, mut parent) = self.load_latest(run.thread_id).await?;

        // Each request gets a full turn budget; history and diagnostics carry over
        state.turn_count = 0;
        state.messages.push(Message::user(user_message));

        // A new message always goes to the planner first
        let mut phase = Phase::Planning;
        let mut steps: u32 = 0;

        while !phase.is_terminal() {
            if run.cancel.is_cancelled() {
                return Ok(None);
            }
            // Hard cap independent of the transition rules
            if steps > max_turns {
                tracing::error!(thread_id = %run.thread_id, steps, "Step cap reached without a terminal phase");
                phase = Phase::Done {
                    reason: DoneReason::TurnLimit,
                };
                break;
            }

            state.turn_count += 1;
            steps += 1;
            let node = phase.node_name();
            let started = now_timestamp();
            let inputs = json!({ "turn_count": state.turn_count, "messages": state.messages.len() });

            let output = match phase {
                Phase::Planning => {
                    run_planner(self.llm.as_ref(), &self.config.planner_instructions, &state).await
                }
                Phase::Expert => run_expert(self.llm.as_ref(), self.tools.as_ref(), &state).await,
                Phase::Done { .. } => NodeOutput::default(),
            };
            let outputs = json!({ "messages": output.messages, "errors": output.errors });
            state.merge(output.messages, output.errors);

            let next = transition(&state, max_turns);
            let timestamp = self
                .persist(run, &state, parent.as_deref(), node, next)
                .await?;

            audit(
                self.storage
                    .record_step(&Step {
                        run_id: run.run_id.to_string(),
                        step_id: format!("{steps:03}-{node}"),
                        start_time: started,
                        end_time: now_timestamp(),
                        inputs,
                        outputs,
                        step_type: node.to_string(),
                    })
                    .await,
                "record step",
            );

            let previous = parent.replace(timestamp.clone());
            run.emit(StepUpdate {
                thread_id: run.thread_id.to_string(),
                run_id: run.run_id.to_string(),
                timestamp,
                parent_timestamp: previous,
                node,
                next,
                state: state.clone(),
            })
            .await;

            phase = next;
        }

        let Phase::Done { reason } = phase else {
            return Ok(None);
        };

        if reason == DoneReason::TurnLimit {
            tracing::info!(thread_id = %run.thread_id, max_turns, "Maximum turns reached, ending conversation");
            apply_turn_limit(&mut state, max_turns);
            let timestamp = self
                .persist(run, &state, parent.as_deref(), "controller", phase)
                .await?;
            run.emit(StepUpdate {
                thread_id: run.thread_id.to_string(),
                run_id: run.run_id.to_string(),
                timestamp,
                parent_timestamp: parent,
                node: "controller",
                next: phase,
                state,
            })
            .await;
        } else {
            tracing::info!(thread_id = %run.thread_id, "FINAL ANSWER detected, ending conversation");
        }

        Ok(Some(reason))
    }

    async fn load_latest(
        &self,
        thread_id: &str,
    ) -> Result<(ConversationState, Option<String>), AgentError> {
        let Some(checkpoint) = self.storage.get_checkpoint(thread_id, None).await? else {
            return Ok((ConversationState::default(), None));
        };
        let state = checkpoint
            .state
            .to_deserializable::<ConversationState>()
            .map_err(|source| AgentError::CorruptState {
                thread_id: thread_id.to_string(),
                timestamp: checkpoint.timestamp.clone(),
                source,
            })?;
        Ok((state, Some(checkpoint.timestamp)))
    }

    async fn persist(
        &self,
        run: &Run<'_>,
        state: &ConversationState,
        parent: Option<&str>,
        node: &str,
        next: Phase,
    ) -> Result<String, AgentError> {
        let timestamp = next_timestamp(parent);
        let metadata = Payload::Json(json!({
            "source": "loop",
            "step": state.turn_count,
            "node": node,
            "next": next.to_string(),
            "run_id": run.run_id,
        }));
        self.storage
            .put_checkpoint(
                run.thread_id,
                &timestamp,
                parent,
                &Payload::from_serializable(state)?,
                &metadata,
            )
            .await?;
        Ok(timestamp)
    }
}

/// Audit writes are observational; failures are logged and dropped
fn audit(result: Result<(), StoreError>, action: &str) {
    if let Err(e) = result {
        tracing::warn!(error = %e, action, "Audit write failed");
    }
}

/// Per-call context threaded through the step loop
struct Run<'a> {
    thread_id: &'a str,
    run_id: &'a str,
    tx: &'a mpsc::Sender<Result<StepUpdate, AgentError>>,
    cancel: &'a CancellationToken,
}

impl Run<'_> {
    async fn emit(&self, update: StepUpdate) {
        if self.tx.send(Ok(update)).await.is_err() {
            self.cancel.cancel();
        }
    }
}
