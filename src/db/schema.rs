//! Database schema and record types

use super::payload::Payload;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS checkpoints (
    thread_id TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    parent_timestamp TEXT,
    state_type TEXT NOT NULL,
    state BLOB NOT NULL,
    metadata_type TEXT NOT NULL,
    metadata BLOB NOT NULL,

    PRIMARY KEY (thread_id, timestamp)
);

CREATE TABLE IF NOT EXISTS runs (
    run_id TEXT PRIMARY KEY,
    thread_id TEXT NOT NULL,
    status TEXT NOT NULL,
    start_time TEXT NOT NULL,
    end_time TEXT
);

CREATE INDEX IF NOT EXISTS idx_runs_start ON runs(start_time DESC);

CREATE TABLE IF NOT EXISTS steps (
    run_id TEXT NOT NULL,
    step_id TEXT NOT NULL,
    start_time TEXT NOT NULL,
    end_time TEXT NOT NULL,
    inputs TEXT NOT NULL,
    outputs TEXT NOT NULL,
    step_type TEXT NOT NULL,

    PRIMARY KEY (run_id, step_id),
    FOREIGN KEY (run_id) REFERENCES runs(run_id)
);

CREATE TABLE IF NOT EXISTS conversations (
    thread_id TEXT PRIMARY KEY,
    name TEXT NOT NULL
);
";

/// Address of a checkpoint within the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRef {
    pub thread_id: String,
    pub timestamp: String,
}

/// Immutable snapshot of a thread at one step
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub thread_id: String,
    pub timestamp: String,
    pub parent_timestamp: Option<String>,
    pub state: Payload,
    pub metadata: Payload,
}

/// Lifecycle status of an audited run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Started,
    Completed,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Started => write!(f, "started"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

pub(super) fn parse_run_status(s: &str) -> RunStatus {
    match s {
        "completed" => RunStatus::Completed,
        "failed" => RunStatus::Failed,
        _ => RunStatus::Started,
    }
}

/// Audit record for one `advance` call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub run_id: String,
    pub thread_id: String,
    pub status: RunStatus,
    pub start_time: String,
    pub end_time: Option<String>,
}

/// Audit record for one node execution inside a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub run_id: String,
    pub step_id: String,
    pub start_time: String,
    pub end_time: String,
    pub inputs: Value,
    pub outputs: Value,
    pub step_type: String,
}

/// Display name registered for a thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub thread_id: String,
    pub name: String,
}
