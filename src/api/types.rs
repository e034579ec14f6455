//! API request and response types

use crate::db::{Checkpoint, ConversationRecord, Payload, Run, Step};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request to register a conversation name
#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    /// Generated when omitted
    pub thread_id: Option<String>,
    pub name: String,
}

/// Request to send a user message to a thread
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub text: String,
}

/// Request to rename a conversation
#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub name: String,
}

/// Query parameters for checkpoint history
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub before: Option<String>,
    pub limit: Option<u32>,
}

/// Response with a list of conversations
#[derive(Debug, Serialize)]
pub struct ConversationListResponse {
    pub conversations: Vec<ConversationRecord>,
}

/// Checkpoint as returned over HTTP
#[derive(Debug, Serialize)]
pub struct CheckpointResponse {
    pub thread_id: String,
    pub timestamp: String,
    pub parent_timestamp: Option<String>,
    pub state: Value,
    pub metadata: Value,
}

impl From<Checkpoint> for CheckpointResponse {
    fn from(checkpoint: Checkpoint) -> Self {
        Self {
            thread_id: checkpoint.thread_id,
            timestamp: checkpoint.timestamp,
            parent_timestamp: checkpoint.parent_timestamp,
            state: payload_value(checkpoint.state),
            metadata: payload_value(checkpoint.metadata),
        }
    }
}

/// Raw byte payloads are shown as JSON when they parse, else as text
fn payload_value(payload: Payload) -> Value {
    match payload {
        Payload::Json(value) => value,
        Payload::Bytes(bytes) => serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned())),
    }
}

/// Response with a page of checkpoints, newest first
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub checkpoints: Vec<CheckpointResponse>,
}

#[derive(Debug, Serialize)]
pub struct RunListResponse {
    pub runs: Vec<Run>,
}

#[derive(Debug, Serialize)]
pub struct StepListResponse {
    pub steps: Vec<Step>,
}

/// Registered tool with its description
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct ToolsResponse {
    pub tools: Vec<ToolInfo>,
}

/// Response for lifecycle actions
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub retryable: bool,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>, retryable: bool) -> Self {
        Self {
            error: message.into(),
            retryable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_checkpoint_response_decodes_payloads() {
        let response = CheckpointResponse::from(Checkpoint {
            thread_id: "t1".to_string(),
            timestamp: "2024-01-01T00:00:00.000000Z".to_string(),
            parent_timestamp: None,
            state: Payload::Bytes(br#"{"turn_count":2}"#.to_vec()),
            metadata: Payload::Json(json!({ "node": "planner" })),
        });
        assert_eq!(response.state, json!({ "turn_count": 2 }));
        assert_eq!(response.metadata["node"], "planner");
    }

    #[test]
    fn test_opaque_bytes_become_text() {
        assert_eq!(
            payload_value(Payload::Bytes(b"not json".to_vec())),
            Value::String("not json".to_string())
        );
    }
}
