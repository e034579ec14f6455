//! Conversation state types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Author of a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Role {
    User,
    Planner,
    Expert,
    ToolResult { tool_name: String },
}

impl Role {
    /// Label used when rendering a transcript for a model prompt
    pub fn label(&self) -> &str {
        match self {
            Role::User => "User",
            Role::Planner => "Meta-Prompter",
            Role::Expert => "Expert",
            Role::ToolResult { tool_name } => tool_name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn planner(content: impl Into<String>) -> Self {
        Self {
            role: Role::Planner,
            content: content.into(),
        }
    }

    pub fn expert(content: impl Into<String>) -> Self {
        Self {
            role: Role::Expert,
            content: content.into(),
        }
    }

    pub fn tool_result(tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::ToolResult {
                tool_name: tool_name.into(),
            },
            content: content.into(),
        }
    }
}

/// State carried between controller steps and persisted in every checkpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub turn_count: u32,
    #[serde(default)]
    pub error_log: Vec<String>,
}

impl ConversationState {
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Fold a node's output into this state: messages appended, errors
    /// concatenated, turn count untouched.
    pub fn merge(&mut self, messages: Vec<Message>, errors: Vec<String>) {
        self.messages.extend(messages);
        self.error_log.extend(errors);
    }
}

/// Why a conversation stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoneReason {
    FinalAnswer,
    TurnLimit,
}

/// Which node acts next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Phase {
    Planning,
    Expert,
    Done { reason: DoneReason },
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done { .. })
    }

    /// Node name recorded in checkpoint metadata and audit steps
    pub fn node_name(self) -> &'static str {
        match self {
            Phase::Planning => "planner",
            Phase::Expert => "expert",
            Phase::Done { .. } => "controller",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Planning => write!(f, "planning"),
            Phase::Expert => write!(f, "expert"),
            Phase::Done {
                reason: DoneReason::FinalAnswer,
            } => write!(f, "done:final_answer"),
            Phase::Done {
                reason: DoneReason::TurnLimit,
            } => write!(f, "done:turn_limit"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_serialization_is_tagged() {
        let msg = Message::tool_result("search", "Paris");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({ "role": { "type": "tool_result", "tool_name": "search" }, "content": "Paris" })
        );
        let back: Message = serde_json::from_value(value).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_state_defaults_missing_fields() {
        let state: ConversationState =
            serde_json::from_value(json!({ "messages": [] })).unwrap();
        assert_eq!(state, ConversationState::default());
    }

    #[test]
    fn test_merge_appends_and_keeps_turn_count() {
        let mut state = ConversationState {
            messages: vec![Message::user("hi")],
            turn_count: 3,
            error_log: vec!["earlier".to_string()],
        };
        state.merge(vec![Message::expert("hello")], vec!["later".to_string()]);

        assert_eq!(state.turn_count, 3);
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.error_log, vec!["earlier", "later"]);
    }
}
