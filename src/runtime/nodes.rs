//! Planner and expert role nodes
//!
//! Nodes never fail: model and tool errors become an apology message plus an
//! `error_log` entry so the controller loop keeps going.

use super::traits::{LlmClient, ToolInvoker};
use crate::llm::{LlmMessage, LlmRequest};
use crate::state_machine::{ConversationState, Message, Role};
use crate::system_prompt::{expert_prompt, planner_system_prompt};

/// Messages and diagnostics produced by one node execution
#[derive(Debug, Default)]
pub struct NodeOutput {
    pub messages: Vec<Message>,
    pub errors: Vec<String>,
}

/// A tool call requested in an expert reply
#[derive(Debug, PartialEq, Eq)]
pub struct ToolRequest<'a> {
    pub name: &'a str,
    pub input: &'a str,
}

/// Detect a `Tool:` / `Input:` request in free text.
///
/// The name runs from the first `Tool:` to the end of that line; the input
/// is everything after the first `Input:`. Both are trimmed.
pub fn parse_tool_request(content: &str) -> Option<ToolRequest<'_>> {
    let (_, after_tool) = content.split_once("Tool:")?;
    let (_, after_input) = content.split_once("Input:")?;
    let name = after_tool.lines().next().unwrap_or_default().trim();
    Some(ToolRequest {
        name,
        input: after_input.trim(),
    })
}

/// History as the planner sees it: its own turns as assistant, everything
/// else as labelled user turns, adjacent same-role turns joined.
fn planner_history(messages: &[Message]) -> Vec<LlmMessage> {
    let mut history: Vec<LlmMessage> = Vec::with_capacity(messages.len());
    for message in messages {
        let next = match &message.role {
            Role::Planner => LlmMessage::assistant(message.content.clone()),
            Role::User => LlmMessage::user(message.content.clone()),
            other => LlmMessage::user(format!("{}: {}", other.label(), message.content)),
        };
        match history.last_mut() {
            Some(prev) if prev.role == next.role => {
                prev.content.push_str("\n\n");
                prev.content.push_str(&next.content);
            }
            _ => history.push(next),
        }
    }
    history
}

pub async fn run_planner<L>(llm: &L, instructions: &str, state: &ConversationState) -> NodeOutput
where
    L: LlmClient + ?Sized,
{
    let request = LlmRequest::new(
        planner_system_prompt(instructions),
        planner_history(&state.messages),
    );

    match llm.complete(&request).await {
        Ok(response) => NodeOutput {
            messages: vec![Message::planner(response.text)],
            errors: vec![],
        },
        Err(e) => {
            let error_message = format!("Planner model error: {e}");
            tracing::error!(error = %e, retryable = e.kind.is_retryable(), "Planner request failed");
            NodeOutput {
                messages: vec![Message::planner(
                    "I encountered an error while planning the next step. I'll try again.",
                )],
                errors: vec![error_message],
            }
        }
    }
}

pub async fn run_expert<L, T>(llm: &L, tools: &T, state: &ConversationState) -> NodeOutput
where
    L: LlmClient + ?Sized,
    T: ToolInvoker + ?Sized,
{
    let prompt = expert_prompt(&tools.tool_names(), &state.messages);
    let request = LlmRequest::new(String::new(), vec![LlmMessage::user(prompt)]);

    let reply = match llm.complete(&request).await {
        Ok(response) => response.text,
        Err(e) => {
            let error_message = format!("Expert model error: {e}");
            tracing::error!(error = %e, retryable = e.kind.is_retryable(), "Expert request failed");
            return NodeOutput {
                messages: vec![Message::expert(
                    "I encountered an error while working on this. I'll try a different approach.",
                )],
                errors: vec![error_message],
            };
        }
    };

    let Some(request) = parse_tool_request(&reply) else {
        return NodeOutput {
            messages: vec![Message::expert(reply)],
            errors: vec![],
        };
    };

    let tool_name = request.name.to_string();
    match tools.invoke(request.name, request.input).await {
        Ok(output) => NodeOutput {
            messages: vec![Message::expert(reply), Message::tool_result(tool_name, output)],
            errors: vec![],
        },
        Err(e) => {
            let error_message = format!("Error executing {tool_name}: {e}");
            tracing::error!(tool = %tool_name, error = %e, "{error_message}");
            NodeOutput {
                messages: vec![Message::expert(format!(
                    "I encountered an error while trying to use the {tool_name} tool. I'll try a different approach."
                ))],
                errors: vec![error_message],
            }
        }
    }
}
