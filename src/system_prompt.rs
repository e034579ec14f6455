//! Prompt construction for the planner and expert roles
//!
//! Planner instructions can be replaced by a markdown file; the expert prompt
//! is rebuilt every step from the tool list and the rendered conversation.

use crate::state_machine::{Message, FINAL_ANSWER_MARKER};
use std::fmt::Write;
use std::path::Path;

/// Built-in meta-prompter instructions
const DEFAULT_PLANNER_INSTRUCTIONS: &str = r"You are the Meta-Prompter, a conductor that coordinates an expert to solve the user's request.

Break complex requests into smaller subtasks. For each subtask, write a precise instruction for the expert: state the goal, the relevant facts gathered so far, and the form the answer should take. Review what the expert and the tools returned, check it for errors and gaps, and decide what to ask next.

Prefer verified information over recollection. When a fact may be out of date or needs a calculation, direct the expert to use a tool.";

/// Appended to the planner instructions on every call
const PLANNER_REMINDER: &str = "Remember to use available tools for up-to-date information when necessary.";

/// Load planner instructions from `path`, falling back to the built-in text
pub fn load_planner_instructions(path: Option<&Path>) -> String {
    let Some(path) = path else {
        return DEFAULT_PLANNER_INSTRUCTIONS.to_string();
    };
    match std::fs::read_to_string(path) {
        Ok(content) if !content.trim().is_empty() => {
            tracing::info!(path = %path.display(), "Loaded planner instructions");
            content.trim().to_string()
        }
        Ok(_) => {
            tracing::warn!(path = %path.display(), "Planner instructions file is empty, using built-in");
            DEFAULT_PLANNER_INSTRUCTIONS.to_string()
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read planner instructions, using built-in");
            DEFAULT_PLANNER_INSTRUCTIONS.to_string()
        }
    }
}

/// Full system prompt for a planner call
pub fn planner_system_prompt(instructions: &str) -> String {
    format!(
        "{instructions}\n\n{PLANNER_REMINDER} When you have a final answer, start your response with '{FINAL_ANSWER_MARKER}' and be sure it's comprehensive."
    )
}

/// Render the conversation as a labelled transcript
pub fn render_transcript(messages: &[Message]) -> String {
    let mut out = String::new();
    for (i, message) in messages.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let _ = write!(out, "{}: {}", message.role.label(), message.content);
    }
    out
}

/// Prompt for an expert call: tool usage format, transcript, and the ask
pub fn expert_prompt(tool_names: &[String], messages: &[Message]) -> String {
    let tools = if tool_names.is_empty() {
        "(none)".to_string()
    } else {
        tool_names.join(", ")
    };
    let transcript = render_transcript(messages);

    format!(
        "You are an expert assistant with access to the following tools: {tools}.
Use them when necessary to provide accurate and up-to-date information.
To use a tool, respond with the tool name and input in the following format:
Tool: <tool_name>
Input: <tool_input>

If you have a final answer, start your response with '{FINAL_ANSWER_MARKER}' and ensure it's comprehensive.

Current conversation:
{transcript}

What would you like to do next? Consider using a tool if you need current information or specific data."
    )
}
