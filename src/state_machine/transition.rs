//! Pure transition function
//!
//! Evaluated after every node execution. Given the same state it always
//! yields the same phase and performs no I/O.

use super::{ConversationState, DoneReason, Message, Phase, Role};

/// Literal substring that ends a conversation
pub const FINAL_ANSWER_MARKER: &str = "FINAL ANSWER:";

/// `error_log` entry appended when the turn limit stops a conversation
pub const TURN_LIMIT_DIAGNOSTIC: &str = "Reached maximum turns";

const TURN_LIMIT_APOLOGY: &str = "I apologize, but I've been unable to provide a satisfactory answer within a reasonable number of steps. Here's my best attempt at a final answer based on what we've discussed:";

/// Decide the next phase from the latest message and the turn count.
///
/// Rule order matters: the marker wins over the turn limit, which wins over
/// role alternation.
pub fn transition(state: &ConversationState, max_turns: u32) -> Phase {
    let last = state.last_message();

    if last.is_some_and(|m| m.content.contains(FINAL_ANSWER_MARKER)) {
        return Phase::Done {
            reason: DoneReason::FinalAnswer,
        };
    }

    if state.turn_count >= max_turns {
        return Phase::Done {
            reason: DoneReason::TurnLimit,
        };
    }

    match last.map(|m| &m.role) {
        Some(Role::Planner) => Phase::Expert,
        _ => Phase::Planning,
    }
}

/// Append the turn-limit summary message and diagnostic.
///
/// The summary quotes the most recent model-authored message as the best
/// available answer.
pub fn apply_turn_limit(state: &mut ConversationState, max_turns: u32) {
    let best_attempt = state
        .messages
        .iter()
        .rev()
        .find(|m| m.role != Role::User)
        .map_or("(no answer was produced)", |m| m.content.as_str());

    let summary = format!("{TURN_LIMIT_APOLOGY}\n\n{best_attempt}");
    state.messages.push(Message::planner(summary));
    state
        .error_log
        .push(format!("{TURN_LIMIT_DIAGNOSTIC} ({max_turns})"));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(messages: Vec<Message>, turn_count: u32) -> ConversationState {
        ConversationState {
            messages,
            turn_count,
            error_log: vec![],
        }
    }

    #[test]
    fn test_empty_state_starts_planning() {
        assert_eq!(transition(&ConversationState::default(), 15), Phase::Planning);
    }

    #[test]
    fn test_user_message_goes_to_planning() {
        let state = state_with(vec![Message::user("What is the capital of France?")], 0);
        assert_eq!(transition(&state, 15), Phase::Planning);
    }

    #[test]
    fn test_planner_message_goes_to_expert() {
        let state = state_with(vec![Message::planner("Ask the expert")], 1);
        assert_eq!(transition(&state, 15), Phase::Expert);
    }

    #[test]
    fn test_expert_and_tool_messages_go_back_to_planning() {
        let state = state_with(vec![Message::expert("Thinking")], 2);
        assert_eq!(transition(&state, 15), Phase::Planning);

        let state = state_with(vec![Message::tool_result("search", "Paris")], 2);
        assert_eq!(transition(&state, 15), Phase::Planning);
    }

    #[test]
    fn test_marker_anywhere_ends_conversation() {
        let state = state_with(
            vec![Message::expert("After research.\nFINAL ANSWER: Paris")],
            2,
        );
        assert_eq!(
            transition(&state, 15),
            Phase::Done {
                reason: DoneReason::FinalAnswer
            }
        );
    }

    #[test]
    fn test_marker_wins_over_turn_limit() {
        let state = state_with(vec![Message::planner("FINAL ANSWER: 42")], 15);
        assert_eq!(
            transition(&state, 15),
            Phase::Done {
                reason: DoneReason::FinalAnswer
            }
        );
    }

    #[test]
    fn test_turn_limit_ends_conversation() {
        let state = state_with(vec![Message::planner("keep going")], 15);
        assert_eq!(
            transition(&state, 15),
            Phase::Done {
                reason: DoneReason::TurnLimit
            }
        );
    }

    #[test]
    fn test_lowercase_marker_is_not_terminal() {
        let state = state_with(vec![Message::expert("final answer: maybe")], 2);
        assert_eq!(transition(&state, 15), Phase::Planning);
    }

    #[test]
    fn test_apply_turn_limit_quotes_last_model_message() {
        let mut state = state_with(
            vec![
                Message::user("question"),
                Message::planner("plan"),
                Message::expert("best guess: Paris"),
            ],
            15,
        );
        apply_turn_limit(&mut state, 15);

        let last = state.last_message().unwrap();
        assert_eq!(last.role, Role::Planner);
        assert!(last.content.starts_with("I apologize"));
        assert!(last.content.ends_with("best guess: Paris"));
        assert_eq!(state.error_log, vec!["Reached maximum turns (15)"]);
        // Summary itself must not look like a final answer to the next evaluation
        assert!(!last.content.contains(FINAL_ANSWER_MARKER));
    }
}
