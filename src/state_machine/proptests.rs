//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::state::*;
use super::transition::*;
use proptest::prelude::*;

// ============================================================================
// Arbitrary Generators
// ============================================================================

/// Content that never contains the termination marker
fn arb_plain_content() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 :\n]{0,40}".prop_filter("no marker", |s| !s.contains(FINAL_ANSWER_MARKER))
}

fn arb_role() -> impl Strategy<Value = Role> {
    prop_oneof![
        Just(Role::User),
        Just(Role::Planner),
        Just(Role::Expert),
        "[a-z_]{1,12}".prop_map(|tool_name| Role::ToolResult { tool_name }),
    ]
}

fn arb_message() -> impl Strategy<Value = Message> {
    (arb_role(), arb_plain_content()).prop_map(|(role, content)| Message { role, content })
}

fn arb_state() -> impl Strategy<Value = ConversationState> {
    (
        proptest::collection::vec(arb_message(), 0..8),
        0u32..30,
        proptest::collection::vec("[a-z ]{0,20}", 0..3),
    )
        .prop_map(|(messages, turn_count, error_log)| ConversationState {
            messages,
            turn_count,
            error_log,
        })
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// A marker anywhere in the latest message ends the conversation on the
    /// next evaluation, whatever the role or turn count.
    #[test]
    fn prop_marker_is_terminal(
        mut state in arb_state(),
        role in arb_role(),
        prefix in arb_plain_content(),
        suffix in arb_plain_content(),
        max_turns in 0u32..30,
    ) {
        state.messages.push(Message {
            role,
            content: format!("{prefix}{FINAL_ANSWER_MARKER}{suffix}"),
        });
        prop_assert_eq!(
            transition(&state, max_turns),
            Phase::Done { reason: DoneReason::FinalAnswer }
        );
    }

    /// Without a marker, only the turn count and the latest role matter.
    #[test]
    fn prop_transition_without_marker(state in arb_state(), max_turns in 0u32..30) {
        let phase = transition(&state, max_turns);
        if state.turn_count >= max_turns {
            prop_assert_eq!(phase, Phase::Done { reason: DoneReason::TurnLimit });
        } else if state.last_message().map(|m| &m.role) == Some(&Role::Planner) {
            prop_assert_eq!(phase, Phase::Expert);
        } else {
            prop_assert_eq!(phase, Phase::Planning);
        }
    }

    /// Transition is a pure function of its inputs.
    #[test]
    fn prop_transition_is_deterministic(state in arb_state(), max_turns in 0u32..30) {
        prop_assert_eq!(transition(&state, max_turns), transition(&state.clone(), max_turns));
    }

    /// Applying the turn limit appends exactly one message and one diagnostic.
    #[test]
    fn prop_turn_limit_appends_once(mut state in arb_state(), max_turns in 1u32..30) {
        let before_messages = state.messages.len();
        let before_errors = state.error_log.len();
        apply_turn_limit(&mut state, max_turns);
        prop_assert_eq!(state.messages.len(), before_messages + 1);
        prop_assert_eq!(state.error_log.len(), before_errors + 1);
        prop_assert!(state.error_log.last().is_some_and(|e| e.contains(TURN_LIMIT_DIAGNOSTIC)));
    }
}
