//! Turn-taking state machine
//!
//! A pure transition function over explicit role and phase enums. The
//! runtime executes node steps; this module only decides what comes next.

pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use state::{ConversationState, DoneReason, Message, Phase, Role};
#[allow(unused_imports)] // Marker constants are read by tests
pub use transition::{apply_turn_limit, transition, FINAL_ANSWER_MARKER, TURN_LIMIT_DIAGNOSTIC};
