//! Property-based tests for the conversation log
//!
//! Invariants checked over arbitrary operation sequences:
//! - The head of the log is always the system prompt
//! - `window_start` never exceeds the log length
//! - The log only shrinks on reset, and reset leaves exactly one message
//! - With a token the slice is empty right after recompute; without one it is
//!   the whole log

use super::ConversationState;
use crate::llm::{ContentPart, Message, Role};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    User(String),
    Assistant(String),
    Tool(String),
    Recompute(Option<String>),
    Reset,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => "[a-zA-Z0-9 ]{0,20}".prop_map(Op::User),
        4 => "[a-zA-Z0-9 ]{0,20}".prop_map(Op::Assistant),
        2 => "[a-z0-9_]{1,10}".prop_map(Op::Tool),
        3 => proptest::option::of("[a-z0-9_]{1,10}").prop_map(Op::Recompute),
        1 => Just(Op::Reset),
    ]
}

fn apply(state: &mut ConversationState, op: &Op) {
    match op {
        Op::User(text) => state.append_user(text.clone()),
        Op::Assistant(text) => state.append_assistant(vec![ContentPart::text(text.clone())]),
        Op::Tool(call_id) => state.append_tool(vec![ContentPart::function_result(
            call_id.clone(),
            vec!["ok".to_string()],
            false,
        )]),
        Op::Recompute(token) => state.recompute_window(token.clone()),
        Op::Reset => state.reset(),
    }
}

proptest! {
    #[test]
    fn prop_invariants_hold(ops in proptest::collection::vec(arb_op(), 0..60)) {
        let mut state = ConversationState::new("system prompt");

        for op in &ops {
            let before = state.len();
            apply(&mut state, op);

            prop_assert_eq!(&state.messages()[0], &Message::system("system prompt"));
            prop_assert!(state.window_start() <= state.len());

            match op {
                Op::Reset => {
                    prop_assert_eq!(state.len(), 1);
                    prop_assert!(state.session_token().is_none());
                }
                Op::Recompute(Some(_)) => {
                    prop_assert_eq!(state.len(), before);
                    prop_assert!(state.slice_for_next_turn().is_empty());
                }
                Op::Recompute(None) => {
                    prop_assert_eq!(state.slice_for_next_turn().len(), state.len());
                    prop_assert_eq!(state.slice_for_next_turn()[0].role, Role::System);
                }
                _ => prop_assert_eq!(state.len(), before + 1),
            }
        }
    }

    #[test]
    fn prop_slice_is_suffix_of_log(ops in proptest::collection::vec(arb_op(), 0..60)) {
        let mut state = ConversationState::new("sys");
        for op in &ops {
            apply(&mut state, op);
        }
        let slice = state.slice_for_next_turn();
        let log = state.messages();
        prop_assert!(log.ends_with(slice));
        prop_assert_eq!(log.len() - slice.len(), state.window_start());
    }
}
