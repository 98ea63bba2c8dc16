//! Conversation log with retransmission window
//!
//! The log is append-only between resets and always starts with the system
//! prompt. `window_start` marks the first message the backend has not yet seen
//! (when it keeps session state) or is zero (when it does not).

#[cfg(test)]
mod proptests;

use crate::llm::{ContentPart, Message, Role};

#[derive(Debug, Clone)]
pub struct ConversationState {
    system_prompt: String,
    log: Vec<Message>,
    window_start: usize,
    session_token: Option<String>,
}

impl ConversationState {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        let system_prompt = system_prompt.into();
        Self {
            log: vec![Message::system(&system_prompt)],
            system_prompt,
            window_start: 0,
            session_token: None,
        }
    }

    /// Back to a single system message with no session token
    pub fn reset(&mut self) {
        self.log.clear();
        self.log.push(Message::system(&self.system_prompt));
        self.window_start = 0;
        self.session_token = None;
    }

    pub fn append_user(&mut self, text: impl Into<String>) {
        self.log.push(Message::user(text));
    }

    pub fn append_assistant(&mut self, parts: Vec<ContentPart>) {
        self.log.push(Message::new(Role::Assistant, parts));
    }

    pub fn append_tool(&mut self, parts: Vec<ContentPart>) {
        self.log.push(Message::new(Role::Tool, parts));
    }

    /// Append a message whose role was decided elsewhere (fragments carried by
    /// a streaming update). A System message is never accepted past the head.
    pub fn append(&mut self, message: Message) {
        debug_assert!(message.role != Role::System, "system prompt is fixed");
        self.log.push(message);
    }

    /// Exactly what must be transmitted on the next turn
    pub fn slice_for_next_turn(&self) -> &[Message] {
        &self.log[self.window_start..]
    }

    /// Stateful backends have seen everything sent so far; stateless ones need
    /// the full history again.
    pub fn recompute_window(&mut self, session_token: Option<String>) {
        self.window_start = if session_token.is_some() {
            self.log.len()
        } else {
            0
        };
        self.session_token = session_token;
    }

    pub fn messages(&self) -> &[Message] {
        &self.log
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.log.len()
    }

    #[cfg(test)]
    pub fn window_start(&self) -> usize {
        self.window_start
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }
}
