//! Streaming turn orchestration
//!
//! A turn appends the user message, streams the model's answer into a buffer
//! while reporting partials, and appends the final assistant message. A search
//! call with arguments ends the turn early: the search result becomes the
//! answer verbatim and the model is not consulted further.
//!
//! Lock order: `delivery` before `conversation`. Neither is held across an
//! await; `turn_lock` is the only lock held for a whole turn.

use super::{CancellationController, ChatError};
use crate::conversation::ConversationState;
use crate::llm::{ContentPart, FunctionCall, LlmRequest, LlmService, Message};
use crate::tools::ToolRegistry;
use futures::StreamExt;
use parking_lot::ReentrantMutex;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Decides which function calls end a turn early
#[derive(Debug, Clone)]
pub struct ShortCircuitPolicy {
    marker: String,
}

impl ShortCircuitPolicy {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    /// Name contains the marker and the call carries arguments
    pub fn matches(&self, call: &FunctionCall) -> bool {
        call.name.contains(&self.marker) && call.has_arguments()
    }
}

impl Default for ShortCircuitPolicy {
    fn default() -> Self {
        Self::new("Search")
    }
}

struct Conversation {
    id: String,
    state: ConversationState,
    tools: Arc<ToolRegistry>,
}

type ToolBuilder = Box<dyn Fn() -> ToolRegistry + Send + Sync>;

pub struct ChatService {
    llm: Arc<dyn LlmService>,
    build_tools: ToolBuilder,
    policy: ShortCircuitPolicy,
    conversation: Mutex<Conversation>,
    cancellation: CancellationController,
    /// Serializes partial delivery against supersession and reset. Re-entrant
    /// so `on_partial` may itself cancel or reset.
    delivery: ReentrantMutex<()>,
    /// Held for the whole of a turn
    turn_lock: tokio::sync::Mutex<()>,
}

impl ChatService {
    pub fn new(
        llm: Arc<dyn LlmService>,
        system_prompt: impl Into<String>,
        build_tools: impl Fn() -> ToolRegistry + Send + Sync + 'static,
    ) -> Self {
        let tools = Arc::new(build_tools());
        let conversation = Conversation {
            id: Uuid::new_v4().to_string(),
            state: ConversationState::new(system_prompt),
            tools,
        };
        tracing::info!(conv = %conversation.id, model = %llm.model_id(), "Conversation started");
        Self {
            llm,
            build_tools: Box::new(build_tools),
            policy: ShortCircuitPolicy::default(),
            conversation: Mutex::new(conversation),
            cancellation: CancellationController::new(),
            delivery: ReentrantMutex::new(()),
            turn_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_policy(mut self, policy: ShortCircuitPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Cancel any turn in flight and start over with a fresh log and tools
    pub fn start_new_conversation(&self) {
        let _delivery = self.delivery.lock();
        self.cancellation.cancel_current();

        let tools = Arc::new((self.build_tools)());
        let mut conv = self.conversation.lock().unwrap();
        let previous = std::mem::replace(&mut conv.id, Uuid::new_v4().to_string());
        conv.state.reset();
        conv.tools = tools;
        tracing::info!(conv = %conv.id, previous = %previous, "Conversation reset");
    }

    /// Snapshot of the log
    pub fn history(&self) -> Vec<Message> {
        self.conversation.lock().unwrap().state.messages().to_vec()
    }

    pub fn conversation_id(&self) -> String {
        self.conversation.lock().unwrap().id.clone()
    }

    #[cfg(test)]
    pub fn session_token(&self) -> Option<String> {
        self.conversation
            .lock()
            .unwrap()
            .state
            .session_token()
            .map(str::to_string)
    }

    /// Cancel the turn in flight, if any
    pub fn cancel_current(&self) {
        let _delivery = self.delivery.lock();
        self.cancellation.cancel_current();
    }

    /// Run one turn. `on_partial` receives the whole answer so far after each
    /// update; it is never called once the turn has been cancelled.
    #[allow(clippy::too_many_lines)] // One linear pass over the exchange
    pub async fn send_message<F>(
        &self,
        text: impl Into<String>,
        mut on_partial: F,
        cancel: &CancellationToken,
    ) -> Result<Message, ChatError>
    where
        F: FnMut(&str) + Send,
    {
        let text = text.into();
        let handle = {
            let _delivery = self.delivery.lock();
            self.cancellation.begin_new(cancel)
        };
        let token = handle.token().clone();

        // Wait for a superseded turn to unwind
        let _turn = tokio::select! {
            biased;
            () = token.cancelled() => return Err(ChatError::Cancelled),
            guard = self.turn_lock.lock() => guard,
        };

        let (conv_id, request) = {
            let mut conv = self.conversation.lock().unwrap();
            if token.is_cancelled() {
                return Err(ChatError::Cancelled);
            }
            conv.state.append_user(text);
            let request = LlmRequest {
                messages: conv.state.slice_for_next_turn().to_vec(),
                tools: conv.tools.clone(),
                session_token: conv.state.session_token().map(str::to_string),
            };
            (conv.id.clone(), request)
        };
        let tools = request.tools.clone();
        let start = std::time::Instant::now();
        tracing::info!(
            conv = %conv_id,
            messages = request.messages.len(),
            stateful = request.session_token.is_some(),
            "Turn started"
        );

        let mut buffer = String::new();

        let opened = tokio::select! {
            biased;
            () = token.cancelled() => Err(ChatError::Cancelled),
            result = self.llm.stream(&request) => result.map_err(ChatError::from),
        };
        let mut stream = match opened {
            Ok(stream) => stream,
            Err(e) => return Err(self.fail(&token, &conv_id, &mut buffer, &mut on_partial, e)),
        };

        let mut candidate_token = None;
        let mut short_circuited = false;

        loop {
            let next = tokio::select! {
                biased;
                () = token.cancelled() => None,
                next = stream.next() => Some(next),
            };
            let update = match next {
                None => {
                    return Err(self.fail(
                        &token,
                        &conv_id,
                        &mut buffer,
                        &mut on_partial,
                        ChatError::Cancelled,
                    ));
                }
                Some(None) => break,
                Some(Some(Ok(update))) => update,
                Some(Some(Err(e))) => {
                    return Err(self.fail(&token, &conv_id, &mut buffer, &mut on_partial, e.into()));
                }
            };

            if let Some(call) = update
                .function_calls()
                .into_iter()
                .find(|call| self.policy.matches(call))
            {
                tracing::info!(
                    conv = %conv_id,
                    tool = %call.name,
                    "Short-circuiting on search call"
                );
                let arguments = call.joined_arguments();
                let invoked = tokio::select! {
                    biased;
                    () = token.cancelled() => Err(ChatError::Cancelled),
                    result = tools.invoke(&call.name, &arguments) => {
                        result.map_err(ChatError::from)
                    }
                };
                let result = match invoked {
                    Ok(result) => result,
                    Err(e) => {
                        return Err(self.fail(&token, &conv_id, &mut buffer, &mut on_partial, e));
                    }
                };

                self.commit(&token, |state| {
                    state.append_assistant(vec![call.to_part()]);
                    state.append_tool(vec![ContentPart::function_result(
                        &call.call_id,
                        result.clone(),
                        false,
                    )]);
                })?;
                buffer = result.join(" ");
                self.deliver(&token, &mut on_partial, &buffer);
                short_circuited = true;
                break;
            }

            let fragments = update.non_text_parts();
            if !fragments.is_empty() {
                self.commit(&token, |state| state.append(Message::new(update.role, fragments)))?;
            }
            buffer.push_str(&update.text_delta());
            if update.session_token.is_some() {
                candidate_token = update.session_token;
            }
            self.deliver(&token, &mut on_partial, &buffer);
        }
        // Abandon the exchange before touching the log
        drop(stream);

        let stateful = candidate_token.is_some();
        self.commit(&token, |state| {
            state.append_assistant(vec![ContentPart::text(buffer.clone())]);
            state.recompute_window(candidate_token);
        })?;

        tracing::info!(
            conv = %conv_id,
            duration_ms = %start.elapsed().as_millis(),
            chars = buffer.len(),
            short_circuited,
            stateful,
            "Turn finished"
        );
        Ok(Message::assistant(buffer))
    }

    /// Apply a log mutation unless the turn has been cancelled
    fn commit(
        &self,
        token: &CancellationToken,
        mutate: impl FnOnce(&mut ConversationState),
    ) -> Result<(), ChatError> {
        let mut conv = self.conversation.lock().unwrap();
        if token.is_cancelled() {
            return Err(ChatError::Cancelled);
        }
        mutate(&mut conv.state);
        Ok(())
    }

    fn deliver<F: FnMut(&str)>(
        &self,
        token: &CancellationToken,
        on_partial: &mut F,
        buffer: &str,
    ) {
        let _delivery = self.delivery.lock();
        if !token.is_cancelled() {
            on_partial(buffer);
        }
    }

    /// Annotate the partial answer with the failure and hand the error back.
    /// Cancellation is silent.
    fn fail<F: FnMut(&str)>(
        &self,
        token: &CancellationToken,
        conv_id: &str,
        buffer: &mut String,
        on_partial: &mut F,
        error: ChatError,
    ) -> ChatError {
        if error.is_cancelled() {
            tracing::info!(conv = %conv_id, "Turn cancelled");
            return error;
        }
        tracing::error!(conv = %conv_id, error = %error, "Turn failed");
        buffer.push_str("\n\n**Error:** ");
        buffer.push_str(&error.to_string());
        self.deliver(token, on_partial, buffer);
        error
    }
}
