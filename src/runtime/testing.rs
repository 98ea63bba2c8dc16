//! Mock implementations for testing
//!
//! These mocks enable orchestration tests without network or disk I/O.

use crate::llm::{ChatUpdate, ContentPart, LlmError, LlmRequest, LlmService, Role, UpdateStream};
use crate::tools::{Tool, ToolError};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Assistant update carrying a single function call
pub fn call_update(call_id: &str, name: &str, arguments: Value) -> ChatUpdate {
    let arguments = match arguments {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    ChatUpdate::with_parts(
        Role::Assistant,
        vec![ContentPart::function_call(call_id, name, arguments)],
    )
}

// ============================================================================
// Mock LLM Client
// ============================================================================

enum Script {
    Stream {
        items: Vec<Result<ChatUpdate, LlmError>>,
        hang: bool,
    },
    OpenError(LlmError),
}

/// Mock backend that replays queued streams in order
pub struct MockLlmClient {
    scripts: Mutex<VecDeque<Script>>,
    model_id: String,
    /// Record of all requests made
    pub requests: Mutex<Vec<LlmRequest>>,
    /// Notified each time a stream is opened (permits accumulate)
    pub stream_opened: Arc<Notify>,
}

#[allow(dead_code)]
impl MockLlmClient {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            model_id: model_id.into(),
            requests: Mutex::new(Vec::new()),
            stream_opened: Arc::new(Notify::new()),
        }
    }

    /// Queue a stream that yields `updates` and ends
    pub fn queue_stream(&self, updates: Vec<ChatUpdate>) {
        self.push(Script::Stream {
            items: updates.into_iter().map(Ok).collect(),
            hang: false,
        });
    }

    /// Queue a stream that yields `updates` and then never ends
    pub fn queue_hanging_stream(&self, updates: Vec<ChatUpdate>) {
        self.push(Script::Stream {
            items: updates.into_iter().map(Ok).collect(),
            hang: true,
        });
    }

    /// Queue a stream that fails after yielding `updates`
    pub fn queue_stream_then_error(&self, updates: Vec<ChatUpdate>, error: LlmError) {
        let mut items: Vec<_> = updates.into_iter().map(Ok).collect();
        items.push(Err(error));
        self.push(Script::Stream { items, hang: false });
    }

    /// Queue a failure to open the stream at all
    pub fn queue_open_error(&self, error: LlmError) {
        self.push(Script::OpenError(error));
    }

    /// Get recorded requests
    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn push(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }
}

#[async_trait]
impl LlmService for MockLlmClient {
    async fn stream(&self, request: &LlmRequest) -> Result<UpdateStream, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        let script = self.scripts.lock().unwrap().pop_front();
        self.stream_opened.notify_one();

        match script {
            Some(Script::Stream { items, hang }) => {
                let stream = futures::stream::iter(items);
                if hang {
                    Ok(stream.chain(futures::stream::pending()).boxed())
                } else {
                    Ok(stream.boxed())
                }
            }
            Some(Script::OpenError(e)) => Err(e),
            None => Err(LlmError::network("No mock stream queued")),
        }
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// ============================================================================
// Mock Tool
// ============================================================================

enum Behavior {
    Return(Vec<String>),
    Fail(String),
    Hang,
}

/// Mock tool with a fixed outcome
pub struct MockTool {
    name: String,
    behavior: Behavior,
    /// Record of the argument strings received
    pub invocations: Mutex<Vec<String>>,
    /// Notified when an invocation starts
    pub invocation_started: Arc<Notify>,
}

#[allow(dead_code)]
impl MockTool {
    pub fn new(name: impl Into<String>, output: Vec<String>) -> Self {
        Self::with_behavior(name, Behavior::Return(output))
    }

    pub fn failing(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_behavior(name, Behavior::Fail(message.into()))
    }

    /// A tool whose invocation never completes
    pub fn hanging(name: impl Into<String>) -> Self {
        Self::with_behavior(name, Behavior::Hang)
    }

    fn with_behavior(name: impl Into<String>, behavior: Behavior) -> Self {
        Self {
            name: name.into(),
            behavior,
            invocations: Mutex::new(Vec::new()),
            invocation_started: Arc::new(Notify::new()),
        }
    }

    /// Get recorded invocations
    pub fn recorded_invocations(&self) -> Vec<String> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl Tool for MockTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        format!("Mock {}", self.name)
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn invoke(&self, args: &str) -> Result<Vec<String>, ToolError> {
        self.invocations.lock().unwrap().push(args.to_string());
        self.invocation_started.notify_one();
        match &self.behavior {
            Behavior::Return(output) => Ok(output.clone()),
            Behavior::Fail(message) => Err(ToolError::new(&self.name, message.clone())),
            Behavior::Hang => futures::future::pending().await,
        }
    }
}
