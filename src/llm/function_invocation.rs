//! Function-invoking decorator
//!
//! Runs the tool calls a backend requests and re-prompts it with the results,
//! all inside a single update stream. Callers see the calls and the results as
//! non-text fragments between text deltas. Tools only run once the inner
//! stream is exhausted, so a consumer that stops early (the search
//! short-circuit) never triggers them.

use super::{
    ChatUpdate, ContentPart, FunctionCall, LlmError, LlmRequest, LlmService, Message, Role,
    UpdateStream,
};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;

const DEFAULT_MAX_ROUND_TRIPS: usize = 10;

pub struct FunctionInvokingService {
    inner: Arc<dyn LlmService>,
    max_round_trips: usize,
}

impl FunctionInvokingService {
    pub fn new(inner: Arc<dyn LlmService>) -> Self {
        Self {
            inner,
            max_round_trips: DEFAULT_MAX_ROUND_TRIPS,
        }
    }

    #[cfg(test)]
    pub fn with_max_round_trips(mut self, max: usize) -> Self {
        self.max_round_trips = max;
        self
    }
}

struct Exchange {
    inner: Arc<dyn LlmService>,
    request: LlmRequest,
    current: Option<UpdateStream>,
    pending: Vec<FunctionCall>,
    session_token: Option<String>,
    round_trips: usize,
    max_round_trips: usize,
    finished: bool,
}

impl Exchange {
    async fn invoke_pending(&mut self) -> (Message, Vec<ContentPart>) {
        let calls = std::mem::take(&mut self.pending);
        let mut results = Vec::with_capacity(calls.len());
        for call in &calls {
            let part = match self
                .request
                .tools
                .invoke(&call.name, &call.joined_arguments())
                .await
            {
                Ok(result) => ContentPart::function_result(&call.call_id, result, false),
                // Reported back to the model, which decides how to proceed
                Err(e) => ContentPart::function_result(
                    &call.call_id,
                    vec![format!("Error: {}", e.message)],
                    true,
                ),
            };
            results.push(part);
        }
        let calls_message = Message::new(
            Role::Assistant,
            calls.iter().map(FunctionCall::to_part).collect(),
        );
        (calls_message, results)
    }
}

async fn next_update(mut ex: Exchange) -> Option<(Result<ChatUpdate, LlmError>, Exchange)> {
    if ex.finished {
        return None;
    }

    if let Some(stream) = ex.current.as_mut() {
        match stream.next().await {
            Some(Ok(update)) => {
                ex.pending.extend(update.function_calls());
                if update.session_token.is_some() {
                    ex.session_token.clone_from(&update.session_token);
                }
                return Some((Ok(update), ex));
            }
            Some(Err(e)) => {
                ex.finished = true;
                return Some((Err(e), ex));
            }
            None => ex.current = None,
        }
    }

    if ex.pending.is_empty() {
        return None;
    }
    if ex.round_trips >= ex.max_round_trips {
        tracing::warn!(
            round_trips = ex.round_trips,
            pending = ex.pending.len(),
            "Function invocation limit reached, leaving calls unanswered"
        );
        return None;
    }

    let (calls_message, results) = ex.invoke_pending().await;
    let results_message = Message::new(Role::Tool, results.clone());

    if ex.session_token.is_some() {
        // Backend already holds everything up to its last response
        ex.request.messages = vec![calls_message, results_message];
    } else {
        ex.request.messages.push(calls_message);
        ex.request.messages.push(results_message);
    }
    ex.request.session_token.clone_from(&ex.session_token);
    ex.round_trips += 1;

    match ex.inner.stream(&ex.request).await {
        Ok(stream) => ex.current = Some(stream),
        Err(e) => {
            ex.finished = true;
            return Some((Err(e), ex));
        }
    }

    Some((Ok(ChatUpdate::with_parts(Role::Tool, results)), ex))
}

#[async_trait]
impl LlmService for FunctionInvokingService {
    async fn stream(&self, request: &LlmRequest) -> Result<UpdateStream, LlmError> {
        let first = self.inner.stream(request).await?;
        let exchange = Exchange {
            inner: self.inner.clone(),
            request: request.clone(),
            current: Some(first),
            pending: Vec::new(),
            session_token: request.session_token.clone(),
            round_trips: 0,
            max_round_trips: self.max_round_trips,
            finished: false,
        };
        Ok(futures::stream::unfold(exchange, next_update).boxed())
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::testing::{call_update, MockLlmClient, MockTool};
    use crate::tools::ToolRegistry;
    use futures::TryStreamExt;
    use serde_json::json;

    fn request(tools: ToolRegistry) -> LlmRequest {
        LlmRequest {
            messages: vec![Message::system("sys"), Message::user("status?")],
            tools: Arc::new(tools),
            session_token: None,
        }
    }

    #[tokio::test]
    async fn test_runs_calls_and_reprompts() {
        let llm = Arc::new(MockLlmClient::new("mock"));
        llm.queue_stream(vec![call_update(
            "c1",
            "GetKnowledgeSourceStatusAsync",
            json!({}),
        )]);
        llm.queue_stream(vec![ChatUpdate::text("All "), ChatUpdate::text("good.")]);

        let tool = Arc::new(MockTool::new(
            "GetKnowledgeSourceStatusAsync",
            vec!["ready".to_string()],
        ));
        let service = FunctionInvokingService::new(llm.clone());
        let updates: Vec<ChatUpdate> = service
            .stream(&request(ToolRegistry::new(vec![tool.clone()])))
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(updates.len(), 4);
        assert_eq!(updates[1].role, Role::Tool);
        assert_eq!(
            updates[1].parts,
            vec![ContentPart::function_result("c1", vec!["ready".to_string()], false)]
        );
        assert_eq!(updates[2].text_delta(), "All ");
        assert_eq!(tool.recorded_invocations(), vec![String::new()]);

        // Stateless backend: the follow-up resends history plus the round trip
        let requests = llm.recorded_requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].messages.len(), 4);
        assert_eq!(requests[1].messages[2].role, Role::Assistant);
        assert_eq!(requests[1].messages[3].role, Role::Tool);
    }

    #[tokio::test]
    async fn test_stateful_follow_up_sends_only_round_trip() {
        let llm = Arc::new(MockLlmClient::new("mock"));
        llm.queue_stream(vec![
            call_update("c1", "LoadDocumentsAsync", json!({})).with_session_token("resp_1")
        ]);
        llm.queue_stream(vec![ChatUpdate::text("done")]);

        let tool = Arc::new(MockTool::new("LoadDocumentsAsync", vec!["loaded".to_string()]));
        let service = FunctionInvokingService::new(llm.clone());
        let _: Vec<ChatUpdate> = service
            .stream(&request(ToolRegistry::new(vec![tool])))
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        let requests = llm.recorded_requests();
        assert_eq!(requests[1].messages.len(), 2);
        assert_eq!(requests[1].session_token.as_deref(), Some("resp_1"));
    }

    #[tokio::test]
    async fn test_tool_errors_are_returned_to_model() {
        let llm = Arc::new(MockLlmClient::new("mock"));
        llm.queue_stream(vec![call_update("c1", "Missing", json!({}))]);
        llm.queue_stream(vec![ChatUpdate::text("sorry")]);

        let service = FunctionInvokingService::new(llm.clone());
        let updates: Vec<ChatUpdate> = service
            .stream(&request(ToolRegistry::default()))
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        match &updates[1].parts[0] {
            ContentPart::FunctionResult { is_error, .. } => assert!(*is_error),
            other => panic!("expected function result, got {other:?}"),
        }
        assert_eq!(updates[2].text_delta(), "sorry");
    }

    #[tokio::test]
    async fn test_stopping_early_never_invokes_tools() {
        let llm = Arc::new(MockLlmClient::new("mock"));
        llm.queue_stream(vec![
            call_update("c1", "SearchAsync", json!({"searchPhrase": "hours"})),
            ChatUpdate::text("ignored"),
        ]);

        let tool = Arc::new(MockTool::new("SearchAsync", vec!["hit".to_string()]));
        let service = FunctionInvokingService::new(llm.clone());
        let mut stream = service
            .stream(&request(ToolRegistry::new(vec![tool.clone()])))
            .await
            .unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.function_calls().len(), 1);
        drop(stream);

        assert!(tool.recorded_invocations().is_empty());
        assert_eq!(llm.recorded_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_round_trip_limit() {
        let llm = Arc::new(MockLlmClient::new("mock"));
        llm.queue_stream(vec![call_update("c1", "Echo", json!({}))]);
        llm.queue_stream(vec![call_update("c2", "Echo", json!({}))]);

        let tool = Arc::new(MockTool::new("Echo", vec!["again".to_string()]));
        let service = FunctionInvokingService::new(llm.clone()).with_max_round_trips(1);
        let updates: Vec<ChatUpdate> = service
            .stream(&request(ToolRegistry::new(vec![tool.clone()])))
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(updates.len(), 3);
        assert_eq!(tool.recorded_invocations().len(), 1);
    }
}
