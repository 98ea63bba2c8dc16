//! `OpenAI`-compatible streaming chat completions
//!
//! Serves Azure AI deployments, GitHub Models and `OpenAI` itself. All three
//! speak the chat completions wire format with server-sent events; they differ
//! only in URL layout and authentication header.

use super::config::{ConfigError, Provider};
use super::types::{ChatUpdate, ContentPart, LlmRequest, Message, Role};
use super::{LlmError, LlmService, UpdateStream};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

enum Auth {
    Bearer(String),
    ApiKey(String),
}

/// OpenAI-compatible streaming service
pub struct OpenAIService {
    client: Client,
    url: String,
    auth: Auth,
    model: String,
    provider: Provider,
}

impl OpenAIService {
    pub fn new(
        provider: Provider,
        api_key: String,
        endpoint: &str,
        model: &str,
        azure_api_version: &str,
    ) -> Result<Self, ConfigError> {
        let base = endpoint.trim_end_matches('/');
        let (url, auth) = match provider {
            Provider::AzureAi => (
                format!("{base}/openai/deployments/{model}/chat/completions?api-version={azure_api_version}"),
                Auth::ApiKey(api_key),
            ),
            Provider::GitHubModels | Provider::OpenAI => {
                (format!("{base}/chat/completions"), Auth::Bearer(api_key))
            }
        };

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            url,
            auth,
            model: model.to_string(),
            provider,
        })
    }

    fn translate_request(&self, request: &LlmRequest) -> ChatCompletionRequest {
        let messages = request
            .messages
            .iter()
            .flat_map(translate_message)
            .collect();

        let definitions = request.tool_definitions();
        let tools = if definitions.is_empty() {
            None
        } else {
            Some(
                definitions
                    .into_iter()
                    .map(|t| WireTool {
                        r#type: "function".to_string(),
                        function: WireFunction {
                            name: t.name,
                            description: t.description,
                            parameters: t.input_schema,
                        },
                    })
                    .collect(),
            )
        };

        ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            tools,
            stream: true,
        }
    }
}

/// Translate a log message to wire messages.
/// Returns a Vec because each function result is its own "tool" message.
fn translate_message(msg: &Message) -> Vec<WireMessage> {
    let role = match msg.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };

    let mut text_parts = Vec::new();
    let mut tool_calls = Vec::new();
    let mut messages = Vec::new();

    for part in &msg.parts {
        match part {
            ContentPart::Text { text } => text_parts.push(text.as_str()),
            ContentPart::FunctionCall {
                call_id,
                name,
                arguments,
            } => tool_calls.push(WireToolCall {
                id: call_id.clone(),
                r#type: "function".to_string(),
                function: WireFunctionCall {
                    name: name.clone(),
                    arguments: Value::Object(arguments.clone()).to_string(),
                },
            }),
            ContentPart::FunctionResult {
                call_id,
                result,
                is_error,
            } => {
                let content = result.join("\n");
                messages.push(WireMessage {
                    role: "tool".to_string(),
                    content: Some(if *is_error {
                        format!("Error: {content}")
                    } else {
                        content
                    }),
                    tool_calls: None,
                    tool_call_id: Some(call_id.clone()),
                });
            }
        }
    }

    if !text_parts.is_empty() || !tool_calls.is_empty() {
        let content = if text_parts.is_empty() {
            None
        } else {
            Some(text_parts.concat())
        };
        // Text and calls precede any results carried by the same message
        let speaker = if msg.role == Role::Tool { "assistant" } else { role };
        messages.insert(
            0,
            WireMessage {
                role: speaker.to_string(),
                content,
                tool_calls: if tool_calls.is_empty() {
                    None
                } else {
                    Some(tool_calls)
                },
                tool_call_id: None,
            },
        );
    }

    if messages.is_empty() {
        messages.push(WireMessage {
            role: role.to_string(),
            content: Some(String::new()),
            tool_calls: None,
            tool_call_id: None,
        });
    }

    messages
}

/// Tool call fragments keyed by their index within the choice
#[derive(Debug, Default)]
struct ToolCallAccumulator {
    calls: BTreeMap<u32, PartialToolCall>,
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    fn push(&mut self, delta: ToolCallDelta) {
        let entry = self.calls.entry(delta.index).or_default();
        if let Some(id) = delta.id {
            entry.id = id;
        }
        if let Some(function) = delta.function {
            if let Some(name) = function.name {
                entry.name.push_str(&name);
            }
            if let Some(arguments) = function.arguments {
                entry.arguments.push_str(&arguments);
            }
        }
    }

    /// Drain complete calls, in index order
    fn flush(&mut self) -> Result<Vec<ContentPart>, LlmError> {
        std::mem::take(&mut self.calls)
            .into_values()
            .filter(|call| !call.name.is_empty())
            .map(|call| {
                let arguments = if call.arguments.trim().is_empty() {
                    Map::new()
                } else {
                    match serde_json::from_str::<Value>(&call.arguments) {
                        Ok(Value::Object(map)) => map,
                        Ok(_) | Err(_) => {
                            return Err(LlmError::malformed(format!(
                                "Function call {} has unparseable arguments: {}",
                                call.name, call.arguments
                            )))
                        }
                    }
                };
                Ok(ContentPart::function_call(call.id, call.name, arguments))
            })
            .collect()
    }
}

/// Fold one chunk into the accumulator, returning whatever is ready to emit
fn apply_chunk(
    calls: &mut ToolCallAccumulator,
    chunk: ChatCompletionChunk,
) -> Result<Vec<ContentPart>, LlmError> {
    let mut parts = Vec::new();
    for choice in chunk.choices {
        if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
            parts.push(ContentPart::text(text));
        }
        for delta in choice.delta.tool_calls.unwrap_or_default() {
            calls.push(delta);
        }
        if choice.finish_reason.is_some() {
            parts.extend(calls.flush()?);
        }
    }
    Ok(parts)
}

struct DecodeState {
    events: BoxStream<'static, Result<String, String>>,
    calls: ToolCallAccumulator,
    done: bool,
}

async fn next_decoded(
    mut st: DecodeState,
) -> Option<(Result<ChatUpdate, LlmError>, DecodeState)> {
    loop {
        if st.done {
            return None;
        }

        let data = match st.events.next().await {
            Some(Ok(data)) => data,
            Some(Err(e)) => {
                st.done = true;
                return Some((Err(LlmError::network(format!("SSE stream error: {e}"))), st));
            }
            None => {
                st.done = true;
                return Some((
                    Err(LlmError::network("SSE stream closed before response completed")),
                    st,
                ));
            }
        };

        tracing::trace!(data = %data, "Chat completion SSE event");
        if data == "[DONE]" {
            st.done = true;
            return match st.calls.flush() {
                Ok(parts) if parts.is_empty() => None,
                Ok(parts) => Some((Ok(ChatUpdate::with_parts(Role::Assistant, parts)), st)),
                Err(e) => Some((Err(e), st)),
            };
        }

        let chunk: ChatCompletionChunk = match serde_json::from_str(&data) {
            Ok(chunk) => chunk,
            Err(e) => {
                st.done = true;
                return Some((
                    Err(LlmError::malformed(format!("SSE parsing error: {e}, data: {data}"))),
                    st,
                ));
            }
        };

        if let Some(error) = chunk.error {
            st.done = true;
            return Some((
                Err(LlmError::server_error(format!("SSE API error: {}", error.message))),
                st,
            ));
        }

        match apply_chunk(&mut st.calls, chunk) {
            // Keepalive, role-only and content-filter chunks carry nothing
            Ok(parts) if parts.is_empty() => {}
            Ok(parts) => return Some((Ok(ChatUpdate::with_parts(Role::Assistant, parts)), st)),
            Err(e) => {
                st.done = true;
                return Some((Err(e), st));
            }
        }
    }
}

/// Decode SSE data payloads into chat updates
fn decode_events(events: BoxStream<'static, Result<String, String>>) -> UpdateStream {
    let state = DecodeState {
        events,
        calls: ToolCallAccumulator::default(),
        done: false,
    };
    futures::stream::unfold(state, next_decoded).boxed()
}

#[async_trait]
impl LlmService for OpenAIService {
    async fn stream(&self, request: &LlmRequest) -> Result<UpdateStream, LlmError> {
        let body = self.translate_request(request);

        let builder = self.client.post(&self.url).json(&body);
        let builder = match &self.auth {
            Auth::Bearer(key) => builder.bearer_auth(key),
            Auth::ApiKey(key) => builder.header("api-key", key),
        };

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::network(format!("Request timeout: {e}"))
            } else if e.is_connect() {
                LlmError::network(format!("Connection failed: {e}"))
            } else {
                LlmError::unknown(format!("Request failed: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map_or(body, |resp| resp.error.message);
            tracing::debug!(
                provider = self.provider.display_name(),
                %status,
                "Chat completion rejected"
            );
            return Err(LlmError::from_status(status.as_u16(), &message));
        }

        let events = response
            .bytes_stream()
            .eventsource()
            .map(|event| event.map(|e| e.data).map_err(|e| e.to_string()))
            .boxed();
        Ok(decode_events(events))
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

// Chat completions wire types

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct WireTool {
    r#type: String,
    function: WireFunction,
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize)]
struct WireToolCall {
    id: String,
    r#type: String,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<WireError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: WireError,
}

#[derive(Debug, Deserialize)]
struct WireError {
    message: String,
}
