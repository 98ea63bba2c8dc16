//! Common types for chat exchanges

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::tools::ToolRegistry;

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Content part in a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    FunctionCall {
        call_id: String,
        name: String,
        #[serde(default)]
        arguments: Map<String, Value>,
    },
    FunctionResult {
        call_id: String,
        result: Vec<String>,
        #[serde(default)]
        is_error: bool,
    },
}

impl ContentPart {
    pub fn text(s: impl Into<String>) -> Self {
        ContentPart::Text { text: s.into() }
    }

    pub fn function_call(
        call_id: impl Into<String>,
        name: impl Into<String>,
        arguments: Map<String, Value>,
    ) -> Self {
        ContentPart::FunctionCall {
            call_id: call_id.into(),
            name: name.into(),
            arguments,
        }
    }

    pub fn function_result(
        call_id: impl Into<String>,
        result: Vec<String>,
        is_error: bool,
    ) -> Self {
        ContentPart::FunctionResult {
            call_id: call_id.into(),
            result,
            is_error,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, ContentPart::Text { .. })
    }
}

/// A function call request surfaced by the model
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub call_id: String,
    pub name: String,
    pub arguments: Map<String, Value>,
}

impl FunctionCall {
    /// Argument values joined by single spaces, in declaration order.
    ///
    /// String values are used verbatim; anything else is rendered as JSON.
    pub fn joined_arguments(&self) -> String {
        self.arguments
            .values()
            .map(|value| match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn has_arguments(&self) -> bool {
        !self.arguments.is_empty()
    }

    pub fn to_part(&self) -> ContentPart {
        ContentPart::function_call(&self.call_id, &self.name, self.arguments.clone())
    }
}

/// Message in a conversation log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<ContentPart>,
}

impl Message {
    pub fn new(role: Role, parts: Vec<ContentPart>) -> Self {
        Self { role, parts }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, vec![ContentPart::text(text)])
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![ContentPart::text(text)])
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![ContentPart::text(text)])
    }

    /// Concatenated text of all text parts
    #[cfg(test)]
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Tool definition advertised to the model
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Request for one streaming exchange
#[derive(Clone)]
pub struct LlmRequest {
    /// Window of the conversation log to transmit
    pub messages: Vec<Message>,
    /// Tools available to the model; carries invokers for decorators that run them
    pub tools: Arc<ToolRegistry>,
    /// Backend session token from a previous exchange, if the backend keeps state
    pub session_token: Option<String>,
}

impl LlmRequest {
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.definitions()
    }
}

impl std::fmt::Debug for LlmRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmRequest")
            .field("messages", &self.messages.len())
            .field("tools", &self.tools.names())
            .field("session_token", &self.session_token)
            .finish()
    }
}

/// One incremental unit of a streaming exchange
#[derive(Debug, Clone, PartialEq)]
pub struct ChatUpdate {
    /// Side that produced the content (Assistant for model output, Tool for
    /// results produced inside the exchange)
    pub role: Role,
    pub parts: Vec<ContentPart>,
    pub session_token: Option<String>,
}

impl ChatUpdate {
    #[cfg(test)]
    pub fn text(delta: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            parts: vec![ContentPart::text(delta)],
            session_token: None,
        }
    }

    pub fn with_parts(role: Role, parts: Vec<ContentPart>) -> Self {
        Self {
            role,
            parts,
            session_token: None,
        }
    }

    #[cfg(test)]
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Concatenated text deltas carried by this update
    pub fn text_delta(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Function call requests carried by this update
    pub fn function_calls(&self) -> Vec<FunctionCall> {
        self.parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::FunctionCall {
                    call_id,
                    name,
                    arguments,
                } => Some(FunctionCall {
                    call_id: call_id.clone(),
                    name: name.clone(),
                    arguments: arguments.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    /// Everything that is not a text delta
    pub fn non_text_parts(&self) -> Vec<ContentPart> {
        self.parts.iter().filter(|p| !p.is_text()).cloned().collect()
    }
}
