//! Tools exposed to the model for a conversation
//!
//! The registry is a closed, ordered set built once per conversation. Lookup is
//! by exact name; there is no runtime discovery.

mod knowledge_base;
mod knowledge_source;

pub use knowledge_base::{LoadDocumentsTool, SearchTool};
pub use knowledge_source::{KnowledgeSourceDetailsTool, KnowledgeSourceStatusTool};

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::knowledge::{DocumentSearch, KnowledgeSource};
use crate::llm::ToolDefinition;

/// A tool invocation failed, or the requested tool does not exist
#[derive(Debug, Clone, Error)]
#[error("tool {tool} failed: {message}")]
pub struct ToolError {
    pub tool: String,
    pub message: String,
}

impl ToolError {
    pub fn new(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn unknown_tool(name: &str) -> Self {
        Self::new(name, "no such tool is registered for this conversation")
    }
}

/// Trait for tools the model can call
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name, unique within a registry
    fn name(&self) -> &str;

    /// Tool description for the model
    fn description(&self) -> String;

    /// JSON schema for the tool's arguments
    fn input_schema(&self) -> Value;

    /// Run the tool with its argument values joined into a single string.
    ///
    /// Tools without arguments ignore `args`.
    async fn invoke(&self, args: &str) -> Result<Vec<String>, ToolError>;
}

/// Ordered collection of tools available to one conversation
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Build a registry; a tool whose name is already taken is dropped.
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        let mut unique: Vec<Arc<dyn Tool>> = Vec::with_capacity(tools.len());
        for tool in tools {
            if unique.iter().any(|t| t.name() == tool.name()) {
                tracing::warn!(
                    tool = %tool.name(),
                    "Duplicate tool name, keeping first registration"
                );
                continue;
            }
            unique.push(tool);
        }
        Self { tools: unique }
    }

    /// Standard knowledge-base tool set
    pub fn knowledge(
        search: Arc<dyn DocumentSearch>,
        source: Arc<dyn KnowledgeSource>,
        source_name: &str,
    ) -> Self {
        Self::new(vec![
            Arc::new(LoadDocumentsTool::new(search.clone())),
            Arc::new(SearchTool::new(search)),
            Arc::new(KnowledgeSourceDetailsTool::new(source.clone(), source_name)),
            Arc::new(KnowledgeSourceStatusTool::new(source, source_name)),
        ])
    }

    /// Get all tool definitions for the model
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Invoke a tool by exact name. No retries.
    pub async fn invoke(&self, name: &str, args: &str) -> Result<Vec<String>, ToolError> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| ToolError::unknown_tool(name))?;

        let start = std::time::Instant::now();
        let result = tool.invoke(args).await;
        match &result {
            Ok(output) => tracing::info!(
                tool = %name,
                duration_ms = %start.elapsed().as_millis(),
                results = output.len(),
                "Tool invoked"
            ),
            Err(e) => tracing::warn!(
                tool = %name,
                duration_ms = %start.elapsed().as_millis(),
                error = %e.message,
                "Tool failed"
            ),
        }
        result
    }
}
