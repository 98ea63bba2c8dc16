//! Knowledge source info tools. Both take no arguments and return one
//! pretty-printed JSON document.

use super::{Tool, ToolError};
use crate::knowledge::KnowledgeSource;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

fn to_pretty_json(tool: &str, value: &impl Serialize) -> Result<Vec<String>, ToolError> {
    serde_json::to_string_pretty(value)
        .map(|json| vec![json])
        .map_err(|e| ToolError::new(tool, format!("failed to serialize: {e}")))
}

fn no_arguments() -> Value {
    json!({
        "type": "object",
        "properties": {}
    })
}

pub struct KnowledgeSourceDetailsTool {
    source: Arc<dyn KnowledgeSource>,
    source_name: String,
}

impl KnowledgeSourceDetailsTool {
    pub fn new(source: Arc<dyn KnowledgeSource>, source_name: impl Into<String>) -> Self {
        Self {
            source,
            source_name: source_name.into(),
        }
    }
}

#[async_trait]
impl Tool for KnowledgeSourceDetailsTool {
    fn name(&self) -> &'static str {
        "GetKnowledgeSourceAsync"
    }

    fn description(&self) -> String {
        "Gets the details of the specified knowledge source".to_string()
    }

    fn input_schema(&self) -> Value {
        no_arguments()
    }

    async fn invoke(&self, _args: &str) -> Result<Vec<String>, ToolError> {
        let details = self
            .source
            .details(&self.source_name)
            .await
            .map_err(|e| ToolError::new(self.name(), e.to_string()))?;
        to_pretty_json(self.name(), &details)
    }
}

pub struct KnowledgeSourceStatusTool {
    source: Arc<dyn KnowledgeSource>,
    source_name: String,
}

impl KnowledgeSourceStatusTool {
    pub fn new(source: Arc<dyn KnowledgeSource>, source_name: impl Into<String>) -> Self {
        Self {
            source,
            source_name: source_name.into(),
        }
    }
}

#[async_trait]
impl Tool for KnowledgeSourceStatusTool {
    fn name(&self) -> &'static str {
        "GetKnowledgeSourceStatusAsync"
    }

    fn description(&self) -> String {
        "Checks the status of the specified knowledge source".to_string()
    }

    fn input_schema(&self) -> Value {
        no_arguments()
    }

    async fn invoke(&self, _args: &str) -> Result<Vec<String>, ToolError> {
        let status = self
            .source
            .status(&self.source_name)
            .await
            .map_err(|e| ToolError::new(self.name(), e.to_string()))?;
        to_pretty_json(self.name(), &status)
    }
}
