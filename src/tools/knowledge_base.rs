//! Knowledge base tools - document loading and passage search

use super::{Tool, ToolError};
use crate::knowledge::{is_document_extension, DocumentSearch};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

const MAX_SEARCH_RESULTS: usize = 5;

/// Split joined arguments into the phrase and an optional trailing file name.
///
/// Arguments arrive as their values joined by spaces, so a filter can only be
/// recognised by shape: a last word with a document extension after some
/// phrase. A question that ends in a document name ("what changed in
/// notes.md") is still read as filtered to that document.
fn split_filename_filter(args: &str) -> (&str, Option<&str>) {
    let args = args.trim();
    match args.rsplit_once(' ') {
        Some((phrase, last))
            if !phrase.trim().is_empty()
                && std::path::Path::new(last)
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(is_document_extension) =>
        {
            (phrase.trim(), Some(last))
        }
        _ => (args, None),
    }
}

/// Loads the documents searches run against
pub struct LoadDocumentsTool {
    search: Arc<dyn DocumentSearch>,
}

impl LoadDocumentsTool {
    pub fn new(search: Arc<dyn DocumentSearch>) -> Self {
        Self { search }
    }
}

#[async_trait]
impl Tool for LoadDocumentsTool {
    fn name(&self) -> &'static str {
        "LoadDocumentsAsync"
    }

    fn description(&self) -> String {
        "Loads the documents needed for performing searches. Must be completed before a search can be executed, but only needs to be completed once.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn invoke(&self, _args: &str) -> Result<Vec<String>, ToolError> {
        let count = self
            .search
            .load_documents()
            .await
            .map_err(|e| ToolError::new(self.name(), e.to_string()))?;
        Ok(vec![format!("Loaded {count} passages; searches are ready.")])
    }
}

/// Searches the knowledge base. Its output is shown to the user verbatim.
pub struct SearchTool {
    search: Arc<dyn DocumentSearch>,
}

impl SearchTool {
    pub fn new(search: Arc<dyn DocumentSearch>) -> Self {
        Self { search }
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &'static str {
        "SearchAsync"
    }

    fn description(&self) -> String {
        "Searches for information using a phrase or keyword. Relies on documents already being loaded.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["searchPhrase"],
            "properties": {
                "searchPhrase": {
                    "type": "string",
                    "description": "The phrase to search for."
                },
                "filenameFilter": {
                    "type": "string",
                    "description": "If possible, specify the filename to search that file only. If not provided or empty, the search includes all files."
                }
            }
        })
    }

    async fn invoke(&self, args: &str) -> Result<Vec<String>, ToolError> {
        let (phrase, filename_filter) = split_filename_filter(args);
        if phrase.is_empty() {
            return Err(ToolError::new(self.name(), "searchPhrase is required"));
        }

        let hits = self
            .search
            .search(phrase, filename_filter, MAX_SEARCH_RESULTS)
            .await
            .map_err(|e| ToolError::new(self.name(), e.to_string()))?;

        if hits.is_empty() {
            return Ok(vec![format!("No results found for \"{phrase}\".")]);
        }

        Ok(hits
            .into_iter()
            .map(|hit| format!("<result filename=\"{}\">{}</result>", hit.document_id, hit.text))
            .collect())
    }
}
