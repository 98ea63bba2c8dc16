//! System prompt construction
//!
//! The default prompt confines the assistant to its knowledge base. A guidance
//! file in the data directory (GUIDANCE.md, else AGENTS.md) is appended so
//! operators can describe their documents without replacing the prompt.

use std::fmt::Write;
use std::path::{Path, PathBuf};

/// Names of guidance files to look for, in order of preference
const GUIDANCE_FILE_NAMES: &[&str] = &["GUIDANCE.md", "AGENTS.md"];

/// Base system prompt establishing the assistant's role
const BASE_PROMPT: &str = r"You are an assistant who answers questions about information in your knowledge base.
If you don't know the answer, say that you don't know. Do not make anything up.

Use the LoadDocumentsAsync tool to prepare for searches before answering any questions.
Use the GetKnowledgeSourceAsync tool to get information about the knowledge source.
Use the GetKnowledgeSourceStatusAsync tool to check the status of the knowledge source.

Use the SearchAsync tool to find relevant information. When you do this, end your
reply with citations in this XML format:

<citation>exact quote here</citation>

Use only simple markdown to format your responses.

Politely refuse to answer questions that your knowledge base does not cover.";

/// A guidance file with its path and content
#[derive(Debug, Clone)]
pub struct GuidanceFile {
    pub path: PathBuf,
    pub content: String,
}

/// First guidance file present in `data_dir`, if any
pub fn discover_guidance_file(data_dir: &Path) -> Option<GuidanceFile> {
    GUIDANCE_FILE_NAMES.iter().find_map(|name| {
        let path = data_dir.join(name);
        if !path.is_file() {
            return None;
        }
        match std::fs::read_to_string(&path) {
            Ok(content) => Some(GuidanceFile { path, content }),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Unreadable guidance file");
                None
            }
        }
    })
}

/// Build the system prompt. A non-blank override replaces everything.
pub fn build_system_prompt(override_prompt: Option<&str>, data_dir: &Path) -> String {
    if let Some(custom) = override_prompt.filter(|p| !p.trim().is_empty()) {
        return custom.to_string();
    }

    let mut prompt = String::from(BASE_PROMPT);
    if let Some(file) = discover_guidance_file(data_dir) {
        prompt.push_str("\n\n<knowledge_base_guidance>\n");
        let _ = writeln!(prompt, "<!-- From: {} -->", file.path.display());
        prompt.push_str(&file.content);
        if !file.content.ends_with('\n') {
            prompt.push('\n');
        }
        prompt.push_str("</knowledge_base_guidance>");
    }
    prompt
}
