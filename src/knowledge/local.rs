//! Directory-backed knowledge base
//!
//! Loads `.md` and `.txt` files below a root directory (honouring gitignore
//! rules), splits them into paragraphs, and ranks paragraphs by keyword hits.

use super::{
    is_document_extension, DocumentSearch, KnowledgeError, KnowledgeSource,
    KnowledgeSourceDetails, KnowledgeSourceStatus, SearchHit, SyncState,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Passage {
    document_id: String,
    text: String,
    lowered: String,
}

#[derive(Debug)]
struct Index {
    passages: Vec<Passage>,
    document_count: usize,
    loaded_at: DateTime<Utc>,
}

pub struct LocalKnowledgeBase {
    root: PathBuf,
    name: String,
    index: RwLock<Option<Index>>,
}

impl LocalKnowledgeBase {
    pub fn new(root: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            name: name.into(),
            index: RwLock::new(None),
        }
    }

    fn check_name(&self, name: &str) -> Result<(), KnowledgeError> {
        if name.eq_ignore_ascii_case(&self.name) {
            Ok(())
        } else {
            Err(KnowledgeError::NotFound(name.to_string()))
        }
    }

    async fn ensure_loaded(&self) -> Result<(), KnowledgeError> {
        if self.index.read().await.is_none() {
            self.load_documents().await?;
        }
        Ok(())
    }
}

fn read_passages(root: &Path) -> Result<(Vec<Passage>, usize), KnowledgeError> {
    if !root.is_dir() {
        return Err(KnowledgeError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} is not a directory", root.display()),
        )));
    }

    let mut passages = Vec::new();
    let mut document_count = 0;

    for entry in ignore::WalkBuilder::new(root).build() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        let path = entry.path();
        let is_document = path.is_file()
            && path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(is_document_extension);
        if !is_document {
            continue;
        }

        let content = std::fs::read_to_string(path)?;
        let document_id = path
            .strip_prefix(root)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");

        document_count += 1;
        passages.extend(split_paragraphs(&content).into_iter().map(|text| Passage {
            document_id: document_id.clone(),
            lowered: text.to_lowercase(),
            text,
        }));
    }

    Ok((passages, document_count))
}

/// Paragraphs separated by blank lines, with LF or CRLF endings
fn split_paragraphs(content: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in content.lines().chain(std::iter::once("")) {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n").trim().to_string());
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    paragraphs
}

/// Exact document id, or its final path component, ignoring case
fn matches_filename(document_id: &str, filter: &str) -> bool {
    let filter = filter.trim_start_matches("./").to_lowercase();
    let id = document_id.to_lowercase();
    id == filter || id.rsplit('/').next().is_some_and(|name| name == filter)
}

fn search_terms(phrase: &str) -> Vec<String> {
    phrase
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl DocumentSearch for LocalKnowledgeBase {
    async fn load_documents(&self) -> Result<usize, KnowledgeError> {
        let root = self.root.clone();
        let (passages, document_count) = tokio::task::spawn_blocking(move || read_passages(&root))
            .await
            .map_err(|e| KnowledgeError::Interrupted(e.to_string()))??;

        let count = passages.len();
        tracing::info!(
            root = %self.root.display(),
            documents = document_count,
            passages = count,
            "Loaded knowledge base"
        );

        *self.index.write().await = Some(Index {
            passages,
            document_count,
            loaded_at: Utc::now(),
        });
        Ok(count)
    }

    async fn search(
        &self,
        phrase: &str,
        filename_filter: Option<&str>,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, KnowledgeError> {
        self.ensure_loaded().await?;

        let terms = search_terms(phrase);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let index = self.index.read().await;
        let Some(index) = index.as_ref() else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<(usize, &Passage)> = index
            .passages
            .iter()
            .filter(|p| filename_filter.map_or(true, |f| matches_filename(&p.document_id, f)))
            .map(|p| {
                let score: usize =
                    terms.iter().map(|t| p.lowered.matches(t.as_str()).count()).sum();
                (score, p)
            })
            .filter(|(score, _)| *score > 0)
            .collect();
        // Stable: equal scores keep document order
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(max_results)
            .map(|(_, p)| SearchHit {
                document_id: p.document_id.clone(),
                text: p.text.clone(),
            })
            .collect())
    }
}

#[async_trait]
impl KnowledgeSource for LocalKnowledgeBase {
    async fn details(&self, name: &str) -> Result<KnowledgeSourceDetails, KnowledgeError> {
        self.check_name(name)?;
        Ok(KnowledgeSourceDetails {
            name: self.name.clone(),
            kind: "localDirectory".to_string(),
            location: self.root.display().to_string(),
            description: format!(
                "Markdown and text documents under {}",
                self.root.display()
            ),
        })
    }

    async fn status(&self, name: &str) -> Result<KnowledgeSourceStatus, KnowledgeError> {
        self.check_name(name)?;
        let index = self.index.read().await;
        Ok(match index.as_ref() {
            Some(index) => KnowledgeSourceStatus {
                name: self.name.clone(),
                state: SyncState::Ready,
                document_count: index.document_count,
                passage_count: index.passages.len(),
                last_loaded_at: Some(index.loaded_at),
            },
            None => KnowledgeSourceStatus {
                name: self.name.clone(),
                state: SyncState::NotLoaded,
                document_count: 0,
                passage_count: 0,
                last_loaded_at: None,
            },
        })
    }
}
