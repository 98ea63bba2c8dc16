//! Backend configuration
//!
//! Everything is read from the environment. Missing or unusable settings are
//! fatal at construction time; the chat engine never sees them.

use super::{FunctionInvokingService, LlmService, LoggingService, OpenAIService};
use std::sync::Arc;
use thiserror::Error;

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_AZURE_API_VERSION: &str = "2024-10-21";

/// Chat backend provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    AzureAi,
    GitHubModels,
    OpenAI,
}

impl Provider {
    /// Case-insensitive provider name as written in configuration
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "azureai" => Some(Provider::AzureAi),
            "githubmodels" => Some(Provider::GitHubModels),
            "openai" => Some(Provider::OpenAI),
            _ => None,
        }
    }

    /// Get the display name for this provider
    pub fn display_name(self) -> &'static str {
        match self {
            Provider::AzureAi => "Azure AI",
            Provider::GitHubModels => "GitHub Models",
            Provider::OpenAI => "OpenAI",
        }
    }

    /// Endpoint used when none is configured. Azure deployments have no default.
    pub fn default_endpoint(self) -> Option<&'static str> {
        match self {
            Provider::AzureAi => None,
            Provider::GitHubModels => Some("https://models.github.ai/inference"),
            Provider::OpenAI => Some("https://api.openai.com/v1"),
        }
    }
}

/// Configuration for the chat backend
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    pub provider: Option<String>,
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub azure_api_version: Option<String>,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            provider: std::env::var("FELLOW_AI_PROVIDER").ok(),
            api_key: std::env::var("FELLOW_AI_API_KEY").ok(),
            endpoint: std::env::var("FELLOW_AI_ENDPOINT").ok(),
            model: std::env::var("FELLOW_AI_MODEL").ok(),
            azure_api_version: std::env::var("FELLOW_AZURE_API_VERSION").ok(),
        }
    }

    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_MODEL)
    }

    pub fn azure_api_version(&self) -> &str {
        self.azure_api_version
            .as_deref()
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_AZURE_API_VERSION)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing configuration: FELLOW_AI_PROVIDER")]
    MissingProvider,
    #[error("unknown AI provider {0:?} (expected AzureAi, GitHubModels or OpenAI)")]
    UnknownProvider(String),
    #[error("{} requires FELLOW_AI_API_KEY", .0.display_name())]
    MissingApiKey(Provider),
    #[error("{} requires FELLOW_AI_ENDPOINT", .0.display_name())]
    MissingEndpoint(Provider),
    #[error("failed to create HTTP client: {0}")]
    HttpClient(String),
}

/// Build the production backend: provider client, wrapped with logging, wrapped
/// with function invocation so non-search tools run inside the exchange.
pub fn build_service(config: &LlmConfig) -> Result<Arc<dyn LlmService>, ConfigError> {
    let name = config
        .provider
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .ok_or(ConfigError::MissingProvider)?;
    let provider =
        Provider::parse(name).ok_or_else(|| ConfigError::UnknownProvider(name.to_string()))?;

    let api_key = config
        .api_key
        .clone()
        .filter(|k| !k.is_empty())
        .ok_or(ConfigError::MissingApiKey(provider))?;

    let endpoint = config
        .endpoint
        .as_deref()
        .filter(|e| !e.is_empty())
        .or_else(|| provider.default_endpoint())
        .ok_or(ConfigError::MissingEndpoint(provider))?;

    let client = OpenAIService::new(
        provider,
        api_key,
        endpoint,
        config.model(),
        config.azure_api_version(),
    )?;
    tracing::info!(
        provider = provider.display_name(),
        model = %config.model(),
        "Chat backend configured"
    );

    let logged: Arc<dyn LlmService> = Arc::new(LoggingService::new(Arc::new(client)));
    Ok(Arc::new(FunctionInvokingService::new(logged)))
}
