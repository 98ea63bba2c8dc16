//! Model exchange abstraction
//!
//! A backend turns a window of the conversation plus the available tools into
//! a lazy, finite, one-shot stream of updates. Dropping the stream abandons
//! the exchange.

mod config;
mod error;
mod function_invocation;
mod openai;
mod types;

pub use config::{build_service, LlmConfig};
pub use error::LlmError;
pub use function_invocation::FunctionInvokingService;
pub use openai::OpenAIService;
pub use types::*;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::Arc;
use std::task::Poll;

/// Ordered updates of one exchange
pub type UpdateStream = BoxStream<'static, Result<ChatUpdate, LlmError>>;

/// Common interface for chat backends
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Open a streaming exchange
    async fn stream(&self, request: &LlmRequest) -> Result<UpdateStream, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

#[async_trait]
impl<T: LlmService + ?Sized> LlmService for Arc<T> {
    async fn stream(&self, request: &LlmRequest) -> Result<UpdateStream, LlmError> {
        (**self).stream(request).await
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

/// Logging wrapper for LLM services
pub struct LoggingService {
    inner: Arc<dyn LlmService>,
    model_id: String,
}

impl LoggingService {
    pub fn new(inner: Arc<dyn LlmService>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl LlmService for LoggingService {
    async fn stream(&self, request: &LlmRequest) -> Result<UpdateStream, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.stream(request).await;

        let stream = match result {
            Ok(stream) => {
                tracing::info!(
                    model = %self.model_id,
                    duration_ms = %start.elapsed().as_millis(),
                    messages = request.messages.len(),
                    stateful = request.session_token.is_some(),
                    "LLM stream opened"
                );
                stream
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %start.elapsed().as_millis(),
                    error = %e.message,
                    transient = e.kind.is_transient(),
                    "LLM stream failed to open"
                );
                return Err(e);
            }
        };

        let model = self.model_id.clone();
        let error_model = self.model_id.clone();
        let finished = futures::stream::poll_fn(move |_| {
            tracing::info!(
                model = %model,
                duration_ms = %start.elapsed().as_millis(),
                "LLM stream finished"
            );
            Poll::<Option<Result<ChatUpdate, LlmError>>>::Ready(None)
        });

        Ok(stream
            .inspect(move |item| {
                if let Err(e) = item {
                    tracing::error!(model = %error_model, error = %e.message, "LLM stream failed");
                }
            })
            .chain(finished)
            .boxed())
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
