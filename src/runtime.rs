//! Runtime for conversation turns
//!
//! One `ChatService` per conversation. It owns the log, the tool registry and
//! the cancellation scope of the turn in flight.

mod cancellation;
mod orchestrator;

#[cfg(test)]
pub mod testing;

pub use cancellation::CancellationController;
pub use orchestrator::{ChatService, ShortCircuitPolicy};

use crate::llm::LlmError;
use crate::tools::ToolError;
use thiserror::Error;

/// Why a turn did not produce a final message
#[derive(Debug, Error)]
pub enum ChatError {
    /// Superseded by a newer turn, a reset, or the caller's signal
    #[error("turn cancelled")]
    Cancelled,
    #[error(transparent)]
    Transport(#[from] LlmError),
    #[error(transparent)]
    Tool(#[from] ToolError),
}

impl ChatError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ChatError::Cancelled)
    }
}
