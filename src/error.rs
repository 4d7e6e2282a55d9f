//! # Structured Error Handling
//!
//! One error type for the whole worker. Handler failures never escape the
//! dispatcher: they are folded into an [`ErrorDescriptor`] and shipped back to
//! the caller inside a failure result message.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::messaging::ContextId;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorkerError {
    #[error("Context mismatch: message for {message_context} but queue is scoped to {queue_context}")]
    ContextMismatch {
        queue_context: ContextId,
        message_context: ContextId,
    },

    #[error("Unknown handler kind: {kind}")]
    UnknownHandlerKind { kind: String },

    #[error("Data processing error: {operation}: {message}")]
    DataProcessing { operation: String, message: String },

    #[error("Report generation error: {message}")]
    ReportGeneration { message: String },

    #[error("Record not found: {id}")]
    NotFound { id: String },

    #[error("State transition error: {0}")]
    StateTransition(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl WorkerError {
    pub fn data_processing(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DataProcessing {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn report_generation(message: impl Into<String>) -> Self {
        Self::ReportGeneration {
            message: message.into(),
        }
    }

    pub fn unknown_handler_kind(kind: impl Into<String>) -> Self {
        Self::UnknownHandlerKind { kind: kind.into() }
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Stable machine-readable name used on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ContextMismatch { .. } => "ContextMismatchError",
            Self::UnknownHandlerKind { .. } => "UnknownHandlerKindError",
            Self::DataProcessing { .. } => "DataProcessingError",
            Self::ReportGeneration { .. } => "ReportGenerationError",
            Self::NotFound { .. } => "NotFoundError",
            Self::StateTransition(_) => "StateTransitionError",
            Self::Configuration(_) => "ConfigurationError",
            Self::ChannelClosed(_) => "ChannelClosedError",
            Self::Serialization(_) => "SerializationError",
        }
    }

    /// Whether the caller can recover by retrying after fixing its own state
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::UnknownHandlerKind { .. } | Self::StateTransition(_) | Self::ChannelClosed(_)
        )
    }

    pub fn to_descriptor(&self) -> ErrorDescriptor {
        ErrorDescriptor {
            kind: self.kind().to_string(),
            message: self.to_string(),
        }
    }
}

impl From<serde_json::Error> for WorkerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Error payload carried by a failure result message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub kind: String,
    pub message: String,
}

pub type Result<T> = std::result::Result<T, WorkerError>;
