//! Handler Registry
//!
//! Dispatch table from the closed [`HandlerKind`] set to handler
//! implementations. String tags never reach this layer; they are parsed at
//! the envelope boundary.

use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::WorkerConfig;
use crate::error::{Result, WorkerError};
use crate::handlers::{DataHandler, MessageHandler, ReportHandler, SharedDataset};
use crate::messaging::HandlerKind;

/// Registry of message handlers by kind
///
/// # Examples
///
/// ```rust
/// use patient_worker::config::WorkerConfig;
/// use patient_worker::execution::HandlerRegistry;
/// use patient_worker::handlers::shared_dataset;
/// use patient_worker::messaging::HandlerKind;
///
/// let registry = HandlerRegistry::with_default_handlers(shared_dataset(), &WorkerConfig::default());
/// assert!(registry.has_handler(HandlerKind::Data));
/// assert!(registry.has_handler(HandlerKind::Report));
/// ```
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<HandlerKind, Arc<dyn MessageHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry wired with the data and report handlers over one dataset
    pub fn with_default_handlers(dataset: SharedDataset, config: &WorkerConfig) -> Self {
        let registry = Self::new();
        registry.register(Arc::new(DataHandler::new(dataset.clone(), config)));
        registry.register(Arc::new(ReportHandler::new(dataset)));
        registry
    }

    /// Register a handler under the kind it declares
    ///
    /// Returns the handler it replaced, if any.
    pub fn register(&self, handler: Arc<dyn MessageHandler>) -> Option<Arc<dyn MessageHandler>> {
        let kind = handler.kind();
        let name = handler.handler_name().to_string();
        let replaced = self.handlers.insert(kind, handler);

        if replaced.is_some() {
            warn!(kind = %kind, handler = %name, "Replacing existing handler");
        } else {
            info!(kind = %kind, handler = %name, "Registered message handler");
        }

        replaced
    }

    /// Unregister a handler
    pub fn unregister(&self, kind: HandlerKind) -> bool {
        let removed = self.handlers.remove(&kind).is_some();

        if removed {
            info!(kind = %kind, "Unregistered message handler");
        } else {
            warn!(kind = %kind, "Attempted to unregister non-existent handler");
        }

        removed
    }

    /// Find the handler for a kind
    pub fn resolve(&self, kind: HandlerKind) -> Result<Arc<dyn MessageHandler>> {
        self.handlers
            .get(&kind)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| WorkerError::unknown_handler_kind(kind.to_string()))
    }

    pub fn has_handler(&self, kind: HandlerKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Registered kinds in declaration order
    pub fn registered_kinds(&self) -> Vec<HandlerKind> {
        HandlerKind::ALL
            .into_iter()
            .filter(|kind| self.has_handler(*kind))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("kinds", &self.registered_kinds())
            .finish()
    }
}
