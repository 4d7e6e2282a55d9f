//! # Message Handlers
//!
//! Handlers execute one dequeued [`WorkMessage`] at a time on behalf of the
//! dispatcher. The data and report handlers share one explicitly owned
//! [`DatasetState`]; the report handler only ever reads it.

pub mod data_handler;
pub mod dataset;
pub mod query;
pub mod report_handler;

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

use crate::error::Result;
use crate::messaging::{HandlerKind, WorkMessage, WorkerResult};

pub use data_handler::{DataHandler, DataRequest};
pub use dataset::DatasetState;
pub use query::{build_windows, QueryWindows};
pub use report_handler::{ReportHandler, ReportRenderer, SummaryReportRenderer};

/// Dataset shared by the handlers of one background worker
///
/// Only the dispatcher's single in-flight handler touches it, so locks are
/// short and never held across an await.
pub type SharedDataset = Arc<RwLock<DatasetState>>;

pub fn shared_dataset() -> SharedDataset {
    Arc::new(RwLock::new(DatasetState::default()))
}

/// Trait for message handlers
///
/// All handlers must implement this trait to be registered with the
/// [`HandlerRegistry`](crate::execution::HandlerRegistry). Failures are
/// returned, never panicked; the dispatcher converts them into failure
/// results.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle a message and produce the result payload
    async fn handle(&self, message: WorkMessage) -> Result<WorkerResult>;

    /// Get handler name for debugging
    fn handler_name(&self) -> &str;

    /// The handler kind this implementation serves
    fn kind(&self) -> HandlerKind;
}
