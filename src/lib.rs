#![allow(clippy::doc_markdown)] // Allow technical terms like camelCase field names in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Patient Worker Core
//!
//! Background worker for per-patient health-data aggregation and report
//! generation, plus the caller-side merge of its results.
//!
//! ## Overview
//!
//! A caller sends work messages tagged with a patient context over a single
//! channel. The worker keeps one FIFO queue scoped to the active context,
//! processes exactly one message at a time, and answers every message with a
//! result message. When the context changes, pending work for the old
//! context is discarded; a handler already in flight is allowed to finish.
//!
//! ## Architecture
//!
//! ```text
//! caller ─► ContextGuard ─► WorkQueue ─► Dispatcher ─► { DataHandler | ReportHandler }
//!                                                   │
//! caller ◄── ResultMerger ◄── ResultMessage ◄───────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`messaging`] - Inbound envelopes, typed work messages and results
//! - [`queue`] - Work queue and context guard
//! - [`state_machine`] - Idle/Processing dispatcher lifecycle
//! - [`execution`] - Handler registry, dispatcher and background worker
//! - [`handlers`] - Data and report handlers over the shared dataset
//! - [`store`] - Canonical store and result merger (caller side)
//! - [`models`] - Records, windows, queries and reports
//! - [`config`] - Layered configuration
//! - [`error`] - Structured error handling
//! - [`events`] - Lifecycle event broadcasting
//!
//! ## Quick Start
//!
//! ```rust
//! use patient_worker::config::WorkerConfig;
//! use patient_worker::execution::BackgroundWorker;
//! use patient_worker::messaging::InboundEnvelope;
//! use patient_worker::store::ResultMerger;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let config = WorkerConfig::default();
//! let (mut worker, _dataset) = BackgroundWorker::spawn_default(&config);
//! let mut merger = ResultMerger::new(&config);
//! merger.set_active_context("patient-1");
//!
//! worker
//!     .send(InboundEnvelope::new(
//!         "patient-1",
//!         "data",
//!         json!({"method": "addData", "data": [{"id": "a", "type": "cbg"}]}),
//!     ))
//!     .await
//!     .unwrap();
//!
//! let result = worker.recv().await.unwrap();
//! merger.merge_result(&result).unwrap();
//! assert_eq!(merger.store().data.combined.len(), 1);
//!
//! worker.shutdown().await.unwrap();
//! # });
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod execution;
pub mod handlers;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod queue;
pub mod state_machine;
pub mod store;

pub use config::{ConfigLoader, StaleResultPolicy, UpdateMissPolicy, WorkerConfig};
pub use error::{ErrorDescriptor, Result, WorkerError};
pub use events::{EventPublisher, WorkerEvent};
pub use execution::{BackgroundWorker, Dispatcher, HandlerRegistry, WorkerHandle};
pub use handlers::{DataHandler, MessageHandler, ReportHandler, SharedDataset};
pub use messaging::{
    ContextId, HandlerKind, InboundEnvelope, ResultMessage, WorkMessage, WorkerResult,
};
pub use models::{DataQuery, DataWindow, Datum, Endpoints, ReportArtifact};
pub use queue::{ContextGuard, WorkQueue};
pub use state_machine::{DispatchEvent, DispatcherState};
pub use store::{CanonicalStore, ResultMerger, StoreAction};
