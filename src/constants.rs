//! # System Constants
//!
//! Operational boundaries of the worker: cache windows, channel sizing,
//! lifecycle event names and the wire names of data operations.

/// Cache expiry window applied after data is added (one hour)
pub const DEFAULT_CACHE_TTL_MS: u64 = 3_600_000;

/// Longest accepted cache expiry window (one year)
pub const MAX_CACHE_TTL_MS: u64 = 31_536_000_000;

/// Inbound channel capacity between the caller and the background worker
pub const DEFAULT_INBOUND_CAPACITY: usize = 256;

/// Broadcast capacity of the lifecycle event publisher
pub const DEFAULT_EVENT_CAPACITY: usize = 1000;

/// Maximum number of dispatch executions kept in history
pub const DEFAULT_MAX_HISTORY_SIZE: usize = 1000;

/// Prefix for configuration environment variables
pub const ENV_PREFIX: &str = "PATIENT_WORKER";

/// Lifecycle events published by the dispatcher
pub mod events {
    pub const MESSAGE_ENQUEUED: &str = "message.enqueued";
    pub const MESSAGE_STARTED: &str = "message.started";
    pub const MESSAGE_COMPLETED: &str = "message.completed";
    pub const MESSAGE_FAILED: &str = "message.failed";
    pub const MESSAGE_REJECTED: &str = "message.rejected";
    pub const QUEUE_CLEARED: &str = "queue.cleared";
    pub const CONTEXT_CHANGED: &str = "queue.context_changed";
}

/// Wire names of the data handler's operations
pub mod methods {
    pub const ADD_DATA: &str = "addData";
    pub const REMOVE_DATA: &str = "removeData";
    pub const UPDATE_DATUM: &str = "updateDatum";
    pub const QUERY_DATA: &str = "queryData";
    pub const GENERATE_REPORT: &str = "generateReport";
}
