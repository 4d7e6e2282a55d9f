//! # Work Queue
//!
//! Context-scoped FIFO of pending work plus the guard that keeps it scoped.

pub mod context_guard;
pub mod work_queue;

pub use context_guard::{Admission, ContextGuard};
pub use work_queue::WorkQueue;
