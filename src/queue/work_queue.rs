use std::collections::VecDeque;
use tracing::debug;

use crate::error::{Result, WorkerError};
use crate::messaging::{ContextId, WorkMessage};

/// FIFO buffer of pending work scoped to a single context
///
/// Every queued message shares the queue's current context. The queue is
/// never locked: it is owned by the dispatcher and only mutated between
/// handler suspension points.
///
/// # Examples
///
/// ```rust
/// use patient_worker::messaging::{HandlerKind, WorkMessage};
/// use patient_worker::queue::WorkQueue;
///
/// let mut queue = WorkQueue::new();
/// queue.set_context("p1".into());
/// queue.enqueue(WorkMessage::new("p1", HandlerKind::Data, serde_json::Value::Null)).unwrap();
/// assert_eq!(queue.len(), 1);
///
/// // a message for another patient must go through a context switch first
/// let stray = WorkMessage::new("p2", HandlerKind::Data, serde_json::Value::Null);
/// assert!(queue.enqueue(stray).is_err());
/// ```
#[derive(Debug, Default)]
pub struct WorkQueue {
    items: VecDeque<WorkMessage>,
    context: ContextId,
    processing: bool,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn context(&self) -> &ContextId {
        &self.context
    }

    /// Adopt a new context, discarding pending work scoped to the old one
    ///
    /// Returns the discarded messages. No-op when the context is unchanged.
    /// The processing flag is left alone: a handler already in flight for the
    /// old context is allowed to finish.
    pub fn set_context(&mut self, context: ContextId) -> Vec<WorkMessage> {
        if self.context == context {
            return Vec::new();
        }

        let discarded: Vec<WorkMessage> = self.items.drain(..).collect();
        debug!(
            from = %self.context,
            to = %context,
            discarded = discarded.len(),
            "Queue: set context"
        );
        self.context = context;
        discarded
    }

    /// Append to the tail
    pub fn enqueue(&mut self, message: WorkMessage) -> Result<()> {
        if message.context() != &self.context {
            return Err(WorkerError::ContextMismatch {
                queue_context: self.context.clone(),
                message_context: message.context().clone(),
            });
        }

        self.items.push_back(message);
        Ok(())
    }

    /// Remove and return the head message
    pub fn dequeue(&mut self) -> Option<WorkMessage> {
        self.items.pop_front()
    }

    pub fn peek(&self) -> Option<&WorkMessage> {
        self.items.front()
    }

    /// Remove and return all pending messages, keeping the current context
    pub fn drain_pending(&mut self) -> Vec<WorkMessage> {
        self.items.drain(..).collect()
    }

    /// Drop all pending messages, keeping the current context
    pub fn clear(&mut self) -> usize {
        let count = self.items.len();
        self.items.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_processing(&self) -> bool {
        self.processing
    }

    pub(crate) fn set_processing(&mut self, processing: bool) {
        self.processing = processing;
    }
}
