use tracing::info;

use super::work_queue::WorkQueue;
use crate::constants::methods;
use crate::error::Result;
use crate::messaging::{ContextId, HandlerKind, WorkMessage};

/// Outcome of admitting a message through the guard
#[derive(Debug, Default)]
pub struct Admission {
    pub context_changed: bool,
    /// Pending messages dropped by a context switch or a removal request
    pub discarded: Vec<WorkMessage>,
}

/// Keeps the queue single-context
///
/// Each inbound message's context is compared with the queue's; on mismatch
/// the queue is cleared and adopts the new context before the message is
/// enqueued. A removal request also clears the pending work ahead of it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextGuard;

impl ContextGuard {
    pub fn new() -> Self {
        Self
    }

    /// Switch the queue to `context` if it differs
    pub fn observe(&self, queue: &mut WorkQueue, context: &ContextId) -> Admission {
        if queue.context() == context {
            return Admission::default();
        }

        info!(
            from = %queue.context(),
            to = %context,
            pending = queue.len(),
            "🔀 QUEUE: context changed, clearing pending work"
        );

        Admission {
            context_changed: true,
            discarded: queue.set_context(context.clone()),
        }
    }

    /// Switch context if needed, then enqueue
    pub fn admit(&self, queue: &mut WorkQueue, message: WorkMessage) -> Result<Admission> {
        let mut admission = self.observe(queue, message.context());

        if is_removal(&message) && message.context() == queue.context() && !queue.is_empty() {
            info!(
                context = %queue.context(),
                pending = queue.len(),
                "🔀 QUEUE: removal requested, clearing pending work"
            );
            admission.discarded.extend(queue.drain_pending());
        }

        queue.enqueue(message)?;
        Ok(admission)
    }
}

fn is_removal(message: &WorkMessage) -> bool {
    message.kind() == HandlerKind::Data && message.method() == Some(methods::REMOVE_DATA)
}
