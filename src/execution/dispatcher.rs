//! # Dispatcher
//!
//! Single-flight, strictly FIFO processing of the work queue. The dispatcher
//! owns the queue, its context guard and the Idle/Processing state machine.
//! Handler invocation is split into [`Dispatcher::start_next`] and
//! [`Dispatcher::complete`] so the background loop can keep admitting
//! messages while a handler future is pending; [`Dispatcher::run_until_idle`]
//! drives the same pair in a plain loop.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use serde_json::json;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use super::handler_registry::HandlerRegistry;
use crate::config::WorkerConfig;
use crate::constants::events;
use crate::error::{Result, WorkerError};
use crate::events::EventPublisher;
use crate::logging::{log_error, log_handler_operation, log_queue_operation};
use crate::messaging::{
    ContextId, HandlerKind, InboundEnvelope, ResultMessage, ResultMeta, WorkMessage, WorkerResult,
};
use crate::queue::{Admission, ContextGuard, WorkQueue};
use crate::state_machine::{transition, DispatchEvent, DispatcherState};

/// Pending handler invocation
pub type HandlerFuture = BoxFuture<'static, Result<WorkerResult>>;

/// A message taken off the queue together with its running handler
pub struct StartedWork {
    pub meta: ResultMeta,
    pub future: HandlerFuture,
}

/// Dispatch record for history tracking
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchExecution {
    pub request_id: String,
    pub context: ContextId,
    pub handler_kind: Option<HandlerKind>,
    pub method: Option<String>,
    pub success: bool,
    pub error_kind: Option<String>,
    pub duration_ms: u64,
    pub completed_at: chrono::DateTime<chrono::Utc>,
}

/// Dispatcher statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatcherStats {
    pub registered_handlers: usize,
    /// Messages whose handler settled
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Pending messages dropped by a context switch or shutdown
    pub discarded: u64,
    /// Envelopes refused at the boundary
    pub rejected: u64,
    pub history_enabled: bool,
}

pub struct Dispatcher {
    queue: WorkQueue,
    guard: ContextGuard,
    state: DispatcherState,
    registry: Arc<HandlerRegistry>,
    events: EventPublisher,
    enable_history: bool,
    max_history_size: usize,
    history: VecDeque<DispatchExecution>,
    stats: DispatcherStats,
    started_at: Option<Instant>,
}

impl Dispatcher {
    pub fn new(registry: Arc<HandlerRegistry>, config: &WorkerConfig) -> Self {
        Self {
            queue: WorkQueue::new(),
            guard: ContextGuard::new(),
            state: DispatcherState::default(),
            registry,
            events: EventPublisher::new(config.event_capacity),
            enable_history: config.enable_history,
            max_history_size: config.max_history_size,
            history: VecDeque::new(),
            stats: DispatcherStats::default(),
            started_at: None,
        }
    }

    pub fn with_events(mut self, events: EventPublisher) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn state(&self) -> DispatcherState {
        self.state
    }

    pub fn is_processing(&self) -> bool {
        self.queue.is_processing()
    }

    pub fn context(&self) -> &ContextId {
        self.queue.context()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Admit an envelope arriving at the I/O boundary
    ///
    /// The envelope's context drives the guard even when its handler tag
    /// cannot be parsed; such envelopes are answered immediately with a
    /// failure and never queued.
    pub fn accept(&mut self, mut envelope: InboundEnvelope) -> Option<ResultMessage> {
        let context = envelope.context().clone();
        self.observe_context(&context);

        let meta = envelope.rejection_meta();
        match envelope.into_work_message() {
            Ok(message) => match self.submit(message) {
                Ok(_) => None,
                Err(e) => Some(self.reject(meta, &e)),
            },
            Err(e) => Some(self.reject(meta, &e)),
        }
    }

    /// Enqueue a typed message, switching context first when it differs
    pub fn submit(&mut self, message: WorkMessage) -> Result<Admission> {
        let request_id = message.request_id().to_string();
        let context = message.context().clone();

        let mut admission = self.observe_context(&context);
        let queued = self.guard.admit(&mut self.queue, message)?;

        // The context already matches here, so anything dropped was cleared by a removal
        if !queued.discarded.is_empty() {
            let cleared: Vec<&str> = queued.discarded.iter().map(|m| m.request_id()).collect();
            self.stats.discarded += cleared.len() as u64;
            self.events.publish(
                events::QUEUE_CLEARED,
                Some(&request_id),
                &context,
                json!({ "discarded": cleared, "reason": "removal" }),
            );
            log_queue_operation(
                "clear",
                &context.to_string(),
                Some(&request_id),
                0,
                Some(&format!("removal discarded {} pending", cleared.len())),
            );
        }
        admission.discarded.extend(queued.discarded);

        self.events.publish(
            events::MESSAGE_ENQUEUED,
            Some(&request_id),
            &context,
            json!({ "queue_len": self.queue.len() }),
        );
        log_queue_operation(
            "enqueue",
            &context.to_string(),
            Some(&request_id),
            self.queue.len(),
            None,
        );

        Ok(admission)
    }

    fn observe_context(&mut self, context: &ContextId) -> Admission {
        let admission = self.guard.observe(&mut self.queue, context);
        if !admission.context_changed {
            return admission;
        }

        self.events
            .publish(events::CONTEXT_CHANGED, None, context, serde_json::Value::Null);

        if !admission.discarded.is_empty() {
            let discarded: Vec<&str> = admission.discarded.iter().map(|m| m.request_id()).collect();
            self.stats.discarded += discarded.len() as u64;
            self.events.publish(
                events::QUEUE_CLEARED,
                None,
                context,
                json!({ "discarded": discarded }),
            );
            log_queue_operation(
                "clear",
                &context.to_string(),
                None,
                0,
                Some(&format!("discarded {} pending", discarded.len())),
            );
        }

        admission
    }

    fn reject(&mut self, meta: ResultMeta, error: &WorkerError) -> ResultMessage {
        self.stats.rejected += 1;
        warn!(
            request_id = %meta.request_id,
            context = %meta.context,
            error = %error,
            "📥 BOUNDARY: rejected inbound message"
        );
        self.events.publish(
            events::MESSAGE_REJECTED,
            Some(&meta.request_id),
            &meta.context,
            json!({ "error": error.kind() }),
        );
        ResultMessage::failure(meta, error)
    }

    /// Take the head message and start its handler
    ///
    /// Returns `None` while another handler is in flight or when the queue is
    /// empty. A kind without a registered handler still starts: its future
    /// resolves to `UnknownHandlerKindError` so the failure is reported in
    /// queue order.
    pub fn start_next(&mut self) -> Option<StartedWork> {
        if !self.state.can_start() || self.queue.is_empty() {
            return None;
        }

        self.state = transition(self.state, DispatchEvent::Start).ok()?;
        self.queue.set_processing(true);
        let message = self.queue.dequeue()?;
        let meta = message.result_meta();
        self.started_at = Some(Instant::now());

        debug!(
            request_id = %meta.request_id,
            kind = %message.kind(),
            remaining = self.queue.len(),
            "Dispatcher: starting message"
        );
        self.events.publish(
            events::MESSAGE_STARTED,
            Some(&meta.request_id),
            &meta.context,
            json!({ "kind": message.kind() }),
        );

        let kind = message.kind();
        let future = match self.registry.resolve(kind) {
            Ok(handler) => async move {
                match AssertUnwindSafe(handler.handle(message)).catch_unwind().await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(panic_error(kind)),
                }
            }
            .boxed(),
            Err(e) => futures::future::ready(Err(e)).boxed(),
        };

        Some(StartedWork { meta, future })
    }

    /// Settle the in-flight message and build its result
    pub fn complete(
        &mut self,
        meta: ResultMeta,
        outcome: Result<WorkerResult>,
    ) -> Result<ResultMessage> {
        self.state = transition(self.state, DispatchEvent::Settle)?;
        self.queue.set_processing(false);

        let duration_ms = self
            .started_at
            .take()
            .map(|start| start.elapsed().as_millis() as u64)
            .unwrap_or(0);

        let message = match outcome {
            Ok(result) => ResultMessage::success(meta, result),
            Err(e) => {
                log_error("dispatcher", "handle", &e.to_string(), Some(&meta.request_id));
                ResultMessage::failure(meta, &e)
            }
        };

        self.stats.processed += 1;
        if message.success {
            self.stats.succeeded += 1;
        } else {
            self.stats.failed += 1;
        }

        let handler = message
            .meta
            .handler_kind
            .map(|k| k.to_string())
            .unwrap_or_default();
        log_handler_operation(
            &handler,
            message.request_id(),
            message.meta.method.as_deref(),
            if message.success { "success" } else { "failure" },
            duration_ms,
        );
        self.events.publish(
            if message.success {
                events::MESSAGE_COMPLETED
            } else {
                events::MESSAGE_FAILED
            },
            Some(message.request_id()),
            message.context(),
            json!({ "duration_ms": duration_ms, "error": message.error_kind() }),
        );

        if self.enable_history {
            self.history.push_back(DispatchExecution {
                request_id: message.meta.request_id.clone(),
                context: message.meta.context.clone(),
                handler_kind: message.meta.handler_kind,
                method: message.meta.method.clone(),
                success: message.success,
                error_kind: message.error_kind().map(String::from),
                duration_ms,
                completed_at: chrono::Utc::now(),
            });
            while self.history.len() > self.max_history_size {
                self.history.pop_front();
            }
        }

        Ok(message)
    }

    /// Drain the queue one message at a time
    pub async fn run_until_idle(&mut self) -> Result<Vec<ResultMessage>> {
        let mut results = Vec::new();

        while let Some(work) = self.start_next() {
            let outcome = work.future.await;
            results.push(self.complete(work.meta, outcome)?);
        }

        Ok(results)
    }

    /// Accept an envelope and drain the queue
    pub async fn process(&mut self, envelope: InboundEnvelope) -> Result<Vec<ResultMessage>> {
        let rejection = self.accept(envelope);
        let mut results = self.run_until_idle().await?;
        if let Some(rejection) = rejection {
            results.insert(0, rejection);
        }
        Ok(results)
    }

    /// Drop all pending messages without changing context
    pub fn discard_pending(&mut self) -> usize {
        let count = self.queue.clear();
        if count > 0 {
            self.stats.discarded += count as u64;
            self.events.publish(
                events::QUEUE_CLEARED,
                None,
                self.queue.context(),
                json!({ "discarded_count": count }),
            );
        }
        count
    }

    pub fn history(&self) -> Vec<DispatchExecution> {
        self.history.iter().cloned().collect()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            registered_handlers: self.registry.len(),
            history_enabled: self.enable_history,
            ..self.stats.clone()
        }
    }
}

fn panic_error(kind: HandlerKind) -> WorkerError {
    match kind {
        HandlerKind::Data => WorkerError::data_processing("handle", "handler panicked"),
        HandlerKind::Report => WorkerError::report_generation("handler panicked"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{shared_dataset, MessageHandler};
    use async_trait::async_trait;
    use serde_json::Value;

    /// Echoes the request id so ordering can be checked
    struct RecordingHandler;

    #[async_trait]
    impl MessageHandler for RecordingHandler {
        async fn handle(&self, message: WorkMessage) -> Result<WorkerResult> {
            if message.payload().get("fail").is_some() {
                return Err(WorkerError::data_processing("test", "asked to fail"));
            }
            if message.payload().get("panic").is_some() {
                panic!("boom");
            }
            tokio::task::yield_now().await;
            Ok(WorkerResult::default())
        }

        fn handler_name(&self) -> &str {
            "recording"
        }

        fn kind(&self) -> HandlerKind {
            HandlerKind::Data
        }
    }

    fn dispatcher() -> Dispatcher {
        let registry = HandlerRegistry::new();
        registry.register(Arc::new(RecordingHandler));
        Dispatcher::new(Arc::new(registry), &WorkerConfig::default())
    }

    fn data(context: &str, id: &str, payload: Value) -> WorkMessage {
        WorkMessage::with_request_id(id, context, HandlerKind::Data, payload)
    }

    fn ids(results: &[ResultMessage]) -> Vec<&str> {
        results.iter().map(|r| r.request_id()).collect()
    }

    #[tokio::test]
    async fn test_fifo_and_failures_do_not_stop_the_loop() {
        let mut dispatcher = dispatcher();
        dispatcher.submit(data("p1", "a", Value::Null)).unwrap();
        dispatcher.submit(data("p1", "b", json!({"fail": true}))).unwrap();
        dispatcher.submit(data("p1", "c", json!({"panic": true}))).unwrap();
        dispatcher.submit(data("p1", "d", Value::Null)).unwrap();

        let results = dispatcher.run_until_idle().await.unwrap();
        assert_eq!(ids(&results), vec!["a", "b", "c", "d"]);
        assert!(results[0].success);
        assert_eq!(results[1].error_kind(), Some("DataProcessingError"));
        assert_eq!(results[2].error_kind(), Some("DataProcessingError"));
        assert!(results[3].success);

        let stats = dispatcher.stats();
        assert_eq!((stats.processed, stats.succeeded, stats.failed), (4, 2, 2));
        assert_eq!(dispatcher.state(), DispatcherState::Idle);
        assert!(!dispatcher.is_processing());
    }

    #[tokio::test]
    async fn test_single_flight() {
        let mut dispatcher = dispatcher();
        dispatcher.submit(data("p1", "a", Value::Null)).unwrap();
        dispatcher.submit(data("p1", "b", Value::Null)).unwrap();

        let first = dispatcher.start_next().unwrap();
        assert!(dispatcher.is_processing());
        assert_eq!(dispatcher.state(), DispatcherState::Processing);
        assert!(dispatcher.start_next().is_none());

        let outcome = first.future.await;
        let result = dispatcher.complete(first.meta, outcome).unwrap();
        assert_eq!(result.request_id(), "a");
        assert!(dispatcher.start_next().is_some());
    }

    #[tokio::test]
    async fn test_complete_without_start_is_rejected() {
        let mut dispatcher = dispatcher();
        let meta = data("p1", "a", Value::Null).result_meta();
        let err = dispatcher
            .complete(meta, Ok(WorkerResult::default()))
            .unwrap_err();
        assert_eq!(err.kind(), "StateTransitionError");
    }

    #[tokio::test]
    async fn test_unregistered_kind_fails_in_queue_order() {
        let mut dispatcher = dispatcher();
        dispatcher.submit(data("p1", "a", Value::Null)).unwrap();
        dispatcher
            .submit(WorkMessage::with_request_id("r", "p1", HandlerKind::Report, Value::Null))
            .unwrap();
        dispatcher.submit(data("p1", "c", Value::Null)).unwrap();

        let results = dispatcher.run_until_idle().await.unwrap();
        assert_eq!(ids(&results), vec!["a", "r", "c"]);
        assert_eq!(results[1].error_kind(), Some("UnknownHandlerKindError"));
    }

    #[tokio::test]
    async fn test_context_switch_discards_pending() {
        let mut dispatcher = dispatcher();
        let mut receiver = dispatcher.events().subscribe();
        dispatcher.submit(data("A", "a1", Value::Null)).unwrap();
        dispatcher.submit(data("A", "a2", Value::Null)).unwrap();

        let in_flight = dispatcher.start_next().unwrap();
        dispatcher.submit(data("A", "a3", Value::Null)).unwrap();
        let admission = dispatcher.submit(data("B", "b1", Value::Null)).unwrap();
        assert!(admission.context_changed);
        assert_eq!(admission.discarded.len(), 2);

        let outcome = in_flight.future.await;
        let first = dispatcher.complete(in_flight.meta, outcome).unwrap();
        assert_eq!(first.context(), &ContextId::from("A"));

        let rest = dispatcher.run_until_idle().await.unwrap();
        assert_eq!(ids(&rest), vec!["b1"]);
        assert_eq!(dispatcher.stats().discarded, 2);

        let mut names = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            names.push(event.name);
        }
        assert!(names.iter().any(|n| n == events::QUEUE_CLEARED));
    }

    #[tokio::test]
    async fn test_removal_discards_pending_but_not_in_flight() {
        let mut dispatcher = dispatcher();
        dispatcher.submit(data("p1", "q1", json!({"method": "queryData"}))).unwrap();
        let in_flight = dispatcher.start_next().unwrap();

        dispatcher.submit(data("p1", "a1", json!({"method": "addData"}))).unwrap();
        dispatcher.submit(data("p1", "a2", json!({"method": "addData"}))).unwrap();
        let admission = dispatcher
            .submit(data("p1", "rm", json!({"method": "removeData"})))
            .unwrap();
        assert!(!admission.context_changed);
        assert_eq!(admission.discarded.len(), 2);
        assert_eq!(dispatcher.queue_len(), 1);

        let outcome = in_flight.future.await;
        let first = dispatcher.complete(in_flight.meta, outcome).unwrap();
        assert_eq!(first.request_id(), "q1");

        let rest = dispatcher.run_until_idle().await.unwrap();
        assert_eq!(ids(&rest), vec!["rm"]);
        assert_eq!(dispatcher.stats().discarded, 2);
    }

    #[tokio::test]
    async fn test_boundary_rejection_still_switches_context() {
        let mut dispatcher = dispatcher();
        dispatcher.submit(data("A", "a1", Value::Null)).unwrap();

        let rejection = dispatcher
            .accept(InboundEnvelope::new("B", "video", Value::Null).with_request_id("v1"))
            .unwrap();
        assert_eq!(rejection.request_id(), "v1");
        assert_eq!(rejection.error_kind(), Some("UnknownHandlerKindError"));
        assert_eq!(dispatcher.context(), &ContextId::from("B"));
        assert_eq!(dispatcher.queue_len(), 0);

        let stats = dispatcher.stats();
        assert_eq!((stats.rejected, stats.discarded), (1, 1));
    }

    #[tokio::test]
    async fn test_envelope_without_tag_is_answered_and_switches_context() {
        let mut dispatcher = dispatcher();
        dispatcher.submit(data("p1", "a1", Value::Null)).unwrap();

        let envelope = InboundEnvelope::from_json(
            r#"{"meta":{"patientId":"p2","requestId":"z"},"payload":{}}"#,
        )
        .unwrap();
        let rejection = dispatcher.accept(envelope).unwrap();

        assert_eq!(rejection.request_id(), "z");
        assert_eq!(rejection.error_kind(), Some("UnknownHandlerKindError"));
        assert_eq!(dispatcher.context(), &ContextId::from("p2"));
        assert_eq!(dispatcher.queue_len(), 0);
        assert_eq!(dispatcher.stats().discarded, 1);
    }

    #[tokio::test]
    async fn test_process_with_default_handlers() {
        let config = WorkerConfig::default();
        let registry = HandlerRegistry::with_default_handlers(shared_dataset(), &config);
        let mut dispatcher = Dispatcher::new(Arc::new(registry), &config);

        let results = dispatcher
            .process(InboundEnvelope::new(
                "p1",
                "data",
                json!({"method": "addData", "data": [{"id": "a", "type": "cbg"}]}),
            ))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].success);
        assert_eq!(results[0].meta.method.as_deref(), Some("addData"));
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let registry = HandlerRegistry::new();
        registry.register(Arc::new(RecordingHandler));
        let config = WorkerConfig {
            max_history_size: 2,
            ..WorkerConfig::default()
        };
        let mut dispatcher = Dispatcher::new(Arc::new(registry), &config);

        for id in ["a", "b", "c"] {
            dispatcher.submit(data("p1", id, Value::Null)).unwrap();
        }
        dispatcher.run_until_idle().await.unwrap();

        let history: Vec<String> = dispatcher
            .history()
            .into_iter()
            .map(|e| e.request_id)
            .collect();
        assert_eq!(history, vec!["b", "c"]);

        dispatcher.clear_history();
        assert!(dispatcher.history().is_empty());
    }
}
