//! # Background Worker
//!
//! Runs a [`Dispatcher`] on its own tokio task behind a single bidirectional
//! channel pair. Inbound envelopes arrive on a bounded `mpsc`; results leave
//! on an unbounded `mpsc`. The loop keeps admitting messages while a handler
//! is in flight, so a context switch clears pending work immediately.

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::dispatcher::{Dispatcher, DispatcherStats, HandlerFuture};
use super::handler_registry::HandlerRegistry;
use crate::config::WorkerConfig;
use crate::error::{Result, WorkerError};
use crate::events::{EventPublisher, WorkerEvent};
use crate::handlers::{shared_dataset, SharedDataset};
use crate::messaging::{InboundEnvelope, ResultMessage, ResultMeta, WorkerResult};

pub struct BackgroundWorker;

impl BackgroundWorker {
    /// Spawn the processing loop for a configured dispatcher
    pub fn spawn(dispatcher: Dispatcher, config: &WorkerConfig) -> WorkerHandle {
        let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_capacity);
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let shutdown = Arc::new(Notify::new());
        let events = dispatcher.events().clone();

        let task = tokio::spawn(run_loop(
            dispatcher,
            inbound_rx,
            results_tx,
            shutdown.clone(),
        ));

        info!(
            inbound_capacity = config.inbound_capacity,
            "🚀 WORKER: background processing loop started"
        );

        WorkerHandle {
            inbound: Some(inbound_tx),
            results: results_rx,
            shutdown,
            events,
            task,
        }
    }

    /// Spawn with the data and report handlers over a fresh dataset
    pub fn spawn_default(config: &WorkerConfig) -> (WorkerHandle, SharedDataset) {
        let dataset = shared_dataset();
        let registry = HandlerRegistry::with_default_handlers(dataset.clone(), config);
        let dispatcher = Dispatcher::new(Arc::new(registry), config);
        (Self::spawn(dispatcher, config), dataset)
    }
}

/// Caller side of a running background worker
pub struct WorkerHandle {
    inbound: Option<mpsc::Sender<InboundEnvelope>>,
    results: mpsc::UnboundedReceiver<ResultMessage>,
    shutdown: Arc<Notify>,
    events: EventPublisher,
    task: JoinHandle<DispatcherStats>,
}

/// Final state reported by [`WorkerHandle::shutdown`]
#[derive(Debug)]
pub struct ShutdownSummary {
    pub stats: DispatcherStats,
    /// Results produced but not yet received by the caller
    pub undelivered: Vec<ResultMessage>,
}

impl WorkerHandle {
    /// Send an envelope, waiting for inbound capacity
    pub async fn send(&self, envelope: InboundEnvelope) -> Result<()> {
        self.sender()?
            .send(envelope)
            .await
            .map_err(|_| WorkerError::ChannelClosed("inbound".to_string()))
    }

    /// A cloneable sender for producers on other tasks
    pub fn sender(&self) -> Result<mpsc::Sender<InboundEnvelope>> {
        self.inbound
            .clone()
            .ok_or_else(|| WorkerError::ChannelClosed("inbound".to_string()))
    }

    /// Stop accepting work from this handle
    ///
    /// Once every sender is gone the loop drains the queue and exits, after
    /// which [`recv`](Self::recv) returns `None`.
    pub fn close_inbound(&mut self) {
        self.inbound = None;
    }

    /// Next result, or `None` once the worker has stopped
    pub async fn recv(&mut self) -> Option<ResultMessage> {
        self.results.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ResultMessage> {
        self.results.try_recv().ok()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.events.subscribe()
    }

    /// Stop the loop
    ///
    /// The in-flight handler finishes and its result is kept; pending
    /// messages are discarded.
    pub async fn shutdown(mut self) -> Result<ShutdownSummary> {
        self.shutdown.notify_one();
        self.inbound = None;

        let stats = self
            .task
            .await
            .map_err(|e| WorkerError::ChannelClosed(format!("worker task failed: {e}")))?;

        let mut undelivered = Vec::new();
        while let Ok(result) = self.results.try_recv() {
            undelivered.push(result);
        }

        Ok(ShutdownSummary { stats, undelivered })
    }
}

async fn run_loop(
    mut dispatcher: Dispatcher,
    mut inbound: mpsc::Receiver<InboundEnvelope>,
    results: mpsc::UnboundedSender<ResultMessage>,
    shutdown: Arc<Notify>,
) -> DispatcherStats {
    let mut in_flight: Option<(ResultMeta, HandlerFuture)> = None;
    let mut inbound_open = true;

    loop {
        if in_flight.is_none() {
            in_flight = dispatcher.start_next().map(|work| (work.meta, work.future));
        }
        if in_flight.is_none() && !inbound_open {
            debug!("Inbound channel closed and queue drained");
            break;
        }

        tokio::select! {
            _ = shutdown.notified() => {
                if let Some((meta, future)) = in_flight.take() {
                    let outcome = future.await;
                    settle(&mut dispatcher, &results, meta, outcome);
                }
                let discarded = dispatcher.discard_pending();
                info!(discarded = discarded, "🛑 WORKER: shutting down");
                break;
            }

            envelope = inbound.recv(), if inbound_open => match envelope {
                Some(envelope) => {
                    if let Some(rejection) = dispatcher.accept(envelope) {
                        deliver(&results, rejection);
                    }
                }
                None => inbound_open = false,
            },

            outcome = async {
                match in_flight.as_mut() {
                    Some((_, future)) => future.await,
                    None => std::future::pending().await,
                }
            }, if in_flight.is_some() => {
                if let Some((meta, _)) = in_flight.take() {
                    settle(&mut dispatcher, &results, meta, outcome);
                }
            }
        }
    }

    dispatcher.stats()
}

fn settle(
    dispatcher: &mut Dispatcher,
    results: &mpsc::UnboundedSender<ResultMessage>,
    meta: ResultMeta,
    outcome: Result<WorkerResult>,
) {
    match dispatcher.complete(meta, outcome) {
        Ok(message) => deliver(results, message),
        Err(e) => warn!(error = %e, "Dispatcher refused to settle message"),
    }
}

fn deliver(results: &mpsc::UnboundedSender<ResultMessage>, message: ResultMessage) {
    if results.send(message).is_err() {
        debug!("Result receiver dropped; discarding result");
    }
}
