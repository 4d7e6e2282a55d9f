pub mod background_worker;
pub mod dispatcher;
pub mod handler_registry;

pub use background_worker::{BackgroundWorker, ShutdownSummary, WorkerHandle};
pub use dispatcher::{
    DispatchExecution, Dispatcher, DispatcherStats, HandlerFuture, StartedWork,
};
pub use handler_registry::HandlerRegistry;
