use serde::{Deserialize, Serialize};

/// Events that drive dispatcher state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum DispatchEvent {
    /// A message was dequeued and its handler invoked
    Start,
    /// The in-flight handler settled (success or failure)
    Settle,
}

impl DispatchEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Settle => "settle",
        }
    }
}
