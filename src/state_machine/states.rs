use serde::{Deserialize, Serialize};
use std::fmt;

/// Dispatcher lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatcherState {
    /// No handler in flight; waiting for work
    Idle,
    /// Exactly one handler in flight
    Processing,
}

impl DispatcherState {
    /// Check if a handler is currently executing
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Processing)
    }

    /// Check if new work may be started
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

impl fmt::Display for DispatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Processing => write!(f, "processing"),
        }
    }
}

impl std::str::FromStr for DispatcherState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "processing" => Ok(Self::Processing),
            _ => Err(format!("Invalid dispatcher state: {s}")),
        }
    }
}

/// Default state for a new dispatcher
impl Default for DispatcherState {
    fn default() -> Self {
        Self::Idle
    }
}
