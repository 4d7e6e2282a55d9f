// Dispatcher state machine
//
// Two states and two events. The transition table is the single-flight
// guarantee: a Start is only legal from Idle.

pub mod events;
pub mod states;

pub use events::DispatchEvent;
pub use states::DispatcherState;

use crate::error::{Result, WorkerError};

/// Determine the target state for an event, rejecting illegal transitions
pub fn transition(current: DispatcherState, event: DispatchEvent) -> Result<DispatcherState> {
    let target = match (current, event) {
        (DispatcherState::Idle, DispatchEvent::Start) => DispatcherState::Processing,

        // With work pending the drain loop issues the next Start immediately
        (DispatcherState::Processing, DispatchEvent::Settle) => DispatcherState::Idle,

        (from, event) => {
            return Err(WorkerError::StateTransition(format!(
                "cannot apply '{}' while {from}",
                event.event_type()
            )))
        }
    };

    Ok(target)
}
