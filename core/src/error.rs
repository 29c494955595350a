//! Error types surfaced by settlement handles and the awaitable bridge.

use thiserror::Error;

use crate::State;

/// Returned when a settlement handle is used on a value that already settled.
///
/// The second settlement has no effect; the value and state from the first one
/// are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SettleError {
    #[error("deferred value is already {state}")]
    AlreadySettled { state: State },
}

impl SettleError {
    #[must_use]
    pub fn state(self) -> State {
        match self {
            SettleError::AlreadySettled { state } => state,
        }
    }
}

/// Every handle able to settle the value was dropped while it was still pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("deferred value was dropped before it settled")]
pub struct Abandoned;
