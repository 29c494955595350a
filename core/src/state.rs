use std::fmt;

use serde::Serialize;

/// Settlement state of a [`Deferred`](crate::Deferred).
///
/// Transitions are monotonic: `Pending -> Fulfilled` or `Pending -> Rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    Pending,
    Fulfilled,
    Rejected,
}

impl State {
    #[must_use]
    pub(crate) fn of<T, E>(result: &Result<T, E>) -> Self {
        match result {
            Ok(_) => State::Fulfilled,
            Err(_) => State::Rejected,
        }
    }

    #[must_use]
    pub const fn is_settled(self) -> bool {
        !matches!(self, State::Pending)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            State::Pending => "pending",
            State::Fulfilled => "fulfilled",
            State::Rejected => "rejected",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn of_maps_result_variants() {
        assert_eq!(State::of::<_, ()>(&Ok(1)), State::Fulfilled);
        assert_eq!(State::of::<(), _>(&Err("boom")), State::Rejected);
    }

    #[test]
    fn only_pending_is_unsettled() {
        assert!(!State::Pending.is_settled());
        assert!(State::Fulfilled.is_settled());
        assert!(State::Rejected.is_settled());
    }

    #[test]
    fn serializes_snake_case() {
        let value = serde_json::to_string(&State::Fulfilled).unwrap();
        assert_eq!(value, "\"fulfilled\"");
    }
}
