//! Process-wide reporting policy.
//!
//! Two situations are legal but usually indicate a bug in the caller:
//!
//! - a settlement handle used after the value already settled
//! - a rejected value dropped without anything ever observing it
//!
//! Neither changes the outcome of a [`Deferred`](crate::Deferred). The policy only
//! decides how loudly they are reported. It is installed once, typically by the
//! binary after loading configuration; until then [`Policy::default`] applies.

use std::fmt;
use std::sync::OnceLock;
use std::thread;

use serde::{Deserialize, Serialize};

static POLICY: OnceLock<Policy> = OnceLock::new();

/// How a suspicious-but-legal event is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Report {
    Ignore,
    #[default]
    Warn,
    /// Panic at the point of detection. Never panics while the thread is already
    /// unwinding, since detection may happen inside `Drop`.
    Panic,
}

impl Report {
    pub(crate) fn emit(self, event: fmt::Arguments<'_>) {
        match self {
            Report::Ignore => {}
            Report::Warn => tracing::warn!("{event}"),
            Report::Panic => {
                if thread::panicking() {
                    tracing::error!("{event}");
                } else {
                    panic!("{event}");
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    /// A rejected value was dropped with no listener attached.
    pub unhandled_rejection: Report,
    /// `fulfill`/`reject` called on an already settled value.
    pub late_settlement: Report,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            unhandled_rejection: Report::Warn,
            late_settlement: Report::Ignore,
        }
    }
}

/// Install the process-wide policy.
///
/// Only the first call wins; later calls return the rejected policy unchanged.
pub fn install_policy(policy: Policy) -> Result<(), Policy> {
    POLICY.set(policy)
}

/// The installed policy, or the default if none was installed.
#[must_use]
pub fn policy() -> Policy {
    POLICY.get().copied().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_warns_on_unhandled_rejection_only() {
        let policy = Policy::default();
        assert_eq!(policy.unhandled_rejection, Report::Warn);
        assert_eq!(policy.late_settlement, Report::Ignore);
    }

    #[test]
    fn ignore_and_warn_do_not_panic() {
        Report::Ignore.emit(format_args!("ignored"));
        Report::Warn.emit(format_args!("warned"));
    }

    #[test]
    #[should_panic(expected = "late settlement")]
    fn panic_report_panics() {
        Report::Panic.emit(format_args!("late settlement"));
    }

    #[test]
    fn partial_policy_fills_defaults() {
        let policy: Policy = serde_json::from_str(r#"{"late_settlement":"panic"}"#).unwrap();
        assert_eq!(policy.late_settlement, Report::Panic);
        assert_eq!(policy.unhandled_rejection, Report::Warn);
    }
}
