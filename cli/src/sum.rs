//! `deferral sum`: every operand is parsed as its own deferred value.

use thiserror::Error;

use deferral_core::runtime::Scheduler;
use deferral_core::{Deferred, all};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum SumError {
    #[error("not an integer: {input:?} ({reason})")]
    InvalidOperand { input: String, reason: String },
    #[error("sum overflows a 64-bit integer")]
    Overflow,
}

pub(crate) fn parse_operand(input: &str) -> Result<i64, SumError> {
    input
        .trim()
        .parse::<i64>()
        .map_err(|err| SumError::InvalidOperand {
            input: input.to_string(),
            reason: err.to_string(),
        })
}

pub(crate) fn checked_total(values: &[i64]) -> Result<i64, SumError> {
    values
        .iter()
        .try_fold(0_i64, |acc, value| acc.checked_add(*value))
        .ok_or(SumError::Overflow)
}

/// Parse every operand through `scheduler`, then add them up.
///
/// Rejects with the first parse failure to settle, or on overflow.
pub(crate) fn sum<S>(scheduler: &S, operands: Vec<String>) -> Deferred<i64, SumError>
where
    S: Scheduler + ?Sized,
{
    tracing::debug!(operands = operands.len(), "summing operands");
    let parsed = operands
        .into_iter()
        .map(|operand| Deferred::scheduled(scheduler, move || parse_operand(&operand)));
    all(parsed).map(|values| checked_total(values))
}
