//! Deferred values for Deferral.
//!
//! A [`Deferred`] settles exactly once, to a value or an error. Continuations are
//! attached with [`Deferred::then`] (or [`map`](Deferred::map) /
//! [`catch`](Deferred::catch)) and form chains; [`all`] fans many values back into
//! one. Settlement and continuation dispatch are synchronous. Where the producing
//! work actually runs is up to the caller, see [`runtime`].
//!
//! This crate does no IO and owns no threads.

mod aggregate;
mod deferred;
mod error;
mod policy;
mod producer;
pub mod runtime;
mod state;
mod trampoline;

pub use aggregate::all;
pub use deferred::Deferred;
pub use error::{Abandoned, SettleError};
pub use policy::{Policy, Report, install_policy, policy};
pub use producer::{Fulfill, Producer, Reject, Resolver};
pub use state::State;
