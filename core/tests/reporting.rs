//! Reporting under a strict policy. Runs in its own process, so installing the
//! process-wide policy here does not leak into other test binaries.

use std::panic::{self, AssertUnwindSafe};

use deferral_core::{Deferred, Policy, Report, install_policy, policy};

type D = Deferred<i32, String>;

const STRICT: Policy = Policy {
    unhandled_rejection: Report::Panic,
    late_settlement: Report::Panic,
};

fn strict() {
    let _ = install_policy(STRICT);
    assert_eq!(policy(), STRICT);
}

fn panics(f: impl FnOnce()) -> bool {
    panic::catch_unwind(AssertUnwindSafe(f)).is_err()
}

#[test]
fn dropping_unobserved_rejection_is_reported() {
    strict();
    let d = D::rejected("lost".into());
    assert!(panics(move || drop(d)));
}

#[test]
fn peeking_at_a_rejection_does_not_handle_it() {
    strict();
    let d = D::rejected("lost".into());
    assert_eq!(d.result(), Some(Err("lost".into())));
    assert!(panics(move || drop(d)));
}

#[test]
fn handled_rejection_drops_quietly() {
    strict();
    let d = D::rejected("seen".into());
    let recovered = d.catch(|_| Ok(Some(0)));
    assert!(!panics(move || {
        drop(d);
        drop(recovered);
    }));
}

#[test]
fn rejection_dropped_while_unwinding_does_not_abort() {
    strict();
    let d = D::rejected("lost".into());
    assert!(panics(move || {
        let _held = d;
        panic!("unrelated failure");
    }));
}

#[test]
fn late_settlement_through_a_handle_is_reported() {
    strict();
    let (d, resolver) = D::pending();
    resolver.fulfill(1).unwrap();
    assert!(panics(|| {
        let _ = resolver.reject("again".into());
    }));
    assert_eq!(d.result(), Some(Ok(1)));
}

#[test]
fn resolver_error_after_settling_is_not_a_late_settlement() {
    strict();
    let d = D::with_resolver(|fulfill| {
        fulfill.fulfill(3).unwrap();
        Err("late".into())
    });
    assert_eq!(d.result(), Some(Ok(3)));
}
