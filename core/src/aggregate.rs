//! Fan-in over many deferred values.

use std::sync::{Arc, Mutex, PoisonError};

use crate::Deferred;

/// Settles once every input fulfilled, or as soon as one rejects.
///
/// Values keep their input positions; the first rejection in settlement order
/// wins and everything after it is ignored. An empty input fulfills with an
/// empty vector. The same value may appear several times and fills every
/// position it occupies.
pub fn all<T, E, I>(inputs: I) -> Deferred<Vec<T>, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
    I: IntoIterator<Item = Deferred<T, E>>,
{
    let inputs: Vec<Deferred<T, E>> = inputs.into_iter().collect();
    if inputs.is_empty() {
        return Deferred::fulfilled(Vec::new());
    }

    let output: Deferred<Vec<T>, E> = Deferred::unsettled();
    let tally = Arc::new(Mutex::new(Tally::new(inputs.len())));
    for (index, input) in inputs.iter().enumerate() {
        let tally = Arc::clone(&tally);
        let output = output.clone();
        input.subscribe(Box::new(move |result| {
            let decision = tally
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .record(index, result);
            if let Some(outcome) = decision {
                output.forward(outcome);
            }
        }));
    }
    output
}

impl<T, E> Deferred<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// See [`all`].
    pub fn all<I>(inputs: I) -> Deferred<Vec<T>, E>
    where
        I: IntoIterator<Item = Deferred<T, E>>,
    {
        all(inputs)
    }
}

struct Tally<T> {
    slots: Vec<Option<T>>,
    remaining: usize,
    decided: bool,
}

impl<T: Clone> Tally<T> {
    fn new(len: usize) -> Self {
        Self {
            slots: (0..len).map(|_| None).collect(),
            remaining: len,
            decided: false,
        }
    }

    /// Record one input's result; returns the aggregate outcome once decided.
    fn record<E: Clone>(
        &mut self,
        index: usize,
        result: &Result<T, E>,
    ) -> Option<Result<Vec<T>, E>> {
        if self.decided {
            return None;
        }
        match result {
            Err(error) => {
                self.decided = true;
                Some(Err(error.clone()))
            }
            Ok(value) => {
                self.slots[index] = Some(value.clone());
                self.remaining -= 1;
                if self.remaining > 0 {
                    return None;
                }
                self.decided = true;
                Some(Ok(self.slots.drain(..).flatten().collect()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::State;

    type D = Deferred<i32, String>;

    #[test]
    fn tally_waits_for_every_slot() {
        let mut tally = Tally::new(2);
        assert_eq!(tally.record::<String>(1, &Ok(20)), None);
        assert_eq!(tally.record::<String>(0, &Ok(10)), Some(Ok(vec![10, 20])));
    }

    #[test]
    fn tally_ignores_signals_after_decision() {
        let mut tally = Tally::<i32>::new(2);
        assert_eq!(tally.record(0, &Err("e")), Some(Err("e")));
        assert_eq!(tally.record::<&str>(1, &Ok(2)), None);
        assert_eq!(tally.record(1, &Err("f")), None);
    }

    #[test]
    fn empty_input_fulfills_immediately() {
        let combined = all(Vec::<D>::new());
        assert_eq!(combined.result(), Some(Ok(Vec::new())));
    }

    #[test]
    fn duplicate_inputs_fill_each_position() {
        let (a, resolve_a) = D::pending();
        let b = D::fulfilled(2);
        let combined = D::all([a.clone(), b, a]);
        assert_eq!(combined.state(), State::Pending);

        resolve_a.fulfill(1).unwrap();
        assert_eq!(combined.result(), Some(Ok(vec![1, 2, 1])));
    }
}
