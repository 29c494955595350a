//! Per-thread work queue for listener delivery and listener teardown.
//!
//! Settling a value settles its children from inside its listeners, and dropping a
//! value drops the children its listeners own. Both go through [`run`]: the
//! outermost call on a thread becomes the runner and loops until the queue is
//! empty, nested calls only enqueue. A chain of any length therefore uses a constant
//! amount of native stack.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};

pub(crate) type Job = Box<dyn FnOnce()>;

struct Queue {
    running: bool,
    jobs: VecDeque<Job>,
}

thread_local! {
    static QUEUE: RefCell<Queue> = const {
        RefCell::new(Queue {
            running: false,
            jobs: VecDeque::new(),
        })
    };
}

/// Run `job` now if nothing on this thread is running jobs, else queue it behind
/// the jobs already waiting. Returns once the queue is empty or `job` is queued.
///
/// A panicking job does not stop the others. The first panic is resumed after the
/// queue drains.
pub(crate) fn run(job: Job) {
    let mut job = Some(job);
    let runner = QUEUE
        .try_with(|queue| {
            let mut queue = queue.borrow_mut();
            if queue.running {
                queue.jobs.extend(job.take());
                false
            } else {
                queue.running = true;
                true
            }
        })
        // Thread-local storage already torn down: run inline.
        .unwrap_or(false);

    let Some(first) = job else {
        return;
    };
    if runner {
        drive(first);
    } else {
        first();
    }
}

fn drive(first: Job) {
    let mut panicked = None;
    let mut next = Some(first);
    while let Some(job) = next {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job))
            && panicked.is_none()
        {
            panicked = Some(payload);
        }
        next = QUEUE
            .try_with(|queue| {
                let mut queue = queue.borrow_mut();
                let job = queue.jobs.pop_front();
                if job.is_none() {
                    queue.running = false;
                }
                job
            })
            .ok()
            .flatten();
    }

    if let Some(payload) = panicked {
        panic::resume_unwind(payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn push(log: &Arc<Mutex<Vec<&'static str>>>, entry: &'static str) -> Job {
        let log = Arc::clone(log);
        Box::new(move || log.lock().unwrap().push(entry))
    }

    #[test]
    fn nested_jobs_run_after_the_current_one() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let inner = push(&log, "inner");
        let outer_log = Arc::clone(&log);
        run(Box::new(move || {
            run(inner);
            outer_log.lock().unwrap().push("outer");
        }));
        assert_eq!(*log.lock().unwrap(), vec!["outer", "inner"]);
    }

    #[test]
    fn panicking_job_does_not_stop_the_queue() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let after = push(&log, "after");
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            run(Box::new(move || {
                run(after);
                panic!("job failed");
            }));
        }));
        assert!(outcome.is_err());
        assert_eq!(*log.lock().unwrap(), vec!["after"]);

        let again = push(&log, "again");
        run(again);
        assert_eq!(*log.lock().unwrap(), vec!["after", "again"]);
    }
}
