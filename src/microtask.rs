//! A thread-local microtask queue.
//!
//! Tasks queued here run later on the same thread, in the order they were
//! queued, when someone drains the queue with [`run_microtasks`]. Promises use
//! it to notify their continuations, so nothing happens until the queue is
//! drained, either directly or through [`block_on`](crate::block_on).
use std::{cell::RefCell, collections::VecDeque};

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce()>;

#[derive(Default)]
struct Queue {
    tasks: VecDeque<Task>,
    draining: bool,
}

thread_local! {
    static QUEUE: RefCell<Queue> = RefCell::new(Queue::default());
}

/// Queue `task` to run after the current synchronous work, behind every task
/// already queued.
pub fn queue_microtask(task: impl FnOnce() + 'static) {
    QUEUE.with(|queue| queue.borrow_mut().tasks.push_back(Box::new(task)));
}

/// Run queued tasks until the queue is empty, including tasks queued by the
/// tasks themselves. Returns how many ran.
///
/// A call made from inside a running task returns `0` without running
/// anything; the outer drain picks up whatever was queued.
pub fn run_microtasks() -> usize {
    let entered = QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        !std::mem::replace(&mut queue.draining, true)
    });
    if !entered {
        return 0;
    }

    let _guard = DrainGuard;
    let mut ran = 0;
    // The borrow is released before each task runs so tasks can queue more.
    while let Some(task) = QUEUE.with(|queue| queue.borrow_mut().tasks.pop_front()) {
        task();
        ran += 1;
    }
    if ran > 0 {
        log::trace!("drained {} microtask(s)", ran);
    }
    ran
}

/// Clears the draining flag even if a task panics.
struct DrainGuard;

impl Drop for DrainGuard {
    fn drop(&mut self) {
        QUEUE.with(|queue| queue.borrow_mut().draining = false);
    }
}

/// Number of tasks waiting to run.
pub fn pending_microtasks() -> usize {
    QUEUE.with(|queue| queue.borrow().tasks.len())
}

/// Whether a drain is in progress on this thread.
pub fn is_draining() -> bool {
    QUEUE.with(|queue| queue.borrow().draining)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn test_tasks_run_later_in_fifo_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let log = log.clone();
            queue_microtask(move || log.borrow_mut().push(i));
        }
        assert!(log.borrow().is_empty());
        assert_eq!(pending_microtasks(), 3);

        assert_eq!(run_microtasks(), 3);
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
        assert_eq!(pending_microtasks(), 0);
    }

    #[test]
    fn test_tasks_queued_while_draining_run_in_same_drain() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let outer = log.clone();
        queue_microtask(move || {
            outer.borrow_mut().push("first");
            let inner = outer.clone();
            queue_microtask(move || inner.borrow_mut().push("nested"));
        });
        let second = log.clone();
        queue_microtask(move || second.borrow_mut().push("second"));

        assert_eq!(run_microtasks(), 3);
        assert_eq!(*log.borrow(), vec!["first", "second", "nested"]);
    }

    #[test]
    fn test_nested_drain_is_a_no_op() {
        let nested = Rc::new(RefCell::new(None));
        let seen = nested.clone();
        queue_microtask(move || {
            assert!(is_draining());
            *seen.borrow_mut() = Some(run_microtasks());
        });
        queue_microtask(|| {});

        assert_eq!(run_microtasks(), 2);
        assert_eq!(*nested.borrow(), Some(0));
        assert!(!is_draining());
    }
}
