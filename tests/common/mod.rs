//! A virtual `setTimeout` for driving promises in tests.
#![allow(dead_code)]

use std::cell::RefCell;
use thenable::{block_on_with, Promise};

struct Timer {
    due: u64,
    seq: u64,
    callback: Box<dyn FnOnce()>,
}

#[derive(Default)]
struct Clock {
    now: u64,
    seq: u64,
    timers: Vec<Timer>,
}

thread_local! {
    static CLOCK: RefCell<Clock> = RefCell::new(Clock::default());
}

/// Run `callback` once the virtual clock reaches `delay_ms` from now.
pub fn set_timeout(delay_ms: u64, callback: impl FnOnce() + 'static) {
    CLOCK.with(|clock| {
        let mut clock = clock.borrow_mut();
        let timer = Timer {
            due: clock.now + delay_ms,
            seq: clock.seq,
            callback: Box::new(callback),
        };
        clock.seq += 1;
        clock.timers.push(timer);
    });
}

/// Advance to the earliest timer and fire it. Timers due at the same time
/// fire in the order they were set. Returns `false` when none are left.
pub fn fire_next() -> bool {
    let next = CLOCK.with(|clock| {
        let mut clock = clock.borrow_mut();
        let index = clock
            .timers
            .iter()
            .enumerate()
            .min_by_key(|(_, timer)| (timer.due, timer.seq))
            .map(|(index, _)| index)?;
        let timer = clock.timers.remove(index);
        clock.now = timer.due;
        Some(timer.callback)
    });
    match next {
        Some(callback) => {
            callback();
            true
        }
        None => false,
    }
}

pub fn now() -> u64 {
    CLOCK.with(|clock| clock.borrow().now)
}

/// A promise fulfilled with `value` after `delay_ms`.
pub fn delay<T: Clone + 'static, E: Clone + 'static>(delay_ms: u64, value: T) -> Promise<T, E> {
    Promise::new(|resolver| {
        set_timeout(delay_ms, move || resolver.resolve(value));
        Ok(())
    })
}

/// A promise rejected with `reason` after `delay_ms`.
pub fn delay_reject<T: Clone + 'static, E: Clone + 'static>(
    delay_ms: u64,
    reason: E,
) -> Promise<T, E> {
    Promise::new(|resolver| {
        set_timeout(delay_ms, move || resolver.reject(reason));
        Ok(())
    })
}

/// Await `promise`, firing timers whenever the microtask queue runs dry.
pub fn run<T: Clone + 'static, E: Clone + 'static>(promise: Promise<T, E>) -> Result<T, E> {
    block_on_with(promise, fire_next).expect("promise never settled")
}
