//! A single-threaded promise built on a microtask queue.
//!
//! [`Promise`] settles exactly once, runs its continuations in a later
//! microtask turn, adopts any [`Thenable`] it is resolved with, and combines
//! with others through [`Promise::all`], [`Promise::all_settled`],
//! [`Promise::race`] and [`Promise::any`].
//!
//! Nothing runs on its own: drain the queue with [`run_microtasks`], or await
//! a promise with [`block_on`].
//!
//! # Examples
//!
//! ```
//! use thenable::{block_on, Promise};
//!
//! let value = Promise::<i32, i32>::reject(1)
//!     .then(|value| Ok(value * 2))
//!     .catch(|reason| Ok(reason * 3));
//! assert_eq!(block_on(value).unwrap(), Ok(3));
//! ```
use thiserror::Error;

pub mod combinators;
pub mod consumer;
pub mod microtask;
pub mod promise;
pub mod thenable;

pub use combinators::{AggregateError, Settled};
pub use consumer::{block_on, block_on_with, Consumer};
pub use microtask::{pending_microtasks, queue_microtask, run_microtasks};
pub use promise::{Promise, PromiseState, Resolver};
pub use thenable::{Callback, Resolution, Thenable};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("the microtask queue ran dry while the future was still pending")]
    Stalled,
    #[error("cannot block on a future from inside a microtask")]
    Reentrant,
}
