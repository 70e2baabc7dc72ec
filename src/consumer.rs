//! Awaiting promises from `async` code.
//!
//! A promise only makes progress while the microtask queue is drained, so
//! [`block_on`] interleaves polling with [`run_microtasks`].
use crate::microtask::{is_draining, run_microtasks};
use crate::{Error, Promise, Thenable};
use std::{
    cell::RefCell,
    fmt,
    future::{Future, IntoFuture},
    pin::Pin,
    rc::Rc,
    task::{Context, Poll, Waker},
};

/// A [`Future`] that completes with the outcome of a [`Promise`].
///
/// # Examples
///
/// ```
/// use thenable::{block_on, Promise};
///
/// let promise = Promise::<String, String>::resolve("🍓".into());
/// let task = async move {
///     let value = promise.await?;
///     Ok::<_, String>(format!("received {}", value))
/// };
/// assert_eq!(block_on(task).unwrap(), Ok("received 🍓".to_string()));
/// ```
pub struct Consumer<T, E> {
    slot: Rc<RefCell<Slot<T, E>>>,
}

#[derive(Debug)]
enum WakerState {
    Fresh,
    Tainted,
}

struct Slot<T, E> {
    value: Option<Result<T, E>>,
    waker: Result<Waker, WakerState>,
}

impl<T, E> Slot<T, E> {
    fn deliver(slot: &RefCell<Self>, value: Result<T, E>) {
        let waker = {
            let mut slot = slot.borrow_mut();
            slot.value = Some(value);
            std::mem::replace(&mut slot.waker, Err(WakerState::Tainted))
        };
        if let Ok(waker) = waker {
            waker.wake()
        }
    }
}

impl<T: Clone + 'static, E: Clone + 'static> IntoFuture for Promise<T, E> {
    type Output = Result<T, E>;
    type IntoFuture = Consumer<T, E>;

    fn into_future(self) -> Consumer<T, E> {
        let slot = Rc::new(RefCell::new(Slot {
            value: None,
            waker: Err(WakerState::Fresh),
        }));
        let on_fulfilled = slot.clone();
        let on_rejected = slot.clone();
        self.subscribe(
            Box::new(move |value| Slot::deliver(&on_fulfilled, Ok(value))),
            Box::new(move |reason| Slot::deliver(&on_rejected, Err(reason))),
        );
        Consumer { slot }
    }
}

/// Polling again after completion yields the same outcome again.
impl<T: Clone, E: Clone> Future for Consumer<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut guard = self.slot.borrow_mut();
        let slot = &mut *guard;
        match slot.value {
            Some(ref value) => Poll::Ready(value.clone()),
            None => {
                slot.waker = Ok(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl<T, E> fmt::Debug for Consumer<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.slot.borrow();
        f.debug_struct("Consumer")
            .field("ready", &slot.value.is_some())
            .field("waker", &slot.waker.as_ref().err())
            .finish()
    }
}

/// Drive `future` (or anything that turns into one, such as a [`Promise`]) to
/// completion on this thread, draining the microtask queue between polls.
///
/// Fails with [`Error::Stalled`] if the queue runs dry while `future` is still
/// pending, and with [`Error::Reentrant`] if called from inside a microtask.
pub fn block_on<F: IntoFuture>(future: F) -> Result<F::Output, Error> {
    block_on_with(future, || false)
}

/// Like [`block_on`], but calls `idle` whenever the microtask queue runs dry
/// and the future is still pending. `idle` should make some outside progress,
/// such as firing a timer, and return `true`; returning `false` gives up with
/// [`Error::Stalled`].
pub fn block_on_with<F, I>(future: F, mut idle: I) -> Result<F::Output, Error>
where
    F: IntoFuture,
    I: FnMut() -> bool,
{
    if is_draining() {
        return Err(Error::Reentrant);
    }
    let mut future = std::pin::pin!(future.into_future());
    let mut cx = Context::from_waker(futures::task::noop_waker_ref());
    loop {
        if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
            return Ok(output);
        }
        if run_microtasks() > 0 {
            continue;
        }
        if !idle() {
            log::debug!("block_on stalled: no microtasks left and the future is pending");
            return Err(Error::Stalled);
        }
    }
}
