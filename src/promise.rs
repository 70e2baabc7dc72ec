use crate::microtask::queue_microtask;
use crate::thenable::{Callback, Resolution, Thenable};
use std::{cell::RefCell, fmt, rc::Rc};

/// A value that is not available yet.
///
/// A `Promise` starts pending and settles exactly once, either fulfilled with
/// a `T` or rejected with an `E`. Continuations registered with
/// [`then`](Promise::then) and friends run in a later microtask turn, never
/// inline, in the order they were registered.
///
/// Cloning a `Promise` clones the handle, not the state.
///
/// # Examples
///
/// ```
/// use thenable::{block_on, Promise};
///
/// let doubled = Promise::<i32, String>::resolve(21).then(|value| Ok(value * 2));
/// assert_eq!(block_on(doubled).unwrap(), Ok(42));
/// ```
#[doc(alias = "Future")]
pub struct Promise<T, E> {
    inner: Rc<RefCell<Inner<T, E>>>,
}

/// The resolve/reject capabilities of one [`Promise`].
///
/// Every method is a no-op once the promise has settled, or once it has been
/// resolved with a thenable that it is still following.
pub struct Resolver<T, E> {
    inner: Rc<RefCell<Inner<T, E>>>,
}

/// Where a promise is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseState {
    Pending,
    Fulfilled,
    Rejected,
}

#[derive(Clone)]
enum State<T, E> {
    Pending,
    Fulfilled(T),
    Rejected(E),
}

struct Inner<T, E> {
    state: State<T, E>,
    locked: bool,
    flush_scheduled: bool,
    on_fulfill: Vec<Callback<T>>,
    on_reject: Vec<Callback<E>>,
}

impl<T: Clone + 'static, E: Clone + 'static> Promise<T, E> {
    /// Create a promise and run `executor` right away, before `new` returns.
    ///
    /// If the executor returns `Err(reason)` the promise is rejected with it,
    /// unless the executor already settled it.
    ///
    /// # Examples
    ///
    /// ```
    /// use thenable::{block_on, Promise};
    ///
    /// let promise = Promise::<i32, String>::new(|resolver| {
    ///     resolver.resolve(42);
    ///     Ok(())
    /// });
    /// assert_eq!(block_on(promise).unwrap(), Ok(42));
    ///
    /// let failed = Promise::<i32, String>::new(|_| Err("💥".to_string()));
    /// assert_eq!(block_on(failed).unwrap(), Err("💥".to_string()));
    /// ```
    pub fn new<F>(executor: F) -> Self
    where
        F: FnOnce(Resolver<T, E>) -> Result<(), E>,
    {
        let (promise, resolver) = Self::with_resolvers();
        if let Err(reason) = executor(resolver.clone()) {
            resolver.reject(reason);
        }
        promise
    }

    /// A pending promise together with the resolver that settles it.
    pub fn with_resolvers() -> (Self, Resolver<T, E>) {
        let inner = Rc::new(RefCell::new(Inner {
            state: State::Pending,
            locked: false,
            flush_scheduled: false,
            on_fulfill: Vec::new(),
            on_reject: Vec::new(),
        }));
        (
            Promise {
                inner: inner.clone(),
            },
            Resolver { inner },
        )
    }

    /// A promise fulfilled with `value`.
    pub fn resolve(value: T) -> Self {
        Self::new(|resolver| {
            resolver.resolve(value);
            Ok(())
        })
    }

    /// A promise that settles however `thenable` settles.
    pub fn adopt(thenable: impl Thenable<Value = T, Reason = E> + 'static) -> Self {
        Self::new(|resolver| {
            resolver.resolve_with(thenable);
            Ok(())
        })
    }

    /// A promise rejected with `reason`. The reason is stored as is, even if
    /// it is itself a promise.
    pub fn reject(reason: E) -> Self {
        Self::new(|resolver| {
            resolver.reject(reason);
            Ok(())
        })
    }

    /// Chain a fulfillment handler. A rejection passes through untouched.
    ///
    /// The handler's result settles the returned promise: `Ok` fulfills it,
    /// `Err` rejects it and a returned promise is followed.
    pub fn then<U, F, O>(&self, on_fulfilled: F) -> Promise<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> O + 'static,
        O: Into<Resolution<U, E>>,
    {
        self.derive(move |value| on_fulfilled(value).into(), Resolution::Reject)
    }

    /// Chain both a fulfillment and a rejection handler. Exactly one of them
    /// runs.
    pub fn then_or_else<U, F, O, R, P>(&self, on_fulfilled: F, on_rejected: R) -> Promise<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> O + 'static,
        O: Into<Resolution<U, E>>,
        R: FnOnce(E) -> P + 'static,
        P: Into<Resolution<U, E>>,
    {
        self.derive(
            move |value| on_fulfilled(value).into(),
            move |reason| on_rejected(reason).into(),
        )
    }

    /// The general form of chaining, with both handlers optional.
    ///
    /// A missing fulfillment handler forwards the value through `Into`; a
    /// missing rejection handler forwards the reason unchanged.
    ///
    /// The `T: Into<U>` bound applies even when `on_fulfilled` is given. To
    /// map to a type `T` does not convert into, use [`then`](Promise::then)
    /// or [`then_or_else`](Promise::then_or_else).
    pub fn then_with<U, F, O, R, P>(
        &self,
        on_fulfilled: Option<F>,
        on_rejected: Option<R>,
    ) -> Promise<U, E>
    where
        T: Into<U>,
        U: Clone + 'static,
        F: FnOnce(T) -> O + 'static,
        O: Into<Resolution<U, E>>,
        R: FnOnce(E) -> P + 'static,
        P: Into<Resolution<U, E>>,
    {
        self.derive(
            move |value| match on_fulfilled {
                Some(on_fulfilled) => on_fulfilled(value).into(),
                None => Resolution::Fulfill(value.into()),
            },
            move |reason| match on_rejected {
                Some(on_rejected) => on_rejected(reason).into(),
                None => Resolution::Reject(reason),
            },
        )
    }

    /// Recover from a rejection. A fulfilled value passes through untouched.
    pub fn catch<R, P>(&self, on_rejected: R) -> Promise<T, E>
    where
        R: FnOnce(E) -> P + 'static,
        P: Into<Resolution<T, E>>,
    {
        self.derive(Resolution::Fulfill, move |reason| on_rejected(reason).into())
    }

    /// Run `on_finally` once this promise settles, whichever way.
    ///
    /// The returned promise settles like this one. Only an `Err` from
    /// `on_finally` changes that: it rejects the returned promise instead.
    pub fn finally<F, R>(&self, on_finally: F) -> Promise<T, E>
    where
        F: FnOnce() -> Result<R, E> + 'static,
    {
        // Only one side ever runs, but both need to own the callback.
        let on_finally = Rc::new(RefCell::new(Some(on_finally)));
        let on_reject = on_finally.clone();
        let run = |slot: &Rc<RefCell<Option<F>>>| {
            let on_finally = slot.borrow_mut().take();
            match on_finally {
                Some(on_finally) => on_finally().map(drop),
                None => Ok(()),
            }
        };
        self.derive(
            move |value| match run(&on_finally) {
                Ok(()) => Resolution::Fulfill(value),
                Err(reason) => Resolution::Reject(reason),
            },
            move |reason| match run(&on_reject) {
                Ok(()) => Resolution::Reject(reason),
                Err(reason) => Resolution::Reject(reason),
            },
        )
    }

    pub fn state(&self) -> PromiseState {
        match self.inner.borrow().state {
            State::Pending => PromiseState::Pending,
            State::Fulfilled(_) => PromiseState::Fulfilled,
            State::Rejected(_) => PromiseState::Rejected,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state() == PromiseState::Pending
    }

    pub fn is_settled(&self) -> bool {
        !self.is_pending()
    }

    /// A copy of the outcome, or `None` while pending.
    pub fn try_result(&self) -> Option<Result<T, E>> {
        match &self.inner.borrow().state {
            State::Pending => None,
            State::Fulfilled(value) => Some(Ok(value.clone())),
            State::Rejected(reason) => Some(Err(reason.clone())),
        }
    }

    fn derive<U, F, R>(&self, on_fulfilled: F, on_rejected: R) -> Promise<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Resolution<U, E> + 'static,
        R: FnOnce(E) -> Resolution<U, E> + 'static,
    {
        let (promise, resolver) = Promise::with_resolvers();
        let fulfill_side = resolver.clone();
        self.register(
            Box::new(move |value| fulfill_side.settle(on_fulfilled(value))),
            Box::new(move |reason| resolver.settle(on_rejected(reason))),
        );
        promise
    }

    /// Queue one pair of continuations.
    ///
    /// While pending they wait for the flush scheduled at settlement. Once
    /// settled, each pair gets its own microtask carrying a copy of the
    /// outcome, so it runs in order with everything queued after it.
    fn register(&self, on_fulfilled: Callback<T>, on_rejected: Callback<E>) {
        let state = {
            let mut inner = self.inner.borrow_mut();
            if matches!(inner.state, State::Pending) {
                inner.on_fulfill.push(on_fulfilled);
                inner.on_reject.push(on_rejected);
                return;
            }
            inner.state.clone()
        };
        match state {
            State::Fulfilled(value) => queue_microtask(move || on_fulfilled(value)),
            State::Rejected(reason) => queue_microtask(move || on_rejected(reason)),
            State::Pending => {}
        }
    }
}

impl<T: Clone + 'static, E: Clone + 'static> Resolver<T, E> {
    /// Fulfill with `value`.
    pub fn resolve(&self, value: T) {
        if self.accepts() {
            transition(&self.inner, State::Fulfilled(value));
        } else {
            log::trace!("ignoring resolve on a promise that is already resolved");
        }
    }

    /// Follow `thenable` and settle the same way it does.
    pub fn resolve_with(&self, thenable: impl Thenable<Value = T, Reason = E> + 'static) {
        self.settle(Resolution::adopt(thenable))
    }

    /// Reject with `reason`.
    pub fn reject(&self, reason: E) {
        if self.accepts() {
            transition(&self.inner, State::Rejected(reason));
        } else {
            log::trace!("ignoring reject on a promise that is already resolved");
        }
    }

    pub fn settle(&self, resolution: Resolution<T, E>) {
        match resolution {
            Resolution::Fulfill(value) => self.resolve(value),
            Resolution::Reject(reason) => self.reject(reason),
            Resolution::Adopt(thenable) => {
                if !self.accepts() {
                    log::trace!("ignoring thenable for a promise that is already resolved");
                    return;
                }
                self.inner.borrow_mut().locked = true;
                log::trace!("promise is following a thenable");
                // The thenable reports back through the inner state directly,
                // past the lock that now shuts out everyone else.
                let fulfill_side = self.inner.clone();
                let reject_side = self.inner.clone();
                thenable.subscribe(
                    Box::new(move |value| transition(&fulfill_side, State::Fulfilled(value))),
                    Box::new(move |reason| transition(&reject_side, State::Rejected(reason))),
                );
            }
        }
    }

    /// Whether the promise has neither settled nor started following a
    /// thenable.
    pub fn is_pending(&self) -> bool {
        self.accepts()
    }

    fn accepts(&self) -> bool {
        let inner = self.inner.borrow();
        !inner.locked && matches!(inner.state, State::Pending)
    }
}

/// Settle once. Later calls are ignored.
fn transition<T: Clone + 'static, E: Clone + 'static>(
    inner: &Rc<RefCell<Inner<T, E>>>,
    state: State<T, E>,
) {
    {
        let mut guard = inner.borrow_mut();
        if !matches!(guard.state, State::Pending) {
            log::trace!("ignoring second settlement");
            return;
        }
        log::trace!(
            "promise {} with {} continuation(s) queued",
            if matches!(state, State::Fulfilled(_)) {
                "fulfilled"
            } else {
                "rejected"
            },
            guard.on_fulfill.len()
        );
        guard.state = state;
    }
    schedule_flush(inner);
}

fn schedule_flush<T: Clone + 'static, E: Clone + 'static>(inner: &Rc<RefCell<Inner<T, E>>>) {
    if std::mem::replace(&mut inner.borrow_mut().flush_scheduled, true) {
        return;
    }
    let inner = inner.clone();
    queue_microtask(move || flush(&inner));
}

/// Hand the settled outcome to every queued continuation, in order. Both
/// queues are emptied; the side that does not apply is dropped.
fn flush<T: Clone + 'static, E: Clone + 'static>(inner: &Rc<RefCell<Inner<T, E>>>) {
    let (state, on_fulfill, on_reject) = {
        let mut guard = inner.borrow_mut();
        guard.flush_scheduled = false;
        if matches!(guard.state, State::Pending) {
            return;
        }
        (
            guard.state.clone(),
            std::mem::take(&mut guard.on_fulfill),
            std::mem::take(&mut guard.on_reject),
        )
    };
    match state {
        State::Fulfilled(value) => {
            for callback in on_fulfill {
                callback(value.clone());
            }
        }
        State::Rejected(reason) => {
            for callback in on_reject {
                callback(reason.clone());
            }
        }
        State::Pending => {}
    }
}

impl<T: Clone + 'static, E: Clone + 'static> Thenable for Promise<T, E> {
    type Value = T;
    type Reason = E;

    fn subscribe(&self, on_fulfilled: Callback<T>, on_rejected: Callback<E>) {
        self.register(on_fulfilled, on_rejected);
    }
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, E> Clone for Resolver<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: fmt::Debug, E: fmt::Debug> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        let mut debug = f.debug_struct("Promise");
        match &inner.state {
            State::Pending => debug.field("state", &PromiseState::Pending),
            State::Fulfilled(value) => debug.field("fulfilled", value),
            State::Rejected(reason) => debug.field("rejected", reason),
        };
        debug.field("continuations", &inner.on_fulfill.len()).finish()
    }
}

impl<T, E> fmt::Debug for Resolver<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver").finish_non_exhaustive()
    }
}
