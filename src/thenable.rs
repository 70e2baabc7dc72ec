use crate::Promise;
use std::fmt;

/// Callback receiving a settled value or reason.
pub type Callback<A> = Box<dyn FnOnce(A)>;

/// Anything that eventually settles and can tell a subscriber how.
///
/// This is the interop seam: a [`Promise`] adopts any `Thenable` it is
/// resolved with, the combinators accept any mix of them, and `Promise`
/// itself implements the trait so foreign code can chain on it.
///
/// An implementation should call at most one of the two callbacks, at most
/// once. Promises tolerate misbehaving thenables because settlement is
/// write-once, but the extra calls are lost.
pub trait Thenable {
    type Value;
    type Reason;

    fn subscribe(&self, on_fulfilled: Callback<Self::Value>, on_rejected: Callback<Self::Reason>);
}

impl<Th: Thenable + ?Sized> Thenable for Box<Th> {
    type Value = Th::Value;
    type Reason = Th::Reason;

    fn subscribe(&self, on_fulfilled: Callback<Self::Value>, on_rejected: Callback<Self::Reason>) {
        (**self).subscribe(on_fulfilled, on_rejected)
    }
}

/// How a promise should be settled: the outcome of an executor step or a
/// `then` handler.
///
/// Handlers usually return `Ok(value)`, `Err(reason)` or another promise and
/// let `Into` build this.
pub enum Resolution<T, E> {
    Fulfill(T),
    /// Follow another thenable and settle the same way it does.
    Adopt(Box<dyn Thenable<Value = T, Reason = E>>),
    Reject(E),
}

impl<T, E> Resolution<T, E> {
    pub fn adopt(thenable: impl Thenable<Value = T, Reason = E> + 'static) -> Self {
        Resolution::Adopt(Box::new(thenable))
    }
}

impl<T, E> From<Result<T, E>> for Resolution<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Resolution::Fulfill(value),
            Err(reason) => Resolution::Reject(reason),
        }
    }
}

impl<T: Clone + 'static, E: Clone + 'static> From<Promise<T, E>> for Resolution<T, E> {
    fn from(promise: Promise<T, E>) -> Self {
        Resolution::Adopt(Box::new(promise))
    }
}

impl<T: fmt::Debug, E: fmt::Debug> fmt::Debug for Resolution<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Fulfill(value) => f.debug_tuple("Fulfill").field(value).finish(),
            Resolution::Adopt(_) => f.write_str("Adopt(..)"),
            Resolution::Reject(reason) => f.debug_tuple("Reject").field(reason).finish(),
        }
    }
}
