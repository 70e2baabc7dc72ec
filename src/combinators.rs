//! Promises built from many thenables.
use crate::{Promise, Resolver, Thenable};
use std::{cell::RefCell, convert::Infallible, rc::Rc};
use thiserror::Error;

/// The outcome of one input of [`Promise::all_settled`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled<T, E> {
    Fulfilled(T),
    Rejected(E),
}

impl<T, E> Settled<T, E> {
    /// `"fulfilled"` or `"rejected"`.
    pub fn status(&self) -> &'static str {
        match self {
            Settled::Fulfilled(_) => "fulfilled",
            Settled::Rejected(_) => "rejected",
        }
    }

    pub fn into_result(self) -> Result<T, E> {
        match self {
            Settled::Fulfilled(value) => Ok(value),
            Settled::Rejected(reason) => Err(reason),
        }
    }
}

impl<T, E> From<Result<T, E>> for Settled<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Settled::Fulfilled(value),
            Err(reason) => Settled::Rejected(reason),
        }
    }
}

/// Every input of [`Promise::any`] rejected. The reasons are kept in input
/// order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("All promises were rejected")]
pub struct AggregateError<E> {
    pub errors: Vec<E>,
}

/// Input slots filled in whatever order the inputs settle, read back in input
/// order once `remaining` hits zero.
struct Slots<A> {
    slots: Vec<Option<A>>,
    remaining: usize,
}

impl<A> Slots<A> {
    fn new(len: usize) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Slots {
            slots: (0..len).map(|_| None).collect(),
            remaining: len,
        }))
    }

    /// Record the outcome of input `index`. Returns every outcome once the
    /// last one arrives.
    fn fill(&mut self, index: usize, outcome: A) -> Option<Vec<A>> {
        if self.remaining == 0 {
            return None;
        }
        if self.slots[index].replace(outcome).is_none() {
            self.remaining -= 1;
        }
        if self.remaining == 0 {
            Some(self.slots.drain(..).flatten().collect())
        } else {
            None
        }
    }
}

impl<T: Clone + 'static, E: Clone + 'static> Promise<T, E> {
    /// Fulfill with every input's value, in input order, once all of them
    /// have fulfilled. Reject with the first rejection to happen.
    ///
    /// Inputs that settle after a rejection are ignored; they are not
    /// cancelled.
    ///
    /// # Examples
    ///
    /// ```
    /// use thenable::{block_on, Promise};
    ///
    /// let all = Promise::all(vec![
    ///     Promise::<i32, String>::resolve(1),
    ///     Promise::resolve(2),
    /// ]);
    /// assert_eq!(block_on(all).unwrap(), Ok(vec![1, 2]));
    /// ```
    pub fn all<I>(items: I) -> Promise<Vec<T>, E>
    where
        I: IntoIterator,
        I::Item: Thenable<Value = T, Reason = E> + 'static,
    {
        let items: Vec<_> = items.into_iter().collect();
        let (promise, resolver) = Promise::with_resolvers();
        if items.is_empty() {
            resolver.resolve(Vec::new());
            return promise;
        }

        let slots = Slots::new(items.len());
        for (index, item) in items.iter().enumerate() {
            let on_fulfilled = resolver.clone();
            let on_rejected = resolver.clone();
            let slots = slots.clone();
            item.subscribe(
                Box::new(move |value| {
                    let done = slots.borrow_mut().fill(index, value);
                    if let Some(values) = done {
                        on_fulfilled.resolve(values);
                    }
                }),
                Box::new(move |reason| on_rejected.reject(reason)),
            );
        }
        promise
    }

    /// Wait for every input to settle and report each outcome, in input
    /// order. Never rejects.
    pub fn all_settled<I>(items: I) -> Promise<Vec<Settled<T, E>>, Infallible>
    where
        I: IntoIterator,
        I::Item: Thenable<Value = T, Reason = E> + 'static,
    {
        let items: Vec<_> = items.into_iter().collect();
        let (promise, resolver) = Promise::with_resolvers();
        if items.is_empty() {
            resolver.resolve(Vec::new());
            return promise;
        }

        let slots = Slots::new(items.len());
        for (index, item) in items.iter().enumerate() {
            item.subscribe(
                record(&slots, &resolver, index, Settled::Fulfilled),
                record(&slots, &resolver, index, Settled::Rejected),
            );
        }
        promise
    }

    /// Settle the way the first input to settle does.
    ///
    /// With no inputs the returned promise stays pending forever.
    pub fn race<I>(items: I) -> Promise<T, E>
    where
        I: IntoIterator,
        I::Item: Thenable<Value = T, Reason = E> + 'static,
    {
        let (promise, resolver) = Promise::with_resolvers();
        for item in items {
            let on_fulfilled = resolver.clone();
            let on_rejected = resolver.clone();
            item.subscribe(
                Box::new(move |value| on_fulfilled.resolve(value)),
                Box::new(move |reason| on_rejected.reject(reason)),
            );
        }
        promise
    }

    /// Fulfill with the first input to fulfill. If every input rejects,
    /// reject with all the reasons in input order.
    ///
    /// With no inputs the returned promise rejects right away with an empty
    /// [`AggregateError`].
    pub fn any<I>(items: I) -> Promise<T, AggregateError<E>>
    where
        I: IntoIterator,
        I::Item: Thenable<Value = T, Reason = E> + 'static,
    {
        let items: Vec<_> = items.into_iter().collect();
        let (promise, resolver) = Promise::with_resolvers();
        if items.is_empty() {
            resolver.reject(AggregateError { errors: Vec::new() });
            return promise;
        }

        let slots = Slots::new(items.len());
        for (index, item) in items.iter().enumerate() {
            let on_fulfilled = resolver.clone();
            let on_rejected = resolver.clone();
            let slots = slots.clone();
            item.subscribe(
                Box::new(move |value| on_fulfilled.resolve(value)),
                Box::new(move |reason| {
                    let done = slots.borrow_mut().fill(index, reason);
                    if let Some(errors) = done {
                        on_rejected.reject(AggregateError { errors });
                    }
                }),
            );
        }
        promise
    }
}

fn record<A: 'static, T: 'static, E: 'static>(
    slots: &Rc<RefCell<Slots<Settled<T, E>>>>,
    resolver: &Resolver<Vec<Settled<T, E>>, Infallible>,
    index: usize,
    wrap: fn(A) -> Settled<T, E>,
) -> Box<dyn FnOnce(A)>
where
    T: Clone,
    E: Clone,
{
    let slots = slots.clone();
    let resolver = resolver.clone();
    Box::new(move |outcome| {
        let done = slots.borrow_mut().fill(index, wrap(outcome));
        if let Some(outcomes) = done {
            resolver.resolve(outcomes);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_microtasks;

    #[test]
    fn test_slots_collect_in_input_order() {
        let slots = Slots::new(3);
        let mut slots = slots.borrow_mut();
        assert_eq!(slots.fill(2, "c"), None);
        assert_eq!(slots.fill(0, "a"), None);
        assert_eq!(slots.fill(1, "b"), Some(vec!["a", "b", "c"]));
    }

    #[test]
    fn test_slots_ignore_repeated_outcomes() {
        let slots = Slots::new(2);
        let mut slots = slots.borrow_mut();
        assert_eq!(slots.fill(0, 1), None);
        assert_eq!(slots.fill(0, 2), None);
        assert_eq!(slots.fill(1, 3), Some(vec![2, 3]));
    }

    #[test]
    fn test_empty_all_fulfills_without_a_turn() {
        let all = Promise::all(Vec::<Promise<u8, ()>>::new());
        assert_eq!(all.try_result(), Some(Ok(vec![])));
        let settled = Promise::all_settled(Vec::<Promise<u8, ()>>::new());
        assert_eq!(settled.try_result(), Some(Ok(vec![])));
    }

    #[test]
    fn test_empty_any_rejects_without_a_turn() {
        let any = Promise::any(Vec::<Promise<u8, ()>>::new());
        let error = AggregateError { errors: vec![] };
        assert_eq!(error.to_string(), "All promises were rejected");
        assert_eq!(any.try_result(), Some(Err(error)));
    }

    #[test]
    fn test_empty_race_stays_pending() {
        let race = Promise::race(Vec::<Promise<u8, ()>>::new());
        run_microtasks();
        assert!(race.is_pending());
    }

    #[test]
    fn test_settled_status_and_result() {
        let ok: Settled<u8, &str> = Ok(1).into();
        let err: Settled<u8, &str> = Err("e").into();
        assert_eq!(ok.status(), "fulfilled");
        assert_eq!(err.status(), "rejected");
        assert_eq!(err.into_result(), Err("e"));
    }
}
