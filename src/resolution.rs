//! What a promise can be resolved with, and how each case is adopted.

use std::fmt;

use crate::promise::{CancelAction, Promise, Resolver};
use crate::Error;

/// A value offered to a promise's resolve side.
pub enum Resolution<T, E> {
    /// Settle immediately with this value.
    Value(T),
    /// Follow another promise of this crate. The resolving promise hands its
    /// consumers and its cancellation over to it.
    Promise(Promise<T, E>),
    /// Follow a foreign future through its [`Thenable`] implementation.
    Thenable(Box<dyn Thenable<T, E>>),
}

impl<T, E> Resolution<T, E> {
    pub fn thenable<Th>(thenable: Th) -> Self
    where
        Th: Thenable<T, E> + 'static,
    {
        Resolution::Thenable(Box::new(thenable))
    }
}

impl<T, E> From<Promise<T, E>> for Resolution<T, E> {
    fn from(promise: Promise<T, E>) -> Self {
        Resolution::Promise(promise)
    }
}

impl<T: fmt::Debug, E> fmt::Debug for Resolution<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Resolution::Promise(promise) => f.debug_tuple("Promise").field(promise).finish(),
            Resolution::Thenable(_) => f.write_str("Thenable(..)"),
        }
    }
}

/// A foreign future that can report its outcome to a [`Resolver`].
///
/// The resolver given to `subscribe` only honours its first settlement, so
/// an implementation that settles twice, or settles and then fails, cannot
/// corrupt the following promise. Returning `Err` before settling rejects it.
pub trait Thenable<T, E> {
    fn subscribe(self: Box<Self>, resolver: Resolver<T, E>) -> Result<(), E>;

    /// How to cancel the foreign operation, if it can be cancelled.
    fn canceller(&self) -> Option<CancelAction> {
        None
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    pub(crate) fn resolve_with(&self, resolution: Resolution<T, E>) {
        if !self.inner.borrow().accepts_settlement() {
            return;
        }
        match resolution {
            Resolution::Value(value) => self.fulfill(value),
            Resolution::Promise(other) => self.adopt(other),
            Resolution::Thenable(thenable) => self.follow(thenable),
        }
    }

    fn adopt(&self, other: Promise<T, E>) {
        if other.leads_to(self) {
            log::debug!("{}: resolution cycle", self.inner.borrow().name());
            return self.reject(E::from(Error::ResolutionCycle));
        }
        let queued = {
            let mut inner = self.inner.borrow_mut();
            let target = other.clone();
            inner.delegate = Some(other.clone());
            inner.cancel = Some(Box::new(move || target.ignore()));
            log::trace!(
                "{} adopted {}, forwarding {} consumer(s)",
                inner.name(),
                other.inner.borrow().name(),
                inner.consumers.len()
            );
            std::mem::take(&mut inner.consumers)
        };
        for record in queued {
            other.handle(record);
        }
    }

    /// Whether following the adoption chain from `self` reaches `target`.
    fn leads_to(&self, target: &Promise<T, E>) -> bool {
        let mut current = self.clone();
        loop {
            if current.ptr_eq(target) {
                return true;
            }
            let next = current.inner.borrow().delegate.clone();
            match next {
                Some(next) => current = next,
                None => return false,
            }
        }
    }

    fn follow(&self, thenable: Box<dyn Thenable<T, E>>) {
        let cancel = thenable.canceller();
        {
            let mut inner = self.inner.borrow_mut();
            log::trace!(
                "{} following a thenable (cancellable: {})",
                inner.name(),
                cancel.is_some()
            );
            inner.cancel = cancel;
        }
        let resolver = Resolver::new(self.clone());
        if let Err(reason) = thenable.subscribe(resolver.clone()) {
            resolver.reject(reason);
        }
    }
}
