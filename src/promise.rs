use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::continuation::{Continuation, ContinuationId};
use crate::resolution::Resolution;
use crate::scheduler::Scheduler;
use crate::Error;

/// How to cancel the operation producing a promise's value.
pub type CancelAction = Box<dyn FnOnce()>;

/// Observable state of a promise. `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseState {
    Pending,
    Fulfilled,
    Rejected,
    Ignored,
}

#[derive(Clone)]
pub(crate) enum State<T, E> {
    Pending,
    Fulfilled(T),
    Rejected(E),
    Ignored,
}

impl<T, E> State<T, E> {
    fn tag(&self) -> PromiseState {
        match self {
            State::Pending => PromiseState::Pending,
            State::Fulfilled(_) => PromiseState::Fulfilled,
            State::Rejected(_) => PromiseState::Rejected,
            State::Ignored => PromiseState::Ignored,
        }
    }

    fn is_pending(&self) -> bool {
        matches!(self, State::Pending)
    }
}

/// A single-threaded promise with cooperative cancellation.
///
/// Cloning yields another handle to the same promise. Continuations never
/// run on the stack that registered or settled them; they are dispatched
/// through the promise's [`Scheduler`].
///
/// # Examples
///
/// ```
/// use promise_ignore::{Microtasks, Promise, PromiseState, Error};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let tasks = Microtasks::new();
/// let cancelled = Rc::new(Cell::new(false));
/// let flag = cancelled.clone();
/// let a = Promise::<i32, Error>::new(&tasks.scheduler(), move |_resolve, on_cancel| {
///     on_cancel.register(move || flag.set(true));
///     Ok(())
/// });
/// let b = a.map(|v| v + 1);
/// // `b` is the only consumer of `a`, so losing interest in `b` reaches `a`.
/// b.ignore();
/// assert!(cancelled.get());
/// assert_eq!(a.state(), PromiseState::Ignored);
/// ```
pub struct Promise<T, E> {
    pub(crate) inner: Rc<RefCell<Inner<T, E>>>,
}

pub(crate) struct Inner<T, E> {
    pub(crate) state: State<T, E>,
    pub(crate) consumers: Vec<Continuation<T, E>>,
    pub(crate) cancel: Option<CancelAction>,
    cancel_fired: bool,
    pub(crate) delegate: Option<Promise<T, E>>,
    scheduler: Scheduler,
    label: Option<Rc<str>>,
}

impl<T, E> Inner<T, E> {
    pub(crate) fn accepts_settlement(&self) -> bool {
        self.state.is_pending() && self.delegate.is_none()
    }

    pub(crate) fn name(&self) -> &str {
        self.label.as_deref().unwrap_or("promise")
    }

    fn take_cancel(&mut self) -> Option<CancelAction> {
        if std::mem::replace(&mut self.cancel_fired, true) {
            return None;
        }
        self.cancel.take()
    }
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T, E> Promise<T, E> {
    pub(crate) fn pending(scheduler: Scheduler, label: Option<Rc<str>>) -> Self {
        Promise {
            inner: Rc::new(RefCell::new(Inner {
                state: State::Pending,
                consumers: Vec::new(),
                cancel: None,
                cancel_fired: false,
                delegate: None,
                scheduler,
                label,
            })),
        }
    }

    /// Current state. A promise that adopted another one reports the
    /// adopted promise's state until it is ignored itself.
    pub fn state(&self) -> PromiseState {
        let inner = self.inner.borrow();
        match (&inner.state, &inner.delegate) {
            (State::Pending, Some(delegate)) => delegate.state(),
            (state, _) => state.tag(),
        }
    }

    pub fn label(&self) -> Option<String> {
        self.inner.borrow().label.as_deref().map(str::to_owned)
    }

    /// Whether both handles refer to the same promise.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn scheduler(&self) -> Scheduler {
        self.inner.borrow().scheduler.clone()
    }

    /// The first registration wins; a later adoption may still rebind it.
    fn register_cancel<C: FnOnce() + 'static>(&self, action: C) {
        let mut inner = self.inner.borrow_mut();
        if inner.cancel.is_none() && !inner.cancel_fired && inner.state.is_pending() {
            inner.cancel = Some(Box::new(action));
        }
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    /// Creates a promise and runs `starter` synchronously.
    ///
    /// The starter receives the settlement capability and the means to
    /// register how the underlying operation is cancelled. Returning `Err`
    /// rejects the promise unless it was already settled.
    pub fn new<F>(scheduler: &Scheduler, starter: F) -> Self
    where
        F: FnOnce(Resolver<T, E>, CancelRegistrar<T, E>) -> Result<(), E>,
    {
        Self::start(scheduler.clone(), None, starter)
    }

    pub fn resolved(scheduler: &Scheduler, value: T) -> Self {
        Self::new(scheduler, |resolver, _| {
            resolver.resolve(value);
            Ok(())
        })
    }

    pub fn rejected(scheduler: &Scheduler, reason: E) -> Self {
        Self::new(scheduler, |resolver, _| {
            resolver.reject(reason);
            Ok(())
        })
    }

    fn start<F>(scheduler: Scheduler, label: Option<Rc<str>>, starter: F) -> Self
    where
        F: FnOnce(Resolver<T, E>, CancelRegistrar<T, E>) -> Result<(), E>,
    {
        let promise = Self::pending(scheduler, label);
        let resolver = Resolver::new(promise.clone());
        let registrar = CancelRegistrar {
            promise: promise.clone(),
        };
        if let Err(reason) = starter(resolver.clone(), registrar) {
            resolver.reject(reason);
        }
        promise
    }

    /// The settled value or reason, if any.
    pub fn outcome(&self) -> Option<Result<T, E>> {
        let inner = self.inner.borrow();
        match (&inner.state, &inner.delegate) {
            (State::Fulfilled(value), _) => Some(Ok(value.clone())),
            (State::Rejected(reason), _) => Some(Err(reason.clone())),
            (State::Pending, Some(delegate)) => delegate.outcome(),
            _ => None,
        }
    }

    /// Registers a consumer for both outcomes.
    ///
    /// Either callback may return a plain value, another promise or a
    /// thenable to adopt; returning `Err` rejects the returned promise.
    pub fn then<U, F, R>(&self, on_fulfilled: F, on_rejected: R) -> Promise<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Result<Resolution<U, E>, E> + 'static,
        R: FnOnce(E) -> Result<Resolution<U, E>, E> + 'static,
    {
        self.subscribe(move |outcome, downstream| {
            downstream.settle(match outcome {
                Ok(value) => on_fulfilled(value),
                Err(reason) => on_rejected(reason),
            })
        })
    }

    /// Like [`then`](Self::then), forwarding rejections unchanged.
    pub fn and_then<U, F>(&self, on_fulfilled: F) -> Promise<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Result<Resolution<U, E>, E> + 'static,
    {
        self.subscribe(move |outcome, downstream| match outcome {
            Ok(value) => downstream.settle(on_fulfilled(value)),
            Err(reason) => downstream.reject(reason),
        })
    }

    /// Like [`then`](Self::then), forwarding fulfilment unchanged.
    pub fn catch<R>(&self, on_rejected: R) -> Promise<T, E>
    where
        R: FnOnce(E) -> Result<Resolution<T, E>, E> + 'static,
    {
        self.subscribe(move |outcome, downstream| match outcome {
            Ok(value) => downstream.resolve(value),
            Err(reason) => downstream.settle(on_rejected(reason)),
        })
    }

    pub fn map<U, F>(&self, f: F) -> Promise<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> U + 'static,
    {
        self.and_then(move |value| Ok(Resolution::Value(f(value))))
    }

    /// Withdraws interest in this promise.
    ///
    /// Has no effect unless pending. Otherwise the promise becomes
    /// `Ignored`, its cancel action runs (at most once ever) and no consumer
    /// callback will run; the consumers' own promises are ignored in turn.
    pub fn ignore(&self) {
        if self.state() != PromiseState::Pending {
            return;
        }
        let (cancel, abandoned) = {
            let mut inner = self.inner.borrow_mut();
            if !inner.state.is_pending() {
                return;
            }
            inner.state = State::Ignored;
            log::trace!(
                "{} ignored, dropping {} consumer(s)",
                inner.name(),
                inner.consumers.len()
            );
            (inner.take_cancel(), std::mem::take(&mut inner.consumers))
        };
        if let Some(cancel) = cancel {
            cancel();
        }
        for record in abandoned {
            self.schedule_dispatch(record);
        }
    }

    fn subscribe<U, F>(&self, react: F) -> Promise<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(Result<T, E>, Resolver<U, E>) + 'static,
    {
        let downstream = Promise::pending(self.scheduler(), None);
        let id = ContinuationId::next();
        let resolver = Resolver::new(downstream.clone());
        let abandoned = downstream.clone();
        self.handle(Continuation::new(
            id,
            move |outcome| react(outcome, resolver),
            move || abandoned.ignore(),
        ));
        let producer = self.clone();
        downstream.register_cancel(move || producer.withdraw(id));
        downstream
    }

    pub(crate) fn handle(&self, record: Continuation<T, E>) {
        let mut inner = self.inner.borrow_mut();
        let delegate = inner.delegate.clone();
        if let Some(delegate) = delegate {
            drop(inner);
            delegate.handle(record);
        } else if inner.state.is_pending() {
            inner.consumers.push(record);
        } else {
            drop(inner);
            self.schedule_dispatch(record);
        }
    }

    fn schedule_dispatch(&self, record: Continuation<T, E>) {
        let promise = self.clone();
        self.scheduler()
            .schedule(Box::new(move || promise.dispatch(record)));
    }

    fn dispatch(&self, record: Continuation<T, E>) {
        let state = self.inner.borrow().state.clone();
        match state {
            State::Fulfilled(value) => record.react(Ok(value)),
            State::Rejected(reason) => record.react(Err(reason)),
            State::Ignored => record.cancel(),
            State::Pending => self.handle(record),
        }
    }

    /// Removes one consumer; ignores this promise if that was the last one.
    fn withdraw(&self, id: ContinuationId) {
        let mut inner = self.inner.borrow_mut();
        let delegate = inner.delegate.clone();
        if let Some(delegate) = delegate {
            drop(inner);
            return delegate.withdraw(id);
        }
        if !inner.state.is_pending() {
            return;
        }
        let Some(index) = inner.consumers.iter().position(|record| record.id() == id) else {
            return;
        };
        let record = inner.consumers.remove(index);
        let emptied = inner.consumers.is_empty();
        log::trace!(
            "{} lost consumer {:?}, {} left",
            inner.name(),
            id,
            inner.consumers.len()
        );
        drop(inner);
        record.cancel();
        if emptied {
            self.ignore();
        }
    }

    pub(crate) fn fulfill(&self, value: T) {
        self.settle_as(State::Fulfilled(value))
    }

    pub(crate) fn reject(&self, reason: E) {
        self.settle_as(State::Rejected(reason))
    }

    fn settle_as(&self, state: State<T, E>) {
        let (consumers, _released) = {
            let mut inner = self.inner.borrow_mut();
            if !inner.accepts_settlement() {
                return;
            }
            inner.state = state;
            log::trace!(
                "{} settled as {:?}, dispatching {} consumer(s)",
                inner.name(),
                inner.state.tag(),
                inner.consumers.len()
            );
            (std::mem::take(&mut inner.consumers), inner.cancel.take())
        };
        for record in consumers {
            self.schedule_dispatch(record);
        }
    }
}

impl<T, E> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("label", &self.label())
            .field("state", &self.state())
            .finish()
    }
}

/// Settles one promise, at most once across all clones.
///
/// Handed to starters, to thenables being followed, and to continuations.
/// Every settlement attempt after the first is dropped.
pub struct Resolver<T, E> {
    promise: Promise<T, E>,
    done: Rc<Cell<bool>>,
}

impl<T, E> Clone for Resolver<T, E> {
    fn clone(&self) -> Self {
        Self {
            promise: self.promise.clone(),
            done: self.done.clone(),
        }
    }
}

impl<T, E> Resolver<T, E>
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    pub(crate) fn new(promise: Promise<T, E>) -> Self {
        Resolver {
            promise,
            done: Rc::new(Cell::new(false)),
        }
    }

    fn claim(&self) -> bool {
        if self.done.replace(true) {
            log::debug!(
                "{}: dropping repeated settlement",
                self.promise.inner.borrow().name()
            );
            return false;
        }
        true
    }

    pub fn resolve(&self, value: T) {
        self.resolve_with(Resolution::Value(value))
    }

    pub fn resolve_with(&self, resolution: Resolution<T, E>) {
        if self.claim() {
            self.promise.resolve_with(resolution);
        }
    }

    pub fn reject(&self, reason: E) {
        if self.claim() {
            self.promise.reject(reason);
        }
    }

    /// Resolves on `Ok`, rejects on `Err`.
    pub fn settle(&self, result: Result<Resolution<T, E>, E>) {
        match result {
            Ok(resolution) => self.resolve_with(resolution),
            Err(reason) => self.reject(reason),
        }
    }

    /// Whether a settlement attempt was already made through this resolver.
    pub fn is_settled(&self) -> bool {
        self.done.get()
    }
}

impl<T, E> fmt::Debug for Resolver<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("promise", &self.promise)
            .field("done", &self.done.get())
            .finish()
    }
}

/// Lets a starter declare how its operation is cancelled.
pub struct CancelRegistrar<T, E> {
    promise: Promise<T, E>,
}

impl<T, E> Clone for CancelRegistrar<T, E> {
    fn clone(&self) -> Self {
        Self {
            promise: self.promise.clone(),
        }
    }
}

impl<T, E> CancelRegistrar<T, E> {
    /// Registers `action` to run when the promise is ignored while pending.
    /// Only the first registration is kept.
    pub fn register<C: FnOnce() + 'static>(&self, action: C) {
        self.promise.register_cancel(action)
    }
}

/// Construction options for a [`Promise`].
///
/// ```
/// use promise_ignore::{Builder, Error, Microtasks, Promise};
///
/// let tasks = Microtasks::new();
/// let p: Promise<u8, Error> = Builder::new()
///     .scheduler(&tasks.scheduler())
///     .label("handshake")
///     .start(|resolver, _| {
///         resolver.resolve(7);
///         Ok(())
///     })
///     .unwrap();
/// assert_eq!(p.label().as_deref(), Some("handshake"));
///
/// let missing: Result<Promise<u8, Error>, Error> = Builder::new().start(|_, _| Ok(()));
/// assert!(matches!(missing, Err(Error::InvalidArgument(_))));
/// ```
#[derive(Default)]
pub struct Builder {
    scheduler: Option<Scheduler>,
    label: Option<String>,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scheduler(mut self, scheduler: &Scheduler) -> Self {
        self.scheduler = Some(scheduler.clone());
        self
    }

    /// Names the promise in log records and `Debug` output.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn start<T, E, F>(self, starter: F) -> Result<Promise<T, E>, Error>
    where
        T: Clone + 'static,
        E: Clone + From<Error> + 'static,
        F: FnOnce(Resolver<T, E>, CancelRegistrar<T, E>) -> Result<(), E>,
    {
        let scheduler = self
            .scheduler
            .ok_or(Error::InvalidArgument("a promise needs a scheduler"))?;
        Ok(Promise::start(scheduler, self.label.map(Rc::from), starter))
    }
}

impl fmt::Debug for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("scheduler", &self.scheduler.is_some())
            .field("label", &self.label)
            .finish()
    }
}
