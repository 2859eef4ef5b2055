use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies a registered continuation so it can be withdrawn later.
///
/// Ids are unique across all promises, since an adopted promise receives
/// records from the promise that adopted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ContinuationId(u64);

impl ContinuationId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        ContinuationId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// One consumer's interest in a producer's outcome.
///
/// `react` runs the consumer's callback (or forwards the outcome unchanged)
/// and settles the downstream promise. `on_cancel` ignores that downstream
/// promise instead.
pub(crate) struct Continuation<T, E> {
    id: ContinuationId,
    react: Box<dyn FnOnce(Result<T, E>)>,
    on_cancel: Box<dyn FnOnce()>,
}

impl<T, E> Continuation<T, E> {
    pub(crate) fn new<R, C>(id: ContinuationId, react: R, on_cancel: C) -> Self
    where
        R: FnOnce(Result<T, E>) + 'static,
        C: FnOnce() + 'static,
    {
        Continuation {
            id,
            react: Box::new(react),
            on_cancel: Box::new(on_cancel),
        }
    }

    pub(crate) fn id(&self) -> ContinuationId {
        self.id
    }

    pub(crate) fn react(self, outcome: Result<T, E>) {
        (self.react)(outcome)
    }

    pub(crate) fn cancel(self) {
        (self.on_cancel)()
    }
}

impl<T, E> fmt::Debug for Continuation<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Continuation").field("id", &self.id).finish()
    }
}
