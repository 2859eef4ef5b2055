//! Aggregates built on `then` and `ignore`.
//!
//! Each input is observed through a branch promise derived from it. Once the
//! aggregate is decided the remaining branches are ignored, which withdraws
//! them from their inputs: an input nobody else consumes is ignored in turn,
//! one with other consumers keeps running.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::promise::Promise;
use crate::resolution::Resolution;
use crate::scheduler::Scheduler;
use crate::Error;

type Branches<E> = Rc<RefCell<Vec<Promise<(), E>>>>;

fn ignore_all<E>(branches: &Branches<E>)
where
    E: Clone + From<Error> + 'static,
{
    let taken = std::mem::take(&mut *branches.borrow_mut());
    for branch in taken {
        branch.ignore();
    }
}

/// Fulfils with every input's value, in input order, or rejects with the
/// first rejection.
///
/// ```
/// use promise_ignore::{all, Error, Microtasks, Promise};
///
/// let tasks = Microtasks::new();
/// let s = tasks.scheduler();
/// let both = all(&s, vec![Promise::<_, Error>::resolved(&s, 1), Promise::resolved(&s, 2)]);
/// tasks.run_until_idle();
/// assert_eq!(both.outcome(), Some(Ok(vec![1, 2])));
/// ```
pub fn all<T, E, I>(scheduler: &Scheduler, promises: I) -> Promise<Vec<T>, E>
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
    I: IntoIterator<Item = Promise<T, E>>,
{
    let promises: Vec<_> = promises.into_iter().collect();
    Promise::new(scheduler, move |resolver, on_cancel| {
        if promises.is_empty() {
            resolver.resolve(Vec::new());
            return Ok(());
        }
        let slots = Rc::new(RefCell::new(vec![None; promises.len()]));
        let remaining = Rc::new(Cell::new(promises.len()));
        let branches: Branches<E> = Rc::default();
        for (index, promise) in promises.iter().enumerate() {
            let (fulfilled, rejected) = (resolver.clone(), resolver.clone());
            let (slots, remaining) = (slots.clone(), remaining.clone());
            let (done, failed) = (branches.clone(), branches.clone());
            let branch = promise.then(
                move |value| {
                    slots.borrow_mut()[index] = Some(value);
                    remaining.set(remaining.get() - 1);
                    if remaining.get() == 0 {
                        let values = slots.borrow_mut().drain(..).flatten().collect();
                        done.borrow_mut().clear();
                        fulfilled.resolve(values);
                    }
                    Ok(Resolution::Value(()))
                },
                move |reason| {
                    rejected.reject(reason);
                    ignore_all(&failed);
                    Ok(Resolution::Value(()))
                },
            );
            branches.borrow_mut().push(branch);
        }
        on_cancel.register(move || ignore_all(&branches));
        Ok(())
    })
}

/// Settles like the first input to settle and ignores the others.
/// An empty input never settles.
pub fn race<T, E, I>(scheduler: &Scheduler, promises: I) -> Promise<T, E>
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
    I: IntoIterator<Item = Promise<T, E>>,
{
    let promises: Vec<_> = promises.into_iter().collect();
    Promise::new(scheduler, move |resolver, on_cancel| {
        let branches: Branches<E> = Rc::default();
        for promise in &promises {
            let (fulfilled, rejected) = (resolver.clone(), resolver.clone());
            let (won, lost) = (branches.clone(), branches.clone());
            let branch = promise.then(
                move |value| {
                    fulfilled.resolve(value);
                    ignore_all(&won);
                    Ok(Resolution::Value(()))
                },
                move |reason| {
                    rejected.reject(reason);
                    ignore_all(&lost);
                    Ok(Resolution::Value(()))
                },
            );
            branches.borrow_mut().push(branch);
        }
        on_cancel.register(move || ignore_all(&branches));
        Ok(())
    })
}
