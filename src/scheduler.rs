//! Deferred task execution.
//!
//! The promise core never runs a continuation on the call stack that caused
//! it. Every dispatch goes through a [`Schedule`] implementation, which must
//! run each task later, exactly once and in FIFO order.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce()>;

/// Shared handle to a scheduler, as stored by every promise.
pub type Scheduler = Rc<dyn Schedule>;

pub trait Schedule {
    /// Queues the task to run later.
    ///
    /// This takes a boxed `Task` rather than a generic `FnOnce` so that
    /// `Schedule` is object safe.
    fn schedule(&self, task: Task);
}

/// A FIFO microtask queue drained explicitly by its owner.
///
/// ```
/// use promise_ignore::{Microtasks, Promise, Error};
///
/// let tasks = Microtasks::new();
/// let scheduler = tasks.scheduler();
/// let p = Promise::<i32, Error>::resolved(&scheduler, 1).map(|v| v + 1);
/// assert!(p.outcome().is_none());
/// tasks.run_until_idle();
/// assert_eq!(p.outcome(), Some(Ok(2)));
/// ```
#[derive(Clone, Default)]
pub struct Microtasks {
    queue: Rc<Queue>,
}

#[derive(Default)]
struct Queue {
    tasks: RefCell<VecDeque<Task>>,
    draining: Cell<bool>,
}

impl Microtasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a scheduler handle feeding this queue.
    pub fn scheduler(&self) -> Scheduler {
        Rc::new(self.clone())
    }

    pub fn len(&self) -> usize {
        self.queue.tasks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.tasks.borrow().is_empty()
    }

    /// Runs the oldest queued task, if any.
    pub fn run_one(&self) -> bool {
        let task = self.queue.tasks.borrow_mut().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Runs tasks until the queue is empty, including those queued by the
    /// tasks themselves. Returns the number of tasks run.
    ///
    /// Called from inside a running task this returns 0 without running
    /// anything; the outer drain picks the work up.
    pub fn run_until_idle(&self) -> usize {
        if self.queue.draining.replace(true) {
            return 0;
        }
        let _draining = DrainGuard(&self.queue.draining);
        let mut ran = 0;
        while self.run_one() {
            ran += 1;
        }
        log::trace!("microtask queue idle after {} task(s)", ran);
        ran
    }
}

/// Clears the draining flag even when a task unwinds.
struct DrainGuard<'a>(&'a Cell<bool>);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl Schedule for Microtasks {
    fn schedule(&self, task: Task) {
        self.queue.tasks.borrow_mut().push_back(task);
    }
}

impl fmt::Debug for Microtasks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Microtasks")
            .field("queued", &self.len())
            .field("draining", &self.queue.draining.get())
            .finish()
    }
}
