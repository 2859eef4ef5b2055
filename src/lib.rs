//! A single-threaded promise with cooperative cancellation.
//!
//! A [`Promise`] settles exactly once, chains with [`Promise::then`] and its
//! passthrough variants, and adopts promises or foreign [`Thenable`]s it is
//! resolved with. Continuations always run later, through a [`Schedule`]
//! implementation such as [`Microtasks`].
//!
//! [`Promise::ignore`] declares that nobody needs a pending promise any more.
//! The promise stops dispatching, runs its registered cancel action and
//! withdraws itself from the promise it was derived from. That upstream
//! promise is ignored in turn only once all of its consumers are gone.
//!
//! ```
//! use promise_ignore::{Error, Microtasks, Promise, PromiseState};
//!
//! let tasks = Microtasks::new();
//! let s = tasks.scheduler();
//! let source = Promise::<i32, Error>::resolved(&s, 1);
//! let kept = source.map(|v| v + 1);
//! let dropped = source.map(|v| v * 100);
//! dropped.ignore();
//! tasks.run_until_idle();
//! assert_eq!(kept.outcome(), Some(Ok(2)));
//! assert_eq!(dropped.state(), PromiseState::Ignored);
//! ```

pub mod combinator;
mod continuation;
mod error;
mod promise;
mod resolution;
pub mod scheduler;

pub use combinator::{all, race};
pub use error::Error;
pub use promise::{Builder, CancelAction, CancelRegistrar, Promise, PromiseState, Resolver};
pub use resolution::{Resolution, Thenable};
pub use scheduler::{Microtasks, Schedule, Scheduler, Task};
