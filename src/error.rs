use thiserror::Error;

/// Failures raised by the promise core itself.
///
/// `InvalidArgument` is returned straight to the caller at construction time.
/// `ResolutionCycle` never escapes that way: it is converted into the
/// promise's own reason type and delivered as a rejection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("a promise cannot be resolved with itself")]
    ResolutionCycle,
}
