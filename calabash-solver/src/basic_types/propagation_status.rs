use thiserror::Error;

/// The result of a [`Propagator`] search hook. `Ok(())` means the hook ran to
/// completion; an [`Inconsistency`] either stops the current branch or aborts
/// the whole solving step.
///
/// [`Propagator`]: crate::Propagator
pub type PropagationStatus = Result<(), Inconsistency>;

/// The reason a [`Propagator`] hook did not run to completion.
///
/// [`Propagator`]: crate::Propagator
#[derive(Debug)]
pub enum Inconsistency {
    /// The current branch is conflicting. The solver recovers by backtracking;
    /// this is a normal outcome of search, not an error.
    Conflict,
    /// The propagator failed for a reason unrelated to the search state. The
    /// solving step is aborted and no further hooks are called on any thread.
    Error(PropagatorError),
}

impl From<PropagatorError> for Inconsistency {
    fn from(error: PropagatorError) -> Self {
        Inconsistency::Error(error)
    }
}

/// An error surfaced by a [`Propagator`] implementation. Raising one aborts
/// the enclosing solving step.
///
/// [`Propagator`]: crate::Propagator
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("propagator failed: {reason}")]
pub struct PropagatorError {
    reason: String,
}

impl PropagatorError {
    pub fn new(reason: impl Into<String>) -> PropagatorError {
        PropagatorError {
            reason: reason.into(),
        }
    }
}

impl From<&str> for PropagatorError {
    fn from(reason: &str) -> Self {
        PropagatorError::new(reason)
    }
}
