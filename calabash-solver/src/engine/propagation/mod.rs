//! The propagator extension protocol: the [`Propagator`] capability trait and
//! the two context objects through which an implementation talks back to the
//! solver.
//!
//! A propagator lives through two phases. Before any search thread exists it
//! is handed a [`PropagatorInitialisationContext`] exactly once per solving
//! step; everything registered there (clauses, weight constraints, watches,
//! frozen literals) is *static* and applies to every thread of the step. Once
//! search has started, each hook invocation carries a thread-scoped
//! [`PropagationContext`] whose additions are *dynamic*: they belong to the
//! calling thread and, when tagged, to the current step only.

mod initialisation_context;
mod propagation_context;
mod propagator;
mod store;

pub use initialisation_context::PropagatorInitialisationContext;
pub use propagation_context::PropagationContext;
pub use propagator::Propagator;
pub use propagator::PropagatorCheckMode;
pub use propagator::PropagatorUndoMode;
pub(crate) use propagator::PropagatorModes;
pub use store::PropagatorId;
pub(crate) use store::PropagatorStore;
