use crate::basic_types::PropagationStatus;
use crate::basic_types::PropagatorError;
use crate::engine::propagation::PropagationContext;
use crate::engine::propagation::PropagatorInitialisationContext;
use crate::engine::variables::Literal;
use crate::engine::Assignment;

/// The pluggable extension point of the solver: a set of callbacks invoked at
/// well-defined points of the search state machine.
///
/// Every search hook has a default no-op body, and leaving a hook out is
/// behaviourally identical to overriding it with a no-op. Only
/// [`Propagator::name`] is required.
///
/// # Lifecycle
///
/// [`Propagator::initialise`] runs exactly once per solving step, single
/// threaded, before any search thread exists. During search the solver calls
/// [`Propagator::propagate`], [`Propagator::undo`], [`Propagator::check`] and
/// [`Propagator::decide`] on the *same* propagator instance from every search
/// thread, which is why the search hooks take `&self` and the trait requires
/// [`Send`] and [`Sync`]: for different threads the calls may be concurrent
/// (calls for one thread are strictly sequential), and any state shared
/// between threads must be protected by the propagator itself.
///
/// Context objects and assignments are borrowed for the duration of a single
/// hook invocation and cannot be retained; literals and solver-literal
/// mappings are plain values and may be kept indefinitely.
pub trait Propagator: Send + Sync {
    /// The name of the propagator, used for logging and error reporting.
    fn name(&self) -> &str;

    /// Called once per solving step before search starts. This is the only
    /// opportunity to map program literals to solver literals, add static
    /// clauses and weight constraints, register watches, and size any
    /// per-thread state by [`PropagatorInitialisationContext::number_of_threads`].
    ///
    /// Returning an error aborts the solving step before any thread starts.
    fn initialise(
        &mut self,
        _context: &mut PropagatorInitialisationContext<'_>,
    ) -> Result<(), PropagatorError> {
        Ok(())
    }

    /// Called with the non-empty list of watched literals of this thread that
    /// became true since the previous `propagate` or `undo` call. The hook
    /// must return promptly and must not block.
    ///
    /// Returning [`Inconsistency::Conflict`] (or having had a clause addition
    /// report a conflict) stops the current propagation branch; the solver
    /// recovers through its regular backtracking.
    ///
    /// [`Inconsistency::Conflict`]: crate::Inconsistency::Conflict
    fn propagate(
        &self,
        _context: &mut PropagationContext<'_>,
        _changes: &[Literal],
    ) -> PropagationStatus {
        Ok(())
    }

    /// Mirror of [`Propagator::propagate`], called when the solver backtracks
    /// past the assignments that were previously reported to this thread.
    /// Purely bookkeeping: the context is borrowed immutably, so no solver
    /// state can be changed from here.
    ///
    /// Under [`PropagatorUndoMode::Default`] the hook only fires with a
    /// non-empty change list; under [`PropagatorUndoMode::Always`] it also
    /// fires (with an empty list) when [`Propagator::check`] has run since the
    /// last undo.
    fn undo(&self, _context: &PropagationContext<'_>, _changes: &[Literal]) {}

    /// Called without a change set at propagation fixpoints, total
    /// assignments, or both, as configured through
    /// [`PropagatorInitialisationContext::set_check_mode`]. Intended for
    /// propagators whose invariant cannot be checked incrementally.
    ///
    /// Total-assignment checks are serialised against model emission across
    /// threads; results from a model already accepted in another thread may
    /// be visible, and no stronger isolation may be assumed.
    fn check(&self, _context: &mut PropagationContext<'_>) -> PropagationStatus {
        Ok(())
    }

    /// Called when propagation has reached a fixpoint and the solver is about
    /// to branch. Returning `None` defers to the next registered propagator
    /// and ultimately to `fallback`, the choice of the solver's own
    /// heuristic. A returned literal must be free and known to the solver.
    fn decide(
        &self,
        _thread_id: u32,
        _assignment: &Assignment,
        _fallback: Literal,
    ) -> Option<Literal> {
        None
    }
}

/// When [`Propagator::check`] is invoked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PropagatorCheckMode {
    /// Never call `check`.
    #[default]
    None,
    /// Call `check` when a thread's assignment is a total model candidate.
    Total,
    /// Call `check` at every propagation fixpoint.
    Fixpoint,
    /// Call `check` at both fixpoints and total assignments.
    Both,
}

impl PropagatorCheckMode {
    pub(crate) fn fires_at_total(self) -> bool {
        matches!(self, PropagatorCheckMode::Total | PropagatorCheckMode::Both)
    }

    pub(crate) fn fires_at_fixpoint(self) -> bool {
        matches!(
            self,
            PropagatorCheckMode::Fixpoint | PropagatorCheckMode::Both
        )
    }
}

/// When [`Propagator::undo`] is invoked on backtracking.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PropagatorUndoMode {
    /// Only fire for non-empty change lists.
    #[default]
    Default,
    /// Additionally fire with an empty change list when `check` has run since
    /// the last undo.
    Always,
}

/// The per-propagator hook configuration of the current solving step.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct PropagatorModes {
    pub(crate) check_mode: PropagatorCheckMode,
    pub(crate) undo_mode: PropagatorUndoMode,
}
