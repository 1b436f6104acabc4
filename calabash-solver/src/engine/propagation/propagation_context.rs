use crate::calabash_assert_simple;
use crate::engine::propagation::PropagatorId;
use crate::engine::solver_thread::ThreadState;
use crate::engine::variables::Literal;
use crate::engine::Assignment;
use crate::engine::ClauseAttributes;

/// The per-thread runtime control object passed to the search hooks of a
/// [`Propagator`].
///
/// Additions made here are *dynamic*: they are scoped to the calling thread,
/// and tagged clauses additionally to the current solving step. The context
/// borrows the thread's live search state for the duration of one hook
/// invocation; [`Propagator::undo`] receives it behind a shared reference, so
/// the mutating operations are unreachable from there.
///
/// [`Propagator`]: crate::Propagator
/// [`Propagator::undo`]: crate::Propagator::undo
#[derive(Debug)]
pub struct PropagationContext<'a> {
    pub(crate) state: &'a mut ThreadState,
    pub(crate) propagator_id: PropagatorId,
}

impl<'a> PropagationContext<'a> {
    pub(crate) fn new(state: &'a mut ThreadState, propagator_id: PropagatorId) -> Self {
        PropagationContext {
            state,
            propagator_id,
        }
    }

    /// The index of the search thread this context belongs to, in
    /// `[0, number_of_threads)`.
    pub fn thread_id(&self) -> u32 {
        self.state.thread_id
    }

    /// The live partial assignment of this thread.
    pub fn assignment(&self) -> &Assignment {
        &self.state.assignment
    }

    /// Add a clause over the current thread. See [`ClauseAttributes`] for the
    /// clause lifetime; a clause containing thread-scoped literals from
    /// [`PropagationContext::add_literal`] must be tagged.
    ///
    /// Returns `false` if the clause conflicts with the current assignment,
    /// in which case the running hook must return control to the solver
    /// without issuing further solver-affecting calls.
    pub fn add_clause(&mut self, literals: &[Literal], attributes: ClauseAttributes) -> bool {
        calabash_assert_simple!(
            self.state.conflict.is_none(),
            "no clauses may be added once a conflict has been reported"
        );
        calabash_assert_simple!(
            attributes.is_tagged()
                || literals
                    .iter()
                    .all(|literal| !self.state.is_thread_local(*literal)),
            "clauses over thread-scoped literals must be tagged"
        );
        for literal in literals {
            calabash_assert_simple!(
                self.state.assignment.has_literal(*literal),
                "clause literal {literal} is unknown or eliminated"
            );
        }

        match self.state.add_dynamic_clause(literals, attributes) {
            Ok(()) => true,
            Err(conflict) => {
                self.state.conflict = Some(conflict);
                false
            }
        }
    }

    /// Add the negation of every given literal as a clause; equivalent to
    /// forbidding the conjunction. Same contract as
    /// [`PropagationContext::add_clause`].
    pub fn add_nogood(&mut self, literals: &[Literal], attributes: ClauseAttributes) -> bool {
        let negated: Vec<Literal> = literals.iter().map(|&literal| !literal).collect();
        self.add_clause(&negated, attributes)
    }

    /// Allocate a fresh thread-scoped literal. The literal is volatile: it is
    /// discarded together with the rest of the thread's state when the
    /// solving step ends.
    pub fn add_literal(&mut self) -> Literal {
        self.state.new_volatile_literal()
    }

    /// Watch `literal` in the current thread only. A no-op if the watch
    /// already exists.
    pub fn add_watch(&mut self, literal: Literal) {
        calabash_assert_simple!(
            self.state.assignment.has_literal(literal),
            "watched literal {literal} is unknown or eliminated"
        );

        let _ = self.state.watch_sets[self.propagator_id].insert(literal);
    }

    /// Whether `literal` is watched in the current thread, through either the
    /// static registration of initialisation or a thread-local
    /// [`PropagationContext::add_watch`].
    pub fn has_watch(&self, literal: Literal) -> bool {
        self.state.watch_sets[self.propagator_id].contains(&literal)
    }

    /// Stop watching `literal` in the current thread; idempotent, and without
    /// effect on the watches of other threads.
    pub fn remove_watch(&mut self, literal: Literal) {
        let _ = self.state.watch_sets[self.propagator_id].remove(&literal);
        // an event that was queued but not yet reported must not fire anymore
        self.state.pending[self.propagator_id].retain(|&pending| pending != literal);
    }

    /// Propagate the consequences of the clauses added through this context
    /// since the last propagation. Returns `false` if the current branch has
    /// become conflicting, in which case the running hook must return
    /// promptly.
    pub fn propagate(&mut self) -> bool {
        calabash_assert_simple!(
            self.state.conflict.is_none(),
            "propagation may not continue once a conflict has been reported"
        );

        match self.state.propagate_core() {
            Ok(()) => true,
            Err(conflict) => {
                self.state.conflict = Some(conflict);
                false
            }
        }
    }
}
