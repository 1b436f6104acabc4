use fnv::FnvHashSet;
use log::debug;

use crate::calabash_assert_simple;
use crate::engine::atom_registry::AtomRegistry;
use crate::engine::propagation::PropagatorCheckMode;
use crate::engine::propagation::PropagatorId;
use crate::engine::propagation::PropagatorModes;
use crate::engine::propagation::PropagatorUndoMode;
use crate::engine::solver_thread::propagate_fixpoint;
use crate::engine::variables::Literal;
use crate::engine::variables::ProgramLiteral;
use crate::engine::Assignment;
use crate::engine::ClauseAttributes;
use crate::engine::ClauseDatabase;
use crate::engine::SolverStatistics;
use crate::engine::WeightConstraint;
use crate::engine::WeightConstraintType;
use crate::engine::WeightedLiteral;

/// The one-shot configuration object handed to [`Propagator::initialise`]
/// once per solving step, before any search thread exists.
///
/// Everything registered here is *static*: it persists for the entire step
/// and applies to all threads. The context borrows the solver's pre-search
/// state for the duration of the `initialise` call, so it cannot be retained
/// and no operation can be issued once search has started.
///
/// Several operations report unsatisfiability by returning `false`. That is a
/// normal outcome, not an error, but after observing `false` the propagator
/// must not issue further mutating operations on this context.
///
/// [`Propagator::initialise`]: crate::Propagator::initialise
#[derive(Debug)]
pub struct PropagatorInitialisationContext<'a> {
    pub(crate) assignment: &'a mut Assignment,
    pub(crate) clause_database: &'a mut ClauseDatabase,
    pub(crate) weight_constraints: &'a mut Vec<WeightConstraint>,
    pub(crate) registry: &'a mut AtomRegistry,
    /// The watch set of this propagator, one per search thread.
    pub(crate) watches: &'a mut [FnvHashSet<Literal>],
    pub(crate) modes: &'a mut PropagatorModes,
    pub(crate) inconsistent: &'a mut bool,
    pub(crate) statistics: &'a mut SolverStatistics,
    pub(crate) propagator_id: PropagatorId,
}

impl PropagatorInitialisationContext<'_> {
    /// Add a clause that holds unconditionally for the rest of the step, in
    /// every thread.
    ///
    /// Returns `false` iff the addition makes the program unsatisfiable at
    /// the root.
    pub fn add_clause(&mut self, literals: &[Literal]) -> bool {
        self.assert_consistent("add_clause");
        for literal in literals {
            calabash_assert_simple!(
                self.assignment.has_literal(*literal),
                "clause literal {literal} is unknown or eliminated"
            );
            self.registry.mark_occurrence(literal.atom());
        }

        match self
            .clause_database
            .add_clause(literals, ClauseAttributes::new().locked(), self.assignment)
        {
            Ok(()) => true,
            Err(conflict) => {
                debug!(
                    "propagator {} added a root-falsified clause {:?}",
                    self.propagator_id, conflict.literals
                );
                *self.inconsistent = true;
                false
            }
        }
    }

    /// Allocate a fresh static solver literal. An unfrozen literal that ends
    /// initialisation without occurring in any constraint is eliminated by
    /// preprocessing and must not be referenced afterwards.
    pub fn add_literal(&mut self, freeze: bool) -> Literal {
        self.assert_consistent("add_literal");
        let atom =
            self.registry
                .new_introduced_atom(self.assignment, self.clause_database, freeze);
        Literal::positive(atom)
    }

    /// Add the weight constraint `literal <-> sum of weighted literals
    /// {>=|=} bound`, where `constraint_type` restricts the encoded direction
    /// and `compare_equal` selects equality instead of the default
    /// greater-or-equal comparison.
    ///
    /// Returns `false` iff the addition makes the program unsatisfiable at
    /// the root.
    pub fn add_weight_constraint(
        &mut self,
        literal: Literal,
        weighted_literals: &[WeightedLiteral],
        bound: i64,
        constraint_type: WeightConstraintType,
        compare_equal: bool,
    ) -> bool {
        self.assert_consistent("add_weight_constraint");
        calabash_assert_simple!(
            self.assignment.has_literal(literal),
            "weight constraint literal {literal} is unknown or eliminated"
        );
        self.registry.mark_occurrence(literal.atom());
        for item in weighted_literals {
            calabash_assert_simple!(
                self.assignment.has_literal(item.literal),
                "weighted literal {} is unknown or eliminated",
                item.literal
            );
            self.registry.mark_occurrence(item.literal.atom());
        }

        let constraint = WeightConstraint::new(
            literal,
            weighted_literals,
            bound,
            constraint_type,
            compare_equal,
        );
        self.weight_constraints.push(constraint);

        // surface a root conflict eagerly, like `add_clause` does
        self.propagate()
    }

    /// Register interest in `literal` becoming true; the event is reported to
    /// [`Propagator::propagate`] in every search thread. Watching a literal
    /// freezes it. Watching an already-watched literal is a no-op.
    ///
    /// [`Propagator::propagate`]: crate::Propagator::propagate
    pub fn add_watch(&mut self, literal: Literal) {
        for thread in 0..self.watches.len() {
            self.add_watch_for_thread(literal, thread as u32);
        }
    }

    /// Like [`PropagatorInitialisationContext::add_watch`], restricted to one
    /// search thread.
    pub fn add_watch_for_thread(&mut self, literal: Literal, thread_id: u32) {
        calabash_assert_simple!(
            (thread_id as usize) < self.watches.len(),
            "thread {thread_id} does not exist in this step"
        );
        calabash_assert_simple!(
            self.assignment.has_literal(literal),
            "watched literal {literal} is unknown or eliminated"
        );

        self.registry.freeze(literal.atom());
        let _ = self.watches[thread_id as usize].insert(literal);
    }

    /// Remove an all-thread watch registration; idempotent.
    pub fn remove_watch(&mut self, literal: Literal) {
        for thread in 0..self.watches.len() {
            self.remove_watch_for_thread(literal, thread as u32);
        }
    }

    /// Remove one thread's watch registration; idempotent, and without effect
    /// on the registrations of other threads.
    pub fn remove_watch_for_thread(&mut self, literal: Literal, thread_id: u32) {
        calabash_assert_simple!(
            (thread_id as usize) < self.watches.len(),
            "thread {thread_id} does not exist in this step"
        );

        let _ = self.watches[thread_id as usize].remove(&literal);
    }

    /// Prevent preprocessing from eliminating the literal. Required for any
    /// literal a propagator references after initialisation without it
    /// occurring in a constraint.
    pub fn freeze_literal(&mut self, literal: Literal) {
        calabash_assert_simple!(
            self.assignment.has_literal(literal),
            "frozen literal {literal} is unknown or eliminated"
        );

        self.registry.freeze(literal.atom());
    }

    /// Eagerly run unit propagation over everything added so far. Returns
    /// `false` iff the program is unsatisfiable at the root.
    pub fn propagate(&mut self) -> bool {
        self.assert_consistent("propagate");

        match propagate_fixpoint(
            self.clause_database,
            self.weight_constraints,
            self.assignment,
            self.statistics,
        ) {
            Ok(()) => true,
            Err(_) => {
                *self.inconsistent = true;
                false
            }
        }
    }

    /// Map a program literal to its solver literal. This is the only bridge
    /// between the two literal spaces, and it is only reachable during
    /// initialisation: mappings needed later must be cached now.
    pub fn solver_literal(&self, program_literal: ProgramLiteral) -> Literal {
        self.registry.solver_literal(program_literal)
    }

    /// The root assignment as it stands before search; literals fixed here
    /// stay fixed for the whole step.
    pub fn assignment(&self) -> &Assignment {
        self.assignment
    }

    pub fn check_mode(&self) -> PropagatorCheckMode {
        self.modes.check_mode
    }

    /// Configure when [`Propagator::check`] fires for this propagator.
    ///
    /// [`Propagator::check`]: crate::Propagator::check
    pub fn set_check_mode(&mut self, mode: PropagatorCheckMode) {
        self.modes.check_mode = mode;
    }

    pub fn undo_mode(&self) -> PropagatorUndoMode {
        self.modes.undo_mode
    }

    /// Configure when [`Propagator::undo`] fires for this propagator.
    ///
    /// [`Propagator::undo`]: crate::Propagator::undo
    pub fn set_undo_mode(&mut self, mode: PropagatorUndoMode) {
        self.modes.undo_mode = mode;
    }

    /// The number of search threads that will run this step. A propagator
    /// with per-thread state must size its storage accordingly now.
    pub fn number_of_threads(&self) -> u32 {
        self.watches.len() as u32
    }

    fn assert_consistent(&self, operation: &str) {
        calabash_assert_simple!(
            !*self.inconsistent,
            "`{operation}` called after initialisation already reported unsatisfiability"
        );
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::test_solver::TestSolver;
    use crate::engine::variables::TruthValue;
    use crate::engine::WeightConstraintType;

    #[test]
    fn adding_a_root_falsified_clause_reports_unsatisfiability() {
        let mut solver = TestSolver::default();
        let literal = solver.new_literal();

        {
            let mut context = solver.initialisation_context();
            assert!(context.add_clause(&[literal]));
            assert!(!context.add_clause(&[!literal]));
        }

        assert!(solver.inconsistent);
    }

    #[test]
    #[should_panic(expected = "already reported unsatisfiability")]
    fn operations_after_unsatisfiability_are_rejected() {
        let mut solver = TestSolver::default();
        let literal = solver.new_literal();

        let mut context = solver.initialisation_context();
        assert!(context.add_clause(&[literal]));
        assert!(!context.add_clause(&[!literal]));

        let _ = context.add_clause(&[literal]);
    }

    #[test]
    fn clauses_added_during_initialisation_fix_literals_at_the_root() {
        let mut solver = TestSolver::default();
        let a = solver.new_literal();
        let b = solver.new_literal();

        let mut context = solver.initialisation_context();
        assert!(context.add_clause(&[a]));
        assert!(context.add_clause(&[!a, b]));

        assert!(context.assignment().is_fixed(a));
        assert!(context.assignment().is_fixed(b));
        assert!(context.propagate());
    }

    #[test]
    fn watches_are_registered_for_every_thread_and_removed_per_thread() {
        let mut solver = TestSolver::with_threads(2);
        let literal = solver.new_literal();

        {
            let mut context = solver.initialisation_context();
            context.add_watch(literal);
            context.add_watch(literal);
            context.remove_watch_for_thread(literal, 1);
            context.remove_watch_for_thread(literal, 1);
        }

        assert!(solver.watches[0].contains(&literal));
        assert!(!solver.watches[1].contains(&literal));
    }

    #[test]
    fn removing_an_all_thread_watch_clears_every_thread() {
        let mut solver = TestSolver::with_threads(2);
        let literal = solver.new_literal();

        {
            let mut context = solver.initialisation_context();
            context.add_watch_for_thread(literal, 0);
            context.add_watch_for_thread(!literal, 1);
            context.remove_watch(literal);
        }

        assert!(!solver.watches[0].contains(&literal));
        assert!(solver.watches[1].contains(&!literal));
    }

    #[test]
    fn unfrozen_introduced_literals_are_eliminated_unless_constrained() {
        let mut solver = TestSolver::default();

        let (unused, frozen, constrained, companion) = {
            let mut context = solver.initialisation_context();
            let unused = context.add_literal(false);
            let frozen = context.add_literal(false);
            context.freeze_literal(frozen);
            let constrained = context.add_literal(false);
            let companion = context.add_literal(true);
            assert!(context.add_clause(&[constrained, companion]));
            (unused, frozen, constrained, companion)
        };
        solver
            .registry
            .eliminate_unconstrained(&mut solver.assignment);

        assert!(!solver.assignment.has_literal(unused));
        assert!(solver.assignment.has_literal(frozen));
        assert!(solver.assignment.has_literal(constrained));
        assert!(solver.assignment.has_literal(companion));
    }

    #[test]
    fn watching_a_literal_freezes_it() {
        let mut solver = TestSolver::default();

        let watched = {
            let mut context = solver.initialisation_context();
            let watched = context.add_literal(false);
            context.add_watch(watched);
            watched
        };
        solver
            .registry
            .eliminate_unconstrained(&mut solver.assignment);

        assert!(solver.assignment.has_literal(watched));
    }

    #[test]
    fn solver_literals_mirror_the_polarity_of_program_literals() {
        let mut solver = TestSolver::default();
        let program_literal = solver.new_program_literal();

        let context = solver.initialisation_context();
        let solver_literal = context.solver_literal(program_literal);

        assert_eq!(context.solver_literal(!program_literal), !solver_literal);
        assert_eq!(
            context.assignment().truth_value(solver_literal),
            TruthValue::Free
        );
    }

    #[test]
    fn check_and_undo_modes_are_stored_per_step() {
        use crate::engine::propagation::PropagatorCheckMode;
        use crate::engine::propagation::PropagatorUndoMode;

        let mut solver = TestSolver::default();
        let mut context = solver.initialisation_context();

        assert_eq!(context.check_mode(), PropagatorCheckMode::None);
        assert_eq!(context.undo_mode(), PropagatorUndoMode::Default);

        context.set_check_mode(PropagatorCheckMode::Both);
        context.set_undo_mode(PropagatorUndoMode::Always);

        assert_eq!(context.check_mode(), PropagatorCheckMode::Both);
        assert_eq!(context.undo_mode(), PropagatorUndoMode::Always);
    }

    #[test]
    fn number_of_threads_matches_the_step_configuration() {
        let mut solver = TestSolver::with_threads(3);
        let context = solver.initialisation_context();

        assert_eq!(context.number_of_threads(), 3);
    }

    #[test]
    fn an_unsatisfiable_weight_constraint_reports_false() {
        let mut solver = TestSolver::default();
        let literal = solver.new_literal();

        let mut context = solver.initialisation_context();
        assert!(context.add_clause(&[literal]));
        // literal <-> (empty sum) >= 1 can never hold while literal is fixed
        assert!(!context.add_weight_constraint(
            literal,
            &[],
            1,
            WeightConstraintType::Equivalence,
            false,
        ));
        assert!(*context.inconsistent);
    }
}
