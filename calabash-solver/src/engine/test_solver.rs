#![cfg(test)]
//! Helpers for driving the propagator protocol directly in unit tests,
//! without going through a full solving step: the pre-search state can be set
//! up by hand, initialisation contexts handed out, and thread states derived
//! the same way a real step derives them.

use fnv::FnvHashSet;

use crate::containers::KeyedVec;
use crate::engine::atom_registry::AtomRegistry;
use crate::engine::propagation::Propagator;
use crate::engine::propagation::PropagatorId;
use crate::engine::propagation::PropagatorInitialisationContext;
use crate::engine::propagation::PropagatorModes;
use crate::engine::solver_thread::ThreadState;
use crate::engine::variables::Literal;
use crate::engine::variables::ProgramLiteral;
use crate::engine::Assignment;
use crate::engine::ClauseDatabase;
use crate::engine::SolverStatistics;
use crate::engine::WeightConstraint;

#[derive(Debug)]
pub(crate) struct TestSolver {
    pub(crate) assignment: Assignment,
    pub(crate) clause_database: ClauseDatabase,
    pub(crate) weight_constraints: Vec<WeightConstraint>,
    pub(crate) registry: AtomRegistry,
    pub(crate) watches: Vec<FnvHashSet<Literal>>,
    pub(crate) modes: PropagatorModes,
    pub(crate) inconsistent: bool,
    pub(crate) statistics: SolverStatistics,
}

impl Default for TestSolver {
    fn default() -> Self {
        TestSolver::with_threads(1)
    }
}

impl TestSolver {
    pub(crate) fn with_threads(num_threads: usize) -> TestSolver {
        TestSolver {
            assignment: Assignment::default(),
            clause_database: ClauseDatabase::default(),
            weight_constraints: Vec::new(),
            registry: AtomRegistry::default(),
            watches: vec![FnvHashSet::default(); num_threads],
            modes: PropagatorModes::default(),
            inconsistent: false,
            statistics: SolverStatistics::default(),
        }
    }

    pub(crate) fn new_literal(&mut self) -> Literal {
        Literal::positive(
            self.registry
                .new_atom(&mut self.assignment, &mut self.clause_database),
        )
    }

    pub(crate) fn new_program_literal(&mut self) -> ProgramLiteral {
        self.registry
            .new_program_atom(&mut self.assignment, &mut self.clause_database)
    }

    pub(crate) fn initialisation_context(&mut self) -> PropagatorInitialisationContext<'_> {
        PropagatorInitialisationContext {
            assignment: &mut self.assignment,
            clause_database: &mut self.clause_database,
            weight_constraints: &mut self.weight_constraints,
            registry: &mut self.registry,
            watches: &mut self.watches,
            modes: &mut self.modes,
            inconsistent: &mut self.inconsistent,
            statistics: &mut self.statistics,
            propagator_id: PropagatorId(0),
        }
    }

    /// Run the initialisation phase for a single propagator, including the
    /// elimination pass that closes it.
    pub(crate) fn initialise(&mut self, propagator: &mut dyn Propagator) {
        let mut context = self.initialisation_context();
        propagator
            .initialise(&mut context)
            .expect("initialisation failed");
        self.registry.eliminate_unconstrained(&mut self.assignment);
    }

    /// Derive a thread state the way a solving step would for the given
    /// thread, with this test solver's single propagator slot 0.
    pub(crate) fn thread_state(&self, thread_id: u32) -> ThreadState {
        let mut watch_sets = KeyedVec::default();
        let _ = watch_sets.push(self.watches[thread_id as usize].clone());
        let mut modes = KeyedVec::default();
        let _ = modes.push(self.modes);

        ThreadState::new(
            thread_id,
            self.assignment.clone(),
            self.clause_database.clone(),
            self.weight_constraints.clone(),
            watch_sets,
            modes,
            self.registry.program_atoms().to_vec(),
            42,
            false,
        )
    }
}
