use std::num::NonZero;
use std::sync::atomic::Ordering;

use fnv::FnvHashSet;
use log::debug;

use crate::api::results::SatisfactionResult;
use crate::basic_types::PropagatorError;
use crate::containers::KeyedVec;
use crate::engine::atom_registry::AtomRegistry;
use crate::engine::propagation::Propagator;
use crate::engine::propagation::PropagatorId;
use crate::engine::propagation::PropagatorInitialisationContext;
use crate::engine::propagation::PropagatorModes;
use crate::engine::propagation::PropagatorStore;
use crate::engine::solver_thread::propagate_fixpoint;
use crate::engine::solver_thread::run_search;
use crate::engine::solver_thread::SharedSearchState;
use crate::engine::solver_thread::ThreadState;
use crate::engine::variables::Literal;
use crate::engine::variables::ProgramLiteral;
use crate::engine::Assignment;
use crate::engine::ClauseAttributes;
use crate::engine::ClauseDatabase;
use crate::engine::SolverStatistics;
use crate::engine::WeightConstraint;

/// Options determining how a [`Solver`] behaves.
///
/// [`Solver`]: crate::Solver
#[derive(Clone, Copy, Debug)]
pub struct SolverOptions {
    /// The number of independent search threads run per solving step.
    pub number_of_threads: NonZero<u32>,
    /// Seed for the randomised parts of the search heuristics.
    pub random_seed: u64,
    /// Randomise the polarity of decisions in every thread. Threads beyond
    /// the first always randomise their polarity to diversify the portfolio.
    pub random_polarity: bool,
}

impl Default for SolverOptions {
    fn default() -> Self {
        SolverOptions {
            number_of_threads: NonZero::new(1).expect("one is non-zero"),
            random_seed: 42,
            random_polarity: false,
        }
    }
}

/// The engine behind the public [`Solver`]: owns the static (step-spanning)
/// state and drives the per-step lifecycle of the propagator protocol —
/// initialisation, the search threads, and the step-end cleanup.
///
/// [`Solver`]: crate::Solver
#[derive(Debug)]
pub(crate) struct SatisfactionSolver {
    options: SolverOptions,
    root_assignment: Assignment,
    clause_database: ClauseDatabase,
    weight_constraints: Vec<WeightConstraint>,
    atom_registry: AtomRegistry,
    propagators: PropagatorStore,
    modes: KeyedVec<PropagatorId, PropagatorModes>,
    /// Per propagator, the statically registered watches of every thread.
    watch_registry: KeyedVec<PropagatorId, Vec<FnvHashSet<Literal>>>,
    base_inconsistent: bool,
    statistics: SolverStatistics,
    true_literal: Literal,
}

impl SatisfactionSolver {
    pub(crate) fn new(options: SolverOptions) -> SatisfactionSolver {
        let mut root_assignment = Assignment::default();
        let mut clause_database = ClauseDatabase::default();
        let mut atom_registry = AtomRegistry::default();

        // the constant-true atom, fixed at the root for the solver's lifetime
        let atom = atom_registry.new_atom(&mut root_assignment, &mut clause_database);
        atom_registry.freeze(atom);
        let true_literal = Literal::positive(atom);
        root_assignment.assign(true_literal);

        SatisfactionSolver {
            options,
            root_assignment,
            clause_database,
            weight_constraints: Vec::new(),
            atom_registry,
            propagators: PropagatorStore::default(),
            modes: KeyedVec::default(),
            watch_registry: KeyedVec::default(),
            base_inconsistent: false,
            statistics: SolverStatistics::default(),
            true_literal,
        }
    }

    pub(crate) fn new_program_atom(&mut self) -> ProgramLiteral {
        self.atom_registry
            .new_program_atom(&mut self.root_assignment, &mut self.clause_database)
    }

    /// Add a base-program clause over program literals. Returns `false` iff
    /// the clause makes the program unsatisfiable at the root.
    pub(crate) fn add_base_clause(&mut self, literals: &[ProgramLiteral]) -> bool {
        let solver_literals: Vec<Literal> = literals
            .iter()
            .map(|&literal| self.atom_registry.solver_literal(literal))
            .collect();

        match self.clause_database.add_clause(
            &solver_literals,
            ClauseAttributes::new().locked(),
            &mut self.root_assignment,
        ) {
            Ok(()) => true,
            Err(_) => {
                self.base_inconsistent = true;
                false
            }
        }
    }

    pub(crate) fn add_propagator(&mut self, propagator: Box<dyn Propagator>) -> PropagatorId {
        let id = self.propagators.push(propagator);
        let _ = self.modes.push(PropagatorModes::default());
        let _ = self.watch_registry.push(Vec::new());
        id
    }

    pub(crate) fn true_literal(&self) -> Literal {
        self.true_literal
    }

    pub(crate) fn log_statistics(&self) {
        self.statistics.log();
    }

    /// Run one solving step: initialise every propagator, enumerate the
    /// models of the current program across the configured search threads,
    /// and clean up step-scoped state.
    pub(crate) fn solve(&mut self) -> Result<SatisfactionResult, PropagatorError> {
        self.statistics = SolverStatistics::default();
        let num_threads = self.options.number_of_threads.get();

        debug!(
            "starting solve step: {} propagators, {num_threads} threads",
            self.propagators.len()
        );

        if self.base_inconsistent {
            debug!("the base program is unsatisfiable at the root");
            return Ok(SatisfactionResult::Unsatisfiable);
        }

        // hook configuration and watches are step scoped
        for id in self.propagators.ids() {
            self.modes[id] = PropagatorModes::default();
            self.watch_registry[id] = vec![FnvHashSet::default(); num_threads as usize];
        }

        // fix the root before initialisation, so that literals forced by the
        // base program are visible to the propagators
        let mut inconsistent = propagate_fixpoint(
            &mut self.clause_database,
            &self.weight_constraints,
            &mut self.root_assignment,
            &mut self.statistics,
        )
        .is_err();

        if !inconsistent {
            let Self {
                propagators,
                root_assignment,
                clause_database,
                weight_constraints,
                atom_registry,
                modes,
                watch_registry,
                statistics,
                ..
            } = self;

            for id in propagators.ids() {
                let mut context = PropagatorInitialisationContext {
                    assignment: &mut *root_assignment,
                    clause_database: &mut *clause_database,
                    weight_constraints: &mut *weight_constraints,
                    registry: &mut *atom_registry,
                    watches: &mut watch_registry[id],
                    modes: &mut modes[id],
                    inconsistent: &mut inconsistent,
                    statistics: &mut *statistics,
                    propagator_id: id,
                };
                propagators[id].initialise(&mut context)?;
                if inconsistent {
                    break;
                }
            }
        }

        self.atom_registry
            .eliminate_unconstrained(&mut self.root_assignment);

        if !inconsistent {
            inconsistent = propagate_fixpoint(
                &mut self.clause_database,
                &self.weight_constraints,
                &mut self.root_assignment,
                &mut self.statistics,
            )
            .is_err();
        }

        if inconsistent {
            // everything registered so far is static, so unsatisfiability is
            // permanent as well
            self.base_inconsistent = true;
            self.statistics.log();
            return Ok(SatisfactionResult::Unsatisfiable);
        }

        let thread_states: Vec<ThreadState> = (0..num_threads)
            .map(|thread_id| self.new_thread_state(thread_id))
            .collect();

        let shared = SharedSearchState::default();
        let outcomes = {
            let propagators = &self.propagators;
            let shared = &shared;

            std::thread::scope(|scope| {
                let handles: Vec<_> = thread_states
                    .into_iter()
                    .map(|mut state| {
                        scope.spawn(move || {
                            let result = run_search(&mut state, propagators, shared);
                            if result.is_err() {
                                shared.abort.store(true, Ordering::Relaxed);
                            }
                            (state.statistics, result)
                        })
                    })
                    .collect();

                let mut outcomes = Vec::new();
                let mut panic_payload = None;
                for handle in handles {
                    match handle.join() {
                        Ok(outcome) => outcomes.push(outcome),
                        Err(payload) => panic_payload = Some(payload),
                    }
                }
                if let Some(payload) = panic_payload {
                    std::panic::resume_unwind(payload);
                }
                outcomes
            })
        };

        for (statistics, _) in &outcomes {
            self.statistics.merge(statistics);
        }
        for (_, result) in outcomes {
            result?;
        }

        // dynamic clauses that are not tagged outlive the step
        let promoted = shared
            .promoted
            .into_inner()
            .expect("promotion lock poisoned");
        for literals in promoted {
            let addition = self.clause_database.add_clause(
                &literals,
                ClauseAttributes::new().locked(),
                &mut self.root_assignment,
            );
            if addition.is_err() {
                self.base_inconsistent = true;
            }
        }

        let sink = shared.sink.into_inner().expect("model sink lock poisoned");
        self.statistics.log();

        if sink.models.is_empty() {
            Ok(SatisfactionResult::Unsatisfiable)
        } else {
            Ok(SatisfactionResult::Satisfiable(sink.models))
        }
    }

    fn new_thread_state(&self, thread_id: u32) -> ThreadState {
        let mut watch_sets = KeyedVec::default();
        let mut modes = KeyedVec::default();
        for id in self.propagators.ids() {
            let _ = watch_sets.push(self.watch_registry[id][thread_id as usize].clone());
            let _ = modes.push(self.modes[id]);
        }

        ThreadState::new(
            thread_id,
            self.root_assignment.clone(),
            self.clause_database.clone(),
            self.weight_constraints.clone(),
            watch_sets,
            modes,
            self.atom_registry.program_atoms().to_vec(),
            self.options.random_seed,
            self.options.random_polarity || thread_id > 0,
        )
    }
}
