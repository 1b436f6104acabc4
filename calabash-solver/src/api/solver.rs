use crate::api::results::SatisfactionResult;
use crate::basic_types::PropagatorError;
use crate::engine::propagation::Propagator;
use crate::engine::variables::Literal;
use crate::engine::variables::ProgramLiteral;
use crate::engine::SatisfactionSolver;
use crate::engine::SolverOptions;

/// The public entry point of the solver, standing in for the grounding front
/// end: it hands out program atoms, accepts base-program clauses and
/// registered [`Propagator`]s, and runs solving steps.
///
/// A program is built from [`Solver::new_atom`] and [`Solver::add_clause`];
/// calling [`Solver::solve`] then runs one solving step which enumerates the
/// models of the program under the registered propagators. Steps are
/// incremental: static state persists from one step to the next, while
/// tagged clauses and thread-scoped literals die with their step.
#[derive(Debug)]
pub struct Solver {
    satisfaction_solver: SatisfactionSolver,
}

impl Default for Solver {
    fn default() -> Self {
        Solver::with_options(SolverOptions::default())
    }
}

impl Solver {
    pub fn with_options(options: SolverOptions) -> Solver {
        Solver {
            satisfaction_solver: SatisfactionSolver::new(options),
        }
    }

    /// Allocate a fresh program atom, returned as its positive literal.
    pub fn new_atom(&mut self) -> ProgramLiteral {
        self.satisfaction_solver.new_program_atom()
    }

    /// Add a clause over program literals to the base program. The clause
    /// persists across solving steps.
    ///
    /// Returns `false` iff the clause makes the program unsatisfiable at the
    /// root, in which case every following [`Solver::solve`] reports
    /// [`SatisfactionResult::Unsatisfiable`].
    pub fn add_clause(&mut self, literals: impl IntoIterator<Item = ProgramLiteral>) -> bool {
        let literals: Vec<ProgramLiteral> = literals.into_iter().collect();
        self.satisfaction_solver.add_base_clause(&literals)
    }

    /// Register a propagator. Its [`Propagator::initialise`] hook runs at the
    /// start of every subsequent solving step; during search its hooks are
    /// invoked from every search thread (see [`Propagator`] for the threading
    /// contract).
    pub fn add_propagator(&mut self, propagator: impl Propagator + 'static) {
        let _ = self
            .satisfaction_solver
            .add_propagator(Box::new(propagator));
    }

    /// The solver literal that is true in every model; useful as an anchor
    /// when a propagator needs a literal that is never free.
    pub fn true_literal(&self) -> Literal {
        self.satisfaction_solver.true_literal()
    }

    /// Run one solving step, enumerating the models of the current program.
    ///
    /// An `Err` is only produced when a propagator hook fails; both
    /// satisfiability outcomes are values, not errors.
    pub fn solve(&mut self) -> Result<SatisfactionResult, PropagatorError> {
        self.satisfaction_solver.solve()
    }

    /// Log the statistics of the most recent solving step through [`log`].
    pub fn log_statistics(&self) {
        self.satisfaction_solver.log_statistics();
    }
}
