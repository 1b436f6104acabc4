//! # Calabash
//! Calabash is a CDCL-based answer-set propagation core. Its centrepiece is
//! the *propagator extension protocol*: the mechanism by which external code
//! observes a running search, inspects a solver thread's partial truth
//! assignment, and injects new constraints while the solver is mid-search
//! across multiple threads.
//!
//! The crate provides both sides of that contract: the solver side (a small,
//! honest search engine offering the extension point) and everything a
//! [`Propagator`] implementation needs (the [`Assignment`] and trail views,
//! the [`PropagatorInitialisationContext`] for one-shot static setup and the
//! [`PropagationContext`] for per-thread runtime control).
//!
//! # Building and solving a program
//! Atoms and clauses are added through the [`Solver`], which stands in for
//! the grounding front end:
//! ```rust
//! use calabash_solver::SatisfactionResult;
//! use calabash_solver::Solver;
//!
//! let mut solver = Solver::default();
//! let a = solver.new_atom();
//! let b = solver.new_atom();
//!
//! // a and b are equivalent
//! assert!(solver.add_clause([a, !b]));
//! assert!(solver.add_clause([!a, b]));
//!
//! match solver.solve().expect("no propagators are registered") {
//!     SatisfactionResult::Satisfiable(models) => assert_eq!(models.len(), 2),
//!     SatisfactionResult::Unsatisfiable => unreachable!("the program has models"),
//! }
//! ```
//!
//! # Writing a propagator
//! A propagator maps its program literals to solver literals during
//! [`Propagator::initialise`] — the only point where the two literal spaces
//! can be bridged — registers watches, and then reacts to watched literals
//! becoming true by injecting clauses:
//! ```rust
//! use std::sync::Mutex;
//!
//! use calabash_solver::ClauseAttributes;
//! use calabash_solver::Inconsistency;
//! use calabash_solver::Literal;
//! use calabash_solver::PropagationContext;
//! use calabash_solver::PropagationStatus;
//! use calabash_solver::Propagator;
//! use calabash_solver::PropagatorError;
//! use calabash_solver::PropagatorInitialisationContext;
//! use calabash_solver::ProgramLiteral;
//! use calabash_solver::SatisfactionResult;
//! use calabash_solver::Solver;
//!
//! /// Allows at most one of the tracked atoms to be true.
//! struct AtMostOne {
//!     atoms: Vec<ProgramLiteral>,
//!     watched: Mutex<Vec<Literal>>,
//! }
//!
//! impl Propagator for AtMostOne {
//!     fn name(&self) -> &str {
//!         "at-most-one"
//!     }
//!
//!     fn initialise(
//!         &mut self,
//!         context: &mut PropagatorInitialisationContext<'_>,
//!     ) -> Result<(), PropagatorError> {
//!         let mut watched = self.watched.lock().unwrap();
//!         watched.clear();
//!         for &atom in &self.atoms {
//!             let literal = context.solver_literal(atom);
//!             context.add_watch(literal);
//!             watched.push(literal);
//!         }
//!         Ok(())
//!     }
//!
//!     fn propagate(
//!         &self,
//!         context: &mut PropagationContext<'_>,
//!         changes: &[Literal],
//!     ) -> PropagationStatus {
//!         let watched = self.watched.lock().unwrap();
//!         for &changed in changes {
//!             for &other in watched.iter().filter(|&&other| other != changed) {
//!                 if context.assignment().is_true(other)
//!                     && !context.add_clause(&[!changed, !other], ClauseAttributes::new())
//!                 {
//!                     return Err(Inconsistency::Conflict);
//!                 }
//!             }
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let mut solver = Solver::default();
//! let x = solver.new_atom();
//! let y = solver.new_atom();
//! solver.add_propagator(AtMostOne {
//!     atoms: vec![x, y],
//!     watched: Mutex::new(Vec::new()),
//! });
//!
//! match solver.solve().expect("the propagator does not fail") {
//!     SatisfactionResult::Satisfiable(models) => {
//!         // {}, {x} and {y}: the propagator rejected {x, y}
//!         assert_eq!(models.len(), 3);
//!         assert!(models.iter().all(|model| !(model.value(x) && model.value(y))));
//!     }
//!     SatisfactionResult::Unsatisfiable => unreachable!("the program has models"),
//! }
//! ```
//!
//! # Threading
//! A solving step runs [`SolverOptions::number_of_threads`] independent
//! search threads over the same propagator instances. `initialise` runs
//! strictly before any thread starts; the search hooks of *different* threads
//! may run concurrently, while the hooks of one thread are strictly
//! sequential. See [`Propagator`] for the full contract.

mod api;
mod basic_types;
pub mod calabash_asserts;
mod containers;
mod engine;

pub use api::results::SatisfactionResult;
pub use api::Solver;
pub use basic_types::Inconsistency;
pub use basic_types::PropagationStatus;
pub use basic_types::PropagatorError;
pub use basic_types::Solution;
pub use engine::propagation::PropagationContext;
pub use engine::propagation::Propagator;
pub use engine::propagation::PropagatorCheckMode;
pub use engine::propagation::PropagatorId;
pub use engine::propagation::PropagatorInitialisationContext;
pub use engine::propagation::PropagatorUndoMode;
pub use engine::variables::Atom;
pub use engine::variables::Literal;
pub use engine::variables::ProgramLiteral;
pub use engine::variables::TruthValue;
pub use engine::Assignment;
pub use engine::AssignmentTrail;
pub use engine::ClauseAttributes;
pub use engine::SolverOptions;
pub use engine::WeightConstraintType;
pub use engine::WeightedLiteral;
