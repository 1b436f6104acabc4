use itertools::Itertools;
use log::trace;

use crate::containers::KeyedVec;
use crate::engine::variables::Literal;
use crate::engine::variables::TruthValue;
use crate::engine::Assignment;

/// The lifetime and deletion policy of a clause added through a
/// [`PropagationContext`].
///
/// A *tagged* clause is scoped to the current solving step and is discarded
/// when the step ends. A *locked* clause is exempt from the solver's clause
/// deletion policy.
///
/// [`PropagationContext`]: crate::PropagationContext
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClauseAttributes {
    tag: bool,
    lock: bool,
}

impl ClauseAttributes {
    pub fn new() -> ClauseAttributes {
        ClauseAttributes::default()
    }

    /// Restrict the clause to the current solving step.
    pub fn tagged(self) -> ClauseAttributes {
        ClauseAttributes { tag: true, ..self }
    }

    /// Exempt the clause from the clause deletion policy.
    pub fn locked(self) -> ClauseAttributes {
        ClauseAttributes { lock: true, ..self }
    }

    pub fn is_tagged(self) -> bool {
        self.tag
    }

    pub fn is_locked(self) -> bool {
        self.lock
    }
}

/// The clause (or constraint) found to be falsified by the current
/// assignment, recorded so the search loop can recover by backtracking.
#[derive(Clone, Debug)]
pub(crate) struct Conflict {
    pub(crate) literals: Vec<Literal>,
}

#[derive(Clone, Debug)]
struct Clause {
    /// The first two literals are the watched pair.
    literals: Vec<Literal>,
    attributes: ClauseAttributes,
}

/// Clause storage with two-watched-literal unit propagation.
///
/// Propagation processes the assignment trail from a stored pointer, so
/// repeated calls only look at literals assigned since the previous call.
#[derive(Clone, Debug, Default)]
pub(crate) struct ClauseDatabase {
    clauses: Vec<Clause>,
    /// Clauses of length one added during search; they cannot carry watches
    /// and are re-asserted at the start of every propagation run.
    unit_clauses: Vec<(Literal, ClauseAttributes)>,
    watches: KeyedVec<Literal, Vec<usize>>,
    propagation_pointer: usize,
}

impl ClauseDatabase {
    /// Make room in the watch lists for the given number of atoms.
    pub(crate) fn grow_to(&mut self, num_atoms: u32) {
        self.watches.resize(num_atoms as usize * 2, Vec::new());
    }

    pub(crate) fn num_clauses(&self) -> usize {
        self.clauses.len()
    }

    pub(crate) fn num_unit_clauses(&self) -> usize {
        self.unit_clauses.len()
    }

    /// Add a clause and apply its immediate consequence under the current
    /// assignment: a unit clause assigns its only unassigned literal, a
    /// falsified clause reports a conflict.
    ///
    /// The clause is simplified against the fixed (level 0) assignment before
    /// it is stored; tautologies and clauses that are fixed true are dropped.
    pub(crate) fn add_clause(
        &mut self,
        literals: &[Literal],
        attributes: ClauseAttributes,
        assignment: &mut Assignment,
    ) -> Result<(), Conflict> {
        let mut clause: Vec<Literal> = literals.iter().copied().unique().collect();

        if clause.iter().any(|&lit| clause.contains(&!lit)) {
            return Ok(());
        }
        if clause
            .iter()
            .any(|&lit| assignment.is_true(lit) && assignment.is_fixed(lit))
        {
            return Ok(());
        }
        clause.retain(|&lit| !(assignment.is_false(lit) && assignment.is_fixed(lit)));

        if clause.is_empty() {
            return Err(Conflict {
                literals: literals.to_vec(),
            });
        }

        if clause.len() == 1 {
            let unit = clause[0];
            // recorded so it can be re-asserted after backtracking (see
            // `propagate`) and found again at the end of the step
            self.unit_clauses.push((unit, attributes));
            return match assignment.truth_value(unit) {
                TruthValue::True => Ok(()),
                TruthValue::Free => {
                    assignment.assign(unit);
                    Ok(())
                }
                TruthValue::False => Err(Conflict { literals: clause }),
            };
        }

        select_watches(&mut clause, assignment);
        let index = self.clauses.len();
        let (first_watch, second_watch) = (clause[0], clause[1]);
        self.clauses.push(Clause {
            literals: clause,
            attributes,
        });
        self.watches[first_watch].push(index);
        self.watches[second_watch].push(index);

        if assignment.is_false(second_watch) {
            if assignment.is_false(first_watch) {
                return Err(Conflict {
                    literals: self.clauses[index].literals.clone(),
                });
            }
            if assignment.is_free(first_watch) {
                assignment.assign(first_watch);
            }
        }

        Ok(())
    }

    /// Run unit propagation over every literal assigned since the previous
    /// call. Newly implied literals are assigned at the current decision
    /// level.
    pub(crate) fn propagate(&mut self, assignment: &mut Assignment) -> Result<(), Conflict> {
        for &(literal, _) in &self.unit_clauses {
            match assignment.truth_value(literal) {
                TruthValue::True => {}
                TruthValue::Free => assignment.assign(literal),
                TruthValue::False => {
                    return Err(Conflict {
                        literals: vec![literal],
                    })
                }
            }
        }

        while self.propagation_pointer < assignment.size() {
            let literal = assignment.trail().at(self.propagation_pointer);
            self.propagation_pointer += 1;

            let false_literal = !literal;
            let mut entry = 0;
            while entry < self.watches[false_literal].len() {
                let clause_index = self.watches[false_literal][entry];

                // keep the other watch at position 0
                if self.clauses[clause_index].literals[0] == false_literal {
                    self.clauses[clause_index].literals.swap(0, 1);
                }
                let other_watch = self.clauses[clause_index].literals[0];
                if assignment.is_true(other_watch) {
                    entry += 1;
                    continue;
                }

                let replacement = (2..self.clauses[clause_index].literals.len())
                    .find(|&position| {
                        !assignment.is_false(self.clauses[clause_index].literals[position])
                    });
                if let Some(position) = replacement {
                    self.clauses[clause_index].literals.swap(1, position);
                    let new_watch = self.clauses[clause_index].literals[1];
                    self.watches[new_watch].push(clause_index);
                    let _ = self.watches[false_literal].swap_remove(entry);
                    continue;
                }

                if assignment.is_free(other_watch) {
                    trace!("clause {clause_index} propagates {other_watch}");
                    assignment.assign(other_watch);
                    entry += 1;
                } else {
                    return Err(Conflict {
                        literals: self.clauses[clause_index].literals.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Re-align the propagation pointer with the trail after backtracking.
    pub(crate) fn synchronise(&mut self, assignment: &Assignment) {
        self.propagation_pointer = assignment.size();
    }

    /// Look for a clause that is falsified by the (total) assignment. Clauses
    /// added mid-search can carry stale watches after backtracking, so a
    /// candidate model is vetted against the full database before it is
    /// reported.
    pub(crate) fn find_falsified_clause(&self, assignment: &Assignment) -> Option<Conflict> {
        for (literal, _) in &self.unit_clauses {
            if assignment.is_false(*literal) {
                return Some(Conflict {
                    literals: vec![*literal],
                });
            }
        }

        self.clauses
            .iter()
            .find(|clause| clause.literals.iter().all(|&lit| assignment.is_false(lit)))
            .map(|clause| Conflict {
                literals: clause.literals.clone(),
            })
    }

    /// The clauses stored at index `start` onwards, in insertion order.
    pub(crate) fn clauses_from(
        &self,
        start: usize,
    ) -> impl Iterator<Item = (&[Literal], ClauseAttributes)> + '_ {
        self.clauses[start..]
            .iter()
            .map(|clause| (clause.literals.as_slice(), clause.attributes))
    }

    /// The stored unit clauses at index `start` onwards.
    pub(crate) fn unit_clauses_from(
        &self,
        start: usize,
    ) -> impl Iterator<Item = (Literal, ClauseAttributes)> + '_ {
        self.unit_clauses[start..].iter().copied()
    }
}

/// Move the two most suitable watch candidates to the front of the clause:
/// unassigned and satisfied literals are preferred over falsified ones, and
/// falsified literals assigned at higher levels over deeper ones.
fn select_watches(clause: &mut [Literal], assignment: &Assignment) {
    let rank = |literal: Literal| match assignment.truth_value(literal) {
        TruthValue::Free | TruthValue::True => usize::MAX,
        TruthValue::False => assignment.level(literal),
    };

    for target in 0..2 {
        let best = (target..clause.len())
            .max_by_key(|&position| rank(clause[position]))
            .expect("clauses stored with watches have at least two literals");
        clause.swap(target, best);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(num_atoms: u32) -> (ClauseDatabase, Assignment, Vec<Literal>) {
        let mut assignment = Assignment::default();
        let literals: Vec<Literal> = (0..num_atoms)
            .map(|_| Literal::positive(assignment.grow()))
            .collect();
        let mut database = ClauseDatabase::default();
        database.grow_to(num_atoms);
        (database, assignment, literals)
    }

    #[test]
    fn a_unit_consequence_is_assigned_during_propagation() {
        let (mut database, mut assignment, lits) = setup(3);
        database
            .add_clause(&[lits[0], lits[1], lits[2]], ClauseAttributes::new(), &mut assignment)
            .expect("consistent");

        assignment.increase_decision_level();
        assignment.assign(!lits[0]);
        assignment.increase_decision_level();
        assignment.assign(!lits[1]);

        database.propagate(&mut assignment).expect("consistent");
        assert!(assignment.is_true(lits[2]));
        assert_eq!(assignment.level(lits[2]), 2);
    }

    #[test]
    fn a_falsified_clause_is_reported_as_a_conflict() {
        let (mut database, mut assignment, lits) = setup(2);
        database
            .add_clause(&[lits[0], lits[1]], ClauseAttributes::new(), &mut assignment)
            .expect("consistent");

        assignment.increase_decision_level();
        assignment.assign(!lits[0]);
        assignment.assign(!lits[1]);

        assert!(database.propagate(&mut assignment).is_err());
    }

    #[test]
    fn propagation_resumes_correctly_after_backtracking() {
        let (mut database, mut assignment, lits) = setup(3);
        database
            .add_clause(&[lits[0], lits[1]], ClauseAttributes::new(), &mut assignment)
            .expect("consistent");

        assignment.increase_decision_level();
        assignment.assign(!lits[0]);
        database.propagate(&mut assignment).expect("consistent");
        assert!(assignment.is_true(lits[1]));

        let _ = assignment.backtrack_to(0);
        database.synchronise(&assignment);

        assignment.increase_decision_level();
        assignment.assign(!lits[1]);
        database.propagate(&mut assignment).expect("consistent");
        assert!(assignment.is_true(lits[0]));
    }

    #[test]
    fn adding_a_clause_that_is_unit_under_the_assignment_assigns_immediately() {
        let (mut database, mut assignment, lits) = setup(2);
        assignment.increase_decision_level();
        assignment.assign(!lits[0]);

        database
            .add_clause(&[lits[0], lits[1]], ClauseAttributes::new(), &mut assignment)
            .expect("consistent");

        assert!(assignment.is_true(lits[1]));
    }

    #[test]
    fn tautologies_are_not_stored() {
        let (mut database, mut assignment, lits) = setup(2);
        database
            .add_clause(&[lits[0], !lits[0], lits[1]], ClauseAttributes::new(), &mut assignment)
            .expect("consistent");

        assert_eq!(database.num_clauses(), 0);
    }

    #[test]
    fn root_falsified_literals_are_simplified_away() {
        let (mut database, mut assignment, lits) = setup(3);
        assignment.assign(!lits[0]);

        database
            .add_clause(&[lits[0], lits[1]], ClauseAttributes::new(), &mut assignment)
            .expect("consistent");

        // the clause collapsed to the unit [lits[1]] at the root
        assert!(assignment.is_true(lits[1]));
        assert!(assignment.is_fixed(lits[1]));
        assert_eq!(database.num_clauses(), 0);
    }

    #[test]
    fn an_empty_clause_after_simplification_is_a_root_conflict() {
        let (mut database, mut assignment, lits) = setup(1);
        assignment.assign(!lits[0]);

        assert!(database
            .add_clause(&[lits[0]], ClauseAttributes::new(), &mut assignment)
            .is_err());
    }

    #[test]
    fn dynamic_unit_clauses_are_reasserted_after_backtracking() {
        let (mut database, mut assignment, lits) = setup(2);
        assignment.increase_decision_level();
        assignment.assign(lits[0]);

        database
            .add_clause(&[lits[1]], ClauseAttributes::new(), &mut assignment)
            .expect("consistent");
        assert!(assignment.is_true(lits[1]));

        let _ = assignment.backtrack_to(0);
        database.synchronise(&assignment);
        assert!(assignment.is_free(lits[1]));

        database.propagate(&mut assignment).expect("consistent");
        assert!(assignment.is_true(lits[1]));
    }

    #[test]
    fn falsified_clauses_are_found_when_vetting_a_total_assignment() {
        let (mut database, mut assignment, lits) = setup(2);
        database
            .add_clause(&[lits[0], lits[1]], ClauseAttributes::new(), &mut assignment)
            .expect("consistent");

        assignment.increase_decision_level();
        assignment.assign(!lits[0]);
        assignment.assign(!lits[1]);

        assert!(database.find_falsified_clause(&assignment).is_some());

        let _ = assignment.backtrack_to(0);
        assert!(database.find_falsified_clause(&assignment).is_none());
    }
}
