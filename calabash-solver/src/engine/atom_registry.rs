use log::debug;

use crate::calabash_assert_simple;
use crate::containers::KeyedVec;
use crate::engine::variables::Atom;
use crate::engine::variables::Literal;
use crate::engine::variables::ProgramLiteral;
use crate::engine::Assignment;
use crate::engine::ClauseDatabase;

/// The bookkeeping behind literal allocation: the mapping from program atoms
/// to solver atoms, freeze marks, and the preprocessing decision of which
/// initialisation-introduced literals to eliminate.
#[derive(Debug, Default)]
pub(crate) struct AtomRegistry {
    flags: KeyedVec<Atom, AtomFlags>,
    /// Maps program atom `i + 1` to its solver atom.
    program_map: Vec<Atom>,
    /// Atoms introduced unfrozen by `add_literal(false)` in the current step.
    unfrozen_candidates: Vec<Atom>,
}

#[derive(Clone, Copy, Debug, Default)]
struct AtomFlags {
    frozen: bool,
    occurs: bool,
}

impl AtomRegistry {
    /// Allocate a fresh solver atom, growing the assignment and the watch
    /// lists of the clause database alongside.
    pub(crate) fn new_atom(
        &mut self,
        assignment: &mut Assignment,
        clause_database: &mut ClauseDatabase,
    ) -> Atom {
        let atom = assignment.grow();
        let _ = self.flags.push(AtomFlags::default());
        clause_database.grow_to(assignment.num_atoms());
        atom
    }

    /// Allocate a program atom together with its backing solver atom. Program
    /// atoms are always frozen; the grounding front end may reference them at
    /// any point.
    pub(crate) fn new_program_atom(
        &mut self,
        assignment: &mut Assignment,
        clause_database: &mut ClauseDatabase,
    ) -> ProgramLiteral {
        let atom = self.new_atom(assignment, clause_database);
        self.flags[atom].frozen = true;
        self.program_map.push(atom);

        ProgramLiteral::positive(self.program_map.len() as u32)
    }

    /// Allocate a solver atom on behalf of
    /// [`PropagatorInitialisationContext::add_literal`]. Unfrozen atoms become
    /// elimination candidates at the end of initialisation.
    ///
    /// [`PropagatorInitialisationContext::add_literal`]:
    /// crate::PropagatorInitialisationContext::add_literal
    pub(crate) fn new_introduced_atom(
        &mut self,
        assignment: &mut Assignment,
        clause_database: &mut ClauseDatabase,
        freeze: bool,
    ) -> Atom {
        let atom = self.new_atom(assignment, clause_database);
        if freeze {
            self.flags[atom].frozen = true;
        } else {
            self.unfrozen_candidates.push(atom);
        }
        atom
    }

    /// The solver literal backing the given program literal.
    pub(crate) fn solver_literal(&self, program_literal: ProgramLiteral) -> Literal {
        let index = program_literal.atom_id() as usize - 1;
        calabash_assert_simple!(
            index < self.program_map.len(),
            "program literal {program_literal} is unknown to the solver"
        );

        let atom = self.program_map[index];
        if program_literal.is_positive() {
            Literal::positive(atom)
        } else {
            Literal::negative(atom)
        }
    }

    pub(crate) fn freeze(&mut self, atom: Atom) {
        self.flags[atom].frozen = true;
    }

    /// Record that the atom occurs in a clause or weight constraint, which
    /// shields it from elimination.
    pub(crate) fn mark_occurrence(&mut self, atom: Atom) {
        self.flags[atom].occurs = true;
    }

    /// Preprocessing: eliminate every initialisation-introduced literal that
    /// was neither frozen nor used in a constraint. Referencing an eliminated
    /// literal afterwards is a contract violation.
    pub(crate) fn eliminate_unconstrained(&mut self, assignment: &mut Assignment) {
        for atom in std::mem::take(&mut self.unfrozen_candidates) {
            let flags = self.flags[atom];
            if !flags.frozen && !flags.occurs {
                debug!("eliminating unconstrained literal {atom}");
                assignment.eliminate(atom);
            }
        }
    }

    pub(crate) fn program_atoms(&self) -> &[Atom] {
        &self.program_map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn program_literals_map_through_the_registry_with_matching_polarity() {
        let mut registry = AtomRegistry::default();
        let mut assignment = Assignment::default();
        let mut database = ClauseDatabase::default();

        // the constant-true atom occupies the first solver slot
        let _ = registry.new_atom(&mut assignment, &mut database);
        let first = registry.new_program_atom(&mut assignment, &mut database);
        let second = registry.new_program_atom(&mut assignment, &mut database);

        assert_eq!(registry.solver_literal(first).get(), 2);
        assert_eq!(registry.solver_literal(!first).get(), -2);
        assert_eq!(registry.solver_literal(second).get(), 3);
    }

    #[test]
    fn unfrozen_unused_literals_are_eliminated() {
        let mut registry = AtomRegistry::default();
        let mut assignment = Assignment::default();
        let mut database = ClauseDatabase::default();

        let kept = registry.new_introduced_atom(&mut assignment, &mut database, true);
        let dropped = registry.new_introduced_atom(&mut assignment, &mut database, false);
        let used = registry.new_introduced_atom(&mut assignment, &mut database, false);
        registry.mark_occurrence(used);

        registry.eliminate_unconstrained(&mut assignment);

        assert!(assignment.has_literal(Literal::positive(kept)));
        assert!(!assignment.has_literal(Literal::positive(dropped)));
        assert!(assignment.has_literal(Literal::positive(used)));
    }

    #[test]
    fn freezing_after_introduction_shields_a_literal() {
        let mut registry = AtomRegistry::default();
        let mut assignment = Assignment::default();
        let mut database = ClauseDatabase::default();

        let atom = registry.new_introduced_atom(&mut assignment, &mut database, false);
        registry.freeze(atom);
        registry.eliminate_unconstrained(&mut assignment);

        assert!(assignment.has_literal(Literal::positive(atom)));
    }
}
