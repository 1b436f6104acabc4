use crate::basic_types::Trail;
use crate::calabash_assert_moderate;
use crate::calabash_assert_simple;
use crate::containers::KeyedVec;
use crate::containers::StorageKey;
use crate::engine::variables::Atom;
use crate::engine::variables::Literal;
use crate::engine::variables::TruthValue;

/// A solver thread's partial truth assignment over solver literals, together
/// with its decision level bookkeeping.
///
/// All public operations are queries; the solver owns the assignment and
/// mutates it from the search loop. A [`Propagator`] only ever sees a borrowed
/// `&Assignment` whose lifetime is bounded by the enclosing callback, so it
/// cannot retain one past the call.
///
/// [`Propagator`]: crate::Propagator
#[derive(Clone, Debug, Default)]
pub struct Assignment {
    trail: Trail<Literal>,
    entries: KeyedVec<Atom, AtomEntry>,
    /// The number of atoms that have not been eliminated by preprocessing.
    num_active_atoms: usize,
}

#[derive(Clone, Copy, Debug, Default)]
struct AtomEntry {
    truth: TruthValue,
    level: u32,
    eliminated: bool,
}

impl Assignment {
    /// The number of literals currently on the trail.
    pub fn size(&self) -> usize {
        self.trail.len()
    }

    /// The positive literal of the atom whose assignment is recorded at the
    /// given trail position.
    ///
    /// # Panics
    /// Panics if `index >= self.size()`; an out-of-range index is a contract
    /// violation by the caller, not a recoverable condition.
    pub fn at(&self, index: usize) -> Literal {
        assert!(
            index < self.trail.len(),
            "trail index {index} out of range for trail of length {}",
            self.trail.len()
        );

        Literal::positive(self.trail[index].atom())
    }

    /// The decision literal of the given level, or `None` for level 0, which
    /// holds only unconditional consequences and has no decision literal.
    ///
    /// `level` must not exceed [`Assignment::decision_level`].
    pub fn decision(&self, level: usize) -> Option<Literal> {
        calabash_assert_simple!(
            level <= self.decision_level(),
            "level {level} has not been reached (current level is {})",
            self.decision_level()
        );

        if level == 0 {
            None
        } else {
            Some(self.trail[self.trail.begin_of_level(level)])
        }
    }

    pub fn decision_level(&self) -> usize {
        self.trail.decision_level()
    }

    /// Whether the literal is known to the solver, as opposed to having been
    /// eliminated during preprocessing (or never allocated).
    pub fn has_literal(&self, literal: Literal) -> bool {
        let index = literal.atom().index();
        index < self.entries.len() && !self.entries[literal.atom()].eliminated
    }

    /// The [`TruthValue`] currently held by the literal.
    pub fn truth_value(&self, literal: Literal) -> TruthValue {
        let entry = self.entry(literal);
        if literal.is_positive() {
            entry.truth
        } else {
            entry.truth.negate()
        }
    }

    pub fn is_true(&self, literal: Literal) -> bool {
        self.truth_value(literal) == TruthValue::True
    }

    pub fn is_false(&self, literal: Literal) -> bool {
        self.truth_value(literal) == TruthValue::False
    }

    pub fn is_free(&self, literal: Literal) -> bool {
        self.truth_value(literal).is_free()
    }

    /// The decision level at which the literal's atom was assigned.
    ///
    /// The literal must not be free.
    pub fn level(&self, literal: Literal) -> usize {
        let entry = self.entry(literal);
        calabash_assert_simple!(
            !entry.truth.is_free(),
            "literal {literal} is unassigned and has no level"
        );

        entry.level as usize
    }

    /// Whether the literal was assigned at level 0 and is therefore invariant
    /// for the remainder of the solving step.
    pub fn is_fixed(&self, literal: Literal) -> bool {
        let entry = self.entry(literal);
        !entry.truth.is_free() && entry.level == 0
    }

    /// Whether every active atom has a truth value.
    pub fn is_total(&self) -> bool {
        self.trail.len() == self.num_active_atoms
    }

    /// The positive literals currently on the trail, in trail order. The
    /// iterator borrows the assignment, so it cannot outlive the enclosing
    /// callback nor span a mutation.
    pub fn iter(&self) -> impl Iterator<Item = Literal> + '_ {
        self.trail.iter().map(|lit| Literal::positive(lit.atom()))
    }

    /// A chronological view over the trail underlying this assignment.
    pub fn trail(&self) -> AssignmentTrail<'_> {
        AssignmentTrail { assignment: self }
    }

    fn entry(&self, literal: Literal) -> AtomEntry {
        calabash_assert_simple!(
            self.has_literal(literal),
            "literal {literal} is unknown or eliminated"
        );

        self.entries[literal.atom()]
    }

    pub(crate) fn num_atoms(&self) -> u32 {
        self.entries.len() as u32
    }

    pub(crate) fn grow(&mut self) -> Atom {
        self.num_active_atoms += 1;
        self.entries.push(AtomEntry::default())
    }

    /// Mark an atom as eliminated by preprocessing. The atom must be free; it
    /// no longer counts towards totality and must not be referenced again.
    pub(crate) fn eliminate(&mut self, atom: Atom) {
        calabash_assert_moderate!(self.entries[atom].truth.is_free());
        self.entries[atom].eliminated = true;
        self.num_active_atoms -= 1;
    }

    pub(crate) fn increase_decision_level(&mut self) {
        self.trail.increase_decision_level();
    }

    /// Record that `literal` is true at the current decision level.
    pub(crate) fn assign(&mut self, literal: Literal) {
        calabash_assert_moderate!(self.is_free(literal));

        let level = self.trail.decision_level() as u32;
        let entry = &mut self.entries[literal.atom()];
        entry.truth = if literal.is_positive() {
            TruthValue::True
        } else {
            TruthValue::False
        };
        entry.level = level;
        self.trail.push(literal);
    }

    /// Backtrack to the given level, unassigning every literal above it. The
    /// removed literals are returned in reverse chronological order.
    pub(crate) fn backtrack_to(&mut self, level: usize) -> Vec<Literal> {
        calabash_assert_simple!(level < self.decision_level());

        let removed: Vec<Literal> = self.trail.synchronise(level).collect();
        for literal in &removed {
            self.entries[literal.atom()].truth = TruthValue::Free;
        }

        removed
    }

    pub(crate) fn atoms(&self) -> impl Iterator<Item = Atom> {
        self.entries.keys()
    }
}

/// A chronological, per-decision-level ordered view over an [`Assignment`]'s
/// trail. Unlike [`Assignment::at`], positions in this view yield the literal
/// that became *true*, i.e. the sign records the assigned polarity.
#[derive(Clone, Copy, Debug)]
pub struct AssignmentTrail<'a> {
    assignment: &'a Assignment,
}

impl AssignmentTrail<'_> {
    pub fn size(&self) -> usize {
        self.assignment.trail.len()
    }

    /// The offset at which the given decision level begins (inclusive).
    ///
    /// `level` must not exceed the current decision level.
    pub fn begin(&self, level: usize) -> usize {
        self.assignment.trail.begin_of_level(level)
    }

    /// The offset at which the given decision level ends (exclusive).
    ///
    /// `level` must not exceed the current decision level.
    pub fn end(&self, level: usize) -> usize {
        self.assignment.trail.end_of_level(level)
    }

    /// The literal assigned true at the given trail position.
    ///
    /// # Panics
    /// Panics if `index >= self.size()`.
    pub fn at(&self, index: usize) -> Literal {
        assert!(
            index < self.size(),
            "trail index {index} out of range for trail of length {}",
            self.size()
        );

        self.assignment.trail[index]
    }

    /// The literals assigned from the given offset onwards, in assignment
    /// order. Used to replay what changed since a propagator last looked.
    pub fn iter_from(&self, offset: usize) -> impl Iterator<Item = Literal> + '_ {
        self.assignment.trail[offset..].iter().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = Literal> + '_ {
        self.iter_from(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment_with_atoms(how_many: u32) -> (Assignment, Vec<Literal>) {
        let mut assignment = Assignment::default();
        let literals = (0..how_many)
            .map(|_| Literal::positive(assignment.grow()))
            .collect();
        (assignment, literals)
    }

    #[test]
    fn exactly_one_truth_predicate_holds_for_every_literal() {
        let (mut assignment, literals) = assignment_with_atoms(3);
        assignment.assign(literals[0]);
        assignment.assign(!literals[1]);

        for literal in literals.iter().flat_map(|&lit| [lit, !lit]) {
            let truths = [
                assignment.is_true(literal),
                assignment.is_false(literal),
                assignment.is_free(literal),
            ];
            assert_eq!(truths.iter().filter(|&&held| held).count(), 1);
        }
    }

    #[test]
    fn a_literal_and_its_negation_have_opposite_truth_values() {
        let (mut assignment, literals) = assignment_with_atoms(1);
        assignment.assign(!literals[0]);

        assert!(assignment.is_false(literals[0]));
        assert!(assignment.is_true(!literals[0]));
        assert_eq!(assignment.is_true(literals[0]), assignment.is_false(!literals[0]));
    }

    #[test]
    fn decisions_are_the_first_literals_of_their_levels() {
        let (mut assignment, literals) = assignment_with_atoms(3);
        assignment.assign(literals[0]);

        assignment.increase_decision_level();
        assignment.assign(!literals[1]);
        assignment.assign(literals[2]);

        assert_eq!(assignment.decision(0), None);
        assert_eq!(assignment.decision(1), Some(!literals[1]));
        assert_eq!(assignment.level(literals[2]), 1);
        assert!(assignment.is_fixed(literals[0]));
        assert!(!assignment.is_fixed(literals[2]));
    }

    #[test]
    fn trail_level_ranges_partition_the_trail_exactly_once() {
        let (mut assignment, literals) = assignment_with_atoms(5);
        assignment.assign(literals[0]);
        assignment.increase_decision_level();
        assignment.assign(literals[1]);
        assignment.assign(!literals[2]);
        assignment.increase_decision_level();
        assignment.assign(literals[3]);

        let trail = assignment.trail();
        let mut replayed = Vec::new();
        for level in 0..=assignment.decision_level() {
            assert!(trail.begin(level) <= trail.end(level));
            if level > 0 {
                assert_eq!(trail.end(level - 1), trail.begin(level));
                assert!(trail.end(level) - trail.begin(level) >= 1);
            }
            for index in trail.begin(level)..trail.end(level) {
                replayed.push(trail.at(index));
            }
        }

        assert_eq!(replayed.len(), trail.size());
        assert_eq!(
            replayed,
            vec![literals[0], literals[1], !literals[2], literals[3]]
        );
    }

    #[test]
    fn backtracking_frees_the_removed_literals() {
        let (mut assignment, literals) = assignment_with_atoms(3);
        assignment.assign(literals[0]);
        assignment.increase_decision_level();
        assignment.assign(literals[1]);
        assignment.assign(!literals[2]);

        let removed = assignment.backtrack_to(0);

        assert_eq!(removed, vec![!literals[2], literals[1]]);
        assert!(assignment.is_free(literals[1]));
        assert!(assignment.is_free(literals[2]));
        assert!(assignment.is_true(literals[0]));
    }

    #[test]
    fn the_assignment_iterates_positive_literals_in_trail_order() {
        let (mut assignment, literals) = assignment_with_atoms(2);
        assignment.assign(!literals[1]);
        assignment.assign(literals[0]);

        let observed: Vec<Literal> = assignment.iter().collect();
        assert_eq!(observed, vec![literals[1], literals[0]]);
        assert_eq!(assignment.at(0), literals[1]);
    }

    #[test]
    fn totality_ignores_eliminated_atoms() {
        let (mut assignment, literals) = assignment_with_atoms(2);
        let spare = assignment.grow();
        assignment.eliminate(spare);

        assignment.assign(literals[0]);
        assert!(!assignment.is_total());
        assignment.assign(literals[1]);
        assert!(assignment.is_total());
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn indexing_beyond_the_trail_is_rejected() {
        let (assignment, _) = assignment_with_atoms(1);
        let _ = assignment.at(0);
    }

    #[test]
    #[should_panic(expected = "unknown or eliminated")]
    fn querying_an_eliminated_literal_is_rejected() {
        let (mut assignment, _) = assignment_with_atoms(0);
        let atom = assignment.grow();
        let literal = Literal::positive(atom);
        assignment.eliminate(atom);

        let _ = assignment.is_true(literal);
    }
}
