use fnv::FnvHashMap;

use crate::engine::clause_database::Conflict;
use crate::engine::variables::Literal;
use crate::engine::variables::TruthValue;
use crate::engine::Assignment;

/// A literal together with the weight it contributes to a
/// [`WeightConstraint`] when it is assigned true.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WeightedLiteral {
    pub literal: Literal,
    pub weight: i64,
}

/// The implication direction encoded by a weight constraint
/// `literal <-> sum of weighted literals {>=|=} bound`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WeightConstraintType {
    /// Only `sum {>=|=} bound  ->  literal`.
    ImplicationLeft,
    /// Only `literal  ->  sum {>=|=} bound`.
    ImplicationRight,
    /// Both directions.
    Equivalence,
}

/// A weight constraint registered through
/// [`PropagatorInitialisationContext::add_weight_constraint`], stored in a
/// normal form where every weight is positive.
///
/// Propagation is counter based and deliberately not arc consistent; total
/// assignments are re-checked before a model is reported.
///
/// [`PropagatorInitialisationContext::add_weight_constraint`]:
/// crate::PropagatorInitialisationContext::add_weight_constraint
#[derive(Clone, Debug)]
pub(crate) struct WeightConstraint {
    literal: Literal,
    items: Vec<WeightedLiteral>,
    bound: i64,
    constraint_type: WeightConstraintType,
    compare_equal: bool,
}

impl WeightConstraint {
    /// Normalise and store the constraint: zero weights are dropped, negative
    /// weights are replaced by flipping the literal (`w * [l]` equals
    /// `w - (-w) * [!l]`), duplicate literals are merged, and complementary
    /// pairs contribute their smaller weight unconditionally.
    pub(crate) fn new(
        literal: Literal,
        items: &[WeightedLiteral],
        bound: i64,
        constraint_type: WeightConstraintType,
        compare_equal: bool,
    ) -> WeightConstraint {
        let mut bound = bound;
        let mut merged: FnvHashMap<Literal, i64> = FnvHashMap::default();
        for item in items {
            let (lit, weight) = if item.weight < 0 {
                bound -= item.weight;
                (!item.literal, -item.weight)
            } else {
                (item.literal, item.weight)
            };
            if weight != 0 {
                *merged.entry(lit).or_insert(0) += weight;
            }
        }

        let mut normalised = Vec::new();
        let mut literals: Vec<Literal> = merged.keys().copied().collect();
        literals.sort();
        for lit in literals {
            let Some(&weight) = merged.get(&lit) else {
                continue;
            };
            if let Some(&complement_weight) = merged.get(&!lit) {
                // exactly one of the pair is true in any total assignment
                let common = weight.min(complement_weight);
                bound -= common;
                let _ = merged.insert(lit, weight - common);
                let _ = merged.insert(!lit, complement_weight - common);
            }
            let weight = merged[&lit];
            if weight > 0 {
                normalised.push(WeightedLiteral {
                    literal: lit,
                    weight,
                });
            }
        }

        WeightConstraint {
            literal,
            items: normalised,
            bound,
            constraint_type,
            compare_equal,
        }
    }

    /// Assign every literal the constraint forces under the current
    /// assignment. Returns whether anything was assigned.
    pub(crate) fn propagate(&self, assignment: &mut Assignment) -> Result<bool, Conflict> {
        let true_sum: i64 = self
            .items
            .iter()
            .filter(|item| assignment.is_true(item.literal))
            .map(|item| item.weight)
            .sum();
        let possible_sum: i64 = true_sum
            + self
                .items
                .iter()
                .filter(|item| assignment.is_free(item.literal))
                .map(|item| item.weight)
                .sum::<i64>();

        let definitely_holds = if self.compare_equal {
            true_sum == self.bound && possible_sum == self.bound
        } else {
            true_sum >= self.bound
        };
        let definitely_fails = if self.compare_equal {
            true_sum > self.bound || possible_sum < self.bound
        } else {
            possible_sum < self.bound
        };

        let mut changed = false;

        if matches!(
            self.constraint_type,
            WeightConstraintType::ImplicationLeft | WeightConstraintType::Equivalence
        ) {
            // sum {>=|=} bound  ->  literal
            if definitely_holds {
                changed |= self.force(assignment, self.literal)?;
            }
            if assignment.is_false(self.literal) && !self.compare_equal {
                // keep the sum below the bound
                for item in &self.items {
                    if assignment.is_free(item.literal) && true_sum + item.weight >= self.bound {
                        changed |= self.force(assignment, !item.literal)?;
                    }
                }
            }
        }

        if matches!(
            self.constraint_type,
            WeightConstraintType::ImplicationRight | WeightConstraintType::Equivalence
        ) {
            // literal  ->  sum {>=|=} bound
            if definitely_fails {
                changed |= self.force(assignment, !self.literal)?;
            }
            if assignment.is_true(self.literal) {
                for item in &self.items {
                    if !assignment.is_free(item.literal) {
                        continue;
                    }
                    if possible_sum - item.weight < self.bound {
                        changed |= self.force(assignment, item.literal)?;
                    } else if self.compare_equal && true_sum + item.weight > self.bound {
                        changed |= self.force(assignment, !item.literal)?;
                    }
                }
            }
        }

        Ok(changed)
    }

    /// Evaluate the constraint under a total assignment.
    pub(crate) fn is_satisfied_under(&self, assignment: &Assignment) -> bool {
        let sum: i64 = self
            .items
            .iter()
            .filter(|item| assignment.is_true(item.literal))
            .map(|item| item.weight)
            .sum();
        let holds = if self.compare_equal {
            sum == self.bound
        } else {
            sum >= self.bound
        };
        let literal_holds = assignment.is_true(self.literal);

        match self.constraint_type {
            WeightConstraintType::ImplicationLeft => !holds || literal_holds,
            WeightConstraintType::ImplicationRight => !literal_holds || holds,
            WeightConstraintType::Equivalence => literal_holds == holds,
        }
    }

    fn force(&self, assignment: &mut Assignment, literal: Literal) -> Result<bool, Conflict> {
        match assignment.truth_value(literal) {
            TruthValue::True => Ok(false),
            TruthValue::Free => {
                assignment.assign(literal);
                Ok(true)
            }
            TruthValue::False => Err(self.conflict()),
        }
    }

    pub(crate) fn conflict(&self) -> Conflict {
        let mut literals = vec![self.literal];
        literals.extend(self.items.iter().map(|item| item.literal));
        Conflict { literals }
    }
}
