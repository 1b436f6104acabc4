/// The three-valued truth assignment of a literal: unassigned, or assigned to
/// one of the two polarities. A literal and its negation never hold the same
/// non-[`Free`] value at the same time.
///
/// [`Free`]: TruthValue::Free
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TruthValue {
    #[default]
    Free,
    True,
    False,
}

impl TruthValue {
    /// The truth value of the negated literal.
    pub fn negate(self) -> TruthValue {
        match self {
            TruthValue::Free => TruthValue::Free,
            TruthValue::True => TruthValue::False,
            TruthValue::False => TruthValue::True,
        }
    }

    pub fn is_free(self) -> bool {
        self == TruthValue::Free
    }
}
