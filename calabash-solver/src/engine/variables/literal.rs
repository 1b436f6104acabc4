use std::num::NonZero;

use crate::calabash_assert_moderate;
use crate::containers::StorageKey;

/// A solver atom. Atom identifiers are 1-based; atom 1 is the constant-true
/// atom allocated by the solver itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Atom {
    id: u32,
}

impl Atom {
    pub(crate) fn new(id: u32) -> Atom {
        calabash_assert_moderate!(id > 0, "atom identifiers are 1-based");
        Atom { id }
    }

    pub fn id(self) -> u32 {
        self.id
    }
}

impl StorageKey for Atom {
    fn index(&self) -> usize {
        self.id as usize - 1
    }

    fn create_from_index(index: usize) -> Self {
        Atom {
            id: index as u32 + 1,
        }
    }
}

impl std::fmt::Display for Atom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// A literal in the solver's own literal space: a non-zero signed integer
/// whose magnitude identifies an [`Atom`] and whose sign selects a polarity.
///
/// Solver literals are obtained from program literals through
/// [`PropagatorInitialisationContext::solver_literal`]; the two spaces must
/// never be confused, which is why they are distinct types.
///
/// [`PropagatorInitialisationContext::solver_literal`]:
/// crate::PropagatorInitialisationContext::solver_literal
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Literal {
    code: NonZero<i32>,
}

impl Literal {
    pub(crate) fn positive(atom: Atom) -> Literal {
        Literal {
            code: NonZero::new(atom.id() as i32).expect("atom identifiers are non-zero"),
        }
    }

    pub(crate) fn negative(atom: Atom) -> Literal {
        Literal {
            code: NonZero::new(-(atom.id() as i32)).expect("atom identifiers are non-zero"),
        }
    }

    pub fn atom(self) -> Atom {
        Atom::new(self.code.get().unsigned_abs())
    }

    pub fn is_positive(self) -> bool {
        self.code.get() > 0
    }

    pub fn is_negative(self) -> bool {
        self.code.get() < 0
    }

    /// The raw signed integer representation.
    pub fn get(self) -> i32 {
        self.code.get()
    }
}

impl std::ops::Not for Literal {
    type Output = Literal;

    fn not(self) -> Literal {
        Literal {
            code: NonZero::new(-self.code.get()).expect("literals are non-zero"),
        }
    }
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code)
    }
}

impl StorageKey for Literal {
    fn index(&self) -> usize {
        let atom_index = self.atom().index();
        atom_index * 2 + self.is_positive() as usize
    }

    fn create_from_index(index: usize) -> Self {
        let atom = Atom::create_from_index(index / 2);
        if index % 2 == 1 {
            Literal::positive(atom)
        } else {
            Literal::negative(atom)
        }
    }
}

/// A literal in the program/condition literal space: the identifiers handed
/// out by the grounding front end. A [`ProgramLiteral`] is meaningless to the
/// search engine until it has been mapped to a solver [`Literal`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramLiteral {
    code: NonZero<i32>,
}

impl ProgramLiteral {
    pub(crate) fn positive(atom_id: u32) -> ProgramLiteral {
        ProgramLiteral {
            code: NonZero::new(atom_id as i32).expect("program atom identifiers are non-zero"),
        }
    }

    /// The 1-based identifier of the program atom underneath this literal.
    pub fn atom_id(self) -> u32 {
        self.code.get().unsigned_abs()
    }

    pub fn is_positive(self) -> bool {
        self.code.get() > 0
    }

    /// The raw signed integer representation.
    pub fn get(self) -> i32 {
        self.code.get()
    }
}

impl std::ops::Not for ProgramLiteral {
    type Output = ProgramLiteral;

    fn not(self) -> ProgramLiteral {
        ProgramLiteral {
            code: NonZero::new(-self.code.get()).expect("literals are non-zero"),
        }
    }
}

impl std::fmt::Display for ProgramLiteral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negation_flips_the_sign_and_keeps_the_atom() {
        let literal = Literal::positive(Atom::new(5));

        assert_eq!((!literal).get(), -5);
        assert_eq!((!literal).atom(), literal.atom());
        assert_eq!(!!literal, literal);
    }

    #[test]
    fn storage_keys_are_dense_and_invertible() {
        for code in [1i32, -1, 2, -2, 7, -7] {
            let atom = Atom::new(code.unsigned_abs());
            let literal = if code > 0 {
                Literal::positive(atom)
            } else {
                Literal::negative(atom)
            };

            assert_eq!(Literal::create_from_index(literal.index()), literal);
        }
    }

    #[test]
    fn program_literals_display_as_signed_integers() {
        let literal = ProgramLiteral::positive(3);

        assert_eq!(literal.to_string(), "3");
        assert_eq!((!literal).to_string(), "-3");
        assert_eq!((!literal).atom_id(), 3);
    }
}
