use std::fmt::Debug;
use std::fmt::Formatter;
use std::ops::Index;
use std::ops::IndexMut;

use crate::containers::KeyedVec;
use crate::containers::StorageKey;
use crate::engine::propagation::Propagator;

/// Identifies a registered [`Propagator`]. Identifiers are handed out in
/// registration order, which is also the order in which `decide` hooks are
/// chained.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PropagatorId(pub(crate) u32);

impl StorageKey for PropagatorId {
    fn index(&self) -> usize {
        self.0 as usize
    }

    fn create_from_index(index: usize) -> Self {
        PropagatorId(index as u32)
    }
}

impl std::fmt::Display for PropagatorId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The registered propagators of a solver, living here for the lifetime of
/// the solver and queried from every search thread.
#[derive(Default)]
pub(crate) struct PropagatorStore {
    propagators: KeyedVec<PropagatorId, Box<dyn Propagator>>,
}

impl PropagatorStore {
    pub(crate) fn push(&mut self, propagator: Box<dyn Propagator>) -> PropagatorId {
        self.propagators.push(propagator)
    }

    pub(crate) fn ids(&self) -> impl Iterator<Item = PropagatorId> {
        self.propagators.keys()
    }

    pub(crate) fn len(&self) -> usize {
        self.propagators.len()
    }
}

impl Index<PropagatorId> for PropagatorStore {
    type Output = dyn Propagator;

    fn index(&self, id: PropagatorId) -> &Self::Output {
        self.propagators[id].as_ref()
    }
}

impl IndexMut<PropagatorId> for PropagatorStore {
    fn index_mut(&mut self, id: PropagatorId) -> &mut Self::Output {
        self.propagators[id].as_mut()
    }
}

impl Debug for PropagatorStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self
            .propagators
            .iter()
            .map(|propagator| propagator.name())
            .collect();
        f.debug_struct("PropagatorStore")
            .field("propagators", &names)
            .finish()
    }
}
