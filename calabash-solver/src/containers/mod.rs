mod keyed_vec;

pub(crate) use keyed_vec::KeyedVec;
pub(crate) use keyed_vec::StorageKey;
