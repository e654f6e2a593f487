//! Dense small-integer indexing of component and state types.

use crate::hash::ComponentTypeIdHasher;
use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::HashMap;
use std::hash::BuildHasherDefault;

/// Assigns a dense positive integer to each registered type.
///
/// Index 0 is reserved to mean "unknown"; real indices start at 1 and are
/// handed out in registration order. The capacity bound exists because
/// archetypes size their reverse index arrays to it.
pub struct ClassIndex {
    capacity: u32,
    map: RwLock<HashMap<TypeId, u32, BuildHasherDefault<ComponentTypeIdHasher>>>,
}

impl ClassIndex {
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            map: RwLock::new(HashMap::default()),
        }
    }

    /// Returns the index assigned to `type_id`, or 0 if it was never added.
    pub fn get_index(&self, type_id: TypeId) -> u32 {
        self.map.read().get(&type_id).copied().unwrap_or(0)
    }

    /// Returns the index assigned to `type_id`, assigning the next dense
    /// index if it was never added.
    ///
    /// Panics when the capacity is exhausted; more distinct types than
    /// `component_index_capacity` is a fatal misconfiguration.
    pub fn get_index_or_add(&self, type_id: TypeId) -> u32 {
        let index = self.get_index(type_id);
        if index != 0 {
            return index;
        }
        let mut map = self.map.write();
        if let Some(&index) = map.get(&type_id) {
            return index;
        }
        let next = map.len() as u32 + 1;
        if next >= self.capacity {
            panic!(
                "class index capacity ({}) exhausted; raise component_index_capacity",
                self.capacity
            );
        }
        map.insert(type_id, next);
        next
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct A;
    struct B;
    struct C;

    #[test]
    fn dense_assignment() {
        let index = ClassIndex::new(16);
        assert_eq!(index.get_index(TypeId::of::<A>()), 0);
        assert_eq!(index.get_index_or_add(TypeId::of::<A>()), 1);
        assert_eq!(index.get_index_or_add(TypeId::of::<B>()), 2);
        assert_eq!(index.get_index_or_add(TypeId::of::<A>()), 1);
        assert_eq!(index.get_index(TypeId::of::<B>()), 2);
        assert_eq!(index.get_index(TypeId::of::<C>()), 0);
        assert_eq!(index.len(), 2);
    }

    #[test]
    #[should_panic(expected = "class index capacity")]
    fn capacity_exhaustion_panics() {
        let index = ClassIndex::new(2);
        index.get_index_or_add(TypeId::of::<A>());
        index.get_index_or_add(TypeId::of::<B>());
    }
}
