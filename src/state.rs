//! Intrusive state chains: entities sharing one enum state value are linked
//! into a doubly linked list, newest at the root.
//!
//! Every transition (attach, detach, re-attach) dispatches on the entity's
//! root marker only after the index lock is held, so a concurrent attach
//! that promotes an entity to root cannot interleave with its detach.

use crate::class_index::ClassIndex;
use crate::entity::Entity;
use crate::hash::U64Hasher;
use parking_lot::Mutex;
use std::any::TypeId;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::BuildHasherDefault;
use std::sync::Arc;

/// A user enum value usable as an entity state.
///
/// Fieldless enums implement this as `*self as u32`:
///
/// ```
/// use strata::state::State;
///
/// #[derive(Copy, Clone)]
/// enum Phase {
///     Idle,
///     Running,
/// }
///
/// impl State for Phase {
///     fn ordinal(&self) -> u32 {
///         *self as u32
///     }
/// }
/// ```
pub trait State: 'static + Send + Sync {
    /// The variant's position within its enum.
    fn ordinal(&self) -> u32;
}

/// Key of a state chain: the state class's index and the variant ordinal,
/// packed into one u64.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct StateKey(u64);

impl StateKey {
    pub(crate) fn of<S: State>(state: &S, class_index: &ClassIndex) -> Self {
        let class = class_index.get_index_or_add(TypeId::of::<S>());
        Self(((class as u64) << 32) | state.ordinal() as u64)
    }

    pub fn class_index(self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub fn ordinal(self) -> u32 {
        self.0 as u32
    }
}

type RootMap = HashMap<StateKey, Arc<Entity>, BuildHasherDefault<U64Hasher>>;

/// Map from state key to the chain root, plus the lock serialising every
/// chain mutation within one archetype.
#[derive(Default)]
pub(crate) struct StateIndex {
    roots: Mutex<RootMap>,
}

impl StateIndex {
    /// The entity currently at the head of the chain for `key`.
    pub fn root(&self, key: StateKey) -> Option<Arc<Entity>> {
        self.roots.lock().get(&key).cloned()
    }

    /// Detaches `entity` from any current chain, then attaches it as the new
    /// root for `key` when one is given. A single atomic step.
    pub fn transition(&self, entity: &Arc<Entity>, key: Option<StateKey>) {
        let mut roots = self.roots.lock();
        Self::detach_locked(&mut roots, entity);
        if let Some(key) = key {
            Self::attach_locked(&mut roots, entity, key);
        }
    }

    /// Detaches `entity` from its chain, if it is in one.
    pub fn detach(&self, entity: &Arc<Entity>) {
        let mut roots = self.roots.lock();
        Self::detach_locked(&mut roots, entity);
    }

    fn attach_locked(roots: &mut RootMap, entity: &Arc<Entity>, key: StateKey) {
        match roots.entry(key) {
            Entry::Vacant(vacant) => {
                entity.links.lock().state_root = Some(key);
                vacant.insert(entity.clone());
            }
            Entry::Occupied(mut occupied) => {
                let old = occupied.get().clone();
                {
                    let mut links = entity.links.lock();
                    links.prev = Some(old.clone());
                    links.state_root = Some(key);
                }
                {
                    let mut links = old.links.lock();
                    links.next = Some(Arc::downgrade(entity));
                    links.state_root = None;
                }
                occupied.insert(entity.clone());
            }
        }
    }

    fn detach_locked(roots: &mut RootMap, entity: &Arc<Entity>) {
        let (root_key, prev, next) = {
            let links = entity.links.lock();
            (links.state_root, links.prev.clone(), links.next.clone())
        };
        if let Some(key) = root_key {
            match prev {
                // alone: drop the chain entirely
                None => {
                    roots.remove(&key);
                    entity.links.lock().state_root = None;
                }
                // promote the previous sibling to root
                Some(prev) => {
                    roots.insert(key, prev.clone());
                    {
                        let mut links = entity.links.lock();
                        links.state_root = None;
                        links.prev = None;
                    }
                    let mut links = prev.links.lock();
                    links.next = None;
                    links.state_root = Some(key);
                }
            }
        } else if let Some(next) = next.and_then(|weak| weak.upgrade()) {
            // interior or tail: splice out
            let prev = {
                let mut links = entity.links.lock();
                links.next = None;
                links.prev.take()
            };
            match prev {
                Some(prev) => {
                    next.links.lock().prev = Some(prev.clone());
                    prev.links.lock().next = Some(Arc::downgrade(&next));
                }
                None => {
                    next.links.lock().prev = None;
                }
            }
        }
    }
}

/// Walks a state chain from the root towards the tail.
///
/// Single-threaded and not reentrant; restart by obtaining a fresh iterator
/// from the root.
pub struct StateIter {
    next: Option<Arc<Entity>>,
}

impl StateIter {
    pub(crate) fn new(root: Option<Arc<Entity>>) -> Self {
        Self { next: root }
    }
}

impl Iterator for StateIter {
    type Item = Arc<Entity>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        self.next = current.links.lock().prev.clone();
        Some(current)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::world::World;

    #[derive(Copy, Clone)]
    enum Phase {
        Idle,
        Running,
    }

    impl State for Phase {
        fn ordinal(&self) -> u32 {
            *self as u32
        }
    }

    fn three_chained() -> (World, Arc<Entity>, Arc<Entity>, Arc<Entity>) {
        let world = World::new();
        let a = world.create_entity(vec![]);
        let b = world.create_entity(vec![]);
        let c = world.create_entity(vec![]);
        let composition = a.composition().unwrap();
        composition.set_entity_state(&a, Some(Phase::Running));
        composition.set_entity_state(&b, Some(Phase::Running));
        composition.set_entity_state(&c, Some(Phase::Running));
        (world, a, b, c)
    }

    #[test]
    fn root_holds_key_and_no_next() {
        let (_world, a, b, c) = three_chained();
        let composition = a.composition().unwrap();

        let root = composition.state_root(Phase::Running).unwrap();
        assert!(Arc::ptr_eq(&root, &c));
        assert!(c.state_root().is_some());
        assert!(c.links.lock().next.is_none());
        assert!(a.state_root().is_none());
        assert!(b.state_root().is_none());

        let b_next = b.links.lock().next.clone().unwrap().upgrade().unwrap();
        assert!(Arc::ptr_eq(&b_next, &c));
        let a_next = a.links.lock().next.clone().unwrap().upgrade().unwrap();
        assert!(Arc::ptr_eq(&a_next, &b));

        let order: Vec<_> = composition.state_entities(Phase::Running).collect();
        assert_eq!(order.len(), 3);
        assert!(Arc::ptr_eq(&order[0], &c));
        assert!(Arc::ptr_eq(&order[1], &b));
        assert!(Arc::ptr_eq(&order[2], &a));
    }

    #[test]
    fn detaching_root_promotes_previous() {
        let (_world, a, b, c) = three_chained();
        let composition = a.composition().unwrap();

        composition.set_entity_state::<Phase>(&c, None);
        let root = composition.state_root(Phase::Running).unwrap();
        assert!(Arc::ptr_eq(&root, &b));
        assert!(b.state_root().is_some());
        assert!(b.links.lock().next.is_none());
        assert!(c.state_root().is_none());
        assert!(c.links.lock().prev.is_none());
        let order: Vec<_> = composition.state_entities(Phase::Running).collect();
        assert_eq!(order.len(), 2);
        assert!(Arc::ptr_eq(&order[0], &b));
        assert!(Arc::ptr_eq(&order[1], &a));
    }

    #[test]
    fn detaching_interior_splices() {
        let (_world, a, b, c) = three_chained();
        let composition = a.composition().unwrap();

        composition.set_entity_state::<Phase>(&b, None);
        assert!(b.links.lock().prev.is_none());
        assert!(b.links.lock().next.is_none());
        let c_prev = c.links.lock().prev.clone().unwrap();
        assert!(Arc::ptr_eq(&c_prev, &a));
        let a_next = a.links.lock().next.clone().unwrap().upgrade().unwrap();
        assert!(Arc::ptr_eq(&a_next, &c));
        let order: Vec<_> = composition.state_entities(Phase::Running).collect();
        assert_eq!(order.len(), 2);
        assert!(Arc::ptr_eq(&order[0], &c));
        assert!(Arc::ptr_eq(&order[1], &a));
    }

    #[test]
    fn detaching_tail_clears_its_links() {
        let (_world, a, b, c) = three_chained();
        let composition = a.composition().unwrap();

        composition.set_entity_state::<Phase>(&a, None);
        assert!(a.links.lock().prev.is_none());
        assert!(a.links.lock().next.is_none());
        assert!(b.links.lock().prev.is_none());
        let order: Vec<_> = composition.state_entities(Phase::Running).collect();
        assert_eq!(order.len(), 2);
        assert!(Arc::ptr_eq(&order[0], &c));
        assert!(Arc::ptr_eq(&order[1], &b));
    }

    #[test]
    fn detaching_sole_root_removes_entry() {
        let world = World::new();
        let a = world.create_entity(vec![]);
        let composition = a.composition().unwrap();
        composition.set_entity_state(&a, Some(Phase::Running));
        assert!(composition.state_root(Phase::Running).is_some());

        composition.set_entity_state::<Phase>(&a, None);
        assert!(composition.state_root(Phase::Running).is_none());
        assert!(a.state_root().is_none());
    }

    #[test]
    fn transition_moves_between_chains() {
        let world = World::new();
        let a = world.create_entity(vec![]);
        let composition = a.composition().unwrap();
        composition.set_entity_state(&a, Some(Phase::Running));
        composition.set_entity_state(&a, Some(Phase::Idle));

        assert!(composition.state_root(Phase::Running).is_none());
        let root = composition.state_root(Phase::Idle).unwrap();
        assert!(Arc::ptr_eq(&root, &a));
    }

    #[test]
    fn destroy_detaches_state_first() {
        let (world, a, b, c) = three_chained();
        let composition = a.composition().unwrap();

        // c is the root; destroying it must promote b
        world.destroy_entity(&c);
        let root = composition.state_root(Phase::Running).unwrap();
        assert!(Arc::ptr_eq(&root, &b));
        let order: Vec<_> = composition.state_entities(Phase::Running).collect();
        assert_eq!(order.len(), 2);
    }

    #[test]
    fn key_packs_class_and_ordinal() {
        let class_index = ClassIndex::new(8);
        let running = StateKey::of(&Phase::Running, &class_index);
        let idle = StateKey::of(&Phase::Idle, &class_index);
        assert_eq!(running.class_index(), 1);
        assert_eq!(running.ordinal(), 1);
        assert_eq!(idle.class_index(), 1);
        assert_eq!(idle.ordinal(), 0);
        assert_ne!(running, idle);
    }
}
