//! Archetypes are sets of entities which all contain exactly the same set of
//! component types.
//!
//! Entities in the same archetype have their component tuples stored in one
//! canonical order, ascending by class index, so a query over a component
//! set reads fixed positions that never vary per entity.

use crate::class_index::ClassIndex;
use crate::entity::{Component, Entity};
use crate::pool::Tenant;
use crate::query::{IterWith1, IterWith2, IterWith3, IterWith4, IterWith5, IterWith6};
use crate::state::{State, StateIndex, StateIter, StateKey};
use bit_set::BitSet;
use downcast_rs::Downcast;
use std::any::TypeId;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// An archetype: the unique grouping of entities sharing one component
/// type-set, owning their storage through its [Tenant].
pub struct Composition {
    component_types: Box<[TypeId]>,
    class_indices: Box<[u32]>,
    class_bits: BitSet,
    /// Reverse map, class index to tuple position; built only when the
    /// archetype is multi-component.
    component_index: Option<Box<[i32]>>,
    tenant: Tenant,
    states: StateIndex,
    class_index: Arc<ClassIndex>,
}

impl Composition {
    /// `types` must be ascending by class index; the registry canonicalises
    /// before construction.
    pub(crate) fn new(
        types: Vec<(u32, TypeId)>,
        tenant: Tenant,
        class_index: Arc<ClassIndex>,
        index_capacity: u32,
    ) -> Self {
        let class_indices: Box<[u32]> = types.iter().map(|(class, _)| *class).collect();
        let component_types: Box<[TypeId]> = types.iter().map(|(_, ty)| *ty).collect();
        let mut class_bits = BitSet::new();
        for class in class_indices.iter() {
            class_bits.insert(*class as usize);
        }
        let component_index = if types.len() > 1 {
            let mut index = vec![-1i32; index_capacity as usize].into_boxed_slice();
            for (position, (class, _)) in types.iter().enumerate() {
                index[*class as usize] = position as i32;
            }
            Some(index)
        } else {
            None
        };
        Self {
            component_types,
            class_indices,
            class_bits,
            component_index,
            tenant,
            states: StateIndex::default(),
            class_index,
        }
    }

    /// The component type-set, in canonical order.
    pub fn component_types(&self) -> &[TypeId] {
        &self.component_types
    }

    pub fn len(&self) -> usize {
        self.component_types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.component_types.is_empty()
    }

    pub fn is_multi_component(&self) -> bool {
        self.len() > 1
    }

    pub(crate) fn class_bits(&self) -> &BitSet {
        &self.class_bits
    }

    /// Tuple position of `type_id` within this archetype, or -1 when the
    /// type is not a member.
    pub fn fetch_component_index(&self, type_id: TypeId) -> i32 {
        match &self.component_index {
            Some(index) => {
                let class = self.class_index.get_index(type_id) as usize;
                index.get(class).copied().unwrap_or(-1)
            }
            None => {
                if self.component_types.first() == Some(&type_id) {
                    0
                } else {
                    -1
                }
            }
        }
    }

    /// Settles every component at its canonical position by repeated swap.
    fn sort_components_in_place(&self, components: &mut [Arc<dyn Component>]) {
        for i in 0..components.len() {
            loop {
                let target = self.fetch_component_index(components[i].as_any().type_id());
                if target < 0 {
                    debug_assert!(false, "component type not in this composition");
                    break;
                }
                let target = target as usize;
                if target == i {
                    break;
                }
                // occupant already settled: duplicate component type
                if self.fetch_component_index(components[target].as_any().type_id())
                    == target as i32
                {
                    break;
                }
                components.swap(i, target);
            }
        }
    }

    /// Allocates a handle, builds the entity record, and registers it with
    /// its component tuple in canonical order.
    ///
    /// `prepared` skips the canonical sort for callers that already supply
    /// components in archetype order; tuples of at most one component never
    /// need sorting.
    pub fn create_entity(
        self: Arc<Self>,
        name: Option<&str>,
        prepared: bool,
        mut components: Vec<Arc<dyn Component>>,
    ) -> Arc<Entity> {
        if !prepared && self.is_multi_component() {
            self.sort_components_in_place(&mut components);
        }
        let id = self.tenant.next_id();
        let entity = Arc::new(Entity::new(id, self.clone(), name));
        debug!(id = id.raw(), classes = ?self.class_indices, "creating entity");
        self.tenant.register(id, entity, Some(components))
    }

    /// Moves an existing entity into this archetype: issues a fresh handle,
    /// rebinds the archetype pointer, and installs the given components.
    ///
    /// The caller detaches the entity from its previous archetype first.
    pub fn attach_entity(
        self: Arc<Self>,
        entity: &Arc<Entity>,
        prepared: bool,
        mut components: Vec<Arc<dyn Component>>,
    ) {
        let id = self.tenant.next_id();
        entity.set_id(id);
        entity.data.write().composition = Some(self.clone());
        let components = match self.len() {
            0 => None,
            1 => Some(components),
            _ => {
                if !prepared {
                    self.sort_components_in_place(&mut components);
                }
                Some(components)
            }
        };
        debug!(id = id.raw(), classes = ?self.class_indices, "attached entity");
        self.tenant.register(id, entity.clone(), components);
    }

    /// Frees the entity's handle and marks its stored handle detached.
    pub fn detach_entity(&self, entity: &Arc<Entity>) {
        let id = entity.id();
        entity.data.write().offset = -1;
        self.tenant.free_id(id);
        entity.flag_detached();
        debug!(id = id.raw(), "detached entity");
    }

    /// Detaches from any state chain first, then from the pool.
    pub fn detach_entity_and_state(&self, entity: &Arc<Entity>) {
        self.states.detach(entity);
        self.detach_entity(entity);
    }

    /// Moves the entity out of any current state chain and, when `state` is
    /// given, attaches it as the new root of that state's chain.
    pub fn set_entity_state<S: State>(&self, entity: &Arc<Entity>, state: Option<S>) {
        let key = state.map(|state| StateKey::of(&state, &self.class_index));
        self.states.transition(entity, key);
    }

    /// The entity at the head of the chain for `state`, if any.
    pub fn state_root<S: State>(&self, state: S) -> Option<Arc<Entity>> {
        self.states.root(StateKey::of(&state, &self.class_index))
    }

    /// Walks the chain for `state` from its root towards the tail.
    pub fn state_entities<S: State>(&self, state: S) -> StateIter {
        StateIter::new(self.state_root(state))
    }
}

impl fmt::Debug for Composition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Composition")
            .field("classes", &self.class_indices)
            .finish()
    }
}

macro_rules! select_impls {
    ($( $n:tt => $iter:ident < $( $ty:ident ),+ > );+ $(;)?) => { paste::paste! {
        impl Composition {
            $(
                pub fn [<select $n>]<$( $ty: Component ),+>(self: Arc<Self>) -> $iter<$( $ty ),+> {
                    $iter::new(
                        $( self.fetch_component_index(TypeId::of::<$ty>()), )+
                        self.tenant.entities(),
                        self,
                    )
                }
            )+
        }
    } };
}

select_impls! {
    1 => IterWith1<T1>;
    2 => IterWith2<T1, T2>;
    3 => IterWith3<T1, T2, T3>;
    4 => IterWith4<T1, T2, T3, T4>;
    5 => IterWith5<T1, T2, T3, T4, T5>;
    6 => IterWith6<T1, T2, T3, T4, T5, T6>;
}
