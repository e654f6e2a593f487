//! The world: a composition registry plus the entity lifecycle surface.

use crate::archetype::Composition;
use crate::class_index::ClassIndex;
use crate::config::{ConfigError, PoolConfig};
use crate::entity::{Component, Entity};
use crate::id::{EntityId, IdSchema};
use crate::pool::{ChunkedPool, Tenant};
use crate::query::{With1, With2, With3, With4, With5, With6};
use bit_set::BitSet;
use downcast_rs::Downcast;
use itertools::Itertools;
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Owns the shared pool, the class index, and the registry of archetypes.
///
/// Entities sharing one component type-set live in one [Composition]; the
/// registry locates it by the sorted class indices of the set, creating it
/// on first use. Archetypes are kept in creation order so queries iterate
/// them deterministically between structural edits.
pub struct World {
    pool: Arc<ChunkedPool>,
    class_index: Arc<ClassIndex>,
    compositions: RwLock<Registry>,
    config: PoolConfig,
}

#[derive(Default)]
struct Registry {
    by_key: HashMap<Box<[u32]>, Arc<Composition>>,
    ordered: Vec<Arc<Composition>>,
}

impl World {
    /// A world with the default pool configuration.
    pub fn new() -> Self {
        Self::from_parts(PoolConfig::default(), IdSchema::DEFAULT)
    }

    /// A world with a validated custom configuration.
    pub fn with_config(config: PoolConfig) -> Result<Self, ConfigError> {
        let schema = config.schema()?;
        Ok(Self::from_parts(config, schema))
    }

    fn from_parts(config: PoolConfig, schema: IdSchema) -> Self {
        Self {
            pool: Arc::new(ChunkedPool::new(schema)),
            class_index: Arc::new(ClassIndex::new(config.component_index_capacity)),
            compositions: RwLock::new(Registry::default()),
            config,
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Creates an entity from zero or more component instances.
    pub fn create_entity(&self, components: Vec<Arc<dyn Component>>) -> Arc<Entity> {
        self.create_named_entity(None, components)
    }

    /// Creates a named entity from zero or more component instances.
    pub fn create_named_entity(
        &self,
        name: Option<&str>,
        components: Vec<Arc<dyn Component>>,
    ) -> Arc<Entity> {
        let types: SmallVec<[TypeId; 8]> = components
            .iter()
            .map(|component| component.as_any().type_id())
            .collect();
        let composition = self.composition_for_types(&types);
        composition.create_entity(name, false, components)
    }

    /// Locates the unique archetype for a component type-set, creating it if
    /// missing.
    pub fn composition_for_types(&self, types: &[TypeId]) -> Arc<Composition> {
        let pairs: SmallVec<[(u32, TypeId); 8]> = types
            .iter()
            .map(|&ty| (self.class_index.get_index_or_add(ty), ty))
            .collect();
        let key: Box<[u32]> = pairs.iter().map(|(class, _)| *class).sorted().collect();
        debug_assert!(
            key.windows(2).all(|pair| pair[0] != pair[1]),
            "duplicate component types in one entity"
        );
        if let Some(composition) = self.compositions.read().by_key.get(&key) {
            return composition.clone();
        }
        let mut registry = self.compositions.write();
        if let Some(composition) = registry.by_key.get(&key) {
            return composition.clone();
        }
        let mut sorted = pairs.into_vec();
        sorted.sort_by_key(|(class, _)| *class);
        let tenant = Tenant::new(self.pool.clone(), self.config.free_stack_capacity);
        let composition = Arc::new(Composition::new(
            sorted,
            tenant,
            self.class_index.clone(),
            self.config.component_index_capacity,
        ));
        debug!(key = ?key, "created composition");
        registry.by_key.insert(key, composition.clone());
        registry.ordered.push(composition.clone());
        composition
    }

    /// Destroys an entity: state chain first, then its pool slot, then the
    /// record itself is emptied.
    pub fn destroy_entity(&self, entity: &Arc<Entity>) {
        if let Some(composition) = entity.composition() {
            composition.detach_entity_and_state(entity);
        }
        let mut data = entity.data.write();
        data.composition = None;
        data.components = Box::default();
        data.offset = -1;
    }

    /// O(1) handle lookup in the shared pool.
    pub fn get_entry(&self, id: EntityId) -> Option<Arc<Entity>> {
        self.pool.get_entry(id)
    }

    /// Archetypes whose type-set contains every requested class.
    fn matching(&self, types: &[TypeId]) -> SmallVec<[Arc<Composition>; 8]> {
        let mut request = BitSet::new();
        for &ty in types {
            let class = self.class_index.get_index(ty);
            if class == 0 {
                // a type never registered is contained by no archetype
                return SmallVec::new();
            }
            request.insert(class as usize);
        }
        self.compositions
            .read()
            .ordered
            .iter()
            .filter(|composition| request.is_subset(composition.class_bits()))
            .cloned()
            .collect()
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! find_impls {
    ($( $n:tt => $with:ident < $( $ty:ident ),+ > );+ $(;)?) => { paste::paste! {
        impl World {
            $(
                /// Iterates, archetype by archetype in creation order, every
                /// live entity whose type-set contains the requested types.
                pub fn [<find $n>]<$( $ty: Component ),+>(
                    &self,
                ) -> impl Iterator<Item = $with<$( $ty ),+>> {
                    let matched = self.matching(&[ $( TypeId::of::<$ty>() ),+ ]);
                    matched
                        .into_iter()
                        .flat_map(|composition| composition.[<select $n>]::<$( $ty ),+>())
                }
            )+
        }
    } };
}

find_impls! {
    1 => With1<T1>;
    2 => With2<T1, T2>;
    3 => With3<T1, T2, T3>;
    4 => With4<T1, T2, T3, T4>;
    5 => With5<T1, T2, T3, T4, T5>;
    6 => With6<T1, T2, T3, T4, T5, T6>;
}
