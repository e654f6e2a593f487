//! The shared entity record.

use crate::archetype::Composition;
use crate::id::{EntityId, DETACHED_BIT};
use crate::state::StateKey;
use downcast_rs::{impl_downcast, DowncastSync};
use parking_lot::{Mutex, RwLock};
use std::any::TypeId;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// A marker trait for all types which can be attached to an entity.
///
/// This trait has a blanket impl for all applicable types. Component
/// instances are stored behind `Arc<dyn Component>` and expose their concrete
/// type at runtime through downcasting.
pub trait Component: DowncastSync {}
impl_downcast!(sync Component);

impl<T: 'static + Send + Sync> Component for T {}

/// An entity: a handle into the pool plus a back-pointer to the archetype
/// that currently owns it.
///
/// Records are shared (`Arc<Entity>`): the pool slot, the state index, and
/// callers all reference the same record. The handle is re-issued on every
/// attach; a destroyed entity keeps its record with the detached flag set.
pub struct Entity {
    id: AtomicU64,
    pub(crate) data: RwLock<EntityData>,
    pub(crate) links: Mutex<StateLinks>,
}

pub(crate) struct EntityData {
    pub composition: Option<Arc<Composition>>,
    pub components: Box<[Arc<dyn Component>]>,
    pub name: Option<Box<str>>,
    /// Offset of the component tuple within its storage; negative while the
    /// record is transient (detached or pending re-registration).
    pub offset: i32,
}

#[derive(Default)]
pub(crate) struct StateLinks {
    /// Older sibling in the state chain, towards the tail. Strong: the chain
    /// is owned root-to-tail.
    pub prev: Option<Arc<Entity>>,
    /// Newer sibling, towards the root. Weak to keep chain ownership acyclic.
    pub next: Option<Weak<Entity>>,
    /// Non-null iff this entity is the root of its state chain.
    pub state_root: Option<StateKey>,
}

impl Entity {
    pub(crate) fn new(id: EntityId, composition: Arc<Composition>, name: Option<&str>) -> Self {
        Self {
            id: AtomicU64::new(id.raw()),
            data: RwLock::new(EntityData {
                composition: Some(composition),
                components: Box::default(),
                name: name.map(Into::into),
                offset: -1,
            }),
            links: Mutex::new(StateLinks::default()),
        }
    }

    /// The entity's current handle.
    pub fn id(&self) -> EntityId {
        EntityId::from_raw(self.id.load(Ordering::Acquire))
    }

    pub(crate) fn set_id(&self, id: EntityId) {
        self.id.store(id.raw(), Ordering::Release);
    }

    pub(crate) fn flag_detached(&self) {
        self.id.fetch_or(DETACHED_BIT, Ordering::AcqRel);
    }

    /// Returns `true` once the entity has been detached from its pool slot.
    pub fn is_detached(&self) -> bool {
        self.id().is_detached()
    }

    /// The archetype currently holding this entity, if any.
    pub fn composition(&self) -> Option<Arc<Composition>> {
        self.data.read().composition.clone()
    }

    /// The optional name given at creation.
    pub fn name(&self) -> Option<String> {
        self.data.read().name.as_deref().map(str::to_owned)
    }

    /// A snapshot of the component tuple in canonical order.
    pub fn components(&self) -> Vec<Arc<dyn Component>> {
        self.data.read().components.to_vec()
    }

    /// The component of type `T`, if this entity's archetype contains it.
    pub fn component<T: Component>(&self) -> Option<Arc<T>> {
        let data = self.data.read();
        let composition = data.composition.clone()?;
        let index = composition.fetch_component_index(TypeId::of::<T>());
        if index < 0 || data.offset < 0 {
            return None;
        }
        data.components
            .get(data.offset as usize + index as usize)
            .cloned()?
            .downcast_arc::<T>()
            .ok()
    }

    /// The state key this entity is the chain root for, if any.
    pub fn state_root(&self) -> Option<StateKey> {
        self.links.lock().state_root
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.data.read();
        f.debug_struct("Entity")
            .field("id", &self.id())
            .field("name", &data.name)
            .field("components", &data.components.len())
            .finish()
    }
}
