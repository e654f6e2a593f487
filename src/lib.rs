//! Paged, archetype-indexed storage for entity-component data.
//!
//! The crate provides the storage core of an ECS: a [ChunkedPool] that hands
//! out dense 64-bit handles and recycles freed slots, [Composition]
//! archetypes that group entities sharing one component type-set into
//! contiguous pages with a canonical component order, typed-tuple iteration
//! through the [With1](query::With1)..[With6](query::With6) family, and an
//! intrusive state index linking entities that share one enum state value.
//!
//! ```
//! use strata::{components, World};
//!
//! #[derive(Debug, PartialEq)]
//! struct Position(f32, f32);
//! #[derive(Debug, PartialEq)]
//! struct Velocity(f32, f32);
//!
//! let world = World::new();
//! world.create_entity(components![Position(0.0, 0.0), Velocity(1.0, 0.5)]);
//! world.create_entity(components![Position(4.0, 4.0)]);
//!
//! let moving: Vec<_> = world.find2::<Position, Velocity>().collect();
//! assert_eq!(moving.len(), 1);
//! assert_eq!(*moving[0].comp2, Velocity(1.0, 0.5));
//!
//! let placed = world.find1::<Position>().count();
//! assert_eq!(placed, 2);
//! ```

pub mod archetype;
pub mod class_index;
pub mod config;
pub mod entity;
pub mod hash;
pub mod id;
pub mod pool;
pub mod query;
pub mod state;
pub mod world;

pub use crate::archetype::Composition;
pub use crate::class_index::ClassIndex;
pub use crate::config::{ConfigError, PoolConfig};
pub use crate::entity::{Component, Entity};
pub use crate::id::{EntityId, IdSchema};
pub use crate::pool::{ChunkedPool, EntityIter, Tenant};
pub use crate::query::{With1, With2, With3, With4, With5, With6};
pub use crate::state::{State, StateIter, StateKey};
pub use crate::world::World;

/// Boxes component instances into the erased tuple accepted by
/// [World::create_entity].
#[macro_export]
macro_rules! components {
    ($( $component:expr ),* $(,)?) => {
        vec![$( std::sync::Arc::new($component) as std::sync::Arc<dyn $crate::entity::Component>, )*]
    };
}

pub mod prelude {
    pub use crate::components;
    pub use crate::{
        Component, Composition, Entity, EntityId, PoolConfig, State, World,
    };
}
