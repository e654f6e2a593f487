//! Typed-tuple iteration over an archetype's entities.
//!
//! Results come as the arity-indexed [With1]..[With6] family, each row
//! carrying the requested components and their owning entity. Iterators are
//! weakly consistent: records that no longer belong to the archetype, or
//! that are mid-transition, are skipped rather than reported.

use crate::archetype::Composition;
use crate::entity::{Component, Entity};
use crate::pool::EntityIter;
use std::marker::PhantomData;
use std::sync::Arc;

macro_rules! tuple_iterators {
    ($(#[$meta:meta])* $with:ident, $iter:ident, $( $comp:ident : $idx:ident : $ty:ident ),+) => {
        $(#[$meta])*
        pub struct $with<$( $ty ),+> {
            $( pub $comp: Arc<$ty>, )+
            pub entity: Arc<Entity>,
        }

        pub struct $iter<$( $ty ),+> {
            $( $idx: i32, )+
            entities: EntityIter,
            composition: Arc<Composition>,
            _marker: PhantomData<fn() -> ($( $ty, )+)>,
        }

        impl<$( $ty: Component ),+> $iter<$( $ty ),+> {
            pub(crate) fn new(
                $( $idx: i32, )+
                entities: EntityIter,
                composition: Arc<Composition>,
            ) -> Self {
                Self {
                    $( $idx, )+
                    entities,
                    composition,
                    _marker: PhantomData,
                }
            }
        }

        impl<$( $ty: Component ),+> Iterator for $iter<$( $ty ),+> {
            type Item = $with<$( $ty ),+>;

            fn next(&mut self) -> Option<Self::Item> {
                // a type outside the archetype resolves to the -1 sentinel;
                // such a request yields nothing rather than failing
                if [$( self.$idx ),+].iter().any(|&idx| idx < 0) {
                    return None;
                }
                loop {
                    let entity = self.entities.next()?;
                    let row = {
                        let data = entity.data.read();
                        if data.offset < 0 {
                            continue;
                        }
                        match &data.composition {
                            Some(current) if Arc::ptr_eq(current, &self.composition) => {}
                            _ => continue,
                        }
                        let offset = data.offset as usize;
                        ( $(
                            match data
                                .components
                                .get(offset + self.$idx as usize)
                                .cloned()
                                .and_then(|component| component.downcast_arc::<$ty>().ok())
                            {
                                Some(component) => component,
                                None => continue,
                            },
                        )+ )
                    };
                    let ( $( $comp, )+ ) = row;
                    return Some($with {
                        $( $comp, )+
                        entity,
                    });
                }
            }
        }
    };
}

tuple_iterators!(
    /// Result row of an arity-1 query: the component and its owning entity.
    With1, IterWith1, comp: idx: T1
);
tuple_iterators!(
    /// Result row of an arity-2 query.
    With2, IterWith2, comp1: idx1: T1, comp2: idx2: T2
);
tuple_iterators!(
    /// Result row of an arity-3 query.
    With3, IterWith3, comp1: idx1: T1, comp2: idx2: T2, comp3: idx3: T3
);
tuple_iterators!(
    /// Result row of an arity-4 query.
    With4, IterWith4, comp1: idx1: T1, comp2: idx2: T2, comp3: idx3: T3, comp4: idx4: T4
);
tuple_iterators!(
    /// Result row of an arity-5 query.
    With5, IterWith5,
    comp1: idx1: T1, comp2: idx2: T2, comp3: idx3: T3, comp4: idx4: T4, comp5: idx5: T5
);
tuple_iterators!(
    /// Result row of an arity-6 query.
    With6, IterWith6,
    comp1: idx1: T1, comp2: idx2: T2, comp3: idx3: T3, comp4: idx4: T4, comp5: idx5: T5,
    comp6: idx6: T6
);
