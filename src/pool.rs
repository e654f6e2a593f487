//! The paged entity pool and its per-archetype id allocator.
//!
//! A [ChunkedPool] is a table of fixed-capacity pages addressed by the page
//! index packed into every [EntityId]. Pages are allocated on demand, never
//! moved, and never freed; a stored record stays at its slot until the slot
//! is rewritten. Each archetype draws handles from the shared pool through
//! its own [Tenant], which chains the pages it owns and recycles freed
//! handles through a bounded stack.

use crate::entity::{Component, Entity};
use crate::id::{EntityId, IdSchema};
use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{trace, warn};

/// A paged, id-addressable store of entity records.
pub struct ChunkedPool {
    schema: IdSchema,
    pages: RwLock<Vec<Arc<Page>>>,
}

impl ChunkedPool {
    pub fn new(schema: IdSchema) -> Self {
        Self {
            schema,
            pages: RwLock::new(Vec::new()),
        }
    }

    pub fn schema(&self) -> IdSchema {
        self.schema
    }

    /// Reserves the next page id and installs the page in the table.
    ///
    /// Page ids grow monotonically and are never recycled. Panics when the
    /// schema's page space is exhausted; that is a fatal misconfiguration.
    fn new_page(&self, previous: Option<u32>) -> Arc<Page> {
        let mut pages = self.pages.write();
        let id = pages.len();
        if id >= self.schema.num_of_pages() {
            panic!(
                "chunked pool exhausted ({} pages); raise num_of_pages_bit_size",
                id
            );
        }
        let page = Arc::new(Page::new(id as u32, previous, self.schema.page_capacity()));
        pages.push(page.clone());
        trace!(page = id, "allocated pool page");
        page
    }

    pub(crate) fn get_page(&self, id: u32) -> Option<Arc<Page>> {
        self.pages.read().get(id as usize).cloned()
    }

    /// O(1) lookup of the record stored at a handle's slot.
    ///
    /// Returns `None` for handles carrying the detached flag, for pages that
    /// were never issued, and for empty slots.
    pub fn get_entry(&self, id: EntityId) -> Option<Arc<Entity>> {
        if id.is_detached() {
            return None;
        }
        let page = self.get_page(self.schema.page_of(id))?;
        let entry = page.slots[self.schema.slot_of(id) as usize].read().clone();
        entry
    }
}

/// One fixed-capacity chunk of the pool.
///
/// The size counter only grows; slots, once assigned, may be rewritten but
/// never shift. `previous` links the owning tenant's page chain.
pub(crate) struct Page {
    id: u32,
    previous: Option<u32>,
    size: AtomicU32,
    slots: Box<[RwLock<Option<Arc<Entity>>>]>,
}

impl Page {
    fn new(id: u32, previous: Option<u32>, capacity: usize) -> Self {
        Self {
            id,
            previous,
            size: AtomicU32::new(0),
            slots: std::iter::repeat_with(|| RwLock::new(None))
                .take(capacity)
                .collect(),
        }
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }
}

/// A per-archetype view over the shared pool: issues handles, recycles freed
/// ones, and registers records into slots.
pub struct Tenant {
    pool: Arc<ChunkedPool>,
    schema: IdSchema,
    current: RwLock<Arc<Page>>,
    free: Mutex<Vec<u64>>,
    free_capacity: usize,
}

impl Tenant {
    pub fn new(pool: Arc<ChunkedPool>, free_stack_capacity: usize) -> Self {
        let schema = pool.schema();
        let first = pool.new_page(None);
        Self {
            pool,
            schema,
            current: RwLock::new(first),
            free: Mutex::new(Vec::with_capacity(free_stack_capacity)),
            free_capacity: free_stack_capacity,
        }
    }

    /// Issues a handle whose page belongs to this tenant and whose slot is
    /// uniquely assigned.
    ///
    /// Freed handles are re-issued preferentially, flags cleared. Otherwise
    /// the current page's size counter is bumped speculatively; a bump past
    /// capacity is compensated and the caller escalates to the tenant's
    /// write lock to grow the chain by one page.
    pub fn next_id(&self) -> EntityId {
        if let Some(raw) = self.free.lock().pop() {
            return EntityId::from_raw(raw);
        }
        loop {
            let page = self.current.read().clone();
            let slot = page.size.fetch_add(1, Ordering::Relaxed);
            if (slot as usize) < page.capacity() {
                return self.schema.encode(page.id, slot);
            }
            page.size.fetch_sub(1, Ordering::Relaxed);
            let mut current = self.current.write();
            if Arc::ptr_eq(&current, &page) {
                let fresh = self.pool.new_page(Some(page.id));
                let slot = fresh.size.fetch_add(1, Ordering::Relaxed);
                *current = fresh.clone();
                return self.schema.encode(fresh.id, slot);
            }
            // another caller grew the chain first; retry against its page
        }
    }

    /// Retires a handle: the slot is emptied, then the handle is staged for
    /// re-issuance.
    ///
    /// The free stack is bounded; when it is full the handle is leaked into
    /// the pool and will never be recycled. The slot is cleared before the
    /// handle becomes poppable, so a racing `next_id` cannot have its
    /// registration wiped.
    pub fn free_id(&self, id: EntityId) {
        let id = id.base();
        if let Some(page) = self.pool.get_page(self.schema.page_of(id)) {
            *page.slots[self.schema.slot_of(id) as usize].write() = None;
        }
        let mut free = self.free.lock();
        if free.len() >= self.free_capacity {
            warn!(id = id.raw(), "free stack full; handle leaked");
            return;
        }
        free.push(id.raw());
    }

    /// Writes `entity` into the slot identified by `id` and, when given,
    /// installs its component tuple.
    ///
    /// Once `register` returns, any subsequent [ChunkedPool::get_entry] on
    /// the handle observes the stored entity: the slot write happens under
    /// the slot's lock, and the lock release orders it before any later
    /// slot read.
    pub fn register(
        &self,
        id: EntityId,
        entity: Arc<Entity>,
        components: Option<Vec<Arc<dyn Component>>>,
    ) -> Arc<Entity> {
        {
            let mut data = entity.data.write();
            if let Some(components) = components {
                data.components = components.into_boxed_slice();
            }
            data.offset = 0;
        }
        if let Some(page) = self.pool.get_page(self.schema.page_of(id)) {
            *page.slots[self.schema.slot_of(id) as usize].write() = Some(entity.clone());
        }
        entity
    }

    /// A weakly consistent walker over this tenant's pages, oldest first.
    ///
    /// Empty slots are skipped; records registered or retired during the
    /// walk may or may not be observed.
    pub fn entities(&self) -> EntityIter {
        let mut chain: SmallVec<[Arc<Page>; 8]> = SmallVec::new();
        let mut page = Some(self.current.read().clone());
        while let Some(p) = page {
            page = p.previous.and_then(|id| self.pool.get_page(id));
            chain.push(p);
        }
        chain.reverse();
        EntityIter {
            pages: chain,
            page: 0,
            slot: 0,
        }
    }
}

/// Iterator over the live records in a tenant's page chain.
pub struct EntityIter {
    pages: SmallVec<[Arc<Page>; 8]>,
    page: usize,
    slot: usize,
}

impl Iterator for EntityIter {
    type Item = Arc<Entity>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let page = self.pages.get(self.page)?;
            let size = (page.size.load(Ordering::Acquire) as usize).min(page.capacity());
            if self.slot >= size {
                self.page += 1;
                self.slot = 0;
                continue;
            }
            let entry = page.slots[self.slot].read().clone();
            self.slot += 1;
            if let Some(entity) = entry {
                return Some(entity);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashSet;

    fn tenant(page_bits: u32, slot_bits: u32, free_capacity: usize) -> Tenant {
        let schema = IdSchema::new(page_bits, slot_bits).unwrap();
        Tenant::new(Arc::new(ChunkedPool::new(schema)), free_capacity)
    }

    #[test]
    fn serial_ids_are_distinct_across_pages() {
        let tenant = tenant(3, 2, 16);
        let mut seen = HashSet::new();
        for _ in 0..20 {
            let id = tenant.next_id();
            assert!(!id.is_detached());
            assert!(seen.insert(id.raw()), "handle issued twice");
        }
    }

    #[test]
    fn freed_ids_are_recycled_with_flags_cleared() {
        let tenant = tenant(3, 2, 16);
        let a = tenant.next_id();
        let b = tenant.next_id();
        tenant.free_id(a.with_detached());
        let reissued = tenant.next_id();
        assert_eq!(reissued, a);
        assert!(!reissued.is_detached());
        assert_ne!(reissued, b);
    }

    #[test]
    fn free_stack_overflow_leaks_extra_handles() {
        let tenant = tenant(3, 4, 2);
        let ids: Vec<_> = (0..4).map(|_| tenant.next_id()).collect();
        for id in &ids {
            tenant.free_id(*id);
        }
        // capacity 2: only the first two frees were staged
        let recycled: HashSet<u64> = (0..2).map(|_| tenant.next_id().raw()).collect();
        assert_eq!(
            recycled,
            ids[..2].iter().map(|id| id.raw()).collect::<HashSet<_>>()
        );
        let fresh = tenant.next_id();
        assert!(!ids.contains(&fresh));
    }

    #[test]
    #[should_panic(expected = "chunked pool exhausted")]
    fn pool_exhaustion_panics() {
        let tenant = tenant(1, 1, 4);
        for _ in 0..5 {
            tenant.next_id();
        }
    }

    #[test]
    fn concurrent_ids_are_unique() {
        let tenant = tenant(6, 4, 64);
        let mut all = HashSet::new();
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| (0..200).map(|_| tenant.next_id().raw()).collect::<Vec<_>>()))
                .collect();
            for handle in handles {
                for raw in handle.join().unwrap() {
                    assert!(all.insert(raw), "handle issued twice across threads");
                }
            }
        });
    }
}
