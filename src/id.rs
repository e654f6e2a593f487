//! The 64-bit handle bit schema.
//!
//! ```text
//! <------------------------------- 64 ------------------------------>
//! <1><-3-><----- 14 -----><------ 16 ------><---- 14 ----><--- 16 --->
//! sign/flags  page index      slot index      page index   slot index
//!             <----------- high copy -------><-------- low copy ----->
//! ```
//!
//! The `(page, slot)` packing is written twice, once shifted above the low
//! copy and once in the low bits; decoding always reads the low copy. Bit 63
//! stays clear so a handle is non-negative when interpreted as signed; bit 62
//! is the detached flag.

use crate::config::{
    ConfigError, DEFAULT_NUM_OF_PAGES_BIT_SIZE, DEFAULT_PAGE_CAPACITY_BIT_SIZE,
};
use std::fmt;

/// Number of flag bits carried in a handle.
pub const FLAG_BITS: u32 = 3;

const FLAGS_SHIFT: u32 = 60;
const FLAGS_MASK: u64 = 0b111 << FLAGS_SHIFT;
pub(crate) const DETACHED_BIT: u64 = 1 << 62;

/// An opaque handle naming an entity's storage location: page index, in-page
/// slot, and flags packed into 64 bits.
///
/// Handles are unique while the entity is live; after a free the same
/// `(page, slot)` pair may be re-issued with flags cleared.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct EntityId(u64);

impl EntityId {
    pub(crate) const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw 64-bit representation.
    pub fn raw(self) -> u64 {
        self.0
    }

    /// Returns the flag bits (bits 62-60).
    pub fn flags(self) -> u64 {
        (self.0 & FLAGS_MASK) >> FLAGS_SHIFT
    }

    /// Returns `true` if the detached flag is set.
    pub fn is_detached(self) -> bool {
        self.0 & DETACHED_BIT != 0
    }

    /// Returns this handle with the detached flag set.
    pub fn with_detached(self) -> Self {
        Self(self.0 | DETACHED_BIT)
    }

    /// Returns this handle with all flags cleared.
    pub(crate) fn base(self) -> Self {
        Self(self.0 & !FLAGS_MASK)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({:#x})", self.0)
    }
}

/// The bit layout used to pack and unpack [EntityId] handles.
///
/// A schema is a pure value; the pool and every tenant carry a copy of the
/// one their [PoolConfig](crate::config::PoolConfig) validated.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct IdSchema {
    page_bits: u32,
    slot_bits: u32,
    page_mask: u64,
    slot_mask: u64,
}

impl IdSchema {
    /// The known-valid default layout: 14 page bits, 16 slot bits.
    pub const DEFAULT: IdSchema =
        IdSchema::unchecked(DEFAULT_NUM_OF_PAGES_BIT_SIZE, DEFAULT_PAGE_CAPACITY_BIT_SIZE);

    const fn unchecked(page_bits: u32, slot_bits: u32) -> Self {
        Self {
            page_bits,
            slot_bits,
            page_mask: (1 << page_bits) - 1,
            slot_mask: (1 << slot_bits) - 1,
        }
    }

    /// Validates a bit layout.
    ///
    /// The doubled `(page, slot)` packing plus the flag bits and the reserved
    /// sign bit must fit 64 bits: `2 * (page_bits + slot_bits) + 3 <= 63`.
    pub fn new(page_bits: u32, slot_bits: u32) -> Result<Self, ConfigError> {
        if page_bits == 0 || slot_bits == 0 {
            return Err(ConfigError::EmptyField {
                page_bits,
                slot_bits,
            });
        }
        if 2 * (page_bits + slot_bits) + FLAG_BITS > 63 {
            return Err(ConfigError::BitLayout {
                page_bits,
                slot_bits,
            });
        }
        Ok(Self::unchecked(page_bits, slot_bits))
    }

    /// Maximum number of pages addressable under this schema.
    pub fn num_of_pages(self) -> usize {
        1 << self.page_bits
    }

    /// Number of slots per page under this schema.
    pub fn page_capacity(self) -> usize {
        1 << self.slot_bits
    }

    /// Packs `(page, slot)` with flags cleared.
    pub fn encode(self, page: u32, slot: u32) -> EntityId {
        self.encode_with_flags(page, slot, 0)
    }

    /// Packs `(page, slot, flags)` into a handle.
    pub fn encode_with_flags(self, page: u32, slot: u32, flags: u64) -> EntityId {
        let base = ((page as u64 & self.page_mask) << self.slot_bits) | (slot as u64 & self.slot_mask);
        EntityId(((flags << FLAGS_SHIFT) & FLAGS_MASK) | (base << (self.page_bits + self.slot_bits)) | base)
    }

    /// Extracts the page index from a handle.
    pub fn page_of(self, id: EntityId) -> u32 {
        ((id.0 >> self.slot_bits) & self.page_mask) as u32
    }

    /// Extracts the in-page slot index from a handle.
    pub fn slot_of(self, id: EntityId) -> u32 {
        (id.0 & self.slot_mask) as u32
    }

    /// Extracts the flag bits from a handle.
    pub fn flags_of(self, id: EntityId) -> u64 {
        id.flags()
    }
}
