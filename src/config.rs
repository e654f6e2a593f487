//! Pool configuration and its validation boundary.

use crate::id::IdSchema;
use thiserror::Error;

/// Default number of page-index bits (16,384 pages).
pub const DEFAULT_NUM_OF_PAGES_BIT_SIZE: u32 = 14;
/// Default number of slot-index bits (65,536 slots per page).
pub const DEFAULT_PAGE_CAPACITY_BIT_SIZE: u32 = 16;
/// Default cap on recycled handles per tenant.
pub const DEFAULT_FREE_STACK_CAPACITY: usize = 1 << 10;
/// Default cap on distinct component (and state) types.
pub const DEFAULT_COMPONENT_INDEX_CAPACITY: u32 = 1 << 10;

/// Options recognised by [World](crate::world::World) construction.
///
/// All capacity knobs are fixed for the lifetime of the world; exceeding
/// `num_of_pages_bit_size` or `component_index_capacity` at runtime is fatal.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum pages per pool as a power of two.
    pub num_of_pages_bit_size: u32,
    /// Slots per page as a power of two.
    pub page_capacity_bit_size: u32,
    /// Cap on recycled handles per tenant; overflowing handles are leaked.
    pub free_stack_capacity: usize,
    /// Maximum distinct component types across the world.
    pub component_index_capacity: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            num_of_pages_bit_size: DEFAULT_NUM_OF_PAGES_BIT_SIZE,
            page_capacity_bit_size: DEFAULT_PAGE_CAPACITY_BIT_SIZE,
            free_stack_capacity: DEFAULT_FREE_STACK_CAPACITY,
            component_index_capacity: DEFAULT_COMPONENT_INDEX_CAPACITY,
        }
    }
}

impl PoolConfig {
    /// Validates the bit layout and returns the id schema it describes.
    pub fn schema(&self) -> Result<IdSchema, ConfigError> {
        IdSchema::new(self.num_of_pages_bit_size, self.page_capacity_bit_size)
    }
}

/// Error returned when a [PoolConfig] does not describe a valid id layout.
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The doubled packing plus flag and sign bits exceeds 64 bits.
    #[error("id bit layout does not fit a 64-bit handle: 2*({page_bits} + {slot_bits}) + flags > 63")]
    BitLayout { page_bits: u32, slot_bits: u32 },
    /// A zero-width page or slot field can address nothing.
    #[error("zero-width id field: page_bits = {page_bits}, slot_bits = {slot_bits}")]
    EmptyField { page_bits: u32, slot_bits: u32 },
}
