//! The emulated MMU.
//!
//! The simulated machine uses an Sv39-style layout so that page tables look like the ones a
//! real RISC-V kernel would build:
//! - 39-bit virtual addresses, sign-extended to 64 bits
//! - 3 levels of page tables (level 2 is the root, level 0 holds leaves)
//! - 9-bit indexes (512 entries per table, 8 bytes each, one table per frame)
//! - 12-bit page offset (4 KiB pages)

mod entry;
mod flags;
mod table;

pub use entry::PageEntry;
pub use flags::PageFlags;
pub use table::PageTable;

/// Maximum number of bits in a physical address (44-bit PPN plus the page offset).
pub const MAX_PHYSICAL_BITS: usize = 56;

/// Maximum number of bits in a virtual address.
pub const MAX_VIRTUAL_BITS: usize = 39;

/// Page size in bytes (4 KiB = 2^12).
pub const PAGE_SIZE: usize = 4096;

/// Number of bits in the page offset.
pub const PAGE_SHIFT: usize = 12;

/// Number of page table levels (3 levels: level 2, 1, 0).
pub const PAGE_TABLE_LEVELS: usize = 3;

/// Level of the root table.
pub const ROOT_LEVEL: usize = PAGE_TABLE_LEVELS - 1;

/// Number of bits in a per-level table index.
pub const INDEX_BITS: usize = 9;

/// Number of entries in every page table.
pub const NUM_PTE_ENTRIES: usize = 1 << INDEX_BITS;

/// Upper bound on the number of frames an emulated machine may have.
///
/// The share counters are sized per frame, so this also bounds the reference-count table.
pub const MAX_PAGES: usize = 1 << 16;

/// Returns the page table index for a given virtual address at the specified level.
///
/// - Level 0: Bits 12-20 (leaf table)
/// - Level 1: Bits 21-29
/// - Level 2: Bits 30-38 (root)
#[inline]
pub const fn page_index(address: usize, level: usize) -> usize {
    assert!(level < PAGE_TABLE_LEVELS, "level out of range (0-2)");
    let shift = PAGE_SHIFT + level * INDEX_BITS;
    (address >> shift) & (NUM_PTE_ENTRIES - 1)
}

/// Builds the page-aligned virtual address selected by one index per level.
#[inline]
pub const fn address_from_indices(l2: usize, l1: usize, l0: usize) -> usize {
    assert!(
        l2 < NUM_PTE_ENTRIES && l1 < NUM_PTE_ENTRIES && l0 < NUM_PTE_ENTRIES,
        "page table index out of bounds"
    );
    let addr = (l2 << (PAGE_SHIFT + 2 * INDEX_BITS))
        | (l1 << (PAGE_SHIFT + INDEX_BITS))
        | (l0 << PAGE_SHIFT);
    canonicalize_virtual(addr)
}

/// Validates a physical address.
#[inline]
pub const fn validate_physical(addr: usize) -> bool {
    addr >> MAX_PHYSICAL_BITS == 0
}

/// Validates a virtual address.
///
/// Virtual addresses must be canonical (bits 39-63 must be sign-extended from bit 38).
#[inline]
pub const fn validate_virtual(addr: usize) -> bool {
    canonicalize_virtual(addr) == addr
}

/// Canonicalizes a virtual address by sign-extending bit 38 to bits 39-63.
#[inline]
pub const fn canonicalize_virtual(addr: usize) -> usize {
    let low_mask = (1usize << MAX_VIRTUAL_BITS) - 1;
    if (addr >> (MAX_VIRTUAL_BITS - 1)) & 1 != 0 {
        addr | !low_mask
    } else {
        addr & low_mask
    }
}
