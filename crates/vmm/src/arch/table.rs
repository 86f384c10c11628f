//! Page table handle for the emulated MMU.

use core::fmt;

use crate::{AllocError, FrameNumber, PhysicalMemory};

use super::{NUM_PTE_ENTRIES, entry::PageEntry};

/// A page table.
///
/// Tables are stored in frames of [`PhysicalMemory`], so a `PageTable` is only the number of
/// the frame holding its `NUM_PTE_ENTRIES` entries. The address space whose entry references
/// the frame owns the table.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct PageTable(FrameNumber);

impl PageTable {
    /// Allocates a new, empty page table.
    ///
    /// All entries are initialized to zero (not valid).
    pub fn allocate(memory: &mut PhysicalMemory) -> Result<Self, AllocError> {
        memory.allocate_table().map(Self)
    }

    /// Treats `frame` as a page table.
    pub const fn from_frame(frame: FrameNumber) -> Self {
        Self(frame)
    }

    /// Returns the frame holding this table.
    pub const fn frame(self) -> FrameNumber {
        self.0
    }

    /// Returns the entry at the given index.
    ///
    /// # Panics
    /// Panics if index >= 512.
    pub fn entry(self, memory: &PhysicalMemory, index: usize) -> PageEntry {
        memory.load_entry(self.0, index)
    }

    /// Overwrites the entry at the given index.
    ///
    /// # Panics
    /// Panics if index >= 512.
    pub fn set_entry(self, memory: &mut PhysicalMemory, index: usize, entry: PageEntry) {
        memory.store_entry(self.0, index, entry);
    }

    /// Applies `f` to the entry at the given index and stores the result.
    pub fn update_entry<R>(
        self,
        memory: &mut PhysicalMemory,
        index: usize,
        f: impl FnOnce(&mut PageEntry) -> R,
    ) -> R {
        let mut entry = self.entry(memory, index);
        let result = f(&mut entry);
        self.set_entry(memory, index, entry);
        result
    }

    /// Iterates over the valid entries of this table together with their indexes.
    pub fn valid_entries(
        self,
        memory: &PhysicalMemory,
    ) -> impl Iterator<Item = (usize, PageEntry)> + '_ {
        (0..NUM_PTE_ENTRIES)
            .map(move |index| (index, self.entry(memory, index)))
            .filter(|(_, entry)| entry.is_valid())
    }

    /// Returns the number of entries in a page table.
    pub const fn len(self) -> usize {
        NUM_PTE_ENTRIES
    }
}

impl fmt::Debug for PageTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PageTable({})", self.0)
    }
}
