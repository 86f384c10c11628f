//! Architecture-independent page table management.
//!
//! This module provides the `PageDirectory` type, which wraps the root `PageTable` of an
//! address space and provides high-level operations for mapping, unmapping and looking up
//! virtual addresses.

use log::trace;

use crate::{
    AllocError, FrameNumber, PhysicalAddress, PhysicalMemory, VirtualAddress,
    arch::{self, PageEntry, PageFlags, PageTable},
};

/// An address space's page table hierarchy, identified by its root table.
///
/// The directory does not own any memory itself; every table lives in [`PhysicalMemory`],
/// which is passed to each operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageDirectory {
    /// The root (level 2) page table for this address space.
    root: PageTable,
}

impl PageDirectory {
    /// Creates a new page directory with an empty root page table.
    pub fn new(memory: &mut PhysicalMemory) -> Result<Self, AllocError> {
        Ok(Self {
            root: PageTable::allocate(memory)?,
        })
    }

    /// Wraps an existing root table.
    pub const fn from_root(root: PageTable) -> Self {
        Self { root }
    }

    /// Returns the root page table.
    pub const fn root(self) -> PageTable {
        self.root
    }

    /// Maps a virtual page to a physical frame with the given flags.
    ///
    /// This function walks the page table hierarchy, allocating intermediate tables
    /// as needed, and sets the leaf entry to map `virt` to `frame`. The valid bit is always
    /// set on the leaf.
    ///
    /// # Panics
    /// Panics if the virtual address is not page-aligned.
    pub fn map(
        self,
        memory: &mut PhysicalMemory,
        virt: VirtualAddress,
        frame: FrameNumber,
        flags: PageFlags,
    ) -> Result<(), AllocError> {
        assert!(
            virt.is_aligned(arch::PAGE_SIZE),
            "virtual address must be page-aligned"
        );

        let table = self.walk_or_create(memory, virt)?;
        let mut new_flags = flags;
        new_flags.set_valid(true);
        table.set_entry(memory, virt.page_index(0), PageEntry::new(frame, new_flags));
        Ok(())
    }

    /// Unmaps a virtual page.
    ///
    /// Clears the leaf entry for `virt` and returns the frame that was mapped, or None if the
    /// address was not mapped. Intermediate tables are left in place.
    ///
    /// Unmapping a copy-on-write alias gives up its share of the frame, so the last remaining
    /// alias claims the frame instead of copying it.
    pub fn unmap(self, memory: &mut PhysicalMemory, virt: VirtualAddress) -> Option<FrameNumber> {
        let table = self.table_at(memory, virt, 0)?;
        let index = virt.page_index(0);
        let entry = table.entry(memory, index);
        let frame = entry.target()?;
        table.update_entry(memory, index, PageEntry::clear);
        if entry.is_custom() {
            let remaining = memory.frame(frame).release_share();
            trace!("unmapped shared frame {frame}, remaining aliases {remaining:?}");
        }
        Some(frame)
    }

    /// Returns the leaf entry for `virt`, or None if an intermediate table is missing or the
    /// leaf is not valid.
    pub fn leaf(self, memory: &PhysicalMemory, virt: VirtualAddress) -> Option<PageEntry> {
        let table = self.table_at(memory, virt, 0)?;
        Some(table.entry(memory, virt.page_index(0))).filter(|entry| entry.is_valid())
    }

    /// Translates a virtual address to the physical address it maps to.
    pub fn translate(self, memory: &PhysicalMemory, virt: VirtualAddress) -> Option<PhysicalAddress> {
        let frame = self.leaf(memory, virt)?.frame();
        Some(frame.start() + virt.page_offset())
    }

    /// Walks the page table hierarchy down to the table at `level` covering `virt`.
    ///
    /// Returns None if any table above `level` is not present.
    ///
    /// # Panics
    /// Panics if `level` is out of range.
    pub fn table_at(
        self,
        memory: &PhysicalMemory,
        virt: VirtualAddress,
        level: usize,
    ) -> Option<PageTable> {
        assert!(level < arch::PAGE_TABLE_LEVELS, "level out of range (0-2)");

        let mut table = self.root;
        for current in (level + 1..arch::PAGE_TABLE_LEVELS).rev() {
            let entry = table.entry(memory, virt.page_index(current));
            table = PageTable::from_frame(entry.target()?);
        }
        Some(table)
    }

    /// Walks the page table hierarchy, creating intermediate tables as needed.
    ///
    /// Returns the level 0 table covering `virt`.
    fn walk_or_create(
        self,
        memory: &mut PhysicalMemory,
        virt: VirtualAddress,
    ) -> Result<PageTable, AllocError> {
        let mut table = self.root;

        for level in (1..arch::PAGE_TABLE_LEVELS).rev() {
            let index = virt.page_index(level);
            let entry = table.entry(memory, index);

            table = match entry.target() {
                Some(next) => PageTable::from_frame(next),
                None => {
                    let next = PageTable::allocate(memory)?;
                    table.set_entry(memory, index, PageEntry::new(next.frame(), PageFlags::table()));
                    next
                }
            };
        }

        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (PhysicalMemory, PageDirectory) {
        let mut memory = PhysicalMemory::new(64);
        let dir = PageDirectory::new(&mut memory).unwrap();
        (memory, dir)
    }

    #[test]
    fn map_single_page() {
        let (mut memory, dir) = setup();
        let virt = VirtualAddress::new(0x1000);
        let frame = memory.allocate_page().unwrap();

        dir.map(&mut memory, virt, frame, PageFlags::leaf(true, true))
            .unwrap();

        let leaf = dir.leaf(&memory, virt).unwrap();
        assert_eq!(leaf.frame(), frame);
        assert!(leaf.is_writable());
        assert_eq!(
            dir.translate(&memory, virt + 0x10),
            Some(frame.start() + 0x10)
        );
        // Root plus one L1 and one L0 table.
        assert_eq!(memory.table_frames(), 3);
    }

    #[test]
    fn neighbouring_pages_share_intermediate_tables() {
        let (mut memory, dir) = setup();
        for i in 0..4 {
            let frame = memory.allocate_page().unwrap();
            dir.map(
                &mut memory,
                VirtualAddress::new(i * arch::PAGE_SIZE),
                frame,
                PageFlags::leaf(true, false),
            )
            .unwrap();
        }

        assert_eq!(memory.table_frames(), 3);
        let l0 = dir.table_at(&memory, VirtualAddress::new(0), 0).unwrap();
        assert_eq!(l0.valid_entries(&memory).count(), 4);
    }

    #[test]
    fn unmap_mapped_page() {
        let (mut memory, dir) = setup();
        let virt = VirtualAddress::new(0x0040_0000);
        let frame = memory.allocate_page().unwrap();
        dir.map(&mut memory, virt, frame, PageFlags::leaf(true, true))
            .unwrap();

        assert_eq!(dir.unmap(&mut memory, virt), Some(frame));
        assert_eq!(dir.leaf(&memory, virt), None);
        assert_eq!(dir.unmap(&mut memory, virt), None);
    }

    #[test]
    fn unmap_of_shared_leaf_releases_its_share() {
        let (mut memory, dir) = setup();
        let virt = VirtualAddress::new(0x1000);
        let frame = memory.allocate_page().unwrap();
        dir.map(&mut memory, virt, frame, PageFlags::leaf(true, true))
            .unwrap();
        let child =
            PageDirectory::from_root(crate::fork_copy_on_write(&mut memory, dir.root()).unwrap());
        assert_eq!(memory.share_count(frame), 1);

        assert_eq!(child.unmap(&mut memory, virt), Some(frame));
        assert_eq!(memory.share_count(frame), 0);
        assert!(dir.leaf(&memory, virt).unwrap().is_custom());

        // The owner's share is not counted, so unmapping it as well leaves the count at zero.
        assert_eq!(dir.unmap(&mut memory, virt), Some(frame));
        assert_eq!(memory.share_count(frame), 0);
    }

    #[test]
    fn lookup_of_unmapped_address() {
        let (memory, dir) = setup();
        let virt = VirtualAddress::new(0x1000);
        assert_eq!(dir.table_at(&memory, virt, 0), None);
        assert_eq!(dir.table_at(&memory, virt, 2), Some(dir.root()));
        assert_eq!(dir.translate(&memory, virt), None);
    }

    #[test]
    #[should_panic(expected = "virtual address must be page-aligned")]
    fn map_rejects_unaligned_address() {
        let (mut memory, dir) = setup();
        let frame = memory.allocate_page().unwrap();
        let _ = dir.map(
            &mut memory,
            VirtualAddress::new(0x1001),
            frame,
            PageFlags::leaf(true, true),
        );
    }

    #[test]
    fn map_reports_exhaustion() {
        let mut memory = PhysicalMemory::new(2);
        let dir = PageDirectory::new(&mut memory).unwrap();
        let frame = FrameNumber::new(0);
        assert_eq!(
            dir.map(
                &mut memory,
                VirtualAddress::new(0x1000),
                frame,
                PageFlags::leaf(true, true)
            ),
            Err(AllocError::OutOfMemory)
        );
    }
}
