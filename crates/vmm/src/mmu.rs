//! The simulated memory-management unit.
//!
//! [`Mmu`] ties the pieces together: it owns the emulated physical memory (and with it the
//! share counters), tracks which address space is current, exposes the fork entry points,
//! and performs simulated loads and stores that raise and dispatch page faults the way a
//! trap handler would.

use core::fmt;

use log::warn;

use crate::{
    AllocError, FrameNumber, PageDirectory, PhysicalAddress, PhysicalMemory, VirtualAddress,
    arch::{PageEntry, PageFlags, PageTable},
    dump::TableDump,
    fault::{self, FaultError, FaultResolution},
    fork,
};

/// Errors raised by simulated memory accesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessError {
    /// No valid leaf maps the address.
    Unmapped(VirtualAddress),
    /// The mapping does not permit the access and no fault handler resolved it.
    Protection(VirtualAddress),
    /// A copy-on-write fault needed a frame and none was left.
    OutOfMemory,
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unmapped(virt) => write!(f, "{virt} is not mapped"),
            Self::Protection(virt) => write!(f, "protection fault at {virt}"),
            Self::OutOfMemory => f.write_str("out of physical frames"),
        }
    }
}

impl core::error::Error for AccessError {}

/// Tally of the write faults dispatched through an [`Mmu`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FaultCounters {
    /// Faults resolved by giving the faulting address space a private copy.
    pub copied: usize,
    /// Faults resolved by the last alias taking the frame over in place.
    pub claimed: usize,
    /// Faults the handler did not resolve.
    pub unresolved: usize,
}

/// A simulated machine: physical memory plus the current address space.
pub struct Mmu {
    memory: PhysicalMemory,
    current: PageDirectory,
    faults: FaultCounters,
}

impl Mmu {
    /// Creates a machine with `frames` frames of physical memory and an empty current
    /// address space.
    ///
    /// # Panics
    /// Panics if `frames` exceeds [`crate::arch::MAX_PAGES`].
    pub fn new(frames: usize) -> Result<Self, AllocError> {
        let mut memory = PhysicalMemory::new(frames);
        let current = PageDirectory::new(&mut memory)?;
        Ok(Self {
            memory,
            current,
            faults: FaultCounters::default(),
        })
    }

    /// Returns the root page table of the current address space.
    pub fn root_page_table(&self) -> PageTable {
        self.current.root()
    }

    /// Makes the address space rooted at `root` current.
    pub fn activate(&mut self, root: PageTable) {
        self.current = PageDirectory::from_root(root);
    }

    pub fn memory(&self) -> &PhysicalMemory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut PhysicalMemory {
        &mut self.memory
    }

    pub fn fault_counters(&self) -> FaultCounters {
        self.faults
    }

    /// Returns the copy-on-write share count of `frame`.
    pub fn share_count(&self, frame: FrameNumber) -> usize {
        self.memory.share_count(frame)
    }

    /// Allocates a zeroed frame and maps it at `virt` in the current address space.
    pub fn map_page(
        &mut self,
        virt: VirtualAddress,
        flags: PageFlags,
    ) -> Result<FrameNumber, AllocError> {
        let frame = self.memory.allocate_page()?;
        self.map(virt, frame, flags)?;
        Ok(frame)
    }

    /// Maps `virt` to `frame` in the current address space.
    pub fn map(
        &mut self,
        virt: VirtualAddress,
        frame: FrameNumber,
        flags: PageFlags,
    ) -> Result<(), AllocError> {
        self.current.map(&mut self.memory, virt, frame, flags)
    }

    /// Removes the mapping of `virt` from the current address space.
    pub fn unmap(&mut self, virt: VirtualAddress) -> Option<FrameNumber> {
        self.current.unmap(&mut self.memory, virt)
    }

    /// Translates `virt` through the current address space.
    pub fn translate(&self, virt: VirtualAddress) -> Option<PhysicalAddress> {
        self.current.translate(&self.memory, virt)
    }

    /// Returns the valid leaf mapping `virt` in the address space rooted at `root`.
    pub fn entry(&self, root: PageTable, virt: VirtualAddress) -> Option<PageEntry> {
        PageDirectory::from_root(root).leaf(&self.memory, virt)
    }

    /// Eagerly duplicates the current address space and returns the child's root table.
    pub fn fork_copy(&mut self) -> Result<PageTable, AllocError> {
        fork::fork_copy(&mut self.memory, self.current.root())
    }

    /// Duplicates the current address space copy-on-write and returns the child's root table.
    pub fn fork_copy_on_write(&mut self) -> Result<PageTable, AllocError> {
        fork::fork_copy_on_write(&mut self.memory, self.current.root())
    }

    /// Resolves a write fault on `virt` against the level `level` table `table`.
    ///
    /// See [`fault::page_fault_handler`].
    pub fn page_fault_handler(
        &mut self,
        virt: VirtualAddress,
        level: usize,
        table: PageTable,
    ) -> Result<FaultResolution, FaultError> {
        let result = fault::page_fault_handler(&mut self.memory, virt, level, table);
        match result {
            Ok(FaultResolution::Copied { .. }) => self.faults.copied += 1,
            Ok(FaultResolution::Claimed(_)) => self.faults.claimed += 1,
            Err(_) => self.faults.unresolved += 1,
        }
        result
    }

    /// Returns the displayable dump of the address space rooted at `root`.
    pub fn dump(&self, root: PageTable) -> TableDump<'_> {
        TableDump::new(&self.memory, root)
    }

    /// Looks up the level 0 table and leaf entry for `virt` in the current address space.
    fn leaf_slot(&self, virt: VirtualAddress) -> Result<(PageTable, PageEntry), AccessError> {
        let table = self
            .current
            .table_at(&self.memory, virt, 0)
            .ok_or(AccessError::Unmapped(virt))?;
        let entry = table.entry(&self.memory, virt.page_index(0));
        if !entry.is_valid() {
            return Err(AccessError::Unmapped(virt));
        }
        Ok((table, entry))
    }

    /// Loads one byte through the current address space.
    pub fn load(&self, virt: VirtualAddress) -> Result<u8, AccessError> {
        let (_, entry) = self.leaf_slot(virt)?;
        if !entry.is_readable() {
            return Err(AccessError::Protection(virt));
        }
        Ok(self.memory.read_byte(entry.frame().start() + virt.page_offset()))
    }

    /// Stores one byte through the current address space.
    ///
    /// A store to a valid leaf that is not writable raises a page fault. If the handler
    /// resolves it, the store is retried against the updated entry.
    pub fn store(&mut self, virt: VirtualAddress, value: u8) -> Result<(), AccessError> {
        let (table, mut entry) = self.leaf_slot(virt)?;

        if !entry.is_writable() {
            match self.page_fault_handler(virt, 0, table) {
                Ok(_) => entry = table.entry(&self.memory, virt.page_index(0)),
                Err(FaultError::OutOfMemory) => return Err(AccessError::OutOfMemory),
                Err(error) => {
                    warn!("{virt}: unresolved write fault: {error}");
                    return Err(AccessError::Protection(virt));
                }
            }
        }

        self.memory
            .write_byte(entry.frame().start() + virt.page_offset(), value);
        Ok(())
    }

    /// Loads `buf.len()` bytes starting at `virt`.
    ///
    /// A range running off the end of the canonical range fails with
    /// [`AccessError::Unmapped`] for `virt`.
    pub fn read(&self, virt: VirtualAddress, buf: &mut [u8]) -> Result<(), AccessError> {
        for (offset, byte) in buf.iter_mut().enumerate() {
            let addr = virt.checked_add(offset).ok_or(AccessError::Unmapped(virt))?;
            *byte = self.load(addr)?;
        }
        Ok(())
    }

    /// Stores `data` starting at `virt`, faulting pages in as needed.
    pub fn write(&mut self, virt: VirtualAddress, data: &[u8]) -> Result<(), AccessError> {
        for (offset, &byte) in data.iter().enumerate() {
            let addr = virt.checked_add(offset).ok_or(AccessError::Unmapped(virt))?;
            self.store(addr, byte)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::{self, PAGE_SIZE};

    const PAGE: VirtualAddress = VirtualAddress::new(0x1000);

    fn setup() -> Mmu {
        Mmu::new(64).unwrap()
    }

    fn page_bytes(mmu: &Mmu, virt: VirtualAddress) -> [u8; PAGE_SIZE] {
        let mut buf = [0u8; PAGE_SIZE];
        mmu.read(virt, &mut buf).unwrap();
        buf
    }

    #[test]
    fn end_to_end_copy_on_write() {
        let mut mmu = setup();
        let original = mmu.map_page(PAGE, PageFlags::leaf(true, true)).unwrap();
        mmu.write(PAGE, &[0xAA; PAGE_SIZE]).unwrap();

        let parent = mmu.root_page_table();
        let child = mmu.fork_copy_on_write().unwrap();
        assert_eq!(mmu.share_count(original), 1);

        // Parent writes: still shared, so it splits off onto a private frame.
        mmu.write(PAGE, &[0xBB; PAGE_SIZE]).unwrap();
        let parent_leaf = mmu.entry(parent, PAGE).unwrap();
        assert_ne!(parent_leaf.frame(), original);
        assert!(parent_leaf.is_writable());
        assert_eq!(mmu.share_count(original), 0);

        // Child still sees the original content and is the last alias.
        mmu.activate(child);
        assert_eq!(page_bytes(&mmu, PAGE), [0xAA; PAGE_SIZE]);
        let allocated = mmu.memory().allocated_frames();

        mmu.write(PAGE, &[0xCC; PAGE_SIZE]).unwrap();

        let child_leaf = mmu.entry(child, PAGE).unwrap();
        assert_eq!(child_leaf.frame(), original);
        assert!(child_leaf.is_writable());
        assert!(!child_leaf.is_custom());
        assert_eq!(mmu.memory().allocated_frames(), allocated);
        assert_eq!(page_bytes(&mmu, PAGE), [0xCC; PAGE_SIZE]);

        mmu.activate(parent);
        assert_eq!(page_bytes(&mmu, PAGE), [0xBB; PAGE_SIZE]);
        assert_eq!(
            mmu.fault_counters(),
            FaultCounters {
                copied: 1,
                claimed: 1,
                unresolved: 0
            }
        );
    }

    #[test]
    fn eager_fork_isolates_both_directions() {
        let mut mmu = setup();
        mmu.map_page(PAGE, PageFlags::leaf(true, true)).unwrap();
        mmu.write(PAGE, b"parent").unwrap();

        let parent = mmu.root_page_table();
        let child = mmu.fork_copy().unwrap();

        mmu.write(PAGE, b"PARENT").unwrap();
        mmu.activate(child);
        let mut buf = [0u8; 6];
        mmu.read(PAGE, &mut buf).unwrap();
        assert_eq!(&buf, b"parent");

        mmu.write(PAGE, b"child!").unwrap();
        mmu.activate(parent);
        mmu.read(PAGE, &mut buf).unwrap();
        assert_eq!(&buf, b"PARENT");
        assert_eq!(mmu.fault_counters(), FaultCounters::default());
    }

    #[test]
    fn read_only_sharing_never_faults_on_reads() {
        let mut mmu = setup();
        let frame = mmu.map_page(PAGE, PageFlags::leaf(true, false)).unwrap();
        mmu.memory_mut().page_mut(frame)[0] = 0x5A;

        let child = mmu.fork_copy_on_write().unwrap();
        assert_eq!(mmu.load(PAGE), Ok(0x5A));
        mmu.activate(child);
        assert_eq!(mmu.load(PAGE), Ok(0x5A));

        assert_eq!(mmu.share_count(frame), 0);
        assert_eq!(mmu.fault_counters(), FaultCounters::default());
    }

    #[test]
    fn store_to_read_only_page_is_a_protection_fault() {
        let mut mmu = setup();
        mmu.map_page(PAGE, PageFlags::leaf(true, false)).unwrap();

        assert_eq!(mmu.store(PAGE, 1), Err(AccessError::Protection(PAGE)));
        assert_eq!(mmu.load(PAGE), Ok(0));
        assert_eq!(mmu.fault_counters().unresolved, 1);
    }

    #[test]
    fn unmapped_accesses() {
        let mut mmu = setup();
        assert_eq!(mmu.load(PAGE), Err(AccessError::Unmapped(PAGE)));
        mmu.map_page(PAGE, PageFlags::leaf(true, true)).unwrap();
        let next = PAGE + PAGE_SIZE;
        assert_eq!(mmu.store(next, 1), Err(AccessError::Unmapped(next)));

        assert!(mmu.unmap(PAGE).is_some());
        assert_eq!(mmu.translate(PAGE), None);
    }

    #[test]
    fn access_past_the_canonical_range_is_unmapped() {
        let mut mmu = setup();
        let last_page = VirtualAddress::new(arch::address_from_indices(255, 511, 511));
        mmu.map_page(last_page, PageFlags::leaf(true, true)).unwrap();
        let last_byte = last_page + (PAGE_SIZE - 1);

        assert_eq!(mmu.write(last_byte, &[1, 2]), Err(AccessError::Unmapped(last_byte)));
        let mut buf = [0u8; 2];
        assert_eq!(mmu.read(last_byte, &mut buf), Err(AccessError::Unmapped(last_byte)));
        assert_eq!(mmu.load(last_byte), Ok(1));
    }

    #[test]
    fn unmapping_a_shared_alias_lets_the_other_claim_in_place() {
        let mut mmu = setup();
        let original = mmu.map_page(PAGE, PageFlags::leaf(true, true)).unwrap();
        mmu.write(PAGE, &[0xAA; 8]).unwrap();
        let parent = mmu.root_page_table();
        let child = mmu.fork_copy_on_write().unwrap();

        mmu.activate(child);
        assert_eq!(mmu.unmap(PAGE), Some(original));
        assert_eq!(mmu.share_count(original), 0);

        mmu.activate(parent);
        let allocated = mmu.memory().allocated_frames();
        let table = mmu.current.table_at(mmu.memory(), PAGE, 0).unwrap();
        assert_eq!(
            mmu.page_fault_handler(PAGE, 0, table),
            Ok(FaultResolution::Claimed(original))
        );
        mmu.store(PAGE, 1).unwrap();
        assert_eq!(mmu.entry(parent, PAGE).unwrap().frame(), original);
        assert_eq!(mmu.memory().allocated_frames(), allocated);
        assert_eq!(mmu.load(PAGE + 1), Ok(0xAA));
    }

    #[test]
    fn load_requires_read_permission() {
        let mut mmu = setup();
        mmu.map_page(PAGE, PageFlags::leaf(false, true)).unwrap();
        assert_eq!(mmu.load(PAGE), Err(AccessError::Protection(PAGE)));
        assert_eq!(mmu.store(PAGE, 3), Ok(()));
    }

    #[test]
    fn fault_without_frames_reports_out_of_memory() {
        // root + L1 + L0 + page, then the child's three tables.
        let mut mmu = Mmu::new(7).unwrap();
        mmu.map_page(PAGE, PageFlags::leaf(true, true)).unwrap();
        mmu.fork_copy_on_write().unwrap();

        assert_eq!(mmu.store(PAGE, 1), Err(AccessError::OutOfMemory));
        assert!(mmu.entry(mmu.root_page_table(), PAGE).unwrap().is_custom());
    }

    #[test]
    fn fork_spans_sparse_address_space() {
        let mut mmu = Mmu::new(128).unwrap();
        let addresses = [
            arch::address_from_indices(0, 0, 1),
            arch::address_from_indices(0, 200, 17),
            arch::address_from_indices(511, 511, 511),
        ];
        for (n, &addr) in addresses.iter().enumerate() {
            let virt = VirtualAddress::new(addr);
            mmu.map_page(virt, PageFlags::leaf(true, true)).unwrap();
            mmu.store(virt, n as u8 + 1).unwrap();
        }

        let child = mmu.fork_copy_on_write().unwrap();
        mmu.activate(child);

        for (n, &addr) in addresses.iter().enumerate() {
            let virt = VirtualAddress::new(addr);
            assert_eq!(mmu.load(virt), Ok(n as u8 + 1));
            assert!(mmu.entry(child, virt).unwrap().is_custom());
        }
    }

    #[test]
    fn dump_of_current_space() {
        let mut mmu = setup();
        mmu.map_page(PAGE, PageFlags::leaf(true, true)).unwrap();
        mmu.fork_copy_on_write().unwrap();

        let dump = mmu.dump(mmu.root_page_table()).to_string();
        assert!(dump.ends_with("Flags: C-RV 0x1000\n"));
    }
}
