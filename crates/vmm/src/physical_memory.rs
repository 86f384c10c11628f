//! Emulated physical memory.
//!
//! This module provides the frame arena the simulated machine runs on: a contiguous byte
//! buffer carved into `PAGE_SIZE` frames, plus one [`Frame`] metadata record per frame. The
//! metadata records own the copy-on-write share counters, so whoever holds the arena holds
//! the reference-count table too.
//!
//! Page tables live inside frames like any other page. An entry is loaded and stored as a
//! little-endian 64-bit word at `index * 8` within its table frame.

use alloc::vec::Vec;
use core::fmt;

use log::trace;

use crate::{
    Frame, FrameFlag, FrameNumber, PhysicalAddress,
    arch::{self, PageEntry},
};

/// Size of a page table entry in bytes.
const ENTRY_SIZE: usize = core::mem::size_of::<u64>();

/// Errors that can occur during physical memory allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// Every frame of the arena is in use.
    OutOfMemory,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => f.write_str("out of physical frames"),
        }
    }
}

impl core::error::Error for AllocError {}

/// Emulated physical memory for the simulated machine.
///
/// Frames are handed out in ascending order and never reused, so the allocator never returns
/// a frame that is already in use and every new frame is zero-filled.
pub struct PhysicalMemory {
    /// The underlying memory buffer.
    memory: Vec<u8>,
    /// Per-frame metadata, indexed by frame number.
    frames: Vec<Frame>,
    /// Next frame the allocator hands out.
    next_free: usize,
}

impl PhysicalMemory {
    /// Creates an arena of `frame_count` zeroed, unallocated frames.
    ///
    /// # Panics
    /// Panics if `frame_count` exceeds [`arch::MAX_PAGES`].
    pub fn new(frame_count: usize) -> Self {
        assert!(
            frame_count <= arch::MAX_PAGES,
            "emulated memory exceeds MAX_PAGES frames"
        );

        let mut frames = Vec::with_capacity(frame_count);
        frames.resize_with(frame_count, Frame::default);

        Self {
            memory: alloc::vec![0u8; frame_count * arch::PAGE_SIZE],
            frames,
            next_free: 0,
        }
    }

    /// Allocates a zeroed data frame.
    pub fn allocate_page(&mut self) -> Result<FrameNumber, AllocError> {
        self.allocate(false)
    }

    /// Allocates a zeroed frame to hold a page table (every entry invalid).
    pub fn allocate_table(&mut self) -> Result<FrameNumber, AllocError> {
        self.allocate(true)
    }

    fn allocate(&mut self, table: bool) -> Result<FrameNumber, AllocError> {
        if self.next_free >= self.frames.len() {
            return Err(AllocError::OutOfMemory);
        }

        let number = FrameNumber::new(self.next_free);
        self.next_free += 1;

        let frame = &mut self.frames[number.as_usize()];
        frame.flags.set(FrameFlag::Allocated);
        if table {
            frame.flags.set(FrameFlag::PageTable);
        }

        trace!(
            "allocated {} frame {}",
            if table { "table" } else { "data" },
            number
        );
        Ok(number)
    }

    /// Returns the index of `frame` in the frame table.
    ///
    /// # Panics
    /// Panics if the frame lies outside the arena.
    pub fn frame_index(&self, frame: FrameNumber) -> usize {
        assert!(
            frame.as_usize() < self.frames.len(),
            "frame number outside emulated memory"
        );
        frame.as_usize()
    }

    /// Returns the metadata for `frame`.
    pub fn frame(&self, frame: FrameNumber) -> &Frame {
        &self.frames[self.frame_index(frame)]
    }

    /// Returns the copy-on-write share count of `frame`.
    pub fn share_count(&self, frame: FrameNumber) -> usize {
        self.frame(frame).share_count()
    }

    /// Returns the bytes of `frame`.
    pub fn page(&self, frame: FrameNumber) -> &[u8] {
        let start = self.frame_index(frame) * arch::PAGE_SIZE;
        &self.memory[start..start + arch::PAGE_SIZE]
    }

    /// Returns the bytes of `frame` for writing.
    pub fn page_mut(&mut self, frame: FrameNumber) -> &mut [u8] {
        let start = self.frame_index(frame) * arch::PAGE_SIZE;
        &mut self.memory[start..start + arch::PAGE_SIZE]
    }

    /// Copies the full contents of `from` into `to`.
    pub fn copy_page(&mut self, from: FrameNumber, to: FrameNumber) {
        let src = self.frame_index(from) * arch::PAGE_SIZE;
        let dst = self.frame_index(to) * arch::PAGE_SIZE;
        self.memory.copy_within(src..src + arch::PAGE_SIZE, dst);
    }

    /// Reads the byte at a physical address.
    pub fn read_byte(&self, addr: PhysicalAddress) -> u8 {
        self.page(addr.frame_number())[addr.page_offset()]
    }

    /// Writes the byte at a physical address.
    pub fn write_byte(&mut self, addr: PhysicalAddress, value: u8) {
        self.page_mut(addr.frame_number())[addr.page_offset()] = value;
    }

    /// Loads entry `index` of the page table held in frame `table`.
    ///
    /// # Panics
    /// Panics if `index >= NUM_PTE_ENTRIES`.
    pub fn load_entry(&self, table: FrameNumber, index: usize) -> PageEntry {
        let offset = Self::entry_offset(index);
        let mut raw = [0u8; ENTRY_SIZE];
        raw.copy_from_slice(&self.page(table)[offset..offset + ENTRY_SIZE]);
        PageEntry::from_u64(u64::from_le_bytes(raw))
    }

    /// Stores entry `index` of the page table held in frame `table`.
    ///
    /// # Panics
    /// Panics if `index >= NUM_PTE_ENTRIES`.
    pub fn store_entry(&mut self, table: FrameNumber, index: usize, entry: PageEntry) {
        let offset = Self::entry_offset(index);
        self.page_mut(table)[offset..offset + ENTRY_SIZE]
            .copy_from_slice(&entry.as_u64().to_le_bytes());
    }

    fn entry_offset(index: usize) -> usize {
        assert!(index < arch::NUM_PTE_ENTRIES, "page table index out of bounds");
        index * ENTRY_SIZE
    }

    /// Returns the total number of frames in the arena.
    pub fn total_frames(&self) -> usize {
        self.frames.len()
    }

    /// Returns the number of frames handed out so far.
    pub fn allocated_frames(&self) -> usize {
        self.next_free
    }

    /// Returns the number of frames still available.
    pub fn free_frames(&self) -> usize {
        self.frames.len() - self.next_free
    }

    /// Returns the number of allocated frames that hold page tables.
    pub fn table_frames(&self) -> usize {
        self.frames[..self.next_free]
            .iter()
            .filter(|frame| frame.flags.test(FrameFlag::PageTable))
            .count()
    }
}
