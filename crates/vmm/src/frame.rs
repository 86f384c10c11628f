use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Holds metadata for a physical memory frame.
///
/// Besides the allocation state, every frame carries its copy-on-write share count: the
/// number of aliases mapping it beyond the original owner. Zero means the frame is either
/// not shared or uniquely owned again.
pub struct Frame {
    /// Flags identifying the state of this frame.
    pub flags: FrameFlags,
    shares: AtomicUsize,
}

impl Frame {
    /// Returns the number of copy-on-write aliases beyond the owner.
    pub fn share_count(&self) -> usize {
        self.shares.load(Ordering::Acquire)
    }

    /// Records one more alias of this frame, returning the new count.
    pub fn share(&self) -> usize {
        self.shares.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Retires one alias of this frame.
    ///
    /// Returns the remaining count, or None if the frame had no aliases left to retire.
    pub fn release_share(&self) -> Option<usize> {
        self.shares
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            })
            .ok()
            .map(|previous| previous - 1)
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            flags: FrameFlags::new(),
            shares: AtomicUsize::new(0),
        }
    }
}

pub enum FrameFlag {
    /// Frame has been handed out by the allocator.
    Allocated = 1 << 0,
    /// Frame holds a page table rather than data.
    PageTable = 1 << 1,
}

/// Atomic flags for a physical memory frame.
#[derive(Default)]
pub struct FrameFlags(AtomicU64);

impl FrameFlags {
    /// Creates a new `FrameFlags` instance with all flags cleared.
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Sets the given flag non-atomically (by holding a mutable reference).
    pub fn set(&mut self, flag: FrameFlag) {
        let mask = flag as u64;
        *self.0.get_mut() |= mask;
    }

    /// Clears the given flag non-atomically (by holding a mutable reference).
    pub fn clear(&mut self, flag: FrameFlag) {
        let mask = !(flag as u64);
        *self.0.get_mut() &= mask;
    }

    /// Tests if the given flag is set, atomically.
    pub fn test(&self, flag: FrameFlag) -> bool {
        let mask = flag as u64;
        let value = self.0.load(Ordering::Acquire);
        (value & mask) != 0
    }
}
