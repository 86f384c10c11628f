//! Copy-on-write page fault resolution.
//!
//! A store to a valid leaf without the write bit traps here. If the leaf is `custom`, the
//! frame behind it is shared with other address spaces:
//! - while other aliases remain (share count above zero), the faulting address space gets a
//!   private copy of the page and leaves the sharing group;
//! - once it is the last alias (share count zero), it takes the frame over in place.
//!
//! Either way the entry ends up valid, writable and not `custom`, so the retried store
//! succeeds. Any other fault is not a copy-on-write fault and is handed back untouched.

use core::fmt;

use log::debug;

use crate::{
    AllocError, FrameNumber, PhysicalMemory, VirtualAddress,
    arch::PageTable,
};

/// How a copy-on-write fault was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultResolution {
    /// Other aliases remained: the entry now points at a private copy of `shared`.
    Copied {
        shared: FrameNumber,
        private: FrameNumber,
    },
    /// This was the last alias: the entry took over the frame in place.
    Claimed(FrameNumber),
}

impl FaultResolution {
    /// Returns the frame the faulting entry points at after resolution.
    pub fn frame(self) -> FrameNumber {
        match self {
            Self::Copied { private, .. } => private,
            Self::Claimed(frame) => frame,
        }
    }
}

/// Faults this handler does not resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultError {
    /// The faulting entry is not valid.
    NotMapped,
    /// The entry is valid but not shared copy-on-write; a genuine protection fault.
    NotCopyOnWrite,
    /// A private copy was needed but no frame was available.
    OutOfMemory,
}

impl From<AllocError> for FaultError {
    fn from(error: AllocError) -> Self {
        match error {
            AllocError::OutOfMemory => Self::OutOfMemory,
        }
    }
}

impl fmt::Display for FaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotMapped => f.write_str("faulting entry is not mapped"),
            Self::NotCopyOnWrite => f.write_str("faulting entry is not copy-on-write"),
            Self::OutOfMemory => f.write_str("out of physical frames for a private copy"),
        }
    }
}

impl core::error::Error for FaultError {}

/// Resolves a write fault on `virt`.
///
/// `table` is the level `level` page table holding the faulting entry. Only leaf faults
/// (level 0) can be copy-on-write faults.
///
/// On error nothing is modified: neither the entry nor any share count.
///
/// # Panics
/// Panics if `level` is not 0.
pub fn page_fault_handler(
    memory: &mut PhysicalMemory,
    virt: VirtualAddress,
    level: usize,
    table: PageTable,
) -> Result<FaultResolution, FaultError> {
    assert_eq!(level, 0, "copy-on-write faults are raised on leaf entries");

    let index = virt.page_index(level);
    let entry = table.entry(memory, index);
    if !entry.is_valid() {
        return Err(FaultError::NotMapped);
    }
    if !entry.is_custom() {
        return Err(FaultError::NotCopyOnWrite);
    }

    let shared = entry.frame();
    if memory.share_count(shared) == 0 {
        table.update_entry(memory, index, |entry| entry.unshare());
        debug!("{virt}: last alias claims frame {shared}");
        return Ok(FaultResolution::Claimed(shared));
    }

    let private = memory.allocate_page()?;
    memory.copy_page(shared, private);
    table.update_entry(memory, index, |entry| {
        entry.set_frame(private);
        entry.unshare();
    });
    let remaining = memory.frame(shared).release_share();
    debug_assert!(remaining.is_some(), "share count of {shared} underflowed");
    let remaining = remaining.unwrap_or_default();

    debug!("{virt}: copied frame {shared} to {private}, {remaining} aliases remain beyond owner");
    Ok(FaultResolution::Copied { shared, private })
}
