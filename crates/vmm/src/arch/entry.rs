//! Page table entry for the emulated MMU.

use core::fmt;

use crate::FrameNumber;

use super::flags::PageFlags;

/// A single page table entry.
///
/// The entry format:
/// - Bits 0-9: Flags (see [`PageFlags`])
/// - Bits 10-53: Physical frame number (44 bits)
/// - Bits 54-63: Reserved (must be zero)
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct PageEntry(u64);

impl PageEntry {
    /// Offset of the frame number field.
    const FRAME_SHIFT: u32 = 10;

    /// Frame number mask, applied after shifting.
    const FRAME_MASK: u64 = (1 << 44) - 1;

    /// Creates a new page table entry pointing at `frame`.
    pub fn new(frame: FrameNumber, flags: PageFlags) -> Self {
        let mut entry = Self(flags.to_raw());
        entry.set_frame(frame);
        entry
    }

    /// Returns the frame number stored in this entry.
    ///
    /// The field is returned regardless of the valid bit.
    pub fn frame(self) -> FrameNumber {
        FrameNumber::new(((self.0 >> Self::FRAME_SHIFT) & Self::FRAME_MASK) as usize)
    }

    /// Repoints this entry at `frame`, preserving the flags.
    pub fn set_frame(&mut self, frame: FrameNumber) {
        let raw = frame.as_usize() as u64;
        assert!(raw <= Self::FRAME_MASK, "frame number exceeds the PPN field");
        self.0 = (self.0 & PageFlags::MASK) | (raw << Self::FRAME_SHIFT);
    }

    /// Returns the frame this entry designates, or None if the entry is not valid.
    pub fn target(self) -> Option<FrameNumber> {
        self.is_valid().then(|| self.frame())
    }

    /// Returns the flags for this entry.
    pub fn flags(self) -> PageFlags {
        PageFlags::from_raw(self.0)
    }

    /// Sets the flags for this entry, preserving the frame number.
    pub fn set_flags(&mut self, flags: PageFlags) {
        self.0 = (self.0 & !PageFlags::MASK) | flags.to_raw();
    }

    fn update(&mut self, f: impl FnOnce(&mut PageFlags)) {
        let mut flags = self.flags();
        f(&mut flags);
        self.set_flags(flags);
    }

    pub fn is_valid(self) -> bool {
        self.flags().is_valid()
    }

    pub fn set_valid(&mut self, valid: bool) {
        self.update(|flags| flags.set_valid(valid));
    }

    pub fn is_readable(self) -> bool {
        self.flags().is_readable()
    }

    pub fn set_readable(&mut self, readable: bool) {
        self.update(|flags| flags.set_readable(readable));
    }

    pub fn is_writable(self) -> bool {
        self.flags().is_writable()
    }

    pub fn set_writable(&mut self, writable: bool) {
        self.update(|flags| flags.set_writable(writable));
    }

    /// Returns whether this leaf is marked copy-on-write shared.
    pub fn is_custom(self) -> bool {
        self.flags().is_custom()
    }

    pub fn set_custom(&mut self, custom: bool) {
        self.update(|flags| flags.set_custom(custom));
    }

    /// Marks this leaf as a shared, temporarily read-only alias.
    pub fn share(&mut self) {
        self.update(|flags| {
            flags.set_writable(false);
            flags.set_custom(true);
        });
    }

    /// Makes this leaf privately writable again.
    pub fn unshare(&mut self) {
        self.update(|flags| {
            flags.set_custom(false);
            flags.set_writable(true);
        });
    }

    /// Clears this entry (sets it to zero).
    pub fn clear(&mut self) {
        self.0 = 0;
    }

    /// Returns the raw value of this entry.
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Creates an entry from a raw value.
    pub const fn from_u64(value: u64) -> Self {
        Self(value)
    }
}

impl Default for PageEntry {
    fn default() -> Self {
        Self(0)
    }
}

impl fmt::Display for PageEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PPN: {:#X} Flags: {}", self.frame().as_usize(), self.flags())
    }
}

impl fmt::Debug for PageEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PageEntry({})", self)
    }
}
