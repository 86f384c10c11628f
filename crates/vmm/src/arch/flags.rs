//! Page table entry flags for the emulated MMU.

use core::fmt;

/// Page table entry flags.
///
/// Flags occupy the low ten bits of an entry. The layout follows Sv39, with the first
/// software-reserved bit used as the "custom" marker for copy-on-write sharing.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageFlags(u64);

impl PageFlags {
    /// Valid bit (bit 0).
    const VALID: u64 = 1 << 0;

    /// Readable bit (bit 1).
    const READ: u64 = 1 << 1;

    /// Writable bit (bit 2).
    const WRITE: u64 = 1 << 2;

    /// Custom bit (bit 8, first software-reserved bit).
    ///
    /// Set on leaf entries whose frame is shared copy-on-write.
    const CUSTOM: u64 = 1 << 8;

    /// All bits that belong to the flag field.
    pub(super) const MASK: u64 = 0x3FF;

    /// Creates empty page flags (entry not valid).
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Flags for a non-leaf entry: valid, no permissions.
    pub const fn table() -> Self {
        Self(Self::VALID)
    }

    /// Flags for a valid leaf with the given permissions.
    pub const fn leaf(readable: bool, writable: bool) -> Self {
        let mut bits = Self::VALID;
        if readable {
            bits |= Self::READ;
        }
        if writable {
            bits |= Self::WRITE;
        }
        Self(bits)
    }

    /// Creates page flags from a raw value, discarding bits outside the flag field.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw & Self::MASK)
    }

    /// Returns the raw value of these flags.
    pub const fn to_raw(self) -> u64 {
        self.0
    }

    #[inline]
    const fn test(self, bit: u64) -> bool {
        (self.0 & bit) != 0
    }

    #[inline]
    fn assign(&mut self, bit: u64, value: bool) {
        if value {
            self.0 |= bit;
        } else {
            self.0 &= !bit;
        }
    }

    /// Returns whether the valid bit is set.
    pub const fn is_valid(self) -> bool {
        self.test(Self::VALID)
    }

    /// Sets or clears the valid bit.
    pub fn set_valid(&mut self, valid: bool) {
        self.assign(Self::VALID, valid);
    }

    /// Returns whether the readable bit is set.
    pub const fn is_readable(self) -> bool {
        self.test(Self::READ)
    }

    /// Sets or clears the readable bit.
    pub fn set_readable(&mut self, readable: bool) {
        self.assign(Self::READ, readable);
    }

    /// Returns whether the writable bit is set.
    pub const fn is_writable(self) -> bool {
        self.test(Self::WRITE)
    }

    /// Sets or clears the writable bit.
    pub fn set_writable(&mut self, writable: bool) {
        self.assign(Self::WRITE, writable);
    }

    /// Returns whether the custom (copy-on-write shared) bit is set.
    pub const fn is_custom(self) -> bool {
        self.test(Self::CUSTOM)
    }

    /// Sets or clears the custom (copy-on-write shared) bit.
    pub fn set_custom(&mut self, custom: bool) {
        self.assign(Self::CUSTOM, custom);
    }
}

impl Default for PageFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// Formats as `CWRV`, with `-` for each clear bit.
impl fmt::Display for PageFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bit = |set: bool, c: char| if set { c } else { '-' };
        write!(
            f,
            "{}{}{}{}",
            bit(self.is_custom(), 'C'),
            bit(self.is_writable(), 'W'),
            bit(self.is_readable(), 'R'),
            bit(self.is_valid(), 'V'),
        )
    }
}

impl fmt::Debug for PageFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PageFlags({})", self)
    }
}
