//! Address types for physical and virtual memory management.
//!
//! Physical addresses index the emulated frame arena; virtual addresses are what
//! simulated loads and stores, mappings and faults are expressed in.

use core::fmt;
use core::ops::Add;

use crate::{FrameNumber, PageNumber, arch};

/// Macro to define common address type functionality.
macro_rules! impl_address_common {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        pub struct $name(usize);

        impl $name {
            /// Returns the raw address value.
            #[inline]
            pub const fn as_usize(self) -> usize {
                self.0
            }

            /// Checks if the address is aligned to the given alignment.
            ///
            /// # Panics
            ///
            /// Panics if `align` is not a power of two.
            #[inline]
            pub const fn is_aligned(self, align: usize) -> bool {
                assert!(align.is_power_of_two(), "alignment must be a power of two");
                self.0 & (align - 1) == 0
            }

            /// Returns the offset of this address within its page.
            #[inline]
            pub const fn page_offset(self) -> usize {
                self.0 & (arch::PAGE_SIZE - 1)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:#x})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#x}", self.0)
            }
        }

        impl From<usize> for $name {
            #[inline]
            fn from(addr: usize) -> Self {
                Self::new(addr)
            }
        }

        impl Add<usize> for $name {
            type Output = Self;

            #[inline]
            fn add(self, rhs: usize) -> Self::Output {
                Self::new(self.0 + rhs)
            }
        }
    };
}

impl_address_common!(
    PhysicalAddress,
    "A physical memory address.\n\n\
     Physical address `n` is byte `n` of the emulated frame arena."
);

impl PhysicalAddress {
    /// Creates a new physical address.
    ///
    /// # Panics
    ///
    /// Panics if the address exceeds the maximum physical address width.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        assert!(
            arch::validate_physical(addr),
            "physical address exceeds maximum width"
        );
        Self(addr)
    }

    /// Returns the corresponding frame number for this physical address.
    #[inline]
    pub fn frame_number(self) -> FrameNumber {
        FrameNumber::from(self)
    }
}

impl_address_common!(
    VirtualAddress,
    "A virtual memory address.\n\n\
     Virtual addresses are canonical 39-bit addresses. They carry the per-level page\n\
     table indexes used to walk an address space."
);

impl VirtualAddress {
    /// Creates a new virtual address.
    ///
    /// # Panics
    ///
    /// Panics if the address is not canonical.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        assert!(arch::validate_virtual(addr), "address is not canonical");
        Self(addr)
    }

    /// Returns the page table index at the specified level.
    ///
    /// Level 0 is the leaf table, level 2 the root.
    ///
    /// # Panics
    ///
    /// Panics if `level` is out of range.
    #[inline]
    pub const fn page_index(self, level: usize) -> usize {
        arch::page_index(self.0, level)
    }

    /// Gets the corresponding page number for this virtual address.
    #[inline]
    pub fn page_number(self) -> PageNumber {
        PageNumber::from(self)
    }

    /// Offsets the address by `offset` bytes, or returns None if the result overflows or
    /// leaves the canonical range.
    #[inline]
    pub const fn checked_add(self, offset: usize) -> Option<Self> {
        match self.0.checked_add(offset) {
            Some(addr) if arch::validate_virtual(addr) => Some(Self(addr)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod physical_address {
        use super::*;

        #[test]
        fn new_max_valid_address() {
            let max_addr = (1usize << arch::MAX_PHYSICAL_BITS) - 1;
            assert_eq!(PhysicalAddress::new(max_addr).as_usize(), max_addr);
        }

        #[test]
        #[should_panic(expected = "physical address exceeds maximum width")]
        fn new_exceeds_max() {
            PhysicalAddress::new(1usize << arch::MAX_PHYSICAL_BITS);
        }

        #[test]
        fn alignment() {
            let addr = PhysicalAddress::new(arch::PAGE_SIZE * 4 + 0x24);
            assert!(!addr.is_aligned(arch::PAGE_SIZE));
            assert!(addr.is_aligned(4));
            assert_eq!(addr.page_offset(), 0x24);
        }

        #[test]
        fn frame_number() {
            let addr = PhysicalAddress::new(arch::PAGE_SIZE * 7 + 1);
            assert_eq!(addr.frame_number(), FrameNumber::new(7));
        }
    }

    mod virtual_address {
        use super::*;

        #[test]
        #[should_panic(expected = "address is not canonical")]
        fn non_canonical_rejected() {
            VirtualAddress::new(1 << arch::MAX_VIRTUAL_BITS);
        }

        #[test]
        fn page_indices() {
            let addr = VirtualAddress::new((2 << 30) | (9 << 21) | (511 << 12) | 0xFFF);
            assert_eq!(addr.page_index(2), 2);
            assert_eq!(addr.page_index(1), 9);
            assert_eq!(addr.page_index(0), 511);
            assert_eq!(addr.page_offset(), 0xFFF);
        }

        #[test]
        fn offset_arithmetic() {
            let base = VirtualAddress::new(0x4000);
            let addr = base + 0x10;
            assert_eq!(addr.as_usize(), 0x4010);
            assert_eq!(addr.page_number(), PageNumber::new(4));
        }

        #[test]
        fn checked_add_stops_at_the_canonical_hole() {
            let last = VirtualAddress::new((1 << (arch::MAX_VIRTUAL_BITS - 1)) - 1);
            assert_eq!(
                VirtualAddress::new(0x4000).checked_add(0x10),
                Some(VirtualAddress::new(0x4010))
            );
            assert_eq!(last.checked_add(0), Some(last));
            assert_eq!(last.checked_add(1), None);
            assert_eq!(VirtualAddress::new(usize::MAX).checked_add(1), None);
        }
    }
}
