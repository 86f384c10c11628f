//! Page and frame number types for memory management.
//!
//! A [`FrameNumber`] is what a page table entry stores (the PPN) and what indexes the
//! frame table. A [`PageNumber`] identifies a virtual page; walkers report leaves by it.

use crate::{
    address::{PhysicalAddress, VirtualAddress},
    arch,
};
use core::{fmt, ops::Add};

/// Macro to define common page/frame number functionality.
macro_rules! impl_page_number_common {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        pub struct $name(usize);

        impl $name {
            /// Creates a new page/frame number.
            #[inline]
            pub const fn new(number: usize) -> Self {
                Self(number)
            }

            /// Returns the raw page/frame number.
            #[inline]
            pub const fn as_usize(self) -> usize {
                self.0
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

        impl Add<usize> for $name {
            type Output = Self;

            #[inline]
            fn add(self, rhs: usize) -> Self::Output {
                Self(self.0 + rhs)
            }
        }
    };
}

impl_page_number_common!(
    FrameNumber,
    "A physical frame number (PPN).\n\n\
     Frame numbers are zero-indexed and correspond to PAGE_SIZE-aligned physical addresses."
);

impl FrameNumber {
    /// Returns the physical address at the start of this frame.
    #[inline]
    pub const fn start(self) -> PhysicalAddress {
        PhysicalAddress::new(self.0 * arch::PAGE_SIZE)
    }
}

impl From<PhysicalAddress> for FrameNumber {
    #[inline]
    fn from(addr: PhysicalAddress) -> Self {
        Self::new(addr.as_usize() / arch::PAGE_SIZE)
    }
}

impl_page_number_common!(
    PageNumber,
    "A virtual page number.\n\n\
     Only the low 27 bits (three 9-bit indexes) are meaningful; the start address is\n\
     sign-extended to a canonical virtual address."
);

impl PageNumber {
    /// Builds the page number selected by one table index per level.
    #[inline]
    pub const fn from_indices(l2: usize, l1: usize, l0: usize) -> Self {
        Self((l2 << (2 * arch::INDEX_BITS)) | (l1 << arch::INDEX_BITS) | l0)
    }

    /// Returns the virtual address at the start of this page.
    #[inline]
    pub const fn start(self) -> VirtualAddress {
        let addr = (self.0 << arch::PAGE_SHIFT) & ((1 << arch::MAX_VIRTUAL_BITS) - 1);
        VirtualAddress::new(arch::canonicalize_virtual(addr))
    }
}

impl From<VirtualAddress> for PageNumber {
    #[inline]
    fn from(addr: VirtualAddress) -> Self {
        let low = addr.as_usize() & ((1 << arch::MAX_VIRTUAL_BITS) - 1);
        Self::new(low >> arch::PAGE_SHIFT)
    }
}
