#![cfg_attr(not(test), no_std)]

//! # Virtual Memory Manager (VMM)
//!
//! A simulated memory-management unit for studying address-space duplication. It provides:
//!
//! - An emulated Sv39-style MMU: three-level page tables stored in frames of emulated
//!   physical memory, with valid/read/write/custom entry bits.
//! - Eager fork, which gives the child a private copy of every page.
//! - Copy-on-write fork, which aliases pages and tracks a share count per frame.
//! - The page-fault handler that splits or reclaims a copy-on-write page on the first write.
//!
//! Everything operates on an explicitly passed [`PhysicalMemory`] (or the [`Mmu`] owning
//! one); there is no global state.

extern crate alloc;

mod address;
mod dump;
mod frame;
mod numbers;
mod page_directory;
mod physical_memory;

pub mod arch;
pub mod fault;
pub mod fork;
pub mod mmu;
pub mod walker;

pub use address::{PhysicalAddress, VirtualAddress};
pub use arch::{PAGE_SIZE, PageEntry, PageFlags, PageTable};
pub use dump::TableDump;
pub use fault::{FaultError, FaultResolution, page_fault_handler};
pub use fork::{fork_copy, fork_copy_on_write};
pub use frame::{Frame, FrameFlag, FrameFlags};
pub use mmu::{AccessError, FaultCounters, Mmu};
pub use numbers::{FrameNumber, PageNumber};
pub use page_directory::PageDirectory;
pub use physical_memory::{AllocError, PhysicalMemory};
