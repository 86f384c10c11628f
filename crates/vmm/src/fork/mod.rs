//! Address space duplication.
//!
//! Two strategies share the same table duplication ([`crate::walker::duplicate`]) and
//! differ only at the leaves:
//! - [`fork_copy`] gives the child a private copy of every data page.
//! - [`fork_copy_on_write`] aliases every data page and defers copying to the write fault.
//!
//! Either way the child gets freshly allocated tables at every level; only leaf data frames
//! are ever shared between address spaces.

mod cow;
mod eager;

use log::debug;

use crate::{AllocError, PhysicalMemory, arch::PageTable, walker};

use self::{cow::CopyOnWrite, eager::EagerCopy};

/// Duplicates the address space rooted at `root`, copying every data page.
///
/// The parent's tables are not modified and no share counts change.
pub fn fork_copy(memory: &mut PhysicalMemory, root: PageTable) -> Result<PageTable, AllocError> {
    let mut strategy = EagerCopy::default();
    let (child, stats) = walker::duplicate(memory, root, &mut strategy)?;
    debug!(
        "fork: {root:?} -> {child:?}, {} tables, {} pages copied",
        stats.tables, strategy.copied
    );
    Ok(child)
}

/// Duplicates the address space rooted at `root`, sharing every data page copy-on-write.
///
/// Writable (or already shared) leaves become read-only `custom` aliases in both parent and
/// child, and their frame's share count goes up by one. Read-only leaves are aliased as-is.
pub fn fork_copy_on_write(
    memory: &mut PhysicalMemory,
    root: PageTable,
) -> Result<PageTable, AllocError> {
    let mut strategy = CopyOnWrite::default();
    let (child, stats) = walker::duplicate(memory, root, &mut strategy)?;
    debug!(
        "cow fork: {root:?} -> {child:?}, {} tables, {} pages shared, {} read-only aliases",
        stats.tables, strategy.shared, strategy.read_only
    );
    Ok(child)
}
