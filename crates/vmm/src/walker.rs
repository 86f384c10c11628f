//! Three-level page table traversal.
//!
//! Both fork strategies duplicate a hierarchy the same way: every valid non-leaf entry gets a
//! fresh child table at the same index, and every valid leaf is handed to a [`LeafCopy`]
//! strategy that decides what the child's leaf looks like. Invalid slots are skipped at every
//! level, so the child never has a table below a slot the parent left empty.

use log::trace;

use crate::{
    AllocError, PageNumber, PhysicalMemory,
    arch::{self, PageEntry, PageFlags, PageTable},
};

/// Decides how a valid parent leaf is carried into the child.
pub trait LeafCopy {
    /// Produces the child's entry for `parent[index]`.
    ///
    /// `parent` is the parent's level 0 table, which the strategy may update in place.
    fn copy_leaf(
        &mut self,
        memory: &mut PhysicalMemory,
        parent: PageTable,
        index: usize,
        entry: PageEntry,
    ) -> Result<PageEntry, AllocError>;
}

/// Counts of what a duplication produced.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DuplicateStats {
    /// Page tables allocated for the child, root included.
    pub tables: usize,
    /// Valid leaves carried into the child.
    pub leaves: usize,
}

/// Duplicates the hierarchy rooted at `root`, returning the child's root table.
pub fn duplicate(
    memory: &mut PhysicalMemory,
    root: PageTable,
    strategy: &mut impl LeafCopy,
) -> Result<(PageTable, DuplicateStats), AllocError> {
    let mut stats = DuplicateStats::default();
    let child = duplicate_level(memory, root, arch::ROOT_LEVEL, strategy, &mut stats)?;
    Ok((child, stats))
}

fn duplicate_level(
    memory: &mut PhysicalMemory,
    parent: PageTable,
    level: usize,
    strategy: &mut impl LeafCopy,
    stats: &mut DuplicateStats,
) -> Result<PageTable, AllocError> {
    let child = PageTable::allocate(memory)?;
    stats.tables += 1;
    trace!("L{level}: {parent:?} -> {child:?}");

    for index in 0..arch::NUM_PTE_ENTRIES {
        let entry = parent.entry(memory, index);
        if !entry.is_valid() {
            continue;
        }

        let child_entry = if level == 0 {
            stats.leaves += 1;
            strategy.copy_leaf(memory, parent, index, entry)?
        } else {
            let next = PageTable::from_frame(entry.frame());
            let next_child = duplicate_level(memory, next, level - 1, strategy, stats)?;
            PageEntry::new(next_child.frame(), PageFlags::table())
        };

        child.set_entry(memory, index, child_entry);
    }

    Ok(child)
}

/// Calls `f` for every valid leaf reachable from `root`, in address order.
///
/// `f` receives the virtual page the leaf maps, the level 0 table holding it, the index of
/// the leaf in that table, and the entry itself.
pub fn for_each_leaf(
    memory: &PhysicalMemory,
    root: PageTable,
    mut f: impl FnMut(PageNumber, PageTable, usize, PageEntry),
) {
    for (i, l2) in root.valid_entries(memory) {
        let l1_table = PageTable::from_frame(l2.frame());
        for (j, l1) in l1_table.valid_entries(memory) {
            let l0_table = PageTable::from_frame(l1.frame());
            for (k, leaf) in l0_table.valid_entries(memory) {
                f(PageNumber::from_indices(i, j, k), l0_table, k, leaf);
            }
        }
    }
}
