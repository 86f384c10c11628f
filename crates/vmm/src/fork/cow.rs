use log::trace;

use crate::{
    AllocError, PhysicalMemory,
    arch::{PageEntry, PageFlags, PageTable},
    walker::LeafCopy,
};

/// Links the child to the parent's frames and marks mutable pages shared.
#[derive(Debug, Default)]
pub(super) struct CopyOnWrite {
    pub shared: usize,
    pub read_only: usize,
}

impl LeafCopy for CopyOnWrite {
    fn copy_leaf(
        &mut self,
        memory: &mut PhysicalMemory,
        parent: PageTable,
        index: usize,
        entry: PageEntry,
    ) -> Result<PageEntry, AllocError> {
        let frame = entry.frame();
        let mut child = PageEntry::new(
            frame,
            PageFlags::leaf(entry.is_readable(), entry.is_writable()),
        );

        // Read-only pages are aliased without bookkeeping.
        if !entry.is_writable() && !entry.is_custom() {
            self.read_only += 1;
            return Ok(child);
        }

        let count = memory.frame(frame).share();
        parent.update_entry(memory, index, PageEntry::share);
        child.share();
        self.shared += 1;

        trace!("sharing frame {frame} ({count} aliases beyond owner)");
        Ok(child)
    }
}
