use crate::{
    AllocError, PhysicalMemory,
    arch::{PageEntry, PageFlags, PageTable},
    walker::LeafCopy,
};

/// Gives the child a brand-new frame holding a copy of each parent page.
#[derive(Debug, Default)]
pub(super) struct EagerCopy {
    pub copied: usize,
}

impl LeafCopy for EagerCopy {
    fn copy_leaf(
        &mut self,
        memory: &mut PhysicalMemory,
        _parent: PageTable,
        _index: usize,
        entry: PageEntry,
    ) -> Result<PageEntry, AllocError> {
        let page = memory.allocate_page()?;
        memory.copy_page(entry.frame(), page);
        self.copied += 1;

        Ok(PageEntry::new(
            page,
            PageFlags::leaf(entry.is_readable(), entry.is_writable()),
        ))
    }
}
