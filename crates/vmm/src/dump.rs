//! Human-readable page table dumps.

use core::fmt;

use crate::{
    PageNumber, PhysicalMemory,
    arch::{self, PageTable},
};

/// Displays every valid entry reachable from a root table, one per line, indented by level.
///
/// ```text
/// L2[  0] PPN: 0x1 Flags: ---V
///   L1[  0] PPN: 0x2 Flags: ---V
///     L0[  1] PPN: 0x3 Flags: -WRV 0x1000
/// ```
///
/// Leaves are followed by the virtual address they map.
pub struct TableDump<'a> {
    memory: &'a PhysicalMemory,
    root: PageTable,
}

impl<'a> TableDump<'a> {
    pub fn new(memory: &'a PhysicalMemory, root: PageTable) -> Self {
        Self { memory, root }
    }

    fn fmt_level(
        &self,
        f: &mut fmt::Formatter<'_>,
        table: PageTable,
        level: usize,
        prefix: usize,
    ) -> fmt::Result {
        let indent = (arch::ROOT_LEVEL - level) * 2;
        for (index, entry) in table.valid_entries(self.memory) {
            let page = (prefix << arch::INDEX_BITS) | index;
            write!(f, "{:indent$}L{level}[{index:3}] {entry}", "")?;
            if level == 0 {
                writeln!(f, " {}", PageNumber::new(page).start())?;
            } else {
                writeln!(f)?;
                self.fmt_level(f, PageTable::from_frame(entry.frame()), level - 1, page)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for TableDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_level(f, self.root, arch::ROOT_LEVEL, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PageDirectory, VirtualAddress, arch::PageFlags};

    #[test]
    fn dump_lists_each_level() {
        let mut memory = PhysicalMemory::new(8);
        let dir = PageDirectory::new(&mut memory).unwrap();
        let frame = memory.allocate_page().unwrap();
        dir.map(
            &mut memory,
            VirtualAddress::new(0x1000),
            frame,
            PageFlags::leaf(true, true),
        )
        .unwrap();

        let dump = TableDump::new(&memory, dir.root()).to_string();

        assert_eq!(
            dump,
            "L2[  0] PPN: 0x2 Flags: ---V\n\
             \x20 L1[  0] PPN: 0x3 Flags: ---V\n\
             \x20   L0[  1] PPN: 0x1 Flags: -WRV 0x1000\n"
        );
    }

    #[test]
    fn empty_space_dumps_nothing() {
        let mut memory = PhysicalMemory::new(1);
        let dir = PageDirectory::new(&mut memory).unwrap();
        assert_eq!(TableDump::new(&memory, dir.root()).to_string(), "");
    }
}
