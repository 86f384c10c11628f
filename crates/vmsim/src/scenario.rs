//! The fork scenarios `vmsim` can run.

use std::error::Error;

use vmm::{Mmu, PAGE_SIZE, PageFlags, PageTable, VirtualAddress, arch};

type Result<T> = std::result::Result<T, Box<dyn Error>>;

/// Distance between consecutive scenario pages: one L1 slot and one L0 slot apart, so that
/// every page lands in its own leaf table.
const PAGE_STRIDE: usize = (1 << (arch::PAGE_SHIFT + arch::INDEX_BITS)) + PAGE_SIZE;

/// Returns the virtual address of scenario page `n`.
pub fn page_address(n: usize) -> VirtualAddress {
    VirtualAddress::new((n + 1) * PAGE_STRIDE)
}

/// Maps `count` writable pages in the current address space and fills each with `fill`.
pub fn map_pages(mmu: &mut Mmu, count: usize, fill: u8) -> Result<Vec<VirtualAddress>> {
    let mut pages = Vec::with_capacity(count);
    for n in 0..count {
        let virt = page_address(n);
        mmu.map_page(virt, PageFlags::leaf(true, true))?;
        mmu.write(virt, &[fill; PAGE_SIZE])?;
        pages.push(virt);
    }
    log::info!("mapped {count} pages filled with {fill:#04x}");
    Ok(pages)
}

fn first_byte(mmu: &mut Mmu, root: PageTable, virt: VirtualAddress) -> Result<u8> {
    let current = mmu.root_page_table();
    mmu.activate(root);
    let byte = mmu.load(virt);
    mmu.activate(current);
    Ok(byte?)
}

fn print_contents(
    mmu: &mut Mmu,
    parent: PageTable,
    child: PageTable,
    pages: &[VirtualAddress],
) -> Result<()> {
    for &virt in pages {
        let parent_byte = first_byte(mmu, parent, virt)?;
        let child_byte = first_byte(mmu, child, virt)?;
        let frames = (mmu.entry(parent, virt), mmu.entry(child, virt));
        let (Some(parent_entry), Some(child_entry)) = frames else {
            return Err(format!("{virt} lost its mapping").into());
        };
        println!(
            "  {virt}: parent {parent_byte:#04x} in {}, child {child_byte:#04x} in {}, share count {}",
            parent_entry.frame(),
            child_entry.frame(),
            mmu.share_count(parent_entry.frame()),
        );
    }
    Ok(())
}

fn print_dumps(mmu: &Mmu, parent: PageTable, child: PageTable) {
    println!("parent page table:\n{}", mmu.dump(parent));
    println!("child page table:\n{}", mmu.dump(child));
}

fn print_summary(mmu: &Mmu) {
    let memory = mmu.memory();
    let faults = mmu.fault_counters();
    println!(
        "frames: {} allocated ({} tables), {} free",
        memory.allocated_frames(),
        memory.table_frames(),
        memory.free_frames()
    );
    println!(
        "faults: {} copied, {} claimed, {} unresolved",
        faults.copied, faults.claimed, faults.unresolved
    );
}

/// Copy-on-write fork, then a write through the parent (splits off a private copy) and a
/// write through the child (the last alias takes the frame over).
pub fn copy_on_write(mmu: &mut Mmu, count: usize) -> Result<()> {
    let pages = map_pages(mmu, count, 0xAA)?;
    let parent = mmu.root_page_table();
    let child = mmu.fork_copy_on_write()?;

    println!("after copy-on-write fork:");
    print_contents(mmu, parent, child, &pages)?;
    print_dumps(mmu, parent, child);

    for &virt in &pages {
        mmu.write(virt, &[0xBB; PAGE_SIZE])?;
    }
    println!("after parent writes 0xbb:");
    print_contents(mmu, parent, child, &pages)?;

    mmu.activate(child);
    for &virt in &pages {
        mmu.write(virt, &[0xCC; PAGE_SIZE])?;
    }
    mmu.activate(parent);
    println!("after child writes 0xcc:");
    print_contents(mmu, parent, child, &pages)?;
    print_dumps(mmu, parent, child);

    print_summary(mmu);
    Ok(())
}

/// Eager fork, then a write through the parent that the child must not see.
pub fn eager(mmu: &mut Mmu, count: usize) -> Result<()> {
    let pages = map_pages(mmu, count, 0xAA)?;
    let parent = mmu.root_page_table();
    let child = mmu.fork_copy()?;

    println!("after eager fork:");
    print_contents(mmu, parent, child, &pages)?;

    for &virt in &pages {
        mmu.write(virt, &[0xBB; PAGE_SIZE])?;
    }
    println!("after parent writes 0xbb:");
    print_contents(mmu, parent, child, &pages)?;
    print_dumps(mmu, parent, child);

    print_summary(mmu);
    Ok(())
}

/// Maps pages and prints the resulting page table.
pub fn dump(mmu: &mut Mmu, count: usize) -> Result<()> {
    map_pages(mmu, count, 0)?;
    print!("{}", mmu.dump(mmu.root_page_table()));
    print_summary(mmu);
    Ok(())
}
