//! 4-level Page-Table Engine (spec §4.2).
//!
//! Grounded on the teacher's `mm::page_table` (same `PageTableEntry`/
//! `PageTable`/`PageTableIndex` shapes), but fixes the teacher's gap of never
//! flushing the TLB on unmap, and adds `translate`, `update_flags`,
//! `map_range`/`unmap_range`, and `copy_kernel_mappings`.

use bitflags::bitflags;

use crate::arch::x86_64::context::{invlpg, write_cr3};
use crate::error::PageTableError;
use crate::mm::frame_allocator::{FRAME_ALLOCATOR, FRAME_SIZE};

pub const ENTRIES: usize = 512;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFlags: u64 {
        const PRESENT  = 1 << 0;
        const WRITABLE = 1 << 1;
        const USER     = 1 << 2;
        const HUGE     = 1 << 7;
        const GLOBAL   = 1 << 8;
        const NO_EXECUTE = 1 << 63;
    }
}

#[repr(transparent)]
#[derive(Debug, Clone, Copy)]
pub struct PageTableEntry(u64);

const ADDR_MASK: u64 = 0x000F_FFFF_FFFF_F000;

impl PageTableEntry {
    pub const fn empty() -> Self {
        PageTableEntry(0)
    }

    pub fn is_present(&self) -> bool {
        self.0 & PageFlags::PRESENT.bits() != 0
    }

    pub fn addr(&self) -> u64 {
        self.0 & ADDR_MASK
    }

    pub fn flags(&self) -> PageFlags {
        PageFlags::from_bits_truncate(self.0)
    }

    pub fn set(&mut self, addr: u64, flags: PageFlags) {
        self.0 = (addr & ADDR_MASK) | flags.bits();
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }
}

#[repr(C, align(4096))]
pub struct PageTable {
    pub entries: [PageTableEntry; ENTRIES],
}

impl PageTable {
    pub fn zero(&mut self) {
        for e in self.entries.iter_mut() {
            e.clear();
        }
    }
}

struct VaBreakdown {
    l4: usize,
    l3: usize,
    l2: usize,
    l1: usize,
}

fn breakdown(vaddr: u64) -> VaBreakdown {
    VaBreakdown {
        l4: ((vaddr >> 39) & 0x1FF) as usize,
        l3: ((vaddr >> 30) & 0x1FF) as usize,
        l2: ((vaddr >> 21) & 0x1FF) as usize,
        l1: ((vaddr >> 12) & 0x1FF) as usize,
    }
}

fn phys_to_virt(phys: u64) -> u64 {
    FRAME_ALLOCATOR.lock().phys_to_virt(phys)
}

fn table_at(phys_addr: u64) -> &'static mut PageTable {
    // SAFETY: every intermediate table physical address stored in an entry
    // was allocated by `alloc_table` below and is always mapped through the
    // HHDM, which covers all of RAM.
    unsafe { &mut *(phys_to_virt(phys_addr) as *mut PageTable) }
}

fn alloc_table() -> Result<u64, PageTableError> {
    let frame = FRAME_ALLOCATOR
        .lock()
        .alloc_frame()
        .map_err(|_| PageTableError::OutOfMemory)?;
    let phys = frame.addr();
    table_at(phys).zero();
    Ok(phys)
}

/// Walk from `root`, allocating missing intermediate tables, stopping one
/// level above the leaf. Intermediate tables are stamped
/// present|writable|user so the leaf-level flags determine final access
/// (spec §4.2 algorithm).
fn walk_to_l1(root: u64, vaddr: u64, create: bool) -> Result<Option<&'static mut PageTable>, PageTableError> {
    let vb = breakdown(vaddr);
    let l4 = table_at(root);
    let l3_phys = ensure_next(&mut l4.entries[vb.l4], create)?;
    let Some(l3_phys) = l3_phys else { return Ok(None) };
    let l3 = table_at(l3_phys);
    let l2_phys = ensure_next(&mut l3.entries[vb.l3], create)?;
    let Some(l2_phys) = l2_phys else { return Ok(None) };
    let l2 = table_at(l2_phys);
    let l1_phys = ensure_next(&mut l2.entries[vb.l2], create)?;
    let Some(l1_phys) = l1_phys else { return Ok(None) };
    Ok(Some(table_at(l1_phys)))
}

fn ensure_next(entry: &mut PageTableEntry, create: bool) -> Result<Option<u64>, PageTableError> {
    if entry.is_present() {
        return Ok(Some(entry.addr()));
    }
    if !create {
        return Ok(None);
    }
    let phys = alloc_table()?;
    entry.set(
        phys,
        PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER,
    );
    Ok(Some(phys))
}

fn leaf_index(vaddr: u64) -> usize {
    breakdown(vaddr).l1
}

/// `map(root, vaddr, paddr, flags)`: fails with `AlreadyMapped` if the leaf
/// is present.
pub fn map(root: u64, vaddr: u64, paddr: u64, flags: PageFlags) -> Result<(), PageTableError> {
    let Some(l1) = walk_to_l1(root, vaddr, true)? else {
        unreachable!("create=true never returns None")
    };
    let entry = &mut l1.entries[leaf_index(vaddr)];
    if entry.is_present() {
        return Err(PageTableError::AlreadyMapped);
    }
    entry.set(paddr, flags | PageFlags::PRESENT);
    invlpg(vaddr);
    Ok(())
}

/// `map_force`: overwrites any existing leaf mapping.
pub fn map_force(root: u64, vaddr: u64, paddr: u64, flags: PageFlags) -> Result<(), PageTableError> {
    let Some(l1) = walk_to_l1(root, vaddr, true)? else {
        unreachable!("create=true never returns None")
    };
    l1.entries[leaf_index(vaddr)].set(paddr, flags | PageFlags::PRESENT);
    invlpg(vaddr);
    Ok(())
}

/// `unmap`: a no-op on an unmapped address.
pub fn unmap(root: u64, vaddr: u64) -> Result<(), PageTableError> {
    let Some(l1) = walk_to_l1(root, vaddr, false)? else {
        return Ok(());
    };
    let entry = &mut l1.entries[leaf_index(vaddr)];
    if entry.is_present() {
        entry.clear();
        invlpg(vaddr);
    }
    Ok(())
}

pub fn translate(root: u64, vaddr: u64) -> Option<u64> {
    let l1 = walk_to_l1(root, vaddr, false).ok()??;
    let entry = &l1.entries[leaf_index(vaddr)];
    entry.is_present().then(|| entry.addr() | (vaddr & 0xFFF))
}

pub fn get_flags(root: u64, vaddr: u64) -> Option<PageFlags> {
    let l1 = walk_to_l1(root, vaddr, false).ok()??;
    let entry = &l1.entries[leaf_index(vaddr)];
    entry.is_present().then(|| entry.flags())
}

pub fn update_flags(root: u64, vaddr: u64, flags: PageFlags) -> Result<(), PageTableError> {
    let Some(l1) = walk_to_l1(root, vaddr, false)? else {
        return Err(PageTableError::NotMapped);
    };
    let entry = &mut l1.entries[leaf_index(vaddr)];
    if !entry.is_present() {
        return Err(PageTableError::NotMapped);
    }
    let addr = entry.addr();
    entry.set(addr, flags | PageFlags::PRESENT);
    invlpg(vaddr);
    Ok(())
}

pub fn map_range(
    root: u64,
    vaddr_start: u64,
    paddr_start: u64,
    len: usize,
    flags: PageFlags,
) -> Result<(), PageTableError> {
    let pages = len.div_ceil(FRAME_SIZE);
    for i in 0..pages {
        let off = (i * FRAME_SIZE) as u64;
        if let Err(e) = map(root, vaddr_start + off, paddr_start + off, flags) {
            for j in 0..i {
                let off = (j * FRAME_SIZE) as u64;
                let _ = unmap(root, vaddr_start + off);
            }
            return Err(e);
        }
    }
    Ok(())
}

pub fn unmap_range(root: u64, vaddr_start: u64, len: usize) -> Result<(), PageTableError> {
    let pages = len.div_ceil(FRAME_SIZE);
    for i in 0..pages {
        unmap(root, vaddr_start + (i * FRAME_SIZE) as u64)?;
    }
    Ok(())
}

/// Copy the upper half (PML4 indices 256-511) verbatim so every address
/// space shares kernel mappings (spec §4.2).
pub fn copy_kernel_mappings(dst_root: u64, src_root: u64) {
    let dst = table_at(dst_root);
    let src = table_at(src_root);
    for i in 256..ENTRIES {
        dst.entries[i] = src.entries[i];
    }
}

/// Switch address spaces: writes CR3, an implicit full TLB flush.
///
/// # Safety
/// `root` must be a valid PML4 physical address with kernel mappings
/// present in its upper half.
pub unsafe fn switch_to(root: u64) {
    // SAFETY: delegated to caller.
    unsafe {
        write_cr3(root);
    }
}

pub fn new_root() -> Result<u64, PageTableError> {
    alloc_table()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boot::{MemoryKind, MemoryMapEntry};

    fn init_pfa() {
        FRAME_ALLOCATOR.lock().init(
            core::iter::once(MemoryMapEntry {
                start: 0,
                end: 64 * 1024 * 1024,
                kind: MemoryKind::Usable,
            }),
            0,
        );
    }

    #[test]
    fn map_then_translate_round_trips() {
        init_pfa();
        let root = new_root().unwrap();
        let frame = FRAME_ALLOCATOR.lock().alloc_frame().unwrap();
        map(root, 0x40_0000, frame.addr(), PageFlags::WRITABLE | PageFlags::USER).unwrap();
        assert_eq!(translate(root, 0x40_0000), Some(frame.addr()));
        assert_eq!(translate(root, 0x40_0000 + 10), Some(frame.addr() + 10));
    }

    #[test]
    fn map_twice_fails_already_mapped() {
        init_pfa();
        let root = new_root().unwrap();
        let frame = FRAME_ALLOCATOR.lock().alloc_frame().unwrap();
        map(root, 0x40_0000, frame.addr(), PageFlags::empty()).unwrap();
        assert!(matches!(
            map(root, 0x40_0000, frame.addr(), PageFlags::empty()),
            Err(PageTableError::AlreadyMapped)
        ));
    }

    #[test]
    fn unmap_unmapped_is_noop() {
        init_pfa();
        let root = new_root().unwrap();
        assert!(unmap(root, 0x90_0000).is_ok());
        assert_eq!(translate(root, 0x90_0000), None);
    }

    #[test]
    fn translate_unmapped_is_none() {
        init_pfa();
        let root = new_root().unwrap();
        assert_eq!(translate(root, 0x1234_0000), None);
    }
}
