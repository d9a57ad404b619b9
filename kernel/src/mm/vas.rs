//! Address Space Manager (spec §4.3).
//!
//! Tracks the region list backing each address space, rejects overlapping
//! regions and W^X violations at `map_region` time, and answers page faults.
//! There is no demand paging (spec §1 Non-goals): every region is mapped
//! eagerly when added, so a page fault on a user address is always either a
//! genuine bug or an access-rights violation, never a lazily-resolvable
//! miss — `handle_page_fault_current` only ever reports a fault, it never
//! resolves one.

use alloc::vec::Vec;
use spin::Mutex;
use x86_64::structures::idt::PageFaultErrorCode;

use crate::config::MAX_ADDRESS_SPACES;
use crate::error::VasError;
use crate::mm::frame_allocator::{FRAME_ALLOCATOR, FRAME_SIZE};
use crate::mm::page_table::{self, PageFlags};

pub type AddressSpaceId = usize;

#[derive(Debug, Clone, Copy)]
pub struct Region {
    pub start: u64,
    pub end: u64,
    pub flags: PageFlags,
}

impl Region {
    fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }

    fn overlaps(&self, start: u64, end: u64) -> bool {
        self.start < end && start < self.end
    }

    /// W^X (spec §3 invariant): a region may be writable or executable, never
    /// both.
    fn is_writable_and_executable(flags: PageFlags) -> bool {
        flags.contains(PageFlags::WRITABLE) && !flags.contains(PageFlags::NO_EXECUTE)
    }
}

pub struct AddressSpace {
    pub root: u64,
    regions: Vec<Region>,
}

impl AddressSpace {
    fn find_region(&self, addr: u64) -> Option<&Region> {
        self.regions.iter().find(|r| r.contains(addr))
    }

    fn check_new_region(&self, start: u64, end: u64, flags: PageFlags) -> Result<(), VasError> {
        if Region::is_writable_and_executable(flags) {
            return Err(VasError::WriteXorExecute);
        }
        if self.regions.iter().any(|r| r.overlaps(start, end)) {
            return Err(VasError::Overlap);
        }
        Ok(())
    }
}

struct Slot {
    space: Option<AddressSpace>,
}

struct Manager {
    slots: Vec<Slot>,
    current: Option<AddressSpaceId>,
}

impl Manager {
    fn new() -> Self {
        let mut slots = Vec::with_capacity(MAX_ADDRESS_SPACES);
        for _ in 0..MAX_ADDRESS_SPACES {
            slots.push(Slot { space: None });
        }
        Manager {
            slots,
            current: None,
        }
    }
}

lazy_static::lazy_static! {
    static ref MANAGER: Mutex<Manager> = Mutex::new(Manager::new());
}

/// Create a fresh address space with a new PML4 whose upper half is copied
/// from the currently-active (boot) page table.
pub fn create_address_space(kernel_root: u64) -> Result<AddressSpaceId, VasError> {
    let root = page_table::new_root().map_err(|_| VasError::OutOfMemory)?;
    page_table::copy_kernel_mappings(root, kernel_root);

    let mut mgr = MANAGER.lock();
    let slot = mgr
        .slots
        .iter()
        .position(|s| s.space.is_none())
        .ok_or(VasError::OutOfMemory)?;
    mgr.slots[slot].space = Some(AddressSpace {
        root,
        regions: Vec::new(),
    });
    Ok(slot)
}

pub fn destroy_address_space(id: AddressSpaceId) -> Result<(), VasError> {
    let mut mgr = MANAGER.lock();
    let slot = mgr.slots.get_mut(id).ok_or(VasError::NoSuchRegion)?;
    let space = slot.space.take().ok_or(VasError::NoSuchRegion)?;
    for region in &space.regions {
        let _ = page_table::unmap_range(
            space.root,
            region.start,
            (region.end - region.start) as usize,
        );
    }
    Ok(())
}

/// Map an already-backed physical range as a new region (spec §4.3
/// `map_region`).
pub fn map_region(
    id: AddressSpaceId,
    vaddr: u64,
    paddr: u64,
    len: usize,
    flags: PageFlags,
) -> Result<(), VasError> {
    let mut mgr = MANAGER.lock();
    let space = mgr
        .slots
        .get_mut(id)
        .and_then(|s| s.space.as_mut())
        .ok_or(VasError::NoSuchRegion)?;
    let end = vaddr + len as u64;
    space.check_new_region(vaddr, end, flags)?;
    page_table::map_range(space.root, vaddr, paddr, len, flags).map_err(|_| VasError::OutOfMemory)?;
    space.regions.push(Region {
        start: vaddr,
        end,
        flags,
    });
    Ok(())
}

/// Map a region backed by freshly allocated physical frames (spec §4.3
/// `map_region_alloc`): used for stacks, heaps, and anonymous memory. If
/// `map_region`'s overlap/W^X check rejects the mapping, the frames are
/// freed before the error is returned rather than leaked.
pub fn map_region_alloc(
    id: AddressSpaceId,
    vaddr: u64,
    len: usize,
    flags: PageFlags,
) -> Result<(), VasError> {
    let pages = len.div_ceil(FRAME_SIZE);
    let frame = FRAME_ALLOCATOR
        .lock()
        .alloc_frames(pages)
        .map_err(|_| VasError::OutOfMemory)?;
    map_region(id, vaddr, frame.addr(), pages * FRAME_SIZE, flags).inspect_err(|_| {
        FRAME_ALLOCATOR.lock().free_frames(frame, pages);
    })
}

pub fn unmap_region(id: AddressSpaceId, vaddr: u64) -> Result<(), VasError> {
    let mut mgr = MANAGER.lock();
    let space = mgr
        .slots
        .get_mut(id)
        .and_then(|s| s.space.as_mut())
        .ok_or(VasError::NoSuchRegion)?;
    let pos = space
        .regions
        .iter()
        .position(|r| r.contains(vaddr))
        .ok_or(VasError::NoSuchRegion)?;
    let region = space.regions.remove(pos);
    page_table::unmap_range(space.root, region.start, (region.end - region.start) as usize)
        .map_err(|_| VasError::NotMapped)
}

pub fn set_current(id: Option<AddressSpaceId>) {
    MANAGER.lock().current = id;
}

pub fn current() -> Option<AddressSpaceId> {
    MANAGER.lock().current
}

pub fn root_of(id: AddressSpaceId) -> Option<u64> {
    MANAGER.lock().slots.get(id).and_then(|s| s.space.as_ref()).map(|s| s.root)
}

/// Called from the page-fault IDT handler. There is no demand paging, so this
/// never resolves the fault — it only reports whether the address falls in a
/// mapped region (for diagnostics) and always returns `false`, letting the
/// caller terminate the faulting thread/process.
pub fn handle_page_fault_current(fault_addr: u64, error_code: PageFaultErrorCode) -> bool {
    let mgr = MANAGER.lock();
    let Some(id) = mgr.current else {
        log::error!("page fault at {fault_addr:#x} with no current address space ({error_code:?})");
        return false;
    };
    let Some(space) = mgr.slots.get(id).and_then(|s| s.space.as_ref()) else {
        log::error!("page fault at {fault_addr:#x} in stale address space {id} ({error_code:?})");
        return false;
    };
    match space.find_region(fault_addr) {
        Some(region) => log::warn!(
            "page fault at {fault_addr:#x} inside region [{:#x}, {:#x}) flags={:?} ({error_code:?})",
            region.start,
            region.end,
            region.flags,
        ),
        None => log::warn!("page fault at {fault_addr:#x} outside any mapped region ({error_code:?})"),
    }
    false
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

    fn fresh_kernel_root() -> u64 {
        page_table::new_root().unwrap()
    }

    #[test]
    fn overlapping_regions_are_rejected() {
        init_pfa();
        let kroot = fresh_kernel_root();
        let id = create_address_space(kroot).unwrap();
        map_region_alloc(id, 0x40_0000, 4096, PageFlags::WRITABLE | PageFlags::USER).unwrap();
        assert_eq!(
            map_region_alloc(id, 0x40_0000, 4096, PageFlags::WRITABLE | PageFlags::USER),
            Err(VasError::Overlap)
        );
    }

    #[test]
    fn writable_and_executable_region_rejected() {
        init_pfa();
        let kroot = fresh_kernel_root();
        let id = create_address_space(kroot).unwrap();
        let flags = PageFlags::WRITABLE | PageFlags::USER;
        assert_eq!(
            map_region_alloc(id, 0x50_0000, 4096, flags),
            Err(VasError::WriteXorExecute)
        );
    }

    #[test]
    fn rejected_map_region_alloc_frees_its_frames() {
        init_pfa();
        let kroot = fresh_kernel_root();
        let id = create_address_space(kroot).unwrap();
        let flags = PageFlags::WRITABLE | PageFlags::USER | PageFlags::NO_EXECUTE;
        map_region_alloc(id, 0x70_0000, 4096, flags).unwrap();
        let free_before = FRAME_ALLOCATOR.lock().free_count();

        assert_eq!(
            map_region_alloc(id, 0x70_0000, 4096, flags),
            Err(VasError::Overlap)
        );
        assert_eq!(FRAME_ALLOCATOR.lock().free_count(), free_before);
    }

    #[test]
    fn unmap_then_remap_succeeds() {
        init_pfa();
        let kroot = fresh_kernel_root();
        let id = create_address_space(kroot).unwrap();
        let flags = PageFlags::WRITABLE | PageFlags::USER | PageFlags::NO_EXECUTE;
        map_region_alloc(id, 0x60_0000, 4096, flags).unwrap();
        unmap_region(id, 0x60_0000).unwrap();
        map_region_alloc(id, 0x60_0000, 4096, flags).unwrap();
    }
}
