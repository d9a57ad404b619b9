//! Memory management: physical frames, page tables, address spaces, the
//! kernel heap, and user-pointer validation (spec §4.1-§4.4, §4.8).

pub mod frame_allocator;
pub mod heap;
pub mod memory_object;
pub mod page_table;
pub mod user_validation;
pub mod vas;

use core::sync::atomic::{AtomicU64, Ordering};

use crate::arch::x86_64::context::read_cr3;
use crate::boot::BootContext;

/// The bootloader-provided PML4's physical address, stamped once by
/// [`init`]. Every later address space's upper half is copied from this one
/// (spec §4.2 `copy_kernel_mappings`); `process_create` needs it again long
/// after boot, so it's kept here rather than threaded through call sites.
static KERNEL_ROOT: AtomicU64 = AtomicU64::new(0);

/// Bring up memory management in the order spec §2's data flow requires:
/// the frame allocator first (it owns all physical memory), then the kernel
/// heap (so every later subsystem can use `alloc::`). Returns the physical
/// address of the bootloader-provided PML4, which already maps the kernel
/// image and the HHDM.
pub fn init(ctx: &BootContext, regions: impl Iterator<Item = crate::boot::MemoryMapEntry>) -> u64 {
    frame_allocator::FRAME_ALLOCATOR
        .lock()
        .init(regions, ctx.hhdm_offset);

    heap::init();

    let root = read_cr3();
    KERNEL_ROOT.store(root, Ordering::Relaxed);
    root
}

/// The PML4 physical address [`init`] stamped at boot (0 if called before
/// `init`, which never happens past early bring-up).
pub fn kernel_root() -> u64 {
    KERNEL_ROOT.load(Ordering::Relaxed)
}
