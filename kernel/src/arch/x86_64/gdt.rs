//! Global Descriptor Table and Task State Segment.
//!
//! Segment layout matches the canonical SYSRET-friendly ordering used by the
//! teacher repo this kernel is grounded on: kernel code/data, then TSS, then
//! user data/code (so `STAR`-style `+8`/`+16` selector math would work if a
//! `syscall`/`sysret` fast path were ever added; the core uses the software
//! interrupt 0x80 path exclusively, per spec §6).

use lazy_static::lazy_static;
use x86_64::{
    structures::{
        gdt::{Descriptor, GlobalDescriptorTable, SegmentSelector},
        tss::TaskStateSegment,
    },
    VirtAddr,
};

pub const DOUBLE_FAULT_IST_INDEX: u16 = 0;

const KERNEL_STACK_SIZE: usize = 4096 * 5;
const DOUBLE_FAULT_STACK_SIZE: usize = 4096 * 5;

#[repr(align(16))]
struct AlignedStack<const N: usize>([u8; N]);

static mut DOUBLE_FAULT_STACK: AlignedStack<DOUBLE_FAULT_STACK_SIZE> =
    AlignedStack([0; DOUBLE_FAULT_STACK_SIZE]);
static mut BOOT_KERNEL_STACK: AlignedStack<KERNEL_STACK_SIZE> =
    AlignedStack([0; KERNEL_STACK_SIZE]);

/// Mutable because every thread switch rewrites RSP0 (spec §4.8's
/// `set_kernel_stack`). Single-core, so no concurrent writers; callers
/// disable interrupts around the write.
static mut TSS: TaskStateSegment = TaskStateSegment::new();

lazy_static! {
    static ref GDT: (GlobalDescriptorTable, Selectors) = {
        let mut gdt = GlobalDescriptorTable::new();
        let code_selector = gdt.append(Descriptor::kernel_code_segment());
        let data_selector = gdt.append(Descriptor::kernel_data_segment());
        // SAFETY: TSS is initialized by `init()` before the GDT is loaded;
        // the reference only needs to be valid for the 'static lifetime of
        // the descriptor table, which it is.
        let tss_selector = gdt.append(Descriptor::tss_segment(unsafe {
            &*core::ptr::addr_of!(TSS)
        }));
        let user_data_selector = gdt.append(Descriptor::user_data_segment());
        let user_code_selector = gdt.append(Descriptor::user_code_segment());
        (
            gdt,
            Selectors {
                code_selector,
                data_selector,
                tss_selector,
                user_data_selector,
                user_code_selector,
            },
        )
    };
}

pub struct Selectors {
    pub code_selector: SegmentSelector,
    pub data_selector: SegmentSelector,
    pub tss_selector: SegmentSelector,
    pub user_data_selector: SegmentSelector,
    pub user_code_selector: SegmentSelector,
}

/// Install the GDT/TSS and reload segment registers. Must run before any
/// thread is scheduled.
pub fn init() {
    use x86_64::instructions::{segmentation::*, tables::load_tss};

    // SAFETY: single boot-time call, before any other CPU-local state is
    // touched; the stack arrays are 'static and large enough for their use.
    unsafe {
        let df_stack_start = VirtAddr::from_ptr(core::ptr::addr_of!(DOUBLE_FAULT_STACK));
        (*core::ptr::addr_of_mut!(TSS)).interrupt_stack_table[DOUBLE_FAULT_IST_INDEX as usize] =
            df_stack_start + DOUBLE_FAULT_STACK_SIZE as u64;

        let boot_stack_start = VirtAddr::from_ptr(core::ptr::addr_of!(BOOT_KERNEL_STACK));
        (*core::ptr::addr_of_mut!(TSS)).privilege_stack_table[0] =
            boot_stack_start + KERNEL_STACK_SIZE as u64;
    }

    GDT.0.load();

    // SAFETY: selectors come from the GDT we just loaded; this just points
    // the segment registers and task register at their matching entries.
    unsafe {
        CS::set_reg(GDT.1.code_selector);
        SS::set_reg(GDT.1.data_selector);
        DS::set_reg(GDT.1.data_selector);
        ES::set_reg(GDT.1.data_selector);
        load_tss(GDT.1.tss_selector);
    }
}

pub fn selectors() -> &'static Selectors {
    &GDT.1
}

/// Update the ring-0 stack pointer used on the next ring-3 -> ring-0
/// transition (spec §4.8, §9 `Arch::set_kernel_stack`).
///
/// # Safety
/// Must be called with interrupts disabled and only while no user-mode
/// code is concurrently trapping into the kernel (true on this single-core
/// design between a context switch and the next `iretq`).
pub unsafe fn set_kernel_stack(rsp0: VirtAddr) {
    // SAFETY: see function doc; single writer at a time.
    unsafe {
        (*core::ptr::addr_of_mut!(TSS)).privilege_stack_table[0] = rsp0;
    }
}
