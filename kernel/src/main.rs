//! Bare-metal entry point (spec §2 data flow, §6).
//!
//! Boot order: `arch::x86_64::gdt`/`idt` before anything else touches the
//! CPU's own descriptor state, then the frame allocator and kernel heap
//! (every later subsystem allocates), then interrupts/timer last so the
//! first tick never lands on a half-initialized scheduler.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), no_main)]

#[cfg(not(test))]
extern crate alloc;

#[cfg(not(test))]
use bootloader_api::{entry_point, BootInfo};
#[cfg(not(test))]
use graphene_kernel::boot::{self, BootContext, BootModule};

#[cfg(not(test))]
entry_point!(kernel_main);

#[cfg(not(test))]
fn kernel_main(boot_info: &'static mut BootInfo) -> ! {
    use graphene_kernel::{arch, mm, process, sched, serial};

    serial::init_logging();
    log::info!("Graphene booting");

    arch::x86_64::gdt::init();
    arch::x86_64::idt::init();

    let hhdm_offset = boot_info.physical_memory_offset.into_option().unwrap_or(0);
    let framebuffer = boot_info.framebuffer.as_mut().map(|fb| {
        let addr = fb.buffer_mut().as_mut_ptr() as u64;
        boot::adapt_framebuffer(&fb.info(), addr)
    });
    let modules: alloc::vec::Vec<BootModule> = alloc::vec::Vec::new();

    let ctx = BootContext { hhdm_offset, framebuffer, modules };
    let regions = boot::iter_memory_map(&boot_info.memory_regions);
    mm::init(&ctx, regions);

    arch::x86_64::interrupts::init();
    arch::x86_64::timer::init();

    log::info!("heap stats: {:?}", mm::heap::ALLOCATOR.stats());

    let kernel_pid = process::ProcessId(0);
    let _ = kernel_pid;

    x86_64::instructions::interrupts::enable();
    log::info!("Graphene boot complete, entering idle loop");

    loop {
        arch::x86_64::port::halt_once();
        sched::yield_cpu();
    }
}

#[cfg(test)]
fn main() {}
