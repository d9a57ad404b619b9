//! x86_64 architecture seam (spec §9 `Arch` interface).

pub mod apic;
pub mod context;
pub mod gdt;
pub mod idt;
pub mod interrupts;
pub mod pic;
pub mod port;
pub mod timer;

pub fn init() {
    gdt::init();
    idt::init();
    interrupts::init();
    timer::init();
    x86_64::instructions::interrupts::enable();
}

pub fn halt() -> ! {
    port::halt()
}
