//! Architecture-specific code. Only `x86_64` is supported (spec §1: "64-bit
//! x86"); the teacher's aarch64/riscv64 arms have no spec counterpart and
//! were dropped rather than carried along as dead cfg branches.

pub mod x86_64;

pub fn init() {
    x86_64::init();
}

pub fn halt() -> ! {
    x86_64::halt()
}
