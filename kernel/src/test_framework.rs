//! Bare-metal integration-test support.
//!
//! `#[cfg(test)]` unit tests scattered through the crate run under the
//! host's `std` test harness (see `lib.rs`) and never touch this module.
//! This one is for the separate `tests/*.rs` integration binaries that
//! link `graphene_kernel` as a normal (non-`cfg(test)`) dependency, boot
//! under QEMU, and need a way to report pass/fail back to the host: a
//! custom `Testable` runner plus the `isa-debug-exit` exit-code device.
//! Not gated behind `cfg(test)` for that reason - it must still be
//! present in the ordinary `lib` build those binaries link against.

use core::panic::PanicInfo;

use crate::{serial_print, serial_println};

/// Exit code written to the QEMU `isa-debug-exit` device (`-device
/// isa-debug-exit,iobase=0xf4,iosize=0x04`). QEMU reports `(code << 1) | 1`
/// as its own process exit status, so these values just need to be distinct
/// and nonzero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum QemuExitCode {
    Success = 0x10,
    Failed = 0x11,
}

/// A single integration test. Implemented for any `Fn() -> Result<(), &'static str>`
/// so tests can be written as plain closures or fns, matching the ordinary
/// `#[test]` style everywhere else in the crate.
pub trait Testable {
    fn run(&self) -> Result<(), &'static str>;
}

impl<T> Testable for T
where
    T: Fn() -> Result<(), &'static str>,
{
    fn run(&self) -> Result<(), &'static str> {
        serial_print!("{}...\t", core::any::type_name::<T>());
        match self() {
            Ok(()) => {
                serial_println!("[ok]");
                Ok(())
            }
            Err(e) => {
                serial_println!("[failed]: {e}");
                Err(e)
            }
        }
    }
}

/// Runs every test in `tests`, then exits QEMU with a code reflecting the
/// outcome. Integration-test binaries call this from their `#[no_mangle]`
/// entry point once boot is complete.
pub fn test_runner(tests: &[&dyn Testable]) -> ! {
    serial_println!("Running {} tests", tests.len());
    let mut passed = 0;
    let mut failed = 0;

    for test in tests {
        match test.run() {
            Ok(()) => passed += 1,
            Err(_) => failed += 1,
        }
    }

    serial_println!("\nTest results: {passed} passed, {failed} failed");

    if failed == 0 {
        exit_qemu(QemuExitCode::Success);
    } else {
        exit_qemu(QemuExitCode::Failed);
    }
}

/// Panic handler for integration-test binaries: log the panic to serial and
/// exit QEMU as a failure, instead of looping forever like the ordinary
/// kernel panic handler in `lib.rs`.
pub fn test_panic_handler(info: &PanicInfo) -> ! {
    serial_println!("[failed]\n");
    serial_println!("Error: {info}\n");
    exit_qemu(QemuExitCode::Failed);
}

/// Writes `exit_code` to the `isa-debug-exit` port, which QEMU treats as a
/// request to terminate. Only meaningful under QEMU; on real hardware the
/// port write is harmless but the loop below is what actually stops us.
pub fn exit_qemu(exit_code: QemuExitCode) -> ! {
    // SAFETY: port 0xf4 is the isa-debug-exit device configured on the
    // integration-test QEMU command line; writing to it is a well-defined
    // request to terminate the VM with the given status and has no effect
    // on real hardware beyond an ignored I/O write.
    unsafe {
        crate::arch::x86_64::port::out_port(0xf4, exit_code as u32, 4);
    }

    loop {
        crate::arch::x86_64::port::halt_once();
    }
}

/// Defines an integration test function under `$name` that returns
/// `Result<(), &'static str>`, matching [`Testable`].
#[macro_export]
macro_rules! kernel_test {
    ($name:ident, $body:expr) => {
        pub fn $name() -> Result<(), &'static str> {
            $body
        }
    };
}

#[macro_export]
macro_rules! kernel_assert {
    ($cond:expr) => {
        if !$cond {
            return Err(concat!("assertion failed: ", stringify!($cond)));
        }
    };
}

#[macro_export]
macro_rules! kernel_assert_eq {
    ($left:expr, $right:expr) => {
        if $left != $right {
            return Err(concat!("assertion failed: ", stringify!($left), " == ", stringify!($right)));
        }
    };
}
</content>
