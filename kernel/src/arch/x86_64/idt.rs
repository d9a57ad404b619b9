//! Interrupt Descriptor Table.
//!
//! Installs the full exception set spec §6 requires, the syscall gate
//! (vector 0x80, DPL=3), and the hardware IRQ vectors (remapped PIC range
//! 32-47). User-mode exceptions terminate the offending process (spec §7);
//! kernel-mode exceptions are fatal.

use lazy_static::lazy_static;
use x86_64::structures::idt::{InterruptDescriptorTable, InterruptStackFrame, PageFaultErrorCode};

use super::gdt::DOUBLE_FAULT_IST_INDEX;

/// First vector used for remapped hardware IRQs (spec: legacy controller).
pub const PIC_1_OFFSET: u8 = 32;
pub const PIC_2_OFFSET: u8 = PIC_1_OFFSET + 8;

/// Timer IRQ vector; consumed entirely by the scheduler (spec §4.10).
pub const TIMER_VECTOR: u8 = PIC_1_OFFSET;

/// Software-interrupt syscall gate, DPL=3 (spec §6).
pub const SYSCALL_VECTOR: u8 = 0x80;

lazy_static! {
    static ref IDT: InterruptDescriptorTable = {
        let mut idt = InterruptDescriptorTable::new();
        idt.divide_error.set_handler_fn(divide_error_handler);
        idt.debug.set_handler_fn(debug_handler);
        idt.non_maskable_interrupt.set_handler_fn(nmi_handler);
        idt.breakpoint.set_handler_fn(breakpoint_handler);
        idt.overflow.set_handler_fn(overflow_handler);
        idt.bound_range_exceeded.set_handler_fn(bound_range_handler);
        idt.invalid_opcode.set_handler_fn(invalid_opcode_handler);
        idt.device_not_available
            .set_handler_fn(device_not_available_handler);
        // SAFETY: the double-fault stack is a dedicated, 20KiB-aligned IST
        // slot set up in gdt::init(); using it here is exactly what it is for.
        unsafe {
            idt.double_fault
                .set_handler_fn(double_fault_handler)
                .set_stack_index(DOUBLE_FAULT_IST_INDEX);
        }
        idt.invalid_tss.set_handler_fn(invalid_tss_handler);
        idt.segment_not_present
            .set_handler_fn(segment_not_present_handler);
        idt.stack_segment_fault
            .set_handler_fn(stack_segment_fault_handler);
        idt.general_protection_fault
            .set_handler_fn(general_protection_fault_handler);
        idt.page_fault.set_handler_fn(page_fault_handler);
        idt.alignment_check.set_handler_fn(alignment_check_handler);
        idt.machine_check.set_handler_fn(machine_check_handler);
        idt.simd_floating_point
            .set_handler_fn(simd_floating_point_handler);
        idt.virtualization.set_handler_fn(virtualization_handler);
        idt.cp_protection_exception
            .set_handler_fn(cp_protection_handler);

        idt[TIMER_VECTOR as usize].set_handler_fn(timer_interrupt_handler);
        install_irq_handlers(&mut idt);

        // SAFETY: the syscall gate intentionally allows ring-3 `int 0x80`,
        // which is exactly what set_privilege_level(Ring3) is for.
        unsafe {
            idt[SYSCALL_VECTOR as usize]
                .set_handler_fn(syscall_interrupt_handler)
                .set_privilege_level(x86_64::PrivilegeLevel::Ring3);
        }

        idt
    };
}

pub fn init() {
    IDT.load();
}

fn terminate_if_user_mode(stack_frame: &InterruptStackFrame, reason: &str) {
    use x86_64::PrivilegeLevel;
    let cpl = stack_frame.code_segment.rpl();
    if cpl == PrivilegeLevel::Ring3 {
        log::warn!("user-mode exception ({reason}); terminating process");
        crate::process::lifecycle::kill_current_process(-1);
        crate::sched::retire_current();
    } else {
        panic!("kernel-mode exception: {reason}\n{stack_frame:#?}");
    }
}

extern "x86-interrupt" fn divide_error_handler(stack_frame: InterruptStackFrame) {
    terminate_if_user_mode(&stack_frame, "divide error");
}
extern "x86-interrupt" fn debug_handler(stack_frame: InterruptStackFrame) {
    terminate_if_user_mode(&stack_frame, "debug");
}
extern "x86-interrupt" fn nmi_handler(stack_frame: InterruptStackFrame) {
    panic!("NMI\n{stack_frame:#?}");
}
extern "x86-interrupt" fn breakpoint_handler(stack_frame: InterruptStackFrame) {
    log::info!("breakpoint\n{stack_frame:#?}");
}
extern "x86-interrupt" fn overflow_handler(stack_frame: InterruptStackFrame) {
    terminate_if_user_mode(&stack_frame, "overflow");
}
extern "x86-interrupt" fn bound_range_handler(stack_frame: InterruptStackFrame) {
    terminate_if_user_mode(&stack_frame, "bound range exceeded");
}
extern "x86-interrupt" fn invalid_opcode_handler(stack_frame: InterruptStackFrame) {
    terminate_if_user_mode(&stack_frame, "invalid opcode");
}
extern "x86-interrupt" fn device_not_available_handler(stack_frame: InterruptStackFrame) {
    terminate_if_user_mode(&stack_frame, "device not available");
}
extern "x86-interrupt" fn double_fault_handler(
    stack_frame: InterruptStackFrame,
    _error_code: u64,
) -> ! {
    panic!("double fault\n{stack_frame:#?}");
}
extern "x86-interrupt" fn invalid_tss_handler(stack_frame: InterruptStackFrame, _error_code: u64) {
    panic!("invalid TSS\n{stack_frame:#?}");
}
extern "x86-interrupt" fn segment_not_present_handler(
    stack_frame: InterruptStackFrame,
    _error_code: u64,
) {
    terminate_if_user_mode(&stack_frame, "segment not present");
}
extern "x86-interrupt" fn stack_segment_fault_handler(
    stack_frame: InterruptStackFrame,
    _error_code: u64,
) {
    terminate_if_user_mode(&stack_frame, "stack segment fault");
}
extern "x86-interrupt" fn general_protection_fault_handler(
    stack_frame: InterruptStackFrame,
    _error_code: u64,
) {
    terminate_if_user_mode(&stack_frame, "general protection fault");
}
extern "x86-interrupt" fn page_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: PageFaultErrorCode,
) {
    use x86_64::registers::control::Cr2;
    let fault_addr = Cr2::read().map(|a| a.as_u64()).unwrap_or(0);
    let handled = crate::mm::vas::handle_page_fault_current(fault_addr, error_code);
    if !handled {
        terminate_if_user_mode(&stack_frame, "page fault");
    }
}
extern "x86-interrupt" fn alignment_check_handler(stack_frame: InterruptStackFrame, _error_code: u64) {
    terminate_if_user_mode(&stack_frame, "alignment check");
}
extern "x86-interrupt" fn machine_check_handler(stack_frame: InterruptStackFrame) -> ! {
    panic!("machine check\n{stack_frame:#?}");
}
extern "x86-interrupt" fn simd_floating_point_handler(stack_frame: InterruptStackFrame) {
    terminate_if_user_mode(&stack_frame, "SIMD floating point");
}
extern "x86-interrupt" fn virtualization_handler(stack_frame: InterruptStackFrame) {
    terminate_if_user_mode(&stack_frame, "virtualization");
}
extern "x86-interrupt" fn cp_protection_handler(stack_frame: InterruptStackFrame, _error_code: u64) {
    terminate_if_user_mode(&stack_frame, "control protection");
}

extern "x86-interrupt" fn timer_interrupt_handler(_stack_frame: InterruptStackFrame) {
    crate::sched::tick();
    super::interrupts::active_controller().eoi(0);
}

/// Per-line IRQ handlers. Each records its own line number before calling
/// into the shared dispatch path, since `extern "x86-interrupt"` handlers
/// aren't passed the vector they were invoked through.
macro_rules! irq_line_handler {
    ($name:ident, $line:expr) => {
        extern "x86-interrupt" fn $name(_stack_frame: InterruptStackFrame) {
            super::interrupts::set_last_irq_line($line);
            crate::irq::dispatch_from_idt();
        }
    };
}

irq_line_handler!(irq_line_1, 1);
irq_line_handler!(irq_line_2, 2);
irq_line_handler!(irq_line_3, 3);
irq_line_handler!(irq_line_4, 4);
irq_line_handler!(irq_line_5, 5);
irq_line_handler!(irq_line_6, 6);
irq_line_handler!(irq_line_7, 7);
irq_line_handler!(irq_line_8, 8);
irq_line_handler!(irq_line_9, 9);
irq_line_handler!(irq_line_10, 10);
irq_line_handler!(irq_line_11, 11);
irq_line_handler!(irq_line_12, 12);
irq_line_handler!(irq_line_13, 13);
irq_line_handler!(irq_line_14, 14);
irq_line_handler!(irq_line_15, 15);

fn install_irq_handlers(idt: &mut InterruptDescriptorTable) {
    idt[(PIC_1_OFFSET + 1) as usize].set_handler_fn(irq_line_1);
    idt[(PIC_1_OFFSET + 2) as usize].set_handler_fn(irq_line_2);
    idt[(PIC_1_OFFSET + 3) as usize].set_handler_fn(irq_line_3);
    idt[(PIC_1_OFFSET + 4) as usize].set_handler_fn(irq_line_4);
    idt[(PIC_1_OFFSET + 5) as usize].set_handler_fn(irq_line_5);
    idt[(PIC_1_OFFSET + 6) as usize].set_handler_fn(irq_line_6);
    idt[(PIC_1_OFFSET + 7) as usize].set_handler_fn(irq_line_7);
    idt[(PIC_1_OFFSET + 8) as usize].set_handler_fn(irq_line_8);
    idt[(PIC_1_OFFSET + 9) as usize].set_handler_fn(irq_line_9);
    idt[(PIC_1_OFFSET + 10) as usize].set_handler_fn(irq_line_10);
    idt[(PIC_1_OFFSET + 11) as usize].set_handler_fn(irq_line_11);
    idt[(PIC_1_OFFSET + 12) as usize].set_handler_fn(irq_line_12);
    idt[(PIC_1_OFFSET + 13) as usize].set_handler_fn(irq_line_13);
    idt[(PIC_1_OFFSET + 14) as usize].set_handler_fn(irq_line_14);
    idt[(PIC_1_OFFSET + 15) as usize].set_handler_fn(irq_line_15);
}

/// The `int 0x80` gate calls directly into the syscall dispatcher with a
/// hand-rolled entry so the full GPR set (spec §4.8's trap frame) is
/// available, rather than through `extern "x86-interrupt"` (which only
/// exposes the hardware-pushed portion).
#[naked]
extern "x86-interrupt" fn syscall_interrupt_handler(_stack_frame: InterruptStackFrame) {
    use core::arch::naked_asm;
    // SAFETY: this is the dedicated entry stub for vector 0x80; it saves the
    // full GPR set the ABI needs and calls into `syscall::trap_entry`, which
    // is `extern "C"` and expects exactly this TrapFrame layout (see
    // arch::x86_64::context::TrapFrame).
    unsafe {
        naked_asm!(
            "push 0",            // error_code: software interrupt, none
            "push 0x80",         // vector
            "push rax",
            "push rbx",
            "push rcx",
            "push rdx",
            "push rsi",
            "push rdi",
            "push rbp",
            "push r8",
            "push r9",
            "push r10",
            "push r11",
            "push r12",
            "push r13",
            "push r14",
            "push r15",
            "mov rdi, rsp",
            "call {handler}",
            "pop r15",
            "pop r14",
            "pop r13",
            "pop r12",
            "pop r11",
            "pop r10",
            "pop r9",
            "pop r8",
            "pop rbp",
            "pop rdi",
            "pop rsi",
            "pop rdx",
            "pop rcx",
            "pop rbx",
            "pop rax",
            "add rsp, 16",       // discard vector, error_code
            "iretq",
            handler = sym crate::syscall::trap_entry,
        );
    }
}
