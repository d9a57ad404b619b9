//! Process and thread creation/destruction (spec §4.7).

use crate::config::{DEFAULT_USER_STACK_SIZE, KERNEL_STACK_SIZE};
use crate::error::SchedError;
use crate::mm::page_table::PageFlags;
use crate::mm::vas::{self, AddressSpaceId};
use crate::process::pcb::{ProcessId, ProcessState, PROCESS_TABLE};
use crate::process::thread::{Thread, ThreadId, ThreadState, THREAD_TABLE};
use crate::sched;

/// Create a new process with a fresh address space and no threads yet.
pub fn create_process(parent: Option<ProcessId>, name: &str, kernel_root: u64) -> Result<ProcessId, SchedError> {
    let space = vas::create_address_space(kernel_root).map_err(|_| SchedError::PoolExhausted)?;
    let pid = PROCESS_TABLE.lock().insert(parent, name, space)?;
    Ok(pid)
}

/// Create a new thread in `process`, running `entry` on a freshly allocated
/// kernel stack, and hand it to the scheduler as ready.
pub fn create_thread(process: ProcessId, entry: usize, arg: usize, nice: i8) -> Result<ThreadId, SchedError> {
    let stack_pages = KERNEL_STACK_SIZE.div_ceil(4096);
    let frame = crate::mm::frame_allocator::FRAME_ALLOCATOR
        .lock()
        .alloc_frames(stack_pages)
        .map_err(|_| SchedError::PoolExhausted)?;
    let stack_base = crate::mm::frame_allocator::FRAME_ALLOCATOR.lock().phys_to_virt(frame.addr());
    let stack_top = stack_base + KERNEL_STACK_SIZE as u64;

    let thread = Thread {
        id: ThreadId(0),
        process,
        state: ThreadState::Creating,
        nice,
        vruntime: 0,
        context: crate::arch::x86_64::context::Context::new_kernel_thread(stack_top, entry, arg),
        kernel_stack_top: stack_top,
    };

    let tid = THREAD_TABLE.lock().insert(thread)?;
    if let Some(t) = THREAD_TABLE.lock().get_mut(tid) {
        t.state = ThreadState::Ready;
    }
    if let Some(p) = PROCESS_TABLE.lock().get_mut(process) {
        p.threads.push(tid);
        p.state = ProcessState::Running;
    }
    sched::enqueue_ready(tid);
    Ok(tid)
}

/// Create a user-mode process's initial thread with a freshly allocated
/// user stack mapped into its address space (spec §4.7/§4.8).
pub fn create_user_thread(process: ProcessId, space: AddressSpaceId, entry: u64, user_stack_top: u64) -> Result<ThreadId, SchedError> {
    vas::map_region_alloc(
        space,
        user_stack_top - DEFAULT_USER_STACK_SIZE as u64,
        DEFAULT_USER_STACK_SIZE,
        PageFlags::WRITABLE | PageFlags::USER | PageFlags::NO_EXECUTE,
    )
    .map_err(|_| SchedError::PoolExhausted)?;

    spawn_user_thread(process, entry, user_stack_top, 0)
}

/// Spawn a ring-3 thread in an already-mapped address space, passing `arg`
/// through to the user entry point's first argument (spec §6
/// `thread_create`). Split out of [`create_user_thread`] so `thread_create`'s
/// syscall handler, whose target process already has its stack mapped, can
/// reach it without re-mapping.
pub fn spawn_user_thread(process: ProcessId, entry: u64, user_stack_top: u64, arg: u64) -> Result<ThreadId, SchedError> {
    // Pack the user entry point, stack top, and arg into a boxed tuple:
    // `create_thread`'s trampoline only carries a single `usize` arg, and
    // all three values are needed on the other side.
    let packed = alloc::boxed::Box::new((entry, user_stack_top, arg));
    let boxed_arg = alloc::boxed::Box::into_raw(packed) as usize;
    create_thread(process, first_user_entry as usize, boxed_arg, 0)
}

extern "C" fn first_user_entry(arg: usize) -> ! {
    // SAFETY: `arg` is the raw pointer `spawn_user_thread` produced via
    // `Box::into_raw`, passed through untouched by `Context::new_kernel_thread`
    // and consumed exactly once here, the trampoline's only caller.
    let (entry, user_stack_top, user_arg) = unsafe { *alloc::boxed::Box::from_raw(arg as *mut (u64, u64, u64)) };
    let tid = sched::current_thread_id();
    let stack_top = THREAD_TABLE.lock().get(tid).map(|t| t.kernel_stack_top).unwrap_or(0);
    // SAFETY: called exactly once, as the first thing a brand-new user
    // thread's kernel stack runs; `gdt::set_kernel_stack` must be updated
    // before the first later trap, which process bring-up guarantees.
    unsafe {
        crate::arch::x86_64::gdt::set_kernel_stack(x86_64::VirtAddr::new(stack_top));
        crate::arch::x86_64::context::enter_user(entry, user_stack_top, user_arg);
    }
}

/// Terminate the calling thread's process (spec §4.7/§7: user-mode faults
/// and explicit exit both funnel through here). Reparents any children to
/// the kernel process and tears down the address space.
pub fn kill_current_process(exit_code: i32) {
    let tid = sched::current_thread_id();
    let pid = THREAD_TABLE.lock().get(tid).map(|t| t.process);
    let Some(pid) = pid else { return };
    if pid.0 == 0 {
        return; // the kernel process itself is never killed
    }

    let thread_ids = {
        let mut table = PROCESS_TABLE.lock();
        let Some(p) = table.get_mut(pid) else { return };
        p.state = ProcessState::Zombie;
        p.exit_code = exit_code;
        p.threads.clone()
    };

    for t in thread_ids {
        if let Some(thread) = THREAD_TABLE.lock().get_mut(t) {
            thread.state = ThreadState::Zombie;
        }
    }

    let mut table = PROCESS_TABLE.lock();
    table.reparent_children_to_kernel(pid);
    if let Some(p) = table.get(pid) {
        let space = p.address_space;
        drop(table);
        let _ = vas::destroy_address_space(space);
    }
}
