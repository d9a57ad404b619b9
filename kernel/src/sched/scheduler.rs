//! Single-core weighted-fair preemptive scheduler (spec §4.6).
//!
//! A CFS-shaped design: every ready thread accrues virtual runtime scaled
//! inversely by its nice weight; the run queue always picks the thread with
//! the smallest vruntime. The idle thread's vruntime is pinned to `u64::MAX`
//! so it only ever runs when nothing else is ready.

use alloc::vec::Vec;

use spin::Mutex;

use crate::arch::x86_64::context::{switch_context, Context};
use crate::config::TIMER_HZ;
use crate::process::thread::{Thread, ThreadId, ThreadState, THREAD_TABLE};

/// Scheduler-internal time unit: nanoseconds of "real" time per tick,
/// divided by the running thread's weight to get its vruntime increment.
const NS_PER_TICK: u64 = 1_000_000_000 / TIMER_HZ as u64;

struct SchedulerState {
    current: ThreadId,
    ready: Vec<ThreadId>,
    idle: Thread,
    /// Monotonically non-decreasing floor (spec §4.6): every thread that
    /// becomes ready is clamped to at least this value so a thread that
    /// blocked long ago at a low vruntime can't wake up and monopolize the
    /// CPU ahead of everything that kept accruing runtime while it slept.
    min_vruntime: u64,
}

impl SchedulerState {
    fn pick_next(&mut self) -> ThreadId {
        if self.ready.is_empty() {
            return ThreadId(0);
        }
        let table = THREAD_TABLE.lock();
        let mut best_idx = 0;
        let mut best_vruntime = u64::MAX;
        for (i, &tid) in self.ready.iter().enumerate() {
            if let Some(t) = table.get(tid) {
                if t.vruntime < best_vruntime {
                    best_vruntime = t.vruntime;
                    best_idx = i;
                }
            }
        }
        self.ready.remove(best_idx)
    }
}

/// Dedicated stack for the idle thread, which never comes from the general
/// per-thread kernel-stack pool.
#[repr(align(16))]
struct IdleStack([u8; crate::config::KERNEL_STACK_SIZE]);
static mut IDLE_STACK: IdleStack = IdleStack([0; crate::config::KERNEL_STACK_SIZE]);

lazy_static::lazy_static! {
    static ref SCHEDULER: Mutex<SchedulerState> = Mutex::new(SchedulerState {
        current: ThreadId(0),
        ready: Vec::new(),
        min_vruntime: 0,
        idle: {
            // SAFETY: this runs exactly once, before any other code could
            // reference IDLE_STACK.
            let stack_top = unsafe {
                core::ptr::addr_of_mut!(IDLE_STACK.0) as u64 + crate::config::KERNEL_STACK_SIZE as u64
            };
            Thread {
                id: ThreadId(0),
                process: crate::process::pcb::KERNEL_PID,
                state: ThreadState::Running,
                nice: 0,
                vruntime: u64::MAX,
                context: Context::new_kernel_thread(stack_top, idle_loop as usize, 0),
                kernel_stack_top: stack_top,
            }
        },
    });
}

extern "C" fn idle_loop(_arg: usize) -> ! {
    loop {
        crate::arch::x86_64::port::halt_once();
    }
}

pub fn current_thread_id() -> ThreadId {
    SCHEDULER.lock().current
}

/// Add a freshly created thread to the ready queue (spec §4.7 thread
/// creation hands the new thread straight to the scheduler). Clamps the
/// thread's vruntime up to `min_vruntime` first (spec §4.6) so it competes
/// fairly against threads that have been running all along.
pub fn enqueue_ready(tid: ThreadId) {
    let mut sched = SCHEDULER.lock();
    let floor = sched.min_vruntime;
    {
        let mut table = THREAD_TABLE.lock();
        if let Some(t) = table.get_mut(tid) {
            t.vruntime = t.vruntime.max(floor);
        }
    }
    sched.ready.push(tid);
}

/// Wake a blocked thread: mark it ready and requeue it (called from IRQ and
/// IPC wait-queue delivery).
pub fn wake_thread_by_id(tid: ThreadId) {
    if tid.0 == 0 {
        return;
    }
    let mut table = THREAD_TABLE.lock();
    if let Some(t) = table.get_mut(tid) {
        t.state = ThreadState::Ready;
    } else {
        return;
    }
    drop(table);
    enqueue_ready(tid);
}

/// Timer-interrupt-driven preemption point (spec §4.6): charge the running
/// thread for one tick's worth of vruntime, weighted by its nice value, and
/// reschedule if a ready thread now has a smaller vruntime.
pub fn tick() {
    let mut sched = SCHEDULER.lock();
    let current = sched.current;
    if current.0 != 0 {
        let mut table = THREAD_TABLE.lock();
        if let Some(t) = table.get_mut(current) {
            let weight = crate::sched::nice::weight_for_nice(t.nice).max(1);
            let delta = NS_PER_TICK * crate::sched::nice::WEIGHT_AT_NICE_0 as u64 / weight as u64;
            t.vruntime = t.vruntime.saturating_add(delta);
            sched.min_vruntime = sched.min_vruntime.max(t.vruntime);
        }
    }

    let should_switch = {
        let table = THREAD_TABLE.lock();
        let current_vruntime = table.get(current).map(|t| t.vruntime).unwrap_or(u64::MAX);
        sched
            .ready
            .iter()
            .filter_map(|&tid| table.get(tid))
            .any(|t| t.vruntime < current_vruntime)
    };

    if should_switch {
        let next = sched.pick_next();
        if current.0 != 0 {
            sched.ready.push(current);
        }
        switch_to(sched, next);
    }
}

/// Voluntary yield (spec §4.6): give up the CPU without being forced by the
/// timer.
pub fn yield_cpu() {
    let mut sched = SCHEDULER.lock();
    let current = sched.current;
    let next = sched.pick_next();
    if next == current {
        return;
    }
    if current.0 != 0 {
        sched.ready.push(current);
    }
    switch_to(sched, next);
}

/// Block the calling thread: remove it from scheduling entirely until a
/// later [`wake_thread_by_id`] re-adds it to the ready queue.
pub fn block_current() {
    let mut sched = SCHEDULER.lock();
    let current = sched.current;
    if current.0 != 0 {
        let mut table = THREAD_TABLE.lock();
        if let Some(t) = table.get_mut(current) {
            t.state = ThreadState::Blocked;
        }
    }
    let next = sched.pick_next();
    switch_to(sched, next);
}

/// Remove the calling thread from scheduling permanently and switch away,
/// never returning. Unlike [`block_current`], this does not touch the
/// thread's `state` field: the caller (`thread_exit`/`process_exit`) has
/// already set it to `Zombie`, and overwriting that with `Blocked` would
/// make the thread look resumable when it never will be again.
pub fn retire_current() -> ! {
    let mut sched = SCHEDULER.lock();
    let next = sched.pick_next();
    switch_to(sched, next);
    unreachable!("retired thread's context was never resumed")
}

/// Takes the `SCHEDULER` guard by value and drops it before the actual
/// context switch: `switch_context` doesn't return until something switches
/// back to this thread, so holding the lock across it would leave `SCHEDULER`
/// permanently locked while this thread is off-CPU, deadlocking the very
/// first `tick`/`yield_cpu`/`block_current` call any other thread makes. The
/// raw context pointers stay valid after the guard drops because they point
/// into the `'static` `SCHEDULER`/`THREAD_TABLE` storage, not into the guard
/// itself.
fn switch_to(mut sched: spin::MutexGuard<'_, SchedulerState>, next: ThreadId) {
    let prev = sched.current;
    sched.current = next;
    if prev == next {
        return;
    }

    let idle_ctx_ptr = &mut sched.idle.context as *mut Context;

    let from_ctx: *mut Context = if prev.0 == 0 {
        idle_ctx_ptr
    } else {
        let mut table = THREAD_TABLE.lock();
        table.get_mut(prev).map(|t| &mut t.context as *mut Context).expect("current thread missing")
    };

    let to_ctx: *const Context = if next.0 == 0 {
        idle_ctx_ptr as *const Context
    } else {
        let table = THREAD_TABLE.lock();
        table.get(next).map(|t| &t.context as *const Context).expect("next thread missing")
    };

    drop(sched);

    // SAFETY: both pointers reference live Context values (the idle
    // thread's static context, or a live entry in THREAD_TABLE looked up
    // just above) belonging to threads that cannot be running anywhere
    // else on this single-core kernel. The SCHEDULER guard was dropped
    // just above, so the other thread can freely reacquire it once this
    // switch lands on its stack.
    unsafe {
        switch_context(from_ctx, to_ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_thread_id_is_zero() {
        assert_eq!(current_thread_id(), ThreadId(0));
    }

    #[test]
    fn enqueue_ready_clamps_to_min_vruntime() {
        let stack: [u64; 16] = [0; 16];
        let stack_top = stack.as_ptr() as u64 + core::mem::size_of_val(&stack) as u64;
        let thread = Thread {
            id: ThreadId(0),
            process: crate::process::pcb::ProcessId(0),
            state: ThreadState::Blocked,
            nice: 0,
            vruntime: 10,
            context: Context::new_kernel_thread(stack_top, idle_loop as usize, 0),
            kernel_stack_top: stack_top,
        };
        let tid = THREAD_TABLE.lock().insert(thread).unwrap();

        SCHEDULER.lock().min_vruntime = 1_000;
        enqueue_ready(tid);

        assert_eq!(THREAD_TABLE.lock().get(tid).unwrap().vruntime, 1_000);
    }
}
