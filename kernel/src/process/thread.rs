//! Thread Control Block (spec §3/§4.7).

use alloc::vec::Vec;

use spin::Mutex;

use crate::arch::x86_64::context::Context;
use crate::config::MAX_THREADS;
use crate::error::SchedError;
use crate::process::pcb::ProcessId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub u64);

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Creating,
    Ready,
    Running,
    Blocked,
    Zombie,
    Dead,
}

pub struct Thread {
    pub id: ThreadId,
    pub process: ProcessId,
    pub state: ThreadState,
    pub nice: i8,
    /// Weighted-fair virtual runtime (spec §4.6); `u64::MAX` marks the idle
    /// thread, which never wins the run-queue ordering.
    pub vruntime: u64,
    pub context: Context,
    pub kernel_stack_top: u64,
}

impl Thread {
    pub fn is_idle(&self) -> bool {
        self.vruntime == u64::MAX
    }
}

/// Global thread pool (spec §9: "global `Kernel` value"). Regular threads
/// occupy ids `1..=MAX_THREADS`; id 0 is reserved for the per-core idle
/// thread, which lives outside this pool (see `sched::scheduler`).
pub struct ThreadTable {
    slots: Vec<Option<Thread>>,
}

impl ThreadTable {
    fn new() -> Self {
        let mut slots = Vec::with_capacity(MAX_THREADS + 1);
        for _ in 0..=MAX_THREADS {
            slots.push(None);
        }
        ThreadTable { slots }
    }

    pub fn insert(&mut self, mut thread: Thread) -> Result<ThreadId, SchedError> {
        let slot = self.slots.iter().skip(1).position(|s| s.is_none()).ok_or(SchedError::PoolExhausted)? + 1;
        thread.id = ThreadId(slot as u64);
        self.slots[slot] = Some(thread);
        Ok(ThreadId(slot as u64))
    }

    pub fn get(&self, id: ThreadId) -> Option<&Thread> {
        self.slots.get(id.0 as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, id: ThreadId) -> Option<&mut Thread> {
        self.slots.get_mut(id.0 as usize)?.as_mut()
    }

    pub fn remove(&mut self, id: ThreadId) -> Option<Thread> {
        self.slots.get_mut(id.0 as usize)?.take()
    }

    /// Obtain raw, simultaneously-live mutable pointers to two distinct
    /// threads' contexts, for the scheduler's `switch_context` call. Panics
    /// if `a == b`; the scheduler never switches a thread to itself.
    pub fn context_pair_mut(&mut self, a: ThreadId, b: ThreadId) -> (*mut Context, *mut Context) {
        assert_ne!(a, b, "cannot take two mutable context refs to the same thread");
        let base = self.slots.as_mut_ptr();
        // SAFETY: `a` and `b` are distinct in-bounds indices (checked above
        // and by the `Option::as_mut` below), so the two raw pointers never
        // alias the same memory.
        unsafe {
            let pa = (*base.add(a.0 as usize)).as_mut().expect("thread a missing") as *mut Thread;
            let pb = (*base.add(b.0 as usize)).as_mut().expect("thread b missing") as *mut Thread;
            (core::ptr::addr_of_mut!((*pa).context), core::ptr::addr_of_mut!((*pb).context))
        }
    }
}

lazy_static::lazy_static! {
    pub static ref THREAD_TABLE: Mutex<ThreadTable> = Mutex::new(ThreadTable::new());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_thread_detected_by_vruntime() {
        let stack: [u64; 16] = [0; 16];
        let stack_top = stack.as_ptr() as u64 + core::mem::size_of_val(&stack) as u64;
        let t = Thread {
            id: ThreadId(0),
            process: ProcessId(0),
            state: ThreadState::Ready,
            nice: 0,
            vruntime: u64::MAX,
            context: Context::new_kernel_thread(stack_top, trampoline_stub as usize, 0),
            kernel_stack_top: stack_top,
        };
        assert!(t.is_idle());
    }

    extern "C" fn trampoline_stub(_arg: usize) -> ! {
        loop {}
    }
}
