//! IRQ objects and delivery (spec §3 IRQ object, §4.10 IRQ Delivery).
//!
//! Exactly one [`IrqObject`] exists per hardware line. The in-kernel
//! interrupt entry looks the object up, increments its pending counter, and
//! wakes one waiter; `irq_ack` re-enables the line through whichever
//! [`IrqController`] backend is active.

use spin::Mutex;

use crate::config::MAX_IRQ_OBJECTS;
use crate::error::SchedError;
use crate::process::thread::ThreadId;
use crate::sched::queue::WaitQueue;

pub mod ioport;
pub use ioport::{IoPortTable, IOPORT_TABLE};

/// Abstraction over the two alternative EOI-capable hardware interrupt
/// controllers the core consumes (spec §6): legacy 8259 and local-APIC.
pub trait IrqController: Send + Sync {
    fn mask(&self, irq: u8);
    fn unmask(&self, irq: u8);
    fn eoi(&self, irq: u8);
}

/// One kernel object per hardware IRQ line.
pub struct IrqObject {
    pub irq: u8,
    pub in_use: bool,
    pub pending: u32,
    pub waiters: WaitQueue,
}

impl IrqObject {
    const fn new() -> Self {
        IrqObject {
            irq: 0,
            in_use: false,
            pending: 0,
            waiters: WaitQueue::new(),
        }
    }
}

pub struct IrqTable {
    objects: [IrqObject; MAX_IRQ_OBJECTS],
}

impl IrqTable {
    const fn new() -> Self {
        IrqTable {
            objects: [const { IrqObject::new() }; MAX_IRQ_OBJECTS],
        }
    }

    /// Create the (sole) IRQ object for `irq`. Fails if one already exists
    /// on this line (spec §3: "creating a second on the same line fails").
    pub fn create(&mut self, irq: u8) -> Result<usize, SchedError> {
        if self.objects.iter().any(|o| o.in_use && o.irq == irq) {
            return Err(SchedError::NotFound);
        }
        let slot = self
            .objects
            .iter()
            .position(|o| !o.in_use)
            .ok_or(SchedError::PoolExhausted)?;
        self.objects[slot] = IrqObject {
            irq,
            in_use: true,
            pending: 0,
            waiters: WaitQueue::new(),
        };
        Ok(slot)
    }

    fn find_by_irq(&mut self, irq: u8) -> Option<&mut IrqObject> {
        self.objects.iter_mut().find(|o| o.in_use && o.irq == irq)
    }

    pub fn get(&mut self, slot: usize) -> Option<&mut IrqObject> {
        self.objects.get_mut(slot).filter(|o| o.in_use)
    }

    /// Called from interrupt context: bump the pending counter and wake one
    /// waiter, if any (spec §4.10).
    pub fn on_hardware_irq(&mut self, irq: u8) {
        if let Some(obj) = self.find_by_irq(irq) {
            obj.pending = obj.pending.saturating_add(1);
            if let Some(tid) = obj.waiters.dequeue() {
                crate::sched::wake_thread_by_id(tid);
            }
        }
    }

    /// `irq_wait(slot)`: decrement and return immediately if pending, else
    /// block the calling thread on the object's wait queue.
    pub fn wait(&mut self, slot: usize, caller: ThreadId) -> IrqWaitOutcome {
        match self.objects.get_mut(slot).filter(|o| o.in_use) {
            None => IrqWaitOutcome::NoSuchObject,
            Some(obj) => {
                if obj.pending > 0 {
                    obj.pending -= 1;
                    IrqWaitOutcome::Ready
                } else {
                    obj.waiters.enqueue(caller);
                    IrqWaitOutcome::Blocked
                }
            }
        }
    }
}

pub enum IrqWaitOutcome {
    Ready,
    Blocked,
    NoSuchObject,
}

lazy_static::lazy_static! {
    pub static ref IRQ_TABLE: Mutex<IrqTable> = Mutex::new(IrqTable::new());
}

/// Called from the generic IDT IRQ stub. Vector-to-line mapping and EOI are
/// handled by the active arch controller; here we only touch the kernel
/// object. The timer line is filtered out (consumed entirely by the
/// scheduler, never delivered to user space, per spec §4.10).
pub fn dispatch_from_idt() {
    let irq = crate::arch::x86_64::interrupts::last_irq_line();
    if irq == 0 {
        return; // timer: handled directly in the IDT timer stub
    }
    IRQ_TABLE.lock().on_hardware_irq(irq);
    crate::arch::x86_64::interrupts::active_controller().eoi(irq);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_object_on_same_line_fails() {
        let mut table = IrqTable::new();
        table.create(5).unwrap();
        assert!(table.create(5).is_err());
    }

    #[test]
    fn wait_consumes_pending_count() {
        let mut table = IrqTable::new();
        let slot = table.create(1).unwrap();
        table.on_hardware_irq(1);
        match table.wait(slot, ThreadId(1)) {
            IrqWaitOutcome::Ready => {}
            _ => panic!("expected ready"),
        }
        match table.wait(slot, ThreadId(1)) {
            IrqWaitOutcome::Blocked => {}
            _ => panic!("expected blocked"),
        }
    }
}
