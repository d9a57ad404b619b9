//! RAII wrappers for kernel resources (adapted from the teacher's
//! `raii.rs`): automatic cleanup on drop for physical frames, mapped
//! regions, and capability slots, plus a generic scope guard.

use crate::cap::table::CapabilityTable;
use crate::mm::frame_allocator::{FrameNumber, FRAME_ALLOCATOR};
use crate::mm::vas::{self, AddressSpaceId};
use crate::println;

/// Returns a physical frame to the allocator when dropped.
pub struct FrameGuard {
    frame: FrameNumber,
}

impl FrameGuard {
    pub fn new(frame: FrameNumber) -> Self {
        FrameGuard { frame }
    }

    pub fn addr(&self) -> u64 {
        self.frame.addr()
    }

    /// Release ownership of the frame without freeing it.
    pub fn leak(self) -> FrameNumber {
        let frame = self.frame;
        core::mem::forget(self);
        frame
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        FRAME_ALLOCATOR.lock().free_frame(self.frame);
        println!("[raii] released frame at {:#x}", self.frame.addr());
    }
}

/// Unmaps a region from an address space when dropped (spec §4.3).
pub struct MappedRegionGuard {
    space: AddressSpaceId,
    vaddr: u64,
}

impl MappedRegionGuard {
    pub fn new(space: AddressSpaceId, vaddr: u64) -> Self {
        MappedRegionGuard { space, vaddr }
    }

    pub fn leak(self) {
        core::mem::forget(self);
    }
}

impl Drop for MappedRegionGuard {
    fn drop(&mut self) {
        if let Err(e) = vas::unmap_region(self.space, self.vaddr) {
            println!("[raii] warning: failed to unmap {:#x}: {e:?}", self.vaddr);
        } else {
            println!("[raii] unmapped region at {:#x}", self.vaddr);
        }
    }
}

/// Deletes a capability slot from its owning table when dropped.
pub struct CapabilityGuard<'a> {
    slot: usize,
    table: &'a mut CapabilityTable,
}

impl<'a> CapabilityGuard<'a> {
    pub fn new(slot: usize, table: &'a mut CapabilityTable) -> Self {
        CapabilityGuard { slot, table }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Release ownership of the slot without deleting it.
    pub fn leak(self) -> usize {
        let slot = self.slot;
        core::mem::forget(self);
        slot
    }
}

impl Drop for CapabilityGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.table.delete(self.slot) {
            println!("[raii] warning: failed to delete capability slot {}: {e:?}", self.slot);
        } else {
            println!("[raii] deleted capability slot {}", self.slot);
        }
    }
}

/// Macro to run cleanup code when the enclosing scope exits, success or not.
#[macro_export]
macro_rules! defer {
    ($e:expr) => {
        let _guard = $crate::raii::ScopeGuard::new(|| $e);
    };
}

/// Generic scope guard running arbitrary cleanup on drop.
pub struct ScopeGuard<F: FnOnce()> {
    cleanup: Option<F>,
}

impl<F: FnOnce()> ScopeGuard<F> {
    pub fn new(cleanup: F) -> Self {
        ScopeGuard { cleanup: Some(cleanup) }
    }

    pub fn cancel(mut self) {
        self.cleanup = None;
    }
}

impl<F: FnOnce()> Drop for ScopeGuard<F> {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_guard_runs_on_drop() {
        let mut cleaned = false;
        {
            let _guard = ScopeGuard::new(|| cleaned = true);
        }
        assert!(cleaned);
    }

    #[test]
    fn scope_guard_cancel_skips_cleanup() {
        let mut cleaned = false;
        {
            let guard = ScopeGuard::new(|| cleaned = true);
            guard.cancel();
        }
        assert!(!cleaned);
    }
}
