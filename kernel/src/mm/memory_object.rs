//! Memory objects (spec §3): a capability-nameable physical range, with the
//! flags the object was created with and a live mapping count. Unlike
//! endpoints or IRQ lines there is no user-facing "create" syscall for these
//! — they are minted by kernel bootstrap code (wrapping a bootloader module,
//! or a frame range handed to a new process) and handed out via
//! `process_create`'s `grants[]` or inherited from the parent.

use spin::Mutex;

use crate::config::MAX_PROCESSES;
use crate::error::CapError;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MemoryObjectFlags: u8 {
        const DEVICE     = 1 << 0;
        const SHARED     = 1 << 1;
        const DMA        = 1 << 2;
        const CONTIGUOUS = 1 << 3;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MemoryObject {
    pub phys_base: u64,
    pub len: u64,
    pub flags: MemoryObjectFlags,
    pub mapping_count: u32,
    in_use: bool,
}

impl MemoryObject {
    const fn empty() -> Self {
        MemoryObject { phys_base: 0, len: 0, flags: MemoryObjectFlags::empty(), mapping_count: 0, in_use: false }
    }
}

/// Sized generously: every process may hold a handful of memory objects
/// (its image, its module grants) alongside the 64-object address-space cap.
const MAX_MEMORY_OBJECTS: usize = MAX_PROCESSES * 4;

pub struct MemoryObjectTable {
    objects: [MemoryObject; MAX_MEMORY_OBJECTS],
}

impl MemoryObjectTable {
    const fn new() -> Self {
        MemoryObjectTable { objects: [MemoryObject::empty(); MAX_MEMORY_OBJECTS] }
    }

    pub fn create(&mut self, phys_base: u64, len: u64, flags: MemoryObjectFlags) -> Result<usize, CapError> {
        let slot = self.objects.iter().position(|o| !o.in_use).ok_or(CapError::PoolExhausted)?;
        self.objects[slot] = MemoryObject { phys_base, len, flags, mapping_count: 0, in_use: true };
        Ok(slot)
    }

    pub fn get(&self, slot: usize) -> Option<&MemoryObject> {
        self.objects.get(slot).filter(|o| o.in_use)
    }

    pub fn note_mapped(&mut self, slot: usize) {
        if let Some(o) = self.objects.get_mut(slot).filter(|o| o.in_use) {
            o.mapping_count += 1;
        }
    }

    pub fn note_unmapped(&mut self, slot: usize) {
        if let Some(o) = self.objects.get_mut(slot).filter(|o| o.in_use) {
            o.mapping_count = o.mapping_count.saturating_sub(1);
        }
    }
}

lazy_static::lazy_static! {
    pub static ref MEMORY_OBJECTS: Mutex<MemoryObjectTable> = Mutex::new(MemoryObjectTable::new());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_count_tracks_note_calls() {
        let mut table = MemoryObjectTable::new();
        let slot = table.create(0x10_0000, 4096, MemoryObjectFlags::empty()).unwrap();
        table.note_mapped(slot);
        table.note_mapped(slot);
        table.note_unmapped(slot);
        assert_eq!(table.get(slot).unwrap().mapping_count, 1);
    }
}
