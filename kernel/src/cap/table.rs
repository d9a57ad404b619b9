//! Per-process capability table (spec §3/§4.5): 1024 dense slots, a used
//! bitmap, and a next-free hint. A slot's stored `generation` must match its
//! referenced object's current generation to be valid — revocation
//! invalidates every slot pointing at an object in one step by bumping the
//! object's generation rather than walking every table.

use crate::cap::object::{self, ObjectId};
use crate::cap::rights::Rights;
use crate::config::CAP_SLOTS_PER_TABLE;
use crate::error::CapError;

#[derive(Debug, Clone, Copy)]
struct CapSlot {
    object: ObjectId,
    rights: Rights,
    generation: u32,
}

pub struct CapabilityTable {
    slots: [Option<CapSlot>; CAP_SLOTS_PER_TABLE],
    used: [bool; CAP_SLOTS_PER_TABLE],
    next_free: usize,
}

impl CapabilityTable {
    pub const fn new() -> Self {
        CapabilityTable {
            slots: [None; CAP_SLOTS_PER_TABLE],
            used: [false; CAP_SLOTS_PER_TABLE],
            next_free: 0,
        }
    }

    /// Install a new capability to `object` at the first free slot.
    pub fn create(&mut self, object: ObjectId, rights: Rights) -> Result<usize, CapError> {
        let generation = object::header(object)?.generation;
        for offset in 0..CAP_SLOTS_PER_TABLE {
            let idx = (self.next_free + offset) % CAP_SLOTS_PER_TABLE;
            if !self.used[idx] {
                self.used[idx] = true;
                self.slots[idx] = Some(CapSlot { object, rights, generation });
                self.next_free = (idx + 1) % CAP_SLOTS_PER_TABLE;
                object::incref(object)?;
                return Ok(idx);
            }
        }
        Err(CapError::TableFull)
    }

    /// Install a capability at a caller-chosen slot (used when restoring a
    /// specific slot number, e.g. during IPC capability transfer rollback).
    pub fn create_at(&mut self, slot: usize, object: ObjectId, rights: Rights) -> Result<(), CapError> {
        if slot >= CAP_SLOTS_PER_TABLE {
            return Err(CapError::SlotOutOfRange);
        }
        if self.used[slot] {
            return Err(CapError::TableFull);
        }
        let generation = object::header(object)?.generation;
        self.used[slot] = true;
        self.slots[slot] = Some(CapSlot { object, rights, generation });
        object::incref(object)?;
        Ok(())
    }

    /// Resolve a slot to its object and rights, failing if the slot is
    /// empty or its generation is stale relative to the live object.
    pub fn lookup(&self, slot: usize) -> Result<(ObjectId, Rights), CapError> {
        let entry = self
            .slots
            .get(slot)
            .ok_or(CapError::SlotOutOfRange)?
            .ok_or(CapError::SlotEmpty)?;
        let live = object::header(entry.object)?;
        if live.generation != entry.generation {
            return Err(CapError::Invalidated);
        }
        Ok((entry.object, entry.rights))
    }

    /// Copy slot `src` into this table (or another) with `rights_mask`
    /// applied — rights never escalate across a copy, only narrow.
    pub fn copy(&mut self, src: usize, dst: &mut CapabilityTable, rights_mask: Rights) -> Result<usize, CapError> {
        let (object, rights) = self.lookup(src)?;
        dst.create(object, rights & rights_mask)
    }

    /// Remove a capability from a slot, dropping the object reference.
    /// Does not affect other slots referencing the same object (use
    /// [`object::revoke`] for that).
    pub fn delete(&mut self, slot: usize) -> Result<(), CapError> {
        let entry = self
            .slots
            .get(slot)
            .ok_or(CapError::SlotOutOfRange)?
            .ok_or(CapError::SlotEmpty)?;
        self.slots[slot] = None;
        self.used[slot] = false;
        let _ = object::decref(entry.object);
        Ok(())
    }

    /// Invalidate the referenced object (generation bump + destroyed +
    /// refcount zeroed, spec §4.5) so every capability table's slot that
    /// names it is invalid on next lookup, then clear this table's own
    /// slot — the revoking capability doesn't linger as a dangling `used`
    /// entry just because its object died through this path instead of
    /// `delete`.
    pub fn revoke(&mut self, slot: usize) -> Result<(), CapError> {
        let (object, _) = self.lookup(slot)?;
        object::revoke(object)?;
        self.slots[slot] = None;
        self.used[slot] = false;
        Ok(())
    }
}

impl Default for CapabilityTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cap::object::ObjectKind;

    #[test]
    fn copy_never_escalates_rights() {
        let obj = object::create(ObjectKind::Memory).unwrap();
        let mut src = CapabilityTable::new();
        let mut dst = CapabilityTable::new();
        let slot = src.create(obj, Rights::READ | Rights::WRITE).unwrap();
        let dst_slot = src.copy(slot, &mut dst, Rights::READ).unwrap();
        let (_, rights) = dst.lookup(dst_slot).unwrap();
        assert_eq!(rights, Rights::READ);
    }

    #[test]
    fn revoke_invalidates_all_slots_and_clears_the_revoking_one() {
        let obj = object::create(ObjectKind::IpcEndpoint).unwrap();
        let mut table = CapabilityTable::new();
        let mut other = CapabilityTable::new();
        let s1 = table.create(obj, Rights::SEND).unwrap();
        let s2 = table.copy(s1, &mut other, Rights::SEND).unwrap();

        table.revoke(s1).unwrap();

        // The revoking table's own slot is cleared, not merely invalidated.
        assert_eq!(table.lookup(s1), Err(CapError::SlotEmpty));
        // Every other slot naming the same object is invalidated.
        assert_eq!(other.lookup(s2), Err(CapError::Invalidated));
        assert_eq!(object::header(obj), Err(CapError::Invalidated));
    }

    #[test]
    fn lookup_empty_slot_fails() {
        let table = CapabilityTable::new();
        assert_eq!(table.lookup(5), Err(CapError::SlotEmpty));
    }
}
