//! Kernel object headers (spec §3/§4.5): a closed-set type tag, refcount,
//! generation, and a destroyed flag, shared by every object kind. The
//! kind-specific payload (a `Thread`, a `Process`, an IPC `Endpoint`, ...)
//! lives in that subsystem's own pool, indexed by the same [`ObjectId`] —
//! this registry only tracks the generation/refcount bookkeeping that
//! capability validity depends on.

use spin::Mutex;

use crate::config::MAX_OBJECTS;
use crate::error::CapError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    None,
    Memory,
    Thread,
    Process,
    IpcEndpoint,
    IpcChannel,
    Irq,
    IoPort,
    DeviceMmio,
}

#[derive(Debug, Clone, Copy)]
pub struct ObjectHeader {
    pub kind: ObjectKind,
    pub generation: u32,
    pub refcount: u32,
    pub destroyed: bool,
    /// Index into the owning subsystem's own pool (thread table slot,
    /// endpoint table slot, IRQ line slot, ...). The registry only tracks
    /// generation/refcount bookkeeping; this is the one piece of payload it
    /// carries so a capability lookup can find the real resource.
    pub payload: u32,
}

impl ObjectHeader {
    const fn empty() -> Self {
        ObjectHeader {
            kind: ObjectKind::None,
            generation: 0,
            refcount: 0,
            destroyed: true,
            payload: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectId(pub u32);

struct Registry {
    headers: [ObjectHeader; MAX_OBJECTS],
    next_hint: usize,
}

impl Registry {
    const fn new() -> Self {
        Registry {
            headers: [ObjectHeader::empty(); MAX_OBJECTS],
            next_hint: 0,
        }
    }
}

static REGISTRY: Mutex<Registry> = Mutex::new(Registry::new());

/// Allocate a fresh object slot of `kind`, generation 0, refcount 1.
pub fn create(kind: ObjectKind) -> Result<ObjectId, CapError> {
    create_with_payload(kind, 0)
}

/// Like [`create`], but stamps `payload` (the owning subsystem's own slot
/// index) into the header for later recovery.
pub fn create_with_payload(kind: ObjectKind, payload: u32) -> Result<ObjectId, CapError> {
    let mut reg = REGISTRY.lock();
    for offset in 0..MAX_OBJECTS {
        let idx = (reg.next_hint + offset) % MAX_OBJECTS;
        if reg.headers[idx].destroyed {
            let generation = reg.headers[idx].generation.wrapping_add(1);
            reg.headers[idx] = ObjectHeader {
                kind,
                generation,
                refcount: 1,
                destroyed: false,
                payload,
            };
            reg.next_hint = (idx + 1) % MAX_OBJECTS;
            return Ok(ObjectId(idx as u32));
        }
    }
    Err(CapError::PoolExhausted)
}

/// Recover the owning subsystem's slot index stamped at creation.
pub fn payload(id: ObjectId) -> Result<u32, CapError> {
    header(id).map(|h| h.payload)
}

pub fn header(id: ObjectId) -> Result<ObjectHeader, CapError> {
    REGISTRY
        .lock()
        .headers
        .get(id.0 as usize)
        .copied()
        .filter(|h| !h.destroyed)
        .ok_or(CapError::Invalidated)
}

pub fn incref(id: ObjectId) -> Result<(), CapError> {
    let mut reg = REGISTRY.lock();
    let h = reg.headers.get_mut(id.0 as usize).ok_or(CapError::SlotOutOfRange)?;
    if h.destroyed {
        return Err(CapError::Invalidated);
    }
    h.refcount += 1;
    Ok(())
}

/// Drop a reference; once it reaches zero the object is marked destroyed
/// (its slot becomes reusable by a later `create`).
pub fn decref(id: ObjectId) -> Result<bool, CapError> {
    let mut reg = REGISTRY.lock();
    let h = reg.headers.get_mut(id.0 as usize).ok_or(CapError::SlotOutOfRange)?;
    if h.destroyed {
        return Err(CapError::Invalidated);
    }
    h.refcount -= 1;
    if h.refcount == 0 {
        h.destroyed = true;
        return Ok(true);
    }
    Ok(false)
}

/// Revoke every outstanding capability to this object in one step (spec
/// §4.5): bump the generation so any capability slot whose stored
/// generation no longer matches is invalid on next lookup, mark the object
/// `destroyed`, and zero its refcount — the slot is reclaimed immediately
/// rather than waiting for every holder to `decref` a now-dead object.
pub fn revoke(id: ObjectId) -> Result<(), CapError> {
    let mut reg = REGISTRY.lock();
    let h = reg.headers.get_mut(id.0 as usize).ok_or(CapError::SlotOutOfRange)?;
    if h.destroyed {
        return Err(CapError::Invalidated);
    }
    h.generation = h.generation.wrapping_add(1);
    h.destroyed = true;
    h.refcount = 0;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revoke_invalidates_and_destroys() {
        let id = create(ObjectKind::Memory).unwrap();
        let before = REGISTRY.lock().headers[id.0 as usize].generation;
        revoke(id).unwrap();
        let after = REGISTRY.lock().headers[id.0 as usize];
        assert_ne!(before, after.generation);
        assert!(after.destroyed);
        assert_eq!(after.refcount, 0);
        assert_eq!(header(id), Err(CapError::Invalidated));
    }

    #[test]
    fn decref_to_zero_marks_destroyed() {
        let id = create(ObjectKind::Thread).unwrap();
        assert!(decref(id).unwrap());
        assert_eq!(header(id), Err(CapError::Invalidated));
    }
}
