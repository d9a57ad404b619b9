//! I/O-port range objects (spec §3): a capability-gated `[start, start+count)`
//! window checked on every `io_port_read`/`io_port_write`.

use spin::Mutex;

use crate::config::MAX_IOPORT_OBJECTS;
use crate::error::SchedError;

#[derive(Debug, Clone, Copy)]
pub struct IoPortObject {
    pub start: u16,
    pub count: u16,
    in_use: bool,
}

impl IoPortObject {
    const fn empty() -> Self {
        IoPortObject { start: 0, count: 0, in_use: false }
    }

    pub fn contains(&self, port: u16) -> bool {
        self.in_use && port >= self.start && (port - self.start) < self.count
    }
}

pub struct IoPortTable {
    objects: [IoPortObject; MAX_IOPORT_OBJECTS],
}

impl IoPortTable {
    const fn new() -> Self {
        IoPortTable { objects: [IoPortObject::empty(); MAX_IOPORT_OBJECTS] }
    }

    pub fn create(&mut self, start: u16, count: u16) -> Result<usize, SchedError> {
        let slot = self.objects.iter().position(|o| !o.in_use).ok_or(SchedError::PoolExhausted)?;
        self.objects[slot] = IoPortObject { start, count, in_use: true };
        Ok(slot)
    }

    pub fn get(&self, slot: usize) -> Option<&IoPortObject> {
        self.objects.get(slot).filter(|o| o.in_use)
    }

    pub fn destroy(&mut self, slot: usize) {
        if let Some(o) = self.objects.get_mut(slot) {
            o.in_use = false;
        }
    }
}

lazy_static::lazy_static! {
    pub static ref IOPORT_TABLE: Mutex<IoPortTable> = Mutex::new(IoPortTable::new());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_check_respects_count() {
        let mut table = IoPortTable::new();
        let slot = table.create(0x60, 2).unwrap();
        let obj = table.get(slot).unwrap();
        assert!(obj.contains(0x60));
        assert!(obj.contains(0x61));
        assert!(!obj.contains(0x62));
    }
}
