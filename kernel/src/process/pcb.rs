//! Process Control Block (spec §3/§4.7).

use alloc::vec::Vec;

use spin::Mutex;

use crate::cap::table::CapabilityTable;
use crate::config::{MAX_PROCESS_NAME, MAX_PROCESSES, MAX_THREADS_PER_PROCESS};
use crate::error::SchedError;
use crate::mm::vas::AddressSpaceId;
use crate::process::thread::ThreadId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(pub u64);

/// Kernel process: the reparenting target for orphaned children (spec §4.7).
pub const KERNEL_PID: ProcessId = ProcessId(0);

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Creating,
    Running,
    Zombie,
    Dead,
}

pub struct Process {
    pub pid: ProcessId,
    pub parent: Option<ProcessId>,
    pub name: FixedName,
    pub state: ProcessState,
    pub address_space: AddressSpaceId,
    pub capability_table: CapabilityTable,
    pub threads: Vec<ThreadId>,
    pub children: Vec<ProcessId>,
    pub exit_code: i32,
}

/// Fixed-capacity process name storage (spec §3: "name (≤32 bytes)").
#[derive(Debug, Clone, Copy)]
pub struct FixedName {
    bytes: [u8; MAX_PROCESS_NAME],
    len: usize,
}

impl FixedName {
    pub fn new(s: &str) -> Self {
        let mut bytes = [0u8; MAX_PROCESS_NAME];
        let len = s.len().min(MAX_PROCESS_NAME);
        bytes[..len].copy_from_slice(&s.as_bytes()[..len]);
        FixedName { bytes, len }
    }

    pub fn as_str(&self) -> &str {
        core::str::from_utf8(&self.bytes[..self.len]).unwrap_or("")
    }
}

impl Process {
    pub fn new(pid: ProcessId, parent: Option<ProcessId>, name: &str, address_space: AddressSpaceId) -> Self {
        Process {
            pid,
            parent,
            name: FixedName::new(name),
            state: ProcessState::Creating,
            address_space,
            capability_table: CapabilityTable::new(),
            threads: Vec::with_capacity(MAX_THREADS_PER_PROCESS),
            children: Vec::new(),
            exit_code: 0,
        }
    }
}

/// Global process table, id 0 reserved for the kernel process (spec §4.7:
/// orphans reparent to PID 0).
pub struct ProcessTable {
    slots: Vec<Option<Process>>,
}

impl ProcessTable {
    fn new() -> Self {
        let mut slots = Vec::with_capacity(MAX_PROCESSES + 1);
        for _ in 0..=MAX_PROCESSES {
            slots.push(None);
        }
        let mut table = ProcessTable { slots };
        table.slots[0] = Some(Process::new(KERNEL_PID, None, "kernel", 0));
        table.slots[0].as_mut().unwrap().state = ProcessState::Running;
        table
    }

    pub fn insert(&mut self, parent: Option<ProcessId>, name: &str, address_space: AddressSpaceId) -> Result<ProcessId, SchedError> {
        let slot = self.slots.iter().skip(1).position(|s| s.is_none()).ok_or(SchedError::PoolExhausted)? + 1;
        let pid = ProcessId(slot as u64);
        self.slots[slot] = Some(Process::new(pid, parent, name, address_space));
        if let Some(p) = parent.and_then(|pp| self.slots.get_mut(pp.0 as usize)).and_then(|s| s.as_mut()) {
            p.children.push(pid);
        }
        Ok(pid)
    }

    pub fn get(&self, pid: ProcessId) -> Option<&Process> {
        self.slots.get(pid.0 as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, pid: ProcessId) -> Option<&mut Process> {
        self.slots.get_mut(pid.0 as usize)?.as_mut()
    }

    pub fn remove(&mut self, pid: ProcessId) -> Option<Process> {
        self.slots.get_mut(pid.0 as usize)?.take()
    }

    /// Obtain raw, simultaneously-live mutable pointers to two distinct
    /// processes' capability tables, for cross-process IPC capability
    /// transfer (spec §4.9). Panics if `a == b`; same-process transfer is
    /// handled by the caller without this helper, since two `&mut` to the
    /// same table would alias.
    pub fn capability_pair_mut(&mut self, a: ProcessId, b: ProcessId) -> (*mut CapabilityTable, *mut CapabilityTable) {
        assert_ne!(a, b, "cannot take two mutable capability-table refs to the same process");
        let base = self.slots.as_mut_ptr();
        // SAFETY: `a` and `b` are distinct in-bounds indices (checked above
        // and by the `Option::as_mut` below), so the two raw pointers never
        // alias the same memory.
        unsafe {
            let pa = (*base.add(a.0 as usize)).as_mut().expect("process a missing") as *mut Process;
            let pb = (*base.add(b.0 as usize)).as_mut().expect("process b missing") as *mut Process;
            (core::ptr::addr_of_mut!((*pa).capability_table), core::ptr::addr_of_mut!((*pb).capability_table))
        }
    }

    /// Reparent every child of `pid` to the kernel process (spec §4.7).
    pub fn reparent_children_to_kernel(&mut self, pid: ProcessId) {
        let children = self.get(pid).map(|p| p.children.clone()).unwrap_or_default();
        for child in &children {
            if let Some(c) = self.get_mut(*child) {
                c.parent = Some(KERNEL_PID);
            }
        }
        if let Some(kernel) = self.get_mut(KERNEL_PID) {
            kernel.children.extend(children);
        }
    }
}

lazy_static::lazy_static! {
    pub static ref PROCESS_TABLE: Mutex<ProcessTable> = Mutex::new(ProcessTable::new());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_truncates_to_capacity() {
        let long = "x".repeat(MAX_PROCESS_NAME + 10);
        let name = FixedName::new(&long);
        assert_eq!(name.as_str().len(), MAX_PROCESS_NAME);
    }

    #[test]
    fn orphans_reparent_to_kernel_pid() {
        let mut table = ProcessTable::new();
        let parent = table.insert(Some(KERNEL_PID), "parent", 0).unwrap();
        let child = table.insert(Some(parent), "child", 0).unwrap();
        table.reparent_children_to_kernel(parent);
        assert_eq!(table.get(child).unwrap().parent, Some(KERNEL_PID));
    }
}
