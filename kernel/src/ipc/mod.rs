//! IPC endpoints and channels (spec §3/§4.9): synchronous message passing
//! with capability transfer.

pub mod endpoint;
pub mod message;

use spin::Mutex;

use crate::cap::table::CapabilityTable;
use crate::config::{MAX_CHANNELS, MAX_ENDPOINTS};
use crate::error::IpcError;
use crate::process::thread::ThreadId;
use endpoint::{Channel, Endpoint};
pub use message::Message;

pub struct EndpointTable {
    slots: [Option<Endpoint>; MAX_ENDPOINTS],
}

impl EndpointTable {
    const fn new() -> Self {
        EndpointTable { slots: [const { None }; MAX_ENDPOINTS] }
    }

    pub fn create(&mut self) -> Option<usize> {
        let slot = self.slots.iter().position(|s| s.is_none())?;
        self.slots[slot] = Some(Endpoint::new());
        Some(slot)
    }

    /// Create an async-mode endpoint (spec §4.9): `try_send` reports
    /// `QueueFull` instead of ever parking the sender.
    pub fn create_async(&mut self) -> Option<usize> {
        let slot = self.slots.iter().position(|s| s.is_none())?;
        self.slots[slot] = Some(Endpoint::new_async());
        Some(slot)
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut Endpoint> {
        self.slots.get_mut(slot)?.as_mut()
    }

    pub fn destroy(&mut self, slot: usize) {
        if let Some(s) = self.slots.get_mut(slot) {
            *s = None;
        }
    }
}

pub struct ChannelTable {
    slots: [Option<Channel>; MAX_CHANNELS],
}

impl ChannelTable {
    const fn new() -> Self {
        ChannelTable { slots: [const { None }; MAX_CHANNELS] }
    }

    pub fn create(&mut self) -> Option<usize> {
        let slot = self.slots.iter().position(|s| s.is_none())?;
        self.slots[slot] = Some(Channel::new());
        Some(slot)
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut Channel> {
        self.slots.get_mut(slot)?.as_mut()
    }

    pub fn destroy(&mut self, slot: usize) {
        if let Some(s) = self.slots.get_mut(slot) {
            *s = None;
        }
    }
}

lazy_static::lazy_static! {
    pub static ref ENDPOINT_TABLE: Mutex<EndpointTable> = Mutex::new(EndpointTable::new());
    pub static ref CHANNEL_TABLE: Mutex<ChannelTable> = Mutex::new(ChannelTable::new());
}

/// Non-blocking send: enqueue `msg` as-is. Capability slots it carries name
/// slots in the *sender's* table and stay unresolved until the eventual
/// receiver calls [`recv`] — the receiving process isn't known at send time
/// (any holder of a Handle-rights capability on this endpoint may call
/// `recv`), so capability installation happens there instead (spec §4.9).
/// A `WouldBlock`/`QueueFull` result means the caller should block the
/// current thread on the endpoint's `senders` queue and retry once woken.
pub fn send(endpoint_slot: usize, msg: Message) -> Result<(), IpcError> {
    let mut table = ENDPOINT_TABLE.lock();
    let ep = table.get_mut(endpoint_slot).ok_or(IpcError::Closed)?;
    ep.try_send(msg)?;
    endpoint::wake_one(&mut ep.receivers);
    Ok(())
}

/// Non-blocking receive. `None` means the caller should block on the
/// endpoint's `receivers` queue. Does not install any capabilities the
/// message carries — call [`install_caps`] once the sender's table is known.
pub fn recv(endpoint_slot: usize) -> Option<Message> {
    let mut table = ENDPOINT_TABLE.lock();
    let ep = table.get_mut(endpoint_slot)?;
    let msg = ep.try_recv();
    if msg.is_some() {
        endpoint::wake_one(&mut ep.senders);
    }
    msg
}

/// Whether `endpoint_slot` is in async mode (spec §4.9). A slot that no
/// longer resolves to a live endpoint is treated as non-async: the caller
/// is about to get a `Closed`/`NotFound` error from `send` anyway.
pub fn is_async(endpoint_slot: usize) -> bool {
    ENDPOINT_TABLE.lock().get_mut(endpoint_slot).map(|ep| ep.is_async()).unwrap_or(false)
}

/// Resolve and install the capability slots `msg` carries, from the
/// sending thread's table into the receiving thread's table (spec §4.9).
/// Called by the `cap_recv`/`cap_call` dispatch handlers once both tables
/// are known, after the message itself has already been dequeued.
pub fn install_caps(
    msg: &Message,
    sender_caps: &mut CapabilityTable,
    receiver_caps: &mut CapabilityTable,
) -> Result<[usize; crate::config::MESSAGE_CAP_SLOTS], IpcError> {
    endpoint::transfer_caps(sender_caps, receiver_caps, msg)
}

pub fn block_current_on_send(endpoint_slot: usize, caller: ThreadId) {
    let mut table = ENDPOINT_TABLE.lock();
    if let Some(ep) = table.get_mut(endpoint_slot) {
        endpoint::block_on(&mut ep.senders, caller);
    }
    drop(table);
    crate::sched::block_current();
}

pub fn block_current_on_recv(endpoint_slot: usize, caller: ThreadId) {
    let mut table = ENDPOINT_TABLE.lock();
    if let Some(ep) = table.get_mut(endpoint_slot) {
        endpoint::block_on(&mut ep.receivers, caller);
    }
    drop(table);
    crate::sched::block_current();
}
