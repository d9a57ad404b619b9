//! IPC endpoints and channels (spec §4.9).
//!
//! An [`Endpoint`] is a bounded FIFO of pending messages with a wait queue
//! on each side: senders block when the queue is full, receivers block when
//! it's empty. A [`Channel`] pairs two endpoints so a `call` can send then
//! block for a reply without the caller managing two object handles.

use alloc::collections::VecDeque;

use crate::cap::rights::Rights;
use crate::cap::table::CapabilityTable;
use crate::config::IPC_QUEUE_CAPACITY;
use crate::error::IpcError;
use crate::ipc::message::Message;
use crate::process::thread::ThreadId;
use crate::sched::queue::WaitQueue;

pub struct Endpoint {
    pending: VecDeque<Message>,
    pub receivers: WaitQueue,
    pub senders: WaitQueue,
    closed: bool,
    async_mode: bool,
}

impl Endpoint {
    pub fn new() -> Self {
        Endpoint {
            pending: VecDeque::with_capacity(IPC_QUEUE_CAPACITY),
            receivers: WaitQueue::new(),
            senders: WaitQueue::new(),
            closed: false,
            async_mode: false,
        }
    }

    /// An async endpoint whose `try_send` never blocks the caller: a full
    /// queue is reported as `QueueFull` rather than the sender being parked
    /// on `self.senders` (spec §4.9 async mode).
    pub fn new_async() -> Self {
        Endpoint { async_mode: true, ..Endpoint::new() }
    }

    pub fn is_async(&self) -> bool {
        self.async_mode
    }

    /// Enqueue `msg`, returning `QueueFull` if at capacity. For a
    /// synchronous endpoint the caller blocks the sender on `self.senders`
    /// and retries; for an async endpoint the caller must report the
    /// failure back to user space (`would_block`) instead (spec §4.9).
    pub fn try_send(&mut self, msg: Message) -> Result<(), IpcError> {
        if self.closed {
            return Err(IpcError::Closed);
        }
        if self.pending.len() >= IPC_QUEUE_CAPACITY {
            return Err(IpcError::QueueFull);
        }
        self.pending.push_back(msg);
        Ok(())
    }

    /// Dequeue the oldest pending message, if any.
    pub fn try_recv(&mut self) -> Option<Message> {
        self.pending.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.pending.len() >= IPC_QUEUE_CAPACITY
    }

    pub fn close(&mut self) {
        self.closed = true;
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new()
    }
}

/// A bidirectional pairing of two endpoints: `client_to_server` carries
/// `call`/`send`, `server_to_client` carries `reply`.
pub struct Channel {
    pub client_to_server: Endpoint,
    pub server_to_client: Endpoint,
}

impl Channel {
    pub fn new() -> Self {
        Channel {
            client_to_server: Endpoint::new(),
            server_to_client: Endpoint::new(),
        }
    }
}

impl Default for Channel {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy every capability slot named in `msg` from `sender` into `receiver`.
/// Each source slot must carry the Grant right or the whole transfer aborts
/// (spec §4.9); on any failure every slot already installed in `receiver`
/// this call is deleted before the error is returned — a partial transfer
/// must never be observable.
pub fn transfer_caps(
    sender: &mut CapabilityTable,
    receiver: &mut CapabilityTable,
    msg: &Message,
) -> Result<[usize; 4], IpcError> {
    let mut installed = [usize::MAX; 4];
    for (i, &slot) in msg.cap_slots().iter().enumerate() {
        let result = sender.lookup(slot).and_then(|(object, rights)| {
            if rights.contains(Rights::GRANT) {
                receiver.create(object, rights)
            } else {
                Err(crate::error::CapError::InsufficientRights)
            }
        });
        match result {
            Ok(dst_slot) => installed[i] = dst_slot,
            Err(e) => {
                for &done in installed.iter().take(i).filter(|&&s| s != usize::MAX) {
                    let _ = receiver.delete(done);
                }
                return Err(IpcError::Cap(e));
            }
        }
    }
    Ok(installed)
}

/// Wake one waiter from `from` into the scheduler's ready queue.
pub fn wake_one(queue: &mut WaitQueue) {
    if let Some(tid) = queue.dequeue() {
        crate::sched::wake_thread_by_id(tid);
    }
}

pub fn block_on(queue: &mut WaitQueue, caller: ThreadId) {
    queue.enqueue(caller);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_rejects_beyond_capacity() {
        let mut ep = Endpoint::new();
        for _ in 0..IPC_QUEUE_CAPACITY {
            ep.try_send(Message::new(ThreadId(1), b"x", &[])).unwrap();
        }
        assert_eq!(ep.try_send(Message::new(ThreadId(1), b"x", &[])), Err(IpcError::QueueFull));
    }

    #[test]
    fn recv_then_send_round_trips() {
        let mut ep = Endpoint::new();
        ep.try_send(Message::new(ThreadId(2), b"hello", &[])).unwrap();
        let msg = ep.try_recv().unwrap();
        assert_eq!(msg.data(), b"hello");
        assert!(ep.try_recv().is_none());
    }

    #[test]
    fn closed_endpoint_rejects_send() {
        let mut ep = Endpoint::new();
        ep.close();
        assert_eq!(ep.try_send(Message::new(ThreadId(1), b"x", &[])), Err(IpcError::Closed));
    }

    #[test]
    fn async_endpoint_reports_queue_full_instead_of_blocking() {
        let mut ep = Endpoint::new_async();
        assert!(ep.is_async());
        for _ in 0..IPC_QUEUE_CAPACITY {
            ep.try_send(Message::new(ThreadId(1), b"x", &[])).unwrap();
        }
        assert_eq!(ep.try_send(Message::new(ThreadId(1), b"x", &[])), Err(IpcError::QueueFull));
        let msg = ep.try_recv().unwrap();
        assert_eq!(msg.data(), b"x");
    }
}
