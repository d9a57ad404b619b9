//! Fixed-shape IPC message (spec §3): a small header, an inline payload up
//! to [`MESSAGE_PAYLOAD_MAX`] bytes, and up to [`MESSAGE_CAP_SLOTS`]
//! capability-slot references to transfer alongside it.

use crate::config::{MESSAGE_CAP_SLOTS, MESSAGE_PAYLOAD_MAX};
use crate::process::thread::ThreadId;

#[derive(Debug, Clone, Copy)]
pub struct MessageHeader {
    pub sender: ThreadId,
    pub payload_len: usize,
    pub cap_count: usize,
}

#[derive(Clone, Copy)]
pub struct Message {
    pub header: MessageHeader,
    pub payload: [u8; MESSAGE_PAYLOAD_MAX],
    pub caps: [usize; MESSAGE_CAP_SLOTS],
}

impl Message {
    pub fn new(sender: ThreadId, data: &[u8], caps: &[usize]) -> Self {
        let payload_len = data.len().min(MESSAGE_PAYLOAD_MAX);
        let cap_count = caps.len().min(MESSAGE_CAP_SLOTS);
        let mut payload = [0u8; MESSAGE_PAYLOAD_MAX];
        payload[..payload_len].copy_from_slice(&data[..payload_len]);
        let mut cap_array = [0usize; MESSAGE_CAP_SLOTS];
        cap_array[..cap_count].copy_from_slice(&caps[..cap_count]);
        Message {
            header: MessageHeader { sender, payload_len, cap_count },
            payload,
            caps: cap_array,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.payload[..self.header.payload_len]
    }

    pub fn cap_slots(&self) -> &[usize] {
        &self.caps[..self.header.cap_count]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_payload_truncates_to_max() {
        let data = [7u8; MESSAGE_PAYLOAD_MAX + 64];
        let msg = Message::new(ThreadId(1), &data, &[]);
        assert_eq!(msg.data().len(), MESSAGE_PAYLOAD_MAX);
    }

    #[test]
    fn oversized_cap_list_truncates_to_max() {
        let caps = [1usize, 2, 3, 4, 5, 6];
        let msg = Message::new(ThreadId(1), b"hi", &caps);
        assert_eq!(msg.cap_slots().len(), MESSAGE_CAP_SLOTS);
    }
}
