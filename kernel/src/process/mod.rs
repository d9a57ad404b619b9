//! Process and thread lifecycle (spec §3/§4.7).

pub mod lifecycle;
pub mod pcb;
pub mod thread;

pub use pcb::{Process, ProcessId, ProcessState, PROCESS_TABLE};
pub use thread::{Thread, ThreadId, ThreadState, THREAD_TABLE};
