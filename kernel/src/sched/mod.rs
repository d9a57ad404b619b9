//! Weighted-fair single-core preemptive scheduler (spec §4.6).

pub mod nice;
pub mod queue;
pub mod scheduler;

pub use scheduler::{block_current, current_thread_id, enqueue_ready, retire_current, tick, wake_thread_by_id, yield_cpu};
