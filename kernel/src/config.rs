//! Compile-time design parameters.
//!
//! Pool capacities and similar constants are, per the design notes, "design
//! parameters, not contracts" — centralized here rather than scattered so a
//! test harness can see them all at a glance.

/// Scheduler tick frequency (Hz). Spec allows 100-1000; pick the middle.
pub const TIMER_HZ: u32 = 250;

pub const MAX_ADDRESS_SPACES: usize = 64;
pub const MAX_THREADS: usize = 256;
pub const MAX_PROCESSES: usize = 64;
pub const MAX_ENDPOINTS: usize = 256;
pub const MAX_CHANNELS: usize = 128;
pub const MAX_IRQ_OBJECTS: usize = 16;
pub const MAX_IOPORT_OBJECTS: usize = 32;
pub const MAX_CAP_TABLES: usize = 64;

/// Total kernel-object arena size across every kind (spec §3/§4.5).
pub const MAX_OBJECTS: usize = 2048;

/// Capability slots per process (spec §3, §9).
pub const CAP_SLOTS_PER_TABLE: usize = 1024;

/// Threads per process (spec §3: "thread set (≤64)").
pub const MAX_THREADS_PER_PROCESS: usize = 64;

/// Process name length (spec §3: "name (≤32 bytes)").
pub const MAX_PROCESS_NAME: usize = 32;

/// Kernel stack size per thread (spec §3/§4.7).
pub const KERNEL_STACK_SIZE: usize = 16 * 1024;

/// Pending-message queue capacity per IPC endpoint (spec §3/§4.9).
pub const IPC_QUEUE_CAPACITY: usize = 16;

/// Inline message payload capacity (spec §3).
pub const MESSAGE_PAYLOAD_MAX: usize = 256;

/// Capability slot references carried per message (spec §3/§4.9).
pub const MESSAGE_CAP_SLOTS: usize = 4;

/// Default user-mode stack size (spec §6).
pub const DEFAULT_USER_STACK_SIZE: usize = 64 * 1024;

/// Lowest valid user-space address (spec §6 address layout).
pub const USER_BASE: u64 = 0x0000_0000_0040_0000;

/// First address past the user half of the address space (spec §6).
pub const USER_TOP: u64 = 0x0000_7FFF_FFFF_FFFF;

/// Top of the default per-thread user stack (spec §6); stacks grow down
/// from here, [`DEFAULT_USER_STACK_SIZE`] bytes by default.
pub const USER_STACK_TOP: u64 = 0x0000_7FFF_FFF0_0000;

/// Lowest address of the kernel's half of every address space (spec §6).
pub const KERNEL_BASE: u64 = 0xFFFF_FFFF_8000_0000;
