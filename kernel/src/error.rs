//! Stable syscall-visible error enumeration and per-subsystem error kinds.
//!
//! Each subsystem (paging, address-space, heap, capability, IPC, scheduler)
//! defines its own tagged error type. Those are funneled into
//! [`SyscallError`] exactly once, at the syscall dispatch boundary, never
//! earlier.

use core::fmt;

/// The stable, syscall-ABI-visible error enumeration (see spec §6/§7).
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallError {
    InvalidSyscall = -1,
    InvalidCapability = -2,
    PermissionDenied = -3,
    InvalidArgument = -4,
    OutOfMemory = -5,
    WouldBlock = -6,
    NotFound = -7,
    NotImplemented = -8,
    TypeMismatch = -9,
    TableFull = -10,
}

impl SyscallError {
    pub const fn code(self) -> isize {
        self as i32 as isize
    }
}

impl fmt::Display for SyscallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyscallError::InvalidSyscall => "invalid_syscall",
            SyscallError::InvalidCapability => "invalid_capability",
            SyscallError::PermissionDenied => "permission_denied",
            SyscallError::InvalidArgument => "invalid_argument",
            SyscallError::OutOfMemory => "out_of_memory",
            SyscallError::WouldBlock => "would_block",
            SyscallError::NotFound => "not_found",
            SyscallError::NotImplemented => "not_implemented",
            SyscallError::TypeMismatch => "type_mismatch",
            SyscallError::TableFull => "table_full",
        };
        f.write_str(s)
    }
}

/// Physical frame allocator errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    OutOfMemory,
}

impl From<FrameError> for SyscallError {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::OutOfMemory => SyscallError::OutOfMemory,
        }
    }
}

/// Page-table engine errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageTableError {
    AlreadyMapped,
    OutOfMemory,
    NotMapped,
}

impl From<PageTableError> for SyscallError {
    fn from(e: PageTableError) -> Self {
        match e {
            PageTableError::AlreadyMapped => SyscallError::InvalidArgument,
            PageTableError::OutOfMemory => SyscallError::OutOfMemory,
            PageTableError::NotMapped => SyscallError::NotFound,
        }
    }
}

/// Address-space manager errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VasError {
    Overlap,
    WriteXorExecute,
    OutOfMemory,
    NotMapped,
    NoSuchRegion,
}

impl From<VasError> for SyscallError {
    fn from(e: VasError) -> Self {
        match e {
            VasError::Overlap => SyscallError::InvalidArgument,
            VasError::WriteXorExecute => SyscallError::PermissionDenied,
            VasError::OutOfMemory => SyscallError::OutOfMemory,
            VasError::NotMapped => SyscallError::NotFound,
            VasError::NoSuchRegion => SyscallError::NotFound,
        }
    }
}

/// Kernel heap allocator errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
    OutOfMemory,
}

/// Capability / object-model errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapError {
    SlotOutOfRange,
    SlotEmpty,
    Invalidated,
    TypeMismatch,
    InsufficientRights,
    TableFull,
    PoolExhausted,
}

impl From<CapError> for SyscallError {
    fn from(e: CapError) -> Self {
        match e {
            CapError::SlotOutOfRange | CapError::SlotEmpty | CapError::Invalidated => {
                SyscallError::InvalidCapability
            }
            CapError::TypeMismatch => SyscallError::TypeMismatch,
            CapError::InsufficientRights => SyscallError::PermissionDenied,
            CapError::TableFull => SyscallError::TableFull,
            CapError::PoolExhausted => SyscallError::OutOfMemory,
        }
    }
}

/// IPC errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpcError {
    Closed,
    QueueFull,
    WouldBlock,
    Cap(CapError),
}

impl From<IpcError> for SyscallError {
    fn from(e: IpcError) -> Self {
        match e {
            IpcError::Closed => SyscallError::NotFound,
            IpcError::QueueFull => SyscallError::WouldBlock,
            IpcError::WouldBlock => SyscallError::WouldBlock,
            IpcError::Cap(c) => c.into(),
        }
    }
}

/// Scheduler / process-lifecycle errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedError {
    PoolExhausted,
    NotFound,
}

impl From<SchedError> for SyscallError {
    fn from(e: SchedError) -> Self {
        match e {
            SchedError::PoolExhausted => SyscallError::OutOfMemory,
            SchedError::NotFound => SyscallError::NotFound,
        }
    }
}

/// ELF loader errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfError {
    BadMagic,
    UnsupportedClass,
    UnsupportedEndian,
    UnsupportedMachine,
    BadVersion,
    NoProgramHeaders,
    HeadersOutOfBounds,
    SegmentOutOfBounds,
    SegmentNotInUserSpace,
    WriteXorExecute,
    Vas(VasError),
}

impl From<VasError> for ElfError {
    fn from(e: VasError) -> Self {
        ElfError::Vas(e)
    }
}

impl From<ElfError> for SyscallError {
    fn from(e: ElfError) -> Self {
        match e {
            ElfError::WriteXorExecute => SyscallError::PermissionDenied,
            ElfError::Vas(v) => v.into(),
            _ => SyscallError::InvalidArgument,
        }
    }
}
