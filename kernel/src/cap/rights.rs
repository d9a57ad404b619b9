//! Capability rights bits (spec §3).

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Rights: u8 {
        const READ   = 1 << 0;
        const WRITE  = 1 << 1;
        const EXEC   = 1 << 2;
        const SEND   = 1 << 3;
        const HANDLE = 1 << 4;
        const GRANT  = 1 << 5;
    }
}
