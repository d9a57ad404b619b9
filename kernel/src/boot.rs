//! Bootloader contract adapter.
//!
//! Translates `bootloader_api::BootInfo` into the kernel's own, narrower
//! view: a memory map, an HHDM offset, an optional framebuffer descriptor,
//! and a list of loadable modules. This is the only file that names
//! `bootloader_api` types outside of `main.rs`'s entry point wiring.

use alloc::vec::Vec;

use bootloader_api::info::{MemoryRegionKind, MemoryRegions};

/// One entry of the physical memory map (spec §6).
#[derive(Debug, Clone, Copy)]
pub struct MemoryMapEntry {
    pub start: u64,
    pub end: u64,
    pub kind: MemoryKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryKind {
    Usable,
    Reserved,
    AcpiReclaimable,
    AcpiNvs,
    Bad,
    BootloaderReclaimable,
    ExecutableAndModules,
    Framebuffer,
    Unknown,
}

impl From<MemoryRegionKind> for MemoryKind {
    fn from(k: MemoryRegionKind) -> Self {
        match k {
            MemoryRegionKind::Usable => MemoryKind::Usable,
            MemoryRegionKind::Bootloader => MemoryKind::BootloaderReclaimable,
            MemoryRegionKind::UnknownUefi(_) => MemoryKind::Unknown,
            MemoryRegionKind::UnknownBios(_) => MemoryKind::Unknown,
            _ => MemoryKind::Unknown,
        }
    }
}

/// Framebuffer descriptor (spec §6): address, width, height, pitch, bpp.
#[derive(Debug, Clone, Copy)]
pub struct FramebufferInfo {
    pub addr: u64,
    pub width: usize,
    pub height: usize,
    pub pitch: usize,
    pub bpp: usize,
}

/// A loadable module handed in by the bootloader (spec §6).
#[derive(Debug, Clone, Copy)]
pub struct BootModule {
    pub phys_addr: u64,
    pub size: u64,
}

/// Kernel-facing view of everything the bootloader handed us.
pub struct BootContext {
    pub hhdm_offset: u64,
    pub framebuffer: Option<FramebufferInfo>,
    pub modules: Vec<BootModule>,
}

/// Iterate the bootloader's memory map, yielding our own [`MemoryMapEntry`].
pub fn iter_memory_map(regions: &MemoryRegions) -> impl Iterator<Item = MemoryMapEntry> + '_ {
    regions.iter().map(|r| MemoryMapEntry {
        start: r.start,
        end: r.end,
        kind: r.kind.into(),
    })
}

/// `addr` is the virtual address of the framebuffer's backing slice, which
/// only the caller (holding the `&mut FrameBuffer`, not just its `&info()`)
/// can obtain.
pub fn adapt_framebuffer(info: &bootloader_api::info::FrameBufferInfo, addr: u64) -> FramebufferInfo {
    FramebufferInfo {
        addr,
        width: info.width,
        height: info.height,
        pitch: info.stride * info.bytes_per_pixel,
        bpp: info.bytes_per_pixel * 8,
    }
}
