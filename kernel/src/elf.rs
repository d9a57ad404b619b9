//! ELF64 loader (spec §4.12).
//!
//! Validates every `PT_LOAD` segment up front — a W^X violation anywhere
//! must leave nothing mapped (spec §8) — then loads each one in two
//! phases: map writable first and copy file bytes in (the source file
//! lives outside the target address space, so this must happen before
//! permissions are locked down), then remap with the segment's real
//! flags. A segment requesting both write and execute is rejected outright
//! (spec §3 W^X invariant) rather than silently stripped.

use alloc::vec::Vec;

use crate::config::USER_BASE;
use crate::error::ElfError;
use crate::mm::frame_allocator::{FRAME_ALLOCATOR, FRAME_SIZE};
use crate::mm::page_table::PageFlags;
use crate::mm::vas::{self, AddressSpaceId};

const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
const ELFCLASS64: u8 = 2;
const ELFDATA2LSB: u8 = 1;
const ET_EXEC: u16 = 2;
const ET_DYN: u16 = 3;
const EM_X86_64: u16 = 62;
const PT_LOAD: u32 = 1;

const PF_X: u32 = 1 << 0;
const PF_W: u32 = 1 << 1;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct Elf64Header {
    magic: [u8; 4],
    class: u8,
    data: u8,
    version: u8,
    os_abi: u8,
    abi_version: u8,
    padding: [u8; 7],
    elf_type: u16,
    machine: u16,
    version2: u32,
    entry: u64,
    phoff: u64,
    shoff: u64,
    flags: u32,
    ehsize: u16,
    phentsize: u16,
    phnum: u16,
    shentsize: u16,
    shnum: u16,
    shstrndx: u16,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct Elf64ProgramHeader {
    p_type: u32,
    p_flags: u32,
    p_offset: u64,
    p_vaddr: u64,
    p_paddr: u64,
    p_filesz: u64,
    p_memsz: u64,
    p_align: u64,
}

pub struct LoadResult {
    pub entry_point: u64,
    pub lowest: u64,
    pub highest: u64,
}

/// A `PT_LOAD` segment after validation, ready to be mapped.
struct ValidatedSegment {
    file_offset: usize,
    file_end: usize,
    final_flags: PageFlags,
    page_start: u64,
    page_end: u64,
    span: usize,
    dst_offset: usize,
    filesz: usize,
    memsz: usize,
}

fn read_header(image: &[u8]) -> Result<Elf64Header, ElfError> {
    if image.len() < core::mem::size_of::<Elf64Header>() {
        return Err(ElfError::HeadersOutOfBounds);
    }
    // SAFETY: `Elf64Header` is `repr(C)` with no padding-sensitive invariants
    // beyond size, and we just checked `image` is long enough.
    let header = unsafe { core::ptr::read_unaligned(image.as_ptr() as *const Elf64Header) };
    if header.magic != ELF_MAGIC {
        return Err(ElfError::BadMagic);
    }
    if header.class != ELFCLASS64 {
        return Err(ElfError::UnsupportedClass);
    }
    if header.data != ELFDATA2LSB {
        return Err(ElfError::UnsupportedEndian);
    }
    if header.machine != EM_X86_64 {
        return Err(ElfError::UnsupportedMachine);
    }
    if header.version != 1 {
        return Err(ElfError::BadVersion);
    }
    if header.elf_type != ET_EXEC && header.elf_type != ET_DYN {
        return Err(ElfError::BadVersion);
    }
    if header.phnum == 0 {
        return Err(ElfError::NoProgramHeaders);
    }
    Ok(header)
}

fn program_headers(image: &[u8], header: &Elf64Header) -> Result<&[Elf64ProgramHeader], ElfError> {
    let phentsize = header.phentsize as usize;
    let phnum = header.phnum as usize;
    if phentsize != core::mem::size_of::<Elf64ProgramHeader>() {
        return Err(ElfError::HeadersOutOfBounds);
    }
    let start = header.phoff as usize;
    let total = phentsize.checked_mul(phnum).ok_or(ElfError::HeadersOutOfBounds)?;
    let end = start.checked_add(total).ok_or(ElfError::HeadersOutOfBounds)?;
    if end > image.len() {
        return Err(ElfError::HeadersOutOfBounds);
    }
    // SAFETY: bounds checked above; `Elf64ProgramHeader` has no invalid bit
    // patterns to guard against (plain integer fields).
    let slice = unsafe {
        core::slice::from_raw_parts(image[start..].as_ptr() as *const Elf64ProgramHeader, phnum)
    };
    Ok(slice)
}

fn segment_flags(p_flags: u32) -> Result<PageFlags, ElfError> {
    let writable = p_flags & PF_W != 0;
    let executable = p_flags & PF_X != 0;
    if writable && executable {
        return Err(ElfError::WriteXorExecute);
    }
    let mut flags = PageFlags::USER | PageFlags::NO_EXECUTE;
    if writable {
        flags |= PageFlags::WRITABLE;
    }
    if executable {
        flags.remove(PageFlags::NO_EXECUTE);
    }
    Ok(flags)
}

/// Load `image` into `space`, whose region list must currently be empty in
/// the segments' target range. Returns the entry point and the lowest/
/// highest virtual addresses any segment touched.
pub fn load(space: AddressSpaceId, image: &[u8]) -> Result<LoadResult, ElfError> {
    let header = read_header(image)?;
    let phdrs = program_headers(image, &header)?;

    // Validate every PT_LOAD segment before mapping any of them: a W^X (or
    // any other) violation in a later header must leave nothing mapped.
    let mut segments = Vec::with_capacity(phdrs.len());
    for ph in phdrs.iter().filter(|ph| ph.p_type == PT_LOAD) {
        if ph.p_filesz > ph.p_memsz {
            return Err(ElfError::SegmentOutOfBounds);
        }
        let file_offset = ph.p_offset as usize;
        let file_end = file_offset.checked_add(ph.p_filesz as usize).ok_or(ElfError::SegmentOutOfBounds)?;
        if file_end > image.len() {
            return Err(ElfError::SegmentOutOfBounds);
        }
        if ph.p_vaddr < USER_BASE {
            return Err(ElfError::SegmentNotInUserSpace);
        }

        let final_flags = segment_flags(ph.p_flags)?;

        let page_start = ph.p_vaddr & !0xFFF;
        let page_end = (ph.p_vaddr + ph.p_memsz + 0xFFF) & !0xFFF;
        let span = (page_end - page_start) as usize;
        let dst_offset = (ph.p_vaddr - page_start) as usize;

        segments.push(ValidatedSegment {
            file_offset,
            file_end,
            final_flags,
            page_start,
            page_end,
            span,
            dst_offset,
            filesz: ph.p_filesz as usize,
            memsz: ph.p_memsz as usize,
        });
    }

    let mut lowest = u64::MAX;
    let mut highest = 0u64;

    for seg in &segments {
        let pages = seg.span / FRAME_SIZE;
        let frame = FRAME_ALLOCATOR.lock().alloc_frames(pages).map_err(|_| ElfError::Vas(crate::error::VasError::OutOfMemory))?;

        // Phase 1: map writable so the file bytes can be copied in.
        vas::map_region(
            space,
            seg.page_start,
            frame.addr(),
            seg.span,
            PageFlags::WRITABLE | PageFlags::USER | PageFlags::NO_EXECUTE,
        )?;

        let virt_base = FRAME_ALLOCATOR.lock().phys_to_virt(frame.addr());
        // SAFETY: the frame we just mapped is exclusively owned by this load
        // and reachable through the HHDM at `virt_base`; `dst_offset +
        // filesz` fits within `span` by construction above.
        unsafe {
            let base = virt_base as *mut u8;
            core::ptr::write_bytes(base, 0, seg.span);
            let dst = (virt_base as usize + seg.dst_offset) as *mut u8;
            core::ptr::copy_nonoverlapping(image[seg.file_offset..seg.file_end].as_ptr(), dst, seg.filesz);
        }
        let _ = seg.memsz;

        // Phase 2: remap with the segment's real, W^X-enforced flags.
        if seg.final_flags != (PageFlags::WRITABLE | PageFlags::USER | PageFlags::NO_EXECUTE) {
            vas::unmap_region(space, seg.page_start)?;
            vas::map_region(space, seg.page_start, frame.addr(), seg.span, seg.final_flags)?;
        }

        lowest = lowest.min(seg.page_start);
        highest = highest.max(seg.page_end);
    }

    if lowest > highest {
        return Err(ElfError::NoProgramHeaders);
    }

    Ok(LoadResult { entry_point: header.entry, lowest, highest })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_magic() {
        let image = [0u8; 64];
        assert_eq!(read_header(&image), Err(ElfError::BadMagic));
    }

    #[test]
    fn rejects_truncated_header() {
        let image = [0x7f, b'E', b'L', b'F'];
        assert_eq!(read_header(&image), Err(ElfError::HeadersOutOfBounds));
    }

    #[test]
    fn writable_and_executable_segment_rejected() {
        assert_eq!(segment_flags(PF_W | PF_X), Err(ElfError::WriteXorExecute));
    }

    #[test]
    fn readonly_executable_segment_allowed() {
        let flags = segment_flags(PF_X).unwrap();
        assert!(!flags.contains(PageFlags::NO_EXECUTE));
        assert!(!flags.contains(PageFlags::WRITABLE));
    }
}
