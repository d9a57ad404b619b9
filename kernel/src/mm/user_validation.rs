//! User-pointer validation (spec §4.8): every syscall argument that is a
//! user-space pointer must be checked against the caller's address space
//! before the kernel dereferences it.

use crate::config::{USER_BASE, USER_TOP};
use crate::error::VasError;
use crate::mm::page_table::{self, PageFlags};
use crate::mm::vas::{self, AddressSpaceId};

/// Validate that `[ptr, ptr+len)` lies entirely within `[USER_BASE, USER_TOP)`,
/// is mapped present in `space`'s page tables, and — if `needs_write` — that
/// every page in range is writable.
pub fn validate(space: AddressSpaceId, ptr: u64, len: usize, needs_write: bool) -> Result<(), VasError> {
    if len == 0 {
        return Ok(());
    }
    let end = ptr.checked_add(len as u64).ok_or(VasError::NoSuchRegion)?;
    if ptr < USER_BASE || end > USER_TOP {
        return Err(VasError::NoSuchRegion);
    }
    let root = vas::root_of(space).ok_or(VasError::NoSuchRegion)?;

    let first_page = ptr & !0xFFF;
    let mut addr = first_page;
    while addr < end {
        let flags = page_table::get_flags(root, addr).ok_or(VasError::NotMapped)?;
        if !flags.contains(PageFlags::USER) {
            return Err(VasError::NotMapped);
        }
        if needs_write && !flags.contains(PageFlags::WRITABLE) {
            return Err(VasError::WriteXorExecute);
        }
        addr += 4096;
    }
    Ok(())
}

/// Copy `len` bytes from a validated user pointer into a kernel buffer.
///
/// # Safety
/// Caller must have already validated `user_ptr..user_ptr+len` with
/// [`validate`] against the currently active address space.
pub unsafe fn copy_from_user(user_ptr: u64, dst: &mut [u8]) {
    let src = user_ptr as *const u8;
    // SAFETY: delegated to caller per this function's own safety doc.
    unsafe {
        core::ptr::copy_nonoverlapping(src, dst.as_mut_ptr(), dst.len());
    }
}

/// Copy `src` into a validated user pointer.
///
/// # Safety
/// Caller must have already validated `user_ptr..user_ptr+src.len()` for
/// writing with [`validate`] against the currently active address space.
pub unsafe fn copy_to_user(user_ptr: u64, src: &[u8]) {
    let dst = user_ptr as *mut u8;
    // SAFETY: delegated to caller per this function's own safety doc.
    unsafe {
        core::ptr::copy_nonoverlapping(src.as_ptr(), dst, src.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_pointer_rejected() {
        assert_eq!(validate(0, USER_TOP - 4, 4096, false), Err(VasError::NoSuchRegion));
        assert_eq!(validate(0, 0, 16, false), Err(VasError::NoSuchRegion));
    }
}
