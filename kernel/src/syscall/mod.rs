//! Syscall ABI dispatch (spec §4.8/§4.11/§6).
//!
//! `trap_entry` is called by the `int 0x80` naked-asm stub
//! (`arch::x86_64::idt::syscall_interrupt_handler`) with a pointer to the
//! full [`TrapFrame`] it built on the trapping thread's kernel stack. The
//! request number arrives in `rax`, arguments in `rdi, rsi, rdx, r10, r8, r9`
//! (Linux-style, not System V's `rdi, rsi, rdx, rcx, r8, r9`, since `rcx` is
//! clobbered by the `syscall` instruction on real hardware and this project
//! keeps the same convention for its software `int 0x80` gate). Each of the
//! twenty handlers below follows the same shape (spec §4.11): resolve the
//! current process and its capability table, validate any user pointers,
//! look up referenced capabilities by kind and required rights, invoke the
//! subsystem, translate its error into [`SyscallError`], and return a result
//! code that `trap_entry` writes back into `frame.rax`.

use crate::arch::x86_64::context::TrapFrame;
use crate::arch::x86_64::interrupts;
use crate::arch::x86_64::port;
use crate::cap::object::{self, ObjectId, ObjectKind};
use crate::cap::rights::Rights;
use crate::cap::table::CapabilityTable;
use crate::config::{MESSAGE_CAP_SLOTS, MESSAGE_PAYLOAD_MAX, USER_STACK_TOP};
use crate::error::{IpcError, SyscallError, VasError};
use crate::ipc::{self, Message, ENDPOINT_TABLE};
use crate::irq::{IrqWaitOutcome, IOPORT_TABLE, IRQ_TABLE};
use crate::mm::frame_allocator::FRAME_ALLOCATOR;
use crate::mm::memory_object::MEMORY_OBJECTS;
use crate::mm::page_table::PageFlags;
use crate::mm::user_validation;
use crate::mm::vas::{self, AddressSpaceId};
use crate::process::lifecycle;
use crate::process::pcb::{ProcessId, PROCESS_TABLE};
use crate::process::thread::THREAD_TABLE;
use crate::sched;

/// Entry point called directly from the `int 0x80` stub (spec §4.8).
///
/// # Safety
/// `frame` must point at a live [`TrapFrame`] on the trapping thread's own
/// kernel stack, exactly as `syscall_interrupt_handler`'s naked stub builds
/// it; this function (and anything it calls) must not outlive that stack
/// frame.
pub extern "C" fn trap_entry(frame: *mut TrapFrame) {
    // SAFETY: see this function's own safety doc; the naked stub guarantees
    // `frame` is valid for the duration of this call.
    let tf = unsafe { &mut *frame };
    let result = dispatch(tf);
    tf.rax = match result {
        Ok(v) => v as u64,
        Err(e) => e.code() as u64,
    };
}

fn dispatch(tf: &TrapFrame) -> Result<isize, SyscallError> {
    let (a1, a2, a3, a4, a5, a6) = (tf.rdi, tf.rsi, tf.rdx, tf.r10, tf.r8, tf.r9);
    match tf.rax {
        0 => cap_send(a1 as usize, a2, a3 as usize),
        1 => cap_recv(a1 as usize, a2, a3 as usize),
        2 => cap_call(a1 as usize, a2, a3 as usize, a4, a5 as usize),
        3 => cap_copy(a1 as usize, a2 as usize, a3),
        4 => cap_delete(a1 as usize),
        5 => cap_revoke(a1 as usize),
        6 => mem_map(a1 as usize, a2, a3 as usize, a4),
        7 => mem_unmap(a1, a2 as usize),
        8 => thread_create(a1, a2 as usize, a3),
        9 => thread_exit(a1 as i32),
        10 => thread_yield(),
        11 => process_create(a1 as usize, a2, a3 as usize),
        12 => process_exit(a1 as i32),
        13 => irq_wait(a1 as usize),
        14 => irq_ack(a1 as usize),
        15 => debug_print(a1, a2 as usize),
        16 => cap_info(a1 as usize),
        17 => process_info(a1),
        18 => io_port_read(a1 as usize, a2 as u16, a3 as u8),
        19 => io_port_write(a1 as usize, a2 as u16, a3, a4 as u8),
        _ => {
            let _ = a6;
            Err(SyscallError::InvalidSyscall)
        }
    }
}

// --- shared helpers -------------------------------------------------------

fn current_process() -> Result<ProcessId, SyscallError> {
    let tid = sched::current_thread_id();
    THREAD_TABLE.lock().get(tid).map(|t| t.process).ok_or(SyscallError::NotFound)
}

fn current_space() -> Result<AddressSpaceId, SyscallError> {
    let pid = current_process()?;
    PROCESS_TABLE.lock().get(pid).map(|p| p.address_space).ok_or(SyscallError::NotFound)
}

/// [`user_validation::validate`], with `NoSuchRegion`/`NotMapped` folded
/// into `invalid_argument` rather than `not_found` — from a syscall
/// caller's point of view a bad buffer pointer is a bad argument, not a
/// missing object.
fn validate_user(space: AddressSpaceId, ptr: u64, len: usize, needs_write: bool) -> Result<(), SyscallError> {
    user_validation::validate(space, ptr, len, needs_write).map_err(|e| match e {
        VasError::NoSuchRegion | VasError::NotMapped => SyscallError::InvalidArgument,
        other => other.into(),
    })
}

/// Resolve `slot` in the current process's capability table, requiring both
/// `required` rights and `kind`, and return the object together with the
/// owning subsystem's own slot index (`ObjectHeader::payload`).
fn lookup_typed(pid: ProcessId, slot: usize, kind: ObjectKind, required: Rights) -> Result<(ObjectId, u32), SyscallError> {
    let (object, rights) = {
        let mut table = PROCESS_TABLE.lock();
        let p = table.get_mut(pid).ok_or(SyscallError::NotFound)?;
        p.capability_table.lookup(slot).map_err(SyscallError::from)?
    };
    if !rights.contains(required) {
        return Err(SyscallError::PermissionDenied);
    }
    let header = object::header(object).map_err(SyscallError::from)?;
    if header.kind != kind {
        return Err(SyscallError::TypeMismatch);
    }
    Ok((object, header.payload))
}

fn read_bytes_from_user(space: AddressSpaceId, ptr: u64, len: usize) -> Result<([u8; MESSAGE_PAYLOAD_MAX], usize), SyscallError> {
    let n = len.min(MESSAGE_PAYLOAD_MAX);
    validate_user(space, ptr, n, false)?;
    let mut buf = [0u8; MESSAGE_PAYLOAD_MAX];
    if n > 0 {
        // SAFETY: validated above for `n` bytes.
        unsafe { user_validation::copy_from_user(ptr, &mut buf[..n]) };
    }
    Ok((buf, n))
}

fn write_bytes_to_user(space: AddressSpaceId, ptr: u64, len: usize, data: &[u8]) -> Result<isize, SyscallError> {
    let n = data.len().min(len);
    validate_user(space, ptr, n, true)?;
    if n > 0 {
        // SAFETY: validated above for `n` bytes, writably.
        unsafe { user_validation::copy_to_user(ptr, &data[..n]) };
    }
    Ok(n as isize)
}

/// Wire header ahead of a `cap_call` message's payload: a `u32` cap count
/// followed by up to [`MESSAGE_CAP_SLOTS`] `u32` sender-table slot numbers.
/// Only `cap_call`'s own `msg` argument uses this layout — `cap_send`/
/// `cap_recv` move raw, headerless bytes (spec's worked rendezvous example
/// shows the receiver's buffer holding nothing but the sent bytes), so
/// capability transfer is reachable only through a `call`'s request leg.
const WIRE_HEADER_LEN: usize = 4 + 4 * MESSAGE_CAP_SLOTS;

fn read_message_from_user(space: AddressSpaceId, ptr: u64, len: usize) -> Result<Message, SyscallError> {
    if len < WIRE_HEADER_LEN {
        return Err(SyscallError::InvalidArgument);
    }
    let payload_len = (len - WIRE_HEADER_LEN).min(MESSAGE_PAYLOAD_MAX);
    let total = WIRE_HEADER_LEN + payload_len;
    validate_user(space, ptr, total, false)?;

    let mut header_bytes = [0u8; WIRE_HEADER_LEN];
    // SAFETY: validated above for `total` >= `WIRE_HEADER_LEN` bytes.
    unsafe { user_validation::copy_from_user(ptr, &mut header_bytes) };
    let cap_count = u32::from_le_bytes(header_bytes[0..4].try_into().unwrap()) as usize;
    if cap_count > MESSAGE_CAP_SLOTS {
        return Err(SyscallError::InvalidArgument);
    }
    let mut caps = [0usize; MESSAGE_CAP_SLOTS];
    for (i, slot) in caps.iter_mut().enumerate().take(cap_count) {
        let off = 4 + 4 * i;
        *slot = u32::from_le_bytes(header_bytes[off..off + 4].try_into().unwrap()) as usize;
    }

    let mut payload = [0u8; MESSAGE_PAYLOAD_MAX];
    if payload_len > 0 {
        // SAFETY: validated above.
        unsafe {
            user_validation::copy_from_user(ptr + WIRE_HEADER_LEN as u64, &mut payload[..payload_len]);
        }
    }
    let sender = sched::current_thread_id();
    Ok(Message::new(sender, &payload[..payload_len], &caps[..cap_count]))
}

/// Install the capability slots `msg` carries into `receiver_pid`'s table.
/// The sender's table lives in a different process in the common case
/// ([`ipc::install_caps`]/[`PROCESS_TABLE::capability_pair_mut`]); when
/// sender and receiver are the same process, `capability_pair_mut` can't be
/// used (it panics on `a == b`, since the two `&mut` borrows would alias),
/// so that path copies within a single table instead.
fn install_received_caps(receiver_pid: ProcessId, msg: &Message) -> Result<(), SyscallError> {
    let sender_pid = THREAD_TABLE.lock().get(msg.header.sender).map(|t| t.process).ok_or(SyscallError::NotFound)?;
    if sender_pid == receiver_pid {
        let mut table = PROCESS_TABLE.lock();
        let p = table.get_mut(receiver_pid).ok_or(SyscallError::NotFound)?;
        install_caps_same_table(&mut p.capability_table, msg).map_err(SyscallError::from)?;
    } else {
        let mut table = PROCESS_TABLE.lock();
        let (sender_ptr, receiver_ptr) = table.capability_pair_mut(sender_pid, receiver_pid);
        // SAFETY: `sender_ptr`/`receiver_ptr` are valid, distinct
        // `CapabilityTable` pointers for the lifetime of this block; the
        // `table` guard keeps both processes alive throughout.
        unsafe {
            ipc::install_caps(msg, &mut *sender_ptr, &mut *receiver_ptr).map_err(SyscallError::from)?;
        }
    }
    Ok(())
}

/// Same-table variant of [`crate::ipc::endpoint::transfer_caps`]: copies
/// each referenced slot to a fresh slot in the same table, requiring the
/// Grant right on the source exactly as the cross-table path does, and
/// rolling back everything installed so far on the first failure.
fn install_caps_same_table(table: &mut CapabilityTable, msg: &Message) -> Result<[usize; MESSAGE_CAP_SLOTS], IpcError> {
    let mut installed = [usize::MAX; MESSAGE_CAP_SLOTS];
    for (i, &slot) in msg.cap_slots().iter().enumerate() {
        let result = table.lookup(slot).and_then(|(object, rights)| {
            if rights.contains(Rights::GRANT) {
                table.create(object, rights)
            } else {
                Err(crate::error::CapError::InsufficientRights)
            }
        });
        match result {
            Ok(dst) => installed[i] = dst,
            Err(e) => {
                for &done in installed.iter().take(i).filter(|&&s| s != usize::MAX) {
                    let _ = table.delete(done);
                }
                return Err(IpcError::Cap(e));
            }
        }
    }
    Ok(installed)
}

// --- capability operations (0-5, 16) --------------------------------------

fn cap_send(slot: usize, buf: u64, len: usize) -> Result<isize, SyscallError> {
    let pid = current_process()?;
    let space = current_space()?;
    let (_, ep_payload) = lookup_typed(pid, slot, ObjectKind::IpcEndpoint, Rights::SEND)?;
    let (bytes, n) = read_bytes_from_user(space, buf, len)?;
    let sender = sched::current_thread_id();
    let msg = Message::new(sender, &bytes[..n], &[]);
    let ep_slot = ep_payload as usize;

    // Async endpoints never park the sender (spec §4.9): a full queue is
    // reported to user space as `would_block` on the first attempt.
    if ipc::is_async(ep_slot) {
        return match ipc::send(ep_slot, msg) {
            Ok(()) => Ok(n as isize),
            Err(e) => Err(e.into()),
        };
    }

    loop {
        match ipc::send(ep_slot, msg) {
            Ok(()) => return Ok(n as isize),
            Err(IpcError::QueueFull) | Err(IpcError::WouldBlock) => {
                ipc::block_current_on_send(ep_slot, sender);
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn cap_recv(slot: usize, buf: u64, len: usize) -> Result<isize, SyscallError> {
    let pid = current_process()?;
    let space = current_space()?;
    let (_, ep_payload) = lookup_typed(pid, slot, ObjectKind::IpcEndpoint, Rights::HANDLE)?;
    let tid = sched::current_thread_id();
    let msg = loop {
        match ipc::recv(ep_payload as usize) {
            Some(m) => break m,
            None => ipc::block_current_on_recv(ep_payload as usize, tid),
        }
    };
    if msg.header.cap_count > 0 {
        install_received_caps(pid, &msg)?;
    }
    write_bytes_to_user(space, buf, len, msg.data())
}

/// `cap_call` (spec §4.9/§6): send a request, then block for a reply on a
/// dedicated per-call endpoint whose capability is granted to the callee as
/// an extra entry in the outgoing message's capability list — reusing the
/// ordinary IPC capability-transfer path rather than inventing a separate
/// reply mechanism. The callee replies with an ordinary `cap_send` on the
/// granted capability.
fn cap_call(slot: usize, msg_ptr: u64, msg_len: usize, reply_ptr: u64, reply_len: usize) -> Result<isize, SyscallError> {
    let pid = current_process()?;
    let space = current_space()?;
    let (_, ep_payload) = lookup_typed(pid, slot, ObjectKind::IpcEndpoint, Rights::SEND)?;
    let mut msg = read_message_from_user(space, msg_ptr, msg_len)?;

    let reply_ep_slot = ENDPOINT_TABLE.lock().create().ok_or(SyscallError::TableFull)?;
    let reply_object = object::create_with_payload(ObjectKind::IpcEndpoint, reply_ep_slot as u32).map_err(SyscallError::from)?;
    let own_reply_slot = {
        let mut table = PROCESS_TABLE.lock();
        let p = table.get_mut(pid).ok_or(SyscallError::NotFound)?;
        p.capability_table.create(reply_object, Rights::SEND | Rights::GRANT | Rights::HANDLE).map_err(SyscallError::from)?
    };

    if msg.header.cap_count >= MESSAGE_CAP_SLOTS {
        let mut table = PROCESS_TABLE.lock();
        if let Some(p) = table.get_mut(pid) {
            let _ = p.capability_table.delete(own_reply_slot);
        }
        ENDPOINT_TABLE.lock().destroy(reply_ep_slot);
        return Err(SyscallError::TableFull);
    }
    msg.caps[msg.header.cap_count] = own_reply_slot;
    msg.header.cap_count += 1;

    let tid = sched::current_thread_id();
    loop {
        match ipc::send(ep_payload as usize, msg) {
            Ok(()) => break,
            Err(IpcError::QueueFull) | Err(IpcError::WouldBlock) => {
                ipc::block_current_on_send(ep_payload as usize, tid);
            }
            Err(e) => {
                let mut table = PROCESS_TABLE.lock();
                if let Some(p) = table.get_mut(pid) {
                    let _ = p.capability_table.delete(own_reply_slot);
                }
                drop(table);
                ENDPOINT_TABLE.lock().destroy(reply_ep_slot);
                return Err(e.into());
            }
        }
    }

    let reply = loop {
        match ipc::recv(reply_ep_slot) {
            Some(m) => break m,
            None => ipc::block_current_on_recv(reply_ep_slot, tid),
        }
    };

    {
        let mut table = PROCESS_TABLE.lock();
        if let Some(p) = table.get_mut(pid) {
            let _ = p.capability_table.delete(own_reply_slot);
        }
    }

    write_bytes_to_user(space, reply_ptr, reply_len, reply.data())
}

fn cap_copy(src: usize, dst: usize, mask: u64) -> Result<isize, SyscallError> {
    let pid = current_process()?;
    let mask_rights = Rights::from_bits_truncate(mask as u8);
    let mut table = PROCESS_TABLE.lock();
    let p = table.get_mut(pid).ok_or(SyscallError::NotFound)?;
    let (object, rights) = p.capability_table.lookup(src).map_err(SyscallError::from)?;
    p.capability_table.create_at(dst, object, rights & mask_rights).map_err(SyscallError::from)?;
    Ok(0)
}

fn cap_delete(slot: usize) -> Result<isize, SyscallError> {
    let pid = current_process()?;
    let mut table = PROCESS_TABLE.lock();
    let p = table.get_mut(pid).ok_or(SyscallError::NotFound)?;
    p.capability_table.delete(slot).map_err(SyscallError::from)?;
    Ok(0)
}

fn cap_revoke(slot: usize) -> Result<isize, SyscallError> {
    let pid = current_process()?;
    let mut table = PROCESS_TABLE.lock();
    let p = table.get_mut(pid).ok_or(SyscallError::NotFound)?;
    p.capability_table.revoke(slot).map_err(SyscallError::from)?;
    Ok(0)
}

/// Packs the object's kind and the slot's rights into a single result word:
/// `kind | (rights << 8)`. The ABI table gives `cap_info` no out-pointer, so
/// both fields have to ride home in the one `isize` every syscall returns.
fn cap_info(slot: usize) -> Result<isize, SyscallError> {
    let pid = current_process()?;
    let (object, rights) = {
        let mut table = PROCESS_TABLE.lock();
        let p = table.get_mut(pid).ok_or(SyscallError::NotFound)?;
        p.capability_table.lookup(slot).map_err(SyscallError::from)?
    };
    let header = object::header(object).map_err(SyscallError::from)?;
    Ok((header.kind as isize) | ((rights.bits() as isize) << 8))
}

// --- memory operations (6, 7) ---------------------------------------------

fn mem_map(slot: usize, vaddr: u64, size: usize, flags: u64) -> Result<isize, SyscallError> {
    let pid = current_process()?;
    let space = current_space()?;
    let requested = Rights::from_bits_truncate((flags & 0b111) as u8);
    let (_, payload) = lookup_typed(pid, slot, ObjectKind::Memory, requested)?;
    let memobj = MEMORY_OBJECTS.lock().get(payload as usize).copied().ok_or(SyscallError::NotFound)?;
    if size as u64 > memobj.len {
        return Err(SyscallError::InvalidArgument);
    }

    let mut pflags = PageFlags::USER | PageFlags::NO_EXECUTE;
    if requested.contains(Rights::WRITE) {
        pflags |= PageFlags::WRITABLE;
    }
    if requested.contains(Rights::EXEC) {
        pflags.remove(PageFlags::NO_EXECUTE);
    }
    vas::map_region(space, vaddr, memobj.phys_base, size, pflags).map_err(SyscallError::from)?;
    MEMORY_OBJECTS.lock().note_mapped(payload as usize);
    Ok(0)
}

fn mem_unmap(vaddr: u64, _size: usize) -> Result<isize, SyscallError> {
    let space = current_space()?;
    vas::unmap_region(space, vaddr).map_err(SyscallError::from)?;
    Ok(0)
}

// --- thread/process lifecycle (8-12, 17) ----------------------------------

/// `thread_create` (spec §6): `stack_cap` names a Memory capability used as
/// the new thread's stack, mapped below every stack this process has
/// already handed out (one guard page's worth of headroom between them).
fn thread_create(entry: u64, stack_cap_slot: usize, arg: u64) -> Result<isize, SyscallError> {
    let pid = current_process()?;
    let space = current_space()?;
    let (_, payload) = lookup_typed(pid, stack_cap_slot, ObjectKind::Memory, Rights::WRITE)?;
    let memobj = MEMORY_OBJECTS.lock().get(payload as usize).copied().ok_or(SyscallError::NotFound)?;

    let index = PROCESS_TABLE.lock().get(pid).map(|p| p.threads.len()).unwrap_or(0) as u64;
    let stride = memobj.len.max(crate::config::DEFAULT_USER_STACK_SIZE as u64) + 4096;
    let stack_base = USER_STACK_TOP - (index + 1) * stride;
    vas::map_region(
        space,
        stack_base,
        memobj.phys_base,
        memobj.len as usize,
        PageFlags::WRITABLE | PageFlags::USER | PageFlags::NO_EXECUTE,
    )
    .map_err(SyscallError::from)?;
    let stack_top = stack_base + memobj.len;

    let tid = lifecycle::spawn_user_thread(pid, entry, stack_top, arg).map_err(SyscallError::from)?;
    Ok(tid.0 as isize)
}

fn thread_exit(code: i32) -> ! {
    let tid = sched::current_thread_id();
    if let Some(t) = THREAD_TABLE.lock().get_mut(tid) {
        t.state = crate::process::thread::ThreadState::Zombie;
    }
    let pid = THREAD_TABLE.lock().get(tid).map(|t| t.process);
    if let Some(pid) = pid {
        let all_zombie = {
            let table = PROCESS_TABLE.lock();
            table
                .get(pid)
                .map(|p| {
                    p.threads
                        .iter()
                        .all(|&t| THREAD_TABLE.lock().get(t).map(|th| th.state == crate::process::thread::ThreadState::Zombie).unwrap_or(true))
                })
                .unwrap_or(false)
        };
        if all_zombie {
            lifecycle::kill_current_process(code);
        }
    }
    sched::retire_current();
}

fn thread_yield() -> Result<isize, SyscallError> {
    sched::yield_cpu();
    Ok(0)
}

/// `process_create` (spec §6): load an ELF image from an already-granted
/// Memory capability into a new address space, then copy `grants[]` (a
/// user-supplied array of this process's own capability-table slot numbers)
/// into the new process's table.
fn process_create(image_cap_slot: usize, grants_ptr: u64, grants_count: usize) -> Result<isize, SyscallError> {
    const MAX_GRANTS: usize = 32;

    let pid = current_process()?;
    let space = current_space()?;
    let (_, image_payload) = lookup_typed(pid, image_cap_slot, ObjectKind::Memory, Rights::READ)?;
    let memobj = MEMORY_OBJECTS.lock().get(image_payload as usize).copied().ok_or(SyscallError::NotFound)?;

    if grants_count > MAX_GRANTS {
        return Err(SyscallError::InvalidArgument);
    }
    let mut grants = [0u32; MAX_GRANTS];
    if grants_count > 0 {
        validate_user(space, grants_ptr, grants_count * 4, false)?;
        let mut raw = [0u8; MAX_GRANTS * 4];
        // SAFETY: validated above for `grants_count * 4` bytes.
        unsafe { user_validation::copy_from_user(grants_ptr, &mut raw[..grants_count * 4]) };
        for (i, slot) in grants.iter_mut().enumerate().take(grants_count) {
            *slot = u32::from_le_bytes(raw[i * 4..i * 4 + 4].try_into().unwrap());
        }
    }

    let new_pid = lifecycle::create_process(Some(pid), "user", crate::mm::kernel_root()).map_err(SyscallError::from)?;
    let new_space = PROCESS_TABLE.lock().get(new_pid).map(|p| p.address_space).ok_or(SyscallError::NotFound)?;

    // SAFETY: the memory object's physical range is reachable through the
    // HHDM, which covers all usable RAM; the caller holds a Read capability
    // naming it.
    let image_bytes = unsafe {
        let virt = FRAME_ALLOCATOR.lock().phys_to_virt(memobj.phys_base);
        core::slice::from_raw_parts(virt as *const u8, memobj.len as usize)
    };
    let load_result = crate::elf::load(new_space, image_bytes).map_err(SyscallError::from)?;

    lifecycle::create_user_thread(new_pid, new_space, load_result.entry_point, USER_STACK_TOP).map_err(SyscallError::from)?;

    {
        let mut table = PROCESS_TABLE.lock();
        let (src_ptr, dst_ptr) = table.capability_pair_mut(pid, new_pid);
        // SAFETY: `src_ptr`/`dst_ptr` are valid, distinct `CapabilityTable`
        // pointers for the duration of this block; the `table` guard keeps
        // both processes alive throughout.
        unsafe {
            for &slot in &grants[..grants_count] {
                let _ = (*src_ptr).copy(slot as usize, &mut *dst_ptr, Rights::all());
            }
        }
    }

    Ok(new_pid.0 as isize)
}

fn process_exit(code: i32) -> ! {
    lifecycle::kill_current_process(code);
    sched::retire_current();
}

fn process_info(what: u64) -> Result<isize, SyscallError> {
    let pid = current_process()?;
    let table = PROCESS_TABLE.lock();
    let p = table.get(pid).ok_or(SyscallError::NotFound)?;
    match what {
        0 => Ok(pid.0 as isize),
        1 => Ok(p.parent.map(|pp| pp.0 as isize).unwrap_or(-1)),
        2 => Ok(p.state as isize),
        3 => Ok(p.threads.len() as isize),
        _ => Err(SyscallError::InvalidArgument),
    }
}

// --- IRQ operations (13, 14) -----------------------------------------------

fn irq_wait(slot: usize) -> Result<isize, SyscallError> {
    let pid = current_process()?;
    let (_, payload) = lookup_typed(pid, slot, ObjectKind::Irq, Rights::HANDLE)?;
    let tid = sched::current_thread_id();
    loop {
        match IRQ_TABLE.lock().wait(payload as usize, tid) {
            IrqWaitOutcome::Ready => return Ok(0),
            IrqWaitOutcome::Blocked => sched::block_current(),
            IrqWaitOutcome::NoSuchObject => return Err(SyscallError::NotFound),
        }
    }
}

fn irq_ack(slot: usize) -> Result<isize, SyscallError> {
    let pid = current_process()?;
    let (_, payload) = lookup_typed(pid, slot, ObjectKind::Irq, Rights::HANDLE)?;
    let irq_line = IRQ_TABLE.lock().get(payload as usize).map(|o| o.irq).ok_or(SyscallError::NotFound)?;
    interrupts::active_controller().unmask(irq_line);
    Ok(0)
}

// --- misc (15, 18, 19) ------------------------------------------------------

fn debug_print(ptr: u64, len: usize) -> Result<isize, SyscallError> {
    let space = current_space()?;
    validate_user(space, ptr, len, false)?;
    const MAX: usize = 512;
    let n = len.min(MAX);
    let mut buf = [0u8; MAX];
    if n > 0 {
        // SAFETY: validated above (the full requested `len`, not just `n`).
        unsafe { user_validation::copy_from_user(ptr, &mut buf[..n]) };
    }
    let s = core::str::from_utf8(&buf[..n]).unwrap_or("<invalid utf8>");
    log::info!("[user] {s}");
    Ok(n as isize)
}

fn io_port_read(slot: usize, port_num: u16, width: u8) -> Result<isize, SyscallError> {
    let pid = current_process()?;
    let (_, payload) = lookup_typed(pid, slot, ObjectKind::IoPort, Rights::READ)?;
    let contains = IOPORT_TABLE.lock().get(payload as usize).map(|o| o.contains(port_num)).ok_or(SyscallError::NotFound)?;
    if !contains {
        return Err(SyscallError::PermissionDenied);
    }
    if !matches!(width, 1 | 2 | 4) {
        return Err(SyscallError::InvalidArgument);
    }
    // SAFETY: the capability lookup and range check above confirm this
    // process holds Read rights over a range containing `port_num`.
    let val = unsafe { port::in_port(port_num, width) };
    Ok(val as isize)
}

fn io_port_write(slot: usize, port_num: u16, val: u64, width: u8) -> Result<isize, SyscallError> {
    let pid = current_process()?;
    let (_, payload) = lookup_typed(pid, slot, ObjectKind::IoPort, Rights::WRITE)?;
    let contains = IOPORT_TABLE.lock().get(payload as usize).map(|o| o.contains(port_num)).ok_or(SyscallError::NotFound)?;
    if !contains {
        return Err(SyscallError::PermissionDenied);
    }
    if !matches!(width, 1 | 2 | 4) {
        return Err(SyscallError::InvalidArgument);
    }
    // SAFETY: the capability lookup and range check above confirm this
    // process holds Write rights over a range containing `port_num`.
    unsafe { port::out_port(port_num, val as u32, width) };
    Ok(0)
}
