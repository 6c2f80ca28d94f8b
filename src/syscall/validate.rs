//! System Call Input Validation
//!
//! Every pointer a user program hands the kernel goes through here before
//! the kernel touches the memory behind it.
//!
//! # Security Principles
//! - Validate ALL inputs before use
//! - Fail-secure: deny by default
//! - Prevent common vulnerabilities:
//!   - Kernel memory disclosure (higher-half addresses rejected)
//!   - Wild dereference (every touched page must be present)
//!   - Address wrap-around (overflow checked)
//!   - TOCTOU on names (strings are copied into kernel memory)
//!
//! A failed check is always an [`SyscallError::AddressFault`], which the
//! dispatcher turns into `exit(-1)`.

use alloc::string::String;
use alloc::vec::Vec;

use super::SyscallError;
use crate::mm::address::{pages_spanning, VirtAddr, USER_TOP};
use crate::mm::PageAccess;
use crate::process::Process;

/// A validated user-space buffer
///
/// This type guarantees that:
/// - The buffer is within user-space bounds
/// - Every page it touches is mapped with user access
/// - The length doesn't overflow
#[derive(Debug)]
pub struct UserBuffer {
    ptr: *const u8,
    len: usize,
}

impl UserBuffer {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get the buffer as a byte slice
    ///
    /// The contents may still change under a concurrent user thread; the
    /// kernel only ever copies out of it.
    pub fn as_bytes(&self) -> &[u8] {
        if self.len == 0 {
            return &[];
        }
        // SAFETY:
        // - Pointer and length were checked in validate_user_read
        // - Every page in the range is mapped in the calling process
        unsafe { core::slice::from_raw_parts(self.ptr, self.len) }
    }
}

/// A validated, writable user-space buffer
#[derive(Debug)]
pub struct UserBufferMut {
    ptr: *mut u8,
    len: usize,
}

impl UserBufferMut {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get the buffer as a mutable byte slice
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        if self.len == 0 {
            return &mut [];
        }
        // SAFETY: Same as UserBuffer::as_bytes; pages are also writable
        unsafe { core::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

/// Check `[ptr, ptr + len)` against the process's address space.
fn check_range(
    process: &Process,
    ptr: usize,
    len: usize,
    required: PageAccess,
) -> Result<(), SyscallError> {
    // Zero-length ranges are never dereferenced
    if len == 0 {
        return Ok(());
    }

    if ptr == 0 {
        return Err(SyscallError::AddressFault);
    }

    let start = VirtAddr::try_user(ptr).ok_or(SyscallError::AddressFault)?;
    let end = ptr.checked_add(len).ok_or(SyscallError::AddressFault)?;
    if end - 1 > USER_TOP {
        return Err(SyscallError::AddressFault);
    }

    for page in pages_spanning(start, len) {
        check_page(process, page, required)?;
    }
    Ok(())
}

fn check_page(process: &Process, page: VirtAddr, required: PageAccess) -> Result<(), SyscallError> {
    match process.page_access(page) {
        Some(access) if access.contains(required) => Ok(()),
        _ => Err(SyscallError::AddressFault),
    }
}

/// Validate a user-space buffer the kernel will read from.
pub fn validate_user_read(
    process: &Process,
    ptr: usize,
    len: usize,
) -> Result<UserBuffer, SyscallError> {
    check_range(process, ptr, len, PageAccess::USER)?;
    Ok(UserBuffer {
        ptr: ptr as *const u8,
        len,
    })
}

/// Validate a user-space buffer the kernel will write into.
///
/// Same as read validation, plus every page must be writable.
pub fn validate_user_write(
    process: &Process,
    ptr: usize,
    len: usize,
) -> Result<UserBufferMut, SyscallError> {
    check_range(process, ptr, len, PageAccess::USER | PageAccess::WRITABLE)?;
    Ok(UserBufferMut {
        ptr: ptr as *mut u8,
        len,
    })
}

/// Validate the user stack pointer: the word it points at must be mapped.
pub fn validate_user_stack(process: &Process, sp: usize) -> Result<(), SyscallError> {
    check_range(process, sp, core::mem::size_of::<u64>(), PageAccess::USER)
}

/// Copy a NUL-terminated user string into the kernel.
///
/// Pages are checked one at a time as the scan reaches them, so a string
/// that ends just before an unmapped page is fine. No terminator within
/// `max_len` bytes (terminator included) is a fault.
///
/// A string that isn't UTF-8 is reported as [`SyscallError::Filesystem`]:
/// no file can have that name.
pub fn read_user_str(process: &Process, ptr: usize, max_len: usize) -> Result<String, SyscallError> {
    if ptr == 0 {
        return Err(SyscallError::AddressFault);
    }

    let start = VirtAddr::try_user(ptr).ok_or(SyscallError::AddressFault)?;
    let mut bytes = Vec::new();
    let mut checked_page = None;

    for offset in 0..max_len {
        let addr = start
            .checked_add(offset)
            .filter(|addr| addr.is_user())
            .ok_or(SyscallError::AddressFault)?;

        let page = addr.align_down();
        if checked_page != Some(page) {
            check_page(process, page, PageAccess::USER)?;
            checked_page = Some(page);
        }

        // SAFETY: the page holding `addr` was checked above
        let byte = unsafe { addr.as_ptr::<u8>().read() };
        if byte == 0 {
            return String::from_utf8(bytes).map_err(|_| SyscallError::Filesystem);
        }
        bytes.push(byte);
    }

    Err(SyscallError::AddressFault)
}
