//! File Descriptor Table
//!
//! Per-process map from descriptor numbers to open file handles.
//!
//! # Numbering
//! - fd 0 (keyboard) and fd 1 (console) are pseudo-handles, never stored
//! - Allocation starts at 2 and follows a monotonic counter
//! - A number is never handed out twice while the process lives, so a
//!   stale fd held across a close can never alias a newer open
//!
//! The table never closes handles itself: closing is filesystem work and
//! happens under the filesystem guard, which callers pass in.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;

use crate::config::KernelConfig;
use crate::fs::{FsGuard, OpenFile};
use crate::syscall::SyscallError;

/// A descriptor number.
pub type Fd = i32;

/// Keyboard input pseudo-handle.
pub const STDIN_FILENO: Fd = 0;
/// Console output pseudo-handle.
pub const STDOUT_FILENO: Fd = 1;
/// First number the table allocates.
pub const FIRST_FD: Fd = 2;

/// Descriptor table of one process.
pub struct FdTable {
    entries: BTreeMap<Fd, Box<dyn OpenFile>>,
    /// Next number to hand out. Only ever grows.
    next: Fd,
    max_fd: Fd,
    max_open: usize,
}

impl FdTable {
    pub fn new(config: &KernelConfig) -> Self {
        Self {
            entries: BTreeMap::new(),
            next: FIRST_FD,
            // The counter must always fit one past the ceiling
            max_fd: config.max_fd.min(Fd::MAX - 1),
            max_open: config.max_open_files,
        }
    }

    /// Whether `fd` is one of the pseudo-handles.
    #[inline]
    pub const fn is_reserved(fd: Fd) -> bool {
        fd == STDIN_FILENO || fd == STDOUT_FILENO
    }

    /// Register `file` under a fresh descriptor.
    ///
    /// When the table is exhausted the handle is handed back so the caller
    /// can close it under the guard.
    pub fn allocate(&mut self, file: Box<dyn OpenFile>) -> Result<Fd, Box<dyn OpenFile>> {
        if self.next > self.max_fd || self.entries.len() >= self.max_open {
            return Err(file);
        }
        let fd = self.next;
        self.next += 1;
        self.entries.insert(fd, file);
        Ok(fd)
    }

    /// The handle behind `fd`.
    pub fn lookup(&mut self, fd: Fd) -> Result<&mut dyn OpenFile, SyscallError> {
        match self.entries.get_mut(&fd) {
            Some(file) => Ok(&mut **file),
            None => Err(SyscallError::NotFound),
        }
    }

    /// Remove `fd` and return its handle for closing.
    ///
    /// Releasing a pseudo-handle or an fd that isn't open is a
    /// [`SyscallError::BadDescriptor`].
    pub fn release(&mut self, fd: Fd) -> Result<Box<dyn OpenFile>, SyscallError> {
        if Self::is_reserved(fd) {
            return Err(SyscallError::BadDescriptor);
        }
        self.entries.remove(&fd).ok_or(SyscallError::BadDescriptor)
    }

    /// Put `file` at exactly `fd` (dup2).
    ///
    /// Allowed when `fd` is open (its old handle is returned for closing)
    /// or at/after the counter (the counter moves past it). Numbers below
    /// the counter that aren't open were freed earlier and stay retired.
    pub fn install(
        &mut self,
        fd: Fd,
        file: Box<dyn OpenFile>,
    ) -> Result<Option<Box<dyn OpenFile>>, Box<dyn OpenFile>> {
        if fd < FIRST_FD || fd > self.max_fd {
            return Err(file);
        }
        if let Some(slot) = self.entries.get_mut(&fd) {
            return Ok(Some(core::mem::replace(slot, file)));
        }
        if fd < self.next || self.entries.len() >= self.max_open {
            return Err(file);
        }
        self.next = fd + 1;
        self.entries.insert(fd, file);
        Ok(None)
    }

    /// Copy the table for a forked child: same numbers, same counter,
    /// independent handles.
    ///
    /// If any handle can't be duplicated, the copies made so far are closed
    /// and `None` is returned.
    pub fn try_clone(&self, fs: &mut FsGuard<'_>) -> Option<Self> {
        let mut copy = Self {
            entries: BTreeMap::new(),
            next: self.next,
            max_fd: self.max_fd,
            max_open: self.max_open,
        };
        for (&fd, file) in &self.entries {
            match fs.duplicate(&**file) {
                Some(dup) => {
                    copy.entries.insert(fd, dup);
                }
                None => {
                    copy.close_all(fs);
                    return None;
                }
            }
        }
        Some(copy)
    }

    /// Close every remaining handle. Returns how many were closed.
    pub fn close_all(&mut self, fs: &mut FsGuard<'_>) -> usize {
        let entries = core::mem::take(&mut self.entries);
        let count = entries.len();
        for file in entries.into_values() {
            fs.close(file);
        }
        count
    }

    /// Whether `fd` is currently open.
    pub fn contains(&self, fd: Fd) -> bool {
        self.entries.contains_key(&fd)
    }

    /// Number of open descriptors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The number the next allocation will use.
    pub fn next_fd(&self) -> Fd {
        self.next
    }
}
