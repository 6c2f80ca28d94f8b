//! Filesystem Interface
//!
//! The on-disk filesystem is an external collaborator. This module fixes
//! the primitives the syscall layer uses and wraps them in the single
//! kernel-wide lock that serializes every filesystem operation.
//!
//! # Locking
//! - [`FileSystemAccess`] owns the filesystem; [`FsGuard`] is the only way in
//! - Open file handles are driven through the guard, never directly
//! - Lock order: filesystem guard first, then a process's descriptor table

mod guard;

pub use guard::{FileSystemAccess, FsGuard};

use alloc::boxed::Box;

/// The filesystem primitives used by `create`, `remove` and `open`.
///
/// Names arrive already copied into kernel memory.
pub trait FileSystem: Send {
    /// Create `name` with `initial_size` zero bytes. `false` if it exists or
    /// cannot be created.
    fn create(&mut self, name: &str, initial_size: u32) -> bool;

    /// Remove `name`. Handles already open on it stay usable.
    fn remove(&mut self, name: &str) -> bool;

    /// Open `name`, returning a fresh handle positioned at offset 0.
    fn open(&mut self, name: &str) -> Option<Box<dyn OpenFile>>;
}

/// An open file handle, exclusively owned by one descriptor entry.
pub trait OpenFile: Send {
    /// Read at the current position, advancing it. Returns bytes read.
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// Write at the current position, advancing it. Returns bytes written.
    fn write(&mut self, buf: &[u8]) -> usize;

    /// File length in bytes.
    fn length(&self) -> u32;

    /// Move the position. Seeking past the end is allowed.
    fn seek(&mut self, pos: u32);

    /// Current position.
    fn tell(&self) -> u32;

    /// A new handle on the same file with its own position (copied from
    /// this one). `None` when the filesystem is out of handle memory.
    fn duplicate(&self) -> Option<Box<dyn OpenFile>>;

    /// Release the handle.
    fn close(self: Box<Self>);
}
