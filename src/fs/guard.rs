//! Filesystem Access Guard
//!
//! One spinlock around the whole filesystem. Every `create`, `remove`,
//! `open`, `close`, `read`, `write`, `filesize`, `seek` and `tell` runs with
//! it held, and compound steps (open-then-register, close-then-unregister,
//! the fork descriptor copy) hold it across the whole sequence.
//!
//! Release is by drop. A handler that faults while holding an [`FsGuard`]
//! unwinds through `?`, and the guard is gone before the exit path runs.

use alloc::boxed::Box;

use spin::{Mutex, MutexGuard};

use super::{FileSystem, OpenFile};

/// The kernel-wide filesystem lock, owning the filesystem itself.
pub struct FileSystemAccess {
    fs: Mutex<Box<dyn FileSystem>>,
}

impl FileSystemAccess {
    pub fn new(fs: Box<dyn FileSystem>) -> Self {
        Self { fs: Mutex::new(fs) }
    }

    /// Acquire the lock, spinning until it is free.
    pub fn lock(&self) -> FsGuard<'_> {
        FsGuard {
            fs: self.fs.lock(),
        }
    }

    /// Whether some context currently holds the lock.
    pub fn is_locked(&self) -> bool {
        self.fs.is_locked()
    }
}

/// Proof of holding the filesystem lock.
///
/// All filesystem and open-file operations are methods here so they cannot
/// be issued without it.
pub struct FsGuard<'a> {
    fs: MutexGuard<'a, Box<dyn FileSystem>>,
}

impl FsGuard<'_> {
    pub fn create(&mut self, name: &str, initial_size: u32) -> bool {
        self.fs.create(name, initial_size)
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.fs.remove(name)
    }

    pub fn open(&mut self, name: &str) -> Option<Box<dyn OpenFile>> {
        self.fs.open(name)
    }

    pub fn read(&mut self, file: &mut dyn OpenFile, buf: &mut [u8]) -> usize {
        file.read(buf)
    }

    pub fn write(&mut self, file: &mut dyn OpenFile, buf: &[u8]) -> usize {
        file.write(buf)
    }

    pub fn length(&self, file: &dyn OpenFile) -> u32 {
        file.length()
    }

    pub fn seek(&mut self, file: &mut dyn OpenFile, pos: u32) {
        file.seek(pos);
    }

    pub fn tell(&self, file: &dyn OpenFile) -> u32 {
        file.tell()
    }

    pub fn duplicate(&mut self, file: &dyn OpenFile) -> Option<Box<dyn OpenFile>> {
        file.duplicate()
    }

    pub fn close(&mut self, file: Box<dyn OpenFile>) {
        file.close();
    }
}
