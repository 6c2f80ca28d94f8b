//! Kernel Instance
//!
//! Ties the syscall layer to its collaborators and holds the little
//! kernel-wide state it needs: the filesystem guard, tid allocation and
//! the running-process count.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::{Arc, Weak};
use core::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

use crate::config::KernelConfig;
use crate::drivers::Console;
use crate::fs::{FileSystem, FileSystemAccess};
use crate::mm::AddressSpace;
use crate::process::{FdTable, Process, ProgramLoader, Scheduler, Tid};

/// Tid of the first process.
pub const INITIAL_TID: Tid = 1;

pub struct Kernel {
    pub(crate) config: KernelConfig,
    pub(crate) fs: FileSystemAccess,
    pub(crate) console: Arc<dyn Console>,
    pub(crate) scheduler: Arc<dyn Scheduler>,
    pub(crate) loader: Arc<dyn ProgramLoader>,
    next_tid: AtomicI32,
    running: AtomicUsize,
}

impl Kernel {
    pub fn new(
        config: KernelConfig,
        fs: Box<dyn FileSystem>,
        console: Arc<dyn Console>,
        scheduler: Arc<dyn Scheduler>,
        loader: Arc<dyn ProgramLoader>,
    ) -> Self {
        Self {
            config,
            fs: FileSystemAccess::new(fs),
            console,
            scheduler,
            loader,
            next_tid: AtomicI32::new(INITIAL_TID),
            running: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// The filesystem guard.
    pub fn fs(&self) -> &FileSystemAccess {
        &self.fs
    }

    /// Create a parentless process (the first user program).
    pub fn spawn_initial(&self, name: &str, space: Box<dyn AddressSpace>) -> Arc<Process> {
        self.running.fetch_add(1, Ordering::AcqRel);
        let process = Process::new(
            self.alloc_tid(),
            truncate_name(name, self.config.max_name_len),
            Weak::new(),
            space,
            FdTable::new(&self.config),
        );
        log::debug!("process {} ({}) created", process.tid(), process.name());
        Arc::new(process)
    }

    /// Processes created and not yet exited.
    pub fn running_processes(&self) -> usize {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn alloc_tid(&self) -> Tid {
        self.next_tid.fetch_add(1, Ordering::Relaxed)
    }

    /// Reserve a running-process slot, failing at the configured cap.
    pub(crate) fn try_reserve_process(&self) -> bool {
        self.running
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |running| {
                (running < self.config.max_processes).then_some(running + 1)
            })
            .is_ok()
    }

    pub(crate) fn release_process(&self) {
        self.running.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Copy at most `max` bytes of `name`, cut on a character boundary.
pub(crate) fn truncate_name(name: &str, max: usize) -> String {
    let mut end = name.len().min(max);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    String::from(&name[..end])
}
