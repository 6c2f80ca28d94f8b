//! User Processes
//!
//! A [`Process`] is the kernel-side record of one user program.
//!
//! # Ownership
//! - A parent owns its children (`Arc`), a child only points back (`Weak`)
//! - A child outlives its own exit as a zombie until the parent reaps it
//! - Each process owns its descriptor table and address space
//!
//! # Lifecycle
//! ```text
//! Running --fork--> Running (+ Running child)
//! Running --exit(status)--> Zombie(status) --wait by parent--> Reaped
//! ```
//!
//! The scheduler and program loader are collaborators reached through
//! [`Scheduler`] and [`ProgramLoader`].

pub mod fd_table;
mod lifecycle;
mod rendezvous;

pub use fd_table::{Fd, FdTable, FIRST_FD, STDIN_FILENO, STDOUT_FILENO};
pub use rendezvous::ExitRendezvous;

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use spin::Mutex;

use crate::fs::FsGuard;
use crate::mm::{AddressSpace, PageAccess, VirtAddr};
use crate::trap::RegisterFrame;

/// Thread (process) identifier. Always positive.
pub type Tid = i32;

/// Where a process is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    /// Exited, status not yet collected.
    Zombie(i32),
    /// Status collected by the parent.
    Reaped,
}

/// Kernel-side record of a user process.
pub struct Process {
    tid: Tid,
    name: String,
    parent: Weak<Process>,
    pub(crate) fds: Mutex<FdTable>,
    pub(crate) children: Mutex<Vec<Arc<Process>>>,
    space: Mutex<Box<dyn AddressSpace>>,
    exiting: AtomicBool,
    pub(crate) exit: ExitRendezvous,
}

impl Process {
    pub(crate) fn new(
        tid: Tid,
        name: String,
        parent: Weak<Process>,
        space: Box<dyn AddressSpace>,
        fds: FdTable,
    ) -> Self {
        Self {
            tid,
            name,
            parent,
            fds: Mutex::new(fds),
            children: Mutex::new(Vec::new()),
            space: Mutex::new(space),
            exiting: AtomicBool::new(false),
            exit: ExitRendezvous::new(),
        }
    }

    pub fn tid(&self) -> Tid {
        self.tid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The parent, if it still exists.
    pub fn parent(&self) -> Option<Arc<Process>> {
        self.parent.upgrade()
    }

    pub fn state(&self) -> ProcessState {
        match self.exit.peek() {
            None => ProcessState::Running,
            Some(_) if self.exit.is_reaped() => ProcessState::Reaped,
            Some(status) => ProcessState::Zombie(status),
        }
    }

    /// Recorded exit status, once the process has exited.
    pub fn exit_status(&self) -> Option<i32> {
        self.exit.peek()
    }

    /// Whether exit has begun. Nothing runs in this context afterwards.
    pub fn is_exiting(&self) -> bool {
        self.exiting.load(Ordering::Acquire)
    }

    /// Claim the exit path. Only the first caller gets `true`.
    pub(crate) fn begin_exit(&self) -> bool {
        !self.exiting.swap(true, Ordering::AcqRel)
    }

    /// Tids of the children not yet reaped, in fork order.
    pub fn child_tids(&self) -> Vec<Tid> {
        self.children.lock().iter().map(|child| child.tid).collect()
    }

    pub(crate) fn find_child(&self, tid: Tid) -> Option<Arc<Process>> {
        self.children
            .lock()
            .iter()
            .find(|child| child.tid == tid)
            .cloned()
    }

    /// Rights of `page` in this process's address space.
    pub(crate) fn page_access(&self, page: VirtAddr) -> Option<PageAccess> {
        self.space.lock().page_access(page)
    }

    pub(crate) fn duplicate_space(&self) -> Option<Box<dyn AddressSpace>> {
        self.space.lock().duplicate()
    }

    /// Install a new image's address space, returning the old one.
    pub(crate) fn replace_space(&self, space: Box<dyn AddressSpace>) -> Box<dyn AddressSpace> {
        core::mem::replace(&mut *self.space.lock(), space)
    }

    /// Number of open descriptors.
    pub fn open_fd_count(&self) -> usize {
        self.fds.lock().len()
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("tid", &self.tid)
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

/// The scheduler refused to create a new execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnError;

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no execution context available")
    }
}

/// Thread scheduler, seen from the syscall layer.
pub trait Scheduler: Send + Sync {
    /// Create a runnable context for a forked `child`, resuming user mode
    /// at `frame`.
    fn start(&self, child: Arc<Process>, frame: RegisterFrame) -> Result<(), SpawnError>;

    /// Let other contexts run. Called by a blocked `wait` between polls.
    fn yield_now(&self);

    /// Shut the machine down (`halt`).
    fn power_off(&self);
}

/// Why a program image could not be built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadError {
    /// No executable under that path.
    NotFound,
    /// The file is not a loadable image.
    InvalidImage,
    /// No memory for the new address space.
    OutOfMemory,
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "executable not found"),
            Self::InvalidImage => write!(f, "invalid executable image"),
            Self::OutOfMemory => write!(f, "out of memory for image"),
        }
    }
}

/// A freshly built program image, not yet installed.
pub struct LoadedImage {
    pub space: Box<dyn AddressSpace>,
    /// User entry point.
    pub entry: u64,
    /// Initial user stack pointer.
    pub stack_top: u64,
}

/// Builds program images for `exec`.
pub trait ProgramLoader: Send + Sync {
    /// Load `path`. Runs with the filesystem guard held; the executable is
    /// read through `fs`.
    fn load(&self, fs: &mut FsGuard<'_>, path: &str) -> Result<LoadedImage, LoadError>;
}
