//! Process Lifecycle
//!
//! fork, exec, wait and exit, as kernel operations on [`Process`] records.
//! The syscall handlers decode arguments and call in here.

use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;

use crate::kernel::{truncate_name, Kernel};
use crate::process::{LoadError, Process, Tid};
use crate::syscall::SyscallError;
use crate::trap::RegisterFrame;

impl Kernel {
    /// Create a child of `parent` named `name`, resuming from `frame` with
    /// a result of 0. Returns the child's tid.
    ///
    /// The child gets a copy of the address space and an independent
    /// duplicate of every open descriptor, taken under the filesystem
    /// guard. Any failure rolls back every step already made.
    pub fn fork(
        &self,
        parent: &Arc<Process>,
        name: &str,
        frame: &RegisterFrame,
    ) -> Result<Tid, SyscallError> {
        if !self.try_reserve_process() {
            log::debug!("fork from {}: process limit reached", parent.tid());
            return Err(SyscallError::Exhausted);
        }

        let Some(space) = parent.duplicate_space() else {
            self.release_process();
            return Err(SyscallError::Exhausted);
        };

        let fds = {
            let mut fs = self.fs.lock();
            parent.fds.lock().try_clone(&mut fs)
        };
        let Some(fds) = fds else {
            self.release_process();
            return Err(SyscallError::Exhausted);
        };

        let child = Arc::new(Process::new(
            self.alloc_tid(),
            truncate_name(name, self.config.max_name_len),
            Arc::downgrade(parent),
            space,
            fds,
        ));
        let tid = child.tid();

        // Visible to wait() before it can possibly run and exit
        parent.children.lock().push(child.clone());

        let mut child_frame = *frame;
        child_frame.set_return(0);
        if let Err(err) = self.scheduler.start(child.clone(), child_frame) {
            log::debug!("fork from {}: {}", parent.tid(), err);
            parent.children.lock().retain(|c| c.tid() != tid);
            {
                let mut fs = self.fs.lock();
                child.fds.lock().close_all(&mut fs);
            }
            self.release_process();
            return Err(SyscallError::Exhausted);
        }

        log::debug!(
            "fork: {} ({}) -> {} ({})",
            parent.tid(),
            parent.name(),
            tid,
            child.name()
        );
        Ok(tid)
    }

    /// Replace the program image of `process` with `path`.
    ///
    /// On success the frame describes the new image and must not receive
    /// a result. On failure nothing has changed.
    pub fn exec(
        &self,
        process: &Process,
        path: &str,
        frame: &mut RegisterFrame,
    ) -> Result<(), SyscallError> {
        let image = {
            let mut fs = self.fs.lock();
            self.loader.load(&mut fs, path)
        };
        let image = image.map_err(|err| {
            log::debug!("exec {:?} in {}: {}", path, process.tid(), err);
            match err {
                LoadError::NotFound | LoadError::InvalidImage => SyscallError::Filesystem,
                LoadError::OutOfMemory => SyscallError::Exhausted,
            }
        })?;

        drop(process.replace_space(image.space));
        frame.enter(image.entry, image.stack_top);
        log::debug!("exec: {} now runs {:?}", process.tid(), path);
        Ok(())
    }

    /// Block until child `tid` of `parent` exits, then collect its status.
    ///
    /// Fails without blocking if `tid` is not an unreaped child of
    /// `parent`.
    pub fn wait(&self, parent: &Process, tid: Tid) -> Result<i32, SyscallError> {
        let child = parent.find_child(tid).ok_or(SyscallError::NotFound)?;

        while child.exit.peek().is_none() {
            self.scheduler.yield_now();
        }

        let status = child.exit.take().ok_or(SyscallError::NotFound)?;
        parent.children.lock().retain(|c| c.tid() != tid);
        log::debug!("wait: {} reaped {} (status {})", parent.tid(), tid, status);
        Ok(status)
    }

    /// Terminate `process` with `status`.
    ///
    /// Prints the exit line, closes every descriptor under the guard, lets
    /// go of the children, and only then publishes the status to a waiting
    /// parent. Later calls for the same process do nothing.
    pub fn exit(&self, process: &Process, status: i32) {
        if !process.begin_exit() {
            return;
        }

        let closed = {
            let mut fs = self.fs.lock();
            process.fds.lock().close_all(&mut fs)
        };

        // Unreaped zombies go away with their parent; running children
        // keep running with a dead parent link.
        let orphans = core::mem::take(&mut *process.children.lock());
        drop(orphans);

        let line: String = format!("{}: exit({})\n", process.name(), status);
        self.console.put_bytes(line.as_bytes());

        self.release_process();
        process.exit.signal(status);
        log::debug!(
            "exit: {} ({}) status {}, closed {} descriptors",
            process.tid(),
            process.name(),
            status,
            closed
        );
    }
}
