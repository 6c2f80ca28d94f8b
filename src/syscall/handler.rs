//! System Call Handler
//!
//! Dispatches system calls and implements individual syscall handlers.
//!
//! # Security Considerations
//! - The user stack pointer is validated before anything else
//! - Unknown syscall numbers terminate the caller
//! - Pointer arguments are validated before use, and before any lock is
//!   taken, so a fault never leaves partial work behind
//! - Filesystem work runs under the filesystem guard; fd 0/1 never take it

use alloc::sync::Arc;

use super::error::{SyscallError, FAULT_EXIT_STATUS};
use super::validate;
use crate::kernel::Kernel;
use crate::process::{Fd, Process, STDIN_FILENO, STDOUT_FILENO};
use crate::trap::{RegisterFrame, TrapOutcome};

/// System call numbers
pub mod numbers {
    pub const SYS_HALT: u64 = 0;
    pub const SYS_EXIT: u64 = 1;
    pub const SYS_FORK: u64 = 2;
    pub const SYS_EXEC: u64 = 3;
    pub const SYS_WAIT: u64 = 4;
    pub const SYS_CREATE: u64 = 5;
    pub const SYS_REMOVE: u64 = 6;
    pub const SYS_OPEN: u64 = 7;
    pub const SYS_FILESIZE: u64 = 8;
    pub const SYS_READ: u64 = 9;
    pub const SYS_WRITE: u64 = 10;
    pub const SYS_SEEK: u64 = 11;
    pub const SYS_TELL: u64 = 12;
    pub const SYS_CLOSE: u64 = 13;
    pub const SYS_DUP2: u64 = 22;
}

/// Terminator that ends an interactive keyboard read.
const INPUT_TERMINATOR: u8 = 0;

/// How a handler leaves the kernel.
enum Flow {
    /// Write this value to the result register.
    Return(i64),
    /// The frame already describes a new image.
    Replaced,
    Exit(i32),
    Halt,
}

/// Dispatch a system call
///
/// # Arguments
/// * `kernel` - The kernel instance
/// * `process` - The calling process
/// * `frame` - Saved user registers; number in x8, arguments in x0-x5
///
/// # Returns
/// What the trap transport does next. On [`TrapOutcome::Resume`] the
/// result (if any) is already in x0.
pub fn dispatch(kernel: &Kernel, process: &Arc<Process>, frame: &mut RegisterFrame) -> TrapOutcome {
    if process.is_exiting() {
        return TrapOutcome::Exited(process.exit_status().unwrap_or(FAULT_EXIT_STATUS));
    }

    if let Err(err) = validate::validate_user_stack(process, frame.sp as usize) {
        log::warn!("process {}: bad stack pointer {:#x}: {}", process.tid(), frame.sp, err);
        kernel.exit(process, FAULT_EXIT_STATUS);
        return TrapOutcome::Exited(FAULT_EXIT_STATUS);
    }

    let number = frame.syscall_number();
    log::trace!("process {}: syscall {}", process.tid(), number);

    let result = Syscalls { kernel, process }.call(number, frame);
    match result {
        Ok(Flow::Return(value)) => {
            frame.set_return(value);
            TrapOutcome::Resume
        }
        Ok(Flow::Replaced) => TrapOutcome::Resume,
        Ok(Flow::Exit(status)) => {
            kernel.exit(process, status);
            TrapOutcome::Exited(status)
        }
        Ok(Flow::Halt) => {
            log::debug!("halt requested by process {}", process.tid());
            kernel.scheduler.power_off();
            TrapOutcome::Halted
        }
        Err(err) if err.is_fatal() => {
            log::warn!(
                "process {} ({}): syscall {}: {}",
                process.tid(),
                process.name(),
                number,
                err
            );
            kernel.exit(process, FAULT_EXIT_STATUS);
            TrapOutcome::Exited(FAULT_EXIT_STATUS)
        }
        Err(err) => {
            log::trace!("process {}: syscall {} failed: {}", process.tid(), number, err);
            frame.set_return(err.sentinel());
            TrapOutcome::Resume
        }
    }
}

/// Handler context for one syscall from one process.
struct Syscalls<'a> {
    kernel: &'a Kernel,
    process: &'a Arc<Process>,
}

impl Syscalls<'_> {
    fn call(&self, number: u64, frame: &mut RegisterFrame) -> Result<Flow, SyscallError> {
        use numbers::*;

        let fd = int_arg(frame, 0);
        match number {
            SYS_HALT => Ok(Flow::Halt),
            SYS_EXIT => Ok(Flow::Exit(int_arg(frame, 0))),
            SYS_FORK => {
                let frame = *frame;
                self.sys_fork(frame.arg(0) as usize, &frame).map(value)
            }
            SYS_EXEC => self.sys_exec(frame.arg(0) as usize, frame).map(|()| Flow::Replaced),
            SYS_WAIT => self.sys_wait(int_arg(frame, 0)).map(value),
            SYS_CREATE => boolean(self.sys_create(frame.arg(0) as usize, frame.arg(1) as u32)),
            SYS_REMOVE => boolean(self.sys_remove(frame.arg(0) as usize)),
            SYS_OPEN => self.sys_open(frame.arg(0) as usize).map(value),
            SYS_FILESIZE => self.sys_filesize(fd).map(value),
            SYS_READ => self
                .sys_read(fd, frame.arg(1) as usize, frame.arg(2) as usize)
                .map(value),
            SYS_WRITE => self
                .sys_write(fd, frame.arg(1) as usize, frame.arg(2) as usize)
                .map(value),
            SYS_SEEK => self.sys_seek(fd, frame.arg(1) as u32).map(|()| Flow::Return(0)),
            SYS_TELL => self.sys_tell(fd).map(value),
            SYS_CLOSE => self.sys_close(fd).map(|()| Flow::Return(0)),
            SYS_DUP2 => self.sys_dup2(fd, int_arg(frame, 1)).map(value),
            _ => Err(SyscallError::UnknownSyscall),
        }
    }

    /// Copy a user string, bounded by the configured path length.
    fn user_str(&self, ptr: usize) -> Result<alloc::string::String, SyscallError> {
        validate::read_user_str(self.process, ptr, self.kernel.config.max_path_len)
    }

    fn sys_fork(&self, name: usize, frame: &RegisterFrame) -> Result<i64, SyscallError> {
        let name = self.user_str(name)?;
        let tid = self.kernel.fork(self.process, &name, frame)?;
        Ok(tid as i64)
    }

    fn sys_exec(&self, path: usize, frame: &mut RegisterFrame) -> Result<(), SyscallError> {
        let path = self.user_str(path)?;
        self.kernel.exec(self.process, &path, frame)
    }

    fn sys_wait(&self, tid: i32) -> Result<i64, SyscallError> {
        let status = self.kernel.wait(self.process, tid)?;
        Ok(status as i64)
    }

    fn sys_create(&self, name: usize, initial_size: u32) -> Result<bool, SyscallError> {
        let name = self.user_str(name)?;
        Ok(self.kernel.fs.lock().create(&name, initial_size))
    }

    fn sys_remove(&self, name: usize) -> Result<bool, SyscallError> {
        let name = self.user_str(name)?;
        Ok(self.kernel.fs.lock().remove(&name))
    }

    fn sys_open(&self, name: usize) -> Result<i64, SyscallError> {
        let name = self.user_str(name)?;

        // Open and register under one guard hold
        let mut fs = self.kernel.fs.lock();
        let file = fs.open(&name).ok_or(SyscallError::Filesystem)?;
        let allocated = self.process.fds.lock().allocate(file);
        match allocated {
            Ok(fd) => Ok(fd as i64),
            Err(file) => {
                fs.close(file);
                Err(SyscallError::Exhausted)
            }
        }
    }

    fn sys_filesize(&self, fd: Fd) -> Result<i64, SyscallError> {
        let fs = self.kernel.fs.lock();
        let mut fds = self.process.fds.lock();
        let file = fds.lookup(fd)?;
        Ok(fs.length(file) as i64)
    }

    fn sys_read(&self, fd: Fd, buf: usize, len: usize) -> Result<i64, SyscallError> {
        let mut buf = validate::validate_user_write(self.process, buf, len)?;
        let bytes = buf.as_bytes_mut();

        match fd {
            STDIN_FILENO => {
                let mut count = 0;
                for slot in bytes.iter_mut() {
                    let byte = self.kernel.console.get_byte();
                    *slot = byte;
                    count += 1;
                    if byte == INPUT_TERMINATOR {
                        break;
                    }
                }
                Ok(count as i64)
            }
            STDOUT_FILENO => Err(SyscallError::NotFound),
            _ => {
                let mut fs = self.kernel.fs.lock();
                let mut fds = self.process.fds.lock();
                let file = fds.lookup(fd)?;
                Ok(fs.read(file, bytes) as i64)
            }
        }
    }

    fn sys_write(&self, fd: Fd, buf: usize, len: usize) -> Result<i64, SyscallError> {
        let buf = validate::validate_user_read(self.process, buf, len)?;

        match fd {
            STDOUT_FILENO => {
                self.kernel.console.put_bytes(buf.as_bytes());
                Ok(len as i64)
            }
            STDIN_FILENO => Err(SyscallError::NotFound),
            _ => {
                let mut fs = self.kernel.fs.lock();
                let mut fds = self.process.fds.lock();
                let file = fds.lookup(fd)?;
                Ok(fs.write(file, buf.as_bytes()) as i64)
            }
        }
    }

    fn sys_seek(&self, fd: Fd, pos: u32) -> Result<(), SyscallError> {
        let mut fs = self.kernel.fs.lock();
        let mut fds = self.process.fds.lock();
        if let Ok(file) = fds.lookup(fd) {
            fs.seek(file, pos);
        }
        Ok(())
    }

    fn sys_tell(&self, fd: Fd) -> Result<i64, SyscallError> {
        let fs = self.kernel.fs.lock();
        let mut fds = self.process.fds.lock();
        let file = fds.lookup(fd)?;
        Ok(fs.tell(file) as i64)
    }

    fn sys_close(&self, fd: Fd) -> Result<(), SyscallError> {
        // Close and unregister under one guard hold
        let mut fs = self.kernel.fs.lock();
        let file = self.process.fds.lock().release(fd)?;
        fs.close(file);
        Ok(())
    }

    fn sys_dup2(&self, old: Fd, new: Fd) -> Result<i64, SyscallError> {
        let mut fs = self.kernel.fs.lock();
        let mut fds = self.process.fds.lock();

        let source = fds.lookup(old)?;
        if old == new {
            return Ok(new as i64);
        }
        let copy = fs.duplicate(source).ok_or(SyscallError::Exhausted)?;

        match fds.install(new, copy) {
            Ok(replaced) => {
                if let Some(replaced) = replaced {
                    fs.close(replaced);
                }
                Ok(new as i64)
            }
            Err(copy) => {
                fs.close(copy);
                Err(SyscallError::NotFound)
            }
        }
    }
}

/// An `int` argument (fd, tid, status).
///
/// These travel in the w half of the register; AAPCS64 leaves bits 63:32
/// unspecified, so they are ignored rather than rejected.
#[inline]
fn int_arg(frame: &RegisterFrame, index: usize) -> i32 {
    frame.arg(index) as u32 as i32
}

fn value(value: i64) -> Flow {
    Flow::Return(value)
}

/// bool results: recoverable failures read as `false`.
fn boolean(result: Result<bool, SyscallError>) -> Result<Flow, SyscallError> {
    match result {
        Ok(ok) => Ok(Flow::Return(ok as i64)),
        Err(err) if err.is_fatal() => Err(err),
        Err(_) => Ok(Flow::Return(0)),
    }
}
