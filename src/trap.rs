//! User Trap Entry
//!
//! The assembly vector code (outside this crate) saves the user registers
//! into a [`RegisterFrame`] and calls [`handle_syscall_trap`] with the
//! current process. The returned [`TrapOutcome`] tells it whether to
//! return to user mode, retire the context, or stop the machine.
//!
//! # Exception Types handled here
//! - SVC from EL0: system calls
//! - Data/instruction aborts from EL0: the process is killed with -1
//!
//! # Security Considerations
//! - The frame is plain data; every pointer in it is untrusted
//! - A user fault never halts the kernel, it only ends the faulting process

use alloc::sync::Arc;

use crate::kernel::Kernel;
use crate::process::Process;
use crate::syscall::{self, FAULT_EXIT_STATUS};

/// Saved user register state, in the aarch64 exception-context layout.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterFrame {
    /// General purpose registers x0-x30
    pub gpr: [u64; 31],
    /// User stack pointer (SP_EL0)
    pub sp: u64,
    /// Exception Link Register (return address)
    pub elr: u64,
    /// Saved Program Status Register
    pub spsr: u64,
    /// Exception Syndrome Register
    pub esr: u64,
    /// Fault Address Register
    pub far: u64,
}

impl RegisterFrame {
    /// Register carrying the syscall number.
    pub const SYSCALL_NUMBER_REG: usize = 8;
    /// Number of argument registers (x0-x5).
    pub const ARG_COUNT: usize = 6;

    pub const fn zeroed() -> Self {
        Self {
            gpr: [0; 31],
            sp: 0,
            elr: 0,
            spsr: 0,
            esr: 0,
            far: 0,
        }
    }

    /// A frame as saved by `svc #0` with `number` in x8 and `args` in x0..
    #[cfg(test)]
    pub fn syscall(number: u64, args: &[u64], sp: u64) -> Self {
        let mut frame = Self::zeroed();
        frame.esr = (ExceptionClass::SvcAarch64 as u64) << 26;
        frame.sp = sp;
        frame.gpr[Self::SYSCALL_NUMBER_REG] = number;
        for (reg, &arg) in frame.gpr.iter_mut().zip(args.iter().take(Self::ARG_COUNT)) {
            *reg = arg;
        }
        frame
    }

    #[inline]
    pub fn syscall_number(&self) -> u64 {
        self.gpr[Self::SYSCALL_NUMBER_REG]
    }

    /// Syscall argument `index` (0-5).
    #[inline]
    pub fn arg(&self, index: usize) -> u64 {
        debug_assert!(index < Self::ARG_COUNT);
        self.gpr[index]
    }

    /// The result register, as the user sees it.
    #[inline]
    pub fn return_value(&self) -> i64 {
        self.gpr[0] as i64
    }

    #[inline]
    pub fn set_return(&mut self, value: i64) {
        self.gpr[0] = value as u64;
    }

    /// Reset the frame to start a new image at `entry` with stack `sp`.
    pub fn enter(&mut self, entry: u64, sp: u64) {
        let spsr = self.spsr;
        *self = Self::zeroed();
        self.elr = entry;
        self.sp = sp;
        self.spsr = spsr;
    }
}

impl Default for RegisterFrame {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Exception class extracted from ESR_EL1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExceptionClass {
    Unknown = 0x00,
    SvcAarch64 = 0x15,
    InstructionAbortLowerEl = 0x20,
    DataAbortLowerEl = 0x24,
    Other = 0xFF,
}

impl From<u64> for ExceptionClass {
    fn from(esr: u64) -> Self {
        let ec = ((esr >> 26) & 0x3F) as u8;
        match ec {
            0x00 => ExceptionClass::Unknown,
            0x15 => ExceptionClass::SvcAarch64,
            0x20 => ExceptionClass::InstructionAbortLowerEl,
            0x24 => ExceptionClass::DataAbortLowerEl,
            _ => ExceptionClass::Other,
        }
    }
}

/// What the trap transport does after the kernel is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapOutcome {
    /// Return to user mode with the (possibly rewritten) frame.
    Resume,
    /// The process has exited; never schedule this context again.
    Exited(i32),
    /// `halt` was requested and the machine is powering off.
    Halted,
}

/// Handle a synchronous exception taken from user mode.
pub fn handle_syscall_trap(
    kernel: &Kernel,
    process: &Arc<Process>,
    frame: &mut RegisterFrame,
) -> TrapOutcome {
    match ExceptionClass::from(frame.esr) {
        ExceptionClass::SvcAarch64 => syscall::dispatch(kernel, process, frame),
        ExceptionClass::DataAbortLowerEl | ExceptionClass::InstructionAbortLowerEl => {
            log::warn!(
                "process {} ({}): user abort at {:#018x}, esr {:#018x}",
                process.tid(),
                process.name(),
                frame.far,
                frame.esr
            );
            kernel.exit(process, FAULT_EXIT_STATUS);
            TrapOutcome::Exited(FAULT_EXIT_STATUS)
        }
        ec => {
            log::warn!("process {}: unhandled exception {:?}", process.tid(), ec);
            kernel.exit(process, FAULT_EXIT_STATUS);
            TrapOutcome::Exited(FAULT_EXIT_STATUS)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syscall_frame_layout() {
        let frame = RegisterFrame::syscall(10, &[1, 0x4000, 5], 0x8000);
        assert_eq!(ExceptionClass::from(frame.esr), ExceptionClass::SvcAarch64);
        assert_eq!(frame.syscall_number(), 10);
        assert_eq!(frame.arg(0), 1);
        assert_eq!(frame.arg(1), 0x4000);
        assert_eq!(frame.arg(2), 5);
        assert_eq!(frame.arg(3), 0);
        assert_eq!(frame.sp, 0x8000);
    }

    #[test]
    fn return_value_is_sign_preserving() {
        let mut frame = RegisterFrame::zeroed();
        frame.set_return(-1);
        assert_eq!(frame.gpr[0], u64::MAX);
        assert_eq!(frame.return_value(), -1);
    }

    #[test]
    fn enter_clears_old_image_state() {
        let mut frame = RegisterFrame::syscall(3, &[0x1234], 0x8000);
        frame.spsr = 0x3c0;
        frame.enter(0x40_0000, 0x7fff_f000);
        assert_eq!(frame.elr, 0x40_0000);
        assert_eq!(frame.sp, 0x7fff_f000);
        assert_eq!(frame.gpr, [0; 31]);
        assert_eq!(frame.spsr, 0x3c0);
    }
}
