//! userprog - System-Call Boundary for a Teaching Kernel
//!
//! The layer between a user-mode trap and privileged kernel state.
//!
//! # Responsibilities
//! - Validate every pointer that originates in user memory before use
//! - Dispatch decoded syscalls to their handlers
//! - Own per-process descriptor tables and parent/child bookkeeping
//! - Serialize filesystem access behind one kernel-wide lock
//!
//! # Collaborators
//! The boot sequence, scheduler run queues, paging and the on-disk
//! filesystem live outside this crate. They are reached through traits:
//! [`drivers::Console`], [`fs::FileSystem`], [`mm::AddressSpace`],
//! [`process::Scheduler`] and [`process::ProgramLoader`].
//!
//! # Entry
//! The trap transport decodes a [`trap::RegisterFrame`] and hands it to
//! [`trap::handle_syscall_trap`], which returns a [`trap::TrapOutcome`].

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod config;
pub mod drivers;
pub mod fs;
pub mod kernel;
pub mod mm;
pub mod process;
pub mod syscall;
pub mod trap;

#[cfg(test)]
mod testing;

pub use config::KernelConfig;
pub use kernel::Kernel;
pub use process::{Process, Tid};
pub use syscall::SyscallError;
pub use trap::{handle_syscall_trap, RegisterFrame, TrapOutcome};
