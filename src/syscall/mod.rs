//! System Call Interface
//!
//! Entry point from the trap layer into the kernel for user programs.
//!
//! # Security Model
//! - Whitelist approach: only the numbers in [`numbers`] are served
//! - The user stack pointer is checked before the syscall number is looked at
//! - Every pointer argument is validated before it is dereferenced
//! - Bad pointers, bad closes and unknown numbers kill the caller (-1)
//!
//! # Syscalls
//! halt, exit, fork, exec, wait, create, remove, open, filesize, read,
//! write, seek, tell, close, dup2.

mod error;
mod handler;
pub mod validate;

pub use error::{SyscallError, FAULT_EXIT_STATUS};
pub use handler::{dispatch, numbers};
pub use validate::{UserBuffer, UserBufferMut};
