//! Kernel Configuration
//!
//! Compile-time defaults for the syscall layer's resource limits.
//! The embedding kernel passes a [`KernelConfig`] to [`crate::Kernel::new`];
//! tests shrink the limits to reach exhaustion paths quickly.

/// Highest descriptor number a process may ever be handed.
pub const MAX_FD: i32 = 128;

/// Maximum number of simultaneously open descriptors per process.
pub const MAX_OPEN_FILES: usize = 64;

/// Maximum number of processes alive (not yet reaped) at once.
pub const MAX_PROCESSES: usize = 64;

/// Maximum length of a user path, terminator included.
pub const MAX_PATH_LEN: usize = 512;

/// Process names are truncated to this many bytes.
pub const MAX_NAME_LEN: usize = 15;

/// Resource limits for one kernel instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// Highest descriptor number handed out by `open`/`dup2`.
    pub max_fd: i32,
    /// Per-process open descriptor cap.
    pub max_open_files: usize,
    /// Live process cap, checked by `fork`.
    pub max_processes: usize,
    /// Longest accepted user string, terminator included.
    pub max_path_len: usize,
    /// Process name truncation length.
    pub max_name_len: usize,
}

impl KernelConfig {
    /// The built-in limits.
    pub const fn new() -> Self {
        Self {
            max_fd: MAX_FD,
            max_open_files: MAX_OPEN_FILES,
            max_processes: MAX_PROCESSES,
            max_path_len: MAX_PATH_LEN,
            max_name_len: MAX_NAME_LEN,
        }
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::new()
    }
}
