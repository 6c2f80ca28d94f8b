//! System Call Errors
//!
//! Every failure a handler can hit falls into one of these classes. Fatal
//! classes terminate the caller with status -1; the rest surface as the
//! call's failure value.

use core::fmt;

/// Status recorded for a process killed by the kernel.
pub const FAULT_EXIT_STATUS: i32 = -1;

/// System call error classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallError {
    /// A user pointer (or the user stack pointer) is unmapped, in kernel
    /// space, or overflows. Fatal.
    AddressFault,
    /// `close` on an fd that is reserved or not open. Fatal.
    BadDescriptor,
    /// The syscall number is not in the table. Fatal.
    UnknownSyscall,
    /// Unknown fd or wait target.
    NotFound,
    /// Descriptor space or process resources ran out.
    Exhausted,
    /// The filesystem or program loader refused the request.
    Filesystem,
}

impl SyscallError {
    /// Whether the caller must be terminated.
    #[inline]
    pub const fn is_fatal(self) -> bool {
        matches!(
            self,
            Self::AddressFault | Self::BadDescriptor | Self::UnknownSyscall
        )
    }

    /// Value written to the result register for a recoverable error.
    #[inline]
    pub const fn sentinel(self) -> i64 {
        -1
    }
}

impl fmt::Display for SyscallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddressFault => write!(f, "bad user address"),
            Self::BadDescriptor => write!(f, "bad file descriptor"),
            Self::UnknownSyscall => write!(f, "unknown system call"),
            Self::NotFound => write!(f, "no such descriptor or child"),
            Self::Exhausted => write!(f, "resources exhausted"),
            Self::Filesystem => write!(f, "filesystem refused the operation"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classes() {
        assert!(SyscallError::AddressFault.is_fatal());
        assert!(SyscallError::BadDescriptor.is_fatal());
        assert!(SyscallError::UnknownSyscall.is_fatal());
        assert!(!SyscallError::NotFound.is_fatal());
        assert!(!SyscallError::Exhausted.is_fatal());
        assert!(!SyscallError::Filesystem.is_fatal());
    }
}
