//! Device drivers for the syscall layer
//!
//! The syscall layer talks to exactly one device: the console, which is
//! both fd 0 (keyboard input) and fd 1 (console output).
//!
//! All drivers follow these security principles:
//! - Minimal unsafe code, well-documented
//! - Input validation on all public interfaces
//! - No panics on invalid input (return errors)

pub mod uart;

/// Byte-stream console behind fd 0 and fd 1.
pub trait Console: Send + Sync {
    /// Write every byte of `bytes`, in order.
    ///
    /// One call is one uninterrupted write: output from different
    /// processes is never interleaved inside a single call.
    fn put_bytes(&self, bytes: &[u8]);

    /// Block until one byte of keyboard input is available and return it.
    fn get_byte(&self) -> u8;
}
