//! User Address Space Interface
//!
//! The paging subsystem lives outside the syscall layer. All the validator
//! needs from it is "is this page present, and with which rights", plus a
//! way to give a forked child its own copy of the mappings.

use alloc::boxed::Box;
use bitflags::bitflags;

use super::address::VirtAddr;

bitflags! {
    /// Access rights of a present user page.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageAccess: u8 {
        /// Page is readable from EL0.
        const USER = 1 << 0;
        /// Page is writable.
        const WRITABLE = 1 << 1;
        /// Page is executable from EL0.
        const EXECUTABLE = 1 << 2;

        /// Ordinary user data page.
        const USER_DATA = Self::USER.bits() | Self::WRITABLE.bits();
        /// User code page.
        const USER_CODE = Self::USER.bits() | Self::EXECUTABLE.bits();
    }
}

/// A process's view of its own mappings.
///
/// Implemented by the paging subsystem over the process's translation
/// tables; in host tests by a page set.
pub trait AddressSpace: Send {
    /// Rights of the page containing `page`, or `None` if nothing is mapped.
    ///
    /// `page` is always page-aligned and in the lower half.
    fn page_access(&self, page: VirtAddr) -> Option<PageAccess>;

    /// Copy every mapping for a forked child.
    ///
    /// Returns `None` when memory for the copy cannot be found.
    fn duplicate(&self) -> Option<Box<dyn AddressSpace>>;
}
