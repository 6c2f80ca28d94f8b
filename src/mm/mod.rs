//! Memory Management Interface
//!
//! The syscall layer never walks page tables itself. It works with:
//! - [`VirtAddr`]: canonical, user/kernel-split virtual addresses
//! - [`AddressSpace`]: the paging subsystem's per-process presence query
//! - the kernel heap (feature `heap`), backing `alloc` on bare metal

pub mod address;
pub mod space;

#[cfg(feature = "heap")]
pub mod allocator;

pub use address::{VirtAddr, KERNEL_VIRT_BASE, PAGE_SIZE, USER_TOP};
pub use space::{AddressSpace, PageAccess};

#[cfg(feature = "heap")]
pub use allocator::init_heap;
