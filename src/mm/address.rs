//! Virtual Address Types
//!
//! Type-safe wrapper for the user-supplied addresses the syscall layer
//! inspects. Only addresses that pass [`VirtAddr::try_user`] may ever be
//! checked against an address space, let alone dereferenced.
//!
//! # Security Properties
//! - Kernel (higher-half) and non-canonical addresses are rejected at construction
//! - Virtual addresses require explicit unsafe conversion to pointers
//! - Page arithmetic never wraps

use core::fmt;

/// Page size (4 KiB)
pub const PAGE_SIZE: usize = 4096;
/// Page size mask
pub const PAGE_MASK: usize = PAGE_SIZE - 1;
/// Bits to shift for page number
pub const PAGE_SHIFT: usize = 12;

/// Kernel virtual address base (higher-half)
/// Using the highest 256TB of the 48-bit address space
pub const KERNEL_VIRT_BASE: usize = 0xFFFF_0000_0000_0000;

/// Highest address of the lower (user) half.
pub const USER_TOP: usize = 0x0000_FFFF_FFFF_FFFF;

/// A virtual memory address.
///
/// Sign-extended from bit 47 like the aarch64 VMSA requires. Raw values
/// that fail that rule are not addresses at all.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct VirtAddr(usize);

impl VirtAddr {
    /// Create a user virtual address.
    ///
    /// Returns `None` for kernel and non-canonical addresses.
    #[inline]
    pub const fn try_user(addr: usize) -> Option<Self> {
        if addr <= USER_TOP {
            Some(Self(addr))
        } else {
            None
        }
    }

    /// Create a virtual address without validation.
    #[inline]
    pub const fn new_unchecked(addr: usize) -> Self {
        Self(addr)
    }

    /// Get the raw address value.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Check if the address is page-aligned.
    #[inline]
    pub const fn is_aligned(self) -> bool {
        self.0 & PAGE_MASK == 0
    }

    /// Align the address down to the nearest page boundary.
    #[inline]
    pub const fn align_down(self) -> Self {
        Self(self.0 & !PAGE_MASK)
    }

    /// Get the page offset (lowest 12 bits).
    #[inline]
    pub const fn page_offset(self) -> usize {
        self.0 & PAGE_MASK
    }

    /// Get the virtual page number.
    #[inline]
    pub const fn page_number(self) -> usize {
        self.0 >> PAGE_SHIFT
    }

    /// Add an offset, returning `None` on overflow.
    #[inline]
    pub const fn checked_add(self, offset: usize) -> Option<Self> {
        match self.0.checked_add(offset) {
            Some(addr) => Some(Self(addr)),
            None => None,
        }
    }

    /// Check if this is a kernel address (higher-half).
    #[inline]
    pub const fn is_kernel(self) -> bool {
        self.0 >= KERNEL_VIRT_BASE
    }

    /// Check if this is a user address (lower-half).
    #[inline]
    pub const fn is_user(self) -> bool {
        self.0 <= USER_TOP
    }

    /// Convert to a raw pointer.
    ///
    /// # Safety
    /// The caller must ensure the address is valid and properly mapped.
    #[inline]
    pub const unsafe fn as_ptr<T>(self) -> *const T {
        self.0 as *const T
    }
}

impl fmt::Debug for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtAddr({:#018x})", self.0)
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// Iterate the page-aligned addresses of every page touched by
/// `[start, start + len)`. Empty for `len == 0`.
pub fn pages_spanning(start: VirtAddr, len: usize) -> impl Iterator<Item = VirtAddr> {
    let first = start.page_number();
    let count = if len == 0 {
        0
    } else {
        // Callers have already rejected ranges that overflow.
        let last = (start.as_usize() + (len - 1)) >> PAGE_SHIFT;
        last - first + 1
    };
    (first..first + count).map(|page| VirtAddr(page << PAGE_SHIFT))
}
