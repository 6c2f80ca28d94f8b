//! Kernel Heap
//!
//! `linked_list_allocator` over a static arena. Process records, descriptor
//! tables and names copied out of user memory all live here.
//!
//! Only built with the `heap` feature; host builds keep the system
//! allocator.

use linked_list_allocator::LockedHeap;
use spin::Once;

#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// Arena size. A process record plus a full descriptor table is well
/// under 4 KiB.
const HEAP_SIZE: usize = 256 * 1024;

static mut HEAP_ARENA: [u8; HEAP_SIZE] = [0; HEAP_SIZE];
static HEAP_READY: Once<()> = Once::new();

/// Hand the arena to the allocator. Must run before the first
/// [`crate::Kernel`] is built; later calls do nothing.
pub fn init_heap() {
    HEAP_READY.call_once(|| {
        // SAFETY: runs exactly once (guarded by HEAP_READY) and nothing
        // else names HEAP_ARENA
        unsafe {
            let start = (&raw mut HEAP_ARENA).cast::<u8>();
            ALLOCATOR.lock().init(start, HEAP_SIZE);
        }
        log::debug!("kernel heap: {} KiB", HEAP_SIZE / 1024);
    });
}
