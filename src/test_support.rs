// Shared plumbing for the host unit tests. The kernel is built around
// uni-processor statics, so the tests serialize on one mutex and reset
// the pieces of global state they touch before each run.

use std::sync::{Mutex, MutexGuard, OnceLock};

use crate::kalloc::{KMem, KMEM};
use crate::mmu::PGSIZE;

/// Serialize the tests and hand back a guard. The per-cpu record is
/// reset (no nesting, no current process) and IRQs are "on", matching
/// the state a fresh kernel would present.
pub fn kernel_test_lock() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let guard = LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|e| e.into_inner());

    unsafe {
        let c = &mut *crate::proc::mycpu();
        c.ncli = 0;
        c.irq_enabled = false;
        c.proc = core::ptr::null_mut();
    }
    crate::arm::sti();

    guard
}

/// A page-aligned span of "physical" memory for the allocator and the
/// page-table code to chew on.
pub struct Arena {
    backing: Vec<u8>,
    base: usize,
    pages: usize,
}

impl Arena {
    pub fn new(pages: usize) -> Self {
        let backing = vec![0u8; (pages + 1) * PGSIZE];
        let base = (backing.as_ptr() as usize + PGSIZE - 1) & !(PGSIZE - 1);
        Arena {
            backing,
            base,
            pages,
        }
    }

    pub fn base(&mut self) -> *mut u8 {
        self.base as *mut u8
    }

    pub fn end(&mut self) -> *mut u8 {
        (self.base + self.pages * PGSIZE) as *mut u8
    }
}

/// Point the global allocator at a fresh arena, dropping whatever it
/// held before.
pub fn reset_kmem(arena: &mut Arena) {
    unsafe {
        KMEM = KMem::new();
        KMEM.kinit1(arena.base(), arena.end());
    }
}
