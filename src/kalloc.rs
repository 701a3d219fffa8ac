// Physical memory allocator, for user pages, page-table pages and
// kernel stacks. Hands out whole 4096-byte pages from a free list
// threaded through the free pages themselves.
//
// The allocator is seeded twice: kinit1 with the first 8 MiB above the
// kernel image (all the boot path needs), kinit2 with the rest of RAM
// once the mailbox has said how much there is and the second MMU stage
// has mapped it.

use core::ptr;

#[cfg(target_arch = "arm")]
use crate::memlayout::p2v;
use crate::mmu::{pg_round_up, PGSIZE};
use crate::spinlock::Spinlock;

struct Run {
    next: *mut Run,
}

pub struct KMem {
    lock: Spinlock,
    freelist: *mut Run,
    // bounds of the registered regions, for kfree's range check
    start: usize,
    stop: usize,
}

pub static mut KMEM: KMem = KMem::new();

impl KMem {
    pub const fn new() -> Self {
        Self {
            lock: Spinlock::new("kmem"),
            freelist: ptr::null_mut(),
            start: 0,
            stop: 0,
        }
    }

    /// Register [start, end) as free. Called once before the full
    /// memory map exists; addresses are kernel-virtual.
    pub fn kinit1(&mut self, start: *mut u8, end: *mut u8) {
        self.start = start as usize;
        self.stop = end as usize;
        self.freerange(start, end);
    }

    /// Register the remainder of RAM, [start, end) contiguous with the
    /// kinit1 region.
    pub fn kinit2(&mut self, start: *mut u8, end: *mut u8) {
        if (start as usize) != self.stop {
            panic!("kinit2");
        }
        self.stop = end as usize;
        self.freerange(start, end);
    }

    fn freerange(&mut self, start: *mut u8, end: *mut u8) {
        let mut p = pg_round_up(start as usize);
        while p + PGSIZE <= end as usize {
            self.kfree(p as *mut u8);
            p += PGSIZE;
        }
    }

    /// Free the page of memory pointed at by pa, which normally should
    /// have been returned by a call to kalloc(). (The exception is when
    /// seeding the allocator; see kinit1/kinit2 above.)
    pub fn kfree<T: Sized>(&mut self, pa: *mut T) {
        let addr = pa as usize;
        if addr % PGSIZE != 0 || addr < self.start || addr + PGSIZE > self.stop {
            panic!("kfree");
        }

        // Fill with junk to catch dangling refs.
        unsafe { ptr::write_bytes(pa as *mut u8, 1, PGSIZE) };

        let r = pa as *mut Run;

        self.lock.acquire();
        unsafe {
            (*r).next = self.freelist;
        }
        self.freelist = r;
        self.lock.release();
    }

    /// Allocate one 4096-byte page. Returns null if the memory cannot
    /// be allocated; the contents are junk and the caller must
    /// initialize them.
    pub fn kalloc<T: Sized>(&mut self) -> *mut T {
        self.lock.acquire();
        let r = self.freelist;
        if !r.is_null() {
            unsafe {
                self.freelist = (*r).next;
            }
        }
        self.lock.release();

        if !r.is_null() {
            unsafe { ptr::write_bytes(r as *mut u8, 5, PGSIZE) }; // fill with junk
        }
        r as *mut T
    }
}

/// Free pages between the end of the kernel image and the top of the
/// boot-mapped window, then hand the allocator to the rest of boot.
#[cfg(target_arch = "arm")]
pub fn kinit1_boot() {
    extern "C" {
        // first address after the kernel image, from kernel.ld
        static mut kernel_bin_end: u8;
    }
    unsafe {
        let start = ptr::addr_of_mut!(kernel_bin_end);
        KMEM.kinit1(
            start,
            p2v(crate::memlayout::PHYSTART + 8 * 1024 * 1024) as *mut u8,
        );
    }
}

/// Free the RAM beyond the early window, up to what the mailbox
/// reported.
#[cfg(target_arch = "arm")]
pub fn kinit2_boot() {
    unsafe {
        KMEM.kinit2(
            p2v(crate::memlayout::PHYSTART + 8 * 1024 * 1024) as *mut u8,
            p2v(crate::memlayout::PHYSTART + crate::mmu::PM_SIZE) as *mut u8,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{kernel_test_lock, Arena};

    #[test]
    fn alloc_and_free_round_trip() {
        let _g = kernel_test_lock();
        let mut arena = Arena::new(8);
        let mut km = KMem::new();
        km.kinit1(arena.base(), arena.end());

        let a: *mut u8 = km.kalloc();
        assert!(!a.is_null());
        assert_eq!(a as usize % PGSIZE, 0);
        // fresh pages come back junk-filled
        assert_eq!(unsafe { *a }, 5);
        km.kfree(a);
        // free fills with different junk
        assert_eq!(unsafe { *a }, 1);
        // LIFO: the page just freed is handed out next
        let b: *mut u8 = km.kalloc();
        assert_eq!(a, b);
    }

    #[test]
    fn exhaustion_returns_null_and_conserves_pages() {
        let _g = kernel_test_lock();
        let mut arena = Arena::new(4);
        let mut km = KMem::new();
        km.kinit1(arena.base(), arena.end());

        let mut pages = [ptr::null_mut::<u8>(); 4];
        for slot in pages.iter_mut() {
            *slot = km.kalloc();
            assert!(!slot.is_null());
        }
        let extra: *mut u8 = km.kalloc();
        assert!(extra.is_null());

        for &p in pages.iter() {
            km.kfree(p);
        }
        // every page is reusable again
        for _ in 0..4 {
            assert!(!km.kalloc::<u8>().is_null());
        }
    }

    #[test]
    fn two_phase_registration() {
        let _g = kernel_test_lock();
        let mut arena = Arena::new(8);
        let mut km = KMem::new();
        let mid = unsafe { arena.base().add(4 * PGSIZE) };
        km.kinit1(arena.base(), mid);
        km.kinit2(mid, arena.end());

        let mut n = 0;
        while !km.kalloc::<u8>().is_null() {
            n += 1;
        }
        assert_eq!(n, 8);
    }

    #[test]
    #[should_panic(expected = "kfree")]
    fn kfree_rejects_misaligned() {
        let _g = kernel_test_lock();
        let mut arena = Arena::new(2);
        let mut km = KMem::new();
        km.kinit1(arena.base(), arena.end());
        let p: *mut u8 = km.kalloc();
        km.kfree(unsafe { p.add(1) });
    }

    #[test]
    #[should_panic(expected = "kfree")]
    fn kfree_rejects_foreign_pages() {
        let _g = kernel_test_lock();
        let mut arena = Arena::new(2);
        let mut outside = Arena::new(1);
        let mut km = KMem::new();
        km.kinit1(arena.base(), arena.end());
        km.kfree(outside.base());
    }
}
