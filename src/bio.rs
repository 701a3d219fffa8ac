// Buffer cache.
//
// The buffer cache is a linked list of buf structures holding cached
// copies of disk block contents. Caching disk blocks in memory reduces
// the number of disk reads and also provides a synchronization point
// for disk blocks used by multiple processes.
//
// Interface:
// * To get a buffer for a particular disk block, call bread.
// * After changing buffer data, call bwrite to write it to disk.
// * When done with the buffer, call brelse.
// * Do not use the buffer after calling brelse.

use core::ptr;

use crate::buf::Buf;
use crate::param::NBUF;
use crate::sd::sdrw;
use crate::spinlock::Spinlock;

struct BCache {
    lock: Spinlock,
    buf: [Buf; NBUF],

    // Linked list of all buffers, through prev/next. Sorted by how
    // recently the buffer was used: head.next is most recent,
    // head.prev is least.
    head: Buf,
}

static mut BCACHE: BCache = BCache {
    lock: Spinlock::new("bcache"),
    buf: [const { Buf::new() }; NBUF],
    head: Buf::new(),
};

/// Thread the free buffers onto the LRU list.
pub fn binit() {
    unsafe {
        let head = ptr::addr_of_mut!(BCACHE.head);
        (*head).prev = head;
        (*head).next = head;
        for i in 0..NBUF {
            let b = ptr::addr_of_mut!(BCACHE.buf[i]);
            (*b).next = (*head).next;
            (*b).prev = head;
            (*(*head).next).prev = b;
            (*head).next = b;
        }
    }
}

/// Look through the cache for a block on device dev. If not cached,
/// recycle the least recently used unused buffer. Either way the
/// returned buffer is locked.
fn bget(dev: u32, blockno: u32) -> *mut Buf {
    unsafe {
        BCACHE.lock.acquire();

        let head = ptr::addr_of_mut!(BCACHE.head);

        // Is the block already cached?
        let mut b = (*head).next;
        while b != head {
            if (*b).dev == dev && (*b).blockno == blockno {
                (*b).refcnt += 1;
                BCACHE.lock.release();
                (*b).lock.acquire_sleep();
                return b;
            }
            b = (*b).next;
        }

        // Not cached; recycle the LRU unused buffer.
        let mut b = (*head).prev;
        while b != head {
            if (*b).refcnt == 0 {
                (*b).dev = dev;
                (*b).blockno = blockno;
                (*b).valid = false;
                (*b).refcnt = 1;
                BCACHE.lock.release();
                (*b).lock.acquire_sleep();
                return b;
            }
            b = (*b).prev;
        }

        panic!("bget: no buffers");
    }
}

/// Return a locked buf with the contents of the indicated block.
pub fn bread(dev: u32, blockno: u32) -> *mut Buf {
    let b = bget(dev, blockno);
    unsafe {
        if !(*b).valid {
            sdrw(b, false);
            (*b).valid = true;
        }
    }
    b
}

/// Write b's contents to disk. Must be locked.
pub fn bwrite(b: *mut Buf) {
    unsafe {
        if !(*b).lock.holding_sleep() {
            panic!("bwrite");
        }
        sdrw(b, true);
    }
}

/// Release a locked buffer and move it to the head of the
/// most-recently-used list.
pub fn brelse(b: *mut Buf) {
    unsafe {
        if !(*b).lock.holding_sleep() {
            panic!("brelse");
        }
        (*b).lock.release_sleep();

        BCACHE.lock.acquire();
        (*b).refcnt -= 1;
        if (*b).refcnt == 0 {
            // no one is waiting for it
            (*(*b).next).prev = (*b).prev;
            (*(*b).prev).next = (*b).next;

            let head = ptr::addr_of_mut!(BCACHE.head);
            (*b).next = (*head).next;
            (*b).prev = head;
            (*(*head).next).prev = b;
            (*head).next = b;
        }
        BCACHE.lock.release();
    }
}
