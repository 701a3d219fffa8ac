// In-core inode cache. The process lifecycle holds inode references
// (every process has a cwd; fork duplicates it, exit drops it), so the
// cache and its reference discipline live here. Reading directories
// and walking paths below the root is the on-disk layer's business and
// stays behind namei.

use core::ptr;

use log::debug;

use crate::param::{NINODE, ROOTDEV, ROOTINO};
use crate::spinlock::Spinlock;

pub struct Inode {
    pub dev: u32,
    pub inum: u32,
    pub ref_cnt: i32,
}

impl Inode {
    const fn new() -> Self {
        Inode {
            dev: 0,
            inum: 0,
            ref_cnt: 0,
        }
    }
}

struct Icache {
    lock: Spinlock,
    inode: [Inode; NINODE],
}

static mut ICACHE: Icache = Icache {
    lock: Spinlock::new("icache"),
    inode: [const { Inode::new() }; NINODE],
};

pub fn iinit() {
    // ICACHE and its lock are statically initialized
}

/// File-system setup that has to run in process context because it may
/// sleep on disk I/O; the first process calls this once. With the
/// on-disk layer external, there is nothing to replay yet.
pub fn fsinit() {
    debug!("fs: ready");
}

/// Find the in-core inode for (dev, inum), or allocate a cache slot
/// for it, and take a reference.
fn iget(dev: u32, inum: u32) -> *mut Inode {
    unsafe {
        ICACHE.lock.acquire();

        let mut empty: *mut Inode = ptr::null_mut();
        for ip in ICACHE.inode.iter_mut() {
            if ip.ref_cnt > 0 && ip.dev == dev && ip.inum == inum {
                ip.ref_cnt += 1;
                ICACHE.lock.release();
                return ip;
            }
            if empty.is_null() && ip.ref_cnt == 0 {
                empty = ip;
            }
        }

        if empty.is_null() {
            panic!("iget: no inodes");
        }
        (*empty).dev = dev;
        (*empty).inum = inum;
        (*empty).ref_cnt = 1;
        ICACHE.lock.release();
        empty
    }
}

/// Take another reference to ip.
pub fn idup(ip: *mut Inode) -> *mut Inode {
    if ip.is_null() {
        return ip;
    }
    unsafe {
        ICACHE.lock.acquire();
        (*ip).ref_cnt += 1;
        ICACHE.lock.release();
    }
    ip
}

/// Drop a reference to ip; the cache slot becomes reusable when the
/// count reaches zero.
pub fn iput(ip: *mut Inode) {
    if ip.is_null() {
        return;
    }
    unsafe {
        ICACHE.lock.acquire();
        if (*ip).ref_cnt < 1 {
            panic!("iput");
        }
        (*ip).ref_cnt -= 1;
        ICACHE.lock.release();
    }
}

/// Resolve a path to an inode reference. The root is always
/// resolvable; anything deeper needs the on-disk directory layer and
/// reports absence here.
pub fn namei(path: &str) -> *mut Inode {
    if path == "/" {
        return iget(ROOTDEV, ROOTINO);
    }
    ptr::null_mut()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::test_support::kernel_test_lock;

    pub(crate) fn reset_icache() {
        unsafe {
            ICACHE.lock = Spinlock::new("icache");
            for ip in ICACHE.inode.iter_mut() {
                *ip = Inode::new();
            }
        }
    }

    #[test]
    fn root_resolves_to_one_shared_inode() {
        let _g = kernel_test_lock();
        reset_icache();

        let a = namei("/");
        let b = namei("/");
        assert!(!a.is_null());
        assert_eq!(a, b);
        unsafe {
            assert_eq!((*a).ref_cnt, 2);
            assert_eq!((*a).dev, ROOTDEV);
            assert_eq!((*a).inum, ROOTINO);
        }

        iput(a);
        iput(b);
        unsafe { assert_eq!((*a).ref_cnt, 0) };
    }

    #[test]
    fn deep_paths_belong_to_the_disk_layer() {
        let _g = kernel_test_lock();
        reset_icache();
        assert!(namei("/bin/sh").is_null());
    }

    #[test]
    fn idup_tracks_references() {
        let _g = kernel_test_lock();
        reset_icache();

        let a = namei("/");
        let b = idup(a);
        assert_eq!(a, b);
        unsafe { assert_eq!((*a).ref_cnt, 2) };
        iput(b);
        unsafe { assert_eq!((*a).ref_cnt, 1) };

        // null references pass through untouched
        assert!(idup(ptr::null_mut()).is_null());
        iput(ptr::null_mut());
    }
}
