// Long-term locks for processes. A sleeplock yields the CPU while
// waiting instead of burning it with IRQs masked, so it may be held
// across block I/O; the embedded spinlock only covers the flag.

use crate::proc::{myproc, sleep, wakeup};
use crate::spinlock::Spinlock;

pub struct Sleeplock {
    locked: bool,
    lk: Spinlock, // protects this sleep lock

    // For debugging:
    name: &'static str,
    pid: i32, // process holding the lock
}

impl Sleeplock {
    pub const fn new(name: &'static str) -> Self {
        Sleeplock {
            locked: false,
            lk: Spinlock::new("sleep lock"),
            name,
            pid: 0,
        }
    }

    pub fn acquire_sleep(&mut self) {
        self.lk.acquire();
        while self.locked {
            let chan = self as *const Sleeplock as usize;
            sleep(chan, &mut self.lk as *mut Spinlock);
        }
        self.locked = true;
        self.pid = unsafe { (*myproc()).pid };
        self.lk.release();
    }

    pub fn release_sleep(&mut self) {
        self.lk.acquire();
        self.locked = false;
        self.pid = 0;
        wakeup(self as *const Sleeplock as usize);
        self.lk.release();
    }

    pub fn holding_sleep(&mut self) -> bool {
        self.lk.acquire();
        let r = self.locked && self.pid == unsafe { (*myproc()).pid };
        self.lk.release();
        r
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::tests::{
        alloc_extra_proc, install_test_proc, slot_state, stage_sleeping, uninstall_test_proc,
    };
    use crate::proc::{mycpu, ProcState};
    use crate::test_support::{kernel_test_lock, reset_kmem, Arena};

    #[test]
    fn acquire_records_the_owner() {
        let _g = kernel_test_lock();
        let mut arena = Arena::new(4);
        reset_kmem(&mut arena);
        install_test_proc();

        let mut lk = Sleeplock::new("test");
        assert!(!lk.holding_sleep());
        lk.acquire_sleep();
        assert!(lk.locked);
        assert!(lk.holding_sleep());
        lk.release_sleep();
        assert!(!lk.locked);
        assert!(!lk.holding_sleep());

        uninstall_test_proc();
    }

    #[test]
    fn ownership_is_per_process() {
        let _g = kernel_test_lock();
        let mut arena = Arena::new(6);
        reset_kmem(&mut arena);
        let a = install_test_proc();

        let mut lk = Sleeplock::new("test");
        lk.acquire_sleep();

        // the same lock, seen from another process, is not ours
        let b = alloc_extra_proc();
        unsafe { (*mycpu()).proc = b };
        assert!(!lk.holding_sleep());

        unsafe { (*mycpu()).proc = a };
        assert!(lk.holding_sleep());
        lk.release_sleep();

        // once free, the other process can take it
        unsafe { (*mycpu()).proc = b };
        lk.acquire_sleep();
        assert!(lk.holding_sleep());
        lk.release_sleep();

        uninstall_test_proc();
    }

    #[test]
    fn release_wakes_the_waiters() {
        let _g = kernel_test_lock();
        let mut arena = Arena::new(4);
        reset_kmem(&mut arena);
        install_test_proc();

        let mut lk = Sleeplock::new("test");
        lk.acquire_sleep();

        // a contender blocked in acquire_sleep waits on the lock's
        // own address; releasing must make it Runnable again
        let chan = &lk as *const Sleeplock as usize;
        stage_sleeping(5, chan);
        assert_eq!(slot_state(5), ProcState::Sleeping);

        lk.release_sleep();
        assert_eq!(slot_state(5), ProcState::Runnable);

        uninstall_test_proc();
    }
}

