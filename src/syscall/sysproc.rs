use core::ptr;

use crate::proc::{exit, fork, growproc, kill, myproc, sleep, wait};
use crate::syscall::syscall::argint;
use crate::trap::{ticks_chan, TICKS, TICKS_LOCK};

pub(super) fn sys_fork() -> i32 {
    fork()
}

pub(super) fn sys_exit() -> i32 {
    exit()
    // never reached
}

pub(super) fn sys_wait() -> i32 {
    wait()
}

pub(super) fn sys_kill() -> i32 {
    kill(argint(0))
}

pub(super) fn sys_getpid() -> i32 {
    unsafe { (*myproc()).pid }
}

/// Grow (or shrink, for negative n) the process by n bytes; returns
/// the old size.
pub(super) fn sys_sbrk() -> i32 {
    let n = argint(0);
    let addr = unsafe { (*myproc()).sz };
    if growproc(n) < 0 {
        return -1;
    }
    addr as i32
}

/// Block for n timer ticks, or until killed.
pub(super) fn sys_sleep() -> i32 {
    let n = argint(0);
    if n < 0 {
        return -1;
    }
    let n = n as usize;
    unsafe {
        TICKS_LOCK.acquire();
        let ticks0 = TICKS;
        while TICKS.wrapping_sub(ticks0) < n {
            if (*myproc()).killed {
                TICKS_LOCK.release();
                return -1;
            }
            // gives the ticks lock back until the next timer tick
            sleep(ticks_chan(), ptr::addr_of_mut!(TICKS_LOCK));
        }
        TICKS_LOCK.release();
    }
    0
}

/// Ticks since boot.
pub(super) fn sys_uptime() -> i32 {
    unsafe {
        TICKS_LOCK.acquire();
        let xticks = TICKS;
        TICKS_LOCK.release();
        xticks as i32
    }
}
