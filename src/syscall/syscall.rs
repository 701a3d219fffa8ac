use log::warn;

use crate::proc::myproc;
use crate::syscall::sysproc::{
    sys_exit, sys_fork, sys_getpid, sys_kill, sys_sbrk, sys_sleep, sys_uptime, sys_wait,
};
use crate::syscall::{
    NSYSCALL, SYS_EXIT, SYS_FORK, SYS_GETPID, SYS_KILL, SYS_SBRK, SYS_SLEEP, SYS_UPTIME, SYS_WAIT,
};

/// Fetch the nth 32-bit system call argument from the saved trap
/// frame. The ABI passes arguments in r0..r3.
pub(super) fn argint(n: u8) -> i32 {
    let p = myproc();
    let tf = unsafe { &*(*p).tf };
    let raw = match n {
        0 => tf.r0,
        1 => tf.r1,
        2 => tf.r2,
        3 => tf.r3,
        _ => panic!("argint"),
    };
    raw as i32
}

// Maps syscall numbers to handlers. Numbers without a handler here
// (the file-system calls) fall through to the unknown-call path.
const SYSCALLS: [Option<fn() -> i32>; NSYSCALL] = {
    let mut arr: [Option<fn() -> i32>; NSYSCALL] = [None; NSYSCALL];
    arr[SYS_FORK] = Some(sys_fork);
    arr[SYS_EXIT] = Some(sys_exit);
    arr[SYS_WAIT] = Some(sys_wait);
    arr[SYS_KILL] = Some(sys_kill);
    arr[SYS_GETPID] = Some(sys_getpid);
    arr[SYS_SBRK] = Some(sys_sbrk);
    arr[SYS_SLEEP] = Some(sys_sleep);
    arr[SYS_UPTIME] = Some(sys_uptime);
    arr
};

/// Demultiplex the system call named by r7 of the saved frame and
/// store its result in r0; negative results mean failure.
pub fn syscall() {
    unsafe {
        let p = myproc();
        let tf = (*p).tf;
        let num = (*tf).r7;

        if num > 0 && num < NSYSCALL && SYSCALLS[num].is_some() {
            let ret = SYSCALLS[num].unwrap()();
            (*tf).r0 = ret as isize as usize;
        } else {
            warn!(
                "{} {}: unknown sys call {}",
                (*p).pid,
                core::str::from_utf8(&(*p).name).unwrap_or("?"),
                num
            );
            (*tf).r0 = -1isize as usize;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::tests::{install_test_proc, uninstall_test_proc};
    use crate::test_support::{kernel_test_lock, reset_kmem, Arena};

    #[test]
    fn argint_reads_the_frame_registers() {
        let _g = kernel_test_lock();
        let mut arena = Arena::new(4);
        reset_kmem(&mut arena);

        let p = install_test_proc();
        unsafe {
            (*(*p).tf).r0 = 11;
            (*(*p).tf).r1 = 22;
            (*(*p).tf).r2 = -7isize as usize;
            (*(*p).tf).r3 = 44;
            assert_eq!(argint(0), 11);
            assert_eq!(argint(1), 22);
            assert_eq!(argint(2), -7);
            assert_eq!(argint(3), 44);
        }
        uninstall_test_proc();
    }

    #[test]
    fn getpid_goes_through_the_dispatch_table() {
        let _g = kernel_test_lock();
        let mut arena = Arena::new(4);
        reset_kmem(&mut arena);

        let p = install_test_proc();
        unsafe {
            (*(*p).tf).r7 = SYS_GETPID;
            syscall();
            assert_eq!((*(*p).tf).r0 as i32, (*p).pid);
        }
        uninstall_test_proc();
    }

    #[test]
    fn unknown_numbers_return_minus_one() {
        let _g = kernel_test_lock();
        let mut arena = Arena::new(4);
        reset_kmem(&mut arena);

        let p = install_test_proc();
        unsafe {
            for num in [0, 4, NSYSCALL - 1 + 1, 99] {
                (*(*p).tf).r7 = num;
                (*(*p).tf).r0 = 0;
                syscall();
                assert_eq!((*(*p).tf).r0 as i32, -1, "num {}", num);
            }
        }
        uninstall_test_proc();
    }
}
