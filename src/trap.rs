// Trap and interrupt dispatch.
//
// The exception assembly pushes a trap frame on the current kernel
// stack, tags it with a trap number and calls trap() with its address.
// Everything after that — system calls, the IRQ drain, fault handling,
// the kill-on-return-to-user check and the timer-driven yield — is
// decided here.

use core::ptr;

use log::warn;
use static_assertions::const_assert;

use crate::arm::{inw, outw, PSR_USER_MODE};
use crate::memlayout::INT_REGS_BASE;
use crate::printf;
use crate::proc::{exit, myproc, wakeup, yield_cpu, ProcState};
use crate::spinlock::Spinlock;
use crate::syscall::syscall;
use crate::uart::uartintr;

// Trap numbers, chosen not to collide with anything the processor
// defines.
pub const T_UND: usize = 0x01; // undefined instruction
pub const T_PABT: usize = 0x02; // prefetch abort
pub const T_DABT: usize = 0x04; // data abort
pub const T_SYSCALL: usize = 0x40;
pub const T_IRQ: usize = 0x80;

// Layout of the trap frame built on the stack by vectors.S.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct Trapframe {
    pub sp: usize, // user mode sp
    pub r0: usize,
    pub r1: usize,
    pub r2: usize,
    pub r3: usize,
    pub r4: usize,
    pub r5: usize,
    pub r6: usize,
    pub r7: usize,
    pub r8: usize,
    pub r9: usize,
    pub r10: usize,
    pub r11: usize,
    pub r12: usize,
    pub r13: usize,
    pub r14: usize,
    pub trapno: usize,
    pub ifar: usize, // instruction fault address register
    pub cpsr: usize,
    pub spsr: usize, // saved cpsr of the trapped/interrupted mode
    pub pc: usize,   // return address of the interrupted code
}

// One word per field; the exception assembly counts on it.
const_assert!(core::mem::size_of::<Trapframe>() == 21 * core::mem::size_of::<usize>());

// Interrupt-controller registers, INT_REGS_BASE-relative.
const IRQ_BASIC_PENDING: usize = 0x00;
const IRQ_PENDING_0: usize = 0x04;
const IRQ_PENDING_1: usize = 0x08;
const IRQ_ENABLE_0: usize = 0x10;
const IRQ_DISABLE_0: usize = 0x1C;
const IRQ_DISABLE_1: usize = 0x20;
const IRQ_BASIC_DISABLE: usize = 0x24;
const FIQ_CONTROL: usize = 0x0C;

/// The system timer bit in pending register 0.
pub const IRQ_TIMER_BIT: u32 = 3;
/// The mini-UART bit in pending register 0.
pub const IRQ_MINIUART_BIT: u32 = 29;

/// Timer ticks since boot, and the lock covering them.
pub static mut TICKS: usize = 0;
pub static mut TICKS_LOCK: Spinlock = Spinlock::new("time");

/// The channel sys_sleep and the timer IRQ rendezvous on.
pub fn ticks_chan() -> usize {
    unsafe { ptr::addr_of!(TICKS) as usize }
}

/// Unmask the interrupt sources the kernel understands: the system
/// timer and the mini UART.
pub fn enable_intrs() {
    let e0 = inw(INT_REGS_BASE + IRQ_ENABLE_0);
    outw(
        INT_REGS_BASE + IRQ_ENABLE_0,
        e0 | 1 << IRQ_TIMER_BIT | 1 << IRQ_MINIUART_BIT,
    );
}

/// Mask IRQ and FIQ delivery from every device.
pub fn disable_intrs() {
    outw(INT_REGS_BASE + IRQ_DISABLE_0, !0);
    outw(INT_REGS_BASE + IRQ_DISABLE_1, !0);
    outw(INT_REGS_BASE + IRQ_BASIC_DISABLE, !0);
    outw(INT_REGS_BASE + FIQ_CONTROL, 0);
}

/// Install the exception vectors and give every exception mode a
/// stack.
///
/// The CPU fetches its vectors from the high-vector page, so the
/// vector block is copied out of the kernel image into HVECTORS (the
/// instructions there are pc-relative and survive the move). Each mode
/// that can take a trap gets one 4 KiB stack and starts life with both
/// IRQ and FIQ masked.
#[cfg(target_arch = "arm")]
pub fn tv_init() {
    use crate::arm::{dsb_barrier, flush_idcache, set_mode_sp, PSR_DISABLE_FIQ, PSR_DISABLE_IRQ};
    use crate::arm::{PSR_MODE_ABT, PSR_MODE_FIQ, PSR_MODE_IRQ, PSR_MODE_MON, PSR_MODE_SYS, PSR_MODE_UND};
    use crate::kalloc::KMEM;
    use crate::memlayout::HVECTORS;
    use crate::mmu::PGSIZE;

    extern "C" {
        static vectors: u8; // vectors.S
    }

    unsafe {
        // the vector block is 8 branch slots plus 8 handler addresses
        ptr::copy(
            ptr::addr_of!(vectors),
            HVECTORS as *mut u8,
            16 * core::mem::size_of::<u32>(),
        );
        dsb_barrier();
        flush_idcache();
    }

    let masked = PSR_DISABLE_IRQ | PSR_DISABLE_FIQ;
    for mode in [
        PSR_MODE_FIQ,
        PSR_MODE_IRQ,
        PSR_MODE_UND,
        PSR_MODE_ABT,
        PSR_MODE_MON,
        PSR_MODE_SYS,
    ] {
        unsafe {
            let stack: *mut u8 = KMEM.kalloc();
            if stack.is_null() {
                panic!("tv_init: out of memory");
            }
            ptr::write_bytes(stack, 0, PGSIZE);
            set_mode_sp(stack.add(PGSIZE), mode | masked);
            crate::arm::dsb_barrier();
        }
    }

    // start from a clean slate; timer3init unmasks what we handle
    disable_intrs();
}

/// Dump a trap frame to the console. Crashing-path diagnostics only.
fn print_trap(tf: *const Trapframe) {
    unsafe {
        printf!(
            "cpu: {}, pid: {}, trapno: {:#x}, spsr: {:#x}, sp: {:#x}, pc: {:#x}, cpsr: {:#x}, ifar: {:#x}\n",
            crate::proc::cpuid(),
            if myproc().is_null() { 0 } else { (*myproc()).pid },
            (*tf).trapno,
            (*tf).spsr,
            (*tf).sp,
            (*tf).pc,
            (*tf).cpsr,
            (*tf).ifar
        );
        printf!(
            "r0: {:#x}, r1: {:#x}, r2: {:#x}, r3: {:#x}, r4: {:#x}, r5: {:#x}\n",
            (*tf).r0,
            (*tf).r1,
            (*tf).r2,
            (*tf).r3,
            (*tf).r4,
            (*tf).r5
        );
        printf!(
            "r6: {:#x}, r7: {:#x}, r8: {:#x}, r9: {:#x}, r10: {:#x}, r11: {:#x}, r12: {:#x}\n",
            (*tf).r6,
            (*tf).r7,
            (*tf).r8,
            (*tf).r9,
            (*tf).r10,
            (*tf).r11,
            (*tf).r12
        );
    }
}

/// Drain the pending registers, dispatching the sources the kernel
/// recognises. An unrecognised source is masked in the controller and
/// logged, rather than left to hold the loop forever.
fn handle_irq(is_timer_irq: &mut bool) {
    loop {
        let p0 = inw(INT_REGS_BASE + IRQ_PENDING_0);
        let p1 = inw(INT_REGS_BASE + IRQ_PENDING_1);
        // bits 8 and 9 just mirror the two pending words
        let pb = inw(INT_REGS_BASE + IRQ_BASIC_PENDING) & !0x300;
        if p0 == 0 && p1 == 0 && pb == 0 {
            break;
        }

        let mut known = 0;
        if p0 & 1 << IRQ_TIMER_BIT != 0 {
            crate::timer::timer3intr();
            unsafe {
                TICKS_LOCK.acquire();
                TICKS = TICKS.wrapping_add(1);
                TICKS_LOCK.release();
            }
            wakeup(ticks_chan());
            *is_timer_irq = true;
            known |= 1 << IRQ_TIMER_BIT;
        }
        if p0 & 1 << IRQ_MINIUART_BIT != 0 {
            uartintr();
            known |= 1 << IRQ_MINIUART_BIT;
        }

        // whatever is left has no handler; mask it so it cannot wedge
        // the machine
        let stray0 = p0 & !known;
        if stray0 != 0 || p1 != 0 || pb != 0 {
            warn!(
                "irq: masking unhandled sources {:#x}/{:#x}/{:#x}",
                stray0, p1, pb
            );
            outw(INT_REGS_BASE + IRQ_DISABLE_0, stray0);
            outw(INT_REGS_BASE + IRQ_DISABLE_1, p1);
            outw(INT_REGS_BASE + IRQ_BASIC_DISABLE, pb);
        }
    }
}

/// A system call: r7 carries the number, the dispatcher fills r0 with
/// the result. A process killed while it was in the kernel exits here
/// instead of returning to user space.
fn handle_syscall(tf: *mut Trapframe) {
    unsafe {
        let p = myproc();
        if (*p).killed {
            exit();
        }
        (*p).tf = tf;
        syscall();
        if (*p).killed {
            exit();
        }
    }
}

/// Anything that is neither a syscall nor an IRQ. From kernel mode it
/// is our own bug; from user mode the process misbehaved and is
/// killed.
fn handle_bad_trap(tf: *mut Trapframe) {
    unsafe {
        let p = myproc();
        if p.is_null() || (*tf).spsr & 0xF != PSR_USER_MODE {
            printf!("unexpected trap from kernel space\n");
            print_trap(tf);
            panic!("trap");
        }
        printf!("unexpected trap from user space\n");
        print_trap(tf);
        (*p).killed = true;
    }
}

/// Receive a trap from vectors.S and route it.
#[no_mangle]
pub extern "C" fn trap(tf: *mut Trapframe) {
    unsafe {
        if (*tf).trapno == T_SYSCALL {
            handle_syscall(tf);
            return;
        }

        let mut is_timer_irq = false;
        match (*tf).trapno {
            T_IRQ => handle_irq(&mut is_timer_irq),
            _ => handle_bad_trap(tf),
        }

        let p = myproc();
        if !p.is_null() {
            // Force the process off if it was killed while in user
            // space; a kill taken in kernel mode waits for the normal
            // syscall return.
            if (*p).killed && (*tf).spsr & 0xF == PSR_USER_MODE {
                exit();
            }

            // Force the process to give up the CPU on a clock tick.
            if (*p).state == ProcState::Running && is_timer_irq {
                yield_cpu();
            }

            // Check again: it may have been killed while yielded.
            if (*p).killed && (*tf).spsr & 0xF == PSR_USER_MODE {
                exit();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trapframe_is_word_packed() {
        // field offsets the assembly hard-codes
        let tf = Trapframe {
            sp: 0,
            r0: 1,
            r1: 2,
            r2: 3,
            r3: 4,
            r4: 5,
            r5: 6,
            r6: 7,
            r7: 8,
            r8: 9,
            r9: 10,
            r10: 11,
            r11: 12,
            r12: 13,
            r13: 14,
            r14: 15,
            trapno: 16,
            ifar: 17,
            cpsr: 18,
            spsr: 19,
            pc: 20,
        };
        let base = &tf as *const Trapframe as usize;
        let word = core::mem::size_of::<usize>();
        assert_eq!(&tf.r0 as *const usize as usize - base, word);
        assert_eq!(&tf.trapno as *const usize as usize - base, 16 * word);
        assert_eq!(&tf.pc as *const usize as usize - base, 20 * word);
    }

    #[test]
    fn trap_numbers_are_distinct() {
        let nums = [T_UND, T_PABT, T_DABT, T_SYSCALL, T_IRQ];
        for (i, a) in nums.iter().enumerate() {
            for b in nums.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }
}
