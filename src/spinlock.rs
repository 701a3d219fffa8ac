// Mutual exclusion via counted interrupt masking.
//
// The kernel is uni-processor: the only source of preemption is an
// IRQ, so masking IRQs for the duration of a critical section is a
// complete serializer and the "spin" of this spinlock is vacuous.
// There is deliberately no atomic test-and-set; an SMP port must
// replace this whole layer with real atomics and per-CPU state.

use static_assertions::const_assert;

use crate::arm::{cli, intr_enabled, readcpsr, sti};
use crate::param::NCPU;
use crate::printf;
use crate::proc::{mycpu, Cpu};

// The locking discipline above is only sound on one core.
const_assert!(NCPU == 1);

pub struct Spinlock {
    locked: bool,

    // For debugging:
    name: &'static str,       // Name of lock.
    cpu: *mut Cpu,            // The cpu holding the lock.
}

impl Spinlock {
    pub const fn new(name: &'static str) -> Self {
        Spinlock {
            locked: false,
            name,
            cpu: core::ptr::null_mut(),
        }
    }

    /// Acquire the lock. Disables interrupts until the matching
    /// release; re-acquiring a lock this cpu already holds is fatal.
    pub fn acquire(&mut self) {
        push_off(); // mask IRQs to avoid deadlock with handlers
        if self.holding() {
            printf!(
                "lock {}: locked={} cpsr={:#x}\n",
                self.name,
                self.locked,
                readcpsr()
            );
            panic!("acquire");
        }

        // With IRQs off nothing can race us to these stores.
        self.locked = true;
        self.cpu = mycpu();
    }

    /// Release the lock; fatal if this cpu does not hold it.
    pub fn release(&mut self) {
        if !self.holding() {
            panic!("release");
        }

        self.cpu = core::ptr::null_mut();
        self.locked = false;

        pop_off();
    }

    /// Check whether this cpu is holding the lock.
    /// Interrupts must be off.
    pub fn holding(&self) -> bool {
        self.locked && self.cpu == mycpu()
    }
}

/// push_off/pop_off are like cli/sti except that they are matched:
/// it takes two pop_off()s to undo two push_off()s, and if interrupts
/// were off to begin with, the pair leaves them off.
pub fn push_off() {
    let cpsr = readcpsr();

    cli();
    let c = unsafe { &mut *mycpu() };
    if c.ncli == 0 {
        c.irq_enabled = cpsr & crate::arm::PSR_DISABLE_IRQ == 0;
    }
    c.ncli += 1;
}

pub fn pop_off() {
    if intr_enabled() {
        panic!("pop_off - interruptible");
    }

    let c = unsafe { &mut *mycpu() };
    if c.ncli < 1 {
        panic!("pop_off");
    }
    c.ncli -= 1;
    if c.ncli == 0 && c.irq_enabled {
        sti();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::kernel_test_lock;

    // The guard serializes the tests and resets the per-cpu record
    // (ncli = 0, IRQs on) before each one.

    #[test]
    fn nesting_restores_irq_state() {
        let _g = kernel_test_lock();
        push_off();
        assert!(!intr_enabled());
        push_off();
        pop_off();
        // still one level deep: IRQs must stay masked
        assert!(!intr_enabled());
        pop_off();
        assert!(intr_enabled());
    }

    #[test]
    fn push_off_remembers_disabled_state() {
        let _g = kernel_test_lock();
        cli();
        push_off();
        pop_off();
        // IRQs were off at the outermost push_off, so they stay off
        assert!(!intr_enabled());
    }

    #[test]
    fn acquire_release_round_trip() {
        let _g = kernel_test_lock();
        let mut lk = Spinlock::new("test");
        lk.acquire();
        assert!(lk.holding());
        assert!(!intr_enabled());
        lk.release();
        assert!(!lk.locked);
        assert!(intr_enabled());
    }

    #[test]
    #[should_panic(expected = "acquire")]
    fn double_acquire_panics() {
        let _g = kernel_test_lock();
        let mut lk = Spinlock::new("test");
        lk.acquire();
        lk.acquire();
    }

    #[test]
    #[should_panic(expected = "release")]
    fn release_without_hold_panics() {
        let _g = kernel_test_lock();
        cli();
        let mut lk = Spinlock::new("test");
        lk.release();
    }

    #[test]
    #[should_panic(expected = "pop_off")]
    fn pop_off_underflow_panics() {
        let _g = kernel_test_lock();
        cli();
        pop_off();
    }
}
