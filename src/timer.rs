// The free-running system timer, compare channel 3. The counter runs
// at 1 MHz regardless of the core clock; each interrupt re-arms the
// compare register one interval ahead.

use crate::arm::{inw, outw};
use crate::memlayout::TIMER_REGS_BASE;
use crate::param::TIMER_INTERVAL;

const TIMER_CS: usize = 0x00; // match status, write 1 to clear
const TIMER_CLO: usize = 0x04; // counter, low word
const TIMER_C3: usize = 0x18; // compare 3

const CS_M3: u32 = 1 << 3;

/// Program the first tick and unmask the interrupt sources the kernel
/// handles.
pub fn timer3init() {
    outw(
        TIMER_REGS_BASE + TIMER_C3,
        inw(TIMER_REGS_BASE + TIMER_CLO).wrapping_add(TIMER_INTERVAL),
    );
    outw(TIMER_REGS_BASE + TIMER_CS, CS_M3);
    crate::trap::enable_intrs();
}

/// Acknowledge the match and schedule the next tick. The tick counter
/// itself is advanced by the trap dispatcher.
pub fn timer3intr() {
    outw(TIMER_REGS_BASE + TIMER_CS, CS_M3);
    outw(
        TIMER_REGS_BASE + TIMER_C3,
        inw(TIMER_REGS_BASE + TIMER_CLO).wrapping_add(TIMER_INTERVAL),
    );
}
