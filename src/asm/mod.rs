// The parts that must be assembly: the boot entry, the exception
// vectors with the trap-frame build and restore, and the context
// switch.

#[cfg(target_arch = "arm")]
use core::arch::global_asm;

#[cfg(target_arch = "arm")]
global_asm!(include_str!("entry.S"));
#[cfg(target_arch = "arm")]
global_asm!(include_str!("vectors.S"));
#[cfg(target_arch = "arm")]
global_asm!(include_str!("switch.S"));
