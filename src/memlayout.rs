// Physical memory layout
//
// A Raspberry-Pi-class board is set up like this:
//
// 00000000 -- physical RAM starts here; the first 32 KiB are reserved:
//             00003000 -- second-level table for the exception-vector page
//             00004000 -- the 16 KiB kernel page directory
//             00008000 -- the firmware loads the kernel image here
// 3F000000 -- 16 MiB of memory-mapped peripherals (on earlier boards
//             the block sits at 20000000; only MMIO_PA changes)
//
// and the kernel maps it thus:
//
// 80000000 -- KERNBASE: all of physical RAM, offset-mapped, cacheable
// D0000000 -- MMIO_VA: the peripheral block, device attributes
// FFFF0000 -- HVECTORS: the exception-vector page, double-mapped
//
// The boot assembly brings up the MMU with only the first megabyte
// mapped; mmu_init_stage1 extends that to BOOT_PHYSIZE, and
// mmu_init_stage2 maps whatever the mailbox says the board really has.

/// Start of physical RAM.
pub const PHYSTART: usize = 0;

/// Amount of physical RAM mapped before the mailbox can be asked
/// for the real figure. Early allocations must fit below this.
pub const BOOT_PHYSIZE: usize = 128 * 1024 * 1024;

/// Kernel virtual base: physical address pa is visible at pa + KERNBASE.
pub const KERNBASE: usize = 0x8000_0000;

/// Highest virtual address a user address space may back. A user page
/// directory is a single 4 KiB page of 1024 entries, each covering
/// 1 MiB, so user space ends at 1 GiB.
pub const USERBOUND: usize = 0x4000_0000;

/// Physical base of the peripheral block (BCM2836).
pub const MMIO_PA: usize = 0x3F00_0000;
/// Where the peripheral block is mapped in kernel space.
pub const MMIO_VA: usize = 0xD000_0000;
pub const MMIO_SIZE: usize = 0x0100_0000;

/// High exception-vector page, double-mapped so the kernel can write
/// it and the CPU's high-vector mode can fetch from it.
pub const HVECTORS: usize = 0xFFFF_0000;

/// Physical base of the kernel page directory (16 KiB, below the image).
pub const K_PDX_BASE: usize = 0x4000;
/// Physical base of the second-level table backing the vector page.
pub const K_PTX_BASE: usize = 0x3000;

/// Interrupt-controller registers.
pub const INT_REGS_BASE: usize = MMIO_VA + 0xB200;
/// Mailbox registers.
pub const MAILBOX_BASE: usize = MMIO_VA + 0xB880;
/// Free-running system timer.
pub const TIMER_REGS_BASE: usize = MMIO_VA + 0x3000;
/// AUX block holding the mini UART.
pub const AUX_REGS_BASE: usize = MMIO_VA + 0x21_5000;
/// GPIO registers (pin mux for the UART).
pub const GPIO_REGS_BASE: usize = MMIO_VA + 0x20_0000;

/// Translate a physical address to its kernel-virtual alias.
#[cfg(target_arch = "arm")]
#[inline]
pub fn p2v(pa: usize) -> usize {
    pa + KERNBASE
}

/// Translate a kernel-virtual address back to physical.
#[cfg(target_arch = "arm")]
#[inline]
pub fn v2p(va: usize) -> usize {
    va - KERNBASE
}

// Off-target (host unit tests) the MMU is never enabled and "physical"
// memory is an ordinary arena, so the two spaces coincide.
#[cfg(not(target_arch = "arm"))]
#[inline]
pub fn p2v(pa: usize) -> usize {
    pa
}

#[cfg(not(target_arch = "arm"))]
#[inline]
pub fn v2p(va: usize) -> usize {
    va
}
