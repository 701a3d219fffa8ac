#![cfg_attr(target_arch = "arm", no_std)]
#![cfg_attr(target_arch = "arm", no_main)]

#[cfg(target_arch = "arm")]
mod kernel {
    use log::{debug, info};

    use pikern::printf;
    use pikern::{bio, console, file, fs, kalloc, mailbox, mmu, proc, sd, timer, trap, uart, vm};

    /// Bring the machine up, one subsystem at a time, then hand the
    /// CPU to the scheduler for good. entry.S calls this exactly once,
    /// on the boot stack, with only the first megabyte mapped.
    #[no_mangle]
    pub extern "C" fn kmain() -> ! {
        mmu::mmu_init_stage1();
        proc::machinit();
        uart::uartinit();
        console::consoleinit();
        printf!("\npikern is booting...\n\n");

        // enough pages to carry us to the real memory map
        kalloc::kinit1_boot();
        vm::kpgdir_init();
        debug!("early allocator ready");

        mailbox::mailboxinit();
        unsafe {
            mmu::PM_SIZE = mailbox::get_pm_size();
            info!("physical memory: {} MiB", mmu::PM_SIZE >> 20);
        }
        mmu::mmu_init_stage2();
        debug!("memory map complete");

        proc::pinit();
        trap::tv_init();
        debug!("trap vectors installed");

        bio::binit();
        file::fileinit();
        fs::iinit();
        sd::sdinit();
        debug!("block and file layers ready");

        kalloc::kinit2_boot();
        proc::userinit();
        timer::timer3init();
        info!("boot complete");

        proc::scheduler()
    }

    #[panic_handler]
    fn panic(info: &core::panic::PanicInfo) -> ! {
        unsafe { pikern::printf::PRINTER.panicked() };
        printf!("panic: {}\n", info);
        pikern::arm::cli();
        loop {
            unsafe { core::arch::asm!("wfi") }
        }
    }
}

// The kernel image only means something on the board; an empty shell
// keeps host builds and `cargo test` linking.
#[cfg(not(target_arch = "arm"))]
fn main() {}
