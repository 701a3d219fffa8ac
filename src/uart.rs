// Low-level mini-UART (AUX) driver. Output is polled; input arrives
// through the AUX interrupt and is handed to the console layer.

use crate::console::consoleintr;

// the mini-UART control registers are memory-mapped at AUX_REGS_BASE.
// this macro returns the address of one of the registers.
#[macro_export]
macro_rules! Reg {
    ( $reg:expr ) => {
        $crate::memlayout::AUX_REGS_BASE + ($reg as usize)
    };
}

// the AUX registers; the mini UART is a cut-down 16550.
pub const AUX_ENABLES: usize = 0x04; // bit 0 turns the mini UART on
pub const AUX_MU_IO: usize = 0x40; // read = RX byte, write = TX byte
pub const AUX_MU_IER: usize = 0x44; // interrupt enable
pub const AUX_MU_IIR: usize = 0x48; // interrupt status / FIFO clear
pub const AUX_MU_LCR: usize = 0x4C; // line control
pub const AUX_MU_MCR: usize = 0x50; // modem control
pub const AUX_MU_LSR: usize = 0x54; // line status
pub const AUX_MU_CNTL: usize = 0x60; // rx/tx enables
pub const AUX_MU_BAUD: usize = 0x68; // baud-rate counter

pub const LSR_RX_READY: u32 = 1 << 0; // a byte is waiting in AUX_MU_IO
pub const LSR_TX_IDLE: u32 = 1 << 5; // AUX_MU_IO can take another byte

// GPIO registers, for routing pins 14/15 to the UART.
const GPFSEL1: usize = 0x04;
const GPPUD: usize = 0x94;
const GPPUDCLK0: usize = 0x98;

#[macro_export]
macro_rules! ReadReg {
    ( $reg:expr ) => {
        $crate::arm::inw($crate::Reg!($reg))
    };
}

#[macro_export]
macro_rules! WriteReg {
    ( $reg:expr, $val:expr ) => {
        $crate::arm::outw($crate::Reg!($reg), $val)
    };
}

/// Bring the mini UART up at 115200-8-N-1 on GPIO 14/15 with receive
/// interrupts on. Runs before the console exists, so it must not
/// print.
#[cfg(target_arch = "arm")]
pub fn uartinit() {
    use crate::arm::{inw, outw};
    use crate::memlayout::GPIO_REGS_BASE;

    // turn the block on, then quiesce it while it is programmed
    WriteReg!(AUX_ENABLES, ReadReg!(AUX_ENABLES) | 1);
    WriteReg!(AUX_MU_CNTL, 0);
    WriteReg!(AUX_MU_IER, 0);

    // 8-bit frames, 115200 baud from the 250 MHz core clock
    WriteReg!(AUX_MU_LCR, 3);
    WriteReg!(AUX_MU_MCR, 0);
    WriteReg!(AUX_MU_BAUD, 270);

    // route GPIO 14/15 to ALT5 (TXD1/RXD1), pulls off
    let mut sel = inw(GPIO_REGS_BASE + GPFSEL1);
    sel &= !(0b111 << 12 | 0b111 << 15);
    sel |= 0b010 << 12 | 0b010 << 15;
    outw(GPIO_REGS_BASE + GPFSEL1, sel);
    outw(GPIO_REGS_BASE + GPPUD, 0);
    delay(150);
    outw(GPIO_REGS_BASE + GPPUDCLK0, 1 << 14 | 1 << 15);
    delay(150);
    outw(GPIO_REGS_BASE + GPPUDCLK0, 0);

    // clear the FIFOs, enable receive interrupts, open the line.
    // the IER bits sit swapped relative to the documented 16550 map.
    WriteReg!(AUX_MU_IIR, 0xC6);
    WriteReg!(AUX_MU_IER, 0x01);
    WriteReg!(AUX_MU_CNTL, 3);
}

#[cfg(target_arch = "arm")]
fn delay(cycles: usize) {
    for _ in 0..cycles {
        unsafe { core::arch::asm!("nop") };
    }
}

/// Busy-wait until the transmitter can take c, then send it. Safe from
/// any context, including panics and interrupt handlers.
#[cfg(target_arch = "arm")]
pub fn uartputc_sync(c: u8) {
    while ReadReg!(AUX_MU_LSR) & LSR_TX_IDLE == 0 {}
    WriteReg!(AUX_MU_IO, c as u32);
}

/// One received byte, if any is waiting.
#[cfg(target_arch = "arm")]
fn uartgetc() -> Option<u8> {
    if ReadReg!(AUX_MU_LSR) & LSR_RX_READY != 0 {
        Some(ReadReg!(AUX_MU_IO) as u8)
    } else {
        None
    }
}

// Host builds have no device behind the register block; output is
// discarded and input never arrives.
#[cfg(not(target_arch = "arm"))]
pub fn uartinit() {}

#[cfg(not(target_arch = "arm"))]
pub fn uartputc_sync(_c: u8) {}

#[cfg(not(target_arch = "arm"))]
fn uartgetc() -> Option<u8> {
    None
}

/// The AUX interrupt: drain the receive FIFO into the console.
pub fn uartintr() {
    while let Some(c) = uartgetc() {
        consoleintr(c);
    }
}
