// Console input and output. Output goes straight to the UART; input
// arrives from the UART interrupt and gets minimal line-editing
// treatment before it is buffered.

use core::fmt::{Error, Write};

use crate::proc::procdump;
use crate::spinlock::Spinlock;
use crate::uart::uartputc_sync;

pub static mut CONSOLE: Console = Console::new();

const BACKSPACE: u16 = 0x100;

/// The control-key combination for x.
const fn ctrl(x: u8) -> u8 {
    x & 0x1F
}

const INPUT_BUF_SIZE: usize = 128;

pub struct Console {
    lock: Spinlock,
    // input
    buf: [u8; INPUT_BUF_SIZE],
    r: usize, // read index
    w: usize, // write index
    e: usize, // edit index
}

impl Console {
    pub const fn new() -> Self {
        Self {
            lock: Spinlock::new("cons"),
            buf: [0; INPUT_BUF_SIZE],
            r: 0,
            w: 0,
            e: 0,
        }
    }

    /// Send one character to the uart; BACKSPACE rubs the previous
    /// character out.
    pub fn putc(&mut self, c: u16) {
        if c == BACKSPACE {
            uartputc_sync(0x08);
            uartputc_sync(b' ');
            uartputc_sync(0x08);
        } else {
            uartputc_sync(c as u8);
        }
    }

    fn intr(&mut self, c: u8) {
        self.lock.acquire();

        match c {
            // print the process table
            c if c == ctrl(b'P') => procdump(),
            // kill the line being typed
            c if c == ctrl(b'U') => {
                while self.e != self.w && self.buf[(self.e - 1) % INPUT_BUF_SIZE] != b'\n' {
                    self.e -= 1;
                    self.putc(BACKSPACE);
                }
            }
            // backspace or delete
            c if c == ctrl(b'H') || c == 0x7F => {
                if self.e != self.w {
                    self.e -= 1;
                    self.putc(BACKSPACE);
                }
            }
            _ => {
                if c != 0 && self.e - self.r < INPUT_BUF_SIZE {
                    let c = if c == b'\r' { b'\n' } else { c };

                    // echo back to the user
                    self.putc(c as u16);

                    self.buf[self.e % INPUT_BUF_SIZE] = c;
                    self.e += 1;

                    if c == b'\n' || c == ctrl(b'D') || self.e - self.r == INPUT_BUF_SIZE {
                        // a whole line (or end-of-file) has arrived;
                        // anyone waiting on console input can run
                        self.w = self.e;
                        crate::proc::wakeup(core::ptr::addr_of!(self.r) as usize);
                    }
                }
            }
        }

        self.lock.release();
    }
}

impl Write for Console {
    fn write_str(&mut self, s: &str) -> Result<(), Error> {
        for c in s.bytes() {
            self.putc(c as u16);
        }
        Ok(())
    }
}

/// The uart interrupt handler hands every received byte here.
pub fn consoleintr(c: u8) {
    unsafe { CONSOLE.intr(c) }
}

/// Hook the console up: the UART must already be initialized. Also
/// installs the kernel's log backend, which routes through printf.
pub fn consoleinit() {
    crate::klog::init();
}
