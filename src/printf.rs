use core::fmt::{Arguments, Write};

use crate::console::CONSOLE;
use crate::spinlock::Spinlock;

pub static mut PRINTER: Printer = Printer {
    lock: Spinlock::new("pr"),
    locking: true,
};

#[macro_export]
macro_rules! printf
{
    ($($arg:tt)*) => {
        unsafe {
            $crate::printf::PRINTER.printf(core::format_args!($($arg)*))
        }
    };
}

/// lock to avoid interleaving concurrent printf's.
pub struct Printer {
    lock: Spinlock,
    locking: bool,
}

impl Printer {
    pub fn printf(&mut self, args: Arguments<'_>) {
        let locking = self.locking;
        if locking {
            self.lock.acquire();
        }

        unsafe {
            let _ = CONSOLE.write_fmt(args);
        }

        if locking {
            self.lock.release()
        }
    }

    /// Called on the panic path: from here on nothing else will print,
    /// so stop taking the lock in case the panic holds it.
    pub fn panicked(&mut self) {
        self.locking = false;
    }
}
