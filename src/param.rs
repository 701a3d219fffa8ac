// System-wide sizing knobs.

pub const NPROC: usize = 64; // maximum number of processes
pub const NCPU: usize = 1; // the scheduler, locks and per-cpu state assume one core
pub const NOFILE: usize = 16; // open files per process
pub const NFILE: usize = 100; // open files per system
pub const NINODE: usize = 50; // maximum number of active i-nodes
pub const NBUF: usize = 30; // size of disk block cache
pub const ROOTDEV: u32 = 1; // device number of file system root disk
pub const ROOTINO: u32 = 1; // root i-number

pub const KSTACKSIZE: usize = 4096; // size of a per-process kernel stack

// System-timer compare interval: the timer runs at 1 MHz,
// so 10_000 counts gives a 10 ms tick.
pub const TIMER_INTERVAL: u32 = 10_000;
