// Process table, scheduling and the fork/exit/wait tree.
//
// The scheduler and the processes it runs are co-routines over swtch:
// whoever is switched to owns the process-table lock and must release
// it, then re-acquire it before switching back. That hand-off is the
// central invariant of the kernel; sched() asserts the pieces of it
// that can be checked.

use core::ptr;
use core::sync::atomic::{AtomicI32, Ordering};

use static_assertions::const_assert;

use crate::arm::{sti, swtch, trapret, PSR_MODE_USR};
use crate::file::{fileclose, filedup, File};
use crate::fs::{idup, iput, namei, Inode};
use crate::kalloc::KMEM;
use crate::mmu::{Pde, PGSIZE};
use crate::param::{KSTACKSIZE, NCPU, NOFILE, NPROC};
use crate::printf;
use crate::spinlock::Spinlock;
use crate::trap::Trapframe;
use crate::vm::{allocuvm, copyuvm, deallocuvm, freevm, inituvm, setupkvm, switchkvm, switchuvm};

// Saved registers for kernel context switches. The context lives at
// the bottom of the stack it describes; the stack pointer is the
// address of the context. Layout matches switch.S.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct Context {
    pub r4: usize,
    pub r5: usize,
    pub r6: usize,
    pub r7: usize,
    pub r8: usize,
    pub r9: usize,
    pub r10: usize,
    pub r11: usize,
    pub r12: usize,
    pub lr: usize,
    pub pc: usize,
}

// Per-CPU state. The design is uni-processor: "per-CPU" is a single
// record and cpuid() is constant, but the shape keeps the SMP seam
// visible.
pub struct Cpu {
    pub id: usize,
    pub scheduler: *mut Context, // swtch() here to enter scheduler()
    pub started: bool,
    pub ncli: i32,          // depth of push_off nesting
    pub irq_enabled: bool,  // were IRQs enabled before push_off?
    pub proc: *mut Proc,    // the process running on this cpu, or null
}

const_assert!(NCPU == 1);

impl Cpu {
    const fn new() -> Self {
        Cpu {
            id: 0,
            scheduler: ptr::null_mut(),
            started: false,
            ncli: 0,
            irq_enabled: false,
            proc: ptr::null_mut(),
        }
    }
}

pub static mut CPUS: [Cpu; NCPU] = [const { Cpu::new() }; NCPU];

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ProcState {
    Unused,
    Embryo,
    Sleeping,
    Runnable,
    Running,
    Zombie,
}

// Per-process state
#[derive(Copy, Clone)]
pub struct Proc {
    pub sz: usize,                    // size of process memory (bytes)
    pub pgdir: *mut Pde,              // user page directory
    pub kstack: *mut u8,              // bottom of kernel stack for this process
    pub state: ProcState,
    pub pid: i32,
    pub parent: *mut Proc,
    pub tf: *mut Trapframe,           // trap frame for current syscall
    pub context: *mut Context,        // swtch() here to run process
    pub chan: usize,                  // if non-zero, sleeping on chan
    pub killed: bool,
    pub ofile: [*mut File; NOFILE],   // open files
    pub cwd: *mut Inode,              // current directory
    pub name: [u8; 16],               // process name (debugging)
}

impl Proc {
    const fn new() -> Self {
        Proc {
            sz: 0,
            pgdir: ptr::null_mut(),
            kstack: ptr::null_mut(),
            state: ProcState::Unused,
            pid: 0,
            parent: ptr::null_mut(),
            tf: ptr::null_mut(),
            context: ptr::null_mut(),
            chan: 0,
            killed: false,
            ofile: [ptr::null_mut(); NOFILE],
            cwd: ptr::null_mut(),
            name: [0; 16],
        }
    }

    fn set_name(&mut self, name: &str) {
        self.name = [0; 16];
        let n = name.len().min(15);
        self.name[..n].copy_from_slice(&name.as_bytes()[..n]);
    }

    fn name_str(&self) -> &str {
        let n = self.name.iter().position(|&b| b == 0).unwrap_or(16);
        core::str::from_utf8(&self.name[..n]).unwrap_or("?")
    }
}

struct Ptable {
    lock: Spinlock,
    proc: [Proc; NPROC],
}

static mut PTABLE: Ptable = Ptable {
    lock: Spinlock::new("ptable"),
    proc: [Proc::new(); NPROC],
};

static mut INIT_PROC: *mut Proc = ptr::null_mut();

// The next PID free for assignment. PIDs are never recycled; on a
// long-running system the counter eventually overflows.
static NEXT_PID: AtomicI32 = AtomicI32::new(1);

/// Must be called with interrupts disabled.
pub fn cpuid() -> usize {
    0
}

/// Return this CPU's cpu struct as a raw pointer; dereferencing it is
/// safe only while IRQs stay off.
pub fn mycpu() -> *mut Cpu {
    unsafe { ptr::addr_of_mut!(CPUS[cpuid()]) }
}

/// Return the currently running process, or null if none.
pub fn myproc() -> *mut Proc {
    crate::spinlock::push_off();
    let p = unsafe { (*mycpu()).proc };
    crate::spinlock::pop_off();
    p
}

fn alloc_pid() -> i32 {
    NEXT_PID.fetch_add(1, Ordering::Relaxed)
}

/// Zero the per-cpu records. Runs before anything can take a lock.
pub fn machinit() {
    unsafe {
        for c in CPUS.iter_mut() {
            *c = Cpu::new();
        }
    }
}

/// Initialize the process table.
pub fn pinit() {
    // PTABLE and its lock are statically initialized; nothing to do
    // until userinit.
}

/// Look in the process table for an Unused slot. If found, mark it
/// Embryo, give it a pid and a kernel stack prepared so that the first
/// swtch into it runs fork_return and then trapret. Returns null when
/// the table is full or the stack allocation fails.
fn allocproc() -> *mut Proc {
    unsafe {
        PTABLE.lock.acquire();
        let mut found: *mut Proc = ptr::null_mut();
        for p in PTABLE.proc.iter_mut() {
            if p.state == ProcState::Unused {
                found = p;
                break;
            }
        }
        if found.is_null() {
            PTABLE.lock.release();
            return ptr::null_mut();
        }

        let p = found;
        (*p).state = ProcState::Embryo;
        (*p).pid = alloc_pid();
        PTABLE.lock.release();

        // Allocate a kernel stack for the process.
        (*p).kstack = KMEM.kalloc();
        if (*p).kstack.is_null() {
            (*p).state = ProcState::Unused;
            return ptr::null_mut();
        }
        ptr::write_bytes((*p).kstack, 0, PGSIZE);
        let mut sp = (*p).kstack.add(KSTACKSIZE);

        // Leave room for the trap frame.
        sp = sp.sub(core::mem::size_of::<Trapframe>());
        (*p).tf = sp as *mut Trapframe;

        // Set up the new context to start executing at fork_return,
        // which returns through trapret.
        sp = sp.sub(core::mem::size_of::<Context>());
        (*p).context = sp as *mut Context;
        (*(*p).context).pc = fork_return as usize;
        (*(*p).context).lr = trapret as usize;

        p
    }
}

/// Free a proc slot and everything hanging from it.
/// The table lock must be held.
fn freeproc(p: *mut Proc) {
    unsafe {
        if !(*p).kstack.is_null() {
            KMEM.kfree((*p).kstack);
        }
        (*p).kstack = ptr::null_mut();
        if !(*p).pgdir.is_null() {
            freevm((*p).pgdir);
        }
        (*p).pgdir = ptr::null_mut();
        (*p).sz = 0;
        (*p).pid = 0;
        (*p).parent = ptr::null_mut();
        (*p).name = [0; 16];
        (*p).chan = 0;
        (*p).killed = false;
        (*p).state = ProcState::Unused;
    }
}

// A user program that loops reaping children with wait(); orphans of
// every exited process end up here. Assembled from:
//
//   start:
//     mov r7, #3      @ wait
//     svc 0x40
//     b   start
const INITCODE: [u8; 12] = [
    0x03, 0x70, 0xA0, 0xE3, // mov r7, #3
    0x40, 0x00, 0x00, 0xEF, // svc 0x40
    0xFC, 0xFF, 0xFF, 0xEA, // b start
];

/// Set up the first user process.
pub fn userinit() {
    unsafe {
        let p = allocproc();
        if p.is_null() {
            panic!("userinit: no process slot");
        }
        INIT_PROC = p;

        (*p).pgdir = setupkvm();
        if (*p).pgdir.is_null() {
            panic!("userinit: out of memory?");
        }
        inituvm((*p).pgdir, INITCODE.as_ptr(), INITCODE.len());
        (*p).sz = PGSIZE;

        // Hand-build a trap frame as if initcode had just trapped:
        // user mode with IRQs unmasked, stack at the top of its one
        // page, resuming at address zero.
        ptr::write_bytes((*p).tf as *mut u8, 0, core::mem::size_of::<Trapframe>());
        (*(*p).tf).spsr = PSR_MODE_USR;
        (*(*p).tf).sp = PGSIZE;
        (*(*p).tf).pc = 0;

        (*p).set_name("initcode");
        (*p).cwd = namei("/");

        (*p).state = ProcState::Runnable;
    }
}

/// Grow or shrink the current process's memory by n bytes.
/// Returns 0 on success, -1 on failure.
pub fn growproc(n: i32) -> i32 {
    unsafe {
        let p = myproc();
        let mut sz = (*p).sz;
        if n > 0 {
            sz = allocuvm((*p).pgdir, sz, sz + n as usize);
            if sz == 0 {
                return -1;
            }
        } else if n < 0 {
            sz = deallocuvm((*p).pgdir, sz, sz - (-n) as usize);
            if sz == 0 {
                return -1;
            }
        }
        (*p).sz = sz;
        // the live directory holds a stale copy of the mappings
        switchuvm(p);
        0
    }
}

/// Create a new process duplicating the caller. Sets up the child's
/// stack to return as if from the fork() system call.
/// Returns the child's pid to the parent, or -1 on failure.
pub fn fork() -> i32 {
    unsafe {
        let p = myproc();

        let np = allocproc();
        if np.is_null() {
            return -1;
        }

        // Copy the whole user address space.
        (*np).pgdir = copyuvm((*p).pgdir, (*p).sz);
        if (*np).pgdir.is_null() {
            KMEM.kfree((*np).kstack);
            (*np).kstack = ptr::null_mut();
            (*np).state = ProcState::Unused;
            return -1;
        }
        (*np).sz = (*p).sz;
        (*np).parent = p;
        *(*np).tf = *(*p).tf;

        // Clear r0 in the child's frame so fork returns 0 there.
        (*(*np).tf).r0 = 0;

        for fd in 0..NOFILE {
            if !(*p).ofile[fd].is_null() {
                (*np).ofile[fd] = filedup((*p).ofile[fd]);
            }
        }
        (*np).cwd = idup((*p).cwd);

        (*np).name = (*p).name;

        let pid = (*np).pid;
        (*np).state = ProcState::Runnable;
        pid
    }
}

/// Exit the current process: close its files, hand its children to
/// init, become a Zombie and enter the scheduler for the last time.
/// The slot is reclaimed when the parent calls wait(). Does not return.
pub fn exit() -> ! {
    unsafe {
        let p = myproc();
        if p == INIT_PROC {
            panic!("init exiting");
        }

        for fd in 0..NOFILE {
            if !(*p).ofile[fd].is_null() {
                fileclose((*p).ofile[fd]);
                (*p).ofile[fd] = ptr::null_mut();
            }
        }
        iput((*p).cwd);
        (*p).cwd = ptr::null_mut();

        PTABLE.lock.acquire();

        // The parent might be blocked in wait().
        wakeup1((*p).parent as usize);

        // Pass the abandoned children to init.
        for q in PTABLE.proc.iter_mut() {
            if q.parent == p {
                q.parent = INIT_PROC;
                if q.state == ProcState::Zombie {
                    wakeup1(INIT_PROC as usize);
                }
            }
        }

        (*p).state = ProcState::Zombie;
        sched();
        panic!("zombie exit");
    }
}

/// Wait for a child to exit and return its pid, reclaiming its slot,
/// kernel stack and address space. Returns -1 if the caller has no
/// children or has been killed.
pub fn wait() -> i32 {
    unsafe {
        let p = myproc();
        PTABLE.lock.acquire();
        loop {
            let mut have_kids = false;
            for q in PTABLE.proc.iter_mut() {
                if q.parent != p {
                    continue;
                }
                have_kids = true;
                if q.state == ProcState::Zombie {
                    let pid = q.pid;
                    freeproc(q);
                    PTABLE.lock.release();
                    return pid;
                }
            }

            if !have_kids || (*p).killed {
                PTABLE.lock.release();
                return -1;
            }

            // Wait for a child to exit; exit() wakes us on our own
            // proc record.
            sleep(p as usize, ptr::addr_of_mut!(PTABLE.lock));
        }
    }
}

// Has scheduler() run before? The very first entry arrives from boot
// with IRQs still off; later iterations must re-enable them after the
// switched-to process has had its turn.
static mut FIRST_SCHED: bool = true;

/// Per-CPU scheduler loop; never returns. Round-robin over Runnable
/// slots. The switched-to process owns the table lock and must release
/// it, then re-acquire it on the way back.
pub fn scheduler() -> ! {
    unsafe {
        let c = mycpu();
        (*c).started = true;
        loop {
            if FIRST_SCHED {
                FIRST_SCHED = false;
            } else {
                sti();
            }

            PTABLE.lock.acquire();
            for i in 0..NPROC {
                let p = ptr::addr_of_mut!(PTABLE.proc[i]);
                if (*p).state != ProcState::Runnable {
                    continue;
                }

                (*c).proc = p;
                switchuvm(p);
                (*p).state = ProcState::Running;
                swtch(ptr::addr_of_mut!((*c).scheduler), (*p).context);

                // The process is done for now; it changed its state
                // before coming back.
                switchkvm();
                (*c).proc = ptr::null_mut();
            }
            PTABLE.lock.release();
        }
    }
}

/// Return to the scheduler. The caller must hold the table lock and
/// nothing else, must have already changed its state away from
/// Running, and must leave IRQs off; anything else is a bug.
pub fn sched() {
    unsafe {
        let p = myproc();
        let c = mycpu();
        if !PTABLE.lock.holding() {
            panic!("sched ptable.lock");
        }
        if (*c).ncli != 1 {
            panic!("sched locks");
        }
        if (*p).state == ProcState::Running {
            panic!("sched running");
        }
        if crate::arm::intr_enabled() {
            panic!("sched interruptible");
        }

        let irq_enabled = (*c).irq_enabled;
        swtch(ptr::addr_of_mut!((*p).context), (*c).scheduler);
        (*mycpu()).irq_enabled = irq_enabled;
    }
}

/// Give up the CPU for one scheduling round.
pub fn yield_cpu() {
    unsafe {
        PTABLE.lock.acquire();
        (*myproc()).state = ProcState::Runnable;
        sched();
        PTABLE.lock.release();
    }
}

/// A fork child's first scheduling lands here, still holding the
/// table lock from scheduler(); release it and fall through to
/// trapret.
extern "C" fn fork_return() {
    unsafe {
        PTABLE.lock.release();

        static mut FIRST_PROC: bool = true;
        if FIRST_PROC {
            // Initialization that must sleep has to run in a process
            // context, not from kmain.
            FIRST_PROC = false;
            crate::fs::fsinit();
        }
    }
}

/// Atomically release lk and sleep on chan; re-acquire lk when woken.
/// Taking the table lock before releasing lk is what guarantees no
/// wakeup is lost between the two.
pub fn sleep(chan: usize, lk: *mut Spinlock) {
    unsafe {
        let p = myproc();
        if p.is_null() {
            panic!("sleep");
        }
        if lk.is_null() {
            panic!("sleep without lk");
        }

        let ptlock = ptr::addr_of_mut!(PTABLE.lock);
        if lk != ptlock {
            PTABLE.lock.acquire();
            (*lk).release();
        }

        (*p).chan = chan;
        (*p).state = ProcState::Sleeping;
        sched();

        (*p).chan = 0;

        if lk != ptlock {
            PTABLE.lock.release();
            (*lk).acquire();
        }
    }
}

/// Wake every process sleeping on chan.
/// The caller must hold the table lock. The woken process clears its
/// own channel when it resumes.
fn wakeup1(chan: usize) {
    unsafe {
        for p in PTABLE.proc.iter_mut() {
            if p.state == ProcState::Sleeping && p.chan == chan {
                p.state = ProcState::Runnable;
            }
        }
    }
}

/// Wake every process sleeping on chan, taking the table lock.
pub fn wakeup(chan: usize) {
    unsafe {
        PTABLE.lock.acquire();
        wakeup1(chan);
        PTABLE.lock.release();
    }
}

/// Flag the process with the given pid to exit the next time it heads
/// back to user space. A sleeper is made Runnable so it can get there.
/// Returns 0 on success, -1 if no such pid.
pub fn kill(pid: i32) -> i32 {
    unsafe {
        PTABLE.lock.acquire();
        for p in PTABLE.proc.iter_mut() {
            if p.pid == pid && p.state != ProcState::Unused {
                p.killed = true;
                if p.state == ProcState::Sleeping {
                    p.state = ProcState::Runnable;
                }
                PTABLE.lock.release();
                return 0;
            }
        }
        PTABLE.lock.release();
        -1
    }
}

/// Print a process listing to the console; ^P from the keyboard.
/// No lock, to avoid wedging a stuck machine further.
pub fn procdump() {
    unsafe {
        for p in PTABLE.proc.iter() {
            if p.state == ProcState::Unused {
                continue;
            }
            let state = match p.state {
                ProcState::Unused => "unused",
                ProcState::Embryo => "embryo",
                ProcState::Sleeping => "sleep ",
                ProcState::Runnable => "runble",
                ProcState::Running => "run   ",
                ProcState::Zombie => "zombie",
            };
            printf!("{} {} {}\n", p.pid, state, p.name_str());
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::test_support::{kernel_test_lock, reset_kmem, Arena};

    pub(crate) fn reset_ptable() {
        unsafe {
            PTABLE.lock = Spinlock::new("ptable");
            for p in PTABLE.proc.iter_mut() {
                *p = Proc::new();
            }
            INIT_PROC = ptr::null_mut();
            (*mycpu()).proc = ptr::null_mut();
        }
        NEXT_PID.store(1, Ordering::Relaxed);
    }

    /// Fabricate a Running process for syscall-level tests: a fresh
    /// slot installed as the current process, with a scratch page
    /// standing in for the live kernel directory so switchuvm has
    /// somewhere to merge into.
    pub(crate) fn install_test_proc() -> *mut Proc {
        reset_ptable();
        unsafe {
            crate::vm::KPGDIR = KMEM.kalloc();
            assert!(!crate::vm::KPGDIR.is_null());
            let p = allocproc();
            assert!(!p.is_null());
            (*p).state = ProcState::Running;
            (*mycpu()).proc = p;
            p
        }
    }

    pub(crate) fn uninstall_test_proc() {
        unsafe {
            (*mycpu()).proc = ptr::null_mut();
            crate::vm::KPGDIR = ptr::null_mut();
        }
    }

    /// A second live process, for tests about per-process ownership.
    /// Not installed as current; the caller points the cpu at it.
    pub(crate) fn alloc_extra_proc() -> *mut Proc {
        let p = allocproc();
        assert!(!p.is_null());
        unsafe { (*p).state = ProcState::Running };
        p
    }

    /// Park a table slot as if it were sleeping on chan.
    pub(crate) fn stage_sleeping(idx: usize, chan: usize) {
        unsafe {
            PTABLE.proc[idx].state = ProcState::Sleeping;
            PTABLE.proc[idx].chan = chan;
        }
    }

    pub(crate) fn slot_state(idx: usize) -> ProcState {
        unsafe { PTABLE.proc[idx].state }
    }

    #[test]
    fn allocproc_lays_out_the_kernel_stack() {
        let _g = kernel_test_lock();
        let mut arena = Arena::new(8);
        reset_kmem(&mut arena);
        reset_ptable();

        let p = allocproc();
        assert!(!p.is_null());
        unsafe {
            assert_eq!((*p).state, ProcState::Embryo);
            assert!((*p).pid > 0);
            let kstack = (*p).kstack as usize;
            let tf = (*p).tf as usize;
            let ctx = (*p).context as usize;
            // trap frame at the top, context immediately below it
            assert_eq!(tf, kstack + KSTACKSIZE - core::mem::size_of::<Trapframe>());
            assert_eq!(ctx, tf - core::mem::size_of::<Context>());
            assert_eq!((*(*p).context).pc, fork_return as usize);
            assert_eq!((*(*p).context).lr, trapret as usize);
        }
    }

    #[test]
    fn pids_are_monotonic() {
        let _g = kernel_test_lock();
        let mut arena = Arena::new(8);
        reset_kmem(&mut arena);
        reset_ptable();

        let a = allocproc();
        let b = allocproc();
        unsafe {
            assert_eq!((*a).pid, 1);
            assert_eq!((*b).pid, 2);
        }
    }

    #[test]
    fn table_full_returns_null() {
        let _g = kernel_test_lock();
        let mut arena = Arena::new(NPROC + 8);
        reset_kmem(&mut arena);
        reset_ptable();

        for _ in 0..NPROC {
            assert!(!allocproc().is_null());
        }
        assert!(allocproc().is_null());
    }

    #[test]
    fn kstack_failure_rolls_back_the_slot() {
        let _g = kernel_test_lock();
        let mut arena = Arena::new(1);
        reset_kmem(&mut arena);
        reset_ptable();

        // drain the allocator so the kstack allocation must fail
        assert!(!unsafe { KMEM.kalloc::<u8>() }.is_null());
        assert!(allocproc().is_null());
        unsafe {
            assert_eq!(PTABLE.proc[0].state, ProcState::Unused);
        }
    }

    #[test]
    fn wakeup_is_channel_selective() {
        let _g = kernel_test_lock();
        reset_ptable();
        unsafe {
            PTABLE.proc[0].state = ProcState::Sleeping;
            PTABLE.proc[0].chan = 0x100;
            PTABLE.proc[1].state = ProcState::Sleeping;
            PTABLE.proc[1].chan = 0x200;
            PTABLE.proc[2].state = ProcState::Runnable;

            wakeup(0x100);
            assert_eq!(PTABLE.proc[0].state, ProcState::Runnable);
            assert_eq!(PTABLE.proc[1].state, ProcState::Sleeping);
            // wakeup leaves the channel alone; the sleeper clears it
            assert_eq!(PTABLE.proc[0].chan, 0x100);
        }
    }

    #[test]
    fn kill_promotes_sleepers() {
        let _g = kernel_test_lock();
        reset_ptable();
        unsafe {
            PTABLE.proc[0].state = ProcState::Sleeping;
            PTABLE.proc[0].pid = 7;
            PTABLE.proc[0].chan = 0x42;
            PTABLE.proc[1].state = ProcState::Running;
            PTABLE.proc[1].pid = 8;

            assert_eq!(kill(7), 0);
            assert!(PTABLE.proc[0].killed);
            assert_eq!(PTABLE.proc[0].state, ProcState::Runnable);

            // a running victim just gets the flag
            assert_eq!(kill(8), 0);
            assert!(PTABLE.proc[1].killed);
            assert_eq!(PTABLE.proc[1].state, ProcState::Running);

            assert_eq!(kill(99), -1);
        }
    }

    #[test]
    fn fork_duplicates_memory_and_clears_child_r0() {
        let _g = kernel_test_lock();
        let mut arena = Arena::new(24);
        reset_kmem(&mut arena);
        reset_ptable();
        crate::fs::tests::reset_icache();
        crate::file::tests::reset_ftable();

        // hand-build a parent and install it as the running process
        let parent = allocproc();
        assert!(!parent.is_null());
        unsafe {
            (*parent).pgdir = setupkvm();
            (*parent).sz = allocuvm((*parent).pgdir, 0, 2 * PGSIZE);
            assert_eq!((*parent).sz, 2 * PGSIZE);
            *crate::vm::uva2ka((*parent).pgdir, 0x10) = 0x5A;
            (*(*parent).tf).r0 = 1234;
            (*(*parent).tf).pc = 0x8000;
            (*parent).cwd = namei("/");
            (*parent).set_name("parent");
            (*parent).state = ProcState::Running;
            (*mycpu()).proc = parent;

            let pid = fork();
            assert!(pid > 0);

            let child = PTABLE
                .proc
                .iter_mut()
                .find(|q| q.pid == pid)
                .map(|q| q as *mut Proc)
                .unwrap();
            assert_eq!((*child).state, ProcState::Runnable);
            assert_eq!((*child).parent, parent);
            assert_eq!((*child).sz, (*parent).sz);
            // the frame is inherited except for the fork return value
            assert_eq!((*(*child).tf).pc, 0x8000);
            assert_eq!((*(*child).tf).r0, 0);
            assert_eq!((*(*parent).tf).r0, 1234);
            // memory is equal but not shared
            assert_eq!(*crate::vm::uva2ka((*child).pgdir, 0x10), 0x5A);
            assert_ne!(
                crate::vm::uva2ka((*child).pgdir, 0x10),
                crate::vm::uva2ka((*parent).pgdir, 0x10)
            );
            // the cwd reference was duplicated, not stolen
            assert_eq!((*child).cwd, (*parent).cwd);

            (*mycpu()).proc = ptr::null_mut();
        }
    }

    #[test]
    fn fork_rolls_back_when_memory_runs_out() {
        let _g = kernel_test_lock();
        let mut arena = Arena::new(6);
        reset_kmem(&mut arena);
        reset_ptable();
        crate::fs::tests::reset_icache();

        let parent = allocproc();
        unsafe {
            (*parent).pgdir = setupkvm();
            (*parent).sz = allocuvm((*parent).pgdir, 0, PGSIZE);
            assert_eq!((*parent).sz, PGSIZE);
            (*parent).state = ProcState::Running;
            (*mycpu()).proc = parent;

            // two pages left; the clone needs a directory, a table and
            // a data page, so fork must fail and give the slot back
            assert_eq!(fork(), -1);
            let used = PTABLE
                .proc
                .iter()
                .filter(|q| q.state != ProcState::Unused)
                .count();
            assert_eq!(used, 1);

            (*mycpu()).proc = ptr::null_mut();
        }
    }
}
