// User address spaces over the two-level tables.
//
// There is one live first-level table, the 16 KiB kernel page
// directory built during boot. A process's page directory is a single
// 4 KiB page describing only the user quarter of the address space,
// [0, USERBOUND); switchuvm copies that page over the low entries of
// the kernel directory on every context switch. The trade is one page
// per address space instead of four, for a 4 KiB copy plus cache/TLB
// flush per switch.

use core::ptr;

use crate::arm::{flush_idcache, flush_tlb};
use crate::kalloc::KMEM;
use crate::memlayout::{p2v, v2p, K_PDX_BASE, USERBOUND};
use crate::mmu::{
    pdx, pg_round_down, pg_round_up, pte_addr, pte_flags, ptx, Pde, PdeFlags, Pte, MBYTE,
    N_UPD_ENTRIES, PGSIZE, UVM_PDE_ATTRS, UVM_PTE_ATTRS,
};
use crate::printf;
use crate::proc::Proc;
use crate::spinlock::{pop_off, push_off};

/// The kernel's page directory; every mapping above USERBOUND lives
/// here and only here. Set once during boot.
pub static mut KPGDIR: *mut Pde = ptr::null_mut();

/// Point KPGDIR at the directory the boot stages populated.
pub fn kpgdir_init() {
    unsafe {
        KPGDIR = p2v(K_PDX_BASE) as *mut Pde;
    }
}

/// Return the address of the PTE in pgdir that corresponds to virtual
/// address va. If alloc is true, create any required second-level
/// table, installing it with the given first-level attributes.
fn walkpgdir(pgdir: *mut Pde, va: usize, l1attr: usize, alloc: bool) -> *mut Pte {
    unsafe {
        let pde = pgdir.add(pdx(va));
        let pgtab: *mut Pte;
        if (*pde).0 != 0 {
            pgtab = p2v(pte_addr((*pde).0)) as *mut Pte;
        } else {
            if !alloc {
                return ptr::null_mut();
            }
            pgtab = KMEM.kalloc();
            if pgtab.is_null() {
                return ptr::null_mut();
            }
            // Make sure all those valid bits are zero.
            ptr::write_bytes(pgtab as *mut u8, 0, PGSIZE);
            // The first-level permissions are generous; the entries in
            // the second-level table restrict them further.
            *pde = Pde(v2p(pgtab as usize) | l1attr);
        }
        pgtab.add(ptx(va))
    }
}

/// Create descriptors for virtual addresses starting at va that refer
/// to physical addresses starting at pa. va and size might not be
/// page-aligned. With a section-type l1attr the strides are 1 MiB
/// entries written straight into the directory; otherwise 4 KiB small
/// pages through walkpgdir. Remapping an existing entry is fatal.
pub fn mappages(
    pgdir: *mut Pde,
    va: usize,
    size: usize,
    mut pa: usize,
    l1attr: usize,
    l2attr: usize,
) -> i32 {
    if size == 0 {
        panic!("mappages: size");
    }

    let mut a = pg_round_down(va);
    let last = pg_round_down(va + size - 1);

    if l1attr & PdeFlags::SECTION.bits() != 0 {
        while a <= last {
            unsafe {
                let pde = pgdir.add(pdx(a));
                if (*pde).0 != 0 {
                    panic!("mappages: remap");
                }
                *pde = Pde(pa | l1attr);
            }
            a += MBYTE;
            pa += MBYTE;
        }
    } else if l1attr & PdeFlags::TABLE.bits() != 0 {
        loop {
            let pte = walkpgdir(pgdir, a, l1attr, true);
            if pte.is_null() {
                return -1;
            }
            unsafe {
                if (*pte).0 != 0 {
                    printf!("va {:#x} pte {:#x}\n", a, (*pte).0);
                    panic!("mappages: remap");
                }
                *pte = Pte(pa | l2attr);
            }
            if a == last {
                break;
            }
            a += PGSIZE;
            pa += PGSIZE;
        }
    } else {
        panic!("mappages: bad first-level attribute");
    }
    0
}

/// Allocate an empty user page directory: one zeroed page. The kernel
/// half is not copied in; switchuvm merges the user entries into the
/// shared kernel directory instead. Returns null if out of memory.
pub fn setupkvm() -> *mut Pde {
    unsafe {
        let pgdir: *mut Pde = KMEM.kalloc();
        if pgdir.is_null() {
            return ptr::null_mut();
        }
        ptr::write_bytes(pgdir as *mut u8, 0, PGSIZE);
        pgdir
    }
}

/// Load the initcode into address 0 of pgdir, for the very first
/// process. sz must be less than a page.
pub fn inituvm(pgdir: *mut Pde, src: *const u8, sz: usize) {
    if sz >= PGSIZE {
        panic!("inituvm: more than a page");
    }
    unsafe {
        let mem: *mut u8 = KMEM.kalloc();
        if mem.is_null() {
            panic!("inituvm: out of memory");
        }
        ptr::write_bytes(mem, 0, PGSIZE);
        mappages(
            pgdir,
            0,
            PGSIZE,
            v2p(mem as usize),
            UVM_PDE_ATTRS,
            UVM_PTE_ATTRS,
        );
        ptr::copy(src, mem, sz);
    }
}

/// Allocate page tables and physical memory to grow a process from
/// oldsz to newsz, which need not be page aligned. Returns the new
/// size, or 0 on error with any partial growth undone.
pub fn allocuvm(pgdir: *mut Pde, oldsz: usize, newsz: usize) -> usize {
    if newsz >= USERBOUND {
        return 0;
    }
    if newsz < oldsz {
        return oldsz;
    }

    let mut a = pg_round_up(oldsz);
    while a < newsz {
        let mem: *mut u8 = unsafe { KMEM.kalloc() };
        if mem.is_null() {
            printf!("allocuvm out of memory\n");
            deallocuvm(pgdir, newsz, oldsz);
            return 0;
        }
        unsafe { ptr::write_bytes(mem, 0, PGSIZE) };
        if mappages(
            pgdir,
            a,
            PGSIZE,
            v2p(mem as usize),
            UVM_PDE_ATTRS,
            UVM_PTE_ATTRS,
        ) < 0
        {
            printf!("allocuvm out of memory (2)\n");
            unsafe { KMEM.kfree(mem) };
            deallocuvm(pgdir, newsz, oldsz);
            return 0;
        }
        a += PGSIZE;
    }
    newsz
}

/// Deallocate user pages to bring the process size from oldsz down to
/// newsz. oldsz and newsz need not be page-aligned, and oldsz can be
/// larger than the actual process size. Returns the new process size.
pub fn deallocuvm(pgdir: *mut Pde, oldsz: usize, newsz: usize) -> usize {
    if newsz >= oldsz {
        return oldsz;
    }

    let mut a = pg_round_up(newsz);
    while a < oldsz {
        let pte = walkpgdir(pgdir, a, UVM_PDE_ATTRS, false);
        if pte.is_null() {
            // no second-level table here: skip to the next one
            a = (a / MBYTE + 1) * MBYTE;
            continue;
        }
        unsafe {
            if (*pte).0 != 0 {
                let pa = pte_addr((*pte).0);
                if pa == 0 {
                    panic!("deallocuvm");
                }
                KMEM.kfree(p2v(pa) as *mut u8);
                *pte = Pte(0);
            }
        }
        a += PGSIZE;
    }
    newsz
}

/// Free a user page directory and all the physical memory in the user
/// part.
pub fn freevm(pgdir: *mut Pde) {
    if pgdir.is_null() {
        panic!("freevm: no pgdir");
    }
    deallocuvm(pgdir, USERBOUND, 0);
    for i in 0..N_UPD_ENTRIES {
        unsafe {
            let pde = *pgdir.add(i);
            if pde.0 != 0 {
                KMEM.kfree(p2v(pte_addr(pde.0)) as *mut u8);
            }
        }
    }
    unsafe { KMEM.kfree(pgdir) };
}

/// Given a parent's page directory, deep-copy the user memory for a
/// child. Every page is duplicated into fresh physical backing with
/// the source entry's attributes. Returns null on failure with the
/// partial copy freed.
pub fn copyuvm(pgdir: *mut Pde, sz: usize) -> *mut Pde {
    let d = setupkvm();
    if d.is_null() {
        return ptr::null_mut();
    }

    let mut i = 0;
    while i < sz {
        let pte = walkpgdir(pgdir, i, UVM_PDE_ATTRS, false);
        if pte.is_null() {
            panic!("copyuvm: pte should exist");
        }
        unsafe {
            if (*pte).0 == 0 {
                panic!("copyuvm: page not present");
            }
            let pa = pte_addr((*pte).0);
            let flags = pte_flags((*pte).0);
            let mem: *mut u8 = KMEM.kalloc();
            if mem.is_null() {
                freevm(d);
                return ptr::null_mut();
            }
            ptr::copy(p2v(pa) as *const u8, mem, PGSIZE);
            if mappages(d, i, PGSIZE, v2p(mem as usize), UVM_PDE_ATTRS, flags) < 0 {
                KMEM.kfree(mem);
                freevm(d);
                return ptr::null_mut();
            }
        }
        i += PGSIZE;
    }
    d
}

/// Map a user virtual address to a kernel pointer, or null when the
/// page is absent or not user-accessible.
pub fn uva2ka(pgdir: *mut Pde, uva: usize) -> *mut u8 {
    let pte = walkpgdir(pgdir, uva, UVM_PDE_ATTRS, false);
    if pte.is_null() {
        return ptr::null_mut();
    }
    unsafe {
        if (*pte).0 == 0 {
            return ptr::null_mut();
        }
        if (*pte).0 & crate::mmu::PTE_USER_ACCESS == 0 {
            return ptr::null_mut();
        }
        p2v(pte_addr((*pte).0)) as *mut u8
    }
}

/// Copy len bytes from src to user address va in pgdir, one 4 KiB
/// window at a time. Most useful when pgdir is not the live directory.
/// uva2ka ensures this only touches user-accessible pages. Returns -1
/// if any page in the range is absent; earlier windows stay written.
pub fn copyout(pgdir: *mut Pde, mut va: usize, src: *const u8, mut len: usize) -> i32 {
    let mut buf = src;
    while len > 0 {
        let va0 = pg_round_down(va);
        let pa0 = uva2ka(pgdir, va0);
        if pa0.is_null() {
            return -1;
        }
        let mut n = PGSIZE - (va - va0);
        if n > len {
            n = len;
        }
        unsafe {
            ptr::copy(buf, pa0.add(va - va0), n);
            buf = buf.add(n);
        }
        len -= n;
        va = va0 + PGSIZE;
    }
    0
}

/// Merge process p's user mappings into the live kernel directory and
/// flush stale translations. IRQs are held off for the duration so a
/// handler never runs on a half-switched address space.
pub fn switchuvm(p: *mut Proc) {
    push_off();
    unsafe {
        if (*p).pgdir.is_null() {
            panic!("switchuvm: no pgdir");
        }
        ptr::copy((*p).pgdir as *const u8, KPGDIR as *mut u8, PGSIZE);
        flush_idcache();
        flush_tlb();
    }
    pop_off();
}

/// Switch back to the kernel-only view. Nothing to do: the kernel
/// mappings live in the shared directory and the stale user entries
/// are harmless until the next switchuvm replaces them.
pub fn switchkvm() {}
