// ARMv7 short-descriptor MMU tables.
//
// A virtual address has a three-part structure:
//
//  +--------12------+-------8--------+---------12----------+
//  | Page Directory |   Page Table   | Offset within Page  |
//  |      Index     |      Index     |                     |
//  +----------------+----------------+---------------------+
//   \--- pdx(va) --/ \--- ptx(va) --/
//
// The hardware first-level table has 4096 word-sized entries, each
// covering 1 MiB: either a section descriptor mapping the megabyte
// directly, or a pointer to a 256-entry second-level table of 4 KiB
// small pages. The kernel directory uses all 4096 entries (16 KiB,
// 16 KiB-aligned); a user directory is a single 4 KiB page whose 1024
// entries cover exactly [0, USERBOUND).
//
// Chapter 9 of the ARM Cortex-A Series Programmer's Guide is the
// reference for the descriptor formats.

use bitflags::bitflags;

#[cfg(target_arch = "arm")]
use crate::arm::{dsb_barrier, flush_dcache, flush_tlb};
#[cfg(target_arch = "arm")]
use crate::memlayout::{
    BOOT_PHYSIZE, HVECTORS, KERNBASE, K_PDX_BASE, K_PTX_BASE, MMIO_PA, MMIO_SIZE, MMIO_VA,
    PHYSTART,
};

pub const PGSIZE: usize = 4096;
pub const MBYTE: usize = 0x10_0000;
pub const CACHE_LINE_SIZE: usize = 32;

/// Entries in a hardware first-level table.
pub const N_PD_ENTRIES: usize = 4096;
/// Entries in a second-level table.
pub const N_PT_ENTRIES: usize = 256;
/// First-level entries in a one-page user directory.
pub const N_UPD_ENTRIES: usize = PGSIZE / 4;

pub const PDXSHIFT: usize = 20;
pub const PTXSHIFT: usize = 12;

/// A first-level (page-directory) entry. On the 32-bit target `usize`
/// is exactly the 4-byte hardware word.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Pde(pub usize);

/// A second-level (page-table) entry.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Pte(pub usize);

bitflags! {
    /// First-level descriptor attribute bits.
    #[derive(Copy, Clone, PartialEq, Eq, Debug)]
    pub struct PdeFlags: usize {
        /// Entry points to a second-level table.
        const TABLE = 1 << 0;
        /// Entry maps a 1 MiB section directly.
        const SECTION = 1 << 1;
        /// Section is write-buffered.
        const BUFFERED = 1 << 2;
        /// Section is cacheable.
        const CACHED = 1 << 3;
    }
}

bitflags! {
    /// Second-level (small page) descriptor attribute bits.
    #[derive(Copy, Clone, PartialEq, Eq, Debug)]
    pub struct PteFlags: usize {
        /// Execute-never.
        const XN = 1 << 0;
        /// 4 KiB small page.
        const SMALL = 1 << 1;
        const BUFFERED = 1 << 2;
        const CACHED = 1 << 3;
        /// Access-permission extension: with it set, no mode may write.
        const APX = 1 << 9;
        /// Page is coherent across cores.
        const SHAREABLE = 1 << 10;
        /// Page belongs to one ASID rather than all of them.
        const NG = 1 << 11;
    }
}

// Access-permission field values. The AP bits alone do not define
// permissions completely; APX tightens them further.
pub const AP_NOACCESS: usize = 0;
pub const AP_KRW: usize = 1; // privileged modes only
pub const AP_URO: usize = 2; // user read, kernel read/write
pub const AP_URW: usize = 3; // all modes read/write

/// AP field of a section descriptor (bits 11:10).
pub const fn pde_ap(ap: usize) -> usize {
    (ap & 3) << 10
}

/// AP fields of a small-page descriptor. The legacy format carries one
/// field per 1 KiB subpage (bits 5:4, 7:6, 9:8, 11:10); all four are
/// set alike.
pub const fn pte_ap(ap: usize) -> usize {
    (ap & 3) << 4 | (ap & 3) << 6 | (ap & 3) << 8 | (ap & 3) << 10
}

// All first-level entries use domain 0; the DACR is set to client for
// it at boot, so the AP bits are what get enforced.
pub const PDE_DOMAIN0: usize = 0;

/// Kernel RAM sections: privileged read/write, cached and buffered.
pub const KVM_SECTION_ATTRS: usize = PDE_DOMAIN0
    | pde_ap(AP_KRW)
    | PdeFlags::SECTION.bits()
    | PdeFlags::CACHED.bits()
    | PdeFlags::BUFFERED.bits();

/// Device sections: privileged read/write, neither cached nor buffered.
pub const MMIO_SECTION_ATTRS: usize = PDE_DOMAIN0 | pde_ap(AP_KRW) | PdeFlags::SECTION.bits();

/// A user directory entry pointing at a second-level table.
pub const UVM_PDE_ATTRS: usize = PDE_DOMAIN0 | PdeFlags::TABLE.bits();

/// A user page: all-mode read/write minus the stray APX bit, cached,
/// buffered, small.
pub const UVM_PTE_ATTRS: usize = (pte_ap(AP_URW) ^ PteFlags::APX.bits())
    | PteFlags::CACHED.bits()
    | PteFlags::BUFFERED.bits()
    | PteFlags::SMALL.bits();

/// The vector page: privileged-only, uncached small page.
pub const VEC_PTE_ATTRS: usize = pte_ap(AP_KRW) | PteFlags::SMALL.bits();

/// Mask selecting the user-readable AP bits; a PTE with none of them
/// set is inaccessible from user mode.
pub const PTE_USER_ACCESS: usize = pte_ap(AP_URO);

/// First-level index of a virtual address.
#[inline]
pub const fn pdx(va: usize) -> usize {
    (va >> PDXSHIFT) & 0xFFF
}

/// Second-level index of a virtual address.
#[inline]
pub const fn ptx(va: usize) -> usize {
    (va >> PTXSHIFT) & 0xFF
}

/// Physical address held in a small-page entry (or a table pointer in
/// a first-level entry; both keep 12 bits of flags).
#[inline]
pub const fn pte_addr(e: usize) -> usize {
    e & !0xFFF
}

/// Flag bits of a second-level entry.
#[inline]
pub const fn pte_flags(e: usize) -> usize {
    e & 0xFFF
}

#[inline]
pub const fn pg_round_up(sz: usize) -> usize {
    (sz + PGSIZE - 1) & !(PGSIZE - 1)
}

#[inline]
pub const fn pg_round_down(sz: usize) -> usize {
    sz & !(PGSIZE - 1)
}

/// Physical memory present on the board, per the firmware mailbox.
/// Written once during boot, before the second MMU stage.
pub static mut PM_SIZE: usize = 0;

/// Extend the boot page directory.
///
/// The boot assembly enters with only the first megabyte of RAM mapped
/// (at KERNBASE and, temporarily, at its own physical address).
/// Stage 1 runs before any driver: it fills in sections for the first
/// BOOT_PHYSIZE of RAM, the peripheral block, and the double-mapped
/// exception-vector page. The tables are written through the boot-time
/// identity map, so the raw physical bases are used directly.
#[cfg(target_arch = "arm")]
pub fn mmu_init_stage1() {
    let l1 = K_PDX_BASE as *mut Pde;
    let l2 = K_PTX_BASE as *mut Pte;

    unsafe {
        // map RAM at KERNBASE; the first megabyte is already there
        let mut va = KERNBASE + MBYTE;
        let mut pa = PHYSTART + MBYTE;
        while pa < PHYSTART + BOOT_PHYSIZE {
            l1.add(pdx(va)).write(Pde(pa | KVM_SECTION_ATTRS));
            va += MBYTE;
            pa += MBYTE;
        }

        // map the peripheral block
        let mut va = MMIO_VA;
        let mut pa = MMIO_PA;
        while pa < MMIO_PA + MMIO_SIZE {
            l1.add(pdx(va)).write(Pde(pa | MMIO_SECTION_ATTRS));
            va += MBYTE;
            pa += MBYTE;
        }

        // double-map the exception vectors at the top of virtual memory
        l1.add(pdx(HVECTORS))
            .write(Pde(K_PTX_BASE | PDE_DOMAIN0 | PdeFlags::TABLE.bits()));
        l2.add(ptx(HVECTORS)).write(Pte(PHYSTART | VEC_PTE_ATTRS));
    }
}

/// Map the RAM the mailbox reported beyond BOOT_PHYSIZE, then retire
/// the boot-time identity map of low memory and flush the stale
/// translations.
#[cfg(target_arch = "arm")]
pub fn mmu_init_stage2() {
    let l1 = K_PDX_BASE as *mut Pde;

    unsafe {
        let mut va = KERNBASE + BOOT_PHYSIZE;
        let mut pa = PHYSTART + BOOT_PHYSIZE;
        while pa < PHYSTART + PM_SIZE {
            l1.add(pdx(va)).write(Pde(pa | KVM_SECTION_ATTRS));
            va += MBYTE;
            pa += MBYTE;
        }

        // undo the identity map of the first megabyte
        l1.add(pdx(PHYSTART)).write(Pde(0));

        // write the changed entry back to RAM before invalidating
        let va1 = l1.add(pdx(PHYSTART)) as usize & !(CACHE_LINE_SIZE - 1);
        let va2 = (l1.add(pdx(PHYSTART)) as usize + core::mem::size_of::<Pde>())
            & !(CACHE_LINE_SIZE - 1);
        flush_dcache(va1, va2);

        flush_tlb();
        dsb_barrier();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memlayout::HVECTORS;

    #[test]
    fn index_extraction() {
        // the vector page sits in the last first-level slot
        assert_eq!(pdx(HVECTORS), 0xFFF);
        assert_eq!(ptx(HVECTORS), 0xF0);
        assert_eq!(pdx(0), 0);
        assert_eq!(pdx(MBYTE), 1);
        assert_eq!(ptx(PGSIZE), 1);
        assert_eq!(ptx(0x0012_3456), 0x23);
        // one-page user directories end exactly at USERBOUND
        assert_eq!(pdx(crate::memlayout::USERBOUND - 1), N_UPD_ENTRIES - 1);
    }

    #[test]
    fn rounding() {
        assert_eq!(pg_round_up(0), 0);
        assert_eq!(pg_round_up(1), PGSIZE);
        assert_eq!(pg_round_up(PGSIZE), PGSIZE);
        assert_eq!(pg_round_up(PGSIZE + 1), 2 * PGSIZE);
        assert_eq!(pg_round_down(PGSIZE - 1), 0);
        assert_eq!(pg_round_down(2 * PGSIZE + 123), 2 * PGSIZE);
    }

    #[test]
    fn descriptor_encodings() {
        // values straight out of the ARMv7 short-descriptor format
        assert_eq!(KVM_SECTION_ATTRS, 0x40E);
        assert_eq!(MMIO_SECTION_ATTRS, 0x402);
        assert_eq!(UVM_PDE_ATTRS, 0x1);
        assert_eq!(UVM_PTE_ATTRS, 0xDFE);
        assert_eq!(VEC_PTE_ATTRS, 0x552);
    }

    #[test]
    fn user_access_bits() {
        // user pages advertise user access, the vector page does not
        assert_ne!(UVM_PTE_ATTRS & PTE_USER_ACCESS, 0);
        assert_eq!(VEC_PTE_ATTRS & PTE_USER_ACCESS, 0);
    }

    #[test]
    fn addr_and_flags_split() {
        let e = 0x1234_5000 | UVM_PTE_ATTRS;
        assert_eq!(pte_addr(e), 0x1234_5000);
        assert_eq!(pte_flags(e), UVM_PTE_ATTRS);
    }
}
