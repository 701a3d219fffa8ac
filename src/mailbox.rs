// The VideoCore property mailbox. The firmware owns the hardware
// configuration; the kernel asks it questions through a shared buffer,
// most importantly "how much RAM is there?".
//
// See https://github.com/raspberrypi/firmware/wiki/Mailbox-property-interface
// for the protocol and more tags.

use core::ptr;

use crate::arm::{flush_dcache_all, inw, outw};
use crate::kalloc::KMEM;
use crate::memlayout::{v2p, MAILBOX_BASE};

const MBOX_READ: usize = 0x00;
const MBOX_STATUS: usize = 0x18;
const MBOX_WRITE: usize = 0x20;

const STATUS_FULL: u32 = 1 << 31;
const STATUS_EMPTY: u32 = 1 << 30;

/// ARM-to-VC property channel.
const CHANNEL_PROPERTY: u32 = 8;

// Word positions in the request buffer.
const POS_OVERALL_LENGTH: usize = 0;
const POS_RV: usize = 1;
const POS_TAG: usize = 2;

// Word positions within a tag.
const POS_TAG_ID: usize = 0;
const POS_TAG_BUFLEN: usize = 1;
const POS_TAG_DATALEN: usize = 2;
const POS_TAG_DATA: usize = 3;

const MB_HEADER_LENGTH: usize = 2;
const TAG_HEADER_LENGTH: usize = 3;

const MPI_REQUEST: u32 = 0;
const MPI_RESPONSE_OK: u32 = 0x8000_0000;

const TAG_GET_ARM_MEMORY: u32 = 0x0001_0005;

static mut MAIL_BUFFER: *mut u32 = ptr::null_mut();

/// Grab a page for mailbox exchanges. The interface wants 16-byte
/// alignment; a page is more than enough.
pub fn mailboxinit() {
    unsafe {
        MAIL_BUFFER = KMEM.kalloc();
        if MAIL_BUFFER.is_null() {
            panic!("mailboxinit");
        }
    }
}

/// Lay out a single-tag property request in mbuf.
fn create_request(mbuf: *mut u32, tag: u32, buflen: usize, len: usize, data: &[u32]) {
    unsafe {
        let tag_info = mbuf.add(POS_TAG);
        tag_info.add(POS_TAG_ID).write_volatile(tag);
        tag_info.add(POS_TAG_BUFLEN).write_volatile(buflen as u32);
        tag_info
            .add(POS_TAG_DATALEN)
            .write_volatile(len as u32 & 0x7FFF_FFFF);

        let nw = buflen >> 2;
        for i in 0..nw {
            let w = data.get(i).copied().unwrap_or(0);
            tag_info.add(POS_TAG_DATA + i).write_volatile(w);
        }
        // end-of-tags sentinel
        tag_info.add(POS_TAG_DATA + nw).write_volatile(0);

        let total_len = (MB_HEADER_LENGTH + TAG_HEADER_LENGTH) * 4 + buflen + 4;
        mbuf.add(POS_OVERALL_LENGTH)
            .write_volatile(total_len as u32);
        mbuf.add(POS_RV).write_volatile(MPI_REQUEST);
    }
}

fn readmailbox(channel: u32) -> u32 {
    loop {
        while inw(MAILBOX_BASE + MBOX_STATUS) & STATUS_EMPTY != 0 {}
        let x = inw(MAILBOX_BASE + MBOX_READ);
        if x & 0xF == channel & 0xF {
            return x & !0xF;
        }
    }
}

fn writemailbox(addr: *const u32, channel: u32) {
    // the VC sees RAM through the uncached bus alias
    let a = v2p(addr as usize) as u32 + 0xC000_0000;
    let y = (a & !0xF) | (channel & 0xF);

    flush_dcache_all();

    while inw(MAILBOX_BASE + MBOX_STATUS) & STATUS_FULL != 0 {}
    outw(MAILBOX_BASE + MBOX_WRITE, y);
}

/// Ask the firmware how much RAM the ARM owns, in bytes.
pub fn get_pm_size() -> usize {
    unsafe {
        let mbuf = MAIL_BUFFER;
        create_request(mbuf, TAG_GET_ARM_MEMORY, 8, 0, &[]);
        writemailbox(mbuf, CHANNEL_PROPERTY);
        readmailbox(CHANNEL_PROPERTY);
        if mbuf.add(POS_RV).read_volatile() != MPI_RESPONSE_OK {
            log::warn!("mailbox: bad response for tag {:#x}", TAG_GET_ARM_MEMORY);
        }
        // the response data is (base, size)
        mbuf.add(MB_HEADER_LENGTH + TAG_HEADER_LENGTH + 1)
            .read_volatile() as usize
    }
}
