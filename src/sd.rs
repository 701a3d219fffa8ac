// Block-device seam. The buffer cache calls sdrw with a locked buffer
// to fill or flush; everything below that line — the EMMC controller,
// command sequencing, card init — belongs to the external block
// driver and is not part of this kernel core.

use log::debug;

use crate::buf::Buf;
use crate::spinlock::Spinlock;

static mut SD_LOCK: Spinlock = Spinlock::new("sd");

pub fn sdinit() {
    unsafe {
        // nothing to program yet; the lock serializes whichever driver
        // gets plugged in behind sdrw
        SD_LOCK.acquire();
        SD_LOCK.release();
    }
    debug!("sd: block-device seam ready");
}

/// Transfer one block between b.data and the medium; write when
/// `to_disk` is set. With no controller driver present there is
/// nothing to transfer against, and reaching this path means the
/// caller's configuration is wrong.
pub fn sdrw(b: *mut Buf, to_disk: bool) {
    let _ = (b, to_disk);
    panic!("sdrw: no block driver");
}
