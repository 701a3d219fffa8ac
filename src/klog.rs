// Console backend for the `log` facade. Boot progress and
// abnormal-path diagnostics go through info!/warn!/debug!; anything at
// or below MAX_LEVEL reaches the UART via printf, which serializes
// concurrent writers.

use log::{LevelFilter, Metadata, Record};

use crate::printf;

const MAX_LEVEL: LevelFilter = LevelFilter::Info;

struct KLog;

static KLOG: KLog = KLog;

impl log::Log for KLog {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= MAX_LEVEL
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            printf!("[{}] {}\n", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

/// Install the console logger. Safe to call once, early in boot;
/// a second call is a no-op.
pub fn init() {
    if log::set_logger(&KLOG).is_ok() {
        log::set_max_level(MAX_LEVEL);
    }
}
