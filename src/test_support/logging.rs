use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::logger::{build_message, LogLevel, Logger};

/// Records captured by [`capturing_logger`], regardless of level.
#[derive(Clone, Default)]
pub struct LogCapture {
    records: Arc<Mutex<Vec<(LogLevel, String)>>>,
}

impl LogCapture {
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn count(&self, level: LogLevel) -> usize {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|(recorded, _)| *recorded == level)
            .count()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.records
            .lock()
            .unwrap()
            .iter()
            .any(|(_, message)| message.contains(needle))
    }
}

/// Creates a uniquely named logger whose instance handler stores every record.
pub fn capturing_logger() -> (Logger, LogCapture) {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let logger = Logger::new(format!(
        "@ga-page-tracker/test-{}",
        COUNTER.fetch_add(1, Ordering::SeqCst)
    ));
    let capture = LogCapture::default();
    let records = Arc::clone(&capture.records);
    logger.set_log_handler(move |_, level, args| {
        records.lock().unwrap().push((level, build_message(args)));
    });
    (logger, capture)
}
