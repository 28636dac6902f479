//! Message sink for human-readable notices raised by the preserver.

use tracing::info;

use crate::output;

/// Receives notices such as "installed content was replaced by a preserved path".
pub trait Notify {
    fn notice(&self, message: &str);
}

/// Prints notices to the console and mirrors them into the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl Notify for ConsoleNotifier {
    fn notice(&self, message: &str) {
        info!(notice = message, "Notice");
        output::print_warn(message);
    }
}

/// Only logs notices; for embedding where stdout belongs to someone else.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notify for LogNotifier {
    fn notice(&self, message: &str) {
        info!(notice = message, "Notice");
    }
}

/// Collects notices in memory.
#[cfg(any(test, feature = "test-helpers"))]
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: std::cell::RefCell<Vec<String>>,
}

#[cfg(any(test, feature = "test-helpers"))]
impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.borrow().clone()
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl Notify for RecordingNotifier {
    fn notice(&self, message: &str) {
        self.messages.borrow_mut().push(message.to_string());
    }
}
