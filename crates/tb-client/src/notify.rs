//! Human-facing status notifications
//!
//! The session reports connection loss, reconnection and termination through
//! an optional callback so a UI can surface them without the engine knowing
//! anything about presentation.

use std::fmt;
use std::sync::Arc;

/// Severity of a status notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyLevel {
    /// Routine status change
    Info,
    /// Degraded but recovering
    Warning,
    /// Live updates have stopped
    Error,
}

impl fmt::Display for NotifyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyLevel::Info => write!(f, "info"),
            NotifyLevel::Warning => write!(f, "warning"),
            NotifyLevel::Error => write!(f, "error"),
        }
    }
}

/// Callback invoked with a level and a one-line message
pub type NotifyCallback = Arc<dyn Fn(NotifyLevel, &str) + Send + Sync>;

/// Optional callback holder
#[derive(Clone, Default)]
pub(crate) struct Notifier {
    callback: Option<NotifyCallback>,
}

impl Notifier {
    pub(crate) fn new(callback: Option<NotifyCallback>) -> Self {
        Self { callback }
    }

    pub(crate) fn emit(&self, level: NotifyLevel, message: &str) {
        if let Some(callback) = &self.callback {
            callback(level, message);
        }
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_emit_without_callback_is_noop() {
        Notifier::default().emit(NotifyLevel::Error, "ignored");
    }

    #[test]
    fn test_emit_forwards_level_and_message() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let notifier = Notifier::new(Some(Arc::new(move |level, msg: &str| {
            sink.lock().unwrap().push((level, msg.to_string()));
        })));

        notifier.emit(NotifyLevel::Warning, "connection lost");

        let seen = seen.lock().unwrap();
        assert_eq!(
            seen.as_slice(),
            &[(NotifyLevel::Warning, "connection lost".to_string())]
        );
    }
}
