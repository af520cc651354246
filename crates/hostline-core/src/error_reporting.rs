//! Error-tracking sink
//!
//! Best-effort operations (teardown cleanups, "went live" tracking) never fail
//! the surrounding request. Their failures are handed to an [`ErrorReporter`]
//! so they stay visible to operators.

use std::fmt::Display;
use std::sync::Mutex;
use tracing::error;

pub trait ErrorReporter: Send + Sync {
    /// Record an error that was deliberately not propagated to the caller
    fn capture(&self, context: &str, error: &dyn Display);
}

/// Reports captured errors through `tracing` at error level
#[derive(Debug, Default, Clone)]
pub struct TracingErrorReporter;

impl ErrorReporter for TracingErrorReporter {
    fn capture(&self, context: &str, error: &dyn Display) {
        error!(context = context, "captured error: {}", error);
    }
}

/// Keeps captured errors in memory, used by tests to assert on swallowed failures
#[derive(Debug, Default)]
pub struct RecordingErrorReporter {
    captured: Mutex<Vec<(String, String)>>,
}

impl RecordingErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn captured(&self) -> Vec<(String, String)> {
        self.captured
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

impl ErrorReporter for RecordingErrorReporter {
    fn capture(&self, context: &str, error: &dyn Display) {
        if let Ok(mut entries) = self.captured.lock() {
            entries.push((context.to_string(), error.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_reporter_keeps_context() {
        let reporter = RecordingErrorReporter::new();
        reporter.capture("teardown.mail_cleanup", &"queue unavailable");

        let captured = reporter.captured();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].0, "teardown.mail_cleanup");
        assert_eq!(captured[0].1, "queue unavailable");
    }
}
