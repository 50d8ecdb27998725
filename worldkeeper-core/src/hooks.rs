//! Collaborator interfaces exposed outward.
//!
//! The host application supplies these; the engines only ever see the traits.
//! Unexpected/internal errors are logged with full detail and surfaced to the
//! sink as a generic notice, never leaking internals across this boundary.

use std::fmt::Display;

/// Severity styling for sink messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Message/progress sink: plain messages, severity-styled messages, and
/// bounded percentage updates (0–100, already decimated by the caller).
pub trait MessageSink: Send + Sync {
    fn message(&self, text: &str);
    fn styled(&self, severity: Severity, text: &str);
    fn progress(&self, percent: u8);
}

/// Host save-enable toggle, flipped off only while the commit engine reads
/// the working tree.
pub trait SaveToggle: Send + Sync {
    fn set_save_enabled(&self, enabled: bool);
}

/// Explicit hook bundle passed into every engine invocation.
#[derive(Clone, Copy)]
pub struct HostHooks<'a> {
    pub sink: &'a dyn MessageSink,
    pub save: &'a dyn SaveToggle,
}

impl<'a> HostHooks<'a> {
    pub fn new(sink: &'a dyn MessageSink, save: &'a dyn SaveToggle) -> Self {
        Self { sink, save }
    }

    /// Log an internal error in full and hand the sink only a generic notice.
    pub fn report_internal(&self, operation: &str, error: &dyn Display) {
        tracing::error!("{operation} failed: {error}");
        self.sink.styled(
            Severity::Error,
            &format!("{operation} failed; see the server log for details"),
        );
    }
}

/// Sink that discards everything. Useful for headless callers and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl MessageSink for NullSink {
    fn message(&self, _text: &str) {}
    fn styled(&self, _severity: Severity, _text: &str) {}
    fn progress(&self, _percent: u8) {}
}

/// Save toggle that does nothing. For trees no host process is mutating.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSaveToggle;

impl SaveToggle for NullSaveToggle {
    fn set_save_enabled(&self, _enabled: bool) {}
}
