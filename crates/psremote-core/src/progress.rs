//! Progress reporting for long-running commands.

/// Receives percentage progress while a command streams progress records.
///
/// Purely informational: nothing a handler does affects the invocation result.
/// Implement this trait to feed a progress indicator in your UI.
pub trait ProgressHandler: Send + Sync {
    /// Called with a percentage in `0..=100`.
    fn on_progress(&self, percent: u8);
}

impl<F> ProgressHandler for F
where
    F: Fn(u8) + Send + Sync,
{
    fn on_progress(&self, percent: u8) {
        self(percent);
    }
}

/// Handler that drops every progress report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressHandler for NoProgress {
    fn on_progress(&self, _percent: u8) {}
}

/// Handler that logs progress at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressHandler for TracingProgress {
    fn on_progress(&self, percent: u8) {
        tracing::debug!(percent, "Progress is {percent} percent complete");
    }
}

/// Clamp a raw percent-complete value (PowerShell reports -1 for "unknown").
#[must_use]
pub fn clamp_percent(raw: i64) -> Option<u8> {
    if raw < 0 {
        None
    } else {
        u8::try_from(raw.min(100)).ok()
    }
}
