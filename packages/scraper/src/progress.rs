//! Progress reporting for a scrape session.
//!
//! The session only knows it has N reports to work through; how that is
//! rendered (a terminal bar, nothing at all) is up to the caller.

use std::sync::Arc;

/// Receives progress updates from a running session.
pub trait ProgressCallback: Send + Sync {
    /// Sets the number of reports the session will process.
    fn set_total(&self, total: u64);

    /// Advances progress by `delta` reports.
    fn inc(&self, delta: u64);

    /// Updates the message shown next to the progress indicator.
    fn set_message(&self, msg: String);

    /// Marks the session as finished.
    fn finish(&self, msg: String);
}

/// A [`ProgressCallback`] that ignores every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// Returns a shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
