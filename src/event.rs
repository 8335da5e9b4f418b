//! Lifecycle notifications for a recording.
//!
//! Events mark the three externally observable phases of a recording. They
//! are emitted by the pipeline controller, never from the capture callbacks,
//! and each fires at most once per recording.

use std::sync::Arc;

use crate::RecorderError;

/// Lifecycle events emitted during a recording.
///
/// All three events fire exactly once per recording, in order:
/// `EncodingStarted` (may be skipped if the pipeline fails before every track
/// declares its format), then `EncodingStopped`, then `EncodingEnded`.
///
/// # Example
///
/// ```
/// use avmux::RecorderEvent;
///
/// fn handle_event(event: RecorderEvent) {
///     match event {
///         RecorderEvent::EncodingStarted => {
///             println!("container writer started");
///         }
///         RecorderEvent::EncodingStopped => {
///             println!("input no longer accepted, draining");
///         }
///         RecorderEvent::EncodingEnded { error: None } => {
///             println!("container finalized");
///         }
///         RecorderEvent::EncodingEnded { error: Some(e) } => {
///             eprintln!("recording failed: {e}");
///         }
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub enum RecorderEvent {
    /// Every track declared its output format and the container writer
    /// started. Samples are now being written.
    EncodingStarted,

    /// Stop was requested. Capture input is no longer accepted; the tracks
    /// are draining their remaining buffered data.
    EncodingStopped,

    /// The recording ended: every track stopped and the container writer was
    /// finalized (or finalization was attempted).
    ///
    /// This is the single terminal notification of a recording. Partial
    /// output is never silently discarded - finalization is attempted even
    /// after an upstream track error, and the first error encountered
    /// anywhere in the pipeline is carried here.
    EncodingEnded {
        /// `None` on success, otherwise the first error encountered.
        error: Option<Arc<RecorderError>>,
    },
}

/// Callback type for receiving lifecycle events.
///
/// Register an event callback via
/// [`RecorderBuilder::on_event()`](crate::RecorderBuilder::on_event). The
/// callback may be invoked from any track worker; keep it cheap and
/// non-blocking.
pub type EventCallback = Arc<dyn Fn(RecorderEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
///
/// Convenience for creating event callbacks without manually wrapping in
/// `Arc`.
///
/// # Example
///
/// ```
/// use avmux::{event_callback, RecorderEvent};
///
/// let callback = event_callback(|event| {
///     println!("got event: {event:?}");
/// });
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(RecorderEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_debug() {
        let event = RecorderEvent::EncodingEnded { error: None };
        let debug = format!("{event:?}");
        assert!(debug.contains("EncodingEnded"));
    }

    #[test]
    fn test_event_clone_carries_error() {
        let event = RecorderEvent::EncodingEnded {
            error: Some(Arc::new(RecorderError::WriteBeforeStart)),
        };
        let cloned = event.clone();
        if let RecorderEvent::EncodingEnded { error: Some(e) } = cloned {
            assert!(matches!(*e, RecorderError::WriteBeforeStart));
        } else {
            panic!("expected EncodingEnded with error");
        }
    }

    #[test]
    fn test_event_callback_helper() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let called = Arc::new(AtomicBool::new(false));
        let called_clone = called.clone();

        let callback = event_callback(move |_| {
            called_clone.store(true, Ordering::SeqCst);
        });

        callback(RecorderEvent::EncodingStarted);
        assert!(called.load(Ordering::SeqCst));
    }
}
