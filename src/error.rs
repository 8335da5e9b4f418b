//! Error types for avmux.
//!
//! Errors are split by concern:
//! - [`RecorderError`]: fatal pipeline errors (protocol violations, writer
//!   failures, misconfiguration)
//! - [`DeviceError`]: failures reported by an [`EncodeDevice`](crate::EncodeDevice)
//! - [`WriterError`]: failures reported by a [`ContainerWriter`](crate::ContainerWriter)
//!
//! Transient conditions (no input slot free, no output ready) are not errors;
//! they are poll results handled with bounded retry inside the track workers.

use std::path::PathBuf;

/// Fatal errors that terminate a recording.
///
/// A `RecorderError` raised inside a track worker is recorded on the pipeline
/// controller and delivered through the terminal
/// [`EncodingEnded`](crate::RecorderEvent::EncodingEnded) notification; it is
/// never thrown across task boundaries.
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    /// The builder was started without a video track.
    #[error("no video track configured - a recorder requires a video encode device")]
    NoVideoTrack,

    /// The builder was started without a container writer.
    #[error("no container writer configured")]
    NoWriter,

    /// A track declared its output format after the container writer started.
    ///
    /// All tracks must declare their format before the writer starts; the
    /// start barrier guarantees this for well-behaved devices.
    #[error("track format declared after the container writer started")]
    FormatAfterWriterStart,

    /// The encode device reported its output format a second time.
    ///
    /// The format must change exactly once, before any payload is drained.
    #[error("track '{track}': encode device changed its output format twice")]
    FormatChangedTwice {
        /// Name of the offending track.
        track: &'static str,
    },

    /// A sample write was attempted before the container writer started.
    #[error("sample write attempted before the container writer started")]
    WriteBeforeStart,

    /// The encode device failed.
    #[error("track '{track}': encode device error: {source}")]
    Device {
        /// Name of the track that owns the device.
        track: &'static str,
        /// The underlying device error.
        #[source]
        source: DeviceError,
    },

    /// The container writer failed.
    #[error("container writer error: {0}")]
    Writer(#[from] WriterError),

    /// The session recorded a fatal error on one of its tracks.
    ///
    /// Reported by [`Recorder::stop`](crate::Recorder::stop); the shared
    /// error is the first one any track hit.
    #[error("recording session failed: {0}")]
    Session(std::sync::Arc<RecorderError>),
}

/// Errors reported by an [`EncodeDevice`](crate::EncodeDevice) implementation.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// An operation was attempted before `configure()`.
    #[error("device not configured")]
    NotConfigured,

    /// An operation was attempted before `start()`.
    #[error("device not started")]
    NotStarted,

    /// A buffer slot index was invalid or not currently owned by the caller.
    #[error("invalid buffer slot: {slot}")]
    InvalidSlot {
        /// The offending slot index.
        slot: usize,
    },

    /// The device does not implement an optional capability.
    ///
    /// Audio devices typically do not implement the video-only operations
    /// (`feed_frame`, `signal_end_of_input`, `request_key_frame`).
    #[error("unsupported device operation: {op}")]
    Unsupported {
        /// Name of the unsupported operation.
        op: &'static str,
    },

    /// Any other device failure.
    #[error("device failure: {reason}")]
    Failed {
        /// Description of what went wrong.
        reason: String,
    },
}

impl DeviceError {
    /// Creates a generic device failure with the given reason.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

/// Errors reported by a [`ContainerWriter`](crate::ContainerWriter) implementation.
#[derive(Debug, thiserror::Error)]
pub enum WriterError {
    /// `start()` was called twice, or `add_track()` after `start()`.
    #[error("container writer already started")]
    AlreadyStarted,

    /// A write or stop was attempted before `start()`.
    #[error("container writer not started")]
    NotStarted,

    /// A sample referenced a track index that was never declared.
    #[error("unknown track index: {index}")]
    InvalidTrack {
        /// The offending track index.
        index: usize,
    },

    /// File I/O error from a file-backed writer.
    #[error("file error: {path}: {source}")]
    Io {
        /// Path to the container file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Any other writer failure.
    #[error("writer failure: {reason}")]
    Failed {
        /// Description of what went wrong.
        reason: String,
    },
}

impl WriterError {
    /// Creates a generic writer failure with the given reason.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    /// Creates an I/O error for the given container path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_error_display() {
        let err = RecorderError::FormatChangedTwice { track: "video" };
        assert!(err.to_string().contains("video"));
        assert!(err.to_string().contains("twice"));
    }

    #[test]
    fn test_device_error_wrapping() {
        let err = RecorderError::Device {
            track: "audio",
            source: DeviceError::NotConfigured,
        };
        assert!(err.to_string().contains("audio"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_writer_error_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = WriterError::io("/tmp/out.avmx", io_err);
        assert!(err.to_string().contains("/tmp/out.avmx"));
    }

    #[test]
    fn test_device_error_failed() {
        let err = DeviceError::failed("codec crashed");
        assert_eq!(err.to_string(), "device failure: codec crashed");
    }
}
