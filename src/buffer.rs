//! Pooled buffer types flowing through the pipeline.
//!
//! [`InputBuffer`] carries raw capture data from the submission side into a
//! track worker; [`OutputBuffer`] carries encoded payloads from a track worker
//! to the container writer. Both are recycled through [`Pool`](crate::Pool)
//! rather than allocated per batch.

use crate::pool::Recycle;

/// Flags attached to one encoded sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleFlags {
    /// The sample is a key frame (sync sample).
    pub key_frame: bool,
    /// The sample carries codec configuration data, not media.
    pub codec_config: bool,
    /// The sample marks the end of the track's stream.
    pub end_of_stream: bool,
}

/// Metadata for one encoded sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleInfo {
    /// Payload size in bytes.
    pub size: usize,
    /// Presentation timestamp in microseconds.
    pub timestamp_us: i64,
    /// Sample flags.
    pub flags: SampleFlags,
}

impl SampleInfo {
    /// An empty end-of-stream marker at the given timestamp.
    pub fn end_of_stream(timestamp_us: i64) -> Self {
        Self {
            size: 0,
            timestamp_us,
            flags: SampleFlags {
                end_of_stream: true,
                ..SampleFlags::default()
            },
        }
    }
}

/// A batch of raw input data queued for a track worker.
///
/// `data` retains its capacity across recycles; only the first `len` bytes
/// are meaningful.
#[derive(Debug)]
pub struct InputBuffer {
    /// Raw payload storage.
    pub data: Vec<u8>,
    /// Number of meaningful bytes in `data`.
    pub len: usize,
    /// Corrected presentation timestamp in microseconds.
    pub timestamp_us: i64,
    /// This batch is the last one for the track.
    pub end_of_stream: bool,
}

impl InputBuffer {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            len: 0,
            timestamp_us: 0,
            end_of_stream: false,
        }
    }

    /// Copies `payload` into the buffer and sets its metadata.
    pub(crate) fn fill(&mut self, payload: &[u8], timestamp_us: i64) {
        self.data.clear();
        self.data.extend_from_slice(payload);
        self.len = payload.len();
        self.timestamp_us = timestamp_us;
        self.end_of_stream = false;
    }

    /// Turns the buffer into an empty end-of-stream marker.
    pub(crate) fn mark_end_of_stream(&mut self, timestamp_us: i64) {
        self.data.clear();
        self.len = 0;
        self.timestamp_us = timestamp_us;
        self.end_of_stream = true;
    }
}

impl Recycle for InputBuffer {
    fn recycle(&mut self) {
        self.data.clear();
        self.len = 0;
        self.timestamp_us = 0;
        self.end_of_stream = false;
    }
}

/// An encoded payload on its way to the container writer.
#[derive(Debug)]
pub struct OutputBuffer {
    /// Sample metadata (size, timestamp, flags).
    pub info: SampleInfo,
    /// Container track index the payload belongs to.
    pub track_index: usize,
    /// Encoded payload bytes.
    pub data: Vec<u8>,
}

impl OutputBuffer {
    pub(crate) fn empty() -> Self {
        Self {
            info: SampleInfo {
                size: 0,
                timestamp_us: 0,
                flags: SampleFlags::default(),
            },
            track_index: 0,
            data: Vec::new(),
        }
    }
}

impl Recycle for OutputBuffer {
    fn recycle(&mut self) {
        self.data.clear();
        self.info = SampleInfo {
            size: 0,
            timestamp_us: 0,
            flags: SampleFlags::default(),
        };
        self.track_index = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_buffer_fill_and_recycle() {
        let mut buffer = InputBuffer::with_capacity(16);
        buffer.fill(&[1, 2, 3], 42);
        assert_eq!(buffer.len, 3);
        assert_eq!(buffer.timestamp_us, 42);
        assert!(!buffer.end_of_stream);

        buffer.recycle();
        assert_eq!(buffer.len, 0);
        assert_eq!(buffer.timestamp_us, 0);
        assert!(buffer.data.is_empty());
    }

    #[test]
    fn test_input_buffer_end_of_stream_marker() {
        let mut buffer = InputBuffer::with_capacity(16);
        buffer.fill(&[1, 2, 3], 42);
        buffer.mark_end_of_stream(99);
        assert!(buffer.end_of_stream);
        assert_eq!(buffer.len, 0);
        assert_eq!(buffer.timestamp_us, 99);
    }

    #[test]
    fn test_eos_sample_info() {
        let info = SampleInfo::end_of_stream(1234);
        assert_eq!(info.size, 0);
        assert_eq!(info.timestamp_us, 1234);
        assert!(info.flags.end_of_stream);
        assert!(!info.flags.key_frame);
    }

    #[test]
    fn test_output_buffer_recycle() {
        let mut buffer = OutputBuffer::empty();
        buffer.data.extend_from_slice(&[9; 8]);
        buffer.track_index = 1;
        buffer.info.timestamp_us = 777;
        buffer.recycle();
        assert!(buffer.data.is_empty());
        assert_eq!(buffer.track_index, 0);
        assert_eq!(buffer.info.timestamp_us, 0);
    }
}
