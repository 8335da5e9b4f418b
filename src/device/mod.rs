//! Encode device abstraction.
//!
//! An [`EncodeDevice`] is the slot-based hardware (or software) codec a track
//! worker drives: raw data goes in through numbered input slots, encoded
//! samples come back out through numbered output slots. All calls happen on
//! the owning track's worker task; the trait is `Send` but never shared.
//!
//! [`MockEncodeDevice`](mock::MockEncodeDevice) provides a deterministic
//! in-memory device for tests and demos.

pub mod mock;

use std::time::Duration;

use crate::buffer::SampleInfo;
use crate::config::TrackFormat;
use crate::error::DeviceError;

/// A raw video frame handed to the video track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoFrame {
    /// Frame width in pixels, before rotation.
    pub width: u32,
    /// Frame height in pixels, before rotation.
    pub height: u32,
    /// Clockwise rotation in degrees (0, 90, 180 or 270).
    pub rotation: u32,
    /// Capture timestamp in microseconds.
    pub timestamp_us: i64,
}

impl VideoFrame {
    /// Width after applying the rotation.
    pub fn rotated_width(&self) -> u32 {
        match self.rotation % 360 {
            90 | 270 => self.height,
            _ => self.width,
        }
    }

    /// Height after applying the rotation.
    pub fn rotated_height(&self) -> u32 {
        match self.rotation % 360 {
            90 | 270 => self.width,
            _ => self.height,
        }
    }
}

/// Result of polling a device for a free input slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputPoll {
    /// A slot is free and ready to be filled.
    Slot(usize),
    /// No slot freed up within the timeout.
    TryAgain,
}

/// Result of polling a device for encoded output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputPoll {
    /// An encoded sample is ready in the given output slot.
    Sample {
        /// Output slot holding the payload.
        slot: usize,
        /// Sample metadata.
        info: SampleInfo,
    },
    /// The device determined its actual output format. Reported exactly once,
    /// before the first sample.
    FormatChanged,
    /// Nothing became ready within the timeout.
    TryAgain,
}

/// A slot-based media encoder.
///
/// The lifecycle is `configure` then `start`, a run of input/output slot
/// traffic, then `stop`. Video devices additionally accept whole frames
/// through [`feed_frame`](Self::feed_frame) instead of input slots; the
/// frame-based methods default to [`DeviceError::Unsupported`] so audio
/// devices need not implement them.
pub trait EncodeDevice: Send {
    /// Configures the device for the given track format.
    fn configure(&mut self, format: &TrackFormat) -> Result<(), DeviceError>;

    /// Starts the device. Must be configured first.
    fn start(&mut self) -> Result<(), DeviceError>;

    /// Polls for a free input slot, waiting up to `timeout`.
    fn dequeue_input(&mut self, timeout: Duration) -> Result<InputPoll, DeviceError>;

    /// Borrows the writable storage behind an input slot.
    fn input_buffer(&mut self, slot: usize) -> Result<&mut [u8], DeviceError>;

    /// Submits `len` bytes in `slot` with the given timestamp.
    fn queue_input(
        &mut self,
        slot: usize,
        len: usize,
        timestamp_us: i64,
        end_of_stream: bool,
    ) -> Result<(), DeviceError>;

    /// Polls for encoded output, waiting up to `timeout`.
    fn dequeue_output(&mut self, timeout: Duration) -> Result<OutputPoll, DeviceError>;

    /// Borrows the encoded payload behind an output slot.
    fn output_buffer(&mut self, slot: usize) -> Result<&[u8], DeviceError>;

    /// Returns an output slot to the device.
    fn release_output(&mut self, slot: usize) -> Result<(), DeviceError>;

    /// The device's actual output format. Valid after
    /// [`OutputPoll::FormatChanged`] was observed.
    fn output_format(&self) -> Result<TrackFormat, DeviceError>;

    /// Stops the device and releases its codec resources.
    fn stop(&mut self) -> Result<(), DeviceError>;

    /// Feeds a whole raw frame (video devices only).
    fn feed_frame(&mut self, _frame: &VideoFrame) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported { op: "feed_frame" })
    }

    /// Signals that no more frames will arrive (video devices only).
    fn signal_end_of_input(&mut self) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported {
            op: "signal_end_of_input",
        })
    }

    /// Asks the device to produce a key frame as soon as possible
    /// (video devices only).
    fn request_key_frame(&mut self) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported {
            op: "request_key_frame",
        })
    }
}
