//! Track configuration and format types.

/// Configuration for the video track encoder.
///
/// Frame dimensions are deliberately absent: the encode device is configured
/// lazily from the first submitted frame, using its rotation-adjusted size.
///
/// # Example
///
/// ```
/// use avmux::VideoConfig;
///
/// let config = VideoConfig {
///     bit_rate: 4_000_000,
///     ..Default::default()
/// };
/// assert_eq!(config.frame_rate, 30);
/// ```
#[derive(Debug, Clone)]
pub struct VideoConfig {
    /// MIME type requested from the encode device.
    ///
    /// Default: `video/avc` (H.264).
    pub mime: String,

    /// Target bit rate in bits per second.
    ///
    /// Default: 6 Mbit/s.
    pub bit_rate: u32,

    /// Nominal frame rate declared to the encode device.
    ///
    /// Default: 30 fps.
    pub frame_rate: u32,

    /// Key frame interval in seconds.
    ///
    /// Default: 5 seconds.
    pub iframe_interval_secs: u32,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            mime: "video/avc".to_string(),
            bit_rate: 6_000_000,
            frame_rate: 30,
            iframe_interval_secs: 5,
        }
    }
}

impl VideoConfig {
    /// Builds the device configuration format for the given frame size.
    pub(crate) fn to_format(&self, width: u32, height: u32) -> TrackFormat {
        TrackFormat::Video {
            mime: self.mime.clone(),
            width,
            height,
            frame_rate: self.frame_rate,
            bit_rate: self.bit_rate,
        }
    }
}

/// Configuration for the audio track encoder.
///
/// Sample rate and channel count are deliberately absent: they are only known
/// when the first sample batch arrives, and the encode device is configured
/// lazily at that point.
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// MIME type requested from the encode device.
    ///
    /// Default: `audio/mp4a-latm` (AAC).
    pub mime: String,

    /// Target bit rate in bits per second.
    ///
    /// Default: 64 kbit/s.
    pub bit_rate: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            mime: "audio/mp4a-latm".to_string(),
            bit_rate: 64 * 1024,
        }
    }
}

impl AudioConfig {
    /// Builds the device configuration format for the given capture format.
    pub(crate) fn to_format(&self, sample_rate: u32, channels: u16) -> TrackFormat {
        TrackFormat::Audio {
            mime: self.mime.clone(),
            sample_rate,
            channels,
            bit_rate: self.bit_rate,
        }
    }
}

/// Format of one container track, as declared to the encode device and the
/// container writer.
///
/// The encode device receives a `TrackFormat` via
/// [`EncodeDevice::configure`](crate::EncodeDevice::configure) and reports its
/// (possibly adjusted) output format back via
/// [`EncodeDevice::output_format`](crate::EncodeDevice::output_format); that
/// reported format is what gets registered with the container writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackFormat {
    /// A video track.
    Video {
        /// MIME type, e.g. `video/avc`.
        mime: String,
        /// Frame width in pixels (rotation-adjusted).
        width: u32,
        /// Frame height in pixels (rotation-adjusted).
        height: u32,
        /// Nominal frame rate.
        frame_rate: u32,
        /// Bit rate in bits per second.
        bit_rate: u32,
    },
    /// An audio track.
    Audio {
        /// MIME type, e.g. `audio/mp4a-latm`.
        mime: String,
        /// Sample rate in Hz.
        sample_rate: u32,
        /// Channel count.
        channels: u16,
        /// Bit rate in bits per second.
        bit_rate: u32,
    },
}

impl TrackFormat {
    /// Returns `true` for video formats.
    pub fn is_video(&self) -> bool {
        matches!(self, Self::Video { .. })
    }

    /// Returns the MIME type of the format.
    pub fn mime(&self) -> &str {
        match self {
            Self::Video { mime, .. } | Self::Audio { mime, .. } => mime,
        }
    }
}
