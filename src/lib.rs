//! # avmux
//!
//! Multi-track audio/video encode-and-mux pipeline with pluggable codec and
//! container backends.
//!
//! `avmux` drives one slot-based [`EncodeDevice`] per track from a dedicated
//! worker task and multiplexes the encoded samples into a single
//! [`ContainerWriter`], coordinating the tracks so the container starts only
//! when every track has declared its format and finalizes only when every
//! track has fully stopped.
//!
//! # Quick start
//!
//! ```no_run
//! use avmux::{
//!     AudioConfig, MockContainerWriter, MockEncodeDevice, Recorder, RecorderEvent,
//!     VideoConfig, VideoFrame, event_callback,
//! };
//!
//! # async fn demo() -> Result<(), avmux::RecorderError> {
//! let (video_device, _) = MockEncodeDevice::new();
//! let (audio_device, _) = MockEncodeDevice::new();
//! let (writer, _) = MockContainerWriter::new();
//!
//! let mut recorder = Recorder::builder()
//!     .video(VideoConfig::default(), Box::new(video_device))
//!     .audio(AudioConfig::default(), Box::new(audio_device))
//!     .writer(Box::new(writer))
//!     .on_event(event_callback(|event| {
//!         if let RecorderEvent::EncodingEnded { error } = event {
//!             println!("session over: {error:?}");
//!         }
//!     }))
//!     .start()
//!     .await?;
//!
//! recorder.submit_frame(VideoFrame {
//!     width: 1280,
//!     height: 720,
//!     rotation: 0,
//!     timestamp_us: 1_000,
//! });
//! recorder.submit_samples(&[0u8; 1920], 48_000, 2);
//!
//! recorder.stop().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! ```text
//! frames ──▶ VideoTrack ──▶ video worker ──▶ EncodeDevice ─┐
//!                                                          ├─▶ controller ─▶ ContainerWriter
//! PCM ─────▶ AudioTrack ──▶ audio worker ──▶ EncodeDevice ─┘
//! ```
//!
//! Capture sides hand input to cheap clonable track handles from any thread.
//! Each worker owns its device outright; nothing else ever touches it. The
//! controller serializes writer access and drives the start and stop
//! barriers, emitting [`RecorderEvent`]s as the session moves through its
//! lifecycle.
//!
//! The [`MockEncodeDevice`] and [`MockContainerWriter`] pairs make the whole
//! pipeline testable without codec hardware.

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

mod buffer;
mod config;
mod controller;
mod device;
mod encoder;
mod error;
mod event;
mod pool;
mod recorder;
mod timestamp;
mod writer;

pub use buffer::{InputBuffer, OutputBuffer, SampleFlags, SampleInfo};
pub use config::{AudioConfig, TrackFormat, VideoConfig};
pub use device::mock::{MockDeviceHandle, MockEncodeDevice};
pub use device::{EncodeDevice, InputPoll, OutputPoll, VideoFrame};
pub use encoder::EncoderState;
pub use error::{DeviceError, RecorderError, WriterError};
pub use event::{event_callback, EventCallback, RecorderEvent};
pub use pool::{Pool, Recycle};
pub use recorder::{Recorder, RecorderBuilder, RecorderState};
pub use timestamp::AudioTimestamp;
pub use writer::{
    ContainerWriter, FileContainerWriter, MockContainerWriter, MockWriterHandle, WrittenSample,
};
