//! Container writer abstraction.
//!
//! A [`ContainerWriter`] receives the encoded samples of every track and
//! multiplexes them into some container. Tracks must all be added before
//! [`start`](ContainerWriter::start); the pipeline controller enforces that
//! ordering and serializes every call, so implementations never see
//! concurrent access.

mod file;
mod mock;

pub use file::FileContainerWriter;
pub use mock::{MockContainerWriter, MockWriterHandle, WrittenSample};

use crate::buffer::SampleInfo;
use crate::config::TrackFormat;
use crate::error::WriterError;

/// A multi-track container muxer.
pub trait ContainerWriter: Send {
    /// Registers a track and returns its index. Fails once the writer has
    /// started.
    fn add_track(&mut self, format: &TrackFormat) -> Result<usize, WriterError>;

    /// Starts the container. All tracks must be registered beforehand.
    fn start(&mut self) -> Result<(), WriterError>;

    /// Writes one encoded sample to the given track.
    fn write_sample(
        &mut self,
        track_index: usize,
        data: &[u8],
        info: &SampleInfo,
    ) -> Result<(), WriterError>;

    /// Finalizes the container. No further writes are accepted.
    fn stop(&mut self) -> Result<(), WriterError>;
}
