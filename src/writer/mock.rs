//! An in-memory container writer for tests and demos.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer::SampleInfo;
use crate::config::TrackFormat;
use crate::error::WriterError;
use crate::writer::ContainerWriter;

/// One sample as recorded by a [`MockContainerWriter`].
#[derive(Debug, Clone)]
pub struct WrittenSample {
    /// Track the sample was written to.
    pub track_index: usize,
    /// Payload bytes.
    pub data: Vec<u8>,
    /// Sample metadata as passed to the writer.
    pub info: SampleInfo,
}

#[derive(Debug, Default)]
struct Shared {
    tracks: Vec<TrackFormat>,
    started: bool,
    start_count: usize,
    stopped: bool,
    samples: Vec<WrittenSample>,
    fail_on_stop: bool,
}

/// Observer handle for a [`MockContainerWriter`].
#[derive(Debug, Clone)]
pub struct MockWriterHandle {
    shared: Arc<Mutex<Shared>>,
}

impl MockWriterHandle {
    /// Formats of the tracks registered so far.
    pub fn tracks(&self) -> Vec<TrackFormat> {
        self.shared.lock().tracks.clone()
    }

    /// Whether `start` was called.
    pub fn is_started(&self) -> bool {
        self.shared.lock().started
    }

    /// How many times `start` was called.
    pub fn start_count(&self) -> usize {
        self.shared.lock().start_count
    }

    /// Whether `stop` was called.
    pub fn is_stopped(&self) -> bool {
        self.shared.lock().stopped
    }

    /// All written samples in write order.
    pub fn samples(&self) -> Vec<WrittenSample> {
        self.shared.lock().samples.clone()
    }

    /// Written samples for one track, in write order.
    pub fn track_samples(&self, track_index: usize) -> Vec<WrittenSample> {
        self.shared
            .lock()
            .samples
            .iter()
            .filter(|sample| sample.track_index == track_index)
            .cloned()
            .collect()
    }

    /// Makes the next `stop` call fail, to exercise finalize error paths.
    pub fn fail_on_stop(&self) {
        self.shared.lock().fail_on_stop = true;
    }
}

/// In-memory [`ContainerWriter`] that records everything it is handed.
#[derive(Debug)]
pub struct MockContainerWriter {
    shared: Arc<Mutex<Shared>>,
}

impl MockContainerWriter {
    /// Creates a writer and its observer handle.
    pub fn new() -> (Self, MockWriterHandle) {
        let shared = Arc::new(Mutex::new(Shared::default()));
        (
            Self {
                shared: Arc::clone(&shared),
            },
            MockWriterHandle { shared },
        )
    }
}

impl ContainerWriter for MockContainerWriter {
    fn add_track(&mut self, format: &TrackFormat) -> Result<usize, WriterError> {
        let mut shared = self.shared.lock();
        if shared.started {
            return Err(WriterError::AlreadyStarted);
        }
        shared.tracks.push(format.clone());
        Ok(shared.tracks.len() - 1)
    }

    fn start(&mut self) -> Result<(), WriterError> {
        let mut shared = self.shared.lock();
        if shared.started {
            return Err(WriterError::AlreadyStarted);
        }
        shared.started = true;
        shared.start_count += 1;
        Ok(())
    }

    fn write_sample(
        &mut self,
        track_index: usize,
        data: &[u8],
        info: &SampleInfo,
    ) -> Result<(), WriterError> {
        let mut shared = self.shared.lock();
        if !shared.started {
            return Err(WriterError::NotStarted);
        }
        if track_index >= shared.tracks.len() {
            return Err(WriterError::InvalidTrack { index: track_index });
        }
        shared.samples.push(WrittenSample {
            track_index,
            data: data.to_vec(),
            info: *info,
        });
        Ok(())
    }

    fn stop(&mut self) -> Result<(), WriterError> {
        let mut shared = self.shared.lock();
        if !shared.started {
            return Err(WriterError::NotStarted);
        }
        shared.started = false;
        shared.stopped = true;
        if shared.fail_on_stop {
            shared.fail_on_stop = false;
            return Err(WriterError::failed("injected finalize failure"));
        }
        Ok(())
    }
}
