//! The pipeline controller: writer ownership and the start/stop barriers.
//!
//! Track workers run independently; everything they share meets here. The
//! controller owns the [`ContainerWriter`] behind one lock, so writer calls
//! are serialized without the writer having to care, and it counts track
//! registrations and stops to drive the two barriers:
//!
//! * the writer starts only once every track has reported its output format;
//! * the writer finalizes only once every track has fully stopped.
//!
//! Session events are emitted after the controller lock is released, so a
//! callback can call back into the recorder without deadlocking.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer::OutputBuffer;
use crate::config::TrackFormat;
use crate::encoder::TrackControl;
use crate::error::RecorderError;
use crate::event::{EventCallback, RecorderEvent};
use crate::writer::ContainerWriter;

struct Inner {
    writer: Option<Box<dyn ContainerWriter>>,
    track_count: usize,
    /// Tracks that have registered their format and not yet requested stop.
    started: usize,
    /// Tracks that have fully stopped.
    stopped: usize,
    writer_started: bool,
    stop_emitted: bool,
    ended: bool,
    first_error: Option<Arc<RecorderError>>,
}

/// Shared coordination point for all track workers of one session.
pub(crate) struct PipelineController {
    inner: Mutex<Inner>,
    tracks: Mutex<Vec<Box<dyn TrackControl>>>,
    event_callback: Option<EventCallback>,
}

impl PipelineController {
    pub(crate) fn new(
        writer: Box<dyn ContainerWriter>,
        track_count: usize,
        event_callback: Option<EventCallback>,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                writer: Some(writer),
                track_count,
                started: 0,
                stopped: 0,
                writer_started: false,
                stop_emitted: false,
                ended: false,
                first_error: None,
            }),
            tracks: Mutex::new(Vec::new()),
            event_callback,
        }
    }

    /// Registers the stop hooks for every track. Called once, before any
    /// track can reach its stop path.
    pub(crate) fn register_tracks(&self, tracks: Vec<Box<dyn TrackControl>>) {
        *self.tracks.lock() = tracks;
    }

    fn emit(&self, event: RecorderEvent) {
        if let Some(callback) = &self.event_callback {
            callback(event);
        }
    }

    /// A track's output format is known: register it with the writer and, if
    /// this was the last missing track, start the container.
    ///
    /// Returns the container track index.
    pub(crate) fn notify_format_ready(
        &self,
        format: &TrackFormat,
    ) -> Result<usize, RecorderError> {
        let mut started_now = false;
        let index;
        {
            let mut inner = self.inner.lock();
            if inner.writer_started {
                return Err(RecorderError::FormatAfterWriterStart);
            }
            let writer = inner.writer.as_mut().ok_or(RecorderError::NoWriter)?;
            index = writer.add_track(format)?;
            inner.started += 1;
            if inner.started == inner.track_count {
                let writer = inner.writer.as_mut().ok_or(RecorderError::NoWriter)?;
                writer.start()?;
                inner.writer_started = true;
                started_now = true;
            }
        }
        if started_now {
            tracing::info!("all tracks registered, container started");
            self.emit(RecorderEvent::EncodingStarted);
        }
        Ok(index)
    }

    pub(crate) fn is_writer_started(&self) -> bool {
        self.inner.lock().writer_started
    }

    /// Writes one encoded sample. Fails before the writer has started.
    pub(crate) fn write(&self, output: &OutputBuffer) -> Result<(), RecorderError> {
        let mut inner = self.inner.lock();
        if !inner.writer_started {
            return Err(RecorderError::WriteBeforeStart);
        }
        let writer = inner.writer.as_mut().ok_or(RecorderError::NoWriter)?;
        writer.write_sample(output.track_index, &output.data, &output.info)?;
        Ok(())
    }

    /// One track is beginning to stop. When every started track has asked,
    /// the whole session winds down.
    pub(crate) fn request_track_stop(&self) {
        let all_stopping = {
            let mut inner = self.inner.lock();
            inner.started = inner.started.saturating_sub(1);
            inner.started == 0
        };
        if all_stopping {
            self.stop_all_tracks();
        }
    }

    /// Asks every track to stop. Emits [`RecorderEvent::EncodingStopped`]
    /// exactly once per session.
    pub(crate) fn stop_all_tracks(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.stop_emitted {
                return;
            }
            inner.stop_emitted = true;
        }
        tracing::info!("session stop requested");
        self.emit(RecorderEvent::EncodingStopped);
        // Drained rather than iterated in place: the hooks keep the
        // controller alive, and this is their last use.
        let tracks = std::mem::take(&mut *self.tracks.lock());
        for track in &tracks {
            track.request_stop();
        }
    }

    /// One track has fully stopped. When the last one reports in, finalize
    /// the container and emit [`RecorderEvent::EncodingEnded`].
    pub(crate) fn notify_stopped(&self) {
        let finish = {
            let mut inner = self.inner.lock();
            inner.stopped += 1;
            if inner.stopped >= inner.track_count && !inner.ended {
                inner.ended = true;
                let finalize_result = match inner.writer.take() {
                    Some(mut writer) if inner.writer_started => writer.stop(),
                    _ => Ok(()),
                };
                let error = match finalize_result {
                    Ok(()) => inner.first_error.clone(),
                    Err(writer_error) => {
                        let error = Arc::new(RecorderError::from(writer_error));
                        inner.first_error.get_or_insert_with(|| Arc::clone(&error));
                        inner.first_error.clone()
                    }
                };
                Some(error)
            } else {
                None
            }
        };
        if let Some(error) = finish {
            match &error {
                Some(error) => tracing::warn!(%error, "session ended with error"),
                None => tracing::info!("session ended"),
            }
            self.emit(RecorderEvent::EncodingEnded { error });
        }
    }

    /// Records the first fatal error of the session; later errors are logged
    /// by their tracks but not reported.
    pub(crate) fn record_error(&self, error: RecorderError) {
        let mut inner = self.inner.lock();
        if inner.first_error.is_none() {
            inner.first_error = Some(Arc::new(error));
        }
    }

    /// The first fatal error recorded this session, if any.
    pub(crate) fn first_error(&self) -> Option<Arc<RecorderError>> {
        self.inner.lock().first_error.clone()
    }
}
