//! The recorder facade.
//!
//! [`Recorder`] ties the track workers, the pipeline controller and the
//! container writer into one session with a builder entry point:
//!
//! ```no_run
//! use avmux::{MockContainerWriter, MockEncodeDevice, Recorder, VideoConfig};
//!
//! # async fn demo() -> Result<(), avmux::RecorderError> {
//! let (device, _) = MockEncodeDevice::new();
//! let (writer, _) = MockContainerWriter::new();
//! let mut recorder = Recorder::builder()
//!     .video(VideoConfig::default(), Box::new(device))
//!     .writer(Box::new(writer))
//!     .start()
//!     .await?;
//! // feed frames, then:
//! recorder.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::{AudioConfig, VideoConfig};
use crate::controller::PipelineController;
use crate::device::{EncodeDevice, VideoFrame};
use crate::encoder::audio::{spawn_audio_track, AudioTrack};
use crate::encoder::video::{spawn_video_track, VideoTrack};
use crate::encoder::{EncoderState, TrackControl};
use crate::error::RecorderError;
use crate::event::EventCallback;
use crate::writer::ContainerWriter;

/// Lifecycle of a [`Recorder`] session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    /// Tracks are running and accepting input.
    Recording,
    /// [`Recorder::stop`] has completed; the session is over.
    Ended,
}

/// Configures and starts a recording session.
pub struct RecorderBuilder {
    video: Option<(VideoConfig, Box<dyn EncodeDevice>)>,
    audio: Option<(AudioConfig, Box<dyn EncodeDevice>)>,
    writer: Option<Box<dyn ContainerWriter>>,
    event_callback: Option<EventCallback>,
}

impl RecorderBuilder {
    fn new() -> Self {
        Self {
            video: None,
            audio: None,
            writer: None,
            event_callback: None,
        }
    }

    /// Adds the video track. Required.
    pub fn video(mut self, config: VideoConfig, device: Box<dyn EncodeDevice>) -> Self {
        self.video = Some((config, device));
        self
    }

    /// Adds the optional audio track.
    pub fn audio(mut self, config: AudioConfig, device: Box<dyn EncodeDevice>) -> Self {
        self.audio = Some((config, device));
        self
    }

    /// Sets the container writer. Required.
    pub fn writer(mut self, writer: Box<dyn ContainerWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Registers a callback for session events.
    pub fn on_event(mut self, callback: EventCallback) -> Self {
        self.event_callback = Some(callback);
        self
    }

    /// Spawns the track workers and opens the session for input.
    pub async fn start(self) -> Result<Recorder, RecorderError> {
        let (video_config, video_device) = self.video.ok_or(RecorderError::NoVideoTrack)?;
        let writer = self.writer.ok_or(RecorderError::NoWriter)?;

        let track_count = 1 + usize::from(self.audio.is_some());
        let controller = Arc::new(PipelineController::new(
            writer,
            track_count,
            self.event_callback,
        ));

        let (video, video_worker) =
            spawn_video_track(video_config, video_device, Arc::clone(&controller));
        let mut workers = vec![video_worker];
        let mut controls: Vec<Box<dyn TrackControl>> = vec![Box::new(video.clone())];

        let audio = match self.audio {
            Some((audio_config, audio_device)) => {
                let (audio, audio_worker) =
                    spawn_audio_track(audio_config, audio_device, Arc::clone(&controller));
                workers.push(audio_worker);
                controls.push(Box::new(audio.clone()));
                Some(audio)
            }
            None => None,
        };

        controller.register_tracks(controls);
        video.begin();
        if let Some(audio) = &audio {
            audio.begin();
        }
        tracing::info!(track_count, "recording session started");

        Ok(Recorder {
            state: RecorderState::Recording,
            controller,
            video,
            audio,
            workers,
        })
    }
}

/// A running recording session.
///
/// Dropping a recorder that is still recording requests a stop but cannot
/// wait for the workers; prefer calling [`stop`](Self::stop).
pub struct Recorder {
    state: RecorderState,
    controller: Arc<PipelineController>,
    video: VideoTrack,
    audio: Option<AudioTrack>,
    workers: Vec<JoinHandle<()>>,
}

impl Recorder {
    /// Starts building a session.
    pub fn builder() -> RecorderBuilder {
        RecorderBuilder::new()
    }

    /// Current session state.
    pub fn state(&self) -> RecorderState {
        self.state
    }

    /// Whether the session is still accepting input.
    pub fn is_recording(&self) -> bool {
        self.state == RecorderState::Recording
    }

    /// Lifecycle state of the video track encoder.
    pub fn video_state(&self) -> EncoderState {
        self.video.state()
    }

    /// Lifecycle state of the audio track encoder, when one exists.
    pub fn audio_state(&self) -> Option<EncoderState> {
        self.audio.as_ref().map(|audio| audio.state())
    }

    /// Submits one video frame. Never blocks; frames arriving after a stop
    /// request are dropped by the worker.
    pub fn submit_frame(&self, frame: VideoFrame) {
        self.video.submit_frame(frame);
    }

    /// Submits one batch of interleaved 16 bit PCM to the audio track.
    ///
    /// A warning is logged and the batch dropped when the session has no
    /// audio track.
    pub fn submit_samples(&self, pcm: &[u8], sample_rate: u32, channels: u16) {
        match &self.audio {
            Some(audio) => audio.submit_samples(pcm, sample_rate, channels),
            None => tracing::warn!("audio batch submitted to a session without an audio track"),
        }
    }

    /// Stops the session and waits for every track to finish.
    ///
    /// Returns the first fatal error the session recorded, if any. Calling
    /// `stop` again is a no-op returning `Ok(())`.
    pub async fn stop(&mut self) -> Result<(), RecorderError> {
        if self.state != RecorderState::Recording {
            return Ok(());
        }
        self.state = RecorderState::Ended;
        self.controller.stop_all_tracks();
        for worker in self.workers.drain(..) {
            if let Err(error) = worker.await {
                tracing::warn!(%error, "track worker panicked");
            }
        }
        match self.controller.first_error() {
            Some(error) => Err(RecorderError::Session(error)),
            None => Ok(()),
        }
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if self.state == RecorderState::Recording {
            tracing::warn!("recorder dropped while recording, requesting stop");
            self.controller.stop_all_tracks();
        }
    }
}
