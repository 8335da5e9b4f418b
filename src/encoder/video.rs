//! The video track: frame-fed encoding behind a key frame gate.
//!
//! Frames travel to the worker over an unbounded channel as owned commands,
//! so the submission side never blocks. The device activates lazily from the
//! first frame's rotation-adjusted dimensions, and output is gated until the
//! first key frame so the written stream always starts at a sync point.

use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;

use crate::config::VideoConfig;
use crate::controller::PipelineController;
use crate::device::{EncodeDevice, VideoFrame};
use crate::encoder::{
    device_err, Drained, EncoderCore, EncoderState, OutputGate, StateCell, TrackControl,
};
use crate::error::RecorderError;

enum VideoCommand {
    Start,
    Frame(VideoFrame),
    Stop,
}

/// Submission-side handle for the video track. Cheap to clone.
#[derive(Clone)]
pub(crate) struct VideoTrack {
    sender: UnboundedSender<VideoCommand>,
    state: Arc<StateCell>,
    controller: Arc<PipelineController>,
}

impl VideoTrack {
    /// Current lifecycle state of the track.
    pub(crate) fn state(&self) -> EncoderState {
        self.state.get()
    }

    /// Opens the track for frame submission.
    pub(crate) fn begin(&self) {
        self.state.raise(EncoderState::Starting);
        let _ = self.sender.send(VideoCommand::Start);
    }

    /// Submits one frame. Safe to call from any thread; frames sent before
    /// [`begin`] or after a stop request are dropped by the worker.
    ///
    /// [`begin`]: Self::begin
    pub(crate) fn submit_frame(&self, frame: VideoFrame) {
        let _ = self.sender.send(VideoCommand::Frame(frame));
    }

    /// Stops the track: the device is told the input ended and remaining
    /// output is drained.
    pub(crate) fn request_stop(&self) {
        if self.state.get() >= EncoderState::Stopping {
            return;
        }
        self.state.raise(EncoderState::Stopping);
        let _ = self.sender.send(VideoCommand::Stop);
        self.controller.request_track_stop();
    }
}

impl TrackControl for VideoTrack {
    fn request_stop(&self) {
        VideoTrack::request_stop(self);
    }
}

/// Spawns the video worker task and returns its submission handle.
pub(crate) fn spawn_video_track(
    config: VideoConfig,
    device: Box<dyn EncodeDevice>,
    controller: Arc<PipelineController>,
) -> (VideoTrack, JoinHandle<()>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let state = Arc::new(StateCell::new());
    let track = VideoTrack {
        sender,
        state: Arc::clone(&state),
        controller: Arc::clone(&controller),
    };
    let worker_state = Arc::clone(&state);
    let mut core = EncoderCore::new(
        "video",
        state,
        controller,
        device,
        OutputGate::AwaitKeyFrame,
    );
    let worker = tokio::spawn(async move {
        worker_state.raise(EncoderState::Preparing);
        worker_state.raise(EncoderState::Prepared);
        if let Err(error) = run(&mut core, receiver, &config).await {
            core.fail(error);
        }
    });
    (track, worker)
}

async fn run(
    core: &mut EncoderCore,
    mut receiver: mpsc::UnboundedReceiver<VideoCommand>,
    config: &VideoConfig,
) -> Result<(), RecorderError> {
    // Negative until Start arrives; frames received before then are dropped.
    let mut frame_number: i64 = -1;

    while let Some(command) = receiver.recv().await {
        match command {
            VideoCommand::Start => {
                frame_number = 0;
            }
            VideoCommand::Frame(frame) => {
                // A zero timestamp marks a frame the capture layer could not
                // stamp; encoding it would corrupt the timeline.
                if frame_number < 0 || frame.timestamp_us == 0 {
                    continue;
                }
                frame_number += 1;
                if !core.is_active() {
                    let format =
                        config.to_format(frame.rotated_width(), frame.rotated_height());
                    core.activate(&format)?;
                }
                core.drain(false)?;
                let name = core.name();
                core.device_mut()?
                    .feed_frame(&frame)
                    .map_err(|e| device_err(name, e))?;
            }
            VideoCommand::Stop => {
                if core.is_active() {
                    let name = core.name();
                    core.device_mut()?
                        .signal_end_of_input()
                        .map_err(|e| device_err(name, e))?;
                    let drained = core.drain(true)?;
                    debug_assert_eq!(drained, Drained::EndOfStream);
                } else {
                    core.on_stopped();
                }
                return Ok(());
            }
        }
    }
    // Channel closed without a stop command; release the device anyway.
    core.on_stopped();
    Ok(())
}
