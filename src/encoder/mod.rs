//! Track encoder machinery shared by the audio and video workers.
//!
//! Each track runs one worker task that owns its [`EncodeDevice`] outright.
//! [`EncoderCore`] holds the per-track pipeline state shared by both kinds of
//! worker: lazy device activation, the output drain loop, timestamp
//! normalization, the video key frame gate and teardown. The workers in
//! [`audio`] and [`video`] differ only in how input reaches the device.

pub(crate) mod audio;
pub(crate) mod video;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::buffer::{InputBuffer, OutputBuffer, SampleInfo};
use crate::config::TrackFormat;
use crate::controller::PipelineController;
use crate::device::{EncodeDevice, InputPoll, OutputPoll};
use crate::error::{DeviceError, RecorderError};
use crate::pool::Pool;

pub(crate) const INPUT_TIMEOUT: Duration = Duration::from_micros(100);
pub(crate) const OUTPUT_TIMEOUT: Duration = Duration::from_micros(100);

/// Lifecycle of one track encoder.
///
/// States only ever advance; [`StateCell::raise`] ignores attempts to move
/// backwards, which makes concurrent stop requests race-free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum EncoderState {
    /// Worker not yet running.
    None = 0,
    /// Worker is setting up.
    Preparing = 1,
    /// Worker ready, waiting for the start signal.
    Prepared = 2,
    /// Start signal received, device not yet registered with the writer.
    Starting = 3,
    /// Output format registered, samples flowing.
    Started = 4,
    /// Stop requested, draining remaining output.
    Stopping = 5,
    /// Device released, worker finished.
    Stopped = 6,
}

impl EncoderState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::None,
            1 => Self::Preparing,
            2 => Self::Prepared,
            3 => Self::Starting,
            4 => Self::Started,
            5 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Monotonic atomic holder for an [`EncoderState`].
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(EncoderState::None as u8))
    }

    pub(crate) fn get(&self) -> EncoderState {
        EncoderState::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Advances to `state` unless the cell is already past it.
    pub(crate) fn raise(&self, state: EncoderState) {
        self.0.fetch_max(state as u8, Ordering::SeqCst);
    }
}

/// Stop hook the controller uses to wind down every track at once.
pub(crate) trait TrackControl: Send + Sync {
    fn request_stop(&self);
}

/// Whether a track forwards output freely or waits for a key frame first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutputGate {
    PassThrough,
    AwaitKeyFrame,
}

/// Result of one drain pass over a track's device output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Drained {
    /// More output may follow.
    Active,
    /// The device delivered its end of stream sample.
    EndOfStream,
}

pub(crate) fn device_err(track: &'static str, source: DeviceError) -> RecorderError {
    RecorderError::Device { track, source }
}

/// Per-track pipeline state owned by the worker task.
pub(crate) struct EncoderCore {
    name: &'static str,
    state: Arc<StateCell>,
    controller: Arc<PipelineController>,
    idle_device: Option<Box<dyn EncodeDevice>>,
    device: Option<Box<dyn EncodeDevice>>,
    output_pool: Pool<OutputBuffer>,
    gate: OutputGate,
    track_index: usize,
    first_time_us: Option<i64>,
    stopped: bool,
}

impl EncoderCore {
    pub(crate) fn new(
        name: &'static str,
        state: Arc<StateCell>,
        controller: Arc<PipelineController>,
        device: Box<dyn EncodeDevice>,
        gate: OutputGate,
    ) -> Self {
        Self {
            name,
            state,
            controller,
            idle_device: Some(device),
            device: None,
            output_pool: Pool::unbounded(OutputBuffer::empty),
            gate,
            track_index: 0,
            first_time_us: None,
            stopped: false,
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the device has been configured and started.
    pub(crate) fn is_active(&self) -> bool {
        self.device.is_some()
    }

    /// Configures and starts the device with the given format. Called once,
    /// when the first input arrives and the real format is known.
    pub(crate) fn activate(&mut self, format: &TrackFormat) -> Result<(), RecorderError> {
        let mut device = match self.idle_device.take() {
            Some(device) => device,
            None => return Ok(()),
        };
        device
            .configure(format)
            .and_then(|()| device.start())
            .map_err(|e| device_err(self.name, e))?;
        self.device = Some(device);
        tracing::debug!(track = self.name, ?format, "encode device activated");
        Ok(())
    }

    pub(crate) fn device_mut(&mut self) -> Result<&mut dyn EncodeDevice, RecorderError> {
        match self.device.as_deref_mut() {
            Some(device) => Ok(device),
            None => Err(device_err(self.name, DeviceError::NotStarted)),
        }
    }

    /// Tries to hand one input batch to the device. Returns `false` when no
    /// input slot freed up within the poll timeout.
    pub(crate) fn try_feed(&mut self, input: &InputBuffer) -> Result<bool, RecorderError> {
        let name = self.name;
        let device = self.device_mut()?;
        let slot = match device
            .dequeue_input(INPUT_TIMEOUT)
            .map_err(|e| device_err(name, e))?
        {
            InputPoll::Slot(slot) => slot,
            InputPoll::TryAgain => return Ok(false),
        };
        let target = device
            .input_buffer(slot)
            .map_err(|e| device_err(name, e))?;
        if input.len > target.len() {
            return Err(device_err(
                name,
                DeviceError::failed(format!(
                    "input batch of {} bytes exceeds slot capacity {}",
                    input.len,
                    target.len()
                )),
            ));
        }
        target[..input.len].copy_from_slice(&input.data[..input.len]);
        device
            .queue_input(slot, input.len, input.timestamp_us, input.end_of_stream)
            .map_err(|e| device_err(name, e))?;
        Ok(true)
    }

    /// Drains ready output from the device into the writer.
    ///
    /// With `drain_all` the loop spins through poll timeouts until the end of
    /// stream sample arrives; otherwise it processes whatever is ready and
    /// returns on the first timeout.
    pub(crate) fn drain(&mut self, drain_all: bool) -> Result<Drained, RecorderError> {
        loop {
            let name = self.name;
            let device = match self.device.as_deref_mut() {
                Some(device) => device,
                None => return Ok(Drained::Active),
            };
            match device
                .dequeue_output(OUTPUT_TIMEOUT)
                .map_err(|e| device_err(name, e))?
            {
                OutputPoll::TryAgain => {
                    if !drain_all {
                        return Ok(Drained::Active);
                    }
                }
                OutputPoll::FormatChanged => {
                    if self.state.get() >= EncoderState::Started {
                        return Err(RecorderError::FormatChangedTwice { track: name });
                    }
                    let format = device.output_format().map_err(|e| device_err(name, e))?;
                    self.track_index = self.controller.notify_format_ready(&format)?;
                    self.state.raise(EncoderState::Started);
                }
                OutputPoll::Sample { slot, info } => {
                    let mut output = match self.output_pool.acquire() {
                        Some(output) => output,
                        None => OutputBuffer::empty(),
                    };
                    {
                        let payload = device
                            .output_buffer(slot)
                            .map_err(|e| device_err(name, e))?;
                        let take = info.size.min(payload.len());
                        output.data.extend_from_slice(&payload[..take]);
                    }
                    device
                        .release_output(slot)
                        .map_err(|e| device_err(name, e))?;

                    let skip = info.flags.codec_config
                        || info.size == 0
                        || !self.controller.is_writer_started();
                    if skip {
                        self.output_pool.release(output);
                    } else {
                        let first = *self.first_time_us.get_or_insert(info.timestamp_us);
                        output.info = SampleInfo {
                            size: output.data.len(),
                            timestamp_us: info.timestamp_us - first,
                            flags: info.flags,
                        };
                        output.track_index = self.track_index;
                        self.write_output(output)?;
                    }

                    if info.flags.end_of_stream {
                        self.on_stopped();
                        return Ok(Drained::EndOfStream);
                    }
                }
            }
        }
    }

    /// Forwards one output buffer to the writer, applying the key frame gate.
    fn write_output(&mut self, output: OutputBuffer) -> Result<(), RecorderError> {
        if self.gate == OutputGate::AwaitKeyFrame {
            if output.info.flags.key_frame {
                self.gate = OutputGate::PassThrough;
            } else {
                // Leading delta frames are useless without their reference;
                // drop them and push the device toward a sync point.
                tracing::debug!(track = self.name, "dropping output while waiting for key frame");
                let name = self.name;
                self.device_mut()?
                    .request_key_frame()
                    .map_err(|e| device_err(name, e))?;
                self.output_pool.release(output);
                return Ok(());
            }
        }
        self.controller.write(&output)?;
        self.output_pool.release(output);
        Ok(())
    }

    /// Releases the device and reports the track as stopped. Idempotent.
    pub(crate) fn on_stopped(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        if let Some(mut device) = self.device.take() {
            if let Err(error) = device.stop() {
                tracing::warn!(track = self.name, %error, "encode device stop failed");
            }
        }
        self.idle_device = None;
        self.output_pool.clear();
        self.state.raise(EncoderState::Stopped);
        self.controller.notify_stopped();
        tracing::debug!(track = self.name, "track stopped");
    }

    /// Records a fatal track error and winds the whole session down.
    pub(crate) fn fail(&mut self, error: RecorderError) {
        tracing::error!(track = self.name, %error, "track failed");
        self.controller.record_error(error);
        self.controller.stop_all_tracks();
        self.on_stopped();
    }
}
