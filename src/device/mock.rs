//! A deterministic in-memory encode device for tests and demos.
//!
//! The mock "encodes" by passing payloads through unchanged: slot input comes
//! back out byte for byte, and frames fed through [`feed_frame`] come out as
//! the little-endian bytes of their timestamp, which lets tests assert sample
//! ordering from the written payloads.
//!
//! [`feed_frame`]: crate::EncodeDevice::feed_frame

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::buffer::{SampleFlags, SampleInfo};
use crate::config::TrackFormat;
use crate::device::{EncodeDevice, InputPoll, OutputPoll, VideoFrame};
use crate::error::DeviceError;

const SLOT_CAPACITY: usize = 64 * 1024;
const DEFAULT_INPUT_SLOTS: usize = 4;

#[derive(Debug)]
struct PendingSample {
    data: Vec<u8>,
    info: SampleInfo,
}

#[derive(Debug, Default)]
struct Shared {
    configured: AtomicBool,
    started: AtomicBool,
    stopped: AtomicBool,
    key_frame_requests: AtomicUsize,
    frames_fed: AtomicUsize,
    inputs_queued: AtomicUsize,
    reinject_format: AtomicBool,
}

/// Observer handle for a [`MockEncodeDevice`].
///
/// The device itself moves into its track worker; the handle stays behind and
/// exposes counters for assertions.
#[derive(Debug, Clone)]
pub struct MockDeviceHandle {
    shared: Arc<Shared>,
}

impl MockDeviceHandle {
    /// Whether `configure` was called.
    pub fn is_configured(&self) -> bool {
        self.shared.configured.load(Ordering::SeqCst)
    }

    /// Whether `start` was called.
    pub fn is_started(&self) -> bool {
        self.shared.started.load(Ordering::SeqCst)
    }

    /// Whether `stop` was called.
    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst)
    }

    /// Number of key frame requests the device received.
    pub fn key_frame_requests(&self) -> usize {
        self.shared.key_frame_requests.load(Ordering::SeqCst)
    }

    /// Number of frames fed through `feed_frame`.
    pub fn frames_fed(&self) -> usize {
        self.shared.frames_fed.load(Ordering::SeqCst)
    }

    /// Number of input slots submitted through `queue_input`.
    pub fn inputs_queued(&self) -> usize {
        self.shared.inputs_queued.load(Ordering::SeqCst)
    }

    /// Makes the device report `FormatChanged` a second time on its next
    /// output poll. Used to exercise protocol violation handling.
    pub fn trigger_format_change(&self) {
        self.shared.reinject_format.store(true, Ordering::SeqCst);
    }
}

/// In-memory [`EncodeDevice`] with deterministic pass-through behavior.
#[derive(Debug)]
pub struct MockEncodeDevice {
    shared: Arc<Shared>,
    format: Option<TrackFormat>,
    started: bool,
    format_reported: bool,
    emit_codec_config: bool,
    codec_config_pending: bool,
    slots: Vec<(Vec<u8>, bool)>,
    pending: VecDeque<PendingSample>,
    outstanding: Vec<Option<PendingSample>>,
    key_pattern: VecDeque<bool>,
    force_key: bool,
}

impl MockEncodeDevice {
    /// Creates a device and its observer handle.
    pub fn new() -> (Self, MockDeviceHandle) {
        let shared = Arc::new(Shared::default());
        let device = Self {
            shared: Arc::clone(&shared),
            format: None,
            started: false,
            format_reported: false,
            emit_codec_config: false,
            codec_config_pending: false,
            slots: (0..DEFAULT_INPUT_SLOTS)
                .map(|_| (vec![0u8; SLOT_CAPACITY], false))
                .collect(),
            pending: VecDeque::new(),
            outstanding: Vec::new(),
            key_pattern: VecDeque::new(),
            force_key: false,
        };
        (device, MockDeviceHandle { shared })
    }

    /// Sets the key frame flags the device will assign to its next samples,
    /// in order. Once the pattern runs out every sample is a key frame.
    pub fn with_key_frame_pattern(mut self, pattern: &[bool]) -> Self {
        self.key_pattern = pattern.iter().copied().collect();
        self
    }

    /// Makes the device emit a codec configuration sample before its first
    /// media sample, the way real codecs deliver parameter sets.
    pub fn with_codec_config(mut self) -> Self {
        self.emit_codec_config = true;
        self
    }

    /// Replaces the input slot table with `count` slots.
    pub fn with_input_slots(mut self, count: usize) -> Self {
        self.slots = (0..count).map(|_| (vec![0u8; SLOT_CAPACITY], false)).collect();
        self
    }

    fn next_key_flag(&mut self) -> bool {
        if self.force_key {
            self.force_key = false;
            return true;
        }
        self.key_pattern.pop_front().unwrap_or(true)
    }

    fn push_sample(&mut self, data: Vec<u8>, timestamp_us: i64, end_of_stream: bool) {
        let key_frame = if end_of_stream { false } else { self.next_key_flag() };
        self.pending.push_back(PendingSample {
            info: SampleInfo {
                size: data.len(),
                timestamp_us,
                flags: SampleFlags {
                    key_frame,
                    codec_config: false,
                    end_of_stream,
                },
            },
            data,
        });
    }

    fn store_outstanding(&mut self, sample: PendingSample) -> usize {
        for (slot, entry) in self.outstanding.iter_mut().enumerate() {
            if entry.is_none() {
                *entry = Some(sample);
                return slot;
            }
        }
        self.outstanding.push(Some(sample));
        self.outstanding.len() - 1
    }
}

impl EncodeDevice for MockEncodeDevice {
    fn configure(&mut self, format: &TrackFormat) -> Result<(), DeviceError> {
        self.format = Some(format.clone());
        self.shared.configured.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn start(&mut self) -> Result<(), DeviceError> {
        if self.format.is_none() {
            return Err(DeviceError::NotConfigured);
        }
        self.started = true;
        self.shared.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn dequeue_input(&mut self, _timeout: Duration) -> Result<InputPoll, DeviceError> {
        if !self.started {
            return Err(DeviceError::NotStarted);
        }
        for (slot, (_, in_use)) in self.slots.iter().enumerate() {
            if !in_use {
                return Ok(InputPoll::Slot(slot));
            }
        }
        Ok(InputPoll::TryAgain)
    }

    fn input_buffer(&mut self, slot: usize) -> Result<&mut [u8], DeviceError> {
        let (data, in_use) = self
            .slots
            .get_mut(slot)
            .ok_or(DeviceError::InvalidSlot { slot })?;
        *in_use = true;
        Ok(data.as_mut_slice())
    }

    fn queue_input(
        &mut self,
        slot: usize,
        len: usize,
        timestamp_us: i64,
        end_of_stream: bool,
    ) -> Result<(), DeviceError> {
        let payload = {
            let (data, in_use) = self
                .slots
                .get_mut(slot)
                .ok_or(DeviceError::InvalidSlot { slot })?;
            *in_use = false;
            data.get(..len)
                .ok_or(DeviceError::InvalidSlot { slot })?
                .to_vec()
        };
        self.shared.inputs_queued.fetch_add(1, Ordering::SeqCst);
        self.push_sample(payload, timestamp_us, end_of_stream);
        Ok(())
    }

    fn dequeue_output(&mut self, _timeout: Duration) -> Result<OutputPoll, DeviceError> {
        if !self.started {
            return Err(DeviceError::NotStarted);
        }
        if self.shared.reinject_format.swap(false, Ordering::SeqCst) {
            return Ok(OutputPoll::FormatChanged);
        }
        if !self.format_reported {
            self.format_reported = true;
            self.codec_config_pending = self.emit_codec_config;
            return Ok(OutputPoll::FormatChanged);
        }
        if self.codec_config_pending {
            self.codec_config_pending = false;
            let sample = PendingSample {
                data: vec![0xC0, 0xDE],
                info: SampleInfo {
                    size: 2,
                    timestamp_us: 0,
                    flags: SampleFlags {
                        key_frame: false,
                        codec_config: true,
                        end_of_stream: false,
                    },
                },
            };
            let slot = self.store_outstanding(sample);
            let info = self.outstanding[slot].as_ref().map(|s| s.info);
            if let Some(info) = info {
                return Ok(OutputPoll::Sample { slot, info });
            }
        }
        match self.pending.pop_front() {
            Some(sample) => {
                let info = sample.info;
                let slot = self.store_outstanding(sample);
                Ok(OutputPoll::Sample { slot, info })
            }
            None => Ok(OutputPoll::TryAgain),
        }
    }

    fn output_buffer(&mut self, slot: usize) -> Result<&[u8], DeviceError> {
        self.outstanding
            .get(slot)
            .and_then(|entry| entry.as_ref())
            .map(|sample| sample.data.as_slice())
            .ok_or(DeviceError::InvalidSlot { slot })
    }

    fn release_output(&mut self, slot: usize) -> Result<(), DeviceError> {
        let entry = self
            .outstanding
            .get_mut(slot)
            .ok_or(DeviceError::InvalidSlot { slot })?;
        if entry.take().is_none() {
            return Err(DeviceError::InvalidSlot { slot });
        }
        Ok(())
    }

    fn output_format(&self) -> Result<TrackFormat, DeviceError> {
        self.format.clone().ok_or(DeviceError::NotConfigured)
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        self.started = false;
        self.shared.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn feed_frame(&mut self, frame: &VideoFrame) -> Result<(), DeviceError> {
        if !self.started {
            return Err(DeviceError::NotStarted);
        }
        self.shared.frames_fed.fetch_add(1, Ordering::SeqCst);
        let payload = frame.timestamp_us.to_le_bytes().to_vec();
        self.push_sample(payload, frame.timestamp_us, false);
        Ok(())
    }

    fn signal_end_of_input(&mut self) -> Result<(), DeviceError> {
        if !self.started {
            return Err(DeviceError::NotStarted);
        }
        let timestamp_us = self
            .pending
            .back()
            .map(|sample| sample.info.timestamp_us)
            .unwrap_or(0);
        self.push_sample(Vec::new(), timestamp_us, true);
        Ok(())
    }

    fn request_key_frame(&mut self) -> Result<(), DeviceError> {
        self.shared.key_frame_requests.fetch_add(1, Ordering::SeqCst);
        self.force_key = true;
        Ok(())
    }
}
