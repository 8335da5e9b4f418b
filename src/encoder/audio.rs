//! The audio track: queue-fed encoding with timestamp correction.
//!
//! PCM batches arrive on whatever thread the capture source calls from, get
//! stamped by [`AudioTimestamp`] and queued through a bounded [`Pool`]; the
//! worker task pops them, lazily activates the encode device from the first
//! batch's format and interleaves feeding with incremental output drains.
//! Stopping marks the last queued batch as end of stream, or synthesizes an
//! empty one when the queue is idle, so the device always sees a proper
//! stream end.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::buffer::InputBuffer;
use crate::config::AudioConfig;
use crate::controller::PipelineController;
use crate::device::EncodeDevice;
use crate::encoder::{EncoderCore, EncoderState, OutputGate, StateCell, TrackControl};
use crate::error::RecorderError;
use crate::pool::Pool;
use crate::timestamp::AudioTimestamp;

/// How long the worker sleeps when the queue is empty or input slots are full.
const QUEUE_POLL: Duration = Duration::from_millis(30);
/// Cap on queued batches; submissions beyond this are dropped.
const MAX_QUEUED_BATCHES: usize = 64;
/// Initial capacity of pooled input buffers.
const BATCH_CAPACITY: usize = 8 * 1024;
/// At most this many silent batches are synthesized to cover a capture gap.
const MAX_GAP_BATCHES: usize = 8;

#[derive(Debug, Default)]
struct AudioClock {
    corrector: Option<AudioTimestamp>,
    /// End timestamp of the last delivered batch.
    last_time_us: i64,
    format: Option<(u32, u16)>,
}

struct AudioShared {
    accepting: AtomicBool,
    queue: Mutex<VecDeque<InputBuffer>>,
    input_pool: Pool<InputBuffer>,
    clock: Mutex<AudioClock>,
    epoch: Instant,
    state: Arc<StateCell>,
    controller: Arc<PipelineController>,
}

/// Submission-side handle for the audio track. Cheap to clone.
#[derive(Clone)]
pub(crate) struct AudioTrack {
    shared: Arc<AudioShared>,
}

impl AudioTrack {
    /// Current lifecycle state of the track.
    pub(crate) fn state(&self) -> EncoderState {
        self.shared.state.get()
    }

    /// Opens the track for sample submission.
    pub(crate) fn begin(&self) {
        self.shared.state.raise(EncoderState::Starting);
        self.shared.accepting.store(true, Ordering::SeqCst);
    }

    /// Queues one batch of interleaved 16 bit PCM.
    ///
    /// Safe to call from any thread. Batches submitted before [`begin`] or
    /// after a stop request are silently dropped, as are batches that arrive
    /// while the queue is at capacity.
    ///
    /// [`begin`]: Self::begin
    pub(crate) fn submit_samples(&self, pcm: &[u8], sample_rate: u32, channels: u16) {
        if pcm.is_empty() || !self.shared.accepting.load(Ordering::SeqCst) {
            return;
        }
        if sample_rate == 0 || channels == 0 {
            tracing::warn!(sample_rate, channels, "dropping batch with degenerate format");
            return;
        }
        let now_us = self.shared.epoch.elapsed().as_micros() as i64;

        let mut guard = self.shared.clock.lock();
        let clock = &mut *guard;
        let byte_rate = sample_rate * u32::from(channels) * 2;
        let corrector = clock
            .corrector
            .get_or_insert_with(|| AudioTimestamp::new(byte_rate));
        let timestamp_us = corrector.correct(pcm.len(), now_us);
        let duration_us = corrector.duration_us(pcm.len());
        let gap_batches = corrector.gap_count(pcm.len()).min(MAX_GAP_BATCHES);
        let gap_start_us = corrector.gap_start_us(clock.last_time_us);
        clock.last_time_us = timestamp_us + duration_us;
        clock.format = Some((sample_rate, channels));
        drop(guard);

        let mut queue = self.shared.queue.lock();
        if gap_batches > 0 {
            tracing::debug!(gap_batches, "filling capture gap with silence");
            let mut gap_ts = gap_start_us;
            for _ in 0..gap_batches {
                let Some(mut filler) = self.shared.input_pool.acquire() else {
                    break;
                };
                filler.fill(&vec![0u8; pcm.len()], gap_ts);
                queue.push_back(filler);
                gap_ts += duration_us;
            }
        }
        match self.shared.input_pool.acquire() {
            Some(mut input) => {
                input.fill(pcm, timestamp_us);
                queue.push_back(input);
            }
            None => {
                tracing::warn!(
                    bytes = pcm.len(),
                    "audio queue full, dropping batch"
                );
            }
        }
    }

    /// Stops the track: the last queued batch becomes the end of stream, and
    /// no further submissions are accepted.
    pub(crate) fn request_stop(&self) {
        if self.shared.state.get() >= EncoderState::Stopping {
            return;
        }
        self.shared.state.raise(EncoderState::Stopping);
        self.shared.accepting.store(false, Ordering::SeqCst);

        let last_time_us = self.shared.clock.lock().last_time_us;
        let mut queue = self.shared.queue.lock();
        match queue.back_mut() {
            Some(last) => last.end_of_stream = true,
            None => {
                let mut marker = self
                    .shared
                    .input_pool
                    .acquire()
                    .unwrap_or_else(|| InputBuffer::with_capacity(0));
                marker.mark_end_of_stream(last_time_us);
                queue.push_back(marker);
            }
        }
        drop(queue);
        self.shared.controller.request_track_stop();
    }
}

impl TrackControl for AudioTrack {
    fn request_stop(&self) {
        AudioTrack::request_stop(self);
    }
}

/// Spawns the audio worker task and returns its submission handle.
pub(crate) fn spawn_audio_track(
    config: AudioConfig,
    device: Box<dyn EncodeDevice>,
    controller: Arc<PipelineController>,
) -> (AudioTrack, JoinHandle<()>) {
    let state = Arc::new(StateCell::new());
    let shared = Arc::new(AudioShared {
        accepting: AtomicBool::new(false),
        queue: Mutex::new(VecDeque::new()),
        input_pool: Pool::bounded(MAX_QUEUED_BATCHES, || {
            InputBuffer::with_capacity(BATCH_CAPACITY)
        }),
        clock: Mutex::new(AudioClock::default()),
        epoch: Instant::now(),
        state: Arc::clone(&state),
        controller: Arc::clone(&controller),
    });
    let track = AudioTrack {
        shared: Arc::clone(&shared),
    };
    let mut core = EncoderCore::new(
        "audio",
        state,
        controller,
        device,
        OutputGate::PassThrough,
    );
    let worker = tokio::spawn(async move {
        shared.state.raise(EncoderState::Preparing);
        shared.state.raise(EncoderState::Prepared);
        if let Err(error) = run(&mut core, &shared, &config).await {
            core.fail(error);
        }
        shared.queue.lock().clear();
        shared.input_pool.clear();
    });
    (track, worker)
}

async fn run(
    core: &mut EncoderCore,
    shared: &Arc<AudioShared>,
    config: &AudioConfig,
) -> Result<(), RecorderError> {
    loop {
        let input = shared.queue.lock().pop_front();
        let Some(input) = input else {
            tokio::time::sleep(QUEUE_POLL).await;
            continue;
        };

        if !core.is_active() {
            let format = shared.clock.lock().format;
            match format {
                Some((sample_rate, channels)) => {
                    core.activate(&config.to_format(sample_rate, channels))?;
                }
                None => {
                    // Stop arrived before any samples did; nothing to encode.
                    shared.input_pool.release(input);
                    core.on_stopped();
                    return Ok(());
                }
            }
        }

        let end_of_stream = input.end_of_stream;
        loop {
            if core.try_feed(&input)? {
                break;
            }
            // All input slots busy. Drain to make room, then back off.
            core.drain(false)?;
            tokio::time::sleep(QUEUE_POLL).await;
        }
        shared.input_pool.release(input);

        if end_of_stream {
            core.drain(true)?;
            return Ok(());
        }
        core.drain(false)?;
    }
}
