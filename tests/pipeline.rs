//! End-to-end pipeline tests against the mock device and writer.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use avmux::{
    event_callback, AudioConfig, EventCallback, MockContainerWriter, MockEncodeDevice,
    MockWriterHandle, Recorder, RecorderError, RecorderEvent, VideoConfig, VideoFrame,
};

/// Polls `cond` until it holds or a couple of seconds pass.
async fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..300 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {what}");
}

fn frame(timestamp_us: i64) -> VideoFrame {
    VideoFrame {
        width: 640,
        height: 480,
        rotation: 0,
        timestamp_us,
    }
}

type EventLog = Arc<Mutex<Vec<RecorderEvent>>>;

fn event_log() -> (EventCallback, EventLog) {
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let callback = event_callback(move |event| sink.lock().push(event));
    (callback, log)
}

fn count_started(log: &EventLog) -> usize {
    log.lock()
        .iter()
        .filter(|e| matches!(e, RecorderEvent::EncodingStarted))
        .count()
}

fn count_stopped(log: &EventLog) -> usize {
    log.lock()
        .iter()
        .filter(|e| matches!(e, RecorderEvent::EncodingStopped))
        .count()
}

fn ended_errors(log: &EventLog) -> Vec<Option<Arc<RecorderError>>> {
    log.lock()
        .iter()
        .filter_map(|e| match e {
            RecorderEvent::EncodingEnded { error } => Some(error.clone()),
            _ => None,
        })
        .collect()
}

fn video_track_index(writer: &MockWriterHandle) -> usize {
    writer
        .tracks()
        .iter()
        .position(|format| format.is_video())
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_writer_starts_once_after_both_tracks_register() {
    let (video_device, _) = MockEncodeDevice::new();
    let (audio_device, _) = MockEncodeDevice::new();
    let (writer, writer_handle) = MockContainerWriter::new();
    let (callback, log) = event_log();

    let mut recorder = Recorder::builder()
        .video(VideoConfig::default(), Box::new(video_device))
        .audio(AudioConfig::default(), Box::new(audio_device))
        .writer(Box::new(writer))
        .on_event(callback)
        .start()
        .await
        .unwrap();

    // Audio alone must not start the container.
    recorder.submit_samples(&[1u8; 1920], 48_000, 2);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!writer_handle.is_started());
    assert_eq!(count_started(&log), 0);

    recorder.submit_frame(frame(1_000));
    wait_for("container start", || writer_handle.is_started()).await;

    assert_eq!(writer_handle.start_count(), 1);
    assert_eq!(writer_handle.tracks().len(), 2);
    assert_eq!(count_started(&log), 1);

    recorder.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_two_track_session_end_to_end() {
    let (video_device, _) = MockEncodeDevice::new();
    let (audio_device, _) = MockEncodeDevice::new();
    let (writer, writer_handle) = MockContainerWriter::new();
    let (callback, log) = event_log();

    let mut recorder = Recorder::builder()
        .video(VideoConfig::default(), Box::new(video_device))
        .audio(AudioConfig::default(), Box::new(audio_device))
        .writer(Box::new(writer))
        .on_event(callback)
        .start()
        .await
        .unwrap();
    assert!(recorder.is_recording());

    recorder.submit_frame(frame(1_000));
    recorder.submit_samples(&[1u8; 1920], 48_000, 2);
    wait_for("container start", || writer_handle.is_started()).await;

    for timestamp_us in [33_000, 66_000] {
        recorder.submit_frame(frame(timestamp_us));
    }
    for value in [2u8, 3u8] {
        recorder.submit_samples(&vec![value; 1920], 48_000, 2);
    }
    let video = video_track_index(&writer_handle);
    wait_for("post-start samples written", || {
        writer_handle.samples().len() >= 2
    })
    .await;

    // Remaining output flushes during the stop drain.
    recorder.stop().await.unwrap();
    assert!(!recorder.is_recording());
    assert!(writer_handle.track_samples(video).len() >= 2);

    assert_eq!(count_started(&log), 1);
    assert_eq!(count_stopped(&log), 1);
    let ended = ended_errors(&log);
    assert_eq!(ended.len(), 1);
    assert!(ended[0].is_none());
    assert!(writer_handle.is_stopped());

    // Per-track timestamps are normalized to zero and strictly increasing.
    for track in 0..2 {
        let samples = writer_handle.track_samples(track);
        assert!(!samples.is_empty());
        let mut last = -1i64;
        for sample in &samples {
            assert!(sample.info.timestamp_us >= 0);
            assert!(sample.info.timestamp_us > last);
            // Zero-size payloads (codec config, bare stream-end markers)
            // never reach the container.
            assert!(sample.info.size > 0);
            last = sample.info.timestamp_us;
        }
    }
    // Video payloads carry their frame timestamp, so order is provable.
    let frame_timestamps: Vec<i64> = writer_handle
        .track_samples(video)
        .iter()
        .map(|s| i64::from_le_bytes(s.data[..8].try_into().unwrap()))
        .collect();
    let mut sorted = frame_timestamps.clone();
    sorted.sort_unstable();
    assert_eq!(frame_timestamps, sorted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_video_output_gated_until_key_frame() {
    let (video_device, device_handle) = MockEncodeDevice::new();
    let video_device = video_device.with_key_frame_pattern(&[false, false]);
    let (writer, writer_handle) = MockContainerWriter::new();

    let mut recorder = Recorder::builder()
        .video(VideoConfig::default(), Box::new(video_device))
        .writer(Box::new(writer))
        .start()
        .await
        .unwrap();

    recorder.submit_frame(frame(1_000));
    recorder.submit_frame(frame(33_000));
    recorder.submit_frame(frame(66_000));
    recorder.stop().await.unwrap();

    let samples = writer_handle.samples();
    // The first delta frame is dropped and triggers a key frame request; the
    // forced key frame and everything after it are written.
    assert!(device_handle.key_frame_requests() >= 1);
    assert!(!samples.is_empty());
    assert!(samples[0].info.flags.key_frame);
    assert!(samples.len() < 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_is_idempotent() {
    let (video_device, _) = MockEncodeDevice::new();
    let (writer, _) = MockContainerWriter::new();
    let (callback, log) = event_log();

    let mut recorder = Recorder::builder()
        .video(VideoConfig::default(), Box::new(video_device))
        .writer(Box::new(writer))
        .on_event(callback)
        .start()
        .await
        .unwrap();

    recorder.submit_frame(frame(1_000));
    recorder.stop().await.unwrap();
    recorder.stop().await.unwrap();

    assert_eq!(count_stopped(&log), 1);
    assert_eq!(ended_errors(&log).len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_silent_audio_track_never_starts_container() {
    let (video_device, _) = MockEncodeDevice::new();
    let (audio_device, _) = MockEncodeDevice::new();
    let (writer, writer_handle) = MockContainerWriter::new();
    let (callback, log) = event_log();

    let mut recorder = Recorder::builder()
        .video(VideoConfig::default(), Box::new(video_device))
        .audio(AudioConfig::default(), Box::new(audio_device))
        .writer(Box::new(writer))
        .on_event(callback)
        .start()
        .await
        .unwrap();

    // Only video input; the audio track never learns its format, so the
    // start barrier never completes and nothing is written.
    recorder.submit_frame(frame(1_000));
    tokio::time::sleep(Duration::from_millis(150)).await;
    recorder.stop().await.unwrap();

    assert!(!writer_handle.is_started());
    assert!(!writer_handle.is_stopped());
    assert!(writer_handle.samples().is_empty());
    assert_eq!(count_started(&log), 0);
    let ended = ended_errors(&log);
    assert_eq!(ended.len(), 1);
    assert!(ended[0].is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_finalize_failure_is_reported() {
    let (video_device, _) = MockEncodeDevice::new();
    let (writer, writer_handle) = MockContainerWriter::new();
    let (callback, log) = event_log();

    let mut recorder = Recorder::builder()
        .video(VideoConfig::default(), Box::new(video_device))
        .writer(Box::new(writer))
        .on_event(callback)
        .start()
        .await
        .unwrap();

    recorder.submit_frame(frame(1_000));
    wait_for("container start", || writer_handle.is_started()).await;
    writer_handle.fail_on_stop();

    let result = recorder.stop().await;
    assert!(result.is_err());

    let ended = ended_errors(&log);
    assert_eq!(ended.len(), 1);
    assert!(ended[0].is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_second_format_change_fails_the_session() {
    let (video_device, device_handle) = MockEncodeDevice::new();
    let (writer, writer_handle) = MockContainerWriter::new();
    let (callback, log) = event_log();

    let mut recorder = Recorder::builder()
        .video(VideoConfig::default(), Box::new(video_device))
        .writer(Box::new(writer))
        .on_event(callback)
        .start()
        .await
        .unwrap();

    recorder.submit_frame(frame(1_000));
    wait_for("first sample written", || !writer_handle.samples().is_empty()).await;

    device_handle.trigger_format_change();
    recorder.submit_frame(frame(33_000));
    wait_for("session failure", || !ended_errors(&log).is_empty()).await;

    let result = recorder.stop().await;
    match result {
        Err(RecorderError::Session(error)) => {
            assert!(matches!(
                *error,
                RecorderError::FormatChangedTwice { track: "video" }
            ));
        }
        other => panic!("expected a session error, got {other:?}"),
    }
    let ended = ended_errors(&log);
    assert_eq!(ended.len(), 1);
    assert!(ended[0].is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_degenerate_audio_format_is_rejected() {
    let (video_device, _) = MockEncodeDevice::new();
    let (audio_device, _) = MockEncodeDevice::new();
    let (writer, writer_handle) = MockContainerWriter::new();

    let mut recorder = Recorder::builder()
        .video(VideoConfig::default(), Box::new(video_device))
        .audio(AudioConfig::default(), Box::new(audio_device))
        .writer(Box::new(writer))
        .start()
        .await
        .unwrap();

    // A zero rate or channel count has no byte clock; the batch is dropped
    // rather than taking the submission thread down.
    recorder.submit_samples(&[1u8; 1920], 0, 2);
    recorder.submit_samples(&[1u8; 1920], 48_000, 0);

    recorder.submit_frame(frame(1_000));
    recorder.submit_samples(&[1u8; 1920], 48_000, 2);
    wait_for("container start", || writer_handle.is_started()).await;
    recorder.stop().await.unwrap();

    assert!(writer_handle.is_stopped());
    let audio = writer_handle
        .tracks()
        .iter()
        .position(|format| !format.is_video())
        .unwrap();
    assert_eq!(writer_handle.track_samples(audio).len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_audio_gap_filled_with_silence() {
    let (video_device, _) = MockEncodeDevice::new();
    let (audio_device, _) = MockEncodeDevice::new();
    let (writer, writer_handle) = MockContainerWriter::new();

    let mut recorder = Recorder::builder()
        .video(VideoConfig::default(), Box::new(video_device))
        .audio(AudioConfig::default(), Box::new(audio_device))
        .writer(Box::new(writer))
        .start()
        .await
        .unwrap();

    recorder.submit_frame(frame(1_000));
    // 1920 bytes at 48 kHz stereo is 10 ms per batch.
    recorder.submit_samples(&[5u8; 1920], 48_000, 2);
    wait_for("container start", || writer_handle.is_started()).await;

    recorder.submit_samples(&[5u8; 1920], 48_000, 2);
    // Stall well past the 2x batch duration threshold.
    tokio::time::sleep(Duration::from_millis(120)).await;
    recorder.submit_samples(&[5u8; 1920], 48_000, 2);
    recorder.stop().await.unwrap();

    let audio = writer_handle
        .tracks()
        .iter()
        .position(|format| !format.is_video())
        .unwrap();
    let samples = writer_handle.track_samples(audio);
    // More samples written than batches submitted: the gap was filled.
    assert!(samples.len() > 3, "got {} audio samples", samples.len());
    assert!(samples
        .iter()
        .any(|sample| sample.data.iter().all(|byte| *byte == 0)));
}
