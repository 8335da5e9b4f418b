//! Records a short mock session into a framed container file.
//!
//! Run with: `cargo run --example mock_record`

use std::time::Duration;

use avmux::{
    event_callback, AudioConfig, FileContainerWriter, MockEncodeDevice, Recorder, VideoConfig,
    VideoFrame,
};

#[tokio::main]
async fn main() -> Result<(), avmux::RecorderError> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let (video_device, _) = MockEncodeDevice::new();
    let (audio_device, _) = MockEncodeDevice::new();
    let writer = FileContainerWriter::new("mock_record.avmx");

    let mut recorder = Recorder::builder()
        .video(VideoConfig::default(), Box::new(video_device))
        .audio(AudioConfig::default(), Box::new(audio_device))
        .writer(Box::new(writer))
        .on_event(event_callback(|event| println!("event: {event:?}")))
        .start()
        .await?;

    // One second of 30 fps video and 10 ms PCM batches.
    for i in 0..30i64 {
        recorder.submit_frame(VideoFrame {
            width: 1280,
            height: 720,
            rotation: 0,
            timestamp_us: 1_000 + i * 33_333,
        });
        recorder.submit_samples(&[0u8; 1920], 48_000, 2);
        recorder.submit_samples(&[0u8; 1920], 48_000, 2);
        recorder.submit_samples(&[0u8; 1920], 48_000, 2);
        tokio::time::sleep(Duration::from_millis(33)).await;
    }

    recorder.stop().await?;
    println!("wrote mock_record.avmx");
    Ok(())
}
