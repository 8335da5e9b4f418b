//! A framed file container writer.
//!
//! Writes a simple length-prefixed sample log rather than a standards
//! container: a fixed header, a track table, then one framed record per
//! sample. The sample count lives at a fixed header offset and is patched in
//! by seeking back during [`stop`](crate::ContainerWriter::stop), so a file
//! that was not finalized is detectable by its zero count.
//!
//! The format is meant for debugging and demos; production deployments plug
//! in their own [`ContainerWriter`] for MP4, Matroska or streaming targets.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::buffer::SampleInfo;
use crate::config::TrackFormat;
use crate::error::WriterError;
use crate::writer::ContainerWriter;

const MAGIC: &[u8; 4] = b"AVMX";
const VERSION: u16 = 1;
// magic + version; the u32 sample count is patched here on stop.
const SAMPLE_COUNT_OFFSET: u64 = 6;

const FLAG_KEY_FRAME: u32 = 1;
const FLAG_CODEC_CONFIG: u32 = 2;
const FLAG_END_OF_STREAM: u32 = 4;

enum State {
    Collecting { tracks: Vec<TrackFormat> },
    Writing { file: BufWriter<File>, sample_count: u32 },
    Finished,
}

/// [`ContainerWriter`] that logs samples to a framed file.
pub struct FileContainerWriter {
    path: PathBuf,
    state: State,
}

impl FileContainerWriter {
    /// Creates a writer that will produce its file at `path` on start.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            state: State::Collecting { tracks: Vec::new() },
        }
    }

    /// The output path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> WriterError {
        WriterError::io(&self.path, source)
    }
}

fn write_track(file: &mut impl Write, format: &TrackFormat) -> std::io::Result<()> {
    match format {
        TrackFormat::Video {
            mime,
            width,
            height,
            frame_rate,
            bit_rate,
        } => {
            file.write_all(&[0u8])?;
            write_mime(file, mime)?;
            file.write_all(&width.to_le_bytes())?;
            file.write_all(&height.to_le_bytes())?;
            file.write_all(&frame_rate.to_le_bytes())?;
            file.write_all(&bit_rate.to_le_bytes())?;
        }
        TrackFormat::Audio {
            mime,
            sample_rate,
            channels,
            bit_rate,
        } => {
            file.write_all(&[1u8])?;
            write_mime(file, mime)?;
            file.write_all(&sample_rate.to_le_bytes())?;
            file.write_all(&channels.to_le_bytes())?;
            file.write_all(&bit_rate.to_le_bytes())?;
        }
    }
    Ok(())
}

fn write_mime(file: &mut impl Write, mime: &str) -> std::io::Result<()> {
    let bytes = mime.as_bytes();
    let len = bytes.len().min(u16::MAX as usize) as u16;
    file.write_all(&len.to_le_bytes())?;
    file.write_all(&bytes[..len as usize])
}

impl ContainerWriter for FileContainerWriter {
    fn add_track(&mut self, format: &TrackFormat) -> Result<usize, WriterError> {
        match &mut self.state {
            State::Collecting { tracks } => {
                tracks.push(format.clone());
                Ok(tracks.len() - 1)
            }
            _ => Err(WriterError::AlreadyStarted),
        }
    }

    fn start(&mut self) -> Result<(), WriterError> {
        let tracks = match std::mem::replace(&mut self.state, State::Finished) {
            State::Collecting { tracks } => tracks,
            state => {
                self.state = state;
                return Err(WriterError::AlreadyStarted);
            }
        };
        let file = File::create(&self.path).map_err(|e| self.io_err(e))?;
        let mut file = BufWriter::new(file);
        let header = || -> std::io::Result<()> {
            file.write_all(MAGIC)?;
            file.write_all(&VERSION.to_le_bytes())?;
            file.write_all(&0u32.to_le_bytes())?;
            file.write_all(&(tracks.len() as u16).to_le_bytes())?;
            for track in &tracks {
                write_track(&mut file, track)?;
            }
            Ok(())
        }();
        header.map_err(|e| WriterError::io(&self.path, e))?;
        self.state = State::Writing {
            file,
            sample_count: 0,
        };
        Ok(())
    }

    fn write_sample(
        &mut self,
        track_index: usize,
        data: &[u8],
        info: &SampleInfo,
    ) -> Result<(), WriterError> {
        let path = self.path.clone();
        match &mut self.state {
            State::Writing { file, sample_count } => {
                let mut flags = 0u32;
                if info.flags.key_frame {
                    flags |= FLAG_KEY_FRAME;
                }
                if info.flags.codec_config {
                    flags |= FLAG_CODEC_CONFIG;
                }
                if info.flags.end_of_stream {
                    flags |= FLAG_END_OF_STREAM;
                }
                let record = || -> std::io::Result<()> {
                    file.write_all(&(track_index as u32).to_le_bytes())?;
                    file.write_all(&info.timestamp_us.to_le_bytes())?;
                    file.write_all(&flags.to_le_bytes())?;
                    file.write_all(&(data.len() as u32).to_le_bytes())?;
                    file.write_all(data)
                }();
                record.map_err(|e| WriterError::io(&path, e))?;
                *sample_count += 1;
                Ok(())
            }
            _ => Err(WriterError::NotStarted),
        }
    }

    fn stop(&mut self) -> Result<(), WriterError> {
        let (file, sample_count) = match std::mem::replace(&mut self.state, State::Finished) {
            State::Writing { file, sample_count } => (file, sample_count),
            state => {
                self.state = state;
                return Err(WriterError::NotStarted);
            }
        };
        let mut file = file.into_inner().map_err(|e| self.io_err(e.into_error()))?;
        file.seek(SeekFrom::Start(SAMPLE_COUNT_OFFSET))
            .map_err(|e| self.io_err(e))?;
        file.write_all(&sample_count.to_le_bytes())
            .map_err(|e| self.io_err(e))?;
        file.sync_all().map_err(|e| self.io_err(e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::SampleFlags;
    use crate::config::{AudioConfig, VideoConfig};

    #[test]
    fn test_header_and_sample_count_patched_on_stop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.avmx");
        let mut writer = FileContainerWriter::new(&path);

        let video = VideoConfig::default().to_format(640, 480);
        let audio = AudioConfig::default().to_format(48000, 2);
        assert_eq!(writer.add_track(&video).unwrap(), 0);
        assert_eq!(writer.add_track(&audio).unwrap(), 1);
        writer.start().unwrap();

        let info = SampleInfo {
            size: 4,
            timestamp_us: 1000,
            flags: SampleFlags {
                key_frame: true,
                ..Default::default()
            },
        };
        writer.write_sample(0, &[1, 2, 3, 4], &info).unwrap();
        writer.write_sample(1, &[5, 6], &info).unwrap();
        writer.stop().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], MAGIC);
        assert_eq!(u16::from_le_bytes([bytes[4], bytes[5]]), VERSION);
        let count = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);
        assert_eq!(count, 2);
        let track_count = u16::from_le_bytes([bytes[10], bytes[11]]);
        assert_eq!(track_count, 2);
    }

    #[test]
    fn test_rejects_tracks_after_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.avmx");
        let mut writer = FileContainerWriter::new(&path);
        writer
            .add_track(&AudioConfig::default().to_format(44100, 1))
            .unwrap();
        writer.start().unwrap();
        assert!(matches!(
            writer.add_track(&AudioConfig::default().to_format(44100, 1)),
            Err(WriterError::AlreadyStarted)
        ));
    }

    #[test]
    fn test_write_before_start_fails() {
        let mut writer = FileContainerWriter::new("/nonexistent/out.avmx");
        let info = SampleInfo::end_of_stream(0);
        assert!(matches!(
            writer.write_sample(0, &[], &info),
            Err(WriterError::NotStarted)
        ));
    }
}
