//! Audio timestamp correction.
//!
//! Capture callbacks deliver PCM in bursts whose wall-clock arrival times
//! jitter, while the byte count is exact. [`AudioTimestamp`] derives smooth
//! presentation timestamps from the byte count anchored at a wall-clock base,
//! and re-anchors when the capture source stalls long enough that the derived
//! clock would drift visibly behind real time.

/// Derives presentation timestamps for audio batches from their byte counts.
#[derive(Debug)]
pub struct AudioTimestamp {
    byte_rate: u32,
    base_time_us: i64,
    bytes_since_base: u64,
    gap_us: i64,
    started: bool,
}

impl AudioTimestamp {
    /// Creates a corrector for a stream of `byte_rate` bytes per second.
    ///
    /// For interleaved 16-bit PCM, `byte_rate = sample_rate * channels * 2`.
    pub fn new(byte_rate: u32) -> Self {
        Self {
            byte_rate,
            base_time_us: 0,
            bytes_since_base: 0,
            gap_us: 0,
            started: false,
        }
    }

    /// Returns the corrected start timestamp for a batch of `read_bytes`
    /// that finished arriving at wall-clock time `end_time_us`.
    ///
    /// When the batch starts more than twice its own duration after the
    /// position the byte clock predicts, the source is considered stalled:
    /// the base re-anchors at the batch's real start time and the skipped
    /// interval is remembered as a gap (see [`gap_count`](Self::gap_count)).
    pub fn correct(&mut self, read_bytes: usize, end_time_us: i64) -> i64 {
        let duration_us = bytes_to_us(read_bytes as u64, self.byte_rate);
        let start_time_us = end_time_us - duration_us;

        if !self.started {
            self.started = true;
            self.base_time_us = start_time_us;
            self.bytes_since_base = read_bytes as u64;
            self.gap_us = 0;
            return start_time_us;
        }

        let expected_us = self.base_time_us + bytes_to_us(self.bytes_since_base, self.byte_rate);
        let correction_us = start_time_us - expected_us;
        if correction_us >= 2 * duration_us {
            // Source stalled. Re-anchor and remember the hole.
            self.base_time_us = start_time_us;
            self.bytes_since_base = read_bytes as u64;
            self.gap_us = correction_us;
            start_time_us
        } else {
            self.gap_us = 0;
            self.bytes_since_base += read_bytes as u64;
            expected_us
        }
    }

    /// Number of whole silent frames of `frame_bytes` that fit in the gap
    /// detected by the last [`correct`](Self::correct) call. Zero when the
    /// last batch was contiguous.
    pub fn gap_count(&self, frame_bytes: usize) -> usize {
        if self.gap_us == 0 {
            return 0;
        }
        let frame_us = bytes_to_us(frame_bytes as u64, self.byte_rate);
        if frame_us == 0 {
            return 0;
        }
        (self.gap_us / frame_us) as usize
    }

    /// Timestamp at which gap filler frames should start, given the end
    /// timestamp of the last batch delivered before the gap.
    pub fn gap_start_us(&self, last_end_us: i64) -> i64 {
        last_end_us
    }

    /// Duration in microseconds of `bytes` at this corrector's byte rate.
    pub fn duration_us(&self, bytes: usize) -> i64 {
        bytes_to_us(bytes as u64, self.byte_rate)
    }
}

fn bytes_to_us(bytes: u64, byte_rate: u32) -> i64 {
    (1_000_000 * bytes / byte_rate as u64) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    // 16 kHz mono 16-bit: 32000 bytes/s, so 640 bytes = 20 ms.
    const BYTE_RATE: u32 = 32_000;
    const BATCH: usize = 640;
    const BATCH_US: i64 = 20_000;

    #[test]
    fn test_first_batch_anchors_base() {
        let mut ts = AudioTimestamp::new(BYTE_RATE);
        let t = ts.correct(BATCH, 1_020_000);
        assert_eq!(t, 1_000_000);
    }

    #[test]
    fn test_contiguous_batches_follow_byte_clock() {
        let mut ts = AudioTimestamp::new(BYTE_RATE);
        let t0 = ts.correct(BATCH, 1_020_000);
        // Arrival jitters by a few ms but the byte clock smooths it out.
        let t1 = ts.correct(BATCH, 1_020_000 + BATCH_US + 3_000);
        let t2 = ts.correct(BATCH, 1_020_000 + 2 * BATCH_US - 2_000);
        assert_eq!(t1, t0 + BATCH_US);
        assert_eq!(t2, t0 + 2 * BATCH_US);
        assert_eq!(ts.gap_count(BATCH), 0);
    }

    #[test]
    fn test_stall_re_anchors_and_reports_gap() {
        let mut ts = AudioTimestamp::new(BYTE_RATE);
        let t0 = ts.correct(BATCH, 1_020_000);
        // Next batch arrives 100 ms late: 5 batch durations of silence.
        let late_end = 1_020_000 + 100_000 + BATCH_US;
        let t1 = ts.correct(BATCH, late_end);
        assert_eq!(t1, late_end - BATCH_US);
        assert!(t1 > t0 + BATCH_US);
        assert_eq!(ts.gap_count(BATCH), 5);
        assert_eq!(ts.gap_start_us(t0), t0);
    }

    #[test]
    fn test_gap_clears_after_contiguous_batch() {
        let mut ts = AudioTimestamp::new(BYTE_RATE);
        ts.correct(BATCH, 1_020_000);
        ts.correct(BATCH, 1_020_000 + 100_000 + BATCH_US);
        assert!(ts.gap_count(BATCH) > 0);
        ts.correct(BATCH, 1_020_000 + 100_000 + 2 * BATCH_US);
        assert_eq!(ts.gap_count(BATCH), 0);
    }

    #[test]
    fn test_small_jitter_does_not_reset() {
        let mut ts = AudioTimestamp::new(BYTE_RATE);
        let t0 = ts.correct(BATCH, 1_020_000);
        // Arrives one batch late, which is under the 2x threshold.
        let t1 = ts.correct(BATCH, 1_020_000 + BATCH_US + 30_000);
        assert_eq!(t1, t0 + BATCH_US);
        assert_eq!(ts.gap_count(BATCH), 0);
    }
}
