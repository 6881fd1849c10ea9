//! Presentation timestamp normalization.
//!
//! Video timestamps come from the encoder's device clock and are rebased so the stream reads
//! from zero. Audio timestamps never touch a clock at all: they are derived from the number of
//! PCM bytes submitted so far, which keeps them monotonic regardless of scheduling jitter.
//! The two streams are not cross-synchronized.

/// Rebases a stream's timestamps against its first non-zero timestamp.
#[derive(Eq, PartialEq, Clone, Copy, Debug, Default)]
pub struct PresentationRebase {
    start: i64,
}

impl PresentationRebase {
    #[must_use]
    #[inline]
    pub const fn new() -> Self {
        Self { start: 0 }
    }

    /// Captures the stream start on the first non-zero timestamp and returns `pts - start`.
    ///
    /// A leading sample stamped exactly 0 does not set the start, so it stays at 0.
    #[inline]
    pub const fn rebase(&mut self, pts: i64) -> i64 {
        if self.start == 0 && pts != 0 {
            self.start = pts;
        }
        pts - self.start
    }

    /// The captured stream start, `None` until a non-zero timestamp was seen.
    #[must_use]
    #[inline]
    pub const fn start(&self) -> Option<i64> {
        if self.start == 0 { None } else { Some(self.start) }
    }
}

/// Sample-count driven audio clock in microseconds.
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub struct AudioClock {
    sample_rate: u32,
    bytes_per_frame: u32,
    bytes_submitted: u64,
}

impl AudioClock {
    /// `bytes_per_frame` is the size of one interleaved sample frame (channels * bytes per
    /// sample).
    #[must_use]
    #[inline]
    pub const fn new(sample_rate: u32, bytes_per_frame: u32) -> Self {
        Self { sample_rate, bytes_per_frame, bytes_submitted: 0 }
    }

    /// Timestamp of the next byte to be submitted.
    #[must_use]
    #[inline]
    pub const fn now_us(&self) -> i64 {
        let divisor = self.sample_rate as u128 * self.bytes_per_frame as u128;
        if divisor == 0 {
            return 0;
        }
        ((self.bytes_submitted as u128 * 1_000_000) / divisor) as i64
    }

    /// Returns the timestamp for a buffer of `len` bytes, then advances past it.
    #[inline]
    pub const fn stamp(&mut self, len: usize) -> i64 {
        let pts = self.now_us();
        self.bytes_submitted = self.bytes_submitted.saturating_add(len as u64);
        pts
    }

    #[must_use]
    #[inline]
    pub const fn bytes_submitted(&self) -> u64 {
        self.bytes_submitted
    }

    #[must_use]
    #[inline]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[must_use]
    #[inline]
    pub const fn bytes_per_frame(&self) -> u32 {
        self.bytes_per_frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_non_zero_timestamp_becomes_zero() {
        let mut rebase = PresentationRebase::new();
        assert_eq!(rebase.rebase(5_000_000), 0);
        assert_eq!(rebase.rebase(5_033_333), 33_333);
        assert_eq!(rebase.start(), Some(5_000_000));
    }

    #[test]
    fn leading_zero_keeps_baseline() {
        let mut rebase = PresentationRebase::new();
        assert_eq!(rebase.rebase(0), 0);
        assert_eq!(rebase.start(), None);
        assert_eq!(rebase.rebase(40_000), 0);
        assert_eq!(rebase.rebase(73_333), 33_333);
    }

    #[test]
    fn audio_clock_matches_cumulative_formula() {
        // 48 kHz mono PCM16: 1_000_000 / 48_000 / 2 us per byte.
        let mut clock = AudioClock::new(48_000, 2);
        let sizes = [960usize, 480, 1000, 7, 960];
        let mut total = 0u64;
        let mut last = -1;
        for size in sizes {
            let expected = (total * 1_000_000 / (48_000 * 2)) as i64;
            let pts = clock.stamp(size);
            assert_eq!(pts, expected);
            assert!(pts >= last);
            last = pts;
            total += size as u64;
        }
        assert_eq!(clock.bytes_submitted(), total);
        assert_eq!(clock.now_us(), (total * 1_000_000 / 96_000) as i64);
    }

    #[test]
    fn ten_ms_of_stereo_advances_ten_ms() {
        let mut clock = AudioClock::new(44_100, 4);
        assert_eq!(clock.stamp(441 * 4), 0);
        assert_eq!(clock.now_us(), 10_000);
    }
}
