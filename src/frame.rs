//! Video frames and audio sample buffers.

/// Clockwise rotation already applied to a captured frame.
#[derive(Eq, PartialEq, Clone, Copy, Debug, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Returns `None` for anything that is not a multiple of 90 in `0..360`.
    #[must_use]
    #[inline]
    pub const fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees {
            0 => Some(Self::Deg0),
            90 => Some(Self::Deg90),
            180 => Some(Self::Deg180),
            270 => Some(Self::Deg270),
            _ => None,
        }
    }

    #[must_use]
    #[inline]
    pub const fn degrees(self) -> u32 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    #[must_use]
    #[inline]
    pub const fn swaps_dimensions(self) -> bool {
        matches!(self, Self::Deg90 | Self::Deg270)
    }
}

/// A captured video frame.
///
/// The pixels themselves never pass through the pipeline: by the time the frame is submitted
/// it has been drawn onto the encoder's input surface, so only its geometry and capture time
/// travel with it.
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub struct VideoFrame {
    width: u32,
    height: u32,
    rotation: Rotation,
    timestamp_ns: i64,
}

impl VideoFrame {
    #[must_use]
    #[inline]
    pub const fn new(width: u32, height: u32, rotation: Rotation, timestamp_ns: i64) -> Self {
        Self { width, height, rotation, timestamp_ns }
    }

    #[must_use]
    #[inline]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    #[inline]
    pub const fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    #[inline]
    pub const fn rotation(&self) -> Rotation {
        self.rotation
    }

    #[must_use]
    #[inline]
    pub const fn timestamp_ns(&self) -> i64 {
        self.timestamp_ns
    }

    /// Width of the frame as it will be encoded.
    #[must_use]
    #[inline]
    pub const fn rotated_width(&self) -> u32 {
        if self.rotation.swaps_dimensions() { self.height } else { self.width }
    }

    /// Height of the frame as it will be encoded.
    #[must_use]
    #[inline]
    pub const fn rotated_height(&self) -> u32 {
        if self.rotation.swaps_dimensions() { self.width } else { self.height }
    }
}

/// A buffer of interleaved PCM samples from the audio input device.
#[derive(Eq, PartialEq, Clone, Debug)]
pub struct AudioSamples {
    data: Vec<u8>,
    channel_count: u32,
    sample_rate: u32,
    bits_per_sample: u32,
}

impl AudioSamples {
    /// Creates a buffer of 16-bit PCM samples.
    #[must_use]
    #[inline]
    pub const fn new(data: Vec<u8>, channel_count: u32, sample_rate: u32) -> Self {
        Self { data, channel_count, sample_rate, bits_per_sample: 16 }
    }

    #[must_use]
    #[inline]
    pub fn with_bits_per_sample(mut self, bits_per_sample: u32) -> Self {
        self.bits_per_sample = bits_per_sample;
        self
    }

    #[must_use]
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    #[inline]
    pub const fn channel_count(&self) -> u32 {
        self.channel_count
    }

    #[must_use]
    #[inline]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[must_use]
    #[inline]
    pub const fn bits_per_sample(&self) -> u32 {
        self.bits_per_sample
    }

    /// Bytes per interleaved sample frame (channels * bytes per sample), `0` if the layout
    /// does not fit in a `u32`.
    #[must_use]
    #[inline]
    pub const fn bytes_per_frame(&self) -> u32 {
        match self.channel_count.checked_mul(self.bits_per_sample / 8) {
            Some(bytes) => bytes,
            None => 0,
        }
    }

    #[must_use]
    #[inline]
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotated_dimensions_swap_for_quarter_turns() {
        let frame = VideoFrame::new(640, 480, Rotation::Deg90, 0);
        assert_eq!((frame.rotated_width(), frame.rotated_height()), (480, 640));

        let frame = VideoFrame::new(640, 480, Rotation::Deg180, 0);
        assert_eq!((frame.rotated_width(), frame.rotated_height()), (640, 480));
    }

    #[test]
    fn rotation_from_degrees() {
        assert_eq!(Rotation::from_degrees(270), Some(Rotation::Deg270));
        assert_eq!(Rotation::from_degrees(45), None);
        assert_eq!(Rotation::Deg90.degrees(), 90);
    }

    #[test]
    fn bytes_per_frame_counts_channels() {
        let samples = AudioSamples::new(vec![0; 960], 2, 48_000);
        assert_eq!(samples.bytes_per_frame(), 4);
        assert_eq!(samples.with_bits_per_sample(8).bytes_per_frame(), 2);
        assert_eq!(AudioSamples::new(Vec::new(), u32::MAX, 48_000).bytes_per_frame(), 0);
    }
}
