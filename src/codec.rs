//! Encoder seam mirroring a hardware codec's buffer queues.

use std::time::Duration;

use crate::format::MediaFormat;
use crate::frame::VideoFrame;

#[derive(thiserror::Error, Eq, PartialEq, Clone, Debug)]
pub enum CodecError {
    #[error("No encoder available for {0}")]
    Unsupported(String),
    #[error("Failed to configure encoder: {0}")]
    Configure(String),
    #[error("Encoder is in the wrong state: {0}")]
    IllegalState(&'static str),
    #[error("Invalid buffer index {0}")]
    InvalidBuffer(usize),
    #[error("Encoder backend error: {0}")]
    Backend(String),
}

bitflags::bitflags! {
    /// Flags attached to an encoder input or output buffer.
    #[derive(Eq, PartialEq, Clone, Copy, Debug, Default, Hash)]
    pub struct BufferFlags: u32 {
        const KEY_FRAME = 1;
        const CODEC_CONFIG = 2;
        const END_OF_STREAM = 4;
    }
}

/// Metadata describing the valid byte range of an encoder output buffer.
#[derive(Eq, PartialEq, Clone, Copy, Debug, Default)]
pub struct BufferInfo {
    pub offset: usize,
    pub size: usize,
    pub presentation_time_us: i64,
    pub flags: BufferFlags,
}

impl BufferInfo {
    #[must_use]
    #[inline]
    pub const fn new(offset: usize, size: usize, presentation_time_us: i64, flags: BufferFlags) -> Self {
        Self { offset, size, presentation_time_us, flags }
    }

    #[must_use]
    #[inline]
    pub const fn is_end_of_stream(&self) -> bool {
        self.flags.contains(BufferFlags::END_OF_STREAM)
    }

    /// Byte range of the payload inside the encoder owned buffer, `None` if it overflows.
    #[must_use]
    #[inline]
    pub const fn range(&self) -> Option<std::ops::Range<usize>> {
        match self.offset.checked_add(self.size) {
            Some(end) => Some(self.offset..end),
            None => None,
        }
    }
}

/// Result of polling an encoder's output queue.
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum OutputStatus {
    /// Nothing is ready within the timeout.
    TryAgainLater,
    /// The encoder finalized its output format, see [`MediaEncoder::output_format`].
    FormatChanged,
    /// The set of output buffers was replaced.
    BuffersChanged,
    /// An encoded buffer is ready and stays owned by the encoder until released.
    Buffer { index: usize, info: BufferInfo },
    /// Any other negative status code reported by the backend.
    Unexpected(i32),
}

/// A hardware or software encoder driven through an input/output buffer queue.
///
/// All methods are called from the single execution context owning the stream, never
/// concurrently.
pub trait MediaEncoder: Send {
    fn configure(&mut self, format: &MediaFormat) -> Result<(), CodecError>;

    fn start(&mut self) -> Result<(), CodecError>;

    /// Hands a frame to the encoder's input surface.
    ///
    /// Surface rendering happens outside the pipeline, so the default does nothing.
    fn render_frame(&mut self, _frame: &VideoFrame) -> Result<(), CodecError> {
        Ok(())
    }

    /// Returns the index of a free input buffer, or `None` if none frees up within `timeout`.
    fn dequeue_input_buffer(&mut self, timeout: Duration) -> Option<usize>;

    fn input_buffer(&mut self, index: usize) -> Option<&mut [u8]>;

    /// Submits `len` bytes written to the input buffer at `index`.
    fn queue_input_buffer(
        &mut self,
        index: usize,
        len: usize,
        presentation_time_us: i64,
        flags: BufferFlags,
    ) -> Result<(), CodecError>;

    /// Ends the input of a surface fed encoder.
    fn signal_end_of_input_stream(&mut self) -> Result<(), CodecError>;

    fn dequeue_output_buffer(&mut self, timeout: Duration) -> OutputStatus;

    /// Number of output buffers in the current buffer set.
    fn output_buffer_count(&self) -> usize;

    fn output_buffer(&self, index: usize) -> Option<&[u8]>;

    fn output_format(&self) -> MediaFormat;

    /// Returns an output buffer to the encoder.
    fn release_output_buffer(&mut self, index: usize);

    fn stop(&mut self) -> Result<(), CodecError>;

    fn release(&mut self);
}

/// Creates encoders for resolved formats.
pub trait EncoderFactory: Send + Sync {
    /// Whether an encoder for `mime` can be created at all.
    fn supports(&self, mime: &str) -> bool;

    /// Creates an unconfigured encoder for `format`.
    fn create_encoder(&self, format: &MediaFormat) -> Result<Box<dyn MediaEncoder>, CodecError>;
}
