//! Per-stream codec drain engine.
//!
//! An [`EncoderStream`] owns one encoder and turns its state transitions into muxer
//! operations. It lives on its stream's execution context, so nothing in here is shared
//! except the [`MuxerGate`] and the statistics counters.

use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::codec::{BufferFlags, BufferInfo, CodecError, EncoderFactory, MediaEncoder, OutputStatus};
use crate::format::MediaFormat;
use crate::frame::{AudioSamples, VideoFrame};
use crate::muxer::{GateState, MuxerGate, MuxerGateError, StreamKind};
use crate::settings::{AudioEncoderConfig, VideoEncoderConfig};
use crate::timestamp::{AudioClock, PresentationRebase};

/// Output queue poll timeout.
pub const DRAIN_TIMEOUT: Duration = Duration::from_millis(10);
/// Input slots are only taken if one is free right now.
pub const INPUT_TIMEOUT: Duration = Duration::ZERO;
/// Upper bound on drain passes while flushing at teardown.
const MAX_FLUSH_PASSES: usize = 50;

/// Resolved encoder configuration of one stream.
#[derive(Eq, PartialEq, Clone, Debug)]
pub enum StreamConfig {
    Video(VideoEncoderConfig),
    Audio(AudioEncoderConfig),
}

impl StreamConfig {
    #[must_use]
    pub const fn kind(&self) -> StreamKind {
        match self {
            Self::Video(_) => StreamKind::Video,
            Self::Audio(_) => StreamKind::Audio,
        }
    }

    #[must_use]
    pub const fn mime(&self) -> &'static str {
        match self {
            Self::Video(config) => config.mime,
            Self::Audio(config) => config.mime,
        }
    }
}

/// Encoder lifecycle of a stream; the encoder is owned by the `Configured` and `Running`
/// states.
enum EncoderState {
    Uninitialized,
    Configured(Box<dyn MediaEncoder>),
    Running(Box<dyn MediaEncoder>),
    Stopped,
}

/// Observable phase of a stream's encoder.
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum EncoderPhase {
    Uninitialized,
    Configured,
    Running,
    Stopped,
}

/// Why a drain pass ended.
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum DrainOutcome {
    /// The encoder had nothing more to offer right now.
    Idle,
    /// This stream's track is registered but the muxer waits for the other stream; output
    /// stays queued inside the encoder.
    AwaitingMuxer,
    EndOfStream,
    /// A malformed output unit, a repeated format change or a muxer failure cut the pass
    /// short.
    Aborted,
    /// There is no running encoder to drain.
    NotRunning,
}

/// Counters shared between a stream and whoever observes it.
#[derive(Debug, Default)]
pub struct StreamCounters {
    submitted: AtomicU64,
    skipped: AtomicU64,
    written: AtomicU64,
    dropped: AtomicU64,
}

impl StreamCounters {
    #[must_use]
    pub fn snapshot(&self) -> StreamStats {
        StreamStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time statistics of one stream.
#[derive(Eq, PartialEq, Clone, Copy, Debug, Default)]
pub struct StreamStats {
    /// Units handed to the encoder.
    pub submitted: u64,
    /// Units dropped before reaching the encoder (backpressure, encoder unavailable).
    pub skipped: u64,
    /// Encoded samples written to the container.
    pub written: u64,
    /// Encoded samples dropped because the container had not started.
    pub dropped: u64,
}

/// One stream's encoder plus the state needed to feed and drain it.
pub struct EncoderStream {
    config: StreamConfig,
    factory: Arc<dyn EncoderFactory>,
    gate: Arc<MuxerGate>,
    state: EncoderState,
    track: Option<usize>,
    output_buffers: usize,
    rebase: PresentationRebase,
    audio_clock: Option<AudioClock>,
    running: bool,
    counters: Arc<StreamCounters>,
}

impl EncoderStream {
    #[must_use]
    pub fn new(config: StreamConfig, factory: Arc<dyn EncoderFactory>, gate: Arc<MuxerGate>) -> Self {
        Self {
            config,
            factory,
            gate,
            state: EncoderState::Uninitialized,
            track: None,
            output_buffers: 0,
            rebase: PresentationRebase::new(),
            audio_clock: None,
            running: true,
            counters: Arc::new(StreamCounters::default()),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> StreamKind {
        self.config.kind()
    }

    #[must_use]
    pub const fn state(&self) -> EncoderPhase {
        match self.state {
            EncoderState::Uninitialized => EncoderPhase::Uninitialized,
            EncoderState::Configured(_) => EncoderPhase::Configured,
            EncoderState::Running(_) => EncoderPhase::Running,
            EncoderState::Stopped => EncoderPhase::Stopped,
        }
    }

    /// `false` once end of stream was observed on the encoder output.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// Container track of this stream, once its output format was registered.
    #[must_use]
    pub const fn track(&self) -> Option<usize> {
        self.track
    }

    #[must_use]
    pub fn counters(&self) -> Arc<StreamCounters> {
        self.counters.clone()
    }

    #[must_use]
    pub fn stats(&self) -> StreamStats {
        self.counters.snapshot()
    }

    /// Feeds one frame already rendered to the encoder's input surface, then drains.
    pub fn submit_video(&mut self, frame: &VideoFrame) {
        if matches!(self.state, EncoderState::Uninitialized) {
            let StreamConfig::Video(config) = &self.config else {
                error!(kind = %self.kind(), "Video frame submitted to a non-video stream");
                StreamCounters::bump(&self.counters.skipped);
                return;
            };
            let format = config.to_format(frame.rotated_width(), frame.rotated_height());
            self.initialize(&format);
        }

        let EncoderState::Running(encoder) = &mut self.state else {
            StreamCounters::bump(&self.counters.skipped);
            return;
        };
        if let Err(err) = encoder.render_frame(frame) {
            error!(%err, "Failed to hand frame to encoder input surface");
            StreamCounters::bump(&self.counters.skipped);
            return;
        }
        StreamCounters::bump(&self.counters.submitted);

        self.drain();
    }

    /// Copies one PCM buffer into a free encoder input slot, then drains.
    ///
    /// Without a free slot the buffer is skipped; the drain still runs.
    pub fn submit_audio(&mut self, samples: &AudioSamples) {
        if matches!(self.state, EncoderState::Uninitialized) {
            let StreamConfig::Audio(config) = &self.config else {
                error!(kind = %self.kind(), "Audio samples submitted to a non-audio stream");
                StreamCounters::bump(&self.counters.skipped);
                return;
            };
            let bytes_per_frame = samples.channel_count().checked_mul(config.bits_per_sample / 8).unwrap_or(0);
            if bytes_per_frame == 0 || samples.sample_rate() == 0 {
                error!(
                    channels = samples.channel_count(),
                    sample_rate = samples.sample_rate(),
                    "Cannot start audio encoder for an empty sample layout"
                );
                StreamCounters::bump(&self.counters.skipped);
                return;
            }
            let format = config.to_format(samples.sample_rate(), samples.channel_count());
            self.audio_clock = Some(AudioClock::new(samples.sample_rate(), bytes_per_frame));
            self.initialize(&format);
        }

        self.queue_audio(samples.data());
        self.drain();
    }

    fn queue_audio(&mut self, data: &[u8]) {
        let (EncoderState::Running(encoder), Some(clock)) = (&mut self.state, self.audio_clock.as_mut())
        else {
            StreamCounters::bump(&self.counters.skipped);
            return;
        };

        let Some(index) = encoder.dequeue_input_buffer(INPUT_TIMEOUT) else {
            debug!(len = data.len(), "No free audio input buffer, skipping samples");
            StreamCounters::bump(&self.counters.skipped);
            return;
        };
        let Some(slot) = encoder.input_buffer(index) else {
            error!(index, "Encoder returned an invalid input buffer");
            StreamCounters::bump(&self.counters.skipped);
            return;
        };

        let len = data.len().min(slot.len());
        if len < data.len() {
            warn!(len = data.len(), capacity = slot.len(), "Audio input buffer too small, truncating");
        }
        slot[..len].copy_from_slice(&data[..len]);

        let pts = clock.stamp(len);
        match encoder.queue_input_buffer(index, len, pts, BufferFlags::empty()) {
            Ok(()) => StreamCounters::bump(&self.counters.submitted),
            Err(err) => {
                error!(%err, "Failed to queue audio input buffer");
                StreamCounters::bump(&self.counters.skipped);
            }
        }
    }

    /// `Uninitialized -> Configured -> Running`; any failure leaves the stream `Stopped`.
    fn initialize(&mut self, format: &MediaFormat) {
        let kind = self.kind();
        match self.create_encoder(format) {
            Ok(()) => info!(%kind, %format, "Encoder started"),
            Err(err) => {
                error!(%kind, %err, "Failed to start encoder, stream disabled");
                self.state = EncoderState::Stopped;
                self.running = false;
            }
        }
    }

    fn create_encoder(&mut self, format: &MediaFormat) -> Result<(), CodecError> {
        let mut encoder = self.factory.create_encoder(format)?;
        if let Err(err) = encoder.configure(format) {
            encoder.release();
            return Err(err);
        }
        self.state = EncoderState::Configured(encoder);

        match mem::replace(&mut self.state, EncoderState::Stopped) {
            EncoderState::Configured(mut encoder) => {
                if let Err(err) = encoder.start() {
                    encoder.release();
                    return Err(err);
                }
                self.output_buffers = encoder.output_buffer_count();
                self.state = EncoderState::Running(encoder);
                Ok(())
            }
            other => {
                self.state = other;
                Err(CodecError::IllegalState("encoder is not configured"))
            }
        }
    }

    /// Polls the encoder output queue until nothing more is immediately available.
    pub fn drain(&mut self) -> DrainOutcome {
        let kind = self.kind();
        let Self { state, gate, track, output_buffers, rebase, running, counters, .. } = self;
        let EncoderState::Running(encoder) = state else {
            return DrainOutcome::NotRunning;
        };

        loop {
            if track.is_some() && gate.state() == GateState::Unstarted {
                return DrainOutcome::AwaitingMuxer;
            }

            match encoder.dequeue_output_buffer(DRAIN_TIMEOUT) {
                OutputStatus::TryAgainLater => return DrainOutcome::Idle,
                OutputStatus::BuffersChanged => {
                    *output_buffers = encoder.output_buffer_count();
                    warn!(%kind, buffers = *output_buffers, "Encoder output buffers changed");
                }
                OutputStatus::FormatChanged => {
                    let format = encoder.output_format();
                    if track.is_some() {
                        error!(%kind, %format, "Encoder output format changed again after track registration");
                        return DrainOutcome::Aborted;
                    }
                    info!(%kind, %format, "Encoder output format changed");
                    match gate.register_track(kind, &format) {
                        Ok(registered) => *track = Some(registered),
                        Err(err) => {
                            error!(%kind, %err, "Failed to register container track");
                            return DrainOutcome::Aborted;
                        }
                    }
                }
                OutputStatus::Unexpected(status) => {
                    error!(%kind, status, "Unexpected result from dequeue_output_buffer");
                }
                OutputStatus::Buffer { index, info } => {
                    let result = if index < *output_buffers {
                        write_output(kind, &**encoder, gate, *track, rebase, index, &info)
                    } else {
                        Err(OutputError::NullBuffer)
                    };
                    encoder.release_output_buffer(index);

                    match result {
                        Ok(Written::Yes) => StreamCounters::bump(&counters.written),
                        Ok(Written::Dropped) => StreamCounters::bump(&counters.dropped),
                        Ok(Written::Empty) => {}
                        Err(err) => {
                            error!(%kind, index, %err, "Failed to handle encoder output buffer");
                            return DrainOutcome::Aborted;
                        }
                    }

                    if info.is_end_of_stream() {
                        debug!(%kind, "End of stream reached");
                        *running = false;
                        return DrainOutcome::EndOfStream;
                    }
                }
            }
        }
    }

    /// Flushes and releases the encoder; a stream that never created one is just marked
    /// stopped. Later calls do nothing.
    pub fn teardown(&mut self) {
        let kind = self.kind();
        match mem::replace(&mut self.state, EncoderState::Stopped) {
            EncoderState::Running(encoder) => {
                self.state = EncoderState::Running(encoder);
                self.flush();

                if let EncoderState::Running(mut encoder) = mem::replace(&mut self.state, EncoderState::Stopped) {
                    if let Err(err) = encoder.stop() {
                        error!(%kind, %err, "Failed to stop encoder");
                    }
                    encoder.release();
                }
                info!(%kind, stats = ?self.stats(), "Encoder released");
            }
            EncoderState::Configured(mut encoder) => {
                encoder.release();
                info!(%kind, "Encoder released before start");
            }
            EncoderState::Uninitialized => debug!(%kind, "No encoder to release"),
            EncoderState::Stopped => {}
        }
        self.running = false;
    }

    /// Signals end of input and drains what the encoder still holds, waiting a bounded time
    /// for the container to start if it has not yet.
    fn flush(&mut self) {
        let kind = self.kind();
        if !self.running {
            return;
        }

        if let EncoderState::Running(encoder) = &mut self.state {
            let signalled = match kind {
                StreamKind::Video => encoder.signal_end_of_input_stream(),
                StreamKind::Audio => {
                    let pts = self.audio_clock.map_or(0, |clock| clock.now_us());
                    match encoder.dequeue_input_buffer(DRAIN_TIMEOUT) {
                        Some(index) => encoder.queue_input_buffer(index, 0, pts, BufferFlags::END_OF_STREAM),
                        None => Err(CodecError::IllegalState("no input buffer for end of stream")),
                    }
                }
            };
            if let Err(err) = signalled {
                warn!(%kind, %err, "Failed to signal end of input");
            }
        }

        for pass in 1..=MAX_FLUSH_PASSES {
            match self.drain() {
                DrainOutcome::Idle => {}
                // The other stream may still be about to register its track.
                DrainOutcome::AwaitingMuxer if pass < MAX_FLUSH_PASSES => thread::sleep(DRAIN_TIMEOUT),
                DrainOutcome::AwaitingMuxer => {
                    info!(%kind, "Container never started, discarding remaining encoder output");
                }
                DrainOutcome::EndOfStream | DrainOutcome::Aborted | DrainOutcome::NotRunning => break,
            }
        }
    }
}

#[derive(thiserror::Error, Debug)]
enum OutputError {
    #[error("Encoder returned a null output buffer")]
    NullBuffer,
    #[error("Sample range {offset}+{size} exceeds output buffer of {capacity} bytes")]
    InvalidRange { offset: usize, size: usize, capacity: usize },
    #[error(transparent)]
    Mux(#[from] MuxerGateError),
}

enum Written {
    Yes,
    Dropped,
    Empty,
}

/// Normalizes and writes one encoded buffer. The caller releases the buffer afterwards.
fn write_output(
    kind: StreamKind,
    encoder: &dyn MediaEncoder,
    gate: &MuxerGate,
    track: Option<usize>,
    rebase: &mut PresentationRebase,
    index: usize,
    info: &BufferInfo,
) -> Result<Written, OutputError> {
    let buffer = encoder.output_buffer(index).ok_or(OutputError::NullBuffer)?;
    let data = info.range().and_then(|range| buffer.get(range)).ok_or(OutputError::InvalidRange {
        offset: info.offset,
        size: info.size,
        capacity: buffer.len(),
    })?;

    let presentation_time_us = match kind {
        StreamKind::Video => rebase.rebase(info.presentation_time_us),
        StreamKind::Audio => info.presentation_time_us,
    };
    if data.is_empty() {
        return Ok(Written::Empty);
    }
    let Some(track) = track else {
        return Ok(Written::Dropped);
    };

    let sample = BufferInfo { offset: 0, presentation_time_us, ..*info };
    if gate.write(track, data, &sample)? { Ok(Written::Yes) } else { Ok(Written::Dropped) }
}
