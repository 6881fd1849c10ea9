//! Container writer seam and the shared muxer gate.

use std::fmt;

use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::codec::BufferInfo;
use crate::format::MediaFormat;

#[derive(thiserror::Error, Debug)]
pub enum MuxError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Track {0} does not exist")]
    UnknownTrack(usize),
    #[error("Container writer is in the wrong state: {0}")]
    IllegalState(&'static str),
    #[error("Unsupported track format: {0}")]
    UnsupportedFormat(String),
}

/// An existing container multiplexer, e.g. an MP4 writer.
///
/// Tracks are added before `start`, samples are written after it, and `stop` finalizes the
/// file. Implementations only ever see calls serialized by [`MuxerGate`].
pub trait ContainerWriter: Send {
    /// Adds a track described by the encoder's output format and returns its index.
    fn add_track(&mut self, format: &MediaFormat) -> Result<usize, MuxError>;

    fn start(&mut self) -> Result<(), MuxError>;

    /// Copies one encoded sample into the container.
    fn write_sample(&mut self, track: usize, data: &[u8], info: &BufferInfo) -> Result<(), MuxError>;

    fn stop(&mut self) -> Result<(), MuxError>;

    /// Frees any remaining resources after `stop`.
    fn release(&mut self) {}
}

/// One independently encoded media channel.
#[derive(Eq, PartialEq, Clone, Copy, Debug, Hash)]
pub enum StreamKind {
    Video,
    Audio,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => f.write_str("video"),
            Self::Audio => f.write_str("audio"),
        }
    }
}

/// Lifecycle of the shared container writer.
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum GateState {
    /// Waiting for every expected stream to register its track.
    Unstarted,
    Started,
    /// Finalized, terminal.
    Stopped,
}

#[derive(thiserror::Error, Debug)]
pub enum MuxerGateError {
    #[error("The {0} stream is not part of this recording")]
    UnexpectedStream(StreamKind),
    #[error("The {0} stream already registered a track")]
    DuplicateRegistration(StreamKind),
    #[error("Track {0} was never registered")]
    UnknownTrack(usize),
    #[error("The muxer has already been finalized")]
    Stopped,
    #[error("Container writer failed to start: {0}")]
    StartFailed(String),
    #[error("Container writer error: {0}")]
    WriterError(#[from] MuxError),
}

struct GateInner {
    writer: Option<Box<dyn ContainerWriter>>,
    state: GateState,
    tracks: Vec<(StreamKind, usize)>,
    start_failure: Option<String>,
}

/// Shared, lazily started container writer.
///
/// Every expected stream registers exactly one track, in any order. The writer starts on the
/// last registration, accepts samples only while started and is finalized exactly once.
pub struct MuxerGate {
    expected: Vec<StreamKind>,
    inner: Mutex<GateInner>,
}

impl MuxerGate {
    #[must_use]
    pub fn new(writer: Box<dyn ContainerWriter>, expected: &[StreamKind]) -> Self {
        let mut streams = Vec::with_capacity(expected.len());
        for kind in expected {
            if !streams.contains(kind) {
                streams.push(*kind);
            }
        }

        Self {
            expected: streams,
            inner: Mutex::new(GateInner {
                writer: Some(writer),
                state: GateState::Unstarted,
                tracks: Vec::with_capacity(expected.len()),
                start_failure: None,
            }),
        }
    }

    /// Registers the track for `kind` and starts the writer once every expected stream has
    /// registered.
    ///
    /// # Errors
    ///
    /// Fails for a stream that is not expected or already registered, after finalize, and
    /// when the underlying writer rejects the track or fails to start. A writer that fails to
    /// start is released and the gate becomes [`GateState::Stopped`]; the failure is reported
    /// again by [`MuxerGate::finalize`].
    pub fn register_track(&self, kind: StreamKind, format: &MediaFormat) -> Result<usize, MuxerGateError> {
        if !self.expected.contains(&kind) {
            return Err(MuxerGateError::UnexpectedStream(kind));
        }

        let mut guard = self.inner.lock();
        let GateInner { writer: slot, state, tracks, start_failure } = &mut *guard;
        if *state == GateState::Stopped {
            return Err(MuxerGateError::Stopped);
        }
        if tracks.iter().any(|(registered, _)| *registered == kind) {
            return Err(MuxerGateError::DuplicateRegistration(kind));
        }
        let writer = slot.as_mut().ok_or(MuxerGateError::Stopped)?;

        let track = writer.add_track(format)?;
        tracks.push((kind, track));
        info!(%kind, track, %format, "Registered container track");

        if tracks.len() == self.expected.len() {
            if let Err(err) = writer.start() {
                error!(%err, "Container writer failed to start");
                *state = GateState::Stopped;
                *start_failure = Some(err.to_string());
                if let Some(mut writer) = slot.take() {
                    writer.release();
                }
                return Err(err.into());
            }
            *state = GateState::Started;
            info!(tracks = tracks.len(), "Container writer started");
        }

        Ok(track)
    }

    /// Writes one sample if the writer is started.
    ///
    /// Returns `Ok(false)` when the sample was dropped because the writer has not started yet.
    ///
    /// # Errors
    ///
    /// Fails after finalize, for an unregistered track, or when the writer fails.
    pub fn write(&self, track: usize, data: &[u8], info: &BufferInfo) -> Result<bool, MuxerGateError> {
        let mut guard = self.inner.lock();
        let GateInner { writer, state, tracks, .. } = &mut *guard;
        match state {
            GateState::Stopped => return Err(MuxerGateError::Stopped),
            GateState::Unstarted => {
                debug!(track, pts = info.presentation_time_us, "Dropping sample before container start");
                return Ok(false);
            }
            GateState::Started => {}
        }
        if !tracks.iter().any(|(_, registered)| *registered == track) {
            return Err(MuxerGateError::UnknownTrack(track));
        }

        let writer = writer.as_mut().ok_or(MuxerGateError::Stopped)?;
        writer.write_sample(track, data, info)?;
        Ok(true)
    }

    /// Stops and releases the writer.
    ///
    /// A writer that never started is released without being stopped.
    ///
    /// # Errors
    ///
    /// A second call returns [`MuxerGateError::Stopped`]. A failing `stop` is returned after the
    /// writer has been released. If the writer never managed to start, the first call returns
    /// [`MuxerGateError::StartFailed`].
    pub fn finalize(&self) -> Result<(), MuxerGateError> {
        let mut inner = self.inner.lock();
        if inner.state == GateState::Stopped {
            return Err(inner.start_failure.take().map_or(MuxerGateError::Stopped, MuxerGateError::StartFailed));
        }
        let was_started = inner.state == GateState::Started;
        inner.state = GateState::Stopped;

        let Some(mut writer) = inner.writer.take() else {
            return Err(MuxerGateError::Stopped);
        };
        drop(inner);

        let result = if was_started { writer.stop() } else { Ok(()) };
        writer.release();
        info!(was_started, "Container writer finalized");

        Ok(result?)
    }

    #[must_use]
    pub fn state(&self) -> GateState {
        self.inner.lock().state
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.state() == GateState::Started
    }

    /// Track assigned to `kind`, if it registered.
    #[must_use]
    pub fn track_for(&self, kind: StreamKind) -> Option<usize> {
        self.inner.lock().tracks.iter().find(|(registered, _)| *registered == kind).map(|(_, track)| *track)
    }

    #[must_use]
    pub fn track_count(&self) -> usize {
        self.inner.lock().tracks.len()
    }

    #[must_use]
    pub fn expected_streams(&self) -> &[StreamKind] {
        &self.expected
    }
}
