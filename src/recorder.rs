//! The recorder front end.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{self, AtomicBool, AtomicUsize};

use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::codec::{CodecError, EncoderFactory};
use crate::executor::{ExecutorError, SerialExecutor};
use crate::frame::{AudioSamples, VideoFrame};
use crate::muxer::{ContainerWriter, GateState, MuxError, MuxerGate, MuxerGateError, StreamKind};
use crate::settings::{ContainerSettingsSubType, RecorderSettings, SettingsError};
use crate::stream::{EncoderStream, StreamConfig, StreamCounters, StreamStats};

#[derive(thiserror::Error, Debug)]
pub enum RecorderError {
    #[error("Video stream is disabled")]
    VideoDisabled,
    #[error("Audio stream is disabled")]
    AudioDisabled,
    #[error("Invalid recorder settings: {0}")]
    SettingsError(#[from] SettingsError),
    #[error("Codec error: {0}")]
    CodecError(#[from] CodecError),
    #[error("Container writer error: {0}")]
    MuxError(#[from] MuxError),
    #[error("Muxer error: {0}")]
    MuxerGateError(#[from] MuxerGateError),
    #[error("Execution context error: {0}")]
    ExecutorError(#[from] ExecutorError),
}

struct StreamHandle {
    executor: SerialExecutor<EncoderStream>,
    counters: Arc<StreamCounters>,
}

impl StreamHandle {
    fn spawn(
        name: &str,
        config: StreamConfig,
        factory: &Arc<dyn EncoderFactory>,
        gate: &Arc<MuxerGate>,
    ) -> Result<Self, ExecutorError> {
        let stream = EncoderStream::new(config, factory.clone(), gate.clone());
        let counters = stream.counters();
        let executor = SerialExecutor::spawn(name, stream)?;

        Ok(Self { executor, counters })
    }
}

/// Records video frames and audio samples into one container file.
///
/// Frames and samples may be pushed from any thread; each stream is encoded on its own
/// execution context and both share a single lazily started container writer.
pub struct Recorder {
    video: Option<StreamHandle>,
    audio: Option<StreamHandle>,
    gate: Arc<MuxerGate>,
    running: AtomicBool,
    released: AtomicBool,
    finalize_error: Arc<Mutex<Option<MuxerGateError>>>,
}

impl Recorder {
    /// Creates a recorder writing to `path`.
    ///
    /// `open` creates the container writer for the path and the configured container sub
    /// type.
    ///
    /// # Errors
    ///
    /// Fails when an enabled stream's MIME type is not supported by `factory`, when `open`
    /// fails, or when an execution context cannot be spawned.
    #[inline]
    pub fn new<P, F>(
        settings: RecorderSettings,
        path: P,
        factory: Arc<dyn EncoderFactory>,
        open: F,
    ) -> Result<Self, RecorderError>
    where
        P: AsRef<Path>,
        F: FnOnce(&Path, ContainerSettingsSubType) -> Result<Box<dyn ContainerWriter>, MuxError>,
    {
        Self::check_support(&settings, factory.as_ref())?;

        let path = path.as_ref();
        let writer = open(path, settings.container())?;
        info!(path = %path.display(), container = ?settings.container(), "Opened container");

        Self::from_writer(settings, writer, factory)
    }

    /// Creates a recorder on top of an already open container writer.
    ///
    /// # Errors
    ///
    /// Same as [`Recorder::new`] minus the open step. The writer is released on failure.
    #[inline]
    pub fn from_writer(
        settings: RecorderSettings,
        writer: Box<dyn ContainerWriter>,
        factory: Arc<dyn EncoderFactory>,
    ) -> Result<Self, RecorderError> {
        let gate = Arc::new(MuxerGate::new(writer, &settings.expected_streams()));
        if let Err(err) = Self::check_support(&settings, factory.as_ref()) {
            Self::finalize_gate(&gate);
            return Err(err);
        }

        let video = settings
            .video()
            .map(|config| StreamHandle::spawn("av-record-video", StreamConfig::Video(config.clone()), &factory, &gate))
            .transpose();
        let audio = settings
            .audio()
            .map(|config| StreamHandle::spawn("av-record-audio", StreamConfig::Audio(config.clone()), &factory, &gate))
            .transpose();

        let (video, audio) = match (video, audio) {
            (Ok(video), Ok(audio)) => (video, audio),
            (Err(err), _) | (_, Err(err)) => {
                Self::finalize_gate(&gate);
                return Err(err.into());
            }
        };

        info!(streams = ?gate.expected_streams(), "Recorder created");

        Ok(Self {
            video,
            audio,
            gate,
            running: AtomicBool::new(true),
            released: AtomicBool::new(false),
            finalize_error: Arc::new(Mutex::new(None)),
        })
    }

    fn check_support(settings: &RecorderSettings, factory: &dyn EncoderFactory) -> Result<(), RecorderError> {
        let mimes = settings.video().map(|config| config.mime).into_iter().chain(settings.audio().map(|config| config.mime));
        for mime in mimes {
            if !factory.supports(mime) {
                return Err(CodecError::Unsupported(mime.to_string()).into());
            }
        }
        Ok(())
    }

    /// Queues a video frame for encoding. Returns immediately.
    ///
    /// Frames pushed after [`Recorder::release`] are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError::VideoDisabled`] if the settings disabled video.
    #[inline]
    pub fn on_video_frame(&self, frame: VideoFrame) -> Result<(), RecorderError> {
        let video = self.video.as_ref().ok_or(RecorderError::VideoDisabled)?;
        if !self.is_running() {
            return Ok(());
        }

        Self::post(video, move |stream| stream.submit_video(&frame))
    }

    /// Queues an audio buffer for encoding. Returns immediately.
    ///
    /// The buffer's timestamp is derived from the number of bytes queued before it, not from
    /// the time of this call.
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError::AudioDisabled`] if the settings disabled audio.
    #[inline]
    pub fn on_audio_samples(&self, samples: AudioSamples) -> Result<(), RecorderError> {
        let audio = self.audio.as_ref().ok_or(RecorderError::AudioDisabled)?;
        if !self.is_running() {
            return Ok(());
        }

        Self::post(audio, move |stream| stream.submit_audio(&samples))
    }

    fn post<F>(handle: &StreamHandle, job: F) -> Result<(), RecorderError>
    where
        F: FnOnce(&mut EncoderStream) + Send + 'static,
    {
        match handle.executor.post(job) {
            // Lost the race against release.
            Ok(()) | Err(ExecutorError::Closed) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Stops accepting input and tears both streams down after their queued work.
    ///
    /// The container is finalized by whichever stream finishes tearing down last. Calling
    /// this more than once has no further effect.
    #[inline]
    pub fn release(&self) {
        if self.released.swap(true, atomic::Ordering::AcqRel) {
            debug!("Recorder already released");
            return;
        }
        self.running.store(false, atomic::Ordering::Release);
        info!("Releasing recorder");

        let handles: Vec<&StreamHandle> = self.video.iter().chain(self.audio.iter()).collect();
        let remaining = Arc::new(AtomicUsize::new(handles.len()));

        for handle in handles {
            let gate = self.gate.clone();
            let pending = remaining.clone();
            let finalize_error = self.finalize_error.clone();
            let result = handle.executor.shutdown_after(move |stream| {
                stream.teardown();
                if pending.fetch_sub(1, atomic::Ordering::AcqRel) == 1 {
                    Self::finalize_shared(&gate, &finalize_error);
                }
            });

            if let Err(err) = result {
                error!(context = handle.executor.name(), %err, "Failed to schedule stream teardown");
                if remaining.fetch_sub(1, atomic::Ordering::AcqRel) == 1 {
                    Self::finalize_shared(&self.gate, &self.finalize_error);
                }
            }
        }
    }

    fn finalize_shared(gate: &MuxerGate, slot: &Mutex<Option<MuxerGateError>>) {
        match gate.finalize() {
            Ok(()) => {}
            Err(MuxerGateError::Stopped) => debug!("Container already finalized"),
            Err(err) => {
                error!(%err, "Failed to finalize container");
                *slot.lock() = Some(err);
            }
        }
    }

    fn finalize_gate(gate: &MuxerGate) {
        if let Err(err) = gate.finalize() {
            error!(%err, "Failed to finalize container");
        }
    }

    /// Releases the recorder and waits until the container is finalized.
    ///
    /// # Errors
    ///
    /// Returns the container's finalize error, or an execution context error if a stream
    /// thread died.
    #[inline]
    pub fn finish(self) -> Result<(), RecorderError> {
        self.release();

        for handle in self.video.iter().chain(self.audio.iter()) {
            handle.executor.join()?;
        }

        if let Some(err) = self.finalize_error.lock().take() {
            return Err(err.into());
        }

        Ok(())
    }

    /// `false` once [`Recorder::release`] was called.
    #[must_use]
    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(atomic::Ordering::Acquire)
    }

    #[must_use]
    #[inline]
    pub fn gate_state(&self) -> GateState {
        self.gate.state()
    }

    /// Statistics of `kind`'s stream, `None` if that stream is disabled.
    #[must_use]
    #[inline]
    pub fn stats(&self, kind: StreamKind) -> Option<StreamStats> {
        let handle = match kind {
            StreamKind::Video => self.video.as_ref(),
            StreamKind::Audio => self.audio.as_ref(),
        };
        handle.map(|handle| handle.counters.snapshot())
    }
}

impl Drop for Recorder {
    #[inline]
    fn drop(&mut self) {
        self.release();
        // Dropping the stream handles joins their execution contexts.
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::codec::{BufferFlags, BufferInfo, MediaEncoder, OutputStatus};
    use crate::format::{MIMETYPE_AUDIO_AAC, MediaFormat};
    use crate::settings::{AudioSettingsBuilder, ContainerSettingsBuilder, VideoSettingsBuilder};

    struct NullWriter {
        released: Arc<AtomicBool>,
    }

    impl ContainerWriter for NullWriter {
        fn add_track(&mut self, _format: &MediaFormat) -> Result<usize, MuxError> {
            Ok(0)
        }

        fn start(&mut self) -> Result<(), MuxError> {
            Ok(())
        }

        fn write_sample(&mut self, _track: usize, _data: &[u8], _info: &BufferInfo) -> Result<(), MuxError> {
            Ok(())
        }

        fn stop(&mut self) -> Result<(), MuxError> {
            Ok(())
        }

        fn release(&mut self) {
            self.released.store(true, atomic::Ordering::SeqCst);
        }
    }

    struct IdleEncoder;

    impl MediaEncoder for IdleEncoder {
        fn configure(&mut self, _format: &MediaFormat) -> Result<(), CodecError> {
            Ok(())
        }

        fn start(&mut self) -> Result<(), CodecError> {
            Ok(())
        }

        fn dequeue_input_buffer(&mut self, _timeout: Duration) -> Option<usize> {
            None
        }

        fn input_buffer(&mut self, _index: usize) -> Option<&mut [u8]> {
            None
        }

        fn queue_input_buffer(&mut self, _: usize, _: usize, _: i64, _: BufferFlags) -> Result<(), CodecError> {
            Ok(())
        }

        fn signal_end_of_input_stream(&mut self) -> Result<(), CodecError> {
            Ok(())
        }

        fn dequeue_output_buffer(&mut self, _timeout: Duration) -> OutputStatus {
            OutputStatus::TryAgainLater
        }

        fn output_buffer_count(&self) -> usize {
            0
        }

        fn output_buffer(&self, _index: usize) -> Option<&[u8]> {
            None
        }

        fn output_format(&self) -> MediaFormat {
            MediaFormat::new()
        }

        fn release_output_buffer(&mut self, _index: usize) {}

        fn stop(&mut self) -> Result<(), CodecError> {
            Ok(())
        }

        fn release(&mut self) {}
    }

    struct AudioOnlyFactory;

    impl EncoderFactory for AudioOnlyFactory {
        fn supports(&self, mime: &str) -> bool {
            mime == MIMETYPE_AUDIO_AAC
        }

        fn create_encoder(&self, _format: &MediaFormat) -> Result<Box<dyn MediaEncoder>, CodecError> {
            Ok(Box::new(IdleEncoder))
        }
    }

    fn audio_only() -> RecorderSettings {
        RecorderSettings::new(
            VideoSettingsBuilder::new().disabled(true),
            AudioSettingsBuilder::new(),
            ContainerSettingsBuilder::new(),
        )
        .unwrap()
    }

    #[test]
    fn unsupported_mime_fails_construction_and_releases_writer() {
        let settings = RecorderSettings::new(
            VideoSettingsBuilder::new(),
            AudioSettingsBuilder::new(),
            ContainerSettingsBuilder::new(),
        )
        .unwrap();
        let released = Arc::new(AtomicBool::new(false));
        let writer = Box::new(NullWriter { released: released.clone() });

        let result = Recorder::from_writer(settings, writer, Arc::new(AudioOnlyFactory));

        assert!(matches!(result, Err(RecorderError::CodecError(CodecError::Unsupported(_)))));
        assert!(released.load(atomic::Ordering::SeqCst));
    }

    #[test]
    fn unsupported_mime_is_rejected_before_opening() {
        let settings = RecorderSettings::new(
            VideoSettingsBuilder::new(),
            AudioSettingsBuilder::new().disabled(true),
            ContainerSettingsBuilder::new(),
        )
        .unwrap();
        let mut opened = false;

        let result = Recorder::new(settings, "out.mp4", Arc::new(AudioOnlyFactory), |_, _| {
            opened = true;
            Err(MuxError::IllegalState("unreachable"))
        });

        assert!(matches!(result, Err(RecorderError::CodecError(_))));
        assert!(!opened);
    }

    #[test]
    fn open_failure_surfaces_as_mux_error() {
        let result = Recorder::new(audio_only(), "/nonexistent/out.mp4", Arc::new(AudioOnlyFactory), |path, _| {
            Err(MuxError::IoError(std::io::Error::new(std::io::ErrorKind::NotFound, path.display().to_string())))
        });

        assert!(matches!(result, Err(RecorderError::MuxError(MuxError::IoError(_)))));
    }

    #[test]
    fn disabled_stream_rejects_input() {
        let released = Arc::new(AtomicBool::new(false));
        let writer = Box::new(NullWriter { released: released.clone() });
        let recorder = Recorder::from_writer(audio_only(), writer, Arc::new(AudioOnlyFactory)).unwrap();

        let frame = VideoFrame::new(16, 16, Default::default(), 0);
        assert!(matches!(recorder.on_video_frame(frame), Err(RecorderError::VideoDisabled)));
        assert!(recorder.stats(StreamKind::Video).is_none());
        assert!(recorder.stats(StreamKind::Audio).is_some());

        recorder.finish().unwrap();
        assert!(released.load(atomic::Ordering::SeqCst));
    }

    #[test]
    fn input_after_release_is_ignored() {
        let writer = Box::new(NullWriter { released: Arc::new(AtomicBool::new(false)) });
        let recorder = Recorder::from_writer(audio_only(), writer, Arc::new(AudioOnlyFactory)).unwrap();

        recorder.release();
        assert!(!recorder.is_running());
        recorder.on_audio_samples(AudioSamples::new(vec![0; 32], 1, 48_000)).unwrap();
        assert!(matches!(recorder.on_video_frame(VideoFrame::new(2, 2, Default::default(), 0)), Err(RecorderError::VideoDisabled)));

        recorder.finish().unwrap();
    }
}
