#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use av_record::codec::{BufferFlags, BufferInfo, CodecError, EncoderFactory, MediaEncoder, OutputStatus};
use av_record::format::{KEY_MIME, MediaFormat};
use av_record::frame::VideoFrame;
use av_record::muxer::{ContainerWriter, MuxError};
use parking_lot::Mutex;

pub const INPUT_CAPACITY: usize = 4096;

#[derive(Eq, PartialEq, Clone, Debug)]
pub enum WriterEvent {
    AddTrack { track: usize, mime: String },
    Start,
    Sample { track: usize, len: usize, pts: i64 },
    Stop,
    Release,
}

/// Container writer that only records what it was asked to do.
pub struct MemoryWriter {
    tracks: usize,
    fail_start: bool,
    fail_stop: bool,
    events: Arc<Mutex<Vec<WriterEvent>>>,
}

impl MemoryWriter {
    pub fn new() -> (Box<dyn ContainerWriter>, Arc<Mutex<Vec<WriterEvent>>>) {
        Self::build(false, false)
    }

    pub fn failing_start() -> (Box<dyn ContainerWriter>, Arc<Mutex<Vec<WriterEvent>>>) {
        Self::build(true, false)
    }

    pub fn failing_stop() -> (Box<dyn ContainerWriter>, Arc<Mutex<Vec<WriterEvent>>>) {
        Self::build(false, true)
    }

    fn build(fail_start: bool, fail_stop: bool) -> (Box<dyn ContainerWriter>, Arc<Mutex<Vec<WriterEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        (Box::new(Self { tracks: 0, fail_start, fail_stop, events: events.clone() }), events)
    }
}

impl ContainerWriter for MemoryWriter {
    fn add_track(&mut self, format: &MediaFormat) -> Result<usize, MuxError> {
        let track = self.tracks;
        self.tracks += 1;
        let mime = format.string(KEY_MIME).unwrap_or_default().to_string();
        self.events.lock().push(WriterEvent::AddTrack { track, mime });
        Ok(track)
    }

    fn start(&mut self) -> Result<(), MuxError> {
        self.events.lock().push(WriterEvent::Start);
        if self.fail_start {
            return Err(MuxError::IllegalState("start failed"));
        }
        Ok(())
    }

    fn write_sample(&mut self, track: usize, data: &[u8], info: &BufferInfo) -> Result<(), MuxError> {
        self.events.lock().push(WriterEvent::Sample { track, len: data.len(), pts: info.presentation_time_us });
        Ok(())
    }

    fn stop(&mut self) -> Result<(), MuxError> {
        self.events.lock().push(WriterEvent::Stop);
        if self.fail_stop {
            return Err(MuxError::IllegalState("stop failed"));
        }
        Ok(())
    }

    fn release(&mut self) {
        self.events.lock().push(WriterEvent::Release);
    }
}

/// What every encoder created by a [`FakeFactory`] did.
#[derive(Default, Debug)]
pub struct CodecLog {
    pub created: Vec<String>,
    pub released_outputs: usize,
    pub stopped: usize,
    pub released: usize,
}

/// Pass-through encoder: announces its output format on the first dequeue, then emits one
/// output buffer per input and end of stream once input ended.
pub struct FakeEncoder {
    format: MediaFormat,
    input_slots: bool,
    input: Vec<u8>,
    pending: VecDeque<(Vec<u8>, i64, BufferFlags)>,
    current: Vec<u8>,
    format_sent: bool,
    log: Arc<Mutex<CodecLog>>,
}

impl MediaEncoder for FakeEncoder {
    fn configure(&mut self, format: &MediaFormat) -> Result<(), CodecError> {
        self.format = format.clone();
        Ok(())
    }

    fn start(&mut self) -> Result<(), CodecError> {
        Ok(())
    }

    fn render_frame(&mut self, frame: &VideoFrame) -> Result<(), CodecError> {
        self.pending.push_back((vec![0x65; 16], frame.timestamp_ns() / 1000, BufferFlags::KEY_FRAME));
        Ok(())
    }

    fn dequeue_input_buffer(&mut self, _timeout: Duration) -> Option<usize> {
        self.input_slots.then_some(0)
    }

    fn input_buffer(&mut self, index: usize) -> Option<&mut [u8]> {
        (index == 0).then_some(self.input.as_mut_slice())
    }

    fn queue_input_buffer(
        &mut self,
        _index: usize,
        len: usize,
        presentation_time_us: i64,
        flags: BufferFlags,
    ) -> Result<(), CodecError> {
        // AAC-ish: one encoded unit per input, a quarter of its size.
        let encoded = vec![0x21; len / 4];
        self.pending.push_back((encoded, presentation_time_us, flags));
        Ok(())
    }

    fn signal_end_of_input_stream(&mut self) -> Result<(), CodecError> {
        self.pending.push_back((Vec::new(), 0, BufferFlags::END_OF_STREAM));
        Ok(())
    }

    fn dequeue_output_buffer(&mut self, _timeout: Duration) -> OutputStatus {
        if !self.format_sent {
            self.format_sent = true;
            return OutputStatus::FormatChanged;
        }
        match self.pending.pop_front() {
            Some((data, pts, flags)) => {
                let info = BufferInfo::new(0, data.len(), pts, flags);
                self.current = data;
                OutputStatus::Buffer { index: 0, info }
            }
            None => OutputStatus::TryAgainLater,
        }
    }

    fn output_buffer_count(&self) -> usize {
        1
    }

    fn output_buffer(&self, index: usize) -> Option<&[u8]> {
        (index == 0).then_some(self.current.as_slice())
    }

    fn output_format(&self) -> MediaFormat {
        self.format.clone()
    }

    fn release_output_buffer(&mut self, _index: usize) {
        self.log.lock().released_outputs += 1;
    }

    fn stop(&mut self) -> Result<(), CodecError> {
        self.log.lock().stopped += 1;
        Ok(())
    }

    fn release(&mut self) {
        self.log.lock().released += 1;
    }
}

#[derive(Default)]
pub struct FakeFactory {
    /// Audio encoders never offer an input slot.
    pub starve_input: bool,
    /// MIME types whose encoder creation fails.
    pub broken: Vec<&'static str>,
    pub log: Arc<Mutex<CodecLog>>,
}

impl FakeFactory {
    pub fn new() -> (Arc<Self>, Arc<Mutex<CodecLog>>) {
        let factory = Self::default();
        let log = factory.log.clone();
        (Arc::new(factory), log)
    }
}

impl EncoderFactory for FakeFactory {
    fn supports(&self, _mime: &str) -> bool {
        true
    }

    fn create_encoder(&self, format: &MediaFormat) -> Result<Box<dyn MediaEncoder>, CodecError> {
        let mime = format.mime().unwrap_or_default();
        if self.broken.iter().any(|broken| *broken == mime) {
            return Err(CodecError::Backend(format!("{mime} encoder is broken")));
        }
        self.log.lock().created.push(mime.to_string());

        Ok(Box::new(FakeEncoder {
            format: format.clone(),
            input_slots: !(self.starve_input && format.is_audio()),
            input: vec![0; INPUT_CAPACITY],
            pending: VecDeque::new(),
            current: Vec::new(),
            format_sent: false,
            log: self.log.clone(),
        }))
    }
}

pub fn samples(events: &[WriterEvent], track: usize) -> Vec<i64> {
    events
        .iter()
        .filter_map(|event| match event {
            WriterEvent::Sample { track: t, pts, .. } if *t == track => Some(*pts),
            _ => None,
        })
        .collect()
}

pub fn track_of(events: &[WriterEvent], prefix: &str) -> Option<usize> {
    events.iter().find_map(|event| match event {
        WriterEvent::AddTrack { track, mime } if mime.starts_with(prefix) => Some(*track),
        _ => None,
    })
}

pub fn count(events: &[WriterEvent], wanted: &WriterEvent) -> usize {
    events.iter().filter(|event| *event == wanted).count()
}
