use std::collections::VecDeque;
use std::f64::consts::TAU;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use av_record::codec::{BufferFlags, BufferInfo, CodecError, EncoderFactory, MediaEncoder, OutputStatus};
use av_record::format::{KEY_BIT_RATE, KEY_CSD_0, KEY_FRAME_RATE, KEY_I_FRAME_INTERVAL, MIMETYPE_AUDIO_AAC, MIMETYPE_VIDEO_AVC, MediaFormat};
use av_record::frame::{AudioSamples, Rotation, VideoFrame};
use av_record::muxer::{ContainerWriter, MuxError, StreamKind};
use av_record::settings::{AudioSettingsBuilder, ContainerSettingsBuilder, RecorderSettings, VideoSettingsBuilder};
use av_record::Recorder;
use clap::Parser;
use tracing_subscriber::EnvFilter;

const SAMPLE_RATE: u32 = 48_000;
const CHANNELS: u32 = 2;
// 10 ms of audio per buffer
const AUDIO_CHUNK_FRAMES: usize = 480;

// Stands in for a hardware encoder: every input becomes one output unit sized after the
// configured bitrate.
struct SyntheticEncoder {
    format: MediaFormat,
    unit_size: usize,
    key_frame_every: u64,
    units: u64,
    input: Vec<u8>,
    pending: VecDeque<(usize, i64, BufferFlags)>,
    output: Vec<u8>,
    format_sent: bool,
}

impl SyntheticEncoder {
    fn new(format: &MediaFormat) -> Self {
        let bitrate = format.integer(KEY_BIT_RATE).unwrap_or(1_000_000);
        let (unit_size, key_frame_every) = if format.is_video() {
            let fps = format.integer(KEY_FRAME_RATE).unwrap_or(30).max(1);
            let interval = format.integer(KEY_I_FRAME_INTERVAL).unwrap_or(1).max(1);
            ((bitrate / 8 / fps) as usize, (fps * interval) as u64)
        } else {
            // One AAC frame per 10 ms buffer.
            ((bitrate / 8 / 100) as usize, 1)
        };

        Self {
            format: format.clone(),
            unit_size: unit_size.max(1),
            key_frame_every,
            units: 0,
            input: vec![0; 64 * 1024],
            pending: VecDeque::new(),
            output: Vec::new(),
            format_sent: false,
        }
    }

    fn push_unit(&mut self, pts: i64) {
        let flags = if self.units % self.key_frame_every == 0 { BufferFlags::KEY_FRAME } else { BufferFlags::empty() };
        self.units += 1;
        self.pending.push_back((self.unit_size, pts, flags));
    }
}

impl MediaEncoder for SyntheticEncoder {
    fn configure(&mut self, _format: &MediaFormat) -> Result<(), CodecError> {
        Ok(())
    }

    fn start(&mut self) -> Result<(), CodecError> {
        Ok(())
    }

    fn render_frame(&mut self, frame: &VideoFrame) -> Result<(), CodecError> {
        self.push_unit(frame.timestamp_ns() / 1000);
        Ok(())
    }

    fn dequeue_input_buffer(&mut self, _timeout: Duration) -> Option<usize> {
        Some(0)
    }

    fn input_buffer(&mut self, index: usize) -> Option<&mut [u8]> {
        (index == 0).then_some(self.input.as_mut_slice())
    }

    fn queue_input_buffer(&mut self, _index: usize, _len: usize, pts: i64, flags: BufferFlags) -> Result<(), CodecError> {
        if flags.contains(BufferFlags::END_OF_STREAM) {
            self.pending.push_back((0, pts, BufferFlags::END_OF_STREAM));
        } else {
            self.push_unit(pts);
        }
        Ok(())
    }

    fn signal_end_of_input_stream(&mut self) -> Result<(), CodecError> {
        self.pending.push_back((0, 0, BufferFlags::END_OF_STREAM));
        Ok(())
    }

    fn dequeue_output_buffer(&mut self, _timeout: Duration) -> OutputStatus {
        if !self.format_sent {
            self.format_sent = true;
            return OutputStatus::FormatChanged;
        }
        let Some((size, pts, flags)) = self.pending.pop_front() else {
            return OutputStatus::TryAgainLater;
        };
        self.output.clear();
        self.output.resize(size, (self.units & 0xFF) as u8);
        OutputStatus::Buffer { index: 0, info: BufferInfo::new(0, size, pts, flags) }
    }

    fn output_buffer_count(&self) -> usize {
        1
    }

    fn output_buffer(&self, index: usize) -> Option<&[u8]> {
        (index == 0).then_some(self.output.as_slice())
    }

    fn output_format(&self) -> MediaFormat {
        let mut format = self.format.clone();
        format.set_bytes(KEY_CSD_0, vec![0, 0, 0, 1]);
        format
    }

    fn release_output_buffer(&mut self, _index: usize) {}

    fn stop(&mut self) -> Result<(), CodecError> {
        Ok(())
    }

    fn release(&mut self) {}
}

struct SyntheticFactory;

impl EncoderFactory for SyntheticFactory {
    fn supports(&self, mime: &str) -> bool {
        mime == MIMETYPE_VIDEO_AVC || mime == MIMETYPE_AUDIO_AAC
    }

    fn create_encoder(&self, format: &MediaFormat) -> Result<Box<dyn MediaEncoder>, CodecError> {
        Ok(Box::new(SyntheticEncoder::new(format)))
    }
}

// Writes a plain-text index of every sample instead of a real container.
struct IndexWriter {
    out: BufWriter<File>,
    tracks: usize,
}

impl ContainerWriter for IndexWriter {
    fn add_track(&mut self, format: &MediaFormat) -> Result<usize, MuxError> {
        let track = self.tracks;
        self.tracks += 1;
        writeln!(self.out, "# track {track}: {format}")?;
        Ok(track)
    }

    fn start(&mut self) -> Result<(), MuxError> {
        writeln!(self.out, "# track\tpts_us\tsize\tflags")?;
        Ok(())
    }

    fn write_sample(&mut self, track: usize, data: &[u8], info: &BufferInfo) -> Result<(), MuxError> {
        writeln!(self.out, "{track}\t{}\t{}\t{:?}", info.presentation_time_us, data.len(), info.flags)?;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), MuxError> {
        self.out.flush()?;
        Ok(())
    }
}

#[derive(Parser)]
#[command(name = "Synthetic Record")]
#[command(version = "1.0")]
#[command(about = "Records synthetic video and audio through the encode and mux pipeline")]
struct Cli {
    /// Number of video frames to record
    #[arg(long, default_value_t = 300)]
    frames: u32,

    /// Video frame rate
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Video bitrate in bits per second
    #[arg(long, default_value_t = 6_000_000)]
    bitrate: u32,

    /// Record video only
    #[arg(long)]
    no_audio: bool,

    /// Output sample index path
    #[arg(long, default_value = "recording.txt")]
    output: PathBuf,
}

fn tone(phase: &mut f64) -> AudioSamples {
    let mut data = Vec::with_capacity(AUDIO_CHUNK_FRAMES * CHANNELS as usize * 2);
    for _ in 0..AUDIO_CHUNK_FRAMES {
        let sample = (phase.sin() * f64::from(i16::MAX) * 0.2) as i16;
        *phase = (*phase + TAU * 440.0 / f64::from(SAMPLE_RATE)) % TAU;
        for _ in 0..CHANNELS {
            data.extend_from_slice(&sample.to_le_bytes());
        }
    }
    AudioSamples::new(data, CHANNELS, SAMPLE_RATE)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = RecorderSettings::new(
        VideoSettingsBuilder::new().bitrate(cli.bitrate).frame_rate(cli.fps),
        AudioSettingsBuilder::new().disabled(cli.no_audio),
        ContainerSettingsBuilder::new(),
    )?;

    let recorder = Arc::new(Recorder::new(settings, &cli.output, Arc::new(SyntheticFactory), |path, sub_type| {
        println!("Writing {} sample index to {}", sub_type.extension(), path.display());
        let out = BufWriter::new(File::create(path)?);
        Ok(Box::new(IndexWriter { out, tracks: 0 }) as Box<dyn ContainerWriter>)
    })?);

    let stop_flag = Arc::new(AtomicBool::new(false));

    // Set up Ctrl+C handler
    {
        let stop_flag = stop_flag.clone();
        ctrlc::set_handler(move || {
            stop_flag.store(true, Ordering::SeqCst);
        })?;
    }

    let audio = (!cli.no_audio).then(|| {
        let recorder = recorder.clone();
        let stop_flag = stop_flag.clone();
        thread::spawn(move || {
            let mut phase = 0.0;
            while !stop_flag.load(Ordering::SeqCst) && recorder.is_running() {
                if let Err(e) = recorder.on_audio_samples(tone(&mut phase)) {
                    eprintln!("Audio error: {e}");
                    break;
                }
                thread::sleep(Duration::from_millis(10));
            }
        })
    });

    let start = Instant::now();
    let frame_interval = Duration::from_secs(1) / cli.fps.max(1);
    // Pretend the capture device clock has been running for a while.
    let clock_base = 42_000_000_000i64;
    for index in 0..cli.frames {
        if stop_flag.load(Ordering::SeqCst) {
            println!("\nRecording stopped by user.");
            break;
        }

        let timestamp = clock_base + i64::from(index) * 1_000_000_000 / i64::from(cli.fps.max(1));
        recorder.on_video_frame(VideoFrame::new(1280, 720, Rotation::Deg0, timestamp))?;

        print!("\rRecording for: {:.2} seconds | Frames: {}", start.elapsed().as_secs_f64(), index + 1);
        io::stdout().flush()?;
        thread::sleep(frame_interval);
    }
    println!();

    stop_flag.store(true, Ordering::SeqCst);
    if let Some(audio) = audio {
        let _ = audio.join();
    }

    let video_stats = recorder.stats(StreamKind::Video);
    let audio_stats = recorder.stats(StreamKind::Audio);
    match Arc::try_unwrap(recorder) {
        Ok(recorder) => recorder.finish()?,
        Err(_) => eprintln!("Recorder still shared, finalizing on drop"),
    }

    println!("Video: {video_stats:?}");
    println!("Audio: {audio_stats:?}");

    Ok(())
}
