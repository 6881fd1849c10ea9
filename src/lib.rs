//! # AV Record
//!
//! **AV Record** turns raw video frames and PCM audio, pushed from independent capture
//! threads, into one seekable container file. Each stream drives its own encoder on a
//! dedicated execution context and both share a multiplexer that only starts once every
//! expected stream has announced its output format.
//!
//! ## Features
//!
//! - Lazy Encoder Creation From The First Frame Or Sample.
//! - Muxer Start Gated On Every Expected Track.
//! - Zero Based Video Timestamps And Sample Count Driven Audio Timestamps.
//! - Clean Shutdown That Flushes Buffered Encoder Output.
//! - Stateless YUV Repacking, Rotation And Grayscale Helpers.
//!
//! ## Usage
//!
//! The encoder and container backends are supplied through the [`codec::EncoderFactory`] and
//! [`muxer::ContainerWriter`] traits.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use av_record::codec::EncoderFactory;
//! use av_record::frame::{AudioSamples, Rotation, VideoFrame};
//! use av_record::muxer::ContainerWriter;
//! use av_record::recorder::{Recorder, RecorderError};
//! use av_record::settings::{
//!     AudioSettingsBuilder, ContainerSettingsBuilder, RecorderSettings, VideoSettingsBuilder,
//! };
//!
//! fn record(
//!     factory: Arc<dyn EncoderFactory>,
//!     writer: Box<dyn ContainerWriter>,
//! ) -> Result<(), RecorderError> {
//!     let settings = RecorderSettings::new(
//!         VideoSettingsBuilder::new().bitrate(4_000_000),
//!         AudioSettingsBuilder::new(),
//!         ContainerSettingsBuilder::new(),
//!     )?;
//!
//!     let recorder = Recorder::from_writer(settings, writer, factory)?;
//!
//!     // Usually Called From The Capture Callbacks
//!     recorder.on_video_frame(VideoFrame::new(1280, 720, Rotation::Deg0, 0))?;
//!     recorder.on_audio_samples(AudioSamples::new(vec![0; 1920], 2, 48_000))?;
//!
//!     // Flushes Both Encoders And Finalizes The File
//!     recorder.finish()
//! }
//! ```
#![warn(clippy::semicolon_if_nothing_returned)]
#![warn(clippy::inconsistent_struct_constructor)]
#![warn(clippy::must_use_candidate)]
#![warn(clippy::ptr_as_ptr)]
#![warn(clippy::borrow_as_ptr)]
#![warn(clippy::nursery)]
#![warn(clippy::cargo)]

pub mod capability;
pub mod codec;
pub mod executor;
pub mod format;
pub mod frame;
pub mod muxer;
pub mod recorder;
pub mod settings;
pub mod stream;
pub mod timestamp;
pub mod yuv;

pub use recorder::{Recorder, RecorderError};
