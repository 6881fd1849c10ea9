//! Recording configuration builders and their resolved form.

use crate::format::{
    self, AacProfile, CHANNEL_IN_MONO, CHANNEL_IN_STEREO, ColorFormat, MediaFormat,
};
use crate::muxer::StreamKind;

#[derive(thiserror::Error, Eq, PartialEq, Clone, Debug)]
pub enum SettingsError {
    #[error("MIME type is empty")]
    EmptyMimeType,
    #[error("MIME type {0} does not describe a {1:?} stream")]
    WrongMimeType(String, StreamKind),
    #[error("Bitrate must be greater than zero")]
    ZeroBitrate,
    #[error("Frame rate must be greater than zero")]
    ZeroFrameRate,
    #[error("Bits per sample must be a non-zero multiple of 8, got {0}")]
    InvalidBitsPerSample(u32),
    #[error("Both video and audio are disabled")]
    NothingToRecord,
}

/// Builder for configuring the video encoder.
///
/// Width and height are taken from the first submitted frame.
#[derive(Eq, PartialEq, Clone, Debug)]
pub struct VideoSettingsBuilder {
    mime: &'static str,
    color_format: ColorFormat,
    bitrate: u32,
    frame_rate: u32,
    i_frame_interval: u32,
    disabled: bool,
}

impl VideoSettingsBuilder {
    pub const fn new() -> Self {
        Self {
            mime: format::MIMETYPE_VIDEO_AVC,
            color_format: ColorFormat::Surface,
            bitrate: 6_000_000,
            frame_rate: 30,
            i_frame_interval: 5,
            disabled: false,
        }
    }

    pub const fn mime(mut self, mime: &'static str) -> Self {
        self.mime = mime;
        self
    }
    pub const fn color_format(mut self, color_format: ColorFormat) -> Self {
        self.color_format = color_format;
        self
    }
    pub const fn bitrate(mut self, bitrate: u32) -> Self {
        self.bitrate = bitrate;
        self
    }
    pub const fn frame_rate(mut self, frame_rate: u32) -> Self {
        self.frame_rate = frame_rate;
        self
    }
    /// Seconds between key frames.
    pub const fn i_frame_interval(mut self, seconds: u32) -> Self {
        self.i_frame_interval = seconds;
        self
    }
    pub const fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    fn build(self) -> Result<Option<VideoEncoderConfig>, SettingsError> {
        if self.disabled {
            return Ok(None);
        }
        validate_mime(self.mime, StreamKind::Video)?;
        if self.bitrate == 0 {
            return Err(SettingsError::ZeroBitrate);
        }
        if self.frame_rate == 0 {
            return Err(SettingsError::ZeroFrameRate);
        }

        Ok(Some(VideoEncoderConfig {
            mime: self.mime,
            color_format: self.color_format,
            bitrate: self.bitrate,
            frame_rate: self.frame_rate,
            i_frame_interval: self.i_frame_interval,
        }))
    }
}

impl Default for VideoSettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for configuring the audio encoder.
///
/// Sample rate and channel count are taken from the first submitted sample buffer.
#[derive(Eq, PartialEq, Clone, Debug)]
pub struct AudioSettingsBuilder {
    mime: &'static str,
    bitrate: u32,
    aac_profile: AacProfile,
    bits_per_sample: u32,
    max_input_size: Option<u32>,
    disabled: bool,
}

impl AudioSettingsBuilder {
    pub const fn new() -> Self {
        Self {
            mime: format::MIMETYPE_AUDIO_AAC,
            bitrate: 64 * 1024,
            aac_profile: AacProfile::Lc,
            bits_per_sample: 16,
            max_input_size: None,
            disabled: false,
        }
    }
    pub const fn mime(mut self, mime: &'static str) -> Self {
        self.mime = mime;
        self
    }
    pub const fn bitrate(mut self, bitrate: u32) -> Self {
        self.bitrate = bitrate;
        self
    }
    pub const fn aac_profile(mut self, aac_profile: AacProfile) -> Self {
        self.aac_profile = aac_profile;
        self
    }
    pub const fn bits_per_sample(mut self, bits_per_sample: u32) -> Self {
        self.bits_per_sample = bits_per_sample;
        self
    }
    pub const fn max_input_size(mut self, max_input_size: u32) -> Self {
        self.max_input_size = Some(max_input_size);
        self
    }
    pub const fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    fn build(self) -> Result<Option<AudioEncoderConfig>, SettingsError> {
        if self.disabled {
            return Ok(None);
        }
        validate_mime(self.mime, StreamKind::Audio)?;
        if self.bitrate == 0 {
            return Err(SettingsError::ZeroBitrate);
        }
        if self.bits_per_sample == 0 || self.bits_per_sample % 8 != 0 {
            return Err(SettingsError::InvalidBitsPerSample(self.bits_per_sample));
        }

        Ok(Some(AudioEncoderConfig {
            mime: self.mime,
            bitrate: self.bitrate,
            aac_profile: self.aac_profile,
            bits_per_sample: self.bits_per_sample,
            max_input_size: self.max_input_size,
        }))
    }
}

impl Default for AudioSettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Container subtypes.
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum ContainerSettingsSubType {
    MPEG4,
    WEBM,
    GP3,
}

impl ContainerSettingsSubType {
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::MPEG4 => "mp4",
            Self::WEBM => "webm",
            Self::GP3 => "3gp",
        }
    }
}

/// Builder for configuring container settings.
#[derive(Eq, PartialEq, Clone, Debug)]
pub struct ContainerSettingsBuilder {
    sub_type: ContainerSettingsSubType,
}

impl ContainerSettingsBuilder {
    pub const fn new() -> Self {
        Self { sub_type: ContainerSettingsSubType::MPEG4 }
    }
    pub const fn sub_type(mut self, sub_type: ContainerSettingsSubType) -> Self {
        self.sub_type = sub_type;
        self
    }
}

impl Default for ContainerSettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolved video encoder configuration.
#[derive(Eq, PartialEq, Clone, Debug)]
pub struct VideoEncoderConfig {
    pub mime: &'static str,
    pub color_format: ColorFormat,
    pub bitrate: u32,
    pub frame_rate: u32,
    pub i_frame_interval: u32,
}

impl VideoEncoderConfig {
    /// Encoder input format for frames of the given encoded size.
    #[must_use]
    pub fn to_format(&self, width: u32, height: u32) -> MediaFormat {
        let mut format = MediaFormat::video(self.mime, width, height);
        format.set_integer(format::KEY_COLOR_FORMAT, i64::from(self.color_format.code()));
        format.set_integer(format::KEY_BIT_RATE, i64::from(self.bitrate));
        format.set_integer(format::KEY_FRAME_RATE, i64::from(self.frame_rate));
        format.set_integer(format::KEY_I_FRAME_INTERVAL, i64::from(self.i_frame_interval));
        format
    }
}

/// Resolved audio encoder configuration.
#[derive(Eq, PartialEq, Clone, Debug)]
pub struct AudioEncoderConfig {
    pub mime: &'static str,
    pub bitrate: u32,
    pub aac_profile: AacProfile,
    pub bits_per_sample: u32,
    pub max_input_size: Option<u32>,
}

impl AudioEncoderConfig {
    /// Encoder input format for PCM with the given layout.
    #[must_use]
    pub fn to_format(&self, sample_rate: u32, channel_count: u32) -> MediaFormat {
        let mut format = MediaFormat::audio(self.mime, sample_rate, channel_count);
        format.set_integer(format::KEY_BIT_RATE, i64::from(self.bitrate));
        if self.mime == format::MIMETYPE_AUDIO_AAC {
            format.set_integer(format::KEY_AAC_PROFILE, self.aac_profile.code());
        }
        let mask = if channel_count >= 2 { CHANNEL_IN_STEREO } else { CHANNEL_IN_MONO };
        format.set_integer(format::KEY_CHANNEL_MASK, mask);
        if let Some(max_input_size) = self.max_input_size {
            format.set_integer(format::KEY_MAX_INPUT_SIZE, i64::from(max_input_size));
        }
        format
    }
}

/// Complete, validated configuration of a recording pipeline.
#[derive(Eq, PartialEq, Clone, Debug)]
pub struct RecorderSettings {
    video: Option<VideoEncoderConfig>,
    audio: Option<AudioEncoderConfig>,
    container: ContainerSettingsSubType,
}

impl RecorderSettings {
    /// Resolves and validates the three builders.
    ///
    /// # Errors
    ///
    /// Returns a [`SettingsError`] when a builder holds an invalid value or every stream is
    /// disabled.
    pub fn new(
        video_settings: VideoSettingsBuilder,
        audio_settings: AudioSettingsBuilder,
        container_settings: ContainerSettingsBuilder,
    ) -> Result<Self, SettingsError> {
        let video = video_settings.build()?;
        let audio = audio_settings.build()?;
        if video.is_none() && audio.is_none() {
            return Err(SettingsError::NothingToRecord);
        }

        Ok(Self { video, audio, container: container_settings.sub_type })
    }

    #[must_use]
    #[inline]
    pub const fn video(&self) -> Option<&VideoEncoderConfig> {
        self.video.as_ref()
    }

    #[must_use]
    #[inline]
    pub const fn audio(&self) -> Option<&AudioEncoderConfig> {
        self.audio.as_ref()
    }

    #[must_use]
    #[inline]
    pub const fn container(&self) -> ContainerSettingsSubType {
        self.container
    }

    /// Streams that must register a track before the container can start.
    #[must_use]
    pub fn expected_streams(&self) -> Vec<StreamKind> {
        let mut streams = Vec::with_capacity(2);
        if self.video.is_some() {
            streams.push(StreamKind::Video);
        }
        if self.audio.is_some() {
            streams.push(StreamKind::Audio);
        }
        streams
    }
}

fn validate_mime(mime: &str, kind: StreamKind) -> Result<(), SettingsError> {
    if mime.is_empty() {
        return Err(SettingsError::EmptyMimeType);
    }
    let prefix = match kind {
        StreamKind::Video => "video/",
        StreamKind::Audio => "audio/",
    };
    if !mime.starts_with(prefix) {
        return Err(SettingsError::WrongMimeType(mime.to_string(), kind));
    }
    Ok(())
}
