//! Media format descriptions.

use std::collections::BTreeMap;
use std::fmt;

pub const KEY_MIME: &str = "mime";
pub const KEY_WIDTH: &str = "width";
pub const KEY_HEIGHT: &str = "height";
pub const KEY_BIT_RATE: &str = "bitrate";
pub const KEY_FRAME_RATE: &str = "frame-rate";
pub const KEY_I_FRAME_INTERVAL: &str = "i-frame-interval";
pub const KEY_COLOR_FORMAT: &str = "color-format";
pub const KEY_SAMPLE_RATE: &str = "sample-rate";
pub const KEY_CHANNEL_COUNT: &str = "channel-count";
pub const KEY_CHANNEL_MASK: &str = "channel-mask";
pub const KEY_AAC_PROFILE: &str = "aac-profile";
pub const KEY_MAX_INPUT_SIZE: &str = "max-input-size";
/// Codec specific data, e.g. SPS for AVC or the AudioSpecificConfig for AAC.
pub const KEY_CSD_0: &str = "csd-0";
/// Codec specific data, e.g. PPS for AVC.
pub const KEY_CSD_1: &str = "csd-1";

pub const MIMETYPE_VIDEO_AVC: &str = "video/avc";
pub const MIMETYPE_VIDEO_HEVC: &str = "video/hevc";
pub const MIMETYPE_VIDEO_MPEG4: &str = "video/mp4v-es";
pub const MIMETYPE_VIDEO_MPEG2: &str = "video/mpeg2";
pub const MIMETYPE_AUDIO_AAC: &str = "audio/mp4a-latm";

/// Mono input channel mask.
pub const CHANNEL_IN_MONO: i64 = 0x10;
/// Stereo input channel mask.
pub const CHANNEL_IN_STEREO: i64 = 0x0C;

/// A single value stored in a [`MediaFormat`].
#[derive(Eq, PartialEq, Clone, Debug)]
pub enum FormatValue {
    Int(i64),
    Str(String),
    Bytes(Vec<u8>),
}

impl fmt::Display for FormatValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Str(value) => f.write_str(value),
            Self::Bytes(value) => write!(f, "<{} bytes>", value.len()),
        }
    }
}

/// Key/value description of an elementary stream.
///
/// Used both as the input configuration of an encoder and as the finalized output format an
/// encoder reports once it has produced its codec specific data. The latter is handed to the
/// container writer verbatim when a track is registered.
#[derive(Eq, PartialEq, Clone, Debug, Default)]
pub struct MediaFormat {
    entries: BTreeMap<String, FormatValue>,
}

impl MediaFormat {
    #[must_use]
    #[inline]
    pub const fn new() -> Self {
        Self { entries: BTreeMap::new() }
    }

    /// Creates a minimal video format.
    #[must_use]
    #[inline]
    pub fn video(mime: &str, width: u32, height: u32) -> Self {
        let mut format = Self::new();
        format.set_string(KEY_MIME, mime);
        format.set_integer(KEY_WIDTH, i64::from(width));
        format.set_integer(KEY_HEIGHT, i64::from(height));
        format
    }

    /// Creates a minimal audio format.
    #[must_use]
    #[inline]
    pub fn audio(mime: &str, sample_rate: u32, channel_count: u32) -> Self {
        let mut format = Self::new();
        format.set_string(KEY_MIME, mime);
        format.set_integer(KEY_SAMPLE_RATE, i64::from(sample_rate));
        format.set_integer(KEY_CHANNEL_COUNT, i64::from(channel_count));
        format
    }

    #[inline]
    pub fn set_integer(&mut self, key: &str, value: i64) {
        self.entries.insert(key.to_string(), FormatValue::Int(value));
    }

    #[inline]
    pub fn set_string(&mut self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), FormatValue::Str(value.to_string()));
    }

    #[inline]
    pub fn set_bytes(&mut self, key: &str, value: Vec<u8>) {
        self.entries.insert(key.to_string(), FormatValue::Bytes(value));
    }

    #[must_use]
    #[inline]
    pub fn integer(&self, key: &str) -> Option<i64> {
        match self.entries.get(key)? {
            FormatValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    #[inline]
    pub fn string(&self, key: &str) -> Option<&str> {
        match self.entries.get(key)? {
            FormatValue::Str(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    #[inline]
    pub fn bytes(&self, key: &str) -> Option<&[u8]> {
        match self.entries.get(key)? {
            FormatValue::Bytes(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    #[inline]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    #[must_use]
    #[inline]
    pub fn mime(&self) -> Option<&str> {
        self.string(KEY_MIME)
    }

    #[must_use]
    #[inline]
    pub fn is_video(&self) -> bool {
        self.mime().is_some_and(|mime| mime.starts_with("video/"))
    }

    #[must_use]
    #[inline]
    pub fn is_audio(&self) -> bool {
        self.mime().is_some_and(|mime| mime.starts_with("audio/"))
    }

    /// Iterates over all entries in key order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FormatValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (key, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}={value}")?;
        }
        f.write_str("}")
    }
}

/// Raw pixel layouts an encoder can accept.
#[derive(Eq, PartialEq, Clone, Copy, Debug, Hash)]
pub enum ColorFormat {
    /// I420.
    Yuv420Planar,
    /// NV12.
    Yuv420SemiPlanar,
    /// Qualcomm tiled NV12 variant.
    QcomYuv420SemiPlanar,
    Yuv420Flexible,
    /// Frames are drawn onto an encoder owned input surface.
    Surface,
}

impl ColorFormat {
    #[must_use]
    #[inline]
    pub const fn code(self) -> i32 {
        match self {
            Self::Yuv420Planar => 19,
            Self::Yuv420SemiPlanar => 21,
            Self::QcomYuv420SemiPlanar => 0x7FA3_0C00,
            Self::Yuv420Flexible => 0x7F42_0888,
            Self::Surface => 0x7F00_0789,
        }
    }

    #[must_use]
    #[inline]
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            19 => Some(Self::Yuv420Planar),
            21 => Some(Self::Yuv420SemiPlanar),
            0x7FA3_0C00 => Some(Self::QcomYuv420SemiPlanar),
            0x7F42_0888 => Some(Self::Yuv420Flexible),
            0x7F00_0789 => Some(Self::Surface),
            _ => None,
        }
    }
}

/// AAC object types used for the audio stream.
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum AacProfile {
    Lc,
    He,
    Eld,
}

impl AacProfile {
    #[must_use]
    #[inline]
    pub const fn code(self) -> i64 {
        match self {
            Self::Lc => 2,
            Self::He => 5,
            Self::Eld => 39,
        }
    }
}
