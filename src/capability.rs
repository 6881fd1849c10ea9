//! Codec capability queries over a snapshot of the platform's codec list.

use crate::format::{ColorFormat, MIMETYPE_AUDIO_AAC, MIMETYPE_VIDEO_AVC, MIMETYPE_VIDEO_HEVC, MIMETYPE_VIDEO_MPEG2, MIMETYPE_VIDEO_MPEG4};
use crate::settings::VideoSettingsBuilder;

/// Video MIME types an MP4 container can hold, in order of preference.
pub const MP4_VIDEO_MIME_TYPES: [&str; 4] =
    [MIMETYPE_VIDEO_AVC, MIMETYPE_VIDEO_MPEG4, MIMETYPE_VIDEO_HEVC, MIMETYPE_VIDEO_MPEG2];
pub const MP4_AUDIO_MIME_TYPES: [&str; 1] = [MIMETYPE_AUDIO_AAC];

const CANDIDATE_MIME_TYPES: [&str; 2] = [MIMETYPE_VIDEO_MPEG4, MIMETYPE_VIDEO_AVC];
const CANDIDATE_COLOR_FORMATS: [ColorFormat; 3] =
    [ColorFormat::Yuv420SemiPlanar, ColorFormat::QcomYuv420SemiPlanar, ColorFormat::Yuv420Planar];

/// What one codec can do for one MIME type.
#[derive(Eq, PartialEq, Clone, Debug)]
pub struct CodecCapabilities {
    pub mime: String,
    /// Raw color format codes, vendor specific ones included.
    pub color_formats: Vec<i32>,
    pub max_width: u32,
    pub max_height: u32,
    pub max_frame_rate: u32,
}

impl CodecCapabilities {
    #[must_use]
    #[inline]
    pub fn supports_color(&self, color: ColorFormat) -> bool {
        self.color_formats.contains(&color.code())
    }

    #[must_use]
    #[inline]
    pub const fn supports_size_and_rate(&self, width: u32, height: u32, frame_rate: u32) -> bool {
        width > 0
            && height > 0
            && width <= self.max_width
            && height <= self.max_height
            && frame_rate <= self.max_frame_rate
    }
}

#[derive(Eq, PartialEq, Clone, Debug)]
pub struct CodecInfo {
    pub name: String,
    pub is_encoder: bool,
    pub capabilities: Vec<CodecCapabilities>,
}

impl CodecInfo {
    #[must_use]
    #[inline]
    pub fn capabilities_for(&self, mime: &str) -> Option<&CodecCapabilities> {
        self.capabilities.iter().find(|capabilities| capabilities.mime == mime)
    }

    #[must_use]
    #[inline]
    pub fn supports_type(&self, mime: &str) -> bool {
        self.capabilities_for(mime).is_some()
    }

    /// Software encoders shipped with the platform.
    #[must_use]
    #[inline]
    pub fn is_software(&self) -> bool {
        self.name.contains("google")
    }
}

fn encoders(codecs: &[CodecInfo]) -> impl Iterator<Item = &CodecInfo> {
    codecs.iter().filter(|info| info.is_encoder)
}

/// First MP4 video MIME type with an encoder that accepts `color`.
#[must_use]
pub fn find_mp4_video_mime(codecs: &[CodecInfo], color: ColorFormat) -> Option<&'static str> {
    MP4_VIDEO_MIME_TYPES.into_iter().find(|mime| {
        encoders(codecs).any(|info| info.capabilities_for(mime).is_some_and(|caps| caps.supports_color(color)))
    })
}

/// First MP4 audio MIME type with any encoder.
#[must_use]
pub fn find_mp4_audio_mime(codecs: &[CodecInfo]) -> Option<&'static str> {
    MP4_AUDIO_MIME_TYPES.into_iter().find(|mime| encoders(codecs).any(|info| info.supports_type(mime)))
}

/// Whether the codec list can record MPEG-4 video in `color` together with AAC audio.
///
/// Counts AAC encoders plus MPEG-4 encoders offering `color`; two hits are enough.
#[must_use]
pub fn check_support_recording(codecs: &[CodecInfo], color: ColorFormat) -> bool {
    let mut hits = 0;
    for capabilities in encoders(codecs).flat_map(|info| info.capabilities.iter()) {
        if capabilities.mime == MIMETYPE_AUDIO_AAC {
            hits += 1;
        } else if capabilities.mime == MIMETYPE_VIDEO_MPEG4 {
            hits += capabilities.color_formats.iter().filter(|&&code| code == color.code()).count();
        }
    }
    hits >= 2
}

/// A video encoder together with one MIME type and color format it accepts.
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub struct EncoderCandidate<'a> {
    pub mime: &'static str,
    pub color_format: ColorFormat,
    pub codec: &'a CodecInfo,
    pub capabilities: &'a CodecCapabilities,
}

impl EncoderCandidate<'_> {
    #[must_use]
    #[inline]
    pub fn name(&self) -> &str {
        &self.codec.name
    }

    /// Video settings targeting this encoder's MIME type and color format.
    #[must_use]
    #[inline]
    pub const fn video_settings(&self) -> VideoSettingsBuilder {
        VideoSettingsBuilder::new().mime(self.mime).color_format(self.color_format)
    }
}

/// Every (encoder, MIME type, color format) combination usable for buffer input.
#[must_use]
pub fn video_encoder_candidates(codecs: &[CodecInfo]) -> Vec<EncoderCandidate<'_>> {
    let mut candidates = Vec::new();
    for codec in encoders(codecs) {
        for mime in CANDIDATE_MIME_TYPES {
            let Some(capabilities) = codec.capabilities_for(mime) else {
                continue;
            };
            for color_format in CANDIDATE_COLOR_FORMATS {
                for _ in capabilities.color_formats.iter().filter(|&&code| code == color_format.code()) {
                    candidates.push(EncoderCandidate { mime, color_format, codec, capabilities });
                }
            }
        }
    }
    candidates
}

/// Picks the video encoder for a `width x height` recording at `frame_rate`.
///
/// Among encoders that handle the size and rate, a hardware encoder replaces an earlier pick.
/// When none does, the fallback is replaced by any wider candidate and by any candidate that
/// follows a hardware fallback.
#[must_use]
pub fn select_video_encoder(
    codecs: &[CodecInfo],
    width: u32,
    height: u32,
    frame_rate: u32,
) -> Option<EncoderCandidate<'_>> {
    let mut selected: Option<EncoderCandidate<'_>> = None;
    let mut fallback: Option<EncoderCandidate<'_>> = None;

    for candidate in video_encoder_candidates(codecs) {
        if !candidate.name().to_lowercase().contains("encoder") {
            continue;
        }

        if candidate.capabilities.supports_size_and_rate(width, height, frame_rate) {
            if selected.is_none() || !candidate.codec.is_software() {
                selected = Some(candidate);
            }
        } else {
            let replace = fallback.is_none_or(|best| {
                candidate.capabilities.max_width > best.capabilities.max_width || !best.codec.is_software()
            });
            if replace {
                fallback = Some(candidate);
            }
        }
    }

    selected.or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{AudioSettingsBuilder, ContainerSettingsBuilder, RecorderSettings};

    fn caps(mime: &str, colors: &[ColorFormat], max_width: u32) -> CodecCapabilities {
        CodecCapabilities {
            mime: mime.to_string(),
            color_formats: colors.iter().map(|color| color.code()).collect(),
            max_width,
            max_height: max_width,
            max_frame_rate: 60,
        }
    }

    fn encoder(name: &str, capabilities: Vec<CodecCapabilities>) -> CodecInfo {
        CodecInfo { name: name.to_string(), is_encoder: true, capabilities }
    }

    fn device() -> Vec<CodecInfo> {
        vec![
            CodecInfo {
                name: "OMX.qcom.video.decoder.avc".to_string(),
                is_encoder: false,
                capabilities: vec![caps(MIMETYPE_VIDEO_AVC, &[ColorFormat::Yuv420Flexible], 4096)],
            },
            encoder(
                "OMX.google.h264.encoder",
                vec![caps(MIMETYPE_VIDEO_AVC, &[ColorFormat::Yuv420Planar, ColorFormat::Yuv420Flexible], 2048)],
            ),
            encoder(
                "OMX.qcom.video.encoder.avc",
                vec![caps(MIMETYPE_VIDEO_AVC, &[ColorFormat::QcomYuv420SemiPlanar, ColorFormat::Surface], 1920)],
            ),
            encoder("OMX.google.aac.encoder", vec![caps(MIMETYPE_AUDIO_AAC, &[], 0)]),
        ]
    }

    #[test]
    fn mime_lookup_skips_decoders() {
        let codecs = device();
        assert_eq!(find_mp4_video_mime(&codecs, ColorFormat::Yuv420Flexible), Some(MIMETYPE_VIDEO_AVC));
        assert_eq!(find_mp4_video_mime(&codecs, ColorFormat::Yuv420SemiPlanar), None);
        assert_eq!(find_mp4_audio_mime(&codecs), Some(MIMETYPE_AUDIO_AAC));
        assert_eq!(find_mp4_audio_mime(&codecs[..3]), None);
    }

    #[test]
    fn recording_support_needs_mpeg4_and_aac() {
        let mut codecs = device();
        assert!(!check_support_recording(&codecs, ColorFormat::Yuv420Planar));

        codecs.push(encoder("OMX.google.mpeg4.encoder", vec![caps(MIMETYPE_VIDEO_MPEG4, &[ColorFormat::Yuv420Planar], 352)]));
        assert!(check_support_recording(&codecs, ColorFormat::Yuv420Planar));
    }

    #[test]
    fn hardware_encoder_wins_when_it_fits() {
        let codecs = device();
        let candidate = select_video_encoder(&codecs, 1280, 720, 30).unwrap();
        assert_eq!(candidate.name(), "OMX.qcom.video.encoder.avc");
        assert_eq!(candidate.color_format, ColorFormat::QcomYuv420SemiPlanar);
    }

    #[test]
    fn software_encoder_is_kept_when_alone() {
        let codecs = device();
        let candidate = select_video_encoder(&codecs[..2], 1280, 720, 30).unwrap();
        assert_eq!(candidate.name(), "OMX.google.h264.encoder");
        assert_eq!(candidate.color_format, ColorFormat::Yuv420Planar);
    }

    #[test]
    fn oversized_request_falls_back() {
        let codecs = device();
        let candidate = select_video_encoder(&codecs, 3840, 2160, 30).unwrap();
        // The narrower hardware encoder does not replace the wider software one.
        assert_eq!(candidate.name(), "OMX.google.h264.encoder");

        let mut reordered = vec![codecs[2].clone(), codecs[1].clone()];
        let candidate = select_video_encoder(&reordered, 3840, 2160, 30).unwrap();
        assert_eq!(candidate.name(), "OMX.google.h264.encoder");

        reordered.reverse();
        reordered[1].capabilities[0].max_width = 4096;
        reordered[1].capabilities[0].max_height = 2048;
        let candidate = select_video_encoder(&reordered, 3840, 2160, 30).unwrap();
        assert_eq!(candidate.name(), "OMX.qcom.video.encoder.avc");
        assert!(select_video_encoder(&codecs[3..], 640, 480, 30).is_none());
    }

    #[test]
    fn candidate_settings_carry_mime_and_color() {
        let codecs = device();
        let candidate = select_video_encoder(&codecs, 640, 480, 30).unwrap();
        let settings = RecorderSettings::new(
            candidate.video_settings(),
            AudioSettingsBuilder::new(),
            ContainerSettingsBuilder::new(),
        )
        .unwrap();
        let video = settings.video().unwrap();
        assert_eq!(video.mime, MIMETYPE_VIDEO_AVC);
        assert_eq!(video.color_format, ColorFormat::QcomYuv420SemiPlanar);
    }
}
