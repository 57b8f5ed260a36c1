//! DLNA `contentFeatures.dlna.org` values
//!
//! The same string is used in the `protocolInfo` of DIDL-Lite `res` elements
//! and in the `contentFeatures.dlna.org` header of whatever serves the media.

use crate::error::EncodingError;

const FLAG_STREAMING_TRANSFER_MODE: u32 = 1 << 24;
const FLAG_BACKGROUND_TRANSFER_MODE: u32 = 1 << 22;
const FLAG_CONNECTION_STALL: u32 = 1 << 21;
const FLAG_DLNA_V15: u32 = 1 << 20;

/// Known MIME types and their DLNA profile parameter
const PROFILES: &[(&str, &str)] = &[
    ("video/x-mkv", "DLNA.ORG_PN=MATROSKA"),
    ("video/x-matroska", "DLNA.ORG_PN=MATROSKA"),
    ("video/x-msvideo", "DLNA.ORG_PN=AVI"),
    ("video/mpeg", "DLNA.ORG_PN=MPEG1"),
    ("video/vnd.dlna.mpeg-tts", "DLNA.ORG_PN=MPEG1"),
    ("video/mp4", "DLNA.ORG_PN=AVC_MP4_MP_SD_AAC_MULT5"),
    ("video/quicktime", "DLNA.ORG_PN=AVC_MP4_MP_SD_AAC_MULT5"),
    ("video/x-m4v", "DLNA.ORG_PN=AVC_MP4_MP_SD_AAC_MULT5"),
    ("video/3gpp", "DLNA.ORG_PN=AVC_MP4_MP_SD_AAC_MULT5"),
    ("video/x-flv", "DLNA.ORG_PN=AVC_MP4_MP_SD_AAC_MULT5"),
    ("audio/mpeg", "DLNA.ORG_PN=MP3"),
    ("image/jpeg", "JPEG_LRG"),
    ("image/png", "PNG_LRG"),
];

/// Seek operations the media server supports (`DLNA.ORG_OP`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeekSupport {
    /// Neither time seek nor byte range
    None,
    /// Byte range requests
    #[default]
    Range,
    /// Time seek range requests
    TimeSeek,
    /// Both time seek and byte range
    Both,
}

impl SeekSupport {
    fn op_value(self) -> &'static str {
        match self {
            SeekSupport::None => "00",
            SeekSupport::Range => "01",
            SeekSupport::TimeSeek => "10",
            SeekSupport::Both => "11",
        }
    }
}

/// DLNA profile parameter for `mime`, if it is a known type
pub fn profile_for(mime: &str) -> Option<&'static str> {
    PROFILES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(mime))
        .map(|(_, profile)| *profile)
}

/// Default `DLNA.ORG_FLAGS` value: streaming, background transfer,
/// connection stall and DLNA 1.5, as 8 significant hex digits padded with
/// 24 reserved zeros.
pub fn default_streaming_flags() -> String {
    let flags = FLAG_STREAMING_TRANSFER_MODE
        | FLAG_BACKGROUND_TRANSFER_MODE
        | FLAG_CONNECTION_STALL
        | FLAG_DLNA_V15;
    format!("{:08x}{:024x}", flags, 0)
}

/// Build a `contentFeatures.dlna.org` value.
///
/// With `mime` set, the type must be one of the known profiles; with `None`
/// the profile parameter is omitted.
pub fn build(mime: Option<&str>, seek: SeekSupport, transcode: bool) -> Result<String, EncodingError> {
    let mut features = String::new();

    if let Some(mime) = mime.filter(|m| !m.is_empty()) {
        let profile = profile_for(mime).ok_or_else(|| EncodingError::InvalidValue {
            parameter: "mime_type",
            value: mime.to_string(),
            reason: "no DLNA profile for this media type".to_string(),
        })?;
        features.push_str(profile);
        features.push(';');
    }

    features.push_str("DLNA.ORG_OP=");
    features.push_str(seek.op_value());
    features.push_str(";DLNA.ORG_CI=");
    features.push_str(if transcode { "1" } else { "0" });
    features.push_str(";DLNA.ORG_FLAGS=");
    features.push_str(&default_streaming_flags());

    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_flags() {
        let flags = default_streaming_flags();
        assert_eq!(flags.len(), 32);
        assert_eq!(flags, "01700000000000000000000000000000");
    }

    #[test]
    fn test_build_mp4() {
        let features = build(Some("video/mp4"), SeekSupport::Range, false).unwrap();
        assert_eq!(
            features,
            "DLNA.ORG_PN=AVC_MP4_MP_SD_AAC_MULT5;DLNA.ORG_OP=01;DLNA.ORG_CI=0;DLNA.ORG_FLAGS=01700000000000000000000000000000"
        );
    }

    #[test]
    fn test_build_without_mime() {
        let features = build(None, SeekSupport::Both, true).unwrap();
        assert!(features.starts_with("DLNA.ORG_OP=11;DLNA.ORG_CI=1;"));
        assert!(!features.contains("DLNA.ORG_PN"));
    }

    #[test]
    fn test_unknown_mime_rejected() {
        assert!(matches!(
            build(Some("video/x-unknown"), SeekSupport::Range, false),
            Err(EncodingError::InvalidValue { parameter: "mime_type", .. })
        ));
    }

    #[test]
    fn test_profile_lookup_ignores_case() {
        assert_eq!(profile_for("Video/X-Matroska"), Some("DLNA.ORG_PN=MATROSKA"));
        assert_eq!(profile_for("text/plain"), None);
    }
}
