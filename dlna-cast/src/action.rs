//! Control actions and their SOAP encoding
//!
//! Every action a session sends to a renderer is described by [`Action`] and
//! turned into a ready-to-POST envelope by [`encode`]. Encoding is pure and
//! only fails on structurally invalid parameters.

use quick_xml::escape::escape;
use url::Url;

use crate::content_features::{self, SeekSupport};
use crate::error::EncodingError;

/// UPnP services a renderer exposes for casting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    /// Playback control (SetAVTransportURI, Play, Pause, Stop)
    AVTransport,
    /// Audio rendering (volume, mute)
    RenderingControl,
}

impl Service {
    pub fn name(&self) -> &'static str {
        match self {
            Service::AVTransport => "AVTransport",
            Service::RenderingControl => "RenderingControl",
        }
    }

    /// Service type URI used in the envelope and SOAPACTION header
    pub fn uri(&self) -> &'static str {
        match self {
            Service::AVTransport => "urn:schemas-upnp-org:service:AVTransport:1",
            Service::RenderingControl => "urn:schemas-upnp-org:service:RenderingControl:1",
        }
    }
}

/// Media handed to the renderer by SetAVTransportURI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSource {
    /// URL the renderer fetches the media from
    pub media_url: String,
    /// Optional subtitle URL advertised in the DIDL-Lite metadata
    pub subtitle_url: Option<String>,
    /// MIME type of the media, used for the DLNA protocolInfo
    pub mime_type: Option<String>,
}

impl MediaSource {
    pub fn new(media_url: impl Into<String>) -> Self {
        Self {
            media_url: media_url.into(),
            subtitle_url: None,
            mime_type: None,
        }
    }

    pub fn with_subtitles(mut self, subtitle_url: impl Into<String>) -> Self {
        self.subtitle_url = Some(subtitle_url.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

/// A control action sent to a renderer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    SetAVTransportURI(MediaSource),
    Play,
    Pause,
    Stop,
    GetVolume,
    /// Desired volume, 0..=100
    SetVolume(u8),
    GetMute,
    SetMute(bool),
}

impl Action {
    /// SOAP action name
    pub fn name(&self) -> &'static str {
        match self {
            Action::SetAVTransportURI(_) => "SetAVTransportURI",
            Action::Play => "Play",
            Action::Pause => "Pause",
            Action::Stop => "Stop",
            Action::GetVolume => "GetVolume",
            Action::SetVolume(_) => "SetVolume",
            Action::GetMute => "GetMute",
            Action::SetMute(_) => "SetMute",
        }
    }

    pub fn service(&self) -> Service {
        match self {
            Action::SetAVTransportURI(_) | Action::Play | Action::Pause | Action::Stop => {
                Service::AVTransport
            }
            Action::GetVolume | Action::SetVolume(_) | Action::GetMute | Action::SetMute(_) => {
                Service::RenderingControl
            }
        }
    }

    /// Whether the response carries values the caller needs
    pub fn has_output(&self) -> bool {
        matches!(self, Action::GetVolume | Action::GetMute)
    }
}

/// An action ready to be POSTed to its service's control URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAction {
    pub service: Service,
    pub action: &'static str,
    /// Complete SOAP envelope
    pub envelope: String,
}

impl EncodedAction {
    /// Value for the SOAPACTION header
    pub fn soap_action(&self) -> String {
        soap_client::soap_action_header(self.service.uri(), self.action)
    }
}

/// Encode `action` into a SOAP envelope
pub fn encode(action: &Action) -> Result<EncodedAction, EncodingError> {
    let payload = match action {
        Action::SetAVTransportURI(source) => set_av_transport_uri_payload(source)?,
        Action::Play => "<InstanceID>0</InstanceID><Speed>1</Speed>".to_string(),
        Action::Pause | Action::Stop => "<InstanceID>0</InstanceID>".to_string(),
        Action::GetVolume | Action::GetMute => {
            "<InstanceID>0</InstanceID><Channel>Master</Channel>".to_string()
        }
        Action::SetVolume(level) => {
            if *level > 100 {
                return Err(EncodingError::OutOfRange {
                    parameter: "DesiredVolume",
                    value: i64::from(*level),
                    min: 0,
                    max: 100,
                });
            }
            format!("<InstanceID>0</InstanceID><Channel>Master</Channel><DesiredVolume>{level}</DesiredVolume>")
        }
        Action::SetMute(on) => format!(
            "<InstanceID>0</InstanceID><Channel>Master</Channel><DesiredMute>{}</DesiredMute>",
            if *on { 1 } else { 0 }
        ),
    };

    let service = action.service();
    Ok(EncodedAction {
        service,
        action: action.name(),
        envelope: soap_client::envelope(service.uri(), action.name(), &payload),
    })
}

impl Action {
    /// Shorthand for [`encode`]
    pub fn encode(&self) -> Result<EncodedAction, EncodingError> {
        encode(self)
    }
}

fn set_av_transport_uri_payload(source: &MediaSource) -> Result<String, EncodingError> {
    let media = parse_media_url("CurrentURI", &source.media_url)?;
    if let Some(subtitle_url) = &source.subtitle_url {
        parse_media_url("subtitle_url", subtitle_url)?;
    }

    let metadata = didl_lite(source, &title_from_url(&media));

    Ok(format!(
        "<InstanceID>0</InstanceID><CurrentURI>{}</CurrentURI><CurrentURIMetaData>{}</CurrentURIMetaData>",
        escape(source.media_url.as_str()),
        escape(metadata.as_str()),
    ))
}

fn parse_media_url(parameter: &'static str, value: &str) -> Result<Url, EncodingError> {
    if value.trim().is_empty() {
        return Err(EncodingError::MissingParameter { parameter });
    }

    let url = Url::parse(value).map_err(|e| EncodingError::InvalidValue {
        parameter,
        value: value.to_string(),
        reason: e.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(EncodingError::InvalidValue {
            parameter,
            value: value.to_string(),
            reason: "renderers can only fetch http(s) URLs".to_string(),
        });
    }

    Ok(url)
}

/// Last non-empty path segment, or the host for bare URLs
fn title_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .or_else(|| url.host_str())
        .unwrap_or("media")
        .to_string()
}

fn protocol_info(mime_type: Option<&str>) -> String {
    match mime_type.filter(|m| !m.is_empty()) {
        Some(mime) => match content_features::build(Some(mime), SeekSupport::Range, false) {
            Ok(features) => format!("http-get:*:{mime}:{features}"),
            Err(_) => format!("http-get:*:{mime}:*"),
        },
        None => "http-get:*:*:*".to_string(),
    }
}

/// DIDL-Lite item describing the media and its subtitles
fn didl_lite(source: &MediaSource, title: &str) -> String {
    let mut item = String::new();

    if let Some(subtitle_url) = &source.subtitle_url {
        let subtitle = escape(subtitle_url.as_str());
        item.push_str(&format!(
            r#"<sec:CaptionInfo sec:type="srt">{subtitle}</sec:CaptionInfo><sec:CaptionInfoEx sec:type="srt">{subtitle}</sec:CaptionInfoEx>"#
        ));
    }

    item.push_str(&format!(
        r#"<dc:title>{}</dc:title><upnp:class>object.item.videoItem.movie</upnp:class><res protocolInfo="{}">{}</res>"#,
        escape(title),
        escape(protocol_info(source.mime_type.as_deref()).as_str()),
        escape(source.media_url.as_str()),
    ));

    if let Some(subtitle_url) = &source.subtitle_url {
        item.push_str(&format!(
            r#"<res protocolInfo="http-get:*:text/srt:*">{}</res>"#,
            escape(subtitle_url.as_str())
        ));
    }

    format!(
        r#"<DIDL-Lite xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:upnp="urn:schemas-upnp-org:metadata-1-0/upnp/" xmlns:sec="http://www.sec.co.kr/" xmlns:dlna="urn:schemas-dlna-org:metadata-1-0/"><item id="0" parentID="-1" restricted="1">{item}</item></DIDL-Lite>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_play_envelope() {
        let encoded = encode(&Action::Play).unwrap();
        assert_eq!(encoded.service, Service::AVTransport);
        assert_eq!(encoded.action, "Play");
        assert_eq!(
            encoded.soap_action(),
            "\"urn:schemas-upnp-org:service:AVTransport:1#Play\""
        );
        assert!(encoded.envelope.contains(
            r#"<u:Play xmlns:u="urn:schemas-upnp-org:service:AVTransport:1"><InstanceID>0</InstanceID><Speed>1</Speed></u:Play>"#
        ));
    }

    #[test]
    fn test_pause_and_stop() {
        for action in [Action::Pause, Action::Stop] {
            let encoded = encode(&action).unwrap();
            assert!(encoded.envelope.contains(&format!(
                "<u:{name} xmlns:u=\"urn:schemas-upnp-org:service:AVTransport:1\"><InstanceID>0</InstanceID></u:{name}>",
                name = action.name()
            )));
        }
    }

    #[test]
    fn test_volume_actions() {
        let encoded = encode(&Action::SetVolume(42)).unwrap();
        assert_eq!(encoded.service, Service::RenderingControl);
        assert!(encoded.envelope.contains(
            "<InstanceID>0</InstanceID><Channel>Master</Channel><DesiredVolume>42</DesiredVolume>"
        ));

        let encoded = encode(&Action::GetVolume).unwrap();
        assert!(encoded
            .envelope
            .contains("<u:GetVolume xmlns:u=\"urn:schemas-upnp-org:service:RenderingControl:1\">"));
        assert!(Action::GetVolume.has_output());
        assert!(!Action::SetVolume(1).has_output());
    }

    #[test]
    fn test_volume_out_of_range() {
        assert!(encode(&Action::SetVolume(100)).is_ok());
        assert_eq!(
            encode(&Action::SetVolume(101)),
            Err(EncodingError::OutOfRange {
                parameter: "DesiredVolume",
                value: 101,
                min: 0,
                max: 100,
            })
        );
    }

    #[test]
    fn test_mute_actions() {
        let on = encode(&Action::SetMute(true)).unwrap();
        assert!(on.envelope.contains("<DesiredMute>1</DesiredMute>"));
        let off = encode(&Action::SetMute(false)).unwrap();
        assert!(off.envelope.contains("<DesiredMute>0</DesiredMute>"));
        assert_eq!(encode(&Action::GetMute).unwrap().action, "GetMute");
    }

    #[test]
    fn test_set_av_transport_uri() {
        let source = MediaSource::new("http://192.168.1.10:3500/Big%20Movie.mp4?a=1&b=2")
            .with_mime_type("video/mp4")
            .with_subtitles("http://192.168.1.10:3500/subs.srt");
        let encoded = encode(&Action::SetAVTransportURI(source)).unwrap();

        assert_eq!(encoded.action, "SetAVTransportURI");
        assert!(encoded.envelope.contains(
            "<CurrentURI>http://192.168.1.10:3500/Big%20Movie.mp4?a=1&amp;b=2</CurrentURI>"
        ));
        // Metadata is embedded as escaped text
        assert!(encoded.envelope.contains("<CurrentURIMetaData>&lt;DIDL-Lite"));
        assert!(encoded.envelope.contains("&lt;dc:title&gt;Big%20Movie.mp4&lt;/dc:title&gt;"));
        assert!(encoded
            .envelope
            .contains("&lt;sec:CaptionInfoEx sec:type=&quot;srt&quot;&gt;http://192.168.1.10:3500/subs.srt"));
        assert!(encoded.envelope.contains("DLNA.ORG_PN=AVC_MP4_MP_SD_AAC_MULT5"));
        // The ampersand is escaped once for DIDL and once more for the envelope
        assert!(encoded.envelope.contains("a=1&amp;amp;b=2"));
    }

    #[test]
    fn test_set_av_transport_uri_without_subtitles() {
        let encoded =
            encode(&Action::SetAVTransportURI(MediaSource::new("http://host/video.mkv"))).unwrap();
        assert!(!encoded.envelope.contains("CaptionInfo"));
        assert!(encoded.envelope.contains("http-get:*:*:*"));
    }

    #[test]
    fn test_invalid_media_urls() {
        assert_eq!(
            encode(&Action::SetAVTransportURI(MediaSource::new(""))),
            Err(EncodingError::MissingParameter {
                parameter: "CurrentURI"
            })
        );
        assert!(matches!(
            encode(&Action::SetAVTransportURI(MediaSource::new("not a url"))),
            Err(EncodingError::InvalidValue { parameter: "CurrentURI", .. })
        ));
        assert!(matches!(
            encode(&Action::SetAVTransportURI(MediaSource::new("file:///tmp/a.mp4"))),
            Err(EncodingError::InvalidValue { .. })
        ));
        assert!(matches!(
            encode(&Action::SetAVTransportURI(
                MediaSource::new("http://host/a.mp4").with_subtitles("::")
            )),
            Err(EncodingError::InvalidValue { parameter: "subtitle_url", .. })
        ));
    }

    #[test]
    fn test_title_from_url() {
        let url = Url::parse("http://host:3500/dir/clip.mp4").unwrap();
        assert_eq!(title_from_url(&url), "clip.mp4");
        let url = Url::parse("http://host:3500/").unwrap();
        assert_eq!(title_from_url(&url), "host");
    }

    #[test]
    fn test_unknown_mime_protocol_info() {
        assert_eq!(protocol_info(Some("video/webm")), "http-get:*:video/webm:*");
    }
}
