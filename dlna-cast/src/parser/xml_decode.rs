//! XML decoding helpers for GENA event bodies.
//!
//! Renderers prefix element names with arbitrary namespace aliases
//! (`e:propertyset`, `s:property`, ...). The serde types in this crate are
//! written against local names, so documents are rewritten without prefixes
//! or namespace declarations before deserializing.

use std::borrow::Cow;

use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::name::QName;
use quick_xml::{Reader, Writer};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::ParseError;

/// An element whose value lives in its `val` attribute:
///
/// ```xml
/// <TransportState val="PLAYING"/>
/// ```
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct ValueAttribute {
    #[serde(rename = "@val", default)]
    pub val: String,
}

/// Replace every XML entity in `text` with the character it stands for.
pub fn unescape_entities(text: &str) -> Result<Cow<'_, str>, ParseError> {
    quick_xml::escape::unescape(text).map_err(|e| ParseError::Unescape(e.to_string()))
}

/// Deserialize `xml` into `T` after removing namespace prefixes.
pub fn parse<T: DeserializeOwned>(xml: &str) -> Result<T, ParseError> {
    let stripped = strip_namespaces(xml)?;
    quick_xml::de::from_str(&stripped).map_err(|e| ParseError::Xml(e.to_string()))
}

/// Rewrite `xml` using local names only.
///
/// Namespace declarations, the XML declaration, comments and processing
/// instructions are dropped; whitespace-only text is trimmed.
pub fn strip_namespaces(xml: &str) -> Result<String, ParseError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));

    loop {
        let event = reader
            .read_event()
            .map_err(|e| ParseError::Xml(format!("at position {}: {e}", reader.buffer_position())))?;

        let rewritten = match event {
            Event::Start(start) => Event::Start(local_start(&start)),
            Event::Empty(start) => Event::Empty(local_start(&start)),
            Event::End(end) => Event::End(BytesEnd::new(
                String::from_utf8_lossy(end.local_name().as_ref()).into_owned(),
            )),
            Event::Text(text) => Event::Text(text),
            Event::CData(data) => Event::CData(data),
            Event::Eof => break,
            Event::Decl(_) | Event::PI(_) | Event::Comment(_) | Event::DocType(_) => continue,
        };

        writer
            .write_event(rewritten)
            .map_err(|e| ParseError::Xml(e.to_string()))?;
    }

    String::from_utf8(writer.into_inner()).map_err(|e| ParseError::Xml(e.to_string()))
}

fn local_start(start: &BytesStart<'_>) -> BytesStart<'static> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut local = BytesStart::new(name);

    for attr in start.attributes().with_checks(false).flatten() {
        let key = attr.key.as_ref();
        if key == b"xmlns" || key.starts_with(b"xmlns:") {
            continue;
        }
        local.push_attribute(Attribute {
            key: QName(attr.key.local_name().into_inner()),
            value: attr.value,
        });
    }

    local
}
