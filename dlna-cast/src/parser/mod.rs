//! Parsing of GENA NOTIFY bodies sent by AVTransport.
//!
//! A notification is a `propertyset` whose `LastChange` property carries an
//! escaped `Event` document:
//!
//! ```xml
//! <e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">
//!   <e:property>
//!     <LastChange>&lt;Event xmlns="urn:schemas-upnp-org:metadata-1-0/AVT/"&gt;
//!       &lt;InstanceID val="0"&gt;
//!         &lt;TransportState val="PLAYING"/&gt;
//!         &lt;CurrentTransportActions val="Pause,Stop"/&gt;
//!       &lt;/InstanceID&gt;
//!     &lt;/Event&gt;</LastChange>
//!   </e:property>
//! </e:propertyset>
//! ```
//!
//! The body is entity-unescaped once as a whole, which turns the embedded
//! event into ordinary child elements, and is then deserialized in one pass.

pub mod xml_decode;

use serde::Deserialize;

use crate::error::ParseError;
use xml_decode::ValueAttribute;

/// Transport state pair carried by one notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportChange {
    /// `CurrentTransportActions` reported alongside the new state; empty
    /// when the renderer did not send it
    pub previous_state: String,
    /// `TransportState` value, never empty
    pub new_state: String,
}

#[derive(Debug, Deserialize)]
struct PropertySet {
    #[serde(rename = "property", default)]
    properties: Vec<Property>,
}

#[derive(Debug, Deserialize)]
struct Property {
    #[serde(rename = "LastChange")]
    last_change: Option<LastChange>,
}

#[derive(Debug, Deserialize)]
struct LastChange {
    #[serde(rename = "Event")]
    event: Option<LastChangeEvent>,
}

#[derive(Debug, Deserialize)]
struct LastChangeEvent {
    #[serde(rename = "InstanceID", default)]
    instances: Vec<InstanceState>,
}

#[derive(Debug, Deserialize)]
struct InstanceState {
    #[serde(rename = "TransportState")]
    transport_state: Option<ValueAttribute>,
    #[serde(rename = "CurrentTransportActions")]
    current_transport_actions: Option<ValueAttribute>,
}

/// Extract the transport state pair from a NOTIFY body.
///
/// The last instance reporting a non-empty `TransportState` wins. A body
/// with no such value is an error.
pub fn parse(body: &str) -> Result<TransportChange, ParseError> {
    let unescaped = xml_decode::unescape_entities(body)?;
    let property_set: PropertySet = xml_decode::parse(&unescaped)?;

    property_set
        .properties
        .into_iter()
        .filter_map(|property| property.last_change)
        .filter_map(|last_change| last_change.event)
        .flat_map(|event| event.instances)
        .filter_map(|instance| {
            let new_state = instance.transport_state?.val;
            if new_state.is_empty() {
                return None;
            }
            Some(TransportChange {
                previous_state: instance
                    .current_transport_actions
                    .map(|actions| actions.val)
                    .unwrap_or_default(),
                new_state,
            })
        })
        .last()
        .ok_or(ParseError::MissingTransportState)
}
