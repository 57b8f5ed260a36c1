//! Private SOAP client for UPnP renderer communication
//!
//! This crate provides a minimal blocking SOAP client for talking to DLNA
//! media renderers. Control actions are POSTed to a control URL and GENA
//! event subscriptions are managed with SUBSCRIBE/UNSUBSCRIBE requests
//! against an event URL. Every request carries connect and read timeouts so
//! an unresponsive renderer never blocks the caller indefinitely.

mod error;

pub use error::SoapError;

use std::time::Duration;
use tracing::debug;
use xmltree::Element;

/// Default connect timeout for renderer requests
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for renderer requests
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Response from a UPnP subscription request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionResponse {
    /// Raw SID header returned by the renderer (usually `uuid:<id>`)
    pub sid: String,
    /// Timeout granted by the renderer in seconds, if it advertised one
    pub timeout_seconds: Option<u32>,
}

/// Wrap an action payload in a SOAP envelope.
///
/// `payload` is inserted verbatim; callers are responsible for escaping
/// argument values.
pub fn envelope(service_uri: &str, action: &str, payload: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?><s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/"><s:Body><u:{action} xmlns:u="{service_uri}">{payload}</u:{action}></s:Body></s:Envelope>"#
    )
}

/// Value of the SOAPACTION header for `action` on `service_uri`
pub fn soap_action_header(service_uri: &str, action: &str) -> String {
    format!("\"{service_uri}#{action}\"")
}

/// A minimal SOAP client for UPnP renderer communication
#[derive(Debug, Clone)]
pub struct SoapClient {
    agent: ureq::Agent,
}

impl SoapClient {
    /// Create a new SOAP client with default timeouts
    pub fn new() -> Self {
        Self::with_timeouts(DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT)
    }

    /// Create a SOAP client with explicit connect and read timeouts
    pub fn with_timeouts(connect: Duration, read: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout_connect(connect)
                .timeout_read(read)
                .build(),
        }
    }

    /// POST a prebuilt SOAP envelope and return the `<action>Response` element
    pub fn call(
        &self,
        control_url: &str,
        service_uri: &str,
        action: &str,
        body: &str,
    ) -> Result<Element, SoapError> {
        debug!(url = control_url, action, "sending SOAP action");

        let result = self
            .agent
            .post(control_url)
            .set("Content-Type", "text/xml; charset=\"utf-8\"")
            .set("SOAPACTION", &soap_action_header(service_uri, action))
            .set("Connection", "close")
            .send_string(body);

        let xml_text = match result {
            Ok(response) => response
                .into_string()
                .map_err(|e| SoapError::Network(e.to_string()))?,
            Err(ureq::Error::Status(code, response)) => {
                // Faults arrive as HTTP 500 with a SOAP body
                let text = response.into_string().unwrap_or_default();
                return match Element::parse(text.as_bytes()) {
                    Ok(xml) => match self.extract_response(&xml, action) {
                        Err(fault @ SoapError::Fault(_)) => Err(fault),
                        _ => Err(SoapError::Status(code)),
                    },
                    Err(_) => Err(SoapError::Status(code)),
                };
            }
            Err(e) => return Err(SoapError::Network(e.to_string())),
        };

        let xml = Element::parse(xml_text.as_bytes())
            .map_err(|e| SoapError::Parse(e.to_string()))?;

        self.extract_response(&xml, action)
    }

    /// Subscribe to GENA events on `event_url`
    ///
    /// # Arguments
    /// * `event_url` - Full event subscription URL of the service
    /// * `callback_url` - URL where the renderer should deliver NOTIFY requests
    /// * `timeout_seconds` - Requested subscription timeout in seconds
    pub fn subscribe(
        &self,
        event_url: &str,
        callback_url: &str,
        timeout_seconds: u32,
    ) -> Result<SubscriptionResponse, SoapError> {
        debug!(url = event_url, callback = callback_url, "sending SUBSCRIBE");

        let user_agent = format!("{} UPnP/1.1 dlna-cast", std::env::consts::OS);
        let response = self
            .agent
            .request("SUBSCRIBE", event_url)
            .set("USER-AGENT", &user_agent)
            .set("CALLBACK", &format!("<{}>", callback_url))
            .set("NT", "upnp:event")
            .set("TIMEOUT", &format!("Second-{}", timeout_seconds))
            .set("Connection", "close")
            .call()
            .map_err(map_ureq_error)?;

        ensure_ok(response.status())?;

        let sid = response
            .header("SID")
            .ok_or_else(|| SoapError::Parse("Missing SID header in SUBSCRIBE response".to_string()))?
            .to_string();

        Ok(SubscriptionResponse {
            sid,
            timeout_seconds: response.header("TIMEOUT").and_then(parse_timeout_header),
        })
    }

    /// Renew an existing GENA subscription
    ///
    /// `sid` is sent as-is in the SID header. Returns the timeout granted by
    /// the renderer, if it advertised one.
    pub fn renew_subscription(
        &self,
        event_url: &str,
        sid: &str,
        timeout_seconds: u32,
    ) -> Result<Option<u32>, SoapError> {
        debug!(url = event_url, sid, "sending SUBSCRIBE renewal");

        let response = self
            .agent
            .request("SUBSCRIBE", event_url)
            .set("SID", sid)
            .set("TIMEOUT", &format!("Second-{}", timeout_seconds))
            .set("Connection", "close")
            .call()
            .map_err(map_ureq_error)?;

        ensure_ok(response.status())?;

        Ok(response.header("TIMEOUT").and_then(parse_timeout_header))
    }

    /// Cancel a GENA subscription
    pub fn unsubscribe(&self, event_url: &str, sid: &str) -> Result<(), SoapError> {
        debug!(url = event_url, sid, "sending UNSUBSCRIBE");

        let response = self
            .agent
            .request("UNSUBSCRIBE", event_url)
            .set("SID", sid)
            .set("Connection", "close")
            .call()
            .map_err(map_ureq_error)?;

        ensure_ok(response.status())
    }

    fn extract_response(&self, xml: &Element, action: &str) -> Result<Element, SoapError> {
        let body = xml
            .get_child("Body")
            .ok_or_else(|| SoapError::Parse("Missing SOAP Body".to_string()))?;

        if let Some(fault) = body.get_child("Fault") {
            let error_code = fault
                .get_child("detail")
                .and_then(|d| d.get_child("UPnPError"))
                .and_then(|e| e.get_child("errorCode"))
                .and_then(|c| c.get_text())
                .and_then(|t| t.trim().parse::<u16>().ok())
                .unwrap_or(500);
            return Err(SoapError::Fault(error_code));
        }

        let response_name = format!("{}Response", action);
        body.get_child(response_name.as_str())
            .cloned()
            .ok_or_else(|| SoapError::Parse(format!("Missing {} element", response_name)))
    }
}

impl Default for SoapClient {
    fn default() -> Self {
        Self::new()
    }
}

fn map_ureq_error(error: ureq::Error) -> SoapError {
    match error {
        ureq::Error::Status(code, _) => SoapError::Status(code),
        other => SoapError::Network(other.to_string()),
    }
}

fn ensure_ok(status: u16) -> Result<(), SoapError> {
    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(SoapError::Status(status))
    }
}

/// Parse a `Second-<n>` TIMEOUT header. `Second-infinite` yields `None`.
fn parse_timeout_header(value: &str) -> Option<u32> {
    value
        .trim()
        .strip_prefix("Second-")
        .and_then(|s| s.trim().parse::<u32>().ok())
}
