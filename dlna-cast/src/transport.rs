//! Outbound communication with a renderer
//!
//! [`RendererTransport`] is the seam between the session logic and the
//! network. [`SoapTransport`] is the production implementation on top of the
//! blocking [`soap_client::SoapClient`]; every call runs on tokio's blocking
//! pool so the async callers never stall a runtime worker.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use soap_client::SoapClient;
use tracing::debug;

use crate::action::EncodedAction;
use crate::config::CastConfig;
use crate::error::{CastError, Result};

/// Output arguments of an action response, keyed by argument name
pub type ActionOutput = HashMap<String, String>;

/// Subscription granted by the renderer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionGrant {
    /// Identifier without the `uuid:` prefix
    pub uuid: String,
    /// Lease advertised in the `TIMEOUT` header, if any
    pub timeout_seconds: Option<u32>,
}

/// Requests a session makes against a renderer
#[async_trait]
pub trait RendererTransport: Send + Sync + 'static {
    /// POST an encoded action to `control_url` and return its output arguments
    async fn send_action(&self, control_url: &str, action: &EncodedAction) -> Result<ActionOutput>;

    /// First-time SUBSCRIBE
    async fn subscribe(
        &self,
        event_url: &str,
        callback_url: &str,
        timeout_seconds: u32,
    ) -> Result<SubscriptionGrant>;

    /// Renewal SUBSCRIBE for `uuid`; returns the advertised lease
    async fn renew(&self, event_url: &str, uuid: &str, timeout_seconds: u32) -> Result<Option<u32>>;

    /// UNSUBSCRIBE `uuid`
    async fn unsubscribe(&self, event_url: &str, uuid: &str) -> Result<()>;
}

/// Strip the `uuid:` prefix and any surrounding `<>`/`[]` brackets or
/// whitespace from a SID header value.
pub fn normalize_sid(sid: &str) -> String {
    let trimmed = sid
        .trim()
        .trim_matches(|c| matches!(c, '<' | '>' | '[' | ']'))
        .trim();
    trimmed
        .strip_prefix("uuid:")
        .unwrap_or(trimmed)
        .to_string()
}

/// SID header value for `uuid`
pub fn sid_header(uuid: &str) -> String {
    format!("uuid:{uuid}")
}

/// [`RendererTransport`] over SOAP/GENA HTTP requests
#[derive(Debug, Clone)]
pub struct SoapTransport {
    client: Arc<SoapClient>,
}

impl SoapTransport {
    pub fn new(client: SoapClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    /// Transport using the HTTP timeouts from `config`
    pub fn from_config(config: &CastConfig) -> Self {
        Self::new(SoapClient::with_timeouts(
            config.connect_timeout,
            config.read_timeout,
        ))
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&SoapClient) -> std::result::Result<T, soap_client::SoapError> + Send + 'static,
    {
        let client = Arc::clone(&self.client);
        tokio::task::spawn_blocking(move || f(&client))
            .await
            .map_err(|e| CastError::Transport(format!("renderer request task failed: {e}")))?
            .map_err(CastError::from)
    }
}

impl Default for SoapTransport {
    fn default() -> Self {
        Self::new(SoapClient::new())
    }
}

#[async_trait]
impl RendererTransport for SoapTransport {
    async fn send_action(&self, control_url: &str, action: &EncodedAction) -> Result<ActionOutput> {
        let control_url = control_url.to_string();
        let service_uri = action.service.uri();
        let name = action.action;
        let envelope = action.envelope.clone();

        let response = self
            .blocking(move |client| client.call(&control_url, service_uri, name, &envelope))
            .await?;

        let output = response
            .children
            .iter()
            .filter_map(|node| node.as_element())
            .map(|element| {
                let text = element
                    .get_text()
                    .map(|t| t.into_owned())
                    .unwrap_or_default();
                (element.name.clone(), text)
            })
            .collect::<ActionOutput>();

        debug!(action = name, ?output, "action completed");
        Ok(output)
    }

    async fn subscribe(
        &self,
        event_url: &str,
        callback_url: &str,
        timeout_seconds: u32,
    ) -> Result<SubscriptionGrant> {
        let event_url = event_url.to_string();
        let callback_url = callback_url.to_string();

        let response = self
            .blocking(move |client| client.subscribe(&event_url, &callback_url, timeout_seconds))
            .await?;

        let uuid = normalize_sid(&response.sid);
        if uuid.is_empty() {
            return Err(CastError::Response("empty SID in SUBSCRIBE response".to_string()));
        }

        Ok(SubscriptionGrant {
            uuid,
            timeout_seconds: response.timeout_seconds,
        })
    }

    async fn renew(&self, event_url: &str, uuid: &str, timeout_seconds: u32) -> Result<Option<u32>> {
        let event_url = event_url.to_string();
        let sid = sid_header(uuid);

        self.blocking(move |client| client.renew_subscription(&event_url, &sid, timeout_seconds))
            .await
    }

    async fn unsubscribe(&self, event_url: &str, uuid: &str) -> Result<()> {
        let event_url = event_url.to_string();
        let sid = sid_header(uuid);

        self.blocking(move |client| client.unsubscribe(&event_url, &sid))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_sid() {
        assert_eq!(normalize_sid("uuid:abc"), "abc");
        assert_eq!(normalize_sid("<uuid:abc>"), "abc");
        assert_eq!(normalize_sid("[uuid:abc]"), "abc");
        assert_eq!(normalize_sid(" [ uuid:abc ] "), "abc");
        assert_eq!(normalize_sid("  uuid:RINCON_1-2  "), "RINCON_1-2");
        assert_eq!(normalize_sid("abc"), "abc");
        assert_eq!(normalize_sid(""), "");
    }

    #[test]
    fn test_sid_header() {
        assert_eq!(sid_header("abc"), "uuid:abc");
        assert_eq!(normalize_sid(&sid_header("abc")), "abc");
    }
}
