//! Shared fixtures for session tests: an in-memory renderer transport that
//! records every request and answers from canned responses.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dlna_cast::{
    ActionOutput, CastConfig, CastError, CastSession, EncodedAction, MediaSource,
    RendererStateStore, RendererTransport, Result, SessionDescriptor, SubscriptionGrant,
};

pub const TRANSPORT_URL: &str = "http://renderer:49152/AVTransport/control";
pub const EVENT_URL: &str = "http://renderer:49152/AVTransport/event";
pub const RENDERING_URL: &str = "http://renderer:49152/RenderingControl/control";
pub const CALLBACK_URL: &str = "http://10.0.0.2:3500/0123456789ABCDEF0123456789ABCDEF";

/// A request the session made
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Action {
        url: String,
        action: &'static str,
        envelope: String,
    },
    Subscribe {
        callback_url: String,
        timeout: u32,
    },
    Renew {
        uuid: String,
        timeout: u32,
    },
    Unsubscribe {
        uuid: String,
    },
}

#[derive(Debug, Default)]
struct Behaviour {
    grant: Option<SubscriptionGrant>,
    renew_timeout: Option<u32>,
    fail_renew: bool,
    unsubscribe_precondition_failed: bool,
    subscribe_delay: Option<Duration>,
    failing_actions: HashSet<&'static str>,
    outputs: HashMap<&'static str, ActionOutput>,
}

#[derive(Debug, Default)]
pub struct MockTransport {
    calls: Mutex<Vec<Call>>,
    behaviour: Mutex<Behaviour>,
}

impl MockTransport {
    /// Renderer that grants `uuid` with `timeout` on SUBSCRIBE and renews
    /// with the same lease
    pub fn granting(uuid: &str, timeout: Option<u32>) -> Arc<Self> {
        let transport = Self::default();
        {
            let mut behaviour = transport.behaviour.lock().unwrap();
            behaviour.grant = Some(SubscriptionGrant {
                uuid: uuid.to_string(),
                timeout_seconds: timeout,
            });
            behaviour.renew_timeout = timeout;
        }
        Arc::new(transport)
    }

    /// Renderer that refuses SUBSCRIBE
    pub fn refusing() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// SUBSCRIBE takes `delay` to answer
    pub fn slow_subscribe(&self, delay: Duration) {
        self.behaviour.lock().unwrap().subscribe_delay = Some(delay);
    }

    pub fn set_renew_timeout(&self, timeout: Option<u32>) {
        self.behaviour.lock().unwrap().renew_timeout = timeout;
    }

    pub fn fail_renewals(&self) {
        self.behaviour.lock().unwrap().fail_renew = true;
    }

    pub fn reject_unsubscribe_with_412(&self) {
        self.behaviour.lock().unwrap().unsubscribe_precondition_failed = true;
    }

    pub fn fail_action(&self, action: &'static str) {
        self.behaviour
            .lock()
            .unwrap()
            .failing_actions
            .insert(action);
    }

    pub fn respond(&self, action: &'static str, values: &[(&str, &str)]) {
        let output = values
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.behaviour.lock().unwrap().outputs.insert(action, output);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn action_names(&self) -> Vec<&'static str> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Action { action, .. } => Some(action),
                _ => None,
            })
            .collect()
    }

    pub fn renewals(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Renew { uuid, .. } => Some(uuid),
                _ => None,
            })
            .collect()
    }

    pub fn unsubscribes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Unsubscribe { uuid } => Some(uuid),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl RendererTransport for MockTransport {
    async fn send_action(&self, control_url: &str, action: &EncodedAction) -> Result<ActionOutput> {
        self.record(Call::Action {
            url: control_url.to_string(),
            action: action.action,
            envelope: action.envelope.clone(),
        });

        let behaviour = self.behaviour.lock().unwrap();
        if behaviour.failing_actions.contains(action.action) {
            return Err(CastError::Transport("connection refused".to_string()));
        }
        Ok(behaviour
            .outputs
            .get(action.action)
            .cloned()
            .unwrap_or_default())
    }

    async fn subscribe(
        &self,
        _event_url: &str,
        callback_url: &str,
        timeout_seconds: u32,
    ) -> Result<SubscriptionGrant> {
        self.record(Call::Subscribe {
            callback_url: callback_url.to_string(),
            timeout: timeout_seconds,
        });

        let delay = self.behaviour.lock().unwrap().subscribe_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.behaviour
            .lock()
            .unwrap()
            .grant
            .clone()
            .ok_or_else(|| CastError::Transport("HTTP status 503".to_string()))
    }

    async fn renew(&self, _event_url: &str, uuid: &str, timeout_seconds: u32) -> Result<Option<u32>> {
        self.record(Call::Renew {
            uuid: uuid.to_string(),
            timeout: timeout_seconds,
        });

        let behaviour = self.behaviour.lock().unwrap();
        if behaviour.fail_renew {
            return Err(CastError::PreconditionFailed);
        }
        Ok(behaviour.renew_timeout)
    }

    async fn unsubscribe(&self, _event_url: &str, uuid: &str) -> Result<()> {
        self.record(Call::Unsubscribe {
            uuid: uuid.to_string(),
        });

        if self.behaviour.lock().unwrap().unsubscribe_precondition_failed {
            return Err(CastError::PreconditionFailed);
        }
        Ok(())
    }
}

pub fn descriptor() -> SessionDescriptor {
    SessionDescriptor {
        transport_control_url: TRANSPORT_URL.to_string(),
        event_url: EVENT_URL.to_string(),
        rendering_control_url: RENDERING_URL.to_string(),
        callback_url: CALLBACK_URL.to_string(),
        media: MediaSource::new("http://10.0.0.2:3500/movie.mp4")
            .with_mime_type("video/mp4")
            .with_subtitles("http://10.0.0.2:3500/movie.srt"),
    }
}

/// Session over `transport` with its own store
pub fn session(transport: Arc<MockTransport>) -> (CastSession, Arc<RendererStateStore>) {
    let store = Arc::new(RendererStateStore::new());
    let session = CastSession::new(descriptor(), store.clone(), transport, CastConfig::default());
    (session, store)
}

/// NOTIFY body reporting `state`, with `actions` as CurrentTransportActions
pub fn notify_body(state: &str, actions: Option<&str>) -> String {
    let actions = actions
        .map(|a| format!("&lt;CurrentTransportActions val=&quot;{a}&quot;/&gt;"))
        .unwrap_or_default();
    format!(
        r#"<?xml version="1.0"?><e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0"><e:property><LastChange>&lt;Event xmlns=&quot;urn:schemas-upnp-org:metadata-1-0/AVT/&quot;&gt;&lt;InstanceID val=&quot;0&quot;&gt;&lt;TransportState val=&quot;{state}&quot;/&gt;{actions}&lt;/InstanceID&gt;&lt;/Event&gt;</LastChange></e:property></e:propertyset>"#
    )
}
