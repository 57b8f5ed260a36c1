//! Event routing for HTTP callback notifications.
//!
//! This module provides the `EventRouter` which holds the handler that
//! inbound GENA notifications are delivered to, and the outcome type the
//! handler reports back so the HTTP layer can pick a status code.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Generic notification payload for UPnP event notifications.
///
/// This represents an unparsed event notification received via HTTP
/// callback. It carries the raw SID header and the raw body with no
/// renderer-specific interpretation.
#[derive(Debug, Clone)]
pub struct NotificationPayload {
    /// The subscription ID exactly as sent in the SID header
    pub subscription_id: String,
    /// The raw event body
    pub event_xml: String,
}

/// What the handler decided about a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// The event was acknowledged (answered with 200)
    Accepted,
    /// The event refers to an unknown subscription or could not be used
    /// (answered with 404)
    NotFound,
}

/// Receiver of inbound notifications.
///
/// Implementors are invoked once per NOTIFY request and may run
/// concurrently for overlapping requests.
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    async fn handle(&self, payload: NotificationPayload) -> NotifyOutcome;
}

/// Routes events from HTTP callbacks to the attached handler.
///
/// The server can be started before the session that consumes its events
/// exists; until a handler is attached every notification is answered with
/// `NotFound`.
#[derive(Clone, Default)]
pub struct EventRouter {
    handler: Arc<RwLock<Option<Arc<dyn NotificationHandler>>>>,
}

impl EventRouter {
    /// Create a router with no handler attached.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the handler that receives all subsequent notifications,
    /// replacing any previous one.
    pub async fn attach(&self, handler: Arc<dyn NotificationHandler>) {
        *self.handler.write().await = Some(handler);
    }

    /// Detach the current handler.
    pub async fn detach(&self) {
        self.handler.write().await.take();
    }

    /// Whether a handler is attached.
    pub async fn is_attached(&self) -> bool {
        self.handler.read().await.is_some()
    }

    /// Route an incoming event to the attached handler.
    ///
    /// Returns `NotFound` when no handler is attached.
    pub async fn route_event(&self, subscription_id: String, event_xml: String) -> NotifyOutcome {
        // Clone the handler out so the lock is not held across the call
        let handler = self.handler.read().await.clone();

        match handler {
            Some(handler) => {
                handler
                    .handle(NotificationPayload {
                        subscription_id,
                        event_xml,
                    })
                    .await
            }
            None => NotifyOutcome::NotFound,
        }
    }
}
