//! Handling of inbound GENA NOTIFY requests for a session
//!
//! The callback server hands every NOTIFY to a [`CallbackEndpoint`], which
//! decides the status code: 200 for accepted events, 404 for events that are
//! malformed or belong to a subscription that is no longer live.

use async_trait::async_trait;
use callback_server::{NotificationHandler, NotificationPayload, NotifyOutcome};
use tracing::{debug, info};

use crate::parser;
use crate::session::{CastSession, RendererEvent};
use crate::transport::normalize_sid;

/// NOTIFY handler bound to one [`CastSession`]
#[derive(Debug, Clone)]
pub struct CallbackEndpoint {
    session: CastSession,
}

impl CallbackEndpoint {
    pub fn new(session: CastSession) -> Self {
        Self { session }
    }

    /// Handle one notification given its raw `SID` header and body.
    ///
    /// The very first event a session sees is acknowledged without being
    /// applied. After that, events are parsed and applied to the state store;
    /// `STOPPED` unsubscribes the renderer and ends the session.
    pub async fn handle_notify(&self, sid: &str, body: &str) -> NotifyOutcome {
        let uuid = normalize_sid(sid);

        if self.session.observe_event() == 0 {
            debug!(%uuid, "first event of session acknowledged without update");
            return NotifyOutcome::Accepted;
        }

        let change = match parser::parse(body) {
            Ok(change) => change,
            Err(e) => {
                debug!(%uuid, error = %e, "dropping unparseable event");
                return NotifyOutcome::NotFound;
            }
        };

        let store = self.session.store();
        let Some(sequence) = store.apply(&uuid, &change.previous_state, &change.new_state) else {
            debug!(%uuid, state = %change.new_state, "event for subscription that is not live");
            return NotifyOutcome::NotFound;
        };

        self.session.publish(RendererEvent {
            uuid: uuid.clone(),
            previous_state: change.previous_state.clone(),
            new_state: change.new_state.clone(),
            sequence,
        });

        match change.new_state.as_str() {
            "PLAYING" => {
                self.session.note_paused(false);
                info!(%uuid, sequence, "renderer playing");
            }
            "PAUSED_PLAYBACK" => {
                self.session.note_paused(true);
                info!(%uuid, sequence, "renderer paused");
            }
            "STOPPED" => {
                info!(%uuid, sequence, "renderer stopped, ending session");
                self.session.renderer_stopped(&uuid).await;
            }
            other => debug!(%uuid, sequence, state = other, "transport state changed"),
        }

        NotifyOutcome::Accepted
    }
}

#[async_trait]
impl NotificationHandler for CallbackEndpoint {
    async fn handle(&self, payload: NotificationPayload) -> NotifyOutcome {
        self.handle_notify(&payload.subscription_id, &payload.event_xml)
            .await
    }
}
