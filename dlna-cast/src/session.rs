//! Cast session: subscription lifecycle and renderer control
//!
//! A [`CastSession`] owns one cast to one renderer. It subscribes to the
//! renderer's AVTransport events, keeps the subscription alive with renewal
//! timers, hands the media to the renderer and sends control actions.
//!
//! Renewal timers are tokio tasks whose handles live in the session's timer
//! set. A timer holds only a weak reference to the session, removes its own
//! entry when it fires, refreshes the subscription and, on success, arms its
//! replacement. Stopping the session stops the timer set under its lock, so
//! a timer that wakes up during teardown never re-arms.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use callback_server::EventRouter;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::action::{encode, Action, MediaSource, Service};
use crate::callback::CallbackEndpoint;
use crate::config::CastConfig;
use crate::error::{CastError, Result};
use crate::renewal::{renewal_interval, RenewalTimers};
use crate::store::RendererStateStore;
use crate::transport::{ActionOutput, RendererTransport, SoapTransport};

/// Endpoints and media for one cast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescriptor {
    /// AVTransport control URL
    pub transport_control_url: String,
    /// AVTransport event subscription URL
    pub event_url: String,
    /// RenderingControl control URL
    pub rendering_control_url: String,
    /// Where the renderer should deliver NOTIFY requests
    pub callback_url: String,
    pub media: MediaSource,
}

/// Subscription lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Idle,
    Subscribing,
    Subscribed,
    Renewing,
    Unsubscribing,
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// `Stop` was sent by the caller
    Stopped,
    /// The renderer reported `STOPPED`
    RendererStopped { uuid: String },
}

/// Accepted transport state change, published to presentation layers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererEvent {
    pub uuid: String,
    pub previous_state: String,
    pub new_state: String,
    pub sequence: u64,
}

struct SessionInner {
    descriptor: SessionDescriptor,
    config: CastConfig,
    store: Arc<RendererStateStore>,
    transport: Arc<dyn RendererTransport>,
    timers: Mutex<RenewalTimers>,
    state: watch::Sender<SubscriptionState>,
    ended: watch::Sender<Option<SessionEnd>>,
    events: broadcast::Sender<RendererEvent>,
    events_seen: AtomicU64,
    paused: AtomicBool,
}

/// Handle to a cast session. Clones share the same session.
#[derive(Clone)]
pub struct CastSession {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for CastSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CastSession")
            .field("descriptor", &self.inner.descriptor)
            .field("state", &self.state())
            .field("ended", &self.end_reason())
            .finish()
    }
}

impl CastSession {
    pub fn new(
        descriptor: SessionDescriptor,
        store: Arc<RendererStateStore>,
        transport: Arc<dyn RendererTransport>,
        config: CastConfig,
    ) -> Self {
        let (state, _) = watch::channel(SubscriptionState::Idle);
        let (ended, _) = watch::channel(None);
        let (events, _) = broadcast::channel(config.event_buffer_size.max(1));

        Self {
            inner: Arc::new(SessionInner {
                descriptor,
                config,
                store,
                transport,
                timers: Mutex::new(RenewalTimers::default()),
                state,
                ended,
                events,
                events_seen: AtomicU64::new(0),
                paused: AtomicBool::new(false),
            }),
        }
    }

    /// Session talking SOAP/GENA over HTTP with the timeouts from `config`
    pub fn with_soap_transport(
        descriptor: SessionDescriptor,
        store: Arc<RendererStateStore>,
        config: CastConfig,
    ) -> Self {
        let transport = Arc::new(SoapTransport::from_config(&config));
        Self::new(descriptor, store, transport, config)
    }

    pub fn descriptor(&self) -> &SessionDescriptor {
        &self.inner.descriptor
    }

    pub fn config(&self) -> &CastConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<RendererStateStore> {
        &self.inner.store
    }

    pub fn state(&self) -> SubscriptionState {
        *self.inner.state.borrow()
    }

    /// Receiver that observes every subscription state transition
    pub fn watch_state(&self) -> watch::Receiver<SubscriptionState> {
        self.inner.state.subscribe()
    }

    /// Feed of accepted renderer events
    pub fn events(&self) -> broadcast::Receiver<RendererEvent> {
        self.inner.events.subscribe()
    }

    /// Identifiers with an armed renewal timer
    pub fn armed_renewals(&self) -> Vec<String> {
        self.inner.timers.lock().armed()
    }

    pub fn end_reason(&self) -> Option<SessionEnd> {
        self.inner.ended.borrow().clone()
    }

    pub fn is_ended(&self) -> bool {
        self.inner.ended.borrow().is_some()
    }

    /// Wait until the session ends, either through `Stop` or because the
    /// renderer reported `STOPPED`.
    pub async fn wait_ended(&self) -> SessionEnd {
        let mut ended = self.inner.ended.subscribe();
        let result = ended.wait_for(Option::is_some).await;
        match result {
            Ok(end) => end.clone().unwrap_or(SessionEnd::Stopped),
            // The sender lives as long as `self`
            Err(_) => SessionEnd::Stopped,
        }
    }

    /// Endpoint that handles this session's NOTIFY requests
    pub fn callback_endpoint(&self) -> CallbackEndpoint {
        CallbackEndpoint::new(self.clone())
    }

    /// Route the callback server's notifications to this session
    pub async fn attach(&self, router: &EventRouter) {
        router.attach(Arc::new(self.callback_endpoint())).await;
    }

    /// Subscribe to renderer events, load the media and start playback.
    ///
    /// Returns the subscription identifier. Failure to subscribe or to load
    /// the media aborts the attempt with [`CastError::Startup`] and leaves
    /// nothing subscribed; a failing `Play` is returned as is while the
    /// subscription stays up.
    pub async fn start(&self) -> Result<String> {
        if self.inner.timers.lock().is_stopped() || !self.begin_subscribing() {
            return Err(CastError::InvalidState(
                "session is already running or has ended".to_string(),
            ));
        }

        let descriptor = &self.inner.descriptor;

        let grant = match self
            .inner
            .transport
            .subscribe(
                &descriptor.event_url,
                &descriptor.callback_url,
                self.inner.config.requested_timeout_secs(),
            )
            .await
        {
            Ok(grant) => grant,
            Err(e) => {
                warn!(url = %descriptor.event_url, error = %e, "SUBSCRIBE failed");
                self.set_state(SubscriptionState::Idle);
                return Err(CastError::startup("SUBSCRIBE", e));
            }
        };

        info!(uuid = %grant.uuid, timeout = ?grant.timeout_seconds, "subscribed to renderer events");
        self.inner.store.create(&grant.uuid);
        self.arm_renewal(&grant.uuid, grant.timeout_seconds);
        self.set_state(SubscriptionState::Subscribed);

        let load = Action::SetAVTransportURI(descriptor.media.clone());
        if let Err(e) = self.send_command(load).await {
            warn!(error = %e, "renderer rejected the media, dropping subscription");
            self.unsubscribe(&grant.uuid).await;
            return Err(CastError::startup("SetAVTransportURI", e));
        }

        self.play().await?;
        Ok(grant.uuid)
    }

    /// Renew the subscription `uuid`.
    ///
    /// On success the renewal timer is re-armed from the fresh lease and the
    /// state record is left untouched. On failure the subscription is
    /// considered lost: it is unsubscribed and not re-armed. Refreshing an
    /// identifier that is not live fails with [`CastError::UnknownRenderer`].
    pub async fn refresh(&self, uuid: &str) -> Result<()> {
        if self.inner.timers.lock().is_stopped() {
            debug!(uuid, "session stopped, skipping renewal");
            return Ok(());
        }

        if let Err(e) = self.inner.store.sequence(uuid) {
            debug!(uuid, "renewal for unknown subscription dropped");
            return Err(e);
        }

        self.set_state(SubscriptionState::Renewing);
        let renewed = self
            .inner
            .transport
            .renew(
                &self.inner.descriptor.event_url,
                uuid,
                self.inner.config.requested_timeout_secs(),
            )
            .await;

        match renewed {
            Ok(timeout) => {
                debug!(uuid, timeout = ?timeout, "subscription renewed");
                if self.inner.store.is_live(uuid) {
                    self.arm_renewal(uuid, timeout);
                }
                self.settle_state();
                Ok(())
            }
            Err(e) => {
                warn!(uuid, error = %e, "subscription renewal failed, dropping renderer");
                self.unsubscribe(uuid).await;
                Err(e)
            }
        }
    }

    /// Stop tracking `uuid` and ask the renderer to drop the subscription.
    ///
    /// The record is deleted first, so events still in flight for `uuid`
    /// are rejected. The UNSUBSCRIBE itself is best-effort.
    pub async fn unsubscribe(&self, uuid: &str) {
        self.inner.timers.lock().cancel(uuid);
        self.inner.store.delete(uuid);
        self.set_state(SubscriptionState::Unsubscribing);

        match self
            .inner
            .transport
            .unsubscribe(&self.inner.descriptor.event_url, uuid)
            .await
        {
            Ok(()) => info!(uuid, "unsubscribed from renderer events"),
            Err(e) if e.is_precondition_failed() => {
                debug!(uuid, "renderer had already dropped the subscription")
            }
            Err(e) => warn!(uuid, error = %e, "UNSUBSCRIBE failed"),
        }

        self.settle_state();
    }

    /// Encode and send `action` to the service it belongs to.
    ///
    /// `Stop` first cancels every renewal timer and unsubscribes every live
    /// identifier, then ends the session before the action goes out.
    pub async fn send_command(&self, action: Action) -> Result<ActionOutput> {
        let encoded = encode(&action)?;

        if action == Action::Stop {
            self.teardown().await;
        }

        let descriptor = &self.inner.descriptor;
        let control_url = match encoded.service {
            Service::AVTransport => &descriptor.transport_control_url,
            Service::RenderingControl => &descriptor.rendering_control_url,
        };

        debug!(action = encoded.action, url = %control_url, "sending action");
        match self.inner.transport.send_action(control_url, &encoded).await {
            Ok(output) => Ok(output),
            Err(CastError::Response(reason)) if !action.has_output() => {
                debug!(action = encoded.action, %reason, "ignoring unreadable response body");
                Ok(ActionOutput::new())
            }
            Err(e) => {
                warn!(action = encoded.action, error = %e, "action failed");
                Err(e)
            }
        }
    }

    pub async fn play(&self) -> Result<()> {
        self.send_command(Action::Play).await?;
        self.inner.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub async fn pause(&self) -> Result<()> {
        self.send_command(Action::Pause).await?;
        self.inner.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Send `Stop`, ending the session
    pub async fn stop(&self) -> Result<()> {
        self.send_command(Action::Stop).await.map(|_| ())
    }

    /// Pause when playing, play when paused. Returns whether playback is
    /// now paused.
    pub async fn toggle_pause(&self) -> Result<bool> {
        if self.inner.paused.load(Ordering::SeqCst) {
            self.play().await?;
            Ok(false)
        } else {
            self.pause().await?;
            Ok(true)
        }
    }

    pub async fn get_volume(&self) -> Result<u8> {
        let output = self.send_command(Action::GetVolume).await?;
        let raw = output
            .get("CurrentVolume")
            .ok_or_else(|| CastError::Response("GetVolume response has no CurrentVolume".to_string()))?;

        raw.trim()
            .parse::<u8>()
            .map_err(|_| CastError::Response(format!("invalid CurrentVolume '{raw}'")))
    }

    pub async fn set_volume(&self, level: u8) -> Result<()> {
        self.send_command(Action::SetVolume(level)).await.map(|_| ())
    }

    /// Change the volume by `delta`, clamped to 0..=100. Returns the level set.
    pub async fn adjust_volume(&self, delta: i16) -> Result<u8> {
        let current = self.get_volume().await?;
        let target = (i16::from(current) + delta).clamp(0, 100) as u8;
        self.set_volume(target).await?;
        Ok(target)
    }

    pub async fn volume_up(&self) -> Result<u8> {
        self.adjust_volume(i16::from(self.inner.config.volume_step))
            .await
    }

    pub async fn volume_down(&self) -> Result<u8> {
        self.adjust_volume(-i16::from(self.inner.config.volume_step))
            .await
    }

    pub async fn get_mute(&self) -> Result<bool> {
        let output = self.send_command(Action::GetMute).await?;
        let raw = output
            .get("CurrentMute")
            .ok_or_else(|| CastError::Response("GetMute response has no CurrentMute".to_string()))?;

        match raw.trim() {
            "1" | "true" | "True" => Ok(true),
            "0" | "false" | "False" => Ok(false),
            other => Err(CastError::Response(format!("invalid CurrentMute '{other}'"))),
        }
    }

    pub async fn set_mute(&self, on: bool) -> Result<()> {
        self.send_command(Action::SetMute(on)).await.map(|_| ())
    }

    /// Invert the mute state. Returns whether the renderer is now muted.
    pub async fn toggle_mute(&self) -> Result<bool> {
        let muted = !self.get_mute().await?;
        self.set_mute(muted).await?;
        Ok(muted)
    }

    /// Count an inbound event and return how many were seen before it
    pub(crate) fn observe_event(&self) -> u64 {
        self.inner.events_seen.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn publish(&self, event: RendererEvent) {
        // No receivers is fine
        let _ = self.inner.events.send(event);
    }

    pub(crate) fn note_paused(&self, paused: bool) {
        self.inner.paused.store(paused, Ordering::SeqCst);
    }

    /// The renderer reported `STOPPED` for `uuid`.
    ///
    /// Renewals stop for every identifier, so all of them are unsubscribed,
    /// the reporting one first.
    pub(crate) async fn renderer_stopped(&self, uuid: &str) {
        let cancelled = self.inner.timers.lock().stop();
        debug!(uuid, cancelled, "renewal timers cancelled");
        self.unsubscribe(uuid).await;
        for other in self.inner.store.live_ids() {
            self.unsubscribe(&other).await;
        }
        self.finish(SessionEnd::RendererStopped {
            uuid: uuid.to_string(),
        });
    }

    async fn teardown(&self) {
        let cancelled = self.inner.timers.lock().stop();
        let live = self.inner.store.live_ids();
        info!(cancelled, live = live.len(), "stopping cast session");

        for uuid in live {
            self.unsubscribe(&uuid).await;
        }

        self.finish(SessionEnd::Stopped);
    }

    fn finish(&self, end: SessionEnd) {
        let updated = self.inner.ended.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(end.clone());
            true
        });
        if updated {
            info!(?end, "cast session ended");
        }
    }

    fn arm_renewal(&self, uuid: &str, timeout_seconds: Option<u32>) {
        let delay = renewal_interval(timeout_seconds, &self.inner.config);
        let mut timers = self.inner.timers.lock();
        if timers.is_stopped() {
            debug!(uuid, "session stopped, not arming renewal");
            return;
        }

        let generation = timers.reserve();
        let session = Arc::downgrade(&self.inner);
        let owned_uuid = uuid.to_string();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = session.upgrade() {
                CastSession { inner }
                    .renewal_due(&owned_uuid, generation)
                    .await;
            }
        });

        timers.arm(uuid, generation, handle);
        debug!(uuid, ?delay, "renewal armed");
    }

    async fn renewal_due(&self, uuid: &str, generation: u64) {
        if !self.inner.timers.lock().claim(uuid, generation) {
            debug!(uuid, "stale renewal timer ignored");
            return;
        }

        if let Err(e) = self.refresh(uuid).await {
            debug!(uuid, error = %e, "renewal did not complete");
        }
    }

    fn set_state(&self, state: SubscriptionState) {
        let previous = self.inner.state.send_replace(state);
        if previous != state {
            debug!(from = ?previous, to = ?state, "subscription state changed");
        }
    }

    /// Move `Idle` to `Subscribing` in one step; false if not idle
    fn begin_subscribing(&self) -> bool {
        let moved = self.inner.state.send_if_modified(|state| {
            if *state != SubscriptionState::Idle {
                return false;
            }
            *state = SubscriptionState::Subscribing;
            true
        });
        if moved {
            debug!(from = ?SubscriptionState::Idle, to = ?SubscriptionState::Subscribing, "subscription state changed");
        }
        moved
    }

    fn settle_state(&self) {
        if self.inner.store.is_empty() {
            self.set_state(SubscriptionState::Idle);
        } else {
            self.set_state(SubscriptionState::Subscribed);
        }
    }
}
