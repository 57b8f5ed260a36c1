//! # dlna-cast
//!
//! Cast media to DLNA/UPnP media renderers.
//!
//! The crate drives a renderer's AVTransport and RenderingControl services
//! over SOAP, keeps a GENA event subscription alive with periodic renewals
//! and tracks the transport state the renderer reports back.
//!
//! - [`action`] encodes control actions into SOAP envelopes
//! - [`parser`] extracts transport state changes from NOTIFY bodies
//! - [`RendererStateStore`] tracks live subscriptions and their last state
//! - [`CastSession`] runs the subscription lifecycle and sends commands
//! - [`CallbackEndpoint`] turns inbound notifications into store updates
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use callback_server::CallbackServer;
//! use dlna_cast::{CastConfig, CastSession, MediaSource, RendererStateStore, SessionDescriptor};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CastConfig::default();
//! let server = CallbackServer::new(config.callback_port_range).await?;
//!
//! let descriptor = SessionDescriptor {
//!     transport_control_url: "http://192.168.1.20:49152/upnp/control/AVTransport1".into(),
//!     event_url: "http://192.168.1.20:49152/upnp/event/AVTransport1".into(),
//!     rendering_control_url: "http://192.168.1.20:49152/upnp/control/RenderingControl1".into(),
//!     callback_url: server.callback_url(),
//!     media: MediaSource::new("http://192.168.1.10:3500/movie.mp4").with_mime_type("video/mp4"),
//! };
//!
//! let store = Arc::new(RendererStateStore::new());
//! let session = CastSession::with_soap_transport(descriptor, store, config);
//! session.attach(server.router()).await;
//!
//! session.start().await?;
//! let end = session.wait_ended().await;
//! println!("cast finished: {end:?}");
//! server.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod callback;
pub mod config;
pub mod content_features;
pub mod error;
pub mod logging;
pub mod parser;
pub mod renewal;
pub mod session;
pub mod store;
pub mod transport;

pub use action::{encode, Action, EncodedAction, MediaSource, Service};
pub use callback::CallbackEndpoint;
pub use config::CastConfig;
pub use error::{CastError, EncodingError, ParseError, Result};
pub use parser::TransportChange;
pub use renewal::renewal_interval;
pub use session::{CastSession, RendererEvent, SessionDescriptor, SessionEnd, SubscriptionState};
pub use store::{RendererState, RendererStateStore};
pub use transport::{ActionOutput, RendererTransport, SoapTransport, SubscriptionGrant};
