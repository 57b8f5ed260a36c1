//! Generic UPnP callback server for receiving event notifications.
//!
//! This crate provides a lightweight HTTP server for handling GENA `NOTIFY`
//! requests sent by a media renderer. It knows nothing about AVTransport
//! semantics: it validates the request, then hands the raw SID and body to
//! whatever [`NotificationHandler`] is attached to its [`EventRouter`] and
//! turns the handler's [`NotifyOutcome`] into an HTTP status.
//!
//! # Example
//!
//! ```no_run
//! use async_trait::async_trait;
//! use callback_server::{CallbackServer, NotificationHandler, NotificationPayload, NotifyOutcome};
//! use std::sync::Arc;
//!
//! struct PrintHandler;
//!
//! #[async_trait]
//! impl NotificationHandler for PrintHandler {
//!     async fn handle(&self, payload: NotificationPayload) -> NotifyOutcome {
//!         println!("{}: {}", payload.subscription_id, payload.event_xml);
//!         NotifyOutcome::Accepted
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), String> {
//!     let server = CallbackServer::new((3500, 3600)).await?;
//!     server.router().attach(Arc::new(PrintHandler)).await;
//!
//!     println!("Subscribe with CALLBACK: <{}>", server.callback_url());
//!
//!     server.shutdown().await
//! }
//! ```

pub mod router;
mod server;

pub use router::{EventRouter, NotificationHandler, NotificationPayload, NotifyOutcome};
pub use server::{local_ip_towards, CallbackServer};
