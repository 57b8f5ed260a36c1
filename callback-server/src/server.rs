//! HTTP server for receiving UPnP event notifications.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, UdpSocket};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use warp::http::StatusCode;
use warp::Filter;

use super::router::{EventRouter, NotifyOutcome};

/// HTTP callback server for receiving UPnP event notifications.
///
/// The `CallbackServer` binds to a local port and accepts `NOTIFY` requests
/// on a single, randomly generated path. Valid requests are handed to the
/// handler attached to its [`EventRouter`]; the handler's outcome selects
/// the status code returned to the renderer.
///
/// # Example
///
/// ```no_run
/// use callback_server::CallbackServer;
///
/// #[tokio::main]
/// async fn main() {
///     let server = CallbackServer::new((3500, 3600))
///         .await
///         .expect("Failed to create callback server");
///
///     println!("Renderers should notify: {}", server.callback_url());
/// }
/// ```
pub struct CallbackServer {
    /// The port the server is bound to
    port: u16,
    /// The base URL (`http://<local_ip>:<port>`)
    base_url: String,
    /// Random path segment events are accepted on
    callback_path: String,
    /// Event router for handling incoming events
    event_router: Arc<EventRouter>,
    /// Shutdown signal sender
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// Server task handle
    server_handle: Option<tokio::task::JoinHandle<()>>,
}

impl CallbackServer {
    /// Create and start a callback server advertising the detected local IP.
    ///
    /// # Arguments
    ///
    /// * `port_range` - Range of ports to try binding to (start, end)
    pub async fn new(port_range: (u16, u16)) -> Result<Self, String> {
        let local_ip = Self::detect_local_ip()
            .ok_or_else(|| "Failed to detect local IP address".to_string())?;
        Self::with_local_ip(port_range, local_ip).await
    }

    /// Create and start a callback server advertising the local address
    /// that routes towards `renderer`.
    ///
    /// Hosts with several interfaces must hand the renderer an address it
    /// can reach, which is the one the OS would use to talk to it.
    pub async fn for_renderer(port_range: (u16, u16), renderer: SocketAddr) -> Result<Self, String> {
        let local_ip = local_ip_towards(renderer)
            .ok_or_else(|| format!("Failed to find a local address routing to {renderer}"))?;
        Self::with_local_ip(port_range, local_ip).await
    }

    /// Create and start a callback server advertising `local_ip`.
    pub async fn with_local_ip(port_range: (u16, u16), local_ip: IpAddr) -> Result<Self, String> {
        let port = Self::find_available_port(port_range.0, port_range.1).ok_or_else(|| {
            format!(
                "No available port found in range {}-{}",
                port_range.0, port_range.1
            )
        })?;

        let base_url = format!("http://{local_ip}:{port}");
        let callback_path = uuid::Uuid::new_v4().simple().to_string().to_uppercase();

        let event_router = Arc::new(EventRouter::new());

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let (ready_tx, mut ready_rx) = mpsc::channel::<()>(1);

        let server_handle = Self::start_server(
            port,
            callback_path.clone(),
            event_router.clone(),
            shutdown_rx,
            ready_tx,
        );

        ready_rx
            .recv()
            .await
            .ok_or_else(|| "Server failed to start".to_string())?;

        Ok(Self {
            port,
            base_url,
            callback_path,
            event_router,
            shutdown_tx: Some(shutdown_tx),
            server_handle: Some(server_handle),
        })
    }

    /// Get the base URL (`http://<local_ip>:<port>`).
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the full callback URL to hand to the renderer in SUBSCRIBE.
    pub fn callback_url(&self) -> String {
        format!("{}/{}", self.base_url, self.callback_path)
    }

    /// Get the random path segment events are accepted on.
    pub fn callback_path(&self) -> &str {
        &self.callback_path
    }

    /// Get the port the server is bound to.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get a reference to the event router.
    pub fn router(&self) -> &Arc<EventRouter> {
        &self.event_router
    }

    /// Shutdown the callback server gracefully, waiting for in-flight
    /// requests to complete.
    pub async fn shutdown(mut self) -> Result<(), String> {
        self.event_router.detach().await;

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }

        if let Some(handle) = self.server_handle.take() {
            handle
                .await
                .map_err(|e| format!("Callback server task failed: {e}"))?;
        }

        Ok(())
    }

    /// Find an available port in the given range.
    fn find_available_port(start: u16, end: u16) -> Option<u16> {
        (start..=end).find(|&port| Self::is_port_available(port))
    }

    /// Check if a port is available for binding.
    fn is_port_available(port: u16) -> bool {
        TcpListener::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)).is_ok()
    }

    /// Detect the local IP address used for outbound traffic.
    fn detect_local_ip() -> Option<IpAddr> {
        local_ip_towards(SocketAddr::from(([8, 8, 8, 8], 80)))
    }

    /// Start the HTTP server on the given port.
    fn start_server(
        port: u16,
        callback_path: String,
        event_router: Arc<EventRouter>,
        mut shutdown_rx: mpsc::Receiver<()>,
        ready_tx: mpsc::Sender<()>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let notify_route = warp::path(callback_path)
                .and(warp::path::end())
                .and(warp::method())
                .and(warp::header::optional::<String>("sid"))
                .and(warp::header::optional::<String>("nt"))
                .and(warp::header::optional::<String>("nts"))
                .and(warp::body::bytes())
                .and_then({
                    let router = event_router.clone();
                    move |method: warp::http::Method,
                          sid: Option<String>,
                          nt: Option<String>,
                          nts: Option<String>,
                          body: bytes::Bytes| {
                        let router = router.clone();
                        async move {
                            if method.as_str() != "NOTIFY" {
                                return Err(warp::reject::not_found());
                            }

                            debug!(
                                sid = sid.as_deref().unwrap_or("-"),
                                bytes = body.len(),
                                "incoming NOTIFY"
                            );

                            if !Self::validate_upnp_headers(&sid, &nt, &nts) {
                                warn!("rejecting NOTIFY with invalid UPnP headers");
                                return Ok(warp::reply::with_status(
                                    "Invalid UPnP headers",
                                    StatusCode::BAD_REQUEST,
                                ));
                            }
                            let Some(sid) = sid else {
                                return Ok(warp::reply::with_status(
                                    "Invalid UPnP headers",
                                    StatusCode::BAD_REQUEST,
                                ));
                            };

                            let event_xml = String::from_utf8_lossy(&body).to_string();

                            match router.route_event(sid, event_xml).await {
                                NotifyOutcome::Accepted => {
                                    Ok(warp::reply::with_status("OK\n", StatusCode::OK))
                                }
                                NotifyOutcome::NotFound => Ok(warp::reply::with_status(
                                    "Subscription not found",
                                    StatusCode::NOT_FOUND,
                                )),
                            }
                        }
                    }
                });

            let routes = notify_route.recover(handle_rejection);

            let (addr, server) = warp::serve(routes).bind_with_graceful_shutdown(
                SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
                async move {
                    shutdown_rx.recv().await;
                },
            );

            info!(%addr, "callback server listening");
            let _ = ready_tx.send(()).await;
            server.await;
        })
    }

    /// Validate UPnP event notification headers.
    ///
    /// The SID header is required. NT and NTS are optional, but each one
    /// that is present must carry the GENA property-change value.
    fn validate_upnp_headers(
        sid: &Option<String>,
        nt: &Option<String>,
        nts: &Option<String>,
    ) -> bool {
        if sid.is_none() {
            return false;
        }

        nt.as_deref().map_or(true, |value| value == "upnp:event")
            && nts.as_deref().map_or(true, |value| value == "upnp:propchange")
    }
}

/// Local address the OS would use to reach `target`.
///
/// Uses a connected UDP socket; no packets are sent.
pub fn local_ip_towards(target: SocketAddr) -> Option<IpAddr> {
    let bind_addr = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    let socket = UdpSocket::bind(bind_addr).ok()?;
    socket.connect(target).ok()?;
    Some(socket.local_addr().ok()?.ip())
}

/// Handle rejections and convert them to HTTP responses.
async fn handle_rejection(
    err: warp::Rejection,
) -> Result<impl warp::Reply, std::convert::Infallible> {
    let (code, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found")
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    };

    Ok(warp::reply::with_status(message, code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_port_available() {
        assert!(CallbackServer::is_port_available(0));

        let listener = TcpListener::bind("0.0.0.0:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(!CallbackServer::is_port_available(port));
        drop(listener);
    }

    #[test]
    fn test_find_available_port() {
        let port = CallbackServer::find_available_port(51000, 51100);
        assert!(port.is_some());
        assert!((51000..=51100).contains(&port.unwrap()));
    }

    #[test]
    fn test_local_ip_towards_loopback() {
        let ip = local_ip_towards(SocketAddr::from(([127, 0, 0, 1], 1900)));
        assert_eq!(ip, Some(IpAddr::V4(Ipv4Addr::LOCALHOST)));
    }

    #[test]
    fn test_validate_upnp_headers() {
        assert!(CallbackServer::validate_upnp_headers(
            &Some("uuid:123".to_string()),
            &Some("upnp:event".to_string()),
            &Some("upnp:propchange".to_string()),
        ));

        assert!(CallbackServer::validate_upnp_headers(
            &Some("uuid:123".to_string()),
            &None,
            &None,
        ));

        assert!(!CallbackServer::validate_upnp_headers(
            &None,
            &Some("upnp:event".to_string()),
            &Some("upnp:propchange".to_string()),
        ));

        assert!(!CallbackServer::validate_upnp_headers(
            &Some("uuid:123".to_string()),
            &Some("wrong".to_string()),
            &Some("upnp:propchange".to_string()),
        ));

        // Each header is checked on its own
        assert!(!CallbackServer::validate_upnp_headers(
            &Some("uuid:123".to_string()),
            &Some("wrong".to_string()),
            &None,
        ));

        assert!(!CallbackServer::validate_upnp_headers(
            &Some("uuid:123".to_string()),
            &None,
            &Some("wrong".to_string()),
        ));

        assert!(CallbackServer::validate_upnp_headers(
            &Some("uuid:123".to_string()),
            &Some("upnp:event".to_string()),
            &None,
        ));
    }

    #[tokio::test]
    async fn test_callback_server_creation() {
        let server = CallbackServer::with_local_ip((51100, 51200), IpAddr::V4(Ipv4Addr::LOCALHOST))
            .await
            .expect("server should start");

        assert!((51100..=51200).contains(&server.port()));
        assert!(server.base_url().contains(&server.port().to_string()));
        assert_eq!(server.callback_path().len(), 32);
        assert!(server.callback_url().ends_with(server.callback_path()));

        server.shutdown().await.unwrap();
    }
}
