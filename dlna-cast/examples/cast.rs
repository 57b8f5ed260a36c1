//! Cast a media URL to a renderer and follow its transport state
//!
//! ```text
//! cargo run -p dlna-cast --example cast -- \
//!     http://192.168.1.20:49152/upnp/control/AVTransport1 \
//!     http://192.168.1.20:49152/upnp/event/AVTransport1 \
//!     http://192.168.1.20:49152/upnp/control/RenderingControl1 \
//!     http://192.168.1.10:8000/movie.mp4 [http://192.168.1.10:8000/movie.srt]
//! ```
//!
//! Press Ctrl-C to stop playback.

use std::sync::Arc;

use callback_server::CallbackServer;
use dlna_cast::logging::{init_logging, LoggingMode};
use dlna_cast::{CastConfig, CastSession, MediaSource, RendererStateStore, SessionDescriptor};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(LoggingMode::Development)?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 4 {
        eprintln!("usage: cast <avtransport-control> <avtransport-event> <rendering-control> <media-url> [subtitle-url]");
        std::process::exit(2);
    }

    let config = CastConfig::default();
    config.validate()?;

    // Advertise the local address that routes to the renderer
    let event_url = url::Url::parse(&args[1])?;
    let renderer = event_url
        .socket_addrs(|| Some(80))?
        .into_iter()
        .next()
        .ok_or("renderer address could not be resolved")?;
    let server = CallbackServer::for_renderer(config.callback_port_range, renderer).await?;
    println!("Listening for renderer events on {}", server.callback_url());

    let mut media = MediaSource::new(args[3].clone());
    if let Some(subtitles) = args.get(4) {
        media = media.with_subtitles(subtitles.clone());
    }
    if args[3].ends_with(".mp4") {
        media = media.with_mime_type("video/mp4");
    }

    let descriptor = SessionDescriptor {
        transport_control_url: args[0].clone(),
        event_url: args[1].clone(),
        rendering_control_url: args[2].clone(),
        callback_url: server.callback_url(),
        media,
    };

    let store = Arc::new(RendererStateStore::new());
    let session = CastSession::with_soap_transport(descriptor, store, config);
    session.attach(server.router()).await;

    let uuid = session.start().await?;
    println!("Casting (subscription {uuid})");

    let mut events = session.events();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("[{}] {} -> {}", event.sequence, event.uuid, event.new_state);
        }
    });

    tokio::select! {
        end = session.wait_ended() => println!("Session ended: {end:?}"),
        _ = tokio::signal::ctrl_c() => {
            session.stop().await?;
            println!("Stopped");
        }
    }

    printer.abort();
    server.shutdown().await?;
    Ok(())
}
