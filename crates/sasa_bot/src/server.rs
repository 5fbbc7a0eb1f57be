//! Reverse-WebSocket server: the OneBot implementation (NapCat) dials in.
//!
//! One client connection at a time. Inbound frames are parsed leniently and
//! dispatched one after another, so every memory side effect of an event is
//! visible to the next; outbound actions arrive on the shared channel and are
//! serialized onto the socket from the same select loop.

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use sasa_onebot::{ApiAction, RawEvent};
use sasa_router::Dispatcher;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, error, info, warn};

pub async fn run(
    host: &str,
    port: u16,
    dispatcher: Dispatcher,
    mut outbox: mpsc::UnboundedReceiver<ApiAction>,
) -> Result<()> {
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("listening for OneBot client on ws://{}", addr);

    loop {
        let (stream, peer) = listener.accept().await?;
        info!(%peer, "OneBot client connected");
        if let Err(e) = handle_connection(stream, &dispatcher, &mut outbox).await {
            error!("connection error: {:#}", e);
        }
        info!(%peer, "OneBot client disconnected, waiting for reconnect");
    }
}

async fn handle_connection(
    stream: TcpStream,
    dispatcher: &Dispatcher,
    outbox: &mut mpsc::UnboundedReceiver<ApiAction>,
) -> Result<()> {
    let ws = tokio_tungstenite::accept_async(stream)
        .await
        .context("websocket handshake failed")?;
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            frame = read.next() => {
                let Some(frame) = frame else {
                    return Ok(());
                };
                match frame? {
                    Message::Text(text) => {
                        match RawEvent::parse(&text) {
                            Some(event) => {
                                let handled = dispatcher.dispatch(&event).await;
                                debug!(handled, "frame dispatched");
                            }
                            None => warn!("unparseable frame, ignoring"),
                        }
                    }
                    Message::Ping(payload) => write.send(Message::Pong(payload)).await?,
                    Message::Close(_) => return Ok(()),
                    _ => {}
                }
            }
            Some(action) = outbox.recv() => {
                let json = serde_json::to_string(&action)?;
                write.send(Message::Text(json)).await?;
            }
        }
    }
}
