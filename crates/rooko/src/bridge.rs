// WebSocket bridge to the page-side script.
//
// The browser host runs a small script that connects to
// `ws://127.0.0.1:{port}`, reports the page URL, relays `window.rooko.callback`
// invocations, and evaluates scripts the engine sends back. On the engine side
// the bridge is exposed as a `Surface`.
//
// Page -> engine text frames:
//   {"type":"location","url":"https://www.chess.com/play/online"}
//   {"type":"callback","name":"go_home"}
// Engine -> page text frames:
//   {"type":"run_script","source":"..."}

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

use crate::surface::{Surface, SurfaceError};

/// Scripts waiting for delivery before `run_script` starts refusing.
pub const SCRIPT_QUEUE_CAPACITY: usize = 32;

/// Pause after a failed `accept` (fd exhaustion, aborted handshake) before
/// listening again.
pub const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(250);

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

/// A message sent by the page-side script.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PageMessage {
    Location { url: String },
    Callback { name: String },
}

/// Parse one text frame from the page. Unknown or malformed frames yield
/// `None`.
pub fn parse_page_message(text: &str) -> Option<PageMessage> {
    match serde_json::from_str(text) {
        Ok(msg) => Some(msg),
        Err(e) => {
            warn!("ignoring malformed bridge frame: {e}");
            None
        }
    }
}

/// Frame asking the page to evaluate `source`.
pub fn encode_run_script(source: &str) -> String {
    serde_json::json!({ "type": "run_script", "source": source }).to_string()
}

// ---------------------------------------------------------------------------
// Surface implementation
// ---------------------------------------------------------------------------

/// Engine-side view of the connected page.
#[derive(Clone)]
pub struct BridgeSurface {
    location: watch::Receiver<Option<String>>,
    scripts: mpsc::Sender<String>,
}

/// Server-side ends of the channels behind a [`BridgeSurface`].
pub struct BridgeHandles {
    pub location_tx: watch::Sender<Option<String>>,
    pub script_rx: mpsc::Receiver<String>,
}

/// Create a connected surface/server pair.
pub fn channel() -> (BridgeSurface, BridgeHandles) {
    let (location_tx, location) = watch::channel(None);
    let (scripts, script_rx) = mpsc::channel(SCRIPT_QUEUE_CAPACITY);
    (
        BridgeSurface { location, scripts },
        BridgeHandles {
            location_tx,
            script_rx,
        },
    )
}

#[async_trait]
impl Surface for BridgeSurface {
    /// Last URL reported by the page; an error while no page is connected or
    /// before it has reported anything.
    async fn current_location(&self) -> Result<String, SurfaceError> {
        self.location.borrow().clone().ok_or(SurfaceError::Disconnected)
    }

    async fn run_script(&self, source: &str) -> Result<(), SurfaceError> {
        if self.location.borrow().is_none() {
            return Err(SurfaceError::Disconnected);
        }
        self.scripts
            .try_send(source.to_string())
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => SurfaceError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => SurfaceError::QueueClosed,
            })
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Source of incoming page connections.
#[async_trait]
pub trait Acceptor: Send {
    async fn accept(&mut self) -> std::io::Result<(TcpStream, SocketAddr)>;
}

#[async_trait]
impl Acceptor for TcpListener {
    async fn accept(&mut self) -> std::io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }
}

/// Run the bridge on `127.0.0.1:{port}`, one page connection at a time.
///
/// Host callbacks from the page are forwarded through `callback_tx` by name.
/// Only a failure to bind is returned; everything after that is handled by
/// [`serve`].
pub async fn run(
    port: u16,
    handles: BridgeHandles,
    callback_tx: mpsc::Sender<String>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    info!("page bridge listening on {}", listener.local_addr()?);
    serve(listener, handles, callback_tx).await;
    Ok(())
}

/// Accept pages from `acceptor` until the task is cancelled. Accept and
/// handshake errors are logged and the server keeps listening.
pub async fn serve<A: Acceptor>(
    mut acceptor: A,
    mut handles: BridgeHandles,
    callback_tx: mpsc::Sender<String>,
) {
    loop {
        let (stream, addr) = match acceptor.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("failed to accept page connection: {e}");
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                continue;
            }
        };
        let addr = addr.to_string();

        let ws_stream = match tokio_tungstenite::accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                warn!("WebSocket handshake failed for {addr}: {e}");
                continue;
            }
        };
        info!("page connected from {addr}");

        // Scripts queued for a previous page load are stale.
        while handles.script_rx.try_recv().is_ok() {}

        let (write, read) = ws_stream.split();
        serve_connection(
            read,
            write,
            &handles.location_tx,
            &mut handles.script_rx,
            &callback_tx,
            &addr,
        )
        .await;

        handles.location_tx.send_replace(None);
        info!("page at {addr} disconnected");
    }
}

/// Pump one connection: apply page frames to the shared state and deliver
/// queued scripts, until the page closes, errors, or the engine drops its
/// script sender.
///
/// Generic over the stream and sink halves so it can be tested without
/// opening sockets.
pub async fn serve_connection<St, Si>(
    mut read: St,
    mut write: Si,
    location_tx: &watch::Sender<Option<String>>,
    script_rx: &mut mpsc::Receiver<String>,
    callback_tx: &mpsc::Sender<String>,
    addr: &str,
) where
    St: Stream<Item = Result<Message, WsError>> + Unpin,
    Si: Sink<Message> + Unpin,
    Si::Error: std::fmt::Display,
{
    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    handle_page_frame(text.as_str(), location_tx, callback_tx).await;
                }
                Some(Ok(Message::Close(_))) => {
                    info!("page at {addr} sent close frame");
                    break;
                }
                Some(Err(e)) => {
                    warn!("WebSocket error from {addr}: {e}");
                    break;
                }
                None => break,
                Some(Ok(_)) => {
                    // Binary, Ping, Pong, Frame carry nothing for us.
                }
            },
            script = script_rx.recv() => match script {
                Some(source) => {
                    let frame = Message::Text(encode_run_script(&source).into());
                    if let Err(e) = write.send(frame).await {
                        warn!("failed to deliver script to {addr}: {e}");
                        break;
                    }
                }
                None => break,
            },
        }
    }
}

async fn handle_page_frame(
    text: &str,
    location_tx: &watch::Sender<Option<String>>,
    callback_tx: &mpsc::Sender<String>,
) {
    match parse_page_message(text) {
        Some(PageMessage::Location { url }) => {
            debug!("page location: {url}");
            location_tx.send_replace(Some(url));
        }
        Some(PageMessage::Callback { name }) => {
            if callback_tx.send(name).await.is_err() {
                debug!("callback receiver dropped");
            }
        }
        None => {}
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
