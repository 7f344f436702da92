#![allow(
    dead_code,
    clippy::unwrap_used,
    reason = "Not every test binary exercises every helper"
)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt as _, StreamExt as _};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;

/// Mock realtime gateway.
///
/// Accepts any number of WebSocket clients, records the request URI of each
/// handshake, captures inbound text and close frames, and can broadcast
/// text frames or close frames to all connected clients.
pub struct MockWsServer {
    addr: SocketAddr,
    /// Broadcast text frames to ALL connected clients
    message_tx: broadcast::Sender<String>,
    /// Broadcast a close frame (with the given code) to ALL connected clients
    close_tx: broadcast::Sender<u16>,
    /// Inbound text frames from clients
    inbound_rx: mpsc::UnboundedReceiver<String>,
    /// Close frames received from clients, as (code, reason)
    closed_rx: mpsc::UnboundedReceiver<(u16, String)>,
    /// Handshake request URIs, one per accepted connection
    uri_rx: mpsc::UnboundedReceiver<String>,
    connections: Arc<AtomicUsize>,
    accept_task: JoinHandle<()>,
}

impl MockWsServer {
    /// Start a mock server on a random port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (message_tx, _) = broadcast::channel::<String>(100);
        let (close_tx, _) = broadcast::channel::<u16>(16);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();
        let (closed_tx, closed_rx) = mpsc::unbounded_channel::<(u16, String)>();
        let (uri_tx, uri_rx) = mpsc::unbounded_channel::<String>();
        let connections = Arc::new(AtomicUsize::new(0));

        let broadcast_tx = message_tx.clone();
        let broadcast_close_tx = close_tx.clone();
        let accepted = Arc::clone(&connections);

        let accept_task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };

                let uri_tx = uri_tx.clone();
                let callback = move |request: &Request, response: Response| {
                    drop(uri_tx.send(request.uri().to_string()));
                    Ok(response)
                };
                let Ok(ws_stream) = tokio_tungstenite::accept_hdr_async(stream, callback).await
                else {
                    continue;
                };
                accepted.fetch_add(1, Ordering::SeqCst);

                let (mut write, mut read) = ws_stream.split();
                let inbound_tx = inbound_tx.clone();
                let closed_tx = closed_tx.clone();
                let mut msg_rx = broadcast_tx.subscribe();
                let mut conn_close_rx = broadcast_close_tx.subscribe();

                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            msg = read.next() => {
                                match msg {
                                    Some(Ok(Message::Text(text))) => {
                                        drop(inbound_tx.send(text.to_string()));
                                    }
                                    Some(Ok(Message::Close(frame))) => {
                                        let close = frame.map_or((1005, String::new()), |f| {
                                            (u16::from(f.code), f.reason.to_string())
                                        });
                                        drop(closed_tx.send(close));
                                        break;
                                    }
                                    Some(Ok(_)) => {}
                                    _ => break,
                                }
                            }
                            msg = msg_rx.recv() => {
                                match msg {
                                    Ok(text) => {
                                        if write.send(Message::Text(text.into())).await.is_err() {
                                            break;
                                        }
                                    }
                                    Err(_) => break,
                                }
                            }
                            code = conn_close_rx.recv() => {
                                match code {
                                    Ok(code) => {
                                        drop(write.send(Message::Close(Some(CloseFrame {
                                            code: code.into(),
                                            reason: "".into(),
                                        }))).await);
                                        break;
                                    }
                                    Err(_) => break,
                                }
                            }
                        }
                    }
                });
            }
        });

        Self {
            addr,
            message_tx,
            close_tx,
            inbound_rx,
            closed_rx,
            uri_rx,
            connections,
            accept_task,
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn ws_url_with_path(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    /// Send a text frame to all connected clients.
    pub fn send(&self, message: &str) {
        drop(self.message_tx.send(message.to_owned()));
    }

    /// Send a close frame with `code` to all connected clients.
    pub fn close_all(&self, code: u16) {
        drop(self.close_tx.send(code));
    }

    /// Stop accepting new connections. Established clients are unaffected.
    pub fn stop_accepting(&self) {
        self.accept_task.abort();
    }

    /// Number of WebSocket connections accepted so far.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Next inbound text frame from any client.
    pub async fn recv_inbound(&mut self) -> Option<String> {
        timeout(Duration::from_secs(2), self.inbound_rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Next close frame received from any client, as (code, reason).
    pub async fn recv_close(&mut self) -> Option<(u16, String)> {
        timeout(Duration::from_secs(2), self.closed_rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Request URI of the next accepted handshake.
    pub async fn recv_uri(&mut self) -> Option<String> {
        timeout(Duration::from_secs(2), self.uri_rx.recv())
            .await
            .ok()
            .flatten()
    }
}

/// Poll `condition` for up to two seconds.
pub async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(20)).await;
    }
    condition()
}
