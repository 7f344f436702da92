//! Connection lifecycle management for one realtime socket.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use bon::Builder;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt as _, StreamExt as _};
use secrecy::{ExposeSecret as _, SecretString};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::Result;
use crate::auth::AuthProvider;
use crate::error::{AuthFailure, ConnectionExists, Error, Kind, MessageParse, NotConnected};
use crate::events::{ErrorEvent, Event, EventBus, EventKind, ListenerId};
use crate::reconnect::ReconnectionConfig;
use crate::types::{CloseEvent, WsMessage};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection state tracking. Exactly one state is current at any time;
/// transitions are driven by socket lifecycle events and explicit
/// `connect()` / `disconnect()` calls. `Disconnected` is re-enterable from
/// every other state.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,
    /// Attempting to connect
    Connecting,
    /// Successfully connected
    Connected,
    /// An external reconnection loop is retrying
    Reconnecting,
    /// Connecting failed or the transport reported an error
    Error,
}

impl ConnectionState {
    /// Check if the connection is currently active.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Construction-time configuration for a [`ConnectionManager`].
#[non_exhaustive]
#[derive(Clone, Builder)]
pub struct ConnectionConfig {
    /// Realtime gateway endpoint, e.g. `wss://realtime.aula.app/ws/dashboard`.
    #[builder(into)]
    pub url: String,
    /// Token source for authenticated connections. Without one the manager
    /// connects unauthenticated.
    pub auth: Option<Arc<dyn AuthProvider>>,
    /// Reconnection policy consumed by [`crate::reconnect::Reconnector`].
    #[builder(default)]
    pub reconnection: ReconnectionConfig,
}

enum Outbound {
    Text(String),
    Close,
}

struct SocketHandle {
    outbound: mpsc::UnboundedSender<Outbound>,
    /// Detached on drop; the writer finishes once the outbound sender is gone.
    _writer: JoinHandle<()>,
}

/// Manages exactly one logical realtime connection.
///
/// The manager owns the socket handle and the event-listener registry, and
/// delegates authentication ([`AuthProvider`]) and reconnection policy
/// ([`crate::reconnect::ReconnectStrategy`]) to injected collaborators.
/// Reconnection orchestration lives outside this type; see
/// [`crate::reconnect::Reconnector`].
///
/// Cloning is cheap and every clone refers to the same connection.
///
/// # Example
///
/// ```ignore
/// let manager = ConnectionManager::new(
///     ConnectionConfig::builder()
///         .url("wss://realtime.aula.app/ws/dashboard")
///         .build(),
/// );
///
/// manager.on(EventKind::Message, |event| {
///     if let Event::Message(message) = event {
///         println!("{}", message.msg_type);
///     }
/// });
///
/// manager.connect().await?;
/// ```
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: ConnectionConfig,
    /// Listener registry for `open`/`close`/`error`/`message`/`statechange`
    events: EventBus,
    state: Mutex<ConnectionState>,
    /// Watch channel mirroring `state` for async observers
    state_tx: watch::Sender<ConnectionState>,
    socket: Mutex<Option<SocketHandle>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ConnectionManager {
    #[must_use]
    pub fn new(config: ConnectionConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                config,
                events: EventBus::default(),
                state: Mutex::new(ConnectionState::Disconnected),
                state_tx,
                socket: Mutex::new(None),
                reader: Mutex::new(None),
            }),
        }
    }

    /// Open the connection.
    ///
    /// Asks the configured [`AuthProvider`] (if any) for a token, appends it
    /// to the endpoint as a `token` query parameter, and opens the socket.
    /// On success the state is `Connected` and an `open` event has fired.
    ///
    /// # Errors
    ///
    /// - [`crate::error::ConnectionExists`] if a socket is already open or
    ///   connecting. The existing-connection check is a weak guard, not a
    ///   lock; callers are responsible for keeping `connect()` single-flight.
    /// - [`crate::error::AuthFailure`] if the authenticated URL could not be
    ///   constructed, and the underlying transport error if opening the
    ///   socket failed. Both paths transition to `Error` and notify the
    ///   provider via `on_auth_error()` before returning.
    pub async fn connect(&self) -> Result<()> {
        {
            let socket = lock(&self.inner.socket);
            let state = *lock(&self.inner.state);
            if socket.is_some()
                || matches!(
                    state,
                    ConnectionState::Connecting | ConnectionState::Connected
                )
            {
                return Err(ConnectionExists.into());
            }
        }

        self.inner.set_state(ConnectionState::Connecting);

        let token = match &self.inner.config.auth {
            Some(provider) => provider.token().await,
            None => None,
        };

        let url = match authenticated_url(&self.inner.config.url, token.as_ref()) {
            Ok(url) => url,
            Err(e) => {
                self.inner.fail_connect();
                return Err(e);
            }
        };

        match connect_async(url.as_str()).await {
            Ok((stream, _response)) => {
                self.install_socket(stream);
                Ok(())
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(endpoint = %self.inner.config.url, error = %e, "unable to connect");
                self.inner.fail_connect();
                Err(e.into())
            }
        }
    }

    /// Close the connection with normal-closure code 1000 and reason
    /// "User disconnected". Always leaves the state `Disconnected` and
    /// clears the socket handle; a no-op if no socket exists.
    pub fn disconnect(&self) {
        if let Some(handle) = lock(&self.inner.socket).take() {
            drop(handle.outbound.send(Outbound::Close));
        }
        if let Some(reader) = lock(&self.inner.reader).take() {
            reader.abort();
        }
        self.inner.set_state(ConnectionState::Disconnected);
    }

    /// Serialize `message` to a JSON text frame and write it to the socket.
    ///
    /// There is no internal buffering or retry; the frame is handed to the
    /// transport immediately.
    ///
    /// # Errors
    ///
    /// [`crate::error::NotConnected`] if the socket is absent or not open;
    /// nothing is written in that case.
    pub fn send<R: Serialize>(&self, message: &R) -> Result<()> {
        let socket = lock(&self.inner.socket);
        let state = *lock(&self.inner.state);
        if !state.is_connected() {
            return Err(NotConnected.into());
        }
        let Some(handle) = socket.as_ref() else {
            return Err(NotConnected.into());
        };

        let json = serde_json::to_string(message)?;
        handle
            .outbound
            .send(Outbound::Text(json))
            .map_err(|_e| Error::from(NotConnected))?;
        Ok(())
    }

    /// Get the current connection state. A pure read with no side effects.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *lock(&self.inner.state)
    }

    /// Subscribe to connection state changes as an async stream.
    ///
    /// The synchronous `statechange` event remains the primary surface; this
    /// receiver exists for async orchestration that needs to await a state.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Register `listener` for `kind` events. Listeners run synchronously in
    /// registration order; a panicking listener is isolated and logged.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.inner.events.on(kind, listener)
    }

    /// Remove a listener registered with [`Self::on`].
    pub fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        self.inner.events.off(kind, id)
    }

    /// Emit an event to this manager's listeners.
    pub fn emit(&self, event: &Event) {
        self.inner.events.emit(event);
    }

    /// Transition into `Reconnecting`. Called by the external reconnection
    /// loop before each retry; the manager never enters this state itself.
    pub fn mark_reconnecting(&self) {
        self.inner.set_state(ConnectionState::Reconnecting);
    }

    /// The reconnection policy this manager was configured with.
    #[must_use]
    pub fn reconnection_config(&self) -> &ReconnectionConfig {
        &self.inner.config.reconnection
    }

    /// The configured endpoint, without the token parameter.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.inner.config.url
    }

    fn install_socket(&self, stream: WsStream) {
        let (write, read) = stream.split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let writer = tokio::spawn(write_loop(write, outbound_rx));
        *lock(&self.inner.socket) = Some(SocketHandle {
            outbound: outbound_tx,
            _writer: writer,
        });

        self.inner.set_state(ConnectionState::Connected);
        self.inner.events.emit(&Event::Open);

        let reader = tokio::spawn(read_loop(read, Arc::downgrade(&self.inner)));
        *lock(&self.inner.reader) = Some(reader);
    }
}

impl Inner {
    /// Record a state transition, notifying watchers and listeners only when
    /// the state actually changed.
    fn set_state(&self, next: ConnectionState) {
        {
            let mut current = lock(&self.state);
            if *current == next {
                return;
            }
            *current = next;
        }
        _ = self.state_tx.send(next);
        self.events.emit(&Event::StateChange(next));
    }

    fn fail_connect(&self) {
        self.set_state(ConnectionState::Error);
        if let Some(provider) = &self.config.auth {
            provider.on_auth_error();
        }
    }

    /// Tear down after the socket closed underneath us. Runs on the reader
    /// task, so the reader handle is dropped, never aborted.
    fn finish_close(&self, close: CloseEvent) {
        drop(lock(&self.socket).take());
        drop(lock(&self.reader).take());
        self.set_state(ConnectionState::Disconnected);
        self.events.emit(&Event::Close(close));
    }
}

/// Append the bearer token as a `token` query parameter, using `&` if the
/// URL already has a query string, else `?`.
fn authenticated_url(base: &str, token: Option<&SecretString>) -> Result<String> {
    url::Url::parse(base)
        .map_err(|e| Error::from(AuthFailure::new(format!("invalid endpoint {base:?}: {e}"))))?;

    Ok(match token {
        Some(token) => {
            let separator = if base.contains('?') { '&' } else { '?' };
            format!("{base}{separator}token={}", token.expose_secret())
        }
        None => base.to_owned(),
    })
}

async fn write_loop(
    mut write: SplitSink<WsStream, Message>,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(frame) = outbound_rx.recv().await {
        match frame {
            Outbound::Text(text) => {
                if write.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            Outbound::Close => {
                drop(
                    write
                        .send(Message::Close(Some(CloseFrame {
                            code: CloseCode::Normal,
                            reason: "User disconnected".into(),
                        })))
                        .await,
                );
                break;
            }
        }
    }
}

async fn read_loop(mut read: SplitStream<WsStream>, inner: Weak<Inner>) {
    loop {
        let Some(message) = read.next().await else {
            // Stream ended without a closing handshake.
            if let Some(inner) = inner.upgrade() {
                inner.finish_close(CloseEvent::abnormal());
            }
            break;
        };
        let Some(inner) = inner.upgrade() else {
            break;
        };

        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<WsMessage>(text.as_str()) {
                Ok(decoded) => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!(msg_type = %decoded.msg_type, "received frame");
                    inner.events.emit(&Event::Message(decoded));
                }
                Err(e) => {
                    let error = MessageParse::new(text.to_string(), e);
                    #[cfg(feature = "tracing")]
                    tracing::warn!(%error, "failed to decode inbound frame");
                    let description = error.to_string();
                    inner.events.emit(&Event::Error(ErrorEvent {
                        kind: Kind::Parse,
                        message: description,
                        payload: Some(error.payload),
                    }));
                }
            },
            Ok(Message::Close(frame)) => {
                let close = frame.map_or_else(CloseEvent::abnormal, CloseEvent::from);
                inner.finish_close(close);
                break;
            }
            Ok(_) => {
                // Binary and control frames are not part of the protocol.
            }
            Err(e) => {
                // Transport errors are reported but do not force closure; the
                // closing handshake (or stream end) follows as its own event.
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %e, "transport error");
                inner.set_state(ConnectionState::Error);
                inner.events.emit(&Event::Error(ErrorEvent {
                    kind: Kind::Connection,
                    message: e.to_string(),
                    payload: None,
                }));
            }
        }
    }
}
