use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;

/// Broad classification of SDK failures.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// The connection lifecycle was used out of order (already connected, not connected)
    State,
    /// Token retrieval or authenticated URL construction failed
    Auth,
    /// Error connecting to or communicating with the realtime gateway
    Connection,
    /// An inbound or outbound frame could not be (de)serialized
    Parse,
    /// Invalid reconnection configuration supplied at setup time
    Config,
}

#[derive(Debug)]
pub struct Error {
    kind: Kind,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    backtrace: Backtrace,
}

impl Error {
    pub fn with_source<S: StdError + Send + Sync + 'static>(kind: Kind, source: S) -> Self {
        Self {
            kind,
            source: Some(Box::new(source)),
            backtrace: Backtrace::capture(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    #[must_use]
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    #[must_use]
    pub fn inner(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    #[must_use]
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        let e = self.source.as_deref()?;
        e.downcast_ref::<E>()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(src) => write!(f, "{:?}: {}", self.kind, src),
            None => write!(f, "{:?}", self.kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

/// `connect()` was called while a socket is already open or connecting.
///
/// This is a caller bug; the SDK never retries it internally.
#[non_exhaustive]
#[derive(Debug, Clone, Copy)]
pub struct ConnectionExists;

impl fmt::Display for ConnectionExists {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a connection is already open or being established")
    }
}

impl StdError for ConnectionExists {}

impl From<ConnectionExists> for Error {
    fn from(err: ConnectionExists) -> Self {
        Self::with_source(Kind::State, err)
    }
}

/// `send()` was called while the socket is absent or not open.
///
/// Callers must check the connection state or buffer externally.
#[non_exhaustive]
#[derive(Debug, Clone, Copy)]
pub struct NotConnected;

impl fmt::Display for NotConnected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "not connected")
    }
}

impl StdError for NotConnected {}

impl From<NotConnected> for Error {
    fn from(err: NotConnected) -> Self {
        Self::with_source(Kind::State, err)
    }
}

/// Token retrieval or authenticated URL construction failed during `connect()`.
///
/// The configured [`crate::auth::AuthProvider`] is notified separately via
/// `on_auth_error()` before this is raised.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct AuthFailure {
    pub reason: String,
}

impl AuthFailure {
    pub(crate) fn new<S: Into<String>>(reason: S) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "authentication failure: {}", self.reason)
    }
}

impl StdError for AuthFailure {}

impl From<AuthFailure> for Error {
    fn from(err: AuthFailure) -> Self {
        Self::with_source(Kind::Auth, err)
    }
}

/// An inbound frame was not valid JSON for the wire message shape.
///
/// Reported through the `error` event channel; the connection stays open.
/// The raw payload text is retained for diagnosability.
#[non_exhaustive]
#[derive(Debug)]
pub struct MessageParse {
    pub payload: String,
    source: serde_json::Error,
}

impl MessageParse {
    pub(crate) fn new(payload: String, source: serde_json::Error) -> Self {
        Self { payload, source }
    }
}

impl fmt::Display for MessageParse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unparseable frame {:?}: {}", self.payload, self.source)
    }
}

impl StdError for MessageParse {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.source)
    }
}

impl From<MessageParse> for Error {
    fn from(err: MessageParse) -> Self {
        Self::with_source(Kind::Parse, err)
    }
}

/// Invalid reconnection strategy parameters supplied at construction.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    pub reason: String,
}

impl StrategyConfig {
    pub(crate) fn new<S: Into<String>>(reason: S) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for StrategyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid reconnection config: {}", self.reason)
    }
}

impl StdError for StrategyConfig {}

impl From<StrategyConfig> for Error {
    fn from(err: StrategyConfig) -> Self {
        Self::with_source(Kind::Config, err)
    }
}

/// The strategy factory received an unrecognized discriminator value.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct UnknownStrategy {
    pub value: String,
}

impl fmt::Display for UnknownStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown reconnection strategy {:?}, expected one of \"exponential\", \"linear\", \"fixed\"",
            self.value
        )
    }
}

impl StdError for UnknownStrategy {}

impl From<UnknownStrategy> for Error {
    fn from(err: UnknownStrategy) -> Self {
        Self::with_source(Kind::Config, err)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::with_source(Kind::Connection, e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::with_source(Kind::Parse, e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_is_preserved_through_conversion() {
        let error: Error = ConnectionExists.into();
        assert_eq!(error.kind(), Kind::State);

        let error: Error = StrategyConfig::new("interval must be positive").into();
        assert_eq!(error.kind(), Kind::Config);
    }

    #[test]
    fn downcast_recovers_concrete_source() {
        let error: Error = NotConnected.into();
        assert!(error.downcast_ref::<NotConnected>().is_some());
        assert!(error.downcast_ref::<ConnectionExists>().is_none());
    }

    #[test]
    fn unknown_strategy_names_the_offender() {
        let error: Error = UnknownStrategy {
            value: "quadratic".to_owned(),
        }
        .into();
        assert!(error.to_string().contains("quadratic"));
    }

    #[test]
    fn message_parse_retains_raw_payload() {
        let source = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let error = MessageParse::new("{not json".to_owned(), source);
        assert!(error.to_string().contains("{not json"));
    }
}
