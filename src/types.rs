//! Wire-level types shared across the SDK.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;

/// Close code sent for a caller-intended, normal closure.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Application-reserved close codes signalling an authentication or
/// authorization rejection. Retrying cannot fix these.
pub const AUTH_CLOSE_CODES: RangeInclusive<u16> = 4001..=4999;

/// Synthesized when the peer vanishes without completing a closing handshake.
pub(crate) const ABNORMAL_CLOSURE: u16 = 1006;

/// One realtime frame: a required `type` discriminator plus arbitrary
/// additional fields. No schema is enforced beyond successful JSON decoding
/// into this shape.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsMessage {
    /// Message discriminator consumed by [`crate::dispatch::MessageDispatcher`].
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Remaining fields of the frame, in no particular order.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl WsMessage {
    #[must_use]
    pub fn new<S: Into<String>>(msg_type: S) -> Self {
        Self {
            msg_type: msg_type.into(),
            payload: Map::new(),
        }
    }

    /// Attach a payload field, builder-style.
    #[must_use]
    pub fn with_field<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Look up a payload field by name.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }
}

/// Code and reason of a connection closure, as delivered by the transport.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    pub code: u16,
    pub reason: String,
}

impl CloseEvent {
    #[must_use]
    pub fn new<S: Into<String>>(code: u16, reason: S) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// The caller intentionally disconnected; reconnection must not happen.
    #[must_use]
    pub fn is_normal(&self) -> bool {
        self.code == NORMAL_CLOSURE
    }

    /// The gateway rejected our credentials; reconnection cannot help.
    #[must_use]
    pub fn is_auth_rejection(&self) -> bool {
        AUTH_CLOSE_CODES.contains(&self.code)
    }

    pub(crate) fn abnormal() -> Self {
        Self::new(ABNORMAL_CLOSURE, "")
    }
}

impl From<CloseFrame> for CloseEvent {
    fn from(frame: CloseFrame) -> Self {
        Self::new(u16::from(frame.code), frame.reason.to_string())
    }
}
