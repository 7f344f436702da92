#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod auth;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod reconnect;
pub mod types;

pub use connection::{ConnectionConfig, ConnectionManager, ConnectionState};
pub use dispatch::MessageDispatcher;
pub use events::{Event, EventKind};
pub use reconnect::{ReconnectionConfig, Reconnector};
pub use types::{CloseEvent, WsMessage};

use crate::error::Error;

pub type Result<T> = std::result::Result<T, Error>;
