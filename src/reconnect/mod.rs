//! Reconnection policy and orchestration.
//!
//! Split in two halves so policies stay pure and swappable:
//!
//! - [`ReconnectStrategy`] and its implementations decide *whether* to
//!   reconnect after a closure and *how long* to wait. They hold only their
//!   validated configuration, never an attempt counter.
//! - [`Reconnector`] owns the attempt counter and drives the retry loop
//!   against a [`crate::connection::ConnectionManager`].
//!
//! [`ReconnectionConfig`] selects and parameterizes a strategy; omitted
//! fields take documented defaults.

pub mod config;
pub mod strategy;
pub mod supervisor;

pub use config::{ReconnectionConfig, StrategyKind};
pub use strategy::{ExponentialBackoff, FixedInterval, LinearBackoff, ReconnectStrategy};
pub use supervisor::Reconnector;
