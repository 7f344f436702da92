//! Reconnection configuration and the strategy factory.
//!
//! Configs arrive as JSON from the dashboard's settings payload; omitted
//! fields silently take the documented defaults rather than failing, so a
//! partially specified config behaves predictably.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use super::strategy::{ExponentialBackoff, FixedInterval, LinearBackoff, ReconnectStrategy};
use crate::Result;
use crate::error::UnknownStrategy;

pub const DEFAULT_INITIAL_DELAY_MS: u64 = 1000;
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;
pub const DEFAULT_INCREMENT_MS: u64 = 1000;
pub const DEFAULT_INTERVAL_MS: u64 = 5000;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Discriminator selecting the concrete reconnection strategy.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Exponential,
    Linear,
    Fixed,
}

impl FromStr for StrategyKind {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "exponential" => Ok(Self::Exponential),
            "linear" => Ok(Self::Linear),
            "fixed" => Ok(Self::Fixed),
            other => Err(UnknownStrategy {
                value: other.to_owned(),
            }
            .into()),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Exponential => "exponential",
            Self::Linear => "linear",
            Self::Fixed => "fixed",
        };
        write!(f, "{name}")
    }
}

impl<'de> Deserialize<'de> for StrategyKind {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

/// Immutable reconnection configuration, selected at construction.
///
/// Field names follow the wire config (`initialDelay`, `maxDelay`, ...);
/// all delays are in milliseconds. Kind-specific fields are ignored by the
/// other strategies.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReconnectionConfig {
    pub strategy: StrategyKind,
    /// First-attempt delay for the exponential and linear strategies.
    pub initial_delay: u64,
    /// Delay ceiling for the exponential and linear strategies.
    pub max_delay: u64,
    /// Per-attempt growth factor for the exponential strategy.
    pub backoff_factor: f64,
    /// Per-attempt additive step for the linear strategy.
    pub increment: u64,
    /// Constant delay for the fixed strategy.
    pub interval: u64,
    /// Attempt ceiling shared by every strategy.
    pub max_attempts: u32,
}

impl Default for ReconnectionConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Exponential,
            initial_delay: DEFAULT_INITIAL_DELAY_MS,
            max_delay: DEFAULT_MAX_DELAY_MS,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            increment: DEFAULT_INCREMENT_MS,
            interval: DEFAULT_INTERVAL_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ReconnectionConfig {
    /// Build the concrete strategy this config selects.
    ///
    /// # Errors
    ///
    /// [`crate::error::StrategyConfig`] when the selected strategy rejects
    /// its parameters. Configuration errors surface here, at setup time,
    /// never at reconnect time.
    pub fn build(&self) -> Result<Box<dyn ReconnectStrategy>> {
        Ok(match self.strategy {
            StrategyKind::Exponential => Box::new(ExponentialBackoff::new(
                Duration::from_millis(self.initial_delay),
                Duration::from_millis(self.max_delay),
                self.backoff_factor,
                self.max_attempts,
            )?),
            StrategyKind::Linear => Box::new(LinearBackoff::new(
                Duration::from_millis(self.initial_delay),
                Duration::from_millis(self.max_delay),
                Duration::from_millis(self.increment),
                self.max_attempts,
            )?),
            StrategyKind::Fixed => Box::new(FixedInterval::new(
                Duration::from_millis(self.interval),
                self.max_attempts,
            )?),
        })
    }
}
