//! Reconnection orchestration.
//!
//! The retry loop lives outside [`ConnectionManager`]: it owns the attempt
//! counter, consults the injected [`ReconnectStrategy`], and calls
//! `connect()` again. Keeping the counter here leaves strategies pure.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use super::strategy::ReconnectStrategy;
use crate::Result;
use crate::connection::ConnectionManager;
use crate::events::{Event, EventKind};
use crate::types::CloseEvent;

/// Single-flight reconnection driver for one [`ConnectionManager`].
///
/// Listens for the manager's `close` events; after an unexpected closure it
/// marks the manager `Reconnecting`, waits out the strategy's delay, and
/// reconnects. A successful connection resets the attempt counter; when the
/// strategy declines, the loop settles the manager in `Disconnected` and
/// waits for the next closure (a later manual `connect()` re-arms it).
///
/// Run exactly one reconnector per manager; concurrent drivers would race
/// to create duplicate sockets.
pub struct Reconnector {
    manager: ConnectionManager,
    strategy: Box<dyn ReconnectStrategy>,
}

impl Reconnector {
    #[must_use]
    pub fn new(manager: ConnectionManager, strategy: Box<dyn ReconnectStrategy>) -> Self {
        Self { manager, strategy }
    }

    /// Build the strategy from the manager's own reconnection config.
    ///
    /// # Errors
    ///
    /// [`crate::error::StrategyConfig`] when the config's parameters are
    /// invalid for the selected strategy.
    pub fn from_config(manager: &ConnectionManager) -> Result<Self> {
        let strategy = manager.reconnection_config().build()?;
        Ok(Self::new(manager.clone(), strategy))
    }

    /// Spawn the supervision loop on the current runtime. Abort the returned
    /// handle to stop supervising.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run the supervision loop. Waits for close events indefinitely.
    pub async fn run(self) {
        let (close_tx, mut close_rx) = mpsc::unbounded_channel::<CloseEvent>();
        let _listener = self.manager.on(EventKind::Close, move |event| {
            if let Event::Close(close) = event {
                drop(close_tx.send(close.clone()));
            }
        });

        let mut attempts: u32 = 0;
        while let Some(close) = close_rx.recv().await {
            loop {
                if self.manager.state().is_connected() {
                    // Someone else already reconnected for us.
                    attempts = 0;
                    break;
                }
                if !self.strategy.should_reconnect(&close, attempts) {
                    #[cfg(feature = "tracing")]
                    tracing::info!(code = close.code, attempts, "not reconnecting");
                    self.manager.disconnect();
                    attempts = 0;
                    break;
                }

                self.manager.mark_reconnecting();
                sleep(self.strategy.next_delay(attempts)).await;
                attempts = attempts.saturating_add(1);

                match self.manager.connect().await {
                    Ok(()) => {
                        #[cfg(feature = "tracing")]
                        tracing::debug!(attempts, "reconnected");
                        attempts = 0;
                        break;
                    }
                    Err(e) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(error = %e, attempts, "reconnect attempt failed");
                        #[cfg(not(feature = "tracing"))]
                        let _: &crate::error::Error = &e;
                    }
                }
            }
        }
    }
}
