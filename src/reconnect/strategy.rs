//! Pure reconnection decision policies.
//!
//! A strategy answers two questions: should another reconnect attempt be
//! made after a closure, and how long to wait before it. Attempt counting
//! stays with the caller ([`super::Reconnector`]), so every policy here is
//! stateless across calls and trivially testable.

use std::time::Duration;

use crate::Result;
use crate::error::StrategyConfig;
use crate::types::CloseEvent;

/// Decision logic for reconnection, decoupled from the socket so policies
/// are swappable and independently testable.
pub trait ReconnectStrategy: Send + Sync {
    /// Ceiling on reconnection attempts, shared by every policy.
    fn max_attempts(&self) -> u32;

    /// Delay before reconnect attempt number `attempts` (zero-based count of
    /// failed attempts so far).
    fn next_delay(&self, attempts: u32) -> Duration;

    /// Whether another reconnect attempt should be made after `close`.
    ///
    /// Never reconnects on a normal closure (the caller intentionally
    /// disconnected), on an application auth rejection (codes 4001–4999,
    /// which retries cannot fix), or once `attempts` reaches the ceiling.
    fn should_reconnect(&self, close: &CloseEvent, attempts: u32) -> bool {
        if attempts >= self.max_attempts() {
            return false;
        }
        if close.is_normal() || close.is_auth_rejection() {
            return false;
        }
        true
    }

    /// Hook reserved for future stateful policies. Attempt counting lives
    /// with the caller, so current policies have nothing to reset; keep this
    /// in the interface for substitutability.
    fn reset(&mut self) {}
}

fn validate_max_attempts(max_attempts: u32) -> Result<()> {
    if max_attempts == 0 {
        return Err(StrategyConfig::new("max_attempts must be positive").into());
    }
    Ok(())
}

fn validate_positive(value: Duration, name: &str) -> Result<()> {
    if value.is_zero() {
        return Err(StrategyConfig::new(format!("{name} must be positive")).into());
    }
    Ok(())
}

/// Delay grows by `backoff_factor` per attempt, capped at `max_delay`:
/// `min(initial_delay * backoff_factor^attempts, max_delay)`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    backoff_factor: f64,
    max_attempts: u32,
}

impl ExponentialBackoff {
    /// # Errors
    ///
    /// Fails for a zero `initial_delay`, a `backoff_factor` of 1 or below
    /// (it would never grow), or a zero `max_attempts`.
    pub fn new(
        initial_delay: Duration,
        max_delay: Duration,
        backoff_factor: f64,
        max_attempts: u32,
    ) -> Result<Self> {
        validate_positive(initial_delay, "initial_delay")?;
        if backoff_factor <= 1.0 {
            return Err(StrategyConfig::new("backoff_factor must be greater than 1").into());
        }
        validate_max_attempts(max_attempts)?;
        Ok(Self {
            initial_delay,
            max_delay,
            backoff_factor,
            max_attempts,
        })
    }
}

impl ReconnectStrategy for ExponentialBackoff {
    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[expect(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "millisecond delays are capped at max_delay, far below either type's limits"
    )]
    fn next_delay(&self, attempts: u32) -> Duration {
        let exponent = i32::try_from(attempts).unwrap_or(i32::MAX);
        let scaled = self.initial_delay.as_millis() as f64 * self.backoff_factor.powi(exponent);
        let capped = self.max_delay.as_millis() as f64;
        if scaled.is_finite() && scaled < capped {
            Duration::from_millis(scaled.round() as u64)
        } else {
            self.max_delay
        }
    }
}

/// Delay grows by a fixed `increment` per attempt, capped at `max_delay`:
/// `min(initial_delay + attempts * increment, max_delay)`.
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    increment: Duration,
    max_attempts: u32,
}

impl LinearBackoff {
    /// # Errors
    ///
    /// Fails for a zero `initial_delay`, `increment`, or `max_attempts`.
    pub fn new(
        initial_delay: Duration,
        max_delay: Duration,
        increment: Duration,
        max_attempts: u32,
    ) -> Result<Self> {
        validate_positive(initial_delay, "initial_delay")?;
        validate_positive(increment, "increment")?;
        validate_max_attempts(max_attempts)?;
        Ok(Self {
            initial_delay,
            max_delay,
            increment,
            max_attempts,
        })
    }
}

impl ReconnectStrategy for LinearBackoff {
    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn next_delay(&self, attempts: u32) -> Duration {
        self.increment
            .checked_mul(attempts)
            .map_or(self.max_delay, |step| {
                self.initial_delay.saturating_add(step)
            })
            .min(self.max_delay)
    }
}

/// Constant delay regardless of attempt count.
#[derive(Debug, Clone)]
pub struct FixedInterval {
    interval: Duration,
    max_attempts: u32,
}

impl FixedInterval {
    /// # Errors
    ///
    /// Fails for a zero `interval` or `max_attempts`.
    pub fn new(interval: Duration, max_attempts: u32) -> Result<Self> {
        validate_positive(interval, "interval")?;
        validate_max_attempts(max_attempts)?;
        Ok(Self {
            interval,
            max_attempts,
        })
    }
}

impl ReconnectStrategy for FixedInterval {
    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn next_delay(&self, _attempts: u32) -> Duration {
        self.interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    fn exponential() -> ExponentialBackoff {
        ExponentialBackoff::new(ms(1000), ms(30_000), 2.0, 5).unwrap()
    }

    #[test]
    fn exponential_delay_sequence() {
        let strategy = exponential();
        let delays: Vec<u64> = (0..6)
            .map(|attempt| u64::try_from(strategy.next_delay(attempt).as_millis()).unwrap())
            .collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16_000, 30_000]);
    }

    #[test]
    fn exponential_delay_is_non_decreasing_and_capped() {
        let strategy = exponential();
        let mut previous = Duration::ZERO;
        for attempt in 0..64 {
            let delay = strategy.next_delay(attempt);
            assert!(delay >= previous, "delay shrank at attempt {attempt}");
            assert!(delay <= ms(30_000), "delay exceeded cap at attempt {attempt}");
            previous = delay;
        }
    }

    #[test]
    fn exponential_rejects_non_growing_factor() {
        assert!(ExponentialBackoff::new(ms(1000), ms(30_000), 1.0, 5).is_err());
        assert!(ExponentialBackoff::new(ms(1000), ms(30_000), 0.5, 5).is_err());
        assert!(ExponentialBackoff::new(ms(1000), ms(30_000), 1.5, 5).is_ok());
    }

    #[test]
    fn exponential_rejects_zero_initial_delay() {
        let error = ExponentialBackoff::new(ms(0), ms(30_000), 2.0, 5).unwrap_err();
        assert!(error.downcast_ref::<StrategyConfig>().is_some());
    }

    #[test]
    fn linear_delay_sequence() {
        let strategy = LinearBackoff::new(ms(1000), ms(30_000), ms(1000), 5).unwrap();
        let delays: Vec<u64> = (0..5)
            .map(|attempt| u64::try_from(strategy.next_delay(attempt).as_millis()).unwrap())
            .collect();
        assert_eq!(delays, vec![1000, 2000, 3000, 4000, 5000]);
    }

    #[test]
    fn linear_delay_respects_cap() {
        let strategy = LinearBackoff::new(ms(1000), ms(3500), ms(1000), 5).unwrap();
        assert_eq!(strategy.next_delay(10), ms(3500));
    }

    #[test]
    fn linear_rejects_zero_parameters() {
        assert!(LinearBackoff::new(ms(0), ms(30_000), ms(1000), 5).is_err());
        assert!(LinearBackoff::new(ms(1000), ms(30_000), ms(0), 5).is_err());
    }

    #[test]
    fn fixed_delay_ignores_attempt_count() {
        let strategy = FixedInterval::new(ms(5000), 5).unwrap();
        for attempt in [0, 1, 7, 1000] {
            assert_eq!(strategy.next_delay(attempt), ms(5000));
        }
    }

    #[test]
    fn fixed_rejects_zero_interval() {
        assert!(FixedInterval::new(ms(0), 5).is_err());
    }

    #[test]
    fn zero_max_attempts_is_rejected_by_every_strategy() {
        assert!(ExponentialBackoff::new(ms(1000), ms(30_000), 2.0, 0).is_err());
        assert!(LinearBackoff::new(ms(1000), ms(30_000), ms(1000), 0).is_err());
        assert!(FixedInterval::new(ms(5000), 0).is_err());
    }

    #[test]
    fn normal_closure_never_reconnects() {
        let strategy = exponential();
        let close = CloseEvent::new(1000, "User disconnected");
        assert!(!strategy.should_reconnect(&close, 0));
        assert!(!strategy.should_reconnect(&close, 4));
    }

    #[test]
    fn auth_rejection_codes_never_reconnect() {
        let strategy = exponential();
        for code in [4001, 4500, 4999] {
            let close = CloseEvent::new(code, "auth");
            assert!(!strategy.should_reconnect(&close, 0), "code {code}");
        }
    }

    #[test]
    fn other_close_codes_reconnect_until_attempts_exhausted() {
        let strategy = exponential();
        for code in [1001, 1006, 1011, 4000] {
            let close = CloseEvent::new(code, "");
            assert!(strategy.should_reconnect(&close, 0), "code {code}");
            assert!(strategy.should_reconnect(&close, 4), "code {code}");
            assert!(!strategy.should_reconnect(&close, 5), "code {code}");
            assert!(!strategy.should_reconnect(&close, 6), "code {code}");
        }
    }

    #[test]
    fn reset_is_a_no_op() {
        let mut strategy = exponential();
        let before = strategy.next_delay(3);
        strategy.reset();
        assert_eq!(strategy.next_delay(3), before, "reset must not change delays");
    }
}
