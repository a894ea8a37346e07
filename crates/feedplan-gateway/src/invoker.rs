//! Retry, timeout, and usage accounting around capability calls.

use std::future::Future;
use std::time::Duration;

use feedplan_core::AppConfig;

use crate::error::CapabilityError;
use crate::ledger::ResourceLedger;
use crate::types::{Capability, Metered};

/// Longest exponent applied to the base delay; keeps the shift in range.
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Wraps capability calls with rate-limit backoff and a per-call timeout,
/// and records the usage of every successful call in its ledger.
///
/// Back-off schedule with `base_delay_ms = 1_000` and `max_retries = 3`:
///
/// | Failed attempt | Sleep before next attempt |
/// |----------------|---------------------------|
/// | 0              | 1 000 ms                  |
/// | 1              | 2 000 ms                  |
/// | 2              | 4 000 ms                  |
/// | 3              | give up: `RetriesExhausted` |
///
/// Only [`CapabilityError::RateLimited`] is retried; every other error is
/// returned from the first attempt unchanged.
#[derive(Debug, Clone)]
pub struct ResilientInvoker {
    max_retries: u32,
    base_delay_ms: u64,
    call_timeout: Duration,
    ledger: ResourceLedger,
}

impl ResilientInvoker {
    #[must_use]
    pub fn new(max_retries: u32, base_delay_ms: u64, call_timeout: Duration) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            call_timeout,
            ledger: ResourceLedger::new(),
        }
    }

    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self::new(
            config.max_retries,
            config.retry_base_delay_ms,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// Same policy, recording into `ledger` instead.
    #[must_use]
    pub fn with_ledger(&self, ledger: ResourceLedger) -> Self {
        Self {
            ledger,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn ledger(&self) -> &ResourceLedger {
        &self.ledger
    }

    /// Delay before the retry that follows failed attempt `attempt` (0-based).
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(MAX_BACKOFF_EXPONENT);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }

    /// Runs `operation`, retrying rate-limit failures with exponential backoff.
    ///
    /// # Errors
    ///
    /// - [`CapabilityError::RetriesExhausted`] if every attempt was rate limited.
    /// - [`CapabilityError::Timeout`] if one attempt exceeded the call timeout.
    /// - Any non-retriable error from `operation`, unchanged.
    pub async fn invoke<T, F, Fut>(
        &self,
        capability: Capability,
        mut operation: F,
    ) -> Result<T, CapabilityError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Metered<T>, CapabilityError>>,
    {
        let mut attempt = 0u32;
        loop {
            let outcome = tokio::time::timeout(self.call_timeout, operation())
                .await
                .map_err(|_| CapabilityError::Timeout {
                    capability,
                    after_secs: self.call_timeout.as_secs(),
                })?;

            match outcome {
                Ok(metered) => {
                    self.ledger.record(capability, metered.usage);
                    return Ok(metered.value);
                }
                Err(err) if !err.is_retriable() => return Err(err),
                Err(err) => {
                    if attempt >= self.max_retries {
                        tracing::warn!(
                            %capability,
                            attempts = attempt + 1,
                            error = %err,
                            "capability still rate limited, giving up"
                        );
                        return Err(CapabilityError::RetriesExhausted {
                            capability,
                            attempts: attempt + 1,
                        });
                    }
                    let delay = self.backoff_delay(attempt);
                    attempt += 1;
                    tracing::warn!(
                        %capability,
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "capability rate limited, retrying after back-off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
