//! Deadlines, bounded retry of transient ledger errors, and the finality
//! poller used by every settler.
//!
//! All waiting is done on tokio timers, so dropping the returned future
//! cancels the wait. Cancellation never touches a transaction that was
//! already broadcast; its fate is simply left unresolved.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{sleep_until, timeout_at, Instant};

use crate::constants::{DEFAULT_FINALITY_TIMEOUT, DEFAULT_POLL_INTERVAL};
use crate::LedgerError;

/// Retry cap for transient errors when the caller supplied no deadline.
pub const MAX_TRANSIENT_RETRIES: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("deadline elapsed")]
pub struct DeadlineElapsed;

/// Caller-supplied upper bound on a build, verify or settle call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// No deadline beyond the engine's own timeouts.
    pub fn none() -> Self {
        Self(None)
    }

    pub fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    pub fn after(duration: Duration) -> Self {
        Self(Some(Instant::now() + duration))
    }

    pub fn instant(&self) -> Option<Instant> {
        self.0
    }

    pub fn is_elapsed(&self) -> bool {
        self.0.is_some_and(|at| Instant::now() >= at)
    }

    /// The earlier of this deadline and `other`.
    pub fn cap(&self, other: Instant) -> Instant {
        match self.0 {
            Some(at) if at < other => at,
            _ => other,
        }
    }

    /// Run `fut` to completion or until the deadline, whichever comes first.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, DeadlineElapsed> {
        match self.0 {
            None => Ok(fut.await),
            Some(at) => timeout_at(at, fut).await.map_err(|_| DeadlineElapsed),
        }
    }
}

/// Retry `op` while it fails with [`LedgerError::Transient`].
///
/// Non-transient errors return immediately. Retries stop at the deadline,
/// or after [`MAX_TRANSIENT_RETRIES`] when there is none; the last error is
/// returned.
pub async fn retry_transient<T, F, Fut>(
    mut op: F,
    delay: Duration,
    deadline: Deadline,
) -> Result<T, LedgerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LedgerError>>,
{
    let mut attempt = 0u32;
    loop {
        let err = match deadline.run(op()).await {
            Ok(Ok(v)) => return Ok(v),
            Ok(Err(e)) if e.is_transient() => e,
            Ok(Err(e)) => return Err(e),
            Err(DeadlineElapsed) => {
                return Err(LedgerError::Transient("deadline elapsed".to_string()))
            }
        };
        attempt += 1;
        if deadline.instant().is_none() && attempt >= MAX_TRANSIENT_RETRIES {
            return Err(err);
        }
        let next = Instant::now() + delay;
        if deadline.instant().is_some_and(|at| next >= at) {
            return Err(err);
        }
        tracing::debug!(attempt, error = %err, "transient ledger error, retrying");
        sleep_until(next).await;
    }
}

/// Ledger-reported state of a broadcast transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Pending,
    Success,
    Failed,
}

/// How a poll loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Success,
    Failed,
    /// No terminal state before the timeout or deadline. The transaction
    /// may still land.
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_FINALITY_TIMEOUT,
        }
    }
}

/// Poll `status` every `config.interval` until a terminal state, stopping at
/// `min(deadline, now + config.timeout)`.
///
/// Must be called after the broadcast was accepted; the first poll happens
/// one interval later. Transient errors count as pending. Any other error
/// ends polling with [`PollOutcome::TimedOut`], since the transaction's fate
/// is unknown rather than failed.
pub async fn poll_until_final<F, Fut>(
    mut status: F,
    config: PollConfig,
    deadline: Deadline,
) -> PollOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<TxState, LedgerError>>,
{
    let start = Instant::now();
    let stop = deadline.cap(start + config.timeout);
    let mut next = start + config.interval;
    let mut polls = 0u32;

    loop {
        if next > stop {
            tracing::debug!(polls, "finality polling timed out");
            return PollOutcome::TimedOut;
        }
        sleep_until(next).await;
        polls += 1;

        match timeout_at(stop, status()).await {
            Err(_) => return PollOutcome::TimedOut,
            Ok(Ok(TxState::Success)) => return PollOutcome::Success,
            Ok(Ok(TxState::Failed)) => return PollOutcome::Failed,
            Ok(Ok(TxState::Pending)) => {}
            Ok(Err(e)) if e.is_transient() => {
                tracing::debug!(polls, error = %e, "status poll failed, will retry");
            }
            Ok(Err(e)) => {
                tracing::warn!(polls, error = %e, "status poll rejected, giving up");
                return PollOutcome::TimedOut;
            }
        }
        next += config.interval;
    }
}
