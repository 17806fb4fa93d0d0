use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{VerifyError, VerifyResult};

/// Result of evaluating a poll condition once.
///
/// `NotYet` means "keep waiting"; `Error` means "stop and report". The two
/// must never be folded together.
#[derive(Debug)]
pub enum PollOutcome<E> {
    Satisfied,
    NotYet,
    Error(E),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollStats {
    pub attempts: u32,
    pub elapsed: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum PollError<E>
where
    E: std::error::Error + 'static,
{
    #[error("condition not satisfied after {attempts} attempts in {elapsed:?}")]
    Timeout { attempts: u32, elapsed: Duration },

    #[error("condition failed on attempt {attempts} after {elapsed:?}: {source}")]
    Condition {
        attempts: u32,
        elapsed: Duration,
        #[source]
        source: E,
    },

    #[error("cancelled after {attempts} attempts in {elapsed:?}")]
    Cancelled { attempts: u32, elapsed: Duration },
}

/// Bounded retry loop with a fixed interval and deadline.
///
/// The first check runs immediately; each later check starts `interval`
/// after the previous one finished, so checks never overlap. A `NotYet`
/// observed at or past the deadline ends the loop with `Timeout`.
#[derive(Debug, Clone)]
pub struct Poller {
    interval: Duration,
    deadline: Duration,
    cancel: Option<CancellationToken>,
}

impl Poller {
    pub fn new(interval: Duration, deadline: Duration) -> VerifyResult<Self> {
        if interval.is_zero() {
            return Err(VerifyError::InvalidConfig(
                "poll interval must be greater than zero".into(),
            ));
        }
        if deadline < interval {
            return Err(VerifyError::InvalidConfig(format!(
                "poll deadline {deadline:?} is shorter than interval {interval:?}"
            )));
        }
        Ok(Self {
            interval,
            deadline,
            cancel: None,
        })
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub async fn poll<F, Fut, E>(&self, mut condition: F) -> Result<PollStats, PollError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = PollOutcome<E>>,
        E: std::error::Error + 'static,
    {
        let start = Instant::now();
        let mut attempts = 0u32;
        loop {
            let Some(outcome) = self.unless_cancelled(condition()).await else {
                return Err(PollError::Cancelled {
                    attempts,
                    elapsed: start.elapsed(),
                });
            };
            attempts += 1;
            match outcome {
                PollOutcome::Satisfied => {
                    return Ok(PollStats {
                        attempts,
                        elapsed: start.elapsed(),
                    });
                }
                PollOutcome::Error(source) => {
                    return Err(PollError::Condition {
                        attempts,
                        elapsed: start.elapsed(),
                        source,
                    });
                }
                PollOutcome::NotYet => {}
            }
            if start.elapsed() >= self.deadline {
                return Err(PollError::Timeout {
                    attempts,
                    elapsed: start.elapsed(),
                });
            }
            if self
                .unless_cancelled(tokio::time::sleep(self.interval))
                .await
                .is_none()
            {
                return Err(PollError::Cancelled {
                    attempts,
                    elapsed: start.elapsed(),
                });
            }
        }
    }

    async fn unless_cancelled<T>(&self, fut: impl Future<Output = T>) -> Option<T> {
        match &self.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => None,
                out = fut => Some(out),
            },
            None => Some(fut.await),
        }
    }
}
