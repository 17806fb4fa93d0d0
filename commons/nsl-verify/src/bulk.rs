use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::future::join_all;
use nsl_client::{ClientError, NamespaceFilter, ResourceClient};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::config::BulkConfig;
use crate::error::{DeleteFailure, VerifyError, VerifyResult};
use crate::poller::{PollError, PollOutcome, Poller};

/// Names created by one bulk run. Only used for the expected cardinality.
#[derive(Debug, Clone)]
pub struct LifecycleBatch {
    pub prefix: String,
    pub names: Vec<String>,
}

impl LifecycleBatch {
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkReport {
    pub prefix: String,
    pub created: usize,
    pub deleted: usize,
    /// Namespaces still listed when convergence was declared.
    pub remaining: usize,
    pub attempts: u32,
    pub convergence_elapsed: Duration,
    pub elapsed: Duration,
}

/// Creates a batch of namespaces concurrently, deletes them in one sweep and
/// waits for the control plane to drain them below a threshold.
pub struct BulkLifecycleDriver<C: ResourceClient + ?Sized + 'static> {
    client: Arc<C>,
    cfg: BulkConfig,
    cancel: CancellationToken,
}

impl<C: ResourceClient + ?Sized + 'static> BulkLifecycleDriver<C> {
    pub fn new(client: Arc<C>, cfg: BulkConfig) -> Self {
        Self {
            client,
            cfg,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &BulkConfig {
        &self.cfg
    }

    pub fn namespace_name(&self, index: usize) -> String {
        format!("{}-{}", self.cfg.prefix, index)
    }

    #[instrument(skip(self), fields(prefix = %self.cfg.prefix))]
    pub async fn run(
        &self,
        total: usize,
        max_remaining: usize,
        deadline: Duration,
    ) -> VerifyResult<BulkReport> {
        if total == 0 {
            return Err(VerifyError::InvalidConfig("bulk run needs at least one namespace".into()));
        }
        if self.cfg.prefix.is_empty() {
            return Err(VerifyError::InvalidConfig("bulk prefix must not be empty".into()));
        }
        let poller = Poller::new(self.cfg.poll_interval, deadline)?
            .with_cancel(self.cancel.clone());
        let start = Instant::now();

        info!(total, "Creating testing namespaces");
        let batch = self.create_batch(total, start).await?;

        info!(delay = ?self.cfg.settle_delay, "Waiting before deleting namespaces");
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                return Err(VerifyError::Cancelled {
                    op: "settle before bulk delete",
                    target: self.cfg.prefix.clone(),
                    elapsed: start.elapsed(),
                });
            }
            _ = tokio::time::sleep(self.cfg.settle_delay) => {}
        }

        info!("Deleting namespaces");
        let deleted = self.delete_batch(&batch, start).await?;

        info!(max_remaining, ?deadline, "Waiting for namespaces to vanish");
        let last_remaining = AtomicUsize::new(usize::MAX);
        let filter = NamespaceFilter::name_contains(&self.cfg.prefix);
        let client = &self.client;
        let (filter, last) = (&filter, &last_remaining);
        let outcome = poller
            .poll(move || async move {
                match client.list_namespaces(filter).await {
                    Ok(found) => {
                        let remaining = found.len();
                        last.store(remaining, Ordering::Relaxed);
                        info!(remaining, "Remaining namespaces");
                        if remaining <= max_remaining {
                            PollOutcome::Satisfied
                        } else {
                            PollOutcome::NotYet
                        }
                    }
                    Err(e) => PollOutcome::Error(e),
                }
            })
            .await;

        let stats = outcome.map_err(|e| match e {
            PollError::Timeout { attempts, elapsed } => VerifyError::ConvergenceTimeout {
                prefix: self.cfg.prefix.clone(),
                remaining: last_remaining.load(Ordering::Relaxed),
                max_allowed: max_remaining,
                attempts,
                elapsed,
            },
            PollError::Condition {
                attempts,
                elapsed,
                source,
            } => VerifyError::ConditionError {
                op: "count remaining namespaces",
                target: self.cfg.prefix.clone(),
                attempts,
                elapsed,
                source,
            },
            PollError::Cancelled { elapsed, .. } => VerifyError::Cancelled {
                op: "await namespace convergence",
                target: self.cfg.prefix.clone(),
                elapsed,
            },
        })?;
        debug!(attempts = stats.attempts, elapsed = ?stats.elapsed, "convergence reached");

        Ok(BulkReport {
            prefix: self.cfg.prefix.clone(),
            created: batch.len(),
            deleted,
            remaining: last_remaining.load(Ordering::Relaxed),
            attempts: stats.attempts,
            convergence_elapsed: stats.elapsed,
            elapsed: start.elapsed(),
        })
    }

    /// Launches every create worker before awaiting any, then joins all of
    /// them. The lowest failing index decides the error.
    async fn create_batch(&self, total: usize, start: Instant) -> VerifyResult<LifecycleBatch> {
        let names: Vec<String> = (0..total).map(|i| self.namespace_name(i)).collect();
        let handles: Vec<_> = names
            .iter()
            .cloned()
            .map(|name| {
                let client = self.client.clone();
                let labels = self.cfg.labels.clone();
                tokio::spawn(async move {
                    client.create_namespace(&name, &labels).await.map(|_| ())
                })
            })
            .collect();

        let slots: Vec<Result<(), ClientError>> = join_all(handles)
            .await
            .into_iter()
            .map(|joined| {
                joined.unwrap_or_else(|e| {
                    Err(ClientError::Transport(format!("create worker aborted: {e}")))
                })
            })
            .collect();

        for (index, slot) in slots.into_iter().enumerate() {
            if let Err(cause) = slot {
                return Err(VerifyError::CreateFailed {
                    index,
                    name: names[index].clone(),
                    elapsed: start.elapsed(),
                    cause,
                });
            }
        }
        Ok(LifecycleBatch {
            prefix: self.cfg.prefix.clone(),
            names,
        })
    }

    async fn delete_batch(&self, batch: &LifecycleBatch, start: Instant) -> VerifyResult<usize> {
        let fail = |reason| VerifyError::DeleteFailed {
            prefix: batch.prefix.clone(),
            elapsed: start.elapsed(),
            reason,
        };
        let listed = self
            .client
            .list_namespaces(&NamespaceFilter::all())
            .await
            .map_err(|e| fail(DeleteFailure::List(e)))?;
        let targets: Vec<String> = listed
            .into_iter()
            .map(|ns| ns.name)
            .filter(|name| name.contains(batch.prefix.as_str()))
            .filter(|name| !self.cfg.skip.iter().any(|s| name.contains(s.as_str())))
            .collect();
        if targets.len() != batch.len() {
            return Err(fail(DeleteFailure::CountMismatch {
                expected: batch.len(),
                matched: targets.len(),
            }));
        }

        let results = join_all(
            targets
                .iter()
                .map(|name| self.client.delete_namespace(name)),
        )
        .await;
        for (name, result) in targets.iter().zip(results) {
            if let Err(source) = result {
                return Err(fail(DeleteFailure::Request {
                    name: name.clone(),
                    source,
                }));
            }
        }
        Ok(targets.len())
    }
}
