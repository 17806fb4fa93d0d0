use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nsl_client::{ClientError, ResourceClient, ResourceKind, ResourceSpec};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::config::CascadeConfig;
use crate::error::{VerifyError, VerifyResult};
use crate::poller::{PollError, PollOutcome, PollStats, Poller};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeReport {
    pub namespace: String,
    pub kind: ResourceKind,
    pub resource: String,
    /// Grace period the control plane applied to the dependent resource.
    pub grace_period: Duration,
    pub removal: PollStats,
    pub elapsed: Duration,
}

/// Proves that deleting a namespace reaps what was inside it.
///
/// Observing the namespace as gone is not enough: a stale dependent would be
/// unreachable through the API while its namespace is absent. The verifier
/// therefore recreates the namespace under the same name and only then
/// checks the dependent resource.
pub struct CascadeVerifier<C: ResourceClient + ?Sized> {
    client: Arc<C>,
    cfg: CascadeConfig,
    cancel: CancellationToken,
}

impl<C: ResourceClient + ?Sized> CascadeVerifier<C> {
    pub fn new(client: Arc<C>, cfg: CascadeConfig) -> Self {
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

    #[instrument(skip(self, spec), fields(kind = %spec.kind(), resource = spec.name()))]
    pub async fn verify(
        &self,
        namespace: &str,
        spec: &ResourceSpec,
    ) -> VerifyResult<CascadeReport> {
        // Reject a bad schedule before touching the control plane.
        Poller::new(self.cfg.poll_interval, self.cfg.removal_margin)?;
        let start = Instant::now();
        let kind = spec.kind();
        let name = spec.name();

        info!("Creating a test namespace");
        self.client
            .create_namespace(namespace, &self.cfg.labels)
            .await
            .map_err(|e| VerifyError::step("create namespace", namespace, start.elapsed(), e))?;

        info!("Waiting for the default service account");
        self.cancellable(
            "await default identity",
            namespace,
            start,
            self.client
                .wait_for_default_identity(namespace, self.cfg.provision_timeout),
        )
        .await?
        .map_err(|e| readiness_error("await default identity", namespace, start, e))?;

        info!("Creating a {kind} in the namespace");
        let created = self
            .client
            .create_resource(namespace, spec)
            .await
            .map_err(|e| {
                VerifyError::step(
                    "create resource",
                    format!("{namespace}/{name}"),
                    start.elapsed(),
                    e,
                )
            })?;

        if kind.is_workload() {
            info!("Waiting for the {kind} to be running");
            let target = format!("{namespace}/{name}");
            self.cancellable(
                "await resource ready",
                &target,
                start,
                self.client
                    .wait_until_ready(kind, namespace, name, self.cfg.ready_timeout),
            )
            .await?
            .map_err(|e| readiness_error("await resource ready", &target, start, e))?;
        }

        info!("Deleting the namespace");
        self.client
            .delete_namespace(namespace)
            .await
            .map_err(|e| VerifyError::step("delete namespace", namespace, start.elapsed(), e))?;

        let grace_period = created.grace_period.unwrap_or_default();
        let removal = self.await_removal(namespace, grace_period).await?;

        info!("Recreating the namespace");
        self.client
            .create_namespace(namespace, &self.cfg.labels)
            .await
            .map_err(|e| VerifyError::step("recreate namespace", namespace, start.elapsed(), e))?;

        info!("Verifying there is no {kind} in the namespace");
        let incomplete = |observed: String| VerifyError::CascadeIncomplete {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
            elapsed: start.elapsed(),
            observed,
        };
        match self.client.get_resource(kind, namespace, name).await {
            Err(e) if e.is_not_found() => {}
            Ok(found) => {
                return Err(incomplete(format!(
                    "{} still present after recreate",
                    found.key()
                )));
            }
            Err(e) => return Err(incomplete(format!("lookup failed: {e}"))),
        }

        Ok(CascadeReport {
            namespace: namespace.to_string(),
            kind,
            resource: name.to_string(),
            grace_period,
            removal,
            elapsed: start.elapsed(),
        })
    }

    async fn await_removal(
        &self,
        namespace: &str,
        grace_period: Duration,
    ) -> VerifyResult<PollStats> {
        let deadline = self.cfg.removal_margin + grace_period;
        info!(?deadline, "Waiting for the namespace to be removed");
        let poller = Poller::new(self.cfg.poll_interval, deadline)?
            .with_cancel(self.cancel.clone());
        let last_phase = Mutex::new(String::from("never observed"));
        let client = &self.client;
        let last = &last_phase;
        let outcome = poller
            .poll(move || async move {
                match client.get_namespace(namespace).await {
                    Err(e) if e.is_not_found() => PollOutcome::Satisfied,
                    Err(e) => PollOutcome::Error(e),
                    Ok(ns) => {
                        if let Ok(mut last) = last.lock() {
                            *last = format!("phase {}", ns.phase);
                        }
                        PollOutcome::NotYet
                    }
                }
            })
            .await;

        outcome.map_err(|e| match e {
            PollError::Timeout { elapsed, .. } => VerifyError::Timeout {
                op: "await namespace removal",
                target: namespace.to_string(),
                elapsed,
                last_observed: last_phase
                    .lock()
                    .map(|s| s.clone())
                    .unwrap_or_default(),
            },
            PollError::Condition {
                attempts,
                elapsed,
                source,
            } => VerifyError::ConditionError {
                op: "await namespace removal",
                target: namespace.to_string(),
                attempts,
                elapsed,
                source,
            },
            PollError::Cancelled { elapsed, .. } => VerifyError::Cancelled {
                op: "await namespace removal",
                target: namespace.to_string(),
                elapsed,
            },
        })
    }

    /// Races an external blocking wait against the cancellation token.
    async fn cancellable<T>(
        &self,
        op: &'static str,
        target: &str,
        start: Instant,
        fut: impl Future<Output = T>,
    ) -> VerifyResult<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(VerifyError::Cancelled {
                op,
                target: target.to_string(),
                elapsed: start.elapsed(),
            }),
            out = fut => Ok(out),
        }
    }
}

fn readiness_error(
    op: &'static str,
    target: &str,
    start: Instant,
    err: ClientError,
) -> VerifyError {
    match err {
        ClientError::Timeout { what, .. } => VerifyError::Timeout {
            op,
            target: target.to_string(),
            elapsed: start.elapsed(),
            last_observed: what,
        },
        other => VerifyError::step(op, target, start.elapsed(), other),
    }
}
