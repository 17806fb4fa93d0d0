//! In-process control plane with the same black-box semantics the harness
//! expects from a real one: creates are accepted immediately, deletes are
//! only requests, and namespaces drain through a serial finalization
//! pipeline. State transitions are reaped lazily against the tokio clock, so
//! tests running with paused time see deterministic behaviour.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::traits::ResourceClient;
use crate::types::{
    Labels, Namespace, NamespaceFilter, NamespacePhase, Resource, ResourceKind,
    ResourceSpec,
};

#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Time the deletion pipeline spends finalizing one namespace.
    pub drain_interval: Duration,
    /// Delay between pod creation and the pod reporting ready.
    pub pod_ready_delay: Duration,
    /// Delay between namespace creation and its default identity existing.
    pub identity_delay: Duration,
    /// Grace period applied to pods that do not set one.
    pub default_grace_period: Duration,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            drain_interval: Duration::from_secs(1),
            pod_ready_delay: Duration::from_secs(2),
            identity_delay: Duration::from_millis(500),
            default_grace_period: Duration::from_secs(30),
        }
    }
}

/// Misbehaviours that can be switched on to exercise failure paths.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Finalizing a namespace leaves its dependents behind.
    pub orphan_dependents: bool,
    /// Deleted namespaces stay `Terminating` forever.
    pub stall_deletion: bool,
    /// Every `list_namespaces` call fails.
    pub fail_list: bool,
    /// Namespace names whose creation is rejected.
    pub fail_create: HashSet<String>,
    /// Namespace names whose deletion is rejected.
    pub fail_delete: HashSet<String>,
    /// Namespace names whose lookup is rejected.
    pub fail_get: HashSet<String>,
    /// Pods never become ready.
    pub never_ready: bool,
}

/// Call counters, useful for asserting how often the control plane was
/// consulted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub namespace_creates: usize,
    pub namespace_deletes: usize,
    pub namespace_gets: usize,
    pub list_calls: usize,
}

struct NamespaceEntry {
    namespace: Namespace,
    created_at: Instant,
    finalize_at: Option<Instant>,
}

struct ResourceEntry {
    resource: Resource,
    created_at: Instant,
}

type ResourceKey = (String, ResourceKind, String);

#[derive(Default)]
struct State {
    namespaces: BTreeMap<String, NamespaceEntry>,
    resources: HashMap<ResourceKey, ResourceEntry>,
    pipeline_tail: Option<Instant>,
    faults: Faults,
    stats: Stats,
}

impl State {
    fn reap(&mut self, now: Instant, orphan: bool) {
        let done: Vec<String> = self
            .namespaces
            .iter()
            .filter(|(_, e)| e.finalize_at.is_some_and(|at| at <= now))
            .map(|(name, _)| name.clone())
            .collect();
        for name in done {
            self.namespaces.remove(&name);
            if !orphan {
                self.resources.retain(|(ns, _, _), _| *ns != name);
            }
            debug!(namespace = %name, "namespace finalized");
        }
    }
}

/// Not `Clone`: share it behind an `Arc` once configured.
pub struct MemoryControlPlane {
    cfg: SimConfig,
    state: Mutex<State>,
}

impl Default for MemoryControlPlane {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

impl MemoryControlPlane {
    pub fn new(cfg: SimConfig) -> Self {
        Self {
            cfg,
            state: Mutex::new(State::default()),
        }
    }

    /// Replaces the fault set before the plane is shared. Use
    /// [`update_faults`](Self::update_faults) afterwards.
    pub fn with_faults(mut self, faults: Faults) -> Self {
        self.state.get_mut().faults = faults;
        self
    }

    pub async fn update_faults(&self, update: impl FnOnce(&mut Faults)) {
        let mut state = self.state.lock().await;
        update(&mut state.faults);
    }

    pub async fn stats(&self) -> Stats {
        self.state.lock().await.stats
    }

    /// Direct look at a dependent resource, bypassing namespace visibility.
    pub async fn has_resource(&self, kind: ResourceKind, namespace: &str, name: &str) -> bool {
        let state = self.reaped().await;
        state.resources.contains_key(&(namespace.to_string(), kind, name.to_string()))
    }

    async fn reaped(&self) -> tokio::sync::MutexGuard<'_, State> {
        let mut state = self.state.lock().await;
        let orphan = state.faults.orphan_dependents;
        state.reap(Instant::now(), orphan);
        state
    }

    /// Sleep until `at`, or fail with a timeout if that lies beyond the
    /// caller's deadline.
    async fn wait_until(at: Option<Instant>, deadline: Duration, what: String) -> ClientResult<()> {
        let now = Instant::now();
        match at {
            Some(at) if at <= now => Ok(()),
            Some(at) if at - now <= deadline => {
                tokio::time::sleep_until(at).await;
                Ok(())
            }
            _ => {
                tokio::time::sleep(deadline).await;
                Err(ClientError::Timeout {
                    what,
                    after: deadline,
                })
            }
        }
    }
}

fn merge_labels(labels: &mut Labels, patch: &serde_json::Value) -> ClientResult<()> {
    let Some(obj) = patch.as_object() else {
        return Err(ClientError::Invalid("patch must be a JSON object".into()));
    };
    let Some(metadata) = obj.get("metadata") else {
        return Ok(());
    };
    let Some(patch_labels) = metadata.get("labels") else {
        return Ok(());
    };
    let Some(patch_labels) = patch_labels.as_object() else {
        return Err(ClientError::Invalid("metadata.labels must be an object".into()));
    };
    for (k, v) in patch_labels {
        match v {
            serde_json::Value::String(s) => {
                labels.insert(k.clone(), s.clone());
            }
            serde_json::Value::Null => {
                labels.remove(k);
            }
            other => {
                return Err(ClientError::Invalid(format!(
                    "label {k} must be a string, got {other}"
                )));
            }
        }
    }
    Ok(())
}

#[async_trait]
impl ResourceClient for MemoryControlPlane {
    async fn create_namespace(&self, name: &str, labels: &Labels) -> ClientResult<Namespace> {
        let mut state = self.reaped().await;
        state.stats.namespace_creates += 1;
        if state.faults.fail_create.contains(name) {
            return Err(ClientError::Rejected {
                status: 500,
                message: format!("injected create failure for {name}"),
            });
        }
        if state.namespaces.contains_key(name) {
            return Err(ClientError::already_exists(ResourceKind::Namespace, name));
        }
        let namespace = Namespace {
            name: name.to_string(),
            labels: labels.clone(),
            phase: NamespacePhase::Active,
        };
        state.namespaces.insert(
            name.to_string(),
            NamespaceEntry {
                namespace: namespace.clone(),
                created_at: Instant::now(),
                finalize_at: None,
            },
        );
        Ok(namespace)
    }

    async fn get_namespace(&self, name: &str) -> ClientResult<Namespace> {
        let mut state = self.reaped().await;
        state.stats.namespace_gets += 1;
        if state.faults.fail_get.contains(name) {
            return Err(ClientError::Rejected {
                status: 500,
                message: format!("injected get failure for {name}"),
            });
        }
        state
            .namespaces
            .get(name)
            .map(|e| e.namespace.clone())
            .ok_or_else(|| ClientError::not_found(ResourceKind::Namespace, name))
    }

    async fn list_namespaces(&self, filter: &NamespaceFilter) -> ClientResult<Vec<Namespace>> {
        let mut state = self.reaped().await;
        state.stats.list_calls += 1;
        if state.faults.fail_list {
            return Err(ClientError::Transport("injected list failure".into()));
        }
        Ok(state
            .namespaces
            .values()
            .map(|e| &e.namespace)
            .filter(|ns| filter.matches(ns))
            .cloned()
            .collect())
    }

    async fn delete_namespace(&self, name: &str) -> ClientResult<()> {
        let mut state = self.reaped().await;
        state.stats.namespace_deletes += 1;
        if state.faults.fail_delete.contains(name) {
            return Err(ClientError::Rejected {
                status: 500,
                message: format!("injected delete failure for {name}"),
            });
        }
        let now = Instant::now();
        let drain = self.cfg.drain_interval;
        let stall = state.faults.stall_deletion;
        let tail = state.pipeline_tail;
        let Some(entry) = state.namespaces.get_mut(name) else {
            return Err(ClientError::not_found(ResourceKind::Namespace, name));
        };
        if entry.namespace.phase == NamespacePhase::Terminating {
            return Ok(());
        }
        entry.namespace.phase = NamespacePhase::Terminating;
        if stall {
            return Ok(());
        }
        let finalize_at = tail.map_or(now, |t| t.max(now)) + drain;
        entry.finalize_at = Some(finalize_at);
        state.pipeline_tail = Some(finalize_at);
        Ok(())
    }

    async fn patch_namespace(
        &self,
        name: &str,
        patch: &serde_json::Value,
    ) -> ClientResult<Namespace> {
        let mut state = self.reaped().await;
        let Some(entry) = state.namespaces.get_mut(name) else {
            return Err(ClientError::not_found(ResourceKind::Namespace, name));
        };
        let mut labels = entry.namespace.labels.clone();
        merge_labels(&mut labels, patch)?;
        entry.namespace.labels = labels;
        Ok(entry.namespace.clone())
    }

    async fn create_resource(
        &self,
        namespace: &str,
        spec: &ResourceSpec,
    ) -> ClientResult<Resource> {
        let mut state = self.reaped().await;
        match state.namespaces.get(namespace) {
            None => {
                return Err(ClientError::not_found(ResourceKind::Namespace, namespace));
            }
            Some(e) if e.namespace.phase == NamespacePhase::Terminating => {
                return Err(ClientError::Rejected {
                    status: 403,
                    message: format!(
                        "namespace {namespace} is being terminated"
                    ),
                });
            }
            Some(_) => {}
        }
        let key = (namespace.to_string(), spec.kind(), spec.name().to_string());
        if state.resources.contains_key(&key) {
            return Err(ClientError::already_exists(spec.kind(), spec.name()));
        }
        let grace_period = match spec {
            ResourceSpec::Pod {
                termination_grace_period,
                ..
            } => Some(termination_grace_period.unwrap_or(self.cfg.default_grace_period)),
            ResourceSpec::Service { .. } => None,
        };
        let resource = Resource {
            kind: spec.kind(),
            namespace: namespace.to_string(),
            name: spec.name().to_string(),
            grace_period,
        };
        state.resources.insert(
            key,
            ResourceEntry {
                resource: resource.clone(),
                created_at: Instant::now(),
            },
        );
        Ok(resource)
    }

    async fn get_resource(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> ClientResult<Resource> {
        let state = self.reaped().await;
        state
            .resources
            .get(&(namespace.to_string(), kind, name.to_string()))
            .map(|e| e.resource.clone())
            .ok_or_else(|| ClientError::not_found(kind, name))
    }

    async fn wait_until_ready(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        deadline: Duration,
    ) -> ClientResult<()> {
        let ready_at = {
            let state = self.reaped().await;
            let entry = state
                .resources
                .get(&(namespace.to_string(), kind, name.to_string()))
                .ok_or_else(|| ClientError::not_found(kind, name))?;
            match kind {
                ResourceKind::Pod if state.faults.never_ready => None,
                ResourceKind::Pod => Some(entry.created_at + self.cfg.pod_ready_delay),
                _ => Some(entry.created_at),
            }
        };
        Self::wait_until(ready_at, deadline, format!("{kind} {namespace}/{name} ready"))
            .await
    }

    async fn wait_for_default_identity(
        &self,
        namespace: &str,
        deadline: Duration,
    ) -> ClientResult<()> {
        let provisioned_at = {
            let state = self.reaped().await;
            let entry = state.namespaces.get(namespace).ok_or_else(|| {
                ClientError::not_found(ResourceKind::Namespace, namespace)
            })?;
            match entry.namespace.phase {
                NamespacePhase::Terminating => None,
                _ => Some(entry.created_at + self.cfg.identity_delay),
            }
        };
        Self::wait_until(
            provisioned_at,
            deadline,
            format!("default service account in {namespace}"),
        )
        .await
    }
}
