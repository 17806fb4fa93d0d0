//! `ResourceClient` over a live Kubernetes API server.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    Container, Namespace as K8sNamespace, Pod, PodSpec, Service,
    ServiceAccount, ServicePort as K8sServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{
    Api, Client,
    api::{DeleteParams, ListParams, Patch, PatchParams, PostParams},
    core::ObjectMeta,
};
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::traits::ResourceClient;
use crate::types::{
    Labels, Namespace, NamespaceFilter, NamespacePhase, Resource, ResourceKind,
    ResourceSpec,
};

const READY_POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_SERVICE_ACCOUNT: &str = "default";

#[derive(Clone)]
pub struct KubeResourceClient {
    client: Client,
}

impl KubeResourceClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Client from the ambient kubeconfig / in-cluster environment.
    pub async fn try_default() -> ClientResult<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        Ok(Self::new(client))
    }

    fn namespaces(&self) -> Api<K8sNamespace> {
        Api::all(self.client.clone())
    }

    fn pods(&self, ns: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), ns)
    }

    fn services(&self, ns: &str) -> Api<Service> {
        Api::namespaced(self.client.clone(), ns)
    }

    fn service_accounts(&self, ns: &str) -> Api<ServiceAccount> {
        Api::namespaced(self.client.clone(), ns)
    }
}

fn map_err(kind: ResourceKind, name: &str, err: kube::Error) -> ClientError {
    match err {
        kube::Error::Api(ae) => match ae.code {
            404 => ClientError::not_found(kind, name),
            409 if ae.reason == "AlreadyExists" => {
                ClientError::already_exists(kind, name)
            }
            409 => ClientError::Conflict {
                kind,
                name: name.to_string(),
                message: ae.message,
            },
            code => ClientError::Rejected {
                status: code,
                message: ae.message,
            },
        },
        other => ClientError::Transport(other.to_string()),
    }
}

fn to_namespace(ns: K8sNamespace) -> Namespace {
    Namespace {
        name: ns.metadata.name.unwrap_or_default(),
        labels: ns.metadata.labels.unwrap_or_default(),
        phase: NamespacePhase::parse(ns.status.as_ref().and_then(|s| s.phase.as_deref())),
    }
}

fn seconds(d: Option<i64>) -> Option<Duration> {
    d.map(|s| Duration::from_secs(s.max(0) as u64))
}

fn is_pod_ready(pod: &Pod) -> bool {
    let Some(status) = pod.status.as_ref() else {
        return false;
    };
    status.phase.as_deref() == Some("Running")
        && status
            .conditions
            .as_ref()
            .map(|conditions| {
                conditions
                    .iter()
                    .any(|c| c.type_ == "Ready" && c.status == "True")
            })
            .unwrap_or(false)
}

fn build_pod(spec: &ResourceSpec) -> Option<Pod> {
    let ResourceSpec::Pod {
        name,
        image,
        termination_grace_period,
    } = spec
    else {
        return None;
    };
    Some(Pod {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: "main".into(),
                image: Some(image.clone()),
                ..Default::default()
            }],
            termination_grace_period_seconds: termination_grace_period
                .map(|d| d.as_secs() as i64),
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn build_service(spec: &ResourceSpec) -> Option<Service> {
    let ResourceSpec::Service {
        name,
        selector,
        ports,
    } = spec
    else {
        return None;
    };
    Some(Service {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(selector.clone()),
            ports: Some(
                ports
                    .iter()
                    .map(|p| K8sServicePort {
                        port: p.port,
                        target_port: Some(IntOrString::Int(p.target_port)),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        ..Default::default()
    })
}

#[async_trait]
impl ResourceClient for KubeResourceClient {
    async fn create_namespace(&self, name: &str, labels: &Labels) -> ClientResult<Namespace> {
        let obj = K8sNamespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: (!labels.is_empty()).then(|| labels.clone()),
                ..Default::default()
            },
            ..Default::default()
        };
        self.namespaces()
            .create(&PostParams::default(), &obj)
            .await
            .map(to_namespace)
            .map_err(|e| map_err(ResourceKind::Namespace, name, e))
    }

    async fn get_namespace(&self, name: &str) -> ClientResult<Namespace> {
        self.namespaces()
            .get(name)
            .await
            .map(to_namespace)
            .map_err(|e| map_err(ResourceKind::Namespace, name, e))
    }

    async fn list_namespaces(&self, filter: &NamespaceFilter) -> ClientResult<Vec<Namespace>> {
        let mut lp = ListParams::default();
        if let Some(selector) = filter.label_selector.as_deref() {
            lp = lp.labels(selector);
        }
        let list = self
            .namespaces()
            .list(&lp)
            .await
            .map_err(|e| map_err(ResourceKind::Namespace, "*", e))?;
        Ok(list
            .items
            .into_iter()
            .map(to_namespace)
            .filter(|ns| filter.matches_name(&ns.name))
            .collect())
    }

    async fn delete_namespace(&self, name: &str) -> ClientResult<()> {
        self.namespaces()
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| map_err(ResourceKind::Namespace, name, e))
    }

    async fn patch_namespace(
        &self,
        name: &str,
        patch: &serde_json::Value,
    ) -> ClientResult<Namespace> {
        self.namespaces()
            .patch(name, &PatchParams::default(), &Patch::Strategic(patch))
            .await
            .map(to_namespace)
            .map_err(|e| map_err(ResourceKind::Namespace, name, e))
    }

    async fn create_resource(
        &self,
        namespace: &str,
        spec: &ResourceSpec,
    ) -> ClientResult<Resource> {
        let kind = spec.kind();
        let name = spec.name();
        let grace_period = match kind {
            ResourceKind::Pod => {
                let pod = build_pod(spec).ok_or_else(|| {
                    ClientError::Invalid(format!("{name} is not a pod"))
                })?;
                let created = self
                    .pods(namespace)
                    .create(&PostParams::default(), &pod)
                    .await
                    .map_err(|e| map_err(kind, name, e))?;
                seconds(
                    created
                        .spec
                        .and_then(|s| s.termination_grace_period_seconds),
                )
            }
            ResourceKind::Service => {
                let svc = build_service(spec).ok_or_else(|| {
                    ClientError::Invalid(format!("{name} is not a service"))
                })?;
                self.services(namespace)
                    .create(&PostParams::default(), &svc)
                    .await
                    .map_err(|e| map_err(kind, name, e))?;
                None
            }
            other => {
                return Err(ClientError::Invalid(format!(
                    "cannot create {other} as a dependent resource"
                )));
            }
        };
        Ok(Resource {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
            grace_period,
        })
    }

    async fn get_resource(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> ClientResult<Resource> {
        let grace_period = match kind {
            ResourceKind::Pod => {
                let pod = self
                    .pods(namespace)
                    .get(name)
                    .await
                    .map_err(|e| map_err(kind, name, e))?;
                seconds(pod.spec.and_then(|s| s.termination_grace_period_seconds))
            }
            ResourceKind::Service => {
                self.services(namespace)
                    .get(name)
                    .await
                    .map_err(|e| map_err(kind, name, e))?;
                None
            }
            ResourceKind::ServiceAccount => {
                self.service_accounts(namespace)
                    .get(name)
                    .await
                    .map_err(|e| map_err(kind, name, e))?;
                None
            }
            ResourceKind::Namespace => {
                return Err(ClientError::Invalid("namespaces are not namespaced resources".into()));
            }
        };
        Ok(Resource {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
            grace_period,
        })
    }

    async fn wait_until_ready(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        deadline: Duration,
    ) -> ClientResult<()> {
        if !kind.is_workload() {
            self.get_resource(kind, namespace, name).await?;
            return Ok(());
        }
        let pods = self.pods(namespace);
        let start = tokio::time::Instant::now();
        loop {
            let pod = pods
                .get(name)
                .await
                .map_err(|e| map_err(kind, name, e))?;
            if is_pod_ready(&pod) {
                return Ok(());
            }
            if let Some(phase) = pod.status.as_ref().and_then(|s| s.phase.as_deref()) {
                if phase == "Failed" || phase == "Succeeded" {
                    return Err(ClientError::Rejected {
                        status: 0,
                        message: format!(
                            "pod {namespace}/{name} reached terminal phase {phase}"
                        ),
                    });
                }
                debug!(%namespace, %name, %phase, "pod not ready yet");
            }
            if start.elapsed() >= deadline {
                return Err(ClientError::Timeout {
                    what: format!("{kind} {namespace}/{name} ready"),
                    after: deadline,
                });
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    async fn wait_for_default_identity(
        &self,
        namespace: &str,
        deadline: Duration,
    ) -> ClientResult<()> {
        let accounts = self.service_accounts(namespace);
        let start = tokio::time::Instant::now();
        loop {
            let found = accounts
                .get_opt(DEFAULT_SERVICE_ACCOUNT)
                .await
                .map_err(|e| {
                    map_err(ResourceKind::ServiceAccount, DEFAULT_SERVICE_ACCOUNT, e)
                })?;
            if found.is_some() {
                return Ok(());
            }
            if start.elapsed() >= deadline {
                return Err(ClientError::Timeout {
                    what: format!("default service account in {namespace}"),
                    after: deadline,
                });
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }
}

/// Namespace labels enforcing a pod-security admission level.
pub fn pod_security_labels(level: &str) -> Labels {
    BTreeMap::from([("pod-security.kubernetes.io/enforce".to_string(), level.to_string())])
}
