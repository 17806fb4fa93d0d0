use std::time::Duration;

use async_trait::async_trait;

use crate::error::ClientResult;
use crate::types::{Labels, Namespace, NamespaceFilter, Resource, ResourceKind, ResourceSpec};

/// The control-plane capability the verification engine drives.
///
/// Mutating calls return once the request is accepted. In particular
/// `delete_namespace` only requests deletion; removal is observed through
/// `get_namespace` / `list_namespaces`.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    async fn create_namespace(&self, name: &str, labels: &Labels) -> ClientResult<Namespace>;

    async fn get_namespace(&self, name: &str) -> ClientResult<Namespace>;

    async fn list_namespaces(&self, filter: &NamespaceFilter) -> ClientResult<Vec<Namespace>>;

    async fn delete_namespace(&self, name: &str) -> ClientResult<()>;

    /// Merge-patch the namespace with a partial document
    /// (e.g. `{"metadata":{"labels":{...}}}`).
    async fn patch_namespace(
        &self,
        name: &str,
        patch: &serde_json::Value,
    ) -> ClientResult<Namespace>;

    async fn create_resource(&self, namespace: &str, spec: &ResourceSpec) -> ClientResult<Resource>;

    async fn get_resource(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> ClientResult<Resource>;

    /// Block until the resource reports running/ready, or fail with
    /// `ClientError::Timeout` once `deadline` elapses.
    async fn wait_until_ready(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        deadline: Duration,
    ) -> ClientResult<()>;

    /// Block until the namespace's default identity exists, or fail with
    /// `ClientError::Timeout` once `deadline` elapses.
    async fn wait_for_default_identity(
        &self,
        namespace: &str,
        deadline: Duration,
    ) -> ClientResult<()>;
}
