use nsl_client::{Labels, ResourceClient};
use serde_json::json;
use tokio::time::Instant;
use tracing::{info, instrument};

use crate::error::{VerifyError, VerifyResult};

/// Creates `namespace`, merge-patches `key=value` into its labels and checks
/// that a fresh read reflects the patch.
///
/// The namespace is left in place for the caller to clean up.
#[instrument(skip(client, labels))]
pub async fn verify_label_patch<C: ResourceClient + ?Sized>(
    client: &C,
    namespace: &str,
    key: &str,
    value: &str,
    labels: &Labels,
) -> VerifyResult<()> {
    let start = Instant::now();
    info!("Creating a namespace");
    client
        .create_namespace(namespace, labels)
        .await
        .map_err(|e| VerifyError::step("create namespace", namespace, start.elapsed(), e))?;

    info!("Patching the namespace");
    let patch = json!({ "metadata": { "labels": { key: value } } });
    client
        .patch_namespace(namespace, &patch)
        .await
        .map_err(|e| VerifyError::step("patch namespace", namespace, start.elapsed(), e))?;

    info!("Getting the namespace");
    let ns = client
        .get_namespace(namespace)
        .await
        .map_err(|e| VerifyError::step("get namespace", namespace, start.elapsed(), e))?;
    let observed = ns.labels.get(key);
    if observed.map(String::as_str) != Some(value) {
        return Err(VerifyError::PatchNotApplied {
            namespace: namespace.to_string(),
            key: key.to_string(),
            expected: value.to_string(),
            observed: observed.cloned(),
            elapsed: start.elapsed(),
        });
    }
    Ok(())
}
