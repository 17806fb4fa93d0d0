use std::sync::{Arc, Mutex};

use nsl_client::{NamespaceFilter, ResourceClient};
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct Tracked {
    names: Vec<String>,
    prefixes: Vec<String>,
}

/// Remembers namespaces a run created and deletes them afterwards.
///
/// Call [`CleanupGuard::cleanup`] at the end of a run. Anything still
/// tracked when the guard drops is handed to a background task, which only
/// helps if the runtime outlives the guard.
pub struct CleanupGuard {
    client: Arc<dyn ResourceClient>,
    tracked: Mutex<Tracked>,
    no_cleanup: bool,
}

impl CleanupGuard {
    pub fn new(client: Arc<dyn ResourceClient>, no_cleanup: bool) -> Self {
        Self {
            client,
            tracked: Mutex::new(Tracked::default()),
            no_cleanup,
        }
    }

    pub fn track(&self, namespace: impl Into<String>) {
        if let Ok(mut t) = self.tracked.lock() {
            t.names.push(namespace.into());
        }
    }

    /// Track every namespace whose name contains `prefix`, whatever state a
    /// bulk run left them in.
    pub fn track_prefix(&self, prefix: impl Into<String>) {
        if let Ok(mut t) = self.tracked.lock() {
            t.prefixes.push(prefix.into());
        }
    }

    fn take(&self) -> Tracked {
        self.tracked
            .lock()
            .map(|mut t| std::mem::take(&mut *t))
            .unwrap_or_default()
    }

    /// Best-effort delete of everything tracked. Returns how many delete
    /// requests were accepted.
    pub async fn cleanup(&self) -> usize {
        let tracked = self.take();
        if self.no_cleanup {
            info!(
                names = ?tracked.names,
                prefixes = ?tracked.prefixes,
                "Cleanup disabled; leaving namespaces behind"
            );
            return 0;
        }
        purge(self.client.as_ref(), tracked).await
    }
}

async fn purge(client: &dyn ResourceClient, tracked: Tracked) -> usize {
    let mut names = tracked.names;
    for prefix in &tracked.prefixes {
        match client
            .list_namespaces(&NamespaceFilter::name_contains(prefix.as_str()))
            .await
        {
            Ok(found) => names.extend(found.into_iter().map(|ns| ns.name)),
            Err(e) => warn!(%prefix, error = %e, "Failed to list namespaces for cleanup"),
        }
    }
    names.sort();
    names.dedup();

    let mut deleted = 0;
    for name in names {
        match client.delete_namespace(&name).await {
            Ok(()) => {
                debug!(namespace = %name, "cleanup delete requested");
                deleted += 1;
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => warn!(namespace = %name, error = %e, "Failed to cleanup namespace"),
        }
    }
    deleted
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if self.no_cleanup {
            return;
        }
        let tracked = self.take();
        if tracked.names.is_empty() && tracked.prefixes.is_empty() {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(names = ?tracked.names, "No runtime left to cleanup namespaces");
            return;
        };
        let client = self.client.clone();
        handle.spawn(async move {
            purge(client.as_ref(), tracked).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nsl_client::Labels;
    use nsl_client::memory::MemoryControlPlane;

    #[tokio::test]
    async fn cleanup_deletes_tracked_names_and_prefixes() {
        let plane = Arc::new(MemoryControlPlane::default());
        for name in ["solo", "batch-0", "batch-1", "other"] {
            plane.create_namespace(name, &Labels::new()).await.unwrap();
        }
        let guard = CleanupGuard::new(plane.clone(), false);
        guard.track("solo");
        guard.track("missing");
        guard.track_prefix("batch");

        assert_eq!(guard.cleanup().await, 3);
        assert_eq!(plane.stats().await.namespace_deletes, 4);
        assert_eq!(guard.cleanup().await, 0);
    }

    #[tokio::test]
    async fn disabled_cleanup_leaves_namespaces() {
        let plane = Arc::new(MemoryControlPlane::default());
        plane.create_namespace("keep", &Labels::new()).await.unwrap();
        let guard = CleanupGuard::new(plane.clone(), true);
        guard.track("keep");

        assert_eq!(guard.cleanup().await, 0);
        assert_eq!(plane.stats().await.namespace_deletes, 0);
    }
}
