use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub type Labels = BTreeMap<String, String>;

/// Kinds of object the harness touches. `Namespace` only appears in errors
/// and lookups of the scoping object itself; the rest are namespaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Namespace,
    Pod,
    Service,
    ServiceAccount,
}

impl ResourceKind {
    /// Workload kinds must report running/ready before they count as
    /// materialized.
    pub fn is_workload(&self) -> bool {
        matches!(self, ResourceKind::Pod)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Namespace => "namespace",
            ResourceKind::Pod => "pod",
            ResourceKind::Service => "service",
            ResourceKind::ServiceAccount => "serviceaccount",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NamespacePhase {
    Active,
    Terminating,
    Unknown(String),
}

impl NamespacePhase {
    pub fn parse(phase: Option<&str>) -> Self {
        match phase {
            Some("Active") => NamespacePhase::Active,
            Some("Terminating") => NamespacePhase::Terminating,
            Some(other) => NamespacePhase::Unknown(other.to_string()),
            None => NamespacePhase::Unknown(String::new()),
        }
    }
}

impl fmt::Display for NamespacePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamespacePhase::Active => f.write_str("Active"),
            NamespacePhase::Terminating => f.write_str("Terminating"),
            NamespacePhase::Unknown(raw) if raw.is_empty() => f.write_str("<unset>"),
            NamespacePhase::Unknown(raw) => f.write_str(raw),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    pub name: String,
    pub labels: Labels,
    pub phase: NamespacePhase,
}

/// Server-side-ish filter for namespace listings.
#[derive(Debug, Clone, Default)]
pub struct NamespaceFilter {
    /// Substring the name must contain.
    pub name_contains: Option<String>,
    /// `key=value` pairs (comma separated), or bare `key` for existence.
    pub label_selector: Option<String>,
}

impl NamespaceFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn name_contains(pattern: impl Into<String>) -> Self {
        Self {
            name_contains: Some(pattern.into()),
            label_selector: None,
        }
    }

    pub fn with_labels(mut self, selector: impl Into<String>) -> Self {
        self.label_selector = Some(selector.into());
        self
    }

    pub fn matches_name(&self, name: &str) -> bool {
        self.name_contains
            .as_deref()
            .map(|p| name.contains(p))
            .unwrap_or(true)
    }

    pub fn matches_labels(&self, labels: &Labels) -> bool {
        let Some(selector) = self.label_selector.as_deref() else {
            return true;
        };
        selector
            .split(',')
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .all(|term| match term.split_once('=') {
                Some((k, v)) => labels.get(k.trim()).map(String::as_str) == Some(v.trim()),
                None => labels.contains_key(term),
            })
    }

    pub fn matches(&self, ns: &Namespace) -> bool {
        self.matches_name(&ns.name) && self.matches_labels(&ns.labels)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePort {
    pub port: i32,
    pub target_port: i32,
}

/// Creation document for a dependent resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResourceSpec {
    Pod {
        name: String,
        image: String,
        /// Left unset to let the control plane apply its default.
        termination_grace_period: Option<Duration>,
    },
    Service {
        name: String,
        selector: Labels,
        ports: Vec<ServicePort>,
    },
}

impl ResourceSpec {
    pub fn pod(name: impl Into<String>, image: impl Into<String>) -> Self {
        ResourceSpec::Pod {
            name: name.into(),
            image: image.into(),
            termination_grace_period: None,
        }
    }

    pub fn service(name: impl Into<String>, selector: Labels, ports: Vec<ServicePort>) -> Self {
        ResourceSpec::Service {
            name: name.into(),
            selector,
            ports,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceSpec::Pod { .. } => ResourceKind::Pod,
            ResourceSpec::Service { .. } => ResourceKind::Service,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ResourceSpec::Pod { name, .. } | ResourceSpec::Service { name, .. } => name,
        }
    }
}

/// A dependent resource as reported back by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
    /// Effective termination grace period, if the kind has one.
    pub grace_period: Option<Duration>,
}

impl Resource {
    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.kind, self.namespace, self.name)
    }
}
