#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use nsl_client::memory::{Faults, MemoryControlPlane, SimConfig};
use nsl_verify::{BulkConfig, CascadeConfig};

pub fn plane(drain: Duration) -> Arc<MemoryControlPlane> {
    Arc::new(MemoryControlPlane::new(SimConfig {
        drain_interval: drain,
        ..SimConfig::default()
    }))
}

pub fn plane_with(faults: Faults) -> Arc<MemoryControlPlane> {
    Arc::new(MemoryControlPlane::default().with_faults(faults))
}

pub fn bulk_config(prefix: &str) -> BulkConfig {
    BulkConfig {
        prefix: prefix.to_string(),
        ..BulkConfig::default()
    }
}

pub fn cascade_config() -> CascadeConfig {
    CascadeConfig::default()
}
