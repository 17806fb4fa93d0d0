use std::time::Duration;

use envconfig::Envconfig;
use nsl_client::Labels;

pub const DEFAULT_PREFIX: &str = "nslifetest";
/// Pause between bulk creation and the bulk delete request, giving the
/// control plane's post-create reconciliation time to settle.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(10);
pub const DEFAULT_BULK_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_CASCADE_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Added to a dependent resource's grace period to bound namespace removal.
pub const DEFAULT_REMOVAL_MARGIN: Duration = Duration::from_secs(60);
pub const DEFAULT_PROVISION_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Envconfig, Clone, Debug)]
pub struct VerifyConfig {
    #[envconfig(nested)]
    pub bulk: BulkEnvConfig,

    #[envconfig(nested)]
    pub cascade: CascadeEnvConfig,
}

#[derive(Envconfig, Clone, Debug)]
pub struct BulkEnvConfig {
    #[envconfig(from = "NSL_BULK_PREFIX", default = "nslifetest")]
    pub prefix: String,

    #[envconfig(from = "NSL_BULK_SETTLE_SECS", default = "10")]
    pub settle_secs: u64,

    #[envconfig(from = "NSL_BULK_POLL_INTERVAL_MS", default = "2000")]
    pub poll_interval_ms: u64,

    /// Comma-separated substrings; matching namespaces are never deleted.
    /// Env: NSL_BULK_SKIP
    #[envconfig(from = "NSL_BULK_SKIP")]
    pub skip: Option<String>,
}

#[derive(Envconfig, Clone, Debug)]
pub struct CascadeEnvConfig {
    #[envconfig(from = "NSL_CASCADE_POLL_INTERVAL_MS", default = "1000")]
    pub poll_interval_ms: u64,

    #[envconfig(from = "NSL_CASCADE_REMOVAL_MARGIN_SECS", default = "60")]
    pub removal_margin_secs: u64,

    #[envconfig(from = "NSL_CASCADE_PROVISION_TIMEOUT_SECS", default = "60")]
    pub provision_timeout_secs: u64,

    #[envconfig(from = "NSL_CASCADE_READY_TIMEOUT_SECS", default = "300")]
    pub ready_timeout_secs: u64,
}

/// Knobs for [`BulkLifecycleDriver`](crate::BulkLifecycleDriver).
#[derive(Clone, Debug)]
pub struct BulkConfig {
    /// Shared prefix; worker `i` creates `{prefix}-{i}`.
    pub prefix: String,
    pub settle_delay: Duration,
    pub poll_interval: Duration,
    pub skip: Vec<String>,
    /// Labels stamped on every namespace the run creates.
    pub labels: Labels,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            settle_delay: DEFAULT_SETTLE_DELAY,
            poll_interval: DEFAULT_BULK_POLL_INTERVAL,
            skip: Vec::new(),
            labels: Labels::new(),
        }
    }
}

impl From<&BulkEnvConfig> for BulkConfig {
    fn from(env: &BulkEnvConfig) -> Self {
        Self {
            prefix: env.prefix.clone(),
            settle_delay: Duration::from_secs(env.settle_secs),
            poll_interval: Duration::from_millis(env.poll_interval_ms),
            skip: env
                .skip
                .as_deref()
                .map(split_list)
                .unwrap_or_default(),
            labels: Labels::new(),
        }
    }
}

/// Knobs for [`CascadeVerifier`](crate::CascadeVerifier).
#[derive(Clone, Debug)]
pub struct CascadeConfig {
    pub poll_interval: Duration,
    pub removal_margin: Duration,
    pub provision_timeout: Duration,
    pub ready_timeout: Duration,
    pub labels: Labels,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_CASCADE_POLL_INTERVAL,
            removal_margin: DEFAULT_REMOVAL_MARGIN,
            provision_timeout: DEFAULT_PROVISION_TIMEOUT,
            ready_timeout: DEFAULT_READY_TIMEOUT,
            labels: Labels::new(),
        }
    }
}

impl From<&CascadeEnvConfig> for CascadeConfig {
    fn from(env: &CascadeEnvConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(env.poll_interval_ms),
            removal_margin: Duration::from_secs(env.removal_margin_secs),
            provision_timeout: Duration::from_secs(env.provision_timeout_secs),
            ready_timeout: Duration::from_secs(env.ready_timeout_secs),
            labels: Labels::new(),
        }
    }
}

impl VerifyConfig {
    pub fn bulk_config(&self) -> BulkConfig {
        BulkConfig::from(&self.bulk)
    }

    pub fn cascade_config(&self) -> CascadeConfig {
        CascadeConfig::from(&self.cascade)
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
