use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use envconfig::Envconfig;
use nsl_client::ResourceClient;
use nsl_client::k8s::KubeResourceClient;
use nsl_client::memory::MemoryControlPlane;
use nsl_e2e::cli::Cli;
use nsl_e2e::config::{Backend, E2eConfig};
use nsl_e2e::init_tracing;
use nsl_e2e::scenarios::{Scenario, ScenarioRunner};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    init_tracing("info");
    let cli = Cli::parse();

    if cli.list {
        for s in Scenario::ALL {
            match s.feature() {
                Some(gate) => println!("{:<18} [Feature:{gate}]", s.id()),
                None => println!("{}", s.id()),
            }
        }
        return Ok(());
    }

    let mut cfg = E2eConfig::init_from_env().context("reading NSL_* environment")?;
    if let Some(backend) = cli.backend {
        cfg.backend = backend;
    }
    cfg.no_cleanup |= cli.no_cleanup;
    info!(?cfg, "Starting namespace lifecycle run");

    let client: Arc<dyn ResourceClient> = match cfg.backend {
        Backend::Kube => {
            if let Err(e) = rustls::crypto::CryptoProvider::install_default(
                rustls::crypto::aws_lc_rs::default_provider(),
            ) {
                tracing::debug!(?e, "CryptoProvider already installed");
            }
            Arc::new(
                KubeResourceClient::try_default()
                    .await
                    .context("connecting to the cluster")?,
            )
        }
        Backend::Memory => Arc::new(MemoryControlPlane::default()),
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; cancelling the active scenario");
            on_signal.cancel();
        }
    });

    let scenarios = cli.selected();
    let overrides = cli.clone();
    let runner = ScenarioRunner::new(client, cfg)
        .with_cancel(cancel)
        .with_bulk_override(move |defaults| overrides.bulk_params(defaults));
    let summary = runner.run_all(&scenarios).await;

    if !summary.all_passed() {
        anyhow::bail!(
            "{} of {} scenarios failed",
            summary.failed(),
            summary.outcomes.len()
        );
    }
    Ok(())
}
