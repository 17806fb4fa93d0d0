use std::time::Duration;

use clap::Parser;

use crate::config::Backend;
use crate::scenarios::{BulkParams, Scenario};

/// Namespace lifecycle conformance runner
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Scenarios to run, in order. Defaults to every scenario not behind a
    /// feature gate.
    #[arg(short, long = "scenario", value_enum)]
    pub scenarios: Vec<Scenario>,

    /// Also run feature-gated scenarios when no explicit list is given.
    #[arg(long)]
    pub all: bool,

    /// Overrides NSL_E2E_BACKEND.
    #[arg(short, long, value_enum)]
    pub backend: Option<Backend>,

    /// Namespaces created by each bulk scenario.
    #[arg(long)]
    pub total: Option<usize>,

    /// Namespaces allowed to remain when a bulk scenario converges.
    #[arg(long)]
    pub max_remaining: Option<usize>,

    /// Convergence deadline for bulk scenarios, in seconds.
    #[arg(long)]
    pub deadline_secs: Option<u64>,

    /// Leave created namespaces behind.
    #[arg(long)]
    pub no_cleanup: bool,

    /// List the scenario catalog and exit.
    #[arg(long)]
    pub list: bool,
}

impl Cli {
    pub fn selected(&self) -> Vec<Scenario> {
        if !self.scenarios.is_empty() {
            return self.scenarios.clone();
        }
        Scenario::ALL
            .into_iter()
            .filter(|s| self.all || s.feature().is_none())
            .collect()
    }

    /// Applies the command-line overrides on top of a scenario's defaults.
    pub fn bulk_params(&self, defaults: BulkParams) -> BulkParams {
        BulkParams {
            total: self.total.unwrap_or(defaults.total),
            max_remaining: self.max_remaining.unwrap_or(defaults.max_remaining),
            deadline: self
                .deadline_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.deadline),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_selection_skips_gated_scenarios() {
        let cli = Cli::parse_from(["nsl-e2e"]);
        let selected = cli.selected();
        assert!(!selected.contains(&Scenario::DeleteAllFast));
        assert_eq!(selected.len(), Scenario::ALL.len() - 1);

        let cli = Cli::parse_from(["nsl-e2e", "--all"]);
        assert!(cli.selected().contains(&Scenario::DeleteAllFast));
    }

    #[test]
    fn explicit_scenarios_keep_their_order() {
        let cli = Cli::parse_from([
            "nsl-e2e",
            "-s",
            "patch",
            "--scenario",
            "delete-all-fast",
        ]);
        assert_eq!(cli.selected(), vec![Scenario::Patch, Scenario::DeleteAllFast]);
    }

    #[test]
    fn overrides_replace_bulk_defaults() {
        let cli = Cli::parse_from(["nsl-e2e", "--total", "20", "--deadline-secs", "30"]);
        let params = cli.bulk_params(BulkParams {
            total: 100,
            max_remaining: 10,
            deadline: Duration::from_secs(150),
        });
        assert_eq!(params.total, 20);
        assert_eq!(params.max_remaining, 10);
        assert_eq!(params.deadline, Duration::from_secs(30));
    }
}
