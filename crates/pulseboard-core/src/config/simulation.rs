//! Settings for the bundled presence simulation binary.

use serde::{Deserialize, Serialize};

/// Simulation driver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Channel name of the simulated scope (`global`, `project_<id>`, ...).
    #[serde(default = "default_scope")]
    pub scope: String,
    /// Number of simulated peers, including the observing user.
    #[serde(default = "default_peers")]
    pub peers: usize,
    /// Seconds between simulated peer actions.
    #[serde(default = "default_action_interval")]
    pub action_interval_seconds: u64,
    /// Seconds between presence view reports.
    #[serde(default = "default_report_interval")]
    pub report_interval_seconds: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            scope: default_scope(),
            peers: default_peers(),
            action_interval_seconds: default_action_interval(),
            report_interval_seconds: default_report_interval(),
        }
    }
}

fn default_scope() -> String {
    "global".to_string()
}

fn default_peers() -> usize {
    4
}

fn default_action_interval() -> u64 {
    3
}

fn default_report_interval() -> u64 {
    5
}
