use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::agency::{Agency, InMemoryAgency};
use crate::config::{load_state_file, NodeConfig};
use crate::dashboard::{run_dashboard, DashboardState};
use crate::error::Result;
use crate::supervision::Supervisor;

/// One supervision process: an in-process agency, the supervision loop
/// ticking against it, and optionally the dashboard serving both.
pub struct SupervisionNode {
    pub config: NodeConfig,
    pub agency: Arc<InMemoryAgency>,
}

impl SupervisionNode {
    /// Builds the node, seeding the agency from `config.state_file` if set.
    pub fn new(config: NodeConfig) -> Result<Self> {
        let agency = match &config.state_file {
            Some(path) => {
                let tree = load_state_file(path)?;
                tracing::info!(path = %path.display(), "Loaded agency state");
                InMemoryAgency::with_tree(tree)
            }
            None => InMemoryAgency::new(),
        };
        Ok(Self {
            config,
            agency: Arc::new(agency),
        })
    }

    pub fn with_agency(config: NodeConfig, agency: Arc<InMemoryAgency>) -> Self {
        Self { config, agency }
    }

    pub fn supervisor(&self) -> Supervisor {
        let agency: Arc<dyn Agency> = self.agency.clone();
        Supervisor::new(agency, self.config.supervision.clone())
    }

    /// Runs supervision (and the dashboard, if configured) until `shutdown`
    /// is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        if let Some(addr) = self.config.dashboard_addr {
            let state = DashboardState {
                agency: self.agency.clone(),
                prefix: self.config.supervision.prefix.clone(),
            };
            let dashboard_shutdown = shutdown.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = run_dashboard(addr, state) => {}
                    _ = dashboard_shutdown.cancelled() => {
                        tracing::info!("Dashboard stopping");
                    }
                }
            });
        }

        let supervisor = self.supervisor();
        let handle = tokio::spawn(supervisor.run(shutdown));
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Supervision task ended abnormally");
        }

        tracing::info!(
            last_index = self.agency.last_index()?,
            "Node shut down"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SupervisionConfig;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_new_loads_state_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", json!({"arango": {"Plan": {"DBServers": {"A": "none"}}}})).unwrap();

        let config = NodeConfig::new(SupervisionConfig::default()).with_state_file(file.path());
        let node = SupervisionNode::new(config).unwrap();
        let snap = node.agency.read("/arango").unwrap();
        assert!(snap.exists("/Plan/DBServers/A"));
    }

    #[test]
    fn test_new_without_state_is_empty() {
        let node = SupervisionNode::new(NodeConfig::default()).unwrap();
        assert_eq!(node.agency.last_index().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let config = NodeConfig::new(SupervisionConfig::default().with_tick_interval_ms(10));
        let node = SupervisionNode::new(config).unwrap();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(node.run(shutdown.clone()));

        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        shutdown.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("node did not stop")
            .unwrap()
            .unwrap();
    }
}
