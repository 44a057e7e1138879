//! Fleet configuration and start-up
//!
//! A fleet file lists every node of a test network together with the process
//! manager settings and retry policy they share.

use crate::error::{ConfigError, NodeResult};
use crate::node::{
    CommandRunner, HostIdentity, LndNode, ManagerSettings, NodeConfig, NodeOptions, RetryPolicy,
};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Fleet description stored in fleet.json
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetConfig {
    /// Node option records, validated when the fleet is built
    #[serde(default)]
    pub nodes: Vec<NodeOptions>,

    #[serde(default)]
    pub manager: ManagerSettings,

    #[serde(default)]
    pub retry: RetryPolicy,

    /// Directory for rotating log files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,

    /// Give nodes without an explicit `host` the uid/gid of this process
    #[serde(default)]
    pub inherit_host_identity: bool,
}

impl FleetConfig {
    /// Default location of the fleet file
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lnd-fleet")
            .join("fleet.json")
    }

    /// Load a fleet file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Save a fleet file, creating its directory if needed
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io_error = |source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents).map_err(io_error)?;

        log::info!("Fleet config saved to {}", path.display());
        Ok(())
    }

    /// Log directory with `~` expanded
    pub fn log_dir(&self) -> Option<PathBuf> {
        self.log_dir
            .as_deref()
            .map(|dir| PathBuf::from(crate::expand_path(dir)))
    }
}

/// Nodes of one test network
#[derive(Debug)]
pub struct Fleet {
    nodes: Vec<LndNode>,
}

impl Fleet {
    /// Build every node, rejecting duplicate names and ports
    pub fn new(config: &FleetConfig, runner: Arc<dyn CommandRunner>) -> Result<Self, ConfigError> {
        let host = if config.inherit_host_identity {
            HostIdentity::current()
        } else {
            None
        };

        let mut names = HashSet::new();
        let mut ports: HashMap<u16, String> = HashMap::new();
        let mut nodes = Vec::with_capacity(config.nodes.len());

        for options in &config.nodes {
            let mut options = options.clone();
            if options.host.is_none() {
                options.host = host;
            }
            let node_config = NodeConfig::new(options)?;
            let name = node_config.name().to_string();

            if !names.insert(name.clone()) {
                return Err(ConfigError::DuplicateName(name));
            }
            for port in node_config.fleet_ports() {
                if let Some(first) = ports.insert(port, name.clone()) {
                    return Err(ConfigError::DuplicatePort {
                        port,
                        first,
                        second: name,
                    });
                }
            }

            nodes.push(
                LndNode::new(node_config, runner.clone())
                    .with_settings(config.manager.clone())
                    .with_retry_policy(config.retry.clone()),
            );
        }

        Ok(Self { nodes })
    }

    pub fn nodes(&self) -> &[LndNode] {
        &self.nodes
    }

    /// Look up a node by name
    pub fn node(&self, name: &str) -> Option<&LndNode> {
        self.nodes.iter().find(|node| node.name() == name)
    }

    /// Start every node concurrently
    pub async fn start_all(&self) -> Vec<(String, NodeResult<String>)> {
        self.start_nodes(self.nodes.iter()).await
    }

    /// Start the named nodes concurrently; unknown names are skipped
    pub async fn start(&self, names: &[String]) -> Vec<(String, NodeResult<String>)> {
        let selected = names.iter().filter_map(|name| {
            let node = self.node(name);
            if node.is_none() {
                log::warn!("No node named {} in the fleet", name);
            }
            node
        });
        self.start_nodes(selected).await
    }

    async fn start_nodes<'a>(
        &self,
        nodes: impl Iterator<Item = &'a LndNode>,
    ) -> Vec<(String, NodeResult<String>)> {
        let starts = nodes.map(|node| async move {
            let result = node.start_node().await;
            if let Err(e) = &result {
                log::error!("Node {} failed to start: {}", node.name(), e);
            }
            (node.name().to_string(), result)
        });
        join_all(starts).await
    }

    /// Stop waiting on retries for every node
    pub fn cancel(&self) {
        for node in &self.nodes {
            node.cancel();
        }
    }
}
