//! Node process management
//!
//! Launches the lnd container through the process manager and waits for the
//! node to answer `getinfo`.

use super::handle::LndNode;
use super::runner::{CommandOutput, Invocation};
use crate::error::{NodeError, NodeResult};
use serde::{Deserialize, Serialize};

/// Programs and names used to reach the containers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerSettings {
    /// Process manager used to launch nodes
    #[serde(default = "default_compose_program")]
    pub compose_program: String,

    /// Compose file passed with `-f` (defaults to the manager's own lookup)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compose_file: Option<String>,

    /// Compose service that runs lnd
    #[serde(default = "default_service")]
    pub service: String,

    /// Container CLI used to exec into a running node
    #[serde(default = "default_container_program")]
    pub container_program: String,

    /// RPC shim inside the container
    #[serde(default = "default_shim_program")]
    pub shim_program: String,
}

fn default_compose_program() -> String {
    "docker-compose".to_string()
}

fn default_service() -> String {
    "lnd".to_string()
}

fn default_container_program() -> String {
    "docker".to_string()
}

fn default_shim_program() -> String {
    "lncli".to_string()
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            compose_program: default_compose_program(),
            compose_file: None,
            service: default_service(),
            container_program: default_container_program(),
            shim_program: default_shim_program(),
        }
    }
}

/// What happened when the launch command ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// A new container was started
    Started,
    /// A container with this name already existed
    AlreadyRunning,
}

impl LndNode {
    /// Launch command for this node
    pub fn launch_invocation(&self) -> Invocation {
        let config = self.config();
        let settings = self.settings();

        let mut invocation = Invocation::new(&settings.compose_program);
        if let Some(file) = &settings.compose_file {
            invocation = invocation.args(["-f".to_string(), crate::expand_path(file)]);
        }

        invocation = invocation
            .args(["run", "-d", "--name", config.name()])
            .arg(&settings.service)
            .args([
                format!("--lnddir={}", config.lnddir()),
                format!("--rpclisten=0.0.0.0:{}", config.rpc_port()),
                format!("--listen=0.0.0.0:{}", config.p2p_port()),
                format!("--restlisten=0.0.0.0:{}", config.rest_port()),
                format!("--alias={}", config.name()),
                "--noseedbackup".to_string(),
                "--prometheus.enable".to_string(),
                format!("--tlsextradomain={}", config.name()),
            ]);

        if config.neutrino() {
            invocation = invocation.arg("--bitcoin.node=neutrino");
            if let Some(backend) = config.backend() {
                invocation = invocation.arg(format!("--neutrino.connect={}", backend));
            }
        }

        invocation.envs(config.env())
    }

    /// Run the launch command, treating a name conflict as success
    pub async fn launch(&self) -> NodeResult<LaunchOutcome> {
        let invocation = self.launch_invocation();
        log::log!(self.diag_level(), "Launching {}: {}", self.name(), invocation);

        let output = self
            .runner()
            .run(&invocation)
            .await
            .map_err(|reason| NodeError::LaunchFailed {
                node: self.name().to_string(),
                reason,
            })?;

        if output.success() {
            log::info!("Node {} launched", self.name());
            return Ok(LaunchOutcome::Started);
        }

        if is_conflict(&output) {
            log::warn!(
                "Node {} already exists, continuing with the running container",
                self.name()
            );
            return Ok(LaunchOutcome::AlreadyRunning);
        }

        Err(NodeError::LaunchFailed {
            node: self.name().to_string(),
            reason: failure_reason(&output),
        })
    }

    /// Launch the node and wait until it reports its identity.
    ///
    /// On success the identity public key is stored on the node and returned.
    pub async fn start_node(&self) -> NodeResult<String> {
        self.launch().await?;

        let info = self.get_info().await?;
        if info.identity_pubkey.is_empty() {
            return Err(NodeError::UnexpectedResponse {
                command: "getinfo".to_string(),
                reason: "identity_pubkey is empty".to_string(),
            });
        }

        log::info!("Node {} ready with identity {}", self.name(), info.identity_pubkey);
        self.set_identity_pubkey(info.identity_pubkey.clone());
        Ok(info.identity_pubkey)
    }
}

/// Docker reports an existing container name as a "Conflict"
fn is_conflict(output: &CommandOutput) -> bool {
    let stderr = output.stderr.to_lowercase();
    stderr.contains("conflict") || stderr.contains("is already in use")
}

fn failure_reason(output: &CommandOutput) -> String {
    let stderr = output.stderr.trim();
    if stderr.is_empty() {
        format!("exited with status {:?}", output.code)
    } else {
        stderr.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::config::{Network, NodeConfig, NodeOptions};
    use crate::node::retry::RetryPolicy;
    use crate::node::testing::{exit, ok, spawn_error, ScriptedRunner};
    use std::sync::Arc;

    const PUBKEY: &str = "02abc0000000000000000000000000000000000000000000000000000000000001";

    fn node_with(options: NodeOptions, runner: Arc<ScriptedRunner>) -> LndNode {
        LndNode::new(NodeConfig::new(options).unwrap(), runner)
            .with_retry_policy(RetryPolicy::immediate(5))
    }

    fn getinfo() -> String {
        format!(r#"{{"identity_pubkey": "{}", "alias": "alice"}}"#, PUBKEY)
    }

    #[test]
    fn test_launch_invocation_flags() {
        let node = node_with(
            NodeOptions::new("alice", 10001, 10011),
            Arc::new(ScriptedRunner::new()),
        );
        let invocation = node.launch_invocation();
        assert_eq!(invocation.program, "docker-compose");
        assert_eq!(&invocation.args[..5], &["run", "-d", "--name", "alice", "lnd"]);
        for flag in [
            "--lnddir=/lnd-data/alice",
            "--rpclisten=0.0.0.0:10001",
            "--listen=0.0.0.0:10011",
            "--restlisten=0.0.0.0:8080",
            "--alias=alice",
            "--noseedbackup",
            "--prometheus.enable",
            "--tlsextradomain=alice",
        ] {
            assert!(invocation.args.iter().any(|a| a == flag), "missing {}", flag);
        }
        assert!(!invocation.args.iter().any(|a| a.starts_with("--bitcoin.node")));
        assert_eq!(invocation.env["NETWORK"], "mainnet");
    }

    #[test]
    fn test_launch_invocation_neutrino() {
        let mut options = NodeOptions::new("bob", 10002, 10012);
        options.neutrino = true;
        options.network = Network::Testnet;
        let node = node_with(options.clone(), Arc::new(ScriptedRunner::new()));
        let args = node.launch_invocation().args;
        assert!(args.iter().any(|a| a == "--bitcoin.node=neutrino"));
        assert!(args
            .iter()
            .any(|a| a == "--neutrino.connect=faucet.lightning.community"));

        // No known peer for simnet: launch is still attempted without one.
        options.network = Network::Simnet;
        let node = node_with(options, Arc::new(ScriptedRunner::new()));
        let args = node.launch_invocation().args;
        assert!(args.iter().any(|a| a == "--bitcoin.node=neutrino"));
        assert!(!args.iter().any(|a| a.starts_with("--neutrino.connect")));
    }

    #[test]
    fn test_launch_invocation_compose_file() {
        let settings = ManagerSettings {
            compose_file: Some("/srv/fleet/docker-compose.yml".to_string()),
            ..ManagerSettings::default()
        };
        let node = node_with(
            NodeOptions::new("alice", 10001, 10011),
            Arc::new(ScriptedRunner::new()),
        )
        .with_settings(settings);
        let args = node.launch_invocation().args;
        assert_eq!(&args[..3], &["-f", "/srv/fleet/docker-compose.yml", "run"]);
    }

    #[tokio::test]
    async fn test_start_node_sets_identity() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.push(ok("container-id"));
        runner.push(ok(&getinfo()));
        let node = node_with(NodeOptions::new("alice", 10001, 10011), runner.clone());

        let key = node.start_node().await.unwrap();
        assert_eq!(key, PUBKEY);
        assert_eq!(node.identity_pubkey().as_deref(), Some(PUBKEY));

        let calls = runner.invocations();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].program, "docker-compose");
        assert_eq!(calls[1].args.last().map(String::as_str), Some("getinfo"));
    }

    #[tokio::test]
    async fn test_conflict_is_not_fatal() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.push(exit(
            1,
            "Error response from daemon: Conflict. The container name \"/alice\" is already in use",
        ));
        runner.push(ok(&getinfo()));
        let node = node_with(NodeOptions::new("alice", 10001, 10011), runner.clone());

        assert_eq!(node.identity_pubkey(), None);
        node.start_node().await.unwrap();
        assert_eq!(node.identity_pubkey().as_deref(), Some(PUBKEY));
    }

    #[tokio::test]
    async fn test_launch_reports_conflict_outcome() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.push(exit(1, "Conflict"));
        let node = node_with(NodeOptions::new("alice", 10001, 10011), runner);
        assert_eq!(node.launch().await.unwrap(), LaunchOutcome::AlreadyRunning);
    }

    #[tokio::test]
    async fn test_other_launch_failures_are_fatal() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.push(exit(1, "no such service: lnd"));
        let node = node_with(NodeOptions::new("alice", 10001, 10011), runner.clone());

        match node.start_node().await {
            Err(NodeError::LaunchFailed { node, reason }) => {
                assert_eq!(node, "alice");
                assert!(reason.contains("no such service"));
            }
            other => panic!("expected launch failure, got {:?}", other),
        }
        assert_eq!(runner.invocations().len(), 1);
        assert_eq!(node.identity_pubkey(), None);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_fatal() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.push(spawn_error("docker-compose not found"));
        let node = node_with(NodeOptions::new("alice", 10001, 10011), runner);
        assert!(matches!(
            node.start_node().await,
            Err(NodeError::LaunchFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_readiness_exhaustion_propagates() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.push(ok("container-id"));
        for _ in 0..5 {
            runner.push(exit(1, "unable to connect to RPC server"));
        }
        let node = node_with(NodeOptions::new("alice", 10001, 10011), runner.clone());

        match node.start_node().await {
            Err(NodeError::RpcExhausted { attempts, .. }) => assert_eq!(attempts, 5),
            other => panic!("expected exhaustion, got {:?}", other),
        }
        assert_eq!(runner.invocations().len(), 6);
        assert_eq!(node.identity_pubkey(), None);
    }
}
