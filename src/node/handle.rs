//! Node handle
//!
//! An [`LndNode`] ties a [`NodeConfig`] to the runner that executes its
//! commands. Launch, exec and the RPC helpers are implemented on it in
//! `manager`, `executor` and `rpc`.

use super::config::NodeConfig;
use super::manager::ManagerSettings;
use super::retry::RetryPolicy;
use super::runner::{CommandRunner, Invocation};
use std::sync::{Arc, RwLock};
use tokio_util::sync::CancellationToken;

/// One lnd node driven from the outside
pub struct LndNode {
    config: NodeConfig,
    settings: ManagerSettings,
    policy: RetryPolicy,
    runner: Arc<dyn CommandRunner>,
    /// Set by a successful launch readiness check
    identity_pubkey: RwLock<Option<String>>,
    cancel: CancellationToken,
}

impl LndNode {
    /// Create a node handle with default manager settings and retry policy
    pub fn new(config: NodeConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            config,
            settings: ManagerSettings::default(),
            policy: RetryPolicy::default(),
            runner,
            identity_pubkey: RwLock::new(None),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_settings(mut self, settings: ManagerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        self.config.name()
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub(crate) fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    /// Identity public key, known once the node has started
    pub fn identity_pubkey(&self) -> Option<String> {
        self.identity_pubkey
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub(crate) fn set_identity_pubkey(&self, key: String) {
        *self
            .identity_pubkey
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(key);
    }

    /// Abort pending retry waits; running processes are left alone.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub(crate) fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Level for diagnostic lines, raised when the node is verbose
    pub(crate) fn diag_level(&self) -> log::Level {
        if self.config.verbose() {
            log::Level::Info
        } else {
            log::Level::Debug
        }
    }

    /// Shim invocation for `command`, already split into arguments
    pub(crate) fn shim_invocation(&self, command: &[&str]) -> Invocation {
        Invocation::new(&self.settings.container_program)
            .args(["exec", self.config.name()])
            .arg(&self.settings.shim_program)
            .args(self.config.shim_args())
            .args(command.iter().copied())
            .envs(self.config.env())
    }
}

impl std::fmt::Debug for LndNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LndNode")
            .field("config", &self.config)
            .field("settings", &self.settings)
            .field("policy", &self.policy)
            .field("identity_pubkey", &self.identity_pubkey())
            .finish()
    }
}
