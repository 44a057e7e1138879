//! Node configuration
//!
//! Turns a small option record into a fully resolved [`NodeConfig`]. All
//! validation happens here; nothing touches the filesystem or the process
//! environment.

use super::shim::{self, ShimSettings};
use crate::error::ConfigError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Shared data root inside the node containers
pub const DEFAULT_DATA_ROOT: &str = "/lnd-data";

/// REST listen port used when none is given
pub const DEFAULT_REST_PORT: u16 = 8080;

/// Bitcoin network the node runs on
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Main network
    #[default]
    Mainnet,
    /// Public test network
    Testnet,
    /// btcd simulation network
    Simnet,
    /// Local regression test network
    Regtest,
}

impl Network {
    /// Get the network name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Simnet => "simnet",
            Network::Regtest => "regtest",
        }
    }

    /// Public neutrino peer for networks that have one
    pub fn default_neutrino_backend(&self) -> Option<&'static str> {
        match self {
            Network::Mainnet => Some("btcd-mainnet.lightning.computer"),
            Network::Testnet => Some("faucet.lightning.community"),
            Network::Simnet | Network::Regtest => None,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "testnet" => Ok(Network::Testnet),
            "simnet" => Ok(Network::Simnet),
            "regtest" => Ok(Network::Regtest),
            other => Err(ConfigError::InvalidValue {
                field: "network",
                reason: format!("unknown network `{}`", other),
            }),
        }
    }
}

/// Host user and group the container should write files as
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostIdentity {
    pub uid: u32,
    pub gid: u32,
}

impl HostIdentity {
    /// Identity of the current process
    #[cfg(unix)]
    pub fn current() -> Option<Self> {
        // getuid/getgid cannot fail
        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
        Some(Self { uid, gid })
    }

    #[cfg(not(unix))]
    pub fn current() -> Option<Self> {
        None
    }
}

/// Option record a node is built from
///
/// Deserializing goes through [`NodeOptions::from_value`] so type errors name
/// the offending option.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NodeOptions {
    pub name: String,
    pub rpc: u16,
    pub p2p: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rest: Option<u16>,
    pub neutrino: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    pub network: Network,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lnddir: Option<String>,
    pub verbose: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<HostIdentity>,
}

impl NodeOptions {
    /// Options with only the required fields set
    pub fn new(name: impl Into<String>, rpc: u16, p2p: u16) -> Self {
        Self {
            name: name.into(),
            rpc,
            p2p,
            rest: None,
            neutrino: false,
            backend: None,
            network: Network::default(),
            lnddir: None,
            verbose: false,
            host: None,
        }
    }

    /// Validate a raw JSON record
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        let record = value.as_object().ok_or(ConfigError::InvalidType {
            field: "node",
            expected: "an object",
        })?;

        let name = required(record, "name", take_string)?;
        let rpc = required(record, "rpc", take_port)?;
        let p2p = required(record, "p2p", take_port)?;
        let rest = optional(record, "rest", take_port)?;
        let neutrino = optional(record, "neutrino", take_bool)?.unwrap_or(false);
        let backend = optional(record, "backend", take_string)?;
        let network = optional(record, "network", take_string)?
            .map(|n| n.parse::<Network>())
            .transpose()?
            .unwrap_or_default();
        let lnddir = optional(record, "lnddir", take_string)?;
        let verbose = optional(record, "verbose", take_bool)?.unwrap_or(false);
        let host = match record.get("host") {
            None | Some(Value::Null) => None,
            Some(v) => Some(serde_json::from_value::<HostIdentity>(v.clone()).map_err(|_| {
                ConfigError::InvalidType {
                    field: "host",
                    expected: "an object with integer `uid` and `gid`",
                }
            })?),
        };

        Ok(Self {
            name,
            rpc,
            p2p,
            rest,
            neutrino,
            backend,
            network,
            lnddir,
            verbose,
            host,
        })
    }
}

impl<'de> Deserialize<'de> for NodeOptions {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        NodeOptions::from_value(&value).map_err(serde::de::Error::custom)
    }
}

type Take<T> = fn(&'static str, &Value) -> Result<T, ConfigError>;

fn required<T>(
    record: &Map<String, Value>,
    field: &'static str,
    take: Take<T>,
) -> Result<T, ConfigError> {
    match record.get(field) {
        None | Some(Value::Null) => Err(ConfigError::MissingField(field)),
        Some(v) => take(field, v),
    }
}

fn optional<T>(
    record: &Map<String, Value>,
    field: &'static str,
    take: Take<T>,
) -> Result<Option<T>, ConfigError> {
    match record.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => take(field, v).map(Some),
    }
}

fn take_string(field: &'static str, value: &Value) -> Result<String, ConfigError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or(ConfigError::InvalidType {
            field,
            expected: "a string",
        })
}

fn take_bool(field: &'static str, value: &Value) -> Result<bool, ConfigError> {
    value.as_bool().ok_or(ConfigError::InvalidType {
        field,
        expected: "a boolean",
    })
}

fn take_port(field: &'static str, value: &Value) -> Result<u16, ConfigError> {
    let n = value.as_u64().ok_or(ConfigError::InvalidType {
        field,
        expected: "a non-negative integer",
    })?;
    u16::try_from(n).map_err(|_| ConfigError::InvalidValue {
        field,
        reason: format!("{} is not a valid port", n),
    })
}

/// Fully resolved configuration for one node
///
/// Everything except the runtime identity key (kept on the node handle) is
/// fixed at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig {
    name: String,
    rpc_port: u16,
    p2p_port: u16,
    rest_port: u16,
    network: Network,
    lnddir: String,
    neutrino: bool,
    backend: Option<String>,
    verbose: bool,
    host: Option<HostIdentity>,
    shim: ShimSettings,
    shim_args: Vec<String>,
    env: BTreeMap<String, String>,
}

impl NodeConfig {
    /// Build a configuration from already-typed options
    pub fn new(options: NodeOptions) -> Result<Self, ConfigError> {
        validate_name(&options.name)?;
        for (field, port) in [("rpc", options.rpc), ("p2p", options.p2p)] {
            if port == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "port must be non-zero".to_string(),
                });
            }
        }

        let rest_port = options.rest.unwrap_or(DEFAULT_REST_PORT);
        let lnddir = options
            .lnddir
            .filter(|dir| !dir.trim().is_empty())
            .unwrap_or_else(|| format!("{}/{}", DEFAULT_DATA_ROOT, options.name));

        // Only neutrino nodes on networks with a public peer get a backend filled in.
        let backend = match options.backend {
            Some(backend) => Some(backend),
            None if options.neutrino => options
                .network
                .default_neutrino_backend()
                .map(str::to_string),
            None => None,
        };

        let rpcserver = format!("localhost:{}", options.rpc);
        let shim = ShimSettings::resolve(|var| match var {
            shim::RPCSERVER => Some(rpcserver.clone()),
            shim::NETWORK => Some(options.network.as_str().to_string()),
            shim::LNDDIR => Some(lnddir.clone()),
            _ => None,
        })?;

        let mut env = BTreeMap::new();
        env.insert("NETWORK".to_string(), options.network.as_str().to_string());
        env.insert("COMPOSE_INTERACTIVE_NO_CLI".to_string(), "1".to_string());
        env.insert("TLSEXTRADOMAIN".to_string(), options.name.clone());
        if let Some(host) = options.host {
            env.insert("UID".to_string(), host.uid.to_string());
            env.insert("GID".to_string(), host.gid.to_string());
        }

        Ok(Self {
            name: options.name,
            rpc_port: options.rpc,
            p2p_port: options.p2p,
            rest_port,
            network: options.network,
            lnddir,
            neutrino: options.neutrino,
            backend,
            verbose: options.verbose,
            host: options.host,
            shim_args: shim.args(),
            shim,
            env,
        })
    }

    /// Build a configuration from a raw JSON record
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        Self::new(NodeOptions::from_value(value)?)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rpc_port(&self) -> u16 {
        self.rpc_port
    }

    pub fn p2p_port(&self) -> u16 {
        self.p2p_port
    }

    pub fn rest_port(&self) -> u16 {
        self.rest_port
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn lnddir(&self) -> &str {
        &self.lnddir
    }

    pub fn neutrino(&self) -> bool {
        self.neutrino
    }

    pub fn backend(&self) -> Option<&str> {
        self.backend.as_deref()
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn host(&self) -> Option<HostIdentity> {
        self.host
    }

    /// Connection settings for the RPC shim
    pub fn shim(&self) -> &ShimSettings {
        &self.shim
    }

    /// Shim connection flags, rendered once at construction
    pub fn shim_args(&self) -> &[String] {
        &self.shim_args
    }

    /// Environment overlay applied to every process run for this node
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Ports that must be unique across a fleet
    pub fn fleet_ports(&self) -> [u16; 2] {
        [self.rpc_port, self.p2p_port]
    }
}

fn validate_name(name: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidValue {
        field: "name",
        reason: reason.to_string(),
    };

    let mut chars = name.chars();
    match chars.next() {
        None => return Err(invalid("must not be empty")),
        Some(c) if !c.is_ascii_alphanumeric() => {
            return Err(invalid("must start with a letter or digit"))
        }
        _ => {}
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')) {
        return Err(invalid("may only contain letters, digits, `_`, `.` and `-`"));
    }
    Ok(())
}
