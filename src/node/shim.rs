//! RPC shim settings
//!
//! The shim is `lncli` wrapped so that its connection flags come from a small
//! set of environment variables. Resolution follows the wrapper's rules: a
//! variable that is blank or holds the literal `""` counts as unset and falls
//! back to its default.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

pub const RPCSERVER: &str = "RPCSERVER";
pub const NETWORK: &str = "NETWORK";
pub const LNDDIR: &str = "LNDDIR";
pub const MACAROONPATH: &str = "MACAROONPATH";
pub const TLSCERTPATH: &str = "TLSCERTPATH";

pub const DEFAULT_RPCSERVER: &str = "lnd:10009";
pub const DEFAULT_NETWORK: &str = "mainnet";
pub const DEFAULT_LNDDIR: &str = "/lnd-data";

/// Sentinel some entrypoints pass for "no value".
const EMPTY_QUOTES: &str = "\"\"";

/// Fully resolved connection flags for one shim invocation target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShimSettings {
    pub rpcserver: String,
    pub network: String,
    pub lnddir: String,
    pub macaroonpath: String,
    pub tlscertpath: String,
}

impl ShimSettings {
    /// Resolve settings through `lookup`, applying defaults to unset variables.
    pub fn resolve<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| normalize(lookup(name));

        let rpcserver = require(RPCSERVER, get(RPCSERVER), Some(DEFAULT_RPCSERVER.to_string()))?;
        let network = require(NETWORK, get(NETWORK), Some(DEFAULT_NETWORK.to_string()))?;
        let lnddir = require(LNDDIR, get(LNDDIR), Some(DEFAULT_LNDDIR.to_string()))?;
        let macaroonpath = require(
            MACAROONPATH,
            get(MACAROONPATH),
            Some(default_macaroon_path(&lnddir, &network)),
        )?;
        let tlscertpath = require(
            TLSCERTPATH,
            get(TLSCERTPATH),
            Some(default_tls_cert_path(&lnddir)),
        )?;

        Ok(Self {
            rpcserver,
            network,
            lnddir,
            macaroonpath,
            tlscertpath,
        })
    }

    /// Resolve settings from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::resolve(|name| std::env::var(name).ok())
    }

    /// Connection flags in the order the shim expects them
    pub fn args(&self) -> Vec<String> {
        vec![
            format!("--network={}", self.network),
            format!("--rpcserver={}", self.rpcserver),
            format!("--lnddir={}", self.lnddir),
            format!("--macaroonpath={}", self.macaroonpath),
            format!("--tlscertpath={}", self.tlscertpath),
        ]
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() || trimmed == EMPTY_QUOTES {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn require(
    name: &'static str,
    value: Option<String>,
    default: Option<String>,
) -> Result<String, ConfigError> {
    value
        .or(default)
        .ok_or(ConfigError::MissingShimVariable(name))
}

fn default_macaroon_path(lnddir: &str, network: &str) -> String {
    format!(
        "{}/data/chain/bitcoin/{}/admin.macaroon",
        lnddir.trim_end_matches('/'),
        network
    )
}

fn default_tls_cert_path(lnddir: &str) -> String {
    format!("{}/tls.cert", lnddir.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_set() {
        let settings = ShimSettings::resolve(lookup(&[])).unwrap();
        assert_eq!(settings.rpcserver, "lnd:10009");
        assert_eq!(settings.network, "mainnet");
        assert_eq!(settings.lnddir, "/lnd-data");
        assert_eq!(
            settings.macaroonpath,
            "/lnd-data/data/chain/bitcoin/mainnet/admin.macaroon"
        );
        assert_eq!(settings.tlscertpath, "/lnd-data/tls.cert");
    }

    #[test]
    fn test_blank_and_sentinel_count_as_unset() {
        let settings = ShimSettings::resolve(lookup(&[
            (RPCSERVER, "   "),
            (NETWORK, "\"\""),
            (LNDDIR, "/data/bob"),
        ]))
        .unwrap();
        assert_eq!(settings.rpcserver, DEFAULT_RPCSERVER);
        assert_eq!(settings.network, DEFAULT_NETWORK);
        assert_eq!(
            settings.macaroonpath,
            "/data/bob/data/chain/bitcoin/mainnet/admin.macaroon"
        );
    }

    #[test]
    fn test_derived_paths_follow_overrides() {
        let settings = ShimSettings::resolve(lookup(&[
            (NETWORK, "simnet"),
            (LNDDIR, "/lnd-data/carol/"),
            (TLSCERTPATH, "/certs/carol.cert"),
        ]))
        .unwrap();
        assert_eq!(
            settings.macaroonpath,
            "/lnd-data/carol/data/chain/bitcoin/simnet/admin.macaroon"
        );
        assert_eq!(settings.tlscertpath, "/certs/carol.cert");
    }

    #[test]
    fn test_required_without_default_fails() {
        let err = require(RPCSERVER, normalize(Some("\"\"".to_string())), None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingShimVariable(RPCSERVER)));
    }

    #[test]
    fn test_args_order() {
        let settings = ShimSettings::resolve(lookup(&[(RPCSERVER, "localhost:10001")])).unwrap();
        let args = settings.args();
        assert_eq!(args[0], "--network=mainnet");
        assert_eq!(args[1], "--rpcserver=localhost:10001");
        assert_eq!(args.len(), 5);
    }
}
