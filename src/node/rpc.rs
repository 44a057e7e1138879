//! lnd control helpers
//!
//! Thin typed wrappers around [`LndNode::exec`]. Reads that come back empty
//! are re-issued under the node's retry policy rather than indefinitely.

use super::handle::LndNode;
use crate::error::{NodeError, NodeResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Subset of `lncli getinfo`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub identity_pubkey: String,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub num_peers: u32,
    #[serde(default)]
    pub num_active_channels: u32,
    #[serde(default)]
    pub block_height: u32,
    #[serde(default)]
    pub synced_to_chain: bool,
}

/// `lncli walletbalance`, in satoshis
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletBalance {
    #[serde(default, deserialize_with = "sats::deserialize")]
    pub total_balance: u64,
    #[serde(default, deserialize_with = "sats::deserialize")]
    pub confirmed_balance: u64,
    #[serde(default, deserialize_with = "sats::deserialize")]
    pub unconfirmed_balance: u64,
}

/// `lncli channelbalance`, in satoshis
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelBalance {
    #[serde(default, deserialize_with = "sats::deserialize")]
    pub balance: u64,
    #[serde(default, deserialize_with = "sats::deserialize")]
    pub pending_open_balance: u64,
}

/// One entry of `lncli listpeers`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub pub_key: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub inbound: bool,
}

/// One entry of `lncli listchannels`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub remote_pubkey: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub channel_point: String,
    #[serde(default)]
    pub chan_id: String,
    #[serde(default, deserialize_with = "sats::deserialize")]
    pub capacity: u64,
    #[serde(default, deserialize_with = "sats::deserialize")]
    pub local_balance: u64,
    #[serde(default, deserialize_with = "sats::deserialize")]
    pub remote_balance: u64,
}

/// Counterparty for a new channel
#[derive(Debug, Clone, Copy)]
pub enum ChannelPeer<'a> {
    /// Raw hex-encoded public key
    Pubkey(&'a str),
    /// Another node of the fleet
    Node(&'a LndNode),
}

impl<'a> From<&'a str> for ChannelPeer<'a> {
    fn from(key: &'a str) -> Self {
        ChannelPeer::Pubkey(key)
    }
}

impl<'a> From<&'a String> for ChannelPeer<'a> {
    fn from(key: &'a String) -> Self {
        ChannelPeer::Pubkey(key)
    }
}

impl<'a> From<&'a LndNode> for ChannelPeer<'a> {
    fn from(node: &'a LndNode) -> Self {
        ChannelPeer::Node(node)
    }
}

impl ChannelPeer<'_> {
    /// Resolve to a validated public key
    pub fn pubkey(&self) -> NodeResult<String> {
        let key = match self {
            ChannelPeer::Pubkey(key) => key.to_string(),
            ChannelPeer::Node(node) => node
                .identity_pubkey()
                .ok_or_else(|| NodeError::MissingIdentity(node.name().to_string()))?,
        };
        validate_pubkey(&key)?;
        Ok(key)
    }
}

/// Compressed secp256k1 keys are 33 bytes, 66 hex characters
pub fn validate_pubkey(key: &str) -> NodeResult<()> {
    let invalid = |reason: &str| NodeError::InvalidPubkey {
        key: key.to_string(),
        reason: reason.to_string(),
    };
    if key.len() != 66 {
        return Err(invalid("expected 66 hex characters"));
    }
    hex::decode(key).map_err(|e| invalid(&e.to_string()))?;
    Ok(())
}

impl LndNode {
    /// Node identity and sync status
    pub async fn get_info(&self) -> NodeResult<NodeInfo> {
        let value = self.exec("getinfo").await?;
        serde_json::from_value(value).map_err(|e| NodeError::UnexpectedResponse {
            command: "getinfo".to_string(),
            reason: e.to_string(),
        })
    }

    /// Fresh nested segwit address
    pub async fn get_address(&self) -> NodeResult<String> {
        self.read_until_present("newaddress np2wkh", |value| {
            value
                .get("address")
                .and_then(Value::as_str)
                .filter(|address| !address.is_empty())
                .map(str::to_string)
        })
        .await
    }

    /// On-chain wallet balance
    pub async fn get_balance(&self) -> NodeResult<WalletBalance> {
        self.read_until_present("walletbalance", object_as::<WalletBalance>)
            .await
    }

    /// Balance held in channels
    pub async fn channel_balance(&self) -> NodeResult<ChannelBalance> {
        self.read_until_present("channelbalance", object_as::<ChannelBalance>)
            .await
    }

    /// Currently connected peers
    pub async fn list_peers(&self) -> NodeResult<Vec<Peer>> {
        self.read_until_present("listpeers", |value| field_as(value, "peers"))
            .await
    }

    /// Open channels
    pub async fn list_channels(&self) -> NodeResult<Vec<Channel>> {
        self.read_until_present("listchannels", |value| field_as(value, "channels"))
            .await
    }

    /// Open a channel funded with `local_amount` satoshis and nothing pushed
    pub async fn open_channel<'a>(
        &self,
        peer: impl Into<ChannelPeer<'a>>,
        local_amount: u64,
    ) -> NodeResult<Value> {
        self.open_channel_with_push(peer, local_amount, 0).await
    }

    /// Open a channel, pushing `push_amount` of the funding to the peer.
    ///
    /// Everything is validated before the shim runs, and a failed or empty
    /// result is returned as-is rather than re-issued.
    pub async fn open_channel_with_push<'a>(
        &self,
        peer: impl Into<ChannelPeer<'a>>,
        local_amount: u64,
        push_amount: u64,
    ) -> NodeResult<Value> {
        let pubkey = peer.into().pubkey()?;
        if local_amount == 0 {
            return Err(NodeError::InvalidAmount(
                "local amount must be greater than zero".to_string(),
            ));
        }
        if push_amount > local_amount {
            return Err(NodeError::InvalidAmount(format!(
                "push amount {} exceeds local amount {}",
                push_amount, local_amount
            )));
        }

        log::info!(
            "{}: opening channel to {} ({} sat, push {} sat)",
            self.name(),
            pubkey,
            local_amount,
            push_amount
        );
        self.exec(&format!(
            "openchannel {} {} {}",
            pubkey, local_amount, push_amount
        ))
        .await
    }

    /// Re-issue an idempotent read until `extract` finds something in it
    async fn read_until_present<T>(
        &self,
        command: &str,
        extract: fn(&Value) -> Option<T>,
    ) -> NodeResult<T> {
        let policy = self.retry_policy();
        let attempts = policy.attempts();
        for attempt in 1..=attempts {
            let value = self.exec(command).await?;
            if let Some(result) = extract(&value) {
                return Ok(result);
            }

            log::log!(
                self.diag_level(),
                "{}: `{}` returned nothing usable ({}/{}): {}",
                self.name(),
                command,
                attempt,
                attempts,
                value
            );
            if attempt < attempts && !policy.wait(attempt, self.cancellation()).await {
                return Err(NodeError::Cancelled(self.name().to_string()));
            }
        }

        Err(NodeError::EmptyResultExhausted {
            command: command.to_string(),
            attempts,
        })
    }
}

fn object_as<T: for<'de> Deserialize<'de>>(value: &Value) -> Option<T> {
    match value {
        Value::Object(map) if !map.is_empty() => serde_json::from_value(value.clone()).ok(),
        _ => None,
    }
}

fn field_as<T: for<'de> Deserialize<'de>>(value: &Value, field: &str) -> Option<T> {
    value
        .get(field)
        .filter(|v| v.is_array())
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

/// lnd encodes 64-bit integers as JSON strings
mod sats {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(u64),
        Text(String),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(n),
            Repr::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}
