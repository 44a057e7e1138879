//! Node orchestration for lnd test networks
//!
//! This module launches lnd nodes through a container process manager and
//! drives them from the outside with `lncli`.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    node module                           │
//! ├─────────────────────────────────────────────────────────┤
//! │  config.rs    - Option validation and NodeConfig         │
//! │  shim.rs      - lncli connection settings                │
//! │  runner.rs    - External process invocation              │
//! │  retry.rs     - Bounded retry with backoff               │
//! │  handle.rs    - LndNode (config + runner + identity)     │
//! │  manager.rs   - Container launch and readiness           │
//! │  executor.rs  - exec with retry and output parsing       │
//! │  rpc.rs       - getinfo, balances, peers, channels       │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Flow: `NodeConfig` → `LndNode::start_node` → `LndNode::exec` → helpers.

pub mod config;
pub mod executor;
pub mod handle;
pub mod manager;
pub mod retry;
pub mod rpc;
pub mod runner;
pub mod shim;

#[cfg(test)]
pub(crate) mod testing;

// Re-export key types for convenience
pub use config::{HostIdentity, Network, NodeConfig, NodeOptions};
pub use handle::LndNode;
pub use manager::{LaunchOutcome, ManagerSettings};
pub use retry::RetryPolicy;
pub use rpc::{Channel, ChannelBalance, ChannelPeer, NodeInfo, Peer, WalletBalance};
pub use runner::{CommandOutput, CommandRunner, Invocation, SystemRunner};
pub use shim::ShimSettings;
