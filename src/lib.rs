//! lnd-fleet
//!
//! Launches lnd nodes for local test networks through a container process
//! manager and drives them with `lncli`.
//!
//! ```no_run
//! use lnd_fleet::node::{LndNode, NodeConfig, NodeOptions, SystemRunner};
//! use std::sync::Arc;
//!
//! # async fn demo() -> lnd_fleet::error::NodeResult<()> {
//! let config = NodeConfig::new(NodeOptions::new("alice", 10001, 10011))?;
//! let alice = LndNode::new(config, Arc::new(SystemRunner));
//! alice.start_node().await?;
//! let address = alice.get_address().await?;
//! # let _ = address;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod fleet;
pub mod logging;
pub mod node;

pub use error::{AttemptError, ConfigError, NodeError, NodeResult};
pub use fleet::{Fleet, FleetConfig};
pub use node::{LndNode, NodeConfig, NodeOptions};

/// Expand environment variables and ~ in host paths
/// Windows: %VAR% style
/// Unix: ~ expands to HOME
pub fn expand_path(path: &str) -> String {
    let mut result = path.to_string();

    #[cfg(windows)]
    {
        while let Some(start) = result.find('%') {
            if let Some(end) = result[start + 1..].find('%') {
                let var_name = &result[start + 1..start + 1 + end];
                if let Ok(value) = std::env::var(var_name) {
                    result = format!("{}{}{}", &result[..start], value, &result[start + 2 + end..]);
                } else {
                    break;
                }
            } else {
                break;
            }
        }
    }

    #[cfg(not(windows))]
    {
        if result.starts_with("~/") {
            if let Some(home) = dirs::home_dir() {
                result = format!("{}{}", home.display(), &result[1..]);
            }
        } else if result == "~" {
            if let Some(home) = dirs::home_dir() {
                result = home.to_string_lossy().to_string();
            }
        }
    }

    result
}
