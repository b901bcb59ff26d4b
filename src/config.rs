use crate::error::{CoinError, Result};
use crate::wallet::WalletAddress;
use once_cell::sync::Lazy;
use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::RwLock;

pub static GLOBAL_CONFIG: Lazy<Config> = Lazy::new(Config::new);

/// The one well-known peer every node is seeded with.
pub static CENTRAL_NODE: Lazy<SocketAddr> = Lazy::new(|| {
    env::var("CENTRAL_NODE")
        .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
        .parse()
        .expect("CENTRAL_NODE environment variable is not a valid socket address")
});

const NODE_ID_KEY: &str = "NODE_ID";
const NODE_ADDR_KEY: &str = "NODE_ADDR";
const BASE_PORT: u16 = 3000;

///
/// Per-process node configuration.
///
/// `NODE_ID` selects the per-node database directory, wallet file and listen
/// port; it has no default, so every command that touches node state fails
/// without it. The mining address is set at startup when the node runs with
/// `--miner` and marks the node as a miner for the rest of the process.
///
/// Environment variables are read on every call rather than cached so that
/// tests can point consecutive node instances at distinct paths.
///
pub struct Config {
    mining_address: RwLock<Option<WalletAddress>>,
}

impl Config {
    pub fn new() -> Config {
        Config {
            mining_address: RwLock::new(None),
        }
    }

    pub fn node_id(&self) -> Result<String> {
        env::var(NODE_ID_KEY)
            .map_err(|_| CoinError::NodeConfig(format!("{} is not set", NODE_ID_KEY)))
    }

    /// Listen address: `NODE_ADDR` override, else port `3000 + NODE_ID`.
    pub fn node_addr(&self) -> Result<SocketAddr> {
        if let Ok(addr) = env::var(NODE_ADDR_KEY) {
            return addr
                .parse()
                .map_err(|_| CoinError::NodeConfig(format!("{} is not a socket address", addr)));
        }
        let node_id = self.node_id()?;
        let offset: u16 = node_id.parse().map_err(|_| {
            CoinError::NodeConfig(format!(
                "{} must be numeric to derive a port, got {:?}; set {} instead",
                NODE_ID_KEY, node_id, NODE_ADDR_KEY
            ))
        })?;
        Ok(SocketAddr::new(
            IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            BASE_PORT + offset,
        ))
    }

    /// Chain database directory, `b_<NODE_ID>.db` under the working directory.
    pub fn db_path(&self) -> Result<PathBuf> {
        let node_id = self.node_id()?;
        env::current_dir()
            .map(|dir| dir.join(format!("b_{}.db", node_id)))
            .map_err(|e| CoinError::NodeConfig(e.to_string()))
    }

    /// Wallet file, `wallet_<NODE_ID>.dat` under the working directory.
    pub fn wallet_file(&self) -> Result<PathBuf> {
        let node_id = self.node_id()?;
        env::current_dir()
            .map(|dir| dir.join(format!("wallet_{}.dat", node_id)))
            .map_err(|e| CoinError::NodeConfig(e.to_string()))
    }

    pub fn set_mining_addr(&self, addr: &WalletAddress) -> Result<()> {
        let mut mining_address = self
            .mining_address
            .write()
            .map_err(|e| CoinError::LockPoisoned(e.to_string()))?;
        *mining_address = Some(addr.clone());
        Ok(())
    }

    pub fn get_mining_addr(&self) -> Result<Option<WalletAddress>> {
        let mining_address = self
            .mining_address
            .read()
            .map_err(|e| CoinError::LockPoisoned(e.to_string()))?;
        Ok(mining_address.clone())
    }

    /// A miner is a node with a non-empty mining reward address.
    pub fn is_miner(&self) -> bool {
        self.mining_address
            .read()
            .map(|addr| addr.is_some())
            .unwrap_or(false)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
