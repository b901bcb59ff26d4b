use crate::error::{CoinError, Result};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::RwLock;

///
/// The known-peers set. Seeded with the central node; any address that sends
/// us a message is added, and peers are evicted lazily when a send to them
/// fails.
///
pub struct Nodes {
    inner: RwLock<HashSet<SocketAddr>>,
}

impl Nodes {
    pub fn new() -> Nodes {
        Nodes {
            inner: RwLock::new(HashSet::new()),
        }
    }

    pub fn add_node(&self, addr: SocketAddr) -> Result<()> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| CoinError::LockPoisoned(e.to_string()))?;
        inner.insert(addr);
        Ok(())
    }

    pub fn add_nodes(&self, addrs: impl IntoIterator<Item = SocketAddr>) -> Result<()> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| CoinError::LockPoisoned(e.to_string()))?;
        inner.extend(addrs);
        Ok(())
    }

    pub fn evict_node(&self, addr: &SocketAddr) -> Result<()> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| CoinError::LockPoisoned(e.to_string()))?;
        inner.remove(addr);
        Ok(())
    }

    pub fn node_is_known(&self, addr: &SocketAddr) -> Result<bool> {
        let inner = self
            .inner
            .read()
            .map_err(|e| CoinError::LockPoisoned(e.to_string()))?;
        Ok(inner.contains(addr))
    }

    pub fn get_nodes(&self) -> Result<Vec<SocketAddr>> {
        let inner = self
            .inner
            .read()
            .map_err(|e| CoinError::LockPoisoned(e.to_string()))?;
        Ok(inner.iter().copied().collect())
    }

    pub fn len(&self) -> Result<usize> {
        let inner = self
            .inner
            .read()
            .map_err(|e| CoinError::LockPoisoned(e.to_string()))?;
        Ok(inner.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl Default for Nodes {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_add_evict_contains() {
        let nodes = Nodes::new();
        let addr = SocketAddr::from_str("127.0.0.1:3001").expect("addr");

        nodes.add_node(addr).expect("add");
        nodes.add_node(addr).expect("add again");
        assert_eq!(nodes.len().expect("len"), 1);
        assert!(nodes.node_is_known(&addr).expect("known"));

        nodes.evict_node(&addr).expect("evict");
        assert!(!nodes.node_is_known(&addr).expect("known"));
        assert!(nodes.is_empty().expect("is_empty"));
    }
}
