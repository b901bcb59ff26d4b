use crate::core::transaction::Transaction;
use crate::error::{CoinError, Result};
use std::collections::HashMap;
use std::sync::RwLock;

///
/// Node-local pool of transactions waiting to be mined, keyed by hex
/// transaction id. Entries are added on receipt and removed once they appear
/// in a stored block; the only admission policy is deduplication by id.
///
pub struct MemoryPool {
    inner: RwLock<HashMap<String, Transaction>>,
}

impl MemoryPool {
    pub fn new() -> MemoryPool {
        MemoryPool {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn contains(&self, txid_hex: &str) -> Result<bool> {
        let inner = self
            .inner
            .read()
            .map_err(|e| CoinError::LockPoisoned(e.to_string()))?;
        Ok(inner.contains_key(txid_hex))
    }

    pub fn add(&self, tx: Transaction) -> Result<()> {
        let txid_hex = tx.get_tx_id_hex();
        self.inner
            .write()
            .map_err(|e| CoinError::LockPoisoned(e.to_string()))?
            .insert(txid_hex, tx);
        Ok(())
    }

    pub fn get(&self, txid_hex: &str) -> Result<Option<Transaction>> {
        let inner = self
            .inner
            .read()
            .map_err(|e| CoinError::LockPoisoned(e.to_string()))?;
        Ok(inner.get(txid_hex).cloned())
    }

    pub fn remove(&self, txid_hex: &str) -> Result<Option<Transaction>> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| CoinError::LockPoisoned(e.to_string()))?;
        Ok(inner.remove(txid_hex))
    }

    pub fn get_all(&self) -> Result<Vec<Transaction>> {
        let inner = self
            .inner
            .read()
            .map_err(|e| CoinError::LockPoisoned(e.to_string()))?;
        Ok(inner.values().cloned().collect())
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

impl Default for MemoryPool {
    fn default() -> Self {
        Self::new()
    }
}

///
/// Ordered list of block hashes announced by a peer but not yet downloaded.
/// Catch-up drains it front to back: request the first hash, remove it when
/// the block arrives, repeat.
///
pub struct BlockInTransit {
    inner: RwLock<Vec<Vec<u8>>>,
}

impl BlockInTransit {
    pub fn new() -> BlockInTransit {
        BlockInTransit {
            inner: RwLock::new(vec![]),
        }
    }

    pub fn add_blocks(&self, blocks: &[Vec<u8>]) -> Result<()> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| CoinError::LockPoisoned(e.to_string()))?;
        for hash in blocks {
            inner.push(hash.to_vec());
        }
        Ok(())
    }

    pub fn first(&self) -> Result<Option<Vec<u8>>> {
        let inner = self
            .inner
            .read()
            .map_err(|e| CoinError::LockPoisoned(e.to_string()))?;
        Ok(inner.first().map(|hash| hash.to_vec()))
    }

    pub fn remove(&self, block_hash: &[u8]) -> Result<()> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| CoinError::LockPoisoned(e.to_string()))?;
        if let Some(idx) = inner.iter().position(|x| x.eq(block_hash)) {
            inner.remove(idx);
        }
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| CoinError::LockPoisoned(e.to_string()))?;
        inner.clear();
        Ok(())
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

impl Default for BlockInTransit {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::Wallet;

    fn coinbase() -> Transaction {
        let address = Wallet::new().expect("wallet").get_address();
        Transaction::new_coinbase_tx(&address, None).expect("coinbase")
    }

    #[test]
    fn test_memory_pool_dedups_by_id() {
        let pool = MemoryPool::new();
        let tx = coinbase();
        let txid_hex = tx.get_tx_id_hex();

        pool.add(tx.clone()).expect("add");
        pool.add(tx).expect("add again");
        assert_eq!(pool.len().expect("len"), 1);
        assert!(pool.contains(&txid_hex).expect("contains"));
    }

    #[test]
    fn test_memory_pool_remove() {
        let pool = MemoryPool::new();
        let tx = coinbase();
        let txid_hex = tx.get_tx_id_hex();

        pool.add(tx).expect("add");
        assert!(pool.remove(&txid_hex).expect("remove").is_some());
        assert!(pool.remove(&txid_hex).expect("remove").is_none());
        assert!(pool.is_empty().expect("is_empty"));
    }

    #[test]
    fn test_blocks_in_transit_drain_order() {
        let transit = BlockInTransit::new();
        transit
            .add_blocks(&[vec![1], vec![2], vec![3]])
            .expect("add");

        assert_eq!(transit.first().expect("first"), Some(vec![1]));
        transit.remove(&[1]).expect("remove");
        assert_eq!(transit.first().expect("first"), Some(vec![2]));
        transit.remove(&[2]).expect("remove");
        transit.remove(&[3]).expect("remove");
        assert!(transit.is_empty().expect("is_empty"));
    }
}
