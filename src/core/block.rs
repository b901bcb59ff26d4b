//! # Block
//!
//! A block seals an ordered list of transactions under proof-of-work and
//! links to its predecessor by hash.

use crate::core::proof_of_work::ProofOfWork;
use crate::core::transaction::Transaction;
use crate::error::{CoinError, Result};
use crate::util::utils::{current_timestamp, sha256_digest};
use serde::{Deserialize, Serialize};

#[derive(Clone, Serialize, Deserialize)]
pub struct BlockHeader {
    timestamp: i64,
    pre_block_hash: String,
    hash: String,
    nonce: i64,
    height: usize,
}

/// `timestamp` is the creation time in milliseconds since the epoch.
/// `pre_block_hash` is the hex hash of the previous block, empty for genesis.
/// `hash` is the proof-of-work result over the header fields and the
/// transaction digest. `height` is the position in the chain, genesis at 0.
#[derive(Clone, Serialize, Deserialize)]
pub struct Block {
    header: BlockHeader,
    transactions: Vec<Transaction>,
}

impl Block {
    pub fn new_block(pre_block_hash: String, transactions: &[Transaction], height: usize) -> Block {
        let header = BlockHeader {
            timestamp: current_timestamp(),
            pre_block_hash,
            hash: String::new(),
            nonce: 0,
            height,
        };
        let mut block = Block {
            header,
            transactions: transactions.to_vec(),
        };
        let pow = ProofOfWork::new_proof_of_work(block.clone());
        let (nonce, hash) = pow.run();
        block.header.nonce = nonce;
        block.header.hash = hash;
        block
    }

    pub fn generate_genesis_block(coinbase: &Transaction) -> Block {
        Block::new_block(String::new(), &[coinbase.clone()], 0)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| CoinError::BlockSerialization(e.to_string()))
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Block> {
        bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map(|(block, _)| block)
            .map_err(|e| CoinError::BlockDeserialization(e.to_string()))
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    pub fn get_pre_block_hash(&self) -> String {
        self.header.pre_block_hash.clone()
    }

    pub fn get_hash(&self) -> &str {
        self.header.hash.as_str()
    }

    pub fn get_hash_bytes(&self) -> Vec<u8> {
        self.header.hash.as_bytes().to_vec()
    }

    pub fn get_timestamp(&self) -> i64 {
        self.header.timestamp
    }

    pub fn get_nonce(&self) -> i64 {
        self.header.nonce
    }

    pub fn get_height(&self) -> usize {
        self.header.height
    }

    /// Digest of the contained transactions: SHA-256 over the concatenated ids
    /// in block order.
    pub fn hash_transactions(&self) -> Vec<u8> {
        let mut tx_hashes = vec![];
        for transaction in &self.transactions {
            tx_hashes.extend(transaction.get_id());
        }
        sha256_digest(tx_hashes.as_slice())
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
    fn test_block_creation_runs_proof_of_work() {
        let block = Block::new_block("deadbeef".to_string(), &[coinbase()], 3);

        assert_eq!(block.get_pre_block_hash(), "deadbeef");
        assert_eq!(block.get_height(), 3);
        assert!(!block.get_hash().is_empty());
        assert!(ProofOfWork::new_proof_of_work(block).validate());
    }

    #[test]
    fn test_genesis_block_shape() {
        let block = Block::generate_genesis_block(&coinbase());
        assert_eq!(block.get_height(), 0);
        assert!(block.get_pre_block_hash().is_empty());
        assert_eq!(block.get_transactions().len(), 1);
    }

    #[test]
    fn test_block_serialization_roundtrip() {
        let block = Block::new_block("prev".to_string(), &[coinbase()], 1);
        let bytes = block.serialize().expect("serialize");
        let decoded = Block::deserialize(&bytes).expect("deserialize");

        assert_eq!(block.get_timestamp(), decoded.get_timestamp());
        assert_eq!(block.get_pre_block_hash(), decoded.get_pre_block_hash());
        assert_eq!(block.get_hash(), decoded.get_hash());
        assert_eq!(block.get_nonce(), decoded.get_nonce());
        assert_eq!(block.get_height(), decoded.get_height());
        assert_eq!(block.get_transactions().len(), decoded.get_transactions().len());
    }

    #[test]
    fn test_transaction_digest_depends_on_order() {
        let first = coinbase();
        let second = coinbase();
        let forward = Block::new_block(String::new(), &[first.clone(), second.clone()], 0);
        let reversed = Block::new_block(String::new(), &[second, first], 0);
        assert_ne!(forward.hash_transactions(), reversed.hash_transactions());
    }

    #[test]
    fn test_corrupted_nonce_fails_proof_of_work() {
        let mut block = Block::new_block(String::new(), &[coinbase()], 0);
        block.header.nonce += 1;
        assert!(!ProofOfWork::new_proof_of_work(block).validate());
    }

    #[test]
    fn test_corrupted_timestamp_fails_proof_of_work() {
        let mut block = Block::new_block(String::new(), &[coinbase()], 0);
        block.header.timestamp += 1;
        assert!(!ProofOfWork::new_proof_of_work(block).validate());
    }
}
