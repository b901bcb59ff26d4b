use super::block::Block;
use crate::util::utils::sha256_digest;
use data_encoding::HEXLOWER;
use num_bigint::{BigInt, Sign};
use std::borrow::Borrow;
use std::ops::ShlAssign;
use tracing::debug;

pub struct ProofOfWork {
    block: Block,
    target: BigInt,
}

/// Fixed difficulty: a valid hash must fall strictly below `1 << (256 - 16)`.
const TARGET_BITS: i32 = 16;

const MAX_NONCE: i64 = i64::MAX;

impl ProofOfWork {
    pub fn new_proof_of_work(block: Block) -> ProofOfWork {
        let mut target = BigInt::from(1);
        target.shl_assign(256 - TARGET_BITS);
        ProofOfWork { block, target }
    }

    /// Search preimage: previous hash, transaction digest, timestamp,
    /// difficulty and nonce, numeric fields big-endian.
    fn prepare_data(&self, nonce: i64) -> Vec<u8> {
        let pre_block_hash = self.block.get_pre_block_hash();
        let transactions_hash = self.block.hash_transactions();
        let timestamp = self.block.get_timestamp();
        let mut data_bytes = vec![];
        data_bytes.extend(pre_block_hash.as_bytes());
        data_bytes.extend(transactions_hash);
        data_bytes.extend(timestamp.to_be_bytes());
        data_bytes.extend(TARGET_BITS.to_be_bytes());
        data_bytes.extend(nonce.to_be_bytes());
        data_bytes
    }

    /// Search nonces from 0 upward until the hash drops below the target.
    pub fn run(&self) -> (i64, String) {
        let mut nonce = 0;
        let mut hash = Vec::new();
        debug!("Mining the block");
        while nonce < MAX_NONCE {
            let data = self.prepare_data(nonce);
            hash = sha256_digest(data.as_slice());
            let hash_int = BigInt::from_bytes_be(Sign::Plus, hash.as_slice());

            if hash_int.lt(self.target.borrow()) {
                debug!("{}", HEXLOWER.encode(hash.as_slice()));
                break;
            } else {
                nonce += 1;
            }
        }
        (nonce, HEXLOWER.encode(hash.as_slice()))
    }

    /// Recompute the hash with the stored nonce: it must reproduce the stored
    /// hash and fall below the target.
    pub fn validate(&self) -> bool {
        let data = self.prepare_data(self.block.get_nonce());
        let hash = sha256_digest(data.as_slice());
        let hash_int = BigInt::from_bytes_be(Sign::Plus, hash.as_slice());
        hash_int.lt(self.target.borrow()) && HEXLOWER.encode(hash.as_slice()) == self.block.get_hash()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transaction::Transaction;
    use crate::wallet::Wallet;

    fn mined_block() -> Block {
        let address = Wallet::new().expect("wallet").get_address();
        let coinbase = Transaction::new_coinbase_tx(&address, None).expect("coinbase");
        Block::new_block(String::new(), &[coinbase], 0)
    }

    #[test]
    fn test_mined_block_validates() {
        let block = mined_block();
        assert!(ProofOfWork::new_proof_of_work(block).validate());
    }

    #[test]
    fn test_run_finds_hash_below_target() {
        let block = mined_block();
        let pow = ProofOfWork::new_proof_of_work(block);
        let (_, hash_hex) = pow.run();
        // 16 leading zero bits show up as four leading hex zeroes.
        assert!(hash_hex.starts_with("0000"));
    }
}
