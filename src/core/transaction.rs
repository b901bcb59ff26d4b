use crate::chain::blockchain::Blockchain;
use crate::chain::utxo_set::UTXOSet;
use crate::error::{CoinError, Result};
use crate::util::utils::{
    ecdsa_p256_sha256_sign_digest, ecdsa_p256_sha256_sign_verify, sha256_digest,
};
use crate::wallet::{Wallet, WalletAddress, get_pub_key_hash, hash_pub_key};
use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Block reward minted by every coinbase transaction.
const SUBSIDY: i64 = 10;

const TXID_LEN: usize = 32;

/// Output index sentinel for coinbase inputs, which reference no prior output.
const COINBASE_VOUT: usize = usize::MAX;

pub const GENESIS_COINBASE_DATA: &str =
    "The Times 03/Jan/2009 Chancellor on brink of second bailout for banks";

#[derive(Clone, Serialize, Deserialize)]
pub struct TXInput {
    txid: Vec<u8>,
    vout: usize,
    signature: Vec<u8>,
    pub_key: Vec<u8>,
}

impl TXInput {
    pub fn new(txid: &[u8], vout: usize) -> TXInput {
        TXInput {
            txid: txid.to_vec(),
            vout,
            signature: vec![],
            pub_key: vec![],
        }
    }

    pub fn get_txid(&self) -> &[u8] {
        self.txid.as_slice()
    }

    pub fn get_input_tx_id_hex(&self) -> String {
        HEXLOWER.encode(self.txid.as_slice())
    }

    pub fn get_vout(&self) -> usize {
        self.vout
    }

    pub fn get_pub_key(&self) -> &[u8] {
        self.pub_key.as_slice()
    }
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TXOutput {
    value: i64,
    pub_key_hash: Vec<u8>,
}

impl TXOutput {
    pub fn new(value: i64, address: &WalletAddress) -> Result<TXOutput> {
        Ok(TXOutput {
            value,
            pub_key_hash: get_pub_key_hash(address)?,
        })
    }

    pub fn get_value(&self) -> i64 {
        self.value
    }

    pub fn get_pub_key_hash(&self) -> &[u8] {
        self.pub_key_hash.as_slice()
    }

    pub fn is_locked_with_key(&self, pub_key_hash: &[u8]) -> bool {
        self.pub_key_hash.eq(pub_key_hash)
    }
}

///
/// A transfer of value: an ordered list of inputs spending prior outputs and
/// an ordered list of newly created outputs. The id is the SHA-256 of the
/// transaction serialized with an empty id field; it is fixed before signing
/// and never covers the signatures.
///
#[derive(Clone, Serialize, Deserialize)]
pub struct Transaction {
    id: Vec<u8>,
    vin: Vec<TXInput>,
    vout: Vec<TXOutput>,
}

impl Transaction {
    ///
    /// The `new_coinbase_tx` function mints the block subsidy to `to`. The
    /// single input references nothing: an all-zero txid, the sentinel output
    /// index, an empty signature, and a payload in the public-key slot. When
    /// no payload is given a fresh UUID keeps coinbase ids unique across
    /// blocks paying the same address.
    ///
    pub fn new_coinbase_tx(to: &WalletAddress, data: Option<String>) -> Result<Transaction> {
        let payload = match data {
            Some(data) if !data.is_empty() => data.into_bytes(),
            _ => Uuid::new_v4().as_bytes().to_vec(),
        };
        let tx_input = TXInput {
            txid: vec![0u8; TXID_LEN],
            vout: COINBASE_VOUT,
            signature: vec![],
            pub_key: payload,
        };
        let tx_output = TXOutput::new(SUBSIDY, to)?;

        let mut tx = Transaction {
            id: vec![],
            vin: vec![tx_input],
            vout: vec![tx_output],
        };
        tx.id = tx.hash()?;
        Ok(tx)
    }

    ///
    /// The `new_utxo_transaction` function builds and signs a spend of `amount`
    /// from the wallet's funds to `to`. It selects spendable outputs through
    /// the UTXO index, fails with `InsufficientFunds` when the selection comes
    /// up short, and appends a change output back to the sender when the
    /// selection overshoots.
    ///
    /// # Arguments
    ///
    /// * `from_wallet` - The sender's key pair.
    /// * `to` - The recipient address.
    /// * `amount` - The amount to transfer.
    /// * `utxo_set` - The UTXO index used for coin selection.
    pub async fn new_utxo_transaction(
        from_wallet: &Wallet,
        to: &WalletAddress,
        amount: i64,
        utxo_set: &UTXOSet,
    ) -> Result<Transaction> {
        let from = from_wallet.get_address();
        let pub_key_hash = hash_pub_key(from_wallet.get_public_key());

        let (accumulated, valid_outputs) = utxo_set
            .find_spendable_outputs(pub_key_hash.as_slice(), amount)
            .await?;
        if accumulated < amount {
            return Err(CoinError::InsufficientFunds);
        }

        let mut inputs = vec![];
        for (txid_hex, outs) in valid_outputs {
            let txid = HEXLOWER
                .decode(txid_hex.as_bytes())
                .map_err(|e| CoinError::TxIdHexDecoding(e.to_string()))?;
            for out in outs {
                inputs.push(TXInput {
                    txid: txid.clone(),
                    vout: out,
                    signature: vec![],
                    pub_key: from_wallet.get_public_key().to_vec(),
                });
            }
        }

        let mut outputs = vec![TXOutput::new(amount, to)?];
        if accumulated > amount {
            // change back to the sender
            outputs.push(TXOutput::new(accumulated - amount, &from)?);
        }

        let mut tx = Transaction {
            id: vec![],
            vin: inputs,
            vout: outputs,
        };
        tx.id = tx.hash()?;
        tx.sign(utxo_set.get_blockchain(), from_wallet.get_pkcs8())
            .await?;
        Ok(tx)
    }

    ///
    /// The `trimmed_copy` function clones the transaction with every input's
    /// signature and public key emptied. The signing hash for input `i` is the
    /// digest of this copy with `vin[i].pub_key` temporarily set to the
    /// referenced output's public key hash.
    ///
    fn trimmed_copy(&self) -> Transaction {
        let inputs = self
            .vin
            .iter()
            .map(|input| TXInput::new(input.get_txid(), input.get_vout()))
            .collect();
        Transaction {
            id: self.id.clone(),
            vin: inputs,
            vout: self.vout.clone(),
        }
    }

    ///
    /// The `sign` function signs every input against the output it spends. For
    /// each input it rebuilds the signing hash from a trimmed copy carrying the
    /// referenced output's public key hash, signs that hash with the private
    /// key, and writes the raw `r || s` signature back into the input.
    ///
    /// # Arguments
    ///
    /// * `blockchain` - The chain store used to resolve referenced transactions.
    /// * `pkcs8` - The sender's private key.
    pub(crate) async fn sign(&mut self, blockchain: &Blockchain, pkcs8: &[u8]) -> Result<()> {
        if self.is_coinbase() {
            return Ok(());
        }
        let mut tx_copy = self.trimmed_copy();

        for idx in 0..self.vin.len() {
            let prev_tx = blockchain
                .find_transaction(self.vin[idx].get_txid())
                .await?
                .ok_or_else(|| {
                    CoinError::MissingPrevTx(self.vin[idx].get_input_tx_id_hex())
                })?;

            tx_copy.vin[idx].signature = vec![];
            tx_copy.vin[idx].pub_key = prev_tx.vout[self.vin[idx].vout].pub_key_hash.clone();
            tx_copy.id = tx_copy.hash()?;
            tx_copy.vin[idx].pub_key = vec![];

            self.vin[idx].signature = ecdsa_p256_sha256_sign_digest(pkcs8, tx_copy.get_id())?;
        }
        Ok(())
    }

    ///
    /// The `verify` function is the mirror of `sign`: it rebuilds each input's
    /// signing hash the same way and checks the stored signature against the
    /// public key carried in the input. A transaction verifies iff all inputs
    /// verify; coinbase transactions verify trivially.
    ///
    /// # Arguments
    ///
    /// * `blockchain` - The chain store used to resolve referenced transactions.
    pub async fn verify(&self, blockchain: &Blockchain) -> Result<bool> {
        if self.is_coinbase() {
            return Ok(true);
        }
        let mut tx_copy = self.trimmed_copy();

        for (idx, vin) in self.vin.iter().enumerate() {
            let prev_tx = blockchain
                .find_transaction(vin.get_txid())
                .await?
                .ok_or_else(|| CoinError::MissingPrevTx(vin.get_input_tx_id_hex()))?;
            if vin.vout >= prev_tx.vout.len() {
                return Ok(false);
            }

            tx_copy.vin[idx].signature = vec![];
            tx_copy.vin[idx].pub_key = prev_tx.vout[vin.vout].pub_key_hash.clone();
            tx_copy.id = tx_copy.hash()?;
            tx_copy.vin[idx].pub_key = vec![];

            if !ecdsa_p256_sha256_sign_verify(
                vin.pub_key.as_slice(),
                vin.signature.as_slice(),
                tx_copy.get_id(),
            ) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// A coinbase transaction has exactly one input whose txid is all zeroes.
    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1
            && self.vin[0].txid.len() == TXID_LEN
            && self.vin[0].txid.iter().all(|byte| *byte == 0)
    }

    fn hash(&self) -> Result<Vec<u8>> {
        let tx_copy = Transaction {
            id: vec![],
            vin: self.vin.clone(),
            vout: self.vout.clone(),
        };
        Ok(sha256_digest(tx_copy.serialize()?.as_slice()))
    }

    pub fn get_id(&self) -> &[u8] {
        self.id.as_slice()
    }

    pub fn get_id_bytes(&self) -> Vec<u8> {
        self.id.clone()
    }

    pub fn get_tx_id_hex(&self) -> String {
        HEXLOWER.encode(self.id.as_slice())
    }

    pub fn get_vin(&self) -> &[TXInput] {
        self.vin.as_slice()
    }

    pub fn get_vout(&self) -> &[TXOutput] {
        self.vout.as_slice()
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| CoinError::TxSerialization(e.to_string()))
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Transaction> {
        bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map(|(tx, _)| tx)
            .map_err(|e| CoinError::TxDeserialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::NodeEnv;

    fn test_address() -> WalletAddress {
        Wallet::new().expect("Failed to create test wallet").get_address()
    }

    #[test]
    fn test_coinbase_transaction_shape() {
        let address = test_address();
        let tx = Transaction::new_coinbase_tx(&address, None)
            .expect("Failed to create coinbase transaction");

        assert!(tx.is_coinbase());
        assert_eq!(tx.get_vin().len(), 1);
        assert_eq!(tx.get_vout().len(), 1);

        let vin = &tx.get_vin()[0];
        assert_eq!(vin.get_txid(), [0u8; 32]);
        assert_eq!(vin.get_vout(), COINBASE_VOUT);
        assert!(vin.signature.is_empty());
        assert!(!vin.get_pub_key().is_empty());

        assert_eq!(tx.get_vout()[0].get_value(), SUBSIDY);
    }

    #[test]
    fn test_coinbase_payload_is_carried() {
        let address = test_address();
        let tx = Transaction::new_coinbase_tx(&address, Some(GENESIS_COINBASE_DATA.to_string()))
            .expect("Failed to create coinbase transaction");
        assert_eq!(tx.get_vin()[0].get_pub_key(), GENESIS_COINBASE_DATA.as_bytes());
    }

    #[test]
    fn test_coinbase_ids_are_unique() {
        let address = test_address();
        let first = Transaction::new_coinbase_tx(&address, None).expect("coinbase");
        let second = Transaction::new_coinbase_tx(&address, None).expect("coinbase");
        assert_ne!(first.get_id(), second.get_id());
    }

    #[test]
    fn test_transaction_id_is_32_bytes() {
        let tx = Transaction::new_coinbase_tx(&test_address(), None).expect("coinbase");
        assert_eq!(tx.get_id().len(), 32);
    }

    #[test]
    fn test_serialization_roundtrip() {
        let tx = Transaction::new_coinbase_tx(&test_address(), None).expect("coinbase");
        let bytes = tx.serialize().expect("serialize");
        let decoded = Transaction::deserialize(&bytes).expect("deserialize");
        assert_eq!(tx.get_id(), decoded.get_id());
        assert_eq!(tx.get_vin().len(), decoded.get_vin().len());
        assert_eq!(tx.get_vout().len(), decoded.get_vout().len());
    }

    #[test]
    fn test_deserialize_garbage_fails() {
        assert!(Transaction::deserialize(&[0xFF, 0x00, 0x13]).is_err());
    }

    #[tokio::test]
    async fn test_sign_and_verify_spend() {
        let _env = NodeEnv::new();
        let wallet = Wallet::new().expect("wallet");
        let blockchain = Blockchain::create_blockchain(&wallet.get_address())
            .await
            .expect("create blockchain");
        let utxo_set = UTXOSet::new(blockchain.clone());
        utxo_set.reindex().await.expect("reindex");

        let recipient = test_address();
        let tx = Transaction::new_utxo_transaction(&wallet, &recipient, 4, &utxo_set)
            .await
            .expect("build spend");

        assert!(tx.verify(&blockchain).await.expect("verify"));
    }

    #[tokio::test]
    async fn test_tampered_output_breaks_signature() {
        let _env = NodeEnv::new();
        let wallet = Wallet::new().expect("wallet");
        let blockchain = Blockchain::create_blockchain(&wallet.get_address())
            .await
            .expect("create blockchain");
        let utxo_set = UTXOSet::new(blockchain.clone());
        utxo_set.reindex().await.expect("reindex");

        let recipient = test_address();
        let mut tx = Transaction::new_utxo_transaction(&wallet, &recipient, 4, &utxo_set)
            .await
            .expect("build spend");

        // Redirect value after signing: the signing hash no longer matches.
        tx.vout[0].value = 9;
        assert!(!tx.verify(&blockchain).await.expect("verify"));
    }

    #[tokio::test]
    async fn test_exact_balance_spend_has_no_change_output() {
        let _env = NodeEnv::new();
        let wallet = Wallet::new().expect("wallet");
        let blockchain = Blockchain::create_blockchain(&wallet.get_address())
            .await
            .expect("create blockchain");
        let utxo_set = UTXOSet::new(blockchain.clone());
        utxo_set.reindex().await.expect("reindex");

        let recipient = test_address();
        let tx = Transaction::new_utxo_transaction(&wallet, &recipient, 10, &utxo_set)
            .await
            .expect("build spend");
        assert_eq!(tx.get_vout().len(), 1);
        assert_eq!(tx.get_vout()[0].get_value(), 10);
    }

    #[tokio::test]
    async fn test_one_short_spend_leaves_unit_change() {
        let _env = NodeEnv::new();
        let wallet = Wallet::new().expect("wallet");
        let blockchain = Blockchain::create_blockchain(&wallet.get_address())
            .await
            .expect("create blockchain");
        let utxo_set = UTXOSet::new(blockchain.clone());
        utxo_set.reindex().await.expect("reindex");

        let recipient = test_address();
        let tx = Transaction::new_utxo_transaction(&wallet, &recipient, 9, &utxo_set)
            .await
            .expect("build spend");
        assert_eq!(tx.get_vout().len(), 2);
        assert_eq!(tx.get_vout()[0].get_value(), 9);
        assert_eq!(tx.get_vout()[1].get_value(), 1);
        let sender_pkh = hash_pub_key(wallet.get_public_key());
        assert!(tx.get_vout()[1].is_locked_with_key(&sender_pkh));
    }

    #[tokio::test]
    async fn test_wire_received_tampered_transaction_is_not_pooled() {
        use crate::network::operations::process_transaction;
        use crate::node::NodeContext;
        use std::net::SocketAddr;
        use std::str::FromStr;

        let _env = NodeEnv::new();
        let wallet = Wallet::new().expect("wallet");
        let blockchain = Blockchain::create_blockchain(&wallet.get_address())
            .await
            .expect("create blockchain");
        let utxo_set = UTXOSet::new(blockchain.clone());
        utxo_set.reindex().await.expect("reindex");

        let recipient = test_address();
        let mut tx = Transaction::new_utxo_transaction(&wallet, &recipient, 4, &utxo_set)
            .await
            .expect("build spend");
        tx.vout[0].value = 10;

        let ctx = NodeContext::new(blockchain);
        let sender = SocketAddr::from_str("127.0.0.1:3901").expect("addr");
        process_transaction(&ctx, &sender, tx).await;
        assert!(ctx.mempool().is_empty().expect("is_empty"));
    }

    #[tokio::test]
    async fn test_overspend_is_rejected() {
        let _env = NodeEnv::new();
        let wallet = Wallet::new().expect("wallet");
        let blockchain = Blockchain::create_blockchain(&wallet.get_address())
            .await
            .expect("create blockchain");
        let utxo_set = UTXOSet::new(blockchain.clone());
        utxo_set.reindex().await.expect("reindex");

        let recipient = test_address();
        let result =
            Transaction::new_utxo_transaction(&wallet, &recipient, 11, &utxo_set).await;
        assert!(matches!(result, Err(CoinError::InsufficientFunds)));
    }
}
