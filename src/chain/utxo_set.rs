use crate::chain::blockchain::Blockchain;
use crate::core::block::Block;
use crate::core::transaction::TXOutput;
use crate::error::{CoinError, Result};
use crate::wallet::{WalletAddress, get_pub_key_hash};
use data_encoding::HEXLOWER;
use sled::Tree;
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionResult};
use std::collections::HashMap;
use tracing::debug;

const UTXO_TREE: &str = "chainstate";

///
/// The materialized view of spendable outputs: one `chainstate` record per
/// transaction that still has unspent outputs, keyed by the raw transaction
/// id. Balance and coin-selection queries read this tree instead of walking
/// the chain.
///
/// Invariant: the union of all records equals exactly the set of outputs never
/// referenced by a non-coinbase input on the tip chain. `reindex` rebuilds the
/// view from the chain; `update` maintains it incrementally from one accepted
/// block.
///
pub struct UTXOSet {
    blockchain: Blockchain,
}

impl UTXOSet {
    pub fn new(blockchain: Blockchain) -> UTXOSet {
        UTXOSet { blockchain }
    }

    pub fn get_blockchain(&self) -> &Blockchain {
        &self.blockchain
    }

    fn utxo_tree(&self) -> Result<Tree> {
        self.blockchain
            .get_db()
            .open_tree(UTXO_TREE)
            .map_err(|e| CoinError::StoreConnection(e.to_string()))
    }

    fn decode_outputs(bytes: &[u8]) -> Result<Vec<TXOutput>> {
        bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map(|(outs, _)| outs)
            .map_err(|e| CoinError::TxDeserialization(e.to_string()))
    }

    fn encode_outputs(outs: &[TXOutput]) -> Result<Vec<u8>> {
        bincode::serde::encode_to_vec(outs, bincode::config::standard())
            .map_err(|e| CoinError::TxSerialization(e.to_string()))
    }

    ///
    /// The `find_spendable_outputs` function walks the chainstate records and
    /// collects outputs locked to `pub_key_hash` until the accumulated value
    /// reaches `amount`. Iteration order is store-defined; callers must not
    /// rely on which outputs win when several selections would do.
    ///
    /// # Returns
    ///
    /// The accumulated value and a map of hex transaction id to the chosen
    /// output indices. The caller decides whether the accumulation suffices.
    ///
    pub async fn find_spendable_outputs(
        &self,
        pub_key_hash: &[u8],
        amount: i64,
    ) -> Result<(i64, HashMap<String, Vec<usize>>)> {
        let mut unspent_outputs: HashMap<String, Vec<usize>> = HashMap::new();
        let mut accumulated = 0;
        let utxo_tree = self.utxo_tree()?;

        for item in utxo_tree.iter() {
            let (k, v) = item.map_err(|e| CoinError::StoreRead(e.to_string()))?;
            let txid_hex = HEXLOWER.encode(k.as_ref());
            let outs = Self::decode_outputs(v.as_ref())?;

            for (out_idx, out) in outs.iter().enumerate() {
                if out.is_locked_with_key(pub_key_hash) && accumulated < amount {
                    accumulated += out.get_value();
                    unspent_outputs
                        .entry(txid_hex.clone())
                        .or_default()
                        .push(out_idx);
                }
            }
        }
        debug!(
            "Coin selection accumulated {} across {} transactions",
            accumulated,
            unspent_outputs.len()
        );
        Ok((accumulated, unspent_outputs))
    }

    /// All outputs locked to `pub_key_hash`; no early stop, used for balances.
    pub async fn find_utxo(&self, pub_key_hash: &[u8]) -> Result<Vec<TXOutput>> {
        let utxo_tree = self.utxo_tree()?;
        let mut utxos = vec![];

        for item in utxo_tree.iter() {
            let (_, v) = item.map_err(|e| CoinError::StoreRead(e.to_string()))?;
            let outs = Self::decode_outputs(v.as_ref())?;
            for out in outs {
                if out.is_locked_with_key(pub_key_hash) {
                    utxos.push(out);
                }
            }
        }
        Ok(utxos)
    }

    /// Number of transactions that still carry unspent outputs.
    pub async fn count_transactions(&self) -> Result<usize> {
        let utxo_tree = self.utxo_tree()?;
        Ok(utxo_tree.iter().count())
    }

    pub async fn get_balance(&self, address: &WalletAddress) -> Result<i64> {
        let pub_key_hash = get_pub_key_hash(address)?;
        let utxos = self.find_utxo(pub_key_hash.as_slice()).await?;
        Ok(utxos.iter().map(|utxo| utxo.get_value()).sum())
    }

    ///
    /// The `reindex` function drops every chainstate record and rebuilds the
    /// view from the ground-truth scan of the chain.
    ///
    pub async fn reindex(&self) -> Result<()> {
        let utxo_tree = self.utxo_tree()?;
        utxo_tree
            .clear()
            .map_err(|e| CoinError::StoreWrite(e.to_string()))?;

        let utxo_map = self.blockchain.find_utxo().await?;
        debug!("Reindexing {} transactions with unspent outputs", utxo_map.len());

        for (txid_hex, outs) in &utxo_map {
            let txid = HEXLOWER
                .decode(txid_hex.as_bytes())
                .map_err(|e| CoinError::TxIdHexDecoding(e.to_string()))?;
            let value = Self::encode_outputs(outs)?;
            utxo_tree
                .insert(txid.as_slice(), value)
                .map_err(|e| CoinError::StoreWrite(e.to_string()))?;
        }
        Ok(())
    }

    ///
    /// The `update` function folds one accepted block into the view: every
    /// output referenced by a non-coinbase input is dropped from its record
    /// (deleting the record when nothing is left), then every transaction's
    /// outputs are written under its id. The whole step is one atomic batch;
    /// readers see either the pre- or post-block state.
    ///
    pub async fn update(&self, block: &Block) -> Result<()> {
        let utxo_tree = self.utxo_tree()?;

        let result: TransactionResult<(), CoinError> = utxo_tree.transaction(|tx_db| {
            for tx in block.get_transactions() {
                if !tx.is_coinbase() {
                    for vin in tx.get_vin() {
                        let outs_bytes = tx_db.get(vin.get_txid())?.ok_or_else(|| {
                            ConflictableTransactionError::Abort(CoinError::MissingPrevTx(
                                vin.get_input_tx_id_hex(),
                            ))
                        })?;
                        let outs = Self::decode_outputs(outs_bytes.as_ref())
                            .map_err(ConflictableTransactionError::Abort)?;

                        let updated_outs: Vec<TXOutput> = outs
                            .iter()
                            .enumerate()
                            .filter(|(out_idx, _)| *out_idx != vin.get_vout())
                            .map(|(_, out)| out.clone())
                            .collect();

                        if updated_outs.is_empty() {
                            tx_db.remove(vin.get_txid())?;
                        } else {
                            let outs_bytes = Self::encode_outputs(&updated_outs)
                                .map_err(ConflictableTransactionError::Abort)?;
                            tx_db.insert(vin.get_txid(), outs_bytes)?;
                        }
                    }
                }

                let outs_bytes = Self::encode_outputs(tx.get_vout())
                    .map_err(ConflictableTransactionError::Abort)?;
                tx_db.insert(tx.get_id(), outs_bytes)?;
            }
            Ok(())
        });

        result.map_err(|e| match e {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => CoinError::StoreWrite(e.to_string()),
        })
    }
}
