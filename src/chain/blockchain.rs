use crate::config::GLOBAL_CONFIG;
use crate::core::block::Block;
use crate::core::transaction::{GENESIS_COINBASE_DATA, TXOutput, Transaction};
use crate::error::{CoinError, Result};
use crate::wallet::WalletAddress;
use sled::transaction::TransactionResult;
use sled::{Db, Tree};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock as TokioRwLock;
use tracing::info;

const BLOCKS_TREE: &str = "blocks";
const TIP_BLOCK_HASH_KEY: &str = "l";

///
/// The chain store: blocks persisted in the per-node sled database under the
/// `blocks` tree, keyed by their hex hash, with the current tip hash under a
/// single well-known key. The tip is also cached in memory behind a lock so
/// handlers can consult it without touching the store.
///
/// An empty tip string means the node has no chain yet (a fresh peer that is
/// still catching up); `get_best_height` reports that state as -1 so any
/// advertised genesis looks ahead of it.
///
#[derive(Clone)]
pub struct Blockchain {
    tip_hash: Arc<TokioRwLock<String>>,
    db: Db,
}

impl Blockchain {
    fn open_db() -> Result<Db> {
        let path = GLOBAL_CONFIG.db_path()?;
        sled::open(path).map_err(|e| CoinError::StoreConnection(e.to_string()))
    }

    fn blocks_tree(db: &Db) -> Result<Tree> {
        db.open_tree(BLOCKS_TREE)
            .map_err(|e| CoinError::StoreConnection(e.to_string()))
    }

    ///
    /// The `create_blockchain` function initializes the per-node database with
    /// a single genesis block whose coinbase pays `genesis_address`. It fails
    /// when a chain already exists at that path.
    ///
    pub async fn create_blockchain(genesis_address: &WalletAddress) -> Result<Blockchain> {
        let db = Self::open_db()?;
        let blocks_tree = Self::blocks_tree(&db)?;

        let existing_tip = blocks_tree
            .get(TIP_BLOCK_HASH_KEY)
            .map_err(|e| CoinError::StoreRead(e.to_string()))?;
        if existing_tip.is_some() {
            return Err(CoinError::ChainAlreadyExists(
                GLOBAL_CONFIG.db_path()?.display().to_string(),
            ));
        }

        let coinbase_tx = Transaction::new_coinbase_tx(
            genesis_address,
            Some(GENESIS_COINBASE_DATA.to_string()),
        )?;
        let genesis = Block::generate_genesis_block(&coinbase_tx);
        Self::update_blocks_tree(&blocks_tree, &genesis)?;
        info!("Created blockchain with genesis block {}", genesis.get_hash());

        Ok(Blockchain {
            tip_hash: Arc::new(TokioRwLock::new(genesis.get_hash().to_string())),
            db,
        })
    }

    /// Open an existing chain; fails when the node has never been initialized.
    pub async fn open_blockchain() -> Result<Blockchain> {
        let db = Self::open_db()?;
        let blocks_tree = Self::blocks_tree(&db)?;

        let tip_bytes = blocks_tree
            .get(TIP_BLOCK_HASH_KEY)
            .map_err(|e| CoinError::StoreRead(e.to_string()))?
            .ok_or_else(|| {
                CoinError::ChainNotInitialized(
                    "no existing blockchain found; create one first".to_string(),
                )
            })?;
        let tip_hash = String::from_utf8(tip_bytes.to_vec())
            .map_err(|e| CoinError::TipHash(e.to_string()))?;

        Ok(Blockchain {
            tip_hash: Arc::new(TokioRwLock::new(tip_hash)),
            db,
        })
    }

    ///
    /// The `open_empty` function opens (or creates) the per-node database
    /// without requiring a chain in it. A catch-up node starts here: its tip
    /// stays empty until the first block arrives over the wire.
    ///
    pub async fn open_empty() -> Result<Blockchain> {
        let db = Self::open_db()?;
        let blocks_tree = Self::blocks_tree(&db)?;

        let tip_hash = match blocks_tree
            .get(TIP_BLOCK_HASH_KEY)
            .map_err(|e| CoinError::StoreRead(e.to_string()))?
        {
            Some(tip_bytes) => String::from_utf8(tip_bytes.to_vec())
                .map_err(|e| CoinError::TipHash(e.to_string()))?,
            None => String::new(),
        };

        Ok(Blockchain {
            tip_hash: Arc::new(TokioRwLock::new(tip_hash)),
            db,
        })
    }

    /// Store a block and point the tip key at it, atomically.
    fn update_blocks_tree(blocks_tree: &Tree, block: &Block) -> Result<()> {
        let block_hash = block.get_hash();
        let block_bytes = block.serialize()?;
        let transaction_result: TransactionResult<(), ()> = blocks_tree.transaction(|tx_db| {
            let _ = tx_db.insert(block_hash, block_bytes.clone())?;
            let _ = tx_db.insert(TIP_BLOCK_HASH_KEY, block_hash)?;
            Ok(())
        });
        transaction_result
            .map(|_| ())
            .map_err(|e| CoinError::StoreWrite(format!("{:?}", e)))
    }

    pub fn get_db(&self) -> &Db {
        &self.db
    }

    pub async fn get_tip_hash(&self) -> String {
        self.tip_hash.read().await.clone()
    }

    async fn set_tip_hash(&self, new_tip_hash: &str) {
        let mut tip_hash = self.tip_hash.write().await;
        *tip_hash = String::from(new_tip_hash);
    }

    ///
    /// Height of the best chain: the tip block's height, or -1 when the node
    /// has no chain yet. Genesis sits at height 0.
    ///
    pub async fn get_best_height(&self) -> Result<i64> {
        let tip_hash = self.get_tip_hash().await;
        if tip_hash.is_empty() {
            return Ok(-1);
        }
        let blocks_tree = Self::blocks_tree(&self.db)?;
        let tip_bytes = blocks_tree
            .get(tip_hash.as_str())
            .map_err(|e| CoinError::StoreRead(e.to_string()))?
            .ok_or_else(|| CoinError::TipHash(format!("tip block {} is missing", tip_hash)))?;
        let tip_block = Block::deserialize(tip_bytes.as_ref())?;
        Ok(tip_block.get_height() as i64)
    }

    pub async fn get_block(&self, block_hash: &[u8]) -> Result<Option<Block>> {
        let blocks_tree = Self::blocks_tree(&self.db)?;
        let block_bytes = blocks_tree
            .get(block_hash)
            .map_err(|e| CoinError::StoreRead(e.to_string()))?;
        match block_bytes {
            Some(block_bytes) => Ok(Some(Block::deserialize(block_bytes.as_ref())?)),
            None => Ok(None),
        }
    }

    /// All block hashes on the tip chain, tip first.
    pub async fn get_block_hashes(&self) -> Result<Vec<Vec<u8>>> {
        let mut iterator = self.iterator().await;
        let mut hashes = vec![];
        while let Some(block) = iterator.next() {
            hashes.push(block.get_hash_bytes());
        }
        Ok(hashes)
    }

    /// Lazy cursor over the tip chain, tip to genesis.
    pub async fn iterator(&self) -> BlockchainIterator {
        BlockchainIterator {
            db: self.db.clone(),
            current_hash: self.get_tip_hash().await,
        }
    }

    ///
    /// The `mine_block` function seals `transactions` into a new block on top
    /// of the current tip. Every transaction must verify; one bad transaction
    /// aborts the whole block and nothing is stored. An empty transaction list
    /// is refused outright.
    ///
    pub async fn mine_block(&self, transactions: &[Transaction]) -> Result<Block> {
        if transactions.is_empty() {
            return Err(CoinError::EmptyBlock);
        }
        for tx in transactions {
            if !self.verify_transaction(tx).await? {
                return Err(CoinError::InvalidTransaction(tx.get_tx_id_hex()));
            }
        }

        let best_height = self.get_best_height().await?;
        let next_height = (best_height + 1) as usize;
        let block = Block::new_block(self.get_tip_hash().await, transactions, next_height);

        let blocks_tree = Self::blocks_tree(&self.db)?;
        Self::update_blocks_tree(&blocks_tree, &block)?;
        self.set_tip_hash(block.get_hash()).await;
        Ok(block)
    }

    ///
    /// The `add_block` function stores a block received from a peer. Storing
    /// is idempotent; the tip pointer only moves when the new block's height
    /// strictly exceeds the current tip's (longest chain wins on receive, no
    /// reorg traversal).
    ///
    pub async fn add_block(&self, block: &Block) -> Result<()> {
        let blocks_tree = Self::blocks_tree(&self.db)?;
        let already_stored = blocks_tree
            .get(block.get_hash())
            .map_err(|e| CoinError::StoreRead(e.to_string()))?
            .is_some();
        if already_stored {
            return Ok(());
        }

        let best_height = self.get_best_height().await?;
        let becomes_tip = block.get_height() as i64 > best_height;
        let block_bytes = block.serialize()?;

        let transaction_result: TransactionResult<(), ()> = blocks_tree.transaction(|tx_db| {
            let _ = tx_db.insert(block.get_hash(), block_bytes.clone())?;
            if becomes_tip {
                let _ = tx_db.insert(TIP_BLOCK_HASH_KEY, block.get_hash())?;
            }
            Ok(())
        });
        transaction_result
            .map(|_| ())
            .map_err(|e| CoinError::StoreWrite(format!("{:?}", e)))?;

        if becomes_tip {
            self.set_tip_hash(block.get_hash()).await;
        } else {
            info!(
                "Block {} stored without moving the tip (height {} <= {})",
                block.get_hash(),
                block.get_height(),
                best_height
            );
        }
        Ok(())
    }

    /// Linear scan from tip to genesis for a transaction id.
    pub async fn find_transaction(&self, txid: &[u8]) -> Result<Option<Transaction>> {
        let mut iterator = self.iterator().await;
        while let Some(block) = iterator.next() {
            for transaction in block.get_transactions() {
                if txid.eq(transaction.get_id()) {
                    return Ok(Some(transaction.clone()));
                }
            }
        }
        Ok(None)
    }

    ///
    /// The `find_utxo` function computes the ground-truth unspent output set
    /// from the whole tip chain: every output ever created, minus every output
    /// referenced by a non-coinbase input. Keys are hex transaction ids, and
    /// each entry keeps its outputs at their original indices until the spent
    /// ones are dropped.
    ///
    pub async fn find_utxo(&self) -> Result<HashMap<String, Vec<TXOutput>>> {
        let mut utxo: HashMap<String, Vec<TXOutput>> = HashMap::new();
        let mut spent_txos: HashMap<String, Vec<usize>> = HashMap::new();

        let mut iterator = self.iterator().await;
        while let Some(block) = iterator.next() {
            for tx in block.get_transactions() {
                let txid_hex = tx.get_tx_id_hex();
                utxo.entry(txid_hex)
                    .or_default()
                    .extend(tx.get_vout().iter().cloned());

                if !tx.is_coinbase() {
                    for tx_in in tx.get_vin() {
                        spent_txos
                            .entry(tx_in.get_input_tx_id_hex())
                            .or_default()
                            .push(tx_in.get_vout());
                    }
                }
            }
        }

        // Drop spent outputs by original index, highest first so earlier
        // removals do not shift the ones still pending.
        for (txid_hex, mut spent_indices) in spent_txos {
            if let Some(outputs) = utxo.get_mut(&txid_hex) {
                spent_indices.sort_unstable();
                for &spent_idx in spent_indices.iter().rev() {
                    if spent_idx < outputs.len() {
                        outputs.remove(spent_idx);
                    }
                }
                if outputs.is_empty() {
                    utxo.remove(&txid_hex);
                }
            }
        }

        Ok(utxo)
    }

    pub async fn verify_transaction(&self, tx: &Transaction) -> Result<bool> {
        tx.verify(self).await
    }

    pub async fn sign_transaction(&self, tx: &mut Transaction, pkcs8: &[u8]) -> Result<()> {
        tx.sign(self, pkcs8).await
    }
}

pub struct BlockchainIterator {
    db: Db,
    current_hash: String,
}

impl BlockchainIterator {
    /// One block per call, tip towards genesis; ends after the genesis block,
    /// whose previous-hash is empty.
    pub fn next(&mut self) -> Option<Block> {
        if self.current_hash.is_empty() {
            return None;
        }
        let blocks_tree = self.db.open_tree(BLOCKS_TREE).ok()?;
        let data = blocks_tree.get(self.current_hash.as_str()).ok()??;
        let block = Block::deserialize(data.as_ref()).ok()?;
        self.current_hash = block.get_pre_block_hash();
        Some(block)
    }
}
