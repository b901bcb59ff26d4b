//! The listener and the message dispatcher.
//!
//! One listening socket per node. Every accepted connection carries exactly
//! one message: the handler task reads it (bounded by a read timeout),
//! dispatches on the command, and the connection is done. A malformed or
//! timed-out connection is dropped with a warning; the node keeps serving.

use crate::config::{CENTRAL_NODE, GLOBAL_CONFIG};
use crate::core::block::Block;
use crate::core::transaction::Transaction;
use crate::error::{CoinError, Result};
use crate::network::message::{OpType, Package};
use crate::network::operations::{
    process_transaction, send_addr, send_block, send_get_blocks, send_get_data, send_inv, send_tx,
    send_version,
};
use crate::node::NodeContext;
use data_encoding::HEXLOWER;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info, warn};

const MESSAGE_READ_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Server {
    ctx: NodeContext,
}

impl Server {
    pub fn new(ctx: NodeContext) -> Server {
        Server { ctx }
    }

    ///
    /// Bind the node address and serve forever. A node that is not the
    /// central node announces itself first so catch-up starts immediately.
    ///
    pub async fn run(&self) -> Result<()> {
        let addr = GLOBAL_CONFIG.node_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| CoinError::Network(format!("cannot bind {}: {}", addr, e)))?;
        info!("Listening on {}", addr);

        if addr != *CENTRAL_NODE {
            let best_height = self.ctx.blockchain().get_best_height().await?;
            send_version(&self.ctx, &CENTRAL_NODE, best_height).await;
        }

        loop {
            let (stream, peer_addr) = listener
                .accept()
                .await
                .map_err(|e| CoinError::Network(e.to_string()))?;
            let ctx = self.ctx.clone();
            tokio::spawn(async move {
                if let Err(e) = serve_connection(ctx, stream).await {
                    warn!("connection from {} dropped: {}", peer_addr, e);
                }
            });
        }
    }
}

async fn serve_connection(ctx: NodeContext, mut stream: TcpStream) -> Result<()> {
    let mut frame = vec![];
    timeout(MESSAGE_READ_TIMEOUT, stream.read_to_end(&mut frame))
        .await
        .map_err(|_| CoinError::Network("read timed out".to_string()))?
        .map_err(|e| CoinError::Network(e.to_string()))?;

    let pkg = Package::from_bytes(&frame)?;
    process_package(ctx, pkg).await
}

///
/// Dispatch one message. Any sender not yet in the known-peers set is added
/// before its message takes effect.
///
pub async fn process_package(ctx: NodeContext, pkg: Package) -> Result<()> {
    let addr_from = pkg.addr_from();
    debug!("received {} from {}", pkg.command(), addr_from);
    if !ctx.peers().node_is_known(&addr_from)? {
        ctx.peers().add_node(addr_from)?;
    }

    match pkg {
        // Height comparison drives catch-up: the lower side asks for the
        // higher side's block list, the higher side answers with its version
        // so the lower side learns whom to ask.
        Package::Version {
            addr_from,
            version,
            best_height,
        } => {
            debug!("version = {}, best_height = {}", version, best_height);
            let local_best_height = ctx.blockchain().get_best_height().await?;
            if local_best_height < best_height {
                send_get_blocks(&ctx, &addr_from).await;
            } else if local_best_height > best_height {
                send_version(&ctx, &addr_from, local_best_height).await;
            }

            // The central node gossips its peer list to whoever checks in.
            if GLOBAL_CONFIG.node_addr().ok() == Some(*CENTRAL_NODE) {
                let peers = ctx
                    .peers()
                    .get_nodes()?
                    .into_iter()
                    .filter(|peer| *peer != addr_from && *peer != *CENTRAL_NODE)
                    .collect::<Vec<_>>();
                if !peers.is_empty() {
                    send_addr(&ctx, &addr_from, peers).await;
                }
            }
        }

        Package::Addr { addresses, .. } => {
            ctx.peers().add_nodes(addresses)?;
            info!("known peers: {}", ctx.peers().len()?);
        }

        Package::GetBlocks { addr_from } => {
            let hashes = ctx.blockchain().get_block_hashes().await?;
            send_inv(&ctx, &addr_from, OpType::Block, &hashes).await;
        }

        // A block inventory becomes the download queue; request the head.
        // A transaction inventory is only followed up when the id is new.
        Package::Inv {
            addr_from,
            op_type,
            items,
        } => match op_type {
            OpType::Block => {
                ctx.blocks_in_transit().add_blocks(&items)?;
                if let Some(first) = items.first() {
                    send_get_data(&ctx, &addr_from, OpType::Block, first).await;
                }
            }
            OpType::Tx => {
                if let Some(txid) = items.first() {
                    let txid_hex = HEXLOWER.encode(txid);
                    if !ctx.mempool().contains(&txid_hex)? {
                        send_get_data(&ctx, &addr_from, OpType::Tx, txid).await;
                    }
                }
            }
        },

        Package::GetData {
            addr_from,
            op_type,
            id,
        } => match op_type {
            OpType::Block => {
                if let Some(block) = ctx.blockchain().get_block(id.as_slice()).await? {
                    send_block(&ctx, &addr_from, &block).await;
                }
            }
            OpType::Tx => {
                let txid_hex = HEXLOWER.encode(id.as_slice());
                if let Some(tx) = ctx.mempool().get(&txid_hex)? {
                    send_tx(&ctx, &addr_from, &tx).await;
                } else {
                    debug!("transaction {} is not pooled (already mined?)", txid_hex);
                }
            }
        },

        // Store the block, drop its transactions from the pool, then either
        // pull the next queued block or rebuild the UTXO view now that the
        // chain caught up.
        Package::Block { addr_from, block } => {
            let block = Block::deserialize(block.as_slice())?;
            ctx.blockchain().add_block(&block).await?;
            info!("stored block {} at height {}", block.get_hash(), block.get_height());

            for tx in block.get_transactions() {
                let _ = ctx.mempool().remove(&tx.get_tx_id_hex());
            }
            ctx.blocks_in_transit().remove(&block.get_hash_bytes())?;

            if !ctx.blocks_in_transit().is_empty()? {
                if let Some(next) = ctx.blocks_in_transit().first()? {
                    send_get_data(&ctx, &addr_from, OpType::Block, &next).await;
                }
            } else {
                ctx.utxo_set().reindex().await?;
            }
        }

        Package::Tx {
            addr_from,
            transaction,
        } => {
            let tx = Transaction::deserialize(transaction.as_slice())?;
            process_transaction(&ctx, &addr_from, tx).await;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{Blockchain, UTXOSet};
    use crate::test_support::NodeEnv;
    use crate::wallet::Wallet;
    use std::net::SocketAddr;
    use std::str::FromStr;

    fn peer() -> SocketAddr {
        SocketAddr::from_str("127.0.0.1:3977").expect("addr")
    }

    #[tokio::test]
    async fn test_sender_is_registered_as_peer() {
        let _env = NodeEnv::new();
        let address = Wallet::new().expect("wallet").get_address();
        let blockchain = Blockchain::create_blockchain(&address).await.expect("create");
        let ctx = NodeContext::new(blockchain);

        // The version reply goes to a dead address; eviction caused by the
        // failed send is part of the exercised path.
        let pkg = Package::Version {
            addr_from: peer(),
            version: 1,
            best_height: -1,
        };
        process_package(ctx.clone(), pkg).await.expect("process");
        // Registered on receipt, then evicted when the reply could not be
        // delivered: the peer set is back to just the central node.
        assert_eq!(ctx.peers().len().expect("len"), 1);
    }

    #[tokio::test]
    async fn test_addr_extends_known_peers() {
        let _env = NodeEnv::new();
        let address = Wallet::new().expect("wallet").get_address();
        let blockchain = Blockchain::create_blockchain(&address).await.expect("create");
        let ctx = NodeContext::new(blockchain);

        let gossip = vec![
            SocketAddr::from_str("127.0.0.1:3978").expect("addr"),
            SocketAddr::from_str("127.0.0.1:3979").expect("addr"),
        ];
        let pkg = Package::Addr {
            addr_from: peer(),
            addresses: gossip.clone(),
        };
        process_package(ctx.clone(), pkg).await.expect("process");
        for addr in &gossip {
            assert!(ctx.peers().node_is_known(addr).expect("known"));
        }
    }

    #[tokio::test]
    async fn test_block_delivery_is_stored_and_reindexed() {
        let _env = NodeEnv::new();
        let wallet = Wallet::new().expect("wallet");
        let address = wallet.get_address();
        let blockchain = Blockchain::create_blockchain(&address).await.expect("create");
        let ctx = NodeContext::new(blockchain.clone());

        let coinbase = Transaction::new_coinbase_tx(&address, None).expect("coinbase");
        let block = Block::new_block(blockchain.get_tip_hash().await, &[coinbase], 1);

        let pkg = Package::Block {
            addr_from: peer(),
            block: block.serialize().expect("serialize"),
        };
        process_package(ctx.clone(), pkg).await.expect("process");

        assert_eq!(blockchain.get_best_height().await.expect("height"), 1);
        // Transit queue was empty, so the handler rebuilt the UTXO view.
        let utxo_set = UTXOSet::new(blockchain);
        assert_eq!(utxo_set.get_balance(&address).await.expect("balance"), 20);
    }

    #[tokio::test]
    async fn test_malformed_wire_transaction_is_rejected() {
        let _env = NodeEnv::new();
        let wallet = Wallet::new().expect("wallet");
        let address = wallet.get_address();
        let blockchain = Blockchain::create_blockchain(&address).await.expect("create");
        let ctx = NodeContext::new(blockchain);

        let tx = Transaction::new_coinbase_tx(&address, None).expect("coinbase");
        let mut bytes = tx.serialize().expect("serialize");
        bytes.truncate(bytes.len() / 2);

        let pkg = Package::Tx {
            addr_from: peer(),
            transaction: bytes,
        };
        // The handler surfaces the decode failure and nothing is pooled.
        assert!(process_package(ctx.clone(), pkg).await.is_err());
        assert!(ctx.mempool().is_empty().expect("is_empty"));
    }
}
