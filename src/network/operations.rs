//! Outbound sends and the transaction/mining pipeline.
//!
//! Every send opens a fresh connection, writes one frame and closes it.
//! A peer that cannot be reached is evicted from the known-peers set; no
//! retries happen at this layer.

use crate::config::{CENTRAL_NODE, GLOBAL_CONFIG};
use crate::core::block::Block;
use crate::core::transaction::Transaction;
use crate::error::CoinError;
use crate::network::message::{OpType, Package};
use crate::network::{NODE_VERSION, TRANSACTION_THRESHOLD};
use crate::node::NodeContext;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

const TCP_WRITE_TIMEOUT: Duration = Duration::from_millis(1000);

async fn send_data(ctx: &NodeContext, addr_to: &SocketAddr, pkg: Package) {
    debug!("send {} to {}", pkg.command(), addr_to);
    let frame = match pkg.to_bytes() {
        Ok(frame) => frame,
        Err(e) => {
            error!("failed to encode {}: {}", pkg.command(), e);
            return;
        }
    };

    let stream = match timeout(TCP_WRITE_TIMEOUT, TcpStream::connect(addr_to)).await {
        Ok(Ok(stream)) => stream,
        _ => {
            warn!("peer {} is unreachable, evicting", addr_to);
            let _ = ctx.peers().evict_node(addr_to);
            return;
        }
    };

    let mut stream = stream;
    if let Err(e) = stream.write_all(&frame).await {
        warn!("write to {} failed ({}), evicting", addr_to, e);
        let _ = ctx.peers().evict_node(addr_to);
        return;
    }
    let _ = stream.shutdown().await;
}

fn local_addr() -> Option<SocketAddr> {
    match GLOBAL_CONFIG.node_addr() {
        Ok(addr) => Some(addr),
        Err(e) => {
            error!("cannot determine local node address: {}", e);
            None
        }
    }
}

pub async fn send_version(ctx: &NodeContext, addr_to: &SocketAddr, best_height: i64) {
    let Some(addr_from) = local_addr() else { return };
    send_data(
        ctx,
        addr_to,
        Package::Version {
            addr_from,
            version: NODE_VERSION,
            best_height,
        },
    )
    .await;
}

pub async fn send_addr(ctx: &NodeContext, addr_to: &SocketAddr, addresses: Vec<SocketAddr>) {
    let Some(addr_from) = local_addr() else { return };
    send_data(
        ctx,
        addr_to,
        Package::Addr {
            addr_from,
            addresses,
        },
    )
    .await;
}

pub async fn send_inv(ctx: &NodeContext, addr_to: &SocketAddr, op_type: OpType, items: &[Vec<u8>]) {
    let Some(addr_from) = local_addr() else { return };
    send_data(
        ctx,
        addr_to,
        Package::Inv {
            addr_from,
            op_type,
            items: items.to_vec(),
        },
    )
    .await;
}

pub async fn send_get_blocks(ctx: &NodeContext, addr_to: &SocketAddr) {
    let Some(addr_from) = local_addr() else { return };
    send_data(ctx, addr_to, Package::GetBlocks { addr_from }).await;
}

pub async fn send_get_data(ctx: &NodeContext, addr_to: &SocketAddr, op_type: OpType, id: &[u8]) {
    let Some(addr_from) = local_addr() else { return };
    send_data(
        ctx,
        addr_to,
        Package::GetData {
            addr_from,
            op_type,
            id: id.to_vec(),
        },
    )
    .await;
}

pub async fn send_block(ctx: &NodeContext, addr_to: &SocketAddr, block: &Block) {
    let Some(addr_from) = local_addr() else { return };
    let block = match block.serialize() {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("failed to serialize block: {}", e);
            return;
        }
    };
    send_data(ctx, addr_to, Package::Block { addr_from, block }).await;
}

pub async fn send_tx(ctx: &NodeContext, addr_to: &SocketAddr, tx: &Transaction) {
    let Some(addr_from) = local_addr() else { return };
    let transaction = match tx.serialize() {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("failed to serialize transaction: {}", e);
            return;
        }
    };
    send_data(ctx, addr_to, Package::Tx { addr_from, transaction }).await;
}

///
/// Admit a wire-received transaction. The signature is checked before the
/// mempool sees it; a transaction that does not verify (or whose inputs
/// cannot be resolved locally) is dropped. The central node re-advertises
/// admitted transactions to every peer except itself and the origin, and a
/// miner whose pool reached the threshold seals a block on the spot.
///
pub async fn process_transaction(ctx: &NodeContext, addr_from: &SocketAddr, tx: Transaction) {
    let txid_hex = tx.get_tx_id_hex();

    match ctx.mempool().contains(&txid_hex) {
        Ok(false) => {}
        Ok(true) => {
            debug!("transaction {} already pooled", txid_hex);
            return;
        }
        Err(e) => {
            error!("mempool lookup failed: {}", e);
            return;
        }
    }

    match ctx.blockchain().verify_transaction(&tx).await {
        Ok(true) => {}
        Ok(false) => {
            warn!("dropping transaction {} with invalid signature", txid_hex);
            return;
        }
        Err(e) => {
            warn!("dropping unverifiable transaction {}: {}", txid_hex, e);
            return;
        }
    }

    if let Err(e) = ctx.mempool().add(tx.clone()) {
        error!("mempool insert failed: {}", e);
        return;
    }
    info!("pooled transaction {}", txid_hex);

    let my_addr = local_addr();
    if my_addr == Some(*CENTRAL_NODE) {
        let peers = ctx.peers().get_nodes().unwrap_or_default();
        for peer in peers {
            if Some(peer) != my_addr && peer != *addr_from {
                send_inv(ctx, &peer, OpType::Tx, &[tx.get_id_bytes()]).await;
            }
        }
    }

    let pooled = ctx.mempool().len().unwrap_or(0);
    if GLOBAL_CONFIG.is_miner() && pooled >= TRANSACTION_THRESHOLD {
        mine_pending_transactions(ctx).await;
    }
}

///
/// Seal every pooled transaction plus a fresh coinbase into a block. One
/// invalid transaction aborts the whole attempt and leaves the pool alone;
/// on success the UTXO index is advanced incrementally, the mined
/// transactions leave the pool, and the block is advertised to all peers.
///
pub async fn mine_pending_transactions(ctx: &NodeContext) {
    let mining_addr = match GLOBAL_CONFIG.get_mining_addr() {
        Ok(Some(addr)) => addr,
        _ => {
            warn!("mining requested without a reward address");
            return;
        }
    };
    let mut txs = match ctx.mempool().get_all() {
        Ok(txs) if !txs.is_empty() => txs,
        Ok(_) => return,
        Err(e) => {
            error!("mempool snapshot failed: {}", e);
            return;
        }
    };
    let coinbase = match Transaction::new_coinbase_tx(&mining_addr, None) {
        Ok(coinbase) => coinbase,
        Err(e) => {
            error!("coinbase construction failed: {}", e);
            return;
        }
    };
    txs.push(coinbase);

    let block = match ctx.blockchain().mine_block(&txs).await {
        Ok(block) => block,
        Err(CoinError::InvalidTransaction(txid)) => {
            error!("aborting mining: pooled transaction {} is invalid", txid);
            return;
        }
        Err(e) => {
            error!("mining failed: {}", e);
            return;
        }
    };
    if let Err(e) = ctx.utxo_set().update(&block).await {
        error!("chainstate update after mining failed: {}", e);
    }
    info!("mined block {}", block.get_hash());

    for tx in &txs {
        let _ = ctx.mempool().remove(&tx.get_tx_id_hex());
    }

    let my_addr = local_addr();
    let peers = ctx.peers().get_nodes().unwrap_or_default();
    for peer in peers {
        if Some(peer) != my_addr {
            send_inv(ctx, &peer, OpType::Block, &[block.get_hash_bytes()]).await;
        }
    }
}
