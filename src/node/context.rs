//! The node context: the one value threaded through every connection handler.
//!
//! It bundles the chain store with the volatile per-process state (mempool,
//! known peers, blocks in transit) so handlers never reach for process-wide
//! globals. Cloning is cheap; all fields are shared behind `Arc`.

use crate::chain::{Blockchain, UTXOSet};
use crate::config::CENTRAL_NODE;
use crate::core::memory_pool::{BlockInTransit, MemoryPool};
use crate::node::peers::Nodes;
use std::sync::Arc;

#[derive(Clone)]
pub struct NodeContext {
    blockchain: Blockchain,
    mempool: Arc<MemoryPool>,
    peers: Arc<Nodes>,
    blocks_in_transit: Arc<BlockInTransit>,
}

impl NodeContext {
    /// Build the context for a running node; the peer set starts with the
    /// central node.
    pub fn new(blockchain: Blockchain) -> Self {
        let peers = Nodes::new();
        peers.add_node(*CENTRAL_NODE).expect("peer set add error");
        Self {
            blockchain,
            mempool: Arc::new(MemoryPool::new()),
            peers: Arc::new(peers),
            blocks_in_transit: Arc::new(BlockInTransit::new()),
        }
    }

    pub fn blockchain(&self) -> &Blockchain {
        &self.blockchain
    }

    pub fn utxo_set(&self) -> UTXOSet {
        UTXOSet::new(self.blockchain.clone())
    }

    pub fn mempool(&self) -> &MemoryPool {
        &self.mempool
    }

    pub fn peers(&self) -> &Nodes {
        &self.peers
    }

    pub fn blocks_in_transit(&self) -> &BlockInTransit {
        &self.blocks_in_transit
    }
}
