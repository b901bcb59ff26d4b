pub mod message;
pub mod operations;
pub mod server;

pub use message::{OpType, Package};
pub use server::Server;

/// Protocol version advertised in `version` messages.
pub const NODE_VERSION: usize = 1;

/// A miner seals a block once this many transactions sit in its mempool
/// (one payment plus one coinbase self-reward in the smallest case).
pub const TRANSACTION_THRESHOLD: usize = 2;
