pub mod block;
pub mod memory_pool;
pub mod proof_of_work;
pub mod transaction;

pub use block::Block;
pub use memory_pool::{BlockInTransit, MemoryPool};
pub use proof_of_work::ProofOfWork;
pub use transaction::{GENESIS_COINBASE_DATA, TXInput, TXOutput, Transaction};
