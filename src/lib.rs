pub mod error;
pub use error::{CoinError, Result};

pub mod config;
pub use config::{CENTRAL_NODE, Config, GLOBAL_CONFIG};

pub mod util;
pub use util::*;

pub mod core;
pub use core::*;

pub mod wallet;
pub use wallet::*;

pub mod chain;
pub use chain::*;

pub mod node;
pub use node::*;

pub mod network;
pub use network::*;

#[cfg(test)]
pub(crate) mod test_support {
    use std::fs;
    use std::sync::{Mutex, MutexGuard};

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Points `NODE_ID`/`NODE_ADDR` at a throwaway node for the duration of a
    /// test and removes that node's files again on drop. Holding the guard
    /// serializes every test that touches process environment.
    pub struct NodeEnv {
        node_id: String,
        _guard: MutexGuard<'static, ()>,
    }

    impl NodeEnv {
        pub fn new() -> NodeEnv {
            let guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
            let node_id = format!("test_{}", uuid::Uuid::new_v4().simple());
            unsafe {
                std::env::set_var("NODE_ID", &node_id);
                std::env::set_var("NODE_ADDR", "127.0.0.1:0");
            }
            cleanup_node_files(&node_id);
            NodeEnv {
                node_id,
                _guard: guard,
            }
        }
    }

    impl Drop for NodeEnv {
        fn drop(&mut self) {
            cleanup_node_files(&self.node_id);
        }
    }

    fn cleanup_node_files(node_id: &str) {
        let _ = fs::remove_dir_all(format!("b_{}.db", node_id));
        let _ = fs::remove_file(format!("wallet_{}.dat", node_id));
    }
}
