use super::wallet::{Wallet, WalletAddress};
use crate::config::GLOBAL_CONFIG;
use crate::error::{CoinError, Result};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

///
/// The per-node wallet store: a map of address to key pair, persisted as one
/// self-describing binary file (`wallet_<NODE_ID>.dat`). Writes serialize the
/// whole map to memory first and then replace the file in a single write.
///
pub struct Wallets {
    wallets: HashMap<String, Wallet>,
}

impl Wallets {
    pub fn new() -> Result<Wallets> {
        let mut wallets = Wallets {
            wallets: HashMap::new(),
        };
        wallets.load_from_file()?;
        Ok(wallets)
    }

    pub fn create_wallet(&mut self) -> Result<WalletAddress> {
        let wallet = Wallet::new()?;
        let address = wallet.get_address();
        self.wallets.insert(address.as_str().to_string(), wallet);
        self.save_to_file()?;
        Ok(address)
    }

    pub fn get_addresses(&self) -> Vec<String> {
        self.wallets.keys().cloned().collect()
    }

    pub fn get_wallet(&self, address: &WalletAddress) -> Option<&Wallet> {
        self.wallets.get(address.as_str())
    }

    fn wallet_file_path(&self) -> Result<PathBuf> {
        GLOBAL_CONFIG.wallet_file()
    }

    fn load_from_file(&mut self) -> Result<()> {
        let path = self.wallet_file_path()?;
        if !path.exists() {
            return Ok(());
        }
        let buf = fs::read(&path).map_err(|e| CoinError::WalletIo(e.to_string()))?;
        let wallets = bincode::serde::decode_from_slice(&buf[..], bincode::config::standard())
            .map_err(|e| CoinError::WalletDeserialization(e.to_string()))?
            .0;
        self.wallets = wallets;
        Ok(())
    }

    fn save_to_file(&self) -> Result<()> {
        let path = self.wallet_file_path()?;
        let wallets_bytes =
            bincode::serde::encode_to_vec(&self.wallets, bincode::config::standard())
                .map_err(|e| CoinError::WalletSerialization(e.to_string()))?;
        fs::write(&path, wallets_bytes).map_err(|e| CoinError::WalletIo(e.to_string()))
    }
}
