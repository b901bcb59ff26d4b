pub mod wallet;
pub mod wallets;

pub use wallet::ADDRESS_CHECK_SUM_LEN;
pub use wallet::Wallet;
pub use wallet::WalletAddress;
pub use wallet::convert_address;
pub use wallet::get_pub_key_hash;
pub use wallet::hash_pub_key;
pub use wallet::validate_address;
pub use wallets::Wallets;
